// Authorization - Who may reconfigure logging or read log records

use crate::error::{LogCtlError, Result};

/// uid of the superuser
const ROOT_UID: u32 = 0;

/// Allow root, the controller's own effective uid, and any `admin_uids`
///
/// A peer whose credentials could not be read is rejected.
pub fn require_admin(peer_uid: Option<u32>, admin_uids: &[u32]) -> Result<()> {
    let own_uid = nix::unistd::geteuid().as_raw();
    check(peer_uid, own_uid, admin_uids)
}

fn check(peer_uid: Option<u32>, own_uid: u32, admin_uids: &[u32]) -> Result<()> {
    match peer_uid {
        Some(uid) if uid == ROOT_UID || uid == own_uid || admin_uids.contains(&uid) => Ok(()),
        Some(uid) => Err(LogCtlError::PermissionDenied(format!(
            "uid {} is not allowed to administer logging",
            uid
        ))),
        None => Err(LogCtlError::PermissionDenied(
            "could not determine the caller's uid".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_and_self_are_admins() {
        assert!(check(Some(0), 1000, &[]).is_ok());
        assert!(check(Some(1000), 1000, &[]).is_ok());
    }

    #[test]
    fn test_listed_uid_is_admin() {
        assert!(check(Some(1001), 1000, &[1001]).is_ok());
    }

    #[test]
    fn test_others_are_rejected() {
        assert!(matches!(
            check(Some(1002), 1000, &[1001]),
            Err(LogCtlError::PermissionDenied(_))
        ));
        assert!(matches!(
            check(None, 1000, &[]),
            Err(LogCtlError::PermissionDenied(_))
        ));
    }

    #[test]
    fn test_current_user_passes() {
        let me = nix::unistd::geteuid().as_raw();
        assert!(require_admin(Some(me), &[]).is_ok());
    }
}
