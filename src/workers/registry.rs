use crate::control::ApplyUnit;
use crate::error::{LogCtlError, Result};
use crate::workers::{WorkerId, WorkerLink};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

type ConnectHook = Arc<dyn Fn(&WorkerLink) + Send + Sync>;

struct Members {
    local: WorkerLink,
    remote: BTreeMap<WorkerId, WorkerLink>,
    hooks: Vec<ConnectHook>,
}

/// Live set of worker links
///
/// Connect hooks and broadcasts both run under the member lock, so a worker
/// joining while a broadcast is in flight either receives that broadcast or
/// is hooked after it; never neither.
pub struct WorkerRegistry {
    members: Mutex<Members>,
    next_id: AtomicU64,
}

impl WorkerRegistry {
    /// Create a registry whose local link stands for `controller_name`
    pub fn new(controller_name: &str) -> Self {
        Self {
            members: Mutex::new(Members {
                local: WorkerLink::local(controller_name),
                remote: BTreeMap::new(),
                hooks: Vec::new(),
            }),
            next_id: AtomicU64::new(1),
        }
    }

    fn members(&self) -> MutexGuard<'_, Members> {
        self.members.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate an id for a link about to connect
    pub fn next_worker_id(&self) -> WorkerId {
        WorkerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Register a hook run once for every remote worker, before it joins the live set
    pub fn on_worker_connected<F>(&self, hook: F)
    where
        F: Fn(&WorkerLink) + Send + Sync + 'static,
    {
        self.members().hooks.push(Arc::new(hook));
    }

    /// Run the connect hooks for `link`, then mark it live
    pub fn connect(&self, link: WorkerLink) -> Result<()> {
        if link.is_local_controller() {
            return Err(LogCtlError::Internal(
                "The local controller link is registered implicitly".to_string(),
            ));
        }

        let mut members = self.members();
        if members.remote.contains_key(&link.id()) {
            return Err(LogCtlError::Internal(format!(
                "Worker {} is already connected",
                link.id()
            )));
        }

        for hook in &members.hooks {
            hook(&link);
        }

        info!("Worker {} ({}) is online", link.name(), link.id());
        members.remote.insert(link.id(), link);
        Ok(())
    }

    /// Forget a worker; its delivery queue closes once the last handle drops
    pub fn disconnect(&self, id: WorkerId) -> Option<WorkerLink> {
        let removed = self.members().remote.remove(&id);
        if let Some(link) = &removed {
            info!("Worker {} ({}) went offline", link.name(), id);
        }
        removed
    }

    /// Forget every remote worker, e.g. when the controller stops
    pub fn disconnect_all(&self) -> usize {
        let removed = std::mem::take(&mut self.members().remote);
        for (id, link) in &removed {
            info!("Worker {} ({}) disconnected", link.name(), id);
        }
        removed.len()
    }

    /// Every live link, the local controller first
    pub fn list_live_workers(&self) -> Vec<WorkerLink> {
        let members = self.members();
        std::iter::once(members.local.clone())
            .chain(members.remote.values().cloned())
            .collect()
    }

    pub fn remote_workers(&self) -> Vec<WorkerLink> {
        self.members().remote.values().cloned().collect()
    }

    pub fn get(&self, id: WorkerId) -> Option<WorkerLink> {
        let members = self.members();
        if id == WorkerId::LOCAL {
            return Some(members.local.clone());
        }
        members.remote.get(&id).cloned()
    }

    pub fn remote_count(&self) -> usize {
        self.members().remote.len()
    }

    /// Queue `unit` for every live remote worker
    ///
    /// Best effort: a worker that cannot take the unit is logged and skipped.
    /// Returns how many workers the unit was queued for.
    pub fn broadcast(&self, unit: &ApplyUnit) -> usize {
        let members = self.members();
        let mut queued = 0;
        for link in members.remote.values() {
            match link.send(unit.clone()) {
                Ok(()) => queued += 1,
                Err(e) => warn!(
                    "Skipping worker {} ({}) for {} generation {}: {}",
                    link.name(),
                    link.id(),
                    unit.channel,
                    unit.generation,
                    e
                ),
            }
        }
        queued
    }
}
