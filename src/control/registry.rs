use crate::logging::{Handler, HandlerId, Level, LoggerDirectory};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

/// Receipt for one installed override, consumed by [`LevelRegistry::revert`]
#[derive(Debug)]
#[must_use = "an override stays installed until its handle is reverted"]
pub struct OverrideHandle {
    id: u64,
    logger: String,
    handler: HandlerId,
    level: Level,
    previous_level: Option<Level>,
}

impl OverrideHandle {
    pub fn logger(&self) -> &str {
        &self.logger
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn handler_id(&self) -> HandlerId {
        self.handler
    }

    /// The logger's own level as observed when this override was installed
    pub fn previous_level(&self) -> Option<Level> {
        self.previous_level
    }
}

struct ActiveOverride {
    id: u64,
    level: Level,
}

/// Live overrides on one logger, oldest first
///
/// `base` is the logger's level before the first live override and is
/// restored when the last one goes away. A `retired` stack was dropped from
/// the table while idle and must not take new overrides.
#[derive(Default)]
struct OverrideStack {
    base: Option<Level>,
    active: Vec<ActiveOverride>,
    retired: bool,
}

/// Per-process table of logger level overrides
///
/// The logger's level always follows the most recent live override. Reverting
/// a buried override only detaches its handler; reverting the newest exposes
/// the next one's level; reverting the last restores the level captured before
/// the first install. Each logger name has its own lock.
pub struct LevelRegistry {
    directory: Arc<dyn LoggerDirectory>,
    stacks: Mutex<HashMap<String, Arc<Mutex<OverrideStack>>>>,
    next_id: AtomicU64,
}

impl LevelRegistry {
    pub fn new(directory: Arc<dyn LoggerDirectory>) -> Self {
        Self {
            directory,
            stacks: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn directory(&self) -> &Arc<dyn LoggerDirectory> {
        &self.directory
    }

    fn stack(&self, name: &str) -> Arc<Mutex<OverrideStack>> {
        let mut stacks = self.stacks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(stacks.entry(name.to_string()).or_default())
    }

    /// Attach `handler` to the logger and raise its level to `level`
    ///
    /// # Arguments
    /// * `name` - Logger name ("" is the root logger)
    /// * `level` - Level the logger is set to while the override is live
    /// * `handler` - Handler to attach
    ///
    /// # Returns
    /// The handle needed to revert exactly this override
    pub fn install(&self, name: &str, level: Level, handler: Arc<dyn Handler>) -> OverrideHandle {
        loop {
            let slot = self.stack(name);
            let mut stack = slot.lock().unwrap_or_else(PoisonError::into_inner);
            // pruned between the lookup and the lock
            if !stack.retired {
                return self.push(&mut stack, name, level, handler);
            }
        }
    }

    fn push(
        &self,
        stack: &mut OverrideStack,
        name: &str,
        level: Level,
        handler: Arc<dyn Handler>,
    ) -> OverrideHandle {
        let logger = self.directory.get_logger(name);

        let previous_level = logger.level();
        if stack.active.is_empty() {
            stack.base = previous_level;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        stack.active.push(ActiveOverride { id, level });
        logger.set_level(Some(level));

        let handler_id = handler.id();
        logger.add_handler(handler);

        debug!(
            "Registered {} on logger '{}' at {} (previous {:?}, {} live)",
            handler_id,
            name,
            level,
            previous_level,
            stack.active.len()
        );

        OverrideHandle {
            id,
            logger: name.to_string(),
            handler: handler_id,
            level,
            previous_level,
        }
    }

    /// Remove exactly what `handle` installed
    ///
    /// Never fails: anything unexpected is logged and the rest of the revert
    /// still happens.
    pub fn revert(&self, handle: OverrideHandle) {
        let slot = self.stack(&handle.logger);
        if self.unwind(&slot, &handle) {
            self.prune(&handle.logger, slot);
        }
    }

    /// Undo `handle` on its stack; true when the stack is left empty
    fn unwind(&self, slot: &Mutex<OverrideStack>, handle: &OverrideHandle) -> bool {
        let mut stack = slot.lock().unwrap_or_else(PoisonError::into_inner);
        let logger = self.directory.get_logger(&handle.logger);

        if !logger.remove_handler(handle.handler) {
            warn!(
                "{} was already detached from logger '{}'",
                handle.handler, handle.logger
            );
        }

        let Some(pos) = stack.active.iter().position(|o| o.id == handle.id) else {
            warn!(
                "Override {} on logger '{}' is not live; level left untouched",
                handle.id, handle.logger
            );
            return stack.active.is_empty();
        };

        let was_newest = pos + 1 == stack.active.len();
        stack.active.remove(pos);

        if stack.active.is_empty() {
            let base = stack.base.take();
            logger.set_level(base);
            debug!(
                "Deregistered logger '{}', level restored to {:?}",
                handle.logger, base
            );
        } else if was_newest {
            if let Some(next) = stack.active.last() {
                logger.set_level(Some(next.level));
                debug!(
                    "Deregistered override on '{}', level now {} from an older live override",
                    handle.logger, next.level
                );
            }
        } else {
            debug!(
                "Deregistered buried override on '{}', level unchanged",
                handle.logger
            );
        }
        stack.active.is_empty()
    }

    /// Drop an idle stack from the table
    fn prune(&self, name: &str, slot: Arc<Mutex<OverrideStack>>) {
        let mut stacks = self.stacks.lock().unwrap_or_else(PoisonError::into_inner);
        if !stacks.get(name).map_or(false, |current| Arc::ptr_eq(current, &slot)) {
            return;
        }
        let mut stack = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if stack.active.is_empty() {
            stack.retired = true;
            stacks.remove(name);
        }
    }

    /// Revert many handles; one bad handle never stops the others
    pub fn revert_all(&self, handles: impl IntoIterator<Item = OverrideHandle>) {
        for handle in handles {
            self.revert(handle);
        }
    }

    /// Number of loggers that currently carry at least one override
    pub fn tracked_loggers(&self) -> usize {
        self.stacks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Number of live overrides on a logger
    pub fn live_overrides(&self, name: &str) -> usize {
        let stacks = self.stacks.lock().unwrap_or_else(PoisonError::into_inner);
        match stacks.get(name) {
            Some(slot) => slot
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .active
                .len(),
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{LogManager, StreamHandler};

    fn setup() -> (Arc<LogManager>, LevelRegistry) {
        let directory = Arc::new(LogManager::new());
        let registry = LevelRegistry::new(directory.clone());
        (directory, registry)
    }

    fn handler() -> Arc<dyn Handler> {
        Arc::new(StreamHandler::stderr(Level::All))
    }

    #[test]
    fn test_install_sets_level_and_handler() {
        let (directory, registry) = setup();
        let handle = registry.install("org.example.Foo", Level::Fine, handler());

        let logger = directory.get_logger("org.example.Foo");
        assert_eq!(logger.level(), Some(Level::Fine));
        assert_eq!(logger.handler_count(), 1);
        assert_eq!(handle.previous_level(), None);
        assert_eq!(registry.live_overrides("org.example.Foo"), 1);

        registry.revert(handle);
        assert_eq!(logger.level(), None);
        assert_eq!(logger.handler_count(), 0);
        assert_eq!(registry.live_overrides("org.example.Foo"), 0);
    }

    #[test]
    fn test_restores_explicit_prior_level() {
        let (directory, registry) = setup();
        let logger = directory.get_logger("a.b");
        logger.set_level(Some(Level::Warning));

        let handle = registry.install("a.b", Level::Finest, handler());
        assert_eq!(handle.previous_level(), Some(Level::Warning));
        registry.revert(handle);
        assert_eq!(logger.level(), Some(Level::Warning));
    }

    #[test]
    fn test_newest_override_wins_and_unwinds() {
        let (directory, registry) = setup();
        let logger = directory.get_logger("x");

        let first = registry.install("x", Level::Fine, handler());
        let second = registry.install("x", Level::Finer, handler());
        let third = registry.install("x", Level::Config, handler());
        assert_eq!(logger.level(), Some(Level::Config));

        // buried override: level untouched
        registry.revert(second);
        assert_eq!(logger.level(), Some(Level::Config));
        assert_eq!(logger.handler_count(), 2);

        // newest gone: the remaining live override applies
        registry.revert(third);
        assert_eq!(logger.level(), Some(Level::Fine));

        registry.revert(first);
        assert_eq!(logger.level(), None);
        assert_eq!(logger.handler_count(), 0);
    }

    #[test]
    fn test_independent_loggers_unaffected() {
        let (directory, registry) = setup();
        let untouched = directory.get_logger("untouched");
        untouched.set_level(Some(Level::Severe));

        let handle = registry.install("touched", Level::All, handler());
        registry.revert(handle);

        assert_eq!(untouched.level(), Some(Level::Severe));
        assert_eq!(untouched.handler_count(), 0);
    }

    #[test]
    fn test_idle_loggers_are_forgotten() {
        let (directory, registry) = setup();
        for i in 0..32 {
            let name = format!("job.{}", i);
            let handle = registry.install(&name, Level::Fine, handler());
            registry.revert(handle);
        }
        assert_eq!(registry.tracked_loggers(), 0);

        let first = registry.install("x", Level::Fine, handler());
        let second = registry.install("x", Level::Finer, handler());
        registry.revert(first);
        assert_eq!(registry.tracked_loggers(), 1);
        registry.revert(second);
        assert_eq!(registry.tracked_loggers(), 0);

        // a forgotten logger captures its base level afresh
        directory.get_logger("x").set_level(Some(Level::Info));
        let again = registry.install("x", Level::Finest, handler());
        assert_eq!(again.previous_level(), Some(Level::Info));
        registry.revert(again);
        assert_eq!(directory.get_logger("x").level(), Some(Level::Info));
    }
}
