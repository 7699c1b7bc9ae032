use crate::logging::{Handler, HandlerId, Level, LogRecord};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Level the root logger starts with
pub const DEFAULT_ROOT_LEVEL: Level = Level::Info;

/// Process-wide table of named loggers
///
/// The control plane only talks to loggers through this trait so it can run
/// against an isolated directory in tests.
pub trait LoggerDirectory: Send + Sync {
    /// Look up a logger, creating it on first use
    fn get_logger(&self, name: &str) -> Arc<Logger>;

    /// Names of every logger created so far
    fn logger_names(&self) -> Vec<String>;

    /// Whether a record at `level` on `name` would pass the effective level
    fn is_loggable(&self, name: &str, level: Level) -> bool;

    /// Route a record through its logger and every ancestor's handlers
    fn publish(&self, record: LogRecord);
}

#[derive(Default)]
struct LoggerState {
    level: Option<Level>,
    handlers: Vec<Arc<dyn Handler>>,
}

/// A named logger with a mutable level and handler list
///
/// A logger without its own level inherits the nearest ancestor's.
pub struct Logger {
    name: String,
    state: Mutex<LoggerState>,
}

impl Logger {
    fn new(name: &str, level: Option<Level>) -> Self {
        Self {
            name: name.to_string(),
            state: Mutex::new(LoggerState {
                level,
                handlers: Vec::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The logger's own level, `None` when inherited
    pub fn level(&self) -> Option<Level> {
        self.state().level
    }

    pub fn set_level(&self, level: Option<Level>) {
        self.state().level = level;
    }

    pub fn add_handler(&self, handler: Arc<dyn Handler>) {
        self.state().handlers.push(handler);
    }

    /// Detach one attachment of the handler with the given id; returns whether one was attached
    pub fn remove_handler(&self, id: HandlerId) -> bool {
        let mut state = self.state();
        match state.handlers.iter().position(|h| h.id() == id) {
            Some(pos) => {
                state.handlers.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn has_handler(&self, id: HandlerId) -> bool {
        self.state().handlers.iter().any(|h| h.id() == id)
    }

    pub fn handler_count(&self) -> usize {
        self.state().handlers.len()
    }

    fn handlers(&self) -> Vec<Arc<dyn Handler>> {
        self.state().handlers.clone()
    }

    // Never log while this guard is held: publishing takes the same lock
    fn state(&self) -> std::sync::MutexGuard<'_, LoggerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.name)
            .field("level", &self.level())
            .field("handlers", &self.handler_count())
            .finish()
    }
}

/// Dotted-name ancestry, nearest first, always ending with the root ("")
pub fn lineage(name: &str) -> Vec<&str> {
    let mut chain = Vec::new();
    let mut current = name;
    while !current.is_empty() {
        chain.push(current);
        current = match current.rfind('.') {
            Some(idx) => &current[..idx],
            None => "",
        };
    }
    chain.push("");
    chain
}

/// In-memory logger directory owned by one process
pub struct LogManager {
    loggers: RwLock<HashMap<String, Arc<Logger>>>,
}

impl LogManager {
    pub fn new() -> Self {
        let mut loggers = HashMap::new();
        loggers.insert(
            String::new(),
            Arc::new(Logger::new("", Some(DEFAULT_ROOT_LEVEL))),
        );
        Self {
            loggers: RwLock::new(loggers),
        }
    }

    /// Existing loggers along the lineage of `name`, nearest first
    fn chain(&self, name: &str) -> Vec<Arc<Logger>> {
        let loggers = self.loggers.read().unwrap_or_else(PoisonError::into_inner);
        lineage(name)
            .into_iter()
            .filter_map(|n| loggers.get(n).cloned())
            .collect()
    }

    fn effective_level(chain: &[Arc<Logger>]) -> Level {
        chain
            .iter()
            .find_map(|logger| logger.level())
            .unwrap_or(DEFAULT_ROOT_LEVEL)
    }
}

impl Default for LogManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggerDirectory for LogManager {
    fn get_logger(&self, name: &str) -> Arc<Logger> {
        if let Some(logger) = self
            .loggers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return Arc::clone(logger);
        }

        let mut loggers = self.loggers.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            loggers
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Logger::new(name, None))),
        )
    }

    fn logger_names(&self) -> Vec<String> {
        let loggers = self.loggers.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = loggers.keys().cloned().collect();
        names.sort();
        names
    }

    fn is_loggable(&self, name: &str, level: Level) -> bool {
        level.passes(Self::effective_level(&self.chain(name)))
    }

    fn publish(&self, record: LogRecord) {
        let chain = self.chain(&record.logger);
        if !record.level.passes(Self::effective_level(&chain)) {
            return;
        }

        let handlers: Vec<Arc<dyn Handler>> =
            chain.iter().flat_map(|logger| logger.handlers()).collect();
        for handler in handlers {
            handler.publish(&record);
        }
    }
}
