use crate::control::{LevelRegistry, OverrideHandle};
use crate::error::{LogCtlError, Result};
use crate::logging::{Handler, Level, RecordSink, StreamHandler};
use std::future::Future;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Lifecycle of a tail session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailState {
    Created,
    Streaming,
    /// The consumer went away
    Completed,
    /// The caller interrupted the session
    Cancelled,
}

/// Wraps the caller's sink and reports the first write failure
struct SessionSink {
    inner: Arc<dyn RecordSink>,
    error: Mutex<Option<io::Error>>,
    failed: Notify,
}

impl SessionSink {
    fn take_error(&self) -> Option<io::Error> {
        self.error.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

impl RecordSink for SessionSink {
    fn write_line(&self, line: &str) -> io::Result<()> {
        let result = self.inner.write_line(line);
        if let Err(e) = &result {
            let mut slot = self.error.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.is_none() {
                *slot = Some(io::Error::new(e.kind(), e.to_string()));
                // notify_one keeps a permit if nobody is waiting yet
                self.failed.notify_one();
            }
        }
        result
    }
}

/// A temporary subscription streaming matching records to one caller
///
/// Owns the overrides it installs and removes exactly those when it ends,
/// whichever way it ends: interruption, consumer hang-up, sink failure, or
/// the session simply being dropped.
pub struct TailSession {
    registry: Arc<LevelRegistry>,
    names: Vec<String>,
    level: Level,
    sink: Arc<SessionSink>,
    handler: Arc<StreamHandler>,
    handles: Vec<OverrideHandle>,
    state: TailState,
}

impl TailSession {
    /// Prepare a session; nothing is installed until [`TailSession::start`]
    pub fn new(
        registry: Arc<LevelRegistry>,
        names: Vec<String>,
        level: Level,
        sink: Arc<dyn RecordSink>,
    ) -> Result<Self> {
        let mut unique: Vec<String> = Vec::with_capacity(names.len());
        for name in names {
            if !unique.contains(&name) {
                unique.push(name);
            }
        }
        if unique.is_empty() {
            return Err(LogCtlError::SessionError(
                "At least one logger name is required".to_string(),
            ));
        }

        let sink = Arc::new(SessionSink {
            inner: sink,
            error: Mutex::new(None),
            failed: Notify::new(),
        });
        let handler = Arc::new(StreamHandler::new(sink.clone(), level));

        Ok(Self {
            registry,
            names: unique,
            level,
            sink,
            handler,
            handles: Vec::new(),
            state: TailState::Created,
        })
    }

    pub fn state(&self) -> TailState {
        self.state
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn level(&self) -> Level {
        self.level
    }

    /// Install one override per logger name and begin streaming
    pub fn start(&mut self) {
        if self.state != TailState::Created {
            return;
        }

        for name in &self.names {
            let handler: Arc<dyn Handler> = self.handler.clone();
            self.handles
                .push(self.registry.install(name, self.level, handler));
        }
        self.state = TailState::Streaming;
        info!("Tailing {:?} at {}", self.names, self.level);
    }

    /// Stream until `interrupt` resolves or the sink stops accepting records
    ///
    /// Interruption is a normal end (`Cancelled`); a consumer that hung up
    /// ends the session as `Completed`. Any other sink failure is returned as
    /// an error, after the overrides have been reverted.
    pub async fn run<F>(mut self, interrupt: F) -> Result<TailState>
    where
        F: Future<Output = ()>,
    {
        self.start();

        let outcome = tokio::select! {
            _ = interrupt => Ok(TailState::Cancelled),
            _ = self.sink.failed.notified() => match self.sink.take_error() {
                Some(e) if is_hangup(&e) => Ok(TailState::Completed),
                Some(e) => Err(LogCtlError::SinkError(e.to_string())),
                None => Ok(TailState::Completed),
            },
        };

        self.finish(match &outcome {
            Ok(state) => *state,
            Err(_) => TailState::Completed,
        });
        outcome
    }

    fn finish(&mut self, state: TailState) {
        let count = self.handles.len();
        self.registry.revert_all(self.handles.drain(..));
        self.state = state;
        debug!("Tail of {:?} ended as {:?}, {} override(s) reverted", self.names, state, count);
    }
}

fn is_hangup(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset | io::ErrorKind::UnexpectedEof
    )
}

impl Drop for TailSession {
    fn drop(&mut self) {
        if !self.handles.is_empty() {
            warn!(
                "Tail of {:?} dropped while streaming; reverting its overrides",
                self.names
            );
            self.finish(TailState::Cancelled);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{ChannelSink, LogManager, LogRecord, LoggerDirectory};
    use std::time::Duration;
    use tokio::sync::oneshot;

    struct FailingSink;

    impl RecordSink for FailingSink {
        fn write_line(&self, _line: &str) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }
    }

    fn setup() -> (Arc<LogManager>, Arc<LevelRegistry>) {
        let directory = Arc::new(LogManager::new());
        let registry = Arc::new(LevelRegistry::new(directory.clone()));
        (directory, registry)
    }

    #[test]
    fn test_requires_a_name() {
        let (_, registry) = setup();
        let (sink, _rx) = ChannelSink::new();
        let result = TailSession::new(registry, vec![], Level::All, Arc::new(sink));
        assert!(matches!(result, Err(LogCtlError::SessionError(_))));
    }

    #[test]
    fn test_start_installs_and_drop_reverts() {
        let (directory, registry) = setup();
        let (sink, _rx) = ChannelSink::new();
        let mut session = TailSession::new(
            registry,
            vec!["a".to_string(), "b".to_string(), "a".to_string()],
            Level::Fine,
            Arc::new(sink),
        )
        .unwrap();
        assert_eq!(session.state(), TailState::Created);
        assert_eq!(session.names().len(), 2);

        session.start();
        assert_eq!(session.state(), TailState::Streaming);
        assert_eq!(directory.get_logger("a").level(), Some(Level::Fine));
        assert_eq!(directory.get_logger("b").handler_count(), 1);

        drop(session);
        assert_eq!(directory.get_logger("a").level(), None);
        assert_eq!(directory.get_logger("b").handler_count(), 0);
    }

    #[tokio::test]
    async fn test_interrupt_cancels_and_reverts() {
        let (directory, registry) = setup();
        let (sink, mut rx) = ChannelSink::new();
        let session =
            TailSession::new(registry, vec!["hudson.model".to_string()], Level::All, Arc::new(sink))
                .unwrap();

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(session.run(async move {
            let _ = stop_rx.await;
        }));

        tokio::time::sleep(Duration::from_millis(20)).await;
        directory.publish(LogRecord::new("hudson.model", Level::Info, "hello"));
        let line = rx.recv().await.unwrap();
        assert!(line.contains("hello"));

        stop_tx.send(()).unwrap();
        assert_eq!(task.await.unwrap().unwrap(), TailState::Cancelled);
        assert_eq!(directory.get_logger("hudson.model").handler_count(), 0);
        assert_eq!(directory.get_logger("hudson.model").level(), None);
    }

    #[tokio::test]
    async fn test_consumer_hangup_completes() {
        let (directory, registry) = setup();
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        let mut session =
            TailSession::new(registry, vec!["x".to_string()], Level::All, Arc::new(sink)).unwrap();
        session.start();
        directory.publish(LogRecord::new("x", Level::Info, "nobody listening"));

        let state = session.run(std::future::pending()).await.unwrap();
        assert_eq!(state, TailState::Completed);
        assert_eq!(directory.get_logger("x").handler_count(), 0);
    }

    #[tokio::test]
    async fn test_sink_failure_reverts_then_errors() {
        let (directory, registry) = setup();
        let mut session =
            TailSession::new(registry, vec!["y".to_string()], Level::All, Arc::new(FailingSink))
                .unwrap();
        session.start();
        directory.publish(LogRecord::new("y", Level::Severe, "boom"));

        let result = session.run(std::future::pending()).await;
        assert!(matches!(result, Err(LogCtlError::SinkError(_))));
        assert_eq!(directory.get_logger("y").handler_count(), 0);
        assert_eq!(directory.get_logger("y").level(), None);
    }
}
