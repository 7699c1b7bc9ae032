use crate::logging::{Level, LogRecord};
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of an installed handler, used to remove exactly that handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

impl HandlerId {
    pub fn next() -> Self {
        Self(NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for HandlerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "handler-{}", self.0)
    }
}

/// A consumer attached to a logger
pub trait Handler: Send + Sync {
    fn id(&self) -> HandlerId;

    /// Own threshold, applied after the logger's level check
    fn level(&self) -> Level;

    fn publish(&self, record: &LogRecord);
}

/// Destination for formatted records
pub trait RecordSink: Send + Sync {
    /// Write one formatted line and flush it before returning
    fn write_line(&self, line: &str) -> io::Result<()>;
}

/// Sink over any `Write`, flushed after every line
pub struct WriterSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

impl WriterSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl WriterSink<io::Stderr> {
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl<W: Write + Send> RecordSink for WriterSink<W> {
    fn write_line(&self, line: &str) -> io::Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_all(line.as_bytes())?;
        writer.flush()
    }
}

/// Lines a [`ChannelSink`] buffers before it starts dropping
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Sink handing lines to an async consumer, such as a socket writer task
///
/// Bounded: when the consumer falls behind, new lines are dropped and
/// counted rather than blocking the thread that logged them. Nothing is
/// logged from here, since the sink may itself be attached to this
/// process's loggers.
pub struct ChannelSink {
    tx: mpsc::Sender<String>,
    dropped: AtomicU64,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::Receiver<String>) {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Lines discarded because the consumer was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl RecordSink for ChannelSink {
    fn write_line(&self, line: &str) -> io::Result<()> {
        match self.tx.try_send(line.to_string()) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "record consumer went away",
            )),
        }
    }
}

/// Handler formatting records onto a sink, one flushed line per record
pub struct StreamHandler {
    id: HandlerId,
    level: Mutex<Level>,
    sink: Arc<dyn RecordSink>,
    failures: AtomicU64,
}

impl StreamHandler {
    pub fn new(sink: Arc<dyn RecordSink>, level: Level) -> Self {
        Self {
            id: HandlerId::next(),
            level: Mutex::new(level),
            sink,
            failures: AtomicU64::new(0),
        }
    }

    /// Handler writing to this process's standard output
    pub fn stdout(level: Level) -> Self {
        Self::new(Arc::new(WriterSink::stdout()), level)
    }

    /// Handler writing to this process's standard error (the console)
    pub fn stderr(level: Level) -> Self {
        Self::new(Arc::new(WriterSink::stderr()), level)
    }

    pub fn set_level(&self, level: Level) {
        *self.level.lock().unwrap_or_else(PoisonError::into_inner) = level;
    }

    /// Number of records the sink refused
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

impl Handler for StreamHandler {
    fn id(&self) -> HandlerId {
        self.id
    }

    fn level(&self) -> Level {
        *self.level.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, record: &LogRecord) {
        if !record.level.passes(self.level()) {
            return;
        }
        if self.sink.write_line(&record.format()).is_err() {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
    }
}
