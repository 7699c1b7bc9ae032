// Logging module - Loggers, levels, handlers and the tracing bridge

mod directory;
mod handler;
mod layer;
mod level;
mod record;

pub use directory::{lineage, LogManager, Logger, LoggerDirectory, DEFAULT_ROOT_LEVEL};
pub use handler::{ChannelSink, Handler, HandlerId, RecordSink, StreamHandler, WriterSink};
pub use layer::{init_tracing, logger_name, DirectoryLayer};
pub use level::Level;
pub use record::LogRecord;
