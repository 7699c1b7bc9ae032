// Workers module - Live worker links and best-effort fan-out

mod link;
mod registry;

pub use link::{WorkerId, WorkerLink, WorkerTransport};
pub use registry::WorkerRegistry;
