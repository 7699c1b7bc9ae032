// IPC module - Communication between the CLI, the controller and agents

pub mod client;
pub mod framing;
pub mod protocol;
pub mod server;
pub mod transport;

pub use client::IpcClient;
pub use protocol::{
    AgentHello, AgentInfo, AgentLogOptions, AgentRequest, AgentResponse, Command,
    ControllerStatus, Request, Response, ResponseData, TailOptions, TargetOptions,
};
pub use server::{Connection, IpcServer};
pub use transport::{ResponseReader, SocketTransport};
