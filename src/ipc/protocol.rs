// IPC Protocol definitions for client-controller and agent-controller communication

use crate::control::{AppliedSummary, ApplyUnit, TargetConfiguration};
use crate::workers::WorkerId;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

/// Options for `configure-agent-logs`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentLogOptions {
    pub names: Vec<String>,
    pub level: String,
}

/// Options for replacing the console targets; each entry is `NAME@LEVEL`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetOptions {
    pub targets: Vec<String>,
}

/// Options for tailing loggers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TailOptions {
    pub names: Vec<String>,
    pub level: String,
}

/// First message an agent sends on its connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentHello {
    pub name: String,
    pub pid: u32,
}

/// All available commands
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Command {
    ConfigureAgentLogs(AgentLogOptions),
    SetTargets(TargetOptions),
    ClearTargets,
    GetTargets,
    TailLog(TailOptions),
    ListAgents,
    Status,
    AgentHello(AgentHello),
}

impl Command {
    /// Whether the command changes logging state or reads log records
    pub fn is_administrative(&self) -> bool {
        !matches!(self, Command::AgentHello(_))
    }
}

/// Live worker information returned in responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInfo {
    pub id: WorkerId,
    pub name: String,
    pub local: bool,
    pub connected_at: SystemTime,
}

/// Controller state summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerStatus {
    pub pid: u32,
    pub uptime: Duration,
    pub agents: usize,
    pub targets_generation: u64,
    pub agent_logs_generation: u64,
}

/// Response data variants
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ResponseData {
    /// Agent log names registered and queued for every agent
    AgentLogsConfigured { generation: u64, agents: usize },
    /// Console targets replaced
    TargetsApplied { generation: u64, agents: usize },
    /// Console targets in force, if any were ever set
    Targets(Option<TargetConfiguration>),
    /// A tail session began; formatted records follow on the same connection
    TailStarted { names: Vec<String> },
    /// List of live workers, the controller first
    Agents(Vec<AgentInfo>),
    /// Controller status
    Status(ControllerStatus),
    /// Agent accepted into the live set
    Welcome { worker_id: WorkerId },
    /// Generic success message
    Success(String),
}

/// Request message sent to the controller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub command: Command,
}

/// Response message from the controller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    pub result: Result<ResponseData, String>,
}

impl Request {
    pub fn new(id: u64, command: Command) -> Self {
        Self { id, command }
    }
}

impl Response {
    pub fn success(id: u64, data: ResponseData) -> Self {
        Self {
            id,
            result: Ok(data),
        }
    }

    pub fn error(id: u64, error: String) -> Self {
        Self {
            id,
            result: Err(error),
        }
    }
}

/// Apply unit pushed from the controller to an agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRequest {
    pub id: u64,
    pub unit: ApplyUnit,
}

/// Agent's answer to an [`AgentRequest`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub id: u64,
    pub result: Result<AppliedSummary, String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{ApplyChannel, LoggerBinding};
    use crate::logging::Level;

    #[test]
    fn test_request_is_one_json_line() {
        let request = Request::new(
            7,
            Command::TailLog(TailOptions {
                names: vec!["hudson.model".to_string()],
                level: "ALL".to_string(),
            }),
        );
        let json = serde_json::to_string(&request).unwrap();
        assert!(!json.contains('\n'));

        let back: Request = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, 7);
        match back.command {
            Command::TailLog(opts) => assert_eq!(opts.names, vec!["hudson.model"]),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_agent_request_carries_levels_by_name() {
        let request = AgentRequest {
            id: 1,
            unit: ApplyUnit {
                channel: ApplyChannel::AgentStdout,
                generation: 4,
                bindings: vec![LoggerBinding::new("hudson.remoting", Level::Fine)],
                sink: ApplyChannel::AgentStdout.sink(),
            },
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"FINE\""));
        assert!(json.contains("\"local-stream\""));
        assert!(json.contains("\"agent-stdout\""));
    }

    #[test]
    fn test_agent_hello_is_not_administrative() {
        let hello = Command::AgentHello(AgentHello {
            name: "w1".to_string(),
            pid: 1,
        });
        assert!(!hello.is_administrative());
        assert!(Command::ClearTargets.is_administrative());
        assert!(Command::Status.is_administrative());
    }

    #[test]
    fn test_error_response() {
        let response = Response::error(3, "Permission denied".to_string());
        let json = serde_json::to_string(&response).unwrap();
        let back: Response = serde_json::from_str(&json).unwrap();
        assert_eq!(back.result.unwrap_err(), "Permission denied");
    }
}
