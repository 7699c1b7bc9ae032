// Integration test for IPC protocol serialization/deserialization

use logctl::control::{
    AppliedSummary, ApplyChannel, LoggerBinding, SinkDescriptor, TargetConfiguration,
};
use logctl::ipc::{
    AgentLogOptions, AgentResponse, Command, Request, Response, ResponseData, TargetOptions,
};
use logctl::logging::Level;
use logctl::workers::WorkerId;

#[test]
fn test_request_serialization() {
    let req = Request::new(
        1,
        Command::ConfigureAgentLogs(AgentLogOptions {
            names: vec!["hudson.remoting".to_string(), "jenkins.slaves".to_string()],
            level: "ALL".to_string(),
        }),
    );

    let json = serde_json::to_string(&req).expect("Failed to serialize request");
    let deserialized: Request = serde_json::from_str(&json).expect("Failed to deserialize request");

    assert_eq!(req.id, deserialized.id);
    match deserialized.command {
        Command::ConfigureAgentLogs(opts) => assert_eq!(opts.names.len(), 2),
        other => panic!("unexpected command {:?}", other),
    }
}

#[test]
fn test_targets_response_serialization() {
    let config = TargetConfiguration::new(
        4,
        vec![
            LoggerBinding::new("hudson.model.Run", Level::Fine),
            LoggerBinding::new("", Level::Config),
        ],
        SinkDescriptor::ForwardToController,
    );
    let response = Response::success(2, ResponseData::Targets(Some(config.clone())));

    let json = serde_json::to_string(&response).expect("Failed to serialize");
    let deserialized: Response = serde_json::from_str(&json).expect("Failed to deserialize");

    match deserialized.result {
        Ok(ResponseData::Targets(Some(back))) => assert_eq!(back, config),
        other => panic!("unexpected result {:?}", other),
    }
}

#[test]
fn test_set_targets_keeps_raw_strings() {
    let req = Request::new(
        3,
        Command::SetTargets(TargetOptions {
            targets: vec!["hudson.model@FINEST".to_string()],
        }),
    );
    let json = serde_json::to_string(&req).unwrap();
    assert!(json.contains("hudson.model@FINEST"));
}

#[test]
fn test_welcome_and_agent_response() {
    let welcome = Response::success(1, ResponseData::Welcome { worker_id: WorkerId(5) });
    let json = serde_json::to_string(&welcome).unwrap();
    let back: Response = serde_json::from_str(&json).unwrap();
    assert!(matches!(
        back.result,
        Ok(ResponseData::Welcome { worker_id: WorkerId(5) })
    ));

    let ack = AgentResponse {
        id: 9,
        result: Ok(AppliedSummary {
            channel: ApplyChannel::StderrTargets,
            generation: 2,
            reverted: 1,
            installed: 1,
        }),
    };
    let json = serde_json::to_string(&ack).unwrap();
    assert!(json.contains("\"stderr-targets\""));
    let back: AgentResponse = serde_json::from_str(&json).unwrap();
    assert_eq!(back.result.unwrap().generation, 2);
}

#[test]
fn test_unknown_level_is_rejected_on_the_wire() {
    let json = r#"{"name":"a","level":"LOUD"}"#;
    assert!(serde_json::from_str::<LoggerBinding>(json).is_err());

    let json = r#"{"name":"a","level":"finer"}"#;
    let binding: LoggerBinding = serde_json::from_str(json).unwrap();
    assert_eq!(binding.level, Level::Finer);
}

#[test]
fn test_worker_id_display() {
    let id = WorkerId(123);
    assert_eq!(id.to_string(), "123");
    assert_eq!(id.as_u64(), 123);
}
