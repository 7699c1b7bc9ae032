// Integration tests for configuration fan-out to workers

use logctl::control::{
    AppliedSummary, ApplyChannel, ApplyUnit, ConfigBroadcaster, LevelRegistry, LoggerBinding,
    RemoteApplyState, Scope,
};
use logctl::error::Result;
use logctl::logging::{Level, LogManager, LoggerDirectory, RecordSink, WriterSink};
use logctl::workers::{WorkerLink, WorkerRegistry, WorkerTransport};
use std::sync::Arc;

/// A worker living in this process, applying units directly
struct Loopback {
    state: Arc<RemoteApplyState>,
}

impl WorkerTransport for Loopback {
    async fn deliver(&mut self, unit: ApplyUnit) -> Result<AppliedSummary> {
        Ok(self.state.apply_idempotent(&unit))
    }
}

struct Process {
    directory: Arc<LogManager>,
    state: Arc<RemoteApplyState>,
}

impl Process {
    fn new() -> Self {
        let directory = Arc::new(LogManager::new());
        let registry = Arc::new(LevelRegistry::new(directory.clone()));
        let state = Arc::new(RemoteApplyState::with_sink_factory(
            registry,
            |_| -> Arc<dyn RecordSink> { Arc::new(WriterSink::new(std::io::sink())) },
        ));
        Self { directory, state }
    }
}

fn controller(channel: ApplyChannel, scope: Scope) -> (Process, Arc<WorkerRegistry>, Arc<ConfigBroadcaster>) {
    let process = Process::new();
    let workers = Arc::new(WorkerRegistry::new("controller"));
    let broadcaster = ConfigBroadcaster::new(channel, scope, Arc::clone(&workers), Arc::clone(&process.state));
    (process, workers, broadcaster)
}

fn attach(workers: &WorkerRegistry, name: &str, worker: &Process) -> WorkerLink {
    let link = WorkerLink::spawn(
        workers.next_worker_id(),
        name,
        Loopback {
            state: Arc::clone(&worker.state),
        },
    );
    workers.connect(link.clone()).unwrap();
    link
}

#[tokio::test]
async fn test_late_worker_gets_current_configuration_once() {
    let (ctl, workers, broadcaster) = controller(ApplyChannel::StderrTargets, Scope::LocalAndRemote);
    broadcaster.set_configuration(vec![LoggerBinding::new("org.example.Foo", Level::Fine)]);

    let w1 = Process::new();
    let link = attach(&workers, "w1", &w1);
    link.drain().await;

    let foo = w1.directory.get_logger("org.example.Foo");
    assert_eq!(foo.level(), Some(Level::Fine));
    assert_eq!(foo.handler_count(), 1);
    assert_eq!(ctl.directory.get_logger("org.example.Foo").level(), Some(Level::Fine));

    // re-sending the same configuration does not stack handlers
    broadcaster.set_configuration(vec![LoggerBinding::new("org.example.Foo", Level::Fine)]);
    link.drain().await;
    assert_eq!(foo.handler_count(), 1);

    broadcaster.clear();
    link.drain().await;
    assert_eq!(foo.level(), None);
    assert_eq!(foo.handler_count(), 0);
    assert_eq!(ctl.directory.get_logger("org.example.Foo").handler_count(), 0);
}

#[tokio::test]
async fn test_worker_joining_with_no_configuration_gets_nothing() {
    let (_ctl, workers, broadcaster) = controller(ApplyChannel::AgentStdout, Scope::RemoteOnly);
    let w1 = Process::new();
    let link = attach(&workers, "w1", &w1);
    link.drain().await;

    assert!(broadcaster.current_configuration().is_none());
    assert_eq!(w1.state.generation(ApplyChannel::AgentStdout), None);
}

#[tokio::test]
async fn test_every_worker_sees_the_same_generations_in_order() {
    let (_ctl, workers, broadcaster) = controller(ApplyChannel::AgentStdout, Scope::RemoteOnly);
    let w1 = Process::new();
    let w2 = Process::new();
    let l1 = attach(&workers, "w1", &w1);
    let l2 = attach(&workers, "w2", &w2);

    for name in ["a", "b", "c"] {
        let (_, queued) = broadcaster.set_configuration(vec![LoggerBinding::new(name, Level::All)]);
        assert_eq!(queued, 2);
    }
    l1.drain().await;
    l2.drain().await;

    for worker in [&w1, &w2] {
        assert_eq!(worker.state.generation(ApplyChannel::AgentStdout), Some(3));
        assert_eq!(worker.directory.get_logger("a").handler_count(), 0);
        assert_eq!(worker.directory.get_logger("b").handler_count(), 0);
        assert_eq!(worker.directory.get_logger("c").level(), Some(Level::All));
    }
}

#[tokio::test]
async fn test_disconnected_worker_does_not_fail_broadcast() {
    let (_ctl, workers, broadcaster) = controller(ApplyChannel::StderrTargets, Scope::LocalAndRemote);
    let w1 = Process::new();
    let w2 = Process::new();
    let l1 = attach(&workers, "w1", &w1);
    let l2 = attach(&workers, "w2", &w2);

    workers.disconnect(l1.id());
    let (config, queued) = broadcaster.set_configuration(vec![LoggerBinding::new("x", Level::Fine)]);
    assert_eq!(config.generation(), 1);
    assert_eq!(queued, 1);

    l2.drain().await;
    assert_eq!(w2.directory.get_logger("x").level(), Some(Level::Fine));
    assert_eq!(w1.directory.get_logger("x").level(), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_replacements_converge() {
    let (ctl, workers, broadcaster) = controller(ApplyChannel::StderrTargets, Scope::LocalAndRemote);
    let w1 = Process::new();
    let link = attach(&workers, "w1", &w1);

    let setters: Vec<_> = (0..16)
        .map(|i| {
            let broadcaster = Arc::clone(&broadcaster);
            tokio::task::spawn_blocking(move || {
                broadcaster.set_configuration(vec![LoggerBinding::new(format!("t{}", i), Level::Fine)]);
            })
        })
        .collect();
    for setter in setters {
        setter.await.unwrap();
    }
    link.drain().await;

    let current = broadcaster.current_configuration().unwrap();
    assert_eq!(current.generation(), 16);
    assert_eq!(w1.state.generation(ApplyChannel::StderrTargets), Some(16));

    let winner = &current.bindings()[0].name;
    for i in 0..16 {
        let name = format!("t{}", i);
        let expected = if &name == winner { 1 } else { 0 };
        assert_eq!(w1.directory.get_logger(&name).handler_count(), expected, "worker {}", name);
        assert_eq!(ctl.directory.get_logger(&name).handler_count(), expected, "controller {}", name);
    }
}

#[tokio::test]
async fn test_worker_connecting_between_replacements_ends_on_latest() {
    let (_ctl, workers, broadcaster) = controller(ApplyChannel::AgentStdout, Scope::RemoteOnly);
    broadcaster.set_configuration(vec![LoggerBinding::new("old", Level::All)]);

    let w1 = Process::new();
    let link = attach(&workers, "w1", &w1);
    broadcaster.set_configuration(vec![LoggerBinding::new("new", Level::All)]);
    link.drain().await;

    assert_eq!(w1.directory.get_logger("old").handler_count(), 0);
    assert_eq!(w1.directory.get_logger("new").handler_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_workers_connecting_while_configuration_changes_converge() {
    let (_ctl, workers, broadcaster) = controller(ApplyChannel::AgentStdout, Scope::RemoteOnly);
    broadcaster.set_configuration(vec![LoggerBinding::new("g0", Level::All)]);

    let setters: Vec<_> = (1..=24)
        .map(|i| {
            let broadcaster = Arc::clone(&broadcaster);
            tokio::task::spawn_blocking(move || {
                broadcaster.set_configuration(vec![LoggerBinding::new(format!("g{}", i), Level::All)]);
            })
        })
        .collect();
    let joiners: Vec<_> = (0..12)
        .map(|i| {
            let workers = Arc::clone(&workers);
            tokio::task::spawn_blocking(move || {
                let worker = Process::new();
                let link = attach(&workers, &format!("w{}", i), &worker);
                (worker, link)
            })
        })
        .collect();

    for setter in setters {
        setter.await.unwrap();
    }
    let mut joined = Vec::new();
    for joiner in joiners {
        joined.push(joiner.await.unwrap());
    }

    let current = broadcaster.current_configuration().unwrap();
    assert_eq!(current.generation(), 25);
    let winner = current.bindings()[0].name.clone();

    for (worker, link) in &joined {
        link.drain().await;
        assert_eq!(worker.state.generation(ApplyChannel::AgentStdout), Some(25));
        for i in 0..=24 {
            let name = format!("g{}", i);
            let logger = worker.directory.get_logger(&name);
            if name == winner {
                assert_eq!(logger.level(), Some(Level::All), "{} on {}", name, link.name());
                assert_eq!(logger.handler_count(), 1, "{} on {}", name, link.name());
            } else {
                assert_eq!(logger.level(), None, "{} on {}", name, link.name());
                assert_eq!(logger.handler_count(), 0, "{} on {}", name, link.name());
            }
        }
    }
}
