// Apply units: the serializable work item pushed to every process, and the
// per-process state that applies it idempotently

use crate::control::{LevelRegistry, OverrideHandle};
use crate::error::{LogCtlError, Result};
use crate::logging::{Handler, Level, RecordSink, StreamHandler, WriterSink};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

/// One `{logger name -> minimum level}` binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggerBinding {
    pub name: String,
    pub level: Level,
}

impl LoggerBinding {
    pub fn new(name: impl Into<String>, level: Level) -> Self {
        Self {
            name: name.into(),
            level,
        }
    }

    /// Build a binding from a name and a level string
    pub fn parse(name: &str, level: &str) -> Result<Self> {
        Ok(Self::new(name.trim(), Level::parse(level)?))
    }

    /// Parse the `NAME@LEVEL` form used on the command line
    pub fn parse_target(target: &str) -> Result<Self> {
        match target.rsplit_once('@') {
            Some((name, level)) => Self::parse(name, level),
            None => Err(LogCtlError::InvalidTarget(format!(
                "'{}' must look like NAME@LEVEL",
                target
            ))),
        }
    }
}

impl std::fmt::Display for LoggerBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.name, self.level)
    }
}

/// Where the receiving process writes matching records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SinkDescriptor {
    /// Standard output of the applying process
    LocalStream,
    /// Standard error of the applying process, which the launching
    /// controller captures as that process's log
    ForwardToController,
}

impl std::fmt::Display for SinkDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkDescriptor::LocalStream => write!(f, "local-stream"),
            SinkDescriptor::ForwardToController => write!(f, "forward-to-controller"),
        }
    }
}

/// Independent configuration planes; each has its own applied state per process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApplyChannel {
    /// Admin targets printed on the console of every process
    StderrTargets,
    /// `configure-agent-logs` names printed on agents' standard output
    AgentStdout,
}

impl ApplyChannel {
    pub fn sink(&self) -> SinkDescriptor {
        match self {
            ApplyChannel::StderrTargets => SinkDescriptor::ForwardToController,
            ApplyChannel::AgentStdout => SinkDescriptor::LocalStream,
        }
    }

    /// Threshold of the channel's shared handler for a set of bindings
    ///
    /// Console targets never hide records at `INFO` or above; agent stdout
    /// uses exactly the finest requested level.
    pub fn handler_level(&self, bindings: &[LoggerBinding]) -> Level {
        let finest = bindings.iter().map(|b| b.level).min();
        match self {
            ApplyChannel::StderrTargets => finest.map_or(Level::Info, |l| l.min(Level::Info)),
            ApplyChannel::AgentStdout => finest.unwrap_or(Level::All),
        }
    }
}

impl std::fmt::Display for ApplyChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApplyChannel::StderrTargets => write!(f, "stderr-targets"),
            ApplyChannel::AgentStdout => write!(f, "agent-stdout"),
        }
    }
}

/// Unit of work sent to a process: replace everything previously applied on
/// `channel` with `bindings`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyUnit {
    pub channel: ApplyChannel,
    pub generation: u64,
    pub bindings: Vec<LoggerBinding>,
    pub sink: SinkDescriptor,
}

impl ApplyUnit {
    pub fn handler_level(&self) -> Level {
        self.channel.handler_level(&self.bindings)
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Outcome of applying a unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedSummary {
    pub channel: ApplyChannel,
    pub generation: u64,
    pub reverted: usize,
    pub installed: usize,
}

type SinkFactory = Box<dyn Fn(SinkDescriptor) -> Arc<dyn RecordSink> + Send + Sync>;

struct AppliedSlot {
    sink: SinkDescriptor,
    handler: Arc<StreamHandler>,
    generation: u64,
    handles: Vec<OverrideHandle>,
}

/// Per-process record of what each apply channel installed
///
/// Every application reverts the previous one first, so applying the same
/// unit twice ends in the same state as applying it once. The handler for a
/// channel is created once and reused across applications.
pub struct RemoteApplyState {
    registry: Arc<LevelRegistry>,
    sinks: SinkFactory,
    slots: Mutex<HashMap<ApplyChannel, AppliedSlot>>,
}

impl RemoteApplyState {
    /// State writing to this process's real stdout/stderr
    pub fn new(registry: Arc<LevelRegistry>) -> Self {
        Self::with_sink_factory(registry, |sink| -> Arc<dyn RecordSink> {
            match sink {
                SinkDescriptor::LocalStream => Arc::new(WriterSink::stdout()),
                SinkDescriptor::ForwardToController => Arc::new(WriterSink::stderr()),
            }
        })
    }

    pub fn with_sink_factory<F>(registry: Arc<LevelRegistry>, factory: F) -> Self
    where
        F: Fn(SinkDescriptor) -> Arc<dyn RecordSink> + Send + Sync + 'static,
    {
        Self {
            registry,
            sinks: Box::new(factory),
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Replace whatever `unit.channel` had installed with `unit`'s bindings
    pub fn apply_idempotent(&self, unit: &ApplyUnit) -> AppliedSummary {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = slots.entry(unit.channel).or_insert_with(|| AppliedSlot {
            sink: unit.sink,
            handler: Arc::new(StreamHandler::new((self.sinks)(unit.sink), Level::Info)),
            generation: 0,
            handles: Vec::new(),
        });

        if unit.generation < slot.generation {
            debug!(
                "Applying generation {} on {} after generation {}",
                unit.generation, unit.channel, slot.generation
            );
        }

        let reverted = slot.handles.len();
        self.registry.revert_all(slot.handles.drain(..));

        if slot.sink != unit.sink {
            slot.sink = unit.sink;
            slot.handler = Arc::new(StreamHandler::new((self.sinks)(unit.sink), Level::Info));
        }
        slot.handler.set_level(unit.handler_level());

        for binding in &unit.bindings {
            let handler: Arc<dyn Handler> = slot.handler.clone();
            slot.handles
                .push(self.registry.install(&binding.name, binding.level, handler));
        }
        slot.generation = unit.generation;

        if reverted > 0 || !unit.is_empty() {
            info!(
                "Applied {} generation {}: {} binding(s) installed, {} reverted",
                unit.channel,
                unit.generation,
                slot.handles.len(),
                reverted
            );
        }

        AppliedSummary {
            channel: unit.channel,
            generation: unit.generation,
            reverted,
            installed: slot.handles.len(),
        }
    }

    /// Generation last applied on a channel
    pub fn generation(&self, channel: ApplyChannel) -> Option<u64> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&channel)
            .map(|slot| slot.generation)
    }

    /// Revert every channel, e.g. when the process shuts down
    pub fn clear(&self) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        for slot in slots.values_mut() {
            self.registry.revert_all(slot.handles.drain(..));
        }
    }
}
