// Control module - Level overrides, configuration planes and tail sessions

mod apply;
mod broadcaster;
mod registry;
mod tail;

pub use apply::{
    AppliedSummary, ApplyChannel, ApplyUnit, LoggerBinding, RemoteApplyState, SinkDescriptor,
};
pub use broadcaster::{ConfigBroadcaster, Scope, TargetConfiguration};
pub use registry::{LevelRegistry, OverrideHandle};
pub use tail::{TailSession, TailState};
