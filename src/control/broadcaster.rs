use crate::control::{ApplyChannel, ApplyUnit, LoggerBinding, RemoteApplyState, SinkDescriptor};
use crate::workers::{WorkerLink, WorkerRegistry};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// Where a configuration plane takes effect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// The controller itself and every worker
    LocalAndRemote,
    /// Workers only
    RemoteOnly,
}

/// One generation of desired bindings
///
/// Never mutated after creation; a new configuration always replaces the
/// previous one wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfiguration {
    generation: u64,
    bindings: Vec<LoggerBinding>,
    sink: SinkDescriptor,
}

impl TargetConfiguration {
    /// Build a generation; a repeated logger name keeps its first position
    /// and takes the last level given for it
    pub fn new(generation: u64, bindings: Vec<LoggerBinding>, sink: SinkDescriptor) -> Self {
        let mut unique: Vec<LoggerBinding> = Vec::with_capacity(bindings.len());
        for binding in bindings {
            match unique.iter_mut().find(|b| b.name == binding.name) {
                Some(existing) => existing.level = binding.level,
                None => unique.push(binding),
            }
        }

        Self {
            generation,
            bindings: unique,
            sink,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn bindings(&self) -> &[LoggerBinding] {
        &self.bindings
    }

    pub fn sink(&self) -> SinkDescriptor {
        self.sink
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn to_unit(&self, channel: ApplyChannel) -> ApplyUnit {
        ApplyUnit {
            channel,
            generation: self.generation,
            bindings: self.bindings.clone(),
            sink: self.sink,
        }
    }
}

impl std::fmt::Display for TargetConfiguration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.bindings.iter().map(|b| b.to_string()).collect();
        write!(f, "#{} [{}]", self.generation, names.join(", "))
    }
}

/// Owner of one configuration plane
///
/// `set_configuration` swaps in a new generation, applies it locally (per
/// `Scope`) and queues it for every live worker, all under one swap lock so
/// concurrent replacements never interleave. Workers connecting later get
/// whatever generation is current at the moment they connect.
pub struct ConfigBroadcaster {
    channel: ApplyChannel,
    scope: Scope,
    workers: Arc<WorkerRegistry>,
    local: Arc<RemoteApplyState>,
    // generation counter; held for the whole replace-apply-broadcast sequence
    swap: Mutex<u64>,
    current: RwLock<Option<Arc<TargetConfiguration>>>,
}

impl ConfigBroadcaster {
    /// Create the plane and subscribe it to worker connections
    pub fn new(
        channel: ApplyChannel,
        scope: Scope,
        workers: Arc<WorkerRegistry>,
        local: Arc<RemoteApplyState>,
    ) -> Arc<Self> {
        let broadcaster = Arc::new(Self {
            channel,
            scope,
            workers: Arc::clone(&workers),
            local,
            swap: Mutex::new(0),
            current: RwLock::new(None),
        });

        let weak = Arc::downgrade(&broadcaster);
        workers.on_worker_connected(move |link| {
            if let Some(broadcaster) = weak.upgrade() {
                broadcaster.apply_to_new_worker(link);
            }
        });

        broadcaster
    }

    pub fn channel(&self) -> ApplyChannel {
        self.channel
    }

    /// Replace the configuration with `bindings`; an empty list clears every binding
    ///
    /// # Returns
    /// The generation now in force and how many workers it was queued for
    pub fn set_configuration(&self, bindings: Vec<LoggerBinding>) -> (Arc<TargetConfiguration>, usize) {
        let mut generation = self.swap.lock().unwrap_or_else(PoisonError::into_inner);
        *generation += 1;

        let config = Arc::new(TargetConfiguration::new(
            *generation,
            bindings,
            self.channel.sink(),
        ));
        info!("Configuring {} {}", self.channel, config);

        // publish before broadcasting so a worker hooked from here on reads this generation
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&config));

        let unit = config.to_unit(self.channel);
        if self.scope == Scope::LocalAndRemote {
            self.local.apply_idempotent(&unit);
        }

        let queued = self.workers.broadcast(&unit);
        debug!(
            "Queued {} generation {} for {} worker(s)",
            self.channel,
            config.generation(),
            queued
        );

        (config, queued)
    }

    /// Remove every binding of this plane, locally and on all workers
    pub fn clear(&self) -> (Arc<TargetConfiguration>, usize) {
        self.set_configuration(Vec::new())
    }

    /// The generation currently in force, if one was ever set
    pub fn current_configuration(&self) -> Option<Arc<TargetConfiguration>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn apply_to_new_worker(&self, link: &WorkerLink) {
        let Some(config) = self.current_configuration() else {
            return;
        };
        if config.is_empty() {
            return;
        }

        info!(
            "Registering {} {} on new worker {} ({})",
            self.channel,
            config,
            link.name(),
            link.id()
        );
        if let Err(e) = link.send(config.to_unit(self.channel)) {
            warn!("Failed to queue configuration for worker {}: {}", link.name(), e);
        }
    }
}
