//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use weft_causal::BufferPolicy;
use weft_core::ActorId;

/// What to do with a remote operation the buffer policy refuses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverflowPolicy {
    /// Drop it and rely on the gap timeout to request a resend.
    Drop,
    /// Drop it and immediately ask its sender to resend from the gap.
    #[default]
    Resync,
}

/// Configuration for one engine instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Local actor id. Generated when absent.
    pub actor: Option<ActorId>,
    /// Bounds on buffered out-of-order operations.
    pub buffer: BufferPolicy,
    pub on_overflow: OverflowPolicy,
    /// Deferred turns run at the end of each engine call; anything left
    /// over waits for the next call.
    pub max_deferred_turns: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            actor: None,
            buffer: BufferPolicy::default(),
            on_overflow: OverflowPolicy::default(),
            max_deferred_turns: 16,
        }
    }
}

/// Builder for engine configuration.
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
        }
    }

    pub fn actor(mut self, actor: impl Into<ActorId>) -> Self {
        self.config.actor = Some(actor.into());
        self
    }

    pub fn gap_timeout(mut self, timeout: Duration) -> Self {
        self.config.buffer.gap_timeout = timeout;
        self
    }

    pub fn max_buffered_per_actor(mut self, limit: usize) -> Self {
        self.config.buffer.max_per_actor = limit;
        self
    }

    pub fn max_buffered_total(mut self, limit: usize) -> Self {
        self.config.buffer.max_total = limit;
        self
    }

    pub fn on_overflow(mut self, policy: OverflowPolicy) -> Self {
        self.config.on_overflow = policy;
        self
    }

    pub fn max_deferred_turns(mut self, turns: usize) -> Self {
        self.config.max_deferred_turns = turns;
        self
    }

    pub fn build(self) -> EngineConfig {
        self.config
    }
}

impl Default for EngineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
