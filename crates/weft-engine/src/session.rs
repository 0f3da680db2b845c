//! Sessions: an engine attached to a transport.
//!
//! A session runs two tasks. The outbound pump encodes every message from
//! the engine's outbound stream and broadcasts it. The inbound loop feeds
//! received frames to the engine one at a time, in arrival order, and
//! periodically expires causality gaps so stuck buffers turn into resync
//! requests. The engine lock is never held across an await.

use crate::engine::Engine;
use crate::error::{EngineError, Result};
use crate::network::NetworkTransport;
use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct Session<T: NetworkTransport> {
    engine: Arc<Mutex<Engine>>,
    transport: Arc<T>,
    gap_check_interval: Duration,
}

impl<T: NetworkTransport> Session<T> {
    pub fn new(engine: Engine, transport: Arc<T>) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
            transport,
            gap_check_interval: Duration::from_secs(1),
        }
    }

    pub fn with_gap_check_interval(mut self, interval: Duration) -> Self {
        self.gap_check_interval = interval;
        self
    }

    /// Shared handle to the engine.
    pub fn engine(&self) -> Arc<Mutex<Engine>> {
        self.engine.clone()
    }

    /// Run `f` with exclusive access to the engine.
    pub fn with_engine<R>(&self, f: impl FnOnce(&mut Engine) -> R) -> R {
        f(&mut self.engine.lock())
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Start the pump tasks. Takes the engine's outbound stream and the
    /// transport's inbound channel, so it can succeed only once.
    pub fn spawn(&self) -> Result<SessionHandle> {
        let mut outbound = self.engine.lock().outbound()?;
        let mut inbound = self
            .transport
            .subscribe()
            .map_err(|e| EngineError::Network(e.to_string()))?;
        let actor = self.engine.lock().actor().clone();
        info!(actor = %actor, "session started");

        let transport = self.transport.clone();
        let pump = tokio::spawn(async move {
            while let Some(message) = outbound.next().await {
                let frame = match message.encode() {
                    Ok(frame) => frame,
                    Err(err) => {
                        warn!(error = %err, "failed to encode outbound message");
                        continue;
                    }
                };
                if let Err(err) = transport.broadcast(frame).await {
                    warn!(error = %err, kind = message.kind(), "broadcast failed");
                }
            }
            debug!("outbound stream closed");
        });

        let engine = self.engine.clone();
        let interval = self.gap_check_interval;
        let receiver = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    received = inbound.recv() => {
                        let Some((peer, frame)) = received else {
                            debug!("inbound channel closed");
                            break;
                        };
                        let result = engine.lock().ingest(&frame);
                        if let Err(err) = result {
                            debug!(peer = %peer, error = %err, "inbound frame rejected");
                        }
                    }
                    _ = ticker.tick() => {
                        let gaps = engine.lock().expire_gaps(Instant::now());
                        if !gaps.is_empty() {
                            info!(count = gaps.len(), "causality gaps expired");
                        }
                    }
                }
            }
        });

        Ok(SessionHandle {
            tasks: vec![pump, receiver],
        })
    }

    /// Announce departure. The leave message goes out through the pump.
    pub fn leave(&self) {
        self.engine.lock().leave();
    }
}

/// Running session tasks.
pub struct SessionHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl SessionHandle {
    pub fn is_finished(&self) -> bool {
        self.tasks.iter().all(|t| t.is_finished())
    }

    /// Stop both tasks and wait for them to unwind.
    pub async fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
        for task in self.tasks {
            let _ = task.await;
        }
    }
}
