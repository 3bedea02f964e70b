//! Progress reporting to the caller

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::deploy::fsm::{DeploymentEvent, DeploymentFsm, DeploymentState};

/// Receives short human-readable progress messages.
///
/// Each call is awaited before the flow continues.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn notify(&self, message: &str);
}

/// Writes progress to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

#[async_trait]
impl ProgressSink for LogProgress {
    async fn notify(&self, message: &str) {
        info!(progress = true, "{}", message);
    }
}

/// Forwards progress over a channel, e.g. to a chat front end
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    sender: mpsc::UnboundedSender<String>,
}

impl ChannelProgress {
    pub fn new(sender: mpsc::UnboundedSender<String>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl ProgressSink for ChannelProgress {
    async fn notify(&self, message: &str) {
        // The receiver going away must not stop a deployment.
        let _ = self.sender.send(message.to_string());
    }
}

/// Drives the flow's state machine and tells the sink about each step
pub struct Reporter<'a> {
    sink: &'a dyn ProgressSink,
    fsm: Mutex<DeploymentFsm>,
}

impl<'a> Reporter<'a> {
    pub fn new(sink: &'a dyn ProgressSink) -> Self {
        Self {
            sink,
            fsm: Mutex::new(DeploymentFsm::new()),
        }
    }

    /// Transition to the state for `event` and send `message`
    pub async fn enter(&self, event: DeploymentEvent, message: &str) {
        {
            let mut fsm = self.fsm.lock().unwrap_or_else(|e| e.into_inner());
            if let Err(e) = fsm.process(event) {
                warn!("{}", e);
            }
        }
        self.sink.notify(message).await;
    }

    /// Send a message without changing state
    pub async fn notify(&self, message: &str) {
        self.sink.notify(message).await;
    }

    pub fn state(&self) -> DeploymentState {
        self.fsm.lock().unwrap_or_else(|e| e.into_inner()).state()
    }

    /// Consume the reporter, returning the final state machine
    pub fn into_fsm(self) -> DeploymentFsm {
        self.fsm.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}
