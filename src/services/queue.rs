//! Background analysis queue
//!
//! Comment intake pushes IDs onto a bounded channel; a single worker task
//! runs the moderation pipeline for each. Enqueueing never blocks: when the
//! channel is full the job is dropped and the cleanup sweep analyzes the
//! comment later.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::moderation::ModerationService;

#[derive(Clone)]
pub struct AnalysisQueue {
    sender: mpsc::Sender<i64>,
}

impl AnalysisQueue {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<i64>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Queue a comment for analysis. Returns false when the job was dropped.
    pub fn enqueue(&self, comment_id: i64) -> bool {
        match self.sender.try_send(comment_id) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(comment_id, "Analysis queue full, leaving comment for the cleanup sweep");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!(comment_id, "Analysis worker stopped, leaving comment for the cleanup sweep");
                false
            }
        }
    }
}

/// Spawn the worker consuming `receiver` until every sender is dropped
pub fn spawn_worker(mut receiver: mpsc::Receiver<i64>, moderation: Arc<ModerationService>) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("Analysis worker started");
        while let Some(comment_id) = receiver.recv().await {
            if let Err(e) = moderation.process(comment_id).await {
                tracing::error!(comment_id, "Moderation pipeline failed: {}", e);
            }
        }
        tracing::info!("Analysis worker stopped");
    })
}
