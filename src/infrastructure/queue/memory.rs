use super::TaskQueue;
use anyhow::{anyhow, Result};
use async_channel::{Receiver, Sender};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

/// In-process stand-in for the broker, one unbounded channel per queue name.
/// Nothing survives a restart and there is no redelivery.
#[derive(Default)]
pub struct MemoryQueue {
    channels: Mutex<HashMap<String, (Sender<Vec<u8>>, Receiver<Vec<u8>>)>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    async fn channel(&self, queue: &str) -> (Sender<Vec<u8>>, Receiver<Vec<u8>>) {
        self.channels
            .lock()
            .await
            .entry(queue.to_string())
            .or_insert_with(async_channel::unbounded)
            .clone()
    }

    /// Receivers share the queue; each message goes to exactly one of them.
    pub async fn subscribe(&self, queue: &str) -> Receiver<Vec<u8>> {
        self.channel(queue).await.1
    }
}

#[async_trait]
impl TaskQueue for MemoryQueue {
    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<()> {
        let (sender, _) = self.channel(queue).await;
        sender
            .send(payload.to_vec())
            .await
            .map_err(|e| anyhow!("In-memory queue {} is closed: {}", queue, e))?;

        debug!(queue, bytes = payload.len(), "Published to in-memory queue");
        Ok(())
    }
}
