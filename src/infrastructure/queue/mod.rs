use async_trait::async_trait;

pub mod memory;
pub mod rabbitmq;

/// At-least-once work queue. Payloads are opaque bytes.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn publish(&self, queue: &str, payload: &[u8]) -> anyhow::Result<()>;
}

/// Queue that receives deliveries the consumer rejected.
pub fn dead_letter_queue(queue: &str) -> String {
    format!("{}.dead", queue)
}
