use bakery_core::contract::{message_deduplication_id, message_group_id, BatchPayload};

pub trait BatchDispatcher {
    /// Enqueue one serialized batch. Batches sharing a group id must be
    /// delivered in enqueue order.
    fn dispatch_batch(&self, group_id: &str, deduplication_id: &str, body: &[u8]) -> Result<(), String>;
}

/// Queue ids for a batch: grouped by target store, deduplicated per batch.
pub fn queue_ids(payload: &BatchPayload) -> (String, String) {
    (
        message_group_id(&payload.target),
        message_deduplication_id(&payload.run_id, payload.batch_id),
    )
}

/// FIFO SQS queue; one message group per target store.
#[derive(Clone)]
pub struct SqsDispatcher {
    client: aws_sdk_sqs::Client,
    queue_url: String,
}

impl SqsDispatcher {
    pub fn new(client: aws_sdk_sqs::Client, queue_url: impl Into<String>) -> Self {
        Self {
            client,
            queue_url: queue_url.into(),
        }
    }
}

impl BatchDispatcher for SqsDispatcher {
    fn dispatch_batch(&self, group_id: &str, deduplication_id: &str, body: &[u8]) -> Result<(), String> {
        let body = String::from_utf8(body.to_vec())
            .map_err(|error| format!("invalid UTF-8 batch payload: {error}"))?;
        let client = self.client.clone();
        let queue_url = self.queue_url.clone();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                client
                    .send_message()
                    .queue_url(queue_url)
                    .message_body(body)
                    .message_group_id(group_id)
                    .message_deduplication_id(deduplication_id)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|error| format!("failed to enqueue batch message: {error}"))
            })
        })
    }
}
