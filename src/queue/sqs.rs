use super::{ReceivedTask, TaskQueue};
use crate::task::SummaryTask;
use anyhow::{Context, Result};
use aws_sdk_sqs::Client;
use aws_sdk_sqs::operation::delete_message::DeleteMessageError;
use aws_sdk_sqs::types::{MessageAttributeValue, MessageSystemAttributeName};
use std::time::Duration;
use tracing::{debug, warn};

const ITEM_ID_ATTRIBUTE: &str = "item_id";
// SQS hard limits.
const MAX_WAIT_TIME_SECS: u64 = 20;
const MAX_DELAY_SECS: u64 = 900;
const MAX_VISIBILITY_TIMEOUT_SECS: u64 = 43_200;

// ============================================================================
// SqsQueue — Amazon SQS implementation
// ============================================================================

pub struct SqsQueue {
    client: Client,
    queue_url: String,
    wait_time: Duration,
    visibility_timeout: Duration,
}

impl SqsQueue {
    pub fn new(client: Client, queue_url: String) -> Self {
        Self {
            client,
            queue_url,
            wait_time: Duration::from_secs(MAX_WAIT_TIME_SECS),
            visibility_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_wait_time(mut self, wait_time: Duration) -> Self {
        self.wait_time = wait_time;
        self
    }

    /// Must cover the slowest expected generator call, or tasks will be
    /// redelivered while still being processed.
    pub fn with_visibility_timeout(mut self, visibility_timeout: Duration) -> Self {
        self.visibility_timeout = visibility_timeout;
        self
    }
}

/// Errors meaning the receipt handle is no longer usable, typically because
/// the visibility timeout expired and the message was received again.
fn is_stale_receipt(err: &DeleteMessageError) -> bool {
    err.is_receipt_handle_is_invalid() || err.is_invalid_id_format()
}

fn clamp_secs(duration: Duration, max: u64) -> i32 {
    i32::try_from(duration.as_secs().min(max)).unwrap_or(i32::MAX)
}

impl TaskQueue for SqsQueue {
    async fn enqueue(&self, task: &SummaryTask, delay: Duration) -> Result<String> {
        let item_id_attribute = MessageAttributeValue::builder()
            .data_type("String")
            .string_value(task.item_id.as_str())
            .build()
            .context("Failed to build item_id message attribute")?;

        let output = self
            .client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(task.to_body()?)
            .delay_seconds(clamp_secs(delay, MAX_DELAY_SECS))
            .message_attributes(ITEM_ID_ATTRIBUTE, item_id_attribute)
            .send()
            .await
            .with_context(|| format!("Failed to send summary task for item {}", task.item_id))?;

        Ok(output.message_id().unwrap_or_default().to_string())
    }

    async fn receive(&self, max_messages: i32) -> Result<Vec<ReceivedTask>> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(max_messages.clamp(1, 10))
            .wait_time_seconds(clamp_secs(self.wait_time, MAX_WAIT_TIME_SECS))
            .visibility_timeout(clamp_secs(self.visibility_timeout, MAX_VISIBILITY_TIMEOUT_SECS))
            .message_system_attribute_names(MessageSystemAttributeName::ApproximateReceiveCount)
            .send()
            .await
            .context("Failed to receive messages")?;

        let mut received = Vec::new();
        for message in output.messages.unwrap_or_default() {
            let message_id = message.message_id.unwrap_or_default();
            let Some(receipt_handle) = message.receipt_handle else {
                warn!(message_id = %message_id, "Received message without receipt handle");
                continue;
            };
            let receive_count = message
                .attributes
                .as_ref()
                .and_then(|attrs| attrs.get(&MessageSystemAttributeName::ApproximateReceiveCount))
                .and_then(|count| count.parse::<u32>().ok())
                .unwrap_or(1);

            received.push(ReceivedTask {
                message_id,
                receipt_handle,
                body: message.body.unwrap_or_default(),
                receive_count,
            });
        }

        debug!(count = received.len(), "Received messages");
        Ok(received)
    }

    async fn delete(&self, receipt_handle: &str) -> Result<()> {
        let result = self
            .client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if err.as_service_error().is_some_and(is_stale_receipt) => {
                warn!(error = %err, "Receipt handle no longer valid; message may be redelivered");
                Ok(())
            }
            Err(err) => Err(err).context("Failed to delete message"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_sqs::types::error::{InvalidIdFormat, QueueDoesNotExist, ReceiptHandleIsInvalid};

    #[test]
    fn expired_or_invalid_receipt_is_stale() {
        let expired = DeleteMessageError::ReceiptHandleIsInvalid(
            ReceiptHandleIsInvalid::builder()
                .message("The receipt handle has expired")
                .build(),
        );
        assert!(is_stale_receipt(&expired));

        let malformed = DeleteMessageError::InvalidIdFormat(InvalidIdFormat::builder().build());
        assert!(is_stale_receipt(&malformed));
    }

    #[test]
    fn missing_queue_is_not_stale_receipt() {
        let err = DeleteMessageError::QueueDoesNotExist(
            QueueDoesNotExist::builder()
                .message("The specified queue does not exist")
                .build(),
        );
        assert!(!is_stale_receipt(&err));
    }

    #[test]
    fn clamp_secs_respects_sqs_limits() {
        assert_eq!(clamp_secs(Duration::from_secs(15), MAX_DELAY_SECS), 15);
        assert_eq!(clamp_secs(Duration::from_secs(3600), MAX_DELAY_SECS), 900);
        assert_eq!(clamp_secs(Duration::from_secs(45), MAX_WAIT_TIME_SECS), 20);
        assert_eq!(clamp_secs(Duration::from_millis(900), MAX_WAIT_TIME_SECS), 0);
    }
}
