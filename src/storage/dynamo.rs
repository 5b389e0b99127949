use super::{CommitOutcome, Storage};
use crate::types::{ApprovalStatus, Comment, Item, ItemId, ItemSnapshot, Reply};
use anyhow::{Context, Result};
use aws_sdk_dynamodb::{Client, types::AttributeValue};
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::HashMap;
use tracing::warn;

const ITEM_PARTITION_KEY_PREFIX: &str = "SKIN";
const META_SORT_KEY: &str = "META";
const COMMENT_SORT_KEY_PREFIX: &str = "COMMENT#";

// ============================================================================
// DynamoStorage — DynamoDB-backed Storage implementation
// ============================================================================

pub struct DynamoStorage {
    client: Client,
    table_name: String,
}

impl DynamoStorage {
    pub fn new(client: Client, table_name: String) -> Self {
        Self { client, table_name }
    }
}

impl Storage for DynamoStorage {
    async fn load_snapshot(&self, item_id: &ItemId) -> Result<Option<ItemSnapshot>> {
        let mut records = Vec::new();
        let mut exclusive_start_key = None;

        // The item record and its comments share a partition, so one strongly
        // consistent query reads both.
        loop {
            let mut req = self
                .client
                .query()
                .table_name(&self.table_name)
                .consistent_read(true)
                .key_condition_expression("PK = :pk")
                .expression_attribute_values(":pk", AttributeValue::S(item_pk(item_id)));

            if let Some(start_key) = exclusive_start_key {
                req = req.set_exclusive_start_key(Some(start_key));
            }

            let output = req
                .send()
                .await
                .with_context(|| format!("Failed to query partition for item {}", item_id))?;

            records.extend(output.items.unwrap_or_default());

            exclusive_start_key = output.last_evaluated_key;
            if exclusive_start_key.is_none() {
                break;
            }
        }

        snapshot_from_records(item_id, &records)
    }

    async fn commit_summary(
        &self,
        item_id: &ItemId,
        expected: Option<DateTime<Utc>>,
        summary: &str,
        generated_at: DateTime<Utc>,
    ) -> Result<CommitOutcome> {
        let mut req = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key("PK", AttributeValue::S(item_pk(item_id)))
            .key("SK", AttributeValue::S(META_SORT_KEY.to_string()))
            .update_expression("SET summary = :summary, summary_generated_at = :generated_at")
            .expression_attribute_values(":summary", AttributeValue::S(summary.to_string()))
            .expression_attribute_values(
                ":generated_at",
                AttributeValue::S(format_timestamp(generated_at)),
            );

        let (condition, values) = fence_condition(expected);
        req = req.condition_expression(condition);
        for (name, value) in values {
            req = req.expression_attribute_values(name, value);
        }

        match req.send().await {
            Ok(_) => Ok(CommitOutcome::Committed),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_conditional_check_failed_exception()) =>
            {
                Ok(CommitOutcome::FenceMismatch)
            }
            Err(err) => {
                Err(err).with_context(|| format!("Failed to commit summary for item {}", item_id))
            }
        }
    }

    /// Full table scan: comment rows are read and filtered out server side,
    /// so cost grows with the comment count, not the item count. A sparse
    /// GSI over META rows would avoid that once the catalog gets large.
    async fn list_item_ids(&self) -> Result<Vec<ItemId>> {
        let mut ids = Vec::new();
        let mut exclusive_start_key = None;

        loop {
            let mut req = self
                .client
                .scan()
                .table_name(&self.table_name)
                .filter_expression("SK = :meta")
                .projection_expression("PK")
                .expression_attribute_values(":meta", AttributeValue::S(META_SORT_KEY.to_string()));

            if let Some(start_key) = exclusive_start_key {
                req = req.set_exclusive_start_key(Some(start_key));
            }

            let output = req.send().await.context("Failed to scan item ids")?;

            for record in output.items.unwrap_or_default() {
                let pk = required_s(&record, "PK")?;
                ids.push(item_id_from_pk(pk)?);
            }

            exclusive_start_key = output.last_evaluated_key;
            if exclusive_start_key.is_none() {
                break;
            }
        }

        Ok(ids)
    }
}

// ============================================================================
// Serialization helpers
// ============================================================================

/// Condition expression for the fenced summary write. A never-summarized
/// item may store the fence as absent or as an explicit NULL.
fn fence_condition(
    expected: Option<DateTime<Utc>>,
) -> (&'static str, Vec<(&'static str, AttributeValue)>) {
    match expected {
        Some(previous) => (
            "summary_generated_at = :expected",
            vec![(":expected", AttributeValue::S(format_timestamp(previous)))],
        ),
        None => (
            "attribute_exists(PK) AND (attribute_not_exists(summary_generated_at) \
             OR attribute_type(summary_generated_at, :null_type))",
            vec![(":null_type", AttributeValue::S("NULL".to_string()))],
        ),
    }
}

/// Assemble a snapshot from every record in an item's partition.
///
/// A comment record that cannot be decoded is logged and skipped, so one bad
/// row does not block the item's summaries. An unreadable META record still
/// fails the read.
fn snapshot_from_records(
    item_id: &ItemId,
    records: &[HashMap<String, AttributeValue>],
) -> Result<Option<ItemSnapshot>> {
    let mut item = None;
    let mut comments = Vec::new();

    for record in records {
        match record.get("SK").and_then(|v| v.as_s().ok()).map(String::as_str) {
            Some(META_SORT_KEY) => item = Some(item_from_record(item_id, record)?),
            Some(sk) if sk.starts_with(COMMENT_SORT_KEY_PREFIX) => {
                match comment_from_record(record) {
                    Ok(comment) => comments.push(comment),
                    Err(e) => {
                        let comment_id = record
                            .get("comment_id")
                            .and_then(|v| v.as_s().ok())
                            .map(String::as_str)
                            .unwrap_or("<missing>");
                        warn!(
                            item_id = %item_id,
                            sort_key = sk,
                            comment_id,
                            error = %format!("{:#}", e),
                            "Skipping unreadable comment record"
                        );
                    }
                }
            }
            _ => {}
        }
    }

    Ok(item.map(|item| ItemSnapshot { item, comments }))
}

fn item_pk(item_id: &ItemId) -> String {
    format!("{}#{}", ITEM_PARTITION_KEY_PREFIX, item_id)
}

fn item_id_from_pk(pk: &str) -> Result<ItemId> {
    let raw = pk
        .strip_prefix(ITEM_PARTITION_KEY_PREFIX)
        .and_then(|rest| rest.strip_prefix('#'))
        .ok_or_else(|| anyhow::anyhow!("Unexpected partition key: {}", pk))?;
    ItemId::new(raw)
}

/// Timestamps are written with a fixed precision so that the stored string
/// compares equal to a re-formatted copy in the commit condition.
pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str, field: &str) -> Result<DateTime<Utc>> {
    value
        .parse::<DateTime<Utc>>()
        .with_context(|| format!("Invalid {} timestamp", field))
}

fn required_s<'a>(record: &'a HashMap<String, AttributeValue>, field: &str) -> Result<&'a str> {
    record
        .get(field)
        .and_then(|v| v.as_s().ok())
        .map(String::as_str)
        .ok_or_else(|| anyhow::anyhow!("Missing {} field", field))
}

pub(crate) fn item_from_record(
    item_id: &ItemId,
    record: &HashMap<String, AttributeValue>,
) -> Result<Item> {
    let summary = record
        .get("summary")
        .and_then(|v| v.as_s().ok())
        .cloned()
        .unwrap_or_default();

    let summary_generated_at = match record.get("summary_generated_at") {
        None | Some(AttributeValue::Null(_)) => None,
        Some(AttributeValue::S(s)) => Some(parse_timestamp(s, "summary_generated_at")?),
        Some(other) => anyhow::bail!(
            "Unexpected summary_generated_at type for item {}: {:?}",
            item_id,
            other
        ),
    };

    Ok(Item {
        id: item_id.clone(),
        summary,
        summary_generated_at,
    })
}

pub(crate) fn comment_from_record(record: &HashMap<String, AttributeValue>) -> Result<Comment> {
    let id = required_s(record, "comment_id")?.to_string();
    let text = required_s(record, "text")?.to_string();
    let status = required_s(record, "status")?
        .parse::<ApprovalStatus>()
        .context("Invalid comment status")?;
    let created_at = parse_timestamp(required_s(record, "created_at")?, "created_at")?;

    // Bad replies are dropped individually; the comment itself still counts.
    let replies = match record.get("replies") {
        Some(AttributeValue::L(list)) => list
            .iter()
            .filter_map(|av| {
                let parsed = match av {
                    AttributeValue::M(map) => reply_from_map(map),
                    _ => Err(anyhow::anyhow!("Reply entry is not a map")),
                };
                parsed
                    .inspect_err(|e| {
                        warn!(
                            comment_id = %id,
                            error = %format!("{:#}", e),
                            "Skipping unreadable reply"
                        );
                    })
                    .ok()
            })
            .collect(),
        Some(AttributeValue::Null(_)) | None => Vec::new(),
        Some(_) => {
            warn!(comment_id = %id, "Replies attribute is not a list, ignoring");
            Vec::new()
        }
    };

    Ok(Comment {
        id,
        text,
        status,
        created_at,
        replies,
    })
}

fn reply_from_map(map: &HashMap<String, AttributeValue>) -> Result<Reply> {
    Ok(Reply {
        id: required_s(map, "reply_id")?.to_string(),
        text: required_s(map, "text")?.to_string(),
        status: required_s(map, "status")?
            .parse::<ApprovalStatus>()
            .context("Invalid reply status")?,
        created_at: parse_timestamp(required_s(map, "created_at")?, "created_at")?,
    })
}

// ============================================================================
// Tests — DynamoDB serialization helpers (no network required)
// ============================================================================
