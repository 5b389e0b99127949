//! The summarization task carried as a queue message body.
//!
//! Wire shape (JSON):
//!
//! ```json
//! { "schema": "summary-task/v1", "itemId": "123", "triggerType": "new-comment",
//!   "enqueuedAt": "2024-01-01T00:00:00Z" }
//! ```

use crate::types::ItemId;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

pub const TASK_SCHEMA_V1: &str = "summary-task/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerType {
    NewComment,
    ScheduledCheck,
    AdHoc,
}

impl FromStr for TriggerType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new-comment" => Ok(Self::NewComment),
            "scheduled-check" => Ok(Self::ScheduledCheck),
            "ad-hoc" => Ok(Self::AdHoc),
            other => anyhow::bail!("Invalid trigger type: {}", other),
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NewComment => write!(f, "new-comment"),
            Self::ScheduledCheck => write!(f, "scheduled-check"),
            Self::AdHoc => write!(f, "ad-hoc"),
        }
    }
}

impl Serialize for TriggerType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TriggerType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        TriggerType::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SummaryTask {
    schema: String,
    pub item_id: ItemId,
    pub trigger_type: TriggerType,
    pub enqueued_at: DateTime<Utc>,
}

impl SummaryTask {
    pub fn new(item_id: ItemId, trigger_type: TriggerType) -> Self {
        Self {
            schema: TASK_SCHEMA_V1.to_string(),
            item_id,
            trigger_type,
            enqueued_at: Utc::now(),
        }
    }

    pub fn to_body(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to encode summary task")
    }

    /// Decode and validate a message body. Anything that is not a v1 task is
    /// rejected rather than guessed at.
    pub fn from_body(body: &str) -> Result<Self> {
        let task: SummaryTask =
            serde_json::from_str(body).context("Message body is not a summary task")?;
        if task.schema != TASK_SCHEMA_V1 {
            anyhow::bail!("Unsupported task schema: {}", task.schema);
        }
        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_camel_case_wire_shape() {
        let task = SummaryTask::new(ItemId::new("7").unwrap(), TriggerType::ScheduledCheck);
        let value: serde_json::Value = serde_json::from_str(&task.to_body().unwrap()).unwrap();
        assert_eq!(value["schema"], TASK_SCHEMA_V1);
        assert_eq!(value["itemId"], "7");
        assert_eq!(value["triggerType"], "scheduled-check");
        assert!(value["enqueuedAt"].is_string());
    }

    #[test]
    fn decodes_numeric_item_id() {
        let body = r#"{"schema":"summary-task/v1","itemId":981,"triggerType":"new-comment","enqueuedAt":"2024-05-01T10:00:00Z"}"#;
        let task = SummaryTask::from_body(body).unwrap();
        assert_eq!(task.item_id.as_str(), "981");
        assert_eq!(task.trigger_type, TriggerType::NewComment);
    }

    #[test]
    fn rejects_unknown_schema() {
        let body = r#"{"schema":"summary-task/v9","itemId":"1","triggerType":"ad-hoc","enqueuedAt":"2024-05-01T10:00:00Z"}"#;
        let err = SummaryTask::from_body(body).unwrap_err().to_string();
        assert!(err.contains("Unsupported task schema"));
    }

    #[test]
    fn rejects_missing_schema_and_garbage() {
        let legacy = r#"{"itemId":"1","triggerType":"ad-hoc","enqueuedAt":"2024-05-01T10:00:00Z"}"#;
        assert!(SummaryTask::from_body(legacy).is_err());
        assert!(SummaryTask::from_body("not json").is_err());
        let bad_trigger = r#"{"schema":"summary-task/v1","itemId":"1","triggerType":"hourly","enqueuedAt":"2024-05-01T10:00:00Z"}"#;
        assert!(SummaryTask::from_body(bad_trigger).is_err());
    }

    #[test]
    fn trigger_type_display_parses_back() {
        for trigger in [
            TriggerType::NewComment,
            TriggerType::ScheduledCheck,
            TriggerType::AdHoc,
        ] {
            assert_eq!(trigger.to_string().parse::<TriggerType>().unwrap(), trigger);
        }
    }
}
