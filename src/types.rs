use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a catalog item ("skin").
///
/// Producers may send either a string or a number; both are normalised to the
/// string form used as the DynamoDB partition key suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> anyhow::Result<Self> {
        let id = id.into().trim().to_string();
        if id.is_empty() {
            anyhow::bail!("Item id must not be empty");
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ItemId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl<'de> Deserialize<'de> for ItemId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(u64),
        }

        let raw = match RawId::deserialize(deserializer)? {
            RawId::Text(s) => s,
            RawId::Number(n) => n.to_string(),
        };
        ItemId::new(raw).map_err(serde::de::Error::custom)
    }
}

/// The summary-bearing part of an item record.
/// PK="SKIN#{id}", SK="META"
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub id: ItemId,
    pub summary: String,
    /// `None` means the item has never been summarized. Doubles as the
    /// optimistic-concurrency fence for the write-back.
    pub summary_generated_at: Option<DateTime<Utc>>,
}

impl Item {
    pub fn new(id: ItemId) -> Self {
        Self {
            id,
            summary: String::new(),
            summary_generated_at: None,
        }
    }
}

/// Approval status stamped on comments and replies by the moderation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApprovalStatus {
    Approved,
    NeedsReview,
    Rejected,
}

impl ApprovalStatus {
    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved)
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Approved => write!(f, "approved"),
            Self::NeedsReview => write!(f, "needs-review"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

impl FromStr for ApprovalStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approved" => Ok(Self::Approved),
            "needs-review" => Ok(Self::NeedsReview),
            "rejected" => Ok(Self::Rejected),
            other => anyhow::bail!("Invalid approval status: {}", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub id: String,
    pub text: String,
    pub status: ApprovalStatus,
    pub created_at: DateTime<Utc>,
}

/// A top-level comment on an item.
/// PK="SKIN#{id}", SK="COMMENT#{created_at}#{comment_id}"
#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub id: String,
    pub text: String,
    pub status: ApprovalStatus,
    pub created_at: DateTime<Utc>,
    pub replies: Vec<Reply>,
}

/// Item record plus every comment it owns, read in one consistent query.
#[derive(Debug, Clone)]
pub struct ItemSnapshot {
    pub item: Item,
    pub comments: Vec<Comment>,
}
