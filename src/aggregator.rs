use crate::types::Comment;
use chrono::{DateTime, Utc};

pub const MAX_AGGREGATED_COMMENTS: usize = 400;

/// Flatten the approved comments and replies newer than `cutoff` into one
/// chronologically ordered list of texts.
///
/// Replies are collected from every comment, not only the post-cutoff ones,
/// because a reply can be newer than its parent. When more than `limit`
/// entries qualify, the most recent `limit` are kept.
pub fn eligible_comment_texts(
    comments: &[Comment],
    cutoff: Option<DateTime<Utc>>,
    limit: usize,
) -> Vec<String> {
    let is_new = |created_at: DateTime<Utc>| cutoff.is_none_or(|c| created_at > c);

    let top_level = comments
        .iter()
        .filter(|c| c.status.is_approved() && is_new(c.created_at))
        .map(|c| (c.created_at, c.text.as_str()));

    let replies = comments
        .iter()
        .flat_map(|c| c.replies.iter())
        .filter(|r| r.status.is_approved() && is_new(r.created_at))
        .map(|r| (r.created_at, r.text.as_str()));

    let mut entries: Vec<(DateTime<Utc>, &str)> = top_level
        .chain(replies)
        .filter(|(_, text)| !text.trim().is_empty())
        .collect();
    entries.sort_by_key(|(created_at, _)| *created_at);

    let skip = entries.len().saturating_sub(limit);
    entries
        .into_iter()
        .skip(skip)
        .map(|(_, text)| text.to_string())
        .collect()
}
