use chrono::{DateTime, Duration, Utc};

const COMMENT_THRESHOLD: usize = 5;
const STALE_AFTER_DAYS: i64 = 7;

/// Decides when an item's summary should be regenerated.
///
/// Two triggers: enough new comments piled up, or the summary is stale (or
/// missing) and at least one new comment exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerPolicy {
    pub comment_threshold: usize,
    pub stale_after: Duration,
}

impl Default for TriggerPolicy {
    fn default() -> Self {
        Self {
            comment_threshold: COMMENT_THRESHOLD,
            stale_after: Duration::days(STALE_AFTER_DAYS),
        }
    }
}

impl TriggerPolicy {
    pub fn should_summarize(
        &self,
        last_summarized_at: Option<DateTime<Utc>>,
        new_comment_count: usize,
        now: DateTime<Utc>,
    ) -> bool {
        if new_comment_count >= self.comment_threshold {
            return true;
        }
        if new_comment_count == 0 {
            return false;
        }
        match last_summarized_at {
            None => true,
            Some(last) => now - last >= self.stale_after,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> TriggerPolicy {
        TriggerPolicy::default()
    }

    #[test]
    fn threshold_boundary_with_fresh_summary() {
        let now = Utc::now();
        assert!(!policy().should_summarize(Some(now), 4, now));
        assert!(policy().should_summarize(Some(now), 5, now));
    }

    #[test]
    fn staleness_boundary() {
        let now = Utc::now();
        assert!(policy().should_summarize(Some(now - Duration::days(8)), 1, now));
        assert!(!policy().should_summarize(Some(now - Duration::days(6)), 2, now));

        let almost = now - (Duration::days(7) - Duration::hours(2)); // ~6.9 days
        assert!(!policy().should_summarize(Some(almost), 1, now));
        assert!(policy().should_summarize(Some(now - Duration::days(7)), 1, now));
    }

    #[test]
    fn stale_summary_without_new_comments_is_left_alone() {
        let now = Utc::now();
        assert!(!policy().should_summarize(Some(now - Duration::days(30)), 0, now));
    }

    #[test]
    fn cold_start() {
        let now = Utc::now();
        assert!(policy().should_summarize(None, 1, now));
        assert!(!policy().should_summarize(None, 0, now));
    }

    #[test]
    fn monotonic_in_comment_count() {
        let now = Utc::now();
        let lasts = [
            None,
            Some(now),
            Some(now - Duration::hours(2)),
            Some(now - Duration::days(6)),
            Some(now - Duration::days(7)),
            Some(now - Duration::days(40)),
        ];
        for last in lasts {
            let mut fired = false;
            for count in 0..20 {
                let decision = policy().should_summarize(last, count, now);
                assert!(
                    !(fired && !decision),
                    "flipped back to false at count {count} for {last:?}"
                );
                fired |= decision;
            }
            assert!(fired);
        }
    }
}
