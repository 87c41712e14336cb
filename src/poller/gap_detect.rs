//! Gap detection (spec 4.6 step 1d): given the last checkpointed sequence
//! id and the sequence of `(seq_id, timestamp_ms)` pairs a poll returned,
//! find every maximal missing run - but only report a run once every
//! record after it is older than `now - grace` (spec 9: the agent's own
//! storage timestamp lags sample capture, so a gap near the front of the
//! window is probably just late, not lost).

use chrono::{DateTime, Utc};

use crate::checkpoint::gap::GapRange;

/// `last_seq_id` is the checkpoint's high-water mark before this poll
/// (0 if there was none); `records` must be sorted ascending by `seq_id`
/// the way every typed poller's RPC response already is.
pub fn detect_gaps(
    last_seq_id: u64,
    records: &[(u64, DateTime<Utc>)],
    now: DateTime<Utc>,
    grace: chrono::Duration,
) -> Vec<GapRange> {
    let cutoff = now - grace;
    let mut gaps = Vec::new();
    let mut expected = last_seq_id + 1;

    for (seq_id, timestamp) in records {
        if *seq_id > expected {
            // candidate gap (expected..seq_id-1); only report it if every
            // record after it is past the grace cutoff, i.e. this record
            // itself (the one that revealed the gap) is old enough.
            if *timestamp < cutoff {
                gaps.push(GapRange { start: expected, end: seq_id - 1 });
            }
        }
        expected = seq_id + 1;
    }

    gaps
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn ts(secs_ago: i64, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::seconds(secs_ago)
    }

    /// Property 4: for `[1..N] \ M` with all timestamps older than grace,
    /// returns exactly the maximal missing runs.
    #[test]
    fn detects_exactly_the_missing_runs_when_past_grace() {
        let now = Utc::now();
        let records = vec![
            (1, ts(100, now)),
            (2, ts(100, now)),
            (3, ts(100, now)),
            (5, ts(100, now)),
            (6, ts(100, now)),
        ];
        let gaps = detect_gaps(0, &records, now, Duration::seconds(10));
        assert_eq!(gaps, vec![GapRange { start: 4, end: 4 }]);
    }

    /// Property 4's other half: missing runs inside the grace period are
    /// not reported yet.
    #[test]
    fn does_not_report_gaps_within_grace_period() {
        let now = Utc::now();
        let records = vec![(1, ts(100, now)), (2, ts(100, now)), (5, ts(2, now))];
        let gaps = detect_gaps(0, &records, now, Duration::seconds(10));
        assert!(gaps.is_empty());
    }

    #[test]
    fn multiple_maximal_runs_are_each_reported() {
        let now = Utc::now();
        let records = vec![
            (1, ts(100, now)),
            (4, ts(100, now)),
            (5, ts(100, now)),
            (9, ts(100, now)),
        ];
        let gaps = detect_gaps(0, &records, now, Duration::seconds(10));
        assert_eq!(
            gaps,
            vec![GapRange { start: 2, end: 3 }, GapRange { start: 6, end: 8 }]
        );
    }

    #[test]
    fn continuous_sequence_has_no_gaps() {
        let now = Utc::now();
        let records: Vec<_> = (1..=5).map(|s| (s, ts(100, now))).collect();
        assert!(detect_gaps(0, &records, now, Duration::seconds(10)).is_empty());
    }

    /// S3: agent responds with seqs [1,2,3,5,6] all at t-30s, checkpoint
    /// starts at 0. Expect one gap (4,4).
    #[test]
    fn s3_gap_recovery_seed_scenario() {
        let now = Utc::now();
        let records = vec![
            (1, ts(30, now)),
            (2, ts(30, now)),
            (3, ts(30, now)),
            (5, ts(30, now)),
            (6, ts(30, now)),
        ];
        let gaps = detect_gaps(0, &records, now, Duration::seconds(10));
        assert_eq!(gaps, vec![GapRange { start: 4, end: 4 }]);
    }

    #[test]
    fn resumes_from_existing_checkpoint() {
        let now = Utc::now();
        let records = vec![(12, ts(100, now)), (13, ts(100, now))];
        // checkpoint at 10 means 11 is expected first; no gap here
        assert!(detect_gaps(10, &records, now, Duration::seconds(10)).is_empty());
    }

    #[test]
    fn gap_immediately_after_checkpoint_is_detected() {
        let now = Utc::now();
        let records = vec![(13, ts(100, now))];
        let gaps = detect_gaps(10, &records, now, Duration::seconds(10));
        assert_eq!(gaps, vec![GapRange { start: 11, end: 12 }]);
    }
}
