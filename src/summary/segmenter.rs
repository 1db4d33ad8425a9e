use crate::config::CqConfig;
use crate::records::Record;

/// Splits an ordered record stream into raw attempts.
///
/// An attempt opens at a record tagged with the start tag and closes at a
/// record tagged with the stop tag; both boundary records belong to it. A
/// trailing attempt without a stop is kept. Records outside any attempt are
/// dropped, except that a stream with no start tag at all is treated as a
/// single attempt (older records carried no boundaries).
pub fn split_attempts<'a>(records: &'a [Record], config: &CqConfig) -> Vec<&'a [Record]> {
    if records.is_empty() {
        return Vec::new();
    }

    if !records.iter().any(|r| r.has_tag(&config.tag_start)) {
        return vec![records];
    }

    let mut attempts = Vec::new();
    let mut open_at: Option<usize> = None;

    for (index, record) in records.iter().enumerate() {
        if open_at.is_none() && record.has_tag(&config.tag_start) {
            open_at = Some(index);
        }
        if let Some(start) = open_at {
            if record.has_tag(&config.tag_stop) {
                attempts.push(&records[start..=index]);
                open_at = None;
            }
        }
    }

    if let Some(start) = open_at {
        attempts.push(&records[start..]);
    }

    attempts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{at, record};

    fn tagged(seconds: i64, tags: &[&str]) -> Record {
        let mut r = record(at(seconds), None, None);
        r.tags = tags.iter().map(|t| (*t).to_string()).collect();
        r
    }

    fn timestamps(attempt: &[Record]) -> Vec<i64> {
        attempt.iter().map(|r| r.timestamp.timestamp()).collect()
    }

    const START: &str = "action=patch_start";
    const STOP: &str = "action=patch_stop";

    #[test]
    fn empty_stream_has_no_attempts() {
        assert!(split_attempts(&[], &CqConfig::default()).is_empty());
    }

    #[test]
    fn stream_without_start_is_one_attempt() {
        let records = vec![tagged(1, &[]), tagged(2, &[STOP]), tagged(3, &[])];
        let attempts = split_attempts(&records, &CqConfig::default());

        assert_eq!(attempts.len(), 1);
        assert_eq!(timestamps(attempts[0]), vec![1, 2, 3]);
    }

    #[test]
    fn boundaries_are_included_and_gaps_dropped() {
        let records = vec![
            tagged(1, &[]),
            tagged(2, &[START]),
            tagged(3, &[]),
            tagged(4, &[STOP]),
            tagged(5, &[]),
            tagged(6, &[START]),
            tagged(7, &[STOP]),
        ];
        let attempts = split_attempts(&records, &CqConfig::default());

        assert_eq!(attempts.len(), 2);
        assert_eq!(timestamps(attempts[0]), vec![2, 3, 4]);
        assert_eq!(timestamps(attempts[1]), vec![6, 7]);
    }

    #[test]
    fn repeated_start_inside_attempt_does_not_split() {
        let records = vec![
            tagged(1, &[START]),
            tagged(2, &[START]),
            tagged(3, &[STOP]),
        ];
        let attempts = split_attempts(&records, &CqConfig::default());

        assert_eq!(attempts.len(), 1);
        assert_eq!(timestamps(attempts[0]), vec![1, 2, 3]);
    }

    #[test]
    fn trailing_open_attempt_is_kept() {
        let records = vec![
            tagged(1, &[START]),
            tagged(2, &[STOP]),
            tagged(3, &[START]),
            tagged(4, &[]),
        ];
        let attempts = split_attempts(&records, &CqConfig::default());

        assert_eq!(attempts.len(), 2);
        assert_eq!(timestamps(attempts[1]), vec![3, 4]);
    }

    #[test]
    fn record_with_both_tags_is_a_single_record_attempt() {
        let records = vec![tagged(1, &[START, STOP]), tagged(2, &[])];
        let attempts = split_attempts(&records, &CqConfig::default());

        assert_eq!(attempts.len(), 1);
        assert_eq!(timestamps(attempts[0]), vec![1]);
    }
}
