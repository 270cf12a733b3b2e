//! FIFO-capped sequences.
//!
//! Every persisted list (loop history, results, session archive, tracked
//! changes, task updates) goes through `push_capped` so eviction is
//! identical everywhere.

/// Default cap for archived loop summaries.
pub const HISTORY_CAP: usize = 10;
/// Default cap for archived sessions.
pub const SESSION_HISTORY_CAP: usize = 20;
/// Default cap for the tracked file-change log.
pub const TRACKED_CHANGES_CAP: usize = 100;
/// Default cap for the task update log.
pub const TASK_UPDATES_CAP: usize = 100;
/// Default cap for recorded iteration results.
pub const RESULTS_CAP: usize = 50;

/// Caps applied to each persisted sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub history_cap: usize,
    pub results_cap: usize,
    pub session_history_cap: usize,
    pub tracked_changes_cap: usize,
    pub task_updates_cap: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            history_cap: HISTORY_CAP,
            results_cap: RESULTS_CAP,
            session_history_cap: SESSION_HISTORY_CAP,
            tracked_changes_cap: TRACKED_CHANGES_CAP,
            task_updates_cap: TASK_UPDATES_CAP,
        }
    }
}

/// Append `item`, then drop the oldest entries until `items.len() <= cap`.
///
/// A cap of zero is treated as one; the newest entry is always kept.
pub fn push_capped<T>(items: &mut Vec<T>, item: T, cap: usize) {
    items.push(item);
    truncate_oldest(items, cap);
}

/// Drop the oldest entries so at most `cap` remain.
pub fn truncate_oldest<T>(items: &mut Vec<T>, cap: usize) {
    let cap = cap.max(1);
    if items.len() > cap {
        let excess = items.len() - cap;
        items.drain(..excess);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_everything_under_cap() {
        let mut items = Vec::new();
        for i in 0..5 {
            push_capped(&mut items, i, HISTORY_CAP);
        }
        assert_eq!(items, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn evicts_oldest_first() {
        for (cap, total) in [
            (HISTORY_CAP, 37),
            (SESSION_HISTORY_CAP, 21),
            (TRACKED_CHANGES_CAP, 250),
        ] {
            let mut items = Vec::new();
            for i in 1..=total {
                push_capped(&mut items, i, cap);
                assert!(items.len() <= cap);
            }
            assert_eq!(items.len(), cap);
            // First survivor is the (total - cap + 1)-th item appended.
            assert_eq!(items[0], total - cap + 1);
            assert_eq!(*items.last().unwrap(), total);
        }
    }

    #[test]
    fn truncate_handles_oversized_input() {
        let mut items: Vec<u32> = (0..15).collect();
        truncate_oldest(&mut items, HISTORY_CAP);
        assert_eq!(items, (5..15).collect::<Vec<_>>());
    }

    #[test]
    fn zero_cap_keeps_newest() {
        let mut items = vec![1, 2];
        push_capped(&mut items, 3, 0);
        assert_eq!(items, vec![3]);
    }
}
