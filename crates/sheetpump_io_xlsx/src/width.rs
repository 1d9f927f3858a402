//! Per-sheet column width estimator.

use std::collections::BTreeMap;

use crate::spec::SpecColumnWidthPolicy;
use crate::util::estimate_text_width;

/// Running maximum width per column for one sheet.
///
/// Stored widths are clamped to the policy range and never decrease. A new
/// sheet starts from a fresh tracker.
#[derive(Debug, Clone)]
pub struct ColumnWidthTracker {
    width_min: usize,
    width_max: usize,
    if_enabled: bool,
    dict_width_by_col: BTreeMap<usize, usize>,
}

impl ColumnWidthTracker {
    pub fn new(policy: &SpecColumnWidthPolicy) -> Self {
        Self {
            width_min: policy.width_min,
            width_max: policy.width_max.max(policy.width_min),
            if_enabled: policy.if_enabled,
            dict_width_by_col: BTreeMap::new(),
        }
    }

    /// Feed one cell's text for column `idx_col`.
    pub fn observe(&mut self, idx_col: usize, text: &str) {
        if !self.if_enabled {
            return;
        }
        let n_width = estimate_text_width(text).clamp(self.width_min, self.width_max);
        let n_width_prev = self.dict_width_by_col.entry(idx_col).or_insert(n_width);
        if n_width > *n_width_prev {
            *n_width_prev = n_width;
        }
    }

    /// Current width of `idx_col`, if observed.
    pub fn width(&self, idx_col: usize) -> Option<usize> {
        self.dict_width_by_col.get(&idx_col).copied()
    }

    /// Widths collected so far; empty when fitting is disabled.
    pub fn widths(&self) -> &BTreeMap<usize, usize> {
        &self.dict_width_by_col
    }

    /// Drop the collected widths, yielding them to the caller.
    pub fn take_widths(&mut self) -> BTreeMap<usize, usize> {
        std::mem::take(&mut self.dict_width_by_col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(width_min: usize, width_max: usize) -> SpecColumnWidthPolicy {
        SpecColumnWidthPolicy {
            if_enabled: true,
            width_min,
            width_max,
        }
    }

    #[test]
    fn test_observe_clamps_to_policy_range() {
        let mut tracker = ColumnWidthTracker::new(&policy(8, 20));
        tracker.observe(0, "ab");
        tracker.observe(1, &"x".repeat(100));
        assert_eq!(tracker.width(0), Some(8));
        assert_eq!(tracker.width(1), Some(20));
        assert_eq!(tracker.width(2), None);
    }

    #[test]
    fn test_observe_is_monotonic() {
        let mut tracker = ColumnWidthTracker::new(&policy(1, 60));
        let mut n_prev = 0;
        for c_text in ["hello world", "a", "", "中文中文中文", "b"] {
            tracker.observe(0, c_text);
            let n_now = tracker.width(0).unwrap();
            assert!(n_now >= n_prev);
            assert!((1..=60).contains(&n_now));
            n_prev = n_now;
        }
        assert_eq!(n_prev, 18);
    }

    #[test]
    fn test_disabled_policy_records_nothing() {
        let mut tracker = ColumnWidthTracker::new(&SpecColumnWidthPolicy {
            if_enabled: false,
            ..Default::default()
        });
        tracker.observe(0, "something long");
        assert!(tracker.widths().is_empty());
    }

    #[test]
    fn test_take_widths_resets() {
        let mut tracker = ColumnWidthTracker::new(&policy(8, 60));
        tracker.observe(3, "abc");
        assert_eq!(tracker.take_widths(), BTreeMap::from([(3, 8)]));
        assert!(tracker.widths().is_empty());
    }
}
