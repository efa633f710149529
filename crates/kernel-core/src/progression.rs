//! Per-level value lookup over short configured arrays.
//!
//! Configs list a handful of explicit levels; anything past the end continues
//! the slope of the last two entries. Levels are 1-based, array indices are
//! 0-based, and the two are never mixed inside one function.

use std::collections::BTreeMap;

use contracts::{ResourceAmounts, ResourceKind};

/// Value for a 1-based `level`, continuing the final slope past the end and
/// clamping to `cap` when a positive cap is configured.
pub fn extrapolate_with_cap(values: &[i64], level: u32, cap: i64) -> i64 {
    let Some(&last) = values.last() else {
        return 0;
    };
    let level = i64::from(level.max(1));
    let len = values.len() as i64;
    let value = if level - 1 < len {
        values[(level - 1) as usize]
    } else {
        let previous = values[values.len().saturating_sub(2)];
        last + (level - len) * (last - previous)
    };
    if cap > 0 {
        value.min(cap)
    } else {
        value
    }
}

/// Float variant of [`extrapolate_with_cap`] without a cap.
pub fn extrapolate_f64(values: &[f64], level: u32) -> f64 {
    let Some(&last) = values.last() else {
        return 0.0;
    };
    let index = level.max(1) as usize - 1;
    if let Some(&value) = values.get(index) {
        return value;
    }
    let previous = values[values.len().saturating_sub(2)];
    last + (index - (values.len() - 1)) as f64 * (last - previous)
}

/// Value at a 0-based `index`, continuing the final slope past the end.
/// A single entry continues as a constant.
pub fn value_at_index(values: &[i64], index: usize) -> Option<i64> {
    let &last = values.last()?;
    if let Some(&value) = values.get(index) {
        return Some(value);
    }
    let previous = values[values.len().saturating_sub(2)];
    let steps = (index - (values.len() - 1)) as i64;
    Some(last + steps * (last - previous))
}

/// Entry for a 1-based `level` with the index clamped to the last entry.
/// Level 0 and empty arrays contribute nothing.
pub fn clamped_at_level(values: &[f64], level: u32) -> f64 {
    if level == 0 || values.is_empty() {
        return 0.0;
    }
    let index = (level as usize - 1).min(values.len() - 1);
    values[index]
}

/// Seconds needed to finish construction of the level indexed by `index`.
///
/// Past the end the slope of the last two entries continues; a single entry
/// grows by one second per level and an empty array needs no time at all.
pub fn construction_seconds(times: &[f64], index: u32) -> f64 {
    let Some(&last) = times.last() else {
        return 0.0;
    };
    let index = index as usize;
    if let Some(&value) = times.get(index) {
        return value;
    }
    let slope = if times.len() >= 2 {
        last - times[times.len() - 2]
    } else {
        1.0
    };
    last + slope * (index - (times.len() - 1)) as f64
}

/// Per-resource cost arrays of one structure type, indexed by level - 1.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CostTable {
    columns: BTreeMap<ResourceKind, Vec<i64>>,
}

impl CostTable {
    pub fn new(columns: BTreeMap<ResourceKind, Vec<i64>>) -> Self {
        let columns = columns
            .into_iter()
            .filter(|(_, values)| !values.is_empty())
            .collect();
        Self { columns }
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column(&self, kind: ResourceKind) -> Option<&[i64]> {
        self.columns.get(&kind).map(Vec::as_slice)
    }

    /// Shortest configured column length, used to lint against a max level.
    pub fn shortest_column(&self) -> Option<(ResourceKind, usize)> {
        self.columns
            .iter()
            .map(|(kind, values)| (*kind, values.len()))
            .min_by_key(|(_, len)| *len)
    }

    /// Cost of the entry at 0-based `index`. Zero entries are omitted.
    pub fn at_index(&self, index: usize) -> ResourceAmounts {
        self.columns
            .iter()
            .filter_map(|(kind, values)| {
                value_at_index(values, index)
                    .filter(|amount| *amount > 0)
                    .map(|amount| (*kind, amount))
            })
            .collect()
    }

    /// Cost paid to reach `level` from nothing: entries `0..level` summed.
    pub fn cumulative(&self, level: u32) -> ResourceAmounts {
        self.columns
            .iter()
            .filter_map(|(kind, values)| {
                let total = (0..level as usize)
                    .filter_map(|index| value_at_index(values, index))
                    .sum::<i64>();
                (total > 0).then_some((*kind, total))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capped_lookup_reads_configured_levels_directly() {
        let values = [10, 15, 20];
        assert_eq!(extrapolate_with_cap(&values, 1, 0), 10);
        assert_eq!(extrapolate_with_cap(&values, 3, 0), 20);
    }

    #[test]
    fn capped_lookup_continues_last_slope_and_clamps() {
        let values = [10, 15, 20];
        assert_eq!(extrapolate_with_cap(&values, 4, 0), 25);
        assert_eq!(extrapolate_with_cap(&values, 6, 0), 35);
        assert_eq!(extrapolate_with_cap(&values, 6, 30), 30);
        assert_eq!(extrapolate_with_cap(&[], 4, 30), 0);
    }

    #[test]
    fn single_entry_stat_stays_flat() {
        assert_eq!(extrapolate_with_cap(&[7], 5, 0), 7);
        assert_eq!(extrapolate_f64(&[1.5], 3), 1.5);
    }

    #[test]
    fn clamped_lookup_holds_last_entry() {
        let boosts = [1.0, 2.5];
        assert_eq!(clamped_at_level(&boosts, 0), 0.0);
        assert_eq!(clamped_at_level(&boosts, 1), 1.0);
        assert_eq!(clamped_at_level(&boosts, 9), 2.5);
        assert_eq!(clamped_at_level(&[], 3), 0.0);
    }

    #[test]
    fn construction_time_extrapolation_rules() {
        assert_eq!(construction_seconds(&[], 3), 0.0);
        assert_eq!(construction_seconds(&[60.0], 0), 60.0);
        assert_eq!(construction_seconds(&[60.0], 2), 62.0);
        assert_eq!(construction_seconds(&[60.0, 120.0], 1), 120.0);
        assert_eq!(construction_seconds(&[60.0, 120.0], 3), 240.0);
    }

    #[test]
    fn cost_table_extrapolates_and_accumulates() {
        let table = CostTable::new(BTreeMap::from([
            (ResourceKind::Gold, vec![100, 200, 300]),
            (ResourceKind::Stone, vec![50]),
            (ResourceKind::Mana, Vec::new()),
        ]));

        let third = table.at_index(2);
        assert_eq!(third.get(&ResourceKind::Gold), Some(&300));
        assert_eq!(third.get(&ResourceKind::Stone), Some(&50));
        assert!(!third.contains_key(&ResourceKind::Mana));

        assert_eq!(table.at_index(4).get(&ResourceKind::Gold), Some(&500));

        let paid = table.cumulative(2);
        assert_eq!(paid.get(&ResourceKind::Gold), Some(&300));
        assert_eq!(paid.get(&ResourceKind::Stone), Some(&100));
        assert!(table.cumulative(0).is_empty());
    }
}
