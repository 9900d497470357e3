use std::collections::BTreeMap;

use crate::types::{AnalysedOrder, Period};
use crate::util::format_pct;

/// Sums and counts over one group of analysed orders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupStats {
    /// Sum of the non-missing "Marge delta >15%" values.
    pub missed_margin: f64,
    pub total: usize,
    pub max_budget_equal: usize,
    pub max_budget_unequal: usize,
    /// Orders with a "Marge delta >15%" value.
    pub above_15: usize,
    /// Orders whose "Marge delta >15%" is missing or not positive.
    pub upto_15: usize,
    pub above_25: usize,
}

impl GroupStats {
    fn add(&mut self, row: &AnalysedOrder) {
        self.total += 1;
        if row.charged_is_max_budget {
            self.max_budget_equal += 1;
        } else {
            self.max_budget_unequal += 1;
        }
        match row.margin_delta_15 {
            Some(v) => {
                self.missed_margin += v;
                self.above_15 += 1;
                if v <= 0.0 {
                    self.upto_15 += 1;
                }
            }
            None => self.upto_15 += 1,
        }
        if row.diff_25 {
            self.above_25 += 1;
        }
    }

    pub fn from_rows<'a>(rows: impl IntoIterator<Item = &'a AnalysedOrder>) -> Self {
        let mut stats = Self::default();
        for row in rows {
            stats.add(row);
        }
        stats
    }

    pub fn pct_max_budget_equal(&self) -> String {
        format_pct(self.max_budget_equal, self.total)
    }

    pub fn pct_above_15(&self) -> String {
        format_pct(self.above_15, self.total)
    }

}

/// Stats per period in ascending period order; unclassified orders are not
/// grouped.
pub fn aggregate_by_period(rows: &[AnalysedOrder]) -> Vec<(Period, GroupStats)> {
    let mut groups: BTreeMap<Period, GroupStats> = BTreeMap::new();
    for row in rows {
        if let Some(period) = row.period {
            groups.entry(period).or_default().add(row);
        }
    }
    groups.into_iter().collect()
}

/// Stats per supplier location in ascending name order, optionally limited
/// to one period. Orders without a supplier are not grouped.
pub fn aggregate_by_supplier(
    rows: &[AnalysedOrder],
    period: Option<Period>,
) -> Vec<(String, GroupStats)> {
    let mut groups: BTreeMap<&str, GroupStats> = BTreeMap::new();
    for row in rows {
        if period.is_some() && row.period != period {
            continue;
        }
        if let Some(supplier) = row.supplier() {
            groups.entry(supplier).or_default().add(row);
        }
    }
    groups
        .into_iter()
        .map(|(name, stats)| (name.to_string(), stats))
        .collect()
}
