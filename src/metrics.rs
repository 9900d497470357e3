use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;

use crate::config::AnalysisConfig;
use crate::types::{AnalysedOrder, MatchedOrder, Period};
use crate::util::{is_close, round2};

// Bounds are midnight timestamps: an order later on an end day falls outside.
struct PeriodBounds {
    early_2025_start: NaiveDateTime,
    early_2025_end: NaiveDateTime,
    from_april_start: NaiveDateTime,
    year_2024_start: NaiveDateTime,
    year_2024_end: NaiveDateTime,
}

static BOUNDS: Lazy<PeriodBounds> = Lazy::new(|| {
    let d = |y, m, day| {
        NaiveDate::from_ymd_opt(y, m, day)
            .unwrap_or_default()
            .and_time(NaiveTime::MIN)
    };
    PeriodBounds {
        early_2025_start: d(2025, 1, 1),
        early_2025_end: d(2025, 4, 1),
        from_april_start: d(2025, 4, 2),
        year_2024_start: d(2024, 1, 1),
        year_2024_end: d(2024, 12, 31),
    }
});

/// Bucket an order timestamp; the checks run in this order and the first hit
/// wins.
pub fn classify_period(date: Option<NaiveDateTime>) -> Option<Period> {
    let date = date?;
    let b = &*BOUNDS;
    if (b.early_2025_start..=b.early_2025_end).contains(&date) {
        Some(Period::Early2025)
    } else if date >= b.from_april_start {
        Some(Period::FromApril2025)
    } else if (b.year_2024_start..=b.year_2024_end).contains(&date) {
        Some(Period::Year2024)
    } else {
        None
    }
}

/// Larger of the two reimbursement ceilings, ignoring a missing one.
pub fn max_budget(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

/// Attach the VAT-adjusted advisory price, period, deltas and flags.
pub fn analyse_order(matched: MatchedOrder, cfg: &AnalysisConfig) -> AnalysedOrder {
    let order = &matched.order;
    let advisory_incl_vat = matched.advisory_ex_vat.map(|p| round2(p * cfg.vat_factor));
    let period = classify_period(order.order_date);

    let priced = advisory_incl_vat.zip(order.charged);
    let delta = priced.map(|(advice, charged)| cfg.margin_share * (advice - charged));
    let diff_15 = priced.is_some_and(|(advice, charged)| charged < cfg.diff_15_factor * advice);
    let diff_25 = priced.is_some_and(|(advice, charged)| charged < cfg.diff_25_factor * advice);
    let margin_delta_15 = delta.filter(|_| diff_15);

    let max_budget = max_budget(order.max_reimbursable, order.settled_amount);
    let charged_is_max_budget = order
        .charged
        .zip(max_budget)
        .is_some_and(|(charged, budget)| is_close(round2(charged), round2(budget)));

    AnalysedOrder {
        advisory_incl_vat,
        period,
        delta,
        diff_15,
        diff_25,
        margin_delta_15,
        max_budget,
        charged_is_max_budget,
        two_conditions: charged_is_max_budget || diff_15,
        matched,
    }
}

pub fn analyse(matched: Vec<MatchedOrder>, cfg: &AnalysisConfig) -> Vec<AnalysedOrder> {
    matched.into_iter().map(|m| analyse_order(m, cfg)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MatchSource, OrderRecord};
    use proptest::prelude::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(y, m, d).and_then(|d| d.and_hms_opt(h, min, 0))
    }

    fn date(y: i32, m: u32, d: u32) -> Option<NaiveDateTime> {
        at(y, m, d, 0, 0)
    }

    fn matched(advice_ex: Option<f64>, charged: Option<f64>, max_a: Option<f64>, max_b: Option<f64>) -> MatchedOrder {
        MatchedOrder {
            order: OrderRecord {
                order_number: Some("B-1".into()),
                order_date: date(2025, 5, 1),
                supplier: Some("Fietsplus Utrecht".into()),
                brand: Some("Giant".into()),
                bike_type: Some("normaal".into()),
                product_type: Some("Escape".into()),
                article_number: Some("1234".into()),
                charged,
                max_reimbursable: max_a,
                settled_amount: max_b,
                extra: Default::default(),
            },
            brand_hr: Some("Giant".into()),
            ebike_type: None,
            advisory_ex_vat: advice_ex,
            catalog_name: Some("Escape 3".into()),
            key_match_valid: advice_ex.is_some(),
            source: MatchSource::Exact,
        }
    }

    #[test]
    fn period_boundaries() {
        assert_eq!(classify_period(date(2025, 1, 1)), Some(Period::Early2025));
        assert_eq!(classify_period(date(2025, 4, 1)), Some(Period::Early2025));
        assert_eq!(classify_period(date(2025, 4, 2)), Some(Period::FromApril2025));
        assert_eq!(classify_period(date(2026, 2, 1)), Some(Period::FromApril2025));
        assert_eq!(classify_period(date(2024, 1, 1)), Some(Period::Year2024));
        assert_eq!(classify_period(date(2024, 12, 31)), Some(Period::Year2024));
        assert_eq!(classify_period(date(2023, 12, 31)), None);
        assert_eq!(classify_period(None), None);
    }

    #[test]
    fn time_of_day_past_an_end_bound_leaves_the_period_open() {
        assert_eq!(classify_period(at(2025, 4, 1, 13, 45)), None);
        assert_eq!(classify_period(at(2024, 12, 31, 9, 0)), None);
        assert_eq!(classify_period(at(2025, 4, 1, 0, 0)), Some(Period::Early2025));
        assert_eq!(classify_period(at(2025, 1, 1, 8, 30)), Some(Period::Early2025));
        assert_eq!(classify_period(at(2025, 4, 2, 0, 1)), Some(Period::FromApril2025));
        assert_eq!(classify_period(at(2024, 6, 1, 17, 0)), Some(Period::Year2024));
    }

    #[test]
    fn vat_and_deltas() {
        let cfg = AnalysisConfig::default();
        let a = analyse_order(matched(Some(1000.0), Some(900.0), None, None), &cfg);
        assert_eq!(a.advisory_incl_vat, Some(1210.0));
        assert!(a.diff_15);
        assert!(a.diff_25);
        let expected = 0.10 * (1210.0 - 900.0);
        assert!((a.delta.unwrap() - expected).abs() < 1e-9);
        assert_eq!(a.margin_delta_15, a.delta);
        assert!(a.two_conditions);
    }

    #[test]
    fn small_discount_keeps_delta_but_not_margin_column() {
        let cfg = AnalysisConfig::default();
        let a = analyse_order(matched(Some(1000.0), Some(1100.0), None, None), &cfg);
        assert!(!a.diff_15);
        assert!(!a.diff_25);
        assert!(a.delta.is_some());
        assert_eq!(a.margin_delta_15, None);
    }

    #[test]
    fn missing_advice_leaves_metrics_missing() {
        let cfg = AnalysisConfig::default();
        let a = analyse_order(matched(None, Some(100.0), None, None), &cfg);
        assert_eq!(a.advisory_incl_vat, None);
        assert_eq!(a.delta, None);
        assert!(!a.diff_15 && !a.diff_25);
        assert_eq!(a.margin_delta_15, None);
    }

    #[test]
    fn max_budget_ignores_missing_side() {
        assert_eq!(max_budget(Some(1500.0), Some(1750.0)), Some(1750.0));
        assert_eq!(max_budget(None, Some(1750.0)), Some(1750.0));
        assert_eq!(max_budget(Some(1500.0), None), Some(1500.0));
        assert_eq!(max_budget(None, None), None);
    }

    #[test]
    fn charged_equal_to_budget_is_flagged() {
        let cfg = AnalysisConfig::default();
        let a = analyse_order(matched(None, Some(1749.999), Some(1500.0), Some(1750.0)), &cfg);
        assert_eq!(a.max_budget, Some(1750.0));
        assert!(a.charged_is_max_budget);
        assert!(a.two_conditions);
        let b = analyse_order(matched(None, Some(1749.0), Some(1500.0), Some(1750.0)), &cfg);
        assert!(!b.charged_is_max_budget);
        let c = analyse_order(matched(None, None, Some(1500.0), None), &cfg);
        assert!(!c.charged_is_max_budget);
    }

    proptest! {
        #[test]
        fn every_timestamp_lands_in_at_most_one_period(minutes in 0i64..2_900_000) {
            let midnight = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap().and_time(NaiveTime::MIN);
            let t = midnight(2023, 6, 1) + chrono::Duration::minutes(minutes);
            let hits = [
                (midnight(2025, 1, 1)..=midnight(2025, 4, 1)).contains(&t),
                t >= midnight(2025, 4, 2),
                (midnight(2024, 1, 1)..=midnight(2024, 12, 31)).contains(&t),
            ];
            let n = hits.iter().filter(|h| **h).count();
            prop_assert!(n <= 1);
            prop_assert_eq!(classify_period(Some(t)).is_some(), n == 1);
        }

        #[test]
        fn undercut_beyond_fifteen_percent_is_flagged(price in 100.0f64..10_000.0, share in 0.0f64..0.84) {
            let cfg = AnalysisConfig::default();
            let advice = round2(price * 1.21);
            let charged = advice * share;
            let a = analyse_order(matched(Some(price), Some(charged), None, None), &cfg);
            prop_assert!(a.diff_15);
            let expected = 0.10 * (advice - charged);
            prop_assert!((a.margin_delta_15.unwrap() - expected).abs() < 1e-9);
        }
    }
}
