use std::cmp::Ordering;

use crate::aggregate::GroupStats;
use crate::formula::FormulaIndex;
use crate::types::{
    AnalysedOrder, DeviationOrderRow, FraudOrderRow, OrderDetailRow, Period, PeriodSummaryRow,
    SupplierSummaryRow,
};

/// Supplier ascending, missing suppliers last; ties keep input order.
fn by_supplier(a: &&AnalysedOrder, b: &&AnalysedOrder) -> Ordering {
    match (a.supplier(), b.supplier()) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn select_sorted<'a>(
    rows: &'a [AnalysedOrder],
    focus: Period,
    keep: impl Fn(&AnalysedOrder) -> bool,
) -> Vec<&'a AnalysedOrder> {
    let mut selected: Vec<&AnalysedOrder> = rows
        .iter()
        .filter(|r| r.period == Some(focus) && keep(*r))
        .collect();
    selected.sort_by(by_supplier);
    selected
}

pub fn generate_period_overview(groups: &[(Period, GroupStats)], comment: &str) -> Vec<PeriodSummaryRow> {
    groups
        .iter()
        .enumerate()
        .map(|(i, (period, s))| PeriodSummaryRow {
            periode: period.label().to_string(),
            totaal_misgelopen_marge: s.missed_margin,
            totaal_bestellingen: s.total,
            pct_max_budget_gelijk: s.pct_max_budget_equal(),
            max_budget_gelijk: s.max_budget_equal,
            max_budget_ongelijk: s.max_budget_unequal,
            boven_15: s.above_15,
            pct_boven_15: s.pct_above_15(),
            tot_15: s.upto_15,
            boven_25: s.above_25,
            comment: if i == 0 { comment.to_string() } else { String::new() },
        })
        .collect()
}

pub fn generate_supplier_overview(
    groups: Vec<(String, GroupStats)>,
    formulas: &FormulaIndex,
) -> Vec<SupplierSummaryRow> {
    formulas
        .enrich(groups, |(name, _)| Some(name.as_str()))
        .into_iter()
        .map(|((name, s), formule)| SupplierSummaryRow {
            leveranciervestiging: name,
            formule,
            totaal_misgelopen_marge: s.missed_margin,
            totaal_bestellingen: s.total,
            max_budget_gelijk: s.max_budget_equal,
            max_budget_ongelijk: s.max_budget_unequal,
            boven_15: s.above_15,
            tot_15: s.upto_15,
            boven_25: s.above_25,
        })
        .collect()
}

fn deviation_rows(selected: Vec<&AnalysedOrder>, formulas: &FormulaIndex) -> Vec<DeviationOrderRow> {
    formulas
        .enrich(selected, |r| r.supplier())
        .into_iter()
        .map(|(r, formule)| {
            let o = r.order();
            DeviationOrderRow {
                leveranciervestiging: o.supplier.clone().unwrap_or_default(),
                formule,
                bestelnummer: o.order_number.clone(),
                adviesprijs: r.advisory_incl_vat,
                bedraghoofdproductincl: o.charged,
                merk: o.brand.clone(),
                type_: o.product_type.clone(),
                naam_hellorider: r.matched.catalog_name.clone(),
                besteldatum: o.order_date,
            }
        })
        .collect()
}

/// Focus-period orders with a positive "Marge delta >15%".
pub fn generate_deviations_15(
    rows: &[AnalysedOrder],
    focus: Period,
    formulas: &FormulaIndex,
) -> Vec<DeviationOrderRow> {
    let selected = select_sorted(rows, focus, |r| r.margin_delta_15.is_some_and(|v| v > 0.0));
    deviation_rows(selected, formulas)
}

/// Focus-period orders charged more than 25% under the advisory price.
pub fn generate_deviations_25(
    rows: &[AnalysedOrder],
    focus: Period,
    formulas: &FormulaIndex,
) -> Vec<DeviationOrderRow> {
    let selected = select_sorted(rows, focus, |r| r.diff_25);
    deviation_rows(selected, formulas)
}

/// Focus-period orders whose charged amount equals the maximum budget.
pub fn generate_fraud_suspects(
    rows: &[AnalysedOrder],
    focus: Period,
    formulas: &FormulaIndex,
) -> Vec<FraudOrderRow> {
    let selected = select_sorted(rows, focus, |r| r.charged_is_max_budget);
    formulas
        .enrich(selected, |r| r.supplier())
        .into_iter()
        .map(|(r, formule)| {
            let o = r.order();
            FraudOrderRow {
                leveranciervestiging: o.supplier.clone().unwrap_or_default(),
                formule,
                bestelnummer: o.order_number.clone(),
                bedraghoofdproductincl: o.charged,
                max_budget: r.max_budget,
                adviesprijs: r.advisory_incl_vat,
                merk: o.brand.clone(),
                type_: o.product_type.clone(),
                besteldatum: o.order_date,
            }
        })
        .collect()
}

/// Every analysed order, input order preserved.
pub fn generate_order_details(rows: &[AnalysedOrder]) -> Vec<OrderDetailRow> {
    rows.iter()
        .map(|r| {
            let o = r.order();
            OrderDetailRow {
                bestelnummer: o.order_number.clone(),
                besteldatum: o.order_date,
                leveranciervestiging: o.supplier.clone(),
                merk: o.brand.clone(),
                soort_fiets: o.bike_type.clone(),
                type_: o.product_type.clone(),
                artikelnr: o.article_number.clone(),
                bedraghoofdproductincl: o.charged,
                maximaalteverrekenenhoofdproduct: o.max_reimbursable,
                verrekeninghoofdproductbedrag: o.settled_amount,
                extra: o.extra.clone(),
                brand_hr: r.matched.brand_hr.clone(),
                adviesprijs: r.advisory_incl_vat,
                naam_hellorider: r.matched.catalog_name.clone(),
                ebike_type: r.matched.ebike_type.clone(),
                artikelnummer_check: r.matched.key_match_valid,
                match_bron: r.matched.source.to_string(),
                periode: r.period.map(|p| p.label().to_string()),
                delta: r.delta,
                diff_15: r.diff_15,
                diff_25: r.diff_25,
                marge_delta_15: r.margin_delta_15,
                max_budget: r.max_budget,
                bedraghoofd_is_max_budget: r.charged_is_max_budget,
                controle_twee_condities: r.two_conditions,
            }
        })
        .collect()
}
