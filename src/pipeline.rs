use tracing::info;

use crate::aggregate::{aggregate_by_period, aggregate_by_supplier};
use crate::config::AnalysisConfig;
use crate::control::RunControl;
use crate::error::Result;
use crate::formula::{build_formula_links, FormulaIndex};
use crate::lookup::{build_lookup, LookupIndex};
use crate::matcher::{exact_match, fuzzy_match, FuzzyPool};
use crate::metrics::analyse;
use crate::reports;
use crate::types::{AnalysedOrder, AnalysisInput, AnalysisReport, MatchSource, RunStats};

/// Run the whole analysis: key match, fuzzy fallback, metrics, aggregation,
/// Formule enrichment and report assembly.
///
/// Each stage consumes the records of the previous one; the input tables
/// are never modified, so the same input always yields the same report.
pub fn run(input: &AnalysisInput, cfg: &AnalysisConfig, control: &RunControl<'_>) -> Result<AnalysisReport> {
    let lookup = build_lookup(&input.catalog);
    let index = LookupIndex::new(&lookup)?;
    info!(catalog = input.catalog.len(), keys = index.len(), "lookup built");

    let matched = exact_match(&input.orders, &index);
    let exact = matched.iter().filter(|m| m.key_match_valid).count();
    info!(orders = matched.len(), valid = exact, "key match done");

    let pool = FuzzyPool::new(&input.catalog);
    let pending = matched.iter().filter(|m| m.advisory_ex_vat.is_none()).count();
    info!(pending, parallel = cfg.parallel_fuzzy, "fuzzy match started");
    let matched = fuzzy_match(matched, &pool, cfg.parallel_fuzzy, control)?;

    let analysed = analyse(matched, cfg);

    let links = build_formula_links(&input.dealers, &input.email_links);
    let formulas = FormulaIndex::new(links, cfg.formula_policy, &cfg.not_applicable)?;

    let by_period = aggregate_by_period(&analysed);
    let by_supplier = aggregate_by_supplier(&analysed, Some(cfg.focus_period));
    info!(periods = by_period.len(), suppliers = by_supplier.len(), "aggregation done");

    let stats = run_stats(input, &analysed, index.len());
    info!(
        exact = stats.exact_matches,
        fuzzy = stats.fuzzy_matches,
        unmatched = stats.unmatched,
        fraud = stats.fraud_suspects,
        "analysis finished"
    );

    Ok(AnalysisReport {
        period_overview: reports::generate_period_overview(&by_period, &cfg.overview_comment),
        supplier_overview: reports::generate_supplier_overview(by_supplier, &formulas),
        deviations_15: reports::generate_deviations_15(&analysed, cfg.focus_period, &formulas),
        deviations_25: reports::generate_deviations_25(&analysed, cfg.focus_period, &formulas),
        fraud_suspects: reports::generate_fraud_suspects(&analysed, cfg.focus_period, &formulas),
        orders: reports::generate_order_details(&analysed),
        stats,
    })
}

fn count_where(rows: &[AnalysedOrder], f: impl Fn(&AnalysedOrder) -> bool) -> usize {
    rows.iter().filter(|r| f(*r)).count()
}

fn run_stats(input: &AnalysisInput, analysed: &[AnalysedOrder], lookup_keys: usize) -> RunStats {
    RunStats {
        total_orders: analysed.len(),
        catalog_rows: input.catalog.len(),
        lookup_keys,
        exact_matches: count_where(analysed, |r| r.matched.source == MatchSource::Exact),
        fuzzy_matches: count_where(analysed, |r| r.matched.source == MatchSource::Fuzzy),
        unmatched: count_where(analysed, |r| r.matched.source == MatchSource::Unmatched),
        unclassified_period: count_where(analysed, |r| r.period.is_none()),
        diff_15_orders: count_where(analysed, |r| r.diff_15),
        diff_25_orders: count_where(analysed, |r| r.diff_25),
        fraud_suspects: count_where(analysed, |r| r.charged_is_max_budget),
        total_missed_margin: analysed.iter().filter_map(|r| r.margin_delta_15).sum(),
    }
}
