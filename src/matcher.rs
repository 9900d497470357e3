use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use tracing::debug;

use crate::control::RunControl;
use crate::error::{AnalysisError, Result};
use crate::lookup::LookupIndex;
use crate::types::{BikeCategory, CatalogRecord, MatchSource, MatchedOrder, OrderRecord};
use crate::util::{eq_ignore_case, normalize_name};

/// Does a catalog row's ebike indicator agree with the declared category?
///
/// The key join is strict: only "elektrisch" and "normaal" can ever match.
fn bike_type_consistent(category: BikeCategory, ebike_type: Option<&str>) -> bool {
    match category {
        BikeCategory::Electric => ebike_type.is_some(),
        BikeCategory::Normal => ebike_type.is_none(),
        BikeCategory::Other => false,
    }
}

/// Left join of orders onto the lookup by product key.
///
/// A joined row only keeps its advisory price and display name when the
/// catalog brand equals the order brand (ignoring case) and the bike type
/// is consistent; otherwise both are cleared and the row is left for the
/// fuzzy pass.
pub fn exact_match(orders: &[OrderRecord], lookup: &LookupIndex<'_>) -> Vec<MatchedOrder> {
    orders
        .iter()
        .map(|order| {
            let hit = order.article_number.as_deref().and_then(|k| lookup.get(k));
            let brand_hr = hit.and_then(|h| h.brand.clone());
            let ebike_type = hit.and_then(|h| h.ebike_type.clone());

            let valid = hit.is_some()
                && eq_ignore_case(brand_hr.as_deref(), order.brand.as_deref())
                && bike_type_consistent(order.key_category(), ebike_type.as_deref());

            let (advisory_ex_vat, catalog_name) = match hit {
                Some(h) if valid => (h.advisory_price, h.display_name.clone()),
                _ => (None, None),
            };

            MatchedOrder {
                order: order.clone(),
                brand_hr,
                ebike_type,
                advisory_ex_vat,
                catalog_name,
                key_match_valid: valid,
                source: if valid {
                    MatchSource::Exact
                } else {
                    MatchSource::Unmatched
                },
            }
        })
        .collect()
}

struct PoolEntry<'c> {
    record: &'c CatalogRecord,
    brand: Option<String>,
    name: Option<String>,
}

/// The catalog with brands and names normalised once for substring search.
pub struct FuzzyPool<'c> {
    entries: Vec<PoolEntry<'c>>,
}

impl<'c> FuzzyPool<'c> {
    pub fn new(catalog: &'c [CatalogRecord]) -> Self {
        let entries = catalog
            .iter()
            .map(|record| PoolEntry {
                record,
                brand: record.brand.as_deref().map(str::to_lowercase),
                name: record.name.as_deref().map(normalize_name),
            })
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// First catalog row (in catalog order) whose brand equals the order brand,
/// whose normalised name contains the order's normalised type and whose
/// ebike indicator fits the declared category. An order of another
/// category is not constrained on bike type here.
///
/// A type made only of spaces normalises to the empty string, which every
/// name contains; a missing type or brand gives no candidate.
pub fn fuzzy_candidate<'c>(order: &OrderRecord, pool: &FuzzyPool<'c>) -> Option<&'c CatalogRecord> {
    let brand = order.brand.as_deref()?.to_lowercase();
    let needle = normalize_name(order.product_type.as_deref()?);
    let category = order.fuzzy_category();
    pool.entries
        .iter()
        .find(|e| {
            e.brand.as_deref() == Some(brand.as_str())
                && e.name.as_deref().is_some_and(|n| n.contains(&needle))
                && match category {
                    BikeCategory::Other => true,
                    category => bike_type_consistent(category, e.record.ebike_type.as_deref()),
                }
        })
        .map(|e| e.record)
}

/// Fill the advisory price of every order still missing one from the fuzzy
/// pool. Rows are searched independently, in parallel when asked; the
/// cancel token is polled before each row.
pub fn fuzzy_match(
    matched: Vec<MatchedOrder>,
    pool: &FuzzyPool<'_>,
    parallel: bool,
    control: &RunControl<'_>,
) -> Result<Vec<MatchedOrder>> {
    let needing: Vec<usize> = matched
        .iter()
        .enumerate()
        .filter(|(_, m)| m.advisory_ex_vat.is_none())
        .map(|(i, _)| i)
        .collect();
    let total = needing.len();
    if total == 0 {
        return Ok(matched);
    }

    let done = AtomicUsize::new(0);
    let search = |&i: &usize| {
        if control.cancel.is_cancelled() {
            return Err(AnalysisError::Cancelled {
                processed: done.load(Ordering::Relaxed),
                total,
            });
        }
        let hit = fuzzy_candidate(&matched[i].order, pool);
        let n = done.fetch_add(1, Ordering::Relaxed) + 1;
        control.report(n, total);
        Ok::<_, AnalysisError>((i, hit))
    };

    let hits: Vec<(usize, Option<&CatalogRecord>)> = if parallel {
        needing.par_iter().map(search).collect::<Result<_>>()?
    } else {
        needing.iter().map(search).collect::<Result<_>>()?
    };

    let mut matched = matched;
    for (i, hit) in hits {
        if let Some(record) = hit {
            let row = &mut matched[i];
            debug!(
                order = row.order.order_number.as_deref().unwrap_or(""),
                name = record.name.as_deref().unwrap_or(""),
                "fuzzy match"
            );
            row.advisory_ex_vat = record.msrp_ex_vat;
            row.catalog_name = record.name.clone();
            row.source = MatchSource::Fuzzy;
        }
    }
    Ok(matched)
}
