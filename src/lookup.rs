use indexmap::IndexMap;

use crate::error::{AnalysisError, Result};
use crate::types::{CatalogRecord, LookupRecord};

/// Collapse the catalog to one row per product key, first occurrence wins.
///
/// Rows without a product key cannot take part in a key join and are left
/// out; they stay available to the fuzzy pass through the full catalog.
pub fn build_lookup(catalog: &[CatalogRecord]) -> Vec<LookupRecord> {
    let mut by_key: IndexMap<&str, &CatalogRecord> = IndexMap::with_capacity(catalog.len());
    for row in catalog {
        if let Some(key) = row.ean_code.as_deref() {
            by_key.entry(key).or_insert(row);
        }
    }
    by_key
        .into_iter()
        .map(|(key, row)| LookupRecord {
            article_number: key.to_string(),
            brand: row.brand.clone(),
            advisory_price: row.msrp_ex_vat,
            display_name: row.name.clone(),
            ebike_type: row.ebike_type.clone(),
        })
        .collect()
}

/// Lookup rows indexed by product key, validated to be many-to-one safe.
#[derive(Debug)]
pub struct LookupIndex<'a> {
    rows: IndexMap<&'a str, &'a LookupRecord>,
}

impl<'a> LookupIndex<'a> {
    /// Index the rows; a repeated key means the join would fan out and is fatal.
    pub fn new(rows: &'a [LookupRecord]) -> Result<Self> {
        let mut index = IndexMap::with_capacity(rows.len());
        for row in rows {
            if index.insert(row.article_number.as_str(), row).is_some() {
                return Err(AnalysisError::DuplicateLookupKey {
                    key: row.article_number.clone(),
                });
            }
        }
        Ok(Self { rows: index })
    }

    pub fn get(&self, key: &str) -> Option<&'a LookupRecord> {
        self.rows.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
