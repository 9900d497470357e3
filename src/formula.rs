use std::collections::HashMap;

use indexmap::IndexSet;
use tracing::warn;

use crate::config::FormulaPolicy;
use crate::error::{AnalysisError, Result};
use crate::types::{DealerFormulaRecord, FormulaLink, SupplierEmailRecord};
use crate::util::normalize_email;

/// Supplier name → Formule pairs, joined on normalised e-mail address.
///
/// Every mapping row with an address and a name yields one pair per dealer
/// row sharing that address, or a single pair without Formule when none
/// does. Repeated pairs keep their first position.
pub fn build_formula_links(
    dealers: &[DealerFormulaRecord],
    email_links: &[SupplierEmailRecord],
) -> Vec<FormulaLink> {
    let mut by_email: HashMap<String, Vec<Option<&str>>> = HashMap::new();
    for dealer in dealers {
        if let Some(email) = normalize_email(dealer.email.as_deref()) {
            by_email.entry(email).or_default().push(dealer.formule.as_deref());
        }
    }

    let mut links: IndexSet<FormulaLink> = IndexSet::new();
    for link in email_links {
        let Some(email) = normalize_email(link.email.as_deref()) else {
            continue;
        };
        let Some(name) = link.name.as_deref() else {
            continue;
        };
        match by_email.get(&email) {
            Some(formules) => {
                for formule in formules {
                    links.insert(FormulaLink {
                        name: name.to_string(),
                        formule: formule.map(str::to_string),
                    });
                }
            }
            None => {
                links.insert(FormulaLink {
                    name: name.to_string(),
                    formule: None,
                });
            }
        }
    }
    links.into_iter().collect()
}

/// Formule values per supplier name, ready to be joined onto report rows.
#[derive(Debug)]
pub struct FormulaIndex {
    by_name: HashMap<String, Vec<String>>,
    not_applicable: String,
}

impl FormulaIndex {
    pub fn new(links: Vec<FormulaLink>, policy: FormulaPolicy, not_applicable: &str) -> Result<Self> {
        let mut by_name: HashMap<String, Vec<String>> = HashMap::new();
        for link in links {
            let formule = link.formule.unwrap_or_else(|| not_applicable.to_string());
            by_name.entry(link.name).or_default().push(formule);
        }

        let mut ambiguous: Vec<(&String, usize)> = by_name
            .iter()
            .filter(|(_, f)| f.len() > 1)
            .map(|(name, f)| (name, f.len()))
            .collect();
        ambiguous.sort();
        if let Some((name, count)) = ambiguous.first() {
            if policy == FormulaPolicy::Reject {
                return Err(AnalysisError::AmbiguousFormula {
                    name: name.to_string(),
                    count: *count,
                });
            }
            for (name, count) in &ambiguous {
                warn!(supplier = name.as_str(), count, "supplier has several Formule values, rows will be repeated");
            }
        }

        Ok(Self {
            by_name,
            not_applicable: not_applicable.to_string(),
        })
    }

    /// Formule values for a supplier; unknown or missing names get the
    /// "not applicable" label.
    pub fn formules(&self, name: Option<&str>) -> Vec<&str> {
        match name.and_then(|n| self.by_name.get(n)) {
            Some(values) => values.iter().map(String::as_str).collect(),
            None => vec![self.not_applicable.as_str()],
        }
    }

    /// Left join onto supplier-keyed rows. A row repeats once per Formule of
    /// its supplier, in input order.
    pub fn enrich<T, F>(&self, rows: Vec<T>, key: F) -> Vec<(T, String)>
    where
        T: Clone,
        F: Fn(&T) -> Option<&str>,
    {
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let formules: Vec<String> = self
                .formules(key(&row))
                .into_iter()
                .map(str::to_string)
                .collect();
            let last = formules.len().saturating_sub(1);
            for (i, formule) in formules.into_iter().enumerate() {
                if i == last {
                    out.push((row, formule));
                    break;
                }
                out.push((row.clone(), formule));
            }
        }
        out
    }
}
