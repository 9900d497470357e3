use chrono::NaiveDateTime;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use tabled::Tabled;

use crate::util::{display_opt_datetime, display_opt_f64, display_opt_str};

// ---------------------------------------------------------------------------
// Raw input rows, one per source table. Every field is optional text; the
// loader turns them into typed records.
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RawOrderRow {
    #[serde(rename = "Artikelnr")]
    pub artikelnr: Option<String>,
    #[serde(rename = "Merk")]
    pub merk: Option<String>,
    #[serde(rename = "Soort Fiets")]
    pub soort_fiets: Option<String>,
    #[serde(rename = "Type")]
    pub type_: Option<String>,
    #[serde(rename = "Bestelnummer")]
    pub bestelnummer: Option<String>,
    #[serde(rename = "Besteldatum")]
    pub besteldatum: Option<String>,
    #[serde(rename = "Leveranciervestiging")]
    pub leveranciervestiging: Option<String>,
    #[serde(rename = "bedraghoofdproductincl")]
    pub bedraghoofdproductincl: Option<String>,
    #[serde(rename = "maximaalteverrekenenhoofdproduct")]
    pub maximaalteverrekenenhoofdproduct: Option<String>,
    #[serde(rename = "bestelling.verrekeninghoofdproductbedrag")]
    pub verrekeninghoofdproductbedrag: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawCatalogRow {
    #[serde(rename = "Ean Code")]
    pub ean_code: Option<String>,
    #[serde(rename = "Brand")]
    pub brand: Option<String>,
    #[serde(rename = "Msrp Ex Vat")]
    pub msrp_ex_vat: Option<String>,
    #[serde(rename = "Name")]
    pub name: Option<String>,
    #[serde(rename = "Ebike Type")]
    pub ebike_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawDealerRow {
    #[serde(rename = "E mail")]
    pub email: Option<String>,
    #[serde(rename = "Formule")]
    pub formule: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawEmailLinkRow {
    #[serde(rename = "leverancier_vestiging_email")]
    pub email: Option<String>,
    #[serde(rename = "leverancier_vestiging_naam")]
    pub naam: Option<String>,
}

// ---------------------------------------------------------------------------
// Clean input records
// ---------------------------------------------------------------------------

/// Bike category declared on the order ("Soort Fiets").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BikeCategory {
    Electric,
    Normal,
    /// Anything else, including a missing value.
    Other,
}

impl BikeCategory {
    pub fn from_label(label: Option<&str>) -> Self {
        match label.map(str::to_lowercase).as_deref() {
            Some("elektrisch") => Self::Electric,
            Some("normaal") => Self::Normal,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderRecord {
    pub order_number: Option<String>,
    pub order_date: Option<NaiveDateTime>,
    pub supplier: Option<String>,
    pub brand: Option<String>,
    /// "Soort Fiets" as exported.
    pub bike_type: Option<String>,
    pub product_type: Option<String>,
    pub article_number: Option<String>,
    pub charged: Option<f64>,
    pub max_reimbursable: Option<f64>,
    pub settled_amount: Option<f64>,
    /// Export columns the analysis does not read, by header, in file order.
    pub extra: IndexMap<String, String>,
}

impl OrderRecord {
    /// Category for the key join, which compares the label as is.
    pub fn key_category(&self) -> BikeCategory {
        BikeCategory::from_label(self.bike_type.as_deref())
    }

    /// Category for the fuzzy pass, which ignores surrounding whitespace.
    pub fn fuzzy_category(&self) -> BikeCategory {
        BikeCategory::from_label(self.bike_type.as_deref().map(str::trim))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogRecord {
    pub ean_code: Option<String>,
    pub brand: Option<String>,
    pub msrp_ex_vat: Option<f64>,
    pub name: Option<String>,
    pub ebike_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DealerFormulaRecord {
    pub email: Option<String>,
    pub formule: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SupplierEmailRecord {
    pub email: Option<String>,
    pub name: Option<String>,
}

/// The four parsed tables the pipeline consumes.
#[derive(Debug, Clone, Default)]
pub struct AnalysisInput {
    pub orders: Vec<OrderRecord>,
    pub catalog: Vec<CatalogRecord>,
    pub dealers: Vec<DealerFormulaRecord>,
    pub email_links: Vec<SupplierEmailRecord>,
}

// ---------------------------------------------------------------------------
// Stage records
// ---------------------------------------------------------------------------

/// One catalog entry per product key.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupRecord {
    pub article_number: String,
    pub brand: Option<String>,
    pub advisory_price: Option<f64>,
    pub display_name: Option<String>,
    pub ebike_type: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchSource {
    Exact,
    Fuzzy,
    Unmatched,
}

impl fmt::Display for MatchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact => write!(f, "exact"),
            Self::Fuzzy => write!(f, "fuzzy"),
            Self::Unmatched => write!(f, "geen"),
        }
    }
}

/// An order after the exact and fuzzy matching passes.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedOrder {
    pub order: OrderRecord,
    /// Catalog brand from the key join, kept even when the match is invalid.
    pub brand_hr: Option<String>,
    /// Catalog ebike type from the key join, kept even when the match is invalid.
    pub ebike_type: Option<String>,
    pub advisory_ex_vat: Option<f64>,
    pub catalog_name: Option<String>,
    pub key_match_valid: bool,
    pub source: MatchSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Period {
    Year2024,
    Early2025,
    FromApril2025,
}

impl Period {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Year2024 => "2024",
            Self::Early2025 => "Tussen 1-1-2025 en 2-4-2025",
            Self::FromApril2025 => "Vanaf 2-4-2025",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// An order with every derived metric attached.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysedOrder {
    pub matched: MatchedOrder,
    pub advisory_incl_vat: Option<f64>,
    pub period: Option<Period>,
    pub delta: Option<f64>,
    pub diff_15: bool,
    pub diff_25: bool,
    /// `delta`, kept only where `diff_15` holds.
    pub margin_delta_15: Option<f64>,
    pub max_budget: Option<f64>,
    pub charged_is_max_budget: bool,
    pub two_conditions: bool,
}

impl AnalysedOrder {
    pub fn order(&self) -> &OrderRecord {
        &self.matched.order
    }

    pub fn supplier(&self) -> Option<&str> {
        self.matched.order.supplier.as_deref()
    }
}

/// One row of the supplier → Formule cross reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FormulaLink {
    pub name: String,
    pub formule: Option<String>,
}

// ---------------------------------------------------------------------------
// Report rows
// ---------------------------------------------------------------------------

#[derive(Debug, Tabled, Clone, PartialEq)]
pub struct PeriodSummaryRow {
    #[tabled(rename = "periode")]
    pub periode: String,
    #[tabled(rename = "totaal_misgelopen_marge")]
    pub totaal_misgelopen_marge: f64,
    #[tabled(rename = "totaal_bestellingen")]
    pub totaal_bestellingen: usize,
    #[tabled(rename = "pct_max_budget_gelijk")]
    pub pct_max_budget_gelijk: String,
    #[tabled(rename = "aantal_bestellingen_max_budget_gelijk")]
    pub max_budget_gelijk: usize,
    #[tabled(rename = "aantal_bestellingen_max_budget_ongelijk")]
    pub max_budget_ongelijk: usize,
    #[tabled(rename = "aantal_bestellingen_>15%")]
    pub boven_15: usize,
    #[tabled(rename = "pct_delta_>15%")]
    pub pct_boven_15: String,
    #[tabled(rename = "aantal_bestellingen_<=15%")]
    pub tot_15: usize,
    #[tabled(rename = "aantal_bestellingen_>25%")]
    pub boven_25: usize,
    #[tabled(rename = "Comment")]
    pub comment: String,
}

#[derive(Debug, Tabled, Clone, PartialEq)]
pub struct SupplierSummaryRow {
    #[tabled(rename = "Leveranciervestiging")]
    pub leveranciervestiging: String,
    #[tabled(rename = "Formule")]
    pub formule: String,
    #[tabled(rename = "totaal_misgelopen_marge")]
    pub totaal_misgelopen_marge: f64,
    #[tabled(rename = "totaal_bestellingen")]
    pub totaal_bestellingen: usize,
    #[tabled(rename = "aantal_bestellingen_max_budget_gelijk")]
    pub max_budget_gelijk: usize,
    #[tabled(rename = "aantal_bestellingen_max_budget_ongelijk")]
    pub max_budget_ongelijk: usize,
    #[tabled(rename = "aantal_bestellingen_>15%")]
    pub boven_15: usize,
    #[tabled(rename = "aantal_bestellingen_<=15%")]
    pub tot_15: usize,
    #[tabled(rename = "aantal_bestellingen_>25%")]
    pub boven_25: usize,
}

/// Row of the ">15%" and ">25%" deviation sheets.
#[derive(Debug, Tabled, Clone, PartialEq)]
pub struct DeviationOrderRow {
    #[tabled(rename = "Leveranciervestiging")]
    pub leveranciervestiging: String,
    #[tabled(rename = "Formule")]
    pub formule: String,
    #[tabled(rename = "Bestelnummer", display_with = "display_opt_str")]
    pub bestelnummer: Option<String>,
    #[tabled(rename = "adviesprijs", display_with = "display_opt_f64")]
    pub adviesprijs: Option<f64>,
    #[tabled(rename = "bedraghoofdproductincl", display_with = "display_opt_f64")]
    pub bedraghoofdproductincl: Option<f64>,
    #[tabled(rename = "Merk", display_with = "display_opt_str")]
    pub merk: Option<String>,
    #[tabled(rename = "Type", display_with = "display_opt_str")]
    pub type_: Option<String>,
    #[tabled(rename = "Naam Hellorider", display_with = "display_opt_str")]
    pub naam_hellorider: Option<String>,
    #[tabled(rename = "Besteldatum", display_with = "display_opt_datetime")]
    pub besteldatum: Option<NaiveDateTime>,
}

/// Row of the "Verkoopprijs=max_budget" sheet.
#[derive(Debug, Tabled, Clone, PartialEq)]
pub struct FraudOrderRow {
    #[tabled(rename = "Leveranciervestiging")]
    pub leveranciervestiging: String,
    #[tabled(rename = "Formule")]
    pub formule: String,
    #[tabled(rename = "Bestelnummer", display_with = "display_opt_str")]
    pub bestelnummer: Option<String>,
    #[tabled(rename = "bedraghoofdproductincl", display_with = "display_opt_f64")]
    pub bedraghoofdproductincl: Option<f64>,
    #[tabled(rename = "max_budget", display_with = "display_opt_f64")]
    pub max_budget: Option<f64>,
    #[tabled(rename = "adviesprijs", display_with = "display_opt_f64")]
    pub adviesprijs: Option<f64>,
    #[tabled(rename = "Merk", display_with = "display_opt_str")]
    pub merk: Option<String>,
    #[tabled(rename = "Type", display_with = "display_opt_str")]
    pub type_: Option<String>,
    #[tabled(rename = "Besteldatum", display_with = "display_opt_datetime")]
    pub besteldatum: Option<NaiveDateTime>,
}

/// Row of the "Alle data Fiscfree" sheet: the full analysed order.
#[derive(Debug, Tabled, Clone, PartialEq)]
pub struct OrderDetailRow {
    #[tabled(rename = "Bestelnummer", display_with = "display_opt_str")]
    pub bestelnummer: Option<String>,
    #[tabled(rename = "Besteldatum", display_with = "display_opt_datetime")]
    pub besteldatum: Option<NaiveDateTime>,
    #[tabled(rename = "Leveranciervestiging", display_with = "display_opt_str")]
    pub leveranciervestiging: Option<String>,
    #[tabled(rename = "Merk", display_with = "display_opt_str")]
    pub merk: Option<String>,
    #[tabled(rename = "Soort Fiets", display_with = "display_opt_str")]
    pub soort_fiets: Option<String>,
    #[tabled(rename = "Type", display_with = "display_opt_str")]
    pub type_: Option<String>,
    #[tabled(rename = "Artikelnr", display_with = "display_opt_str")]
    pub artikelnr: Option<String>,
    #[tabled(rename = "bedraghoofdproductincl", display_with = "display_opt_f64")]
    pub bedraghoofdproductincl: Option<f64>,
    #[tabled(rename = "maximaalteverrekenenhoofdproduct", display_with = "display_opt_f64")]
    pub maximaalteverrekenenhoofdproduct: Option<f64>,
    #[tabled(rename = "bestelling.verrekeninghoofdproductbedrag", display_with = "display_opt_f64")]
    pub verrekeninghoofdproductbedrag: Option<f64>,
    /// Further export columns, written after the ones above.
    #[tabled(skip)]
    pub extra: IndexMap<String, String>,
    #[tabled(rename = "Brand_hr", display_with = "display_opt_str")]
    pub brand_hr: Option<String>,
    #[tabled(rename = "adviesprijs", display_with = "display_opt_f64")]
    pub adviesprijs: Option<f64>,
    #[tabled(rename = "Naam Hellorider", display_with = "display_opt_str")]
    pub naam_hellorider: Option<String>,
    #[tabled(rename = "Ebike Type", display_with = "display_opt_str")]
    pub ebike_type: Option<String>,
    #[tabled(rename = "Artikelnummer check")]
    pub artikelnummer_check: bool,
    #[tabled(rename = "match_bron")]
    pub match_bron: String,
    #[tabled(rename = "periode", display_with = "display_opt_str")]
    pub periode: Option<String>,
    #[tabled(rename = "delta", display_with = "display_opt_f64")]
    pub delta: Option<f64>,
    #[tabled(rename = "Diff >15%")]
    pub diff_15: bool,
    #[tabled(rename = "Diff >25%")]
    pub diff_25: bool,
    #[tabled(rename = "Marge delta >15%", display_with = "display_opt_f64")]
    pub marge_delta_15: Option<f64>,
    #[tabled(rename = "max_budget", display_with = "display_opt_f64")]
    pub max_budget: Option<f64>,
    #[tabled(rename = "bedraghoofd = max_budget")]
    pub bedraghoofd_is_max_budget: bool,
    #[tabled(rename = "Controle twee condities")]
    pub controle_twee_condities: bool,
}

/// The six output tables, in workbook order.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisReport {
    pub period_overview: Vec<PeriodSummaryRow>,
    pub supplier_overview: Vec<SupplierSummaryRow>,
    pub deviations_15: Vec<DeviationOrderRow>,
    pub deviations_25: Vec<DeviationOrderRow>,
    pub fraud_suspects: Vec<FraudOrderRow>,
    pub orders: Vec<OrderDetailRow>,
    pub stats: RunStats,
}

/// Counters gathered while running the pipeline; written as `summary.json`.
#[derive(Debug, Serialize, Clone, Default, PartialEq)]
pub struct RunStats {
    pub total_orders: usize,
    pub catalog_rows: usize,
    pub lookup_keys: usize,
    pub exact_matches: usize,
    pub fuzzy_matches: usize,
    pub unmatched: usize,
    pub unclassified_period: usize,
    pub diff_15_orders: usize,
    pub diff_25_orders: usize,
    pub fraud_suspects: usize,
    pub total_missed_margin: f64,
}
