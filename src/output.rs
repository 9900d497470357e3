use std::path::Path;

use chrono::NaiveDateTime;
use indexmap::IndexSet;
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use crate::error::Result;
use crate::types::{
    AnalysisReport, DeviationOrderRow, FraudOrderRow, OrderDetailRow, PeriodSummaryRow,
    SupplierSummaryRow,
};
use crate::util::format_datetime;

pub const SHEET_PERIODS: &str = "Totaal overzicht";
pub const SHEET_SUPPLIERS: &str = "Leveranciers overzicht";
pub const SHEET_DEVIATIONS_15: &str = "Bestellingen verschil >15%";
pub const SHEET_DEVIATIONS_25: &str = "Bestellingen verschil >25%";
pub const SHEET_FRAUD: &str = "Verkoopprijs=max_budget";
pub const SHEET_ORDERS: &str = "Alle data Fiscfree";

/// A typed spreadsheet cell; missing values are written as blanks.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
    Empty,
}

impl CellValue {
    /// Text for a CSV field.
    pub fn to_field(&self) -> String {
        match self {
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) => n.to_string(),
            CellValue::Bool(b) => b.to_string(),
            CellValue::DateTime(t) => format_datetime(t),
            CellValue::Empty => String::new(),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<&Option<String>> for CellValue {
    fn from(s: &Option<String>) -> Self {
        s.as_deref().map_or(CellValue::Empty, CellValue::from)
    }
}

impl From<Option<f64>> for CellValue {
    fn from(v: Option<f64>) -> Self {
        v.map_or(CellValue::Empty, CellValue::Number)
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::Number(v)
    }
}

impl From<usize> for CellValue {
    fn from(v: usize) -> Self {
        CellValue::Number(v as f64)
    }
}

impl From<bool> for CellValue {
    fn from(v: bool) -> Self {
        CellValue::Bool(v)
    }
}

impl From<Option<NaiveDateTime>> for CellValue {
    fn from(t: Option<NaiveDateTime>) -> Self {
        t.map_or(CellValue::Empty, CellValue::DateTime)
    }
}

/// A report row that can be laid out as one spreadsheet row.
///
/// `columns` gives the sheet header for a set of rows; by default the
/// `Tabled` headers. `cells` returns one value per entry of `columns`.
pub trait SheetRow: Tabled + Sized {
    fn columns(_rows: &[Self]) -> Vec<String> {
        Self::headers().iter().map(|h| h.to_string()).collect()
    }

    fn cells(&self, columns: &[String]) -> Vec<CellValue>;
}

impl SheetRow for PeriodSummaryRow {
    fn cells(&self, _columns: &[String]) -> Vec<CellValue> {
        vec![
            self.periode.as_str().into(),
            self.totaal_misgelopen_marge.into(),
            self.totaal_bestellingen.into(),
            self.pct_max_budget_gelijk.as_str().into(),
            self.max_budget_gelijk.into(),
            self.max_budget_ongelijk.into(),
            self.boven_15.into(),
            self.pct_boven_15.as_str().into(),
            self.tot_15.into(),
            self.boven_25.into(),
            self.comment.as_str().into(),
        ]
    }
}

impl SheetRow for SupplierSummaryRow {
    fn cells(&self, _columns: &[String]) -> Vec<CellValue> {
        vec![
            self.leveranciervestiging.as_str().into(),
            self.formule.as_str().into(),
            self.totaal_misgelopen_marge.into(),
            self.totaal_bestellingen.into(),
            self.max_budget_gelijk.into(),
            self.max_budget_ongelijk.into(),
            self.boven_15.into(),
            self.tot_15.into(),
            self.boven_25.into(),
        ]
    }
}

impl SheetRow for DeviationOrderRow {
    fn cells(&self, _columns: &[String]) -> Vec<CellValue> {
        vec![
            self.leveranciervestiging.as_str().into(),
            self.formule.as_str().into(),
            (&self.bestelnummer).into(),
            self.adviesprijs.into(),
            self.bedraghoofdproductincl.into(),
            (&self.merk).into(),
            (&self.type_).into(),
            (&self.naam_hellorider).into(),
            self.besteldatum.into(),
        ]
    }
}

impl SheetRow for FraudOrderRow {
    fn cells(&self, _columns: &[String]) -> Vec<CellValue> {
        vec![
            self.leveranciervestiging.as_str().into(),
            self.formule.as_str().into(),
            (&self.bestelnummer).into(),
            self.bedraghoofdproductincl.into(),
            self.max_budget.into(),
            self.adviesprijs.into(),
            (&self.merk).into(),
            (&self.type_).into(),
            self.besteldatum.into(),
        ]
    }
}

/// Export columns at the front of the detail sheet; unread export columns
/// follow them, then the derived columns.
const EXPORT_COLUMNS: usize = 10;

impl SheetRow for OrderDetailRow {
    fn columns(rows: &[Self]) -> Vec<String> {
        let fixed: Vec<String> = Self::headers().iter().map(|h| h.to_string()).collect();
        let extra: IndexSet<&str> = rows
            .iter()
            .flat_map(|r| r.extra.keys().map(String::as_str))
            .collect();
        let mut columns = fixed[..EXPORT_COLUMNS].to_vec();
        columns.extend(extra.into_iter().map(str::to_string));
        columns.extend_from_slice(&fixed[EXPORT_COLUMNS..]);
        columns
    }

    fn cells(&self, columns: &[String]) -> Vec<CellValue> {
        let n_extra = columns.len().saturating_sub(Self::LENGTH);
        let extra = columns
            .iter()
            .skip(EXPORT_COLUMNS)
            .take(n_extra)
            .map(|name| match self.extra.get(name) {
                Some(v) if !v.is_empty() => CellValue::Text(v.clone()),
                _ => CellValue::Empty,
            });
        let mut cells: Vec<CellValue> = vec![
            (&self.bestelnummer).into(),
            self.besteldatum.into(),
            (&self.leveranciervestiging).into(),
            (&self.merk).into(),
            (&self.soort_fiets).into(),
            (&self.type_).into(),
            (&self.artikelnr).into(),
            self.bedraghoofdproductincl.into(),
            self.maximaalteverrekenenhoofdproduct.into(),
            self.verrekeninghoofdproductbedrag.into(),
        ];
        let derived: [CellValue; 14] = [
            (&self.brand_hr).into(),
            self.adviesprijs.into(),
            (&self.naam_hellorider).into(),
            (&self.ebike_type).into(),
            self.artikelnummer_check.into(),
            self.match_bron.as_str().into(),
            (&self.periode).into(),
            self.delta.into(),
            self.diff_15.into(),
            self.diff_25.into(),
            self.marge_delta_15.into(),
            self.max_budget.into(),
            self.bedraghoofd_is_max_budget.into(),
            self.controle_twee_condities.into(),
        ];
        cells.extend(extra);
        cells.extend(derived);
        cells
    }
}

fn write_sheet<T: SheetRow>(workbook: &mut Workbook, name: &str, rows: &[T]) -> Result<()> {
    let header = Format::new().set_bold();
    let timestamp = Format::new().set_num_format("yyyy-mm-dd hh:mm:ss");
    let columns = T::columns(rows);
    let sheet: &mut Worksheet = workbook.add_worksheet().set_name(name)?;
    for (col, title) in columns.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, title, &header)?;
    }
    for (i, row) in rows.iter().enumerate() {
        let r = (i + 1) as u32;
        for (col, cell) in row.cells(&columns).into_iter().enumerate() {
            let c = col as u16;
            match cell {
                CellValue::Text(s) => {
                    sheet.write_string(r, c, s)?;
                }
                CellValue::Number(n) => {
                    sheet.write_number(r, c, n)?;
                }
                CellValue::Bool(b) => {
                    sheet.write_boolean(r, c, b)?;
                }
                CellValue::DateTime(t) => {
                    sheet.write_datetime_with_format(r, c, &t, &timestamp)?;
                }
                CellValue::Empty => {}
            }
        }
    }
    sheet.set_freeze_panes(1, 0)?;
    sheet.autofit();
    Ok(())
}

/// Write the six report tables into one workbook.
pub fn write_workbook(path: &Path, report: &AnalysisReport) -> Result<()> {
    let mut workbook = Workbook::new();
    write_sheet(&mut workbook, SHEET_PERIODS, &report.period_overview)?;
    write_sheet(&mut workbook, SHEET_SUPPLIERS, &report.supplier_overview)?;
    write_sheet(&mut workbook, SHEET_DEVIATIONS_15, &report.deviations_15)?;
    write_sheet(&mut workbook, SHEET_DEVIATIONS_25, &report.deviations_25)?;
    write_sheet(&mut workbook, SHEET_FRAUD, &report.fraud_suspects)?;
    write_sheet(&mut workbook, SHEET_ORDERS, &report.orders)?;
    workbook.save(path)?;
    Ok(())
}

/// Write one sheet as CSV, with the same columns as the workbook sheet.
pub fn write_csv<T: SheetRow>(path: &Path, rows: &[T]) -> Result<()> {
    let columns = T::columns(rows);
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(&columns)?;
    for r in rows {
        wtr.write_record(r.cells(&columns).iter().map(CellValue::to_field))?;
    }
    wtr.flush()?;
    Ok(())
}

/// One CSV per sheet inside `dir`.
pub fn write_report_csvs(dir: &Path, report: &AnalysisReport) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    write_csv(&dir.join("totaal_overzicht.csv"), &report.period_overview)?;
    write_csv(&dir.join("leveranciers_overzicht.csv"), &report.supplier_overview)?;
    write_csv(&dir.join("bestellingen_verschil_15.csv"), &report.deviations_15)?;
    write_csv(&dir.join("bestellingen_verschil_25.csv"), &report.deviations_25)?;
    write_csv(&dir.join("verkoopprijs_max_budget.csv"), &report.fraud_suspects)?;
    write_csv(&dir.join("alle_data_fiscfree.csv"), &report.orders)?;
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let s = serde_json::to_string_pretty(value)?;
    std::fs::write(path, s)?;
    Ok(())
}

pub fn preview_table_rows<T>(rows: &[T], max_rows: usize)
where
    T: Tabled + Clone,
{
    let slice: Vec<T> = rows.iter().take(max_rows).cloned().collect();
    if slice.is_empty() {
        println!("(no rows)\n");
        return;
    }
    let table_str = Table::new(slice).with(Style::markdown()).to_string();
    println!("{}\n", table_str);
}
