use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Reader};
use csv::{ReaderBuilder, StringRecord};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use tracing::{info, warn};

use crate::error::{AnalysisError, Result};
use crate::types::{
    AnalysisInput, CatalogRecord, DealerFormulaRecord, OrderRecord, RawCatalogRow,
    RawDealerRow, RawEmailLinkRow, RawOrderRow, SupplierEmailRecord,
};
use crate::util::{
    clean_text, excel_serial_to_datetime, format_datetime, parse_datetime_safe, parse_f64_safe,
};

pub const ORDER_COLUMNS: &[&str] = &[
    "Artikelnr",
    "Merk",
    "Soort Fiets",
    "Type",
    "Bestelnummer",
    "Besteldatum",
    "Leveranciervestiging",
    "bedraghoofdproductincl",
    "maximaalteverrekenenhoofdproduct",
    "bestelling.verrekeninghoofdproductbedrag",
];
pub const CATALOG_COLUMNS: &[&str] = &["Ean Code", "Brand", "Msrp Ex Vat", "Name", "Ebike Type"];
pub const DEALER_COLUMNS: &[&str] = &["E mail", "Formule"];
pub const EMAIL_COLUMNS: &[&str] = &["leverancier_vestiging_email", "leverancier_vestiging_naam"];

/// A sheet as text: one header record plus data records.
#[derive(Debug, Clone)]
pub struct Table {
    pub name: String,
    pub headers: StringRecord,
    pub rows: Vec<StringRecord>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub table: String,
    pub total_rows: usize,
    /// Rows that could not be read at all and were skipped.
    pub parse_errors: usize,
    /// Number or date cells that could not be parsed and became missing.
    pub bad_values: usize,
}

/// Where the four input tables live.
#[derive(Debug, Clone)]
pub struct InputPaths {
    pub orders: PathBuf,
    pub catalog: PathBuf,
    pub dealers: PathBuf,
    pub email_map: PathBuf,
    pub dealer_skip_rows: usize,
}

fn table_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn is_blank(record: &StringRecord) -> bool {
    record.iter().all(|f| f.trim().is_empty())
}

/// Read a `.csv` or spreadsheet file, skipping `skip_rows` rows above the
/// header. Blank rows are dropped.
pub fn load_table(path: &Path, skip_rows: usize) -> Result<Table> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "csv" => read_csv_table(path, skip_rows),
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => read_excel_table(path, skip_rows),
        _ => Err(AnalysisError::UnsupportedFormat {
            path: path.display().to_string(),
        }),
    }
}

fn read_csv_table(path: &Path, skip_rows: usize) -> Result<Table> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;
    let mut records = rdr.records().skip(skip_rows);
    let name = table_name(path);
    let headers = match records.next() {
        Some(r) => r?.iter().map(str::trim).collect::<StringRecord>(),
        None => return Err(AnalysisError::EmptyTable { table: name }),
    };
    let mut rows = Vec::new();
    for record in records {
        let record = record?;
        if !is_blank(&record) {
            rows.push(record);
        }
    }
    Ok(Table { name, headers, rows })
}

/// Render a spreadsheet cell the way it would appear in a CSV export.
pub fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Float(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
        Data::Float(n) => n.to_string(),
        Data::Int(n) => n.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => excel_serial_to_datetime(dt.as_f64())
            .map(|t| format_datetime(&t))
            .unwrap_or_default(),
    }
}

fn read_excel_table(path: &Path, skip_rows: usize) -> Result<Table> {
    let mut workbook = open_workbook_auto(path)?;
    let name = table_name(path);
    let Some(sheet) = workbook.sheet_names().first().cloned() else {
        return Err(AnalysisError::EmptyTable { table: name });
    };
    let range = workbook.worksheet_range(&sheet)?;

    // The range starts at the first used row; skip counts from row 1.
    let first_row = range.start().map(|(r, _)| r as usize).unwrap_or(0);
    let mut rows = range
        .rows()
        .skip(skip_rows.saturating_sub(first_row))
        .map(|cells| cells.iter().map(cell_to_string).collect::<StringRecord>());

    let headers = match rows.next() {
        Some(h) => h.iter().map(str::trim).collect::<StringRecord>(),
        None => return Err(AnalysisError::EmptyTable { table: name }),
    };
    let rows = rows.filter(|r| !is_blank(r)).collect();
    Ok(Table { name, headers, rows })
}

fn check_columns(table: &Table, required: &[&str]) -> Result<()> {
    for column in required {
        if !table.headers.iter().any(|h| h == *column) {
            return Err(AnalysisError::MissingColumn {
                table: table.name.clone(),
                column: column.to_string(),
            });
        }
    }
    Ok(())
}

/// Typed rows, each paired with the record it was read from.
fn deserialize_rows<'t, T: DeserializeOwned>(
    table: &'t Table,
    report: &mut LoadReport,
) -> Vec<(T, &'t StringRecord)> {
    let mut out = Vec::with_capacity(table.rows.len());
    for (i, record) in table.rows.iter().enumerate() {
        report.total_rows += 1;
        match record.deserialize::<T>(Some(&table.headers)) {
            Ok(row) => out.push((row, record)),
            Err(e) => {
                warn!(table = table.name.as_str(), row = i + 1, error = %e, "row skipped");
                report.parse_errors += 1;
            }
        }
    }
    out
}

/// Text kept as exported; only an empty cell is missing.
fn raw_text(raw: Option<String>) -> Option<String> {
    raw.filter(|s| !s.is_empty())
}

/// Header/value pairs for every column outside `known`, in file order.
fn extra_columns(headers: &StringRecord, record: &StringRecord, known: &[&str]) -> IndexMap<String, String> {
    headers
        .iter()
        .enumerate()
        .filter(|(_, h)| !h.is_empty() && !known.contains(h))
        .map(|(i, h)| (h.to_string(), record.get(i).unwrap_or_default().to_string()))
        .collect()
}

fn amount(raw: Option<String>, report: &mut LoadReport) -> Option<f64> {
    let raw = clean_text(raw)?;
    let value = parse_f64_safe(Some(&raw));
    if value.is_none() {
        report.bad_values += 1;
    }
    value
}

pub fn orders_from_table(table: &Table) -> Result<(Vec<OrderRecord>, LoadReport)> {
    check_columns(table, ORDER_COLUMNS)?;
    let mut report = LoadReport {
        table: table.name.clone(),
        ..Default::default()
    };
    let raw: Vec<(RawOrderRow, &StringRecord)> = deserialize_rows(table, &mut report);
    let mut orders = Vec::with_capacity(raw.len());
    for (row, record) in raw {
        let date_text = clean_text(row.besteldatum);
        let order_date = parse_datetime_safe(date_text.as_deref());
        if date_text.is_some() && order_date.is_none() {
            report.bad_values += 1;
        }
        orders.push(OrderRecord {
            order_number: clean_text(row.bestelnummer),
            order_date,
            supplier: clean_text(row.leveranciervestiging),
            brand: clean_text(row.merk),
            bike_type: raw_text(row.soort_fiets),
            product_type: raw_text(row.type_),
            article_number: clean_text(row.artikelnr),
            charged: amount(row.bedraghoofdproductincl, &mut report),
            max_reimbursable: amount(row.maximaalteverrekenenhoofdproduct, &mut report),
            settled_amount: amount(row.verrekeninghoofdproductbedrag, &mut report),
            extra: extra_columns(&table.headers, record, ORDER_COLUMNS),
        });
    }
    Ok((orders, report))
}

pub fn catalog_from_table(table: &Table) -> Result<(Vec<CatalogRecord>, LoadReport)> {
    check_columns(table, CATALOG_COLUMNS)?;
    let mut report = LoadReport {
        table: table.name.clone(),
        ..Default::default()
    };
    let raw: Vec<(RawCatalogRow, _)> = deserialize_rows(table, &mut report);
    let mut catalog = Vec::with_capacity(raw.len());
    for (row, _) in raw {
        catalog.push(CatalogRecord {
            ean_code: clean_text(row.ean_code),
            brand: clean_text(row.brand),
            msrp_ex_vat: amount(row.msrp_ex_vat, &mut report),
            name: clean_text(row.name),
            ebike_type: clean_text(row.ebike_type),
        });
    }
    Ok((catalog, report))
}

pub fn dealers_from_table(table: &Table) -> Result<(Vec<DealerFormulaRecord>, LoadReport)> {
    check_columns(table, DEALER_COLUMNS)?;
    let mut report = LoadReport {
        table: table.name.clone(),
        ..Default::default()
    };
    let raw: Vec<(RawDealerRow, _)> = deserialize_rows(table, &mut report);
    let dealers = raw
        .into_iter()
        .map(|(row, _)| DealerFormulaRecord {
            email: row.email,
            formule: clean_text(row.formule),
        })
        .collect();
    Ok((dealers, report))
}

pub fn email_links_from_table(table: &Table) -> Result<(Vec<SupplierEmailRecord>, LoadReport)> {
    check_columns(table, EMAIL_COLUMNS)?;
    let mut report = LoadReport {
        table: table.name.clone(),
        ..Default::default()
    };
    let raw: Vec<(RawEmailLinkRow, _)> = deserialize_rows(table, &mut report);
    let links = raw
        .into_iter()
        .map(|(row, _)| SupplierEmailRecord {
            email: row.email,
            name: clean_text(row.naam),
        })
        .collect();
    Ok((links, report))
}

/// Load and clean all four tables.
pub fn load_input(paths: &InputPaths) -> Result<(AnalysisInput, Vec<LoadReport>)> {
    let (orders, r1) = orders_from_table(&load_table(&paths.orders, 0)?)?;
    let (catalog, r2) = catalog_from_table(&load_table(&paths.catalog, 0)?)?;
    let (dealers, r3) = dealers_from_table(&load_table(&paths.dealers, paths.dealer_skip_rows)?)?;
    let (email_links, r4) = email_links_from_table(&load_table(&paths.email_map, 0)?)?;

    let reports = vec![r1, r2, r3, r4];
    for r in &reports {
        info!(
            table = r.table.as_str(),
            rows = r.total_rows,
            skipped = r.parse_errors,
            bad_values = r.bad_values,
            "table loaded"
        );
    }
    let input = AnalysisInput {
        orders,
        catalog,
        dealers,
        email_links,
    };
    Ok((input, reports))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BikeCategory;
    use chrono::NaiveDate;
    use std::io::Write;

    fn table(headers: &[&str], rows: &[&[&str]]) -> Table {
        Table {
            name: "test".into(),
            headers: StringRecord::from(headers.to_vec()),
            rows: rows.iter().map(|r| StringRecord::from(r.to_vec())).collect(),
        }
    }

    #[test]
    fn orders_are_cleaned() {
        let t = table(
            ORDER_COLUMNS,
            &[&[
                " 1234 ",
                "Giant",
                "Elektrisch",
                "Explore E+ 1",
                "B-1",
                "2025-04-03",
                "Fietsplus Utrecht",
                "2.499,00",
                "2500",
                "",
            ]],
        );
        let (orders, report) = orders_from_table(&t).unwrap();
        let o = &orders[0];
        assert_eq!(o.article_number.as_deref(), Some("1234"));
        assert_eq!(o.key_category(), BikeCategory::Electric);
        assert_eq!(
            o.order_date,
            NaiveDate::from_ymd_opt(2025, 4, 3).and_then(|d| d.and_hms_opt(0, 0, 0))
        );
        assert!(o.extra.is_empty());
        assert_eq!(o.charged, Some(2499.0));
        assert_eq!(o.max_reimbursable, Some(2500.0));
        assert_eq!(o.settled_amount, None);
        assert_eq!(report.bad_values, 0);
    }

    #[test]
    fn order_timestamps_keep_their_time() {
        let t = table(
            ORDER_COLUMNS,
            &[
                &["1", "Giant", "normaal", "Escape", "B-1", "2025-04-01 13:45:00", "X", "900", "", ""],
                &["2", "Giant", "normaal", "Escape", "B-2", "31-12-2024 09:00", "X", "900", "", ""],
            ],
        );
        let (orders, _) = orders_from_table(&t).unwrap();
        assert_eq!(
            orders[0].order_date,
            NaiveDate::from_ymd_opt(2025, 4, 1).and_then(|d| d.and_hms_opt(13, 45, 0))
        );
        assert_eq!(
            orders[1].order_date,
            NaiveDate::from_ymd_opt(2024, 12, 31).and_then(|d| d.and_hms_opt(9, 0, 0))
        );
    }

    #[test]
    fn unread_order_columns_are_carried_along() {
        let mut headers = ORDER_COLUMNS.to_vec();
        headers.insert(2, "Kenteken");
        headers.push("Opmerking");
        let t = table(
            &headers,
            &[&["1", "Giant", "AB-12-CD", "normaal", "Escape", "B-1", "2025-05-01", "X", "900", "", "", ""]],
        );
        let (orders, _) = orders_from_table(&t).unwrap();
        let extra: Vec<_> = orders[0].extra.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        assert_eq!(extra, vec![("Kenteken", "AB-12-CD"), ("Opmerking", "")]);
        assert_eq!(orders[0].product_type.as_deref(), Some("Escape"));
    }

    #[test]
    fn bike_type_is_kept_as_exported() {
        let t = table(
            ORDER_COLUMNS,
            &[&["1", "Giant", " normaal", "  ", "B-1", "", "X", "900", "", ""]],
        );
        let (orders, _) = orders_from_table(&t).unwrap();
        assert_eq!(orders[0].bike_type.as_deref(), Some(" normaal"));
        assert_eq!(orders[0].product_type.as_deref(), Some("  "));
    }

    #[test]
    fn bad_values_become_missing_and_are_counted() {
        let t = table(
            ORDER_COLUMNS,
            &[&["1", "Giant", "normaal", "Escape", "B-2", "ooit", "X", "veel", "", ""]],
        );
        let (orders, report) = orders_from_table(&t).unwrap();
        assert_eq!(orders[0].order_date, None);
        assert_eq!(orders[0].charged, None);
        assert_eq!(report.bad_values, 2);
    }

    #[test]
    fn missing_column_is_reported() {
        let t = table(&["Ean Code", "Brand"], &[]);
        let err = catalog_from_table(&t).unwrap_err();
        assert!(matches!(err, AnalysisError::MissingColumn { column, .. } if column == "Msrp Ex Vat"));
    }

    #[test]
    fn csv_with_junk_rows_above_header() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "DRG Dealers,,").unwrap();
        writeln!(file, "Overzicht juni,,").unwrap();
        writeln!(file, "Naam,E mail,Formule").unwrap();
        writeln!(file, "Fietsplus,info@fietsplus.nl,Bike Totaal").unwrap();
        writeln!(file, ",,").unwrap();
        writeln!(file, "Elders,,").unwrap();
        file.flush().unwrap();

        let t = load_table(file.path(), 2).unwrap();
        let (dealers, report) = dealers_from_table(&t).unwrap();
        assert_eq!(report.total_rows, 2);
        assert_eq!(dealers[0].email.as_deref(), Some("info@fietsplus.nl"));
        assert_eq!(dealers[0].formule.as_deref(), Some("Bike Totaal"));
        assert_eq!(dealers[1].email, None);
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let err = load_table(Path::new("orders.txt"), 0).unwrap_err();
        assert!(matches!(err, AnalysisError::UnsupportedFormat { .. }));
    }

    #[test]
    fn spreadsheet_cells_render_like_csv() {
        assert_eq!(cell_to_string(&Data::Float(8712345678901.0)), "8712345678901");
        assert_eq!(cell_to_string(&Data::Float(1049.5)), "1049.5");
        assert_eq!(cell_to_string(&Data::Int(7)), "7");
        assert_eq!(cell_to_string(&Data::Empty), "");
        assert_eq!(cell_to_string(&Data::String("Giant".into())), "Giant");
        assert_eq!(cell_to_string(&Data::Bool(true)), "true");
    }
}
