use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use calamine::{open_workbook_auto, Reader};
use chrono::NaiveDate;

use marge_analyse::control::{CancelToken, Progress, RunControl};
use marge_analyse::loader::{load_input, InputPaths};
use marge_analyse::lookup::LookupIndex;
use marge_analyse::output;
use marge_analyse::types::{
    AnalysisInput, CatalogRecord, DealerFormulaRecord, LookupRecord, OrderRecord,
    SupplierEmailRecord,
};
use marge_analyse::{run, AnalysisConfig, AnalysisError, FormulaPolicy};

struct Order<'a> {
    nr: &'a str,
    article: &'a str,
    merk: &'a str,
    soort: &'a str,
    type_: &'a str,
    date: Option<(i32, u32, u32)>,
    supplier: Option<&'a str>,
    charged: f64,
    max: Option<f64>,
}

fn order(o: Order<'_>) -> OrderRecord {
    OrderRecord {
        order_number: Some(o.nr.into()),
        order_date: o
            .date
            .and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d))
            .and_then(|d| d.and_hms_opt(0, 0, 0)),
        supplier: o.supplier.map(str::to_string),
        brand: Some(o.merk.into()),
        bike_type: Some(o.soort.into()),
        product_type: Some(o.type_.into()),
        article_number: Some(o.article.into()),
        charged: Some(o.charged),
        max_reimbursable: o.max,
        settled_amount: None,
        extra: Default::default(),
    }
}

fn cat(ean: &str, brand: &str, price: f64, name: &str, ebike: Option<&str>) -> CatalogRecord {
    CatalogRecord {
        ean_code: Some(ean.into()),
        brand: Some(brand.into()),
        msrp_ex_vat: Some(price),
        name: Some(name.into()),
        ebike_type: ebike.map(str::to_string),
    }
}

fn sample_input() -> AnalysisInput {
    AnalysisInput {
        orders: vec![
            // Key match; charged equals max budget and is far under advice.
            order(Order {
                nr: "B-1",
                article: "1234",
                merk: "Giant",
                soort: "normaal",
                type_: "Escape",
                date: Some((2025, 5, 1)),
                supplier: Some("Fietsplus Utrecht"),
                charged: 800.0,
                max: Some(800.0),
            }),
            // Key hits a non-ebike row, so only the fuzzy pass can price it.
            order(Order {
                nr: "B-2",
                article: "1234",
                merk: "Giant",
                soort: "elektrisch",
                type_: "E-bike X",
                date: Some((2025, 6, 1)),
                supplier: Some("Amersfoort"),
                charged: 2000.0,
                max: Some(3000.0),
            }),
            order(Order {
                nr: "B-3",
                article: "5555",
                merk: "Batavus",
                soort: "normaal",
                type_: "Onbekend",
                date: Some((2024, 3, 1)),
                supplier: None,
                charged: 500.0,
                max: None,
            }),
            order(Order {
                nr: "B-4",
                article: "1234",
                merk: "giant",
                soort: "normaal",
                type_: "Escape",
                date: None,
                supplier: Some("Zwolle"),
                charged: 1200.0,
                max: Some(1500.0),
            }),
        ],
        catalog: vec![
            cat("1234", "Giant", 1000.0, "Escape 3", None),
            cat("9999", "Giant", 2000.0, "Super E-Bike X 2024", Some("Pedelec")),
        ],
        dealers: vec![DealerFormulaRecord {
            email: Some("info@fietsplus.nl".into()),
            formule: Some("Bike Totaal".into()),
        }],
        email_links: vec![SupplierEmailRecord {
            email: Some(" INFO@fietsplus.nl".into()),
            name: Some("Fietsplus Utrecht".into()),
        }],
    }
}

fn numbers<T>(rows: &[T], nr: impl Fn(&T) -> Option<String>) -> Vec<String> {
    rows.iter().filter_map(nr).collect()
}

#[test]
fn full_run_produces_all_sheets() {
    let report = run(&sample_input(), &AnalysisConfig::default(), &RunControl::default()).unwrap();

    let s = &report.stats;
    assert_eq!(s.total_orders, 4);
    assert_eq!(s.exact_matches, 2);
    assert_eq!(s.fuzzy_matches, 1);
    assert_eq!(s.unmatched, 1);
    assert_eq!(s.unclassified_period, 1);
    assert_eq!(s.fraud_suspects, 1);

    let periods: Vec<_> = report.period_overview.iter().map(|r| r.periode.as_str()).collect();
    assert_eq!(periods, vec!["2024", "Vanaf 2-4-2025"]);
    assert!(report.period_overview[0].comment.starts_with("Om appels met appels"));
    let focus = &report.period_overview[1];
    assert_eq!(focus.totaal_bestellingen, 2);
    assert_eq!(focus.boven_15, 2);
    assert_eq!(focus.boven_25, 1);
    assert_eq!(focus.pct_max_budget_gelijk, "50.0%");
    assert!((focus.totaal_misgelopen_marge - 83.0).abs() < 1e-6);

    let suppliers: Vec<_> = report
        .supplier_overview
        .iter()
        .map(|r| (r.leveranciervestiging.as_str(), r.formule.as_str()))
        .collect();
    assert_eq!(
        suppliers,
        vec![("Amersfoort", "N.v.t."), ("Fietsplus Utrecht", "Bike Totaal")]
    );

    assert_eq!(numbers(&report.deviations_15, |r| r.bestelnummer.clone()), vec!["B-2", "B-1"]);
    assert_eq!(numbers(&report.deviations_25, |r| r.bestelnummer.clone()), vec!["B-1"]);
    assert_eq!(numbers(&report.fraud_suspects, |r| r.bestelnummer.clone()), vec!["B-1"]);
    assert_eq!(report.fraud_suspects[0].formule, "Bike Totaal");

    let details = &report.orders;
    assert_eq!(numbers(details, |r| r.bestelnummer.clone()), vec!["B-1", "B-2", "B-3", "B-4"]);
    assert_eq!(details[0].adviesprijs, Some(1210.0));
    assert!(details[0].artikelnummer_check);
    assert_eq!(details[1].match_bron, "fuzzy");
    assert!(!details[1].artikelnummer_check);
    assert_eq!(details[1].naam_hellorider.as_deref(), Some("Super E-Bike X 2024"));
    assert_eq!(details[1].adviesprijs, Some(2420.0));
    assert_eq!(details[2].match_bron, "geen");
    assert_eq!(details[2].adviesprijs, None);
    assert_eq!(details[3].periode, None);
}

#[test]
fn rerun_gives_identical_report() {
    let input = sample_input();
    let cfg = AnalysisConfig::default();
    let first = run(&input, &cfg, &RunControl::default()).unwrap();
    let second = run(&input, &cfg, &RunControl::default()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn sequential_and_parallel_fuzzy_agree() {
    let mut input = sample_input();
    for i in 0..200 {
        input.orders.push(order(Order {
            nr: &format!("P-{i}"),
            article: "nope",
            merk: "Giant",
            soort: if i % 2 == 0 { "elektrisch" } else { "normaal" },
            type_: if i % 3 == 0 { "E-Bike X" } else { "Escape" },
            date: Some((2025, 7, 1)),
            supplier: Some("Zwolle"),
            charged: 900.0 + i as f64,
            max: None,
        }));
    }
    let parallel = AnalysisConfig::default();
    let sequential = AnalysisConfig {
        parallel_fuzzy: false,
        ..AnalysisConfig::default()
    };
    let a = run(&input, &parallel, &RunControl::default()).unwrap();
    let b = run(&input, &sequential, &RunControl::default()).unwrap();
    assert_eq!(a, b);
}

#[test]
fn above_and_upto_15_partition_every_group() {
    let report = run(&sample_input(), &AnalysisConfig::default(), &RunControl::default()).unwrap();
    for row in &report.period_overview {
        assert_eq!(row.boven_15 + row.tot_15, row.totaal_bestellingen);
        assert_eq!(row.max_budget_gelijk + row.max_budget_ongelijk, row.totaal_bestellingen);
    }
    for row in &report.supplier_overview {
        assert_eq!(row.boven_15 + row.tot_15, row.totaal_bestellingen);
    }
}

#[test]
fn empty_input_yields_empty_sheets() {
    let report = run(&AnalysisInput::default(), &AnalysisConfig::default(), &RunControl::default()).unwrap();
    assert!(report.period_overview.is_empty());
    assert!(report.supplier_overview.is_empty());
    assert!(report.deviations_15.is_empty());
    assert!(report.deviations_25.is_empty());
    assert!(report.fraud_suspects.is_empty());
    assert!(report.orders.is_empty());
    assert_eq!(report.stats.total_orders, 0);
}

#[test]
fn ambiguous_formule_fans_out_or_rejects() {
    let mut input = sample_input();
    input.dealers.push(DealerFormulaRecord {
        email: Some("info@fietsplus.nl".into()),
        formule: Some("Profile".into()),
    });

    let report = run(&input, &AnalysisConfig::default(), &RunControl::default()).unwrap();
    let fraud: Vec<_> = report.fraud_suspects.iter().map(|r| r.formule.as_str()).collect();
    assert_eq!(fraud, vec!["Bike Totaal", "Profile"]);

    let strict = AnalysisConfig {
        formula_policy: FormulaPolicy::Reject,
        ..AnalysisConfig::default()
    };
    let err = run(&input, &strict, &RunControl::default()).unwrap_err();
    assert!(matches!(err, AnalysisError::AmbiguousFormula { ref name, count: 2 } if name == "Fietsplus Utrecht"));
}

#[test]
fn duplicate_lookup_key_is_an_error() {
    let row = LookupRecord {
        article_number: "1234".into(),
        brand: Some("Giant".into()),
        advisory_price: Some(1000.0),
        display_name: Some("Escape 3".into()),
        ebike_type: None,
    };
    let rows = vec![row.clone(), row];
    let err = LookupIndex::new(&rows).unwrap_err();
    assert!(matches!(err, AnalysisError::DuplicateLookupKey { ref key } if key == "1234"));
}

struct Counter(AtomicUsize);

impl Progress for Counter {
    fn advance(&self, done: usize, total: usize) {
        assert!(done <= total);
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

#[test]
fn progress_and_cancellation() {
    let input = sample_input();
    let counter = Counter(AtomicUsize::new(0));
    let control = RunControl::default().with_progress(&counter);
    run(&input, &AnalysisConfig::default(), &control).unwrap();
    // B-2 and B-3 have no price after the key match.
    assert_eq!(counter.0.load(Ordering::Relaxed), 2);

    let cancel = CancelToken::new();
    cancel.cancel();
    let control = RunControl::default().with_cancel(cancel);
    let err = run(&input, &AnalysisConfig::default(), &control).unwrap_err();
    assert!(matches!(err, AnalysisError::Cancelled { total: 2, .. }));
}

#[test]
fn workbook_and_csvs_are_written() {
    let dir = tempfile::tempdir().unwrap();
    let report = run(&sample_input(), &AnalysisConfig::default(), &RunControl::default()).unwrap();

    let xlsx = dir.path().join("analyse.xlsx");
    output::write_workbook(&xlsx, &report).unwrap();
    let workbook = open_workbook_auto(&xlsx).unwrap();
    assert_eq!(
        workbook.sheet_names(),
        vec![
            "Totaal overzicht",
            "Leveranciers overzicht",
            "Bestellingen verschil >15%",
            "Bestellingen verschil >25%",
            "Verkoopprijs=max_budget",
            "Alle data Fiscfree",
        ]
    );

    let csv_dir = dir.path().join("csv");
    output::write_report_csvs(&csv_dir, &report).unwrap();
    let suppliers = fs::read_to_string(csv_dir.join("leveranciers_overzicht.csv")).unwrap();
    assert_eq!(
        suppliers.lines().next(),
        Some(
            "Leveranciervestiging,Formule,totaal_misgelopen_marge,totaal_bestellingen,\
             aantal_bestellingen_max_budget_gelijk,aantal_bestellingen_max_budget_ongelijk,\
             aantal_bestellingen_>15%,aantal_bestellingen_<=15%,aantal_bestellingen_>25%"
        )
    );
    let periods = fs::read_to_string(csv_dir.join("totaal_overzicht.csv")).unwrap();
    assert_eq!(
        periods.lines().next(),
        Some(
            "periode,totaal_misgelopen_marge,totaal_bestellingen,pct_max_budget_gelijk,\
             aantal_bestellingen_max_budget_gelijk,aantal_bestellingen_max_budget_ongelijk,\
             aantal_bestellingen_>15%,pct_delta_>15%,aantal_bestellingen_<=15%,\
             aantal_bestellingen_>25%,Comment"
        )
    );
    let fraud = fs::read_to_string(csv_dir.join("verkoopprijs_max_budget.csv")).unwrap();
    assert_eq!(fraud.lines().count(), 2);
    assert!(fraud.lines().nth(1).unwrap().starts_with("Fietsplus Utrecht,Bike Totaal,B-1,"));
}

fn write(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    path
}

#[test]
fn csv_inputs_load_and_analyse() {
    let dir = tempfile::tempdir().unwrap();
    let paths = InputPaths {
        orders: write(
            dir.path(),
            "orders.csv",
            "Artikelnr,Merk,Soort Fiets,Type,Bestelnummer,Besteldatum,Leveranciervestiging,\
             bedraghoofdproductincl,maximaalteverrekenenhoofdproduct,bestelling.verrekeninghoofdproductbedrag\n\
             1234,Giant,normaal,Escape,B-1,2025-05-01,Fietsplus Utrecht,800,800,\n",
        ),
        catalog: write(
            dir.path(),
            "catalog.csv",
            "Ean Code,Brand,Msrp Ex Vat,Name,Ebike Type\n1234,Giant,1000,Escape 3,\n",
        ),
        dealers: write(
            dir.path(),
            "dealers.csv",
            "Dealeroverzicht,,\n\nNaam,E mail,Formule\nFietsplus,info@fietsplus.nl,Bike Totaal\n",
        ),
        email_map: write(
            dir.path(),
            "mail.csv",
            "leverancier_vestiging_email,leverancier_vestiging_naam\ninfo@fietsplus.nl,Fietsplus Utrecht\n",
        ),
        dealer_skip_rows: 1,
    };

    let (input, reports) = load_input(&paths).unwrap();
    assert_eq!(reports.len(), 4);
    assert_eq!(input.orders.len(), 1);

    let report = run(&input, &AnalysisConfig::default(), &RunControl::default()).unwrap();
    assert_eq!(report.fraud_suspects.len(), 1);
    assert_eq!(report.fraud_suspects[0].formule, "Bike Totaal");
    assert_eq!(report.orders[0].adviesprijs, Some(1210.0));
}

#[test]
fn order_times_and_unread_columns_reach_the_workbook() {
    let dir = tempfile::tempdir().unwrap();
    let paths = InputPaths {
        orders: write(
            dir.path(),
            "orders.csv",
            "Artikelnr,Merk,Kenteken,Soort Fiets,Type,Bestelnummer,Besteldatum,Leveranciervestiging,\
             bedraghoofdproductincl,maximaalteverrekenenhoofdproduct,bestelling.verrekeninghoofdproductbedrag\n\
             1234,Giant,AB-12-CD,normaal,Escape,B-1,2025-04-01 13:45:00,Zwolle,800,900,\n\
             1234,Giant,EF-34-GH,normaal,Escape,B-2,2024-12-31 09:00:00,Zwolle,800,900,\n\
             1234,Giant,,normaal,Escape,B-3,2025-04-01,Zwolle,800,900,\n",
        ),
        catalog: write(
            dir.path(),
            "catalog.csv",
            "Ean Code,Brand,Msrp Ex Vat,Name,Ebike Type\n1234,Giant,1000,Escape 3,\n",
        ),
        dealers: write(dir.path(), "dealers.csv", "Naam,E mail,Formule\n"),
        email_map: write(
            dir.path(),
            "mail.csv",
            "leverancier_vestiging_email,leverancier_vestiging_naam\n",
        ),
        dealer_skip_rows: 0,
    };
    let (input, _) = load_input(&paths).unwrap();
    let report = run(&input, &AnalysisConfig::default(), &RunControl::default()).unwrap();

    // Midnight bounds: later on an end day is outside every period.
    let periods: Vec<_> = report.orders.iter().map(|r| r.periode.as_deref()).collect();
    assert_eq!(periods, vec![None, None, Some("Tussen 1-1-2025 en 2-4-2025")]);
    assert_eq!(report.stats.unclassified_period, 2);
    assert_eq!(
        report.orders[0].besteldatum,
        NaiveDate::from_ymd_opt(2025, 4, 1).and_then(|d| d.and_hms_opt(13, 45, 0))
    );

    let xlsx = dir.path().join("analyse.xlsx");
    output::write_workbook(&xlsx, &report).unwrap();
    let mut workbook = open_workbook_auto(&xlsx).unwrap();
    let sheet = workbook.worksheet_range("Alle data Fiscfree").unwrap();
    let mut rows = sheet.rows();
    let header: Vec<String> = rows.next().unwrap().iter().map(|c| c.to_string()).collect();
    assert_eq!(header[9], "bestelling.verrekeninghoofdproductbedrag");
    assert_eq!(header[10], "Kenteken");
    assert_eq!(header[11], "Brand_hr");
    let first: Vec<String> = rows.next().unwrap().iter().map(|c| c.to_string()).collect();
    assert_eq!(first[10], "AB-12-CD");

    let csv_dir = dir.path().join("csv");
    output::write_report_csvs(&csv_dir, &report).unwrap();
    let details = fs::read_to_string(csv_dir.join("alle_data_fiscfree.csv")).unwrap();
    let lines: Vec<&str> = details.lines().collect();
    assert!(lines[0].contains("bestelling.verrekeninghoofdproductbedrag,Kenteken,Brand_hr"));
    assert!(lines[1].starts_with("B-1,2025-04-01 13:45:00,Zwolle,Giant,normaal,Escape,1234,800,900,,AB-12-CD,"));
    assert!(lines[3].contains(",900,,,Giant,"));
}
