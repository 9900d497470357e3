// Entry point and high-level CLI flow.
//
// - Option [1] loads and cleans the four input tables, printing diagnostics.
// - Option [2] runs the analysis, writes the workbook (plus optional CSVs)
//   and a JSON summary, and previews every sheet.
// - After a run the user can go back to the menu or exit.
//
// With `--batch` both steps run once without prompting.
use std::io::{self, Write};
use std::path::Path;
use std::process::ExitCode;
use std::sync::{Arc, Mutex, MutexGuard};

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use once_cell::sync::Lazy;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use marge_analyse::loader::{self, LoadReport};
use marge_analyse::output;
use marge_analyse::util;
use marge_analyse::{
    AnalysisInput, AnalysisReport, CancelToken, CliArgs, Progress, Result, RunControl,
};

// Loaded tables, kept so the analysis can be rerun without reloading.
static APP_STATE: Lazy<Mutex<AppState>> = Lazy::new(|| Mutex::new(AppState { data: None }));

struct AppState {
    data: Option<Arc<AnalysisInput>>,
}

fn state() -> MutexGuard<'static, AppState> {
    APP_STATE.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Fuzzy-match progress on stderr.
struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::with_template("fuzzy match [{bar:40}] {pos}/{len} ({eta})") {
            bar.set_style(style.progress_chars("=> "));
        }
        Self { bar }
    }
}

impl Progress for BarProgress {
    fn advance(&self, done: usize, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_position(done as u64);
    }
}

/// Read a single line of input after printing the common "Enter choice:" prompt.
fn read_choice() -> String {
    print!("Enter choice: ");
    let _ = io::stdout().flush();
    let mut buf = String::new();
    io::stdin().read_line(&mut buf).ok();
    buf.trim().to_string()
}

/// Returns `true` if the user chose `Y`, `false` if they chose `N`.
fn prompt_back_to_menu() -> bool {
    loop {
        print!("Back to the menu (Y/N): ");
        let _ = io::stdout().flush();
        let mut buf = String::new();
        io::stdin().read_line(&mut buf).ok();
        let resp = buf.trim().to_uppercase();
        match resp.as_str() {
            "Y" => return true,
            "N" => return false,
            _ => println!("Invalid choice. Please enter Y or N."),
        }
    }
}

fn print_load_report(r: &LoadReport) {
    println!(
        "{}: {} rows loaded, {} skipped, {} unreadable values",
        r.table,
        util::format_int(r.total_rows as u64),
        util::format_int(r.parse_errors as u64),
        util::format_int(r.bad_values as u64)
    );
}

/// Handle option [1]: load and clean the four input tables.
fn handle_load(args: &CliArgs) -> bool {
    match loader::load_input(&args.input_paths()) {
        Ok((data, reports)) => {
            for r in &reports {
                print_load_report(r);
            }
            println!();
            state().data = Some(Arc::new(data));
            true
        }
        Err(e) => {
            error!(error = %e, "loading failed");
            eprintln!("Failed to load the input files: {}\n", e);
            false
        }
    }
}

fn write_outputs(args: &CliArgs, report: &AnalysisReport) -> Result<()> {
    output::write_workbook(&args.out, report)?;
    info!(path = %args.out.display(), "workbook written");
    if let Some(dir) = &args.csv_dir {
        output::write_report_csvs(dir, report)?;
        info!(dir = %dir.display(), "csv files written");
    }
    output::write_json(Path::new("summary.json"), &report.stats)?;
    Ok(())
}

fn print_previews(report: &AnalysisReport) {
    println!("Totaal overzicht\n");
    output::preview_table_rows(&report.period_overview, 3);
    println!("Leveranciers overzicht\n");
    output::preview_table_rows(&report.supplier_overview, 3);
    println!("Bestellingen verschil >15%\n");
    output::preview_table_rows(&report.deviations_15, 2);
    println!("Bestellingen verschil >25%\n");
    output::preview_table_rows(&report.deviations_25, 2);
    println!("Verkoopprijs=max_budget\n");
    output::preview_table_rows(&report.fraud_suspects, 2);

    let s = &report.stats;
    println!("Summary (summary.json):");
    println!(
        "{} orders, {} exact, {} fuzzy, {} unmatched, {} at max budget, missed margin {}\n",
        util::format_int(s.total_orders as u64),
        util::format_int(s.exact_matches as u64),
        util::format_int(s.fuzzy_matches as u64),
        util::format_int(s.unmatched as u64),
        util::format_int(s.fraud_suspects as u64),
        util::format_number(s.total_missed_margin, 2)
    );
}

/// Handle option [2]: run the analysis and write every output.
fn handle_analysis(args: &CliArgs) -> bool {
    let data = state().data.clone();
    let Some(data) = data else {
        println!("Error: No data loaded. Please load the files first (option 1).\n");
        return false;
    };

    let cfg = args.analysis_config();
    let cancel = match args.timeout() {
        Some(t) => CancelToken::with_timeout(t),
        None => CancelToken::new(),
    };
    let progress = BarProgress::new();
    let control = RunControl::default()
        .with_cancel(cancel)
        .with_progress(&progress);

    println!("Running analysis...");
    let result = marge_analyse::run(&data, &cfg, &control);
    progress.bar.finish_and_clear();
    let report = match result {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "analysis failed");
            eprintln!("Analysis failed: {}\n", e);
            return false;
        }
    };

    if let Err(e) = write_outputs(args, &report) {
        error!(error = %e, "writing outputs failed");
        eprintln!("Write error: {}\n", e);
        return false;
    }
    println!("Workbook saved to {}\n", args.out.display());
    print_previews(&report);
    true
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() -> ExitCode {
    let args = CliArgs::parse();
    init_tracing();

    if args.batch {
        let ok = handle_load(&args) && handle_analysis(&args);
        return if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE };
    }

    loop {
        println!("Margin analysis");
        println!("[1] Load the files");
        println!("[2] Run analysis\n");
        match read_choice().as_str() {
            "1" => {
                handle_load(&args);
            }
            "2" => {
                println!();
                handle_analysis(&args);
                if !prompt_back_to_menu() {
                    println!("Exiting the program.");
                    break;
                }
            }
            _ => {
                println!("Invalid choice. Please enter 1 or 2.\n");
            }
        }
    }
    ExitCode::SUCCESS
}
