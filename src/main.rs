use anyhow::{Context, Result};
use clap::Parser;
use memmap2::Mmap;
use scraper::Html;
use std::fs::File;
use std::io::{self, Read, Write};
use std::time::Instant;
use tablestamp::config::{self, Settings, Zone};
use tablestamp::output;
use tablestamp::table::{Reformatter, Summary};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

/// Rewrites the timestamp column of HTML tables as `YYYY-MM-DD HH:MM:SS.mmm`.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input HTML document, `-` for stdin
    #[arg(value_name = "FILE", default_value = "-")]
    file: String,

    /// Where to write the rewritten document, `-` for stdout
    #[arg(short, long, default_value = "-")]
    output: String,

    /// Zero-based index of the timestamp cell in each row
    #[arg(short, long, default_value_t = config::DEFAULT_COLUMN)]
    column: usize,

    #[arg(long, default_value = config::DEFAULT_ROW_SELECTOR)]
    rows: String,

    #[arg(long, default_value = config::DEFAULT_CELL_SELECTOR)]
    cells: String,

    /// `local`, `utc` or a fixed offset such as `+02:00`
    #[arg(long, default_value = "local")]
    tz: Zone,

    /// Per-row report: `stdout`, `json`, or a .json/.jsonl/.csv/.tsv path
    #[arg(long)]
    report: Option<String>,

    #[arg(long)]
    stats: bool,
}

impl Args {
    fn settings(&self) -> Settings {
        Settings {
            row_selector: self.rows.clone(),
            cell_selector: self.cells.clone(),
            column: self.column,
            zone: self.tz,
        }
    }
}

fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let start_time = Instant::now();

    output::check_streams(&args.output, args.report.as_deref())?;

    let settings = args.settings();
    let reformatter = Reformatter::new(&settings)?;

    let (mut doc, input_size) = load(&args.file)?;
    let reports = reformatter.apply(&mut doc);
    let summary = Summary::from_reports(&reports);
    info!(
        rows = summary.rows,
        reformatted = summary.reformatted,
        unchanged = summary.unchanged(),
        zone = %settings.zone,
        "reformatted timestamp column"
    );

    write_document(&args.output, &doc.html())?;

    if let Some(report) = &args.report {
        output::write(report, &reports).with_context(|| format!("writing report to {report}"))?;
    }

    if args.stats {
        print_stats(input_size, &summary, start_time.elapsed());
    }

    Ok(())
}

fn load(path: &str) -> Result<(Html, u64)> {
    if path == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("reading document from stdin")?;
        return Ok((Html::parse_document(&buf), buf.len() as u64));
    }

    let file = File::open(path).with_context(|| format!("opening {path}"))?;
    // mmap the file
    let mmap = unsafe { Mmap::map(&file).with_context(|| format!("mapping {path}"))? };
    let text = std::str::from_utf8(&mmap).with_context(|| format!("{path} is not valid UTF-8"))?;
    Ok((Html::parse_document(text), mmap.len() as u64))
}

fn write_document(path: &str, html: &str) -> Result<()> {
    if path == "-" {
        let mut stdout = io::stdout().lock();
        stdout.write_all(html.as_bytes())?;
        stdout.flush()?;
        return Ok(());
    }
    output::create_parent_dirs(path)?;
    std::fs::write(path, html).with_context(|| format!("writing {path}"))
}

fn print_stats(input_size: u64, summary: &Summary, duration: std::time::Duration) {
    let duration_secs = duration.as_secs_f64();
    let size_kb = input_size as f64 / 1024.0;
    let throughput_rows = summary.rows as f64 / duration_secs;

    eprintln!("\n=== TABLESTAMP STATS ===");
    eprintln!("Input size: {:.2} KB", size_kb);
    eprintln!("Rows: {}", summary.rows);
    eprintln!("Reformatted: {}", summary.reformatted);
    eprintln!("Missing cell: {}", summary.missing_cell);
    eprintln!("No match: {}", summary.no_match);
    eprintln!("Invalid date: {}", summary.invalid_date);
    eprintln!("Processing time: {:.3}s", duration_secs);
    eprintln!("Throughput: {:.0} rows/s", throughput_rows);
    if summary.rows > 0 {
        eprintln!(
            "Reformat rate: {:.1}%",
            (summary.reformatted as f64 / summary.rows as f64) * 100.0
        );
    }
}
