use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use argus_core::models::DateRange;
use argus_core::{HarvestConfig, extract_company};
use argus_store::CsvRecordStore;

/// Months harvested when no span is given: the current one and the four before it.
const DEFAULT_SPAN_MONTHS: u32 = 4;

#[derive(Parser)]
#[command(name = "argus", version, about = "Company registry harvester")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest companies registered in a span of months, newest first
    Harvest {
        /// Newest month to harvest (YYYY-MM, defaults to the current month)
        #[arg(long)]
        from: Option<String>,

        /// Oldest month to harvest (YYYY-MM, defaults to four months before --from)
        #[arg(long)]
        to: Option<String>,

        /// Directory receiving one CSV file per month
        #[arg(short, long, env = "ARGUS_OUTPUT_DIR", default_value = "output")]
        output_dir: PathBuf,

        /// Advanced-search page of the registry
        #[arg(long, env = "ARGUS_SEARCH_URL", default_value = argus_core::config::DEFAULT_SEARCH_URL)]
        search_url: String,

        /// First listing page to read (resume point)
        #[arg(long, default_value_t = 1)]
        start_page: u32,

        /// Last listing page to read
        #[arg(long, default_value_t = 560)]
        max_page: u32,

        /// Attempts per month before it is reported as failed
        #[arg(long, default_value_t = 3)]
        max_retries: u32,

        /// Visits between two flushes to the output file
        #[arg(long, default_value_t = 10)]
        flush_every: usize,

        /// Run the browser without a window
        #[arg(long, env = "ARGUS_HEADLESS", default_value_t = false)]
        headless: bool,

        /// Challenge solver client key
        #[arg(long, env = "ARGUS_SOLVER_KEY", hide_env_values = true)]
        solver_key: String,

        /// Directory for diagnostic screenshots (disabled when absent)
        #[arg(long, env = "ARGUS_SCREENSHOTS")]
        screenshots: Option<PathBuf>,
    },

    /// Extract one company from a saved detail page and print it as JSON
    Extract {
        /// Saved HTML of a company page
        #[arg(short, long)]
        file: PathBuf,

        /// URL the page was saved from
        #[arg(short, long, default_value = "")]
        url: String,
    },

    /// Show stored records of one month
    Show {
        /// Month to show (YYYY-MM); lists stored months when absent
        #[arg(short, long)]
        month: Option<String>,

        /// Directory holding the CSV files
        #[arg(short, long, env = "ARGUS_OUTPUT_DIR", default_value = "output")]
        output_dir: PathBuf,

        /// Number of records to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("argus=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Harvest {
            from,
            to,
            output_dir,
            search_url,
            start_page,
            max_page,
            max_retries,
            flush_every,
            headless,
            solver_key,
            screenshots,
        } => {
            let months = month_span(from.as_deref(), to.as_deref())?;
            let config = HarvestConfig::default()
                .with_search_url(&search_url)
                .and_then(|c| c.with_pages(start_page, max_page))
                .and_then(|c| c.with_max_retries(max_retries))
                .and_then(|c| c.with_flush_every(flush_every))
                .map_err(|e| anyhow::anyhow!(e))
                .context("Invalid harvest settings")?;
            let store = CsvRecordStore::new(output_dir);
            let options = HarvestOptions {
                headless,
                solver_key,
                screenshots,
            };
            cmd_harvest(&months, config, store, options).await?;
        }
        Commands::Extract { file, url } => {
            cmd_extract(&file, &url)?;
        }
        Commands::Show {
            month,
            output_dir,
            limit,
        } => {
            let store = CsvRecordStore::new(output_dir);
            cmd_show(&store, month.as_deref(), limit)?;
        }
    }

    Ok(())
}

/// Months from `from` back to `to`, newest first.
fn month_span(from: Option<&str>, to: Option<&str>) -> Result<Vec<DateRange>> {
    let newest = match from {
        Some(m) => DateRange::parse_month(m).map_err(|e| anyhow::anyhow!(e))?,
        None => DateRange::containing(chrono::Utc::now().date_naive()),
    };
    let oldest = match to {
        Some(m) => DateRange::parse_month(m).map_err(|e| anyhow::anyhow!(e))?,
        None => newest
            .start()
            .checked_sub_months(chrono::Months::new(DEFAULT_SPAN_MONTHS))
            .map(DateRange::containing)
            .context("Month span out of range")?,
    };
    if oldest.start() > newest.start() {
        anyhow::bail!("--to ({}) is newer than --from ({})", oldest.label(), newest.label());
    }
    Ok(DateRange::months_descending(newest, oldest))
}

struct HarvestOptions {
    headless: bool,
    solver_key: String,
    screenshots: Option<PathBuf>,
}

#[cfg(feature = "browser")]
async fn cmd_harvest(
    months: &[DateRange],
    config: HarvestConfig,
    store: CsvRecordStore,
    options: HarvestOptions,
) -> Result<()> {
    use argus_client::{BrowserOptions, ChromiumPage, RuCaptchaSolver};
    use argus_core::{BatchOrchestrator, TracingBatchReporter};

    let solver = RuCaptchaSolver::new(&options.solver_key)
        .map_err(|e| anyhow::anyhow!(e))
        .context("Failed to create challenge solver")?;
    let browser_options = BrowserOptions {
        headless: options.headless,
        screenshot_dir: options.screenshots,
        navigation_timeout: config.page_load_timeout,
        ..BrowserOptions::default()
    };
    let page = ChromiumPage::launch(browser_options)
        .await
        .map_err(|e| anyhow::anyhow!(e))
        .context("Failed to start browser")?;

    tracing::info!(
        months = months.len(),
        output = %store.dir().display(),
        "Harvest starting"
    );

    let orchestrator = BatchOrchestrator::new(page, solver, store, config);
    let reporter = TracingBatchReporter;
    let summary = tokio::select! {
        summary = orchestrator.run(months, &reporter) => Some(summary),
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, records flushed so far are kept");
            None
        }
    };

    if let Err(e) = orchestrator.into_page().close().await {
        tracing::warn!(error = %e, "Browser did not close cleanly");
    }

    let Some(summary) = summary else {
        return Ok(());
    };

    println!("\nHarvest finished: {} records persisted", summary.persisted);
    for range in &summary.succeeded {
        println!("  [ok]     {} ({range})", range.label());
    }
    for (range, error) in &summary.failed {
        println!("  [failed] {} ({range}): {error}", range.label());
    }

    if !summary.is_complete() {
        anyhow::bail!("{} of {} months failed", summary.failed.len(), months.len());
    }
    Ok(())
}

#[cfg(not(feature = "browser"))]
async fn cmd_harvest(
    _months: &[DateRange],
    _config: HarvestConfig,
    _store: CsvRecordStore,
    _options: HarvestOptions,
) -> Result<()> {
    anyhow::bail!("harvest needs a browser; rebuild with --features browser")
}

fn cmd_extract(file: &Path, url: &str) -> Result<()> {
    let html = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let Some(record) = extract_company(&html, url) else {
        anyhow::bail!("No tax ID found in {}", file.display());
    };
    if !record.is_valid_for_persistence() {
        tracing::warn!(tax_id = %record.tax_id, "Record has no contact and would not be stored");
    }

    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

fn cmd_show(store: &CsvRecordStore, month: Option<&str>, limit: usize) -> Result<()> {
    let Some(month) = month else {
        let targets = store.targets().map_err(|e| anyhow::anyhow!(e))?;
        if targets.is_empty() {
            println!("No stored months in {}", store.dir().display());
        } else {
            println!("Stored months in {}:", store.dir().display());
            for target in targets {
                println!("  {target}");
            }
        }
        return Ok(());
    };

    let range = DateRange::parse_month(month).map_err(|e| anyhow::anyhow!(e))?;
    let target = range.target();
    let records = store
        .read(&target)
        .map_err(|e| anyhow::anyhow!(e))
        .with_context(|| format!("Failed to read {target}"))?;

    if records.is_empty() {
        println!("No records stored for {target}");
        return Ok(());
    }

    println!("Records for {target} ({range}):\n");
    for record in records.iter().take(limit) {
        let contact = record
            .phones
            .first()
            .map(String::as_str)
            .or(record.email.as_deref())
            .unwrap_or("-");
        println!(
            "  {} | {} | {} | {}",
            record.tax_id,
            record.registration_date.as_deref().unwrap_or("-"),
            record.director_name.as_deref().unwrap_or("-"),
            contact,
        );
    }

    println!("\nTotal: {} records", records.len());
    Ok(())
}
