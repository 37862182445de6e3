//! CLI binary for tariffscan.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ParseConfig` / `ResolverConfig` and prints results.

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tariffscan::{
    calendar, discover_links, fetch_links, parse_bytes, resolve_all, Catalog, DiscoveredLink,
    DocumentFormat, ParseConfig, ParseOutput, PatternLibrary, ResolutionObserver, ResolverConfig,
    Retrieval, SeasonCalendar, SourceDescriptor, SourceRef,
};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI observer using indicatif ─────────────────────────────────────────────

/// Spinner that narrates source resolution: one line per failed candidate,
/// a green tick for the one that resolved.
struct CliObserver {
    bar: ProgressBar,
}

impl CliObserver {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Resolving");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ResolutionObserver for CliObserver {
    fn on_candidate_start(&self, index: usize, total: usize, source: &str) {
        self.bar.set_message(format!("[{index}/{total}] {source}"));
    }

    fn on_candidate_failed(&self, _index: usize, _total: usize, source: &str, reason: &str) {
        // Truncate very long reasons to keep output tidy.
        let reason = if reason.chars().count() > 80 {
            let cut: String = reason.chars().take(79).collect();
            format!("{cut}\u{2026}")
        } else {
            reason.to_string()
        };
        self.bar
            .println(format!("  {} {}  {}", red("✗"), source, dim(&reason)));
    }

    fn on_candidate_resolved(
        &self,
        _index: usize,
        _total: usize,
        source: &str,
        retrieval: &Retrieval,
    ) {
        let how = match retrieval {
            Retrieval::Bundled { .. } => "bundled",
            Retrieval::Cached { .. } => "cache",
            Retrieval::Downloaded { .. } => "downloaded",
            Retrieval::InMemory => "memory",
        };
        self.bar
            .println(format!("  {} {}  {}", green("✓"), source, dim(how)));
    }

    fn on_retry(&self, source: &str, attempt: u32, max_retries: u32) {
        self.bar
            .set_message(format!("retry {attempt}/{max_retries} {source}"));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Parse a local rate summary
  tariffscan parse co_electric_2025-04-01.pdf

  # Only the 4 most rate-heavy pages of a full tariff book, JSON output
  tariffscan parse --max-pages 4 --json Entire_Tariff.pdf > schedule.json

  # Resolve the newest available source from the catalog
  tariffscan resolve --catalog sources.json --data-dir data xcel_energy electric

  # Resolve every provider/service in the catalog, 4 at a time
  tariffscan resolve --catalog sources.json --all --concurrency 4 --json

  # Record a new source (effective date taken from the file name)
  tariffscan sources add --catalog sources.json xcel_energy electric \
      --source https://example.com/Summary_04-01-2025.pdf

  # Find document links on a rate-book page
  tariffscan sources discover https://example.com/rate_books --keyword "summary of"

  # ...and record every dated one in the catalog
  tariffscan sources discover https://example.com/rate_books --add \
      --catalog sources.json --provider xcel_energy --service electric

ENVIRONMENT VARIABLES:
  TARIFFSCAN_CATALOG     Catalog file (sources.json)
  TARIFFSCAN_DATA_DIR    Base directory for file:// sources
  TARIFFSCAN_CACHE_DIR   Cache directory for downloaded documents
  TARIFFSCAN_SEASONS     Default season calendar, e.g. summer=6-9;winter=1-5,10-12
  PDFIUM_LIB_PATH        Directory containing libpdfium
  RUST_LOG               Overrides the log filter
"#;

/// Extract normalized utility rate schedules from tariff documents.
#[derive(Parser, Debug)]
#[command(
    name = "tariffscan",
    version,
    about = "Extract normalized utility rate schedules from tariff PDFs and rate summaries",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "TARIFFSCAN_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "TARIFFSCAN_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse a local document (PDF or text).
    Parse(ParseArgs),
    /// Resolve catalog sources and parse the first available one.
    Resolve(ResolveArgs),
    /// Inspect or edit the source catalog.
    #[command(subcommand)]
    Sources(SourcesCommand),
    /// List the field ids of the standard pattern library.
    Fields,
}

#[derive(Args, Debug)]
struct ParseOpts {
    /// Default season calendar, e.g. "summer=6-9;winter=1-5,10-12".
    #[arg(long, env = "TARIFFSCAN_SEASONS")]
    seasons: Option<String>,

    /// Keep only the N most relevant pages.
    #[arg(long, env = "TARIFFSCAN_MAX_PAGES")]
    max_pages: Option<usize>,

    /// Directory containing the pdfium library.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib_path: Option<PathBuf>,

    /// Output structured JSON (ParseOutput) instead of a summary.
    #[arg(long, env = "TARIFFSCAN_JSON")]
    json: bool,
}

#[derive(Args, Debug)]
struct ParseArgs {
    /// Local document path.
    file: PathBuf,

    #[command(flatten)]
    opts: ParseOpts,
}

#[derive(Args, Debug)]
struct ResolveArgs {
    /// Catalog file.
    #[arg(long, env = "TARIFFSCAN_CATALOG")]
    catalog: PathBuf,

    /// Provider key, e.g. xcel_energy.
    #[arg(required_unless_present = "all")]
    provider: Option<String>,

    /// Service type, e.g. electric.
    #[arg(required_unless_present = "all")]
    service: Option<String>,

    /// Resolve every provider/service pair in the catalog.
    #[arg(long, conflicts_with_all = ["provider", "service"])]
    all: bool,

    /// Base directory for file:// sources.
    #[arg(long, env = "TARIFFSCAN_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Cache directory for downloaded documents.
    #[arg(long, env = "TARIFFSCAN_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// HTTP timeout in seconds.
    #[arg(long, env = "TARIFFSCAN_TIMEOUT", default_value_t = 10)]
    timeout: u64,

    /// Retries for transient network failures.
    #[arg(long, env = "TARIFFSCAN_MAX_RETRIES", default_value_t = 1)]
    max_retries: u32,

    /// Parallel resolutions with --all.
    #[arg(short, long, env = "TARIFFSCAN_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Expect plain-text documents instead of PDFs.
    #[arg(long)]
    text: bool,

    #[command(flatten)]
    opts: ParseOpts,
}

#[derive(Subcommand, Debug)]
enum SourcesCommand {
    /// List catalog entries, newest first.
    List {
        #[arg(long, env = "TARIFFSCAN_CATALOG")]
        catalog: PathBuf,
    },
    /// Add or replace a catalog entry.
    Add(AddArgs),
    /// Find document links on a rate-book web page.
    Discover(DiscoverArgs),
}

#[derive(Args, Debug)]
struct DiscoverArgs {
    /// Page URL.
    url: String,
    /// Also accept non-PDF links whose text contains this keyword.
    #[arg(long = "keyword")]
    keywords: Vec<String>,
    /// Read the page from a saved HTML file instead of fetching it.
    #[arg(long)]
    html: Option<PathBuf>,
    #[arg(long, env = "TARIFFSCAN_TIMEOUT", default_value_t = 10)]
    timeout: u64,
    /// Add every dated link to the catalog under --provider/--service.
    #[arg(long, requires_all = ["catalog", "provider", "service"])]
    add: bool,
    #[arg(long, env = "TARIFFSCAN_CATALOG")]
    catalog: Option<PathBuf>,
    #[arg(long)]
    provider: Option<String>,
    #[arg(long)]
    service: Option<String>,
}

#[derive(Args, Debug)]
struct AddArgs {
    #[arg(long, env = "TARIFFSCAN_CATALOG")]
    catalog: PathBuf,
    provider: String,
    service: String,
    /// file://name.pdf, a path, or an http(s) URL.
    #[arg(long)]
    source: String,
    /// YYYY-MM-DD. Default: inferred from the file name, else today.
    #[arg(long)]
    effective_date: Option<NaiveDate>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    version: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs while the spinner is active; the
    // spinner provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && matches!(&cli.command, Command::Resolve(a) if !a.opts.json);
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Parse(args) => cmd_parse(args),
        Command::Resolve(args) => cmd_resolve(args, show_progress).await,
        Command::Sources(SourcesCommand::List { catalog }) => cmd_sources_list(&catalog),
        Command::Sources(SourcesCommand::Add(args)) => cmd_sources_add(args),
        Command::Sources(SourcesCommand::Discover(args)) => cmd_sources_discover(args).await,
        Command::Fields => {
            cmd_fields();
            Ok(())
        }
    }
}

/// Map shared parse flags to `ParseConfig`.
fn build_parse_config(opts: &ParseOpts, concurrency: Option<usize>) -> Result<ParseConfig> {
    let mut builder = ParseConfig::builder();
    if let Some(ref spec) = opts.seasons {
        let calendar = SeasonCalendar::parse(spec).context("Invalid --seasons")?;
        builder = builder.season_calendar(calendar);
    }
    if let Some(n) = opts.max_pages {
        builder = builder.max_pages(n);
    }
    if let Some(ref dir) = opts.pdfium_lib_path {
        builder = builder.pdfium_lib_path(dir);
    }
    if let Some(n) = concurrency {
        builder = builder.concurrency(n);
    }
    builder.build().context("Invalid configuration")
}

fn cmd_parse(args: ParseArgs) -> Result<()> {
    let config = build_parse_config(&args.opts, None)?;
    let bytes = std::fs::read(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let output = parse_bytes(&bytes, &config)
        .with_context(|| format!("Failed to parse {}", args.file.display()))?;
    if args.opts.json {
        println!("{}", output.to_json_pretty().context("Failed to serialise output")?);
    } else {
        print_summary(&args.file.display().to_string(), &output);
    }
    Ok(())
}

async fn cmd_resolve(args: ResolveArgs, show_progress: bool) -> Result<()> {
    let catalog = Catalog::load(&args.catalog).context("Failed to load catalog")?;
    let config = build_parse_config(&args.opts, Some(args.concurrency))?;

    let targets: Vec<(String, String)> = if args.all {
        catalog
            .services()
            .into_iter()
            .map(|(p, s)| (p.to_string(), s.to_string()))
            .collect()
    } else {
        match (&args.provider, &args.service) {
            (Some(p), Some(s)) => vec![(p.clone(), s.clone())],
            _ => bail!("PROVIDER and SERVICE are required unless --all is given"),
        }
    };
    let requests: Vec<Vec<SourceDescriptor>> = targets
        .iter()
        .map(|(p, s)| catalog.candidates(p, s))
        .collect();
    if let Some(((p, s), _)) = targets.iter().zip(&requests).find(|(_, c)| c.is_empty()) {
        bail!("Catalog has no entries for {p}/{s}");
    }

    let observer = show_progress.then(CliObserver::new);
    let mut builder = ResolverConfig::builder()
        .timeout_secs(args.timeout)
        .max_retries(args.max_retries);
    if let Some(ref dir) = args.data_dir {
        builder = builder.data_dir(dir);
    }
    if let Some(ref dir) = args.cache_dir {
        builder = builder.cache_dir(dir);
    }
    if args.text {
        builder = builder.expected_format(DocumentFormat::PlainText);
    }
    if let Some(ref obs) = observer {
        builder = builder.observer(obs.clone() as Arc<dyn ResolutionObserver>);
    }
    let resolver = builder.build().context("Invalid configuration")?;

    let results = resolve_all(&requests, &resolver, &config).await;
    if let Some(obs) = observer {
        obs.finish();
    }

    let mut failures = 0usize;
    let mut json = serde_json::Map::new();
    for ((provider, service), result) in targets.iter().zip(results) {
        let key = format!("{provider}/{service}");
        match result {
            Ok(output) if args.opts.json => {
                let value = serde_json::to_value(&output).context("Failed to serialise output")?;
                json.insert(key, value);
            }
            Ok(output) => print_summary(&key, &output),
            Err(e) => {
                failures += 1;
                eprintln!("{} {}: {}", red("✘"), bold(&key), e);
            }
        }
    }
    if args.opts.json {
        let value = if args.all {
            serde_json::Value::Object(json)
        } else {
            json.into_iter()
                .next()
                .map(|(_, v)| v)
                .unwrap_or(serde_json::Value::Null)
        };
        println!("{}", serde_json::to_string_pretty(&value).context("Failed to serialise output")?);
    }
    if failures > 0 {
        bail!("{failures} of {} resolution(s) failed", targets.len());
    }
    Ok(())
}

fn cmd_sources_list(path: &Path) -> Result<()> {
    let catalog = Catalog::load(path).context("Failed to load catalog")?;
    println!("{} {}", bold("Catalog version"), catalog.version);
    for (provider, service) in catalog.services() {
        println!("\n{}", bold(&format!("{provider} / {service}")));
        for entry in catalog.candidates(provider, service) {
            println!(
                "  {}  {}  {}{}",
                entry.effective_date,
                entry.source,
                dim(&entry.description),
                entry
                    .version
                    .as_deref()
                    .map(|v| format!("  [{v}]"))
                    .unwrap_or_default()
            );
        }
    }
    Ok(())
}

fn cmd_sources_add(args: AddArgs) -> Result<()> {
    let source: SourceRef = args.source.parse().context("Invalid --source")?;
    let effective_date = args
        .effective_date
        .or_else(|| {
            source
                .file_name()
                .and_then(|n| tariffscan::effective_date_from_filename(&n))
        })
        .unwrap_or_else(|| Local::now().date_naive());
    let description = args.description.unwrap_or_else(|| {
        format!("{} rates effective {effective_date}", title_case(&args.service))
    });

    let mut entry = SourceDescriptor::new(source, effective_date, description);
    if let Some(v) = args.version {
        entry = entry.with_version(v);
    }
    let mut catalog = Catalog::load_or_default(&args.catalog).context("Failed to load catalog")?;
    let replaced = catalog.upsert(&args.provider, &args.service, entry);
    catalog.save(&args.catalog).context("Failed to save catalog")?;

    let latest = catalog.candidates(&args.provider, &args.service);
    eprintln!(
        "{} {} {}/{}  ({} version(s), latest {})",
        green("✔"),
        if replaced { "Updated" } else { "Added" },
        args.provider,
        args.service,
        latest.len(),
        latest
            .first()
            .map(|e| e.effective_date.to_string())
            .unwrap_or_default()
    );
    Ok(())
}

async fn cmd_sources_discover(args: DiscoverArgs) -> Result<()> {
    let keywords: Vec<&str> = args.keywords.iter().map(String::as_str).collect();
    let links = match &args.html {
        Some(path) => {
            let page = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            discover_links(&page, &args.url, &keywords)?
        }
        None => {
            let resolver = ResolverConfig::builder()
                .timeout_secs(args.timeout)
                .build()
                .context("Invalid configuration")?;
            fetch_links(&args.url, &keywords, &resolver)
                .await
                .context("Link discovery failed")?
        }
    };
    for link in &links {
        let date = link
            .effective_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| yellow("undated"));
        println!("{date:<10}  {}  {}", link.url, dim(&link.text));
    }
    eprintln!("{} link(s)", links.len());

    if !args.add {
        return Ok(());
    }
    let (Some(path), Some(provider), Some(service)) =
        (&args.catalog, &args.provider, &args.service)
    else {
        bail!("--add needs --catalog, --provider and --service");
    };
    let mut catalog = Catalog::load_or_default(path).context("Failed to load catalog")?;
    let mut added = 0;
    for descriptor in links.iter().filter_map(DiscoveredLink::to_descriptor) {
        catalog.upsert(provider, service, descriptor);
        added += 1;
    }
    catalog.save(path).context("Failed to save catalog")?;
    eprintln!(
        "{} {added} catalog entr{} for {provider}/{service}, {} undated link(s) skipped",
        green("✔"),
        if added == 1 { "y" } else { "ies" },
        links.len() - added
    );
    Ok(())
}

fn cmd_fields() {
    let library = PatternLibrary::standard();
    println!("{} {}", bold("Pattern library"), library.version());
    for id in library.field_ids() {
        println!("  {id}");
    }
}

fn print_summary(label: &str, output: &ParseOutput) {
    let s = &output.schedule;
    let d = &output.diagnostics;
    println!("{}", bold(label));
    if let Some(date) = s.effective_date() {
        println!("  Effective:      {date}");
    }
    if let Some(src) = &s.provenance().source {
        println!("  Source:         {}  {}", src.source, dim(&src.effective_date.to_string()));
    }
    for (season, rate) in s.rates() {
        println!("  Energy {season:<8} ${rate}/kWh");
    }
    for (season, tiers) in s.tiered_rates() {
        for (tier, rate) in tiers {
            println!("  Tier {season:<6} {tier:<9} ${rate}/kWh");
        }
    }
    for (season, periods) in s.tou_rates() {
        for (period, rate) in periods {
            println!("  TOU {season:<6} {period:<9} ${rate}/kWh");
        }
    }
    for (name, charge) in s.fixed_charges() {
        println!("  {name:<15} ${} {:?}", charge.amount, charge.basis);
    }
    for (period, range) in s.tou_periods() {
        println!("  Period {period:<8} {range}");
    }
    println!("  Seasons:        {}", s.seasons());
    let now = Local::now().naive_local();
    let season = calendar::season_for(s, now.date());
    if let (Some(season), Some(rate)) = (season, calendar::rate_at(s, now)) {
        if s.tou_rates().contains_key(season) {
            let period = calendar::tou_period_at(s, now);
            println!("  Rate now:       ${rate}/kWh {}", dim(&format!("({season}, {period})")));
        } else {
            println!("  Rate now:       ${rate}/kWh {}", dim(&format!("({season})")));
        }
    }
    if !s.holidays().is_empty() {
        let names: Vec<&str> = s.holidays().iter().map(String::as_str).collect();
        println!("  Holidays:       {}", names.join(", "));
    }
    if s.has_no_rates() {
        println!("  {} no energy rate found", yellow("warning"));
    }
    for issue in &d.unresolved {
        println!("  {} {}", yellow("unresolved"), issue);
    }
    for warning in &d.warnings {
        println!("  {} {}", yellow("warning"), warning);
    }
    for amb in &d.ambiguous {
        println!(
            "  {} {} (chose line {}, superseded {})",
            dim("ambiguous"),
            amb.field,
            amb.chosen.line,
            amb.superseded.len()
        );
    }
}

fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
