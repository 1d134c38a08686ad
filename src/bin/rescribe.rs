//! CLI binary for rescribe.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `RestoreConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use rescribe::{
    resolve_pages, restore, RestoreConfig, RestoreProgressCallback, TesseractCommand, VariantSet,
};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar plus per-page log lines.
/// Works correctly when pages complete out of order (concurrent mode).
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:40.green/238}] {pos:>3}/{len} pages  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");
        bar.set_style(style);
        bar.set_prefix("Restoring");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }
}

impl RestoreProgressCallback for CliProgressCallback {
    fn on_document_start(&self, total_pages: usize) {
        self.bar.set_length(total_pages as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Restoring {total_pages} pages…"))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, chars: usize, agreement: f32) {
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<12}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{chars:>6} chars")),
            dim(&format!("{:.0}% agreement", agreement * 100.0)),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: String) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg = if error.len() > 80 {
            format!("{}\u{2026}", &error[..79])
        } else {
            error
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
        ));
        self.bar.inc(1);
    }

    fn on_document_complete(&self, total_pages: usize, success_count: usize) {
        let failed = total_pages.saturating_sub(success_count);
        self.bar.finish_and_clear();
        if failed == 0 {
            eprintln!(
                "{} {} pages restored successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} pages restored  ({} failed)",
                if failed == total_pages {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Restore a directory of page scans (stdout)
  rescribe scans/

  # Restore into an output directory (resume.txt + resume.json)
  rescribe scans/ -o out/ --json

  # Faster, three-variant pass at 150 DPI
  rescribe page-001.png --variant-set fast --dpi 150

  # Teach the lexicon a misread and emit the plain-ASCII artifact
  rescribe scans/ --override villereek=millcreek --ascii -o out/

  # Run only two correction rules (diagnosis)
  rescribe scans/ --rules email-spacing,date-year-range-spacing

ENGINE:
  The recognition engine is external. By default `tesseract` is located on
  PATH; point --engine-path at a specific binary otherwise.

EXIT STATUS:
  0  at least one page produced text
  1  every page failed recognition, or a fatal error occurred
"#;

/// Restore clean, structured text from noisy resume scans.
#[derive(Parser, Debug)]
#[command(
    name = "rescribe",
    version,
    about = "Restore clean, structured text from noisy resume scans",
    long_about = "Restore scanned resume pages into one clean, section-segmented text \
document using multi-pass OCR consensus: several preprocessed renderings per page, \
one recognition call per rendering, word-level voting, deterministic correction rules, \
and section segmentation.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Page image file, or a directory of page images (sorted by filename).
    input: PathBuf,

    /// Write artifacts into this directory instead of stdout.
    #[arg(short, long, env = "RESCRIBE_OUTPUT")]
    output: Option<PathBuf>,

    /// Resolution hint for the page bitmaps (72–1200).
    #[arg(long, env = "RESCRIBE_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=1200))]
    dpi: u32,

    /// Preprocessing recipes to run per page.
    #[arg(long, env = "RESCRIBE_VARIANT_SET", value_enum, default_value = "thorough")]
    variant_set: VariantSetArg,

    /// Comma-separated correction rule ids to enable (default: all).
    #[arg(long, env = "RESCRIBE_RULES")]
    rules: Option<String>,

    /// Known misread, as WRONG=RIGHT. Repeatable.
    #[arg(long = "override", value_name = "WRONG=RIGHT")]
    overrides: Vec<String>,

    /// Number of pages processed concurrently.
    #[arg(short, long, env = "RESCRIBE_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Per-engine-call timeout in seconds.
    #[arg(long, env = "RESCRIBE_ENGINE_TIMEOUT", default_value_t = 30)]
    engine_timeout: u64,

    /// Retries per variant on transient engine failure.
    #[arg(long, env = "RESCRIBE_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Path to the external tesseract binary (default: found on PATH).
    #[arg(long, env = "RESCRIBE_ENGINE_PATH")]
    engine_path: Option<PathBuf>,

    /// Also write the structured JSON document.
    #[arg(long, env = "RESCRIBE_JSON")]
    json: bool,

    /// Also write the plain-ASCII artifact (bullets/non-ASCII stripped).
    #[arg(long, env = "RESCRIBE_ASCII")]
    ascii: bool,

    /// Disable the progress bar.
    #[arg(long, env = "RESCRIBE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "RESCRIBE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "RESCRIBE_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum VariantSetArg {
    Fast,
    Thorough,
}

impl From<VariantSetArg> for VariantSet {
    fn from(v: VariantSetArg) -> Self {
        match v {
            VariantSetArg::Fast => VariantSet::Fast,
            VariantSetArg::Thorough => VariantSet::Thorough,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let config = build_config(&cli)?;

    // ── Engine ───────────────────────────────────────────────────────────
    let engine = match &cli.engine_path {
        Some(path) => TesseractCommand::with_binary(path.clone(), config.dpi),
        None => TesseractCommand::from_path_lookup(config.dpi)
            .context("No recognition engine available")?,
    };
    let engine = Arc::new(engine);

    // ── Resolve pages and run ────────────────────────────────────────────
    let pages = resolve_pages(&cli.input).context("Failed to resolve input pages")?;

    let document = restore(engine, pages, &config)
        .await
        .context("Restoration failed")?;

    // ── Emit artifacts ───────────────────────────────────────────────────
    if let Some(ref out_dir) = cli.output {
        std::fs::create_dir_all(out_dir)
            .with_context(|| format!("Failed to create output directory {out_dir:?}"))?;

        let stem = cli
            .input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("document")
            .to_string();

        let txt_path = out_dir.join(format!("{stem}.txt"));
        std::fs::write(&txt_path, document.plain_text())
            .with_context(|| format!("Failed to write {txt_path:?}"))?;

        if cli.ascii {
            let ascii_path = out_dir.join(format!("{stem}.ascii.txt"));
            std::fs::write(&ascii_path, document.ascii_text())
                .with_context(|| format!("Failed to write {ascii_path:?}"))?;
        }

        if cli.json {
            let json_path = out_dir.join(format!("{stem}.json"));
            let json = serde_json::to_string_pretty(&document)
                .context("Failed to serialise document")?;
            std::fs::write(&json_path, json)
                .with_context(|| format!("Failed to write {json_path:?}"))?;
        }

        if !cli.quiet {
            eprintln!(
                "{}  {}/{} pages  {} sections  {}ms  →  {}",
                if document.stats.failed_pages == 0 {
                    green("✔")
                } else {
                    cyan("⚠")
                },
                document.stats.processed_pages,
                document.stats.total_pages,
                document.sections.len(),
                document.stats.total_duration_ms,
                bold(&txt_path.display().to_string()),
            );
        }
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(document.plain_text().as_bytes())
            .context("Failed to write to stdout")?;
        if !document.plain_text().ends_with('\n') {
            handle.write_all(b"\n").ok();
        }

        if !cli.quiet {
            eprintln!(
                "   {} sections  —  {}/{} pages  —  {}ms total",
                dim(&document.sections.len().to_string()),
                document.stats.processed_pages,
                document.stats.total_pages,
                document.stats.total_duration_ms,
            );
            for section in document.low_confidence_sections() {
                eprintln!(
                    "   {} low-confidence boundary: {:?} ({:.0}%)",
                    cyan("⚠"),
                    section.kind,
                    section.confidence * 100.0
                );
            }
        }
    }

    Ok(())
}

/// Map CLI args to `RestoreConfig`.
fn build_config(cli: &Cli) -> Result<RestoreConfig> {
    let overrides = parse_overrides(&cli.overrides)?;

    let mut builder = RestoreConfig::builder()
        .dpi(cli.dpi)
        .variant_set(cli.variant_set.clone().into())
        .concurrency(cli.concurrency)
        .engine_timeout_secs(cli.engine_timeout)
        .max_retries(cli.max_retries)
        .known_word_overrides(overrides);

    if let Some(ref rules) = cli.rules {
        builder = builder.enabled_rule_ids(
            rules
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from),
        );
    }

    let show_progress = !cli.quiet && !cli.no_progress;
    if show_progress {
        let cb = CliProgressCallback::new();
        builder = builder.progress_callback(cb as Arc<dyn RestoreProgressCallback>);
    }

    builder.build().context("Invalid configuration")
}

/// Parse repeated `--override WRONG=RIGHT` flags.
fn parse_overrides(raw: &[String]) -> Result<HashMap<String, String>> {
    let mut map = HashMap::new();
    for entry in raw {
        let (wrong, right) = entry
            .split_once('=')
            .with_context(|| format!("Invalid override '{entry}': expected WRONG=RIGHT"))?;
        if wrong.trim().is_empty() || right.trim().is_empty() {
            anyhow::bail!("Invalid override '{entry}': both sides must be non-empty");
        }
        map.insert(wrong.trim().to_string(), right.trim().to_string());
    }
    Ok(map)
}
