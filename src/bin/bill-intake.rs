//! CLI binary for edgequake-bill-intake.
//!
//! A thin shim over the library crate: maps CLI flags to `IntakeConfig`,
//! runs one bill through the session and reviews the draft in the terminal.

use anyhow::{bail, Context, Result};
use clap::Parser;
use edgequake_bill_intake::{
    IntakeConfig, IntakeSession, ManualFields, RetryPolicy, ReviewRequest, ReviewSurface,
    StatusCallback, StatusLevel, StatusMessage, StatusObserver, TextSource,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── Status display using indicatif ───────────────────────────────────────────

/// Mirrors the session's status channels onto a spinner. Result lines are
/// printed above it so they stay visible.
struct CliStatus {
    bar: ProgressBar,
}

impl CliStatus {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(style);
        bar.set_prefix("Intake");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl StatusObserver for CliStatus {
    fn on_status(&self, message: &StatusMessage) {
        match message.level {
            StatusLevel::Error => self.bar.println(format!("  {} {}", red("✗"), message.text)),
            StatusLevel::Success => {
                self.bar.println(format!("  {} {}", green("✓"), message.text))
            }
            StatusLevel::Info => self.bar.set_message(message.text.clone()),
        }
    }

    fn on_result(&self, message: &StatusMessage) {
        let mark = match message.level {
            StatusLevel::Error => red("✘"),
            _ => green("✔"),
        };
        self.bar.println(format!("{} {}", mark, bold(&message.text)));
    }

    fn on_loading(&self, loading: bool, message: &str) {
        if loading {
            self.bar.set_message(message.to_string());
        } else {
            self.bar.set_message("");
        }
    }

    fn on_ocr_page(&self, page_num: usize, total_pages: usize) {
        self.bar.set_prefix(format!("OCR {page_num}/{total_pages}"));
    }
}

// ── Terminal review surface ──────────────────────────────────────────────────

/// Prompts for every editable field on stdin, then asks to confirm.
struct TerminalReview {
    auto_confirm: bool,
    bar: Option<ProgressBar>,
}

impl ReviewSurface for TerminalReview {
    fn present(&self, request: ReviewRequest) {
        if self.auto_confirm {
            request.confirm();
            return;
        }
        let bar = self.bar.clone();
        // Blocking stdin reads stay off the runtime's worker threads.
        tokio::task::spawn_blocking(move || match bar {
            Some(bar) => bar.suspend(|| prompt_review(request)),
            None => prompt_review(request),
        });
    }

    fn focus(&self, session_id: u64) {
        eprintln!("{} review {} is still open", cyan("⚠"), session_id);
    }
}

fn prompt_review(mut request: ReviewRequest) {
    let form = request.form().clone();
    eprintln!();
    eprintln!("{} {}", cyan("◆"), bold(&format!("Review '{}'", form.file_name)));
    if let Some(ref path) = form.document {
        eprintln!("  {}", dim(&format!("document: {}", path.display())));
    }
    if !form.header_hints.is_empty() {
        eprintln!("  {}", dim(&format!("columns: {}", form.header_hints.join(", "))));
    }
    eprintln!("  {}", dim("Enter keeps the current value."));

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    for field in &form.fields {
        if field.read_only {
            eprintln!("  {:<24} {}", field.name, dim(&field.value));
            continue;
        }
        eprint!("  {:<24} [{}]: ", field.name, field.value);
        let _ = io::stderr().flush();
        match lines.next() {
            Some(Ok(line)) if !line.trim().is_empty() => {
                if let Err(e) = request.set_value(&field.name, line.trim()) {
                    eprintln!("  {} {}", red("✗"), e);
                }
            }
            Some(Ok(_)) => {}
            // stdin closed: leave the review unconfirmed.
            _ => return request.dismiss(),
        }
    }

    eprint!("{} ", bold("Save this record? [Y/n]"));
    let _ = io::stderr().flush();
    match lines.next() {
        Some(Ok(answer)) if matches!(answer.trim(), "" | "y" | "Y" | "yes") => request.confirm(),
        _ => request.dismiss(),
    }
}

// ── CLI ──────────────────────────────────────────────────────────────────────

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract, analyse, review in the terminal and save
  bill-intake invoice.pdf --given-by Priya --added-by Sam

  # Only print the extracted text (no backend needed)
  bill-intake --extract-only scan.pdf

  # Non-interactive: accept the analysed draft as-is
  bill-intake invoice.pdf --given-by Priya --added-by Sam --yes --json

  # Correct the text before analysis
  bill-intake invoice.pdf --text-file corrected.txt --given-by Priya --added-by Sam

ENVIRONMENT VARIABLES:
  BILL_INTAKE_ENDPOINT    Backend URL (getHeaders / analyze / save)
  BILL_INTAKE_OCR_SCALE   Raster upscale factor for OCR (default 2.0)
  BILL_INTAKE_OCR_LANG    Tesseract language (default eng)
  TESSERACT_PATH          tesseract executable (default: from PATH)
  PDFIUM_LIB_PATH         Directory holding libpdfium (default: system library)
  RUST_LOG                Overrides the log filter
"#;

/// Turn a PDF bill into a reviewed, stored record.
#[derive(Parser, Debug)]
#[command(
    name = "bill-intake",
    version,
    about = "Extract, analyse, review and store a PDF bill",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF file to process.
    input: PathBuf,

    /// Backend URL.
    #[arg(long, env = "BILL_INTAKE_ENDPOINT", required_unless_present = "extract_only")]
    endpoint: Option<String>,

    /// Where the bill came from (e.g. Email, Courier).
    #[arg(long, env = "BILL_INTAKE_SOURCE", default_value = "")]
    source: String,

    /// Person who handed in the bill (required).
    #[arg(long, env = "BILL_INTAKE_GIVEN_BY", default_value = "")]
    given_by: String,

    /// Person entering the bill (required).
    #[arg(long, env = "BILL_INTAKE_ADDED_BY", default_value = "")]
    added_by: String,

    /// HOD approver.
    #[arg(long, default_value = "")]
    hod_approval: String,

    /// Final approver.
    #[arg(long, default_value = "")]
    final_approval: String,

    /// Replace the extracted text with the contents of this file before analysis.
    #[arg(long)]
    text_file: Option<PathBuf>,

    /// Raster upscale factor for OCR (0.5–8.0).
    #[arg(long, env = "BILL_INTAKE_OCR_SCALE", default_value_t = 2.0)]
    ocr_scale: f32,

    /// Tesseract language code.
    #[arg(long, env = "BILL_INTAKE_OCR_LANG", default_value = "eng")]
    ocr_lang: String,

    /// tesseract executable.
    #[arg(long, env = "TESSERACT_PATH", default_value = "tesseract")]
    tesseract: PathBuf,

    /// Directory holding the pdfium shared library.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "BILL_INTAKE_PASSWORD")]
    password: Option<String>,

    /// Retries on network failure (0 = single attempt).
    #[arg(long, env = "BILL_INTAKE_RETRIES", default_value_t = 0)]
    retries: u32,

    /// Initial retry delay in milliseconds; doubles per attempt.
    #[arg(long, default_value_t = 500)]
    retry_backoff_ms: u64,

    /// Per-request timeout in seconds (default: none).
    #[arg(long, env = "BILL_INTAKE_TIMEOUT")]
    timeout: Option<u64>,

    /// Print the extracted text and stop.
    #[arg(long)]
    extract_only: bool,

    /// Accept the draft without prompting.
    #[arg(short, long)]
    yes: bool,

    /// Print structured JSON instead of text.
    #[arg(long)]
    json: bool,

    /// Disable the status spinner.
    #[arg(long, env = "BILL_INTAKE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "BILL_INTAKE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner already shows every status line; keep library INFO logs
    // out of its way unless asked for.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let status = show_progress.then(CliStatus::new);
    let config = build_config(&cli, status.clone().map(|s| s as StatusCallback))?;
    let surface = Arc::new(TerminalReview {
        auto_confirm: cli.yes,
        bar: status.as_ref().map(|s| s.bar.clone()),
    });
    let session = IntakeSession::new(config, surface).context("Failed to start session")?;

    let outcome = run(&cli, &session).await;
    if let Some(ref status) = status {
        status.finish();
    }
    outcome
}

async fn run(cli: &Cli, session: &IntakeSession) -> Result<()> {
    // ── Extract ──────────────────────────────────────────────────────────
    let extraction = session
        .select_file(&cli.input)
        .await
        .with_context(|| format!("Failed to read {}", cli.input.display()))?;

    if cli.extract_only {
        if cli.json {
            let json = serde_json::to_string_pretty(&extraction)
                .context("Failed to serialise extraction")?;
            println!("{json}");
        } else {
            println!("{}", extraction.text);
        }
        if !cli.quiet {
            let source = match extraction.source {
                TextSource::TextLayer => "text layer",
                TextSource::Ocr => "OCR",
            };
            eprintln!(
                "{}",
                dim(&format!(
                    "{} pages, {} chars via {}",
                    extraction.pages.len(),
                    extraction.text.len(),
                    source
                ))
            );
        }
        return Ok(());
    }

    if let Some(ref path) = cli.text_file {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read text from {:?}", path))?;
        session.set_extracted_text(text)?;
    } else if extraction.is_empty() {
        bail!(
            "Could not extract text from {}; supply it with --text-file",
            cli.input.display()
        );
    }

    // ── Analyse ──────────────────────────────────────────────────────────
    let manual = ManualFields {
        bill_source: cli.source.clone(),
        bill_given_by: cli.given_by.clone(),
        added_by: cli.added_by.clone(),
        hod_approval: cli.hod_approval.clone(),
        final_approval: cli.final_approval.clone(),
    };
    session.analyze(&manual).await.context("Analysis failed")?;

    // ── Review & save ────────────────────────────────────────────────────
    let record = session.verify().await.context("Review did not complete")?;
    let result = session.submit().await.context("Save failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&serde_json::json!({
            "record": record,
            "result": result,
        }))
        .context("Failed to serialise output")?;
        println!("{json}");
    } else if !cli.quiet && result.success {
        eprintln!(
            "{} saved {}",
            green("✔"),
            bold(record.bill_id().unwrap_or("record"))
        );
    }

    if !result.success {
        let message = result.message.unwrap_or_default();
        warn!("save rejected: {}", message);
        bail!("Save failed: {message}");
    }
    Ok(())
}

/// Map CLI args to `IntakeConfig`.
fn build_config(cli: &Cli, status: Option<StatusCallback>) -> Result<IntakeConfig> {
    let endpoint = match (&cli.endpoint, cli.extract_only) {
        (Some(url), _) => url.clone(),
        // Extraction never talks to the backend; any valid URL will do.
        (None, true) => "http://localhost".to_string(),
        (None, false) => bail!("--endpoint or BILL_INTAKE_ENDPOINT is required"),
    };

    let mut builder = IntakeConfig::builder()
        .endpoint(endpoint)
        .ocr_scale(cli.ocr_scale)
        .ocr_language(cli.ocr_lang.clone())
        .tesseract_path(cli.tesseract.clone())
        .network_retry(RetryPolicy::new(cli.retries, cli.retry_backoff_ms));

    if let Some(ref dir) = cli.pdfium_lib {
        builder = builder.pdfium_lib_path(dir.clone());
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(secs) = cli.timeout {
        builder = builder.request_timeout_secs(secs);
    }
    if let Some(cb) = status {
        builder = builder.status_observer(cb);
    }

    builder.build().context("Invalid configuration")
}
