//! CLI binary for notescraft.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `NotesConfig` and writes the rendered notes.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use notescraft::pipeline::extract::parse_sections;
use notescraft::pipeline::render;
use notescraft::{
    extract_sections, generate_notes, notes_from_sections, DocumentSection, NoteStyle,
    NotesConfig, NotesError, NotesOutput, NotesProgressCallback, OutputFormat, ProgressCallback,
    write_atomic,
};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a spinner while the document is being split,
/// then a bar across sections with one log line per section.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Per-section wall-clock start times for elapsed reporting.
    start_times: Mutex<HashMap<usize, Instant>>,
    skipped: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner only; the bar length is set once the section count is known.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading document…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            skipped: AtomicUsize::new(0),
        })
    }

    /// Switch to the full progress-bar style once we know `total`.
    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} sections  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Writing notes");
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Generating notes for {total} sections…"))
        ));
    }

    fn elapsed(&self, section: usize) -> String {
        let ms = self
            .start_times
            .lock()
            .unwrap()
            .remove(&section)
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);
        dim(&format!("{:.1}s", ms as f64 / 1000.0))
    }
}

impl NotesProgressCallback for CliProgressCallback {
    fn on_extraction_start(&self, source: &str) {
        self.bar.set_prefix("Extracting");
        self.bar.set_message(format!("splitting {source} into sections…"));
    }

    fn on_extraction_complete(&self, section_count: usize) {
        self.activate_bar(section_count);
    }

    fn on_section_start(&self, section: usize, _total: usize, heading: &str) {
        self.start_times
            .lock()
            .unwrap()
            .insert(section, Instant::now());
        self.bar.set_message(heading.to_string());
    }

    fn on_section_complete(&self, section: usize, total: usize, response_len: usize) {
        self.bar.println(format!(
            "  {} Section {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            section,
            total,
            dim(&format!("{response_len:>5} chars")),
            self.elapsed(section),
        ));
        self.bar.inc(1);
    }

    fn on_section_skipped(&self, section: usize, total: usize, reason: &str) {
        self.skipped.fetch_add(1, Ordering::SeqCst);

        // Truncate very long reasons to keep output tidy.
        let msg: String = if reason.chars().count() > 80 {
            let cut: String = reason.chars().take(79).collect();
            format!("{cut}\u{2026}")
        } else {
            reason.to_string()
        };

        self.bar.println(format!(
            "  {} Section {:>3}/{:<3}  {}  {}",
            red("✗"),
            section,
            total,
            red(&msg),
            self.elapsed(section),
        ));
        self.bar.inc(1);
    }

    fn on_notes_complete(&self, record_count: usize, sections_used: usize, total_sections: usize) {
        self.bar.finish_and_clear();
        let lost = total_sections.saturating_sub(sections_used);
        eprintln!(
            "{} {} note records from {}/{} sections{}",
            if lost == 0 { green("✔") } else { cyan("⚠") },
            bold(&record_count.to_string()),
            sections_used,
            total_sections,
            if lost == 0 {
                String::new()
            } else {
                format!("  ({} lost)", red(&lost.to_string()))
            },
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Markdown notes on stdout
  notescraft chapter1.pdf

  # Word document with the classic formatting
  notescraft chapter1.pdf -o chapter1.docx

  # Short revision notes as JSON records
  notescraft --style summary --format json lecture.docx -o lecture.json

  # Split once, review the sections, then generate
  notescraft --sections-only chapter1.pdf -o sections.json
  notescraft --from-sections sections.json -o chapter1.md

  # Download from a URL
  notescraft https://example.org/handout.pdf -o handout.md

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (default provider)
  GOOGLE_API_KEY          Accepted in place of GEMINI_API_KEY
  OPENAI_API_KEY          OpenAI API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (gemini, openai, anthropic, ollama)
  EDGEQUAKE_MODEL         Override model ID
  RUST_LOG                Log filter, e.g. notescraft=debug

Documents are sent to the model as-is, so the provider must accept PDF
or DOCX input. Files over --max-file-size-mb are rejected before upload.
"#;

/// Turn PDF and DOCX documents into structured study notes.
#[derive(Parser, Debug)]
#[command(
    name = "notescraft",
    version,
    about = "Turn PDF and DOCX documents into structured study notes",
    long_about = "Split a PDF or DOCX document into sections with an LLM, generate study notes \
for each section, repair whatever the model returns into clean note records, and render them \
as Markdown, JSON or a Word document.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF/DOCX path or HTTP/HTTPS URL (a sections JSON file with --from-sections).
    input: String,

    /// Write output to this file instead of stdout.
    #[arg(short, long, env = "NOTESCRAFT_OUTPUT")]
    output: Option<PathBuf>,

    /// Output format. Defaults to the output file's extension, else markdown.
    #[arg(long, env = "NOTESCRAFT_FORMAT", value_enum)]
    format: Option<FormatArg>,

    /// Note style: detailed study notes or short revision notes.
    #[arg(long, env = "NOTESCRAFT_STYLE", value_enum, default_value = "detailed")]
    style: StyleArg,

    /// LLM model ID (e.g. gemini-2.5-flash, gpt-4.1-mini).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: gemini, openai, anthropic, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Number of concurrent note-generation calls (1 = sequential).
    #[arg(short, long, env = "NOTESCRAFT_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Sections with fewer characters than this are skipped.
    #[arg(long, env = "NOTESCRAFT_MIN_SECTION_CHARS", default_value_t = 20)]
    min_section_chars: usize,

    /// Max LLM output tokens per call.
    #[arg(long, env = "NOTESCRAFT_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "NOTESCRAFT_TEMPERATURE", default_value_t = 0.2)]
    temperature: f32,

    /// Retries per call on transient LLM failure.
    #[arg(long, env = "NOTESCRAFT_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "NOTESCRAFT_API_TIMEOUT", default_value_t = 180)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "NOTESCRAFT_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Reject documents larger than this.
    #[arg(long, env = "NOTESCRAFT_MAX_FILE_SIZE_MB", default_value_t = 50)]
    max_file_size_mb: u64,

    /// Text file with a custom extraction system prompt.
    #[arg(long, env = "NOTESCRAFT_EXTRACTION_PROMPT")]
    extraction_prompt: Option<PathBuf>,

    /// Text file with a custom note-generation system prompt.
    #[arg(long, env = "NOTESCRAFT_NOTES_PROMPT")]
    notes_prompt: Option<PathBuf>,

    /// Only extract sections and print them as a JSON object.
    #[arg(long, conflicts_with = "from_sections")]
    sections_only: bool,

    /// Treat INPUT as a JSON object of sections and skip extraction.
    #[arg(long)]
    from_sections: bool,

    /// On failure, print a JSON error report on stdout.
    #[arg(long, env = "NOTESCRAFT_JSON_REPORT")]
    json_report: bool,

    /// Disable progress bar.
    #[arg(long, env = "NOTESCRAFT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "NOTESCRAFT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "NOTESCRAFT_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Markdown,
    Json,
    Docx,
}

impl From<FormatArg> for OutputFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Markdown => OutputFormat::Markdown,
            FormatArg::Json => OutputFormat::Json,
            FormatArg::Docx => OutputFormat::Docx,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum StyleArg {
    Detailed,
    Summary,
}

impl From<StyleArg> for NoteStyle {
    fn from(v: StyleArg) -> Self {
        match v {
            StyleArg::Detailed => NoteStyle::Detailed,
            StyleArg::Summary => NoteStyle::Summary,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json_report;
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

    let format = output_format(&cli);
    if format == OutputFormat::Docx && cli.output.is_none() && !cli.sections_only {
        anyhow::bail!("DOCX output is binary; pass -o <file>.docx");
    }

    let progress = if show_progress {
        Some(CliProgressCallback::new_dynamic())
    } else {
        None
    };
    let config = build_config(
        &cli,
        format,
        progress.clone().map(|p| p as ProgressCallback),
    )
    .await?;

    // ── Sections-only mode ───────────────────────────────────────────────
    if cli.sections_only {
        let sections = match extract_sections(&cli.input, &config).await {
            Ok(sections) => sections,
            Err(e) => fail(&cli, progress.as_deref(), &e),
        };
        if let Some(ref p) = progress {
            p.bar.finish_and_clear();
        }
        let json = sections_json(&sections).context("Failed to serialise sections")?;
        emit(cli.output.as_deref(), json.as_bytes()).await?;
        if !cli.quiet {
            eprintln!("{} {} sections extracted", green("✔"), bold(&sections.len().to_string()));
        }
        return Ok(());
    }

    // ── Notes run ────────────────────────────────────────────────────────
    let result = if cli.from_sections {
        let text = tokio::fs::read_to_string(&cli.input)
            .await
            .with_context(|| format!("Failed to read sections from {:?}", cli.input))?;
        match parse_sections(&text) {
            Ok(sections) => {
                if let Some(ref p) = progress {
                    p.activate_bar(sections.len());
                }
                notes_from_sections(&sections, &config).await
            }
            Err(e) => Err(e),
        }
    } else {
        generate_notes(&cli.input, &config).await
    };

    let output = match result {
        Ok(output) => output,
        Err(e) => fail(&cli, progress.as_deref(), &e),
    };

    let bytes = match render::render(&output.document, format) {
        Ok(bytes) => bytes,
        Err(e) => fail(&cli, progress.as_deref(), &e),
    };
    emit(cli.output.as_deref(), &bytes).await?;

    if !cli.quiet {
        print_summary(&cli, &output, show_progress);
    }
    Ok(())
}

/// Print the user-facing message (or JSON report) for a fatal error and exit.
fn fail(cli: &Cli, progress: Option<&CliProgressCallback>, err: &NotesError) -> ! {
    if let Some(p) = progress {
        p.bar.finish_and_clear();
    }
    tracing::error!("{}", err);

    if cli.json_report {
        match serde_json::to_string_pretty(&err.report()) {
            Ok(json) => println!("{json}"),
            Err(_) => eprintln!("{}", err.user_message()),
        }
    } else {
        eprintln!("{} {}", red("✘"), err.user_message());
        if cli.verbose {
            eprintln!("{}", dim(&err.to_string()));
        }
    }
    std::process::exit(1);
}

fn print_summary(cli: &Cli, output: &NotesOutput, show_progress: bool) {
    let stats = &output.stats;
    if !show_progress {
        eprintln!(
            "Generated {} note records from {}/{} sections in {}ms",
            stats.record_count,
            stats.processed_sections.saturating_sub(stats.unrecovered_sections),
            stats.total_sections,
            stats.total_duration_ms
        );
        for lost in output.skipped.iter().chain(&output.unrecovered) {
            eprintln!("  {} {}", cyan("⚠"), lost);
        }
    }
    if let Some(ref path) = cli.output {
        eprintln!("   →  {}", bold(&path.display().to_string()));
    }
    eprintln!(
        "   {} tokens in  /  {} tokens out",
        dim(&stats.total_input_tokens.to_string()),
        dim(&stats.total_output_tokens.to_string()),
    );
}

/// `--format`, else the output file's extension, else Markdown.
fn output_format(cli: &Cli) -> OutputFormat {
    if let Some(f) = cli.format {
        return f.into();
    }
    let ext = cli
        .output
        .as_deref()
        .and_then(Path::extension)
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("docx") => OutputFormat::Docx,
        Some("json") => OutputFormat::Json,
        _ => OutputFormat::Markdown,
    }
}

/// Sections as one JSON object, headings in document order.
fn sections_json(sections: &[DocumentSection]) -> Result<String> {
    let map: serde_json::Map<String, serde_json::Value> = sections
        .iter()
        .map(|s| (s.heading.clone(), serde_json::Value::String(s.body.clone())))
        .collect();
    Ok(serde_json::to_string_pretty(&map)?)
}

/// Write to the output file atomically, or to stdout when none was given.
async fn emit(path: Option<&Path>, bytes: &[u8]) -> Result<()> {
    match path {
        Some(path) => write_atomic(path, bytes)
            .await
            .with_context(|| format!("Failed to write {:?}", path)),
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(bytes)
                .context("Failed to write to stdout")?;
            if !bytes.ends_with(b"\n") {
                handle.write_all(b"\n").ok();
            }
            Ok(())
        }
    }
}

/// Map CLI args to `NotesConfig`.
async fn build_config(
    cli: &Cli,
    format: OutputFormat,
    progress: Option<ProgressCallback>,
) -> Result<NotesConfig> {
    let mut builder = NotesConfig::builder()
        .note_style(cli.style.into())
        .output_format(format)
        .concurrency(cli.concurrency)
        .min_section_chars(cli.min_section_chars)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout)
        .max_file_size_mb(cli.max_file_size_mb);

    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref path) = cli.extraction_prompt {
        builder = builder.extraction_prompt(read_prompt(path).await?);
    }
    if let Some(ref path) = cli.notes_prompt {
        builder = builder.notes_prompt(read_prompt(path).await?);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

async fn read_prompt(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read prompt from {:?}", path))
}
