//! CLI command definitions, routing, and tracing setup.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use ragpipe_convert::SplitterSettings;
use ragpipe_core::RunObserver;
use ragpipe_core::workflows::{
    ask,
    expenses::{expenses_pipeline, index_expenses},
    metadata_search::{self, search, search_pipeline, versioned_store},
    multi_format::{self, IngestSettings, ingest_folder, preprocessing_pipeline, recipes_pipeline},
};
use ragpipe_providers::{EnvOrPrompt, build_embedder, build_generator};
use ragpipe_shared::{AppConfig, init_config, init_config_at, load_config, load_config_from};
use ragpipe_store::{InMemoryDocumentStore, StoreSettings};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// ragpipe: retrieval-augmented generation over local data.
#[derive(Parser)]
#[command(
    name = "ragpipe",
    version,
    about = "Index local data into a document store and answer questions over it.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.ragpipe/ragpipe.toml).
    #[arg(long, global = true, env = "RAGPIPE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Index an expenses CSV and answer questions about it interactively.
    Expenses {
        /// CSV file with a Date column (defaults to [defaults] expenses_csv).
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Rows retrieved per question.
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Keyword search over versioned release notes, filtered by version.
    Search {
        /// Keyword query.
        #[arg(long, default_value = metadata_search::DEFAULT_QUERY)]
        query: String,

        /// Only search documents newer than this version.
        #[arg(long, default_value_t = metadata_search::DEFAULT_MIN_VERSION)]
        min_version: f64,
    },

    /// Ingest a folder of text, PDF, Markdown, and HTML files, then ask about it.
    Ingest {
        /// Folder to ingest (defaults to [defaults] ingest_dir).
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Question to ask once ingestion finishes.
        #[arg(long, conflicts_with = "interactive")]
        question: Option<String>,

        /// Read questions from stdin until `quit` instead.
        #[arg(long)]
        interactive: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "ragpipe=warn",
        1 => "ragpipe=info",
        2 => "ragpipe=debug",
        _ => "ragpipe=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) fn run(cli: Cli) -> Result<()> {
    if let Command::Config { action } = &cli.command {
        return match action {
            ConfigAction::Init => cmd_config_init(cli.config.as_deref()),
            ConfigAction::Show => cmd_config_show(cli.config.as_deref()),
        };
    }

    let config = resolve_config(cli.config.as_deref())?;
    match cli.command {
        Command::Expenses { csv, top_k } => cmd_expenses(&config, csv, top_k),
        Command::Search { query, min_version } => cmd_search(&query, min_version),
        Command::Ingest {
            dir,
            question,
            interactive,
        } => cmd_ingest(&config, dir, question, interactive),
        Command::Config { .. } => Ok(()),
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    })
}

fn new_store(config: &AppConfig) -> Result<Arc<InMemoryDocumentStore>> {
    let settings = StoreSettings::try_from(config)?;
    Ok(Arc::new(InMemoryDocumentStore::with_settings(settings)))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

fn cmd_expenses(config: &AppConfig, csv: Option<PathBuf>, top_k: Option<usize>) -> Result<()> {
    let csv = csv.unwrap_or_else(|| PathBuf::from(&config.defaults.expenses_csv));
    let top_k = top_k.unwrap_or(config.defaults.top_k);
    info!(csv = %csv.display(), top_k, "starting expenses Q&A");

    let embedder = build_embedder(config, &EnvOrPrompt)?;
    let store = new_store(config)?;
    let written = index_expenses(&csv, Arc::clone(&embedder), &store)?;
    println!("Indexed {written} expense rows from {}", csv.display());

    let generator = build_generator(config.generator.qa_backend, config, &EnvOrPrompt)?;
    let pipeline = expenses_pipeline(embedder, store, generator, top_k)?;

    let stdin = io::stdin();
    question_loop(stdin.lock(), io::stdout(), |question| {
        Ok(ask(&pipeline, question, &CliProgress::new())?.reply)
    })?;
    println!("Done");
    Ok(())
}

fn cmd_search(query: &str, min_version: f64) -> Result<()> {
    info!(query, min_version, "starting metadata-filtered search");
    let pipeline = search_pipeline(versioned_store()?)?;
    let documents = search(&pipeline, query, min_version, &CliProgress::new())?;

    match documents.first() {
        Some(top) => println!("The answer is '{}'", top.content),
        None => println!("No documents newer than version {min_version} match '{query}'"),
    }
    Ok(())
}

fn cmd_ingest(
    config: &AppConfig,
    dir: Option<PathBuf>,
    question: Option<String>,
    interactive: bool,
) -> Result<()> {
    let dir = dir.unwrap_or_else(|| PathBuf::from(&config.defaults.ingest_dir));
    info!(dir = %dir.display(), interactive, "starting multi-format ingestion");

    let embedder = build_embedder(config, &EnvOrPrompt)?;
    let store = new_store(config)?;
    let settings = IngestSettings {
        splitter: SplitterSettings::try_from(&config.splitter)?,
        ..IngestSettings::default()
    };
    let preprocessing = preprocessing_pipeline(Arc::clone(&embedder), Arc::clone(&store), settings)?;

    println!("Processing documents in {}", dir.display());
    let report = ingest_folder(&preprocessing, &dir, &CliProgress::new())?;
    println!(
        "Wrote {} chunks from {} files",
        report.documents_written, report.files
    );

    let generator = build_generator(config.generator.ingest_backend, config, &EnvOrPrompt)?;
    let pipeline = recipes_pipeline(
        embedder,
        store,
        generator,
        config.defaults.top_k,
        config.generator.max_new_tokens,
    )?;

    if interactive {
        let stdin = io::stdin();
        question_loop(stdin.lock(), io::stdout(), |question| {
            Ok(ask(&pipeline, question, &CliProgress::new())?.reply)
        })?;
        return Ok(());
    }

    let question = question.unwrap_or_else(|| multi_format::DEFAULT_QUESTION.to_string());
    println!("\nAsking the question `{question}`");
    let answer = ask(&pipeline, &question, &CliProgress::new())?;
    println!("The answer is '{}'", answer.reply);
    Ok(())
}

fn cmd_config_init(path: Option<&Path>) -> Result<()> {
    let path = match path {
        Some(path) => {
            init_config_at(path)?;
            path.to_path_buf()
        }
        None => init_config()?,
    };
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config = resolve_config(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Interactive questions
// ---------------------------------------------------------------------------

/// Prompt for questions until `quit` or end of input, printing each reply.
///
/// Empty lines re-prompt. Returns the number of questions answered.
fn question_loop<R, W, F>(mut input: R, mut output: W, mut answer: F) -> Result<usize>
where
    R: BufRead,
    W: Write,
    F: FnMut(&str) -> Result<String>,
{
    let mut answered = 0;
    loop {
        write!(output, "Ask your question (or 'quit'): ")?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            writeln!(output)?;
            break;
        }
        let question = line.trim();
        if question == "quit" {
            break;
        }
        if question.is_empty() {
            continue;
        }

        let reply = answer(question)?;
        writeln!(output, "The answer is '{reply}'")?;
        answered += 1;
    }
    Ok(answered)
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// Spinner showing which pipeline component is running.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl RunObserver for CliProgress {
    fn component_started(&self, name: &str, position: usize, total: usize) {
        self.spinner.set_message(format!("[{position}/{total}] {name}"));
    }

    fn component_finished(&self, name: &str, elapsed: Duration) {
        tracing::debug!(component = name, elapsed_ms = elapsed.as_millis(), "component finished");
    }

    fn run_finished(&self, _elapsed: Duration) {
        self.spinner.finish_and_clear();
    }
}

impl Drop for CliProgress {
    // A failed run never reaches `run_finished`.
    fn drop(&mut self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive(input: &str) -> (usize, Vec<String>, String) {
        let mut asked = Vec::new();
        let mut output = Vec::new();
        let answered = question_loop(input.as_bytes(), &mut output, |q| {
            asked.push(q.to_string());
            Ok(q.to_uppercase())
        })
        .unwrap();
        (answered, asked, String::from_utf8(output).unwrap())
    }

    #[test]
    fn quit_ends_the_loop() {
        let (answered, asked, output) = drive("rent?\nquit\nignored\n");
        assert_eq!(answered, 1);
        assert_eq!(asked, vec!["rent?"]);
        assert!(output.contains("The answer is 'RENT?'"));
    }

    #[test]
    fn empty_lines_reprompt_and_eof_ends() {
        let (answered, asked, output) = drive("\n   \nfood?");
        assert_eq!(answered, 1);
        assert_eq!(asked, vec!["food?"]);
        assert_eq!(output.matches("Ask your question").count(), 4);
    }

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["ragpipe", "-vv", "search", "--min-version", "2.0"]).unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Search { query, min_version } => {
                assert_eq!(query, metadata_search::DEFAULT_QUERY);
                assert_eq!(min_version, 2.0);
            }
            _ => panic!("expected search"),
        }

        assert!(Cli::try_parse_from(["ragpipe", "ingest", "--question", "q", "--interactive"]).is_err());
    }
}
