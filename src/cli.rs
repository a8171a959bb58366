use std::{net::SocketAddr, path::PathBuf, time::Duration};

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

use crate::config::{
    CodeGrammar,
    DEFAULT_DPI,
    DEFAULT_LINK_PREFIX,
    DEFAULT_TRIGGER,
    Locale,
    NumericOrder,
    OcrMode,
    Settings,
};

#[derive(Debug, Parser)]
#[command(
    name = "refindex",
    about = "Index and search reference codes found in PDF documents"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Directory holding the PDFs (default: <data dir>/pdfs)
    #[arg(long, global = true)]
    pub documents: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(flatten)]
    pub indexer: IndexerArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Rebuild the index from the documents directory
    Build,
    /// Look up codes containing each term
    Search(SearchArgs),
    /// List every indexed code
    Codes(CodesArgs),
    /// Serve the search API and the documents over HTTP
    Serve(ServeArgs),
    /// Show index location and statistics
    Status(StatusArgs),
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Indexer settings --

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GrammarArg {
    /// Letters, digits and hyphens
    Strict,
    /// Everything up to the next `/`
    UntilSlash,
}

#[derive(Debug, Clone, Args)]
pub struct IndexerArgs {
    /// Literal that precedes each code (case-insensitive)
    #[arg(long, global = true, default_value = DEFAULT_TRIGGER)]
    pub trigger: String,

    /// Shape of the code that follows the trigger
    #[arg(long, global = true, value_enum, default_value = "until-slash")]
    pub grammar: GrammarArg,

    /// Custom regex for the whole match, trigger included; capture group 1
    /// is the code. Matched case-insensitively
    #[arg(long, global = true, conflicts_with = "grammar")]
    pub pattern: Option<String>,

    /// Language of month names in filenames
    #[arg(long, global = true, value_enum, default_value = "es")]
    pub locale: Locale,

    /// Digit order of numeric filename dates
    #[arg(long, global = true, value_enum, default_value = "month-year")]
    pub numeric_order: NumericOrder,

    /// When to OCR pages
    #[arg(long = "ocr", global = true, value_enum, default_value = "per-page")]
    pub ocr_mode: OcrMode,

    /// Tesseract language (default follows --locale)
    #[arg(long, global = true)]
    pub ocr_lang: Option<String>,

    /// Rasterization resolution for OCR
    #[arg(long, global = true, default_value_t = DEFAULT_DPI)]
    pub dpi: u32,

    /// Per-page OCR time budget in seconds
    #[arg(long, global = true, default_value = "60")]
    pub ocr_timeout_secs: u64,

    /// Worker threads for index builds (default: available cores)
    #[arg(long, global = true)]
    pub workers: Option<usize>,

    /// URL prefix for document links
    #[arg(long, global = true, default_value = DEFAULT_LINK_PREFIX)]
    pub link_prefix: String,
}

impl IndexerArgs {
    pub fn settings(&self) -> Settings {
        let grammar = match (&self.pattern, self.grammar) {
            (Some(pattern), _) => CodeGrammar::Custom(pattern.clone()),
            (None, GrammarArg::Strict) => CodeGrammar::Strict,
            (None, GrammarArg::UntilSlash) => CodeGrammar::UntilSlash,
        };
        let defaults = Settings::default();
        Settings {
            trigger: self.trigger.clone(),
            grammar,
            locale: self.locale,
            numeric_order: self.numeric_order,
            ocr_mode: self.ocr_mode,
            ocr_language: self.ocr_lang.clone(),
            dpi: self.dpi,
            ocr_timeout: Duration::from_secs(self.ocr_timeout_secs),
            workers: self.workers.unwrap_or(defaults.workers).max(1),
            link_prefix: self.link_prefix.clone(),
        }
    }
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// Terms to look for; each matches codes containing it
    #[arg(required = true)]
    pub terms: Vec<String>,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Codes --

#[derive(Debug, Parser)]
pub struct CodesArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Serve --

#[derive(Debug, Parser)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:5000")]
    pub addr: SocketAddr,
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "refindex",
            &mut std::io::stdout(),
        );
    }
}
