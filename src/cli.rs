use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::DEFAULT_DATA_DIR;
use crate::cost::DEFAULT_COST_MODEL;
use crate::processor::DEFAULT_CHUNK_SIZE;
use crate::work::{DEFAULT_AUTHOR, DEFAULT_LANGUAGE};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Root of the `input/`, `store/` and `output/` trees.
    #[arg(long, global = true, default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Register and inspect works.
    Work {
        #[command(subcommand)]
        command: WorkCommand,
    },
    /// Run the LLM pipeline over chapters.
    Chapter {
        #[command(subcommand)]
        command: ChapterCommand,
    },
    /// Estimate API costs for token and TTS usage.
    Cost {
        #[command(subcommand)]
        command: CostCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum WorkCommand {
    /// Create the directory layout, metadata and manifest for a new work.
    Create(WorkCreateArgs),
    /// List registered works.
    List,
    /// Change metadata of an existing work.
    Update(WorkUpdateArgs),
    /// Show each chapter file of a work as processed or pending.
    Chapters(WorkIdArgs),
    /// Remove every input, store and output file of a work.
    Delete(WorkDeleteArgs),
}

#[derive(Debug, Args)]
pub struct WorkCreateArgs {
    /// Work title; the work id is derived from it.
    pub title: String,

    /// Original language of the text.
    #[arg(long = "lang", short = 'l', default_value = DEFAULT_LANGUAGE)]
    pub original_language: String,

    #[arg(long, short = 'a', default_value = DEFAULT_AUTHOR)]
    pub author: String,

    /// Comma-separated tags.
    #[arg(long, short = 't', value_delimiter = ',')]
    pub tags: Vec<String>,
}

#[derive(Debug, Args)]
pub struct WorkUpdateArgs {
    pub work_id: String,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long = "lang", short = 'l')]
    pub original_language: Option<String>,

    #[arg(long, short = 'a')]
    pub author: Option<String>,

    /// Comma-separated tags; replaces the current list.
    #[arg(long, short = 't', value_delimiter = ',')]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Args)]
pub struct WorkIdArgs {
    pub work_id: String,
}

#[derive(Debug, Args)]
pub struct WorkDeleteArgs {
    pub work_id: String,

    /// Confirm the irreversible removal.
    #[arg(long)]
    pub yes: bool,
}

#[derive(Debug, Subcommand)]
pub enum ChapterCommand {
    /// Translate, segment and classify one chapter, then extract its scenarios.
    Process(ChapterProcessArgs),
}

#[derive(Debug, Args)]
pub struct ChapterProcessArgs {
    /// Work id (see `work list`).
    #[arg(long)]
    pub work: String,

    /// Chapter id (file stem under the work's `chapters/`) or a path to a text file.
    #[arg(long)]
    pub chapter: String,

    /// Chapter title; defaults to the chapter id.
    #[arg(long)]
    pub title: Option<String>,

    /// Lines per LLM request.
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Maximum concurrent LLM requests.
    #[arg(long, default_value_t = 1)]
    pub concurrency: usize,

    /// Sampling temperature for the block requests.
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Token cap per block request.
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Reprocess even when the manifest says the chapter is up to date.
    #[arg(long)]
    pub force: bool,

    /// Skip the scenario extraction call.
    #[arg(long)]
    pub no_scenarios: bool,
}

#[derive(Debug, Subcommand)]
pub enum CostCommand {
    /// Price explicit token and TTS character counts.
    Calc(CostCalcArgs),
    /// Price translating and voicing a text file.
    File(CostFileArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Pricing and report options shared by the cost commands.
#[derive(Debug, Args)]
pub struct CostReportArgs {
    /// Model to price (see the pricing table in `cost`).
    #[arg(long, default_value = DEFAULT_COST_MODEL)]
    pub model: String,

    #[arg(long = "format", short = 'f', value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// USD to BRL rate for the text report.
    #[arg(long, conflicts_with = "live_rate")]
    pub brl_rate: Option<f64>,

    /// Fetch the current USD to BRL rate over the network.
    #[arg(long)]
    pub live_rate: bool,
}

#[derive(Debug, Args)]
pub struct CostCalcArgs {
    /// Prompt tokens.
    #[arg(long)]
    pub input_tokens: u64,

    /// Completion tokens.
    #[arg(long)]
    pub output_tokens: u64,

    /// Characters sent to TTS.
    #[arg(long, default_value_t = 0)]
    pub tts_chars: u64,

    #[command(flatten)]
    pub report: CostReportArgs,
}

#[derive(Debug, Args)]
pub struct CostFileArgs {
    pub path: PathBuf,

    /// Prompt tokens; estimated from the text when omitted.
    #[arg(long)]
    pub input_tokens: Option<u64>,

    #[command(flatten)]
    pub report: CostReportArgs,
}
