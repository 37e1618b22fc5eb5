use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "lforms",
    version,
    about = "Segment insurer L-form filings and extract their tables"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Split a filing into one PDF per form.
    Segment(SegmentArgs),
    /// Extract table rows from one split artifact.
    Extract(ExtractArgs),
    /// Reconcile one extraction through the correction command.
    Verify(VerifyArgs),
    /// Segment, extract and verify a whole filing.
    Run(RunArgs),
    /// Inspect the template registry.
    Templates(TemplatesArgs),
    /// Summarize a finished run directory.
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SegmentationFlags {
    /// Leading pages scanned for a table of contents.
    #[arg(long, default_value_t = 3)]
    pub index_scan_pages: usize,

    /// A page is an index page when its code-bearing line count exceeds this.
    #[arg(long, default_value_t = 10)]
    pub index_density_threshold: usize,

    #[arg(long, default_value_t = 0.6)]
    pub trust_threshold: f64,

    #[arg(long, default_value_t = 3)]
    pub min_checked_entries: usize,

    /// Maximum number of index entries sampled for validation.
    #[arg(long, default_value_t = 12)]
    pub validation_sample: usize,

    /// Leading non-empty lines searched for a form heading.
    #[arg(long, default_value_t = 6)]
    pub heading_lines: usize,

    /// Added to printed index page numbers to obtain PDF page numbers.
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    pub page_offset: i32,
}

#[derive(Args, Debug, Clone)]
pub struct VerifierFlags {
    /// Correction command; verification is skipped when absent.
    #[arg(long)]
    pub verifier_cmd: Option<String>,

    /// Extra argument for the correction command; supports {request}, {output}, {pdf}.
    #[arg(long = "verifier-arg", allow_hyphen_values = true)]
    pub verifier_args: Vec<String>,

    /// Wall-clock budget for one correction call; 0 disables the bound.
    #[arg(long, default_value_t = 300)]
    pub verify_timeout_secs: u64,

    #[arg(long, default_value_t = false)]
    pub quick_mode: bool,

    /// Row count at or below which quick mode skips correction.
    #[arg(long, default_value_t = 5)]
    pub quick_threshold: usize,

    /// Character budget of the source excerpt sent with a request.
    #[arg(long, default_value_t = 20_000)]
    pub excerpt_chars: usize,
}

#[derive(Args, Debug, Clone)]
pub struct SegmentArgs {
    #[arg(long)]
    pub pdf: PathBuf,

    #[arg(long)]
    pub company: String,

    #[arg(long, default_value = ".cache/lforms")]
    pub output_root: PathBuf,

    #[arg(long)]
    pub run_id: Option<String>,

    #[arg(long)]
    pub rules: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    #[command(flatten)]
    pub segmentation: SegmentationFlags,
}

#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    /// Split artifact to extract.
    #[arg(long)]
    pub pdf: PathBuf,

    #[arg(long)]
    pub company: String,

    #[arg(long)]
    pub templates_dir: PathBuf,

    /// Overrides the code derived from the artifact filename.
    #[arg(long)]
    pub form_code: Option<String>,

    #[arg(long)]
    pub rules: Option<PathBuf>,

    /// Defaults to `<artifact stem>.json` next to the artifact.
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct VerifyArgs {
    #[arg(long)]
    pub pdf: PathBuf,

    #[arg(long)]
    pub template: PathBuf,

    #[arg(long)]
    pub extraction: PathBuf,

    /// Defaults to `<extraction stem>.verified.json`.
    #[arg(long)]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub verifier: VerifierFlags,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[arg(long)]
    pub pdf: PathBuf,

    #[arg(long)]
    pub company: String,

    #[arg(long)]
    pub templates_dir: PathBuf,

    #[arg(long, default_value = ".cache/lforms")]
    pub output_root: PathBuf,

    #[arg(long)]
    pub run_id: Option<String>,

    #[arg(long)]
    pub rules: Option<PathBuf>,

    #[command(flatten)]
    pub segmentation: SegmentationFlags,

    #[command(flatten)]
    pub verifier: VerifierFlags,
}

#[derive(Args, Debug, Clone)]
pub struct TemplatesArgs {
    #[arg(long)]
    pub templates_dir: PathBuf,

    #[arg(long)]
    pub company: Option<String>,

    /// Show the candidate chain and outcome for this form code.
    #[arg(long, requires = "company")]
    pub resolve: Option<String>,

    #[arg(long)]
    pub rules: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long)]
    pub run_dir: PathBuf,
}
