use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde_json::Value;
use tracing::info;

use super::normalize::extraction_from_value;
use super::orchestrator::{VerificationJob, VerificationOrchestrator};
use crate::cli::VerifyArgs;
use crate::commands::extract::parse_template_file;
use crate::context::VerifySettings;
use crate::form_code::FormCodeResolver;
use crate::model::{ExtractionResult, VerificationOutcome};
use crate::pdf::{TextMode, ensure_tools, load_document};
use crate::rules::RuleTable;
use crate::util::{read_json, write_json_pretty};

pub fn run(args: VerifyArgs) -> Result<()> {
    for (label, path) in [
        ("artifact", &args.pdf),
        ("template", &args.template),
        ("extraction", &args.extraction),
    ] {
        if !path.is_file() {
            bail!("{label} not found: {}", path.display());
        }
    }

    let resolver = FormCodeResolver::new(&RuleTable::default())?;
    let company = args
        .template
        .parent()
        .and_then(|parent| parent.file_name())
        .and_then(|name| name.to_str())
        .unwrap_or_default()
        .to_string();
    let template = parse_template_file(&args.template, &company, &resolver)?;
    let extraction = extraction_from_value(read_json::<Value>(&args.extraction)?)
        .with_context(|| format!("failed to read extraction {}", args.extraction.display()))?;

    ensure_tools(&["pdftotext", "pdfinfo"])?;
    let source_text = load_document(&args.pdf, TextMode::Layout)?.pages.join("\n\x0c");

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output(&args.extraction));
    let work_dir = output
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let stem = verified_stem(&output);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let orchestrator = VerificationOrchestrator::new(VerifySettings::from(&args.verifier));
    let outcome = runtime.block_on(orchestrator.verify(VerificationJob {
        template: &template,
        extraction: &extraction,
        pdf: &args.pdf,
        source_text: &source_text,
        work_dir: &work_dir,
        stem: &stem,
    }));

    write_verified(&output, &extraction, &outcome)?;
    info!(
        path = %output.display(),
        status = ?outcome.status,
        rows = outcome.rows.len(),
        duration_ms = outcome.duration_ms,
        "verification completed"
    );
    for note in &outcome.notes {
        info!(note = %note, "verification note");
    }

    Ok(())
}

/// Writes the extraction with its final rows to `output`, and the outcome
/// record beside it as `<stem>.verification.json`.
pub(crate) fn write_verified(
    output: &Path,
    extraction: &ExtractionResult,
    outcome: &VerificationOutcome,
) -> Result<()> {
    let verified = ExtractionResult {
        rows: outcome.rows.clone(),
        ..extraction.clone()
    };
    write_json_pretty(output, &verified)?;
    let record = output.with_file_name(format!("{}.verification.json", verified_stem(output)));
    write_json_pretty(&record, outcome)?;
    Ok(())
}

fn default_output(extraction: &Path) -> PathBuf {
    let stem = extraction
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("extraction");
    extraction.with_file_name(format!("{stem}.verified.json"))
}

/// `L-1_3_4.verified.json` -> `L-1_3_4`.
pub(crate) fn verified_stem(output: &Path) -> String {
    let file_name = output
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("extraction.verified.json");
    let base = file_name.strip_suffix(".json").unwrap_or(file_name);
    base.strip_suffix(".verified").unwrap_or(base).to_string()
}
