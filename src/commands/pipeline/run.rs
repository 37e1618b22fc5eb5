use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use super::process::{ArtifactProcessor, write_run_outputs};
use crate::cli::RunArgs;
use crate::commands::segment::segment_document;
use crate::context::{RunContext, SegmentSettings, VerifySettings};
use crate::form_code::FormCodeResolver;
use crate::pdf::{TextMode, ensure_tools, load_document};
use crate::rules::RuleTable;
use crate::util::now_utc_string;

pub fn run(args: RunArgs) -> Result<()> {
    let started_at = now_utc_string();
    if !args.pdf.is_file() {
        bail!("source document not found: {}", args.pdf.display());
    }
    if !args.templates_dir.is_dir() {
        bail!("templates directory not found: {}", args.templates_dir.display());
    }

    let rules = RuleTable::load(args.rules.as_deref())?;
    let mut context = RunContext::new(
        &args.company,
        &args.pdf,
        &args.output_root,
        args.run_id.as_deref(),
        rules,
    );
    context.templates_dir = Some(args.templates_dir.clone());
    context.segment = SegmentSettings::from(&args.segmentation);
    context.verify = VerifySettings::from(&args.verifier);
    let resolver = FormCodeResolver::new(&context.rules)?;

    ensure_tools(&["pdftotext", "pdfinfo", "qpdf"])?;
    info!(
        run_id = %context.run_id,
        company = %context.company,
        path = %args.pdf.display(),
        run_dir = %context.run_dir.display(),
        "run started"
    );

    let document = load_document(&args.pdf, TextMode::Raw)?;
    let segmented = segment_document(&context, &resolver, &document)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    let cancel = context.cancel.clone();
    runtime.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; cancelling run");
            cancel.cancel();
        }
    });

    let processor = ArtifactProcessor::new(&context, &resolver, |path: &Path| {
        load_document(path, TextMode::Layout)
    });
    let result = runtime.block_on(processor.process_all(
        &segmented.artifacts,
        segmented.manifest.method,
        started_at,
    ));
    write_run_outputs(&context, &result)?;

    let counts = &result.summary.counts;
    info!(
        artifacts = counts.artifacts,
        processed = counts.processed,
        failed = counts.failed,
        corrected = counts.corrected,
        fallback = counts.fallback,
        rows = counts.rows_total,
        summary = %context.summary_path().display(),
        "run completed"
    );

    if result.summary.cancelled {
        bail!(
            "run cancelled after {} of {} artifacts",
            result.summary.artifacts.len(),
            counts.artifacts
        );
    }

    Ok(())
}
