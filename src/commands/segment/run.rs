use anyhow::{Result, bail};
use tracing::{info, warn};

use super::plan::{SegmentPlan, Segmenter};
use super::splitting::{build_manifest, plan_artifacts, remove_stale_splits, write_splits};
use crate::cli::SegmentArgs;
use crate::context::{RunContext, SegmentSettings};
use crate::form_code::FormCodeResolver;
use crate::model::{SegmentationManifest, SplitArtifact};
use crate::pdf::{DocumentText, TextMode, ensure_tools, load_document};
use crate::rules::RuleTable;
use crate::util::{ensure_directory, read_json, sha256_file, write_json_pretty};

#[derive(Debug, Clone)]
pub(crate) struct SegmentOutcome {
    pub(crate) manifest: SegmentationManifest,
    pub(crate) artifacts: Vec<SplitArtifact>,
}

pub fn run(args: SegmentArgs) -> Result<()> {
    if !args.pdf.is_file() {
        bail!("source document not found: {}", args.pdf.display());
    }

    let rules = RuleTable::load(args.rules.as_deref())?;
    let mut context = RunContext::new(
        &args.company,
        &args.pdf,
        &args.output_root,
        args.run_id.as_deref(),
        rules,
    );
    context.segment = SegmentSettings::from(&args.segmentation);
    let resolver = FormCodeResolver::new(&context.rules)?;

    if args.dry_run {
        ensure_tools(&["pdftotext", "pdfinfo"])?;
    } else {
        ensure_tools(&["pdftotext", "pdfinfo", "qpdf"])?;
    }

    let document = load_document(&args.pdf, TextMode::Raw)?;
    info!(
        path = %args.pdf.display(),
        company = %args.company,
        pages = document.total_pages,
        "segmentation started"
    );

    if args.dry_run {
        let plan = Segmenter::new(&context.segment, &resolver)?.plan(&document);
        log_plan(&plan);
        info!("segmentation dry-run complete");
        return Ok(());
    }

    let outcome = segment_document(&context, &resolver, &document)?;
    info!(
        run_dir = %context.run_dir.display(),
        manifest = %context.manifest_path().display(),
        splits = outcome.manifest.total_splits,
        method = outcome.manifest.method.as_str(),
        "segmentation completed"
    );

    Ok(())
}

/// Plans, writes the split files and rewrites the manifest in place.
pub(crate) fn segment_document(
    context: &RunContext,
    resolver: &FormCodeResolver,
    document: &DocumentText,
) -> Result<SegmentOutcome> {
    let plan = Segmenter::new(&context.segment, resolver)?.plan(document);
    log_plan(&plan);

    let splits_dir = context.splits_dir();
    ensure_directory(&splits_dir)?;
    let artifacts = plan_artifacts(&plan.ranges, &splits_dir, resolver);

    let manifest_path = context.manifest_path();
    if manifest_path.exists() {
        match read_json::<SegmentationManifest>(&manifest_path) {
            Ok(previous) => {
                remove_stale_splits(&previous, &splits_dir, &artifacts)?;
            }
            Err(err) => {
                warn!(path = %manifest_path.display(), error = %err, "ignoring unreadable previous manifest");
            }
        }
    }

    write_splits(&context.source_pdf, &artifacts)?;

    let manifest = build_manifest(
        &context.company,
        &context.source_pdf,
        sha256_file(&context.source_pdf)?,
        &splits_dir,
        &plan,
        &artifacts,
    );
    write_json_pretty(&manifest_path, &manifest)?;
    info!(path = %manifest_path.display(), "wrote segmentation manifest");

    Ok(SegmentOutcome {
        manifest,
        artifacts,
    })
}

fn log_plan(plan: &SegmentPlan) {
    info!(
        method = plan.method.as_str(),
        index_pages = ?plan.index_pages,
        index_entries = plan.entries.len(),
        "segmentation plan"
    );
    for range in &plan.ranges {
        info!(
            form = %range.form_label,
            start = range.start_page,
            end = range.end_page,
            "planned range"
        );
    }
    for span in &plan.uncovered {
        info!(start = span.start, end = span.end, "uncovered pages");
    }
    if let Some(validation) = &plan.validation {
        info!(
            checked = validation.checked,
            validated = validation.validated,
            trust_ratio = validation.trust_ratio,
            accepted = validation.accepted,
            "index validation summary"
        );
    }
}
