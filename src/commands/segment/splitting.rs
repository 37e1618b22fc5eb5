use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use super::plan::SegmentPlan;
use crate::form_code::FormCodeResolver;
use crate::model::{FormRange, SegmentationManifest, SplitArtifact, SplitFileEntry};
use crate::pdf::copy_page_span;
use crate::util::{now_utc_string, safe_name};

const MANIFEST_VERSION: u32 = 1;

/// One artifact per range, named `<label>_<start>_<end>.pdf`. A name already
/// taken gets a numeric suffix.
pub(crate) fn plan_artifacts(
    ranges: &[FormRange],
    splits_dir: &Path,
    resolver: &FormCodeResolver,
) -> Vec<SplitArtifact> {
    let mut taken = BTreeSet::<String>::new();
    let mut artifacts = Vec::with_capacity(ranges.len());

    for range in ranges {
        let stem = format!(
            "{}_{}_{}",
            safe_name(&range.form_label),
            range.start_page,
            range.end_page
        );
        let mut filename = format!("{stem}.pdf");
        let mut suffix = 2;
        while taken.contains(&filename) {
            filename = format!("{stem}_{suffix}.pdf");
            suffix += 1;
        }
        taken.insert(filename.clone());

        let form_code = resolver
            .resolve_code(&filename)
            .or_else(|| resolver.resolve_code(&range.form_label));
        if form_code.is_none() {
            warn!(filename = %filename, form = %range.form_label, "no form code derivable for split");
        }

        artifacts.push(SplitArtifact {
            path: splits_dir.join(&filename).display().to_string(),
            filename,
            form_label: range.form_label.clone(),
            form_code,
            start_page: range.start_page,
            end_page: range.end_page,
        });
    }

    artifacts
}

pub(crate) fn build_manifest(
    company: &str,
    source_pdf: &Path,
    source_sha256: String,
    splits_dir: &Path,
    plan: &SegmentPlan,
    artifacts: &[SplitArtifact],
) -> SegmentationManifest {
    let original_filename = source_pdf
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default()
        .to_string();

    SegmentationManifest {
        manifest_version: MANIFEST_VERSION,
        generated_at: now_utc_string(),
        company: company.to_string(),
        original_filename,
        source_sha256,
        total_pages: plan.total_pages,
        splits_folder: splits_dir.display().to_string(),
        total_splits: artifacts.len(),
        split_files: artifacts
            .iter()
            .map(|artifact| SplitFileEntry {
                filename: artifact.filename.clone(),
                form_name: artifact.form_label.clone(),
                form_code: artifact.form_code.clone(),
                start_page: artifact.start_page,
                end_page: artifact.end_page,
            })
            .collect(),
        ranges: plan.ranges.clone(),
        method: plan.method,
        index_pages: plan.index_pages.clone(),
        validation: plan.validation.clone(),
        adjustments: plan.adjustments.clone(),
        uncovered: plan.uncovered.clone(),
    }
}

pub(crate) fn write_splits(source_pdf: &Path, artifacts: &[SplitArtifact]) -> Result<()> {
    for artifact in artifacts {
        copy_page_span(
            source_pdf,
            artifact.start_page,
            artifact.end_page,
            Path::new(&artifact.path),
        )
        .with_context(|| format!("failed to write split {}", artifact.filename))?;
        info!(
            filename = %artifact.filename,
            pages = %format!("{}-{}", artifact.start_page, artifact.end_page),
            form_code = %artifact.form_code.as_deref().unwrap_or("-"),
            "wrote split"
        );
    }
    Ok(())
}

/// Deletes splits listed by the previous manifest that the new plan no longer
/// produces. Returns how many files were removed.
pub(crate) fn remove_stale_splits(
    previous: &SegmentationManifest,
    splits_dir: &Path,
    current: &[SplitArtifact],
) -> Result<usize> {
    let keep = current
        .iter()
        .map(|artifact| artifact.filename.as_str())
        .collect::<BTreeSet<&str>>();

    let mut removed = 0;
    for entry in &previous.split_files {
        if keep.contains(entry.filename.as_str()) {
            continue;
        }
        // never follow a manifest entry outside the splits directory
        if entry.filename.contains('/') || entry.filename.contains('\\') {
            continue;
        }
        let path = splits_dir.join(&entry.filename);
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("failed to remove stale split {}", path.display()))?;
            removed += 1;
        }
    }

    if removed > 0 {
        info!(removed, "removed stale splits");
    }
    Ok(removed)
}
