use anyhow::{Result, bail};
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::model::{RunSummary, SegmentationManifest};
use crate::util::read_json;

pub fn run(args: StatusArgs) -> Result<()> {
    if !args.run_dir.is_dir() {
        bail!("run directory not found: {}", args.run_dir.display());
    }

    let manifest_path = args.run_dir.join("splits").join("manifest.json");
    let summary_path = args.run_dir.join("run_summary.json");

    info!(run_dir = %args.run_dir.display(), "status requested");

    if manifest_path.exists() {
        let manifest: SegmentationManifest = read_json(&manifest_path)?;
        let (covered, uncovered) = coverage(&manifest);

        info!(
            company = %manifest.company,
            source = %manifest.original_filename,
            generated_at = %manifest.generated_at,
            method = manifest.method.as_str(),
            total_pages = manifest.total_pages,
            splits = manifest.total_splits,
            covered_pages = covered,
            uncovered_pages = uncovered,
            adjustments = manifest.adjustments.len(),
            "loaded segmentation manifest"
        );
        if let Some(validation) = &manifest.validation {
            info!(
                checked = validation.checked,
                validated = validation.validated,
                trust_ratio = validation.trust_ratio,
                accepted = validation.accepted,
                "index validation"
            );
        }
        for span in &manifest.uncovered {
            warn!(start = span.start, end = span.end, "uncovered pages");
        }
    } else {
        warn!(path = %manifest_path.display(), "segmentation manifest missing");
    }

    if summary_path.exists() {
        let summary: RunSummary = read_json(&summary_path)?;
        let counts = &summary.counts;

        info!(
            run_id = %summary.run_id,
            started_at = %summary.started_at,
            updated_at = %summary.updated_at,
            cancelled = summary.cancelled,
            artifacts = counts.artifacts,
            processed = counts.processed,
            failed = counts.failed,
            corrected = counts.corrected,
            fallback = counts.fallback,
            rows = counts.rows_total,
            "loaded run summary"
        );
        for report in &summary.artifacts {
            match &report.error {
                Some(error) => warn!(
                    filename = %report.filename,
                    form_code = %report.form_code.as_deref().unwrap_or_default(),
                    kind = %error.kind,
                    error = %error.message,
                    "artifact failed"
                ),
                None => info!(
                    filename = %report.filename,
                    form_code = %report.form_code.as_deref().unwrap_or_default(),
                    verification = ?report.verification,
                    rows = report.final_rows,
                    "artifact processed"
                ),
            }
        }
    } else {
        warn!(path = %summary_path.display(), "run summary missing");
    }

    Ok(())
}

/// Pages assigned to some range, and pages assigned to none.
fn coverage(manifest: &SegmentationManifest) -> (u32, u32) {
    let covered = manifest
        .ranges
        .iter()
        .map(|range| range.page_count())
        .sum::<u32>();
    (covered, manifest.total_pages.saturating_sub(covered))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FormRange, PageSpan, SegmentationMethod};

    #[test]
    fn coverage_counts_pages_outside_every_range() {
        let manifest = SegmentationManifest {
            manifest_version: 1,
            generated_at: "2024-12-31T00:00:00Z".to_string(),
            company: "Acme Life".to_string(),
            original_filename: "acme_q3.pdf".to_string(),
            source_sha256: String::new(),
            total_pages: 10,
            splits_folder: "splits".to_string(),
            total_splits: 2,
            split_files: Vec::new(),
            ranges: vec![FormRange::new("L-1", 3, 4), FormRange::new("L-2", 5, 5)],
            method: SegmentationMethod::Index,
            index_pages: vec![1],
            validation: None,
            adjustments: Vec::new(),
            uncovered: vec![PageSpan { start: 1, end: 2 }, PageSpan { start: 6, end: 10 }],
        };

        assert_eq!(coverage(&manifest), (3, 7));
    }
}
