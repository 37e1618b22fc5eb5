use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::cli::{SegmentationFlags, VerifierFlags};
use crate::rules::RuleTable;
use crate::util::{safe_name, utc_compact_string};

#[derive(Debug, Clone)]
pub struct SegmentSettings {
    pub index_scan_pages: usize,
    pub index_density_threshold: usize,
    pub trust_threshold: f64,
    pub min_checked_entries: usize,
    pub validation_sample: usize,
    pub heading_lines: usize,
    pub page_offset: i32,
}

impl Default for SegmentSettings {
    fn default() -> Self {
        Self {
            index_scan_pages: 3,
            index_density_threshold: 10,
            trust_threshold: 0.6,
            min_checked_entries: 3,
            validation_sample: 12,
            heading_lines: 6,
            page_offset: 0,
        }
    }
}

impl From<&SegmentationFlags> for SegmentSettings {
    fn from(flags: &SegmentationFlags) -> Self {
        Self {
            index_scan_pages: flags.index_scan_pages,
            index_density_threshold: flags.index_density_threshold,
            trust_threshold: flags.trust_threshold,
            min_checked_entries: flags.min_checked_entries,
            validation_sample: flags.validation_sample.max(1),
            heading_lines: flags.heading_lines.max(1),
            page_offset: flags.page_offset,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VerifySettings {
    pub program: Option<String>,
    pub args: Vec<String>,
    /// `None` means the correction call runs unbounded.
    pub timeout: Option<Duration>,
    pub quick_mode: bool,
    pub quick_threshold: usize,
    pub excerpt_chars: usize,
}

impl Default for VerifySettings {
    fn default() -> Self {
        Self {
            program: None,
            args: Vec::new(),
            timeout: Some(Duration::from_secs(300)),
            quick_mode: false,
            quick_threshold: 5,
            excerpt_chars: 20_000,
        }
    }
}

impl From<&VerifierFlags> for VerifySettings {
    fn from(flags: &VerifierFlags) -> Self {
        Self {
            program: flags
                .verifier_cmd
                .as_ref()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            args: flags.verifier_args.clone(),
            timeout: (flags.verify_timeout_secs > 0)
                .then(|| Duration::from_secs(flags.verify_timeout_secs)),
            quick_mode: flags.quick_mode,
            quick_threshold: flags.quick_threshold,
            excerpt_chars: flags.excerpt_chars,
        }
    }
}

/// Everything one pipeline run needs, threaded through every stage.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub company: String,
    pub source_pdf: PathBuf,
    pub run_dir: PathBuf,
    pub templates_dir: Option<PathBuf>,
    pub segment: SegmentSettings,
    pub verify: VerifySettings,
    pub rules: RuleTable,
    pub cancel: CancellationToken,
}

impl RunContext {
    pub fn new(
        company: &str,
        source_pdf: &Path,
        output_root: &Path,
        run_id: Option<&str>,
        rules: RuleTable,
    ) -> Self {
        let run_id = run_id
            .map(str::to_string)
            .unwrap_or_else(|| format!("run-{}", utc_compact_string(Utc::now())));
        let document_stem = source_pdf
            .file_stem()
            .and_then(|value| value.to_str())
            .unwrap_or("document");
        let run_dir = output_root
            .join(safe_name(company))
            .join(safe_name(document_stem))
            .join(safe_name(&run_id));

        Self {
            run_id,
            company: company.to_string(),
            source_pdf: source_pdf.to_path_buf(),
            run_dir,
            templates_dir: None,
            segment: SegmentSettings::default(),
            verify: VerifySettings::default(),
            rules,
            cancel: CancellationToken::new(),
        }
    }

    pub fn splits_dir(&self) -> PathBuf {
        self.run_dir.join("splits")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.splits_dir().join("manifest.json")
    }

    pub fn extracted_dir(&self) -> PathBuf {
        self.run_dir.join("extracted")
    }

    pub fn verified_dir(&self) -> PathBuf {
        self.run_dir.join("verified")
    }

    pub fn canonical_rows_path(&self) -> PathBuf {
        self.run_dir.join("canonical_rows.json")
    }

    pub fn summary_path(&self) -> PathBuf {
        self.run_dir.join("run_summary.json")
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_dir_is_scoped_by_company_document_and_run() {
        let context = RunContext::new(
            "Acme Life Insurance",
            Path::new("/tmp/filings/Q3 2024.pdf"),
            Path::new("/out"),
            Some("run-1"),
            RuleTable::default(),
        );
        assert_eq!(
            context.run_dir,
            PathBuf::from("/out/Acme_Life_Insurance/Q3_2024/run-1")
        );
        assert_eq!(
            context.manifest_path(),
            PathBuf::from("/out/Acme_Life_Insurance/Q3_2024/run-1/splits/manifest.json")
        );
    }

    #[test]
    fn zero_timeout_means_unbounded() {
        let flags = VerifierFlags {
            verifier_cmd: Some("fixer".to_string()),
            verifier_args: Vec::new(),
            verify_timeout_secs: 0,
            quick_mode: false,
            quick_threshold: 5,
            excerpt_chars: 100,
        };
        let settings = VerifySettings::from(&flags);
        assert!(settings.timeout.is_none());
        assert_eq!(settings.program.as_deref(), Some("fixer"));
    }
}
