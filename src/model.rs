use serde::{Deserialize, Serialize};

/// One extracted table row: header name to cell text, in template header order.
pub type Row = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub serial: String,
    pub form_label: String,
    #[serde(default)]
    pub description: String,
    pub start_page: Option<u32>,
    pub end_page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_strategy: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub page_diagnostics: Vec<String>,
}

/// Inclusive, 1-indexed page span for one form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormRange {
    pub form_label: String,
    pub start_page: u32,
    pub end_page: u32,
}

impl FormRange {
    pub fn new(form_label: impl Into<String>, start_page: u32, end_page: u32) -> Self {
        Self {
            form_label: form_label.into(),
            start_page,
            end_page,
        }
    }

    pub fn page_count(&self) -> u32 {
        self.end_page.saturating_sub(self.start_page) + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSpan {
    pub start: u32,
    pub end: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentationMethod {
    Index,
    ContentScan,
}

impl SegmentationMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Index => "index",
            Self::ContentScan => "content_scan",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryCheck {
    pub form_label: String,
    pub claimed_page: u32,
    pub matched_page: Option<u32>,
    pub validated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub checked: usize,
    pub validated: usize,
    pub trust_ratio: f64,
    pub accepted: bool,
    pub checks: Vec<EntryCheck>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeAdjustment {
    pub form_label: String,
    pub from_start: u32,
    pub from_end: u32,
    pub to_start: Option<u32>,
    pub to_end: Option<u32>,
    pub reason: String,
}

/// Per-form sub-document written by segmentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitArtifact {
    pub filename: String,
    pub path: String,
    pub form_label: String,
    pub form_code: Option<String>,
    pub start_page: u32,
    pub end_page: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitFileEntry {
    pub filename: String,
    pub form_name: String,
    pub form_code: Option<String>,
    pub start_page: u32,
    pub end_page: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentationManifest {
    pub manifest_version: u32,
    pub generated_at: String,
    pub company: String,
    pub original_filename: String,
    pub source_sha256: String,
    pub total_pages: u32,
    pub splits_folder: String,
    pub total_splits: usize,
    pub split_files: Vec<SplitFileEntry>,
    pub ranges: Vec<FormRange>,
    pub method: SegmentationMethod,
    #[serde(default)]
    pub index_pages: Vec<u32>,
    #[serde(default)]
    pub validation: Option<ValidationSummary>,
    #[serde(default)]
    pub adjustments: Vec<RangeAdjustment>,
    #[serde(default)]
    pub uncovered: Vec<PageSpan>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub company: String,
    pub form_code: String,
    pub title: Option<String>,
    pub headers: Vec<String>,
    pub file_path: String,
}

/// Extraction output file shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    #[serde(rename = "Form No")]
    pub form_code: String,
    #[serde(rename = "Title", default)]
    pub title: String,
    #[serde(rename = "Period", default)]
    pub period: String,
    #[serde(rename = "PagesUsed", default)]
    pub pages_used: Vec<u32>,
    #[serde(rename = "Currency", default)]
    pub currency: String,
    #[serde(rename = "FlatHeaders", default)]
    pub headers: Vec<String>,
    #[serde(rename = "Rows", default)]
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum VerificationState {
    Pending,
    Skipped,
    Running,
    Corrected,
    FailedFallback,
    TimeoutFallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub corrected: bool,
    pub status: VerificationState,
    pub states: Vec<VerificationState>,
    pub rows: Vec<Row>,
    pub notes: Vec<String>,
    pub duration_ms: u64,
    pub output_path: Option<String>,
}

/// Rows handed to storage; identical shape whether or not correction ran.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalForm {
    pub filename: String,
    pub form_code: String,
    pub period: String,
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactErrorReport {
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub available_codes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactReport {
    pub filename: String,
    pub form_label: String,
    pub form_code: Option<String>,
    pub template_path: Option<String>,
    pub extracted_rows: usize,
    pub final_rows: usize,
    pub verification: Option<VerificationState>,
    pub error: Option<ArtifactErrorReport>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunCounts {
    pub artifacts: usize,
    pub processed: usize,
    pub failed: usize,
    pub corrected: usize,
    /// Artifacts whose final rows are the extraction's own (skipped or failed correction).
    pub fallback: usize,
    pub rows_total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub manifest_version: u32,
    pub run_id: String,
    pub company: String,
    pub source: String,
    pub started_at: String,
    pub updated_at: String,
    pub method: SegmentationMethod,
    pub cancelled: bool,
    pub counts: RunCounts,
    pub artifacts: Vec<ArtifactReport>,
}
