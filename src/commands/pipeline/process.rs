use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{info, warn};

use crate::commands::extract::{
    TemplateRegistry, extract_artifact, file_name_of, resolve_artifact_code,
};
use crate::commands::verify::{
    VerificationJob, VerificationOrchestrator, canonical_form, write_verified,
};
use crate::context::RunContext;
use crate::error::ArtifactError;
use crate::form_code::FormCodeResolver;
use crate::model::{
    ArtifactReport, CanonicalForm, RunCounts, RunSummary, SegmentationMethod, SplitArtifact,
    VerificationState,
};
use crate::pdf::DocumentText;
use crate::util::{now_utc_string, write_json_pretty};

const SUMMARY_VERSION: u32 = 1;

/// Everything a run produced for its artifacts.
#[derive(Debug, Clone)]
pub(crate) struct RunResult {
    pub(crate) summary: RunSummary,
    pub(crate) canonical: Vec<CanonicalForm>,
}

struct Processed {
    form_code: String,
    template_path: String,
    extracted_rows: usize,
    status: VerificationState,
    canonical: CanonicalForm,
}

/// Drives every split artifact through code resolution, template lookup,
/// extraction and verification. A failing artifact is recorded and skipped.
pub(crate) struct ArtifactProcessor<'a, L> {
    context: &'a RunContext,
    resolver: &'a FormCodeResolver,
    orchestrator: VerificationOrchestrator,
    load_text: L,
}

impl<'a, L> ArtifactProcessor<'a, L>
where
    L: Fn(&Path) -> Result<DocumentText>,
{
    /// `load_text` yields the layout text of one split file.
    pub(crate) fn new(context: &'a RunContext, resolver: &'a FormCodeResolver, load_text: L) -> Self {
        Self {
            context,
            resolver,
            orchestrator: VerificationOrchestrator::new(context.verify.clone()),
            load_text,
        }
    }

    pub(crate) async fn process_all(
        &self,
        artifacts: &[SplitArtifact],
        method: SegmentationMethod,
        started_at: String,
    ) -> RunResult {
        let registry = match &self.context.templates_dir {
            Some(dir) => TemplateRegistry::load(dir, &self.context.company, self.resolver),
            None => Err(ArtifactError::Other(anyhow::anyhow!(
                "no template directory configured"
            ))),
        };
        if let Err(err) = &registry {
            warn!(company = %self.context.company, error = %err, "template registry unavailable");
        }

        let mut reports = Vec::with_capacity(artifacts.len());
        let mut canonical = Vec::new();
        let mut counts = RunCounts {
            artifacts: artifacts.len(),
            ..RunCounts::default()
        };
        let mut cancelled = false;

        for (position, artifact) in artifacts.iter().enumerate() {
            if self.context.is_cancelled() {
                warn!(
                    remaining = artifacts.len() - position,
                    "run cancelled; not starting further artifacts"
                );
                cancelled = true;
                break;
            }

            let known_code = artifact
                .form_code
                .clone()
                .or_else(|| self.resolver.resolve_code(&artifact.filename));
            let result = match &registry {
                Ok(registry) => self.process_artifact(artifact, registry).await,
                Err(err) => Err(Failure::Shared(err)),
            };

            match result {
                Ok(Some(done)) => {
                    counts.processed += 1;
                    counts.rows_total += done.canonical.rows.len();
                    match done.status {
                        VerificationState::Corrected => counts.corrected += 1,
                        VerificationState::Skipped
                        | VerificationState::FailedFallback
                        | VerificationState::TimeoutFallback => counts.fallback += 1,
                        _ => {}
                    }
                    reports.push(ArtifactReport {
                        filename: artifact.filename.clone(),
                        form_label: artifact.form_label.clone(),
                        form_code: Some(done.form_code),
                        template_path: Some(done.template_path),
                        extracted_rows: done.extracted_rows,
                        final_rows: done.canonical.rows.len(),
                        verification: Some(done.status),
                        error: None,
                    });
                    canonical.push(done.canonical);
                }
                Ok(None) => {
                    warn!(filename = %artifact.filename, "run cancelled during verification");
                    cancelled = true;
                    break;
                }
                Err(failure) => {
                    let report = failure.error().report();
                    warn!(
                        filename = %artifact.filename,
                        kind = %report.kind,
                        error = %report.message,
                        "artifact skipped"
                    );
                    counts.failed += 1;
                    reports.push(ArtifactReport {
                        filename: artifact.filename.clone(),
                        form_label: artifact.form_label.clone(),
                        form_code: known_code,
                        template_path: None,
                        extracted_rows: 0,
                        final_rows: 0,
                        verification: None,
                        error: Some(report),
                    });
                }
            }
        }

        RunResult {
            summary: RunSummary {
                manifest_version: SUMMARY_VERSION,
                run_id: self.context.run_id.clone(),
                company: self.context.company.clone(),
                source: self.context.source_pdf.display().to_string(),
                started_at,
                updated_at: now_utc_string(),
                method,
                cancelled,
                counts,
                artifacts: reports,
            },
            canonical,
        }
    }

    /// `Ok(None)` when the run was cancelled while verification was running.
    async fn process_artifact(
        &self,
        artifact: &SplitArtifact,
        registry: &TemplateRegistry,
    ) -> Result<Option<Processed>, Failure<'_>> {
        let form_code = match &artifact.form_code {
            Some(code) => code.clone(),
            None => resolve_artifact_code(self.resolver, &artifact.filename)?,
        };
        let template =
            registry.resolve_artifact(&artifact.form_label, &form_code, &self.context.rules)?;

        let split_path = PathBuf::from(&artifact.path);
        let document = (self.load_text)(&split_path).map_err(ArtifactError::Other)?;
        let extraction = extract_artifact(
            &template,
            &form_code,
            &document,
            &self.context.rules,
            self.resolver,
            &artifact.filename,
        )?;

        let stem = artifact_stem(&artifact.filename);
        let extracted_path = self.context.extracted_dir().join(format!("{stem}.json"));
        write_json_pretty(&extracted_path, &extraction).map_err(ArtifactError::Other)?;
        info!(
            filename = %artifact.filename,
            form_code = %form_code,
            rows = extraction.rows.len(),
            "artifact extracted"
        );

        let verified_dir = self.context.verified_dir();
        let source_text = document.pages.join("\n\x0c");
        let job = VerificationJob {
            template: &template,
            extraction: &extraction,
            pdf: &split_path,
            source_text: &source_text,
            work_dir: &verified_dir,
            stem: &stem,
        };
        let outcome = tokio::select! {
            outcome = self.orchestrator.verify(job) => outcome,
            _ = self.context.cancel.cancelled() => return Ok(None),
        };
        info!(
            filename = %artifact.filename,
            status = ?outcome.status,
            rows = outcome.rows.len(),
            duration_ms = outcome.duration_ms,
            "artifact verified"
        );
        let verified_path = verified_dir.join(format!("{stem}.verified.json"));
        write_verified(&verified_path, &extraction, &outcome).map_err(ArtifactError::Other)?;

        Ok(Some(Processed {
            form_code,
            template_path: template.file_path.clone(),
            extracted_rows: extraction.rows.len(),
            status: outcome.status,
            canonical: canonical_form(&artifact.filename, &extraction, &outcome),
        }))
    }
}

/// An artifact failure that is either its own or shared by every artifact
/// of the run, such as a missing company directory.
enum Failure<'e> {
    Owned(ArtifactError),
    Shared(&'e ArtifactError),
}

impl Failure<'_> {
    fn error(&self) -> &ArtifactError {
        match self {
            Self::Owned(err) => err,
            Self::Shared(err) => err,
        }
    }
}

impl From<ArtifactError> for Failure<'_> {
    fn from(err: ArtifactError) -> Self {
        Self::Owned(err)
    }
}

/// Writes `canonical_rows.json` and `run_summary.json` into the run directory.
pub(crate) fn write_run_outputs(context: &RunContext, result: &RunResult) -> Result<()> {
    write_json_pretty(&context.canonical_rows_path(), &result.canonical)?;
    write_json_pretty(&context.summary_path(), &result.summary)?;
    Ok(())
}

fn artifact_stem(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| file_name_of(Path::new(filename)))
}
