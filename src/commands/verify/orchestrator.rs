use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::normalize::{NormalizedRows, normalize_rows};
use crate::context::VerifySettings;
use crate::model::{ExtractionResult, Row, Template, VerificationOutcome, VerificationState};
use crate::util::write_json_pretty;

const PLACEHOLDERS: [&str; 3] = ["{request}", "{output}", "{pdf}"];
const STDERR_TAIL_CHARS: usize = 400;

/// Files exchanged with the correction command for one extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct VerificationPaths {
    pub(crate) request: PathBuf,
    pub(crate) output: PathBuf,
    pub(crate) enhanced: PathBuf,
}

impl VerificationPaths {
    pub(crate) fn new(work_dir: &Path, stem: &str) -> Self {
        Self {
            request: work_dir.join(format!("{stem}.request.json")),
            output: work_dir.join(format!("{stem}.correction.json")),
            enhanced: work_dir.join(format!("{stem}.correction.enhanced.json")),
        }
    }
}

#[derive(Debug, Serialize)]
struct VerificationRequest<'a> {
    template: &'a Template,
    extraction: &'a ExtractionResult,
    source_excerpt: String,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct VerificationJob<'a> {
    pub(crate) template: &'a Template,
    pub(crate) extraction: &'a ExtractionResult,
    pub(crate) pdf: &'a Path,
    pub(crate) source_text: &'a str,
    pub(crate) work_dir: &'a Path,
    pub(crate) stem: &'a str,
}

/// Runs the external correction command and always yields usable rows:
/// the corrected ones, or the extraction's own rows on any failure.
#[derive(Debug, Clone)]
pub(crate) struct VerificationOrchestrator {
    settings: VerifySettings,
}

struct Trace {
    started: Instant,
    states: Vec<VerificationState>,
    notes: Vec<String>,
}

impl Trace {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            states: vec![VerificationState::Pending],
            notes: Vec::new(),
        }
    }

    fn enter(&mut self, state: VerificationState) {
        debug!(state = ?state, "verification state");
        self.states.push(state);
    }

    fn note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    fn finish(
        mut self,
        status: VerificationState,
        rows: Vec<Row>,
        output_path: Option<&Path>,
    ) -> VerificationOutcome {
        self.enter(status);
        VerificationOutcome {
            corrected: status == VerificationState::Corrected,
            status,
            states: self.states,
            rows,
            notes: self.notes,
            duration_ms: u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX),
            output_path: output_path.map(|path| path.display().to_string()),
        }
    }
}

impl VerificationOrchestrator {
    pub(crate) fn new(settings: VerifySettings) -> Self {
        Self { settings }
    }

    pub(crate) async fn verify(&self, job: VerificationJob<'_>) -> VerificationOutcome {
        let mut trace = Trace::new();
        let original = job.extraction.rows.clone();
        let row_count = original.len();

        if self.settings.quick_mode && row_count <= self.settings.quick_threshold {
            trace.note(format!(
                "quick mode: {row_count} row(s) at or below threshold {}",
                self.settings.quick_threshold
            ));
            return trace.finish(VerificationState::Skipped, original, None);
        }
        let Some(program) = self.settings.program.as_deref() else {
            trace.note("no correction command configured");
            return trace.finish(VerificationState::Skipped, original, None);
        };

        let paths = VerificationPaths::new(job.work_dir, job.stem);
        let request = VerificationRequest {
            template: job.template,
            extraction: job.extraction,
            source_excerpt: excerpt(job.source_text, self.settings.excerpt_chars),
        };
        if let Err(err) = write_json_pretty(&paths.request, &request) {
            trace.note(format!("failed to write request: {err:#}"));
            return trace.finish(VerificationState::FailedFallback, original, None);
        }
        for stale in [&paths.output, &paths.enhanced] {
            if stale.exists()
                && let Err(err) = fs::remove_file(stale)
            {
                warn!(path = %stale.display(), error = %err, "failed to remove stale correction output");
            }
        }

        trace.enter(VerificationState::Running);
        let args = command_args(&self.settings.args, &paths, job.pdf);
        info!(
            program = %program,
            form_code = %job.extraction.form_code,
            rows = row_count,
            "running correction command"
        );

        match self.run_command(program, &args).await {
            CommandResult::TimedOut => {
                let seconds = self.settings.timeout.map(|limit| limit.as_secs_f64()).unwrap_or(0.0);
                warn!(program = %program, seconds, "correction command timed out");
                trace.note(format!("correction command exceeded {seconds:.1}s"));
                trace.finish(VerificationState::TimeoutFallback, original, None)
            }
            CommandResult::SpawnFailed(err) => {
                warn!(program = %program, error = %err, "failed to start correction command");
                trace.note(format!("failed to start {program}: {err}"));
                trace.finish(VerificationState::FailedFallback, original, None)
            }
            CommandResult::Finished(output) if !output.status.success() => {
                let stderr = tail(&String::from_utf8_lossy(&output.stderr), STDERR_TAIL_CHARS);
                warn!(program = %program, status = %output.status, "correction command failed");
                trace.note(format!("correction command exited with {}", output.status));
                if !stderr.is_empty() {
                    trace.note(format!("stderr: {stderr}"));
                }
                trace.finish(VerificationState::FailedFallback, original, None)
            }
            CommandResult::Finished(_) => match read_corrected(&paths, row_count, &mut trace) {
                Some((rows, path)) => {
                    info!(rows = rows.len(), path = %path.display(), "extraction corrected");
                    trace.finish(VerificationState::Corrected, rows, Some(&path))
                }
                None => trace.finish(VerificationState::FailedFallback, original, None),
            },
        }
    }

    async fn run_command(&self, program: &str, args: &[String]) -> CommandResult {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let result = match self.settings.timeout {
            Some(limit) => match tokio::time::timeout(limit, command.output()).await {
                Ok(result) => result,
                Err(_) => return CommandResult::TimedOut,
            },
            None => command.output().await,
        };

        match result {
            Ok(output) => CommandResult::Finished(output),
            Err(err) => CommandResult::SpawnFailed(err),
        }
    }
}

enum CommandResult {
    Finished(Output),
    SpawnFailed(std::io::Error),
    TimedOut,
}

/// Placeholders are substituted in place; without any, the three paths are
/// appended as `--request`, `--output` and `--pdf`.
pub(crate) fn command_args(args: &[String], paths: &VerificationPaths, pdf: &Path) -> Vec<String> {
    let uses_placeholders = args
        .iter()
        .any(|arg| PLACEHOLDERS.iter().any(|placeholder| arg.contains(placeholder)));

    if uses_placeholders {
        let request = paths.request.display().to_string();
        let output = paths.output.display().to_string();
        let pdf = pdf.display().to_string();
        return args
            .iter()
            .map(|arg| {
                arg.replace("{request}", &request)
                    .replace("{output}", &output)
                    .replace("{pdf}", &pdf)
            })
            .collect();
    }

    let mut combined = args.to_vec();
    combined.extend([
        "--request".to_string(),
        paths.request.display().to_string(),
        "--output".to_string(),
        paths.output.display().to_string(),
        "--pdf".to_string(),
        pdf.display().to_string(),
    ]);
    combined
}

/// The enhanced file wins when it holds usable rows; the plain output is
/// the fallback. Empty rows are unusable unless the extraction was empty too.
fn read_corrected(
    paths: &VerificationPaths,
    original_rows: usize,
    trace: &mut Trace,
) -> Option<(Vec<Row>, PathBuf)> {
    let mut seen = false;
    for path in [&paths.enhanced, &paths.output] {
        if !path.is_file() {
            continue;
        }
        seen = true;
        match usable_rows(path, original_rows) {
            Ok(rows) => return Some((rows, path.clone())),
            Err(reason) => {
                warn!(path = %path.display(), reason = %reason, "ignoring correction output");
                trace.note(format!("{}: {reason}", display_name(path)));
            }
        }
    }

    if !seen {
        trace.note("correction command produced no output file");
    }
    None
}

fn usable_rows(path: &Path, original_rows: usize) -> Result<Vec<Row>, String> {
    let raw = fs::read(path).map_err(|err| format!("unreadable ({err})"))?;
    let value =
        serde_json::from_slice::<Value>(&raw).map_err(|err| format!("malformed JSON ({err})"))?;

    match normalize_rows(value) {
        NormalizedRows::Rows(rows) if rows.is_empty() && original_rows > 0 => {
            Err("no rows".to_string())
        }
        NormalizedRows::Rows(rows) => Ok(rows),
        NormalizedRows::Passthrough(_) => Err("unrecognized shape".to_string()),
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default()
        .to_string()
}

pub(crate) fn excerpt(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

fn tail(text: &str, limit: usize) -> String {
    let trimmed = text.trim();
    let count = trimmed.chars().count();
    trimmed.chars().skip(count.saturating_sub(limit)).collect()
}
