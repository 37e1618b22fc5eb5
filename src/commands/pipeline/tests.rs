use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Result, anyhow};
use serde_json::Value;

use super::process::{ArtifactProcessor, RunResult, write_run_outputs};
use crate::context::{RunContext, VerifySettings};
use crate::form_code::FormCodeResolver;
use crate::model::{SegmentationMethod, SplitArtifact, VerificationState};
use crate::pdf::DocumentText;
use crate::rules::RuleTable;

fn layout_line(particulars: &str, schedule: &str, current: &str, previous: &str) -> String {
    format!("{particulars:<28}{schedule:<14}{current:<17}{previous}")
}

fn revenue_page() -> String {
    [
        "FORM L-1-A-RA".to_string(),
        "REVENUE ACCOUNT FOR THE QUARTER ENDED 31ST DECEMBER, 2024".to_string(),
        "(Amount in Rs. Lakhs)".to_string(),
        layout_line("Particulars", "Schedule", "Current Year", "Previous Year"),
        layout_line("Premiums earned", "L-4", "1,200", "1,100"),
        layout_line("Income from investments", "", "300", "250"),
        layout_line("Total", "", "1,500", "1,350"),
    ]
    .join("\n")
}

/// Codes are derived the same way segmentation derives them for its splits.
fn artifact(filename: &str, form_label: &str, page: u32) -> SplitArtifact {
    let resolver = FormCodeResolver::new(&RuleTable::default()).expect("resolver");
    SplitArtifact {
        filename: filename.to_string(),
        path: format!("/splits/{filename}"),
        form_label: form_label.to_string(),
        form_code: resolver
            .resolve_code(filename)
            .or_else(|| resolver.resolve_code(form_label)),
        start_page: page,
        end_page: page,
    }
}

fn fixture_text(path: &Path) -> Result<DocumentText> {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow!("unnamed split"))?;
    let page = if name.starts_with("L-1-A") {
        revenue_page()
    } else if name.starts_with("L-2") {
        "FORM L-2\nPROFIT AND LOSS ACCOUNT\n".to_string()
    } else {
        String::new()
    };
    Ok(DocumentText::from_pages(vec![page]))
}

struct Workspace {
    _root: tempfile::TempDir,
    context: RunContext,
}

fn workspace(company: &str) -> Workspace {
    let root = tempfile::tempdir().expect("tempdir");
    let templates = root.path().join("templates").join("Acme Life Insurance Co");
    fs::create_dir_all(&templates).expect("template dir");
    fs::write(
        templates.join("L-1-A.json"),
        r#"{"Form No": "L-1-A", "Title": "Revenue Account", "FlatHeaders": ["Particulars", "Schedule", "Current Year", "Previous Year"]}"#,
    )
    .expect("template");
    fs::write(
        templates.join("L-2-A.json"),
        r#"{"Form No": "L-2-A", "FlatHeaders": ["Particulars", "Schedule", "Current Year", "Previous Year"]}"#,
    )
    .expect("template");

    let mut context = RunContext::new(
        company,
        Path::new("/filings/acme_q3.pdf"),
        &root.path().join("out"),
        Some("run-test"),
        RuleTable::default(),
    );
    context.templates_dir = Some(root.path().join("templates"));
    context.verify = VerifySettings::default();

    Workspace {
        _root: root,
        context,
    }
}

fn artifacts() -> Vec<SplitArtifact> {
    vec![
        artifact("L-1-A-RA_1_1.pdf", "L-1-A-RA", 1),
        artifact("L-99_2_2.pdf", "L-99", 2),
        artifact("Annexure_3_3.pdf", "Annexure", 3),
        artifact("L-2-A-PL_4_4.pdf", "L-2-A-PL", 4),
    ]
}

async fn process(context: &RunContext, artifacts: &[SplitArtifact]) -> RunResult {
    let resolver = FormCodeResolver::new(&context.rules).expect("resolver");
    ArtifactProcessor::new(context, &resolver, fixture_text)
        .process_all(artifacts, SegmentationMethod::Index, "2024-12-31T00:00:00Z".to_string())
        .await
}

#[tokio::test]
async fn failures_are_scoped_to_their_artifact() {
    let workspace = workspace("Acme Life");
    let result = process(&workspace.context, &artifacts()).await;
    let summary = &result.summary;

    assert!(!summary.cancelled);
    assert_eq!(summary.counts.artifacts, 4);
    assert_eq!(summary.counts.processed, 1);
    assert_eq!(summary.counts.failed, 3);
    assert_eq!(summary.counts.rows_total, 3);
    assert_eq!(summary.counts.corrected, 0);
    assert_eq!(summary.counts.fallback, 1);

    let kinds = summary
        .artifacts
        .iter()
        .map(|report| report.error.as_ref().map(|error| error.kind.as_str()))
        .collect::<Vec<Option<&str>>>();
    assert_eq!(
        kinds,
        vec![
            None,
            Some("template_not_found"),
            Some("code_resolution"),
            Some("extraction")
        ]
    );

    let missing = summary.artifacts[1].error.as_ref().expect("error");
    assert_eq!(missing.available_codes, vec!["L-1-A", "L-2-A"]);
    assert_eq!(summary.artifacts[1].form_code.as_deref(), Some("L-99"));
    assert_eq!(summary.artifacts[2].form_code, None);

    let done = &summary.artifacts[0];
    assert_eq!(done.form_code.as_deref(), Some("L-1-A"));
    assert_eq!(done.verification, Some(VerificationState::Skipped));
    assert_eq!(done.extracted_rows, 3);
    assert!(done.template_path.as_deref().is_some_and(|path| path.ends_with("L-1-A.json")));

    assert_eq!(result.canonical.len(), 1);
    assert_eq!(result.canonical[0].form_code, "L-1-A");
    assert_eq!(result.canonical[0].rows.len(), 3);

    let run_dir = &workspace.context.run_dir;
    assert!(run_dir.join("extracted/L-1-A-RA_1_1.json").is_file());
    assert!(run_dir.join("verified/L-1-A-RA_1_1.verified.json").is_file());
    assert!(run_dir.join("verified/L-1-A-RA_1_1.verification.json").is_file());
    assert!(!run_dir.join("extracted/L-99_2_2.json").exists());
}

#[tokio::test]
async fn templates_declared_under_the_full_label_are_found() {
    let workspace = workspace("Acme Life");
    let templates = workspace
        .context
        .templates_dir
        .clone()
        .expect("templates dir")
        .join("Acme Life Insurance Co");
    fs::remove_file(templates.join("L-1-A.json")).expect("remove");
    fs::write(
        templates.join("L-1-A-RA.json"),
        r#"{"Form No": "L-1-A-RA", "Title": "Revenue Account", "FlatHeaders": ["Particulars", "Schedule", "Current Year", "Previous Year"]}"#,
    )
    .expect("template");

    let result = process(&workspace.context, &artifacts()[..1]).await;

    assert_eq!(result.summary.counts.processed, 1);
    let done = &result.summary.artifacts[0];
    assert!(done.error.is_none());
    assert!(done.template_path.as_deref().is_some_and(|path| path.ends_with("L-1-A-RA.json")));
    assert_eq!(result.canonical[0].rows.len(), 3);
}

#[tokio::test]
async fn missing_company_fails_every_artifact() {
    let workspace = workspace("Zeta Assurance");
    let result = process(&workspace.context, &artifacts()).await;

    assert_eq!(result.summary.counts.failed, 4);
    assert!(result.canonical.is_empty());
    assert!(result.summary.artifacts.iter().all(|report| {
        report
            .error
            .as_ref()
            .is_some_and(|error| error.kind == "company_not_found")
    }));
}

#[tokio::test]
async fn cancellation_stops_before_the_next_artifact() {
    let workspace = workspace("Acme Life");
    workspace.context.cancel.cancel();

    let result = process(&workspace.context, &artifacts()).await;

    assert!(result.summary.cancelled);
    assert!(result.summary.artifacts.is_empty());
    assert_eq!(result.summary.counts.artifacts, 4);
    assert_eq!(result.summary.counts.processed, 0);
}

#[tokio::test]
async fn corrected_rows_reach_the_canonical_output() {
    let mut workspace = workspace("Acme Life");
    workspace.context.verify = VerifySettings {
        program: Some("sh".to_string()),
        args: vec![
            "-c".to_string(),
            r#"echo '{"metadata": {}, "data": [{"Particulars": "Premiums earned", "Current Year": "1,250"}]}' > {output}"#
                .to_string(),
        ],
        timeout: Some(Duration::from_secs(10)),
        ..VerifySettings::default()
    };

    let result = process(&workspace.context, &artifacts()[..1]).await;

    assert_eq!(result.summary.counts.corrected, 1);
    assert_eq!(result.summary.counts.fallback, 0);
    assert_eq!(result.summary.artifacts[0].extracted_rows, 3);
    assert_eq!(result.summary.artifacts[0].final_rows, 1);
    assert_eq!(result.canonical[0].rows[0]["Current Year"], "1,250");
}

#[tokio::test]
async fn run_outputs_are_written_to_the_run_directory() {
    let workspace = workspace("Acme Life");
    let result = process(&workspace.context, &artifacts()).await;

    write_run_outputs(&workspace.context, &result).expect("outputs");

    let summary: Value = serde_json::from_slice(
        &fs::read(workspace.context.summary_path()).expect("summary"),
    )
    .expect("summary json");
    assert_eq!(summary["run_id"], "run-test");
    assert_eq!(summary["method"], "index");
    assert_eq!(summary["counts"]["failed"], 3);
    assert_eq!(summary["artifacts"][0]["verification"], "SKIPPED");

    let canonical: Value = serde_json::from_slice(
        &fs::read(workspace.context.canonical_rows_path()).expect("canonical rows"),
    )
    .expect("canonical json");
    assert_eq!(canonical.as_array().map(Vec::len), Some(1));
    assert_eq!(canonical[0]["rows"][0]["Particulars"], "Premiums earned");
}
