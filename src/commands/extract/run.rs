use std::path::Path;

use anyhow::{Result, bail};
use tracing::{debug, info};

use super::table::TableExtractor;
use super::templates::TemplateRegistry;
use crate::cli::ExtractArgs;
use crate::error::ArtifactError;
use crate::form_code::{FormCodeResolver, registry_key};
use crate::model::{ExtractionResult, Template};
use crate::pdf::{DocumentText, TextMode, ensure_tools, load_document};
use crate::rules::RuleTable;
use crate::util::write_json_pretty;

pub fn run(args: ExtractArgs) -> Result<()> {
    if !args.pdf.is_file() {
        bail!("artifact not found: {}", args.pdf.display());
    }

    let rules = RuleTable::load(args.rules.as_deref())?;
    let resolver = FormCodeResolver::new(&rules)?;
    ensure_tools(&["pdftotext", "pdfinfo"])?;

    let filename = file_name_of(&args.pdf);
    let form_code = match args.form_code.as_deref() {
        Some(code) => registry_key(code),
        None => resolve_artifact_code(&resolver, &filename)?,
    };

    let registry = TemplateRegistry::load(&args.templates_dir, &args.company, &resolver)?;
    let label = resolver
        .first_code_token(&filename)
        .map(|(_, _, token)| token)
        .unwrap_or_else(|| form_code.clone());
    let template = registry.resolve_artifact(&label, &form_code, &rules)?;
    let document = load_document(&args.pdf, TextMode::Layout)?;
    let result = extract_artifact(&template, &form_code, &document, &rules, &resolver, &filename)?;

    let output = args
        .output
        .unwrap_or_else(|| args.pdf.with_extension("json"));
    write_json_pretty(&output, &result)?;
    info!(
        path = %output.display(),
        form_code = %result.form_code,
        rows = result.rows.len(),
        pages = ?result.pages_used,
        "extraction completed"
    );

    Ok(())
}

pub(crate) fn resolve_artifact_code(
    resolver: &FormCodeResolver,
    filename: &str,
) -> Result<String, ArtifactError> {
    match resolver.resolve(filename) {
        Ok(found) => Ok(found.code),
        Err(miss) => {
            for rejection in &miss.rejections {
                debug!(input = %miss.input, rejection = %rejection, "code matcher rejected");
            }
            Err(ArtifactError::CodeResolution {
                input: miss.input,
                rejections: miss.rejections,
            })
        }
    }
}

/// Rows of one artifact under `template`. An artifact without a single data
/// row is an extraction failure.
pub(crate) fn extract_artifact(
    template: &Template,
    form_code: &str,
    document: &DocumentText,
    rules: &RuleTable,
    resolver: &FormCodeResolver,
    filename: &str,
) -> Result<ExtractionResult, ArtifactError> {
    let extractor = TableExtractor::new(&template.headers, &rules.header_vocabulary)?;
    let output = extractor.extract(document, resolver);

    if output.rows.is_empty() {
        return Err(ArtifactError::Extraction {
            filename: filename.to_string(),
            reason: format!(
                "no data rows matched {} headers across {} page(s)",
                template.headers.len(),
                document.total_pages
            ),
        });
    }

    Ok(ExtractionResult {
        form_code: form_code.to_string(),
        title: output
            .title
            .or_else(|| template.title.clone())
            .unwrap_or_default(),
        period: output.period.unwrap_or_default(),
        pages_used: output.pages_used,
        currency: output.currency.unwrap_or_default(),
        headers: template.headers.clone(),
        rows: output.rows,
    })
}

pub(crate) fn file_name_of(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default()
        .to_string()
}
