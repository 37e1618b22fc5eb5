use serde_json::{Map, Value};
use tracing::warn;

use crate::model::{CanonicalForm, ExtractionResult, Row, VerificationOutcome};

/// Result of reading a correction or extraction document.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum NormalizedRows {
    Rows(Vec<Row>),
    /// Unrecognized shape, handed back untouched.
    Passthrough(Value),
}

/// Accepts the extraction shape (`{"Rows": [...]}`) and the legacy
/// `{"metadata": {...}, "data": [...]}` shape. Every row must be an object.
pub(crate) fn normalize_rows(value: Value) -> NormalizedRows {
    let Value::Object(object) = value else {
        return NormalizedRows::Passthrough(value);
    };

    let rows = match (object.get("Rows"), object.get("data")) {
        (Some(Value::Array(rows)), _) => rows_of(rows),
        (None, Some(Value::Array(rows))) => rows_of(rows),
        _ => None,
    };

    match rows {
        Some(rows) => NormalizedRows::Rows(rows),
        None => NormalizedRows::Passthrough(Value::Object(object)),
    }
}

fn rows_of(values: &[Value]) -> Option<Vec<Row>> {
    values
        .iter()
        .map(|value| match value {
            Value::Object(row) => Some(row.clone()),
            _ => None,
        })
        .collect()
}

/// Reads an extraction document in either shape. Legacy documents carry their
/// descriptive fields under `metadata`.
pub(crate) fn extraction_from_value(value: Value) -> anyhow::Result<ExtractionResult> {
    if let Ok(extraction) = serde_json::from_value::<ExtractionResult>(value.clone())
        && value.get("Rows").is_some()
    {
        return Ok(extraction);
    }

    let metadata = value
        .get("metadata")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    match normalize_rows(value) {
        NormalizedRows::Rows(rows) => Ok(ExtractionResult {
            form_code: text_field(&metadata, &["Form No", "form_code"]),
            title: text_field(&metadata, &["Title", "title"]),
            period: text_field(&metadata, &["Period", "period"]),
            pages_used: metadata
                .get("PagesUsed")
                .and_then(|pages| serde_json::from_value(pages.clone()).ok())
                .unwrap_or_default(),
            currency: text_field(&metadata, &["Currency", "currency"]),
            headers: rows
                .first()
                .map(|row| row.keys().cloned().collect())
                .unwrap_or_default(),
            rows,
        }),
        NormalizedRows::Passthrough(_) => {
            anyhow::bail!("extraction document has neither Rows nor data")
        }
    }
}

fn text_field(object: &Map<String, Value>, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|key| object.get(*key).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string()
}

/// Storage shape of one artifact's final rows.
pub(crate) fn canonical_form(
    filename: &str,
    extraction: &ExtractionResult,
    outcome: &VerificationOutcome,
) -> CanonicalForm {
    if outcome.rows.is_empty() && !extraction.rows.is_empty() {
        warn!(filename = %filename, "verification returned no rows; keeping extraction rows");
    }
    let rows = if outcome.rows.is_empty() {
        extraction.rows.clone()
    } else {
        outcome.rows.clone()
    };

    CanonicalForm {
        filename: filename.to_string(),
        form_code: extraction.form_code.clone(),
        period: extraction.period.clone(),
        rows,
    }
}
