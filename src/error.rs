use thiserror::Error;

use crate::model::ArtifactErrorReport;

/// Failures scoped to one split artifact. None of these abort a run.
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("no form code derivable from '{input}'")]
    CodeResolution {
        input: String,
        rejections: Vec<String>,
    },

    #[error("no template directory for company '{company}'")]
    CompanyNotFound {
        company: String,
        available: Vec<String>,
    },

    #[error("no template for {form_code} ({company}); tried {}", .tried.join(", "))]
    TemplateNotFound {
        company: String,
        form_code: String,
        tried: Vec<String>,
        available: Vec<String>,
    },

    #[error("no rows extracted from {filename}: {reason}")]
    Extraction { filename: String, reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ArtifactError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CodeResolution { .. } => "code_resolution",
            Self::CompanyNotFound { .. } => "company_not_found",
            Self::TemplateNotFound { .. } => "template_not_found",
            Self::Extraction { .. } => "extraction",
            Self::Other(_) => "internal",
        }
    }

    pub fn report(&self) -> ArtifactErrorReport {
        let available_codes = match self {
            Self::TemplateNotFound { available, .. } | Self::CompanyNotFound { available, .. } => {
                available.clone()
            }
            _ => Vec::new(),
        };

        ArtifactErrorReport {
            kind: self.kind().to_string(),
            message: format!("{:#}", self),
            available_codes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_not_found_report_carries_alternatives() {
        let error = ArtifactError::TemplateNotFound {
            company: "Acme Life".to_string(),
            form_code: "L-99".to_string(),
            tried: vec!["L-99".to_string()],
            available: vec!["L-1-A".to_string(), "L-2-A".to_string()],
        };

        let report = error.report();
        assert_eq!(report.kind, "template_not_found");
        assert_eq!(report.available_codes, vec!["L-1-A", "L-2-A"]);
        assert!(report.message.contains("tried L-99"));
    }
}
