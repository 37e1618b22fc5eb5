mod metadata;
mod run;
mod table;
mod templates;

pub use run::run;
pub(crate) use run::{extract_artifact, file_name_of, resolve_artifact_code};
pub(crate) use templates::{TemplateRegistry, candidate_codes, list_companies, parse_template_file};
