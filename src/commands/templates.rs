use anyhow::{Result, bail};
use tracing::{info, warn};

use crate::cli::TemplatesArgs;
use crate::commands::extract::{TemplateRegistry, candidate_codes, list_companies};
use crate::form_code::{FormCodeResolver, registry_key};
use crate::rules::RuleTable;

pub fn run(args: TemplatesArgs) -> Result<()> {
    if !args.templates_dir.is_dir() {
        bail!("templates directory not found: {}", args.templates_dir.display());
    }

    let rules = RuleTable::load(args.rules.as_deref())?;
    let resolver = FormCodeResolver::new(&rules)?;

    let Some(company) = args.company.as_deref() else {
        let companies = list_companies(&args.templates_dir)?;
        for company in &companies {
            info!(company = %company, "template company");
        }
        info!(
            templates_dir = %args.templates_dir.display(),
            companies = companies.len(),
            "template companies listed"
        );
        return Ok(());
    };

    let registry = TemplateRegistry::load(&args.templates_dir, company, &resolver)?;

    let Some(code) = args.resolve.as_deref() else {
        for template in registry.templates.values() {
            info!(
                form_code = %template.form_code,
                title = %template.title.as_deref().unwrap_or_default(),
                headers = template.headers.len(),
                path = %template.file_path,
                "registered template"
            );
        }
        info!(
            company = %registry.company,
            directory = %registry.directory.display(),
            templates = registry.templates.len(),
            "template registry listed"
        );
        return Ok(());
    };

    let form_code = resolver
        .resolve_code(code)
        .unwrap_or_else(|| registry_key(code));
    for (position, candidate) in candidate_codes(&form_code, &rules).iter().enumerate() {
        info!(
            attempt = position + 1,
            candidate = %candidate,
            registered = registry.templates.contains_key(candidate),
            "template candidate"
        );
    }

    match registry.resolve(&form_code, &rules) {
        Ok(template) => {
            info!(
                input = %code,
                form_code = %form_code,
                matched = %template.form_code,
                path = %template.file_path,
                "template resolved"
            );
            Ok(())
        }
        Err(err) => {
            warn!(available = ?registry.codes(), "registered form codes");
            Err(err.into())
        }
    }
}
