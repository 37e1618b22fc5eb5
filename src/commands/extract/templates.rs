use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::ArtifactError;
use crate::form_code::{FormCodeResolver, comparison_key, registry_key};
use crate::model::Template;
use crate::rules::RuleTable;

/// Both template shapes in circulation: the extraction output shape and the
/// plain `{form_code, headers}` shape.
#[derive(Debug, Deserialize)]
struct TemplateFile {
    #[serde(rename = "Form No", alias = "form_code", default)]
    form_code: Option<String>,
    #[serde(rename = "Title", alias = "title", default)]
    title: Option<String>,
    #[serde(rename = "FlatHeaders", alias = "headers", default)]
    headers: Vec<String>,
}

/// Company directories are looked up exactly, then by alphanumerics only, then
/// by prefix in either direction. The shortest matching prefix directory wins.
pub(crate) fn resolve_company_dir(
    templates_dir: &Path,
    company: &str,
) -> Result<(String, PathBuf), ArtifactError> {
    let companies = list_companies(templates_dir)?;

    let wanted = company.trim();
    let wanted_key = company_key(wanted);

    let exact = companies.iter().find(|name| name.as_str() == wanted);
    let normalized = || {
        companies
            .iter()
            .find(|name| !wanted_key.is_empty() && company_key(name) == wanted_key)
    };
    let prefixed = || {
        companies
            .iter()
            .filter(|name| {
                let key = company_key(name);
                !key.is_empty()
                    && !wanted_key.is_empty()
                    && (key.starts_with(&wanted_key) || wanted_key.starts_with(&key))
            })
            .min_by(|left, right| left.len().cmp(&right.len()).then(left.cmp(right)))
    };

    match exact.or_else(normalized).or_else(prefixed) {
        Some(name) => {
            debug!(company = %company, directory = %name, "resolved template company");
            Ok((name.clone(), templates_dir.join(name)))
        }
        None => Err(ArtifactError::CompanyNotFound {
            company: company.to_string(),
            available: companies,
        }),
    }
}

pub(crate) fn list_companies(templates_dir: &Path) -> anyhow::Result<Vec<String>> {
    let entries = fs::read_dir(templates_dir)
        .with_context(|| format!("failed to read {}", templates_dir.display()))?;

    let mut companies = Vec::new();
    for entry in entries {
        let entry = entry
            .with_context(|| format!("failed to read entry in {}", templates_dir.display()))?;
        let is_dir = entry
            .file_type()
            .with_context(|| format!("failed to inspect {}", entry.path().display()))?
            .is_dir();
        if is_dir && let Some(name) = entry.file_name().to_str() {
            companies.push(name.to_string());
        }
    }

    companies.sort();
    Ok(companies)
}

fn company_key(name: &str) -> String {
    name.chars()
        .filter(|character| character.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

#[derive(Debug, Clone)]
pub(crate) struct TemplateRegistry {
    pub(crate) company: String,
    pub(crate) directory: PathBuf,
    pub(crate) templates: BTreeMap<String, Template>,
    /// Resolver-derived code to registry key, for templates declared under a
    /// longer label (`L-1-A-RA` is reachable as `L-1-A`).
    pub(crate) aliases: BTreeMap<String, String>,
}

impl TemplateRegistry {
    /// Reads every `*.json` template in the company's directory. Files that do
    /// not parse or carry no headers are skipped with a warning.
    pub(crate) fn load(
        templates_dir: &Path,
        company: &str,
        resolver: &FormCodeResolver,
    ) -> Result<Self, ArtifactError> {
        let (company_dir_name, directory) = resolve_company_dir(templates_dir, company)?;

        let mut paths = Vec::new();
        let entries = fs::read_dir(&directory)
            .with_context(|| format!("failed to read {}", directory.display()))?;
        for entry in entries {
            let entry =
                entry.with_context(|| format!("failed to read entry in {}", directory.display()))?;
            let path = entry.path();
            let is_json = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("json"))
                .unwrap_or(false);
            if is_json && path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        let mut templates = BTreeMap::<String, Template>::new();
        for path in paths {
            let template = match parse_template_file(&path, &company_dir_name, resolver) {
                Ok(template) => template,
                Err(err) => {
                    warn!(path = %path.display(), error = %format!("{err:#}"), "skipping template");
                    continue;
                }
            };
            let key = registry_key(&template.form_code);
            if let Some(existing) = templates.get(&key) {
                warn!(
                    form_code = %key,
                    kept = %existing.file_path,
                    ignored = %template.file_path,
                    "duplicate template registration"
                );
                continue;
            }
            templates.insert(key, template);
        }

        let mut aliases = BTreeMap::<String, String>::new();
        for key in templates.keys() {
            let Some(derived) = resolver.resolve_code(key).map(|code| registry_key(&code)) else {
                continue;
            };
            if derived == *key || templates.contains_key(&derived) {
                continue;
            }
            match aliases.get(&derived) {
                Some(kept) => warn!(
                    form_code = %derived,
                    kept = %kept,
                    ignored = %key,
                    "ambiguous derived template code"
                ),
                None => {
                    aliases.insert(derived, key.clone());
                }
            }
        }

        info!(
            company = %company_dir_name,
            templates = templates.len(),
            aliases = aliases.len(),
            "loaded template registry"
        );

        Ok(Self {
            company: company_dir_name,
            directory,
            templates,
            aliases,
        })
    }

    pub(crate) fn codes(&self) -> Vec<String> {
        self.templates.keys().cloned().collect()
    }

    /// A template registered under the artifact's full label wins; otherwise
    /// the derived code goes through [`Self::resolve`].
    pub(crate) fn resolve_artifact(
        &self,
        form_label: &str,
        form_code: &str,
        rules: &RuleTable,
    ) -> Result<Template, ArtifactError> {
        if let Some(template) = self.templates.get(&registry_key(form_label)) {
            info!(
                form_label = %form_label,
                template = %template.file_path,
                "resolved template by label"
            );
            return Ok(template.clone());
        }
        self.resolve(form_code, rules)
    }

    pub(crate) fn resolve(&self, form_code: &str, rules: &RuleTable) -> Result<Template, ArtifactError> {
        let candidates = candidate_codes(form_code, rules);

        for (position, candidate) in candidates.iter().enumerate() {
            let found = self.templates.get(candidate).or_else(|| {
                self.aliases
                    .get(candidate)
                    .and_then(|key| self.templates.get(key))
            });
            if let Some(template) = found {
                info!(
                    form_code = %form_code,
                    matched = %candidate,
                    attempt = position + 1,
                    template = %template.file_path,
                    "resolved template"
                );
                return Ok(template.clone());
            }
        }

        warn!(
            company = %self.company,
            form_code = %form_code,
            tried = candidates.len(),
            "no template matched"
        );
        Err(ArtifactError::TemplateNotFound {
            company: self.company.clone(),
            form_code: form_code.to_string(),
            tried: candidates,
            available: self.codes(),
        })
    }
}

pub(crate) fn parse_template_file(
    path: &Path,
    company: &str,
    resolver: &FormCodeResolver,
) -> anyhow::Result<Template> {
    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let file: TemplateFile = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse template {}", path.display()))?;

    let headers = file
        .headers
        .into_iter()
        .map(|header| header.trim().to_string())
        .filter(|header| !header.is_empty())
        .collect::<Vec<String>>();
    if headers.is_empty() {
        bail!("template has no headers: {}", path.display());
    }

    let declared = file
        .form_code
        .map(|code| registry_key(&code))
        .filter(|code| !code.is_empty());
    let form_code = declared.or_else(|| {
        path.file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| resolver.resolve_code(name))
    });
    let Some(form_code) = form_code else {
        bail!("template has no form code: {}", path.display());
    };

    Ok(Template {
        company: company.to_string(),
        form_code,
        title: file.title.filter(|title| !title.trim().is_empty()),
        headers,
        file_path: path.display().to_string(),
    })
}

/// Lookup candidates from the full code down to `L-<n>`, with spelling
/// variants and abbreviation expansions at each level.
pub(crate) fn candidate_codes(form_code: &str, rules: &RuleTable) -> Vec<String> {
    let mut candidates = Vec::<String>::new();
    let mut push = |candidate: String| {
        if !candidate.is_empty() && !candidates.contains(&candidate) {
            candidates.push(candidate);
        }
    };

    let key = registry_key(form_code);
    push(key.clone());

    let expanded = comparison_key(&key);
    let segments = expanded.split('-').collect::<Vec<&str>>();
    if segments.first() != Some(&"L") || segments.len() < 2 {
        return candidates;
    }

    for level in (2..=segments.len()).rev() {
        let prefix = segments[..level].join("-");
        push(prefix.clone());
        push(attached_suffix_variant(&prefix));

        if level > 2 {
            let qualifier = segments[level - 1];
            let stem = segments[..level - 1].join("-");
            for expansion in rules.expansions_for(qualifier) {
                push(format!("{stem}-{expansion}"));
            }
        }
    }

    candidates
}

fn attached_suffix_variant(code: &str) -> String {
    let segments = code.split('-').collect::<Vec<&str>>();
    match segments.as_slice() {
        ["L", number, suffix, rest @ ..]
            if number.chars().all(|character| character.is_ascii_digit())
                && suffix.len() == 1
                && suffix.chars().all(|character| character.is_ascii_alphabetic()) =>
        {
            let mut attached = format!("L-{number}{suffix}");
            for segment in rest {
                attached.push('-');
                attached.push_str(segment);
            }
            attached
        }
        _ => code.to_string(),
    }
}
