use anyhow::{Context, Result};
use regex::Regex;
use tracing::debug;

use crate::rules::RuleTable;

/// Loose code-like token used when scanning page text (index lines, headings).
pub const CODE_LIKE_PATTERN: &str = r"(?i)\bL\s*[-–—]\s*\d+[A-Za-z]*(?:[-–—][A-Za-z0-9]+)*";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeMatch {
    pub code: String,
    pub matcher: String,
}

#[derive(Debug, Clone)]
pub struct CodeMiss {
    pub input: String,
    pub rejections: Vec<String>,
}

#[derive(Debug)]
struct CompiledMatcher {
    name: String,
    regex: Regex,
}

/// Ordered strategy chain from filename or label to canonical form code.
///
/// Matchers run from most to least specific, so `L-1-A-RA_1_5.pdf` resolves
/// to `L-1-A` before the bare `L-1` matcher gets a chance.
#[derive(Debug)]
pub struct FormCodeResolver {
    matchers: Vec<CompiledMatcher>,
    code_like: Regex,
    hyphen_spacing: Regex,
}

impl FormCodeResolver {
    pub fn new(rules: &RuleTable) -> Result<Self> {
        let mut matchers = Vec::with_capacity(rules.code_matchers.len());
        for rule in rules.ordered_code_matchers() {
            let regex = Regex::new(&rule.pattern)
                .with_context(|| format!("failed to compile code matcher '{}'", rule.name))?;
            if regex.captures_len() < 2 {
                anyhow::bail!("code matcher '{}' has no capture group", rule.name);
            }
            matchers.push(CompiledMatcher {
                name: rule.name.clone(),
                regex,
            });
        }

        Ok(Self {
            matchers,
            code_like: Regex::new(CODE_LIKE_PATTERN)
                .context("failed to compile code-like token regex")?,
            hyphen_spacing: Regex::new(r"\s*-\s*").context("failed to compile hyphen regex")?,
        })
    }

    pub fn resolve(&self, name: &str) -> Result<CodeMatch, CodeMiss> {
        let normalized = self.normalize(name);
        let mut rejections = Vec::new();

        for matcher in &self.matchers {
            match matcher
                .regex
                .captures(&normalized)
                .and_then(|captures| captures.get(1))
            {
                Some(found) => {
                    let code = found.as_str().trim_matches('-').to_string();
                    debug!(input = %name, code = %code, matcher = %matcher.name, "resolved form code");
                    return Ok(CodeMatch {
                        code,
                        matcher: matcher.name.clone(),
                    });
                }
                None => rejections.push(format!("{}: no match in '{}'", matcher.name, normalized)),
            }
        }

        Err(CodeMiss {
            input: name.to_string(),
            rejections,
        })
    }

    pub fn resolve_code(&self, name: &str) -> Option<String> {
        self.resolve(name).ok().map(|found| found.code)
    }

    /// Uppercase, unify dash variants and drop spacing around hyphens.
    pub fn normalize(&self, input: &str) -> String {
        let unified = unify_dashes(input).to_ascii_uppercase();
        self.hyphen_spacing.replace_all(&unified, "-").into_owned()
    }

    /// Code-like tokens in reading order, normalized.
    pub fn code_tokens(&self, text: &str) -> Vec<String> {
        self.code_like
            .find_iter(text)
            .map(|found| registry_key(found.as_str()))
            .collect()
    }

    pub fn first_code_token(&self, text: &str) -> Option<(usize, usize, String)> {
        self.code_like
            .find(text)
            .map(|found| (found.start(), found.end(), registry_key(found.as_str())))
    }

    pub fn contains_code_token(&self, text: &str) -> bool {
        self.code_like.is_match(text)
    }
}

pub fn unify_dashes(input: &str) -> String {
    input
        .chars()
        .map(|character| match character {
            '–' | '—' | '‐' | '‑' | '−' => '-',
            other => other,
        })
        .collect()
}

/// Key used for template registration and code comparison.
pub fn registry_key(code: &str) -> String {
    unify_dashes(code)
        .chars()
        .filter(|character| !character.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase()
        .trim_matches(|character: char| character == '-' || character == '.' || character == ':')
        .to_string()
}

/// True when two code spellings name the same form. A shorter code agrees with
/// a longer one only on a whole-segment prefix, so `L-1` never matches `L-10`.
pub fn codes_agree(left: &str, right: &str) -> bool {
    let left = comparison_key(left);
    let right = comparison_key(right);
    if left.is_empty() || right.is_empty() {
        return false;
    }
    left == right
        || left.starts_with(&format!("{right}-"))
        || right.starts_with(&format!("{left}-"))
}

/// Registry key with an attached letter suffix split off (`L-6A` -> `L-6-A`).
pub fn comparison_key(code: &str) -> String {
    let key = registry_key(code);
    let Some(rest) = key.strip_prefix("L-") else {
        return key;
    };

    let digits = rest
        .chars()
        .take_while(|character| character.is_ascii_digit())
        .count();
    let tail = &rest[digits..];
    let letters = tail
        .chars()
        .take_while(|character| character.is_ascii_alphabetic())
        .count();
    if digits == 0 || letters == 0 {
        return key;
    }

    format!("L-{}-{}", &rest[..digits], tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> FormCodeResolver {
        FormCodeResolver::new(&RuleTable::default()).expect("resolver")
    }

    #[test]
    fn specific_code_wins_over_bare_prefix() {
        let resolver = resolver();
        let found = resolver.resolve("L-1-A-RA_1_5.pdf").expect("code");
        assert_eq!(found.code, "L-1-A");
        assert_eq!(found.matcher, "letter_suffix");
    }

    #[test]
    fn resolves_each_code_shape() {
        let resolver = resolver();
        assert_eq!(resolver.resolve_code("L-6A_12_14.pdf").as_deref(), Some("L-6A"));
        assert_eq!(resolver.resolve_code("L-10_20_22.pdf").as_deref(), Some("L-10"));
        assert_eq!(resolver.resolve_code("l-14-a-1 report").as_deref(), Some("L-14-A-1"));
        assert_eq!(resolver.resolve_code("FORM L – 4 PREMIUM").as_deref(), Some("L-4"));
        assert_eq!(resolver.resolve_code("L-6-SHAREHOLDERS").as_deref(), Some("L-6"));
    }

    #[test]
    fn miss_keeps_every_rejection() {
        let resolver = resolver();
        let miss = resolver.resolve("annual_report.pdf").expect_err("no code");
        assert_eq!(miss.rejections.len(), 3);
        assert!(miss.rejections[0].starts_with("two_segments"));
    }

    #[test]
    fn resolution_is_deterministic() {
        let resolver = resolver();
        let first = resolver.resolve("L-2-A-PL_6_7.pdf").expect("code");
        for _ in 0..5 {
            assert_eq!(resolver.resolve("L-2-A-PL_6_7.pdf").expect("code"), first);
        }
    }

    #[test]
    fn codes_agree_rejects_numeric_prefix_collisions() {
        assert!(codes_agree("L-9", "l-9"));
        assert!(codes_agree("L-1-A-RA", "L-1-A-RA"));
        assert!(codes_agree("L-1", "L-1-A-RA"));
        assert!(codes_agree("L-6A", "L-6-A"));
        assert!(!codes_agree("L-9", "L-10"));
        assert!(!codes_agree("L-1", "L-10"));
        assert!(!codes_agree("L-1-A-RA", "L-1-A-BS"));
    }

    #[test]
    fn comparison_key_splits_attached_suffix() {
        assert_eq!(comparison_key("L-6A"), "L-6-A");
        assert_eq!(comparison_key("L-6A-S"), "L-6-A-S");
        assert_eq!(comparison_key("L-10"), "L-10");
    }

    #[test]
    fn code_tokens_are_normalized() {
        let resolver = resolver();
        assert_eq!(
            resolver.code_tokens("FORM L - 1-A-RA and l-2"),
            vec!["L-1-A-RA".to_string(), "L-2".to_string()]
        );
    }
}
