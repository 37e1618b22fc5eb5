use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::util::read_json;

/// One form-code matcher. Capture group 1 must hold the code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeMatcherRule {
    pub name: String,
    pub pattern: String,
    #[serde(default)]
    pub priority: i32,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RuleFile {
    #[serde(default)]
    code_matchers: Vec<CodeMatcherRule>,
    #[serde(default)]
    abbreviations: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    header_vocabulary: Vec<String>,
}

/// Data-driven matching rules. Filer-specific quirks are added through a rules
/// file instead of code changes.
#[derive(Debug, Clone)]
pub struct RuleTable {
    pub code_matchers: Vec<CodeMatcherRule>,
    pub abbreviations: BTreeMap<String, Vec<String>>,
    pub header_vocabulary: BTreeSet<String>,
}

const BOUNDARY_START: &str = r"(?:^|[^A-Z0-9])";
const BOUNDARY_END: &str = r"(?:[^A-Z0-9]|$)";

impl Default for RuleTable {
    fn default() -> Self {
        let code_matchers = vec![
            CodeMatcherRule {
                name: "two_segments".to_string(),
                pattern: format!(
                    r"{BOUNDARY_START}(L-\d+[A-Z]?-(?:[A-Z]|\d+)-(?:[A-Z]|\d+)){BOUNDARY_END}"
                ),
                priority: 30,
            },
            CodeMatcherRule {
                name: "letter_suffix".to_string(),
                pattern: format!(r"{BOUNDARY_START}(L-\d+(?:[A-Z]|-[A-Z])){BOUNDARY_END}"),
                priority: 20,
            },
            CodeMatcherRule {
                name: "bare_numeric".to_string(),
                pattern: format!(r"{BOUNDARY_START}(L-\d+){BOUNDARY_END}"),
                priority: 10,
            },
        ];

        let abbreviations = [
            ("C", &["COMMISSION", "CLAIMS", "CAPITAL"][..]),
            ("P", &["PREMIUM", "POLICYHOLDERS"][..]),
            ("S", &["SHAREHOLDERS"][..]),
            ("RA", &["REVENUE"][..]),
            ("PL", &["PROFIT"][..]),
            ("BS", &["BALANCE"][..]),
            ("INV", &["INVESTMENT", "INVESTMENTS"][..]),
            ("EXP", &["EXPENSES"][..]),
        ]
        .into_iter()
        .map(|(abbr, expansions)| {
            (
                abbr.to_string(),
                expansions.iter().map(|value| value.to_string()).collect(),
            )
        })
        .collect();

        let header_vocabulary = [
            "particulars",
            "schedule",
            "sch",
            "ref",
            "form",
            "sr",
            "sl",
            "no",
            "current",
            "previous",
            "corresponding",
            "year",
            "years",
            "quarter",
            "period",
            "upto",
            "up",
            "to",
            "for",
            "the",
            "ended",
            "as",
            "at",
            "on",
            "of",
            "and",
            "amount",
            "rs",
            "lakhs",
            "lakh",
            "crore",
            "crores",
            "thousands",
            "in",
            "january",
            "february",
            "march",
            "april",
            "may",
            "june",
            "july",
            "august",
            "september",
            "october",
            "november",
            "december",
            "jan",
            "feb",
            "mar",
            "apr",
            "jun",
            "jul",
            "aug",
            "sep",
            "sept",
            "oct",
            "nov",
            "dec",
            "st",
            "nd",
            "rd",
            "th",
        ]
        .into_iter()
        .map(str::to_string)
        .collect();

        Self {
            code_matchers,
            abbreviations,
            header_vocabulary,
        }
    }
}

impl RuleTable {
    /// Built-in rules, extended by the optional rules file.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut table = Self::default();
        let Some(path) = path else {
            return Ok(table);
        };

        let file: RuleFile =
            read_json(path).with_context(|| format!("failed to load rules from {}", path.display()))?;

        info!(
            path = %path.display(),
            code_matchers = file.code_matchers.len(),
            abbreviations = file.abbreviations.len(),
            vocabulary = file.header_vocabulary.len(),
            "loaded rule table"
        );

        table.code_matchers.extend(file.code_matchers);
        for (abbr, expansions) in file.abbreviations {
            let entry = table
                .abbreviations
                .entry(abbr.trim().to_ascii_uppercase())
                .or_default();
            for expansion in expansions {
                let expansion = expansion.trim().to_ascii_uppercase();
                if !expansion.is_empty() && !entry.contains(&expansion) {
                    entry.push(expansion);
                }
            }
        }
        table.header_vocabulary.extend(
            file.header_vocabulary
                .into_iter()
                .map(|token| token.trim().to_ascii_lowercase())
                .filter(|token| !token.is_empty()),
        );

        Ok(table)
    }

    /// Matchers ordered by descending priority; equal priorities keep file order.
    pub fn ordered_code_matchers(&self) -> Vec<&CodeMatcherRule> {
        let mut matchers = self.code_matchers.iter().collect::<Vec<_>>();
        matchers.sort_by(|left, right| right.priority.cmp(&left.priority));
        matchers
    }

    pub fn expansions_for(&self, abbreviation: &str) -> &[String] {
        self.abbreviations
            .get(&abbreviation.to_ascii_uppercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rules_file_is_additive() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("rules.json");
        std::fs::write(
            &path,
            r#"{
              "code_matchers": [
                {"name": "acme_roman", "pattern": "(?:^|[^A-Z0-9])(L-\\d+-[IVX]+)(?:[^A-Z0-9]|$)", "priority": 40}
              ],
              "abbreviations": {"c": ["conveyance"]},
              "header_vocabulary": ["Segment"]
            }"#,
        )
        .expect("write rules");

        let table = RuleTable::load(Some(&path)).expect("load rules");
        assert_eq!(table.code_matchers.len(), 4);
        assert_eq!(table.ordered_code_matchers()[0].name, "acme_roman");
        assert_eq!(
            table.expansions_for("C"),
            &["COMMISSION", "CLAIMS", "CAPITAL", "CONVEYANCE"]
        );
        assert!(table.header_vocabulary.contains("segment"));
    }

    #[test]
    fn builtin_matchers_are_ordered_most_specific_first() {
        let table = RuleTable::default();
        let names = table
            .ordered_code_matchers()
            .iter()
            .map(|rule| rule.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["two_segments", "letter_suffix", "bare_numeric"]);
    }
}
