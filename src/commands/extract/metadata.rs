use std::collections::BTreeSet;

use anyhow::{Context, Result};
use regex::Regex;

use crate::form_code::FormCodeResolver;
use crate::util::normalize_whitespace;

const TITLE_SEARCH_LINES: usize = 8;

/// What a page says about itself rather than about the table: reporting
/// period, unit note, form title and `key: value` lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct PageMetadata {
    pub(crate) period: Option<String>,
    pub(crate) currency: Option<String>,
    pub(crate) title: Option<String>,
    /// Normalized metadata lines, keys and values; see [`fragment_key`].
    pub(crate) fragments: BTreeSet<String>,
}

impl PageMetadata {
    pub(crate) fn is_fragment(&self, text: &str) -> bool {
        let key = fragment_key(text);
        !key.is_empty() && self.fragments.contains(&key)
    }
}

#[derive(Debug)]
pub(crate) struct MetadataPatterns {
    periods: Vec<Regex>,
    currency: Regex,
    key_value: Regex,
    registration: Regex,
    page_marker: Regex,
}

impl MetadataPatterns {
    pub(crate) fn new() -> Result<Self> {
        let periods = [
            r"(?i)\b(?:for|as\s+at|as\s+on|up\s*to)\b[^\n]{0,80}?\b(?:ended|ending)\b[^\n]{0,40}?\b(?:19|20)\d{2}\b",
            r"(?i)\b(?:quarter|year|period|half[\s-]year)\s+end(?:ed|ing)\b[^\n]{0,40}?\b(?:19|20)\d{2}\b",
            r"(?i)\bas\s+(?:at|on)\b[^\n]{0,40}?\b(?:19|20)\d{2}\b",
        ]
        .into_iter()
        .map(|pattern| Regex::new(pattern).context("failed to compile period regex"))
        .collect::<Result<Vec<Regex>>>()?;

        Ok(Self {
            periods,
            currency: Regex::new(
                r"(?i)\(\s*((?:all\s+)?(?:amounts?|figures)?\s*(?:in\s+)?(?:rs\.?|₹|inr|rupees)[^()\n]{0,40}?)\s*\)",
            )
            .context("failed to compile currency regex")?,
            key_value: Regex::new(r"^([A-Za-z][A-Za-z0-9 .,&'/()\-]{1,60}?)\s*:\s*(\S.*)$")
                .context("failed to compile metadata key-value regex")?,
            registration: Regex::new(
                r"(?i)^((?:irdai?\s+)?registration\s+(?:no|number)\.?)\s*[:.\-]?\s*(\S.*)$",
            )
            .context("failed to compile registration regex")?,
            page_marker: Regex::new(r"(?i)^page\s+\d+(?:\s+of\s+\d+)?$")
                .context("failed to compile page marker regex")?,
        })
    }

    /// `cells` splits one line into layout cells; metadata lines often share a
    /// row with a second key such as the registration number.
    pub(crate) fn detect(
        &self,
        page_text: &str,
        cells: impl Fn(&str) -> Vec<String>,
        resolver: &FormCodeResolver,
    ) -> PageMetadata {
        let lines = page_text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<&str>>();
        let mut metadata = PageMetadata::default();

        for (position, line) in lines.iter().enumerate() {
            if metadata.title.is_none()
                && position < TITLE_SEARCH_LINES
                && resolver.contains_code_token(line)
            {
                let mut title = normalize_whitespace(line);
                metadata.fragments.insert(fragment_key(line));
                if letters_outside_code(line, resolver) < 3
                    && let Some(next) = lines.get(position + 1)
                {
                    metadata.fragments.insert(fragment_key(next));
                    title = format!("{title} {}", normalize_whitespace(next));
                }
                metadata.title = Some(title);
            }

            if metadata.period.is_none()
                && let Some(found) = self.periods.iter().find_map(|regex| regex.find(line))
            {
                metadata.period = Some(normalize_whitespace(found.as_str()));
                metadata.fragments.insert(fragment_key(line));
            }

            if let Some(captures) = self.currency.captures(line)
                && let Some(unit) = captures.get(1)
            {
                if metadata.currency.is_none() {
                    metadata.currency = Some(normalize_whitespace(unit.as_str()));
                }
                metadata.fragments.insert(fragment_key(line));
                metadata.fragments.insert(fragment_key(unit.as_str()));
            }

            if self.page_marker.is_match(line) {
                metadata.fragments.insert(fragment_key(line));
            }

            for cell in cells(line) {
                let captures = self
                    .registration
                    .captures(&cell)
                    .or_else(|| self.key_value.captures(&cell));
                if let Some(captures) = captures {
                    metadata.fragments.insert(fragment_key(&cell));
                    for group in [captures.get(1), captures.get(2)].into_iter().flatten() {
                        metadata.fragments.insert(fragment_key(group.as_str()));
                    }
                }
            }
        }

        metadata.fragments.remove("");
        metadata
    }
}

/// Lowercased, colon-free, whitespace-collapsed text with edge punctuation removed.
pub(crate) fn fragment_key(text: &str) -> String {
    let spaced = text.replace(':', " ").to_lowercase();
    normalize_whitespace(&spaced)
        .trim_matches(|character: char| {
            character.is_whitespace() || matches!(character, '.' | ',' | '-' | '(' | ')')
        })
        .to_string()
}

fn letters_outside_code(line: &str, resolver: &FormCodeResolver) -> usize {
    let Some((start, end, _)) = resolver.first_code_token(line) else {
        return line.chars().filter(|character| character.is_alphabetic()).count();
    };
    let outside = format!("{} {}", &line[..start], &line[end..]);
    outside
        .split_whitespace()
        .filter(|word| !word.eq_ignore_ascii_case("form"))
        .flat_map(str::chars)
        .filter(|character| character.is_alphabetic())
        .count()
}
