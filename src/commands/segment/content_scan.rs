use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, info};

use crate::form_code::{CODE_LIKE_PATTERN, FormCodeResolver, comparison_key, registry_key};
use crate::model::FormRange;
use crate::pdf::DocumentText;

/// Finds the form heading in a page's leading lines.
#[derive(Debug)]
pub(crate) struct HeadingScanner {
    form_keyword: Regex,
    line_start_code: Regex,
}

impl HeadingScanner {
    pub(crate) fn new() -> Result<Self> {
        let code = CODE_LIKE_PATTERN.trim_start_matches("(?i)");
        Ok(Self {
            form_keyword: Regex::new(&format!(
                r"(?i)\bFORM\b\s*(?:NO\.?|NUMBER)?\s*[:\-–—]?\s*({code})"
            ))
            .context("failed to compile form keyword heading regex")?,
            line_start_code: Regex::new(&format!(r"(?i)^\s*({code})"))
                .context("failed to compile line-start heading regex")?,
        })
    }

    /// A `FORM L-..` line wins over a line that merely starts with a code.
    pub(crate) fn heading_code(&self, page_text: &str, heading_lines: usize) -> Option<String> {
        let leading = page_text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .take(heading_lines)
            .collect::<Vec<&str>>();

        let keyword_hit = leading.iter().find_map(|line| {
            self.form_keyword
                .captures(line)
                .and_then(|captures| captures.get(1))
        });
        let hit = keyword_hit.or_else(|| {
            leading.iter().find_map(|line| {
                self.line_start_code
                    .captures(line)
                    .and_then(|captures| captures.get(1))
            })
        });

        hit.map(|found| registry_key(found.as_str()))
    }
}

/// Fallback segmentation: every page from `first_page` on is assigned to the
/// most recent heading. Pages before the first heading stay uncovered.
pub(crate) fn scan_content(
    document: &DocumentText,
    first_page: u32,
    heading_lines: usize,
    scanner: &HeadingScanner,
    resolver: &FormCodeResolver,
) -> Vec<FormRange> {
    let mut ranges = Vec::<FormRange>::new();
    let mut open: Option<FormRange> = None;

    for page_number in first_page.max(1)..=document.total_pages {
        let Some(text) = document.page(page_number) else {
            continue;
        };

        let Some(label) = scanner.heading_code(text, heading_lines) else {
            if let Some(current) = open.as_mut() {
                current.end_page = page_number;
            }
            continue;
        };

        match open.as_mut() {
            Some(current) if comparison_key(&current.form_label) == comparison_key(&label) => {
                current.end_page = page_number;
            }
            _ => {
                if let Some(previous) = open.take() {
                    ranges.push(previous);
                }
                debug!(page = page_number, form = %label, code = ?resolver.resolve_code(&label), "heading found");
                open = Some(FormRange::new(label, page_number, page_number));
            }
        }
    }

    if let Some(mut last) = open.take() {
        last.end_page = document.total_pages;
        ranges.push(last);
    }

    info!(ranges = ranges.len(), first_page, "content scan complete");
    ranges
}
