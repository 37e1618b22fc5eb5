use anyhow::{Context, Result};
use regex::{Captures, Regex};

use crate::form_code::FormCodeResolver;
use crate::model::IndexEntry;

const PAGE_SPAN: &str = r"(\d{1,4})(?:\s*(?:[-–—]|to)\s*(\d{1,4}))?";
const MAX_CONTINUATION_LINES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageStrategy {
    Leader,
    Parenthesized,
    AfterLabel,
    Trailing,
}

impl PageStrategy {
    const ORDER: [PageStrategy; 4] = [
        PageStrategy::Leader,
        PageStrategy::Parenthesized,
        PageStrategy::AfterLabel,
        PageStrategy::Trailing,
    ];

    fn as_str(self) -> &'static str {
        match self {
            Self::Leader => "leader",
            Self::Parenthesized => "parenthesized",
            Self::AfterLabel => "after_label",
            Self::Trailing => "trailing",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PageHit {
    start: u32,
    end: Option<u32>,
    /// Byte offset where the page information begins in the searched text.
    offset: usize,
    strategy: PageStrategy,
}

/// Line-oriented table-of-contents parser.
#[derive(Debug)]
pub(crate) struct IndexEntryParser {
    serial_line: Regex,
    leader: Regex,
    parenthesized: Regex,
    after_label: Regex,
    trailing: Regex,
}

impl IndexEntryParser {
    pub(crate) fn new() -> Result<Self> {
        Ok(Self {
            serial_line: Regex::new(r"^\s*(\d{1,3})[.)]?\s+(.*\S)\s*$")
                .context("failed to compile index serial regex")?,
            leader: Regex::new(&format!(r"[.\-–—_…·]{{3,}}\s*{PAGE_SPAN}"))
                .context("failed to compile index leader regex")?,
            parenthesized: Regex::new(&format!(r"\(\s*{PAGE_SPAN}\s*\)"))
                .context("failed to compile index parenthesized page regex")?,
            after_label: Regex::new(&format!(r"^\s+{PAGE_SPAN}(?:\s|$)"))
                .context("failed to compile index after-label page regex")?,
            trailing: Regex::new(&format!(r"(?:^|\s){PAGE_SPAN}\s*$"))
                .context("failed to compile index trailing page regex")?,
        })
    }

    /// Parses index-page text into ordered entries. `total_pages` bounds the
    /// plausible page numbers; entries without a plausible number stay headless.
    pub(crate) fn parse(
        &self,
        text: &str,
        total_pages: u32,
        resolver: &FormCodeResolver,
    ) -> Vec<IndexEntry> {
        let mut entries = Vec::<IndexEntry>::new();
        let mut continuation_budget = 0usize;

        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }

            if let Some(entry) = self.parse_entry_line(line, total_pages, resolver) {
                continuation_budget = MAX_CONTINUATION_LINES;
                entries.push(entry);
                continue;
            }

            // continuation of a multi-line entry that still lacks its page
            if continuation_budget > 0
                && looks_like_continuation(line)
                && !resolver.contains_code_token(line)
                && let Some(previous) = entries.last_mut()
                && previous.start_page.is_none()
            {
                continuation_budget -= 1;
                self.absorb_continuation(previous, line, total_pages);
            } else {
                continuation_budget = 0;
            }
        }

        entries
    }

    fn parse_entry_line(
        &self,
        line: &str,
        total_pages: u32,
        resolver: &FormCodeResolver,
    ) -> Option<IndexEntry> {
        let captures = self.serial_line.captures(line)?;
        let serial = captures.get(1)?.as_str().to_string();
        let body = captures.get(2)?.as_str();

        let (label_start, label_end, form_label) = resolver.first_code_token(body)?;
        let prefix = clean_description(&body[..label_start]);
        let rest = &body[label_end..];

        let mut diagnostics = Vec::new();
        let hit = self.find_pages(rest, total_pages, &mut diagnostics);

        let trailing_description = match hit {
            Some(hit) if hit.strategy == PageStrategy::AfterLabel => {
                let skipped = self
                    .after_label
                    .find(rest)
                    .map(|found| found.end())
                    .unwrap_or(rest.len());
                clean_description(&rest[skipped..])
            }
            Some(hit) => clean_description(&rest[..hit.offset]),
            None => clean_description(rest),
        };

        Some(IndexEntry {
            serial,
            form_label,
            description: join_description(&prefix, &trailing_description),
            start_page: hit.map(|hit| hit.start),
            end_page: hit.and_then(|hit| hit.end),
            page_strategy: hit.map(|hit| hit.strategy.as_str().to_string()),
            page_diagnostics: diagnostics,
        })
    }

    fn absorb_continuation(&self, entry: &mut IndexEntry, line: &str, total_pages: u32) {
        let mut diagnostics = Vec::new();
        let hit = self.find_pages(line, total_pages, &mut diagnostics);
        let text = match hit {
            Some(hit) if hit.strategy != PageStrategy::AfterLabel => {
                clean_description(&line[..hit.offset])
            }
            _ => clean_description(line),
        };

        entry.description = join_description(&entry.description, &text);
        if let Some(hit) = hit {
            entry.start_page = Some(hit.start);
            entry.end_page = hit.end;
            entry.page_strategy = Some(hit.strategy.as_str().to_string());
        }
        entry.page_diagnostics.extend(diagnostics);
    }

    /// First strategy producing a plausible page number wins; every rejection
    /// is appended to `diagnostics`.
    fn find_pages(
        &self,
        text: &str,
        total_pages: u32,
        diagnostics: &mut Vec<String>,
    ) -> Option<PageHit> {
        for strategy in PageStrategy::ORDER {
            let regex = match strategy {
                PageStrategy::Leader => &self.leader,
                PageStrategy::Parenthesized => &self.parenthesized,
                PageStrategy::AfterLabel => &self.after_label,
                PageStrategy::Trailing => &self.trailing,
            };

            let Some(captures) = regex.captures(text) else {
                diagnostics.push(format!("{}: no match", strategy.as_str()));
                continue;
            };

            match plausible_span(&captures, total_pages) {
                Ok((start, end)) => {
                    let offset = captures.get(0).map(|found| found.start()).unwrap_or(0);
                    return Some(PageHit {
                        start,
                        end,
                        offset,
                        strategy,
                    });
                }
                Err(reason) => diagnostics.push(format!("{}: {}", strategy.as_str(), reason)),
            }
        }

        None
    }
}

fn plausible_span(captures: &Captures<'_>, total_pages: u32) -> Result<(u32, Option<u32>), String> {
    let start = captures
        .get(1)
        .and_then(|value| value.as_str().parse::<u32>().ok())
        .ok_or_else(|| "unparseable page number".to_string())?;
    if start == 0 || start > total_pages {
        return Err(format!("page {start} outside 1..={total_pages}"));
    }

    let end = match captures.get(2) {
        Some(value) => {
            let end = value
                .as_str()
                .parse::<u32>()
                .map_err(|_| "unparseable end page".to_string())?;
            if end < start || end > total_pages {
                return Err(format!("span {start}-{end} outside {start}..={total_pages}"));
            }
            Some(end)
        }
        None => None,
    };

    Ok((start, end))
}

fn looks_like_continuation(line: &str) -> bool {
    let trimmed = line.trim_start();
    let starts_with_text = trimmed
        .chars()
        .next()
        .map(|character| !character.is_ascii_digit())
        .unwrap_or(false);
    starts_with_text
        && trimmed.chars().any(|character| character.is_alphabetic())
        && !trimmed.to_ascii_lowercase().starts_with("page ")
}

fn clean_description(text: &str) -> String {
    let trimmed = text.trim_matches(|character: char| {
        character.is_whitespace() || matches!(character, '.' | '-' | '–' | '—' | '_' | '…' | '·' | ':')
    });
    trimmed.split_whitespace().collect::<Vec<&str>>().join(" ")
}

fn join_description(left: &str, right: &str) -> String {
    match (left.is_empty(), right.is_empty()) {
        (true, _) => right.to_string(),
        (_, true) => left.to_string(),
        _ => format!("{left} {right}"),
    }
}
