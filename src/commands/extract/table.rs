use std::collections::BTreeSet;

use anyhow::{Context, Result};
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use super::metadata::{MetadataPatterns, PageMetadata};
use crate::form_code::FormCodeResolver;
use crate::model::Row;
use crate::pdf::DocumentText;

/// Blank character columns needed between two layout columns.
const MIN_GUTTER: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TableStrategy {
    ColumnLayout,
    CellScan,
}

impl TableStrategy {
    fn as_str(self) -> &'static str {
        match self {
            Self::ColumnLayout => "column_layout",
            Self::CellScan => "cell_scan",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct TableOutput {
    pub(crate) rows: Vec<Row>,
    pub(crate) pages_used: Vec<u32>,
    pub(crate) period: Option<String>,
    pub(crate) currency: Option<String>,
    pub(crate) title: Option<String>,
}

/// Maps layout text onto a template's header list, page by page.
#[derive(Debug)]
pub(crate) struct TableExtractor<'a> {
    headers: &'a [String],
    vocabulary: BTreeSet<String>,
    metadata: MetadataPatterns,
    cell_split: Regex,
    multi_value: Regex,
    column_marker: Regex,
    numeric: Regex,
}

impl<'a> TableExtractor<'a> {
    pub(crate) fn new(headers: &'a [String], vocabulary: &BTreeSet<String>) -> Result<Self> {
        let mut vocabulary = vocabulary.clone();
        for header in headers {
            vocabulary.extend(word_tokens(header));
        }

        Ok(Self {
            headers,
            vocabulary,
            metadata: MetadataPatterns::new()?,
            cell_split: Regex::new(r"\t+|\s{2,}").context("failed to compile table cell regex")?,
            multi_value: Regex::new(r"\s*\n\s*|\s{2,}")
                .context("failed to compile multi-value cell regex")?,
            column_marker: Regex::new(r"(?i)^\(\s*(?:\d{1,2}|[a-z]|[ivx]+)\s*\)$")
                .context("failed to compile column marker regex")?,
            numeric: Regex::new(r"^\(?-?[₹$]?\s*\d[\d,]*(?:\.\d+)?\)?%?$|^[-–—]+$")
                .context("failed to compile numeric cell regex")?,
        })
    }

    pub(crate) fn extract(&self, document: &DocumentText, resolver: &FormCodeResolver) -> TableOutput {
        let mut output = TableOutput::default();

        for (index, page_text) in document.pages.iter().enumerate() {
            let page_number = index as u32 + 1;
            let metadata = self
                .metadata
                .detect(page_text, |line| self.split_cells(line), resolver);

            let (strategy, raw_rows) = self.page_table(page_text, &metadata);
            let rows = raw_rows
                .into_iter()
                .filter(|cells| !self.is_header_like(cells) && !is_metadata_row(cells, &metadata))
                .map(|cells| self.map_to_headers(cells))
                .collect::<Vec<Row>>();

            debug!(
                page = page_number,
                strategy = strategy.as_str(),
                rows = rows.len(),
                "extracted page rows"
            );

            if output.period.is_none() {
                output.period = metadata.period.clone();
            }
            if output.currency.is_none() {
                output.currency = metadata.currency.clone();
            }
            if output.title.is_none() {
                output.title = metadata.title.clone();
            }
            if !rows.is_empty() {
                output.pages_used.push(page_number);
                output.rows.extend(rows);
            }
        }

        output
    }

    pub(crate) fn page_table(
        &self,
        page_text: &str,
        metadata: &PageMetadata,
    ) -> (TableStrategy, Vec<Vec<String>>) {
        let lines = page_text.lines().collect::<Vec<&str>>();
        match self.column_layout_rows(&lines, metadata) {
            Some(rows) => (TableStrategy::ColumnLayout, rows),
            None => (TableStrategy::CellScan, self.cell_scan_rows(&lines)),
        }
    }

        // Boundaries come from lines with a numeric cell after the label.
    fn column_layout_rows(&self, lines: &[&str], metadata: &PageMetadata) -> Option<Vec<Vec<String>>> {
        let split = lines
            .iter()
            .map(|line| self.split_cells(line))
            .collect::<Vec<Vec<String>>>();

        let data_lines = split
            .iter()
            .enumerate()
            .filter(|(_, cells)| {
                cells.len() >= 2
                    && cells[1..].iter().any(|cell| self.numeric.is_match(cell))
                    && !cells.iter().all(|cell| self.column_marker.is_match(cell))
                    && !is_metadata_row(cells, metadata)
            })
            .map(|(index, _)| index)
            .collect::<Vec<usize>>();
        if data_lines.len() < 2 {
            return None;
        }

        let starts = column_starts(data_lines.iter().map(|index| lines[*index]));
        if starts.len() < 2 {
            return None;
        }

        let first = data_lines[0];
        let last = data_lines[data_lines.len() - 1];
        let rows = (first..=last)
            .filter_map(|index| {
                if data_lines.binary_search(&index).is_ok() {
                    Some(slice_columns(lines[index], &starts))
                } else if split[index].is_empty() {
                    None
                } else {
                    Some(split[index].clone())
                }
            })
            .collect();

        Some(rows)
    }

    fn cell_scan_rows(&self, lines: &[&str]) -> Vec<Vec<String>> {
        lines
            .iter()
            .map(|line| self.split_cells(line))
            .filter(|cells| !cells.is_empty())
            .collect()
    }

    pub(crate) fn split_cells(&self, line: &str) -> Vec<String> {
        let mut cells = self
            .cell_split
            .split(line)
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .map(ToOwned::to_owned)
            .collect::<Vec<String>>();

        if cells.len() <= 1 && line.contains('|') {
            cells = line
                .split('|')
                .map(str::trim)
                .filter(|segment| !segment.is_empty())
                .map(ToOwned::to_owned)
                .collect();
        }

        cells
    }

    /// A row is header-like when it has no content, consists of column-number
    /// markers only, or most of its non-empty cells are header vocabulary.
    pub(crate) fn is_header_like(&self, cells: &[String]) -> bool {
        let non_empty = cells
            .iter()
            .map(|cell| cell.trim())
            .filter(|cell| !cell.is_empty())
            .collect::<Vec<&str>>();
        if non_empty.is_empty() {
            return true;
        }
        if non_empty.iter().all(|cell| self.column_marker.is_match(cell)) {
            return true;
        }

        let vocabulary_cells = non_empty
            .iter()
            .filter(|cell| self.is_vocabulary_cell(cell))
            .count();
        vocabulary_cells * 2 > non_empty.len()
    }

    fn is_vocabulary_cell(&self, cell: &str) -> bool {
        let tokens = word_tokens(cell);
        !tokens.is_empty() && tokens.iter().all(|token| self.vocabulary.contains(token))
    }

    /// Positional mapping with multi-value cells split left to right while
    /// slots remain, and surplus leading cells folded into the first column.
    pub(crate) fn map_to_headers(&self, cells: Vec<String>) -> Row {
        let capacity = self.headers.len();
        let mut cells = cells;

        while cells.len() > capacity && cells.last().is_some_and(|cell| cell.is_empty()) {
            cells.pop();
        }
        if cells.len() < capacity {
            cells = self.split_multi_value(cells, capacity);
        }
        if cells.len() > capacity && capacity > 0 {
            let surplus = cells.len() - capacity;
            let label = cells[..=surplus]
                .iter()
                .map(|cell| cell.trim())
                .filter(|cell| !cell.is_empty())
                .collect::<Vec<&str>>()
                .join(" ");
            let mut folded = vec![label];
            folded.extend(cells.drain(surplus + 1..));
            cells = folded;
        }

        self.headers
            .iter()
            .enumerate()
            .map(|(index, header)| {
                let value = cells.get(index).map(|cell| cell.trim()).unwrap_or_default();
                (header.clone(), Value::String(value.to_string()))
            })
            .collect()
    }

    fn split_multi_value(&self, cells: Vec<String>, capacity: usize) -> Vec<String> {
        let total = cells.len();
        let mut redistributed = Vec::with_capacity(capacity);

        for (index, cell) in cells.into_iter().enumerate() {
            let remaining = total - index - 1;
            let parts = self
                .multi_value
                .split(cell.trim())
                .filter(|part| !part.is_empty())
                .map(ToOwned::to_owned)
                .collect::<Vec<String>>();

            if parts.len() > 1 && redistributed.len() + parts.len() + remaining <= capacity {
                redistributed.extend(parts);
            } else {
                redistributed.push(cell);
            }
        }

        redistributed
    }
}

pub(crate) fn is_metadata_row(cells: &[String], metadata: &PageMetadata) -> bool {
    let Some(first) = cells.iter().find(|cell| !cell.trim().is_empty()) else {
        return false;
    };
    metadata.is_fragment(first) || metadata.is_fragment(&cells.join(" "))
}

/// Start columns of a fixed-width layout: every non-blank character column
/// preceded by at least [`MIN_GUTTER`] columns blank on every line.
pub(crate) fn column_starts<'l>(lines: impl Iterator<Item = &'l str>) -> Vec<usize> {
    let rows = lines
        .map(|line| line.chars().collect::<Vec<char>>())
        .collect::<Vec<Vec<char>>>();
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);

    let mut starts = Vec::new();
    let mut gap = MIN_GUTTER;
    for column in 0..width {
        let blank = rows.iter().all(|row| {
            row.get(column)
                .map(|character| character.is_whitespace())
                .unwrap_or(true)
        });
        if blank {
            gap += 1;
            continue;
        }
        if gap >= MIN_GUTTER {
            starts.push(column);
        }
        gap = 0;
    }

    starts
}

pub(crate) fn slice_columns(line: &str, starts: &[usize]) -> Vec<String> {
    let characters = line.chars().collect::<Vec<char>>();
    (0..starts.len())
        .map(|position| {
            let from = if position == 0 { 0 } else { starts[position] };
            let to = starts
                .get(position + 1)
                .copied()
                .unwrap_or(characters.len())
                .min(characters.len());
            if from >= to {
                return String::new();
            }
            characters[from..to]
                .iter()
                .collect::<String>()
                .trim()
                .to_string()
        })
        .collect()
}

// `31st` -> `st`
fn word_tokens(text: &str) -> Vec<String> {
    text.split(|character: char| !character.is_alphanumeric())
        .map(|token| token.trim_start_matches(|character: char| character.is_ascii_digit()))
        .filter(|token| token.chars().any(char::is_alphabetic))
        .map(str::to_lowercase)
        .collect()
}
