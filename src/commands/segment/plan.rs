use anyhow::Result;
use tracing::{info, warn};

use super::content_scan::{HeadingScanner, scan_content};
use super::index_entries::IndexEntryParser;
use super::index_pages::detect_index_pages;
use super::index_validation::{entries_to_ranges, validate_index};
use super::reconcile::{reconcile_ranges, uncovered_spans};
use crate::context::SegmentSettings;
use crate::form_code::FormCodeResolver;
use crate::model::{
    FormRange, IndexEntry, PageSpan, RangeAdjustment, SegmentationMethod, ValidationSummary,
};
use crate::pdf::DocumentText;

#[derive(Debug, Clone)]
pub(crate) struct SegmentPlan {
    pub(crate) total_pages: u32,
    pub(crate) method: SegmentationMethod,
    pub(crate) index_pages: Vec<u32>,
    pub(crate) entries: Vec<IndexEntry>,
    pub(crate) validation: Option<ValidationSummary>,
    pub(crate) ranges: Vec<FormRange>,
    pub(crate) adjustments: Vec<RangeAdjustment>,
    pub(crate) uncovered: Vec<PageSpan>,
}

/// Chooses between the document's own index and a content scan, then
/// reconciles the chosen ranges.
pub(crate) struct Segmenter<'a> {
    settings: &'a SegmentSettings,
    resolver: &'a FormCodeResolver,
    entry_parser: IndexEntryParser,
    heading_scanner: HeadingScanner,
}

impl<'a> Segmenter<'a> {
    pub(crate) fn new(settings: &'a SegmentSettings, resolver: &'a FormCodeResolver) -> Result<Self> {
        Ok(Self {
            settings,
            resolver,
            entry_parser: IndexEntryParser::new()?,
            heading_scanner: HeadingScanner::new()?,
        })
    }

    pub(crate) fn plan(&self, document: &DocumentText) -> SegmentPlan {
        let total_pages = document.total_pages;
        let index_pages = detect_index_pages(document, self.settings, self.resolver);

        if index_pages.is_empty() {
            info!("no index page detected; scanning content");
            let ranges = self.scan(document, 1);
            return self.finish(document, SegmentationMethod::ContentScan, index_pages, Vec::new(), None, ranges);
        }

        let index_text = index_pages
            .iter()
            .filter_map(|page| document.page(*page))
            .collect::<Vec<&str>>()
            .join("\n");
        let entries = self
            .entry_parser
            .parse(&index_text, total_pages, self.resolver);
        let headless = entries
            .iter()
            .filter(|entry| entry.start_page.is_none())
            .count();
        info!(
            index_pages = ?index_pages,
            entries = entries.len(),
            headless,
            "parsed index entries"
        );

        let validation = validate_index(&entries, document, self.settings, self.resolver);
        let scan_from = index_pages.iter().max().copied().unwrap_or(0) + 1;

        if validation.accepted {
            let ranges = entries_to_ranges(&entries, self.settings.page_offset);
            self.finish(
                document,
                SegmentationMethod::Index,
                index_pages,
                entries,
                Some(validation),
                ranges,
            )
        } else {
            warn!(
                trust_ratio = validation.trust_ratio,
                checked = validation.checked,
                "index not trusted; falling back to content scan"
            );
            let ranges = self.scan(document, scan_from);
            self.finish(
                document,
                SegmentationMethod::ContentScan,
                index_pages,
                entries,
                Some(validation),
                ranges,
            )
        }
    }

    fn scan(&self, document: &DocumentText, first_page: u32) -> Vec<FormRange> {
        scan_content(
            document,
            first_page,
            self.settings.heading_lines,
            &self.heading_scanner,
            self.resolver,
        )
    }

    fn finish(
        &self,
        document: &DocumentText,
        method: SegmentationMethod,
        index_pages: Vec<u32>,
        entries: Vec<IndexEntry>,
        validation: Option<ValidationSummary>,
        ranges: Vec<FormRange>,
    ) -> SegmentPlan {
        let total_pages = document.total_pages;
        let reconciled = reconcile_ranges(ranges, total_pages);
        let uncovered = uncovered_spans(&reconciled.ranges, total_pages);

        info!(
            method = method.as_str(),
            ranges = reconciled.ranges.len(),
            adjustments = reconciled.adjustments.len(),
            uncovered_spans = uncovered.len(),
            "segmentation planned"
        );

        SegmentPlan {
            total_pages,
            method,
            index_pages,
            entries,
            validation,
            ranges: reconciled.ranges,
            adjustments: reconciled.adjustments,
            uncovered,
        }
    }
}
