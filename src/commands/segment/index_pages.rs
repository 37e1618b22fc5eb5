use tracing::debug;

use crate::context::SegmentSettings;
use crate::form_code::FormCodeResolver;
use crate::pdf::DocumentText;

/// Leading pages dense enough in form codes to be a table of contents.
pub(crate) fn detect_index_pages(
    document: &DocumentText,
    settings: &SegmentSettings,
    resolver: &FormCodeResolver,
) -> Vec<u32> {
    document
        .pages
        .iter()
        .take(settings.index_scan_pages)
        .enumerate()
        .filter_map(|(index, page)| {
            let page_number = index as u32 + 1;
            let code_lines = code_line_count(page, resolver);
            debug!(page = page_number, code_lines, "index density");
            (code_lines > settings.index_density_threshold).then_some(page_number)
        })
        .collect()
}

pub(crate) fn code_line_count(page: &str, resolver: &FormCodeResolver) -> usize {
    page.lines()
        .filter(|line| resolver.contains_code_token(line))
        .count()
}
