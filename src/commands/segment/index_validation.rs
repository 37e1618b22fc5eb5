use tracing::{debug, info};

use crate::context::SegmentSettings;
use crate::form_code::{FormCodeResolver, codes_agree};
use crate::model::{EntryCheck, FormRange, IndexEntry, ValidationSummary};
use crate::pdf::DocumentText;

/// Samples page-bearing entries and checks each claimed start page (then its
/// neighbours) for the entry's heading. The index is trusted only when the
/// ratio clears the threshold and enough entries were checked.
pub(crate) fn validate_index(
    entries: &[IndexEntry],
    document: &DocumentText,
    settings: &SegmentSettings,
    resolver: &FormCodeResolver,
) -> ValidationSummary {
    let page_bearing = entries
        .iter()
        .filter(|entry| entry.start_page.is_some())
        .collect::<Vec<&IndexEntry>>();
    let sampled = sample_evenly(&page_bearing, settings.validation_sample);

    let mut checks = Vec::with_capacity(sampled.len());
    for entry in sampled {
        let Some(printed) = entry.start_page else {
            continue;
        };
        let claimed = offset_page(printed, settings.page_offset);
        let matched_page = [Some(claimed), claimed.checked_sub(1), claimed.checked_add(1)]
            .into_iter()
            .flatten()
            .filter(|page| *page >= 1 && *page <= document.total_pages)
            .find(|page| {
                document.page(*page).is_some_and(|text| {
                    page_has_heading(text, &entry.form_label, settings.heading_lines, resolver)
                })
            });

        debug!(
            form = %entry.form_label,
            claimed,
            matched = ?matched_page,
            "index entry check"
        );
        checks.push(EntryCheck {
            form_label: entry.form_label.clone(),
            claimed_page: claimed,
            matched_page,
            validated: matched_page.is_some(),
        });
    }

    let checked = checks.len();
    let validated = checks.iter().filter(|check| check.validated).count();
    let trust_ratio = if checked == 0 {
        0.0
    } else {
        validated as f64 / checked as f64
    };
    let accepted = trust_ratio >= settings.trust_threshold && checked >= settings.min_checked_entries;

    info!(checked, validated, trust_ratio, accepted, "index validation");

    ValidationSummary {
        checked,
        validated,
        trust_ratio,
        accepted,
        checks,
    }
}

/// True when one of the page's leading non-empty lines carries `form_label`.
pub(crate) fn page_has_heading(
    page_text: &str,
    form_label: &str,
    heading_lines: usize,
    resolver: &FormCodeResolver,
) -> bool {
    page_text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .take(heading_lines)
        .flat_map(|line| resolver.code_tokens(line))
        .any(|token| codes_agree(form_label, &token))
}

/// Page ranges implied by page-bearing entries, in index order. A missing end
/// runs up to the next entry's start; the last open entry covers its start page.
pub(crate) fn entries_to_ranges(entries: &[IndexEntry], page_offset: i32) -> Vec<FormRange> {
    let page_bearing = entries
        .iter()
        .filter_map(|entry| entry.start_page.map(|start| (entry, start)))
        .collect::<Vec<_>>();

    page_bearing
        .iter()
        .enumerate()
        .map(|(position, (entry, printed_start))| {
            let start = offset_page(*printed_start, page_offset);
            let end = match entry.end_page {
                Some(printed_end) => offset_page(printed_end, page_offset),
                None => page_bearing
                    .get(position + 1)
                    .map(|(_, next)| offset_page(*next, page_offset))
                    .filter(|next| *next > start)
                    .map(|next| next - 1)
                    .unwrap_or(start),
            };
            FormRange::new(entry.form_label.clone(), start, end)
        })
        .collect()
}

pub(crate) fn offset_page(page: u32, offset: i32) -> u32 {
    let shifted = i64::from(page) + i64::from(offset);
    shifted.clamp(0, i64::from(u32::MAX)) as u32
}

fn sample_evenly<'a>(items: &[&'a IndexEntry], limit: usize) -> Vec<&'a IndexEntry> {
    if items.len() <= limit {
        return items.to_vec();
    }
    (0..limit)
        .map(|slot| items[slot * items.len() / limit])
        .collect()
}
