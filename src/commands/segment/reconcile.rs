use tracing::warn;

use crate::model::{FormRange, PageSpan, RangeAdjustment};

#[derive(Debug, Clone, Default)]
pub(crate) struct Reconciled {
    pub(crate) ranges: Vec<FormRange>,
    pub(crate) adjustments: Vec<RangeAdjustment>,
}

/// Produces a page-disjoint list inside `[1, total_pages]`.
///
/// Ranges are taken in start-page order (ties keep input order, so the earlier
/// index entry wins a contested page). A range overlapping claimed pages is
/// shifted to the first free page or dropped when none remain before its end.
pub(crate) fn reconcile_ranges(ranges: Vec<FormRange>, total_pages: u32) -> Reconciled {
    let mut ordered = ranges;
    ordered.sort_by_key(|range| range.start_page);

    let mut claimed = vec![false; total_pages as usize + 1];
    let mut reconciled = Reconciled::default();

    for range in ordered {
        let is_claimed =
            |page: u32, claimed: &[bool]| claimed.get(page as usize).copied().unwrap_or(false);

        let mut start = range.start_page;
        let mut end = range.end_page;
        let mut reasons = Vec::<&str>::new();

        while start <= end && is_claimed(start, &claimed) {
            start += 1;
        }
        if start != range.start_page {
            reasons.push("shifted past claimed pages");
        }
        if start > end {
            record_drop(&mut reconciled, &range, "dropped: no free pages before end");
            continue;
        }

        let clipped_start = start.max(1);
        let clipped_end = end.min(total_pages);
        if clipped_start != start || clipped_end != end {
            reasons.push("clipped to document bounds");
        }
        start = clipped_start;
        end = clipped_end;

        if start > end {
            record_drop(&mut reconciled, &range, "dropped: outside document bounds");
            continue;
        }

        // clipping can expose claimed pages at either edge
        while start <= end && is_claimed(start, &claimed) {
            start += 1;
        }
        if let Some(first_claimed) = (start..=end).find(|page| is_claimed(*page, &claimed)) {
            end = first_claimed - 1;
            reasons.push("truncated before claimed page");
        }
        if start > end {
            record_drop(&mut reconciled, &range, "dropped: no free pages before end");
            continue;
        }

        for page in start..=end {
            claimed[page as usize] = true;
        }

        if !reasons.is_empty() {
            let adjustment = RangeAdjustment {
                form_label: range.form_label.clone(),
                from_start: range.start_page,
                from_end: range.end_page,
                to_start: Some(start),
                to_end: Some(end),
                reason: reasons.join("; "),
            };
            warn!(
                form = %adjustment.form_label,
                from = %format!("{}-{}", range.start_page, range.end_page),
                to = %format!("{start}-{end}"),
                reason = %adjustment.reason,
                "range adjusted"
            );
            reconciled.adjustments.push(adjustment);
        }

        reconciled
            .ranges
            .push(FormRange::new(range.form_label, start, end));
    }

    reconciled
}

fn record_drop(reconciled: &mut Reconciled, range: &FormRange, reason: &str) {
    warn!(
        form = %range.form_label,
        start = range.start_page,
        end = range.end_page,
        reason,
        "range dropped"
    );
    reconciled.adjustments.push(RangeAdjustment {
        form_label: range.form_label.clone(),
        from_start: range.start_page,
        from_end: range.end_page,
        to_start: None,
        to_end: None,
        reason: reason.to_string(),
    });
}

/// Maximal page spans of `[1, total_pages]` not covered by any range.
pub(crate) fn uncovered_spans(ranges: &[FormRange], total_pages: u32) -> Vec<PageSpan> {
    let mut covered = vec![false; total_pages as usize + 1];
    for range in ranges {
        for page in range.start_page.max(1)..=range.end_page.min(total_pages) {
            covered[page as usize] = true;
        }
    }

    let mut spans = Vec::new();
    let mut open: Option<u32> = None;
    for page in 1..=total_pages {
        match (covered[page as usize], open) {
            (false, None) => open = Some(page),
            (true, Some(start)) => {
                spans.push(PageSpan {
                    start,
                    end: page - 1,
                });
                open = None;
            }
            _ => {}
        }
    }
    if let Some(start) = open {
        spans.push(PageSpan {
            start,
            end: total_pages,
        });
    }

    spans
}
