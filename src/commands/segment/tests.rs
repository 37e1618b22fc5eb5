use std::fs;
use std::path::Path;

use super::content_scan::{HeadingScanner, scan_content};
use super::index_entries::IndexEntryParser;
use super::index_pages::detect_index_pages;
use super::index_validation::{entries_to_ranges, page_has_heading, validate_index};
use super::plan::Segmenter;
use super::reconcile::{reconcile_ranges, uncovered_spans};
use super::splitting::{build_manifest, plan_artifacts, remove_stale_splits};
use crate::context::SegmentSettings;
use crate::form_code::FormCodeResolver;
use crate::model::{FormRange, IndexEntry, PageSpan, SegmentationMethod, SplitFileEntry};
use crate::pdf::DocumentText;
use crate::rules::RuleTable;

fn resolver() -> FormCodeResolver {
    FormCodeResolver::new(&RuleTable::default()).expect("resolver")
}

fn document(pages: &[&str]) -> DocumentText {
    DocumentText::from_pages(pages.iter().map(|page| page.to_string()).collect())
}

fn entry(serial: &str, label: &str, start: Option<u32>, end: Option<u32>) -> IndexEntry {
    IndexEntry {
        serial: serial.to_string(),
        form_label: label.to_string(),
        description: String::new(),
        start_page: start,
        end_page: end,
        page_strategy: None,
        page_diagnostics: Vec::new(),
    }
}

/// Settings for the small synthetic filings used here: a two-line index is
/// dense enough and two checked entries are enough evidence.
fn small_filing_settings() -> SegmentSettings {
    SegmentSettings {
        index_density_threshold: 1,
        min_checked_entries: 2,
        ..SegmentSettings::default()
    }
}

fn round_trip_document() -> DocumentText {
    document(&[
        "CONTENTS\n1 L-1 Revenue .... 3-4\n2 L-2 Profit .... 5\n",
        "Report of the board of directors\n",
        "FORM L-1 REVENUE ACCOUNT\nPremiums earned   100   90\n",
        "Benefits paid   40   35\n",
        "FORM L-2 PROFIT AND LOSS ACCOUNT\nInvestment income   12   11\n",
        "Notes to accounts\n",
        "Notes to accounts continued\n",
        "Auditor's report\n",
        "Management report\n",
        "Glossary\n",
    ])
}

#[test]
fn entry_parser_tries_each_page_strategy_in_order() {
    let parser = IndexEntryParser::new().expect("parser");
    let text = "\
1  L-1-A-RA  Revenue Account ........ 3-4
2  L-2-A-PL  Profit and Loss (5)
3  L-3-A-BS  7  Balance Sheet
4  L-4  Premium Schedule 9
5  L-5  Commission Schedule
";
    let entries = parser.parse(text, 20, &resolver());
    assert_eq!(entries.len(), 5);

    assert_eq!(entries[0].form_label, "L-1-A-RA");
    assert_eq!(entries[0].description, "Revenue Account");
    assert_eq!((entries[0].start_page, entries[0].end_page), (Some(3), Some(4)));
    assert_eq!(entries[0].page_strategy.as_deref(), Some("leader"));

    assert_eq!(entries[1].start_page, Some(5));
    assert_eq!(entries[1].description, "Profit and Loss");
    assert_eq!(entries[1].page_strategy.as_deref(), Some("parenthesized"));

    assert_eq!(entries[2].start_page, Some(7));
    assert_eq!(entries[2].description, "Balance Sheet");
    assert_eq!(entries[2].page_strategy.as_deref(), Some("after_label"));

    assert_eq!(entries[3].start_page, Some(9));
    assert_eq!(entries[3].description, "Premium Schedule");
    assert_eq!(entries[3].page_strategy.as_deref(), Some("trailing"));

    assert_eq!(entries[4].start_page, None);
    assert_eq!(entries[4].page_diagnostics.len(), 4);
}

#[test]
fn implausible_page_numbers_leave_entry_headless() {
    let parser = IndexEntryParser::new().expect("parser");
    let entries = parser.parse("6 L-6 Operating Expenses ..... 45\n", 20, &resolver());

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].start_page, None);
    assert!(
        entries[0]
            .page_diagnostics
            .iter()
            .any(|reason| reason == "leader: page 45 outside 1..=20")
    );
}

#[test]
fn continuation_line_completes_headless_entry() {
    let parser = IndexEntryParser::new().expect("parser");
    let text = "\
1 L-7 Benefits paid to
  policyholders (net) ..... 11
2 L-8 Reinsurance 12
";
    let entries = parser.parse(text, 20, &resolver());

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].description, "Benefits paid to policyholders (net)");
    assert_eq!(entries[0].start_page, Some(11));
    assert_eq!(entries[1].form_label, "L-8");
    assert_eq!(entries[1].start_page, Some(12));
}

#[test]
fn index_pages_need_density_above_threshold_within_scan_window() {
    let listing = |count: u32| {
        (1..=count)
            .map(|number| format!("{number} L-{number} Schedule .... {}", number + 4))
            .collect::<Vec<String>>()
            .join("\n")
    };
    let dense = listing(12);
    let doc = document(&[&dense, "FORM L-1 REVENUE ACCOUNT\n", "text\n", &dense]);

    let pages = detect_index_pages(&doc, &SegmentSettings::default(), &resolver());
    assert_eq!(pages, vec![1]);

    let sparse = listing(10);
    let doc = document(&[&sparse, "FORM L-1 REVENUE ACCOUNT\n"]);
    assert!(detect_index_pages(&doc, &SegmentSettings::default(), &resolver()).is_empty());
}

#[test]
fn validator_requires_both_ratio_and_checked_count() {
    let doc = round_trip_document();
    let entries = vec![
        entry("1", "L-1", Some(3), Some(4)),
        entry("2", "L-2", Some(5), None),
    ];

    let strict = validate_index(&entries, &doc, &SegmentSettings::default(), &resolver());
    assert_eq!(strict.checked, 2);
    assert_eq!(strict.validated, 2);
    assert!((strict.trust_ratio - 1.0).abs() < f64::EPSILON);
    assert!(!strict.accepted);

    let relaxed = validate_index(&entries, &doc, &small_filing_settings(), &resolver());
    assert!(relaxed.accepted);
}

#[test]
fn validator_checks_neighbouring_pages() {
    let doc = round_trip_document();
    let entries = vec![
        entry("1", "L-1", Some(4), None),
        entry("2", "L-2", Some(6), None),
        entry("3", "L-3", Some(8), None),
    ];

    let summary = validate_index(&entries, &doc, &SegmentSettings::default(), &resolver());
    assert_eq!(summary.checks[0].matched_page, Some(3));
    assert_eq!(summary.checks[1].matched_page, Some(5));
    assert_eq!(summary.checks[2].matched_page, None);
    assert_eq!(summary.validated, 2);
    assert!(summary.accepted);
}

#[test]
fn heading_check_rejects_numeric_prefix_collisions() {
    let resolver = resolver();
    assert!(page_has_heading("FORM L-10 RESERVES\n", "L-10", 6, &resolver));
    assert!(!page_has_heading("FORM L-10 RESERVES\n", "L-1", 6, &resolver));
    assert!(!page_has_heading("FORM L-10 RESERVES\n", "L-9", 6, &resolver));
}

#[test]
fn open_ended_entries_run_to_next_start() {
    let entries = vec![
        entry("1", "L-1", Some(3), None),
        entry("2", "L-2", None, None),
        entry("3", "L-3", Some(6), Some(7)),
        entry("4", "L-4", Some(9), None),
    ];

    let ranges = entries_to_ranges(&entries, 0);
    assert_eq!(
        ranges,
        vec![
            FormRange::new("L-1", 3, 5),
            FormRange::new("L-3", 6, 7),
            FormRange::new("L-4", 9, 9),
        ]
    );

    let shifted = entries_to_ranges(&entries, 2);
    assert_eq!(shifted[0], FormRange::new("L-1", 5, 7));
}

#[test]
fn round_trip_segments_index_ranges_and_reports_uncovered_pages() {
    let doc = round_trip_document();
    let settings = small_filing_settings();
    let resolver = resolver();

    let plan = Segmenter::new(&settings, &resolver)
        .expect("segmenter")
        .plan(&doc);

    assert_eq!(plan.method, SegmentationMethod::Index);
    assert_eq!(plan.index_pages, vec![1]);
    assert_eq!(
        plan.ranges,
        vec![FormRange::new("L-1", 3, 4), FormRange::new("L-2", 5, 5)]
    );
    assert_eq!(
        plan.uncovered,
        vec![PageSpan { start: 1, end: 2 }, PageSpan { start: 6, end: 10 }]
    );

    let artifacts = plan_artifacts(&plan.ranges, Path::new("/runs/splits"), &resolver);
    assert_eq!(artifacts[0].filename, "L-1_3_4.pdf");
    assert_eq!(artifacts[0].form_code.as_deref(), Some("L-1"));
    assert_eq!(artifacts[1].filename, "L-2_5_5.pdf");
    assert_eq!(artifacts[1].path, "/runs/splits/L-2_5_5.pdf");
}

#[test]
fn sparse_index_under_default_thresholds_uses_content_scan() {
    let doc = round_trip_document();
    let settings = SegmentSettings::default();
    let resolver = resolver();

    let plan = Segmenter::new(&settings, &resolver)
        .expect("segmenter")
        .plan(&doc);

    assert_eq!(plan.method, SegmentationMethod::ContentScan);
    assert!(plan.index_pages.is_empty());
    assert!(plan.validation.is_none());
    assert_eq!(
        plan.ranges,
        vec![FormRange::new("L-1", 3, 4), FormRange::new("L-2", 5, 10)]
    );
    assert_eq!(plan.uncovered, vec![PageSpan { start: 1, end: 2 }]);
}

#[test]
fn mismatched_heading_drives_fallback_to_content_scan() {
    let doc = document(&[
        "INDEX\n1 L-8 Benefits .... 5\n2 L-9 Claims .... 7\n3 L-10 Reserves .... 10\n",
        "Directors report\n",
        "Directors report continued\n",
        "Auditor's report\n",
        "FORM L-8 BENEFITS PAID\n",
        "Benefits continued\n",
        "FORM L-10 RESERVES\n",
        "Reserves continued\n",
        "Reserves continued\n",
        "FORM L-12 INVESTMENTS\n",
        "Investments continued\n",
        "Investments continued\n",
    ]);
    let settings = SegmentSettings {
        index_density_threshold: 2,
        ..SegmentSettings::default()
    };
    let resolver = resolver();

    let plan = Segmenter::new(&settings, &resolver)
        .expect("segmenter")
        .plan(&doc);

    let validation = plan.validation.as_ref().expect("validation ran");
    assert_eq!(validation.checked, 3);
    assert_eq!(validation.validated, 1);
    assert!(!validation.accepted);

    let l9 = validation
        .checks
        .iter()
        .find(|check| check.form_label == "L-9")
        .expect("L-9 checked");
    assert_eq!(l9.claimed_page, 7);
    assert!(!l9.validated);

    assert_eq!(plan.method, SegmentationMethod::ContentScan);
    assert_eq!(
        plan.ranges,
        vec![
            FormRange::new("L-8", 5, 6),
            FormRange::new("L-10", 7, 9),
            FormRange::new("L-12", 10, 12),
        ]
    );
    assert_eq!(plan.uncovered, vec![PageSpan { start: 1, end: 4 }]);
}

#[test]
fn content_scan_merges_spelling_variants_and_prefers_form_keyword() {
    let scanner = HeadingScanner::new().expect("scanner");
    assert_eq!(
        scanner.heading_code("L-99 footer ref\nFORM L-3 PREMIUM\n", 6).as_deref(),
        Some("L-3")
    );

    let doc = document(&[
        "FORM L-6A SHAREHOLDERS\n",
        "FORM L-6-A continued\n",
        "figures only\n",
        "L-7 Operating expenses\n",
    ]);
    let ranges = scan_content(&doc, 1, 6, &scanner, &resolver());
    assert_eq!(
        ranges,
        vec![FormRange::new("L-6A", 1, 3), FormRange::new("L-7", 4, 4)]
    );
}

#[test]
fn contested_start_page_goes_to_earlier_range() {
    let reconciled = reconcile_ranges(
        vec![FormRange::new("A", 12, 13), FormRange::new("B", 12, 14)],
        20,
    );
    assert_eq!(
        reconciled.ranges,
        vec![FormRange::new("A", 12, 13), FormRange::new("B", 14, 14)]
    );
    assert_eq!(reconciled.adjustments.len(), 1);
    assert_eq!(reconciled.adjustments[0].form_label, "B");
    assert_eq!(reconciled.adjustments[0].to_start, Some(14));

    let dropped = reconcile_ranges(
        vec![FormRange::new("A", 12, 13), FormRange::new("C", 12, 12)],
        20,
    );
    assert_eq!(dropped.ranges, vec![FormRange::new("A", 12, 13)]);
    assert_eq!(dropped.adjustments[0].form_label, "C");
    assert_eq!(dropped.adjustments[0].to_start, None);
}

#[test]
fn reconciler_clips_to_document_bounds() {
    let reconciled = reconcile_ranges(
        vec![
            FormRange::new("A", 0, 2),
            FormRange::new("B", 8, 15),
            FormRange::new("C", 11, 12),
        ],
        10,
    );
    assert_eq!(
        reconciled.ranges,
        vec![FormRange::new("A", 1, 2), FormRange::new("B", 8, 10)]
    );
    assert_eq!(reconciled.adjustments.len(), 3);
}

#[test]
fn reconciled_ranges_are_disjoint_and_in_bounds() {
    let mut state = 0x2545_f491_u64;
    let mut next = move |bound: u64| {
        state = state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        (state >> 33) % bound
    };

    for _ in 0..200 {
        let total_pages = 1 + next(40) as u32;
        let count = next(12) as usize;
        let ranges = (0..count)
            .map(|position| {
                let start = next(45) as u32;
                let end = (start + next(10) as u32).saturating_sub(2);
                FormRange::new(format!("R{position}"), start, end)
            })
            .collect::<Vec<FormRange>>();

        let reconciled = reconcile_ranges(ranges, total_pages);
        let mut seen = vec![false; total_pages as usize + 1];
        for range in &reconciled.ranges {
            assert!(range.start_page >= 1);
            assert!(range.start_page <= range.end_page);
            assert!(range.end_page <= total_pages);
            for page in range.start_page..=range.end_page {
                assert!(!seen[page as usize], "page {page} assigned twice");
                seen[page as usize] = true;
            }
        }

        let uncovered = uncovered_spans(&reconciled.ranges, total_pages)
            .iter()
            .map(|span| span.end - span.start + 1)
            .sum::<u32>();
        let covered = reconciled
            .ranges
            .iter()
            .map(FormRange::page_count)
            .sum::<u32>();
        assert_eq!(covered + uncovered, total_pages);
    }
}

#[test]
fn artifact_names_are_deduplicated_and_coded_most_specific_first() {
    let ranges = vec![
        FormRange::new("L-1-A-RA", 1, 5),
        FormRange::new("L-2/A", 6, 7),
        FormRange::new("L-2 A", 6, 7),
    ];
    let artifacts = plan_artifacts(&ranges, Path::new("splits"), &resolver());

    assert_eq!(artifacts[0].filename, "L-1-A-RA_1_5.pdf");
    assert_eq!(artifacts[0].form_code.as_deref(), Some("L-1-A"));
    assert_eq!(artifacts[1].filename, "L-2_A_6_7.pdf");
    assert_eq!(artifacts[2].filename, "L-2_A_6_7_2.pdf");
}

#[test]
fn manifest_records_plan_and_stale_splits_are_removed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let splits_dir = dir.path().join("splits");
    fs::create_dir_all(&splits_dir).expect("splits dir");

    let doc = round_trip_document();
    let settings = small_filing_settings();
    let resolver = resolver();
    let plan = Segmenter::new(&settings, &resolver)
        .expect("segmenter")
        .plan(&doc);
    let artifacts = plan_artifacts(&plan.ranges, &splits_dir, &resolver);

    let manifest = build_manifest(
        "Acme Life",
        Path::new("/filings/acme_q3.pdf"),
        "abc123".to_string(),
        &splits_dir,
        &plan,
        &artifacts,
    );
    assert_eq!(manifest.original_filename, "acme_q3.pdf");
    assert_eq!(manifest.total_splits, 2);
    assert_eq!(manifest.split_files[1].form_name, "L-2");
    assert_eq!(manifest.uncovered.len(), 2);

    let json = serde_json::to_value(&manifest).expect("json");
    assert_eq!(json["method"], "index");
    assert_eq!(json["split_files"][0]["filename"], "L-1_3_4.pdf");

    let mut previous = manifest.clone();
    previous.split_files.push(SplitFileEntry {
        filename: "L-9_6_8.pdf".to_string(),
        form_name: "L-9".to_string(),
        form_code: Some("L-9".to_string()),
        start_page: 6,
        end_page: 8,
    });
    for name in ["L-1_3_4.pdf", "L-9_6_8.pdf"] {
        fs::write(splits_dir.join(name), b"%PDF").expect("write split");
    }

    let removed = remove_stale_splits(&previous, &splits_dir, &artifacts).expect("cleanup");
    assert_eq!(removed, 1);
    assert!(splits_dir.join("L-1_3_4.pdf").exists());
    assert!(!splits_dir.join("L-9_6_8.pdf").exists());
}
