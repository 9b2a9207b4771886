//! Report rendering tests
//!
//! Property-based tests for the CSV contract the report engine guarantees:
//! RFC-4180 output with every field quoted, embedded quotes doubled, nulls
//! as empty strings, and a lossless round-trip for ASCII text.

use proptest::prelude::*;

fn ascii_cell_strategy() -> impl Strategy<Value = String> {
    // Printable ASCII incl. the characters CSV must escape, plus newlines
    proptest::collection::vec(
        prop_oneof![
            proptest::char::range(' ', '~'),
            Just('\n'),
            Just('"'),
            Just(','),
        ],
        0..24,
    )
    .prop_map(|chars| chars.into_iter().collect())
}

fn row_strategy() -> impl Strategy<Value = Vec<String>> {
    proptest::collection::vec(ascii_cell_strategy(), 1..6)
}

fn render(rows: &[Vec<String>]) -> String {
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .from_writer(vec![]);
    for row in rows {
        writer.write_record(row).unwrap();
    }
    String::from_utf8(writer.into_inner().unwrap()).unwrap()
}

proptest! {
    /// Parsing the rendered CSV reproduces every cell byte-for-byte
    #[test]
    fn test_roundtrip_lossless(rows in proptest::collection::vec(row_strategy(), 1..8)) {
        // Ragged rows are not part of the contract
        let width = rows[0].len();
        let rows: Vec<Vec<String>> = rows
            .into_iter()
            .map(|mut r| {
                r.resize(width, String::new());
                r
            })
            .collect();

        let rendered = render(&rows);

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(rendered.as_bytes());
        let parsed: Vec<Vec<String>> = reader
            .records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect();

        prop_assert_eq!(parsed, rows);
    }

    /// Every rendered field is quoted
    #[test]
    fn test_all_fields_quoted(row in row_strategy()) {
        let rendered = render(std::slice::from_ref(&row));
        prop_assert!(rendered.starts_with('"'));
        // Unquoted commas would change the parsed width
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(rendered.as_bytes());
        let record = reader.records().next().unwrap().unwrap();
        prop_assert_eq!(record.len(), row.len());
    }

    /// Embedded quotes survive as doubled quotes in the raw output
    #[test]
    fn test_quotes_doubled(text in "[a-z]{1,8}") {
        let cell = format!("x\"{}\"y", text);
        let rendered = render(&[vec![cell]]);
        let doubled = format!("\"\"{}\"\"", text);
        prop_assert!(rendered.contains(&doubled));
    }
}

mod filename_tests {
    /// Mirror of the engine's filename sanitiser
    fn filename(suffix: &str, iso: &str) -> String {
        format!(
            "attendance-{}-report-{}.csv",
            suffix,
            iso.replace([':', '.'], "-")
        )
    }

    #[test]
    fn test_no_reserved_chars_in_timestamp() {
        let name = filename("ward", "2023-06-14T09:15:02.123Z");
        let stamp = name.strip_prefix("attendance-ward-report-").unwrap();
        assert!(!stamp.contains(':'));
        assert_eq!(stamp.matches('.').count(), 1); // only the .csv extension
    }

    #[test]
    fn test_suffix_embedded() {
        for suffix in [
            "detail",
            "zone",
            "ward",
            "city",
            "supervisor",
            "location",
            "ward_summary",
            "supervisor_summary",
        ] {
            let name = filename(suffix, "2023-06-14T09:15:02Z");
            assert!(name.starts_with(&format!("attendance-{}-report-", suffix)));
            assert!(name.ends_with(".csv"));
        }
    }
}

mod null_rendering_tests {
    use super::render;

    #[test]
    fn test_null_renders_as_empty_quoted_field() {
        // The engine maps SQL NULLs to empty strings before rendering
        let rendered = render(&[vec!["Pune".to_string(), String::new()]]);
        assert_eq!(rendered.trim_end(), "\"Pune\",\"\"");
    }
}
