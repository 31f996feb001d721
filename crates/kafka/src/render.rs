//! Text rendering of consumed records.

/// Header values longer than this are cut unless full headers are requested.
pub const HEADER_VALUE_LIMIT: usize = 64;

/// Which parts of a record to print, and how.
#[derive(Debug, Clone)]
pub struct ConsumerProperties {
    pub print_key: bool,
    pub full_header: bool,
    pub timestamp: bool,
    /// Between key and value
    pub delimiter: String,
}

impl Default for ConsumerProperties {
    fn default() -> Self {
        Self {
            print_key: false,
            full_header: false,
            timestamp: false,
            delimiter: "\t".to_string(),
        }
    }
}

/// The decoded parts of one record.
#[derive(Debug, Clone, Copy)]
pub struct RecordView<'a> {
    pub key: Option<&'a str>,
    /// `None` for tombstones
    pub value: Option<&'a str>,
    pub timestamp: Option<i64>,
    pub headers: &'a [(String, Option<Vec<u8>>)],
}

/// Render one record, without a trailing newline.
///
/// ```text
/// % Headers: [trace="abc", source="cli"]
/// Timestamp: 1700000000000\tkey\tvalue
/// ```
pub fn render_record(properties: &ConsumerProperties, record: &RecordView<'_>) -> String {
    let mut out = String::new();

    if !record.headers.is_empty() {
        out.push_str("% Headers: [");
        for (i, (name, value)) in record.headers.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            out.push_str(name);
            out.push('=');
            match value {
                Some(bytes) => {
                    let text = String::from_utf8_lossy(bytes);
                    out.push('"');
                    out.push_str(&header_value(&text, properties.full_header));
                    out.push('"');
                }
                None => out.push_str("null"),
            }
        }
        out.push_str("]\n");
    }

    if properties.timestamp {
        match record.timestamp {
            Some(ms) => out.push_str(&format!("Timestamp: {ms}\t")),
            None => out.push_str("Timestamp: none\t"),
        }
    }

    if properties.print_key {
        out.push_str(record.key.unwrap_or("null"));
        out.push_str(&properties.delimiter);
    }

    out.push_str(record.value.unwrap_or("null"));
    out
}

fn header_value(text: &str, full: bool) -> String {
    if full || text.chars().count() <= HEADER_VALUE_LIMIT {
        return text.to_string();
    }
    let cut: String = text.chars().take(HEADER_VALUE_LIMIT).collect();
    format!("{cut}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view<'a>(headers: &'a [(String, Option<Vec<u8>>)]) -> RecordView<'a> {
        RecordView {
            key: Some("k1"),
            value: Some("{\"a\":1}"),
            timestamp: Some(1_700_000_000_000),
            headers,
        }
    }

    #[test]
    fn test_value_only_by_default() {
        let rendered = render_record(&ConsumerProperties::default(), &view(&[]));
        assert_eq!(rendered, "{\"a\":1}");
    }

    #[test]
    fn test_key_timestamp_and_delimiter() {
        let properties = ConsumerProperties {
            print_key: true,
            timestamp: true,
            delimiter: " | ".to_string(),
            ..Default::default()
        };
        let rendered = render_record(&properties, &view(&[]));
        assert_eq!(rendered, "Timestamp: 1700000000000\tk1 | {\"a\":1}");
    }

    #[test]
    fn test_tombstone_and_missing_key() {
        let properties = ConsumerProperties {
            print_key: true,
            ..Default::default()
        };
        let record = RecordView {
            key: None,
            value: None,
            timestamp: None,
            headers: &[],
        };
        assert_eq!(render_record(&properties, &record), "null\tnull");
    }

    #[test]
    fn test_headers_truncated_unless_full() {
        let long = "x".repeat(100);
        let headers = vec![
            ("trace".to_string(), Some(long.clone().into_bytes())),
            ("empty".to_string(), None),
        ];

        let truncated = render_record(&ConsumerProperties::default(), &view(&headers));
        let first_line = truncated.lines().next().unwrap();
        assert_eq!(
            first_line,
            format!("% Headers: [trace=\"{}...\", empty=null]", "x".repeat(64))
        );

        let full = render_record(
            &ConsumerProperties {
                full_header: true,
                ..Default::default()
            },
            &view(&headers),
        );
        assert!(full.starts_with(&format!("% Headers: [trace=\"{long}\"")));
        assert!(full.ends_with("\n{\"a\":1}"));
    }
}
