use chrono::{DateTime, NaiveDate};
use serde::Deserialize;
use serde_json::Value;

/// One Bitable row: an opaque id plus a map of field name to raw value.
///
/// Field values come back in several shapes depending on the column type and
/// how the cell was filled: plain strings, numbers, `{text, link}` objects for
/// URL cells, or arrays of text segments for rich-text cells. The accessors
/// below absorb all of them.
#[derive(Debug, Clone, Deserialize)]
pub struct BitableRecord {
    pub record_id: String,
    #[serde(default)]
    pub fields: serde_json::Map<String, Value>,
}

impl BitableRecord {
    pub fn text(&self, field: &str) -> Option<String> {
        self.fields.get(field).and_then(field_text)
    }

    pub fn number(&self, field: &str) -> Option<u64> {
        self.fields.get(field).and_then(field_u64)
    }

    pub fn date(&self, field: &str) -> Option<NaiveDate> {
        self.fields.get(field).and_then(field_date)
    }
}

/// Extract a non-empty string from any of the field value shapes.
pub fn field_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Object(obj) => obj
            .get("text")
            .or_else(|| obj.get("link"))
            .and_then(field_text),
        Value::Array(items) => items.first().and_then(field_text),
        _ => None,
    }
}

/// Extract a non-negative integer, tolerating numeric strings with thousands
/// separators and single-element segment arrays.
pub fn field_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0)
                .map(|f| f.round() as u64)
        }),
        Value::String(_) | Value::Object(_) => {
            field_text(value).and_then(|s| parse_numeric_text(&s))
        }
        Value::Array(items) => items.first().and_then(field_u64),
        _ => None,
    }
}

/// Extract a calendar date. Bitable date cells are Unix epoch milliseconds;
/// text cells may hold an ISO date.
pub fn field_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::Number(n) => {
            let raw = n.as_i64()?;
            // Millisecond epochs have more than 10 digits.
            let secs = if raw.abs() > 9_999_999_999 { raw / 1000 } else { raw };
            DateTime::from_timestamp(secs, 0).map(|dt| dt.date_naive())
        }
        Value::String(_) | Value::Object(_) => {
            let text = field_text(value)?;
            parse_date_text(&text)
        }
        Value::Array(items) => items.first().and_then(field_date),
        _ => None,
    }
}

fn parse_numeric_text(s: &str) -> Option<u64> {
    let cleaned = s.trim().replace([',', ' '], "");
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<u64>().ok().or_else(|| {
        cleaned
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite() && *f >= 0.0)
            .map(|f| f.round() as u64)
    })
}

fn parse_date_text(s: &str) -> Option<NaiveDate> {
    let trimmed = s.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%Y/%m/%d"))
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(trimmed)
                .ok()
                .map(|dt| dt.date_naive())
        })
}

// --- Response envelopes ---

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub tenant_access_token: String,
    /// Token lifetime in seconds.
    #[serde(default)]
    pub expire: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiResponse<T> {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    pub data: Option<T>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RecordPage {
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub page_token: Option<String>,
    #[serde(default)]
    pub items: Vec<BitableRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_field_handles_all_shapes() {
        assert_eq!(field_text(&json!("  hello ")), Some("hello".to_string()));
        assert_eq!(field_text(&json!("")), None);
        assert_eq!(field_text(&json!(42)), Some("42".to_string()));
        assert_eq!(
            field_text(&json!({"text": "https://x", "link": "https://y"})),
            Some("https://x".to_string())
        );
        assert_eq!(
            field_text(&json!({"link": "https://y"})),
            Some("https://y".to_string())
        );
        assert_eq!(
            field_text(&json!([{"text": "first"}, {"text": "second"}])),
            Some("first".to_string())
        );
        assert_eq!(field_text(&json!(null)), None);
    }

    #[test]
    fn number_field_tolerates_strings_and_floats() {
        assert_eq!(field_u64(&json!(1500)), Some(1500));
        assert_eq!(field_u64(&json!(1500.0)), Some(1500));
        assert_eq!(field_u64(&json!("89,000")), Some(89000));
        assert_eq!(field_u64(&json!([{"text": "1234"}])), Some(1234));
        assert_eq!(field_u64(&json!("not a number")), None);
        assert_eq!(field_u64(&json!(-5)), None);
    }

    #[test]
    fn date_field_reads_epoch_millis_and_iso_text() {
        // 2025-10-24T00:00:00Z in milliseconds
        assert_eq!(
            field_date(&json!(1_761_264_000_000_i64)),
            NaiveDate::from_ymd_opt(2025, 10, 24)
        );
        assert_eq!(
            field_date(&json!("2025-10-24")),
            NaiveDate::from_ymd_opt(2025, 10, 24)
        );
        assert_eq!(field_date(&json!("soon")), None);
    }

    #[test]
    fn record_accessors_read_named_fields() {
        let record: BitableRecord = serde_json::from_value(json!({
            "record_id": "recabc",
            "fields": {
                "Link air bài": [{"text": "https://www.tiktok.com/@u/video/1"}],
                "Lượt xem hiện tại": 12000,
            }
        }))
        .unwrap();

        assert_eq!(
            record.text("Link air bài").as_deref(),
            Some("https://www.tiktok.com/@u/video/1")
        );
        assert_eq!(record.number("Lượt xem hiện tại"), Some(12000));
        assert_eq!(record.number("missing"), None);
    }
}
