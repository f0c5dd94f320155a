//! Field coercion helpers shared by the typed registry mapping and the
//! declarative rules.
//!
//! Every helper is total: absent or unusable input yields the default for
//! its type (`""`, `None`, or an empty list), never an error.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde_json::Value;

/// Zone used to anchor date-only text from BC registries.
pub const DEFAULT_ZONE: Tz = chrono_tz::America::Vancouver;

/// Date-only layouts, tried in order. Month names match case-insensitively.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d-%b-%Y", "%b/%d/%Y", "%B %d, %Y", "%b %d, %Y"];

/// Zone-less date-time layouts, interpreted as local time in the zone.
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];

/// Text value, trimmed. Numbers and booleans are rendered; anything else is `""`.
pub fn text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// Optional text; blank becomes `None`. Used for links.
pub fn link(value: Option<&Value>) -> Option<String> {
    Some(text(value)).filter(|s| !s.is_empty())
}

/// First non-blank text among several candidate keys.
pub fn first_text<'a>(values: impl IntoIterator<Item = Option<&'a Value>>) -> String {
    values
        .into_iter()
        .map(text)
        .find(|s| !s.is_empty())
        .unwrap_or_default()
}

/// Numeric value; numeric strings are parsed.
pub fn number(value: Option<&Value>) -> Option<f64> {
    match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Array elements, or empty when absent or not an array.
pub fn list(value: Option<&Value>) -> Vec<Value> {
    match value {
        Some(Value::Array(items)) => items.clone(),
        _ => Vec::new(),
    }
}

/// Non-blank text elements of an array. A bare string is a one-element list.
pub fn text_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| text(Some(item)))
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

/// Instant from a JSON value.
///
/// Accepts date text (see [`parse_date`]), epoch milliseconds, and the
/// extended-JSON `{"$date": ...}` wrapper.
pub fn date(value: Option<&Value>, zone: Tz) -> Option<DateTime<Utc>> {
    match value? {
        Value::String(s) => parse_date(s, zone),
        Value::Number(n) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        Value::Object(map) => date(map.get("$date"), zone),
        _ => None,
    }
}

/// Parse date text.
///
/// RFC 3339 instants keep their offset. Zone-less date-times and date-only
/// text (`2019-06-05`, `05-JUN-2019`, `Jun/05/2019`, `June 5, 2019`) are
/// local to `zone`; date-only text is anchored at local midnight.
/// Unparseable text yields `None`.
pub fn parse_date(text: &str, zone: Tz) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(instant) = DateTime::parse_from_rfc3339(text) {
        return Some(instant.with_timezone(&Utc));
    }

    let local = DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
                .and_then(|day| day.and_hms_opt(0, 0, 0))
        })?;

    zone.from_local_datetime(&local)
        .earliest()
        .map(|instant| instant.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_text_defaults() {
        assert_eq!(text(None), "");
        assert_eq!(text(Some(&Value::Null)), "");
        assert_eq!(text(Some(&json!(["a"]))), "");
        assert_eq!(text(Some(&json!("  Red Chris "))), "Red Chris");
        assert_eq!(text(Some(&json!(42))), "42");
    }

    #[test]
    fn test_link_and_lists() {
        assert_eq!(link(Some(&json!(""))), None);
        assert_eq!(link(Some(&json!("https://a"))), Some("https://a".to_string()));
        assert!(list(None).is_empty());
        assert!(list(Some(&json!("x"))).is_empty());
        assert_eq!(
            text_list(Some(&json!(["Gold", "", "Copper", null]))),
            vec!["Gold".to_string(), "Copper".to_string()]
        );
        assert_eq!(text_list(Some(&json!("Coal"))), vec!["Coal".to_string()]);
    }

    #[test]
    fn test_first_text() {
        let a = json!("");
        let b = json!("second");
        assert_eq!(first_text([Some(&a), None, Some(&b)]), "second");
        assert_eq!(first_text([None, None]), "");
    }

    #[test]
    fn test_parse_month_name_dates_in_vancouver() {
        // PDT is UTC-7 in June
        assert_eq!(parse_date("05-JUN-2019", DEFAULT_ZONE), Some(utc(2019, 6, 5, 7)));
        assert_eq!(parse_date("Jun/05/2019", DEFAULT_ZONE), Some(utc(2019, 6, 5, 7)));
        assert_eq!(parse_date("June 5, 2019", DEFAULT_ZONE), Some(utc(2019, 6, 5, 7)));
        // PST is UTC-8 in January
        assert_eq!(parse_date("2020-01-15", DEFAULT_ZONE), Some(utc(2020, 1, 15, 8)));
    }

    #[test]
    fn test_parse_instants() {
        assert_eq!(
            parse_date("2019-06-05T10:00:00.000Z", DEFAULT_ZONE),
            Some(utc(2019, 6, 5, 10))
        );
        assert_eq!(
            parse_date("2019-06-05T03:00:00", DEFAULT_ZONE),
            Some(utc(2019, 6, 5, 10))
        );
    }

    #[test]
    fn test_unparseable_dates_are_none() {
        assert_eq!(parse_date("", DEFAULT_ZONE), None);
        assert_eq!(parse_date("-", DEFAULT_ZONE), None);
        assert_eq!(parse_date("sometime in 2019", DEFAULT_ZONE), None);
        assert_eq!(parse_date("31-FEB-2019", DEFAULT_ZONE), None);
    }

    #[test]
    fn test_date_from_json_shapes() {
        assert_eq!(date(None, DEFAULT_ZONE), None);
        assert_eq!(
            date(Some(&json!(1_559_728_800_000i64)), DEFAULT_ZONE),
            Some(utc(2019, 6, 5, 10))
        );
        assert_eq!(
            date(Some(&json!({ "$date": "2019-06-05T10:00:00Z" })), DEFAULT_ZONE),
            Some(utc(2019, 6, 5, 10))
        );
        assert_eq!(date(Some(&json!(true)), DEFAULT_ZONE), None);
    }
}
