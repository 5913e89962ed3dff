//! Conversions that need no schema: raw values, dates with offsets.

use crate::error::{CoreError, CoreResult};
use crate::value::Value;
use chrono::{DateTime, FixedOffset, Offset, Utc};
use dorm_codec::Document;

/// Key of the timestamp inside a stored local date.
pub(crate) const LOCAL_DATE_DATE: &str = "date";
/// Key of the offset inside a stored local date.
pub(crate) const LOCAL_DATE_TZ: &str = "tz";

/// Converts a value to its document form without consulting a schema.
///
/// Objects and references have no schema-free form and are rejected.
pub(crate) fn raw_to_document(value: &Value) -> CoreResult<Document> {
    Ok(match value {
        Value::Null => Document::Null,
        Value::Bool(b) => Document::Bool(*b),
        Value::Integer(n) => Document::Integer(*n),
        Value::Decimal(d) => Document::Float(*d),
        Value::Text(s) => Document::Text(s.clone()),
        Value::Date(d) => Document::date(*d),
        Value::List(items) => Document::Array(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| raw_to_document(item).map_err(|e| e.at(&format!("[{i}]"))))
                .collect::<CoreResult<_>>()?,
        ),
        Value::Map(entries) => Document::map(
            entries
                .iter()
                .map(|(key, item)| Ok((key.clone(), raw_to_document(item).map_err(|e| e.at(key))?)))
                .collect::<CoreResult<Vec<_>>>()?,
        ),
        other @ (Value::LocalDate(_)
        | Value::Object(_)
        | Value::Reference(_)
        | Value::References(_)) => {
            return Err(CoreError::schema_mismatch("", "plain data", other.type_name()));
        }
    })
}

/// Converts a document to a value verbatim.
pub(crate) fn document_to_raw(document: &Document) -> Value {
    match document {
        Document::Null => Value::Null,
        Document::Bool(b) => Value::Bool(*b),
        Document::Integer(n) => Value::Integer(*n),
        Document::Float(x) => Value::Decimal(*x),
        Document::Text(s) => Value::Text(s.clone()),
        Document::Date(d) => Value::Date(*d),
        Document::Array(items) => Value::List(items.iter().map(document_to_raw).collect()),
        Document::Map(pairs) => Value::Map(
            pairs
                .iter()
                .map(|(key, item)| (key.clone(), document_to_raw(item)))
                .collect(),
        ),
    }
}

/// Widens an integer for a decimal field.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn widen(n: i64) -> f64 {
    n as f64
}

/// Stores a local date as `{ date: <utc>, tz: "+hh:mm" }`.
pub(crate) fn local_date_to_document(at: &DateTime<FixedOffset>) -> Document {
    Document::map(vec![
        (LOCAL_DATE_DATE.to_string(), Document::date(at.with_timezone(&Utc))),
        (LOCAL_DATE_TZ.to_string(), Document::Text(format_offset(*at.offset()))),
    ])
}

/// Reads a stored local date. A bare date is taken to be in UTC.
pub(crate) fn document_to_local_date(document: &Document) -> Option<DateTime<FixedOffset>> {
    match document {
        Document::Date(at) => Some(at.fixed_offset()),
        Document::Map(_) => {
            let at = document.get(LOCAL_DATE_DATE)?.as_date()?;
            let offset = match document.get(LOCAL_DATE_TZ) {
                Some(tz) => parse_offset(tz.as_text()?)?,
                None => utc_offset(),
            };
            Some(at.with_timezone(&offset))
        }
        _ => None,
    }
}

fn utc_offset() -> FixedOffset {
    Utc.fix()
}

/// Formats an offset as `+hh:mm`, or `+hh:mm:ss` when it has seconds.
pub(crate) fn format_offset(offset: FixedOffset) -> String {
    let total = offset.local_minus_utc();
    let sign = if total < 0 { '-' } else { '+' };
    let total = total.unsigned_abs();
    let (hours, minutes, seconds) = (total / 3600, total / 60 % 60, total % 60);
    if seconds == 0 {
        format!("{sign}{hours:02}:{minutes:02}")
    } else {
        format!("{sign}{hours:02}:{minutes:02}:{seconds:02}")
    }
}

/// Parses `Z`, `+hh:mm`, `+hh:mm:ss`, or either without colons.
pub(crate) fn parse_offset(text: &str) -> Option<FixedOffset> {
    if text == "Z" {
        return Some(utc_offset());
    }
    let (sign, rest) = match text.as_bytes().first()? {
        b'+' => (1, &text[1..]),
        b'-' => (-1, &text[1..]),
        _ => return None,
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if !matches!(digits.len(), 4 | 6) || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..4].parse().ok()?;
    let seconds: i32 = if digits.len() == 6 { digits[4..].parse().ok()? } else { 0 };
    if minutes >= 60 || seconds >= 60 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60 + seconds))
}
