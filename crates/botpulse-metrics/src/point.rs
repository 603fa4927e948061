//! Metric records, time-series points and line protocol encoding

use botpulse_core::{BotpulseError, Precision, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Field key holding a point's primary value
pub const VALUE_FIELD: &str = "value";

/// A typed field value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
}

impl FieldValue {
    /// True for values treated as "no value": empty string, zero, NaN, false
    ///
    /// Legitimate zero readings are dropped the same way as missing ones.
    pub fn is_absent(&self) -> bool {
        match self {
            Self::String(s) => s.is_empty(),
            Self::Integer(i) => *i == 0,
            Self::Float(f) => *f == 0.0 || f.is_nan(),
            Self::Boolean(b) => !b,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

pub type Fields = BTreeMap<String, FieldValue>;
pub type Tags = BTreeMap<String, String>;

/// Output of the translator: what to write, before omission rules apply
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    pub name: String,
    pub value: f64,
    pub tags: Tags,
    pub fields: Fields,
}

impl MetricRecord {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            tags: Tags::new(),
            fields: Fields::new(),
        }
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags.extend(tags);
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn with_fields(mut self, fields: Fields) -> Self {
        self.fields.extend(fields);
        self
    }
}

/// A single time-stamped measurement ready for the sink
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub measurement: String,
    pub tags: Tags,
    pub fields: Fields,
    pub timestamp: DateTime<Utc>,
}

impl Point {
    /// Build a point from a record, dropping empty tags and absent fields
    ///
    /// The primary value is stored under [`VALUE_FIELD`] and obeys the same
    /// omission rule as every other field.
    pub fn from_record(record: MetricRecord, timestamp: DateTime<Utc>) -> Self {
        let tags = record
            .tags
            .into_iter()
            .filter(|(key, value)| !key.is_empty() && !value.is_empty())
            .collect();

        let mut fields: Fields = record
            .fields
            .into_iter()
            .filter(|(key, value)| !key.is_empty() && !value.is_absent())
            .collect();

        let value = FieldValue::Float(record.value);
        if !value.is_absent() {
            fields.insert(VALUE_FIELD.to_string(), value);
        }

        Self {
            measurement: record.name,
            tags,
            fields,
            timestamp,
        }
    }

    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Encode as one line of InfluxDB line protocol
    pub fn to_line_protocol(&self, precision: Precision) -> Result<String> {
        if self.fields.is_empty() {
            return Err(BotpulseError::EmptyPoint(self.measurement.clone()));
        }

        let mut line = escape(&self.measurement, &[',', ' ']);

        for (key, value) in &self.tags {
            line.push(',');
            line.push_str(&escape(key, KEY_SPECIALS));
            line.push('=');
            line.push_str(&escape(value, KEY_SPECIALS));
        }

        let fields: Vec<String> = self
            .fields
            .iter()
            .map(|(key, value)| format!("{}={}", escape(key, KEY_SPECIALS), encode_field(value)))
            .collect();
        line.push(' ');
        line.push_str(&fields.join(","));

        line.push(' ');
        line.push_str(&timestamp_in(self.timestamp, precision).to_string());

        Ok(line)
    }
}

const KEY_SPECIALS: &[char] = &[',', '=', ' '];

fn escape(raw: &str, specials: &[char]) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            // Newlines cannot be escaped inside a line
            '\n' | '\r' => out.push(' '),
            '\\' => out.push_str("\\\\"),
            c if specials.contains(&c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}

fn encode_field(value: &FieldValue) -> String {
    match value {
        FieldValue::String(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
        FieldValue::Integer(i) => format!("{}i", i),
        FieldValue::Float(f) => format!("{}", f),
        FieldValue::Boolean(b) => b.to_string(),
    }
}

fn timestamp_in(at: DateTime<Utc>, precision: Precision) -> i64 {
    match precision {
        Precision::S => at.timestamp(),
        Precision::Ms => at.timestamp_millis(),
        Precision::Us => at.timestamp_micros(),
        Precision::Ns => at
            .timestamp_nanos_opt()
            .unwrap_or_else(|| at.timestamp_micros().saturating_mul(1000)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_123).unwrap()
    }

    #[test]
    fn test_absent_values() {
        assert!(FieldValue::from("").is_absent());
        assert!(FieldValue::from(0_i64).is_absent());
        assert!(FieldValue::from(0.0).is_absent());
        assert!(FieldValue::from(f64::NAN).is_absent());
        assert!(FieldValue::from(false).is_absent());

        assert!(!FieldValue::from("x").is_absent());
        assert!(!FieldValue::from(-1_i64).is_absent());
        assert!(!FieldValue::from(0.5).is_absent());
        assert!(!FieldValue::from(true).is_absent());
    }

    #[test]
    fn test_zero_attempt_dropped_language_kept() {
        let record = MetricRecord::new("X", 1.0)
            .tag("lang", "unknown")
            .field("attempt", 0_i64);

        let point = Point::from_record(record, at());
        assert_eq!(point.tag("lang"), Some("unknown"));
        assert!(point.field("attempt").is_none());
        assert_eq!(point.field(VALUE_FIELD), Some(&FieldValue::Float(1.0)));
    }

    #[test]
    fn test_empty_tags_dropped() {
        let record = MetricRecord::new("X", 1.0)
            .tag("channel", "web")
            .tag("language", "");

        let point = Point::from_record(record, at());
        assert_eq!(point.tags.len(), 1);
        assert!(point.tag("language").is_none());
    }

    #[test]
    fn test_line_protocol_encoding() {
        let record = MetricRecord::new("Event - message sent", 1.0)
            .tag("channel", "web chat")
            .tag("type", "message")
            .field("first_name", "Jo \"J\"")
            .field("attempt", 2_i64)
            .field("start", true);

        let line = Point::from_record(record, at())
            .to_line_protocol(Precision::Ms)
            .unwrap();

        assert_eq!(
            line,
            "Event\\ -\\ message\\ sent,channel=web\\ chat,type=message \
             attempt=2i,first_name=\"Jo \\\"J\\\"\",start=true,value=1 1700000000123"
        );
    }

    #[test]
    fn test_trailing_backslash_does_not_swallow_next_tag() {
        let record = MetricRecord::new("Block", 1.0)
            .tag("intent", "path\\")
            .tag("type", "block")
            .field("note", "c:\\tmp");

        let line = Point::from_record(record, at())
            .to_line_protocol(Precision::Ms)
            .unwrap();

        assert_eq!(
            line,
            "Block,intent=path\\\\,type=block note=\"c:\\\\tmp\",value=1 1700000000123"
        );
    }

    #[test]
    fn test_escaped_keys_and_measurement() {
        let record = MetricRecord::new("a\\b c", 1.0).tag("k\\=1", "v");
        let line = Point::from_record(record, at())
            .to_line_protocol(Precision::Ms)
            .unwrap();

        assert!(line.starts_with("a\\\\b\\ c,k\\\\\\=1=v value=1 "));
    }

    #[test]
    fn test_line_protocol_precision() {
        let point = Point::from_record(MetricRecord::new("Stats", 1.0), at());

        assert!(point.to_line_protocol(Precision::S).unwrap().ends_with(" 1700000000"));
        assert!(point
            .to_line_protocol(Precision::Ns)
            .unwrap()
            .ends_with(" 1700000000123000000"));
    }

    #[test]
    fn test_point_without_fields_is_not_encodable() {
        let point = Point::from_record(MetricRecord::new("Intervention Opened", 0.0), at());
        assert!(matches!(
            point.to_line_protocol(Precision::Ms),
            Err(BotpulseError::EmptyPoint(_))
        ));
    }
}
