//! Field and tag extraction from host domain objects
//!
//! Pure functions. Empty values are kept here and dropped by the writer, so
//! every extractor has a fixed output shape.

use botpulse_core::{Block, ChannelEvent, ConversationContext, Subscriber};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

use crate::point::{FieldValue, Fields, Tags};

/// Placeholder for unknown channels and languages
pub const UNKNOWN: &str = "unknown";

/// NLP entity carrying the detected language
const LANGUAGE_ENTITY: &str = "language";

static SLUG_SEPARATORS: OnceLock<Regex> = OnceLock::new();

fn slug_separators() -> &'static Regex {
    SLUG_SEPARATORS.get_or_init(|| Regex::new(r"[^\p{L}\p{N}]+").expect("slug pattern is valid"))
}

/// Lowercase `name`, collapse non-alphanumeric runs into single hyphens
pub fn slugify(name: &str) -> String {
    let lowered = name.to_lowercase();
    slug_separators()
        .replace_all(&lowered, "-")
        .trim_matches('-')
        .to_string()
}

/// Channel name, or [`UNKNOWN`] when missing
pub fn channel_tag(channel: Option<&str>) -> String {
    match channel {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => UNKNOWN.to_string(),
    }
}

/// Identity fields of a subscriber
pub fn subscriber_fields(subscriber: &Subscriber) -> Fields {
    Fields::from([
        ("recipient".to_string(), FieldValue::from(subscriber.id.as_str())),
        (
            "foreign_id".to_string(),
            FieldValue::from(subscriber.foreign_id.as_str()),
        ),
        (
            "first_name".to_string(),
            FieldValue::from(subscriber.first_name.as_str()),
        ),
        (
            "last_name".to_string(),
            FieldValue::from(subscriber.last_name.as_str()),
        ),
    ])
}

/// Fields describing a block run
pub fn block_fields(
    event: Option<&ChannelEvent>,
    block: &Block,
    context: Option<&ConversationContext>,
) -> Fields {
    let postback = event
        .and_then(|e| e.payload.as_ref())
        .map(|payload| payload.to_text())
        .unwrap_or_default();

    Fields::from([
        ("block".to_string(), FieldValue::String(slugify(&block.name))),
        ("postback".to_string(), FieldValue::String(postback)),
        (
            "attempt".to_string(),
            FieldValue::Integer(context.map(|c| c.attempt).unwrap_or(0)),
        ),
        (
            "start".to_string(),
            FieldValue::Boolean(block.starts_conversation),
        ),
    ])
}

/// Language plus one tag per detected NLP entity
pub fn message_tags(event: &ChannelEvent) -> Tags {
    let detected = event
        .nlp
        .iter()
        .find(|e| e.entity == LANGUAGE_ENTITY && !e.value.is_empty())
        .map(|e| e.value.clone());

    let language = detected
        .or_else(|| event.subscriber.language.clone().filter(|l| !l.is_empty()))
        .unwrap_or_else(|| UNKNOWN.to_string());

    let mut tags: Tags = event
        .nlp
        .iter()
        .filter(|e| e.entity != LANGUAGE_ENTITY)
        .filter(|e| !e.entity.is_empty() && !e.value.is_empty())
        .map(|e| (e.entity.clone(), e.value.clone()))
        .collect();

    tags.insert(LANGUAGE_ENTITY.to_string(), language);
    tags
}

/// Typed fields from a free-form plugin payload
///
/// Null values have no type and are dropped.
pub fn plugin_fields(raw: &Map<String, Value>) -> Fields {
    raw.iter()
        .filter_map(|(key, value)| {
            let field = match value {
                Value::Null => return None,
                Value::String(s) => FieldValue::String(s.clone()),
                Value::Number(n) => FieldValue::Float(n.as_f64()?),
                Value::Bool(b) => FieldValue::Boolean(*b),
                composite @ (Value::Array(_) | Value::Object(_)) => {
                    FieldValue::String(composite.to_string())
                }
            };
            Some((key.clone(), field))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use botpulse_core::{NlpEntity, Payload};
    use serde_json::json;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Greeting Flow"), "greeting-flow");
        assert_eq!(slugify("  Ask -- for  Email! "), "ask-for-email");
        assert_eq!(slugify("Étape 2"), "étape-2");
        assert_eq!(slugify(""), "");
    }

    #[test]
    fn test_channel_tag_default() {
        assert_eq!(channel_tag(Some("messenger")), "messenger");
        assert_eq!(channel_tag(Some("")), UNKNOWN);
        assert_eq!(channel_tag(None), UNKNOWN);
    }

    #[test]
    fn test_subscriber_fields_shape() {
        let subscriber = Subscriber::new("sub-1").with_name("Ada", "");
        let fields = subscriber_fields(&subscriber);

        assert_eq!(fields.len(), 4);
        assert_eq!(fields["recipient"], FieldValue::from("sub-1"));
        assert_eq!(fields["first_name"], FieldValue::from("Ada"));
        // Kept empty here, dropped at emission
        assert_eq!(fields["last_name"], FieldValue::from(""));
        assert_eq!(fields["foreign_id"], FieldValue::from(""));
    }

    #[test]
    fn test_block_fields_without_event() {
        let block = Block::new("Main Menu").starting();
        let fields = block_fields(None, &block, None);

        assert_eq!(fields["block"], FieldValue::from("main-menu"));
        assert_eq!(fields["postback"], FieldValue::from(""));
        assert_eq!(fields["attempt"], FieldValue::Integer(0));
        assert_eq!(fields["start"], FieldValue::Boolean(true));
    }

    #[test]
    fn test_block_fields_postback_forms() {
        let block = Block::new("Menu");
        let context = ConversationContext {
            attempt: 3,
            ..Default::default()
        };

        let text = ChannelEvent::default().with_payload(Payload::Text("MENU".into()));
        let fields = block_fields(Some(&text), &block, Some(&context));
        assert_eq!(fields["postback"], FieldValue::from("MENU"));
        assert_eq!(fields["attempt"], FieldValue::Integer(3));

        let structured =
            ChannelEvent::default().with_payload(Payload::Structured(json!({"lat": 2})));
        let fields = block_fields(Some(&structured), &block, None);
        assert_eq!(fields["postback"], FieldValue::from(r#"{"lat":2}"#));
    }

    #[test]
    fn test_message_tags_language_precedence() {
        let subscriber = Subscriber::new("s").with_language("fr");

        let detected = ChannelEvent::new(subscriber.clone())
            .with_entity(NlpEntity::new("language", "en"))
            .with_entity(NlpEntity::new("intent", "greeting"));
        let tags = message_tags(&detected);
        assert_eq!(tags["language"], "en");
        assert_eq!(tags["intent"], "greeting");
        assert_eq!(tags.len(), 2);

        let stored = ChannelEvent::new(subscriber);
        assert_eq!(message_tags(&stored)["language"], "fr");

        let nothing = ChannelEvent::new(Subscriber::new("s"));
        assert_eq!(message_tags(&nothing)["language"], UNKNOWN);
    }

    #[test]
    fn test_message_tags_skip_empty_entities() {
        let event = ChannelEvent::new(Subscriber::new("s"))
            .with_entity(NlpEntity::new("", "orphan"))
            .with_entity(NlpEntity::new("product", ""))
            .with_entity(NlpEntity::new("color", "red"));

        let tags = message_tags(&event);
        assert_eq!(tags.len(), 2);
        assert_eq!(tags["color"], "red");
    }

    #[test]
    fn test_plugin_fields_type_inference() {
        let raw = json!({
            "label": "ok",
            "count": 3,
            "ratio": 0.25,
            "enabled": true,
            "items": [1, 2],
            "meta": {"k": "v"},
            "missing": null,
        });
        let fields = plugin_fields(raw.as_object().unwrap());

        assert_eq!(fields["label"], FieldValue::from("ok"));
        assert_eq!(fields["count"], FieldValue::Float(3.0));
        assert_eq!(fields["ratio"], FieldValue::Float(0.25));
        assert_eq!(fields["enabled"], FieldValue::Boolean(true));
        assert_eq!(fields["items"], FieldValue::from("[1,2]"));
        assert_eq!(fields["meta"], FieldValue::from(r#"{"k":"v"}"#));
        assert!(!fields.contains_key("missing"));
    }
}
