//! Messages, calls and reactions from the `replychains` store

use serde::Deserialize;
use serde_json::{Map, Value};

use super::de;
use super::entities::{Message, RecordSubtype};
use super::errors::{ReconcileError, ReconcileResult};
use super::markup::strip_markup;
use super::nested::{decode_nested, decode_object, is_non_empty};
use super::schema::ReplyChain;
use super::timestamps::format_millis;

pub const CALL_LOG_PROPERTY: &str = "call-log";
pub const ACTIVITY_PROPERTY: &str = "activity";

/// Activity types that unambiguously denote a reaction.
pub const REACTION_ACTIVITY_TYPES: [&str; 2] = ["reaction", "reactionInChat"];

const MESSAGE_NESTED_PROPERTIES: [&str; 2] = ["links", "files"];

/// A reply-chain entry in generation-one field names.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MessageEntry {
    #[serde(deserialize_with = "de::opt_string")]
    creator: Option<String>,
    #[serde(rename = "conversationId", deserialize_with = "de::opt_string")]
    conversation_id: Option<String>,
    #[serde(deserialize_with = "de::opt_string")]
    content: Option<String>,
    #[serde(deserialize_with = "de::opt_string")]
    composetime: Option<String>,
    #[serde(rename = "createdTime", deserialize_with = "de::opt_millis")]
    created_time: Option<i64>,
    #[serde(rename = "isFromMe", deserialize_with = "de::opt_bool")]
    is_from_me: Option<bool>,
    #[serde(deserialize_with = "de::opt_string")]
    messagetype: Option<String>,
    #[serde(deserialize_with = "de::opt_string")]
    contenttype: Option<String>,
    #[serde(rename = "messageKind", deserialize_with = "de::opt_string")]
    message_kind: Option<String>,
    #[serde(deserialize_with = "de::opt_string")]
    clientmessageid: Option<String>,
    #[serde(deserialize_with = "de::opt_string")]
    originalarrivaltime: Option<String>,
    #[serde(rename = "clientArrivalTime", deserialize_with = "de::opt_string")]
    client_arrival_time: Option<String>,
    #[serde(deserialize_with = "de::opt_millis")]
    version: Option<i64>,
    properties: Option<Value>,
    #[serde(deserialize_with = "de::list")]
    attachments: Vec<Value>,
    #[serde(rename = "cachedDeduplicationKey", deserialize_with = "de::opt_string")]
    cached_deduplication_key: Option<String>,
}

/// A reconciled message, plus the activity type when the reaction
/// classification rests on an unrecognised one.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedMessage {
    pub message: Message,
    pub ambiguous_activity: Option<String>,
}

/// Every message of one reply-chain value, in message-id order per generation.
pub fn extract_messages(
    value: &Value,
    origin_file: Option<&str>,
) -> Vec<(String, ReconcileResult<ExtractedMessage>)> {
    let chain_conversation = value.get("conversationId").and_then(de::string_of);

    ReplyChain::detect(value)
        .iter()
        .flat_map(|chain| chain.normalized_entries())
        .map(|(id, entry)| {
            let result = extract_message(&entry, origin_file, chain_conversation.as_deref());
            (id.to_string(), result)
        })
        .collect()
}

/// One normalized entry. Falls back to the chain's conversation id.
pub fn extract_message(
    entry: &Value,
    origin_file: Option<&str>,
    chain_conversation: Option<&str>,
) -> ReconcileResult<ExtractedMessage> {
    if !entry.is_object() {
        return Err(ReconcileError::NotAnObject { kind: "message" });
    }
    let entry: MessageEntry =
        serde_json::from_value(entry.clone()).map_err(|e| ReconcileError::Malformed {
            kind: "message",
            reason: e.to_string(),
        })?;

    let cached_dedup_key = dedup_key(&entry)?;
    let mut properties = decode_object("properties", entry.properties.as_ref())?;
    let (record_subtype, ambiguous_activity) = classify_properties(&mut properties)?;

    Ok(ExtractedMessage {
        message: Message {
            creator: entry.creator,
            conversation_id: entry
                .conversation_id
                .or_else(|| chain_conversation.map(str::to_string)),
            content: entry.content.as_deref().map(strip_markup),
            compose_time: entry.composetime,
            created_time: entry.created_time.and_then(format_millis),
            is_from_me: entry.is_from_me,
            message_type: entry.messagetype,
            content_type: entry.contenttype,
            message_kind: entry.message_kind,
            client_message_id: entry.clientmessageid,
            original_arrival_time: entry.originalarrivaltime,
            client_arrival_time: entry.client_arrival_time,
            version: entry.version.and_then(format_millis),
            properties,
            attachments: entry.attachments,
            cached_dedup_key,
            origin_file: origin_file.map(str::to_string),
            record_subtype,
        },
        ambiguous_activity,
    })
}

/// The stored key, else `creator ++ clientmessageid`.
fn dedup_key(entry: &MessageEntry) -> ReconcileResult<String> {
    if let Some(key) = entry.cached_deduplication_key.as_deref().filter(|k| !k.is_empty()) {
        return Ok(key.to_string());
    }
    if entry.creator.is_none() && entry.clientmessageid.is_none() {
        return Err(ReconcileError::MissingIdentity {
            kind: "message",
            reason: "neither creator nor clientmessageid".to_string(),
        });
    }
    Ok(format!(
        "{}{}",
        entry.creator.as_deref().unwrap_or_default(),
        entry.clientmessageid.as_deref().unwrap_or_default()
    ))
}

/// Decode the nested property that decides the subtype, and classify.
///
/// `call-log` wins over `activity`; any non-empty activity is a reaction.
fn classify_properties(
    properties: &mut Map<String, Value>,
) -> ReconcileResult<(RecordSubtype, Option<String>)> {
    if let Some(call_log) = properties.get(CALL_LOG_PROPERTY).filter(|v| !v.is_null()) {
        let decoded = decode_nested(CALL_LOG_PROPERTY, call_log)?;
        properties.insert(CALL_LOG_PROPERTY.to_string(), decoded);
        return Ok((RecordSubtype::Call, None));
    }

    if let Some(activity) = properties.get(ACTIVITY_PROPERTY) {
        let decoded = decode_nested(ACTIVITY_PROPERTY, activity)?;
        if is_non_empty(&decoded) {
            let activity_type = decoded
                .get("activityType")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let ambiguous = if REACTION_ACTIVITY_TYPES.contains(&activity_type.as_str()) {
                None
            } else {
                Some(activity_type)
            };
            properties.insert(ACTIVITY_PROPERTY.to_string(), decoded);
            return Ok((RecordSubtype::Reaction, ambiguous));
        }
    }

    for field in MESSAGE_NESTED_PROPERTIES {
        if let Some(raw) = properties.get(field) {
            let decoded = decode_nested(field, raw)?;
            properties.insert(field.to_string(), decoded);
        }
    }
    Ok((RecordSubtype::Message, None))
}
