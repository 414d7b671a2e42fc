//! Reply-chain schema generations
//!
//! Older clients keep a reply chain's messages under `messages`, newer
//! ones under `messageMap` with camelCase field names. Both are keyed by
//! message id. Generation-two entries are rewritten to generation-one
//! field names here, so extraction sees a single field set.

use serde_json::{Map, Value};

pub const GENERATION_ONE_KEY: &str = "messages";
pub const GENERATION_TWO_KEY: &str = "messageMap";

/// Generation-two field name to generation-one field name.
pub const FIELD_RENAMES: [(&str, &str); 6] = [
    ("isSentByCurrentUser", "isFromMe"),
    ("originalArrivalTime", "originalarrivaltime"),
    ("clientMessageId", "clientmessageid"),
    ("contentType", "contenttype"),
    ("messageType", "messagetype"),
    ("composeTime", "composetime"),
];

/// The message container of one reply-chain record.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyChain<'a> {
    GenerationOne(&'a Map<String, Value>),
    GenerationTwo(&'a Map<String, Value>),
}

impl<'a> ReplyChain<'a> {
    /// Message containers present in a reply-chain value, generation one first.
    pub fn detect(value: &'a Value) -> Vec<ReplyChain<'a>> {
        let mut chains = Vec::new();
        if let Some(Value::Object(map)) = value.get(GENERATION_ONE_KEY) {
            chains.push(ReplyChain::GenerationOne(map));
        }
        if let Some(Value::Object(map)) = value.get(GENERATION_TWO_KEY) {
            chains.push(ReplyChain::GenerationTwo(map));
        }
        chains
    }

    /// Entries in message-id order, normalized to generation-one names.
    ///
    /// Non-object entries are returned as-is for the caller to reject.
    pub fn normalized_entries(&self) -> Vec<(&'a str, Value)> {
        match self {
            ReplyChain::GenerationOne(map) => map
                .iter()
                .map(|(id, entry)| (id.as_str(), entry.clone()))
                .collect(),
            ReplyChain::GenerationTwo(map) => map
                .iter()
                .map(|(id, entry)| {
                    let entry = match entry {
                        Value::Object(fields) => Value::Object(normalize_generation_two(fields)),
                        other => other.clone(),
                    };
                    (id.as_str(), entry)
                })
                .collect(),
        }
    }
}

/// Rename generation-two fields. A generation-one field already present wins.
///
/// Only renames: a field absent from the entry stays absent.
pub fn normalize_generation_two(fields: &Map<String, Value>) -> Map<String, Value> {
    let mut normalized = fields.clone();
    for (from, to) in FIELD_RENAMES {
        if let Some(value) = normalized.remove(from) {
            if !normalized.contains_key(to) {
                normalized.insert(to.to_string(), value);
            }
        }
    }
    normalized
}
