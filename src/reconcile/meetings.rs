//! Meetings from the `conversations` store
//!
//! A conversation is a meeting when its `type` is `Meeting` and it carries
//! `threadProperties.meeting`, a JSON text holding the meeting details.
//! Meetings have no key of their own and take the one of the
//! conversation's last message.

use serde::Deserialize;
use serde_json::Value;

use super::de;
use super::entities::{Meeting, MeetingType};
use super::errors::{ReconcileError, ReconcileResult};
use super::nested::decode_nested;

pub const MEETING_CONVERSATION_TYPE: &str = "Meeting";

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct MeetingDetails {
    #[serde(deserialize_with = "de::opt_string")]
    subject: Option<String>,
    #[serde(deserialize_with = "de::opt_string")]
    start_time: Option<String>,
    #[serde(deserialize_with = "de::opt_string")]
    end_time: Option<String>,
    #[serde(deserialize_with = "de::opt_string")]
    organizer_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ConversationEntry {
    #[serde(deserialize_with = "de::opt_string")]
    id: Option<String>,
    #[serde(rename = "type", deserialize_with = "de::opt_string")]
    kind: Option<String>,
    #[serde(deserialize_with = "de::list")]
    members: Vec<Value>,
    #[serde(deserialize_with = "de::opt_string")]
    client_update_time: Option<String>,
    #[serde(deserialize_with = "de::opt_millis")]
    version: Option<i64>,
    thread_properties: Option<Value>,
    last_message: Option<Value>,
}

/// The meeting of one conversation value, `Ok(None)` for other conversations.
pub fn extract_meeting(value: &Value, origin_file: Option<&str>) -> ReconcileResult<Option<Meeting>> {
    if !value.is_object() {
        return Err(ReconcileError::NotAnObject {
            kind: "conversation",
        });
    }
    let entry: ConversationEntry =
        serde_json::from_value(value.clone()).map_err(|e| ReconcileError::Malformed {
            kind: "conversation",
            reason: e.to_string(),
        })?;

    if entry.kind.as_deref() != Some(MEETING_CONVERSATION_TYPE) {
        return Ok(None);
    }

    let thread_properties = match entry.thread_properties {
        Some(raw) => decode_nested("threadProperties", &raw)?,
        None => return Ok(None),
    };
    let meeting = match thread_properties.get("meeting") {
        Some(raw) if !raw.is_null() => decode_nested("threadProperties.meeting", raw)?,
        _ => return Ok(None),
    };
    let details: MeetingDetails = match meeting {
        Value::Object(_) => {
            serde_json::from_value(meeting).map_err(|e| ReconcileError::Malformed {
                kind: "meeting",
                reason: e.to_string(),
            })?
        }
        _ => MeetingDetails::default(),
    };

    let cached_dedup_key = entry
        .last_message
        .as_ref()
        .and_then(|m| m.get("cachedDeduplicationKey"))
        .and_then(de::string_of)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| ReconcileError::MissingIdentity {
            kind: "meeting",
            reason: "no lastMessage.cachedDeduplicationKey".to_string(),
        })?;

    Ok(Some(Meeting {
        id: entry.id,
        subject: details.subject,
        start_time: details.start_time,
        end_time: details.end_time,
        organizer_id: details.organizer_id,
        members: entry.members,
        client_update_time: entry.client_update_time,
        version: entry.version,
        cached_dedup_key,
        origin_file: origin_file.map(str::to_string),
        record_type: MeetingType::Meeting,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meeting_conversation() -> Value {
        json!({
            "id": "19:meeting_abc@thread.v2",
            "type": "Meeting",
            "version": 1620000000000.0,
            "members": [{"id": "8:orgid:x"}],
            "threadProperties": {
                "meeting": "{\"subject\":\"Sync\",\"startTime\":\"2021-05-03T09:00:00Z\",\"endTime\":\"2021-05-03T09:30:00Z\",\"organizerId\":\"X\"}"
            },
            "lastMessage": {"cachedDeduplicationKey": "K1"}
        })
    }

    #[test]
    fn test_meeting_extracted() {
        let meeting = extract_meeting(&meeting_conversation(), Some("000005.ldb"))
            .unwrap()
            .unwrap();
        assert_eq!(meeting.subject.as_deref(), Some("Sync"));
        assert_eq!(meeting.organizer_id.as_deref(), Some("X"));
        assert_eq!(meeting.cached_dedup_key, "K1");
        assert_eq!(meeting.version, Some(1620000000000));
        assert_eq!(meeting.members.len(), 1);
        assert_eq!(meeting.origin_file.as_deref(), Some("000005.ldb"));
    }

    #[test]
    fn test_non_meeting_conversation_ignored() {
        let mut value = meeting_conversation();
        value["type"] = json!("Chat");
        assert_eq!(extract_meeting(&value, None).unwrap(), None);

        let mut value = meeting_conversation();
        value["threadProperties"] = json!({"topic": "x"});
        assert_eq!(extract_meeting(&value, None).unwrap(), None);
    }

    #[test]
    fn test_meeting_without_key_dropped() {
        let mut value = meeting_conversation();
        value["lastMessage"] = json!({});
        let err = extract_meeting(&value, None).unwrap_err();
        assert!(matches!(err, ReconcileError::MissingIdentity { kind: "meeting", .. }));
    }

    #[test]
    fn test_stringified_thread_properties() {
        let mut value = meeting_conversation();
        value["threadProperties"] =
            json!("{\"meeting\":{\"subject\":\"Retro\",\"organizerId\":\"Y\"}}");
        let meeting = extract_meeting(&value, None).unwrap().unwrap();
        assert_eq!(meeting.subject.as_deref(), Some("Retro"));
    }
}
