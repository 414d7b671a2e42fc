//! Canonical evidentiary records
//!
//! Entities are built once per distinct item and never mutated afterwards.
//! Serialized field names are camelCase, except `origin_file` and
//! `record_type`, and the lowercase names the client itself uses for
//! message fields (`composetime`, `clientmessageid`, ...).

use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub display_name: Option<String>,
    pub email: Option<String>,
    /// Stable identity
    pub mri: String,
    pub user_principal_name: Option<String>,
    #[serde(rename = "origin_file")]
    pub origin_file: Option<String>,
    #[serde(rename = "record_type")]
    pub record_type: ContactType,
}

/// Serializes as `"contact"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactType {
    #[default]
    Contact,
}

/// Kind of reply-chain entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordSubtype {
    Message,
    Call,
    Reaction,
}

impl RecordSubtype {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordSubtype::Message => "message",
            RecordSubtype::Call => "call",
            RecordSubtype::Reaction => "reaction",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub creator: Option<String>,
    pub conversation_id: Option<String>,
    /// Markup stripped
    pub content: Option<String>,
    #[serde(rename = "composetime")]
    pub compose_time: Option<String>,
    pub created_time: Option<String>,
    pub is_from_me: Option<bool>,
    #[serde(rename = "messagetype")]
    pub message_type: Option<String>,
    #[serde(rename = "contenttype")]
    pub content_type: Option<String>,
    pub message_kind: Option<String>,
    #[serde(rename = "clientmessageid")]
    pub client_message_id: Option<String>,
    #[serde(rename = "originalarrivaltime")]
    pub original_arrival_time: Option<String>,
    pub client_arrival_time: Option<String>,
    pub version: Option<String>,
    /// Nested call-log, activity, links and files, decoded
    pub properties: Map<String, Value>,
    pub attachments: Vec<Value>,
    #[serde(rename = "cachedDeduplicationKey")]
    pub cached_dedup_key: String,
    #[serde(rename = "origin_file")]
    pub origin_file: Option<String>,
    #[serde(rename = "record_type")]
    pub record_subtype: RecordSubtype,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Meeting {
    /// Conversation id
    pub id: Option<String>,
    pub subject: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub organizer_id: Option<String>,
    pub members: Vec<Value>,
    pub client_update_time: Option<String>,
    pub version: Option<i64>,
    /// Inherited from the conversation's last message
    #[serde(rename = "cachedDeduplicationKey")]
    pub cached_dedup_key: String,
    #[serde(rename = "origin_file")]
    pub origin_file: Option<String>,
    #[serde(rename = "record_type")]
    pub record_type: MeetingType,
}

/// Serializes as `"meeting"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MeetingType {
    #[default]
    Meeting,
}

/// One output record, serialized without a wrapper.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CanonicalRecord {
    Contact(Contact),
    Message(Message),
    Meeting(Meeting),
}

impl CanonicalRecord {
    pub fn record_type(&self) -> &'static str {
        match self {
            CanonicalRecord::Contact(_) => "contact",
            CanonicalRecord::Message(m) => m.record_subtype.as_str(),
            CanonicalRecord::Meeting(_) => "meeting",
        }
    }

    pub fn identity(&self) -> &str {
        match self {
            CanonicalRecord::Contact(c) => &c.mri,
            CanonicalRecord::Message(m) => &m.cached_dedup_key,
            CanonicalRecord::Meeting(m) => &m.cached_dedup_key,
        }
    }

    pub fn origin_file(&self) -> Option<&str> {
        match self {
            CanonicalRecord::Contact(c) => c.origin_file.as_deref(),
            CanonicalRecord::Message(m) => m.origin_file.as_deref(),
            CanonicalRecord::Meeting(m) => m.origin_file.as_deref(),
        }
    }
}

/// Reconciled entities, each group sorted by identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconciledRecords {
    pub contacts: Vec<Contact>,
    pub messages: Vec<Message>,
    pub meetings: Vec<Meeting>,
}

impl ReconciledRecords {
    pub fn len(&self) -> usize {
        self.contacts.len() + self.messages.len() + self.meetings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Contacts, then messages, then meetings.
    pub fn records(&self) -> Vec<CanonicalRecord> {
        let contacts = self.contacts.iter().cloned().map(CanonicalRecord::Contact);
        let messages = self.messages.iter().cloned().map(CanonicalRecord::Message);
        let meetings = self.meetings.iter().cloned().map(CanonicalRecord::Meeting);
        contacts.chain(messages).chain(meetings).collect()
    }

    /// The flat output list as JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.records())
    }
}
