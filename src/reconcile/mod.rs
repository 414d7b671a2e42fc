//! Domain record reconciliation
//!
//! Maps decoded store values onto contacts, messages and meetings.
//! Dispatch is by store name:
//!
//! - `people`, `buddylist`: contacts, keyed by `mri`
//! - `replychains`: messages, calls and reactions, keyed by dedup key
//! - `conversations`: meetings, keyed by the last message's dedup key
//!
//! Within each kind the first entity seen for an identity wins, and output
//! is sorted by identity. `reconcile` is a pure function of its input.

mod contacts;
mod de;
mod entities;
mod errors;
mod markup;
mod meetings;
mod messages;
mod nested;
mod schema;
mod timestamps;

pub use contacts::{extract_buddies, extract_contact};
pub use entities::{
    CanonicalRecord, Contact, ContactType, Meeting, MeetingType, Message, ReconciledRecords,
    RecordSubtype,
};
pub use errors::{ReconcileError, ReconcileResult};
pub use markup::strip_markup;
pub use meetings::{extract_meeting, MEETING_CONVERSATION_TYPE};
pub use messages::{extract_message, extract_messages, ExtractedMessage, REACTION_ACTIVITY_TYPES};
pub use nested::decode_nested;
pub use schema::{normalize_generation_two, ReplyChain, FIELD_RENAMES};
pub use timestamps::{format_millis, format_windows_micros, TIMESTAMP_FORMAT};

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use crate::pipeline::{DeserializedRecord, EventCode, ReportEvent, Stage};

pub const PEOPLE_STORE: &str = "people";
pub const BUDDYLIST_STORE: &str = "buddylist";
pub const REPLYCHAINS_STORE: &str = "replychains";
pub const CONVERSATIONS_STORE: &str = "conversations";

/// Result of one reconciliation run.
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    pub records: ReconciledRecords,
    /// Dropped and flagged entities
    pub issues: Vec<ReportEvent>,
    pub duplicates_dropped: u64,
}

/// First-seen-wins collection keyed by identity.
struct Deduplicated<T> {
    by_key: BTreeMap<String, T>,
    duplicates: u64,
}

impl<T> Deduplicated<T> {
    fn new() -> Self {
        Self {
            by_key: BTreeMap::new(),
            duplicates: 0,
        }
    }

    fn insert(&mut self, key: &str, item: T) {
        match self.by_key.entry(key.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(item);
            }
            Entry::Occupied(_) => self.duplicates += 1,
        }
    }

    fn into_sorted(self) -> Vec<T> {
        self.by_key.into_values().collect()
    }
}

struct Reconciler {
    contacts: Deduplicated<Contact>,
    messages: Deduplicated<Message>,
    meetings: Deduplicated<Meeting>,
    issues: Vec<ReportEvent>,
}

impl Reconciler {
    fn new() -> Self {
        Self {
            contacts: Deduplicated::new(),
            messages: Deduplicated::new(),
            meetings: Deduplicated::new(),
            issues: Vec::new(),
        }
    }

    fn issue(&mut self, code: EventCode, record: &DeserializedRecord, detail: String) {
        let mut event = ReportEvent::new(Stage::Reconcile, code, detail)
            .with_origin(record.origin_file.clone())
            .with_sequence(record.sequence)
            .for_store(record.database_id, record.object_store_id);
        event.key_hex = Some(record.user_key.to_string());
        self.issues.push(event);
    }

    fn drop_entity(&mut self, record: &DeserializedRecord, err: ReconcileError) {
        self.issue(EventCode::ReconciliationError, record, err.to_string());
    }

    fn add_contact(&mut self, record: &DeserializedRecord, result: ReconcileResult<Contact>) {
        match result {
            Ok(contact) => {
                let key = contact.mri.clone();
                self.contacts.insert(&key, contact);
            }
            Err(err) => self.drop_entity(record, err),
        }
    }

    fn observe(&mut self, record: &DeserializedRecord) {
        let value = match &record.value {
            Some(value) => value,
            None => return,
        };
        let origin = Some(record.origin_file.as_str());

        match record.store_name.as_deref() {
            Some(PEOPLE_STORE) => self.add_contact(record, extract_contact(value, origin)),
            Some(BUDDYLIST_STORE) => {
                for result in extract_buddies(value, origin) {
                    self.add_contact(record, result);
                }
            }
            Some(REPLYCHAINS_STORE) => {
                for (message_id, result) in extract_messages(value, origin) {
                    match result {
                        Ok(extracted) => {
                            if let Some(activity_type) = &extracted.ambiguous_activity {
                                self.issue(
                                    EventCode::AmbiguousReaction,
                                    record,
                                    format!(
                                        "message {}: activityType '{}' classified as reaction",
                                        message_id, activity_type
                                    ),
                                );
                            }
                            let key = extracted.message.cached_dedup_key.clone();
                            self.messages.insert(&key, extracted.message);
                        }
                        Err(err) => self.issue(
                            EventCode::ReconciliationError,
                            record,
                            format!("message {}: {}", message_id, err),
                        ),
                    }
                }
            }
            Some(CONVERSATIONS_STORE) => match extract_meeting(value, origin) {
                Ok(Some(meeting)) => {
                    let key = meeting.cached_dedup_key.clone();
                    self.meetings.insert(&key, meeting);
                }
                Ok(None) => {}
                Err(err) => self.drop_entity(record, err),
            },
            _ => {}
        }
    }

    fn finish(self) -> Reconciliation {
        let duplicates_dropped =
            self.contacts.duplicates + self.messages.duplicates + self.meetings.duplicates;
        Reconciliation {
            records: ReconciledRecords {
                contacts: self.contacts.into_sorted(),
                messages: self.messages.into_sorted(),
                meetings: self.meetings.into_sorted(),
            },
            issues: self.issues,
            duplicates_dropped,
        }
    }
}

/// Reconcile decoded records into canonical entities.
///
/// Records from other stores and placeholder records are ignored.
pub fn reconcile(records: &[DeserializedRecord]) -> Reconciliation {
    let mut reconciler = Reconciler::new();
    for record in records {
        reconciler.observe(record);
    }
    reconciler.finish()
}
