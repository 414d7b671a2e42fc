//! Shared fixtures for the integration tests
//!
//! Builds raw LevelDB records by hand: catalog entries, data keys and
//! Blink-wrapped V8 values.

#![allow(dead_code)]

use idbxtract::idb::{
    encode_utf16_be, write_string_with_length, write_varint, DatabaseNameKey, KeyPrefix,
    OBJECT_STORE_META_TAG,
};
use idbxtract::RawRecord;

pub const ORIGIN: &str = "https_teams.microsoft.com_0@1";

// =============================================================================
// V8 Values
// =============================================================================

/// Blink envelope plus V8 header around a V8 payload.
pub fn blink_value(v8: Vec<u8>) -> Vec<u8> {
    let mut out = vec![0x01, 0xFF, 0x11, 0xFF, 0x0F];
    out.extend(v8);
    out
}

pub fn v8_string(s: &str) -> Vec<u8> {
    let mut out = vec![b'"'];
    write_varint(s.len() as u64, &mut out);
    out.extend_from_slice(s.as_bytes());
    out
}

pub fn v8_double(n: f64) -> Vec<u8> {
    let mut out = vec![b'N'];
    out.extend_from_slice(&n.to_le_bytes());
    out
}

pub fn v8_bool(b: bool) -> Vec<u8> {
    vec![if b { b'T' } else { b'F' }]
}

pub fn v8_object(props: Vec<(&str, Vec<u8>)>) -> Vec<u8> {
    let mut out = vec![b'o'];
    let count = props.len() as u64;
    for (key, value) in props {
        out.extend(v8_string(key));
        out.extend(value);
    }
    out.push(b'{');
    write_varint(count, &mut out);
    out
}

pub fn v8_dense_array(items: Vec<Vec<u8>>) -> Vec<u8> {
    let length = items.len() as u64;
    let mut out = vec![b'A'];
    write_varint(length, &mut out);
    for item in items {
        out.extend(item);
    }
    out.push(b'$');
    write_varint(0, &mut out);
    write_varint(length, &mut out);
    out
}

// =============================================================================
// Keys
// =============================================================================

pub fn string_user_key(s: &str) -> Vec<u8> {
    let mut out = vec![0x01];
    write_string_with_length(s, &mut out);
    out
}

pub fn data_key(db_id: u64, store_id: u64, user_key: &str) -> Vec<u8> {
    let mut key = KeyPrefix::data(db_id, store_id).encode();
    key.extend(string_user_key(user_key));
    key
}

pub fn store_name_key(db_id: u64, store_id: u64) -> Vec<u8> {
    let mut key = KeyPrefix::new(db_id, 0, 0).encode();
    key.push(OBJECT_STORE_META_TAG);
    write_varint(store_id, &mut key);
    key.push(0x00);
    key
}

pub fn max_store_id_key(db_id: u64) -> Vec<u8> {
    let mut key = KeyPrefix::new(db_id, 0, 0).encode();
    key.push(0x03);
    key
}

// =============================================================================
// Fixture Builder
// =============================================================================

/// Accumulates raw records with increasing sequence numbers.
pub struct Fixture {
    pub records: Vec<RawRecord>,
    sequence: u64,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            sequence: 0,
        }
    }

    fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    pub fn live(&mut self, key: Vec<u8>, value: Vec<u8>, origin_file: &str) -> &mut Self {
        let sequence = self.next_sequence();
        self.records
            .push(RawRecord::live(key, value, sequence, origin_file));
        self
    }

    pub fn deleted(&mut self, key: Vec<u8>, origin_file: &str) -> &mut Self {
        let sequence = self.next_sequence();
        self.records
            .push(RawRecord::deleted(key, sequence, origin_file));
        self
    }

    /// A database with the given stores, ids assigned from 1.
    pub fn database(&mut self, name: &str, db_id: u64, stores: &[&str]) -> &mut Self {
        let name_key = DatabaseNameKey {
            origin: ORIGIN.to_string(),
            name: name.to_string(),
        };
        let mut id = Vec::new();
        write_varint(db_id, &mut id);
        self.live(name_key.encode(), id, "000005.ldb");

        let mut max = Vec::new();
        write_varint(stores.len() as u64, &mut max);
        self.live(max_store_id_key(db_id), max, "000005.ldb");

        for (index, store) in stores.iter().enumerate() {
            self.live(
                store_name_key(db_id, index as u64 + 1),
                encode_utf16_be(store),
                "000005.ldb",
            );
        }
        self
    }

    pub fn build(&self) -> Vec<RawRecord> {
        self.records.clone()
    }
}

// =============================================================================
// Domain Values
// =============================================================================

pub fn person(mri: &str, display_name: &str) -> Vec<u8> {
    blink_value(v8_object(vec![
        ("mri", v8_string(mri)),
        ("displayName", v8_string(display_name)),
    ]))
}

/// A generation-one reply chain holding one message.
pub fn reply_chain(message_id: &str, creator: &str, client_id: &str, content: &str) -> Vec<u8> {
    blink_value(v8_object(vec![
        ("conversationId", v8_string("19:chat@thread.v2")),
        (
            "messages",
            v8_object(vec![(
                message_id,
                v8_object(vec![
                    ("creator", v8_string(creator)),
                    ("clientmessageid", v8_string(client_id)),
                    ("content", v8_string(content)),
                    ("messagetype", v8_string("RichText/Html")),
                    ("properties", v8_object(vec![])),
                ]),
            )]),
        ),
    ]))
}
