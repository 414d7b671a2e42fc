//! IndexedDB value envelope and Blink host objects
//!
//! Record values are laid out as
//!
//! ```text
//! <varint value_version> 0xFF <varint blink_version> [0xFE <u64 offset> <u32 size>] <V8 stream>
//! ```
//!
//! The optional `0xFE` block points at a trailer of external references
//! and is skipped.

use serde_json::Value;

use crate::idb::read_varint_at;

use super::deserializer::{HostObjectDelegate, V8Deserializer, DEFAULT_MAX_DEPTH};
use super::errors::{DecodeErrorKind, DecodeResult, EnvelopeError, ValueError};
use super::reader::ByteReader;
use super::value::{HostObject, JsValue, ResolveLimits};

/// The only supported envelope tag: Blink wraps a V8 stream.
pub const BLINK_ENVELOPE_TAG: u8 = 0xFF;

const TRAILER_OFFSET_TAG: u8 = 0xFE;
const TRAILER_OFFSET_LEN: usize = 8 + 4;

mod host_tag {
    pub const BLOB_INDEX: u8 = b'i';
    pub const FILE_INDEX: u8 = b'e';
    pub const FILE_LIST_INDEX: u8 = b'L';
    pub const BLOB: u8 = b'b';
    pub const MESSAGE_PORT: u8 = b'M';
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlinkEnvelope {
    pub value_version: u64,
    pub blink_version: u64,
    /// (offset, size) of the external-reference trailer, when present
    pub trailer: Option<(u64, u32)>,
    /// Where the V8 stream starts within the value
    pub payload_offset: usize,
}

/// Parse the framing in front of the V8 stream.
pub fn parse_envelope(value: &[u8]) -> Result<BlinkEnvelope, EnvelopeError> {
    if value.is_empty() {
        return Err(EnvelopeError::Empty);
    }

    let (value_version, mut pos) =
        read_varint_at(value, 0).map_err(EnvelopeError::ValueVersion)?;

    match value.get(pos) {
        Some(&BLINK_ENVELOPE_TAG) => pos += 1,
        Some(&other) => return Err(EnvelopeError::UnsupportedTag(other)),
        None => return Err(EnvelopeError::MissingTag),
    }

    let (blink_version, used) = read_varint_at(value, pos).map_err(EnvelopeError::BlinkVersion)?;
    pos += used;

    let mut trailer = None;
    if value.get(pos) == Some(&TRAILER_OFFSET_TAG) {
        let block = value
            .get(pos + 1..pos + 1 + TRAILER_OFFSET_LEN)
            .ok_or(EnvelopeError::TruncatedTrailer)?;
        let mut offset = [0u8; 8];
        offset.copy_from_slice(&block[..8]);
        let mut size = [0u8; 4];
        size.copy_from_slice(&block[8..]);
        trailer = Some((u64::from_be_bytes(offset), u32::from_be_bytes(size)));
        pos += 1 + TRAILER_OFFSET_LEN;
    }

    Ok(BlinkEnvelope {
        value_version,
        blink_version,
        trailer,
        payload_offset: pos,
    })
}

/// Resolves Blink's serialized DOM handles into `HostObject`s.
#[derive(Debug, Default)]
pub struct BlinkHostObjectDelegate;

impl BlinkHostObjectDelegate {
    fn read_u32(reader: &mut ByteReader<'_>) -> DecodeResult<u32> {
        reader.read_varint_u32()
    }

    fn read_utf8(reader: &mut ByteReader<'_>) -> DecodeResult<String> {
        let len = reader.read_length()?;
        Ok(String::from_utf8_lossy(reader.read_bytes(len)?).into_owned())
    }
}

impl HostObjectDelegate for BlinkHostObjectDelegate {
    fn read_host_object(&mut self, reader: &mut ByteReader<'_>) -> DecodeResult<HostObject> {
        let tag = reader.read_tag()?;
        match tag {
            host_tag::BLOB_INDEX => Ok(HostObject::BlobIndex(Self::read_u32(reader)?)),
            host_tag::FILE_INDEX => Ok(HostObject::FileIndex(Self::read_u32(reader)?)),
            host_tag::FILE_LIST_INDEX => {
                let len = Self::read_u32(reader)?;
                let mut indexes = Vec::with_capacity((len as usize).min(reader.remaining()));
                for _ in 0..len {
                    indexes.push(Self::read_u32(reader)?);
                }
                Ok(HostObject::FileListIndex(indexes))
            }
            host_tag::BLOB => {
                let uuid = Self::read_utf8(reader)?;
                let content_type = Self::read_utf8(reader)?;
                let size = reader.read_varint()?;
                Ok(HostObject::Blob {
                    uuid,
                    content_type,
                    size,
                })
            }
            host_tag::MESSAGE_PORT => Ok(HostObject::MessagePort(Self::read_u32(reader)?)),
            other => Err(reader.error(DecodeErrorKind::UnsupportedHostObject(other))),
        }
    }
}

/// Decode a record value: envelope, then the V8 stream.
pub fn decode_value(value: &[u8]) -> Result<JsValue, ValueError> {
    decode_value_with_depth(value, DEFAULT_MAX_DEPTH)
}

pub fn decode_value_with_depth(value: &[u8], max_depth: usize) -> Result<JsValue, ValueError> {
    let envelope = parse_envelope(value)?;
    let payload = &value[envelope.payload_offset..];
    let decoded = V8Deserializer::new(payload, BlinkHostObjectDelegate)
        .with_max_depth(max_depth)
        .read_value()?;
    Ok(decoded)
}

/// Decode a record value straight to its plain tree.
pub fn decode_json(value: &[u8], limits: ResolveLimits) -> Result<Value, ValueError> {
    let decoded = decode_value_with_depth(value, limits.max_depth)?;
    Ok(decoded.to_json_with_limits(limits)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::v8::ResolveError;
    use serde_json::json;

    #[test]
    fn test_parse_envelope() {
        let value = [0x01, 0xFF, 0x11, 0xFF, 0x0F, b'T'];
        let envelope = parse_envelope(&value).unwrap();
        assert_eq!(envelope.value_version, 1);
        assert_eq!(envelope.blink_version, 0x11);
        assert_eq!(envelope.trailer, None);
        assert_eq!(envelope.payload_offset, 3);
    }

    #[test]
    fn test_trailer_is_skipped() {
        let mut value = vec![0x01, 0xFF, 0x15, 0xFE];
        value.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 0x40]);
        value.extend_from_slice(&[0, 0, 0, 0x10]);
        value.extend_from_slice(&[0xFF, 0x0F, b'F']);

        let envelope = parse_envelope(&value).unwrap();
        assert_eq!(envelope.trailer, Some((0x40, 0x10)));
        assert_eq!(decode_value(&value).unwrap(), JsValue::Bool(false));
    }

    #[test]
    fn test_unsupported_envelope_tag() {
        let err = parse_envelope(&[0x01, 0x00, 0x11]).unwrap_err();
        assert_eq!(err, EnvelopeError::UnsupportedTag(0x00));
    }

    #[test]
    fn test_empty_and_truncated() {
        assert_eq!(parse_envelope(&[]).unwrap_err(), EnvelopeError::Empty);
        assert_eq!(parse_envelope(&[0x01]).unwrap_err(), EnvelopeError::MissingTag);
        assert_eq!(
            parse_envelope(&[0x01, 0xFF, 0x15, 0xFE, 0x00]).unwrap_err(),
            EnvelopeError::TruncatedTrailer
        );
    }

    #[test]
    fn test_blob_host_object() {
        let mut value = vec![0x01, 0xFF, 0x11, 0xFF, 0x0F, b'\\', b'b', 0x02];
        value.extend_from_slice(b"u1");
        value.extend_from_slice(&[0x09]);
        value.extend_from_slice(b"image/png");
        value.push(0x80);
        value.push(0x01);

        let decoded = decode_value(&value).unwrap();
        assert_eq!(
            decoded.to_json().unwrap(),
            json!({"hostObject": "Blob", "uuid": "u1", "type": "image/png", "size": 128})
        );
    }

    #[test]
    fn test_decode_json_applies_node_budget() {
        // [1, 2, 3]
        let value = [
            0x01, 0xFF, 0x11, 0xFF, 0x0F, b'A', 0x03, b'I', 0x02, b'I', 0x04, b'I', 0x06, b'$',
            0x00, 0x03,
        ];
        let limits = ResolveLimits {
            max_depth: 8,
            max_nodes: 3,
        };
        assert_eq!(
            decode_json(&value, limits).unwrap_err(),
            ValueError::Resolve(ResolveError::TooManyNodes(3))
        );
        assert_eq!(
            decode_json(&value, ResolveLimits::default()).unwrap(),
            json!([1, 2, 3])
        );
    }

    #[test]
    fn test_unknown_host_tag() {
        let value = [0x01, 0xFF, 0x11, 0xFF, 0x0F, b'\\', b'?'];
        let err = decode_value(&value).unwrap_err();
        match err {
            ValueError::Decode(e) => {
                assert_eq!(e.kind, DecodeErrorKind::UnsupportedHostObject(b'?'))
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
