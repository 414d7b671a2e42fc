//! Blink/V8 value deserialization
//!
//! Turns IndexedDB record values into `JsValue` trees. Malformed input
//! always yields a typed error; nothing here panics on bad bytes.

mod blink;
mod deserializer;
mod errors;
mod reader;
mod value;

pub use blink::{
    decode_json, decode_value, decode_value_with_depth, parse_envelope, BlinkEnvelope,
    BlinkHostObjectDelegate, BLINK_ENVELOPE_TAG,
};
pub use deserializer::{
    deserialize, HostObjectDelegate, NoHostObjects, V8Deserializer, DEFAULT_MAX_DEPTH, VERSION_TAG,
};
pub use errors::{
    DecodeError, DecodeErrorKind, DecodeResult, EnvelopeError, ResolveError, ValueError,
};
pub use reader::ByteReader;
pub use value::{
    HostObject, JsArray, JsArrayBufferView, JsBigInt, JsError, JsMap, JsObject, JsSet, JsValue,
    ObjectId, ReferenceIndex, ResolveLimits, DEFAULT_MAX_NODES,
};
