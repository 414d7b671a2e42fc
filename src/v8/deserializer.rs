//! Recursive-descent reader for the V8 structured-clone stream
//!
//! Each object-like value takes the next id when its tag is read, before
//! any child is decoded. Containers are registered as placeholders so that
//! children can refer back to them; leaf objects are stored by value and
//! cloned when referenced again. The table lives for one stream only.

use super::errors::{DecodeErrorKind, DecodeResult};
use super::reader::ByteReader;
use super::value::{
    HostObject, JsArray, JsArrayBufferView, JsBigInt, JsError, JsMap, JsObject, JsSet, JsValue,
    ObjectId,
};

pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Version header tag at the start of a V8 stream.
pub const VERSION_TAG: u8 = 0xFF;

/// View records carry a flags varint from this version on.
const VIEW_FLAGS_MIN_VERSION: u32 = 14;

mod tag {
    pub const UNDEFINED: u8 = b'_';
    pub const NULL: u8 = b'0';
    pub const TRUE: u8 = b'T';
    pub const FALSE: u8 = b'F';
    pub const INT32: u8 = b'I';
    pub const UINT32: u8 = b'U';
    pub const DOUBLE: u8 = b'N';
    pub const BIGINT: u8 = b'Z';
    pub const UTF8_STRING: u8 = b'S';
    pub const ONE_BYTE_STRING: u8 = b'"';
    pub const TWO_BYTE_STRING: u8 = b'c';
    pub const OBJECT_REFERENCE: u8 = b'^';
    pub const BEGIN_OBJECT: u8 = b'o';
    pub const END_OBJECT: u8 = b'{';
    pub const BEGIN_SPARSE_ARRAY: u8 = b'a';
    pub const END_SPARSE_ARRAY: u8 = b'@';
    pub const BEGIN_DENSE_ARRAY: u8 = b'A';
    pub const END_DENSE_ARRAY: u8 = b'$';
    pub const DATE: u8 = b'D';
    pub const TRUE_OBJECT: u8 = b'y';
    pub const FALSE_OBJECT: u8 = b'x';
    pub const NUMBER_OBJECT: u8 = b'n';
    pub const BIGINT_OBJECT: u8 = b'z';
    pub const STRING_OBJECT: u8 = b's';
    pub const REGEXP: u8 = b'R';
    pub const BEGIN_MAP: u8 = b';';
    pub const END_MAP: u8 = b':';
    pub const BEGIN_SET: u8 = b'\'';
    pub const END_SET: u8 = b',';
    pub const ARRAY_BUFFER: u8 = b'B';
    pub const ARRAY_BUFFER_VIEW: u8 = b'V';
    pub const ERROR: u8 = b'r';
    pub const HOST_OBJECT: u8 = b'\\';
    pub const THE_HOLE: u8 = b'-';
    pub const VERIFY_OBJECT_COUNT: u8 = b'?';
}

mod error_tag {
    pub const EVAL_PROTOTYPE: u8 = b'E';
    pub const RANGE_PROTOTYPE: u8 = b'R';
    pub const REFERENCE_PROTOTYPE: u8 = b'F';
    pub const SYNTAX_PROTOTYPE: u8 = b'S';
    pub const TYPE_PROTOTYPE: u8 = b'T';
    pub const URI_PROTOTYPE: u8 = b'U';
    pub const MESSAGE: u8 = b'm';
    pub const CAUSE: u8 = b'c';
    pub const STACK: u8 = b's';
    pub const END: u8 = b'.';
}

/// Embedder hook for the host-object tag.
pub trait HostObjectDelegate {
    fn read_host_object(&mut self, reader: &mut ByteReader<'_>) -> DecodeResult<HostObject>;
}

/// Delegate for streams that must not contain host objects.
pub struct NoHostObjects;

impl HostObjectDelegate for NoHostObjects {
    fn read_host_object(&mut self, reader: &mut ByteReader<'_>) -> DecodeResult<HostObject> {
        let tag = reader.peek_u8().unwrap_or(0);
        Err(reader.error(DecodeErrorKind::UnsupportedHostObject(tag)))
    }
}

enum Slot {
    /// Leaf object whose payload is still being read
    Reserved,
    /// Container, emitted inline at first appearance
    Container,
    Leaf(JsValue),
}

pub struct V8Deserializer<'a, D: HostObjectDelegate> {
    reader: ByteReader<'a>,
    delegate: D,
    objects: Vec<Slot>,
    version: u32,
    depth: usize,
    max_depth: usize,
}

impl<'a, D: HostObjectDelegate> V8Deserializer<'a, D> {
    pub fn new(data: &'a [u8], delegate: D) -> Self {
        Self {
            reader: ByteReader::new(data),
            delegate,
            objects: Vec::new(),
            version: 0,
            depth: 0,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Stream format version, known after `read_header`.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Read the optional `0xFF <version>` header.
    pub fn read_header(&mut self) -> DecodeResult<u32> {
        if self.reader.peek_u8() == Some(VERSION_TAG) {
            self.reader.read_u8()?;
            self.version = self.reader.read_varint_u32()?;
        }
        Ok(self.version)
    }

    /// Decode the header and the root value. Trailing bytes are ignored.
    pub fn read_value(mut self) -> DecodeResult<JsValue> {
        self.read_header()?;
        self.read_object()
    }

    fn read_object(&mut self) -> DecodeResult<JsValue> {
        if self.depth >= self.max_depth {
            return Err(self
                .reader
                .error(DecodeErrorKind::DepthExceeded(self.max_depth)));
        }
        self.depth += 1;
        let result = self.read_object_inner();
        self.depth -= 1;
        result
    }

    fn read_object_inner(&mut self) -> DecodeResult<JsValue> {
        let mut tag = self.reader.read_tag()?;
        while tag == tag::VERIFY_OBJECT_COUNT {
            self.reader.read_varint()?;
            tag = self.reader.read_tag()?;
        }
        match tag {
            tag::UNDEFINED => Ok(JsValue::Undefined),
            tag::NULL => Ok(JsValue::Null),
            tag::TRUE => Ok(JsValue::Bool(true)),
            tag::FALSE => Ok(JsValue::Bool(false)),
            tag::THE_HOLE => Ok(JsValue::Hole),
            tag::INT32 => Ok(JsValue::Int32(self.reader.read_zigzag_i32()?)),
            tag::UINT32 => Ok(JsValue::Uint32(self.reader.read_varint_u32()?)),
            tag::DOUBLE => Ok(JsValue::Double(self.reader.read_f64()?)),
            tag::BIGINT => Ok(JsValue::BigInt(self.read_bigint()?)),
            tag::UTF8_STRING => Ok(JsValue::Utf8String(self.read_utf8()?)),
            tag::ONE_BYTE_STRING => Ok(JsValue::Utf8String(self.read_latin1()?)),
            tag::TWO_BYTE_STRING => Ok(JsValue::Utf16String(self.read_two_byte()?)),
            tag::OBJECT_REFERENCE => self.read_back_reference(),
            tag::BEGIN_OBJECT => self.read_js_object(),
            tag::BEGIN_SPARSE_ARRAY => self.read_sparse_array(),
            tag::BEGIN_DENSE_ARRAY => self.read_dense_array(),
            tag::BEGIN_MAP => self.read_map(),
            tag::BEGIN_SET => self.read_set(),
            tag::ERROR => self.read_error(),
            tag::DATE => self.read_leaf(|d| Ok(JsValue::Date(d.reader.read_f64()?))),
            tag::TRUE_OBJECT => self.read_leaf(|_| Ok(wrap(JsValue::Bool(true)))),
            tag::FALSE_OBJECT => self.read_leaf(|_| Ok(wrap(JsValue::Bool(false)))),
            tag::NUMBER_OBJECT => {
                self.read_leaf(|d| Ok(wrap(JsValue::Double(d.reader.read_f64()?))))
            }
            tag::BIGINT_OBJECT => self.read_leaf(|d| Ok(wrap(JsValue::BigInt(d.read_bigint()?)))),
            tag::STRING_OBJECT => self.read_leaf(|d| {
                let s = d.read_string_value()?;
                Ok(wrap(s))
            }),
            tag::REGEXP => self.read_leaf(|d| {
                let pattern = d.read_string()?;
                let flags = d.reader.read_varint_u32()?;
                Ok(JsValue::RegExp { pattern, flags })
            }),
            tag::ARRAY_BUFFER => self.read_array_buffer(),
            tag::HOST_OBJECT => self.read_leaf(|d| {
                let host = d.delegate.read_host_object(&mut d.reader)?;
                Ok(JsValue::HostObject(host))
            }),
            other => Err(self.reader.error(DecodeErrorKind::UnknownTag(other))),
        }
    }

    fn allocate(&mut self, slot: Slot) -> ObjectId {
        self.objects.push(slot);
        (self.objects.len() - 1) as ObjectId
    }

    /// Reserve an id, read the payload, then store it for later references.
    fn read_leaf<F>(&mut self, read: F) -> DecodeResult<JsValue>
    where
        F: FnOnce(&mut Self) -> DecodeResult<JsValue>,
    {
        let id = self.allocate(Slot::Reserved);
        let value = read(self)?;
        self.objects[id as usize] = Slot::Leaf(value.clone());
        Ok(value)
    }

    fn read_back_reference(&mut self) -> DecodeResult<JsValue> {
        let raw = self.reader.read_varint()?;
        let slot = usize::try_from(raw)
            .ok()
            .and_then(|i| self.objects.get(i));
        match slot {
            Some(Slot::Container) => Ok(JsValue::BackReference(raw as ObjectId)),
            Some(Slot::Leaf(value)) => Ok(value.clone()),
            Some(Slot::Reserved) => Err(self
                .reader
                .error(DecodeErrorKind::UnresolvedBackReference(raw as u32))),
            None => Err(self.reader.error(DecodeErrorKind::BackReferenceOutOfRange {
                id: raw,
                allocated: self.objects.len(),
            })),
        }
    }

    fn read_js_object(&mut self) -> DecodeResult<JsValue> {
        let id = self.allocate(Slot::Container);
        let properties = self.read_properties(tag::END_OBJECT)?;
        self.check_count(properties.len() as u64)?;
        Ok(JsValue::Object(JsObject { id, properties }))
    }

    fn read_sparse_array(&mut self) -> DecodeResult<JsValue> {
        let length = self.reader.read_varint_u32()?;
        let id = self.allocate(Slot::Container);
        let properties = self.read_properties(tag::END_SPARSE_ARRAY)?;
        self.check_count(properties.len() as u64)?;
        self.reader.read_varint()?;
        Ok(JsValue::Array(JsArray {
            id,
            length,
            elements: Vec::new(),
            properties,
            dense: false,
        }))
    }

    fn read_dense_array(&mut self) -> DecodeResult<JsValue> {
        let length = self.reader.read_varint_u32()?;
        let id = self.allocate(Slot::Container);
        let mut elements = Vec::with_capacity((length as usize).min(self.reader.remaining()));
        for _ in 0..length {
            elements.push(self.read_object()?);
        }
        let properties = self.read_properties(tag::END_DENSE_ARRAY)?;
        self.check_count(properties.len() as u64)?;
        self.reader.read_varint()?;
        Ok(JsValue::Array(JsArray {
            id,
            length,
            elements,
            properties,
            dense: true,
        }))
    }

    fn read_map(&mut self) -> DecodeResult<JsValue> {
        let id = self.allocate(Slot::Container);
        let mut entries = Vec::new();
        while self.reader.peek_tag() != Some(tag::END_MAP) {
            if self.reader.is_at_end() {
                return Err(self.reader.error(DecodeErrorKind::UnexpectedEnd));
            }
            let key = self.read_object()?;
            let value = self.read_object()?;
            entries.push((key, value));
        }
        self.reader.read_tag()?;
        // Count covers keys and values
        self.check_count(entries.len() as u64 * 2)?;
        Ok(JsValue::Map(JsMap { id, entries }))
    }

    fn read_set(&mut self) -> DecodeResult<JsValue> {
        let id = self.allocate(Slot::Container);
        let mut values = Vec::new();
        while self.reader.peek_tag() != Some(tag::END_SET) {
            if self.reader.is_at_end() {
                return Err(self.reader.error(DecodeErrorKind::UnexpectedEnd));
            }
            values.push(self.read_object()?);
        }
        self.reader.read_tag()?;
        self.check_count(values.len() as u64)?;
        Ok(JsValue::Set(JsSet { id, values }))
    }

    fn read_error(&mut self) -> DecodeResult<JsValue> {
        let id = self.allocate(Slot::Container);
        let mut error = JsError {
            id,
            name: "Error".to_string(),
            message: None,
            stack: None,
            cause: None,
        };
        loop {
            let sub = self.reader.read_tag()?;
            match sub {
                error_tag::EVAL_PROTOTYPE => error.name = "EvalError".into(),
                error_tag::RANGE_PROTOTYPE => error.name = "RangeError".into(),
                error_tag::REFERENCE_PROTOTYPE => error.name = "ReferenceError".into(),
                error_tag::SYNTAX_PROTOTYPE => error.name = "SyntaxError".into(),
                error_tag::TYPE_PROTOTYPE => error.name = "TypeError".into(),
                error_tag::URI_PROTOTYPE => error.name = "URIError".into(),
                error_tag::MESSAGE => error.message = Some(self.read_string()?),
                error_tag::STACK => error.stack = Some(self.read_string()?),
                error_tag::CAUSE => error.cause = Some(Box::new(self.read_object()?)),
                error_tag::END => break,
                other => return Err(self.reader.error(DecodeErrorKind::UnknownTag(other))),
            }
        }
        Ok(JsValue::Error(error))
    }

    fn read_array_buffer(&mut self) -> DecodeResult<JsValue> {
        let buffer = self.read_leaf(|d| {
            let len = d.reader.read_length()?;
            Ok(JsValue::ArrayBuffer(d.reader.read_bytes(len)?.to_vec()))
        })?;

        if self.reader.peek_tag() != Some(tag::ARRAY_BUFFER_VIEW) {
            return Ok(buffer);
        }
        self.reader.read_tag()?;

        let bytes = match buffer {
            JsValue::ArrayBuffer(bytes) => bytes,
            _ => Vec::new(),
        };
        let version = self.version;
        self.read_leaf(move |d| {
            let kind = d.reader.read_tag()?;
            let byte_offset = d.reader.read_varint()?;
            let byte_length = d.reader.read_varint()?;
            if version >= VIEW_FLAGS_MIN_VERSION {
                d.reader.read_varint()?;
            }
            Ok(JsValue::ArrayBufferView(JsArrayBufferView {
                kind,
                byte_offset,
                byte_length,
                buffer: bytes,
            }))
        })
    }

    /// Key/value pairs until `end_tag`, which is consumed.
    fn read_properties(&mut self, end_tag: u8) -> DecodeResult<Vec<(String, JsValue)>> {
        let mut properties = Vec::new();
        loop {
            match self.reader.peek_tag() {
                Some(t) if t == end_tag => {
                    self.reader.read_tag()?;
                    return Ok(properties);
                }
                Some(_) => {}
                None => return Err(self.reader.error(DecodeErrorKind::UnexpectedEnd)),
            }
            let key = self.read_object()?;
            let key = property_key(&key)
                .ok_or_else(|| self.reader.error(DecodeErrorKind::InvalidPropertyKey))?;
            let value = self.read_object()?;
            properties.push((key, value));
        }
    }

    fn check_count(&mut self, actual: u64) -> DecodeResult<()> {
        let expected = self.reader.read_varint()?;
        if expected != actual {
            return Err(self
                .reader
                .error(DecodeErrorKind::CountMismatch { expected, actual }));
        }
        Ok(())
    }

    fn read_string_value(&mut self) -> DecodeResult<JsValue> {
        let value = self.read_object()?;
        if value.is_string() {
            Ok(value)
        } else {
            Err(self.reader.error(DecodeErrorKind::ExpectedString))
        }
    }

    fn read_string(&mut self) -> DecodeResult<String> {
        match self.read_string_value()? {
            JsValue::Utf8String(s) | JsValue::Utf16String(s) => Ok(s),
            _ => Err(self.reader.error(DecodeErrorKind::ExpectedString)),
        }
    }

    fn read_utf8(&mut self) -> DecodeResult<String> {
        let len = self.reader.read_length()?;
        let bytes = self.reader.read_bytes(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    fn read_latin1(&mut self) -> DecodeResult<String> {
        let len = self.reader.read_length()?;
        let bytes = self.reader.read_bytes(len)?;
        Ok(bytes.iter().map(|&b| b as char).collect())
    }

    fn read_two_byte(&mut self) -> DecodeResult<String> {
        let len = self.reader.read_length()?;
        if len % 2 != 0 {
            return Err(self.reader.error(DecodeErrorKind::InvalidLength(len as u64)));
        }
        let bytes = self.reader.read_bytes(len)?;
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        Ok(String::from_utf16_lossy(&units))
    }

    fn read_bigint(&mut self) -> DecodeResult<JsBigInt> {
        let bitfield = self.reader.read_varint()?;
        let negative = bitfield & 1 == 1;
        let len = usize::try_from(bitfield >> 1).unwrap_or(usize::MAX);
        let digits = self.reader.read_bytes(len)?.to_vec();
        Ok(JsBigInt { negative, digits })
    }
}

fn wrap(value: JsValue) -> JsValue {
    JsValue::Wrapper(Box::new(value))
}

/// Property keys are strings or numbers; numbers use their JS string form.
fn property_key(key: &JsValue) -> Option<String> {
    match key {
        JsValue::Utf8String(s) | JsValue::Utf16String(s) => Some(s.clone()),
        JsValue::Int32(i) => Some(i.to_string()),
        JsValue::Uint32(u) => Some(u.to_string()),
        JsValue::Double(d) if d.fract() == 0.0 && d.is_finite() => Some(format!("{}", *d as i64)),
        JsValue::Double(d) => Some(d.to_string()),
        _ => None,
    }
}

/// Decode a bare V8 stream (no IndexedDB envelope, no host objects).
pub fn deserialize(data: &[u8]) -> DecodeResult<JsValue> {
    V8Deserializer::new(data, NoHostObjects).read_value()
}
