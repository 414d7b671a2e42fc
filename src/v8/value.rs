//! Decoded V8 value tree
//!
//! Containers (objects, arrays, maps, sets, errors) carry the id they were
//! allocated in the stream. Any later appearance of the same container is a
//! `BackReference(id)`, so shared and cyclic graphs stay an ordinary tree
//! plus integer aliases. `to_json` resolves the aliases into a plain tree:
//! shared containers are expanded in place, and an edge back to an
//! enclosing container becomes `null`.
//!
//! Expansion can multiply the size of a small stream, so resolution is
//! bounded by `ResolveLimits`. Exceeding either limit fails the whole value.

use std::collections::HashMap;

use chrono::DateTime;
use serde_json::{Map, Number, Value};

use super::deserializer::DEFAULT_MAX_DEPTH;
use super::errors::ResolveError;

/// Allocation index of an object-like value within one stream.
pub type ObjectId = u32;

/// Sparse arrays longer than this are rendered as objects keyed by index.
const MAX_SPARSE_EXPANSION: u32 = 1 << 16;

#[derive(Debug, Clone, PartialEq)]
pub enum JsValue {
    Undefined,
    Null,
    /// Array slot that was never assigned
    Hole,
    Bool(bool),
    Int32(i32),
    Uint32(u32),
    Double(f64),
    BigInt(JsBigInt),
    /// Latin-1 or UTF-8 encoded string
    Utf8String(String),
    /// Two-byte string
    Utf16String(String),
    /// Milliseconds since the Unix epoch
    Date(f64),
    /// `new Boolean(..)`, `new Number(..)`, `new String(..)`, `Object(1n)`
    Wrapper(Box<JsValue>),
    RegExp { pattern: String, flags: u32 },
    ArrayBuffer(Vec<u8>),
    ArrayBufferView(JsArrayBufferView),
    Object(JsObject),
    Array(JsArray),
    Map(JsMap),
    Set(JsSet),
    Error(JsError),
    HostObject(HostObject),
    BackReference(ObjectId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsBigInt {
    pub negative: bool,
    /// Magnitude, little-endian
    pub digits: Vec<u8>,
}

impl JsBigInt {
    /// Decimal rendering when the magnitude fits in 128 bits, hex otherwise.
    pub fn to_string_lossless(&self) -> String {
        let significant = self
            .digits
            .iter()
            .rposition(|&b| b != 0)
            .map(|i| i + 1)
            .unwrap_or(0);
        let sign = if self.negative && significant > 0 { "-" } else { "" };
        if significant <= 16 {
            let mut magnitude: u128 = 0;
            for &byte in self.digits[..significant].iter().rev() {
                magnitude = (magnitude << 8) | byte as u128;
            }
            format!("{}{}", sign, magnitude)
        } else {
            let mut be: Vec<u8> = self.digits[..significant].to_vec();
            be.reverse();
            format!("{}0x{}", sign, hex::encode(&be))
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JsArrayBufferView {
    /// V8 view sub-tag (`B` Uint8Array, `d` Float64Array, `?` DataView, ...)
    pub kind: u8,
    pub byte_offset: u64,
    pub byte_length: u64,
    pub buffer: Vec<u8>,
}

impl JsArrayBufferView {
    /// The bytes the view covers, clamped to the buffer.
    pub fn bytes(&self) -> &[u8] {
        let start = (self.byte_offset as usize).min(self.buffer.len());
        let end = start
            .saturating_add(self.byte_length as usize)
            .min(self.buffer.len());
        &self.buffer[start..end]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JsObject {
    pub id: ObjectId,
    pub properties: Vec<(String, JsValue)>,
}

impl JsObject {
    /// Last assignment wins, as in JavaScript.
    pub fn get(&self, key: &str) -> Option<&JsValue> {
        self.properties
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JsArray {
    pub id: ObjectId,
    pub length: u32,
    /// Dense elements; empty for sparse arrays
    pub elements: Vec<JsValue>,
    /// Sparse elements and extra named properties
    pub properties: Vec<(String, JsValue)>,
    pub dense: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JsMap {
    pub id: ObjectId,
    pub entries: Vec<(JsValue, JsValue)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JsSet {
    pub id: ObjectId,
    pub values: Vec<JsValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JsError {
    pub id: ObjectId,
    pub name: String,
    pub message: Option<String>,
    pub stack: Option<String>,
    pub cause: Option<Box<JsValue>>,
}

/// Blink-specific values carried through the V8 host-object hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostObject {
    BlobIndex(u32),
    FileIndex(u32),
    FileListIndex(Vec<u32>),
    Blob {
        uuid: String,
        content_type: String,
        size: u64,
    },
    MessagePort(u32),
}

impl HostObject {
    pub fn kind(&self) -> &'static str {
        match self {
            HostObject::BlobIndex(_) => "BlobIndex",
            HostObject::FileIndex(_) => "FileIndex",
            HostObject::FileListIndex(_) => "FileListIndex",
            HostObject::Blob { .. } => "Blob",
            HostObject::MessagePort(_) => "MessagePort",
        }
    }

    fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert("hostObject".to_string(), Value::from(self.kind()));
        match self {
            HostObject::BlobIndex(i) | HostObject::FileIndex(i) | HostObject::MessagePort(i) => {
                map.insert("index".to_string(), Value::from(*i));
            }
            HostObject::FileListIndex(indexes) => {
                map.insert("indexes".to_string(), Value::from(indexes.clone()));
            }
            HostObject::Blob {
                uuid,
                content_type,
                size,
            } => {
                map.insert("uuid".to_string(), Value::from(uuid.as_str()));
                map.insert("type".to_string(), Value::from(content_type.as_str()));
                map.insert("size".to_string(), Value::from(*size));
            }
        }
        Value::Object(map)
    }
}

impl JsValue {
    /// Id of a container value, `None` for everything else.
    pub fn container_id(&self) -> Option<ObjectId> {
        match self {
            JsValue::Object(o) => Some(o.id),
            JsValue::Array(a) => Some(a.id),
            JsValue::Map(m) => Some(m.id),
            JsValue::Set(s) => Some(s.id),
            JsValue::Error(e) => Some(e.id),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            JsValue::Utf8String(s) | JsValue::Utf16String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_string(&self) -> bool {
        self.as_str().is_some()
    }

    pub fn as_object(&self) -> Option<&JsObject> {
        match self {
            JsValue::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Property lookup on plain objects.
    pub fn get(&self, key: &str) -> Option<&JsValue> {
        self.as_object().and_then(|o| o.get(key))
    }

    /// Convert to a plain JSON tree with the default limits.
    pub fn to_json(&self) -> Result<Value, ResolveError> {
        self.to_json_with_limits(ResolveLimits::default())
    }

    /// Convert to a plain JSON tree, resolving back-references.
    pub fn to_json_with_limits(&self, limits: ResolveLimits) -> Result<Value, ResolveError> {
        Resolver {
            index: ReferenceIndex::build(self),
            ancestors: Vec::new(),
            depth: 0,
            nodes: 0,
            limits,
        }
        .value(self)
    }
}

/// Bounds on the plain tree produced by `to_json`.
///
/// `max_depth` counts nesting in the output, so a shared container expanded
/// under another one adds its own depth. `max_nodes` counts every emitted
/// value, scalars included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveLimits {
    pub max_depth: usize,
    pub max_nodes: usize,
}

pub const DEFAULT_MAX_NODES: usize = 1 << 20;

impl Default for ResolveLimits {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_nodes: DEFAULT_MAX_NODES,
        }
    }
}

/// Container id to the container value, for one decoded tree.
pub struct ReferenceIndex<'a> {
    containers: HashMap<ObjectId, &'a JsValue>,
}

impl<'a> ReferenceIndex<'a> {
    pub fn build(root: &'a JsValue) -> Self {
        let mut containers = HashMap::new();
        let mut stack = vec![root];
        while let Some(value) = stack.pop() {
            if let Some(id) = value.container_id() {
                containers.entry(id).or_insert(value);
            }
            match value {
                JsValue::Object(o) => stack.extend(o.properties.iter().map(|(_, v)| v)),
                JsValue::Array(a) => {
                    stack.extend(a.elements.iter());
                    stack.extend(a.properties.iter().map(|(_, v)| v));
                }
                JsValue::Map(m) => {
                    for (k, v) in &m.entries {
                        stack.push(k);
                        stack.push(v);
                    }
                }
                JsValue::Set(s) => stack.extend(s.values.iter()),
                JsValue::Error(e) => stack.extend(e.cause.as_deref()),
                JsValue::Wrapper(inner) => stack.push(inner),
                _ => {}
            }
        }
        Self { containers }
    }

    pub fn resolve(&self, id: ObjectId) -> Option<&'a JsValue> {
        self.containers.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }
}

/// One `to_json` call: the reference index, the chain of enclosing
/// containers and the budget spent so far.
struct Resolver<'a> {
    index: ReferenceIndex<'a>,
    ancestors: Vec<ObjectId>,
    depth: usize,
    nodes: usize,
    limits: ResolveLimits,
}

impl<'a> Resolver<'a> {
    fn value(&mut self, value: &'a JsValue) -> Result<Value, ResolveError> {
        self.nodes += 1;
        if self.nodes > self.limits.max_nodes {
            return Err(ResolveError::TooManyNodes(self.limits.max_nodes));
        }
        if self.depth >= self.limits.max_depth {
            return Err(ResolveError::DepthExceeded(self.limits.max_depth));
        }

        self.depth += 1;
        let pushed = match value.container_id() {
            Some(id) => {
                self.ancestors.push(id);
                true
            }
            None => false,
        };
        let result = self.value_inner(value);
        if pushed {
            self.ancestors.pop();
        }
        self.depth -= 1;
        result
    }

    fn value_inner(&mut self, value: &'a JsValue) -> Result<Value, ResolveError> {
        let json = match value {
            JsValue::Undefined | JsValue::Null | JsValue::Hole => Value::Null,
            JsValue::Bool(b) => Value::Bool(*b),
            JsValue::Int32(i) => Value::from(*i),
            JsValue::Uint32(u) => Value::from(*u),
            JsValue::Double(d) => number_json(*d),
            JsValue::BigInt(b) => Value::String(b.to_string_lossless()),
            JsValue::Utf8String(s) | JsValue::Utf16String(s) => Value::String(s.clone()),
            JsValue::Date(ms) => date_json(*ms),
            JsValue::Wrapper(inner) => self.value(inner)?,
            JsValue::RegExp { pattern, flags } => {
                Value::String(format!("/{}/{}", pattern, regexp_flags(*flags)))
            }
            JsValue::ArrayBuffer(bytes) => Value::String(hex::encode(bytes)),
            JsValue::ArrayBufferView(view) => Value::String(hex::encode(view.bytes())),
            JsValue::Object(o) => Value::Object(self.properties(&o.properties)?),
            JsValue::Array(a) => self.array(a)?,
            JsValue::Map(m) => self.map(m)?,
            JsValue::Set(s) => Value::Array(
                s.values
                    .iter()
                    .map(|v| self.value(v))
                    .collect::<Result<_, _>>()?,
            ),
            JsValue::Error(e) => {
                let mut map = Map::new();
                map.insert("name".to_string(), Value::from(e.name.as_str()));
                if let Some(message) = &e.message {
                    map.insert("message".to_string(), Value::from(message.as_str()));
                }
                if let Some(stack) = &e.stack {
                    map.insert("stack".to_string(), Value::from(stack.as_str()));
                }
                if let Some(cause) = &e.cause {
                    let cause = self.value(cause)?;
                    map.insert("cause".to_string(), cause);
                }
                Value::Object(map)
            }
            JsValue::HostObject(host) => host.to_json(),
            JsValue::BackReference(id) => {
                if self.ancestors.contains(id) {
                    return Ok(Value::Null);
                }
                match self.index.resolve(*id) {
                    Some(target) => self.value(target)?,
                    None => Value::Null,
                }
            }
        };
        Ok(json)
    }

    fn properties(
        &mut self,
        properties: &'a [(String, JsValue)],
    ) -> Result<Map<String, Value>, ResolveError> {
        let mut map = Map::new();
        for (k, v) in properties {
            let v = self.value(v)?;
            map.insert(k.clone(), v);
        }
        Ok(map)
    }

    fn array(&mut self, a: &'a JsArray) -> Result<Value, ResolveError> {
        if a.dense {
            return Ok(Value::Array(
                a.elements
                    .iter()
                    .map(|v| self.value(v))
                    .collect::<Result<_, _>>()?,
            ));
        }

        if a.length <= MAX_SPARSE_EXPANSION {
            let mut out = vec![Value::Null; a.length as usize];
            for (k, v) in &a.properties {
                if let Ok(i) = k.parse::<usize>() {
                    if i < out.len() {
                        out[i] = self.value(v)?;
                    }
                }
            }
            Ok(Value::Array(out))
        } else {
            Ok(Value::Object(self.properties(&a.properties)?))
        }
    }

    /// String-keyed maps become objects; anything else a list of pairs.
    fn map(&mut self, m: &'a JsMap) -> Result<Value, ResolveError> {
        if m.entries.iter().all(|(k, _)| k.is_string()) {
            let mut map = Map::new();
            for (k, v) in &m.entries {
                if let Some(key) = k.as_str() {
                    let v = self.value(v)?;
                    map.insert(key.to_string(), v);
                }
            }
            Ok(Value::Object(map))
        } else {
            let mut pairs = Vec::with_capacity(m.entries.len());
            for (k, v) in &m.entries {
                let k = self.value(k)?;
                let v = self.value(v)?;
                pairs.push(Value::Array(vec![k, v]));
            }
            Ok(Value::Array(pairs))
        }
    }
}

/// Integral doubles in the safe range render as integers.
pub(crate) fn number_json(d: f64) -> Value {
    const MAX_SAFE: f64 = 9_007_199_254_740_991.0;
    if d.fract() == 0.0 && d.abs() <= MAX_SAFE {
        Value::from(d as i64)
    } else {
        Number::from_f64(d).map(Value::Number).unwrap_or(Value::Null)
    }
}

fn date_json(ms: f64) -> Value {
    if !ms.is_finite() {
        return Value::Null;
    }
    match DateTime::from_timestamp_millis(ms as i64) {
        Some(dt) => Value::String(dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()),
        None => Value::Null,
    }
}

fn regexp_flags(flags: u32) -> String {
    const FLAGS: [(u32, char); 9] = [
        (1, 'g'),
        (2, 'i'),
        (4, 'm'),
        (8, 'y'),
        (16, 'u'),
        (32, 's'),
        (64, 'l'),
        (128, 'd'),
        (256, 'v'),
    ];
    FLAGS
        .iter()
        .filter(|(bit, _)| flags & bit != 0)
        .map(|(_, c)| *c)
        .collect()
}
