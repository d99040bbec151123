//! PackStream — the self-describing binary value format underneath every
//! Bolt message.
//!
//! A value is tagged by a one-byte marker. Most markers also carry a length
//! (tiny string/list/map/structure) so the decoder never needs to look past
//! the marker plus its encoded length to know how much to consume.
//!
//! Encoding always picks the smallest marker that fits — this is what makes
//! `decode(encode(v)) == v` and round-tripping deterministic for a given
//! map key insertion order.

use thiserror::Error;

/// Default cap on structure/list/map nesting. A decoder that didn't bound
/// this could be driven to a stack overflow by a few bytes of adversarial
/// input (an extended-length structure marker nested in itself).
pub const DEFAULT_MAX_NESTING_DEPTH: usize = 128;

/// A PackStream value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(Map),
    Structure { signature: u8, fields: Vec<Value> },
}

impl Value {
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l.as_slice()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<Vec<Value>> for Value {
    fn from(l: Vec<Value>) -> Self {
        Value::List(l)
    }
}

impl From<Map> for Value {
    fn from(m: Map) -> Self {
        Value::Map(m)
    }
}

/// A PackStream map: string keys, insertion order preserved.
///
/// Order matters here for two reasons: encoding is order-sensitive (tests
/// compare serialized bytes), and Bolt servers may rely on map order for
/// things like query parameter echoing in error messages. Duplicate keys
/// are rejected by [`Map::insert`] — the encode-time policy — while
/// [`Map::insert_decoded`], used only by the decoder, resolves duplicates
/// last-wins per the Bolt spec's silence on the matter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Map(Vec<(String, Value)>);

impl Map {
    pub fn new() -> Self {
        Map(Vec::new())
    }

    /// Insert a key, rejecting duplicates. This is the only way to build a
    /// `Map` destined for encoding — it's what guarantees the encoder never
    /// has to make a policy decision about duplicate keys.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Result<(), PackStreamError> {
        let key = key.into();
        if self.0.iter().any(|(k, _)| *k == key) {
            return Err(PackStreamError::DuplicateKey(key));
        }
        self.0.push((key, value));
        Ok(())
    }

    /// Insert a key, overwriting any existing value in place. Used by the
    /// decoder, where the wire format doesn't forbid duplicate keys and the
    /// spec fixes the policy as last-wins.
    pub(crate) fn insert_decoded(&mut self, key: String, value: Value) {
        if let Some(entry) = self.0.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.0.push((key, value));
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, Value)> {
        self.0.iter()
    }
}

impl FromIterator<(String, Value)> for Map {
    /// Builds a map keeping the last value for any repeated key, mirroring
    /// [`Map::insert_decoded`]. Handy for building literal maps in tests
    /// without threading `Result`s through `insert`.
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut map = Map::new();
        for (k, v) in iter {
            map.insert_decoded(k, v);
        }
        map
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PackStreamError {
    #[error("unknown marker byte: 0x{0:02x}")]
    UnknownMarker(u8),

    #[error("unexpected end of input while decoding")]
    UnexpectedEof,

    #[error("map key must be a string")]
    NonStringKey,

    #[error("string is not valid UTF-8")]
    InvalidUtf8,

    #[error("nesting depth exceeds maximum {0}")]
    NestingTooDeep(usize),

    #[error("duplicate map key on encode: {0:?}")]
    DuplicateKey(String),
}

// ── Markers ───────────────────────────────────────────────────────────────────

mod marker {
    pub const TINY_INT_MAX: u8 = 0x7F;
    pub const TINY_STRING: u8 = 0x80;
    pub const TINY_LIST: u8 = 0x90;
    pub const TINY_MAP: u8 = 0xA0;
    pub const TINY_STRUCTURE: u8 = 0xB0;
    pub const NULL: u8 = 0xC0;
    pub const FLOAT_64: u8 = 0xC1;
    pub const FALSE: u8 = 0xC2;
    pub const TRUE: u8 = 0xC3;
    pub const INT_8: u8 = 0xC8;
    pub const INT_16: u8 = 0xC9;
    pub const INT_32: u8 = 0xCA;
    pub const INT_64: u8 = 0xCB;
    pub const STRING_8: u8 = 0xD0;
    pub const STRING_16: u8 = 0xD1;
    pub const STRING_32: u8 = 0xD2;
    pub const LIST_8: u8 = 0xD4;
    pub const LIST_16: u8 = 0xD5;
    pub const LIST_32: u8 = 0xD6;
    pub const MAP_8: u8 = 0xD8;
    pub const MAP_16: u8 = 0xD9;
    pub const MAP_32: u8 = 0xDA;
    pub const STRUCTURE_8: u8 = 0xDC;
    pub const STRUCTURE_16: u8 = 0xDD;
    pub const TINY_NEGATIVE_MIN: u8 = 0xF0;

    /// Bolt v1 never puts a Bytes value on the wire in any message field,
    /// so it reserves no marker for one. These codepoints sit in a gap v1
    /// never assigns (later Bolt revisions use the same three codepoints
    /// for their Bytes type) — borrowed here purely so this codec's own
    /// `decode(encode(v)) == v` law holds for every `Value` variant, not
    /// just the ones real v1 messages happen to use.
    pub const BYTES_8: u8 = 0xCC;
    pub const BYTES_16: u8 = 0xCD;
    pub const BYTES_32: u8 = 0xCE;
}

// ── Encoding ──────────────────────────────────────────────────────────────────

/// Serialize a value, appending to `out`. Infallible: a [`Map`] can only be
/// built without duplicate keys, so there is nothing left for encoding to
/// reject.
pub fn encode(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Null => out.push(marker::NULL),
        Value::Boolean(false) => out.push(marker::FALSE),
        Value::Boolean(true) => out.push(marker::TRUE),
        Value::Integer(i) => encode_integer(*i, out),
        Value::Float(f) => {
            out.push(marker::FLOAT_64);
            out.extend_from_slice(&f.to_be_bytes());
        }
        Value::String(s) => encode_string(s, out),
        Value::Bytes(bytes) => encode_bytes(bytes, out),
        Value::List(items) => encode_list(items, out),
        Value::Map(map) => encode_map(map, out),
        Value::Structure { signature, fields } => encode_structure(*signature, fields, out),
    }
}

fn encode_bytes(bytes: &[u8], out: &mut Vec<u8>) {
    let len = bytes.len();
    if let Ok(len8) = u8::try_from(len) {
        out.push(marker::BYTES_8);
        out.push(len8);
    } else if let Ok(len16) = u16::try_from(len) {
        out.push(marker::BYTES_16);
        out.extend_from_slice(&len16.to_be_bytes());
    } else {
        out.push(marker::BYTES_32);
        out.extend_from_slice(&(len as u32).to_be_bytes());
    }
    out.extend_from_slice(bytes);
}

fn encode_integer(i: i64, out: &mut Vec<u8>) {
    if (-16..=(marker::TINY_INT_MAX as i64)).contains(&i) {
        out.push(i as u8);
    } else if let Ok(i8v) = i8::try_from(i) {
        out.push(marker::INT_8);
        out.push(i8v as u8);
    } else if let Ok(i16v) = i16::try_from(i) {
        out.push(marker::INT_16);
        out.extend_from_slice(&i16v.to_be_bytes());
    } else if let Ok(i32v) = i32::try_from(i) {
        out.push(marker::INT_32);
        out.extend_from_slice(&i32v.to_be_bytes());
    } else {
        out.push(marker::INT_64);
        out.extend_from_slice(&i.to_be_bytes());
    }
}

fn encode_string(s: &str, out: &mut Vec<u8>) {
    let bytes = s.as_bytes();
    let len = bytes.len();
    if len <= 0x0F {
        out.push(marker::TINY_STRING | (len as u8));
    } else if let Ok(len8) = u8::try_from(len) {
        out.push(marker::STRING_8);
        out.push(len8);
    } else if let Ok(len16) = u16::try_from(len) {
        out.push(marker::STRING_16);
        out.extend_from_slice(&len16.to_be_bytes());
    } else {
        out.push(marker::STRING_32);
        out.extend_from_slice(&(len as u32).to_be_bytes());
    }
    out.extend_from_slice(bytes);
}

fn encode_list(items: &[Value], out: &mut Vec<u8>) {
    let len = items.len();
    if len <= 0x0F {
        out.push(marker::TINY_LIST | (len as u8));
    } else if let Ok(len8) = u8::try_from(len) {
        out.push(marker::LIST_8);
        out.push(len8);
    } else if let Ok(len16) = u16::try_from(len) {
        out.push(marker::LIST_16);
        out.extend_from_slice(&len16.to_be_bytes());
    } else {
        out.push(marker::LIST_32);
        out.extend_from_slice(&(len as u32).to_be_bytes());
    }
    for item in items {
        encode(item, out);
    }
}

fn encode_map(map: &Map, out: &mut Vec<u8>) {
    let len = map.len();
    if len <= 0x0F {
        out.push(marker::TINY_MAP | (len as u8));
    } else if let Ok(len8) = u8::try_from(len) {
        out.push(marker::MAP_8);
        out.push(len8);
    } else if let Ok(len16) = u16::try_from(len) {
        out.push(marker::MAP_16);
        out.extend_from_slice(&len16.to_be_bytes());
    } else {
        out.push(marker::MAP_32);
        out.extend_from_slice(&(len as u32).to_be_bytes());
    }
    for (key, value) in map.iter() {
        encode_string(key, out);
        encode(value, out);
    }
}

fn encode_structure(signature: u8, fields: &[Value], out: &mut Vec<u8>) {
    let len = fields.len();
    if len <= 0x0F {
        out.push(marker::TINY_STRUCTURE | (len as u8));
    } else if let Ok(len8) = u8::try_from(len) {
        out.push(marker::STRUCTURE_8);
        out.push(len8);
    } else {
        out.push(marker::STRUCTURE_16);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    }
    out.push(signature);
    for field in fields {
        encode(field, out);
    }
}

// ── Decoding ──────────────────────────────────────────────────────────────────

/// Decode exactly one value from the front of `bytes`, returning the value
/// and the number of bytes consumed.
pub fn decode(bytes: &[u8]) -> Result<(Value, usize), PackStreamError> {
    decode_with_depth(bytes, DEFAULT_MAX_NESTING_DEPTH)
}

pub fn decode_with_depth(
    bytes: &[u8],
    max_nesting_depth: usize,
) -> Result<(Value, usize), PackStreamError> {
    let mut cursor = Cursor { bytes, pos: 0 };
    let value = decode_value(&mut cursor, max_nesting_depth, 0)?;
    Ok((value, cursor.pos))
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take_byte(&mut self) -> Result<u8, PackStreamError> {
        let b = *self
            .bytes
            .get(self.pos)
            .ok_or(PackStreamError::UnexpectedEof)?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], PackStreamError> {
        let end = self.pos.checked_add(n).ok_or(PackStreamError::UnexpectedEof)?;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or(PackStreamError::UnexpectedEof)?;
        self.pos = end;
        Ok(slice)
    }
}

fn decode_value(
    cursor: &mut Cursor,
    max_depth: usize,
    depth: usize,
) -> Result<Value, PackStreamError> {
    if depth > max_depth {
        return Err(PackStreamError::NestingTooDeep(max_depth));
    }

    let m = cursor.take_byte()?;
    match m {
        0x00..=marker::TINY_INT_MAX => Ok(Value::Integer(m as i64)),
        marker::TINY_NEGATIVE_MIN..=0xFF => Ok(Value::Integer((m as i8) as i64)),
        marker::NULL => Ok(Value::Null),
        marker::FALSE => Ok(Value::Boolean(false)),
        marker::TRUE => Ok(Value::Boolean(true)),
        marker::FLOAT_64 => {
            let bytes = cursor.take(8)?;
            let arr: [u8; 8] = bytes.try_into().expect("took exactly 8 bytes");
            Ok(Value::Float(f64::from_be_bytes(arr)))
        }
        marker::INT_8 => {
            let b = cursor.take_byte()?;
            Ok(Value::Integer((b as i8) as i64))
        }
        marker::INT_16 => {
            let bytes = cursor.take(2)?;
            let arr: [u8; 2] = bytes.try_into().expect("took exactly 2 bytes");
            Ok(Value::Integer(i16::from_be_bytes(arr) as i64))
        }
        marker::INT_32 => {
            let bytes = cursor.take(4)?;
            let arr: [u8; 4] = bytes.try_into().expect("took exactly 4 bytes");
            Ok(Value::Integer(i32::from_be_bytes(arr) as i64))
        }
        marker::INT_64 => {
            let bytes = cursor.take(8)?;
            let arr: [u8; 8] = bytes.try_into().expect("took exactly 8 bytes");
            Ok(Value::Integer(i64::from_be_bytes(arr)))
        }
        _ if (marker::TINY_STRING..marker::TINY_LIST).contains(&m) => {
            let len = (m & 0x0F) as usize;
            decode_string_body(cursor, len)
        }
        marker::STRING_8 => {
            let len = cursor.take_byte()? as usize;
            decode_string_body(cursor, len)
        }
        marker::STRING_16 => {
            let len = decode_u16(cursor)? as usize;
            decode_string_body(cursor, len)
        }
        marker::STRING_32 => {
            let len = decode_u32(cursor)? as usize;
            decode_string_body(cursor, len)
        }
        marker::BYTES_8 => {
            let len = cursor.take_byte()? as usize;
            decode_bytes_body(cursor, len)
        }
        marker::BYTES_16 => {
            let len = decode_u16(cursor)? as usize;
            decode_bytes_body(cursor, len)
        }
        marker::BYTES_32 => {
            let len = decode_u32(cursor)? as usize;
            decode_bytes_body(cursor, len)
        }
        _ if (marker::TINY_LIST..marker::TINY_MAP).contains(&m) => {
            let len = (m & 0x0F) as usize;
            decode_list_body(cursor, len, max_depth, depth)
        }
        marker::LIST_8 => {
            let len = cursor.take_byte()? as usize;
            decode_list_body(cursor, len, max_depth, depth)
        }
        marker::LIST_16 => {
            let len = decode_u16(cursor)? as usize;
            decode_list_body(cursor, len, max_depth, depth)
        }
        marker::LIST_32 => {
            let len = decode_u32(cursor)? as usize;
            decode_list_body(cursor, len, max_depth, depth)
        }
        _ if (marker::TINY_MAP..marker::TINY_STRUCTURE).contains(&m) => {
            let len = (m & 0x0F) as usize;
            decode_map_body(cursor, len, max_depth, depth)
        }
        marker::MAP_8 => {
            let len = cursor.take_byte()? as usize;
            decode_map_body(cursor, len, max_depth, depth)
        }
        marker::MAP_16 => {
            let len = decode_u16(cursor)? as usize;
            decode_map_body(cursor, len, max_depth, depth)
        }
        marker::MAP_32 => {
            let len = decode_u32(cursor)? as usize;
            decode_map_body(cursor, len, max_depth, depth)
        }
        _ if (marker::TINY_STRUCTURE..marker::NULL).contains(&m) => {
            let len = (m & 0x0F) as usize;
            decode_structure_body(cursor, len, max_depth, depth)
        }
        marker::STRUCTURE_8 => {
            let len = cursor.take_byte()? as usize;
            decode_structure_body(cursor, len, max_depth, depth)
        }
        marker::STRUCTURE_16 => {
            let len = decode_u16(cursor)? as usize;
            decode_structure_body(cursor, len, max_depth, depth)
        }
        other => Err(PackStreamError::UnknownMarker(other)),
    }
}

fn decode_u16(cursor: &mut Cursor) -> Result<u16, PackStreamError> {
    let bytes = cursor.take(2)?;
    Ok(u16::from_be_bytes(bytes.try_into().expect("took exactly 2 bytes")))
}

fn decode_u32(cursor: &mut Cursor) -> Result<u32, PackStreamError> {
    let bytes = cursor.take(4)?;
    Ok(u32::from_be_bytes(bytes.try_into().expect("took exactly 4 bytes")))
}

fn decode_string_body(cursor: &mut Cursor, len: usize) -> Result<Value, PackStreamError> {
    let bytes = cursor.take(len)?;
    let s = std::str::from_utf8(bytes)
        .map_err(|_| PackStreamError::InvalidUtf8)?
        .to_owned();
    Ok(Value::String(s))
}

fn decode_bytes_body(cursor: &mut Cursor, len: usize) -> Result<Value, PackStreamError> {
    let bytes = cursor.take(len)?;
    Ok(Value::Bytes(bytes.to_vec()))
}

fn decode_list_body(
    cursor: &mut Cursor,
    len: usize,
    max_depth: usize,
    depth: usize,
) -> Result<Value, PackStreamError> {
    let mut items = Vec::with_capacity(len.min(4096));
    for _ in 0..len {
        items.push(decode_value(cursor, max_depth, depth + 1)?);
    }
    Ok(Value::List(items))
}

fn decode_map_body(
    cursor: &mut Cursor,
    entries: usize,
    max_depth: usize,
    depth: usize,
) -> Result<Value, PackStreamError> {
    let mut map = Map::new();
    for _ in 0..entries {
        let key_value = decode_value(cursor, max_depth, depth + 1)?;
        let key = match key_value {
            Value::String(s) => s,
            _ => return Err(PackStreamError::NonStringKey),
        };
        let value = decode_value(cursor, max_depth, depth + 1)?;
        map.insert_decoded(key, value);
    }
    Ok(Value::Map(map))
}

fn decode_structure_body(
    cursor: &mut Cursor,
    field_count: usize,
    max_depth: usize,
    depth: usize,
) -> Result<Value, PackStreamError> {
    let signature = cursor.take_byte()?;
    let mut fields = Vec::with_capacity(field_count.min(4096));
    for _ in 0..field_count {
        fields.push(decode_value(cursor, max_depth, depth + 1)?);
    }
    Ok(Value::Structure { signature, fields })
}
