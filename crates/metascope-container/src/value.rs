//! Output tree.
//!
//! A [`Node`] is an ordered list of `(key, value)` pairs. Keys may repeat
//! (one `trak` entry per track, one `chunk` per PNG text chunk); when
//! serialized, repeated keys are folded into a single array at the position
//! of their first occurrence so the JSON stays a valid object.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};

/// Keys that describe the walk itself rather than the file.
pub const BOOKKEEPING_KEYS: [&str; 2] = ["error", "warnings"];

/// Reference to an opaque payload: where it is, how big, and its digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ByteRef {
    pub offset: u64,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

impl ByteRef {
    /// Reference `data` found at `offset`, hashing it when `hash` is set.
    pub fn new(data: &[u8], offset: u64, hash: bool) -> Self {
        Self {
            offset,
            size: data.len() as u64,
            sha256: hash.then(|| hex::encode(Sha256::digest(data))),
        }
    }
}

/// A value in the output tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Bytes(ByteRef),
    List(Vec<Value>),
    Map(Node),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt(v) => Some(*v),
            Value::Int(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::UInt(v) => Some(*v as f64),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Node> {
        match self {
            Value::Map(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Convert a typed record into a value through its `Serialize` impl.
    ///
    /// `null` fields are dropped.
    pub fn record<T: Serialize>(record: &T) -> Value {
        match serde_json::to_value(record) {
            Ok(json) => Value::from_json(json).unwrap_or(Value::Map(Node::new())),
            Err(e) => {
                tracing::debug!("record not representable: {}", e);
                Value::Map(Node::new())
            }
        }
    }

    fn from_json(json: serde_json::Value) -> Option<Value> {
        use serde_json::Value as Json;
        Some(match json {
            Json::Null => return None,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => {
                if let Some(u) = n.as_u64() {
                    Value::UInt(u)
                } else if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            Json::String(s) => Value::Str(s),
            Json::Array(items) => Value::List(items.into_iter().filter_map(Value::from_json).collect()),
            Json::Object(map) => {
                let mut node = Node::new();
                for (key, value) in map {
                    if let Some(value) = Value::from_json(value) {
                        node.insert(key, value);
                    }
                }
                Value::Map(node)
            }
        })
    }

    /// Recursive leaf count, skipping bookkeeping keys.
    pub fn leaf_count(&self) -> usize {
        match self {
            Value::List(items) => items.iter().map(Value::leaf_count).sum(),
            Value::Map(node) => node.leaf_count(),
            _ => 1,
        }
    }
}

macro_rules! value_from {
    ($variant:ident: $($ty:ty),*) => {
        $(impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::$variant(v.into())
            }
        })*
    };
}

value_from!(UInt: u8, u16, u32, u64);
value_from!(Int: i8, i16, i32, i64);
value_from!(Float: f32, f64);
value_from!(Str: String, &str);

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::UInt(v as u64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<ByteRef> for Value {
    fn from(v: ByteRef) -> Self {
        Value::Bytes(v)
    }
}

impl From<Node> for Value {
    fn from(v: Node) -> Self {
        Value::Map(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Str(s) => serializer.serialize_str(s),
            Value::Int(v) => serializer.serialize_i64(*v),
            Value::UInt(v) => serializer.serialize_u64(*v),
            Value::Float(v) => serializer.serialize_f64(*v),
            Value::Bool(v) => serializer.serialize_bool(*v),
            Value::Bytes(r) => r.serialize(serializer),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(node) => node.serialize(serializer),
        }
    }
}

/// Ordered mapping that allows duplicate keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Node {
    entries: Vec<(String, Value)>,
}

impl Node {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. Existing entries with the same key are kept.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.push((key.into(), value.into()));
    }

    /// Append only when `value` is `Some`.
    pub fn insert_opt<V: Into<Value>>(&mut self, key: impl Into<String>, value: Option<V>) {
        if let Some(value) = value {
            self.insert(key, value);
        }
    }

    /// Replace the first entry with this key, or append.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// First value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Every value stored under `key`, in insertion order.
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
        self.entries
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Follow a dotted path (`ihdr.width`) through nested maps.
    ///
    /// A numeric segment indexes into a list.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Map(node) => node.get(segment)?,
                Value::List(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Move every entry of `other` to the end of this node.
    pub fn extend(&mut self, other: Node) {
        self.entries.extend(other.entries);
    }

    /// Recursive leaf count, skipping bookkeeping keys.
    pub fn leaf_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|(k, _)| !BOOKKEEPING_KEYS.contains(&k.as_str()))
            .map(|(_, v)| v.leaf_count())
            .sum()
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut keys: Vec<&str> = Vec::with_capacity(self.entries.len());
        for (key, _) in &self.entries {
            if !keys.contains(&key.as_str()) {
                keys.push(key);
            }
        }

        let mut map = serializer.serialize_map(Some(keys.len()))?;
        for key in keys {
            let values: Vec<&Value> = self.get_all(key).collect();
            if values.len() == 1 {
                map.serialize_entry(key, values[0])?;
            } else {
                map.serialize_entry(key, &values)?;
            }
        }
        map.end()
    }
}
