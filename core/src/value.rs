use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Cursor, Write};
use std::sync::{Arc, Mutex};

use crate::error::CoercionError;

/// A dynamically typed argument value: schema defaults, choice entries and
/// decoded form fields all use it.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// An uploaded file.
    File(InputFile),
    /// A writable buffer for a `file-out` destination.
    Sink(OutputSink),
    /// Extra response headers the wrapped program may append to.
    Headers(ResponseHeaders),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// Python-style truthiness, used to decide whether a default is worth
    /// pre-filling into an input.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Text(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
            Value::File(_) | Value::Sink(_) | Value::Headers(_) => true,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view used by range detection.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_file(&self) -> Option<&InputFile> {
        match self {
            Value::File(file) => Some(file),
            _ => None,
        }
    }

    pub fn as_sink(&self) -> Option<&OutputSink> {
        match self {
            Value::Sink(sink) => Some(sink),
            _ => None,
        }
    }

    /// String form suitable for an HTML `value` attribute or a command-line
    /// argument. Handles and nested maps have no such form.
    pub fn to_form_string(&self) -> Result<String, CoercionError> {
        match self {
            Value::None => Ok(String::new()),
            Value::Bool(b) => Ok(b.to_string()),
            Value::Int(i) => Ok(i.to_string()),
            Value::Float(f) => Ok(f.to_string()),
            Value::Text(s) => Ok(s.clone()),
            Value::List(items) => {
                let parts = items
                    .iter()
                    .map(Value::to_form_string)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(parts.join(" "))
            }
            other => Err(CoercionError::new(
                other.to_string(),
                "string",
                format!("{} values cannot be written into a form field", other.kind()),
            )),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::File(_) => "file",
            Value::Sink(_) => "sink",
            Value::Headers(_) => "headers",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::File(a), Value::File(b)) => a == b,
            (Value::Sink(a), Value::Sink(b)) => a.same_buffer(b),
            (Value::Headers(a), Value::Headers(b)) => Arc::ptr_eq(&a.0, &b.0),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => f.write_str("None"),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => f.write_str(s),
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(Value::to_string).collect();
                f.write_str(&parts.join(", "))
            }
            Value::Map(map) => {
                let parts: Vec<String> = map.iter().map(|(k, v)| format!("{k}: {v}")).collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
            Value::File(file) => write!(f, "<file {}>", file.name),
            Value::Sink(sink) => write!(f, "<output {}>", sink.name()),
            Value::Headers(_) => f.write_str("<response headers>"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<&serde_json::Value> for Value {
    fn from(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::None,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => Value::Text(s.clone()),
            serde_json::Value::Array(items) => Value::List(items.iter().map(Value::from).collect()),
            serde_json::Value::Object(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from(v)))
                    .collect(),
            ),
        }
    }
}

/// An uploaded file: the client-side name plus its bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct InputFile {
    pub name: String,
    pub content: Arc<[u8]>,
}

impl InputFile {
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        let bytes: Vec<u8> = content.into();
        Self {
            name: name.into(),
            content: Arc::from(bytes),
        }
    }

    pub fn reader(&self) -> Cursor<&[u8]> {
        Cursor::new(&self.content[..])
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.content).into_owned()
    }
}

/// In-memory writable buffer for a `file-out` destination. Clones share the
/// same buffer, so the decoder can keep one handle while the program writes
/// through another.
#[derive(Debug, Clone)]
pub struct OutputSink {
    name: String,
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl OutputSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            buffer: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contents(&self) -> Vec<u8> {
        self.buffer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn same_buffer(&self, other: &OutputSink) -> bool {
        Arc::ptr_eq(&self.buffer, &other.buffer)
    }
}

impl Write for OutputSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Shared list of extra response headers, handed to the program when a
/// destination prefix is configured.
#[derive(Debug, Clone, Default)]
pub struct ResponseHeaders(Arc<Mutex<Vec<(String, String)>>>);

impl ResponseHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, name: impl Into<String>, value: impl Into<String>) {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((name.into(), value.into()));
    }

    pub fn snapshot(&self) -> Vec<(String, String)> {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}
