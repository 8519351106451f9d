//! Inverse of the form assembler: posted multipart fields back into typed
//! argument values.
//!
//! Decoding is total. A field that fails coercion gets its type's zero
//! value and the rest of the request proceeds; the only hard failure is a
//! post naming more than one submit action.

use std::collections::BTreeMap;
use std::fmt;

use crate::config::WrapperConfig;
use crate::error::DecodeError;
use crate::schema::{ActionKind, ParameterSpec, Schema, ValueType};
use crate::ticket::TicketRegistry;
use crate::value::{InputFile, OutputSink, ResponseHeaders, Value};
use crate::widget::{Representation, SubmitButton, representation};

/// One part of a `multipart/form-data` body.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldPart {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl FieldPart {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

/// Posted parts in arrival order. Multi-valued fields repeat their name.
#[derive(Debug, Clone, Default)]
pub struct PostedFields {
    parts: Vec<FieldPart>,
}

impl PostedFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, part: FieldPart) {
        self.parts.push(part);
    }

    pub fn with_text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let value: String = value.into();
        self.push(FieldPart {
            name: name.into(),
            filename: None,
            content_type: None,
            data: value.into_bytes(),
        });
        self
    }

    pub fn with_file(
        mut self,
        name: impl Into<String>,
        filename: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        self.push(FieldPart {
            name: name.into(),
            filename: Some(filename.into()),
            content_type: None,
            data: data.into(),
        });
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.parts.iter().any(|part| part.name == name)
    }

    pub fn first(&self, name: &str) -> Option<&FieldPart> {
        self.parts.iter().find(|part| part.name == name)
    }

    pub fn all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a FieldPart> + 'a {
        self.parts.iter().filter(move |part| part.name == name)
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

/// Request metadata exposed to the program under the destination prefix.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
}

impl RequestContext {
    fn to_value(&self) -> Value {
        let mut headers: BTreeMap<String, Value> = BTreeMap::new();
        for (name, value) in &self.headers {
            headers
                .entry(name.to_ascii_lowercase())
                .and_modify(|existing| {
                    if let Value::Text(joined) = existing {
                        joined.push_str(", ");
                        joined.push_str(value);
                    }
                })
                .or_insert_with(|| Value::text(value.as_str()));
        }
        Value::Map(BTreeMap::from([
            ("method".to_string(), Value::text(self.method.as_str())),
            ("path".to_string(), Value::text(self.path.as_str())),
            ("headers".to_string(), Value::Map(headers)),
        ]))
    }
}

/// Typed values keyed by destination, plus the output sinks opened while
/// decoding.
#[derive(Debug, Clone, Default)]
pub struct DecodedArguments {
    values: BTreeMap<String, Value>,
    sinks: BTreeMap<String, OutputSink>,
    response_headers: Option<ResponseHeaders>,
}

impl DecodedArguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, dest: impl Into<String>, value: Value) {
        let dest = dest.into();
        if let Value::Sink(sink) = &value {
            self.sinks.insert(dest.clone(), sink.clone());
        }
        self.values.insert(dest, value);
    }

    pub fn get(&self, dest: &str) -> Option<&Value> {
        self.values.get(dest)
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    pub fn sinks(&self) -> &BTreeMap<String, OutputSink> {
        &self.sinks
    }

    /// Headers the program appended through the prefixed response handle.
    pub fn response_headers(&self) -> Vec<(String, String)> {
        self.response_headers
            .as_ref()
            .map(ResponseHeaders::snapshot)
            .unwrap_or_default()
    }
}

impl fmt::Display for DecodedArguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<String> = self
            .values
            .iter()
            .map(|(dest, value)| format!("{dest}={}", repr(value)))
            .collect();
        write!(f, "Namespace({})", fields.join(", "))
    }
}

fn repr(value: &Value) -> String {
    match value {
        Value::Text(text) => format!("{text:?}"),
        Value::List(items) => {
            let items: Vec<String> = items.iter().map(repr).collect();
            format!("[{}]", items.join(", "))
        }
        other => other.to_string(),
    }
}

#[derive(Debug, Clone)]
pub enum Decoded {
    Arguments(DecodedArguments),
    /// A submit action was posted; the program must not run.
    SubmitAction(SubmitButton),
}

pub struct Decoder<'a> {
    schema: &'a Schema,
    config: &'a WrapperConfig,
    registry: &'a TicketRegistry,
    buttons: &'a [SubmitButton],
}

impl<'a> Decoder<'a> {
    pub fn new(
        schema: &'a Schema,
        config: &'a WrapperConfig,
        registry: &'a TicketRegistry,
        buttons: &'a [SubmitButton],
    ) -> Self {
        Self {
            schema,
            config,
            registry,
            buttons,
        }
    }

    pub fn decode(
        &self,
        fields: &PostedFields,
        context: Option<&RequestContext>,
    ) -> Result<Decoded, DecodeError> {
        let mut pressed = self
            .buttons
            .iter()
            .filter(|button| fields.contains(&button.dest));
        match (pressed.next(), pressed.next()) {
            (None, _) => {}
            (Some(button), None) => {
                tracing::debug!(dest = %button.dest, "submit action posted");
                return Ok(Decoded::SubmitAction(button.clone()));
            }
            (Some(first), Some(second)) => {
                let mut names = vec![first.dest.clone(), second.dest.clone()];
                names.extend(pressed.map(|button| button.dest.clone()));
                return Err(DecodeError::MultipleSubmitActions(names));
            }
        }

        let mut decoded = DecodedArguments::new();
        for spec in self.schema.params() {
            if spec.is_submit_action(&self.config.submit_actions) {
                continue;
            }
            let value = if spec.action == ActionKind::Store {
                self.decode_field(spec, fields)
            } else {
                spec.default.clone()
            };
            tracing::debug!(dest = %spec.name, value = %value, "decoded field");
            decoded.insert(spec.name.as_str(), value);
        }

        if let Some(prefix) = &self.config.destination_prefix {
            let context = context.cloned().unwrap_or_default();
            let headers = ResponseHeaders::new();
            decoded.insert(format!("{prefix}request"), context.to_value());
            decoded.insert(format!("{prefix}response"), Value::Headers(headers.clone()));
            decoded.response_headers = Some(headers);
        }
        Ok(Decoded::Arguments(decoded))
    }

    fn decode_field(&self, spec: &ParameterSpec, fields: &PostedFields) -> Value {
        let name = spec.name.as_str();
        let representation = representation(spec);
        match representation {
            Representation::Checkbox => match fields.first(name) {
                Some(part) => (*self.registry.redeem(&part.text())).clone(),
                None => spec.default.clone(),
            },
            Representation::FileIn => {
                let mut uploads = fields.all(name).filter_map(|part| {
                    part.filename
                        .as_deref()
                        .filter(|filename| !filename.is_empty())
                        .map(|filename| Value::File(InputFile::new(filename, part.data.clone())))
                });
                if spec.arity.is_sequence() {
                    Value::List(uploads.collect())
                } else {
                    uploads.next().unwrap_or_default()
                }
            }
            Representation::FileOut => {
                let filename = fields.first(name).map(FieldPart::text).unwrap_or_default();
                let filename = filename.trim();
                if filename.is_empty() {
                    Value::None
                } else {
                    Value::Sink(OutputSink::new(filename))
                }
            }
            _ if spec.arity.is_sequence() => {
                let mut posted: Vec<String> = fields.all(name).map(FieldPart::text).collect();
                if self.config.hooks.splits(name) {
                    posted = posted
                        .first()
                        .map(|raw| raw.split_whitespace().map(str::to_string).collect())
                        .unwrap_or_default();
                }
                if posted.is_empty() {
                    // Never an empty sequence: an empty list default stands for no value.
                    return match &spec.default {
                        Value::List(items) if !items.is_empty() => spec.default.clone(),
                        Value::List(_) => Value::List(vec![Value::None]),
                        other => Value::List(vec![other.clone()]),
                    };
                }
                Value::List(
                    posted
                        .iter()
                        .map(|raw| self.coerce(spec, representation, raw))
                        .collect(),
                )
            }
            _ => match fields.first(name) {
                Some(part) => self.coerce(spec, representation, &part.text()),
                None => spec.default.clone(),
            },
        }
    }

    fn coerce(&self, spec: &ParameterSpec, representation: Representation, raw: &str) -> Value {
        if representation == Representation::Select {
            if let Some(choice) = self.registry.lookup(raw) {
                return (*choice).clone();
            }
        }
        let value_type = match (representation, &spec.value_type) {
            (Representation::Range(range), ValueType::Text) if range.is_integral() => {
                ValueType::Integer
            }
            (Representation::Range(_), ValueType::Text) => ValueType::Float,
            (_, value_type) => value_type.clone(),
        };
        value_type.coerce(raw).unwrap_or_else(|err| {
            tracing::warn!(dest = %spec.name, error = %err, "coercion failed, using zero value");
            value_type.zero()
        })
    }
}
