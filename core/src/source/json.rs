use serde::Deserialize;

use crate::error::SchemaError;
use crate::schema::{ActionKind, Arity, Choices, Group, ParameterSpec, Schema, ValueType};
use crate::value::Value;

#[derive(Debug, Deserialize)]
struct SchemaDocument {
    prog: String,
    description: Option<String>,
    epilog: Option<String>,
    version: Option<String>,
    help_text: Option<String>,
    #[serde(default)]
    groups: Vec<GroupDocument>,
}

#[derive(Debug, Deserialize)]
struct GroupDocument {
    title: String,
    description: Option<String>,
    #[serde(default)]
    params: Vec<ParamDocument>,
}

#[derive(Debug, Deserialize)]
struct ParamDocument {
    name: String,
    #[serde(default)]
    flags: Vec<String>,
    metavar: Option<String>,
    nargs: Option<Nargs>,
    #[serde(rename = "type", default)]
    value_type: TypeName,
    #[serde(rename = "const")]
    constant: Option<serde_json::Value>,
    choices: Option<serde_json::Value>,
    default: Option<serde_json::Value>,
    required: Option<bool>,
    help: Option<String>,
    #[serde(default)]
    action: ActionKind,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Nargs {
    Count(usize),
    Marker(String),
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum TypeName {
    #[default]
    Text,
    Integer,
    Float,
    Flag,
    FileIn,
    FileOut,
}

/// Parse a JSON schema document and validate it.
///
/// ```json
/// { "prog": "archive",
///   "groups": [{ "title": "options", "params": [
///     { "name": "level", "flags": ["-l"], "type": "integer", "default": 6 },
///     { "name": "sources", "nargs": "+" } ] }] }
/// ```
pub fn from_json(text: &str) -> Result<Schema, SchemaError> {
    let document: SchemaDocument =
        serde_json::from_str(text).map_err(|e| SchemaError::Document(e.to_string()))?;

    let mut schema = Schema::new(document.prog);
    schema.description = document.description;
    schema.epilog = document.epilog;
    schema.version = document.version;
    schema.help_text = document.help_text;

    for group_doc in document.groups {
        let mut group = Group::new(group_doc.title);
        group.description = group_doc.description;
        for param in group_doc.params {
            group = group.param(param_spec(param)?);
        }
        schema = schema.group(group);
    }

    schema.validate()?;
    Ok(schema)
}

fn param_spec(doc: ParamDocument) -> Result<ParameterSpec, SchemaError> {
    let arity = match doc.nargs {
        None => Arity::None,
        Some(Nargs::Count(n)) => Arity::Fixed(n),
        Some(Nargs::Marker(marker)) => match marker.as_str() {
            "?" => Arity::Optional,
            "*" => Arity::ZeroOrMore,
            "+" => Arity::OneOrMore,
            other => {
                return Err(SchemaError::Document(format!(
                    "parameter '{}': unknown nargs '{other}'",
                    doc.name
                )));
            }
        },
    };

    let default = doc.default.as_ref().map(Value::from);
    let (value_type, default) = match doc.value_type {
        TypeName::Flag => {
            let constant = doc
                .constant
                .as_ref()
                .map(Value::from)
                .unwrap_or(Value::Bool(true));
            let default = default.unwrap_or_else(|| match &constant {
                Value::Bool(b) => Value::Bool(!*b),
                _ => Value::None,
            });
            (ValueType::flag(constant), default)
        }
        TypeName::Text => (ValueType::Text, default.unwrap_or_default()),
        TypeName::Integer => (ValueType::Integer, default.unwrap_or_default()),
        TypeName::Float => (ValueType::Float, default.unwrap_or_default()),
        TypeName::FileIn => (ValueType::FileIn, default.unwrap_or_default()),
        TypeName::FileOut => (ValueType::FileOut, default.unwrap_or_default()),
    };

    let choices = match doc.choices {
        None => None,
        Some(serde_json::Value::Array(items)) => {
            Some(Choices::list(items.iter().map(Value::from)))
        }
        Some(serde_json::Value::Object(labels)) => {
            let mut pairs = Vec::with_capacity(labels.len());
            for (value, label) in labels {
                let label = label.as_str().ok_or_else(|| {
                    SchemaError::Document(format!(
                        "parameter '{}': choice labels must be strings",
                        doc.name
                    ))
                })?;
                pairs.push((value, label.to_string()));
            }
            Some(Choices::labeled(pairs))
        }
        Some(_) => {
            return Err(SchemaError::Document(format!(
                "parameter '{}': choices must be an array or an object",
                doc.name
            )));
        }
    };

    // Positionals are mandatory unless their arity admits zero values.
    let required = doc.required.unwrap_or_else(|| {
        doc.flags.is_empty()
            && doc.action == ActionKind::Store
            && !matches!(arity, Arity::Optional | Arity::ZeroOrMore)
    });

    let mut spec = ParameterSpec::new(doc.name)
        .flags(doc.flags)
        .arity(arity)
        .value_type(value_type)
        .default(default)
        .required(required)
        .action(doc.action);
    spec.metavar = doc.metavar;
    spec.help = doc.help;
    if let Some(choices) = choices {
        spec = spec.choices(choices);
    }
    Ok(spec)
}
