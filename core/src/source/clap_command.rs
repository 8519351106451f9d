use clap::builder::ValueRange;
use clap::{Arg, ArgAction, Command, ValueHint};

use crate::schema::{ActionKind, Arity, Choices, Group, ParameterSpec, Schema, ValueType};
use crate::value::Value;

const POSITIONAL_GROUP: &str = "positional arguments";
const OPTIONS_GROUP: &str = "options";

/// Describe a clap command as a schema. Help headings become groups, and
/// clap's own rendered help and version text answer the matching buttons.
pub fn from_clap(mut command: Command) -> Schema {
    command.build();

    let mut schema = Schema::new(command.get_name());
    schema.description = command.get_about().map(ToString::to_string);
    schema.epilog = command.get_after_help().map(ToString::to_string);
    schema.version = command
        .get_version()
        .map(|_| command.render_version().trim_end().to_string());

    let mut groups: Vec<Group> = Vec::new();
    for arg in command.get_arguments() {
        if arg.is_hide_set() {
            continue;
        }
        let title = arg.get_help_heading().unwrap_or(if arg.is_positional() {
            POSITIONAL_GROUP
        } else {
            OPTIONS_GROUP
        });
        let spec = param_spec(arg);
        tracing::debug!(dest = %spec.name, group = title, action = spec.action.as_str(), "converted clap argument");

        match groups.iter_mut().find(|group| group.title == title) {
            Some(group) => {
                let mut spec = spec;
                spec.group = group.title.clone();
                group.params.push(spec);
            }
            None => groups.push(Group::new(title).param(spec)),
        }
    }
    schema.groups = groups;
    schema.help_text = Some(command.render_help().to_string());
    schema
}

fn param_spec(arg: &Arg) -> ParameterSpec {
    let name = arg.get_id().as_str();
    let mut flags = Vec::new();
    if let Some(short) = arg.get_short() {
        flags.push(format!("-{short}"));
    }
    if let Some(long) = arg.get_long() {
        flags.push(format!("--{long}"));
    }

    let spec = match arg.get_action() {
        ArgAction::SetTrue => ParameterSpec::flag(name, true, false),
        ArgAction::SetFalse => ParameterSpec::flag(name, false, true),
        ArgAction::Count => ParameterSpec::new(name).action(ActionKind::Count).default(0),
        ArgAction::Help | ArgAction::HelpShort | ArgAction::HelpLong => {
            ParameterSpec::new(name).action(ActionKind::Help)
        }
        ArgAction::Version => ParameterSpec::new(name).action(ActionKind::Version),
        action => value_spec(arg, name, matches!(action, ArgAction::Append)),
    };

    let mut spec = spec.flags(flags).required(arg.is_required_set());
    spec.help = arg.get_help().map(ToString::to_string);
    spec.metavar = arg
        .get_value_names()
        .and_then(|names| names.first())
        .map(|name| name.to_string());
    spec
}

fn value_spec(arg: &Arg, name: &str, append: bool) -> ParameterSpec {
    let arity = arity(arg.get_num_args(), append, arg.is_required_set());
    let defaults: Vec<Value> = arg
        .get_default_values()
        .iter()
        .map(|raw| parse_default(&raw.to_string_lossy()))
        .collect();

    let choices: Vec<String> = arg
        .get_possible_values()
        .iter()
        .filter(|value| !value.is_hide_set())
        .map(|value| value.get_name().to_string())
        .collect();

    let value_type = if arg.get_value_hint() == ValueHint::FilePath {
        ValueType::FileIn
    } else if !choices.is_empty() || defaults.is_empty() {
        ValueType::Text
    } else if defaults.iter().all(|value| matches!(value, Value::Int(_))) {
        ValueType::Integer
    } else if defaults
        .iter()
        .all(|value| matches!(value, Value::Int(_) | Value::Float(_)))
    {
        ValueType::Float
    } else {
        ValueType::Text
    };

    // Keep defaults in the text form clap would hand the program unless the
    // type was inferred from them.
    let defaults: Vec<Value> = match value_type {
        ValueType::Integer | ValueType::Float => defaults,
        _ => arg
            .get_default_values()
            .iter()
            .map(|raw| Value::text(raw.to_string_lossy()))
            .collect(),
    };
    let default = match (arity.is_sequence(), defaults.len()) {
        (_, 0) => Value::None,
        (false, _) => defaults.into_iter().next().unwrap_or_default(),
        (true, _) => Value::List(defaults),
    };

    let mut spec = ParameterSpec::new(name)
        .arity(arity)
        .value_type(value_type)
        .default(default);
    if !choices.is_empty() {
        spec = spec.choices(Choices::list(choices));
    }
    spec
}

fn arity(range: Option<ValueRange>, append: bool, required: bool) -> Arity {
    let Some(range) = range else {
        return Arity::None;
    };
    match (range.min_values(), range.max_values()) {
        (1, 1) if append && required => Arity::OneOrMore,
        (1, 1) if append => Arity::ZeroOrMore,
        (_, 0) | (1, 1) => Arity::None,
        (0, 1) => Arity::Optional,
        (0, usize::MAX) => Arity::ZeroOrMore,
        (_, usize::MAX) => Arity::OneOrMore,
        (min, max) if min == max => Arity::Fixed(min),
        (0, _) => Arity::ZeroOrMore,
        _ => Arity::OneOrMore,
    }
}

fn parse_default(raw: &str) -> Value {
    if let Ok(int) = raw.parse::<i64>() {
        return Value::Int(int);
    }
    if raw.chars().any(|c| c.is_ascii_digit()) {
        if let Ok(float) = raw.parse::<f64>() {
            return Value::Float(float);
        }
    }
    Value::text(raw)
}
