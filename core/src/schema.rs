use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::error::{CoercionError, SchemaError};
use crate::ticket::ChoiceValue;
use crate::value::Value;

/// How many values a single destination carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly one value.
    None,
    /// Zero or one value.
    Optional,
    ZeroOrMore,
    OneOrMore,
    Fixed(usize),
}

impl Arity {
    /// Whether the decoded value is a sequence.
    pub fn is_sequence(self) -> bool {
        matches!(self, Arity::ZeroOrMore | Arity::OneOrMore | Arity::Fixed(_))
    }

    /// The argparse-style `nargs` marker, used in help templates.
    pub fn marker(self) -> String {
        match self {
            Arity::None => "None".to_string(),
            Arity::Optional => "?".to_string(),
            Arity::ZeroOrMore => "*".to_string(),
            Arity::OneOrMore => "+".to_string(),
            Arity::Fixed(n) => n.to_string(),
        }
    }
}

/// What a schema entry does when the program parses it. Only `Store` and
/// submit-style kinds are representable as form fields; the accumulating
/// kinds are skipped by the widget builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    #[default]
    Store,
    Append,
    AppendConst,
    Count,
    Help,
    Version,
    /// A generic button whose only effect is naming itself in the reply.
    Trigger,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Store => "store",
            ActionKind::Append => "append",
            ActionKind::AppendConst => "append_const",
            ActionKind::Count => "count",
            ActionKind::Help => "help",
            ActionKind::Version => "version",
            ActionKind::Trigger => "trigger",
        }
    }
}

/// User-supplied scalar conversion.
#[derive(Clone)]
pub struct CustomType {
    name: String,
    parse: Arc<dyn Fn(&str) -> Result<Value, String> + Send + Sync>,
    zero: Value,
}

impl CustomType {
    pub fn new<F>(name: impl Into<String>, zero: Value, parse: F) -> Self
    where
        F: Fn(&str) -> Result<Value, String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            parse: Arc::new(parse),
            zero,
        }
    }
}

impl fmt::Debug for CustomType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomType")
            .field("name", &self.name)
            .field("zero", &self.zero)
            .finish_non_exhaustive()
    }
}

/// The closed set of value kinds a parameter can carry.
#[derive(Debug, Clone)]
pub enum ValueType {
    Text,
    Integer,
    Float,
    /// A checkbox that stores `constant` when ticked.
    Flag { constant: ChoiceValue },
    /// An uploaded file.
    FileIn,
    /// A file produced by the program and returned as the response.
    FileOut,
    Custom(CustomType),
}

impl ValueType {
    pub fn flag(constant: impl Into<Value>) -> Self {
        ValueType::Flag {
            constant: Arc::new(constant.into()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ValueType::Text => "text",
            ValueType::Integer => "integer",
            ValueType::Float => "float",
            ValueType::Flag { .. } => "flag",
            ValueType::FileIn => "file-in",
            ValueType::FileOut => "file-out",
            ValueType::Custom(custom) => &custom.name,
        }
    }

    /// Convert one posted string.
    pub fn coerce(&self, raw: &str) -> Result<Value, CoercionError> {
        match self {
            ValueType::Integer => raw
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|e| CoercionError::new(raw, "integer", e)),
            ValueType::Float => raw
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|e| CoercionError::new(raw, "float", e)),
            ValueType::Custom(custom) => {
                (custom.parse)(raw).map_err(|reason| CoercionError::new(raw, &custom.name, reason))
            }
            ValueType::Text
            | ValueType::Flag { .. }
            | ValueType::FileIn
            | ValueType::FileOut => Ok(Value::text(raw)),
        }
    }

    /// The default-constructed value substituted when coercion fails.
    pub fn zero(&self) -> Value {
        match self {
            ValueType::Integer => Value::Int(0),
            ValueType::Float => Value::Float(0.0),
            ValueType::Custom(custom) => custom.zero.clone(),
            ValueType::Flag { .. } => Value::Bool(false),
            ValueType::FileIn | ValueType::FileOut => Value::None,
            ValueType::Text => Value::text(""),
        }
    }

    /// HTML input type for a typed (non-choice, non-file) field.
    pub fn input_type(&self) -> &'static str {
        match self {
            ValueType::Integer | ValueType::Float => "number",
            _ => "text",
        }
    }
}

/// Enumerated choices: a plain ordered list, or values with display labels.
#[derive(Debug, Clone)]
pub enum Choices {
    List(Vec<ChoiceValue>),
    Labeled(Vec<(ChoiceValue, String)>),
}

impl Choices {
    pub fn list<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Choices::List(items.into_iter().map(|v| Arc::new(v.into())).collect())
    }

    pub fn labeled<I, V, L>(items: I) -> Self
    where
        I: IntoIterator<Item = (V, L)>,
        V: Into<Value>,
        L: Into<String>,
    {
        Choices::Labeled(
            items
                .into_iter()
                .map(|(v, label)| (Arc::new(v.into()), label.into()))
                .collect(),
        )
    }

    pub fn values(&self) -> Vec<&ChoiceValue> {
        match self {
            Choices::List(items) => items.iter().collect(),
            Choices::Labeled(items) => items.iter().map(|(value, _)| value).collect(),
        }
    }

    /// `(value, label)` pairs in declaration order. Unlabeled choices are
    /// shown title-cased.
    pub fn options(&self) -> Vec<(&ChoiceValue, String)> {
        match self {
            Choices::List(items) => items
                .iter()
                .map(|value| (value, title_case(&value.to_string())))
                .collect(),
            Choices::Labeled(items) => items
                .iter()
                .map(|(value, label)| (value, label.clone()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Choices::List(items) => items.len(),
            Choices::Labeled(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One destination of the wrapped program.
#[derive(Debug, Clone)]
pub struct ParameterSpec {
    pub name: String,
    /// Title of the owning group; filled in when the parameter joins a group.
    pub group: String,
    /// Option strings such as `-o`/`--output`; empty for positionals.
    pub flags: Vec<String>,
    pub metavar: Option<String>,
    pub arity: Arity,
    pub value_type: ValueType,
    pub choices: Option<Choices>,
    pub default: Value,
    pub required: bool,
    pub help: Option<String>,
    pub action: ActionKind,
}

impl ParameterSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: String::new(),
            flags: Vec::new(),
            metavar: None,
            arity: Arity::None,
            value_type: ValueType::Text,
            choices: None,
            default: Value::None,
            required: false,
            help: None,
            action: ActionKind::Store,
        }
    }

    /// A checkbox storing `constant` when ticked and `default` otherwise.
    pub fn flag(name: impl Into<String>, constant: impl Into<Value>, default: impl Into<Value>) -> Self {
        Self::new(name)
            .value_type(ValueType::flag(constant))
            .default(default)
    }

    pub fn help_action() -> Self {
        Self::new("help")
            .flags(["-h", "--help"])
            .action(ActionKind::Help)
            .help("show this help message and exit")
    }

    pub fn version_action() -> Self {
        Self::new("version")
            .flags(["--version"])
            .action(ActionKind::Version)
            .help("show program's version number and exit")
    }

    pub fn flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.flags = flags.into_iter().map(Into::into).collect();
        self
    }

    pub fn metavar(mut self, metavar: impl Into<String>) -> Self {
        self.metavar = Some(metavar.into());
        self
    }

    pub fn arity(mut self, arity: Arity) -> Self {
        self.arity = arity;
        self
    }

    pub fn value_type(mut self, value_type: ValueType) -> Self {
        self.value_type = value_type;
        self
    }

    pub fn choices(mut self, choices: Choices) -> Self {
        self.choices = Some(choices);
        self
    }

    pub fn default(mut self, default: impl Into<Value>) -> Self {
        self.default = default.into();
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn action(mut self, action: ActionKind) -> Self {
        self.action = action;
        self
    }

    pub fn is_positional(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn is_submit_action(&self, submit_actions: &BTreeSet<ActionKind>) -> bool {
        submit_actions.contains(&self.action)
    }

    pub fn is_file_out(&self) -> bool {
        matches!(self.value_type, ValueType::FileOut)
    }

    /// Placeholder text decorated by arity, e.g. `[TAG [TAG ...]]`.
    pub fn placeholder(&self) -> String {
        let metavar = self
            .metavar
            .clone()
            .unwrap_or_else(|| self.name.to_uppercase());
        match self.arity {
            Arity::None | Arity::Fixed(_) => metavar,
            Arity::Optional => format!("[{metavar}]"),
            Arity::ZeroOrMore => format!("[{metavar} [{metavar} ...]]"),
            Arity::OneOrMore => format!("{metavar} [{metavar} ...]"),
        }
    }

    /// Expand `%(key)s` placeholders in the help template with this spec's
    /// own attributes. `prog` resolves to the group title so internal
    /// program names never leak into the page.
    pub fn formatted_help(&self) -> Option<String> {
        let template = self.help.as_deref()?;
        let params = self.help_params();
        let expanded = HELP_PLACEHOLDER.replace_all(template, |caps: &Captures<'_>| {
            match caps.get(1) {
                None => "%".to_string(),
                Some(key) => params
                    .get(key.as_str())
                    .cloned()
                    .unwrap_or_else(|| caps[0].to_string()),
            }
        });
        Some(expanded.into_owned())
    }

    fn help_params(&self) -> BTreeMap<&'static str, String> {
        let mut params = BTreeMap::new();
        params.insert("dest", self.name.clone());
        params.insert(
            "metavar",
            self.metavar.clone().unwrap_or_else(|| self.name.to_uppercase()),
        );
        params.insert("default", self.default.to_string());
        params.insert("type", self.value_type.name().to_string());
        params.insert("required", Value::Bool(self.required).to_string());
        params.insert("nargs", self.arity.marker());
        params.insert("prog", self.group.clone());
        if let Some(choices) = &self.choices {
            let listed: Vec<String> = choices.values().iter().map(|v| v.to_string()).collect();
            params.insert("choices", listed.join(", "));
        }
        params
    }

    /// How the parameter is written on a command line, e.g. `-o, --output FILE`.
    fn invocation(&self) -> String {
        if self.is_positional() {
            return self.placeholder();
        }
        let takes_value = matches!(self.action, ActionKind::Store | ActionKind::Append)
            && !matches!(self.value_type, ValueType::Flag { .. });
        if takes_value {
            let placeholder = self.placeholder();
            self.flags
                .iter()
                .map(|flag| format!("{flag} {placeholder}"))
                .collect::<Vec<_>>()
                .join(", ")
        } else {
            self.flags.join(", ")
        }
    }

    fn usage(&self) -> String {
        if self.is_positional() {
            return self.placeholder();
        }
        let flag = self.flags.first().map(String::as_str).unwrap_or_default();
        let takes_value = matches!(self.action, ActionKind::Store | ActionKind::Append)
            && !matches!(self.value_type, ValueType::Flag { .. });
        let usage = if takes_value {
            format!("{flag} {}", self.placeholder())
        } else {
            flag.to_string()
        };
        if self.required { usage } else { format!("[{usage}]") }
    }
}

static HELP_PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"%%|%\((\w+)\)[sdifr]").expect("help placeholder pattern is valid")
});

/// A titled set of parameters, rendered as one fieldset.
#[derive(Debug, Clone)]
pub struct Group {
    pub title: String,
    pub description: Option<String>,
    pub params: Vec<ParameterSpec>,
}

impl Group {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            params: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn param(mut self, mut spec: ParameterSpec) -> Self {
        spec.group = self.title.clone();
        self.params.push(spec);
        self
    }
}

/// The full parameter description of a wrapped program.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub prog: String,
    pub description: Option<String>,
    pub epilog: Option<String>,
    /// Version template; `%(prog)s` is replaced by the program name.
    pub version: Option<String>,
    /// Pre-rendered help, replacing [`Schema::format_help`] when present.
    pub help_text: Option<String>,
    pub groups: Vec<Group>,
}

impl Schema {
    pub fn new(prog: impl Into<String>) -> Self {
        Self {
            prog: prog.into(),
            ..Self::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn epilog(mut self, epilog: impl Into<String>) -> Self {
        self.epilog = Some(epilog.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn group(mut self, group: Group) -> Self {
        self.groups.push(group);
        self
    }

    pub fn params(&self) -> impl Iterator<Item = &ParameterSpec> {
        self.groups.iter().flat_map(|group| group.params.iter())
    }

    pub fn param(&self, name: &str) -> Option<&ParameterSpec> {
        self.params().find(|spec| spec.name == name)
    }

    pub fn param_mut(&mut self, name: &str) -> Option<&mut ParameterSpec> {
        self.groups
            .iter_mut()
            .flat_map(|group| group.params.iter_mut())
            .find(|spec| spec.name == name)
    }

    /// Enforce unique destinations and the single output file rule.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut seen = BTreeSet::new();
        for spec in self.params() {
            if !seen.insert(spec.name.as_str()) {
                return Err(SchemaError::DuplicateDestination(spec.name.clone()));
            }
        }

        let outputs: Vec<String> = self
            .params()
            .filter(|spec| spec.is_file_out())
            .map(|spec| spec.name.clone())
            .collect();
        if outputs.len() > 1 {
            return Err(SchemaError::MultipleOutputFiles(outputs));
        }
        Ok(())
    }

    /// argparse-style usage and help text.
    pub fn format_help(&self) -> String {
        if let Some(text) = &self.help_text {
            return text.clone();
        }

        let usage: Vec<String> = self.params().map(ParameterSpec::usage).collect();
        let mut out = format!("usage: {} {}\n", self.prog, usage.join(" "));
        if let Some(description) = &self.description {
            out.push('\n');
            out.push_str(description);
            out.push('\n');
        }

        for group in &self.groups {
            if group.params.is_empty() {
                continue;
            }
            out.push('\n');
            out.push_str(&group.title);
            out.push_str(":\n");
            let rows: Vec<(String, String)> = group
                .params
                .iter()
                .map(|spec| (spec.invocation(), spec.formatted_help().unwrap_or_default()))
                .collect();
            let width = rows.iter().map(|(inv, _)| inv.len()).max().unwrap_or(0);
            for (invocation, help) in rows {
                let line = format!("  {invocation:<width$}  {help}");
                out.push_str(line.trim_end());
                out.push('\n');
            }
        }

        if let Some(epilog) = &self.epilog {
            out.push('\n');
            out.push_str(epilog);
            out.push('\n');
        }
        out
    }

    pub fn format_version(&self) -> String {
        let version = self.version.as_deref().unwrap_or_default();
        format!("{}\n", version.replace("%(prog)s", &self.prog))
    }
}

/// Python-style `str.title()`: every run of letters starts uppercase.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_word = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Schema {
        Schema::new("archive")
            .description("Pack files into an archive.")
            .version("%(prog)s 0.5")
            .group(
                Group::new("options")
                    .param(ParameterSpec::help_action())
                    .param(
                        ParameterSpec::new("level")
                            .flags(["-l", "--level"])
                            .value_type(ValueType::Integer)
                            .default(6)
                            .help("compression level; default is %(default)s"),
                    )
                    .param(ParameterSpec::flag("verbose", true, false).flags(["-v"])),
            )
            .group(
                Group::new("positional arguments")
                    .param(ParameterSpec::new("sources").arity(Arity::OneOrMore)),
            )
    }

    #[test]
    fn placeholder_follows_arity() {
        let spec = ParameterSpec::new("tag");
        assert_eq!(spec.clone().placeholder(), "TAG");
        assert_eq!(spec.clone().arity(Arity::Optional).placeholder(), "[TAG]");
        assert_eq!(
            spec.clone().arity(Arity::ZeroOrMore).placeholder(),
            "[TAG [TAG ...]]"
        );
        assert_eq!(spec.clone().arity(Arity::OneOrMore).placeholder(), "TAG [TAG ...]");
        assert_eq!(spec.metavar("T").arity(Arity::Fixed(2)).placeholder(), "T");
    }

    #[test]
    fn help_template_expands_own_attributes() {
        let schema = sample();
        let level = schema.param("level").expect("level exists");
        assert_eq!(
            level.formatted_help().as_deref(),
            Some("compression level; default is 6")
        );
    }

    #[test]
    fn help_template_uses_group_title_for_prog_and_keeps_unknown_keys() {
        let spec = Group::new("network")
            .param(
                ParameterSpec::new("port")
                    .choices(Choices::list([80_i64, 443]))
                    .help("%(prog)s port, one of %(choices)s (100%% safe) %(bogus)s"),
            )
            .params
            .remove(0);
        assert_eq!(
            spec.formatted_help().as_deref(),
            Some("network port, one of 80, 443 (100% safe) %(bogus)s")
        );
    }

    #[test]
    fn validate_rejects_two_output_files() {
        let schema = Schema::new("p").group(
            Group::new("outputs")
                .param(ParameterSpec::new("zipfile").value_type(ValueType::FileOut))
                .param(ParameterSpec::new("logfile").value_type(ValueType::FileOut)),
        );
        match schema.validate() {
            Err(SchemaError::MultipleOutputFiles(names)) => {
                assert_eq!(names, vec!["zipfile".to_string(), "logfile".to_string()]);
            }
            other => panic!("unexpected validation result: {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_duplicate_destinations() {
        let schema = Schema::new("p")
            .group(Group::new("a").param(ParameterSpec::new("name")))
            .group(Group::new("b").param(ParameterSpec::new("name")));
        assert!(matches!(
            schema.validate(),
            Err(SchemaError::DuplicateDestination(name)) if name == "name"
        ));
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn format_help_lists_groups_and_usage() {
        let help = sample().format_help();
        assert!(help.starts_with("usage: archive [-h] [-l LEVEL] [-v] SOURCES [SOURCES ...]\n"));
        assert!(help.contains("\noptions:\n"));
        assert!(help.contains("-l LEVEL, --level LEVEL  compression level; default is 6"));
        assert!(help.contains("\npositional arguments:\n"));
    }

    #[test]
    fn format_version_substitutes_prog() {
        assert_eq!(sample().format_version(), "archive 0.5\n");
    }

    #[test]
    fn coercion_reports_target_type() {
        assert_eq!(ValueType::Integer.coerce(" 12 "), Ok(Value::Int(12)));
        let err = ValueType::Float.coerce("abc").expect_err("not a float");
        assert_eq!(err.target, "float");
        assert_eq!(ValueType::Float.zero(), Value::Float(0.0));
    }

    #[test]
    fn custom_types_use_their_parser_and_zero() {
        let upper = ValueType::Custom(CustomType::new("upper", Value::text("?"), |raw| {
            if raw.is_empty() {
                Err("empty".to_string())
            } else {
                Ok(Value::text(raw.to_uppercase()))
            }
        }));
        assert_eq!(upper.coerce("abc"), Ok(Value::text("ABC")));
        assert!(upper.coerce("").is_err());
        assert_eq!(upper.zero(), Value::text("?"));
        assert_eq!(upper.name(), "upper");
    }

    #[test]
    fn title_case_matches_python() {
        assert_eq!(title_case("dry run"), "Dry Run");
        assert_eq!(title_case("RED"), "Red");
        assert_eq!(title_case("abc1def"), "Abc1Def");
    }
}
