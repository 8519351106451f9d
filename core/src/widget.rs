//! Maps one [`ParameterSpec`] to the input widget that edits it.
//!
//! The builder decides the widget representation (select, bounded number,
//! checkbox, file, typed text) and the arity layout around it. The decoder
//! consults [`representation`] as well, so both directions agree on how a
//! field was encoded.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::config::WrapperConfig;
use crate::error::CoercionError;
use crate::markup::Element;
use crate::schema::{ActionKind, Arity, Choices, ParameterSpec, ValueType};
use crate::script::ClientBehavior;
use crate::ticket::TicketRegistry;
use crate::value::Value;

const OUTPUT_FILE_PLACEHOLDER: &str = "Output file name";
const HEAVY_PLUS_SIGN: &str = "\u{2795}";
const HEAVY_MINUS_SIGN: &str = "\u{2796}";

static FUNCTION_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\w+)\(").expect("function call pattern is valid"));

/// Choices forming an increasing arithmetic progression, rendered as a
/// bounded number input instead of an option list. `stop` is exclusive;
/// `last` is the largest choice as given.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericRange {
    pub start: f64,
    pub stop: f64,
    pub step: f64,
    pub last: f64,
}

impl NumericRange {

    pub fn is_integral(&self) -> bool {
        self.start.fract() == 0.0 && self.step.fract() == 0.0
    }
}

/// Detect whether every choice is numeric and the gaps are constant.
pub fn numeric_range(choices: &Choices) -> Option<NumericRange> {
    let values: Vec<f64> = choices
        .values()
        .into_iter()
        .map(|choice| choice.as_number())
        .collect::<Option<_>>()?;
    let start = *values.first()?;
    let last = *values.last()?;
    let step = if values.len() < 2 {
        1.0
    } else {
        values[1] - values[0]
    };
    if step <= 0.0 {
        return None;
    }
    let tolerance = step * 1e-9;
    if values
        .windows(2)
        .any(|pair| ((pair[1] - pair[0]) - step).abs() > tolerance)
    {
        return None;
    }
    Some(NumericRange {
        start,
        stop: last + step,
        step,
        last,
    })
}

/// How a parameter is encoded in the form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Representation {
    Select,
    Range(NumericRange),
    Checkbox,
    FileIn,
    FileOut,
    Typed,
}

pub fn representation(spec: &ParameterSpec) -> Representation {
    if let Some(choices) = &spec.choices {
        return match numeric_range(choices) {
            Some(range) => Representation::Range(range),
            None => Representation::Select,
        };
    }
    match spec.value_type {
        ValueType::Flag { .. } => Representation::Checkbox,
        ValueType::FileIn => Representation::FileIn,
        ValueType::FileOut => Representation::FileOut,
        ValueType::Text | ValueType::Integer | ValueType::Float | ValueType::Custom(_) => {
            Representation::Typed
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetKind {
    Text,
    Number,
    Checkbox,
    Select,
    File,
    /// Stands in for a field whose widget could not be built.
    Diagnostic,
}

/// Arity container around the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Bare,
    /// One hidden slot with reveal/hide buttons.
    Slot,
    /// A list grown from a template row.
    Growable { first_required: bool },
    /// Exactly `n` static rows.
    Fixed(usize),
}

impl Layout {
    fn behaviors(self) -> &'static [ClientBehavior] {
        match self {
            Layout::Slot => &[ClientBehavior::Toggle],
            Layout::Growable { .. } => &[ClientBehavior::AddRow, ClientBehavior::RemoveRow],
            Layout::Bare | Layout::Fixed(_) => &[],
        }
    }
}

/// A built field, ready to be turned into markup.
#[derive(Debug, Clone)]
pub struct WidgetDescriptor {
    pub dest: String,
    pub kind: WidgetKind,
    pub layout: Layout,
    pub behaviors: BTreeSet<ClientBehavior>,
    input: Element,
}

impl WidgetDescriptor {
    fn diagnostic(spec: &ParameterSpec, err: &CoercionError) -> Self {
        Self {
            dest: spec.name.clone(),
            kind: WidgetKind::Diagnostic,
            layout: Layout::Bare,
            behaviors: BTreeSet::new(),
            input: Element::new("pre")
                .attr("class", "diagnostic")
                .child(format!("cannot render '{}': {err}", spec.name)),
        }
    }

    /// Attributes of a single input row.
    pub fn attributes(&self) -> &[(String, Option<String>)] {
        self.input.attributes()
    }

    pub fn input(&self) -> &Element {
        &self.input
    }

    pub fn repeatable(&self) -> bool {
        matches!(self.layout, Layout::Growable { .. } | Layout::Fixed(_))
    }

    /// One input row. Invoked once per rendered row instead of copying a
    /// finished tree.
    fn row(&self, with_id: bool) -> Element {
        let mut input = self.input.clone();
        if with_id {
            input.set_attr("id", &self.dest);
        }
        input
    }

    pub fn to_element(&self) -> Element {
        let dest = &self.dest;
        match self.layout {
            Layout::Bare => self.row(true),
            Layout::Slot => {
                let mut input = self.row(true);
                input.set_flag("disabled");
                Element::new("ul")
                    .attr("id", format!("{dest}.ul"))
                    .attr("class", "input-ul")
                    .child(
                        Element::new("li")
                            .attr("id", format!("{dest}.add"))
                            .child(plus_button(format!("toggle_slot('{dest}', true)"))),
                    )
                    .child(
                        Element::new("li")
                            .attr("id", format!("{dest}.slot"))
                            .attr("style", "display:none")
                            .child(minus_button(format!("toggle_slot('{dest}', false)")))
                            .child(input),
                    )
            }
            Layout::Growable { first_required } => {
                let mut list = Element::new("ul")
                    .attr("id", format!("{dest}.ul"))
                    .attr("class", "input-ul");
                if first_required {
                    list.push(Element::new("li").child(self.row(true).flag("required")));
                }
                list.push(
                    Element::new("li")
                        .attr("id", format!("{dest}.add"))
                        .child(plus_button(format!("add_row('{dest}')"))),
                );
                let template = Element::new("template")
                    .attr("id", format!("{dest}.tpl"))
                    .child(
                        Element::new("li")
                            .child(minus_button("remove_row(this)".to_string()))
                            .child(self.row(false)),
                    );
                Element::new("div")
                    .attr("class", "arity")
                    .child(list)
                    .child(template)
            }
            Layout::Fixed(n) => {
                let mut list = Element::new("ul")
                    .attr("id", format!("{dest}.ul"))
                    .attr("class", "input-ul");
                for index in 0..n {
                    list.push(Element::new("li").child(self.row(index == 0)));
                }
                list
            }
        }
    }
}

fn plus_button(onclick: String) -> Element {
    Element::new("input")
        .attr("type", "button")
        .attr("class", "add")
        .attr("value", HEAVY_PLUS_SIGN)
        .attr("onclick", onclick)
}

fn minus_button(onclick: String) -> Element {
    Element::new("input")
        .attr("type", "button")
        .attr("class", "remove")
        .attr("value", HEAVY_MINUS_SIGN)
        .attr("onclick", onclick)
}

/// A schema entry rendered as an action button rather than a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitButton {
    pub dest: String,
    pub kind: ActionKind,
}

#[derive(Debug, Clone)]
pub enum Built {
    Widget(WidgetDescriptor),
    Submit(SubmitButton),
    /// The action kind has no invertible widget yet.
    Skip(ActionKind),
}

pub struct WidgetBuilder<'a> {
    registry: &'a TicketRegistry,
    config: &'a WrapperConfig,
}

impl<'a> WidgetBuilder<'a> {
    pub fn new(registry: &'a TicketRegistry, config: &'a WrapperConfig) -> Self {
        Self { registry, config }
    }

    pub fn build(&self, spec: &ParameterSpec) -> Built {
        if spec.is_submit_action(&self.config.submit_actions) {
            return Built::Submit(SubmitButton {
                dest: spec.name.clone(),
                kind: spec.action,
            });
        }
        if spec.action != ActionKind::Store {
            tracing::debug!(dest = %spec.name, action = spec.action.as_str(), "skipping unsupported action");
            return Built::Skip(spec.action);
        }

        let representation = representation(spec);
        let mut input = match self.base_input(spec, representation) {
            Ok(input) => input,
            Err(err) => {
                tracing::warn!(dest = %spec.name, error = %err, "default cannot be rendered");
                return Built::Widget(WidgetDescriptor::diagnostic(spec, &err));
            }
        };

        input.set_attr("name", &spec.name);
        if matches!(
            representation,
            Representation::Range(_) | Representation::FileIn | Representation::Typed
        ) {
            input.set_attr("placeholder", spec.placeholder());
        }
        // A multi-select is the only row of a one-or-more field.
        if spec.required
            || (representation == Representation::Select && spec.arity == Arity::OneOrMore)
        {
            input.set_flag("required");
        }

        let mut behaviors = BTreeSet::new();
        if let Some(handlers) = self.config.hooks.handlers(&spec.name) {
            for (event, script) in handlers {
                input.set_attr(event, script.replace("%s", &spec.name));
                if let Some(call) = FUNCTION_CALL.captures(script) {
                    behaviors.insert(ClientBehavior::from_function(&call[1]));
                }
            }
        }

        let layout = layout_for(spec, representation);
        behaviors.extend(layout.behaviors().iter().cloned());

        let kind = match representation {
            Representation::Select => WidgetKind::Select,
            Representation::Range(_) => WidgetKind::Number,
            Representation::Checkbox => WidgetKind::Checkbox,
            Representation::FileIn => WidgetKind::File,
            Representation::FileOut => WidgetKind::Text,
            Representation::Typed if spec.value_type.input_type() == "number" => {
                WidgetKind::Number
            }
            Representation::Typed => WidgetKind::Text,
        };
        tracing::debug!(dest = %spec.name, ?kind, ?layout, "built widget");

        Built::Widget(WidgetDescriptor {
            dest: spec.name.clone(),
            kind,
            layout,
            behaviors,
            input,
        })
    }

    fn base_input(
        &self,
        spec: &ParameterSpec,
        representation: Representation,
    ) -> Result<Element, CoercionError> {
        let input = match representation {
            Representation::Select => self.select(spec),
            Representation::Range(range) => {
                let input = Element::new("input")
                    .attr("type", "number")
                    .attr("min", range.start.to_string())
                    .attr("max", range.last.to_string())
                    .attr("step", range.step.to_string());
                with_default(input, &spec.default)?
            }
            Representation::Checkbox => {
                let mut input = Element::new("input").attr("type", "checkbox");
                if let ValueType::Flag { constant } = &spec.value_type {
                    input.set_attr("value", self.registry.register(constant));
                }
                input
            }
            Representation::FileIn => Element::new("input").attr("type", "file"),
            Representation::FileOut => Element::new("input")
                .attr("type", "text")
                .attr("placeholder", OUTPUT_FILE_PLACEHOLDER),
            Representation::Typed => {
                let mut input =
                    Element::new("input").attr("type", spec.value_type.input_type());
                if matches!(spec.value_type, ValueType::Float) {
                    input.set_attr("step", "any");
                }
                with_default(input, &spec.default)?
            }
        };
        Ok(input)
    }

    fn select(&self, spec: &ParameterSpec) -> Element {
        let mut select = Element::new("select");
        if matches!(spec.arity, Arity::ZeroOrMore | Arity::OneOrMore) {
            select.set_flag("multiple");
        }
        let defaults: Vec<&Value> = match &spec.default {
            Value::List(items) => items.iter().collect(),
            other => vec![other],
        };
        let Some(choices) = &spec.choices else {
            return select;
        };
        for (choice, label) in choices.options() {
            let value = match choice.as_ref() {
                Value::Text(text) => text.clone(),
                _ => self.registry.register(choice),
            };
            let mut option = Element::new("option").attr("value", value).child(label);
            if defaults.iter().any(|default| **default == **choice) {
                option.set_flag("selected");
            }
            select.push(option);
        }
        select
    }
}

fn with_default(mut input: Element, default: &Value) -> Result<Element, CoercionError> {
    if default.is_truthy() {
        input.set_attr("value", default.to_form_string()?);
    }
    Ok(input)
}

fn layout_for(spec: &ParameterSpec, representation: Representation) -> Layout {
    match (representation, spec.arity) {
        (Representation::Checkbox, _) => Layout::Bare,
        (Representation::Select, Arity::ZeroOrMore | Arity::OneOrMore) => Layout::Bare,
        (_, Arity::None) => Layout::Bare,
        (_, Arity::Optional) => Layout::Slot,
        (_, Arity::ZeroOrMore) => Layout::Growable {
            first_required: false,
        },
        (_, Arity::OneOrMore) => Layout::Growable {
            first_required: true,
        },
        (_, Arity::Fixed(n)) => Layout::Fixed(n),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use super::*;
    use crate::config::Hooks;

    fn build(spec: ParameterSpec) -> (Built, TicketRegistry) {
        build_with(spec, &WrapperConfig::default())
    }

    fn build_with(spec: ParameterSpec, config: &WrapperConfig) -> (Built, TicketRegistry) {
        let registry = TicketRegistry::new();
        let built = WidgetBuilder::new(&registry, config).build(&spec);
        (built, registry)
    }

    fn widget(built: Built) -> WidgetDescriptor {
        match built {
            Built::Widget(widget) => widget,
            other => panic!("expected a widget, got {other:?}"),
        }
    }

    #[test]
    fn contiguous_integers_are_a_range() {
        let range = numeric_range(&Choices::list([1_i64, 2, 3, 4]));
        assert_eq!(
            range,
            Some(NumericRange {
                start: 1.0,
                stop: 5.0,
                step: 1.0,
                last: 4.0,
            })
        );
    }

    #[test]
    fn text_and_irregular_choices_are_not_ranges() {
        assert_eq!(numeric_range(&Choices::list(["red", "green", "blue"])), None);
        assert_eq!(numeric_range(&Choices::list([1_i64, 2, 4])), None);
        assert_eq!(numeric_range(&Choices::list([3_i64, 2, 1])), None);
    }

    #[test]
    fn float_progressions_tolerate_rounding() {
        let range = numeric_range(&Choices::list([0.1, 0.2, 0.3])).expect("float range");
        assert!((range.step - 0.1).abs() < 1e-12);
        assert!(!range.is_integral());
    }

    #[test]
    fn float_range_max_is_the_last_choice() {
        let spec = ParameterSpec::new("ratio").choices(Choices::list([0.1, 0.2, 0.3]));
        let input = widget(build(spec).0).to_element();
        assert_eq!(input.get_attr("max"), Some("0.3"));
        assert_eq!(input.get_attr("min"), Some("0.1"));
    }

    #[test]
    fn one_or_more_select_is_required() {
        let spec = ParameterSpec::new("mode")
            .flags(["--mode"])
            .arity(Arity::OneOrMore)
            .choices(Choices::list(["a", "b"]));
        let input = widget(build(spec).0).to_element();
        assert_eq!(input.tag(), "select");
        assert!(input.has_attr("multiple"));
        assert!(input.has_attr("required"));

        let spec = ParameterSpec::new("mode")
            .flags(["--mode"])
            .arity(Arity::ZeroOrMore)
            .choices(Choices::list(["a", "b"]));
        let input = widget(build(spec).0).to_element();
        assert!(!input.has_attr("required"));
    }

    #[test]
    fn numeric_range_choices_render_a_bounded_number_input() {
        let spec = ParameterSpec::new("level").choices(Choices::list([1_i64, 2, 3, 4]));
        let widget = widget(build(spec).0);
        assert_eq!(widget.kind, WidgetKind::Number);
        let input = widget.to_element();
        assert_eq!(input.tag(), "input");
        assert_eq!(input.get_attr("min"), Some("1"));
        assert_eq!(input.get_attr("max"), Some("4"));
        assert_eq!(input.get_attr("step"), Some("1"));
    }

    #[test]
    fn text_choices_render_options_with_selected_default() {
        let spec = ParameterSpec::new("color")
            .choices(Choices::list(["red", "green", "blue"]))
            .default("green");
        let widget = widget(build(spec).0);
        assert_eq!(widget.kind, WidgetKind::Select);
        let html = widget.to_element().to_string();
        assert!(html.contains(r#"<option value="red">Red</option>"#));
        assert!(html.contains(r#"<option value="green" selected>Green</option>"#));
        assert!(!html.contains("multiple"));
    }

    #[test]
    fn non_text_choices_are_ticketed() {
        let spec = ParameterSpec::new("mode")
            .choices(Choices::labeled([(Value::Bool(true), "On"), (Value::Bool(false), "Off")]))
            .arity(Arity::ZeroOrMore);
        let (built, registry) = build(spec);
        let select = widget(built).to_element();
        assert!(select.has_attr("multiple"));

        let mut options = Vec::new();
        select.find_all("option", &mut options);
        assert_eq!(options.len(), 2);
        let ticket = options[0].get_attr("value").expect("option value");
        assert_eq!(*registry.redeem(ticket), Value::Bool(true));
    }

    #[test]
    fn flag_renders_checkbox_with_constant_ticket() {
        let spec = ParameterSpec::flag("verbose", true, false).arity(Arity::ZeroOrMore);
        let (built, registry) = build(spec);
        let widget = widget(built);
        assert_eq!(widget.kind, WidgetKind::Checkbox);
        assert_eq!(widget.layout, Layout::Bare);
        let input = widget.to_element();
        assert_eq!(input.get_attr("type"), Some("checkbox"));
        let ticket = input.get_attr("value").expect("checkbox value");
        assert_eq!(*registry.redeem(ticket), Value::Bool(true));
    }

    #[test]
    fn output_file_gets_filename_placeholder() {
        let spec = ParameterSpec::new("zipfile").value_type(ValueType::FileOut);
        let input = widget(build(spec).0).to_element();
        assert_eq!(input.get_attr("type"), Some("text"));
        assert_eq!(input.get_attr("placeholder"), Some("Output file name"));
    }

    #[test]
    fn input_file_is_an_upload() {
        let spec = ParameterSpec::new("csvfile").value_type(ValueType::FileIn);
        let widget = widget(build(spec).0);
        assert_eq!(widget.kind, WidgetKind::File);
        assert_eq!(widget.to_element().get_attr("type"), Some("file"));
    }

    #[test]
    fn typed_input_prefills_escaped_default_and_float_step() {
        let spec = ParameterSpec::new("ratio")
            .value_type(ValueType::Float)
            .default(0.5);
        let input = widget(build(spec).0).to_element();
        assert_eq!(input.get_attr("type"), Some("number"));
        assert_eq!(input.get_attr("step"), Some("any"));
        assert_eq!(input.get_attr("value"), Some("0.5"));

        let spec = ParameterSpec::new("title").default("say \"hi\"");
        let html = widget(build(spec).0).to_element().to_string();
        assert!(html.contains(r#"value="say &quot;hi&quot;""#));
    }

    #[test]
    fn one_or_more_has_required_first_row_and_template() {
        let spec = ParameterSpec::new("sources").arity(Arity::OneOrMore);
        let widget = widget(build(spec).0);
        assert!(widget.repeatable());
        assert!(widget.behaviors.contains(&ClientBehavior::AddRow));
        assert!(widget.behaviors.contains(&ClientBehavior::RemoveRow));

        let container = widget.to_element();
        let first = container.find("id", "sources").expect("first row");
        assert!(first.has_attr("required"));
        assert!(container.find("id", "sources.tpl").is_some());
        assert!(container.find("id", "sources.add").is_some());
    }

    #[test]
    fn zero_or_more_starts_without_rows() {
        let spec = ParameterSpec::new("tags").arity(Arity::ZeroOrMore);
        let container = widget(build(spec).0).to_element();
        let list = container.find("id", "tags.ul").expect("list");
        assert_eq!(list.children().len(), 1, "only the add control");
        assert!(container.find("id", "tags").is_none());
    }

    #[test]
    fn optional_is_a_hidden_disabled_slot() {
        let spec = ParameterSpec::new("note").arity(Arity::Optional);
        let widget = widget(build(spec).0);
        assert_eq!(
            widget.behaviors.iter().collect::<Vec<_>>(),
            vec![&ClientBehavior::Toggle]
        );
        let container = widget.to_element();
        let slot = container.find("id", "note.slot").expect("slot");
        assert_eq!(slot.get_attr("style"), Some("display:none"));
        assert!(container.find("id", "note").expect("input").has_attr("disabled"));
    }

    #[test]
    fn fixed_arity_renders_static_rows() {
        let spec = ParameterSpec::new("point").arity(Arity::Fixed(3));
        let widget = widget(build(spec).0);
        assert!(widget.behaviors.is_empty());
        let element = widget.to_element();
        let mut rows = Vec::new();
        element.find_all("li", &mut rows);
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn accumulating_actions_are_skipped() {
        for action in [ActionKind::Append, ActionKind::AppendConst, ActionKind::Count] {
            let (built, _) = build(ParameterSpec::new("x").action(action));
            assert!(matches!(built, Built::Skip(kind) if kind == action));
        }
    }

    #[test]
    fn help_is_a_submit_button() {
        let (built, _) = build(ParameterSpec::help_action());
        match built {
            Built::Submit(button) => {
                assert_eq!(button.dest, "help");
                assert_eq!(button.kind, ActionKind::Help);
            }
            other => panic!("expected a submit button, got {other:?}"),
        }
    }

    #[test]
    fn unrenderable_default_becomes_a_diagnostic() {
        let spec = ParameterSpec::new("settings").default(Value::Map(BTreeMap::from([(
            "a".to_string(),
            Value::Int(1),
        )])));
        let widget = widget(build(spec).0);
        assert_eq!(widget.kind, WidgetKind::Diagnostic);
        let html = widget.to_element().to_string();
        assert!(html.starts_with(r#"<pre class="diagnostic""#));
        assert!(html.contains("settings"));
    }

    #[test]
    fn handler_hooks_bind_events_and_record_functions() {
        let config = WrapperConfig {
            hooks: Hooks::default().with_handler("csvfile", "onblur", "copy_v(\"%s\",\"zipfile\")"),
            ..WrapperConfig::default()
        };
        let spec = ParameterSpec::new("csvfile").value_type(ValueType::FileIn);
        let widget = widget(build_with(spec, &config).0);
        assert!(
            widget
                .behaviors
                .contains(&ClientBehavior::Named("copy_v".to_string()))
        );
        assert_eq!(
            widget.to_element().get_attr("onblur"),
            Some("copy_v(\"csvfile\",\"zipfile\")")
        );
    }

    #[test]
    fn tickets_are_stable_across_builds() {
        let registry = TicketRegistry::new();
        let config = WrapperConfig::default();
        let constant = Arc::new(Value::Int(7));
        let spec = ParameterSpec::new("lucky").value_type(ValueType::Flag {
            constant: Arc::clone(&constant),
        });
        let builder = WidgetBuilder::new(&registry, &config);
        let first = widget(builder.build(&spec)).to_element().to_string();
        let second = widget(builder.build(&spec)).to_element().to_string();
        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
    }
}
