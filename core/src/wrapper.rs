use std::fmt;
use std::time::Duration;

use crate::config::WrapperConfig;
use crate::decode::{Decoded, DecodedArguments, Decoder, PostedFields, RequestContext};
use crate::error::{DecodeError, SchemaError, TemplateError};
use crate::execute::{Outcome, Program, execute};
use crate::form::{AssembledForm, assemble};
use crate::schema::{ActionKind, Schema};
use crate::template::{BuiltinTemplates, PageContext, TemplateRenderer, WRAPPER_TEMPLATE};
use crate::ticket::TicketRegistry;
use crate::widget::SubmitButton;

/// A program exposed as a web form: one validated schema, its assembled
/// form, and everything needed to answer a submission.
pub struct Wrapper {
    schema: Schema,
    config: WrapperConfig,
    registry: TicketRegistry,
    assembled: AssembledForm,
    program: Box<dyn Program>,
    renderer: Box<dyn TemplateRenderer>,
}

impl Wrapper {
    pub fn new(
        schema: Schema,
        program: impl Program + 'static,
        config: WrapperConfig,
    ) -> Result<Self, SchemaError> {
        schema.validate()?;
        let registry = TicketRegistry::new();
        let assembled = assemble(&schema, &config, &registry);
        tracing::info!(
            prog = %schema.prog,
            params = schema.params().count(),
            buttons = assembled.buttons.len(),
            tickets = registry.len(),
            "form assembled"
        );
        Ok(Self {
            schema,
            config,
            registry,
            assembled,
            program: Box::new(program),
            renderer: Box::new(BuiltinTemplates),
        })
    }

    pub fn with_renderer(mut self, renderer: impl TemplateRenderer + 'static) -> Self {
        self.renderer = Box::new(renderer);
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn config(&self) -> &WrapperConfig {
        &self.config
    }

    pub fn registry(&self) -> &TicketRegistry {
        &self.registry
    }

    pub fn buttons(&self) -> &[SubmitButton] {
        &self.assembled.buttons
    }

    /// The full page, optionally with diagnostics above the form.
    pub fn render_page(&self, errors: Option<&str>) -> Result<String, TemplateError> {
        let scripts = self
            .assembled
            .behaviors
            .iter()
            .filter_map(|behavior| {
                behavior
                    .snippet()
                    .map(|snippet| (behavior.identifier().to_string(), snippet.to_string()))
            })
            .collect();
        let context = PageContext {
            title: self.schema.prog.clone(),
            form: self.assembled.form.to_string(),
            scripts,
            errors: errors.map(str::to_string),
        };
        self.renderer.render(WRAPPER_TEMPLATE, &context)
    }

    pub fn decode(
        &self,
        fields: &PostedFields,
        context: Option<&RequestContext>,
    ) -> Result<Decoded, DecodeError> {
        Decoder::new(&self.schema, &self.config, &self.registry, &self.assembled.buttons)
            .decode(fields, context)
    }

    /// Run the program with its own captured streams. External commands are
    /// killed once `timeout` elapses.
    pub fn execute(&self, args: &DecodedArguments, timeout: Option<Duration>) -> Outcome {
        execute(self.program.as_ref(), args, timeout)
    }

    /// Reply text for a pressed submit action.
    pub fn describe_action(&self, button: &SubmitButton) -> String {
        match button.kind {
            ActionKind::Help => self.schema.format_help(),
            ActionKind::Version => self.schema.format_version(),
            _ => format!("{}\n", button.dest),
        }
    }
}

impl fmt::Debug for Wrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wrapper")
            .field("prog", &self.schema.prog)
            .field("config", &self.config)
            .field("tickets", &self.registry.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::error::ProgramError;
    use crate::execute::{Exit, IoContext};
    use crate::schema::{Arity, Group, ParameterSpec, ValueType};
    use crate::value::Value;

    fn echo(args: &DecodedArguments, io: &mut IoContext) -> Result<Exit, ProgramError> {
        writeln!(io.stdout, "{args}")?;
        Ok(Exit::Success)
    }

    fn schema() -> Schema {
        Schema::new("greet")
            .version("%(prog)s 1.0")
            .group(
                Group::new("options")
                    .param(ParameterSpec::help_action())
                    .param(ParameterSpec::version_action())
                    .param(ParameterSpec::new("name").required(true))
                    .param(ParameterSpec::flag("verbose", true, false).flags(["-v"])),
            )
    }

    #[test]
    fn rejects_invalid_schemas() {
        let schema = Schema::new("p").group(
            Group::new("g")
                .param(ParameterSpec::new("a").value_type(ValueType::FileOut))
                .param(ParameterSpec::new("b").value_type(ValueType::FileOut)),
        );
        assert!(matches!(
            Wrapper::new(schema, echo, WrapperConfig::default()),
            Err(SchemaError::MultipleOutputFiles(_))
        ));
    }

    #[test]
    fn decodes_and_runs_the_program() {
        let wrapper = Wrapper::new(schema(), echo, WrapperConfig::default()).expect("wrapper");
        let decoded = wrapper
            .decode(&PostedFields::new().with_text("name", "Ada"), None)
            .expect("decode");
        let Decoded::Arguments(args) = decoded else {
            panic!("expected arguments");
        };
        assert_eq!(args.get("name"), Some(&Value::text("Ada")));
        assert_eq!(args.get("verbose"), Some(&Value::Bool(false)));
        assert_eq!(
            wrapper.execute(&args, None),
            Outcome::Completed {
                exit_code: 0,
                output: "Namespace(name=\"Ada\", verbose=False)\n".into()
            }
        );
    }

    #[test]
    fn page_ships_only_used_scripts() {
        let wrapper = Wrapper::new(schema(), echo, WrapperConfig::default()).expect("wrapper");
        let page = wrapper.render_page(None).expect("page");
        assert!(page.contains("<title>greet</title>"));
        assert!(page.contains(r#"name="name""#));
        assert!(!page.contains("function add_row"));

        let growable = Schema::new("tags").group(
            Group::new("options").param(ParameterSpec::new("tags").arity(Arity::ZeroOrMore)),
        );
        let wrapper = Wrapper::new(growable, echo, WrapperConfig::default()).expect("wrapper");
        let page = wrapper.render_page(Some("bad tag")).expect("page");
        assert!(page.contains("function add_row"));
        assert!(page.contains("function remove_row"));
        assert!(!page.contains("function toggle_slot"));
        assert!(page.contains("bad tag"));
    }

    #[test]
    fn describes_help_and_version() {
        let wrapper = Wrapper::new(schema(), echo, WrapperConfig::default()).expect("wrapper");
        let help = wrapper
            .buttons()
            .iter()
            .find(|button| button.kind == ActionKind::Help)
            .expect("help button");
        assert!(wrapper.describe_action(help).starts_with("usage: greet"));
        let version = wrapper
            .buttons()
            .iter()
            .find(|button| button.kind == ActionKind::Version)
            .expect("version button");
        assert_eq!(wrapper.describe_action(version), "greet 1.0\n");

        let trigger = SubmitButton {
            dest: "refresh".into(),
            kind: ActionKind::Trigger,
        };
        assert_eq!(wrapper.describe_action(&trigger), "refresh\n");
    }

    #[test]
    fn custom_renderers_replace_the_page() {
        struct Plain;
        impl TemplateRenderer for Plain {
            fn render(&self, name: &str, context: &PageContext) -> Result<String, TemplateError> {
                Ok(format!("{name}: {}", context.title))
            }
        }
        let wrapper = Wrapper::new(schema(), echo, WrapperConfig::default())
            .expect("wrapper")
            .with_renderer(Plain);
        assert_eq!(wrapper.render_page(None).expect("page"), "wrapper.html: greet");
    }
}
