use std::io::Write;

use clap::CommandFactory;
use webwrap_api::telemetry;
use webwrap_core::source::from_clap;
use webwrap_core::{DecodedArguments, Exit, IoContext, ProgramError, Schema, Wrapper};

use crate::util::report_error;
use crate::{Cli, ServerArgs};

const BANNER: &str = "\
This form was generated from the `webwrap serve` command line.
Submitting it does not start anything; it shows what the program would receive.
";

/// Schema of the `serve` subcommand, as the demo form presents it.
pub fn serve_schema() -> Option<Schema> {
    Cli::command()
        .find_subcommand("serve")
        .cloned()
        .map(|serve| from_clap(serve.name("webwrap serve")))
}

fn describe(args: &DecodedArguments, io: &mut IoContext) -> Result<Exit, ProgramError> {
    io.stdout.write_all(BANNER.as_bytes())?;
    writeln!(io.stdout)?;
    for (dest, value) in args.values() {
        writeln!(io.stdout, "  {dest} = {value}")?;
    }
    Ok(Exit::Success)
}

pub async fn run(server: ServerArgs) -> i32 {
    telemetry::init(server.log_format);

    let Some(schema) = serve_schema() else {
        return report_error("the serve subcommand is missing", None);
    };
    let config = match server.wrapper_config() {
        Ok(config) => config,
        Err(e) => return report_error(&e, None),
    };
    match Wrapper::new(schema, describe, config) {
        Ok(wrapper) => super::serve_wrapper(&server, wrapper).await,
        Err(e) => report_error(&e.to_string(), None),
    }
}

#[cfg(test)]
mod tests {
    use webwrap_core::{ActionKind, Decoded, PostedFields, Value, ValueType, WrapperConfig};

    use super::*;

    #[test]
    fn serve_command_becomes_a_form() {
        let schema = serve_schema().expect("serve subcommand");
        assert_eq!(schema.prog, "webwrap serve");
        assert!(schema.validate().is_ok());

        let schema_file = schema.param("schema").expect("schema param");
        assert!(matches!(schema_file.value_type, ValueType::FileIn));
        assert!(schema_file.required);

        let port = schema.param("port").expect("port param");
        assert!(matches!(port.value_type, ValueType::Integer));
        assert_eq!(port.default, Value::Int(8080));
        assert_eq!(port.group, "Server");

        assert!(matches!(
            schema.param("use_tables").map(|p| &p.value_type),
            Some(ValueType::Flag { .. })
        ));
        assert_eq!(schema.param("help").map(|p| p.action), Some(ActionKind::Help));
    }

    #[test]
    fn demo_program_echoes_arguments() {
        let schema = serve_schema().expect("serve subcommand");
        let wrapper = Wrapper::new(schema, describe, WrapperConfig::default()).expect("wrapper");
        let fields = PostedFields::new()
            .with_text("command", "gzip")
            .with_text("port", "9000");
        let Decoded::Arguments(args) = wrapper.decode(&fields, None).expect("decode") else {
            panic!("expected arguments");
        };
        match wrapper.execute(&args, None) {
            webwrap_core::Outcome::Completed { exit_code, output } => {
                assert_eq!(exit_code, 0);
                assert!(output.starts_with("This form was generated"));
                assert!(output.contains("command = gzip"));
                assert!(output.contains("port = 9000"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }
}
