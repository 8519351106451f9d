use webwrap_api::config::load_schema;
use webwrap_api::telemetry;
use webwrap_core::{CommandProgram, Wrapper};

use crate::util::report_error;
use crate::{ServerArgs, TargetArgs};

pub async fn run(target: TargetArgs, server: ServerArgs) -> i32 {
    telemetry::init(server.log_format);

    let schema = match load_schema(target.schema.clone()) {
        Ok(schema) => schema,
        Err(e) => {
            return report_error(
                &e.to_string(),
                Some("The schema is a JSON document with 'prog' and 'groups'"),
            );
        }
    };
    let config = match server.wrapper_config() {
        Ok(config) => config,
        Err(e) => return report_error(&e, None),
    };

    let program = CommandProgram::new(&target.command, &schema).args(target.args);
    tracing::info!(command = %target.command, schema = %target.schema.display(), "wrapping external command");

    match Wrapper::new(schema, program, config) {
        Ok(wrapper) => super::serve_wrapper(&server, wrapper).await,
        Err(e) => report_error(&e.to_string(), None),
    }
}
