pub mod demo;
pub mod serve;

use webwrap_core::Wrapper;

use crate::ServerArgs;
use crate::util::report_error;

/// Serve `wrapper` with the listener settings from `server`.
async fn serve_wrapper(server: &ServerArgs, wrapper: Wrapper) -> i32 {
    let config = server.server_config();
    match webwrap_api::serve(config, wrapper).await {
        Ok(()) => 0,
        Err(e) => report_error(&format!("server stopped: {e}"), None),
    }
}
