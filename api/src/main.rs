use webwrap_api::config::{ServerConfig, wrapper_from_env};
use webwrap_api::telemetry;

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    let config = ServerConfig::from_env();
    telemetry::init(config.log_format);

    let wrapper = match wrapper_from_env() {
        Ok(wrapper) => wrapper,
        Err(err) => {
            tracing::error!(error = %err, "cannot build the wrapper");
            std::process::exit(2);
        }
    };

    if let Err(err) = webwrap_api::serve(config, wrapper).await {
        tracing::error!(error = %err, "server stopped");
        std::process::exit(1);
    }
}
