use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueHint};
use webwrap_api::config::{DEFAULT_HOST, DEFAULT_PORT, LogFormat, ServerConfig, load_hooks};
use webwrap_core::WrapperConfig;

mod commands;
mod util;

#[derive(Parser)]
#[command(name = "webwrap", version, about = "Serve a command line program as a web form")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Serve an external program described by a JSON schema
    Serve {
        #[command(flatten)]
        target: TargetArgs,
        #[command(flatten)]
        server: ServerArgs,
    },
    /// Serve a form for `webwrap serve` itself
    Demo {
        #[command(flatten)]
        server: ServerArgs,
    },
}

#[derive(Args, Debug)]
pub(crate) struct TargetArgs {
    /// JSON document describing the program's parameters
    #[arg(long, value_hint = ValueHint::FilePath)]
    schema: PathBuf,
    /// Executable to run on every submission
    #[arg(long)]
    command: String,
    /// Extra leading argument passed before the form's arguments (repeatable)
    #[arg(long = "arg", allow_hyphen_values = true)]
    args: Vec<String>,
}

#[derive(Args, Debug)]
#[command(next_help_heading = "Server")]
pub(crate) struct ServerArgs {
    /// Address to bind
    #[arg(short = 'H', long, env = "WEBWRAP_HOST", default_value = DEFAULT_HOST)]
    host: String,
    /// Port to listen on
    #[arg(short = 'P', long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,
    /// Prefix for the request/response handles passed to the program
    #[arg(short = 'x', long)]
    prefix: Option<String>,
    /// Parameter group to leave out of the form (repeatable)
    #[arg(short = 's', long = "skip-group")]
    skip_groups: Vec<String>,
    /// Lay groups out as tables instead of grids
    #[arg(short = 'U', long)]
    use_tables: bool,
    /// JSON file of per-destination hooks
    #[arg(long, value_hint = ValueHint::FilePath)]
    hooks: Option<PathBuf>,
    /// Name attribute of the generated form
    #[arg(long)]
    form_name: Option<String>,
    /// Seconds a single execution may take
    #[arg(long, env = "WEBWRAP_TIMEOUT_SECS", default_value_t = 300)]
    timeout: u64,
    /// Icon served at /favicon.ico
    #[arg(long, env = "WEBWRAP_FAVICON")]
    favicon: Option<PathBuf>,
    /// Log output: json or text
    #[arg(long, env = "WEBWRAP_LOG_FORMAT", default_value = "json")]
    log_format: LogFormat,
}

impl ServerArgs {
    pub(crate) fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.host.clone(),
            port: self.port,
            favicon: self.favicon.clone(),
            execution_timeout: Duration::from_secs(self.timeout),
            log_format: self.log_format,
        }
    }

    pub(crate) fn wrapper_config(&self) -> Result<WrapperConfig, String> {
        let mut config = WrapperConfig::default();
        if let Some(name) = &self.form_name {
            config.form_name = name.clone();
        }
        config.destination_prefix = self.prefix.clone().filter(|prefix| !prefix.is_empty());
        config.skip_groups = self.skip_groups.iter().cloned().collect();
        config.use_tables = self.use_tables;
        if let Some(path) = &self.hooks {
            config.hooks = load_hooks(path.clone()).map_err(|e| e.to_string())?;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let code = match cli.command {
        Commands::Serve { target, server } => commands::serve::run(target, server).await,
        Commands::Demo { server } => commands::demo::run(server).await,
    };
    std::process::exit(code);
}
