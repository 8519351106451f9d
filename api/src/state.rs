use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use webwrap_core::Wrapper;

use crate::config::ServerConfig;

#[derive(Clone)]
pub struct AppState {
    pub wrapper: Arc<Wrapper>,
    pub favicon: Option<PathBuf>,
    pub execution_timeout: Duration,
}

impl AppState {
    pub fn new(wrapper: Wrapper, config: &ServerConfig) -> Self {
        Self {
            wrapper: Arc::new(wrapper),
            favicon: config.favicon.clone(),
            execution_timeout: config.execution_timeout,
        }
    }
}
