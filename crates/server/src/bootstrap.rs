use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use intake_core::config::{AppConfig, ConfigError, LoadOptions};
use intake_core::workflow::default_registry;
use intake_core::{DedupingRelay, RelaySink};
use intake_slack::api::{RetryPolicy, SlackApi};
use intake_slack::events::default_dispatcher;
use intake_slack::socket::{NoopSocketTransport, ReconnectPolicy, SocketModeRunner};

use crate::http::{HttpRelaySink, HttpSlackApi};

pub struct Application {
    pub config: AppConfig,
    pub slack_runner: SocketModeRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("http client construction failed: {0}")]
    HttpClient(#[source] reqwest::Error),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config)
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    // Registry and dispatcher are built exactly once here and treated as
    // read-only for the life of the process.
    let registry = Arc::new(default_registry());
    let dispatcher = default_dispatcher();
    let retry_policy = RetryPolicy::new(config.retry.max_attempts, config.retry.base_delay());

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.relay.timeout_secs))
        .build()
        .map_err(BootstrapError::HttpClient)?;

    let api: Arc<dyn SlackApi> =
        Arc::new(HttpSlackApi::new(http_client.clone(), config.slack.bot_token.clone()));
    let relay: Arc<dyn RelaySink> = Arc::new(DedupingRelay::new(HttpRelaySink::new(
        http_client,
        config.relay.endpoint_url.clone(),
    )));

    let slack_runner = SocketModeRunner::new(
        Arc::new(NoopSocketTransport),
        dispatcher,
        ReconnectPolicy::default(),
        api,
        relay,
        registry,
        retry_policy,
    );

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        relay_endpoint = %config.relay.endpoint_url,
        retry_max_attempts = config.retry.max_attempts,
        "application bootstrap complete"
    );

    Ok(Application { config, slack_runner })
}
