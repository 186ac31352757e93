//! Build server notification

use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::NotifierSettings;
use crate::error::{RelayError, Result};
use crate::targets::BuildTarget;

pub const PROJECT_PLACEHOLDER: &str = "<project>";
pub const TOKEN_PLACEHOLDER: &str = "<token>";

/// Substitute the first `<project>` and `<token>` in `template` and prefix
/// the host.
pub fn render_notify_url(host: &str, template: &str, target: &BuildTarget) -> String {
    let path = template
        .replacen(PROJECT_PLACEHOLDER, &target.name, 1)
        .replacen(TOKEN_PLACEHOLDER, &target.token, 1);
    format!("{}{}", host, path)
}

/// Triggers builds on the CD server. Holds the default connection settings
/// used for targets without a complete dedicated server.
#[derive(Debug, Clone)]
pub struct Notifier {
    client: Client,
    defaults: NotifierSettings,
}

impl Notifier {
    pub fn new(defaults: NotifierSettings) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(secs) = defaults.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build().map_err(|e| {
            RelayError::ConfigError(format!("Failed to create HTTP client: {}", e))
        })?;

        Ok(Self { client, defaults })
    }

    /// Trigger URL for `target`
    pub fn notify_url(&self, target: &BuildTarget) -> String {
        match target.dedicated_server() {
            Some(server) => render_notify_url(server.host, server.url_template, target),
            None => render_notify_url(&self.defaults.host, &self.defaults.notify_url, target),
        }
    }

    /// Basic auth user and API token for `target`
    pub fn credentials<'a>(&'a self, target: &'a BuildTarget) -> (&'a str, &'a str) {
        match target.dedicated_server() {
            Some(server) => (server.username, server.api_token),
            None => (&self.defaults.username, &self.defaults.api_token),
        }
    }

    /// POST to the target's trigger URL. Only a 200 response counts as
    /// delivered.
    pub async fn notify(&self, target: &BuildTarget) -> Result<()> {
        if target.is_empty() {
            return Err(RelayError::ConfigError(
                "Build target name or token is empty".to_string(),
            ));
        }

        let url = self.notify_url(target);
        let (username, api_token) = self.credentials(target);
        debug!("Notifying build target '{}' as '{}'", target.name, username);

        let response = self
            .client
            .post(&url)
            .basic_auth(username, Some(api_token))
            .send()
            .await
            .map_err(|source| RelayError::DeliveryFailed {
                target: target.name.clone(),
                source,
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(RelayError::DeliveryRejected {
                target: target.name.clone(),
                status: status.to_string(),
            });
        }

        info!("Notified to project {}", target.name);
        Ok(())
    }
}
