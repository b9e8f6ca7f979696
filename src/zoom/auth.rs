//! Server-to-server OAuth token exchange.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, info};

use super::{ZoomClient, ZoomError};
use crate::project::Project;

/// Short-lived bearer token for one project. Never cached; every action
/// fetches a fresh one.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub value: Secret<String>,
    pub obtained_at: DateTime<Utc>,
    pub expires_in: Duration,
}

impl AccessToken {
    pub fn bearer(&self) -> &str {
        self.value.expose_secret()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

impl ZoomClient {
    /// Exchanges the project's account credentials for an access token.
    ///
    /// Single attempt. Any failure is reported as [`ZoomError::Auth`].
    pub async fn get_access_token(&self, project: &Project) -> Result<AccessToken, ZoomError> {
        debug!("Requesting Zoom access token for {}", project.name);

        let response = self
            .client
            .post(&self.config.oauth_url)
            .query(&[
                ("grant_type", "account_credentials"),
                ("account_id", project.account_id.as_str()),
            ])
            .basic_auth(
                &project.client_id,
                Some(project.client_secret.expose_secret()),
            )
            .timeout(self.config.request_timeout())
            .send()
            .await
            .map_err(|e| ZoomError::auth(&project.name, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(
                "Zoom token request for {} failed with status {}: {}",
                project.name, status, body
            );
            return Err(ZoomError::Auth {
                project: project.name.clone(),
                status: Some(status),
                message: format!("token endpoint returned {}", status),
            });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ZoomError::auth(&project.name, e))?;

        if token.access_token.is_empty() {
            return Err(ZoomError::Auth {
                project: project.name.clone(),
                status: Some(status),
                message: "token endpoint returned an empty access token".to_string(),
            });
        }

        info!("Obtained Zoom access token for {}", project.name);

        Ok(AccessToken {
            value: Secret::new(token.access_token),
            obtained_at: Utc::now(),
            expires_in: Duration::from_secs(token.expires_in.unwrap_or(3600)),
        })
    }
}
