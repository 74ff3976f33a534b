use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::auth::{resolver::UserResolver, ResolveError, User, UserId};

#[derive(Debug, Deserialize)]
struct AuthServiceReply {
    success: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    data: Option<AuthServiceUser>,
}

#[derive(Debug, Deserialize)]
struct AuthServiceUser {
    id: UserId,
}

/// Resolves tokens against an external auth service.
///
/// The token is POSTed as `{"auth_token": ...}` and the service answers
/// `{"success": bool, "error": string?, "data": {"id": u64}?}`.
pub struct RemoteUserResolver {
    client: Client,
    url: String,
}

impl RemoteUserResolver {
    /// # Errors
    ///
    /// Returns [`ResolveError::Unavailable`] if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ResolveError> {
        let client = Client::builder()
            .timeout(timeout)
            .use_rustls_tls()
            .build()
            .map_err(|e| ResolveError::Unavailable(format!("client build failed: {e}")))?;
        Ok(Self { client, url: url.into() })
    }
}

#[async_trait]
impl UserResolver for RemoteUserResolver {
    async fn resolve(&self, token: Option<&str>) -> Result<Option<User>, ResolveError> {
        let token = match token {
            Some(token) if !token.is_empty() => token,
            _ => return Err(ResolveError::NoAuthInfo),
        };

        let response = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "auth_token": token }))
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "auth service request failed");
                ResolveError::Unavailable("auth service unreachable".to_string())
            })?;

        let status = response.status();
        if status.is_server_error() {
            return Err(ResolveError::Unavailable(format!("auth service returned {status}")));
        }

        let reply: AuthServiceReply = response.json().await.map_err(|e| {
            tracing::warn!(error = %e, "auth service returned an unreadable body");
            ResolveError::Unavailable("auth service returned an invalid reply".to_string())
        })?;

        if !reply.success {
            return Err(ResolveError::Invalid(
                reply.error.unwrap_or_else(|| "token rejected".to_string()),
            ));
        }

        Ok(reply.data.map(|data| User::new(data.id)).filter(|user| !user.is_anonymous()))
    }
}
