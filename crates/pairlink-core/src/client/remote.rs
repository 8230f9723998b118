use crate::api::{
    error_message_from_body, ConnectionSummary, ConnectionsResponse, CreateSessionRequest,
    PairingCodeResponse, ProfileSummary, StatusResponse,
};
use crate::client::config::RemoteServiceConfig;
use crate::client::types::ConnectionStatus;

use std::future::Future;
use std::sync::Arc;

/// Failure of a single request against the remote connection service.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// HTTP 404 on a connection's status or pairing code: the remote has no
    /// such connection.
    #[error("not found")]
    NotFound,
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("request failed: {0}")]
    Network(String),
    #[error("invalid response: {0}")]
    Decode(String),
    #[error("unrecognized status '{0}'")]
    UnknownStatus(String),
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// A 404 on a per-connection lookup means the connection is gone.
    fn connection_lookup(self) -> Self {
        match self {
            Self::Http { status: 404, .. } => Self::NotFound,
            other => other,
        }
    }

    /// Text suitable for the user: the service's own message where it sent one.
    pub fn user_message(&self) -> String {
        match self {
            Self::Http { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Operations the controller consumes from the remote connection service.
///
/// `HttpSessionApi` talks to the real service; tests substitute a scripted fake.
pub trait SessionApi: Send + Sync + 'static {
    /// Create (or restart) the named connection bound to a profile.
    fn create(
        &self,
        name: &str,
        profile_id: &str,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// Current remote status of the named connection.
    fn status(&self, name: &str)
    -> impl Future<Output = Result<ConnectionStatus, ApiError>> + Send;

    /// Pairing artifact, if the remote has produced one yet.
    fn pairing_code(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Option<String>, ApiError>> + Send;

    /// Tear the named connection down on the remote.
    fn terminate(&self, name: &str) -> impl Future<Output = Result<(), ApiError>> + Send;
}

impl<T: SessionApi> SessionApi for Arc<T> {
    fn create(
        &self,
        name: &str,
        profile_id: &str,
    ) -> impl Future<Output = Result<(), ApiError>> + Send {
        (**self).create(name, profile_id)
    }

    fn status(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<ConnectionStatus, ApiError>> + Send {
        (**self).status(name)
    }

    fn pairing_code(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Option<String>, ApiError>> + Send {
        (**self).pairing_code(name)
    }

    fn terminate(&self, name: &str) -> impl Future<Output = Result<(), ApiError>> + Send {
        (**self).terminate(name)
    }
}

/// reqwest-backed client for the remote connection service.
#[derive(Clone)]
pub struct HttpSessionApi {
    client: reqwest::Client,
    config: RemoteServiceConfig,
}

impl HttpSessionApi {
    pub fn new(config: RemoteServiceConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &RemoteServiceConfig {
        &self.config
    }

    /// List the user's stored connections.
    pub async fn list_connections(&self) -> Result<Vec<ConnectionSummary>, ApiError> {
        let url = join_url(&self.config.base_url, &["connections"])?;
        let resp = self.send(self.client.get(url)).await?;
        let body: ConnectionsResponse = decode(resp).await?;
        Ok(body.connections)
    }

    /// List the profiles a connection can be bound to.
    pub async fn list_profiles(&self) -> Result<Vec<ProfileSummary>, ApiError> {
        let url = join_url(&self.config.profiles_url, &["prompts"])?;
        let resp = self.send(self.client.get(url)).await?;
        decode(resp).await
    }

    /// Apply timeout and cookie, send, and map non-2xx responses to `ApiError`.
    async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ApiError> {
        let mut request = request.timeout(self.config.request_timeout());
        if let Some(ref cookie) = self.config.cookie {
            request = request.header(reqwest::header::COOKIE, cookie.as_str());
        }

        let resp = request
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        let message = error_message_from_body(&body).unwrap_or_else(|| {
            status
                .canonical_reason()
                .map(str::to_string)
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
        });
        Err(ApiError::Http {
            status: status.as_u16(),
            message,
        })
    }
}

impl SessionApi for HttpSessionApi {
    async fn create(&self, name: &str, profile_id: &str) -> Result<(), ApiError> {
        let url = join_url(&self.config.base_url, &["session"])?;
        let body = CreateSessionRequest {
            connection_name: name.to_string(),
            profile_id: profile_id.to_string(),
        };
        self.send(self.client.post(url).json(&body)).await?;
        Ok(())
    }

    async fn status(&self, name: &str) -> Result<ConnectionStatus, ApiError> {
        let url = join_url(&self.config.base_url, &["session", name, "status"])?;
        let resp = self
            .send(self.client.get(url))
            .await
            .map_err(ApiError::connection_lookup)?;
        let body: StatusResponse = decode(resp).await?;
        ConnectionStatus::from_remote(&body.status).ok_or(ApiError::UnknownStatus(body.status))
    }

    async fn pairing_code(&self, name: &str) -> Result<Option<String>, ApiError> {
        let url = join_url(&self.config.base_url, &["session", name, "qr"])?;
        let resp = self
            .send(self.client.get(url))
            .await
            .map_err(ApiError::connection_lookup)?;
        let body: PairingCodeResponse = decode(resp).await?;
        Ok(body.qr)
    }

    async fn terminate(&self, name: &str) -> Result<(), ApiError> {
        let url = join_url(&self.config.base_url, &["session", name])?;
        self.send(self.client.delete(url)).await?;
        Ok(())
    }
}

async fn decode<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T, ApiError> {
    resp.json::<T>()
        .await
        .map_err(|e| ApiError::Decode(e.to_string()))
}

/// Append path segments to a base URL, percent-encoding each one.
pub(crate) fn join_url(base: &str, segments: &[&str]) -> Result<reqwest::Url, ApiError> {
    let mut url =
        reqwest::Url::parse(base).map_err(|e| ApiError::InvalidUrl(format!("{}: {}", base, e)))?;
    url.path_segments_mut()
        .map_err(|_| ApiError::InvalidUrl(format!("{}: cannot be a base", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_url_appends_segments() {
        let url = join_url("http://localhost:3000/api/whatsapp", &["session", "Main", "qr"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/api/whatsapp/session/Main/qr");
    }

    #[test]
    fn join_url_handles_trailing_slash() {
        let url = join_url("http://localhost:3000/api/", &["session"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/api/session");
    }

    #[test]
    fn join_url_encodes_names() {
        let url = join_url("http://h/api", &["session", "main office/2", "status"]).unwrap();
        assert_eq!(url.as_str(), "http://h/api/session/main%20office%2F2/status");
    }

    #[test]
    fn join_url_rejects_garbage() {
        assert!(matches!(
            join_url("not a url", &["session"]),
            Err(ApiError::InvalidUrl(_))
        ));
        assert!(matches!(
            join_url("mailto:someone@example.com", &["session"]),
            Err(ApiError::InvalidUrl(_))
        ));
    }

    #[test]
    fn user_message_prefers_service_text() {
        let err = ApiError::Http {
            status: 400,
            message: "profile not found".into(),
        };
        assert_eq!(err.user_message(), "profile not found");
        assert_eq!(err.to_string(), "HTTP 400: profile not found");
        assert_eq!(
            ApiError::Network("connection refused".into()).user_message(),
            "request failed: connection refused"
        );
    }

    #[test]
    fn only_404_counts_as_missing_connection() {
        let missing = ApiError::Http {
            status: 404,
            message: "Not Found".into(),
        };
        assert_eq!(missing.connection_lookup(), ApiError::NotFound);

        let failed = ApiError::Http {
            status: 500,
            message: "boom".into(),
        };
        assert_eq!(failed.clone().connection_lookup(), failed);
        assert_eq!(
            ApiError::Network("reset".into()).connection_lookup(),
            ApiError::Network("reset".into())
        );
    }
}
