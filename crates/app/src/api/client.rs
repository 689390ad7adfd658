//! HTTP transport shared by the API clients

use reqwest::{
    Client, Method, RequestBuilder, Response, StatusCode,
    header::{ACCEPT, HeaderValue},
};
use serde::{Deserialize, de::DeserializeOwned};
use tracing::{debug, warn};

use crate::{api::errors::ApiError, auth::session::AuthSession};

/// JSON-over-HTTP access to the versioned backend API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    http: Client,
    session: AuthSession,
}

/// Error body returned by the backend on non-2xx responses.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    code: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

impl ApiClient {
    /// A client for the API rooted at `base_url` (e.g.
    /// `http://localhost:8000/api/v1`).
    #[must_use]
    pub fn new(base_url: impl Into<String>, session: AuthSession) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: Client::new(),
            session,
        }
    }

    /// The session whose token is attached to requests.
    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    /// Absolute URL for `path`.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Start a request, with the bearer token attached when signed in.
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let request = self
            .http
            .request(method, url)
            .header(ACCEPT, HeaderValue::from_static("application/json"));

        match self.session.token() {
            Some(token) => request.bearer_auth(token.expose()),
            None => request,
        }
    }

    /// Send `request` and decode a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] for transport failures, non-2xx responses, and
    /// bodies that don't decode as `T`.
    pub async fn send_json<T: DeserializeOwned>(&self, url: &str, request: RequestBuilder) -> Result<T, ApiError> {
        let response = self.send(url, request).await?;

        response.json().await.map_err(|source| ApiError::Decode {
            url: url.to_string(),
            source,
        })
    }

    /// Send `request`, ignoring any body.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] for transport failures and non-2xx responses.
    pub async fn send_empty(&self, url: &str, request: RequestBuilder) -> Result<(), ApiError> {
        self.send(url, request).await?;

        Ok(())
    }

    /// Send `request`, returning only whether the backend answered 2xx.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Network`] when no response arrives.
    pub async fn probe(&self, url: &str, request: RequestBuilder) -> Result<bool, ApiError> {
        let response = request.send().await.map_err(|source| ApiError::Network {
            url: url.to_string(),
            source,
        })?;

        debug!(%url, status = %response.status(), "probe");

        Ok(response.status().is_success())
    }

    async fn send(&self, url: &str, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request.send().await.map_err(|source| ApiError::Network {
            url: url.to_string(),
            source,
        })?;

        let status = response.status();

        debug!(%url, %status, "response");

        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthenticated);
        }

        let body = response.json::<ErrorBody>().await.unwrap_or_else(|error| {
            warn!(%url, %error, "unreadable error body");

            ErrorBody::default()
        });

        Err(ApiError::Status {
            url: url.to_string(),
            status,
            message: body.message.unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .map_or_else(|| format!("HTTP error {}", status.as_u16()), str::to_string)
            }),
            code: body.code,
            kind: body.kind,
        })
    }
}
