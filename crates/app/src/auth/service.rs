//! Auth service

use async_trait::async_trait;
use mockall::automock;
use reqwest::Method;
use tracing::{debug, info};

use crate::{
    api::{ApiClient, ApiError},
    auth::{
        errors::AuthError,
        models::{AuthResponse, LoginCredentials, MeResponse, RefreshedToken, RegisterData, User},
    },
};

/// Account endpoints. Successful sign-ins store the issued token; signing
/// out forgets it.
#[automock]
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Create an account and sign in.
    async fn register(&self, data: &RegisterData) -> Result<User, AuthError>;

    /// Sign in.
    async fn login(&self, credentials: &LoginCredentials) -> Result<User, AuthError>;

    /// Revoke the token and sign out.
    async fn logout(&self) -> Result<(), AuthError>;

    /// The signed-in account.
    async fn me(&self) -> Result<User, AuthError>;

    /// Swap the token for a fresh one.
    async fn refresh(&self) -> Result<(), AuthError>;
}

/// [`AuthApi`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpAuthApi {
    client: ApiClient,
}

impl HttpAuthApi {
    /// Auth API using `client`; tokens land in the client's session.
    #[must_use]
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    fn signed_in(&self, response: AuthResponse) -> Result<User, AuthError> {
        self.client.session().store(&response.token)?;

        info!(user_id = response.user.id, "signed in");

        Ok(response.user)
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn register(&self, data: &RegisterData) -> Result<User, AuthError> {
        data.validate()?;

        let url = self.client.url("register");
        let request = self.client.request(Method::POST, &url).json(data);
        let response: AuthResponse = self.client.send_json(&url, request).await?;

        self.signed_in(response)
    }

    async fn login(&self, credentials: &LoginCredentials) -> Result<User, AuthError> {
        let url = self.client.url("login");
        let request = self.client.request(Method::POST, &url).json(credentials);
        let response: AuthResponse = self.client.send_json(&url, request).await?;

        self.signed_in(response)
    }

    async fn logout(&self) -> Result<(), AuthError> {
        let url = self.client.url("logout");
        let request = self.client.request(Method::POST, &url);

        match self.client.send_empty(&url, request).await {
            Ok(()) | Err(ApiError::Unauthenticated) => {}
            Err(error) => return Err(error.into()),
        }

        self.client.session().clear()?;

        info!("signed out");

        Ok(())
    }

    async fn me(&self) -> Result<User, AuthError> {
        let url = self.client.url("me");
        let request = self.client.request(Method::GET, &url);
        let response: MeResponse = self.client.send_json(&url, request).await?;

        Ok(response.user)
    }

    async fn refresh(&self) -> Result<(), AuthError> {
        let url = self.client.url("refresh");
        let request = self.client.request(Method::POST, &url);
        let refreshed: RefreshedToken = self.client.send_json(&url, request).await?;

        self.client.session().store(&refreshed.token)?;

        debug!(token_type = %refreshed.token_type, "token refreshed");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use brew::{
        clock::SystemClock,
        persistence::{MemoryStore, Persistence},
    };
    use serde_json::json;
    use testresult::TestResult;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_partial_json, header, method, path},
    };

    use crate::auth::{
        models::ValidationError,
        session::{AuthSession, BearerToken},
    };

    use super::*;

    fn api(server: &MockServer) -> (HttpAuthApi, AuthSession) {
        let session = AuthSession::new(Persistence::new(
            Arc::new(MemoryStore::new()),
            Arc::new(SystemClock),
        ));
        let client = ApiClient::new(format!("{}/api/v1", server.uri()), session.clone());

        (HttpAuthApi::new(client), session)
    }

    fn auth_response(token: &str) -> serde_json::Value {
        json!({
            "user": {
                "id": 7,
                "name": "Tan Ah Kow",
                "email": "ahkow@example.sg",
                "role": "customer",
            },
            "token": token,
            "token_type": "Bearer",
        })
    }

    #[tokio::test]
    async fn login_stores_the_token() -> TestResult {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/login"))
            .and(body_partial_json(json!({ "email": "ahkow@example.sg" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(auth_response("7|abcdef")))
            .expect(1)
            .mount(&server)
            .await;

        let (api, session) = api(&server);
        let user = api
            .login(&LoginCredentials {
                email: "ahkow@example.sg".to_string(),
                password: "kopi-o-kosong".to_string(),
            })
            .await?;

        assert_eq!(user.id, 7);
        assert_eq!(session.token().as_ref().map(BearerToken::expose), Some("7|abcdef"));

        Ok(())
    }

    #[tokio::test]
    async fn invalid_registrations_never_reach_the_backend() -> TestResult {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/register"))
            .respond_with(ResponseTemplate::new(201).set_body_json(auth_response("7|abcdef")))
            .expect(0)
            .mount(&server)
            .await;

        let (api, _) = api(&server);
        let error = api
            .register(&RegisterData {
                name: "Tan Ah Kow".to_string(),
                email: "ahkow@example.sg".to_string(),
                password: "kopi-o-kosong".to_string(),
                password_confirmation: "teh-o-kosong".to_string(),
            })
            .await
            .err();

        assert!(matches!(
            error,
            Some(AuthError::Validation(ValidationError::PasswordMismatch))
        ));

        Ok(())
    }

    #[tokio::test]
    async fn logout_tolerates_an_expired_token() -> TestResult {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/logout"))
            .and(header("authorization", "Bearer 7|abcdef"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let (api, session) = api(&server);

        session.store(&BearerToken::new("7|abcdef"))?;
        api.logout().await?;

        assert!(!session.is_signed_in());

        Ok(())
    }

    #[tokio::test]
    async fn refresh_replaces_the_token() -> TestResult {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/refresh"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "token": "7|ghijkl", "token_type": "Bearer" })),
            )
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/v1/me"))
            .and(header("authorization", "Bearer 7|ghijkl"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "user": auth_response("unused").get("user").cloned(),
            })))
            .mount(&server)
            .await;

        let (api, session) = api(&server);

        session.store(&BearerToken::new("7|abcdef"))?;
        api.refresh().await?;

        let user = api.me().await?;

        assert_eq!(user.email, "ahkow@example.sg");

        Ok(())
    }
}
