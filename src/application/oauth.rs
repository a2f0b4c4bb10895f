use crate::domain::models::OAuthToken;
use crate::infrastructure::credential_store::CredentialStore;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::oauth_client::{
    ClientCredentials, OAuthHttpClient, TokenGrant, TokenGrantRequest,
};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use url::Url;

pub const DEFAULT_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
pub const DEFAULT_AUTHORIZATION_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const EXPIRY_LEEWAY_SECONDS: i64 = 60;

#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub token_endpoint: String,
    pub authorization_endpoint: String,
}

impl OAuthConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            token_endpoint: DEFAULT_TOKEN_ENDPOINT.to_string(),
            authorization_endpoint: DEFAULT_AUTHORIZATION_ENDPOINT.to_string(),
        }
    }

    fn client_credentials(&self) -> ClientCredentials {
        ClientCredentials {
            token_endpoint: self.token_endpoint.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnsureCredential {
    Existing(OAuthToken),
    Refreshed(OAuthToken),
    Pending(AuthorizationRequest),
}

pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;
pub type StateProvider = Arc<dyn Fn() -> String + Send + Sync>;

/// Owns the single stored credential: reuse, refresh, or start a new handshake.
pub struct OAuthManager<S, C>
where
    S: CredentialStore,
    C: OAuthHttpClient,
{
    config: OAuthConfig,
    credential_store: Arc<S>,
    oauth_client: Arc<C>,
    now_provider: NowProvider,
    state_provider: StateProvider,
}

impl<S, C> OAuthManager<S, C>
where
    S: CredentialStore,
    C: OAuthHttpClient,
{
    pub fn new(config: OAuthConfig, credential_store: Arc<S>, oauth_client: Arc<C>) -> Self {
        Self {
            config,
            credential_store,
            oauth_client,
            now_provider: Arc::new(Utc::now),
            state_provider: Arc::new(default_state),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn with_state_provider(mut self, state_provider: StateProvider) -> Self {
        self.state_provider = state_provider;
        self
    }

    pub fn is_token_valid(&self, token: &OAuthToken) -> bool {
        token.is_valid_at((self.now_provider)(), EXPIRY_LEEWAY_SECONDS)
    }

    pub fn build_authorization_url(
        &self,
        required_scopes: &[String],
        state: &str,
    ) -> Result<String, InfraError> {
        if state.trim().is_empty() {
            return Err(InfraError::OAuth("state must not be empty".to_string()));
        }
        if required_scopes.is_empty() {
            return Err(InfraError::OAuth("at least one scope is required".to_string()));
        }

        let mut url = Url::parse(&self.config.authorization_endpoint)
            .map_err(|error| InfraError::OAuth(format!("invalid authorization endpoint: {error}")))?;
        let scope = required_scopes.join(" ");

        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("scope", &scope)
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("state", state);

        Ok(url.to_string())
    }

    pub async fn ensure_credential(
        &self,
        required_scopes: &[String],
    ) -> Result<EnsureCredential, InfraError> {
        let Some(stored_token) = self.credential_store.load_token()? else {
            return self.pending(required_scopes);
        };

        if !stored_token.covers_scopes(required_scopes) {
            return self.pending(required_scopes);
        }

        if self.is_token_valid(&stored_token) {
            return Ok(EnsureCredential::Existing(stored_token));
        }

        let Some(refresh_token) = stored_token.refresh_token.clone().filter(|_| stored_token.is_refreshable())
        else {
            return self.pending(required_scopes);
        };

        let refreshed = self
            .oauth_client
            .request_token(
                &self.config.client_credentials(),
                TokenGrantRequest::RefreshToken { refresh_token },
            )
            .await;

        match refreshed {
            Ok(grant) => {
                let token = self.token_from_grant(grant, &stored_token);
                self.credential_store.save_token(&token)?;
                Ok(EnsureCredential::Refreshed(token))
            }
            Err(InfraError::OAuth(_)) => self.pending(required_scopes),
            Err(error) => Err(error),
        }
    }

    pub async fn complete_authentication(
        &self,
        authorization_code: &str,
    ) -> Result<OAuthToken, InfraError> {
        let code = authorization_code.trim();
        if code.is_empty() {
            return Err(InfraError::OAuth("authorization code must not be empty".to_string()));
        }

        let grant = self
            .oauth_client
            .request_token(
                &self.config.client_credentials(),
                TokenGrantRequest::AuthorizationCode {
                    code: code.to_string(),
                    redirect_uri: self.config.redirect_uri.clone(),
                },
            )
            .await?;

        let expires_at = self.expiry_from(&grant);
        let token = OAuthToken {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            expires_at,
            token_type: grant.token_type.unwrap_or_else(|| "Bearer".to_string()),
            scope: grant.scope,
        };
        self.credential_store.save_token(&token)?;
        Ok(token)
    }

    pub fn clear_stored_token(&self) -> Result<(), InfraError> {
        self.credential_store.delete_token()
    }

    fn pending(&self, required_scopes: &[String]) -> Result<EnsureCredential, InfraError> {
        let state = (self.state_provider)();
        let url = self.build_authorization_url(required_scopes, &state)?;
        Ok(EnsureCredential::Pending(AuthorizationRequest { url, state }))
    }

    fn expiry_from(&self, grant: &TokenGrant) -> DateTime<Utc> {
        (self.now_provider)() + Duration::seconds(grant.expires_in.max(0))
    }

    fn token_from_grant(&self, grant: TokenGrant, previous: &OAuthToken) -> OAuthToken {
        let expires_at = self.expiry_from(&grant);
        OAuthToken {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token.or_else(|| previous.refresh_token.clone()),
            expires_at,
            token_type: grant.token_type.unwrap_or_else(|| "Bearer".to_string()),
            scope: grant.scope.or_else(|| previous.scope.clone()),
        }
    }
}

fn default_state() -> String {
    crate::application::commands::next_id("oauth-state")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::credential_store::InMemoryCredentialStore;
    use async_trait::async_trait;
    use proptest::prelude::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar";

    #[derive(Debug, Clone)]
    enum FakeResponse {
        Success(TokenGrant),
        OAuthError(String),
        TransportError(String),
    }

    impl Default for FakeResponse {
        fn default() -> Self {
            Self::Success(TokenGrant {
                access_token: "fake_access".to_string(),
                refresh_token: Some("fake_refresh".to_string()),
                expires_in: 3600,
                token_type: Some("Bearer".to_string()),
                scope: Some(CALENDAR_SCOPE.to_string()),
            })
        }
    }

    #[derive(Debug, Default)]
    struct FakeOAuthHttpClient {
        response: Mutex<FakeResponse>,
        grants: Mutex<Vec<TokenGrantRequest>>,
        calls: AtomicUsize,
    }

    impl FakeOAuthHttpClient {
        fn set_response(&self, response: FakeResponse) {
            let mut guard = self.response.lock().expect("response mutex poisoned");
            *guard = response;
        }

        fn refresh_calls(&self) -> usize {
            self.grants
                .lock()
                .expect("grants mutex poisoned")
                .iter()
                .filter(|grant| matches!(grant, TokenGrantRequest::RefreshToken { .. }))
                .count()
        }
    }

    #[async_trait]
    impl OAuthHttpClient for FakeOAuthHttpClient {
        async fn request_token(
            &self,
            _client: &ClientCredentials,
            grant: TokenGrantRequest,
        ) -> Result<TokenGrant, InfraError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.grants.lock().expect("grants mutex poisoned").push(grant);
            match self.response.lock().expect("response mutex poisoned").clone() {
                FakeResponse::Success(value) => Ok(value),
                FakeResponse::OAuthError(message) => Err(InfraError::OAuth(message)),
                FakeResponse::TransportError(message) => Err(InfraError::Io(
                    std::io::Error::new(std::io::ErrorKind::ConnectionReset, message),
                )),
            }
        }
    }

    fn test_config() -> OAuthConfig {
        OAuthConfig::new("client-id", "client-secret", "http://localhost/oauth2/callback")
    }

    fn required_scopes() -> Vec<String> {
        vec![CALENDAR_SCOPE.to_string()]
    }

    fn manager(
        store: &Arc<InMemoryCredentialStore>,
        client: &Arc<FakeOAuthHttpClient>,
    ) -> OAuthManager<InMemoryCredentialStore, FakeOAuthHttpClient> {
        OAuthManager::new(test_config(), Arc::clone(store), Arc::clone(client))
            .with_state_provider(Arc::new(|| "fixed-state".to_string()))
    }

    fn token_pattern() -> impl Strategy<Value = String> {
        "[A-Za-z0-9._\\-]{1,64}".prop_map(|value| value.to_string())
    }

    fn arb_oauth_token() -> impl Strategy<Value = OAuthToken> {
        (
            token_pattern(),
            prop::option::of(token_pattern()),
            120i64..604800i64,
            token_pattern(),
        )
            .prop_map(|(access_token, refresh_token, expires_in_seconds, token_type)| OAuthToken {
                access_token,
                refresh_token,
                expires_at: Utc::now() + Duration::seconds(expires_in_seconds),
                token_type,
                scope: Some(format!("openid {CALENDAR_SCOPE}")),
            })
    }

    proptest! {
        #[test]
        fn stored_token_roundtrip(token in arb_oauth_token()) {
            let store = InMemoryCredentialStore::default();
            store.save_token(&token).expect("save token");
            let loaded = store.load_token().expect("load token").expect("token exists");
            prop_assert_eq!(loaded, token);
        }
    }

    proptest! {
        #[test]
        fn valid_token_is_returned_without_token_endpoint_calls(token in arb_oauth_token()) {
            let runtime = tokio::runtime::Runtime::new().expect("runtime");
            runtime.block_on(async move {
                let store = Arc::new(InMemoryCredentialStore::default());
                store.save_token(&token).expect("save token");
                let client = Arc::new(FakeOAuthHttpClient::default());

                let result = manager(&store, &client)
                    .ensure_credential(&required_scopes())
                    .await
                    .expect("ensure credential");

                assert_eq!(result, EnsureCredential::Existing(token));
                assert_eq!(client.calls.load(Ordering::SeqCst), 0);
            });
        }
    }

    proptest! {
        #[test]
        fn expired_token_with_failed_refresh_requires_authorization(
            access_token in token_pattern(),
            refresh_token in prop::option::of(token_pattern()),
            expired_seconds_ago in 1i64..86400i64
        ) {
            let runtime = tokio::runtime::Runtime::new().expect("runtime");
            runtime.block_on(async move {
                let expired = OAuthToken {
                    access_token,
                    refresh_token: refresh_token.clone(),
                    expires_at: Utc::now() - Duration::seconds(expired_seconds_ago),
                    token_type: "Bearer".to_string(),
                    scope: Some(CALENDAR_SCOPE.to_string()),
                };
                let store = Arc::new(InMemoryCredentialStore::default());
                store.save_token(&expired).expect("save token");
                let client = Arc::new(FakeOAuthHttpClient::default());
                client.set_response(FakeResponse::OAuthError("invalid_grant".to_string()));

                let result = manager(&store, &client)
                    .ensure_credential(&required_scopes())
                    .await
                    .expect("ensure credential");

                assert!(matches!(result, EnsureCredential::Pending(_)));
                let expected_refreshes = usize::from(refresh_token.is_some());
                assert_eq!(client.refresh_calls(), expected_refreshes);
            });
        }
    }

    #[tokio::test]
    async fn absent_credential_yields_authorization_url_bound_to_scopes() {
        let store = Arc::new(InMemoryCredentialStore::default());
        let client = Arc::new(FakeOAuthHttpClient::default());

        let result = manager(&store, &client)
            .ensure_credential(&required_scopes())
            .await
            .expect("ensure credential");

        let EnsureCredential::Pending(request) = result else {
            panic!("expected pending authorization");
        };
        assert_eq!(request.state, "fixed-state");
        let url = Url::parse(&request.url).expect("authorization url parses");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("scope".to_string(), CALENDAR_SCOPE.to_string())));
        assert!(pairs.contains(&(
            "redirect_uri".to_string(),
            "http://localhost/oauth2/callback".to_string()
        )));
        assert!(pairs.contains(&("state".to_string(), "fixed-state".to_string())));
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn valid_token_missing_a_scope_requires_authorization() {
        let store = Arc::new(InMemoryCredentialStore::default());
        store
            .save_token(&OAuthToken {
                access_token: "access".to_string(),
                refresh_token: Some("refresh".to_string()),
                expires_at: Utc::now() + Duration::hours(1),
                token_type: "Bearer".to_string(),
                scope: Some("openid".to_string()),
            })
            .expect("save token");
        let client = Arc::new(FakeOAuthHttpClient::default());

        let result = manager(&store, &client)
            .ensure_credential(&required_scopes())
            .await
            .expect("ensure credential");

        assert!(matches!(result, EnsureCredential::Pending(_)));
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_and_persisted_with_previous_refresh_token() {
        let store = Arc::new(InMemoryCredentialStore::default());
        store
            .save_token(&OAuthToken {
                access_token: "expired-token".to_string(),
                refresh_token: Some("refresh-token".to_string()),
                expires_at: Utc::now() - Duration::seconds(120),
                token_type: "Bearer".to_string(),
                scope: Some(CALENDAR_SCOPE.to_string()),
            })
            .expect("save token");

        let client = Arc::new(FakeOAuthHttpClient::default());
        client.set_response(FakeResponse::Success(TokenGrant {
            access_token: "new-access-token".to_string(),
            refresh_token: None,
            expires_in: 3600,
            token_type: None,
            scope: None,
        }));

        let result = manager(&store, &client)
            .ensure_credential(&required_scopes())
            .await
            .expect("ensure credential");

        let EnsureCredential::Refreshed(token) = result else {
            panic!("expected refreshed credential");
        };
        assert_eq!(token.access_token, "new-access-token");
        assert_eq!(token.refresh_token.as_deref(), Some("refresh-token"));
        assert_eq!(token.scope.as_deref(), Some(CALENDAR_SCOPE));

        let stored = store.load_token().expect("load").expect("stored");
        assert_eq!(stored, token);
    }

    #[tokio::test]
    async fn transport_failure_during_refresh_propagates() {
        let store = Arc::new(InMemoryCredentialStore::default());
        store
            .save_token(&OAuthToken {
                access_token: "expired".to_string(),
                refresh_token: Some("refresh".to_string()),
                expires_at: Utc::now() - Duration::seconds(10),
                token_type: "Bearer".to_string(),
                scope: None,
            })
            .expect("save token");
        let client = Arc::new(FakeOAuthHttpClient::default());
        client.set_response(FakeResponse::TransportError("reset".to_string()));

        let result = manager(&store, &client)
            .ensure_credential(&required_scopes())
            .await;
        assert!(matches!(result, Err(InfraError::Io(_))));
    }

    #[tokio::test]
    async fn complete_authentication_saves_token_to_store() {
        let store = Arc::new(InMemoryCredentialStore::default());
        let client = Arc::new(FakeOAuthHttpClient::default());

        let token = manager(&store, &client)
            .complete_authentication("  sample-code ")
            .await
            .expect("complete authentication");
        assert_eq!(token.access_token, "fake_access");

        let grants = client.grants.lock().expect("grants").clone();
        assert_eq!(
            grants,
            vec![TokenGrantRequest::AuthorizationCode {
                code: "sample-code".to_string(),
                redirect_uri: "http://localhost/oauth2/callback".to_string(),
            }]
        );
        let loaded = store.load_token().expect("load").expect("stored");
        assert_eq!(loaded, token);
    }

    #[tokio::test]
    async fn blank_authorization_code_is_rejected() {
        let store = Arc::new(InMemoryCredentialStore::default());
        let client = Arc::new(FakeOAuthHttpClient::default());
        let result = manager(&store, &client).complete_authentication("   ").await;
        assert!(matches!(result, Err(InfraError::OAuth(_))));
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }
}
