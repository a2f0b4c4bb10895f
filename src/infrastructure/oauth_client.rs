use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use reqwest::Client;

/// Client identity presented to the token endpoint.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub token_endpoint: String,
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenGrantRequest {
    AuthorizationCode { code: String, redirect_uri: String },
    RefreshToken { refresh_token: String },
}

impl TokenGrantRequest {
    fn grant_type(&self) -> &'static str {
        match self {
            Self::AuthorizationCode { .. } => "authorization_code",
            Self::RefreshToken { .. } => "refresh_token",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    pub token_type: Option<String>,
    pub scope: Option<String>,
}

#[async_trait]
pub trait OAuthHttpClient: Send + Sync {
    async fn request_token(
        &self,
        client: &ClientCredentials,
        grant: TokenGrantRequest,
    ) -> Result<TokenGrant, InfraError>;
}

#[derive(Debug, Clone, Default)]
pub struct ReqwestOAuthClient {
    client: Client,
}

#[derive(Debug, serde::Deserialize)]
struct TokenEndpointPayload {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    token_type: Option<String>,
    scope: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl ReqwestOAuthClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

fn form_params(client: &ClientCredentials, grant: TokenGrantRequest) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("grant_type", grant.grant_type().to_string()),
        ("client_id", client.client_id.clone()),
        ("client_secret", client.client_secret.clone()),
    ];
    match grant {
        TokenGrantRequest::AuthorizationCode { code, redirect_uri } => {
            params.push(("code", code));
            params.push(("redirect_uri", redirect_uri));
        }
        TokenGrantRequest::RefreshToken { refresh_token } => {
            params.push(("refresh_token", refresh_token));
        }
    }
    params
}

fn parse_token_payload(status: u16, success: bool, body: &str) -> Result<TokenGrant, InfraError> {
    let parsed = serde_json::from_str::<TokenEndpointPayload>(body).map_err(|error| {
        InfraError::OAuth(format!("invalid token response payload: {error}; body={body}"))
    })?;

    if !success || parsed.error.is_some() {
        let code = parsed.error.unwrap_or_else(|| format!("http_{status}"));
        let detail = parsed.error_description.unwrap_or_else(|| body.to_string());
        return Err(InfraError::OAuth(format!("token endpoint error: {code}; {detail}")));
    }

    let access_token = parsed
        .access_token
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| InfraError::OAuth("token response did not include access_token".to_string()))?;

    Ok(TokenGrant {
        access_token,
        refresh_token: parsed.refresh_token,
        expires_in: parsed.expires_in.unwrap_or(0).max(0),
        token_type: parsed.token_type,
        scope: parsed.scope,
    })
}

#[async_trait]
impl OAuthHttpClient for ReqwestOAuthClient {
    async fn request_token(
        &self,
        client: &ClientCredentials,
        grant: TokenGrantRequest,
    ) -> Result<TokenGrant, InfraError> {
        let params = form_params(client, grant);
        let response = self
            .client
            .post(&client.token_endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|error| InfraError::OAuth(format!("request failed: {error}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::OAuth(format!("failed reading token response: {error}")))?;

        parse_token_payload(status.as_u16(), status.is_success(), &body)
    }
}
