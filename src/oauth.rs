//! Google OAuth2 client: consent URL, authorization-code exchange, refresh.

use url::Url;

use crate::config::{OAuthSettings, PICKER_SCOPE};
use crate::errors::AppError;
use crate::models::token::TokenResponse;
use crate::upstream::client::expect_json;
use crate::upstream::UpstreamClient;

pub struct OAuthClient {
    settings: OAuthSettings,
    upstream: UpstreamClient,
}

impl OAuthClient {
    pub fn new(settings: OAuthSettings, upstream: UpstreamClient) -> Self {
        Self { settings, upstream }
    }

    /// Consent-screen URL. Offline access plus `prompt=consent` so Google
    /// always hands back a refresh token.
    pub fn authorization_url(&self, state: &str) -> Result<String, AppError> {
        let mut url = Url::parse(&self.settings.auth_url)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("invalid GOOGLE_AUTH_URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.settings.client_id)
            .append_pair("redirect_uri", &self.settings.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("scope", PICKER_SCOPE)
            .append_pair("state", state);
        Ok(url.into())
    }

    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse, AppError> {
        let form = [
            ("code", code),
            ("client_id", self.settings.client_id.as_str()),
            ("client_secret", self.settings.client_secret.as_str()),
            ("redirect_uri", self.settings.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ];
        self.token_request("token exchange", &form).await
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AppError> {
        let form = [
            ("client_id", self.settings.client_id.as_str()),
            ("client_secret", self.settings.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];
        self.token_request("token refresh", &form).await
    }

    async fn token_request(&self, what: &str, form: &[(&str, &str)]) -> Result<TokenResponse, AppError> {
        let url = &self.settings.token_url;
        let resp = self
            .upstream
            .send(
                what,
                || self.upstream.http().post(url).form(form),
                self.upstream.retry_policy(),
            )
            .await?;

        // 400/401 from the token endpoint means the grant itself is unusable
        // (revoked, expired, wrong client); retrying will not help.
        let status = resp.status().as_u16();
        if status == 400 || status == 401 {
            let body = resp.text().await.unwrap_or_default();
            tracing::error!(call = what, status, body = %body, "OAuth grant rejected");
            return Err(AppError::Auth(format!("{} rejected by provider ({})", what, status)));
        }

        expect_json(what, resp).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UpstreamSettings;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base: &str) -> OAuthClient {
        OAuthClient::new(
            OAuthSettings {
                client_id: "cid".into(),
                client_secret: "secret".into(),
                redirect_uri: "http://localhost:5000/auth/callback".into(),
                auth_url: format!("{}/o/oauth2/v2/auth", base),
                token_url: format!("{}/token", base),
            },
            UpstreamClient::new(&UpstreamSettings::default()).unwrap(),
        )
    }

    #[test]
    fn test_authorization_url_carries_offline_scope_and_state() {
        let url = client("https://accounts.example").authorization_url("st-1").unwrap();
        let parsed = Url::parse(&url).unwrap();
        let pairs: std::collections::HashMap<_, _> = parsed.query_pairs().into_owned().collect();
        assert_eq!(pairs["access_type"], "offline");
        assert_eq!(pairs["prompt"], "consent");
        assert_eq!(pairs["scope"], PICKER_SCOPE);
        assert_eq!(pairs["state"], "st-1");
        assert_eq!(pairs["client_id"], "cid");
    }

    #[tokio::test]
    async fn test_refresh_posts_refresh_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=rt-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "at-2",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let resp = client(&server.uri()).refresh("rt-1").await.unwrap();
        assert_eq!(resp.access_token, "at-2");
        assert_eq!(resp.expires_in, Some(3599));
        assert!(resp.refresh_token.is_none());
    }

    #[tokio::test]
    async fn test_invalid_grant_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid_grant"}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server.uri()).refresh("revoked").await.unwrap_err();
        assert!(matches!(err, AppError::Auth(_)), "got {:?}", err);
    }
}
