use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use reqwest::{Method, Response, StatusCode, header::RETRY_AFTER};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, warn};

use heartout_types::api::{AccessTokenResponse, RefreshRequest, StoryPage, ToggleReactionResponse, TokenResponse};
use heartout_types::models::ReactionType;

use crate::{Backoff, ClientError};

/// REST client for the `/api` surface.
///
/// With a refresh token set, a 401 triggers one `POST /auth/refresh` and the
/// request is replayed with the new access token.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: RwLock<Option<String>>,
    refresh_token: Option<String>,
    backoff: Backoff,
}

fn retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// `Retry-After` in whole seconds, when the server sent one.
fn retry_after(resp: &Response) -> Option<Duration> {
    let secs: u64 = resp.headers().get(RETRY_AFTER)?.to_str().ok()?.trim().parse().ok()?;
    Some(Duration::from_secs(secs))
}

impl ApiClient {
    /// `base_url` is the server root, e.g. `http://localhost:3000`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ClientError::Url(base_url));
        }
        let http = reqwest::Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            http,
            base_url,
            token: RwLock::new(None),
            refresh_token: None,
            backoff: Backoff::requests(),
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.set_token(Some(token.into()));
        self
    }

    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(token.into());
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn set_token(&mut self, token: Option<String>) {
        *self.token.get_mut().unwrap_or_else(PoisonError::into_inner) = token;
    }

    pub fn set_refresh_token(&mut self, token: Option<String>) {
        self.refresh_token = token;
    }

    pub fn token(&self) -> Option<String> {
        self.token.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.request(Method::GET, path, None).await
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, ClientError> {
        self.request(Method::POST, path, Some(serde_json::to_value(body)?)).await
    }

    pub async fn put<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, ClientError> {
        self.request(Method::PUT, path, Some(serde_json::to_value(body)?)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.request(Method::DELETE, path, None).await
    }

    /// Sends one request and decodes the JSON reply. A 401 is retried once
    /// after refreshing the access token.
    async fn request<T: DeserializeOwned>(&self, method: Method, path: &str, body: Option<Value>) -> Result<T, ClientError> {
        let mut resp = self.send(&method, path, body.as_ref()).await?;
        if resp.status() == StatusCode::UNAUTHORIZED && !path.starts_with("/auth/") && self.refresh().await? {
            resp = self.send(&method, path, body.as_ref()).await?;
        }

        let status = resp.status();
        if !status.is_success() {
            let message = resp
                .json::<Value>()
                .await
                .ok()
                .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("Request failed").to_string());
            return Err(ClientError::Status {
                status: status.as_u16(),
                message,
            });
        }

        debug!("{} {} -> {}", method, path, status);
        Ok(resp.json().await?)
    }

    /// Sends until the reply is not 429/5xx or the attempts run out. 429 honors
    /// `Retry-After` up to the cap.
    async fn send(&self, method: &Method, path: &str, body: Option<&Value>) -> Result<Response, ClientError> {
        let url = format!("{}/api{}", self.base_url, path);
        let mut attempt = 0;

        loop {
            let mut req = self.http.request(method.clone(), &url);
            if let Some(token) = self.token() {
                req = req.bearer_auth(token);
            }
            if let Some(body) = body {
                req = req.json(body);
            }

            let resp = req.send().await?;
            let status = resp.status();

            if retryable(status) && attempt < self.backoff.max_attempts {
                let hinted = if status == StatusCode::TOO_MANY_REQUESTS {
                    retry_after(&resp).map(|d| d.min(self.backoff.cap))
                } else {
                    None
                };
                let delay = hinted.unwrap_or_else(|| self.backoff.delay_for(attempt));
                warn!("{} {} returned {}; retrying in {:?}", method, path, status, delay);
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            return Ok(resp);
        }
    }

    /// Swaps in a fresh access token. `false` when there is no refresh token
    /// or the server refused it.
    async fn refresh(&self) -> Result<bool, ClientError> {
        let Some(refresh_token) = self.refresh_token.clone() else {
            return Ok(false);
        };
        let body = serde_json::to_value(RefreshRequest { refresh_token })?;
        let resp = self.send(&Method::POST, "/auth/refresh", Some(&body)).await?;
        if !resp.status().is_success() {
            warn!("Token refresh rejected with {}", resp.status());
            return Ok(false);
        }

        let tokens: AccessTokenResponse = resp.json().await?;
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(tokens.access_token);
        debug!("Access token refreshed");
        Ok(true)
    }

    // -- Typed helpers --

    /// Logs in and keeps both tokens for later calls.
    pub async fn login(&mut self, email: &str, password: &str) -> Result<TokenResponse, ClientError> {
        let tokens: TokenResponse = self
            .post("/auth/login", &json!({ "email": email, "password": password }))
            .await?;
        self.keep_tokens(&tokens);
        Ok(tokens)
    }

    pub async fn register(&mut self, username: &str, email: &str, password: &str) -> Result<TokenResponse, ClientError> {
        let tokens: TokenResponse = self
            .post(
                "/auth/register",
                &json!({ "username": username, "email": email, "password": password }),
            )
            .await?;
        self.keep_tokens(&tokens);
        Ok(tokens)
    }

    fn keep_tokens(&mut self, tokens: &TokenResponse) {
        self.set_token(Some(tokens.access_token.clone()));
        self.refresh_token = Some(tokens.refresh_token.clone());
    }

    pub async fn stories(&self, page: usize) -> Result<StoryPage, ClientError> {
        self.get(&format!("/stories?page={}", page)).await
    }

    pub async fn toggle_reaction(&self, story_id: i64, reaction: ReactionType) -> Result<ToggleReactionResponse, ClientError> {
        self.post(
            &format!("/stories/{}/toggle-react", story_id),
            &json!({ "reaction_type": reaction }),
        )
        .await
    }
}
