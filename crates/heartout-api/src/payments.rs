use std::time::Duration;

use anyhow::{Context, bail};
use axum::{
    Extension, Json,
    extract::State,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::{error, info};

use heartout_types::api::{PaymentIntentRequest, PaymentIntentResponse};

use crate::error::{ApiError, ApiJson};
use crate::middleware::AuthUser;
use crate::state::AppState;
use crate::stories::published_story;
use crate::tips::{check_amount, check_recipient};
use crate::validation;

pub const DEFAULT_API_BASE: &str = "https://api.stripe.com";

/// Minimal client for a Stripe-compatible payment-intent endpoint.
#[derive(Clone)]
pub struct PaymentsClient {
    http: reqwest::Client,
    api_base: String,
    secret_key: String,
}

#[derive(Deserialize)]
struct IntentBody {
    client_secret: Option<String>,
    error: Option<ProviderError>,
}

#[derive(Deserialize)]
struct ProviderError {
    message: Option<String>,
}

pub struct IntentParams<'a> {
    pub amount: i64,
    pub story_id: i64,
    pub author_id: i64,
    pub message: Option<&'a str>,
}

impl PaymentsClient {
    pub fn new(secret_key: impl Into<String>, api_base: Option<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("building payments HTTP client")?;
        Ok(Self {
            http,
            api_base: api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            secret_key: secret_key.into(),
        })
    }

    /// Creates a USD payment intent and returns its client secret.
    pub async fn create_intent(&self, params: IntentParams<'_>) -> anyhow::Result<String> {
        let url = format!("{}/v1/payment_intents", self.api_base.trim_end_matches('/'));
        let amount = params.amount.to_string();
        let story_id = params.story_id.to_string();
        let author_id = params.author_id.to_string();
        let form = [
            ("amount", amount.as_str()),
            ("currency", "usd"),
            ("metadata[story_id]", story_id.as_str()),
            ("metadata[author_id]", author_id.as_str()),
            ("metadata[message]", params.message.unwrap_or("")),
        ];

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await
            .context("payment provider unreachable")?;
        let status = resp.status();
        let body: IntentBody = resp.json().await.context("unreadable payment provider response")?;

        if !status.is_success() {
            let message = body
                .error
                .and_then(|e| e.message)
                .unwrap_or_else(|| format!("status {}", status));
            bail!("payment provider rejected the request: {}", message);
        }
        body.client_secret.context("payment provider returned no client_secret")
    }
}

pub async fn create_payment_intent(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiJson(req): ApiJson<PaymentIntentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(payments) = state.payments.clone() else {
        return Err(ApiError::Unavailable("Payments are not configured".into()));
    };
    check_amount(req.amount)?;
    validation::support_message(req.message.as_deref())?;

    let story_id = req.story_id;
    let story = state.call(move |s| published_story(s, story_id)).await?;
    check_recipient(&story, user.id)?;

    let client_secret = payments
        .create_intent(IntentParams {
            amount: req.amount,
            story_id,
            author_id: story.author_id,
            message: req.message.as_deref(),
        })
        .await
        .map_err(|e| {
            error!("Payment intent failed: {:#}", e);
            ApiError::Internal(e.to_string())
        })?;

    info!("Payment intent of {} cents created for story {}", req.amount, story_id);
    Ok(Json(PaymentIntentResponse { client_secret }))
}
