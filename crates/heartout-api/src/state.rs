use std::sync::Arc;

use chrono::Duration;
use tracing::error;

use heartout_db::Storage;
use heartout_gateway::Dispatcher;

use crate::ai::AiClient;
use crate::error::ApiError;
use crate::payments::PaymentsClient;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub storage: Arc<dyn Storage>,
    pub dispatcher: Dispatcher,
    pub jwt: JwtSettings,
    /// `None` when no AI provider key is configured.
    pub ai: Option<AiClient>,
    /// `None` when no payment provider key is configured.
    pub payments: Option<PaymentsClient>,
    /// Accounts registered with one of these emails start out as admins.
    pub admin_emails: Vec<String>,
}

#[derive(Clone)]
pub struct JwtSettings {
    pub secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl JwtSettings {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            access_ttl: Duration::minutes(60),
            refresh_ttl: Duration::days(30),
        }
    }
}

impl AppStateInner {
    pub fn new(storage: Arc<dyn Storage>, dispatcher: Dispatcher, jwt: JwtSettings) -> Self {
        Self {
            storage,
            dispatcher,
            jwt,
            ai: None,
            payments: None,
            admin_emails: Vec::new(),
        }
    }

    pub fn is_admin_email(&self, email: &str) -> bool {
        self.admin_emails.iter().any(|e| e.eq_ignore_ascii_case(email))
    }

    /// Run a storage call off the async runtime.
    pub async fn call<F, T>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&dyn Storage) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let storage = self.storage.clone();
        tokio::task::spawn_blocking(move || f(storage.as_ref()))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                ApiError::Internal("Background task failed".into())
            })?
            .map_err(ApiError::from)
    }
}
