use async_trait::async_trait;
use chrono::Duration;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::error::NotifierError;
use crate::config::SmsGatewayConfig;
use crate::utils::phone::mask_phone_number;

/// Delivers a verification code to a phone number.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_code(
        &self,
        phone_number: &str,
        code: &str,
        expires_in: Duration,
    ) -> Result<(), NotifierError>;

    async fn health_check(&self) -> Result<(), NotifierError>;
}

pub fn code_message(code: &str, expires_in: Duration) -> String {
    format!(
        "Your verification code is {}. It expires in {} minutes.",
        code,
        expires_in.num_minutes().max(1)
    )
}

/// HTTP SMS gateway provider.
pub struct SmsGatewayNotifier {
    url: String,
    auth_key: SecretString,
    sender_id: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct SmsGatewayRequest<'a> {
    sender: &'a str,
    to: &'a str,
    message: String,
}

#[derive(Debug, Deserialize)]
struct SmsGatewayResponse {
    #[serde(rename = "type")]
    response_type: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    request_id: Option<String>,
}

impl SmsGatewayNotifier {
    pub fn new(config: &SmsGatewayConfig) -> Result<Self, NotifierError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| NotifierError::Connection(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            url: config.url.clone(),
            auth_key: SecretString::new(config.auth_key.expose_secret().clone()),
            sender_id: config.sender_id.clone(),
            client,
        })
    }
}

#[async_trait]
impl Notifier for SmsGatewayNotifier {
    async fn send_code(
        &self,
        phone_number: &str,
        code: &str,
        expires_in: Duration,
    ) -> Result<(), NotifierError> {
        if phone_number.is_empty() {
            return Err(NotifierError::InvalidRecipient(
                "Phone number is empty".to_string(),
            ));
        }

        let request = SmsGatewayRequest {
            sender: &self.sender_id,
            to: phone_number,
            message: code_message(code, expires_in),
        };

        let response = self
            .client
            .post(&self.url)
            .header("authkey", self.auth_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| NotifierError::Connection(format!("Failed to reach SMS gateway: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NotifierError::SendFailed(format!(
                "SMS gateway returned error status {}: {}",
                status, body
            )));
        }

        let gateway_response: SmsGatewayResponse = response.json().await.map_err(|e| {
            NotifierError::SendFailed(format!("Failed to parse SMS gateway response: {}", e))
        })?;

        if gateway_response.response_type != "success" {
            return Err(NotifierError::SendFailed(format!(
                "SMS gateway error: {}",
                gateway_response.message
            )));
        }

        tracing::info!(
            to = %mask_phone_number(phone_number),
            request_id = ?gateway_response.request_id,
            "Verification code sent via SMS gateway"
        );
        Ok(())
    }

    async fn health_check(&self) -> Result<(), NotifierError> {
        if self.url.trim().is_empty() {
            return Err(NotifierError::Connection(
                "SMS gateway url is not configured".to_string(),
            ));
        }
        Ok(())
    }
}

/// Writes codes to the log instead of sending them. Only wired up outside production.
#[derive(Debug, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn send_code(
        &self,
        phone_number: &str,
        code: &str,
        expires_in: Duration,
    ) -> Result<(), NotifierError> {
        tracing::warn!(
            to = %mask_phone_number(phone_number),
            code = %code,
            expires_in_seconds = expires_in.num_seconds(),
            "[DEV] Verification code not sent, logged instead"
        );
        Ok(())
    }

    async fn health_check(&self) -> Result<(), NotifierError> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub phone_number: String,
    pub code: String,
    pub expires_in: Duration,
}

/// Records deliveries in memory. Can be switched into a failing mode.
#[derive(Debug, Default)]
pub struct MockNotifier {
    deliveries: Mutex<Vec<Delivery>>,
    failing: AtomicBool,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn last_delivery(&self) -> Option<Delivery> {
        self.deliveries().pop()
    }

    pub fn send_count(&self) -> usize {
        self.deliveries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn send_code(
        &self,
        phone_number: &str,
        code: &str,
        expires_in: Duration,
    ) -> Result<(), NotifierError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifierError::Connection(
                "Mock notifier is offline".to_string(),
            ));
        }

        self.deliveries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Delivery {
                phone_number: phone_number.to_string(),
                code: code.to_string(),
                expires_in,
            });

        tracing::info!(to = %mask_phone_number(phone_number), "[MOCK] Verification code would be sent");
        Ok(())
    }

    async fn health_check(&self) -> Result<(), NotifierError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifierError::Connection(
                "Mock notifier is offline".to_string(),
            ));
        }
        Ok(())
    }
}
