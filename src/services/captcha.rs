use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::config::RecaptchaConfig;
use crate::error::{AppError, AppResult};

#[async_trait]
pub trait CaptchaVerifier: Send + Sync {
    async fn verify(&self, token: &str, remote_ip: Option<&str>) -> AppResult<bool>;
}

#[derive(Debug, Deserialize)]
struct SiteVerifyResponse {
    success: bool,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

/// Google reCAPTCHA siteverify. Without a secret every present token is accepted.
pub struct RecaptchaVerifier {
    client: Client,
    secret: Option<String>,
    verify_url: String,
}

impl RecaptchaVerifier {
    pub fn new(config: &RecaptchaConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Internal(e.into()))?;

        if config.secret.is_none() {
            tracing::warn!("RECAPTCHA_SECRET not set; captcha tokens are not verified");
        }

        Ok(Self {
            client,
            secret: config.secret.clone(),
            verify_url: config.verify_url.clone(),
        })
    }
}

#[async_trait]
impl CaptchaVerifier for RecaptchaVerifier {
    async fn verify(&self, token: &str, remote_ip: Option<&str>) -> AppResult<bool> {
        let Some(secret) = self.secret.as_deref() else {
            return Ok(true);
        };

        let mut form = vec![("secret", secret), ("response", token)];
        if let Some(ip) = remote_ip {
            form.push(("remoteip", ip));
        }

        let response = self.client.post(&self.verify_url).form(&form).send().await?;
        if !response.status().is_success() {
            tracing::warn!("reCAPTCHA verification returned status {}", response.status());
            return Ok(false);
        }

        let result: SiteVerifyResponse = response.json().await?;
        if !result.success {
            tracing::debug!("reCAPTCHA rejected token: {:?}", result.error_codes);
        }
        Ok(result.success)
    }
}
