use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::config::MembershipConfig;
use crate::error::{AppError, AppResult};

/// Outcome of validating one membership card number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipStatus {
    Valid,
    InvalidNumber,
    /// The registry rejected the request itself; no number can be judged.
    InvalidRequest,
}

#[async_trait]
pub trait MembershipApi: Send + Sync {
    async fn validate(&self, member_number: &str) -> MembershipStatus;
}

pub struct MembershipClient {
    client: Client,
    api_url: String,
    api_key: String,
    api_key_header: String,
    card_type_field: String,
}

impl MembershipClient {
    pub fn new(config: &MembershipConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| AppError::Internal(e.into()))?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            api_key_header: config.api_key_header.clone(),
            card_type_field: config.card_type_field.clone(),
        })
    }

    /// A 200 body is valid only when it carries the card type field.
    fn classify(&self, body: &serde_json::Value) -> MembershipStatus {
        if body.get(&self.card_type_field).is_some() {
            MembershipStatus::Valid
        } else {
            MembershipStatus::InvalidNumber
        }
    }
}

#[async_trait]
impl MembershipApi for MembershipClient {
    async fn validate(&self, member_number: &str) -> MembershipStatus {
        let response = match self
            .client
            .get(&self.api_url)
            .header(self.api_key_header.as_str(), self.api_key.as_str())
            .query(&[("request", "validateCard"), ("CardId", member_number)])
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Membership validation request failed: {:?}", e);
                return MembershipStatus::InvalidRequest;
            }
        };

        if response.status() != reqwest::StatusCode::OK {
            tracing::warn!("Membership validation returned status {}", response.status());
            return MembershipStatus::InvalidRequest;
        }

        match response.json::<serde_json::Value>().await {
            Ok(body) => self.classify(&body),
            Err(e) => {
                tracing::warn!("Failed to parse membership validation response: {:?}", e);
                MembershipStatus::InvalidRequest
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn classify_requires_card_type_field() {
        let client = MembershipClient::new(&Config::default().membership).unwrap();

        let valid = serde_json::json!({ "Kartentyp": "2", "Version": "00" });
        let invalid = serde_json::json!({ "ERROR": -1 });

        assert_eq!(client.classify(&valid), MembershipStatus::Valid);
        assert_eq!(client.classify(&invalid), MembershipStatus::InvalidNumber);
    }
}
