use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::{CacheConfig, EventbriteConfig};
use crate::error::{AppError, AppResult};
use crate::services::cache::ResponseCache;

// ============================================================================
// OAuth Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
}

// ============================================================================
// User Types
// ============================================================================

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventbriteUser {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub emails: Vec<EventbriteEmail>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventbriteEmail {
    pub email: String,
    #[serde(default)]
    pub primary: bool,
}

impl EventbriteUser {
    pub fn display_name(&self) -> String {
        if let Some(name) = self.name.as_deref().filter(|n| !n.is_empty()) {
            return name.to_string();
        }
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|p| !p.is_empty())
            .collect();
        if parts.is_empty() {
            self.id.clone()
        } else {
            parts.join(" ")
        }
    }

    pub fn primary_email(&self) -> Option<&str> {
        self.emails
            .iter()
            .find(|e| e.primary)
            .or_else(|| self.emails.first())
            .map(|e| e.email.as_str())
    }
}

// ============================================================================
// Event Types
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MultipartText {
    pub text: Option<String>,
    #[serde(default)]
    pub html: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DateTimeTz {
    pub timezone: String,
    pub local: String,
    #[serde(default)]
    pub utc: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Logo {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventbriteEvent {
    pub id: String,
    #[serde(default)]
    pub name: MultipartText,
    pub url: String,
    pub start: DateTimeTz,
    #[serde(default)]
    pub is_free: bool,
    #[serde(default)]
    pub venue_id: Option<String>,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub logo: Option<Logo>,
}

impl EventbriteEvent {
    pub fn name_text(&self) -> String {
        self.name.text.clone().unwrap_or_default()
    }

    pub fn logo_url(&self) -> Option<String> {
        self.logo.as_ref().and_then(|l| l.url.clone())
    }

    /// Start date in the event's own timezone, e.g. "Sat, 03 Nov 2018 19:00".
    pub fn local_date(&self) -> String {
        NaiveDateTime::parse_from_str(&self.start.local, "%Y-%m-%dT%H:%M:%S")
            .map(|d| d.format("%a, %d %b %Y %H:%M").to_string())
            .unwrap_or_else(|_| self.start.local.clone())
    }

    pub fn organization_id(&self) -> AppResult<&str> {
        self.organization_id.as_deref().ok_or_else(|| {
            AppError::Eventbrite(format!("Event {} has no organization", self.id))
        })
    }
}

#[derive(Debug, Deserialize)]
struct EventsPage {
    events: Vec<EventbriteEvent>,
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    #[serde(default)]
    has_more_items: bool,
    #[serde(default)]
    continuation: Option<String>,
}

impl Pagination {
    fn next(page: Option<Pagination>) -> Option<String> {
        page.filter(|p| p.has_more_items).and_then(|p| p.continuation)
    }
}

// ============================================================================
// Venue Types
// ============================================================================

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Venue {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<Address>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Address {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub localized_address_display: Option<String>,
}

// ============================================================================
// Ticket Class Types
// ============================================================================

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Cost {
    pub display: String,
    /// Minor units (cents)
    pub value: i64,
    pub major_value: String,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TicketClass {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub free: bool,
    #[serde(default)]
    pub cost: Option<Cost>,
}

impl TicketClass {
    pub fn cost_display(&self) -> String {
        match (&self.cost, self.free) {
            (Some(cost), false) => cost.display.clone(),
            _ => "$0.00".to_string(),
        }
    }

    /// Price in major units; free classes cost nothing.
    pub fn price(&self) -> f64 {
        match (&self.cost, self.free) {
            (Some(cost), false) => cost.value as f64 / 100.0,
            _ => 0.0,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TicketClassesPage {
    ticket_classes: Vec<TicketClass>,
    #[serde(default)]
    pagination: Option<Pagination>,
}

// ============================================================================
// Discount Types
// ============================================================================

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventbriteDiscount {
    pub id: String,
    pub code: String,
    #[serde(default)]
    pub quantity_available: i64,
    #[serde(default)]
    pub quantity_sold: i64,
    #[serde(default)]
    pub percent_off: Option<String>,
    #[serde(default)]
    pub amount_off: Option<String>,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub ticket_class_ids: Option<Vec<String>>,
}

impl EventbriteDiscount {
    pub fn remaining(&self) -> i64 {
        self.quantity_available - self.quantity_sold
    }
}

#[derive(Debug, Deserialize)]
struct DiscountsPage {
    discounts: Vec<EventbriteDiscount>,
}

/// A coded discount to publish on Eventbrite. Exactly one of the two amounts is set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewEventbriteDiscount {
    #[serde(rename = "type")]
    pub discount_type: &'static str,
    pub code: String,
    pub event_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ticket_class_ids: Vec<String>,
    pub quantity_available: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent_off: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_off: Option<f64>,
}

#[derive(Serialize)]
struct DiscountEnvelope<T: Serialize> {
    discount: T,
}

#[derive(Serialize)]
struct QuantityUpdate {
    quantity_available: i64,
}

// ============================================================================
// Client
// ============================================================================

/// The Eventbrite operations the rest of the service relies on.
#[async_trait]
pub trait TicketingApi: Send + Sync {
    async fn current_user(&self, token: &str) -> AppResult<EventbriteUser>;
    /// All live events owned by the user, across every result page.
    async fn live_events(&self, token: &str) -> AppResult<Vec<EventbriteEvent>>;
    async fn event(&self, token: &str, event_id: &str) -> AppResult<EventbriteEvent>;
    async fn venue(&self, token: &str, venue_id: &str) -> AppResult<Venue>;
    async fn ticket_classes(&self, token: &str, event_id: &str) -> AppResult<Vec<TicketClass>>;
    /// Never cached: usage counters must be current.
    async fn find_discount(
        &self,
        token: &str,
        organization_id: &str,
        event_id: &str,
        code: &str,
    ) -> AppResult<Option<EventbriteDiscount>>;
    async fn create_discount(
        &self,
        token: &str,
        organization_id: &str,
        discount: &NewEventbriteDiscount,
    ) -> AppResult<EventbriteDiscount>;
    async fn update_discount_quantity(
        &self,
        token: &str,
        discount_id: &str,
        quantity_available: i64,
    ) -> AppResult<EventbriteDiscount>;
    async fn delete_discount(&self, token: &str, discount_id: &str) -> AppResult<()>;
}

pub struct EventbriteClient {
    client: Client,
    api_url: String,
    cache: Arc<dyn ResponseCache>,
    ttl: Duration,
}

/// Short, non-reversible token fingerprint so cache keys never hold credentials.
fn token_fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(digest)[..16].to_string()
}

impl EventbriteClient {
    pub fn new(
        config: &EventbriteConfig,
        cache_config: &CacheConfig,
        cache: Arc<dyn ResponseCache>,
    ) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::Internal(e.into()))?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            cache,
            ttl: Duration::from_secs(cache_config.ttl_seconds),
        })
    }

    fn request(&self, method: Method, token: &str, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.api_url, path))
            .bearer_auth(token)
    }

    async fn send(request: RequestBuilder, what: &str) -> AppResult<reqwest::Response> {
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(AppError::NotFound(what.to_string()));
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Eventbrite(format!(
                "Failed to {}: {} {}",
                what, status, error_text
            )));
        }

        Ok(response)
    }

    async fn parse<T: DeserializeOwned>(response: reqwest::Response, what: &str) -> AppResult<T> {
        response
            .json::<T>()
            .await
            .map_err(|e| AppError::Eventbrite(format!("Failed to parse {} response: {}", what, e)))
    }

    /// GET with the response body cached for the configured TTL.
    /// Cache failures are logged and treated as misses.
    async fn cached_get<T: DeserializeOwned>(
        &self,
        token: &str,
        path: &str,
        query: &[(&str, &str)],
        what: &str,
    ) -> AppResult<T> {
        let query_string: String = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(query)
            .finish();
        let key = format!("eventbrite:{}:{}?{}", token_fingerprint(token), path, query_string);

        if !self.ttl.is_zero() {
            match self.cache.get(&key).await {
                Ok(Some(body)) => match serde_json::from_str::<T>(&body) {
                    Ok(value) => {
                        tracing::debug!("Eventbrite cache hit: {}", path);
                        return Ok(value);
                    }
                    Err(e) => tracing::warn!("Discarding unreadable cache entry {}: {}", key, e),
                },
                Ok(None) => {}
                Err(e) => tracing::warn!("Eventbrite cache read failed: {:?}", e),
            }
        }

        let response = Self::send(self.request(Method::GET, token, path).query(query), what).await?;
        let body = response.text().await?;
        let value = serde_json::from_str::<T>(&body)
            .map_err(|e| AppError::Eventbrite(format!("Failed to parse {} response: {}", what, e)))?;

        if !self.ttl.is_zero() {
            if let Err(e) = self.cache.set(&key, &body, self.ttl).await {
                tracing::warn!("Eventbrite cache write failed: {:?}", e);
            }
        }

        Ok(value)
    }
}

#[async_trait]
impl TicketingApi for EventbriteClient {
    async fn current_user(&self, token: &str) -> AppResult<EventbriteUser> {
        self.cached_get(token, "/users/me/", &[], "get user").await
    }

    async fn live_events(&self, token: &str) -> AppResult<Vec<EventbriteEvent>> {
        let mut events = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut query = vec![("status", "live")];
            if let Some(c) = continuation.as_deref() {
                query.push(("continuation", c));
            }

            let page: EventsPage = self
                .cached_get(token, "/users/me/owned_events/", &query, "list events")
                .await?;
            events.extend(page.events);

            match Pagination::next(page.pagination) {
                Some(next) => continuation = Some(next),
                None => break,
            }
        }

        Ok(events)
    }

    async fn event(&self, token: &str, event_id: &str) -> AppResult<EventbriteEvent> {
        self.cached_get(token, &format!("/events/{}/", event_id), &[], "get event")
            .await
    }

    async fn venue(&self, token: &str, venue_id: &str) -> AppResult<Venue> {
        self.cached_get(token, &format!("/venues/{}/", venue_id), &[], "get venue")
            .await
    }

    async fn ticket_classes(&self, token: &str, event_id: &str) -> AppResult<Vec<TicketClass>> {
        let path = format!("/events/{}/ticket_classes/", event_id);
        let mut classes = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let query: Vec<(&str, &str)> = continuation
                .as_deref()
                .map(|c| vec![("continuation", c)])
                .unwrap_or_default();

            let page: TicketClassesPage = self
                .cached_get(token, &path, &query, "list ticket classes")
                .await?;
            classes.extend(page.ticket_classes);

            match Pagination::next(page.pagination) {
                Some(next) => continuation = Some(next),
                None => break,
            }
        }

        Ok(classes)
    }

    async fn find_discount(
        &self,
        token: &str,
        organization_id: &str,
        event_id: &str,
        code: &str,
    ) -> AppResult<Option<EventbriteDiscount>> {
        let request = self
            .request(
                Method::GET,
                token,
                &format!("/organizations/{}/discounts/", organization_id),
            )
            .query(&[("scope", "event"), ("event_id", event_id), ("code", code)]);

        let page: DiscountsPage =
            Self::parse(Self::send(request, "find discount").await?, "find discount").await?;

        Ok(page.discounts.into_iter().find(|d| d.code == code))
    }

    async fn create_discount(
        &self,
        token: &str,
        organization_id: &str,
        discount: &NewEventbriteDiscount,
    ) -> AppResult<EventbriteDiscount> {
        let request = self
            .request(
                Method::POST,
                token,
                &format!("/organizations/{}/discounts/", organization_id),
            )
            .json(&DiscountEnvelope { discount });

        let created: EventbriteDiscount =
            Self::parse(Self::send(request, "create discount").await?, "create discount").await?;
        tracing::info!(
            "Created Eventbrite discount {} ({}) for event {}",
            created.id,
            created.code,
            discount.event_id
        );
        Ok(created)
    }

    async fn update_discount_quantity(
        &self,
        token: &str,
        discount_id: &str,
        quantity_available: i64,
    ) -> AppResult<EventbriteDiscount> {
        let request = self
            .request(Method::POST, token, &format!("/discounts/{}/", discount_id))
            .json(&DiscountEnvelope {
                discount: QuantityUpdate { quantity_available },
            });

        Self::parse(Self::send(request, "update discount").await?, "update discount").await
    }

    async fn delete_discount(&self, token: &str, discount_id: &str) -> AppResult<()> {
        let request = self.request(Method::DELETE, token, &format!("/discounts/{}/", discount_id));
        Self::send(request, "delete discount").await?;
        tracing::info!("Deleted Eventbrite discount {}", discount_id);
        Ok(())
    }
}

// ============================================================================
// OAuth
// ============================================================================

/// Authorization-code flow used for organizer login.
pub struct EventbriteOAuth {
    client: Client,
    oauth_url: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl EventbriteOAuth {
    pub fn new(config: &EventbriteConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::Internal(e.into()))?;

        Ok(Self {
            client,
            oauth_url: config.oauth_url.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
        })
    }

    /// Generate the OAuth authorization URL
    pub fn auth_url(&self, state: &str) -> String {
        format!(
            "{}/authorize?response_type=code&client_id={}&redirect_uri={}&state={}",
            self.oauth_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(state)
        )
    }

    /// Exchange authorization code for an access token
    pub async fn exchange_code(&self, code: &str) -> AppResult<TokenResponse> {
        let response = self
            .client
            .post(format!("{}/token", self.oauth_url))
            .form(&[
                ("grant_type", "authorization_code"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Eventbrite(format!(
                "Failed to exchange code: {}",
                error_text
            )));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| AppError::Eventbrite(format!("Failed to parse token response: {}", e)))
    }
}
