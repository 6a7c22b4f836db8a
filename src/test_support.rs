//! In-memory stand-ins for the external services, plus a ready-made `AppState`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::config::Config;
use crate::db::models::Organizer;
use crate::db::{test_organizer, test_pool};
use crate::error::{AppError, AppResult};
use crate::services::captcha::CaptchaVerifier;
use crate::services::eventbrite::{
    Cost, DateTimeTz, EventbriteDiscount, EventbriteEmail, EventbriteEvent, EventbriteOAuth,
    EventbriteUser, Logo, MultipartText, NewEventbriteDiscount, TicketClass, TicketingApi, Venue,
};
use crate::services::membership::{MembershipApi, MembershipStatus};
use crate::AppState;

pub const ORGANIZATION_ID: &str = "org-1";

pub fn live_event(id: &str, name: &str, is_free: bool) -> EventbriteEvent {
    EventbriteEvent {
        id: id.to_string(),
        name: MultipartText {
            text: Some(name.to_string()),
            html: None,
        },
        url: format!("https://www.eventbrite.com/e/{}", id),
        start: DateTimeTz {
            timezone: "Europe/Berlin".to_string(),
            local: "2026-11-07T19:00:00".to_string(),
            utc: None,
        },
        is_free,
        venue_id: None,
        organization_id: Some(ORGANIZATION_ID.to_string()),
        logo: Some(Logo {
            url: Some(format!("https://img.example.org/{}.png", id)),
        }),
    }
}

/// A ticket class priced in cents; zero makes it free.
pub fn ticket_class(id: &str, name: &str, cents: i64) -> TicketClass {
    TicketClass {
        id: id.to_string(),
        name: name.to_string(),
        free: cents == 0,
        cost: (cents > 0).then(|| Cost {
            display: format!("${}.{:02}", cents / 100, cents % 100),
            value: cents,
            major_value: format!("{}.{:02}", cents / 100, cents % 100),
            currency: Some("USD".to_string()),
        }),
    }
}

#[derive(Default)]
pub struct TicketingData {
    pub events: Vec<EventbriteEvent>,
    pub ticket_classes: HashMap<String, Vec<TicketClass>>,
    pub venues: HashMap<String, Venue>,
    pub discounts: Vec<EventbriteDiscount>,
    pub calls: Vec<String>,
    next_discount_id: u64,
}

#[derive(Default)]
pub struct FakeTicketing {
    pub data: Mutex<TicketingData>,
}

impl FakeTicketing {
    pub fn add_event(&self, event: EventbriteEvent, classes: Vec<TicketClass>) {
        let mut data = self.data.lock().unwrap();
        data.ticket_classes.insert(event.id.clone(), classes);
        data.events.retain(|e| e.id != event.id);
        data.events.push(event);
    }

    pub fn set_ticket_classes(&self, event_id: &str, classes: Vec<TicketClass>) {
        self.data
            .lock()
            .unwrap()
            .ticket_classes
            .insert(event_id.to_string(), classes);
    }

    pub fn set_event_free(&self, event_id: &str, is_free: bool) {
        let mut data = self.data.lock().unwrap();
        if let Some(event) = data.events.iter_mut().find(|e| e.id == event_id) {
            event.is_free = is_free;
        }
    }

    pub fn discount(&self, code: &str) -> Option<EventbriteDiscount> {
        self.data
            .lock()
            .unwrap()
            .discounts
            .iter()
            .find(|d| d.code == code)
            .cloned()
    }

    pub fn set_sold(&self, code: &str, sold: i64) {
        let mut data = self.data.lock().unwrap();
        if let Some(discount) = data.discounts.iter_mut().find(|d| d.code == code) {
            discount.quantity_sold = sold;
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.data.lock().unwrap().calls.clone()
    }

    fn record(&self, call: String) {
        self.data.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl TicketingApi for FakeTicketing {
    async fn current_user(&self, token: &str) -> AppResult<EventbriteUser> {
        self.record("current_user".into());
        let id = token.trim_start_matches("token-").to_string();
        Ok(EventbriteUser {
            name: Some(format!("Organizer {}", id)),
            first_name: None,
            last_name: None,
            emails: vec![EventbriteEmail {
                email: format!("{}@example.org", id),
                primary: true,
            }],
            id,
        })
    }

    async fn live_events(&self, _token: &str) -> AppResult<Vec<EventbriteEvent>> {
        self.record("live_events".into());
        Ok(self.data.lock().unwrap().events.clone())
    }

    async fn event(&self, _token: &str, event_id: &str) -> AppResult<EventbriteEvent> {
        self.record(format!("event {}", event_id));
        self.data
            .lock()
            .unwrap()
            .events
            .iter()
            .find(|e| e.id == event_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("event {}", event_id)))
    }

    async fn venue(&self, _token: &str, venue_id: &str) -> AppResult<Venue> {
        self.record(format!("venue {}", venue_id));
        self.data
            .lock()
            .unwrap()
            .venues
            .get(venue_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("venue {}", venue_id)))
    }

    async fn ticket_classes(&self, _token: &str, event_id: &str) -> AppResult<Vec<TicketClass>> {
        self.record(format!("ticket_classes {}", event_id));
        Ok(self
            .data
            .lock()
            .unwrap()
            .ticket_classes
            .get(event_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn find_discount(
        &self,
        _token: &str,
        _organization_id: &str,
        event_id: &str,
        code: &str,
    ) -> AppResult<Option<EventbriteDiscount>> {
        self.record(format!("find_discount {}", code));
        Ok(self
            .data
            .lock()
            .unwrap()
            .discounts
            .iter()
            .find(|d| d.code == code && d.event_id.as_deref() == Some(event_id))
            .cloned())
    }

    async fn create_discount(
        &self,
        _token: &str,
        _organization_id: &str,
        discount: &NewEventbriteDiscount,
    ) -> AppResult<EventbriteDiscount> {
        self.record(format!("create_discount {}", discount.code));
        let mut data = self.data.lock().unwrap();
        data.next_discount_id += 1;
        let created = EventbriteDiscount {
            id: format!("d-{}", data.next_discount_id),
            code: discount.code.clone(),
            quantity_available: discount.quantity_available,
            quantity_sold: 0,
            percent_off: discount.percent_off.map(|v| v.to_string()),
            amount_off: discount.amount_off.map(|v| v.to_string()),
            event_id: Some(discount.event_id.clone()),
            ticket_class_ids: (!discount.ticket_class_ids.is_empty())
                .then(|| discount.ticket_class_ids.clone()),
        };
        data.discounts.push(created.clone());
        Ok(created)
    }

    async fn update_discount_quantity(
        &self,
        _token: &str,
        discount_id: &str,
        quantity_available: i64,
    ) -> AppResult<EventbriteDiscount> {
        self.record(format!("update_discount {} {}", discount_id, quantity_available));
        let mut data = self.data.lock().unwrap();
        let discount = data
            .discounts
            .iter_mut()
            .find(|d| d.id == discount_id)
            .ok_or_else(|| AppError::NotFound(format!("discount {}", discount_id)))?;
        discount.quantity_available = quantity_available;
        Ok(discount.clone())
    }

    async fn delete_discount(&self, _token: &str, discount_id: &str) -> AppResult<()> {
        self.record(format!("delete_discount {}", discount_id));
        self.data
            .lock()
            .unwrap()
            .discounts
            .retain(|d| d.id != discount_id);
        Ok(())
    }
}

/// Numbers not listed are invalid.
#[derive(Default)]
pub struct FakeMembership {
    pub statuses: Mutex<HashMap<String, MembershipStatus>>,
    pub calls: AtomicUsize,
}

impl FakeMembership {
    pub fn set(&self, number: &str, status: MembershipStatus) {
        self.statuses
            .lock()
            .unwrap()
            .insert(number.to_string(), status);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MembershipApi for FakeMembership {
    async fn validate(&self, member_number: &str) -> MembershipStatus {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.statuses
            .lock()
            .unwrap()
            .get(member_number)
            .copied()
            .unwrap_or(MembershipStatus::InvalidNumber)
    }
}

pub struct FakeCaptcha {
    pub accept: bool,
    pub calls: AtomicUsize,
}

impl FakeCaptcha {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptchaVerifier for FakeCaptcha {
    async fn verify(&self, _token: &str, _remote_ip: Option<&str>) -> AppResult<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.accept)
    }
}

pub struct TestApp {
    pub state: Arc<AppState>,
    pub organizer: Organizer,
    pub ticketing: Arc<FakeTicketing>,
    pub membership: Arc<FakeMembership>,
    pub captcha: Arc<FakeCaptcha>,
}

impl TestApp {
    pub async fn new() -> Self {
        let mut config = Config::default();
        config.jwt.secret = "test-secret".to_string();

        let pool = test_pool().await;
        let organizer = test_organizer(&pool, "eb-1").await;

        let ticketing = Arc::new(FakeTicketing::default());
        let membership = Arc::new(FakeMembership::default());
        let captcha = Arc::new(FakeCaptcha {
            accept: true,
            calls: AtomicUsize::new(0),
        });

        let state = Arc::new(AppState {
            db: pool,
            oauth: EventbriteOAuth::new(&config.eventbrite).unwrap(),
            config,
            eventbrite: ticketing.clone(),
            membership: membership.clone(),
            captcha: captcha.clone(),
        });

        Self {
            state,
            organizer,
            ticketing,
            membership,
            captcha,
        }
    }
}
