//! Keeps local events and ticket types in line with the organizer's selection
//! and with the live Eventbrite data.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;

use crate::db::models::{Event, EventTicketType, Organizer};
use crate::db::repository::{DiscountRepository, EventRepository, TicketTypeRepository};
use crate::error::AppResult;
use crate::i18n::tr;
use crate::services::access::ensure_event_owner;
use crate::services::discounts::DiscountView;
use crate::services::eventbrite::{EventbriteEvent, EventbriteUser, TicketClass};
use crate::AppState;

const EVENT_FIELD_PREFIX: &str = "event_";

/// A local event after synchronization, with the live data it was checked against.
pub struct SyncedEvent {
    pub event: Event,
    pub live: EventbriteEvent,
    /// Empty when the event is free.
    pub ticket_types: Vec<(EventTicketType, TicketClass)>,
}

#[derive(Debug, Serialize)]
pub struct EventSummary {
    pub id: i64,
    pub external_id: String,
    pub name: String,
    pub url: String,
    pub logo_url: Option<String>,
    pub local_date: String,
    pub is_free: bool,
}

impl EventSummary {
    pub fn new(event: &Event, live: &EventbriteEvent) -> Self {
        Self {
            id: event.id,
            external_id: event.external_id.clone(),
            name: live.name_text(),
            url: live.url.clone(),
            logo_url: live.logo_url(),
            local_date: live.local_date(),
            is_free: live.is_free,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TicketTypeView {
    pub id: i64,
    pub external_id: String,
    pub name: String,
    pub cost_display: String,
    pub free: bool,
    pub discount: Option<DiscountView>,
}

#[derive(Debug, Serialize)]
pub struct HomeEvent {
    #[serde(flatten)]
    pub event: EventSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
    pub event_discount: Option<DiscountView>,
    pub ticket_types: Vec<TicketTypeView>,
}

#[derive(Debug, Serialize)]
pub struct HomeView {
    pub events: Vec<HomeEvent>,
}

#[derive(Debug, Serialize)]
pub struct SelectableEvent {
    pub external_id: String,
    pub name: String,
    pub url: String,
    pub logo_url: Option<String>,
    pub local_date: String,
    pub is_free: bool,
    pub selected: bool,
}

#[derive(Debug, Serialize)]
pub struct SelectEventsView {
    pub me: EventbriteUser,
    pub events: Vec<SelectableEvent>,
    pub selected_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct EventDiscountsView {
    pub event: EventSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
    pub event_discount: Option<DiscountView>,
    pub ticket_types: Vec<TicketTypeView>,
}

/// Eventbrite ids of the checked `event_<id>` fields of a selection form.
pub fn selected_event_ids(fields: &[(String, String)]) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for (name, value) in fields {
        let Some(id) = name.strip_prefix(EVENT_FIELD_PREFIX) else {
            continue;
        };
        if id.is_empty() || value.is_empty() || value == "off" {
            continue;
        }
        if !ids.iter().any(|existing| existing == id) {
            ids.push(id.to_string());
        }
    }
    ids
}

/// Fetch the live event and mirror its ticket classes locally.
pub async fn sync_event(state: &Arc<AppState>, token: &str, event: &Event) -> AppResult<SyncedEvent> {
    let live = state.eventbrite.event(token, &event.external_id).await?;
    sync_live_event(state, token, event, live).await
}

async fn sync_live_event(
    state: &Arc<AppState>,
    token: &str,
    event: &Event,
    live: EventbriteEvent,
) -> AppResult<SyncedEvent> {
    if live.is_free {
        EventRepository::clear_ticket_types_and_discounts(&state.db, event.id).await?;
        return Ok(SyncedEvent {
            event: event.clone(),
            live,
            ticket_types: Vec::new(),
        });
    }

    let classes = state.eventbrite.ticket_classes(token, &event.external_id).await?;

    let mut ticket_types = Vec::with_capacity(classes.len());
    for class in classes {
        let ticket_type = TicketTypeRepository::ensure(&state.db, event.id, &class.id).await?;
        if class.free {
            DiscountRepository::delete_for_ticket_type(&state.db, ticket_type.id).await?;
        }
        ticket_types.push((ticket_type, class));
    }

    let live_ids: HashSet<i64> = ticket_types.iter().map(|(t, _)| t.id).collect();
    for stale in TicketTypeRepository::list_for_event(&state.db, event.id).await? {
        if !live_ids.contains(&stale.id) {
            tracing::debug!(
                "Ticket class {} disappeared from event {}, removing it",
                stale.external_id,
                event.external_id
            );
            TicketTypeRepository::delete(&state.db, stale.id).await?;
        }
    }

    Ok(SyncedEvent {
        event: event.clone(),
        live,
        ticket_types,
    })
}

/// Apply a new event selection and synchronize every selected live event.
pub async fn select_events(
    state: &Arc<AppState>,
    organizer: &Organizer,
    selected_ids: &[String],
) -> AppResult<Vec<SyncedEvent>> {
    let token = organizer.access_token.as_str();
    let live_events = state.eventbrite.live_events(token).await?;

    let chosen: Vec<EventbriteEvent> = live_events
        .into_iter()
        .filter(|e| selected_ids.iter().any(|id| id == &e.id))
        .collect();
    let chosen_ids: HashSet<&str> = chosen.iter().map(|e| e.id.as_str()).collect();

    for event in EventRepository::list_active_for_organizer(&state.db, organizer.id).await? {
        if !chosen_ids.contains(event.external_id.as_str()) {
            EventRepository::deactivate(&state.db, event.id).await?;
            tracing::info!("Organizer {} unselected event {}", organizer.id, event.external_id);
        }
    }

    let mut synced = Vec::with_capacity(chosen.len());
    for live in chosen {
        let event = EventRepository::activate(&state.db, &live.id, organizer.id).await?;
        synced.push(sync_live_event(state, token, &event, live).await?);
    }

    tracing::info!(
        "Organizer {} now has {} selected event(s)",
        organizer.id,
        synced.len()
    );
    Ok(synced)
}

pub(crate) async fn ticket_type_views(
    state: &Arc<AppState>,
    synced: &SyncedEvent,
    paid_only: bool,
    lang: &str,
) -> AppResult<Vec<TicketTypeView>> {
    let mut discounts: HashMap<i64, DiscountView> = HashMap::new();
    for discount in DiscountRepository::list_ticket_type_discounts(&state.db, synced.event.id).await? {
        if let Some(ticket_type_id) = discount.target.ticket_type_id() {
            discounts.insert(ticket_type_id, DiscountView::new(&discount, lang));
        }
    }

    Ok(synced
        .ticket_types
        .iter()
        .filter(|(_, class)| !(paid_only && class.free))
        .map(|(ticket_type, class)| TicketTypeView {
            id: ticket_type.id,
            external_id: ticket_type.external_id.clone(),
            name: class.name.clone(),
            cost_display: class.cost_display(),
            free: class.free,
            discount: discounts.remove(&ticket_type.id),
        })
        .collect())
}

pub(crate) async fn event_discount_view(
    state: &Arc<AppState>,
    event: &Event,
    lang: &str,
) -> AppResult<Option<DiscountView>> {
    Ok(DiscountRepository::find_for_event(&state.db, event.id)
        .await?
        .map(|d| DiscountView::new(&d, lang)))
}

fn free_notice(live: &EventbriteEvent, lang: &str) -> Option<String> {
    live.is_free
        .then(|| tr(Some(lang), "event.no_paid_tickets", None))
}

/// Every active event of the organizer, freshly synchronized.
pub async fn home(state: &Arc<AppState>, organizer: &Organizer, lang: &str) -> AppResult<HomeView> {
    let mut events = Vec::new();
    for event in EventRepository::list_active_for_organizer(&state.db, organizer.id).await? {
        let synced = sync_event(state, &organizer.access_token, &event).await?;
        events.push(HomeEvent {
            event: EventSummary::new(&synced.event, &synced.live),
            notice: free_notice(&synced.live, lang),
            event_discount: event_discount_view(state, &synced.event, lang).await?,
            ticket_types: ticket_type_views(state, &synced, true, lang).await?,
        });
    }
    Ok(HomeView { events })
}

pub async fn select_events_view(
    state: &Arc<AppState>,
    organizer: &Organizer,
) -> AppResult<SelectEventsView> {
    let token = organizer.access_token.as_str();
    let me = state.eventbrite.current_user(token).await?;
    let live_events = state.eventbrite.live_events(token).await?;

    let selected_ids: Vec<String> = EventRepository::list_active_for_organizer(&state.db, organizer.id)
        .await?
        .into_iter()
        .map(|e| e.external_id)
        .collect();

    let events = live_events
        .iter()
        .map(|e| SelectableEvent {
            external_id: e.id.clone(),
            name: e.name_text(),
            url: e.url.clone(),
            logo_url: e.logo_url(),
            local_date: e.local_date(),
            is_free: e.is_free,
            selected: selected_ids.contains(&e.id),
        })
        .collect();

    Ok(SelectEventsView {
        me,
        events,
        selected_ids,
    })
}

pub async fn event_discounts(
    state: &Arc<AppState>,
    organizer: &Organizer,
    event_id: i64,
    lang: &str,
) -> AppResult<EventDiscountsView> {
    let event = ensure_event_owner(&state.db, organizer, event_id, lang).await?;
    let synced = sync_event(state, &organizer.access_token, &event).await?;

    Ok(EventDiscountsView {
        event: EventSummary::new(&synced.event, &synced.live),
        notice: free_notice(&synced.live, lang),
        event_discount: event_discount_view(state, &synced.event, lang).await?,
        ticket_types: ticket_type_views(state, &synced, false, lang).await?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{DiscountValueType, NewDiscount};
    use crate::test_support::{live_event, ticket_class, TestApp};

    fn discount() -> NewDiscount {
        NewDiscount {
            name: "Members".into(),
            value: 20.0,
            value_type: DiscountValueType::Percentage,
        }
    }

    fn fields(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn picks_checked_event_fields() {
        let ids = selected_event_ids(&fields(&[
            ("event_100", "on"),
            ("csrf", "x"),
            ("event_200", "on"),
            ("event_100", "on"),
            ("event_300", ""),
        ]));
        assert_eq!(ids, vec!["100".to_string(), "200".to_string()]);
    }

    #[tokio::test]
    async fn selection_creates_and_ignores_unknown_ids() {
        let app = TestApp::new().await;
        app.ticketing.add_event(
            live_event("100", "Cup final", false),
            vec![ticket_class("t-1", "Stand", 2000), ticket_class("t-2", "Kids", 0)],
        );

        let synced = select_events(
            &app.state,
            &app.organizer,
            &["100".to_string(), "999".to_string()],
        )
        .await
        .unwrap();

        assert_eq!(synced.len(), 1);
        assert_eq!(synced[0].ticket_types.len(), 2);
        assert!(EventRepository::find_by_external_id(&app.state.db, "999")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn deselecting_deactivates_and_cascades() {
        let app = TestApp::new().await;
        app.ticketing.add_event(
            live_event("100", "Cup final", false),
            vec![ticket_class("t-1", "Stand", 2000)],
        );
        app.ticketing.add_event(live_event("200", "Derby", false), vec![]);

        let synced = select_events(&app.state, &app.organizer, &["100".to_string()])
            .await
            .unwrap();
        let event = synced[0].event.clone();
        let ticket_type = synced[0].ticket_types[0].0.clone();
        DiscountRepository::create_for_ticket_type(&app.state.db, event.id, ticket_type.id, &discount())
            .await
            .unwrap();

        select_events(&app.state, &app.organizer, &["200".to_string()])
            .await
            .unwrap();

        let stored = EventRepository::find_by_id(&app.state.db, event.id)
            .await
            .unwrap()
            .unwrap();
        assert!(!stored.is_active);
        assert!(TicketTypeRepository::list_for_event(&app.state.db, event.id)
            .await
            .unwrap()
            .is_empty());
        assert!(DiscountRepository::find_for_ticket_type(&app.state.db, ticket_type.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn free_ticket_class_loses_its_discount() {
        let app = TestApp::new().await;
        app.ticketing.add_event(
            live_event("100", "Cup final", false),
            vec![ticket_class("t-1", "Stand", 2000)],
        );
        let synced = select_events(&app.state, &app.organizer, &["100".to_string()])
            .await
            .unwrap();
        let event = synced[0].event.clone();
        let ticket_type = synced[0].ticket_types[0].0.clone();
        DiscountRepository::create_for_ticket_type(&app.state.db, event.id, ticket_type.id, &discount())
            .await
            .unwrap();

        app.ticketing
            .set_ticket_classes("100", vec![ticket_class("t-1", "Stand", 0)]);
        let view = home(&app.state, &app.organizer, "en").await.unwrap();

        assert!(view.events[0].ticket_types.is_empty());
        assert!(DiscountRepository::find_for_ticket_type(&app.state.db, ticket_type.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn removed_ticket_class_is_deleted() {
        let app = TestApp::new().await;
        app.ticketing.add_event(
            live_event("100", "Cup final", false),
            vec![ticket_class("t-1", "Stand", 2000), ticket_class("t-2", "Box", 9000)],
        );
        let synced = select_events(&app.state, &app.organizer, &["100".to_string()])
            .await
            .unwrap();
        let event = synced[0].event.clone();

        app.ticketing
            .set_ticket_classes("100", vec![ticket_class("t-1", "Stand", 2000)]);
        let view = event_discounts(&app.state, &app.organizer, event.id, "en")
            .await
            .unwrap();

        assert_eq!(view.ticket_types.len(), 1);
        assert_eq!(view.ticket_types[0].external_id, "t-1");
        assert_eq!(view.ticket_types[0].cost_display, "$20.00");
        assert_eq!(
            TicketTypeRepository::list_for_event(&app.state.db, event.id)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn free_event_is_cleared_and_flagged() {
        let app = TestApp::new().await;
        app.ticketing.add_event(
            live_event("100", "Cup final", false),
            vec![ticket_class("t-1", "Stand", 2000)],
        );
        let synced = select_events(&app.state, &app.organizer, &["100".to_string()])
            .await
            .unwrap();
        let event = synced[0].event.clone();
        DiscountRepository::create_for_event(&app.state.db, event.id, &discount())
            .await
            .unwrap();

        app.ticketing.set_event_free("100", true);
        let view = home(&app.state, &app.organizer, "en").await.unwrap();

        let home_event = &view.events[0];
        assert!(home_event.event.is_free);
        assert_eq!(home_event.notice.as_deref(), Some("It doesn't have any paid ticket"));
        assert!(home_event.event_discount.is_none());
        assert!(TicketTypeRepository::list_for_event(&app.state.db, event.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn select_view_marks_selected_events() {
        let app = TestApp::new().await;
        app.ticketing.add_event(live_event("100", "Cup final", false), vec![]);
        app.ticketing.add_event(live_event("200", "Derby", false), vec![]);
        select_events(&app.state, &app.organizer, &["200".to_string()])
            .await
            .unwrap();

        let view = select_events_view(&app.state, &app.organizer).await.unwrap();
        assert_eq!(view.me.id, "eb-1");
        assert_eq!(view.selected_ids, vec!["200".to_string()]);
        let selected: Vec<bool> = view.events.iter().map(|e| e.selected).collect();
        assert_eq!(selected, vec![false, true]);
        assert_eq!(view.events[0].local_date, "Sat, 07 Nov 2026 19:00");
    }
}
