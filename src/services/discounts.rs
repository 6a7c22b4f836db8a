use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::db::models::{Discount, DiscountTarget, DiscountValueType, Event, NewDiscount, Organizer};
use crate::db::repository::{DiscountRepository, TicketTypeRepository};
use crate::error::{AppError, AppResult, FormErrors};
use crate::i18n::tr;
use crate::services::access::{ensure_discount_access, ensure_event_owner};
use crate::AppState;

pub const NAME_MAX_LEN: usize = 200;

/// Submitted discount form. Every field may be missing; `validate` reports it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiscountForm {
    #[serde(default)]
    pub discount_name: String,
    #[serde(default)]
    pub discount_type: String,
    #[serde(default)]
    pub discount_value: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscountView {
    pub id: i64,
    pub name: String,
    pub value: f64,
    pub value_type: DiscountValueType,
    pub value_type_label: String,
    pub target: DiscountTarget,
}

impl DiscountView {
    pub fn new(discount: &Discount, lang: &str) -> Self {
        Self {
            id: discount.id,
            name: discount.name.clone(),
            value: discount.value,
            value_type: discount.value_type,
            value_type_label: tr(Some(lang), discount.value_type.label_key(), None),
            target: discount.target,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeleteConfirmation {
    pub event_id: i64,
    pub discount: DiscountView,
    pub message: String,
}

pub fn validate(form: &DiscountForm, lang: &str) -> Result<NewDiscount, FormErrors> {
    let mut errors = FormErrors::new();
    let required = || tr(Some(lang), "discount.field_required", None);

    let name = form.discount_name.trim();
    let name_len = name.chars().count();
    if name.is_empty() {
        errors.add("discount_name", required());
    } else if name_len > NAME_MAX_LEN {
        let max = NAME_MAX_LEN.to_string();
        let len = name_len.to_string();
        errors.add(
            "discount_name",
            tr(
                Some(lang),
                "discount.name_too_long",
                Some(&[("max", max.as_str()), ("len", len.as_str())]),
            ),
        );
    }

    let value_type = match form.discount_type.trim() {
        "" => {
            errors.add("discount_type", required());
            None
        }
        raw => {
            let parsed = DiscountValueType::from_str(raw);
            if parsed.is_none() {
                errors.add(
                    "discount_type",
                    tr(Some(lang), "discount.invalid_type", Some(&[("value", raw)])),
                );
            }
            parsed
        }
    };

    let value = match form.discount_value.as_deref().map(str::trim) {
        None | Some("") => {
            errors.add("discount_value", required());
            None
        }
        Some(raw) => match raw.parse::<f64>() {
            Ok(v) if v.is_finite() => Some(v),
            _ => {
                errors.add("discount_value", tr(Some(lang), "discount.value_not_number", None));
                None
            }
        },
    };

    if let Some(value) = value {
        if value < 1.0 {
            errors.add(
                "discount_value",
                tr(Some(lang), "discount.min_value", Some(&[("min", "1")])),
            );
        } else if value_type == Some(DiscountValueType::Percentage) && value > 100.0 {
            errors.add(
                "discount_value",
                tr(Some(lang), "discount.max_value", Some(&[("max", "100")])),
            );
        }
    }

    match (value, value_type) {
        (Some(value), Some(value_type)) if errors.is_empty() => Ok(NewDiscount {
            name: name.to_string(),
            value,
            value_type,
        }),
        _ => Err(errors),
    }
}

pub async fn create_event_discount(
    state: &Arc<AppState>,
    organizer: &Organizer,
    event_id: i64,
    form: &DiscountForm,
    lang: &str,
) -> AppResult<Discount> {
    let event = ensure_event_owner(&state.db, organizer, event_id, lang).await?;
    let new_discount = validate(form, lang)?;

    let live = state
        .eventbrite
        .event(&organizer.access_token, &event.external_id)
        .await?;
    if live.is_free {
        return Err(AppError::Conflict(tr(Some(lang), "discount.free_event", None)));
    }
    if DiscountRepository::find_for_event(&state.db, event.id).await?.is_some() {
        return Err(AppError::Conflict(tr(Some(lang), "discount.event_exists", None)));
    }

    let discount = DiscountRepository::create_for_event(&state.db, event.id, &new_discount).await?;
    tracing::info!(
        "Organizer {} created event discount {} on event {}",
        organizer.id,
        discount.id,
        event.id
    );
    Ok(discount)
}

pub async fn create_ticket_type_discount(
    state: &Arc<AppState>,
    organizer: &Organizer,
    event_id: i64,
    ticket_type_id: i64,
    form: &DiscountForm,
    lang: &str,
) -> AppResult<Discount> {
    let event = ensure_event_owner(&state.db, organizer, event_id, lang).await?;
    let ticket_type = TicketTypeRepository::find_by_id(&state.db, ticket_type_id)
        .await?
        .filter(|t| t.event_id == event.id)
        .ok_or_else(|| AppError::NotFound(tr(Some(lang), "not_found.ticket_type", None)))?;
    let new_discount = validate(form, lang)?;

    let live = state
        .eventbrite
        .event(&organizer.access_token, &event.external_id)
        .await?;
    if live.is_free {
        return Err(AppError::Conflict(tr(Some(lang), "discount.free_event", None)));
    }

    let classes = state
        .eventbrite
        .ticket_classes(&organizer.access_token, &event.external_id)
        .await?;
    let class = classes
        .iter()
        .find(|c| c.id == ticket_type.external_id)
        .ok_or_else(|| AppError::NotFound(tr(Some(lang), "not_found.ticket_type", None)))?;
    if class.free {
        return Err(AppError::Conflict(tr(Some(lang), "discount.free_ticket", None)));
    }

    if DiscountRepository::find_for_ticket_type(&state.db, ticket_type.id)
        .await?
        .is_some()
    {
        return Err(AppError::Conflict(tr(Some(lang), "discount.ticket_exists", None)));
    }

    let discount =
        DiscountRepository::create_for_ticket_type(&state.db, event.id, ticket_type.id, &new_discount)
            .await?;
    tracing::info!(
        "Organizer {} created ticket type discount {} on ticket type {}",
        organizer.id,
        discount.id,
        ticket_type.id
    );
    Ok(discount)
}

pub async fn get_discount(
    state: &Arc<AppState>,
    organizer: &Organizer,
    event_id: i64,
    discount_id: i64,
    lang: &str,
) -> AppResult<(Event, Discount)> {
    ensure_discount_access(&state.db, organizer, event_id, discount_id, lang).await
}

pub async fn modify_discount(
    state: &Arc<AppState>,
    organizer: &Organizer,
    event_id: i64,
    discount_id: i64,
    form: &DiscountForm,
    lang: &str,
) -> AppResult<Discount> {
    let (_, discount) = ensure_discount_access(&state.db, organizer, event_id, discount_id, lang).await?;
    let changes = validate(form, lang)?;

    let updated = DiscountRepository::update(&state.db, discount.id, &changes).await?;
    tracing::info!("Organizer {} modified discount {}", organizer.id, updated.id);
    Ok(updated)
}

pub async fn delete_confirmation(
    state: &Arc<AppState>,
    organizer: &Organizer,
    event_id: i64,
    discount_id: i64,
    lang: &str,
) -> AppResult<DeleteConfirmation> {
    let (event, discount) =
        ensure_discount_access(&state.db, organizer, event_id, discount_id, lang).await?;

    Ok(DeleteConfirmation {
        event_id: event.id,
        discount: DiscountView::new(&discount, lang),
        message: tr(Some(lang), "discount.delete_confirm", None),
    })
}

pub async fn delete_discount(
    state: &Arc<AppState>,
    organizer: &Organizer,
    event_id: i64,
    discount_id: i64,
    lang: &str,
) -> AppResult<()> {
    let (_, discount) = ensure_discount_access(&state.db, organizer, event_id, discount_id, lang).await?;
    DiscountRepository::delete(&state.db, discount.id).await?;
    tracing::info!("Organizer {} deleted discount {}", organizer.id, discount.id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::EventRepository;
    use crate::test_support::{live_event, ticket_class, TestApp};

    fn form(name: &str, value_type: &str, value: &str) -> DiscountForm {
        DiscountForm {
            discount_name: name.to_string(),
            discount_type: value_type.to_string(),
            discount_value: Some(value.to_string()),
        }
    }

    #[test]
    fn validates_a_good_form() {
        let discount = validate(&form(" Members ", "percentage", "20"), "en").unwrap();
        assert_eq!(discount.name, "Members");
        assert_eq!(discount.value, 20.0);
        assert_eq!(discount.value_type, DiscountValueType::Percentage);
    }

    #[test]
    fn percentage_above_100_is_rejected() {
        let errors = validate(&form("Members", "percentage", "150"), "en").unwrap_err();
        assert_eq!(
            errors.get("discount_value"),
            Some(&["Ensure this value is less than or equal to 100.".to_string()][..])
        );

        assert!(validate(&form("Members", "fixed", "150"), "en").is_ok());
    }

    #[test]
    fn values_below_one_are_rejected() {
        for value_type in ["fixed", "percentage"] {
            let errors = validate(&form("Members", value_type, "0.5"), "en").unwrap_err();
            assert_eq!(
                errors.get("discount_value"),
                Some(&["Ensure this value is greater than or equal to 1.".to_string()][..])
            );
        }
    }

    #[test]
    fn missing_and_malformed_fields() {
        let errors = validate(&DiscountForm::default(), "en").unwrap_err();
        for field in ["discount_name", "discount_type", "discount_value"] {
            assert_eq!(errors.get(field), Some(&["This field is required.".to_string()][..]));
        }

        let errors = validate(&form(&"x".repeat(201), "bogus", "abc"), "en").unwrap_err();
        assert_eq!(
            errors.get("discount_name"),
            Some(&["Ensure this value has at most 200 characters (it has 201).".to_string()][..])
        );
        assert_eq!(
            errors.get("discount_type"),
            Some(&["Select a valid choice. bogus is not one of the available choices.".to_string()][..])
        );
        assert_eq!(errors.get("discount_value"), Some(&["Enter a number.".to_string()][..]));
    }

    #[tokio::test]
    async fn rejected_form_creates_no_row() {
        let app = TestApp::new().await;
        app.ticketing.add_event(live_event("100", "Cup final", false), vec![]);
        let event = EventRepository::activate(&app.state.db, "100", app.organizer.id)
            .await
            .unwrap();

        let result = create_event_discount(
            &app.state,
            &app.organizer,
            event.id,
            &form("Members", "percentage", "150"),
            "en",
        )
        .await;

        assert!(matches!(result, Err(AppError::InvalidForm(_))));
        assert!(DiscountRepository::find_for_event(&app.state.db, event.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn event_discount_rules() {
        let app = TestApp::new().await;
        app.ticketing.add_event(live_event("100", "Cup final", false), vec![]);
        app.ticketing.add_event(live_event("200", "Open day", true), vec![]);
        let paid = EventRepository::activate(&app.state.db, "100", app.organizer.id)
            .await
            .unwrap();
        let free = EventRepository::activate(&app.state.db, "200", app.organizer.id)
            .await
            .unwrap();
        let good = form("Members", "fixed", "5");

        match create_event_discount(&app.state, &app.organizer, free.id, &good, "en").await {
            Err(AppError::Conflict(msg)) => assert_eq!(msg, "You can not create a discount in a free event"),
            other => panic!("unexpected: {:?}", other.map(|d| d.id)),
        }

        create_event_discount(&app.state, &app.organizer, paid.id, &good, "en")
            .await
            .unwrap();
        match create_event_discount(&app.state, &app.organizer, paid.id, &good, "en").await {
            Err(AppError::Conflict(msg)) => assert_eq!(msg, "You already have a discount for this event"),
            other => panic!("unexpected: {:?}", other.map(|d| d.id)),
        }
    }

    #[tokio::test]
    async fn ticket_type_discount_rules_and_exclusivity() {
        let app = TestApp::new().await;
        app.ticketing.add_event(
            live_event("100", "Cup final", false),
            vec![ticket_class("t-paid", "Stand", 2000), ticket_class("t-free", "Kids", 0)],
        );
        let event = EventRepository::activate(&app.state.db, "100", app.organizer.id)
            .await
            .unwrap();
        let paid = TicketTypeRepository::ensure(&app.state.db, event.id, "t-paid").await.unwrap();
        let free = TicketTypeRepository::ensure(&app.state.db, event.id, "t-free").await.unwrap();
        let good = form("Members", "percentage", "20");

        let event_discount = create_event_discount(&app.state, &app.organizer, event.id, &good, "en")
            .await
            .unwrap();

        match create_ticket_type_discount(&app.state, &app.organizer, event.id, free.id, &good, "en").await {
            Err(AppError::Conflict(msg)) => assert_eq!(msg, "You can not create a discount for a free ticket"),
            other => panic!("unexpected: {:?}", other.map(|d| d.id)),
        }

        create_ticket_type_discount(&app.state, &app.organizer, event.id, paid.id, &good, "en")
            .await
            .unwrap();
        assert!(DiscountRepository::find_by_id(&app.state.db, event_discount.id)
            .await
            .unwrap()
            .is_none());

        match create_ticket_type_discount(&app.state, &app.organizer, event.id, paid.id, &good, "en").await {
            Err(AppError::Conflict(msg)) => assert_eq!(msg, "You have already used a discount for this ticket"),
            other => panic!("unexpected: {:?}", other.map(|d| d.id)),
        }
    }

    #[tokio::test]
    async fn ticket_type_of_another_event_is_not_found() {
        let app = TestApp::new().await;
        let first = EventRepository::activate(&app.state.db, "100", app.organizer.id)
            .await
            .unwrap();
        let second = EventRepository::activate(&app.state.db, "101", app.organizer.id)
            .await
            .unwrap();
        let foreign = TicketTypeRepository::ensure(&app.state.db, second.id, "t-9").await.unwrap();

        let result = create_ticket_type_discount(
            &app.state,
            &app.organizer,
            first.id,
            foreign.id,
            &form("Members", "fixed", "5"),
            "en",
        )
        .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn modify_and_delete() {
        let app = TestApp::new().await;
        app.ticketing.add_event(live_event("100", "Cup final", false), vec![]);
        let event = EventRepository::activate(&app.state.db, "100", app.organizer.id)
            .await
            .unwrap();
        let created = create_event_discount(
            &app.state,
            &app.organizer,
            event.id,
            &form("Members", "fixed", "5"),
            "en",
        )
        .await
        .unwrap();

        let updated = modify_discount(
            &app.state,
            &app.organizer,
            event.id,
            created.id,
            &form("Club members", "percentage", "15"),
            "en",
        )
        .await
        .unwrap();
        assert_eq!(updated.name, "Club members");
        assert_eq!(updated.value_type, DiscountValueType::Percentage);

        let confirmation = delete_confirmation(&app.state, &app.organizer, event.id, created.id, "de")
            .await
            .unwrap();
        assert_eq!(confirmation.message, "Soll der Rabatt wirklich gelöscht werden");
        assert_eq!(confirmation.discount.value_type_label, "Prozentualer Rabatt %");

        delete_discount(&app.state, &app.organizer, event.id, created.id, "en")
            .await
            .unwrap();
        assert!(matches!(
            get_discount(&app.state, &app.organizer, event.id, created.id, "en").await,
            Err(AppError::NotFound(_))
        ));
    }
}
