//! Buyer-facing pages and the redeem flow.
//!
//! A group of member numbers redeeming together shares one Eventbrite discount
//! code whose `quantity_available` equals the group size. Each number keeps a
//! `MemberDiscountCode` row that starts `Unknown` and ends `Used` or `Canceled`.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use crate::db::models::{
    Discount, DiscountCode, DiscountTarget, DiscountValueType, Event, MemberCodeStatus, Organizer,
};
use crate::db::repository::{
    DiscountCodeRepository, DiscountRepository, EventRepository, MemberDiscountCodeRepository,
    OrganizerRepository, TicketTypeRepository,
};
use crate::error::{AppError, AppResult, FormErrors};
use crate::i18n::tr;
use crate::services::discounts::DiscountView;
use crate::services::eventbrite::{
    EventbriteDiscount, EventbriteEvent, NewEventbriteDiscount, TicketClass, Venue,
};
use crate::services::membership::MembershipStatus;
use crate::services::reconcile::{
    event_discount_view, sync_event, ticket_type_views, EventSummary, TicketTypeView,
};
use crate::AppState;

pub const MAX_MEMBER_NUMBERS: usize = 10;
pub const CAPTCHA_FIELD: &str = "g-recaptcha-response";
pub const TICKET_TYPE_FIELD: &str = "tickets_type";
const MEMBER_NUMBER_PREFIX: &str = "member_number_";

/// Redeem form as submitted: `tickets_type`, `member_number_1..N` and the captcha token.
#[derive(Debug, Clone, Default)]
pub struct RedeemForm {
    pub ticket_type: Option<String>,
    /// `(field name, number)` in field order; blank fields are dropped.
    pub member_numbers: Vec<(String, String)>,
    pub captcha_token: String,
}

impl RedeemForm {
    pub fn from_fields(fields: &[(String, String)]) -> Self {
        let mut form = RedeemForm::default();
        let mut numbered: Vec<(usize, String, String)> = Vec::new();

        for (name, value) in fields {
            let value = value.trim();
            if name == CAPTCHA_FIELD {
                form.captcha_token = value.to_string();
            } else if name == TICKET_TYPE_FIELD {
                form.ticket_type = Some(value.to_string()).filter(|v| !v.is_empty());
            } else if let Some(index) = name
                .strip_prefix(MEMBER_NUMBER_PREFIX)
                .and_then(|suffix| suffix.parse::<usize>().ok())
            {
                if !value.is_empty() {
                    numbered.push((index, name.clone(), value.to_string()));
                }
            }
        }

        numbered.sort_by_key(|(index, _, _)| *index);
        form.member_numbers = numbered
            .into_iter()
            .map(|(_, name, number)| (name, number))
            .collect();
        form
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RedeemOutcome {
    pub code: String,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct LandingEvent {
    #[serde(flatten)]
    pub event: EventSummary,
    pub event_discount: Option<DiscountView>,
    pub ticket_types: Vec<TicketTypeView>,
}

#[derive(Debug, Serialize)]
pub struct LandingView {
    pub organizer_id: i64,
    pub organizer_name: String,
    pub events: Vec<LandingEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TicketsValue {
    pub min_value: f64,
    pub min_value_display: String,
    pub max_value: f64,
    pub max_value_display: String,
}

#[derive(Debug, Serialize)]
pub struct ListingView {
    pub organizer_id: i64,
    pub organizer_name: String,
    pub event: EventSummary,
    pub venue: Option<Venue>,
    pub ticket_types: Vec<TicketTypeView>,
    pub event_discount: Option<DiscountView>,
    pub tickets_value: Option<TicketsValue>,
}

/// Price range over ticket classes; free classes count as zero.
pub fn tickets_value(classes: &[&TicketClass]) -> Option<TicketsValue> {
    let min = classes
        .iter()
        .min_by(|a, b| a.price().total_cmp(&b.price()))?;
    let max = classes
        .iter()
        .max_by(|a, b| a.price().total_cmp(&b.price()))?;

    Some(TicketsValue {
        min_value: min.price(),
        min_value_display: min.cost_display(),
        max_value: max.price(),
        max_value_display: max.cost_display(),
    })
}

/// Check the form before anything leaves the process. Returns the member numbers.
pub fn validate_submission(form: &RedeemForm, lang: &str) -> Result<Vec<String>, FormErrors> {
    let mut errors = FormErrors::new();

    if form.captcha_token.is_empty() {
        errors.add(
            crate::error::NON_FIELD_ERRORS,
            tr(Some(lang), "redeem.captcha_required", None),
        );
    }

    if form.member_numbers.is_empty() {
        errors.add(
            crate::error::NON_FIELD_ERRORS,
            tr(Some(lang), "redeem.member_number_required", None),
        );
    } else if form.member_numbers.len() > MAX_MEMBER_NUMBERS {
        let max = MAX_MEMBER_NUMBERS.to_string();
        errors.add(
            crate::error::NON_FIELD_ERRORS,
            tr(
                Some(lang),
                "redeem.too_many_numbers",
                Some(&[("max", max.as_str())]),
            ),
        );
    }

    let mut seen = HashSet::new();
    let mut repeated = false;
    for (field, number) in &form.member_numbers {
        if !number.chars().all(|c| c.is_ascii_digit()) {
            errors.add(field, tr(Some(lang), "redeem.member_number_digits", None));
        }
        if !seen.insert(number.as_str()) {
            repeated = true;
        }
    }
    if repeated {
        errors.add(
            crate::error::NON_FIELD_ERRORS,
            tr(Some(lang), "redeem.repeated_member_number", None),
        );
    }

    if errors.is_empty() {
        Ok(form.member_numbers.iter().map(|(_, n)| n.clone()).collect())
    } else {
        Err(errors)
    }
}

/// Numeric order on digit strings of any length.
fn sort_numerically(numbers: &mut [String]) {
    numbers.sort_by(|a, b| {
        let a_digits = a.trim_start_matches('0');
        let b_digits = b.trim_start_matches('0');
        a_digits
            .len()
            .cmp(&b_digits.len())
            .then_with(|| a_digits.cmp(b_digits))
            .then_with(|| a.cmp(b))
    });
}

/// `<eventbrite event id>-<numbers in numeric order joined by "_">`
pub fn discount_code_for(event_external_id: &str, numbers: &[String]) -> String {
    let mut sorted = numbers.to_vec();
    sort_numerically(&mut sorted);
    format!("{}-{}", event_external_id, sorted.join("_"))
}

fn with_discount_param(event_url: &str, code: &str) -> String {
    let separator = if event_url.contains('?') { '&' } else { '?' };
    format!("{}{}discount={}", event_url, separator, code)
}

async fn load_organizer(state: &Arc<AppState>, organizer_id: i64, lang: &str) -> AppResult<Organizer> {
    OrganizerRepository::find_by_id(&state.db, organizer_id)
        .await?
        .ok_or_else(|| AppError::NotFound(tr(Some(lang), "not_found.organizer", None)))
}

/// The event must be one of the organizer's selected events.
async fn load_public_event(
    state: &Arc<AppState>,
    organizer_id: i64,
    event_id: i64,
    lang: &str,
) -> AppResult<(Organizer, Event)> {
    let organizer = load_organizer(state, organizer_id, lang).await?;
    let event = EventRepository::find_by_id(&state.db, event_id)
        .await?
        .filter(|e| e.organizer_id == organizer.id && e.is_active)
        .ok_or_else(|| AppError::NotFound(tr(Some(lang), "not_found.event", None)))?;
    Ok((organizer, event))
}

pub async fn landing(state: &Arc<AppState>, organizer_id: i64, lang: &str) -> AppResult<LandingView> {
    let organizer = load_organizer(state, organizer_id, lang).await?;

    let mut events = Vec::new();
    for event in EventRepository::list_active_for_organizer(&state.db, organizer.id).await? {
        let synced = sync_event(state, &organizer.access_token, &event).await?;
        if synced.live.is_free {
            continue;
        }

        let event_discount = event_discount_view(state, &synced.event, lang).await?;
        let ticket_types: Vec<TicketTypeView> = ticket_type_views(state, &synced, true, lang)
            .await?
            .into_iter()
            .filter(|t| t.discount.is_some())
            .collect();
        if event_discount.is_none() && ticket_types.is_empty() {
            continue;
        }

        events.push(LandingEvent {
            event: EventSummary::new(&synced.event, &synced.live),
            event_discount,
            ticket_types,
        });
    }

    Ok(LandingView {
        organizer_id: organizer.id,
        organizer_name: organizer.name,
        events,
    })
}

pub async fn listing(
    state: &Arc<AppState>,
    organizer_id: i64,
    event_id: i64,
    lang: &str,
) -> AppResult<ListingView> {
    let (organizer, event) = load_public_event(state, organizer_id, event_id, lang).await?;
    let token = organizer.access_token.as_str();
    let synced = sync_event(state, token, &event).await?;

    let venue = match synced.live.venue_id.as_deref() {
        Some(venue_id) => Some(state.eventbrite.venue(token, venue_id).await?),
        None => None,
    };

    let classes: Vec<&TicketClass> = synced.ticket_types.iter().map(|(_, c)| c).collect();
    let ticket_types = ticket_type_views(state, &synced, true, lang)
        .await?
        .into_iter()
        .filter(|t| t.discount.is_some())
        .collect();

    Ok(ListingView {
        organizer_id: organizer.id,
        organizer_name: organizer.name.clone(),
        event: EventSummary::new(&synced.event, &synced.live),
        venue,
        ticket_types,
        event_discount: event_discount_view(state, &synced.event, lang).await?,
        tickets_value: tickets_value(&classes),
    })
}

/// The discount a submission redeems: the event discount, or the one on the chosen ticket type.
async fn resolve_discount(
    state: &Arc<AppState>,
    event: &Event,
    form: &RedeemForm,
    lang: &str,
) -> AppResult<(Discount, Vec<String>)> {
    let no_discount = || AppError::from(FormErrors::non_field(tr(Some(lang), "redeem.no_discount", None)));

    if let Some(discount) = DiscountRepository::find_for_event(&state.db, event.id).await? {
        return Ok((discount, Vec::new()));
    }

    let ticket_type_id: i64 = form
        .ticket_type
        .as_deref()
        .and_then(|raw| raw.parse().ok())
        .ok_or_else(no_discount)?;
    let ticket_type = TicketTypeRepository::find_by_id(&state.db, ticket_type_id)
        .await?
        .filter(|t| t.event_id == event.id)
        .ok_or_else(no_discount)?;
    let discount = DiscountRepository::find_for_ticket_type(&state.db, ticket_type.id)
        .await?
        .ok_or_else(no_discount)?;

    Ok((discount, vec![ticket_type.external_id]))
}

async fn validate_memberships(state: &Arc<AppState>, numbers: &[String], lang: &str) -> AppResult<()> {
    let mut invalid = Vec::new();
    for number in numbers {
        match state.membership.validate(number).await {
            MembershipStatus::Valid => {}
            MembershipStatus::InvalidNumber => invalid.push(number.as_str()),
            MembershipStatus::InvalidRequest => {
                return Err(FormErrors::non_field(tr(Some(lang), "redeem.invalid_request", None)).into());
            }
        }
    }

    if invalid.is_empty() {
        return Ok(());
    }
    let key = if invalid.len() == 1 {
        "redeem.invalid_member_number"
    } else {
        "redeem.invalid_member_numbers"
    };
    let joined = invalid.join(", ");
    Err(FormErrors::non_field(tr(Some(lang), key, Some(&[("numbers", joined.as_str())]))).into())
}

fn already_used(number: &str, lang: &str) -> AppError {
    AppError::Conflict(tr(Some(lang), "redeem.already_used", Some(&[("number", number)])))
}

/// `Unknown` claims of the submitted numbers that share one code, with the code's Eventbrite state.
struct PendingRelease {
    code: DiscountCode,
    remote: Option<EventbriteDiscount>,
    member_code_ids: Vec<i64>,
    first_number: String,
}

/// Collect the claims this submission would release, rejecting before any of them is touched.
///
/// A code without enough unsold seats for its claimants is used up: its `Unknown`
/// members become `Used` and the submission is refused.
async fn check_claims(
    state: &Arc<AppState>,
    token: &str,
    organization_id: &str,
    event: &Event,
    event_external_id: &str,
    numbers: &[String],
    lang: &str,
) -> AppResult<Vec<PendingRelease>> {
    let mut pending: Vec<PendingRelease> = Vec::new();
    for number in numbers {
        let Some(claim) = MemberDiscountCodeRepository::find_claim_in_event(&state.db, number, event.id).await?
        else {
            continue;
        };
        if claim.member_code.status == MemberCodeStatus::Used {
            return Err(already_used(number, lang));
        }
        match pending.iter_mut().find(|p| p.code.id == claim.code.id) {
            Some(group) => group.member_code_ids.push(claim.member_code.id),
            None => pending.push(PendingRelease {
                code: claim.code,
                remote: None,
                member_code_ids: vec![claim.member_code.id],
                first_number: number.clone(),
            }),
        }
    }

    for group in &mut pending {
        group.remote = state
            .eventbrite
            .find_discount(token, organization_id, event_external_id, &group.code.code)
            .await?;
        let Some(remote) = &group.remote else {
            continue;
        };
        if remote.remaining() < group.member_code_ids.len() as i64 {
            let resolved = MemberDiscountCodeRepository::resolve_unknown_for_code(
                &state.db,
                group.code.id,
                MemberCodeStatus::Used,
            )
            .await?;
            tracing::info!("Code {} is used up, marked {} member(s) as used", group.code.code, resolved);
            return Err(already_used(&group.first_number, lang));
        }
    }

    Ok(pending)
}

/// Cancel the checked claims and give their seats back on Eventbrite.
async fn release_claims(state: &Arc<AppState>, token: &str, pending: Vec<PendingRelease>) -> AppResult<()> {
    for group in pending {
        for id in &group.member_code_ids {
            MemberDiscountCodeRepository::update_status(&state.db, *id, MemberCodeStatus::Canceled).await?;
        }

        let Some(remote) = group.remote else {
            tracing::debug!(
                "Code {} is gone from Eventbrite, canceled {} claim(s)",
                group.code.code,
                group.member_code_ids.len()
            );
            continue;
        };

        let available = remote.quantity_available - group.member_code_ids.len() as i64;
        if available <= 0 {
            state.eventbrite.delete_discount(token, &remote.id).await?;
            DiscountCodeRepository::delete(&state.db, group.code.id).await?;
            tracing::debug!("Code {} has no seats left, deleted", group.code.code);
        } else {
            state
                .eventbrite
                .update_discount_quantity(token, &remote.id, available)
                .await?;
            if available <= remote.quantity_sold {
                MemberDiscountCodeRepository::resolve_unknown_for_code(
                    &state.db,
                    group.code.id,
                    MemberCodeStatus::Used,
                )
                .await?;
            }
        }
    }
    Ok(())
}

fn eventbrite_discount(
    discount: &Discount,
    code: &str,
    event_external_id: &str,
    ticket_class_ids: Vec<String>,
    quantity: i64,
) -> NewEventbriteDiscount {
    let (percent_off, amount_off) = match discount.value_type {
        DiscountValueType::Percentage => (Some(discount.value), None),
        DiscountValueType::Fixed => (None, Some(discount.value)),
    };
    NewEventbriteDiscount {
        discount_type: "coded",
        code: code.to_string(),
        event_id: event_external_id.to_string(),
        ticket_class_ids: match discount.target {
            DiscountTarget::TicketType(_) => ticket_class_ids,
            DiscountTarget::Event(_) => Vec::new(),
        },
        quantity_available: quantity,
        percent_off,
        amount_off,
    }
}

async fn publish_code(
    state: &Arc<AppState>,
    token: &str,
    organization_id: &str,
    live: &EventbriteEvent,
    new_discount: NewEventbriteDiscount,
) -> AppResult<()> {
    let existing = state
        .eventbrite
        .find_discount(token, organization_id, &live.id, &new_discount.code)
        .await?;

    match existing {
        Some(existing) => {
            let quantity = existing.quantity_sold + new_discount.quantity_available;
            state
                .eventbrite
                .update_discount_quantity(token, &existing.id, quantity)
                .await?;
        }
        None => {
            state
                .eventbrite
                .create_discount(token, organization_id, &new_discount)
                .await?;
        }
    }
    Ok(())
}

pub async fn redeem(
    state: &Arc<AppState>,
    organizer_id: i64,
    event_id: i64,
    form: &RedeemForm,
    remote_ip: Option<&str>,
    lang: &str,
) -> AppResult<RedeemOutcome> {
    let (organizer, event) = load_public_event(state, organizer_id, event_id, lang).await?;
    let numbers = validate_submission(form, lang)?;

    if !state.captcha.verify(&form.captcha_token, remote_ip).await? {
        return Err(FormErrors::non_field(tr(Some(lang), "redeem.captcha_failed", None)).into());
    }

    let (discount, ticket_class_ids) = resolve_discount(state, &event, form, lang).await?;

    let token = organizer.access_token.as_str();
    let live = state.eventbrite.event(token, &event.external_id).await?;
    if live.is_free {
        return Err(FormErrors::non_field(tr(Some(lang), "redeem.no_discount", None)).into());
    }
    let organization_id = live.organization_id()?.to_string();

    validate_memberships(state, &numbers, lang).await?;

    let pending = check_claims(state, token, &organization_id, &event, &live.id, &numbers, lang).await?;
    release_claims(state, token, pending).await?;

    let code_value = discount_code_for(&live.id, &numbers);
    let code = DiscountCodeRepository::get_or_create(&state.db, discount.id, &code_value).await?;
    for number in &numbers {
        MemberDiscountCodeRepository::create(&state.db, code.id, number).await?;
    }

    let new_discount = eventbrite_discount(
        &discount,
        &code_value,
        &live.id,
        ticket_class_ids,
        numbers.len() as i64,
    );
    publish_code(state, token, &organization_id, &live, new_discount).await?;

    tracing::info!(
        "Redeemed discount {} for {} member(s) on event {} with code {}",
        discount.id,
        numbers.len(),
        event.id,
        code_value
    );

    Ok(RedeemOutcome {
        url: with_discount_param(&live.url, &code_value),
        code: code_value,
    })
}
