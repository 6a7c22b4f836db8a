use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountValueType {
    Fixed,
    Percentage,
}

impl DiscountValueType {
    /// Convert from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "fixed" => Some(DiscountValueType::Fixed),
            "percentage" => Some(DiscountValueType::Percentage),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DiscountValueType::Fixed => "fixed",
            DiscountValueType::Percentage => "percentage",
        }
    }

    /// Translation key of the human readable label.
    pub fn label_key(self) -> &'static str {
        match self {
            DiscountValueType::Fixed => "discount.type.fixed",
            DiscountValueType::Percentage => "discount.type.percentage",
        }
    }
}

impl From<DiscountValueType> for String {
    fn from(value_type: DiscountValueType) -> Self {
        value_type.as_str().to_string()
    }
}

impl TryFrom<String> for DiscountValueType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_str(&value).ok_or_else(|| format!("Invalid discount type: {}", value))
    }
}

/// What a discount applies to. An event has either one event-wide discount
/// or any number of per-ticket-type discounts, never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum DiscountTarget {
    Event(i64),
    TicketType(i64),
}

impl DiscountTarget {
    pub fn kind(self) -> &'static str {
        match self {
            DiscountTarget::Event(_) => "event",
            DiscountTarget::TicketType(_) => "ticket_type",
        }
    }

    fn columns(self) -> (Option<i64>, Option<i64>) {
        match self {
            DiscountTarget::Event(id) => (Some(id), None),
            DiscountTarget::TicketType(id) => (None, Some(id)),
        }
    }

    pub fn event_id(self) -> Option<i64> {
        self.columns().0
    }

    pub fn ticket_type_id(self) -> Option<i64> {
        self.columns().1
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Discount {
    pub id: i64,
    pub name: String,
    pub value: f64,
    pub value_type: DiscountValueType,
    pub target: DiscountTarget,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Raw `discounts` row; converted into [`Discount`] after the discriminator is checked.
#[derive(Debug, FromRow)]
pub(crate) struct DiscountRow {
    pub id: i64,
    pub name: String,
    pub value: f64,
    pub value_type: String,
    pub target_kind: String,
    pub event_id: Option<i64>,
    pub ticket_type_id: Option<i64>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl TryFrom<DiscountRow> for Discount {
    type Error = String;

    fn try_from(row: DiscountRow) -> Result<Self, Self::Error> {
        let target = match (row.target_kind.as_str(), row.event_id, row.ticket_type_id) {
            ("event", Some(event_id), None) => DiscountTarget::Event(event_id),
            ("ticket_type", None, Some(ticket_type_id)) => DiscountTarget::TicketType(ticket_type_id),
            (kind, _, _) => return Err(format!("Invalid target for discount {}: {}", row.id, kind)),
        };

        Ok(Discount {
            id: row.id,
            name: row.name,
            value: row.value,
            value_type: DiscountValueType::try_from(row.value_type)?,
            target,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Validated discount fields, shared by create and modify.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDiscount {
    pub name: String,
    pub value: f64,
    pub value_type: DiscountValueType,
}
