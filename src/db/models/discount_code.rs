use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A code shared by the group of member numbers that redeemed together.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DiscountCode {
    pub id: i64,
    pub discount_id: i64,
    pub code: String,
    pub created_at: NaiveDateTime,
}

/// Lifecycle of a member's claim on a code: `Unknown` moves to `Used` or `Canceled`, both terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberCodeStatus {
    Unknown,
    Used,
    Canceled,
}

impl MemberCodeStatus {
    /// Convert from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "unknown" => Some(MemberCodeStatus::Unknown),
            "used" => Some(MemberCodeStatus::Used),
            "canceled" => Some(MemberCodeStatus::Canceled),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MemberCodeStatus::Unknown => "unknown",
            MemberCodeStatus::Used => "used",
            MemberCodeStatus::Canceled => "canceled",
        }
    }
}

impl From<MemberCodeStatus> for String {
    fn from(status: MemberCodeStatus) -> Self {
        status.as_str().to_string()
    }
}

impl TryFrom<String> for MemberCodeStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_str(&value).ok_or_else(|| format!("Invalid member code status: {}", value))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberDiscountCode {
    pub id: i64,
    pub discount_code_id: i64,
    pub member_number: String,
    pub status: MemberCodeStatus,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, FromRow)]
pub(crate) struct MemberDiscountCodeRow {
    pub id: i64,
    pub discount_code_id: i64,
    pub member_number: String,
    pub status: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl TryFrom<MemberDiscountCodeRow> for MemberDiscountCode {
    type Error = String;

    fn try_from(row: MemberDiscountCodeRow) -> Result<Self, Self::Error> {
        Ok(MemberDiscountCode {
            id: row.id,
            discount_code_id: row.discount_code_id,
            member_number: row.member_number,
            status: MemberCodeStatus::try_from(row.status)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// A member's most recent live claim within an event, joined with its shared code.
#[derive(Debug, Clone)]
pub struct MemberCodeClaim {
    pub member_code: MemberDiscountCode,
    pub code: DiscountCode,
}
