//! Consultant/client mapping models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle status of a mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MappingStatus {
    Active,
    Inactive,
    Suspended,
    Terminated,
    SessionsExhausted,
    PendingPayment,
    PaymentConfirmed,
}

impl MappingStatus {
    /// Every variant, in display-table order
    pub const ALL: [MappingStatus; 7] = [
        MappingStatus::Active,
        MappingStatus::Inactive,
        MappingStatus::Suspended,
        MappingStatus::Terminated,
        MappingStatus::SessionsExhausted,
        MappingStatus::PendingPayment,
        MappingStatus::PaymentConfirmed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MappingStatus::Active => "ACTIVE",
            MappingStatus::Inactive => "INACTIVE",
            MappingStatus::Suspended => "SUSPENDED",
            MappingStatus::Terminated => "TERMINATED",
            MappingStatus::SessionsExhausted => "SESSIONS_EXHAUSTED",
            MappingStatus::PendingPayment => "PENDING_PAYMENT",
            MappingStatus::PaymentConfirmed => "PAYMENT_CONFIRMED",
        }
    }
}

impl fmt::Display for MappingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MappingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MappingStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown mapping status: {}", s))
    }
}

/// Mapping entity
///
/// `total_sessions == used_sessions + remaining_sessions` holds for every
/// stored mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mapping {
    pub id: Uuid,
    pub consultant_id: Uuid,
    pub client_id: Uuid,
    pub consultant_name: String,
    pub client_name: String,
    pub client_email: String,
    pub status: MappingStatus,
    pub total_sessions: i32,
    pub used_sessions: i32,
    pub remaining_sessions: i32,
    pub package_name: String,
    pub package_price: i64,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Mapping {
    pub fn is_balanced(&self) -> bool {
        self.total_sessions >= 0
            && self.used_sessions >= 0
            && self.remaining_sessions >= 0
            && self.total_sessions == self.used_sessions + self.remaining_sessions
    }

    /// Whether one more session can be consumed
    pub fn can_use_session(&self) -> bool {
        self.status == MappingStatus::Active && self.remaining_sessions > 0
    }

    /// Consume one session; an emptied mapping becomes `SESSIONS_EXHAUSTED`
    ///
    /// Callers check [`Mapping::can_use_session`] first.
    pub fn consume_session(&mut self, now: DateTime<Utc>) {
        self.used_sessions += 1;
        self.remaining_sessions -= 1;
        if self.remaining_sessions == 0 {
            self.status = MappingStatus::SessionsExhausted;
        }
        self.version += 1;
        self.updated_at = now;
    }

    /// Add purchased sessions; an exhausted mapping becomes `ACTIVE` again
    pub fn credit_sessions(&mut self, sessions: i32, now: DateTime<Utc>) {
        self.total_sessions += sessions;
        self.remaining_sessions += sessions;
        if self.status == MappingStatus::SessionsExhausted {
            self.status = MappingStatus::Active;
        }
        self.version += 1;
        self.updated_at = now;
    }
}

/// Request for mapping creation
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMappingRequest {
    pub consultant_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub consultant_name: Option<String>,
    pub client_name: Option<String>,
    pub client_email: Option<String>,
    pub total_sessions: Option<i32>,
    pub package_name: Option<String>,
    pub package_price: Option<i64>,
    pub status: Option<MappingStatus>,
}

/// Query parameters for mapping listing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MappingQuery {
    /// Free-text search over client, consultant and package names
    pub search: Option<String>,
    /// Status code, or `ALL`
    pub status: Option<String>,
}
