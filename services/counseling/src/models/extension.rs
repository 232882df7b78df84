//! Session-extension request models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::blank_as_none;

/// Status of an extension request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExtensionStatus {
    Pending,
    PaymentConfirmed,
    AdminApproved,
    Completed,
    Rejected,
}

impl ExtensionStatus {
    /// Every variant, in display-table order
    pub const ALL: [ExtensionStatus; 5] = [
        ExtensionStatus::Pending,
        ExtensionStatus::PaymentConfirmed,
        ExtensionStatus::AdminApproved,
        ExtensionStatus::Completed,
        ExtensionStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExtensionStatus::Pending => "PENDING",
            ExtensionStatus::PaymentConfirmed => "PAYMENT_CONFIRMED",
            ExtensionStatus::AdminApproved => "ADMIN_APPROVED",
            ExtensionStatus::Completed => "COMPLETED",
            ExtensionStatus::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for ExtensionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExtensionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ExtensionStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown extension status: {}", s))
    }
}

/// Extension request entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionRequest {
    pub id: Uuid,
    pub mapping_id: Uuid,
    pub requester_id: Uuid,
    pub additional_sessions: i32,
    pub package_name: String,
    pub package_price: i64,
    pub reason: Option<String>,
    pub status: ExtensionStatus,
    pub payment_method: Option<String>,
    pub payment_reference: Option<String>,
    pub payment_confirmed_at: Option<DateTime<Utc>>,
    pub approver_id: Option<Uuid>,
    pub approval_comment: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<Uuid>,
    pub rejection_reason: Option<String>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Request body of `POST /extension-requests`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateExtensionRequest {
    pub mapping_id: Option<Uuid>,
    pub requester_id: Option<Uuid>,
    pub additional_sessions: Option<i32>,
    pub package_name: Option<String>,
    pub package_price: Option<i64>,
    pub reason: Option<String>,
}

/// Request body of `POST /extension-requests/{id}/confirm-payment`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmPaymentRequest {
    pub payment_method: Option<String>,
    pub payment_reference: Option<String>,
}

/// Request body of the approve and reject endpoints
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminDecisionRequest {
    pub admin_id: Option<Uuid>,
    pub comment: Option<String>,
}

/// Query parameters for extension request listing
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionQuery {
    #[serde(default, deserialize_with = "blank_as_none")]
    pub mapping_id: Option<Uuid>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub requester_id: Option<Uuid>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub consultant_id: Option<Uuid>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub client_id: Option<Uuid>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub status: Option<ExtensionStatus>,
    /// Page number (1-based)
    #[serde(default, deserialize_with = "blank_as_none")]
    pub page: Option<u32>,
    /// Number of items per page
    #[serde(default, deserialize_with = "blank_as_none")]
    pub limit: Option<u32>,
}

impl ExtensionQuery {
    pub fn with_status(status: ExtensionStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

/// Response for extension request listing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionListResponse {
    pub items: Vec<ExtensionRequest>,
    pub total: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

/// Count and package value of the requests in one status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusTally {
    pub count: i64,
    pub package_price_total: i64,
}

/// Aggregate view over all extension requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionStatistics {
    pub total_requests: i64,
    pub by_status: BTreeMap<ExtensionStatus, StatusTally>,
    /// Sum of package prices over completed requests
    pub completed_revenue: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::http::Uri;

    fn parse(uri: &'static str) -> Option<ExtensionQuery> {
        Query::<ExtensionQuery>::try_from_uri(&Uri::from_static(uri))
            .ok()
            .map(|Query(query)| query)
    }

    #[test]
    fn test_blank_filters_mean_no_filter() {
        let query = parse("/extension-requests?status=&mappingId=&page=%20&limit=").unwrap();
        assert_eq!(query.status, None);
        assert_eq!(query.mapping_id, None);
        assert_eq!((query.page, query.limit), (None, None));
    }

    #[test]
    fn test_filters_parse_when_present() {
        let id = "1b4e28ba-2fa1-41d2-883f-0016d3cca427";
        let query = parse(
            "/extension-requests?status=payment_confirmed\
             &mappingId=1b4e28ba-2fa1-41d2-883f-0016d3cca427&page=2",
        )
        .unwrap();
        assert_eq!(query.status, Some(ExtensionStatus::PaymentConfirmed));
        assert_eq!(query.mapping_id, Some(id.parse().unwrap()));
        assert_eq!(query.page, Some(2));

        assert!(parse("/extension-requests?status=ARCHIVED").is_none());
        assert!(parse("/extension-requests?mappingId=not-a-uuid").is_none());
    }
}
