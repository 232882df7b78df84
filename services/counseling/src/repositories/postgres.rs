//! PostgreSQL store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::{DatabaseError, DatabaseResult};
use sqlx::{PgPool, Row, postgres::PgRow};
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;

use super::{CompletionOutcome, Store};
use crate::models::{
    PageWindow,
    code::CommonCode,
    extension::{ExtensionQuery, ExtensionRequest, ExtensionStatus, StatusTally},
    mapping::{Mapping, MappingStatus},
};

const MAPPING_COLUMNS: &str = r#"
    id, consultant_id, client_id, consultant_name, client_name, client_email, status,
    total_sessions, used_sessions, remaining_sessions, package_name, package_price,
    version, created_at, updated_at
"#;

const REQUEST_COLUMNS: &str = r#"
    r.id, r.mapping_id, r.requester_id, r.additional_sessions, r.package_name,
    r.package_price, r.reason, r.status, r.payment_method, r.payment_reference,
    r.payment_confirmed_at, r.approver_id, r.approval_comment, r.approved_at,
    r.rejected_by, r.rejection_reason, r.rejected_at, r.created_at, r.updated_at,
    r.completed_at
"#;

/// Run the embedded schema migrations
pub async fn run_migrations(pool: &PgPool) -> DatabaseResult<()> {
    info!("Running database migrations");

    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| DatabaseError::Migration(e.to_string()))?;

    info!("Database migrations applied");
    Ok(())
}

fn parse_status<T: FromStr<Err = String>>(raw: String) -> Result<T, sqlx::Error> {
    raw.parse().map_err(|e: String| sqlx::Error::Decode(e.into()))
}

fn mapping_from_row(row: &PgRow) -> Result<Mapping, sqlx::Error> {
    Ok(Mapping {
        id: row.try_get("id")?,
        consultant_id: row.try_get("consultant_id")?,
        client_id: row.try_get("client_id")?,
        consultant_name: row.try_get("consultant_name")?,
        client_name: row.try_get("client_name")?,
        client_email: row.try_get("client_email")?,
        status: parse_status(row.try_get("status")?)?,
        total_sessions: row.try_get("total_sessions")?,
        used_sessions: row.try_get("used_sessions")?,
        remaining_sessions: row.try_get("remaining_sessions")?,
        package_name: row.try_get("package_name")?,
        package_price: row.try_get("package_price")?,
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn request_from_row(row: &PgRow) -> Result<ExtensionRequest, sqlx::Error> {
    Ok(ExtensionRequest {
        id: row.try_get("id")?,
        mapping_id: row.try_get("mapping_id")?,
        requester_id: row.try_get("requester_id")?,
        additional_sessions: row.try_get("additional_sessions")?,
        package_name: row.try_get("package_name")?,
        package_price: row.try_get("package_price")?,
        reason: row.try_get("reason")?,
        status: parse_status(row.try_get("status")?)?,
        payment_method: row.try_get("payment_method")?,
        payment_reference: row.try_get("payment_reference")?,
        payment_confirmed_at: row.try_get("payment_confirmed_at")?,
        approver_id: row.try_get("approver_id")?,
        approval_comment: row.try_get("approval_comment")?,
        approved_at: row.try_get("approved_at")?,
        rejected_by: row.try_get("rejected_by")?,
        rejection_reason: row.try_get("rejection_reason")?,
        rejected_at: row.try_get("rejected_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

/// Store backed by PostgreSQL
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new store over an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_mapping(&self, mapping: &Mapping) -> DatabaseResult<()> {
        sqlx::query(
            r#"
            INSERT INTO mappings (
                id, consultant_id, client_id, consultant_name, client_name, client_email,
                status, total_sessions, used_sessions, remaining_sessions, package_name,
                package_price, version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(mapping.id)
        .bind(mapping.consultant_id)
        .bind(mapping.client_id)
        .bind(&mapping.consultant_name)
        .bind(&mapping.client_name)
        .bind(&mapping.client_email)
        .bind(mapping.status.as_str())
        .bind(mapping.total_sessions)
        .bind(mapping.used_sessions)
        .bind(mapping.remaining_sessions)
        .bind(&mapping.package_name)
        .bind(mapping.package_price)
        .bind(mapping.version)
        .bind(mapping.created_at)
        .bind(mapping.updated_at)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::Query)?;

        Ok(())
    }

    async fn find_mapping(&self, id: Uuid) -> DatabaseResult<Option<Mapping>> {
        let sql = format!("SELECT {} FROM mappings WHERE id = $1", MAPPING_COLUMNS);

        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::Query)?;

        row.as_ref()
            .map(mapping_from_row)
            .transpose()
            .map_err(DatabaseError::Query)
    }

    async fn list_mappings(&self) -> DatabaseResult<Vec<Mapping>> {
        let sql = format!(
            "SELECT {} FROM mappings ORDER BY created_at DESC",
            MAPPING_COLUMNS
        );

        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::Query)?;

        rows.iter()
            .map(mapping_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(DatabaseError::Query)
    }

    async fn use_session(&self, id: Uuid, now: DateTime<Utc>) -> DatabaseResult<Option<Mapping>> {
        let sql = format!(
            r#"
            UPDATE mappings
            SET used_sessions = used_sessions + 1,
                remaining_sessions = remaining_sessions - 1,
                status = CASE WHEN remaining_sessions - 1 = 0 THEN $3 ELSE status END,
                version = version + 1,
                updated_at = $4
            WHERE id = $1 AND status = $2 AND remaining_sessions > 0
            RETURNING {}
            "#,
            MAPPING_COLUMNS
        );

        let row = sqlx::query(&sql)
            .bind(id)
            .bind(MappingStatus::Active.as_str())
            .bind(MappingStatus::SessionsExhausted.as_str())
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::Query)?;

        row.as_ref()
            .map(mapping_from_row)
            .transpose()
            .map_err(DatabaseError::Query)
    }

    async fn insert_request(&self, request: &ExtensionRequest) -> DatabaseResult<()> {
        sqlx::query(
            r#"
            INSERT INTO extension_requests (
                id, mapping_id, requester_id, additional_sessions, package_name,
                package_price, reason, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(request.id)
        .bind(request.mapping_id)
        .bind(request.requester_id)
        .bind(request.additional_sessions)
        .bind(&request.package_name)
        .bind(request.package_price)
        .bind(&request.reason)
        .bind(request.status.as_str())
        .bind(request.created_at)
        .bind(request.updated_at)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::Query)?;

        Ok(())
    }

    async fn find_request(&self, id: Uuid) -> DatabaseResult<Option<ExtensionRequest>> {
        let sql = format!(
            "SELECT {} FROM extension_requests r WHERE r.id = $1",
            REQUEST_COLUMNS
        );

        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::Query)?;

        row.as_ref()
            .map(request_from_row)
            .transpose()
            .map_err(DatabaseError::Query)
    }

    async fn update_request(
        &self,
        request: &ExtensionRequest,
        expected: ExtensionStatus,
    ) -> DatabaseResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE extension_requests
            SET status = $3,
                payment_method = $4,
                payment_reference = $5,
                payment_confirmed_at = $6,
                approver_id = $7,
                approval_comment = $8,
                approved_at = $9,
                rejected_by = $10,
                rejection_reason = $11,
                rejected_at = $12,
                updated_at = $13
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(request.id)
        .bind(expected.as_str())
        .bind(request.status.as_str())
        .bind(&request.payment_method)
        .bind(&request.payment_reference)
        .bind(request.payment_confirmed_at)
        .bind(request.approver_id)
        .bind(&request.approval_comment)
        .bind(request.approved_at)
        .bind(request.rejected_by)
        .bind(&request.rejection_reason)
        .bind(request.rejected_at)
        .bind(request.updated_at)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::Query)?;

        Ok(result.rows_affected() == 1)
    }

    async fn complete_request(
        &self,
        id: Uuid,
        completed_at: DateTime<Utc>,
    ) -> DatabaseResult<CompletionOutcome> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::Query)?;

        // Row lock serializes concurrent completions of the same request.
        let sql = format!(
            "SELECT {} FROM extension_requests r WHERE r.id = $1 FOR UPDATE",
            REQUEST_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(DatabaseError::Query)?;

        let Some(row) = row else {
            return Ok(CompletionOutcome::NotFound);
        };
        let mut request = request_from_row(&row).map_err(DatabaseError::Query)?;

        match request.status {
            ExtensionStatus::Completed => return Ok(CompletionOutcome::AlreadyCompleted(request)),
            ExtensionStatus::AdminApproved if request.completed_at.is_none() => {}
            other => return Ok(CompletionOutcome::NotApproved(other)),
        }

        let sql = format!(
            r#"
            UPDATE mappings
            SET total_sessions = total_sessions + $2,
                remaining_sessions = remaining_sessions + $2,
                status = CASE WHEN status = $3 THEN $4 ELSE status END,
                version = version + 1,
                updated_at = $5
            WHERE id = $1
            RETURNING {}
            "#,
            MAPPING_COLUMNS
        );
        let mapping_row = sqlx::query(&sql)
            .bind(request.mapping_id)
            .bind(request.additional_sessions)
            .bind(MappingStatus::SessionsExhausted.as_str())
            .bind(MappingStatus::Active.as_str())
            .bind(completed_at)
            .fetch_optional(&mut *tx)
            .await
            .map_err(DatabaseError::Query)?;

        let Some(mapping_row) = mapping_row else {
            return Ok(CompletionOutcome::NotFound);
        };
        let mapping = mapping_from_row(&mapping_row).map_err(DatabaseError::Query)?;

        sqlx::query(
            r#"
            UPDATE extension_requests
            SET status = $2, completed_at = $3, updated_at = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(ExtensionStatus::Completed.as_str())
        .bind(completed_at)
        .execute(&mut *tx)
        .await
        .map_err(DatabaseError::Query)?;

        tx.commit().await.map_err(DatabaseError::Query)?;

        request.status = ExtensionStatus::Completed;
        request.completed_at = Some(completed_at);
        request.updated_at = completed_at;

        Ok(CompletionOutcome::Completed { request, mapping })
    }

    async fn list_requests(
        &self,
        query: &ExtensionQuery,
    ) -> DatabaseResult<(Vec<ExtensionRequest>, i64)> {
        let window = PageWindow::resolve(query.page, query.limit);
        let limit = window.map(|w| w.limit as i64);
        let offset = window.map(|w| w.offset()).unwrap_or(0);

        // NULL parameters disable their filter; LIMIT NULL returns every row.
        let filters = r#"
            FROM extension_requests r
            JOIN mappings m ON m.id = r.mapping_id
            WHERE ($1::uuid IS NULL OR r.mapping_id = $1)
              AND ($2::uuid IS NULL OR r.requester_id = $2)
              AND ($3::uuid IS NULL OR m.consultant_id = $3)
              AND ($4::uuid IS NULL OR m.client_id = $4)
              AND ($5::text IS NULL OR r.status = $5)
        "#;
        let status = query.status.map(|s| s.as_str());

        let sql = format!(
            "SELECT {} {} ORDER BY r.created_at DESC LIMIT $6 OFFSET $7",
            REQUEST_COLUMNS, filters
        );
        let rows = sqlx::query(&sql)
            .bind(query.mapping_id)
            .bind(query.requester_id)
            .bind(query.consultant_id)
            .bind(query.client_id)
            .bind(status)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::Query)?;

        let count_sql = format!("SELECT COUNT(*) {}", filters);
        let total: i64 = sqlx::query_scalar(&count_sql)
            .bind(query.mapping_id)
            .bind(query.requester_id)
            .bind(query.consultant_id)
            .bind(query.client_id)
            .bind(status)
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::Query)?;

        let requests = rows
            .iter()
            .map(request_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(DatabaseError::Query)?;

        Ok((requests, total))
    }

    async fn status_tallies(&self) -> DatabaseResult<Vec<(ExtensionStatus, StatusTally)>> {
        let rows = sqlx::query(
            r#"
            SELECT status,
                   COUNT(*) AS count,
                   LEAST(
                       COALESCE(SUM(package_price), 0),
                       9223372036854775807
                   )::BIGINT AS price_total
            FROM extension_requests
            GROUP BY status
            ORDER BY status
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::Query)?;

        rows.iter()
            .map(|row| {
                let status: ExtensionStatus = parse_status(row.try_get("status")?)?;
                let tally = StatusTally {
                    count: row.try_get("count")?,
                    package_price_total: row.try_get("price_total")?,
                };
                Ok((status, tally))
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(DatabaseError::Query)
    }

    async fn find_codes(&self, group: &str) -> DatabaseResult<Vec<CommonCode>> {
        let rows = sqlx::query(
            r#"
            SELECT code_group, code_value, code_label, color_code, icon, sort_order
            FROM common_codes
            WHERE code_group = $1 AND is_active
            ORDER BY sort_order, code_value
            "#,
        )
        .bind(group)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::Query)?;

        rows.iter()
            .map(|row| {
                Ok(CommonCode {
                    code_group: row.try_get("code_group")?,
                    code_value: row.try_get("code_value")?,
                    code_label: row.try_get("code_label")?,
                    color_code: row.try_get("color_code")?,
                    icon: row.try_get("icon")?,
                    sort_order: row.try_get("sort_order")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(DatabaseError::Query)
    }

    async fn health_check(&self) -> DatabaseResult<bool> {
        common::database::health_check(&self.pool).await
    }
}
