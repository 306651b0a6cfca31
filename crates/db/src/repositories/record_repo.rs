//! Repository for the generic `records` table.

use serde_json::Value;
use sqlx::PgConnection;

use crate::models::record::RecordRow;

/// Column list for records queries.
const COLUMNS: &str = "record_type, record_id, fields, m2m, updated_at";

/// Provides storage for live records.
pub struct RecordRepo;

impl RecordRepo {
    pub async fn find(
        conn: &mut PgConnection,
        record_type: &str,
        record_id: &str,
    ) -> Result<Option<RecordRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM records WHERE record_type = $1 AND record_id = $2"
        );
        sqlx::query_as::<_, RecordRow>(&query)
            .bind(record_type)
            .bind(record_id)
            .fetch_optional(conn)
            .await
    }

    pub async fn exists(
        conn: &mut PgConnection,
        record_type: &str,
        record_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let row: (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM records WHERE record_type = $1 AND record_id = $2)",
        )
        .bind(record_type)
        .bind(record_id)
        .fetch_one(conn)
        .await?;
        Ok(row.0)
    }

    /// Insert or replace a record.
    pub async fn upsert(
        conn: &mut PgConnection,
        record_type: &str,
        record_id: &str,
        fields: &Value,
        m2m: &Value,
    ) -> Result<RecordRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO records (record_type, record_id, fields, m2m)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (record_type, record_id) DO UPDATE SET
                fields = EXCLUDED.fields,
                m2m = EXCLUDED.m2m,
                updated_at = NOW()
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RecordRow>(&query)
            .bind(record_type)
            .bind(record_id)
            .bind(fields)
            .bind(m2m)
            .fetch_one(conn)
            .await
    }

    /// Delete a record. Returns `true` if a row was removed.
    pub async fn delete(
        conn: &mut PgConnection,
        record_type: &str,
        record_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM records WHERE record_type = $1 AND record_id = $2")
            .bind(record_type)
            .bind(record_id)
            .execute(conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Records of a type whose `field` holds `value` (compared as text).
    pub async fn list_referencing(
        conn: &mut PgConnection,
        record_type: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<RecordRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM records
             WHERE record_type = $1 AND fields ->> $2 = $3
             ORDER BY record_id"
        );
        sqlx::query_as::<_, RecordRow>(&query)
            .bind(record_type)
            .bind(field)
            .bind(value)
            .fetch_all(conn)
            .await
    }
}
