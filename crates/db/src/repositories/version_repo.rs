//! Repository for the `versions` table.

use sqlx::PgConnection;

use revflow_core::models::NewVersion;
use revflow_core::status::ModerationStatus;
use revflow_core::types::DbId;

use crate::models::version::VersionRow;

/// Column list for versions queries.
const COLUMNS: &str = "id, revision_id, record_type, record_id, record_id_int, \
    format, serialized_data, object_repr, op_kind";

/// Same columns qualified for joins against `revisions r`.
const V_COLUMNS: &str = "v.id, v.revision_id, v.record_type, v.record_id, v.record_id_int, \
    v.format, v.serialized_data, v.object_repr, v.op_kind";

/// Provides queries over record snapshots.
pub struct VersionRepo;

impl VersionRepo {
    /// Insert a version, returning the created row.
    pub async fn insert(
        conn: &mut PgConnection,
        input: &NewVersion,
    ) -> Result<VersionRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO versions
                (revision_id, record_type, record_id, record_id_int,
                 format, serialized_data, object_repr, op_kind)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, VersionRow>(&query)
            .bind(input.revision_id)
            .bind(&input.record_type)
            .bind(&input.record_id)
            .bind(input.record_id_int)
            .bind(&input.format)
            .bind(&input.serialized_data)
            .bind(&input.object_repr)
            .bind(input.op_kind.code())
            .fetch_one(conn)
            .await
    }

    /// Find a version by its primary key.
    pub async fn find_by_id(
        conn: &mut PgConnection,
        id: DbId,
    ) -> Result<Option<VersionRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM versions WHERE id = $1");
        sqlx::query_as::<_, VersionRow>(&query)
            .bind(id)
            .fetch_optional(conn)
            .await
    }

    /// All versions of one revision, in insertion order.
    pub async fn list_by_revision(
        conn: &mut PgConnection,
        revision_id: DbId,
    ) -> Result<Vec<VersionRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM versions WHERE revision_id = $1 ORDER BY id");
        sqlx::query_as::<_, VersionRow>(&query)
            .bind(revision_id)
            .fetch_all(conn)
            .await
    }

    /// The record's version in its most recently moderated Approved
    /// revision, ties broken by the greatest revision id.
    pub async fn find_latest_approved(
        conn: &mut PgConnection,
        record_type: &str,
        record_id: &str,
    ) -> Result<Option<VersionRow>, sqlx::Error> {
        let query = format!(
            "SELECT {V_COLUMNS} FROM versions v
             JOIN revisions r ON r.id = v.revision_id
             WHERE v.record_type = $1 AND v.record_id = $2 AND r.status = $3
             ORDER BY r.moderated_at DESC NULLS LAST, r.id DESC
             LIMIT 1"
        );
        sqlx::query_as::<_, VersionRow>(&query)
            .bind(record_type)
            .bind(record_id)
            .bind(ModerationStatus::Approved.code())
            .fetch_optional(conn)
            .await
    }

    /// Versions of a type whose revision is deleted and still a leaf.
    pub async fn list_deleted_leaves(
        conn: &mut PgConnection,
        record_type: &str,
    ) -> Result<Vec<VersionRow>, sqlx::Error> {
        let query = format!(
            "SELECT {V_COLUMNS} FROM versions v
             JOIN revisions r ON r.id = v.revision_id
             WHERE v.record_type = $1 AND r.deleted AND r.rght = r.lft + 1
             ORDER BY v.id"
        );
        sqlx::query_as::<_, VersionRow>(&query)
            .bind(record_type)
            .fetch_all(conn)
            .await
    }

    /// Versions in revisions with the given status.
    pub async fn list_by_status(
        conn: &mut PgConnection,
        status: ModerationStatus,
    ) -> Result<Vec<VersionRow>, sqlx::Error> {
        let query = format!(
            "SELECT {V_COLUMNS} FROM versions v
             JOIN revisions r ON r.id = v.revision_id
             WHERE r.status = $1
             ORDER BY v.id"
        );
        sqlx::query_as::<_, VersionRow>(&query)
            .bind(status.code())
            .fetch_all(conn)
            .await
    }

    /// Every version of a record, in tree order of their revisions.
    pub async fn list_by_record(
        conn: &mut PgConnection,
        record_type: &str,
        record_id: &str,
    ) -> Result<Vec<VersionRow>, sqlx::Error> {
        let query = format!(
            "SELECT {V_COLUMNS} FROM versions v
             JOIN revisions r ON r.id = v.revision_id
             WHERE v.record_type = $1 AND v.record_id = $2
             ORDER BY r.tree_id, r.lft"
        );
        sqlx::query_as::<_, VersionRow>(&query)
            .bind(record_type)
            .bind(record_id)
            .fetch_all(conn)
            .await
    }
}
