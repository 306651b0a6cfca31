//! Repository for the `revisions` table and its nested-interval index.

use sqlx::PgConnection;

use revflow_core::models::NewRevision;
use revflow_core::tree::{IntervalShift, TreePosition};
use revflow_core::types::{DbId, Timestamp};

use crate::models::revision::RevisionRow;

/// Column list for revisions queries.
const COLUMNS: &str = "id, parent_id, created_at, created_by_id, moderated_at, \
    moderated_by_id, comment, status, deleted, lft, rght, tree_id, level";

/// Provides tree-aware operations for revisions.
pub struct RevisionRepo;

impl RevisionRepo {
    /// Insert a revision at an already computed tree position.
    pub async fn insert(
        conn: &mut PgConnection,
        input: &NewRevision,
        position: TreePosition,
    ) -> Result<RevisionRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO revisions
                (parent_id, created_at, created_by_id, moderated_at, moderated_by_id,
                 comment, status, deleted, lft, rght, tree_id, level)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RevisionRow>(&query)
            .bind(input.parent_id)
            .bind(input.created_at)
            .bind(input.created_by)
            .bind(input.moderated_at)
            .bind(input.moderated_by)
            .bind(&input.comment)
            .bind(input.status.code())
            .bind(input.deleted)
            .bind(position.lft)
            .bind(position.rght)
            .bind(position.tree_id)
            .bind(position.level)
            .fetch_one(conn)
            .await
    }

    /// Find a revision by its primary key.
    pub async fn find_by_id(
        conn: &mut PgConnection,
        id: DbId,
    ) -> Result<Option<RevisionRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM revisions WHERE id = $1");
        sqlx::query_as::<_, RevisionRow>(&query)
            .bind(id)
            .fetch_optional(conn)
            .await
    }

    /// Find a revision and lock its row until the transaction ends.
    ///
    /// Inserting a child renumbers the rest of the tree; the lock serializes
    /// concurrent inserts under the same parent.
    pub async fn find_for_update(
        conn: &mut PgConnection,
        id: DbId,
    ) -> Result<Option<RevisionRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM revisions WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, RevisionRow>(&query)
            .bind(id)
            .fetch_optional(conn)
            .await
    }

    /// Tree id for a new root. Ids come from a sequence, so they are never
    /// reused even when the drawing transaction rolls back.
    pub async fn next_tree_id(conn: &mut PgConnection) -> Result<i32, sqlx::Error> {
        let row: (i32,) = sqlx::query_as("SELECT nextval('revisions_tree_id_seq')::INTEGER")
            .fetch_one(conn)
            .await?;
        Ok(row.0)
    }

    /// Shift interval bounds at or beyond `shift.from` in one statement, so
    /// no row is ever seen with `lft >= rght`.
    pub async fn apply_shift(
        conn: &mut PgConnection,
        shift: IntervalShift,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE revisions SET
                lft = CASE WHEN lft >= $2 THEN lft + $3 ELSE lft END,
                rght = CASE WHEN rght >= $2 THEN rght + $3 ELSE rght END
             WHERE tree_id = $1 AND (lft >= $2 OR rght >= $2)",
        )
        .bind(shift.tree_id)
        .bind(shift.from)
        .bind(shift.delta)
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }

    /// Set status, optionally replacing the comment and stamping moderation.
    /// Returns `None` if the revision does not exist.
    pub async fn update_status(
        conn: &mut PgConnection,
        id: DbId,
        status: &str,
        comment: Option<&str>,
        moderation: Option<(DbId, Timestamp)>,
    ) -> Result<Option<RevisionRow>, sqlx::Error> {
        let query = format!(
            "UPDATE revisions SET
                status = $2,
                comment = COALESCE($3, comment),
                moderated_by_id = COALESCE($4, moderated_by_id),
                moderated_at = COALESCE($5, moderated_at)
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RevisionRow>(&query)
            .bind(id)
            .bind(status)
            .bind(comment)
            .bind(moderation.map(|(by, _)| by))
            .bind(moderation.map(|(_, at)| at))
            .fetch_optional(conn)
            .await
    }

    /// Count direct children of a revision.
    pub async fn count_children(conn: &mut PgConnection, id: DbId) -> Result<i64, sqlx::Error> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM revisions WHERE parent_id = $1")
            .bind(id)
            .fetch_one(conn)
            .await?;
        Ok(row.0)
    }

    /// Ids of direct children, in tree order.
    pub async fn list_child_ids(
        conn: &mut PgConnection,
        id: DbId,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        let rows: Vec<(DbId,)> =
            sqlx::query_as("SELECT id FROM revisions WHERE parent_id = $1 ORDER BY lft")
                .bind(id)
                .fetch_all(conn)
                .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Other children of the same parent. Roots have none.
    pub async fn list_siblings(
        conn: &mut PgConnection,
        id: DbId,
    ) -> Result<Vec<RevisionRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM revisions
             WHERE parent_id = (SELECT parent_id FROM revisions WHERE id = $1)
               AND id <> $1
             ORDER BY lft"
        );
        sqlx::query_as::<_, RevisionRow>(&query)
            .bind(id)
            .fetch_all(conn)
            .await
    }

    /// Fetch several revisions by id.
    pub async fn list_by_ids(
        conn: &mut PgConnection,
        ids: &[DbId],
    ) -> Result<Vec<RevisionRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM revisions WHERE id = ANY($1)");
        sqlx::query_as::<_, RevisionRow>(&query)
            .bind(ids)
            .fetch_all(conn)
            .await
    }

    /// Delete every revision inside `position`'s interval, returning their
    /// ids. Versions go with them through `ON DELETE CASCADE`.
    pub async fn delete_interval(
        conn: &mut PgConnection,
        position: TreePosition,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        let rows: Vec<(DbId,)> = sqlx::query_as(
            "DELETE FROM revisions
             WHERE tree_id = $1 AND lft >= $2 AND rght <= $3
             RETURNING id",
        )
        .bind(position.tree_id)
        .bind(position.lft)
        .bind(position.rght)
        .fetch_all(conn)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// All revisions, tree by tree in pre-order.
    pub async fn list_all(conn: &mut PgConnection) -> Result<Vec<RevisionRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM revisions ORDER BY tree_id, lft");
        sqlx::query_as::<_, RevisionRow>(&query)
            .fetch_all(conn)
            .await
    }
}
