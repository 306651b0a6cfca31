use sqlx::PgPool;

/// Entity ids are bigint.
#[sqlx::test(migrations = "./migrations")]
async fn test_all_pks_are_bigint(pool: PgPool) {
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT table_name, data_type
         FROM information_schema.columns
         WHERE column_name = 'id'
           AND table_schema = 'public'
           AND table_name != '_sqlx_migrations'
         ORDER BY table_name",
    )
    .fetch_all(&pool)
    .await
    .unwrap();

    assert_eq!(rows.len(), 2, "Expected id columns on revisions and versions");
    for (table, data_type) in &rows {
        assert_eq!(data_type, "bigint", "Table {table}.id should be bigint");
    }
}

/// No character varying columns; TEXT with CHECK constraints instead.
#[sqlx::test(migrations = "./migrations")]
async fn test_no_varchar_columns(pool: PgPool) {
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT table_name, column_name
         FROM information_schema.columns
         WHERE table_schema = 'public'
           AND data_type = 'character varying'
           AND table_name != '_sqlx_migrations'
         ORDER BY table_name, column_name",
    )
    .fetch_all(&pool)
    .await
    .unwrap();

    assert!(
        rows.is_empty(),
        "Found VARCHAR columns (should use TEXT): {:?}",
        rows
    );
}

/// Every foreign key column has its own index.
#[sqlx::test(migrations = "./migrations")]
async fn test_all_fks_have_indexes(pool: PgPool) {
    let fk_columns: Vec<(String, String)> = sqlx::query_as(
        "SELECT DISTINCT
             tc.table_name,
             kcu.column_name
         FROM information_schema.table_constraints tc
         JOIN information_schema.key_column_usage kcu
             ON tc.constraint_name = kcu.constraint_name
             AND tc.table_schema = kcu.table_schema
         WHERE tc.constraint_type = 'FOREIGN KEY'
           AND tc.table_schema = 'public'
         ORDER BY tc.table_name, kcu.column_name",
    )
    .fetch_all(&pool)
    .await
    .unwrap();

    assert_eq!(fk_columns.len(), 2);
    for (table, column) in &fk_columns {
        let has_index: (bool,) = sqlx::query_as(&format!(
            "SELECT EXISTS (
                SELECT 1
                FROM pg_indexes
                WHERE schemaname = 'public'
                  AND tablename = '{table}'
                  AND indexdef LIKE '%({column})%'
            )"
        ))
        .fetch_one(&pool)
        .await
        .unwrap();

        assert!(has_index.0, "FK column {table}.{column} has no index");
    }
}

/// Removing a revision must take its subtree and versions with it.
#[sqlx::test(migrations = "./migrations")]
async fn test_fks_cascade_on_delete(pool: PgPool) {
    let fk_rules: Vec<(String, String, String)> = sqlx::query_as(
        "SELECT
             rc.constraint_name,
             tc.table_name,
             rc.delete_rule
         FROM information_schema.referential_constraints rc
         JOIN information_schema.table_constraints tc
             ON rc.constraint_name = tc.constraint_name
             AND rc.constraint_schema = tc.table_schema
         WHERE rc.constraint_schema = 'public'
         ORDER BY tc.table_name, rc.constraint_name",
    )
    .fetch_all(&pool)
    .await
    .unwrap();

    assert!(!fk_rules.is_empty());
    for (constraint, table, delete_rule) in &fk_rules {
        assert_eq!(
            delete_rule, "CASCADE",
            "FK {constraint} on {table} should cascade deletes"
        );
    }
}

/// Interval bounds and status codes are enforced by the database too.
#[sqlx::test(migrations = "./migrations")]
async fn test_revision_checks_reject_bad_rows(pool: PgPool) {
    let inverted = sqlx::query(
        "INSERT INTO revisions (status, lft, rght, tree_id, level)
         VALUES ('DR', 2, 1, 1, 0)",
    )
    .execute(&pool)
    .await
    .unwrap_err();
    assert_eq!(
        inverted.as_database_error().and_then(|e| e.constraint()),
        Some("ck_revisions_interval")
    );

    let unknown_status = sqlx::query(
        "INSERT INTO revisions (status, lft, rght, tree_id, level)
         VALUES ('XX', 1, 2, 1, 0)",
    )
    .execute(&pool)
    .await
    .unwrap_err();
    assert_eq!(
        unknown_status.as_database_error().and_then(|e| e.constraint()),
        Some("ck_revisions_status")
    );
}

/// Two revisions of one tree never start at the same bound.
#[sqlx::test(migrations = "./migrations")]
async fn test_interval_starts_are_unique_per_tree(pool: PgPool) {
    sqlx::query(
        "INSERT INTO revisions (status, lft, rght, tree_id, level)
         VALUES ('AP', 1, 2, 7, 0)",
    )
    .execute(&pool)
    .await
    .unwrap();

    let second_root = sqlx::query(
        "INSERT INTO revisions (status, lft, rght, tree_id, level)
         VALUES ('AP', 1, 2, 7, 0)",
    )
    .execute(&pool)
    .await
    .unwrap_err();
    assert_eq!(
        second_root.as_database_error().and_then(|e| e.constraint()),
        Some("uq_revisions_tree_lft")
    );
}
