//! Translation of sqlx errors into the core error taxonomy.

use revflow_core::error::CoreError;

/// PostgreSQL foreign key violation.
const FOREIGN_KEY_VIOLATION: &str = "23503";
/// PostgreSQL unique constraint violation.
const UNIQUE_VIOLATION: &str = "23505";

/// Map a sqlx error onto [`CoreError`].
///
/// Foreign key violations become `Integrity` (a revert may retry them),
/// unique violations become `Conflict`, everything else is `Internal`.
pub fn db_error(err: sqlx::Error) -> CoreError {
    if let sqlx::Error::Database(db_err) = &err {
        let constraint = db_err.constraint().unwrap_or("unknown");
        match db_err.code().as_deref() {
            Some(FOREIGN_KEY_VIOLATION) => {
                return CoreError::Integrity(format!(
                    "Foreign key constraint {constraint} violated: {}",
                    db_err.message()
                ));
            }
            Some(UNIQUE_VIOLATION) => {
                return CoreError::Conflict(format!(
                    "Duplicate value violates unique constraint: {constraint}"
                ));
            }
            _ => {}
        }
    }
    tracing::error!(error = %err, "Database error");
    CoreError::Internal(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn non_database_errors_are_internal() {
        assert_matches!(db_error(sqlx::Error::RowNotFound), CoreError::Internal(_));
        assert_matches!(db_error(sqlx::Error::PoolTimedOut), CoreError::Internal(_));
    }
}
