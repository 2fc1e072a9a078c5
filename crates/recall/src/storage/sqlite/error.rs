//! SQLite error mapping.
//!
//! Maps `tokio_rusqlite::Error` and `rusqlite::Error` to `StoreError` from
//! `recall_core::storage`. Domain errors raised inside a connection closure
//! travel as `tokio_rusqlite::Error::Other` and are recovered unchanged.

use recall_core::storage::StoreError;

/// Wraps a domain error so it can leave a `Connection::call` closure.
pub fn domain_err(err: StoreError) -> tokio_rusqlite::Error {
    tokio_rusqlite::Error::Other(Box::new(err))
}

/// Maps a rusqlite error with a known ID to a StoreError.
///
/// - `SQLITE_CONSTRAINT_PRIMARYKEY`/`UNIQUE` -> `StoreError::AlreadyExists`
/// - `SQLITE_BUSY`/`SQLITE_LOCKED`/cannot open -> `StoreError::Unavailable`
/// - Column conversion failures -> `StoreError::InvalidData`
/// - All other errors -> `StoreError::QueryFailed`
fn map_rusqlite_error_with_id(
    err: &rusqlite::Error,
    entity_type: &'static str,
    id: &str,
) -> StoreError {
    match err {
        rusqlite::Error::SqliteFailure(sqlite_err, _)
            if sqlite_err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                || sqlite_err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            StoreError::AlreadyExists {
                entity_type,
                id: id.to_string(),
            }
        }

        rusqlite::Error::SqliteFailure(sqlite_err, _)
            if matches!(
                sqlite_err.code,
                rusqlite::ErrorCode::DatabaseBusy
                    | rusqlite::ErrorCode::DatabaseLocked
                    | rusqlite::ErrorCode::CannotOpen
            ) =>
        {
            StoreError::Unavailable(err.to_string())
        }

        rusqlite::Error::FromSqlConversionFailure(..)
        | rusqlite::Error::IntegralValueOutOfRange(..)
        | rusqlite::Error::InvalidColumnType(..) => StoreError::InvalidData(err.to_string()),

        _ => StoreError::QueryFailed(err.to_string()),
    }
}

/// Maps a tokio_rusqlite error with a known ID to a StoreError.
pub fn map_tokio_rusqlite_error_with_id(
    err: tokio_rusqlite::Error,
    entity_type: &'static str,
    id: impl Into<String>,
) -> StoreError {
    let id_str = id.into();
    match err {
        tokio_rusqlite::Error::Rusqlite(rusqlite_err) => {
            map_rusqlite_error_with_id(&rusqlite_err, entity_type, &id_str)
        }
        tokio_rusqlite::Error::ConnectionClosed | tokio_rusqlite::Error::Close(_) => {
            StoreError::Unavailable("Connection closed unexpectedly".to_string())
        }
        tokio_rusqlite::Error::Other(other) => match other.downcast::<StoreError>() {
            Ok(store_err) => *store_err,
            Err(other) => StoreError::QueryFailed(other.to_string()),
        },
        other => StoreError::QueryFailed(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::ffi;

    fn sqlite_failure(code: rusqlite::ErrorCode, extended_code: i32) -> tokio_rusqlite::Error {
        tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(
            ffi::Error {
                code,
                extended_code,
            },
            None,
        ))
    }

    #[test]
    fn test_primary_key_maps_to_already_exists() {
        let err = sqlite_failure(
            rusqlite::ErrorCode::ConstraintViolation,
            ffi::SQLITE_CONSTRAINT_PRIMARYKEY,
        );

        let result = map_tokio_rusqlite_error_with_id(err, "LearningState", "a/b");

        assert_eq!(
            result,
            StoreError::AlreadyExists {
                entity_type: "LearningState",
                id: "a/b".to_string()
            }
        );
    }

    #[test]
    fn test_busy_maps_to_unavailable() {
        let err = sqlite_failure(rusqlite::ErrorCode::DatabaseBusy, ffi::SQLITE_BUSY);

        let result = map_tokio_rusqlite_error_with_id(err, "LearningState", "a/b");

        assert!(matches!(result, StoreError::Unavailable(_)));
    }

    #[test]
    fn test_conversion_failure_maps_to_invalid_data() {
        let err = tokio_rusqlite::Error::Rusqlite(rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::other("bad uuid")),
        ));

        let result = map_tokio_rusqlite_error_with_id(err, "LearningState", "a/b");

        assert!(matches!(result, StoreError::InvalidData(_)));
    }

    #[test]
    fn test_domain_error_is_recovered() {
        let conflict = StoreError::VersionConflict {
            id: "a/b".to_string(),
            expected: 7,
            actual: 8,
        };

        let result =
            map_tokio_rusqlite_error_with_id(domain_err(conflict.clone()), "LearningState", "a/b");

        assert_eq!(result, conflict);
    }

    #[test]
    fn test_foreign_other_error_maps_to_query_failed() {
        let err = tokio_rusqlite::Error::Other(Box::new(std::io::Error::other("test error")));

        let result = map_tokio_rusqlite_error_with_id(err, "LearningState", "a/b");

        assert!(matches!(result, StoreError::QueryFailed(_)));
    }

    #[test]
    fn test_connection_closed_maps_to_unavailable() {
        let result = map_tokio_rusqlite_error_with_id(
            tokio_rusqlite::Error::ConnectionClosed,
            "LearningState",
            "a/b",
        );

        assert!(matches!(result, StoreError::Unavailable(_)));
    }
}
