//! sqlx error classification.

use pathkv_core::StoreError;

/// `invalid_text_representation`: the server rejected a bound value, e.g. `::json`.
const INVALID_TEXT_REPRESENTATION: &str = "22P02";
/// `invalid_json_text`
const INVALID_JSON_TEXT: &str = "22032";

pub(crate) fn map_sqlx(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Configuration(_) => StoreError::Configuration(err.to_string()),
        sqlx::Error::Database(db)
            if matches!(
                db.code().as_deref(),
                Some(INVALID_TEXT_REPRESENTATION | INVALID_JSON_TEXT)
            ) =>
        {
            StoreError::Payload(db.message().to_string())
        }
        sqlx::Error::RowNotFound
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::TypeNotFound { .. } => StoreError::RowDecode(err.to_string()),
        _ => StoreError::Connection(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;

    use super::*;
    use pathkv_core::ErrorKind;
    use rstest::rstest;

    #[rstest]
    #[case::config(sqlx::Error::Configuration("bad url".into()), ErrorKind::Configuration)]
    #[case::missing_column(sqlx::Error::ColumnNotFound("created".into()), ErrorKind::RowDecode)]
    #[case::out_of_bounds(
        sqlx::Error::ColumnIndexOutOfBounds { index: 4, len: 3 },
        ErrorKind::RowDecode
    )]
    #[case::pool_timeout(sqlx::Error::PoolTimedOut, ErrorKind::Connection)]
    #[case::pool_closed(sqlx::Error::PoolClosed, ErrorKind::Connection)]
    #[case::no_rows(sqlx::Error::RowNotFound, ErrorKind::RowDecode)]
    fn classifies(#[case] err: sqlx::Error, #[case] expected: ErrorKind) {
        assert_eq!(map_sqlx(err).kind(), expected);
    }

    /// Server-side error carrying only a SQLSTATE.
    #[derive(Debug)]
    struct ServerError {
        code: &'static str,
    }

    impl std::fmt::Display for ServerError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "server error {}", self.code)
        }
    }

    impl std::error::Error for ServerError {}

    impl sqlx::error::DatabaseError for ServerError {
        fn message(&self) -> &str {
            "invalid input syntax for type json"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed(self.code))
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            sqlx::error::ErrorKind::Other
        }
    }

    #[rstest]
    #[case::bad_text(INVALID_TEXT_REPRESENTATION, ErrorKind::Payload)]
    #[case::bad_json(INVALID_JSON_TEXT, ErrorKind::Payload)]
    #[case::auth_failed("28P01", ErrorKind::Connection)]
    fn classifies_server_codes(#[case] code: &'static str, #[case] expected: ErrorKind) {
        let err = sqlx::Error::Database(Box::new(ServerError { code }));
        assert_eq!(map_sqlx(err).kind(), expected);
    }

    #[test]
    fn payload_error_keeps_server_message() {
        let err = sqlx::Error::Database(Box::new(ServerError {
            code: INVALID_JSON_TEXT,
        }));
        assert_eq!(
            map_sqlx(err).to_string(),
            StoreError::Payload("invalid input syntax for type json".into()).to_string()
        );
    }
}
