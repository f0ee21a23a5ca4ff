//! Submodule defining the errors used across the crate.

use std::io;

/// Marker text the remote transport uses when it refuses an interactive transaction.
const TRANSACTION_NOT_ALLOWED: &str = "interactive transaction not allowed in HTTP queries";

/// Errors surfaced while splitting, executing, printing or dumping SQL.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The backend rejected a statement or failed while running it.
    ///
    /// Carries the backend's message verbatim.
    #[error("{0}")]
    Execution(String),
    /// The transport does not support interactive transactions.
    #[error(
        "transactions are only supported in the shell using semicolons to separate each statement.\nFor example: \"BEGIN; [your SQL statements]; END\""
    )]
    TransactionNotSupported,
    /// The in-flight statement was cancelled through its cancellation token.
    #[error("query canceled by the user")]
    CancelledByUser,
    /// A driver cell had a shape the formatter cannot render.
    #[error("unsupported type: {0}")]
    UnsupportedType(String),
    /// Enumerating tables, indexes or definitions from the catalog failed.
    #[error("catalog lookup failed: {0}")]
    CatalogLookup(#[source] Box<Error>),
    /// A previous execution panicked while holding the connection.
    #[error("connection is unusable: a previous execution panicked while holding it")]
    ConnectionPoisoned,
    /// The execution worker thread could not be started.
    #[error("failed to start execution worker: {0}")]
    Spawn(#[source] io::Error),
    /// Writing rendered output failed.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// Writing CSV output failed.
    #[error(transparent)]
    Csv(#[from] csv::Error),
    /// Writing JSON output failed.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// An output mode name was not one of `table`, `csv` or `json`.
    #[error("invalid output mode {0:?}, valid modes are table, csv, json")]
    InvalidOutputMode(String),
}

impl Error {
    /// Classify a raw backend error message into the error taxonomy.
    #[must_use]
    pub fn from_backend_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.contains(TRANSACTION_NOT_ALLOWED) {
            Error::TransactionNotSupported
        } else if message.contains("context canceled") || message == "interrupted" {
            Error::CancelledByUser
        } else {
            Error::Execution(message)
        }
    }

    /// Whether this error only reports a cooperative cancellation.
    ///
    /// A REPL stops the current batch on such errors without treating them as failures.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        match self {
            Error::CancelledByUser => true,
            Error::CatalogLookup(source) => source.is_cancelled(),
            _ => false,
        }
    }

    /// Wrap this error as a catalog failure, unless it already is one.
    pub(crate) fn into_catalog(self) -> Self {
        match self {
            Error::CatalogLookup(_) => self,
            other => Error::CatalogLookup(Box::new(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_message_classification() {
        assert!(matches!(
            Error::from_backend_message("near \"SELEC\": syntax error"),
            Error::Execution(msg) if msg == "near \"SELEC\": syntax error"
        ));
        assert!(matches!(
            Error::from_backend_message(
                "failed: interactive transaction not allowed in HTTP queries"
            ),
            Error::TransactionNotSupported
        ));
        assert!(matches!(
            Error::from_backend_message("context canceled"),
            Error::CancelledByUser
        ));
        assert!(matches!(
            Error::from_backend_message("interrupted"),
            Error::CancelledByUser
        ));
    }

    #[test]
    fn test_user_facing_messages() {
        assert_eq!(
            Error::CancelledByUser.to_string(),
            "query canceled by the user"
        );
        assert!(
            Error::TransactionNotSupported
                .to_string()
                .contains("\"BEGIN; [your SQL statements]; END\"")
        );
        assert_eq!(
            Error::from_backend_message("no such table: t").to_string(),
            "no such table: t"
        );
    }

    #[test]
    fn test_catalog_wrapping_is_idempotent() {
        let err = Error::CancelledByUser.into_catalog().into_catalog();
        match err {
            Error::CatalogLookup(source) => assert!(matches!(*source, Error::CancelledByUser)),
            other => panic!("expected catalog error, got {other:?}"),
        }
        assert!(Error::CancelledByUser.into_catalog().is_cancelled());
    }
}
