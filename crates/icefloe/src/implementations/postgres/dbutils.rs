use icefloe_rest::ErrorModel;

use crate::CONFIG;

pub(crate) trait DBErrorHandler
where
    Self: ToString + Sized + Send + Sync + std::error::Error + 'static,
{
    fn into_error_model(self, message: impl Into<String>) -> ErrorModel;
}

/// SQLSTATE classes that mean the statement lost against a concurrent
/// transaction rather than hit a real fault: 40 (transaction rollback,
/// includes serialization failures and deadlocks), 25 (invalid
/// transaction state) and 2D (invalid transaction termination). Clients
/// can retry these, so they surface as 409 instead of 500.
fn is_transaction_conflict(code: &str) -> bool {
    code.starts_with("40") || code.starts_with("25") || code.starts_with("2D")
}

impl DBErrorHandler for sqlx::Error {
    fn into_error_model(self, message: impl Into<String>) -> ErrorModel {
        let model = match &self {
            Self::Database(db) => {
                if db.is_unique_violation() {
                    ErrorModel::conflict(message, "EntityAlreadyExists", Some(Box::new(self)))
                } else if db.code().as_deref().is_some_and(is_transaction_conflict) {
                    ErrorModel::conflict(
                        "Concurrent modification failed.",
                        "TransactionFailed",
                        Some(Box::new(self)),
                    )
                } else {
                    ErrorModel::internal(message, "DatabaseError", Some(Box::new(self)))
                }
            }
            _ => ErrorModel::internal(message, "DatabaseError", Some(Box::new(self))),
        };

        if CONFIG.development {
            let chain = model
                .source
                .as_ref()
                .map(std::string::ToString::to_string);
            model.append_details(chain)
        } else {
            model
        }
    }
}
