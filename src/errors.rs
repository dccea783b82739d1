use uuid::Uuid;

// ============================================================================
// Service Error Taxonomy
// ============================================================================
//
// Callers need to tell three outcomes apart:
// - Validation: the request itself is malformed; reported, never retried
// - NotFound: the referenced order does not exist
// - Store: infrastructure failed; retriable at the edges
//
// Broker publish failures never appear here: publication is best-effort
// after the store write, absorbed and logged on the service side.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("order {0} not found")]
    NotFound(Uuid),

    #[error("storage failure: {0}")]
    Store(#[source] anyhow::Error),
}

impl ServiceError {
    /// Map a store-level error to the service taxonomy, filling in the order
    /// id the caller was working with.
    pub fn from_store(err: crate::store::StoreError, id: Uuid) -> Self {
        match err {
            crate::store::StoreError::NotFound => ServiceError::NotFound(id),
            crate::store::StoreError::Backend(cause) => ServiceError::Store(cause),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;

    #[test]
    fn test_not_found_stays_distinct_from_backend_failure() {
        let id = Uuid::new_v4();

        let not_found = ServiceError::from_store(StoreError::NotFound, id);
        assert!(matches!(not_found, ServiceError::NotFound(got) if got == id));

        let backend =
            ServiceError::from_store(StoreError::Backend(anyhow::anyhow!("timeout")), id);
        assert!(matches!(backend, ServiceError::Store(_)));
    }

    #[test]
    fn test_error_messages_name_the_order() {
        let id = Uuid::new_v4();
        let err = ServiceError::NotFound(id);
        assert!(err.to_string().contains(&id.to_string()));
    }
}
