//! Validator API Service Implementations
//!
//! Each service implements the `Service` trait and answers one route
//! namespace (`blockreward`, `syncduties`). Services are registered with the
//! validator server router which dispatches requests by the first path segment.

pub mod backend;
pub mod blockreward;
pub mod syncduties;

use thiserror::Error;
use tracing::error;
use validator_protocol::{ApiError, HandlerResult, SLOT_DOES_NOT_EXIST};

pub use backend::{Backend, BackendConfig, BackendError, RpcBackend};
pub use blockreward::BlockRewardService;
pub use syncduties::SyncDutiesService;

/// Trait implemented by all validator services.
///
/// The router has already checked the method and parsed the slot before
/// calling `handle`.
pub trait Service: Send + Sync {
    /// The route namespace this service handles (e.g. "blockreward").
    fn namespace(&self) -> &str;

    /// Answer a request for `slot`.
    fn handle(&self, slot: u64) -> impl std::future::Future<Output = HandlerResult> + Send;

    /// Initialize the service (called once at startup).
    fn init(&self) -> impl std::future::Future<Output = Result<(), Box<dyn std::error::Error + Send + Sync>>> + Send {
        async { Ok(()) }
    }

    /// Shutdown the service (called once at server shutdown).
    fn shutdown(&self) -> impl std::future::Future<Output = ()> + Send {
        async {}
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("slot {0} does not exist")]
    SlotNotFound(u64),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("failed to encode response: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::SlotNotFound(_) => ApiError::not_found(SLOT_DOES_NOT_EXIST),
            other => {
                // Details stay in the log; callers get the generic body
                error!("service failure: {other}");
                ApiError::internal()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_not_found_maps_to_404() {
        let err: ApiError = ServiceError::SlotNotFound(9).into();
        assert_eq!(err.status, 404);
        assert_eq!(err.params, Some(serde_json::json!(SLOT_DOES_NOT_EXIST)));
    }

    #[test]
    fn backend_failure_is_generic_500() {
        let err: ApiError = ServiceError::Backend(BackendError::Decode("secret detail".into())).into();
        assert_eq!(err.status, 500);
        assert!(err.params.is_none());
    }
}
