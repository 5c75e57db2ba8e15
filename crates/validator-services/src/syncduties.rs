//! Sync duties service: public keys of the sync committee serving a slot.

use std::sync::Arc;

use tracing::debug;
use validator_protocol::{HandlerResult, SyncDutiesResponse};

use crate::backend::Backend;
use crate::{Service, ServiceError};

pub struct SyncDutiesService<B: Backend> {
    backend: Arc<B>,
}

impl<B: Backend> SyncDutiesService<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    /// Keys are returned in committee position order. A validator holding
    /// several positions appears once per position.
    pub async fn sync_duties(&self, slot: u64) -> Result<SyncDutiesResponse, ServiceError> {
        let head = self.backend.head_slot().await?;
        if slot > head {
            debug!(slot, head, "slot is in the future");
            return Err(ServiceError::SlotNotFound(slot));
        }

        let committee = self
            .backend
            .sync_committee(slot)
            .await?
            .ok_or(ServiceError::SlotNotFound(slot))?;
        let public_validator_keys = self.backend.validator_pubkeys(slot, &committee).await?;

        Ok(SyncDutiesResponse { public_validator_keys })
    }
}

impl<B: Backend> Service for SyncDutiesService<B> {
    fn namespace(&self) -> &str {
        "syncduties"
    }

    async fn handle(&self, slot: u64) -> HandlerResult {
        let body = self.sync_duties(slot).await?;
        Ok(serde_json::to_value(body).map_err(ServiceError::from)?)
    }
}

