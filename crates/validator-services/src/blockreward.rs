//! Block reward service. Classifies the block in a slot and reports the
//! proposer's reward.

use std::sync::Arc;

use tracing::debug;
use validator_protocol::{BlockRewardSlot, BlockStatus, HandlerResult};

use crate::backend::{Backend, ExecutionBlock, TransactionReceipt};
use crate::{Service, ServiceError};

const WEI_PER_GWEI: f64 = 1_000_000_000.0;

pub struct BlockRewardService<B: Backend> {
    backend: Arc<B>,
}

impl<B: Backend> BlockRewardService<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    pub async fn block_reward(&self, slot: u64) -> Result<BlockRewardSlot, ServiceError> {
        let head = self.backend.block_number().await?;
        if slot > head {
            debug!(slot, head, "slot is in the future");
            return Err(ServiceError::SlotNotFound(slot));
        }

        let block = self
            .backend
            .block_by_number(slot)
            .await?
            .ok_or(ServiceError::SlotNotFound(slot))?;

        if let Some(payment) = mev_payment(&block) {
            return Ok(BlockRewardSlot { status: BlockStatus::Mev, reward: wei_to_gwei(payment) });
        }

        let receipts = self.backend.block_receipts(slot).await?;
        let fees = priority_fees(block.base_fee_per_gas.unwrap_or(0), &receipts);
        Ok(BlockRewardSlot { status: BlockStatus::Vanilla, reward: wei_to_gwei(fees) })
    }
}

impl<B: Backend> Service for BlockRewardService<B> {
    fn namespace(&self) -> &str {
        "blockreward"
    }

    async fn handle(&self, slot: u64) -> HandlerResult {
        let body = self.block_reward(slot).await?;
        Ok(serde_json::to_value(body).map_err(ServiceError::from)?)
    }
}

/// A relay-built block ends with the builder paying the proposer: the last
/// transaction is sent by the fee recipient to another address. Returns that
/// payment in wei.
pub fn mev_payment(block: &ExecutionBlock) -> Option<u128> {
    let last = block.transactions.last()?;
    let to = last.to.as_deref()?;
    let from_builder = last.from.eq_ignore_ascii_case(&block.miner);
    (from_builder && !to.eq_ignore_ascii_case(&block.miner)).then_some(last.value)
}

/// Total priority fees paid to the fee recipient, in wei.
pub fn priority_fees(base_fee: u128, receipts: &[TransactionReceipt]) -> u128 {
    receipts.iter().fold(0u128, |total, receipt| {
        let tip = receipt.effective_gas_price.saturating_sub(base_fee);
        total.saturating_add(receipt.gas_used.saturating_mul(tip))
    })
}

fn wei_to_gwei(wei: u128) -> f64 {
    wei as f64 / WEI_PER_GWEI
}

