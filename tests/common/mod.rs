//! Fake Ethereum node shared by the end-to-end tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use validator_server::ValidatorServer;
use validator_services::backend::{ExecutionBlock, Transaction, TransactionReceipt};
use validator_services::{Backend, BackendError, BlockRewardService, SyncDutiesService};

pub const FEE_RECIPIENT: &str = "0x388c818ca8b9251b393131c08a736a67ccb19297";
pub const HEAD_BLOCK: u64 = 1_000;
pub const HEAD_SLOT: u64 = 2_000;
/// Block whose last transaction pays the proposer 2 ETH
pub const MEV_BLOCK: u64 = 500;
/// Locally built block earning 21000 gas at a 3 gwei tip
pub const VANILLA_BLOCK: u64 = 501;
pub const DUTY_SLOT: u64 = 1_500;
pub const LEAKY_DETAIL: &str = "upstream said: token abc123 is rate limited";

#[derive(Default, Clone)]
pub struct FakeNode {
    /// Every call fails with a detailed upstream error
    pub fail: bool,
    /// Delay before every answer
    pub delay: Option<Duration>,
}

impl FakeNode {
    pub fn slow(delay: Duration) -> Self {
        Self { delay: Some(delay), ..Default::default() }
    }

    pub fn failing() -> Self {
        Self { fail: true, ..Default::default() }
    }

    async fn answer(&self) -> Result<(), BackendError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(BackendError::Rpc { code: -32005, message: LEAKY_DETAIL.into() });
        }
        Ok(())
    }
}

impl Backend for FakeNode {
    async fn block_number(&self) -> Result<u64, BackendError> {
        self.answer().await?;
        Ok(HEAD_BLOCK)
    }

    async fn block_by_number(&self, number: u64) -> Result<Option<ExecutionBlock>, BackendError> {
        self.answer().await?;
        let transactions = match number {
            MEV_BLOCK => vec![
                tx("0x01", "0x1111111111111111111111111111111111111111", Some("0x2222222222222222222222222222222222222222"), 10),
                tx("0x02", FEE_RECIPIENT, Some("0x9999999999999999999999999999999999999999"), 2_000_000_000_000_000_000),
            ],
            VANILLA_BLOCK => vec![tx("0x03", "0x1111111111111111111111111111111111111111", Some(FEE_RECIPIENT), 5)],
            _ => return Ok(None),
        };
        Ok(Some(ExecutionBlock {
            number,
            miner: FEE_RECIPIENT.into(),
            base_fee_per_gas: Some(7_000_000_000),
            transactions,
        }))
    }

    async fn block_receipts(&self, number: u64) -> Result<Vec<TransactionReceipt>, BackendError> {
        self.answer().await?;
        if number != VANILLA_BLOCK {
            return Ok(Vec::new());
        }
        Ok(vec![TransactionReceipt {
            transaction_hash: "0x03".into(),
            gas_used: 21_000,
            effective_gas_price: 10_000_000_000,
        }])
    }

    async fn head_slot(&self) -> Result<u64, BackendError> {
        self.answer().await?;
        Ok(HEAD_SLOT)
    }

    async fn sync_committee(&self, slot: u64) -> Result<Option<Vec<u64>>, BackendError> {
        self.answer().await?;
        Ok((slot == DUTY_SLOT).then(|| vec![42, 7, 42]))
    }

    async fn validator_pubkeys(&self, _slot: u64, indices: &[u64]) -> Result<Vec<String>, BackendError> {
        self.answer().await?;
        let keys: HashMap<u64, &str> = HashMap::from([(7, "0xb0b7"), (42, "0xa11ce")]);
        indices
            .iter()
            .map(|i| {
                keys.get(i)
                    .map(|k| k.to_string())
                    .ok_or_else(|| BackendError::Decode(format!("validator {i} missing")))
            })
            .collect()
    }
}

fn tx(hash: &str, from: &str, to: Option<&str>, value: u128) -> Transaction {
    Transaction {
        hash: hash.into(),
        from: from.into(),
        to: to.map(Into::into),
        value,
    }
}

/// Router with both services over `node`, already initialized.
pub async fn validator(node: FakeNode) -> Arc<ValidatorServer> {
    let node = Arc::new(node);
    let mut server = ValidatorServer::new();
    server.register_service(BlockRewardService::new(node.clone()));
    server.register_service(SyncDutiesService::new(node));
    server.initialize().await.unwrap();
    Arc::new(server)
}
