//! In-memory `Backend` shared by the service tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use validator_services::backend::{ExecutionBlock, Transaction, TransactionReceipt};
use validator_services::{Backend, BackendError};

pub const MINER: &str = "0x95222290dd7278aa3ddd389cc1e1d165cc4bafe5";

#[derive(Default)]
pub struct MockBackend {
    pub head_block: u64,
    pub blocks: HashMap<u64, ExecutionBlock>,
    pub receipts: HashMap<u64, Vec<TransactionReceipt>>,
    pub head_slot: u64,
    pub committees: HashMap<u64, Vec<u64>>,
    pub pubkeys: HashMap<u64, String>,
    pub fail: bool,
    pub receipt_calls: AtomicU32,
}

impl MockBackend {
    fn check(&self) -> Result<(), BackendError> {
        if self.fail {
            return Err(BackendError::Status { status: 502, call: "mock".into() });
        }
        Ok(())
    }
}

impl Backend for MockBackend {
    async fn block_number(&self) -> Result<u64, BackendError> {
        self.check()?;
        Ok(self.head_block)
    }

    async fn block_by_number(&self, number: u64) -> Result<Option<ExecutionBlock>, BackendError> {
        self.check()?;
        Ok(self.blocks.get(&number).cloned())
    }

    async fn block_receipts(&self, number: u64) -> Result<Vec<TransactionReceipt>, BackendError> {
        self.check()?;
        self.receipt_calls.fetch_add(1, Ordering::Relaxed);
        Ok(self.receipts.get(&number).cloned().unwrap_or_default())
    }

    async fn head_slot(&self) -> Result<u64, BackendError> {
        self.check()?;
        Ok(self.head_slot)
    }

    async fn sync_committee(&self, slot: u64) -> Result<Option<Vec<u64>>, BackendError> {
        self.check()?;
        Ok(self.committees.get(&slot).cloned())
    }

    async fn validator_pubkeys(&self, _slot: u64, indices: &[u64]) -> Result<Vec<String>, BackendError> {
        self.check()?;
        indices
            .iter()
            .map(|i| {
                self.pubkeys
                    .get(i)
                    .cloned()
                    .ok_or_else(|| BackendError::Decode(format!("validator {i} missing")))
            })
            .collect()
    }
}

pub fn tx(hash: &str, from: &str, to: Option<&str>, value: u128) -> Transaction {
    Transaction {
        hash: hash.into(),
        from: from.into(),
        to: to.map(Into::into),
        value,
    }
}

pub fn receipt(hash: &str, gas_used: u128, effective_gas_price: u128) -> TransactionReceipt {
    TransactionReceipt {
        transaction_hash: hash.into(),
        gas_used,
        effective_gas_price,
    }
}

/// Block 100 built by `MINER` with a 10 gwei base fee.
pub fn block(transactions: Vec<Transaction>) -> ExecutionBlock {
    ExecutionBlock {
        number: 100,
        miner: MINER.into(),
        base_fee_per_gas: Some(10_000_000_000),
        transactions,
    }
}
