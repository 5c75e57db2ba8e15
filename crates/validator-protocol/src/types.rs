//! Response bodies and path parameter parsing.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message sent with `NOT_FOUND` whenever a slot cannot be served.
pub const SLOT_DOES_NOT_EXIST: &str = "slot does not exist";

/// How the block in a slot was built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockStatus {
    /// Built by an external builder and delivered through a MEV relay.
    Mev,
    /// Built locally by the validator's own execution client.
    Vanilla,
}

/// Body of `GET /blockreward/{slot}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockRewardSlot {
    pub status: BlockStatus,
    /// Reward paid to the proposer for the block, in GWEI.
    pub reward: f64,
}

/// Body of `GET /syncduties/{slot}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncDutiesResponse {
    /// Public keys of the validators with sync committee duties for the slot.
    #[serde(rename = "publicValidatorKeys")]
    pub public_validator_keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid slot: {0:?}")]
pub struct SlotParseError(pub String);

/// Parse a `{slot}` path segment. Only plain decimal digits are accepted,
/// so signs, whitespace and the empty string are all rejected.
pub fn parse_slot(raw: &str) -> Result<u64, SlotParseError> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SlotParseError(raw.to_string()));
    }
    raw.parse::<u64>().map_err(|_| SlotParseError(raw.to_string()))
}
