//! Validator API - Protocol Types
//!
//! Wire-level types shared by the transport, router and services:
//! error codes and the error body, header names, response bodies and
//! path parameter parsing.

pub mod error;
pub mod headers;
pub mod types;

pub use error::{ApiError, ErrorCode, HandlerResult};
pub use headers::Headers;
pub use types::{
    BlockRewardSlot, BlockStatus, SLOT_DOES_NOT_EXIST, SlotParseError, SyncDutiesResponse, parse_slot,
};

/// Human readable application name.
pub const APP_NAME: &str = "Ethereum Validator Service";
