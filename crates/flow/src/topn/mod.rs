//! Grouped Top-N ranking
//!
//! [`TopNOperator`] turns each incoming batch (usually a closed window) into
//! one [`TopNResult`]: for every group key, at most `n` entries ordered by
//! sort key and then by the hash of the record's identity.

pub mod operator;
pub mod ranking;

pub use operator::{Ranker, TopNOperator, TopNOptions, TopNResult};
pub use ranking::{hash_key, Order, RankedList, Tuple};
