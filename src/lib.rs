//! Pocket Ledger
//!
//! This crate keeps personal-finance wallet balances consistent with their
//! transaction history. The write side goes through a single ledger engine
//! that applies balance deltas and transaction records together inside one
//! atomic store scope, and a recurring-transaction processor materializes
//! due scheduled transactions through that same engine.

pub mod config;
pub mod core;
pub mod stores;
