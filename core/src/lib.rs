//! Shared-expense ledger core: balances, settlements and the periodic sweep.

pub mod access;
pub mod balance_calculator;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod period;
pub mod settlement_generator;
pub mod settlement_lifecycle;
pub mod settlement_strategy;
pub mod shutdown;
pub mod split;
pub mod store;
pub mod sweep_scheduler;
pub mod types;
