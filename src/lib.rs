//! Risk-gated capital and execution core for an automated trading agent.
//!
//! The crate sizes trades, halts trading when danger signals accumulate and
//! drives the lifecycle of exchange orders while keeping a consistent ledger
//! of balance and PnL.

pub mod bot;
pub mod capital;
pub mod clock;
pub mod config;
pub mod domain;
pub mod exchanges;
pub mod execution;
pub mod market_data;
pub mod notification;
pub mod risk;
pub mod safe_mode;
