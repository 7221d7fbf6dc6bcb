//! Relation graph over travel content and the booking payment workflow
//!
//! Both halves persist to one embedded sled database. The graph side stores
//! typed edges between content entities and derives each entity's relation
//! fields from them; the booking side runs captures, cancellations and
//! refunds through a pure state machine and an idempotent payment ledger.

pub mod booking;
pub mod config;
pub mod edge;
pub mod entity;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod machine;
pub mod notify;
pub mod otp;
pub mod populate;
pub mod registry;
pub mod relation;
pub mod service;
pub mod sweeper;
pub mod sync;
pub mod types;
pub mod utils;

pub use error::{Error, Result};
