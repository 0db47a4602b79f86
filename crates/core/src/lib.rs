//! Domain vocabulary shared by every Courier crate.
//!
//! Kept free of internal dependencies so the database layer, the delivery
//! engine, the API and the worker can all depend on it.

pub mod channels;
pub mod digest;
pub mod error;
pub mod event_types;
pub mod priority;
pub mod retry;
pub mod roles;
pub mod signing;
pub mod types;
