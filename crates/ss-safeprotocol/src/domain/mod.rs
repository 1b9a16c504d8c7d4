//! # Domain Layer
//!
//! Pure SafeProtocol logic with no I/O dependencies.
//! This is the inner layer of the hexagonal architecture.

pub mod audit;
pub mod consent;
pub mod entities;
pub mod errors;
pub mod personal_number;
pub mod provider;
pub mod state;
