//! # Ports Layer
//!
//! Defines the port traits for the SafeProtocol subsystem.
//!
//! ## Hexagonal Architecture
//!
//! - `inbound.rs` - Driving ports (API exposed to the HTTP gateway)
//! - `outbound.rs` - Driven ports (identity provider, stores, clock, rate limit)

pub mod inbound;
pub mod outbound;
