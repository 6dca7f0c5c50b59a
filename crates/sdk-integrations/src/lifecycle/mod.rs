//! # System Lifecycle
//!
//! [`IntegrationSystem`] starts one bridge per configured resource, wires them into the
//! ad, store and push clients, and shuts everything down again.

pub mod integration_system;

pub use integration_system::IntegrationSystem;
