//! Testing utilities and mock implementations
//!
//! In-memory [`ClientFactory`](crate::transport::ClientFactory) and
//! [`DeviceClient`](crate::transport::DeviceClient) implementations for
//! exercising device code without a broker.

pub mod mocks;

#[cfg(test)]
pub(crate) mod fixtures;

pub use mocks::*;
