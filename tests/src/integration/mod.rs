//! # Integration Tests
//!
//! End-to-end flows between a running [`BridgeServer`](bridge_engine::BridgeServer)
//! and peers connected over loopback TCP.

pub mod framing;
pub mod lifecycle;
pub mod session;
