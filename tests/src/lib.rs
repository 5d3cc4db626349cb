//! # Editor Bridge Test Suite
//!
//! Unified test crate. Everything here runs over real loopback sockets.
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── benches/          # Framer throughput
//! └── src/
//!     ├── support.rs    # Raw peer, server fixtures
//!     └── integration/
//!         ├── request_reply.rs  # Correlation, timeouts, dispatch
//!         ├── framing.rs        # Chunking, coalescing, malformed input
//!         ├── broadcast.rs      # Fan-out and isolation
//!         ├── lifecycle.rs      # Start, stop, drain
//!         └── session.rs        # Client handshake and tool relay
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p bridge-tests
//!
//! # By category
//! cargo test -p bridge-tests integration::framing::
//!
//! # Benchmarks
//! cargo bench -p bridge-tests
//! ```

pub mod integration;
