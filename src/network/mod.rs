//! This module is the network abstraction layer for replication traffic
//!
//! The gRPC surface exposes the snapshot negotiation calls and the streamed
//! snapshot import. All network operations are governed by the parameters
//! defined in [`NetworkConfig`](crate::NetworkConfig) to keep the long-lived
//! bulk streams and the short negotiation calls responsive.
pub mod grpc;
