//! Client surface for driving replication towards a peer node.
//!
//! Two layers build on each other:
//! - [`ReplicationClient`] - negotiation calls over one shared channel
//! - [`PushReplicator`] - the full push workflow: ask the peer what it
//!   needs, plan locally, stream the send process over the wire
//!
//! # Basic Usage
//! ```no_run
//! use std::sync::Arc;
//!
//! use snap_engine::EngineConfig;
//! use snap_engine::NetworkConfig;
//! use snap_engine::PushReplicator;
//! use snap_engine::ReplicationClient;
//! use snap_engine::ReplicationConfig;
//! use snap_engine::ZfsCli;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let client = ReplicationClient::connect("127.0.0.1:9688", &NetworkConfig::default())
//!         .await
//!         .unwrap();
//!
//!     let engine = Arc::new(ZfsCli::new(EngineConfig::default()));
//!     let replicator = PushReplicator::new(client, engine, ReplicationConfig::default());
//!
//!     match replicator.push("tank/projects", "backup/projects").await {
//!         Ok(outcome) => println!("push finished: {:?}", outcome),
//!         Err(e) => eprintln!("push failed: {}", e),
//!     }
//! }
//! ```

mod push_replicator;
mod replication_client;

pub use push_replicator::*;
pub use replication_client::*;
