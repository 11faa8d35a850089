//! Protocol Buffer definitions and generated code for RPC services.
//!
//! This module contains auto-generated Rust types from Protobuf definitions,
//! typically created using [`tonic-build`] or `protoc` compiler plugins.

pub mod replication {
    include!("../generated/snapengine.replication.rs");
}
