mod client;
mod config;
mod constants;
mod errors;
mod metrics;
mod network;
mod node;
mod scheduler;
mod snapshots;
mod transfer;
mod zfs;
pub mod proto;
pub mod utils;

pub use client::*;
pub use config::*;
pub use errors::*;
pub use metrics::*;
pub use network::*;
pub use node::*;
pub use scheduler::*;
pub use snapshots::*;
pub use transfer::*;
pub use utils::*;
pub use zfs::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
//-----------------------------------------------------------
// Autometrics
/// autometrics: https://docs.autometrics.dev/rust/adding-alerts-and-slos
use autometrics::objectives::Objective;
use autometrics::objectives::ObjectiveLatency;
use autometrics::objectives::ObjectivePercentile;
const API_SLO: Objective = Objective::new("api")
    .success_rate(ObjectivePercentile::P99_9)
    .latency(ObjectiveLatency::Ms10, ObjectivePercentile::P99);
