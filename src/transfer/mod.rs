//! Byte pump between a send process and a receive process.
//!
//! A transfer runs two child processes and copies the send side's stdout
//! into the receive side's stdin in fixed-size chunks. Everything the
//! children print on their side channels is drained concurrently so a
//! chatty tool can never wedge the pump, and the last lines are kept for
//! error reports.

mod pipeline;
mod receive_sink;
mod side_channel;

pub use pipeline::*;
pub use receive_sink::*;
pub use side_channel::*;

#[cfg(test)]
mod side_channel_test;
