//! Offline/online two-party computation with cut-and-choose and bucketing.
//!
//! P1 garbles many copies of a circuit during the offline phase. P2 checks a random subset of them
//! and groups the rest into buckets, each of which later evaluates one input pair in the online
//! phase. A second cut-and-choose over a cheating-recovery circuit lets P2 learn P1's input if two
//! circuits of a bucket disagree.
//!
//! All protocols run over typed [`serio`] channels, one per worker.

#![deny(
    unsafe_code,
    missing_docs,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all
)]

mod backend;
pub mod config;
mod error;
pub mod msg;
pub mod offline;
mod offline_ot;
pub mod online;
pub mod ot;
pub mod prover;
#[cfg(test)]
mod test_utils;
pub mod verifier;

pub use config::{ProtocolConfig, ProtocolConfigBuilder, ProtocolConfigBuilderError};
pub use error::{P1Error, P2Error, ProtocolError};
pub use offline::{OfflineP1, OfflineP1Output, OfflineP2, OfflineP2Output};
pub use online::{OnlineOutput, OnlineP1, OnlineP2};
pub use prover::CutAndChooseProver;
pub use verifier::CutAndChooseVerifier;
