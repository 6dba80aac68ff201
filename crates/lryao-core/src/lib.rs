//! Core types and computations of the offline/online cut-and-choose protocol with bucketing.
//!
//! Everything in this crate is synchronous and performs no IO. The message-driven protocols live
//! in the `lryao` crate.

// #![deny(missing_docs, unreachable_pub, unused_must_use)]
// #![deny(clippy::all)]
// #![forbid(unsafe_code)]

mod block;
pub mod bucket;
pub mod bundle;
pub mod chunks;
pub mod circuit;
pub mod circuits;
pub mod commit;
pub mod commitments;
pub mod compute;
pub mod difference;
mod error;
pub mod evaluation;
pub mod garble;
pub mod matrix;
pub mod params;
pub mod randomness;
pub mod selection;

pub use block::Block;
pub use error::CheatError;
