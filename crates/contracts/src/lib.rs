//! # Contracts
//!
//! Frozen interface contracts, defining inter-module data structures and traits.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Trigger Model
//! - Every composite record carries one sub-record per detector channel
//! - Channels are matched by their hardware trigger counters, not by time

mod channel_type;
mod error;
mod record;
mod sink;
mod source;
mod sync;
mod sync_engine_config;

pub use channel_type::{channel_label, ChannelType};
pub use error::*;
pub use record::*;
pub use sink::*;
pub use source::{RecordSource, VecSource};
pub use sync::*;
pub use sync_engine_config::*;
