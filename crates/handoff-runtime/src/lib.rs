//! # handoff-runtime
//!
//! Coordinates support-chat channels between the automated responder and
//! human agents.
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`machine`] | [`ProtocolStateMachine`]: modes, transitions, effects |
//! | [`dedup`] | [`MessageDeduplicator`]: repeat suppression within a window |
//! | [`watchdog`] | [`InactivityWatchdog`]: idle release of agent sessions |
//! | [`context`] | [`ChannelContext`]: the per-channel actor |
//! | [`registry`] | [`SessionRegistry`]: one context per channel id |
//! | [`identity`] | [`ChannelResolver`] and nonce stores |
//! | [`metrics`] | Metric names |
//! | [`errors`] | [`CoordinatorError`] |

#![deny(unsafe_code)]

pub mod context;
pub mod dedup;
pub mod errors;
pub mod identity;
pub mod machine;
pub mod metrics;
pub mod registry;
pub mod watchdog;

pub use context::{ChannelConfig, ChannelContext, ChannelServices, ChannelUpdate, TransportSlot};
pub use dedup::{DedupConfig, MessageDeduplicator};
pub use errors::CoordinatorError;
pub use identity::{ChannelResolver, FileNonceStore, MemoryNonceStore, NonceStore};
pub use machine::{Effect, OracleOutcome, ProtocolStateMachine, Step, Trigger};
pub use registry::SessionRegistry;
pub use watchdog::{InactivityWatchdog, WatchdogFired};
