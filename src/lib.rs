//! Natural-language shell. Deterministic intent resolution with fail-closed
//! command safety.
//!
//! An utterance flows through four stages: the resolver maps it onto a
//! registered tool schema and binds arguments, the synthesizer expands the
//! tool's template into a shell command, the safety validator classifies
//! the command as allow, confirm, or block, and only then does an executor
//! run it. Resolution is rule-based and deterministic; no stage after the
//! resolver ever re-interprets free text.

pub mod audit;
pub mod batch;
pub mod config;
pub mod context;
pub mod error;
pub mod exec;
pub mod plugin;
pub mod registry;
pub mod resolve;
pub mod safety;
pub mod session;
pub mod synth;

pub use config::Config;
pub use error::IncantError;
pub use session::{Pipeline, TurnOutcome};
