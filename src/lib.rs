//! Toolgate — a streaming tool-augmented conversation gateway.
//!
//! A client sends a message plus history; a language model answers it,
//! invoking tools discovered from an external provider process along the
//! way, and the output streams back incrementally:
//!
//! - [`provider`] spawns and talks to the tool provider (JSON-RPC over
//!   stdio) and exposes its tools through a per-session registry.
//! - [`inference`] streams OpenAI-compatible chat completions.
//! - [`agent`] runs the turn: interleaves model text with tool
//!   invocation and produces the fragment stream.
//! - [`server`] and [`repl`] are the two delivery transports.

pub mod agent;
pub mod config;
pub mod inference;
pub mod provider;
pub mod repl;
pub mod server;
