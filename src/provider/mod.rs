//! Tool provider boundary.
//!
//! Spawns the external tool provider process, speaks line-delimited
//! JSON-RPC with it, and exposes its tools to the agent loop through the
//! per-session [`registry::FunctionRegistry`].

pub mod errors;
pub mod registry;
pub mod session;
pub mod transport;
pub mod types;

pub use errors::ProviderError;
pub use registry::{FunctionRegistry, InvokeOutcome, RegistrationFailure};
pub use session::{ProviderSession, ToolSession};
pub use types::{ProviderConfig, ToolDescriptor, ToolOutcome};
