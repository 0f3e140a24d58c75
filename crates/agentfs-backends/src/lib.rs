//! Storage backends for agent virtual filesystems.
//!
//! - `StateBackend` - Files held in session state, updated through deltas
//! - `FilesystemBackend` - Files on the host under a root directory
//! - `SandboxBackend` - Files and shell execution in a sandbox session
//! - `CompositeBackend` - Longest-prefix routing across backends
//!
//! # Features
//!
//! - `local-sandbox` (default) - `LocalSession`, a sandbox session over a
//!   host directory and the local shell

mod composite;
mod filesystem;
pub mod sandbox;
pub mod search;
mod state;

pub use composite::CompositeBackend;
pub use filesystem::FilesystemBackend;
#[cfg(feature = "local-sandbox")]
pub use sandbox::{LocalSession, LocalSessionConfig};
pub use sandbox::{SandboxBackend, SandboxError, SandboxSession};
pub use state::StateBackend;
