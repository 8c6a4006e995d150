//! Built-in and script-loaded tools dispatched each executor round.

pub mod base;
pub mod bash;
pub mod builtin;
pub mod registry;
pub mod script;

pub use base::{dispatch_all_with_actions, Tool};
pub use registry::ToolRegistry;
