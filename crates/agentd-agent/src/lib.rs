//! Tool executor, background job registry, reply router, memory manager,
//! executor loop, role templating, and skill boot hooks for one agent
//! workspace.

pub mod context;
pub mod executor;
pub mod memory;
pub mod router;
pub mod skills;
pub mod templates;
pub mod tools;

pub use executor::{ErrorDetail, Executor, StatusHandle, StatusSnapshot};
pub use memory::{prune, repair_tool_pairs};
pub use router::{Destination, ReplyRouter, RouterError};
pub use skills::run_setup_scripts;
pub use templates::{detect_provider, needs_worker_reset, reset_to_worker, scaffold_fresh, Role};
pub use tools::{Tool, ToolRegistry};
