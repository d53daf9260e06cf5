//! Database abstraction layer.
//!
//! - Connection pool management
//! - Sandboxed (always rolled back) execution
//! - Row decoding into JSON

pub mod pool;
pub mod sandbox;
pub mod types;

pub use pool::DbPool;
pub use sandbox::SandboxedExecutor;
pub use types::RowToJson;
