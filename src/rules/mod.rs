pub mod backend;
pub mod errors;
pub mod kdl_file;
pub mod manager;
pub mod params;
pub mod store;
pub mod types;

pub use backend::{MemoryBackend, RuleBackend};
pub use errors::{RuleError, StorageError};
pub use kdl_file::KdlFileBackend;
pub use manager::RuleManager;
pub use types::{LayerScope, Method, RuleKey, Upsert};
