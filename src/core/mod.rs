pub mod adapters;
pub mod command;
pub mod compose;
pub mod docker;
pub mod engine;
pub mod error;
pub mod executor;
pub mod fallback;
pub mod operations;
pub mod params;
pub mod paths;
pub mod registry;
pub mod stack;
pub mod store;

pub use docker::DockerManager;
pub use engine::EngineType;
pub use error::{ErrorKind, OperationError};
pub use executor::{CommandExecutor, ProcessExecutor};
pub use operations::{run_dump, run_restore, OperationContext, OperationResult, OperationSettings};
pub use registry::{ConfigLocks, OperationRegistry};
pub use store::ConfigStore;
