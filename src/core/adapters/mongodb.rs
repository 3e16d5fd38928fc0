use std::path::Path;

use super::{BuildOptions, EngineAdapter};
use crate::core::command::{PlannedStep, Step};
use crate::core::engine::EngineType;
use crate::core::error::OperationError;
use crate::core::params::ConnectionParams;

/// Recognised for discovery and paths; dump and restore are not implemented
pub struct MongodbAdapter;

impl EngineAdapter for MongodbAdapter {
    fn engine(&self) -> EngineType {
        EngineType::Mongodb
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &[]
    }

    fn build_dump(
        &self,
        _params: &ConnectionParams,
        _target: &Path,
        _options: BuildOptions,
    ) -> Result<Step, OperationError> {
        Err(OperationError::Unsupported("MongoDB dump is not supported".to_string()))
    }

    fn build_restore(
        &self,
        _params: &ConnectionParams,
        _source: &Path,
        _options: BuildOptions,
    ) -> Result<Vec<PlannedStep>, OperationError> {
        Err(OperationError::Unsupported("MongoDB restore is not supported".to_string()))
    }
}
