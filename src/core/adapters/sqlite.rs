use std::path::{Path, PathBuf};

use super::{BuildOptions, EngineAdapter};
use crate::core::command::{PlannedStep, Step};
use crate::core::engine::EngineType;
use crate::core::error::OperationError;
use crate::core::params::{ConnectionParams, DATABASE};

/// File copy of the database file named by `database`
pub struct SqliteAdapter;

impl EngineAdapter for SqliteAdapter {
    fn engine(&self) -> EngineType {
        EngineType::Sqlite
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &[DATABASE]
    }

    fn build_dump(
        &self,
        params: &ConnectionParams,
        target: &Path,
        _options: BuildOptions,
    ) -> Result<Step, OperationError> {
        let source = PathBuf::from(params.require(DATABASE, self.engine())?);
        if !source.is_file() {
            return Err(OperationError::Precondition(format!(
                "SQLite database file not found: {}",
                source.display()
            )));
        }
        Ok(Step::CopyFile {
            from: source,
            to: target.to_path_buf(),
        })
    }

    fn build_restore(
        &self,
        params: &ConnectionParams,
        source: &Path,
        _options: BuildOptions,
    ) -> Result<Vec<PlannedStep>, OperationError> {
        let database = PathBuf::from(params.require(DATABASE, self.engine())?);
        Ok(vec![PlannedStep::abort(
            "replace database file",
            Step::CopyFile {
                from: source.to_path_buf(),
                to: database,
            },
        )])
    }
}
