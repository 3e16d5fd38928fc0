use std::path::Path;

use super::{network_flags, BuildOptions, EngineAdapter};
use crate::core::command::{CommandSpec, PlannedStep, Step};
use crate::core::engine::EngineType;
use crate::core::error::OperationError;
use crate::core::params::{ConnectionParams, DATABASE, PASSWORD, USERNAME};

/// mysqldump / mysql (MariaDB clients accept the same flags)
pub struct MysqlAdapter;

impl MysqlAdapter {
    fn base(
        &self,
        program: &str,
        params: &ConnectionParams,
        options: BuildOptions,
    ) -> Result<CommandSpec, OperationError> {
        let engine = self.engine();
        let user = params.require(USERNAME, engine)?;
        let password = params.require(PASSWORD, engine)?;

        Ok(CommandSpec::new(program)
            .args(network_flags(params, engine, "-h", "-P", options)?)
            .args(["-u".to_string(), user])
            .arg(format!("--password={}", password))
            .secret(password))
    }
}

impl EngineAdapter for MysqlAdapter {
    fn engine(&self) -> EngineType {
        EngineType::Mysql
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &[DATABASE, USERNAME, PASSWORD]
    }

    fn build_dump(
        &self,
        params: &ConnectionParams,
        target: &Path,
        options: BuildOptions,
    ) -> Result<Step, OperationError> {
        let database = params.require(DATABASE, self.engine())?;
        let spec = self
            .base("mysqldump", params, options)?
            .args(["--single-transaction", "--routines", "--triggers"])
            .arg(database)
            .stdout_to(target);
        Ok(Step::Command(spec))
    }

    fn build_restore(
        &self,
        params: &ConnectionParams,
        source: &Path,
        options: BuildOptions,
    ) -> Result<Vec<PlannedStep>, OperationError> {
        let database = params.require(DATABASE, self.engine())?;
        let load = self
            .base("mysql", params, options)?
            .arg(database)
            .stdin_from(source);
        Ok(vec![PlannedStep::abort("load dump", Step::Command(load))])
    }
}
