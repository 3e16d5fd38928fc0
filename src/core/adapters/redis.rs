use std::path::Path;

use super::{network_flags, BuildOptions, EngineAdapter};
use crate::core::command::{CommandSpec, PlannedStep, Step};
use crate::core::engine::EngineType;
use crate::core::error::OperationError;
use crate::core::params::ConnectionParams;

/// redis-cli; the password travels in REDISCLI_AUTH
pub struct RedisAdapter;

impl RedisAdapter {
    fn base(&self, params: &ConnectionParams, options: BuildOptions) -> Result<CommandSpec, OperationError> {
        let mut spec = CommandSpec::new("redis-cli")
            .args(network_flags(params, self.engine(), "-h", "-p", options)?);
        if let Some(user) = params.username() {
            spec = spec.args(["--user".to_string(), user]);
        }
        if let Some(password) = params.password() {
            spec = spec.secret_env("REDISCLI_AUTH", password);
        }
        Ok(spec)
    }
}

impl EngineAdapter for RedisAdapter {
    fn engine(&self) -> EngineType {
        EngineType::Redis
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &[]
    }

    fn build_dump(
        &self,
        params: &ConnectionParams,
        target: &Path,
        options: BuildOptions,
    ) -> Result<Step, OperationError> {
        let spec = self.base(params, options)?.args(["--rdb", "-"]).stdout_to(target);
        Ok(Step::Command(spec))
    }

    fn build_restore(
        &self,
        params: &ConnectionParams,
        source: &Path,
        options: BuildOptions,
    ) -> Result<Vec<PlannedStep>, OperationError> {
        let spec = self.base(params, options)?.arg("--pipe").stdin_from(source);
        Ok(vec![PlannedStep::abort("load dump", Step::Command(spec))])
    }
}
