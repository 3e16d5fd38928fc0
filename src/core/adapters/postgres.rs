use std::path::Path;

use super::{network_flags, BuildOptions, EngineAdapter};
use crate::core::command::{CommandSpec, PlannedStep, Step};
use crate::core::engine::EngineType;
use crate::core::error::OperationError;
use crate::core::params::{ConnectionParams, DATABASE, PASSWORD, USERNAME};

/// pg_dump / psql
pub struct PostgresAdapter;

impl PostgresAdapter {
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
            .args(network_flags(params, engine, "-h", "-p", options)?)
            .args(["-U".to_string(), user])
            .secret_env("PGPASSWORD", password))
    }
}

impl EngineAdapter for PostgresAdapter {
    fn engine(&self) -> EngineType {
        EngineType::Postgres
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
            .base("pg_dump", params, options)?
            .args(["-d".to_string(), database])
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

        let drop = self
            .base("dropdb", params, options)?
            .args(["--if-exists", "--force"])
            .arg(database.clone());
        let create = self.base("createdb", params, options)?.arg(database.clone());
        let load = self
            .base("psql", params, options)?
            .args(["-v", "ON_ERROR_STOP=1", "-d"])
            .arg(database)
            .stdin_from(source);

        Ok(vec![
            // absent database is fine
            PlannedStep::tolerate("drop database", Step::Command(drop)),
            PlannedStep::abort("create database", Step::Command(create)),
            PlannedStep::abort("load dump", Step::Command(load)),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::command::FailurePolicy;
    use serde_json::json;

    fn params() -> ConnectionParams {
        serde_json::from_value(json!({
            "host": "db.internal",
            "port": 5433,
            "username": "app",
            "password": "hunter2",
            "database": "shop"
        }))
        .unwrap()
    }

    #[test]
    fn test_dump_command() {
        let step = PostgresAdapter
            .build_dump(&params(), Path::new("/dumps/shop.sql"), BuildOptions::default())
            .unwrap();
        let Step::Command(spec) = step else { panic!("expected a command") };

        assert_eq!(spec.program, "pg_dump");
        assert_eq!(spec.args, vec!["-h", "db.internal", "-p", "5433", "-U", "app", "-d", "shop"]);
        assert_eq!(spec.env, vec![("PGPASSWORD".to_string(), "hunter2".to_string())]);
        assert_eq!(spec.stdout_to.as_deref(), Some(Path::new("/dumps/shop.sql")));
        assert!(!spec.display().contains("hunter2"));
    }

    #[test]
    fn test_restore_sequence_and_policies() {
        let steps = PostgresAdapter
            .build_restore(&params(), Path::new("/dumps/shop.sql"), BuildOptions::default())
            .unwrap();

        let programs: Vec<_> = steps
            .iter()
            .map(|s| match &s.step {
                Step::Command(spec) => spec.program.as_str(),
                _ => "copy",
            })
            .collect();
        assert_eq!(programs, vec!["dropdb", "createdb", "psql"]);
        assert_eq!(steps[0].on_failure, FailurePolicy::Continue);
        assert_eq!(steps[1].on_failure, FailurePolicy::Abort);
        assert_eq!(steps[2].on_failure, FailurePolicy::Abort);

        let Step::Command(load) = &steps[2].step else { panic!("expected a command") };
        assert!(load.args.contains(&"ON_ERROR_STOP=1".to_string()));
        assert_eq!(load.stdin_from.as_deref(), Some(Path::new("/dumps/shop.sql")));
    }

    #[test]
    fn test_inside_container_uses_local_socket() {
        let options = BuildOptions { inside_container: true };
        let Step::Command(spec) = PostgresAdapter
            .build_dump(&params(), Path::new("/dumps/shop.sql"), options)
            .unwrap()
        else {
            panic!("expected a command")
        };
        assert!(!spec.args.contains(&"-h".to_string()));
        assert!(!spec.args.contains(&"-p".to_string()));
    }

    #[test]
    fn test_missing_password_is_a_validation_error() {
        let mut p = params();
        p.set("password", "");
        let err = PostgresAdapter
            .build_dump(&p, Path::new("/dumps/shop.sql"), BuildOptions::default())
            .unwrap_err();
        assert!(matches!(err, OperationError::Validation(_)));
    }
}
