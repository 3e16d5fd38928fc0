/// Artifact path resolution
///
/// Dump and restore both call `resolve_path` with the same inputs, which is how
/// a restore finds the file an earlier dump wrote.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::core::engine::EngineType;
use crate::core::error::OperationError;

fn disallowed_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9_-]").expect("static regex"))
}

fn underscore_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"_+").expect("static regex"))
}

/// Make a filesystem-safe file stem
pub fn sanitize_stem(raw: &str) -> Result<String, OperationError> {
    let replaced = disallowed_chars().replace_all(raw, "_");
    let collapsed = underscore_runs().replace_all(&replaced, "_");
    let stem = collapsed.trim_matches('_');

    if stem.is_empty() {
        return Err(OperationError::Validation(format!(
            "File name '{}' has no usable characters (allowed: letters, digits, '_' and '-')",
            raw
        )));
    }
    Ok(stem.to_string())
}

/// Path of the artifact for a configuration under `base_dir`
pub fn resolve_path(
    base_dir: &Path,
    config_name: &str,
    engine: EngineType,
    custom_filename: Option<&str>,
) -> Result<PathBuf, OperationError> {
    let raw = custom_filename
        .filter(|name| !name.trim().is_empty())
        .unwrap_or(config_name);
    let stem = sanitize_stem(raw)?;
    Ok(base_dir.join(format!("{}{}", stem, engine.extension())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_replaces_and_collapses() {
        assert_eq!(sanitize_stem("nightly backup #3").unwrap(), "nightly_backup_3");
        assert_eq!(sanitize_stem("__a..b__").unwrap(), "a_b");
        assert_eq!(sanitize_stem("prod-db_01").unwrap(), "prod-db_01");
        assert_eq!(sanitize_stem("../../etc/passwd").unwrap(), "etc_passwd");
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        for raw in ["nightly backup #3", "acct", "a  b  c", "ünïcode name"] {
            let once = sanitize_stem(raw).unwrap();
            assert_eq!(sanitize_stem(&once).unwrap(), once);
        }
    }

    #[test]
    fn test_sanitize_rejects_empty_result() {
        assert!(matches!(sanitize_stem("#!@ "), Err(OperationError::Validation(_))));
        assert!(matches!(sanitize_stem("___"), Err(OperationError::Validation(_))));
        assert!(sanitize_stem("").is_err());
    }

    #[test]
    fn test_resolve_path_is_deterministic() {
        let base = Path::new("/dumps");
        let first = resolve_path(base, "acct", EngineType::Postgres, None).unwrap();
        let second = resolve_path(base, "acct", EngineType::Postgres, None).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, PathBuf::from("/dumps/acct.sql"));
    }

    #[test]
    fn test_custom_filename_changes_only_the_stem() {
        let base = Path::new("/dumps");
        let default = resolve_path(base, "acct", EngineType::Redis, None).unwrap();
        let custom = resolve_path(base, "acct", EngineType::Redis, Some("nightly backup #3")).unwrap();

        assert_eq!(default.parent(), custom.parent());
        assert_eq!(default.extension(), custom.extension());
        assert_eq!(custom, PathBuf::from("/dumps/nightly_backup_3.rdb"));
    }

    #[test]
    fn test_blank_custom_filename_falls_back_to_config_name() {
        let base = Path::new("/dumps");
        let path = resolve_path(base, "acct", EngineType::Sqlite, Some("  ")).unwrap();
        assert_eq!(path, PathBuf::from("/dumps/acct.db"));
    }
}
