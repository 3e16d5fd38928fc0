/// Helper utilities for dumpdock

use std::path::Path;

use crate::utils::{APP_NAME, LOOPBACK_HOSTS, REDACTED, REDACT_SUBSTRING_MIN_LEN};

/// Format duration to human-readable string
pub fn format_duration(seconds: u64) -> String {
    let days = seconds / 86400;
    let hours = (seconds % 86400) / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if days > 0 {
        format!("{}d {}h", days, hours)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Truncate string with ellipsis
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Mask sensitive data (show only first and last N characters)
pub fn mask_sensitive(value: &str, visible_chars: usize) -> String {
    if value.len() <= visible_chars * 2 || !value.is_ascii() {
        "*".repeat(value.chars().count())
    } else {
        let start = &value[..visible_chars];
        let end = &value[value.len() - visible_chars..];
        format!("{}...{}", start, end)
    }
}

/// Replace each secret in `text` with a fixed placeholder. Short secrets are
/// replaced only where they stand alone, not inside longer words.
pub fn redact(text: &str, secrets: &[String]) -> String {
    let mut out = text.to_string();
    for secret in secrets.iter().filter(|s| !s.is_empty()) {
        out = if secret.chars().count() >= REDACT_SUBSTRING_MIN_LEN {
            out.replace(secret.as_str(), REDACTED)
        } else {
            replace_standalone(&out, secret)
        };
    }
    out
}

fn replace_standalone(text: &str, secret: &str) -> String {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for (start, matched) in text.match_indices(secret) {
        if start < last {
            continue;
        }
        let end = start + matched.len();
        let before = text[..start].chars().next_back().map_or(false, is_word);
        let after = text[end..].chars().next().map_or(false, is_word);
        if before || after {
            continue;
        }
        out.push_str(&text[last..start]);
        out.push_str(REDACTED);
        last = end;
    }
    out.push_str(&text[last..]);
    out
}

/// Whether a hostname refers to the local machine
pub fn is_loopback_host(host: &str) -> bool {
    LOOPBACK_HOSTS.iter().any(|h| h.eq_ignore_ascii_case(host.trim()))
}

/// Whether a new file can be created in `path` (probes with a throwaway file)
pub fn is_dir_writable<P: AsRef<Path>>(path: P) -> bool {
    let probe = path
        .as_ref()
        .join(format!(".{}-probe-{}", APP_NAME, std::process::id()));
    match std::fs::OpenOptions::new().write(true).create_new(true).open(&probe) {
        Ok(_) => {
            let _ = std::fs::remove_file(&probe);
            true
        }
        Err(_) => false,
    }
}

/// Docker's container `State` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Created,
    Running,
    Paused,
    Restarting,
    Exited,
    Dead,
    Unknown,
}

impl From<&str> for ContainerState {
    fn from(state: &str) -> Self {
        match state.trim().to_lowercase().as_str() {
            "created" => ContainerState::Created,
            "running" => ContainerState::Running,
            "paused" => ContainerState::Paused,
            "restarting" => ContainerState::Restarting,
            "exited" => ContainerState::Exited,
            "dead" | "removing" => ContainerState::Dead,
            _ => ContainerState::Unknown,
        }
    }
}

impl ContainerState {
    pub fn is_running(&self) -> bool {
        matches!(self, ContainerState::Running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(30), "30s");
        assert_eq!(format_duration(90), "1m 30s");
        assert_eq!(format_duration(3661), "1h 1m");
        assert_eq!(format_duration(86400), "1d 0h");
    }

    #[test]
    fn test_mask_sensitive() {
        let token = "5e7f294e4c92a9aa661fae8d347d832d";
        assert_eq!(mask_sensitive(token, 4), "5e7f...832d");
        assert_eq!(mask_sensitive("short", 4), "*****");
    }

    #[test]
    fn test_redact() {
        let secrets = vec!["s3cret".to_string(), String::new()];
        assert_eq!(
            redact("mysqldump --password=s3cret db", &secrets),
            "mysqldump --password=**** db"
        );
        assert_eq!(redact("nothing here", &secrets), "nothing here");
    }

    #[test]
    fn test_redact_short_secret_only_standalone() {
        let secrets = vec!["ab".to_string()];
        assert_eq!(
            redact("FATAL: password for user about tab failed: ab", &secrets),
            "FATAL: password for user about tab failed: ****"
        );
        assert_eq!(redact("--password=ab db", &secrets), "--password=**** db");
        assert_eq!(redact("abab", &secrets), "abab");
    }

    #[test]
    fn test_is_loopback_host() {
        assert!(is_loopback_host("localhost"));
        assert!(is_loopback_host("LOCALHOST"));
        assert!(is_loopback_host("127.0.0.1"));
        assert!(!is_loopback_host("db.internal"));
    }

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("abc", 10), "abc");
        assert_eq!(truncate_string("abcdefghij", 6), "abc...");
    }

    #[test]
    fn test_container_state() {
        assert_eq!(ContainerState::from("running"), ContainerState::Running);
        assert_eq!(ContainerState::from("exited"), ContainerState::Exited);
        assert_eq!(ContainerState::from("removing"), ContainerState::Dead);
        assert_eq!(ContainerState::from("??"), ContainerState::Unknown);
        assert!(ContainerState::Running.is_running());
        assert!(!ContainerState::Paused.is_running());
    }

    #[test]
    fn test_is_dir_writable() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(is_dir_writable(dir.path()));
        assert!(!is_dir_writable(dir.path().join("missing")));
    }
}
