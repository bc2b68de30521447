//! Hand-rolled flag parsing shared by the binaries: `--name value` or `--name=value`.

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};

use crate::config::SyncConfig;

pub fn args() -> Vec<String> {
    std::env::args().skip(1).collect()
}

pub fn arg_value(args: &[String], name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&prefix) {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == name {
            let Some(next) = args.get(idx + 1) else {
                continue;
            };
            if !next.trim().is_empty() && !next.starts_with("--") {
                return Some(next.trim().to_string());
            }
        }
    }
    None
}

pub fn has_flag(args: &[String], name: &str) -> bool {
    args.iter().any(|a| a == name)
}

pub fn required_u64(args: &[String], name: &str) -> Result<u64> {
    let raw = arg_value(args, name).ok_or_else(|| anyhow!("missing {name} <id>"))?;
    raw.parse::<u64>()
        .with_context(|| format!("{name} expects a number, got {raw:?}"))
}

/// `--db` wins over `SYNC_DB_PATH`, which wins over the per-user default.
pub fn db_path(args: &[String], config: &SyncConfig) -> Result<PathBuf> {
    arg_value(args, "--db")
        .map(PathBuf::from)
        .or_else(|| config.db_path.clone())
        .or_else(crate::db::default_db_path)
        .context("unable to resolve sqlite path")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn both_flag_forms_are_accepted() {
        let args = argv(&["--season", "7", "--db=/tmp/x.sqlite", "--reset"]);
        assert_eq!(arg_value(&args, "--season").as_deref(), Some("7"));
        assert_eq!(arg_value(&args, "--db").as_deref(), Some("/tmp/x.sqlite"));
        assert!(has_flag(&args, "--reset"));
        assert!(!has_flag(&args, "--no-enrich"));
    }

    #[test]
    fn flags_do_not_swallow_the_next_flag() {
        let args = argv(&["--season", "--reset"]);
        assert_eq!(arg_value(&args, "--season"), None);
        assert!(required_u64(&args, "--season").is_err());
        assert!(required_u64(&argv(&["--season", "x"]), "--season").is_err());
    }
}
