// src/config/validate.rs

use regex::Regex;

use crate::config::model::{ConfigFile, NiceSection, RawConfigFile, RetrySection, TailSection};
use crate::errors::{ProcstreamError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::ProcstreamError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_nice(&raw.nice)?;
        validate_retry(&raw.retry)?;
        let error_regex = validate_tail(&raw.tail)?;
        Ok(ConfigFile::new_unchecked(
            raw.nice,
            raw.tail,
            raw.retry,
            error_regex,
        ))
    }
}

fn validate_tail(tail: &TailSection) -> Result<Regex> {
    if tail.command.trim().is_empty() {
        return Err(ProcstreamError::ConfigError(
            "[tail].command must not be empty".to_string(),
        ));
    }

    let regex = Regex::new(&tail.error_pattern).map_err(|err| {
        ProcstreamError::ConfigError(format!(
            "[tail].error_pattern {:?} is not a valid regex: {err}",
            tail.error_pattern
        ))
    })?;

    if regex.captures_len() < 2 {
        return Err(ProcstreamError::ConfigError(format!(
            "[tail].error_pattern {:?} must contain a capture group for the error context",
            tail.error_pattern
        )));
    }

    Ok(regex)
}

fn validate_nice(nice: &NiceSection) -> Result<()> {
    if nice.helper.trim().is_empty() {
        return Err(ProcstreamError::ConfigError(
            "[nice].helper must not be empty".to_string(),
        ));
    }

    if let Some(io_helper) = &nice.io_helper
        && io_helper.trim().is_empty()
    {
        return Err(ProcstreamError::ConfigError(
            "[nice].io_helper must not be empty when set".to_string(),
        ));
    }

    if nice.cache_capacity == 0 {
        return Err(ProcstreamError::ConfigError(
            "[nice].cache_capacity must be >= 1 (got 0)".to_string(),
        ));
    }

    if nice.cache_ttl_secs == 0 {
        return Err(ProcstreamError::ConfigError(
            "[nice].cache_ttl_secs must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(())
}

fn validate_retry(retry: &RetrySection) -> Result<()> {
    if retry.max_attempts == Some(0) {
        return Err(ProcstreamError::ConfigError(
            "[retry].max_attempts must be >= 1 when set (got 0)".to_string(),
        ));
    }

    if retry.initial_backoff_ms == 0 {
        return Err(ProcstreamError::ConfigError(
            "[retry].initial_backoff_ms must be > 0".to_string(),
        ));
    }

    if retry.max_backoff_ms < retry.initial_backoff_ms {
        return Err(ProcstreamError::ConfigError(format!(
            "[retry].max_backoff_ms ({}) must be >= initial_backoff_ms ({})",
            retry.max_backoff_ms, retry.initial_backoff_ms
        )));
    }

    if !retry.multiplier.is_finite() || retry.multiplier < 1.0 {
        return Err(ProcstreamError::ConfigError(format!(
            "[retry].multiplier must be a finite number >= 1.0 (got {})",
            retry.multiplier
        )));
    }

    Ok(())
}

impl ConfigFile {
    /// Configuration for tailing `command` with every other setting at its
    /// default. Used when no config file exists.
    pub fn for_command(command: impl Into<String>, args: Vec<String>) -> Result<Self> {
        ConfigFile::try_from(RawConfigFile {
            nice: NiceSection::default(),
            tail: TailSection::for_command(command, args),
            retry: RetrySection::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::loader::parse_and_validate;

    fn config_err(toml: &str) -> String {
        match parse_and_validate(toml) {
            Err(ProcstreamError::ConfigError(msg)) => msg,
            other => panic!("expected ConfigError, got {other:?}"),
        }
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let cfg = parse_and_validate("[tail]\ncommand = \"adb\"\n").unwrap();

        assert!(cfg.nice.enabled);
        assert_eq!(cfg.nice.helper, "nice");
        assert_eq!(cfg.nice.cache_capacity, 10);
        assert_eq!(cfg.tail.skip, 0);
        assert!(cfg.retry.enabled);
        assert_eq!(cfg.retry_policy().max_attempts, None);
    }

    #[test]
    fn rejects_empty_command() {
        let msg = config_err("[tail]\ncommand = \"  \"\n");
        assert!(msg.contains("[tail].command"));
    }

    #[test]
    fn rejects_pattern_without_group() {
        let msg = config_err("[tail]\ncommand = \"x\"\nerror_pattern = \"^ERROR\"\n");
        assert!(msg.contains("capture group"));
    }

    #[test]
    fn rejects_invalid_regex() {
        let msg = config_err("[tail]\ncommand = \"x\"\nerror_pattern = \"(unclosed\"\n");
        assert!(msg.contains("not a valid regex"));
    }

    #[test]
    fn rejects_zero_capacity() {
        let msg = config_err("[nice]\ncache_capacity = 0\n[tail]\ncommand = \"x\"\n");
        assert!(msg.contains("cache_capacity"));
    }

    #[test]
    fn rejects_inverted_backoff() {
        let msg = config_err(
            "[tail]\ncommand = \"x\"\n[retry]\ninitial_backoff_ms = 1000\nmax_backoff_ms = 10\n",
        );
        assert!(msg.contains("max_backoff_ms"));
    }

    #[test]
    fn rejects_shrinking_multiplier() {
        let msg = config_err("[tail]\ncommand = \"x\"\n[retry]\nmultiplier = 0.5\n");
        assert!(msg.contains("multiplier"));
    }

    #[test]
    fn disabled_retry_means_single_attempt() {
        let cfg = parse_and_validate("[tail]\ncommand = \"x\"\n[retry]\nenabled = false\n").unwrap();
        assert_eq!(cfg.retry_policy().max_attempts, Some(1));
    }

    #[test]
    fn for_command_is_valid() {
        let cfg = ConfigFile::for_command("adb", vec!["logcat".into()]).unwrap();
        assert_eq!(cfg.tail.args, vec!["logcat".to_string()]);
        assert_eq!(cfg.error_extractor().extract("ERROR: x"), Some("x".to_string()));
    }
}
