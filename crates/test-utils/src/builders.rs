#![allow(dead_code)]

use procstream::config::{ConfigFile, NiceSection, RawConfigFile, RetrySection, TailSection};
use procstream::types::ExitPolicy;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new(command: &str) -> Self {
        Self {
            config: RawConfigFile {
                nice: NiceSection::default(),
                tail: TailSection::for_command(command, Vec::new()),
                retry: RetrySection::default(),
            },
        }
    }

    pub fn with_args(mut self, args: &[&str]) -> Self {
        self.config.tail.args = args.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_skip(mut self, skip: usize) -> Self {
        self.config.tail.skip = skip;
        self
    }

    pub fn with_error_pattern(mut self, pattern: &str) -> Self {
        self.config.tail.error_pattern = pattern.to_string();
        self
    }

    pub fn with_exit_policy(mut self, policy: ExitPolicy) -> Self {
        self.config.tail.exit_policy = policy;
        self
    }

    pub fn without_nice(mut self) -> Self {
        self.config.nice.enabled = false;
        self
    }

    pub fn with_helper(mut self, helper: &str) -> Self {
        self.config.nice.helper = helper.to_string();
        self
    }

    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.config.retry.max_attempts = Some(max);
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}
