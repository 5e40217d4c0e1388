use std::str::FromStr;
use serde::Deserialize;

/// Which process exits a derived stream treats as failures.
///
/// - `Any`: every exit is a failure (default). Used for tails of processes
///   that are expected to run forever, like a log follower.
/// - `NonZero`: exit code 0 without a signal completes the stream cleanly;
///   anything else is a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExitPolicy {
    Any,
    NonZero,
}

impl Default for ExitPolicy {
    fn default() -> Self {
        ExitPolicy::Any
    }
}

impl ExitPolicy {
    /// Does this exit end the stream without an error?
    pub fn is_clean_exit(self, code: i32, signal: Option<&str>) -> bool {
        match self {
            ExitPolicy::Any => false,
            ExitPolicy::NonZero => code == 0 && signal.is_none(),
        }
    }
}

impl FromStr for ExitPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "any" => Ok(ExitPolicy::Any),
            "nonzero" | "non-zero" => Ok(ExitPolicy::NonZero),
            other => Err(format!(
                "invalid exit_policy: {other} (expected \"any\" or \"nonzero\")"
            )),
        }
    }
}
