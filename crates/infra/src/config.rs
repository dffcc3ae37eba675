//! Ledger configuration.

/// Environment variable holding the total number of attempts per operation.
pub const MAX_ATTEMPTS_VAR: &str = "STOCKFLOW_LEDGER_MAX_ATTEMPTS";

const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Total attempts (first try included) before a storage conflict or
    /// commit failure surfaces as `TransientStorage`.
    pub max_attempts: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl LedgerConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(raw) = lookup(MAX_ATTEMPTS_VAR) {
            match raw.trim().parse::<u32>() {
                Ok(n) if n > 0 => config.max_attempts = n,
                _ => tracing::warn!(
                    value = %raw,
                    default = DEFAULT_MAX_ATTEMPTS,
                    "{MAX_ATTEMPTS_VAR} is not a positive integer; using default"
                ),
            }
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_variable_uses_default() {
        assert_eq!(LedgerConfig::from_lookup(|_| None), LedgerConfig::default());
    }

    #[test]
    fn reads_max_attempts() {
        let config = LedgerConfig::from_lookup(|name| {
            (name == MAX_ATTEMPTS_VAR).then(|| " 5 ".to_string())
        });
        assert_eq!(config.max_attempts, 5);
    }

    #[test]
    fn zero_or_garbage_falls_back_to_default() {
        for raw in ["0", "-1", "many"] {
            let config = LedgerConfig::from_lookup(|_| Some(raw.to_string()));
            assert_eq!(config.max_attempts, 3, "value {raw:?}");
        }
    }
}
