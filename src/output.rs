//! Global output configuration.
//!
//! Definitions go to stdout so they can be piped. Spinners, hints and
//! status lines go to stderr and are silenced by `--quiet`. Colors are off
//! with `--no-color` or when `NO_COLOR` is set.

use std::sync::OnceLock;

static OUTPUT_CONFIG: OnceLock<OutputConfig> = OnceLock::new();

#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub quiet: bool,
    pub no_color: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            quiet: false,
            no_color: std::env::var_os("NO_COLOR").is_some(),
        }
    }
}

impl OutputConfig {
    /// Builds the configuration from CLI flags; `NO_COLOR` still applies.
    pub fn from_flags(quiet: bool, no_color: bool) -> Self {
        let defaults = Self::default();
        Self {
            quiet,
            no_color: no_color || defaults.no_color,
        }
    }
}

/// Sets the global configuration. Later calls are ignored.
pub fn init(config: OutputConfig) {
    let _ = OUTPUT_CONFIG.set(config);
}

pub fn config() -> &'static OutputConfig {
    OUTPUT_CONFIG.get_or_init(OutputConfig::default)
}

pub fn is_quiet() -> bool {
    config().quiet
}

pub fn is_no_color() -> bool {
    config().no_color
}

/// Prints a status line to stderr unless quiet mode is on.
#[macro_export]
macro_rules! status {
    ($($arg:tt)*) => {
        if !$crate::output::is_quiet() {
            eprintln!($($arg)*);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_are_respected() {
        let config = OutputConfig::from_flags(true, true);
        assert!(config.quiet);
        assert!(config.no_color);
    }

    #[test]
    fn test_quiet_defaults_off() {
        assert!(!OutputConfig::default().quiet);
        assert!(!OutputConfig::from_flags(false, false).quiet);
    }
}
