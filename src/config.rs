//! Run configuration

use std::time::Duration;

/// Configuration for one suite run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Per-test limit on the body's running time; `None` waits forever
    pub timeout: Option<Duration>,
    /// Only tests whose qualified name contains this keyword are run
    pub filter: Option<String>,
    /// Whether ambient timers and randomness fail while a test runs
    pub guard_ambient: bool,
    /// Whether console output lists every test
    pub verbose: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            filter: None,
            guard_ambient: true,
            verbose: false,
        }
    }
}

impl RunConfig {
    /// Create a new config with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail any test whose body runs longer than `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Only run tests whose name contains `keyword`
    pub fn with_filter(mut self, keyword: impl Into<String>) -> Self {
        self.filter = Some(keyword.into());
        self
    }

    /// Enable or disable the ambient determinism guard
    pub fn with_ambient_guard(mut self, enabled: bool) -> Self {
        self.guard_ambient = enabled;
        self
    }

    /// Set verbose output
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Whether a test with this qualified name is selected by the filter
    pub fn selects(&self, name: &str) -> bool {
        match &self.filter {
            Some(keyword) => name.contains(keyword.as_str()),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================
    // Default config tests
    // ========================================

    #[test]
    fn test_default_config_has_no_timeout() {
        let config = RunConfig::default();
        assert_eq!(config.timeout, None);
    }

    #[test]
    fn test_default_config_has_no_filter() {
        let config = RunConfig::default();
        assert_eq!(config.filter, None);
    }

    #[test]
    fn test_default_config_guards_ambient() {
        let config = RunConfig::default();
        assert!(config.guard_ambient);
    }

    #[test]
    fn test_default_config_is_quiet() {
        let config = RunConfig::default();
        assert!(!config.verbose);
    }

    #[test]
    fn test_new_equals_default() {
        assert_eq!(RunConfig::new(), RunConfig::default());
    }

    // ========================================
    // Builder tests
    // ========================================

    #[test]
    fn test_with_timeout() {
        let config = RunConfig::new().with_timeout(Duration::from_millis(250));
        assert_eq!(config.timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_with_filter() {
        let config = RunConfig::new().with_filter("Fixture");
        assert_eq!(config.filter.as_deref(), Some("Fixture"));
    }

    #[test]
    fn test_with_ambient_guard_disabled() {
        let config = RunConfig::new().with_ambient_guard(false);
        assert!(!config.guard_ambient);
    }

    #[test]
    fn test_with_verbose() {
        let config = RunConfig::new().with_verbose(true);
        assert!(config.verbose);
    }

    #[test]
    fn test_builder_chaining() {
        let config = RunConfig::new()
            .with_timeout(Duration::from_secs(1))
            .with_filter("B: ")
            .with_verbose(true)
            .with_ambient_guard(false);
        assert_eq!(config.timeout, Some(Duration::from_secs(1)));
        assert_eq!(config.filter.as_deref(), Some("B: "));
        assert!(config.verbose);
        assert!(!config.guard_ambient);
    }

    // ========================================
    // Filter tests
    // ========================================

    #[test]
    fn test_no_filter_selects_everything() {
        let config = RunConfig::new();
        assert!(config.selects("anything"));
        assert!(config.selects(""));
    }

    #[test]
    fn test_filter_matches_substring() {
        let config = RunConfig::new().with_filter("B:");
        assert!(config.selects("B: t"));
        assert!(!config.selects("A: t"));
    }

    #[test]
    fn test_filter_is_case_sensitive() {
        let config = RunConfig::new().with_filter("fixture");
        assert!(!config.selects("Fixture: t"));
    }
}
