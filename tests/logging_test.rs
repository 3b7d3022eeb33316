// Logging setup writes into the configured directory
//
// Kept in its own test binary since the global subscriber can only be
// installed once per process.

#[cfg(test)]
mod tests {
    use mailpolicy::logging::{init_logging, logs_dir_exists};
    use mailpolicy::{LogFormat, LoggingConfig};
    use tempfile::TempDir;

    #[test]
    fn test_init_logging_creates_dir() {
        let temp = TempDir::new().unwrap();
        let config = LoggingConfig {
            dir: temp.path().join("logs"),
            format: LogFormat::Json,
            ..LoggingConfig::default()
        };

        assert!(!logs_dir_exists(&config));
        init_logging(&config).unwrap();
        assert!(logs_dir_exists(&config));

        // A second subscriber is rejected rather than silently replacing the first
        assert!(init_logging(&config).is_err());
    }
}
