//! Global subscriber installation with a log file.

use teststation::infrastructure::logging::{
    LogConfig, LogFormat, LoggerImpl, RotationPolicy, LOG_FILE_NAME,
};

#[test]
fn test_file_logging_writes_json_lines() {
    let dir = tempfile::tempdir().unwrap();
    let config = LogConfig {
        level: "debug".to_string(),
        format: LogFormat::Json,
        log_dir: Some(dir.path().to_path_buf()),
        enable_stdout: false,
        rotation: RotationPolicy::Never,
    };

    let logger = LoggerImpl::init(&config).unwrap();
    assert!(logger.has_file_output());
    tracing::info!(test = "VOUTDC", passed = true, "step recorded");

    // A second subscriber cannot be installed in the same process.
    assert!(LoggerImpl::init(&LogConfig::default()).is_err());

    drop(logger);
    let text = std::fs::read_to_string(dir.path().join(LOG_FILE_NAME)).unwrap();
    let line = text
        .lines()
        .find(|line| line.contains("step recorded"))
        .expect("log line written");
    let event: serde_json::Value = serde_json::from_str(line).unwrap();
    assert_eq!(event["fields"]["test"], "VOUTDC");
    assert_eq!(event["level"], "INFO");
}
