//! Environment overrides on top of the configuration files.

use std::io::Write;

use teststation::infrastructure::config::{ConfigError, ConfigLoader};

#[test]
fn test_env_overrides_defaults() {
    temp_env::with_vars(
        [
            ("TESTSTATION_SEQUENCE__DASH", Some("5555-10")),
            ("TESTSTATION_SEQUENCE__STOP_ON_FIRST_FAILURE", Some("true")),
            ("TESTSTATION_INSTRUMENTS__LOAD_CHANNELS", Some("4")),
        ],
        || {
            let config = ConfigLoader::load().unwrap();
            assert_eq!(config.sequence.dash, "5555-10");
            assert!(config.sequence.stop_on_first_failure);
            assert_eq!(config.instruments.load_channels, 4);
            assert_eq!(config.sequence.test_type, "FINAL");
        },
    );
}

#[test]
fn test_env_wins_over_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "sequence:\n  dash: from-file\n  test_type: BURNIN").unwrap();

    temp_env::with_var("TESTSTATION_SEQUENCE__DASH", Some("from-env"), || {
        let config = ConfigLoader::load_from_file(file.path()).unwrap();
        assert_eq!(config.sequence.dash, "from-env");
        assert_eq!(config.sequence.test_type, "BURNIN");
    });
}

#[test]
fn test_env_value_is_validated() {
    temp_env::with_var("TESTSTATION_LOGGING__LEVEL", Some("chatty"), || {
        assert!(ConfigLoader::load().is_err());
    });

    temp_env::with_var("TESTSTATION_PROTOCOL__MAX_ACQUISITION_POLLS", Some("0"), || {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "sequence:\n  dash: P-1").unwrap();
        let err = ConfigLoader::load_from_file(file.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::ZeroBound { .. })
        ));
    });
}
