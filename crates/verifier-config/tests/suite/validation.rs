use verifier_config::{ConfigError, VerifierConfig};

#[test]
fn unknown_keys_are_rejected() {
    let err = VerifierConfig::load_from_str("[tasks]\nconcurency = 2\n").unwrap_err();
    match err {
        ConfigError::Toml(message) => assert!(message.contains("unknown field"), "{message}"),
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn parse_errors_do_not_echo_the_source() {
    let err = VerifierConfig::load_from_str("[repository]\nsource = 42\nquota = \"hunter2\"\n").unwrap_err();
    let ConfigError::Toml(message) = err else {
        panic!("expected a toml error");
    };
    assert!(!message.contains("quota = "), "{message}");
}

#[test]
fn zero_sizes_are_invalid() {
    for (text, key) in [
        ("[tasks]\nconcurrency = 0\n", "tasks.concurrency"),
        ("[tasks]\nhistory_limit = 0\n", "tasks.history_limit"),
        ("[cache]\njdk_cache_size = 0\n", "cache.jdk_cache_size"),
        ("[tasks.concurrency_overrides]\nslow = 0\n", "tasks.concurrency_overrides.slow"),
        ("[repository]\nquota = 0\n", "repository.quota"),
    ] {
        match VerifierConfig::load_from_str(text) {
            Err(ConfigError::Invalid { key: got, .. }) => assert_eq!(got, key),
            other => panic!("expected {key} to be invalid, got {other:?}"),
        }
    }
}

#[test]
fn malformed_byte_size_is_reported() {
    let err = VerifierConfig::load_from_str("[repository]\nquota = \"lots\"\n").unwrap_err();
    assert!(matches!(err, ConfigError::Toml(_)), "{err:?}");
}
