use std::path::PathBuf;

use verifier_config::{ByteSize, ConfigError, RepositorySource, VerifierConfig};
use verifier_resolver::ReadMode;

#[test]
fn full_config_round_trips_through_toml() {
    let text = r#"
[logging]
level = "verifier.cache=debug,info"
json = true

[resolver]
read_mode = "lazy"

[cache]
jdk_cache_size = 2

[repository]
directory = "/var/cache/verifier"
quota = "10GB"
source = "https://plugins.example.org/files/{name}"

[tasks]
concurrency = 8
history_limit = 64
shutdown_timeout = 5

[tasks.concurrency_overrides]
ide-download = 1

[paths]
ides_dir = "/opt/ides"
jdk_path = "/usr/lib/jvm/java-17"
"#;

    let config = VerifierConfig::load_from_str(text).expect("config should parse");
    assert!(config.logging.json);
    assert_eq!(config.resolver.read_mode, ReadMode::Lazy);
    assert_eq!(config.cache.jdk_cache_size, 2);
    assert_eq!(config.cache.ide_cache_size, 5);
    assert_eq!(config.repository.quota, ByteSize(10_000_000_000));
    assert_eq!(
        config.repository.source,
        Some(RepositorySource::Url("https://plugins.example.org/files/{name}".to_string()))
    );
    assert_eq!(config.tasks.shutdown_timeout().as_secs(), 5);
    assert_eq!(config.tasks.concurrency_overrides.get("ide-download"), Some(&1));
    assert_eq!(config.paths.ides_dir, Some(PathBuf::from("/opt/ides")));

    let rendered = toml::to_string(&config).expect("config should serialize");
    assert_eq!(VerifierConfig::load_from_str(&rendered).unwrap(), config);
}

#[test]
fn quota_accepts_plain_integers() {
    let config = VerifierConfig::load_from_str("[repository]\nquota = 4096\n").unwrap();
    assert_eq!(config.repository.quota, ByteSize(4096));
}

#[test]
fn loads_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("verifier.toml");
    std::fs::write(&path, "[paths]\nides_dir = \"ides\"\n").unwrap();

    let config = VerifierConfig::load_from_path(&path).unwrap();
    assert_eq!(config.paths.ides_dir, Some(PathBuf::from("ides")));
}

#[test]
fn missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = VerifierConfig::load_from_path(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }), "{err:?}");
}
