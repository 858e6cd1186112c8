use selene::config::Config;
use std::fs;

#[test]
fn save_and_load_yaml_roundtrip() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let path = tmp_dir.path().join("config.yaml");

    let mut cfg = Config::default();
    cfg.mqtt.broker_address = "10.0.0.5".to_string();
    cfg.mqtt.topic = "openWB/lp/2/#".to_string();
    cfg.timeout_seconds = 30;

    cfg.save_to_file(&path).unwrap();
    let loaded = Config::from_file(&path).unwrap();

    assert_eq!(loaded.mqtt.broker_address, "10.0.0.5");
    assert_eq!(loaded.mqtt.topic, "openWB/lp/2/#");
    assert_eq!(loaded.timeout_seconds, 30);
}

#[test]
fn config_validation_errors() {
    let mut cfg = Config::default();

    // Empty broker address
    cfg.mqtt.broker_address.clear();
    assert!(cfg.validate().is_err());

    // Invalid port
    cfg = Config::default();
    cfg.mqtt.broker_port = 0;
    assert!(cfg.validate().is_err());

    // Empty topic
    cfg = Config::default();
    cfg.mqtt.topic.clear();
    assert!(cfg.validate().is_err());

    // Non-positive max current
    cfg = Config::default();
    cfg.wallbox.max_current = 0.0;
    assert!(cfg.validate().is_err());

    // Position out of range
    cfg = Config::default();
    cfg.wallbox.position = 2;
    assert!(cfg.validate().is_err());
}

#[test]
fn from_file_with_invalid_yaml_fails() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    fs::write(tmp.path(), "mqtt: [not, a, mapping").unwrap();
    assert!(Config::from_file(tmp.path()).is_err());
}

#[test]
fn timeout_zero_is_a_valid_configuration() {
    let mut cfg = Config::default();
    cfg.timeout_seconds = 0;
    assert!(cfg.validate().is_ok());
}
