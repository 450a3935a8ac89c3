//! Integration tests for configuration loading

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use tempfile::NamedTempFile;
use vehicle_snapshot::config::Config;
use vehicle_snapshot::error::ConfigError;
use vehicle_snapshot::fleet::FleetCategory;

#[test]
fn test_load_config_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[feed]
url = "https://feeds.example/realtime/VehiclePositions.pb"
api_key_param = "token"
api_key_env = "VEHICLE_SNAPSHOT_TEST_UNSET_KEY"
api_key = "from-file"
timeout_secs = 5
poll_interval_secs = 15
supported_versions = ["2.0"]

[reference]
routes_path = "/srv/gtfs/routes.txt"
stops_path = "/srv/gtfs/stops.txt"

[geofence]
min_lat = 28.4
max_lat = 28.9
min_lon = 76.8
max_lon = 77.4

[fleet]
default_category = "DTC"
rules = [
    { category = "ELECTRIC", kind = "prefix", pattern = "DL51" },
    { category = "DIMTS", kind = "contains", pattern = "DL1PC" },
]
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.feed.api_key_param, "token");
    assert_eq!(config.api_key().unwrap(), "from-file");
    assert_eq!(config.fetch_timeout(), Duration::from_secs(5));
    assert_eq!(config.poll_interval(), Duration::from_secs(15));
    assert_eq!(config.reference.routes_path.to_str(), Some("/srv/gtfs/routes.txt"));
    assert!(config.geofence.contains(28.61, 77.21));
    assert!(!config.geofence.contains(19.07, 72.87));
    assert_eq!(config.fleet.classify("DL51EV0001"), FleetCategory::Electric);
    assert_eq!(config.fleet.classify("DL1PC0001"), FleetCategory::Dimts);
    assert_eq!(config.fleet.classify("HR55AB0001"), FleetCategory::Dtc);
}

#[test]
fn test_load_explicit_path_overrides_defaults() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file
        .write_all(b"[feed]\npoll_interval_secs = 60\n")
        .unwrap();
    temp_file.flush().unwrap();

    let config = Config::load(Some(temp_file.path())).unwrap();

    assert_eq!(config.poll_interval(), Duration::from_secs(60));
    assert_eq!(config.feed.timeout_secs, 10);
}

#[test]
fn test_missing_file_is_read_error() {
    let err = Config::from_file(Path::new("/nonexistent/config.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
}

#[test]
fn test_invalid_toml_is_parse_error() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[feed\nurl = ").unwrap();
    temp_file.flush().unwrap();

    let err = Config::from_file(temp_file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
}

#[test]
fn test_invalid_values_are_rejected_on_load() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file
        .write_all(b"[geofence]\nmin_lat = 40.0\nmax_lat = 10.0\n")
        .unwrap();
    temp_file.flush().unwrap();

    let err = Config::from_file(temp_file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}
