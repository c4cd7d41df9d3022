use std::fs;

use connector_builder_rs::config::Settings;
use connector_builder_rs::manifest::DEFAULT_MANIFEST_VERSION;

#[test]
fn settings_file_is_read() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("connector-builder.toml");
    fs::write(
        &path,
        "manifest_version = \"6.5.0\"\n\n[yaml]\nblank_line_between_sections = false\n",
    )
    .unwrap();

    let settings = Settings::from_file(&path).unwrap();
    assert_eq!(settings.manifest_version, "6.5.0");
    assert_eq!(settings.log_filter, "warn");
    assert!(!settings.yaml.blank_line_between_sections);
}

#[test]
fn malformed_settings_name_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    fs::write(&path, "manifest_version = [\n").unwrap();

    let err = Settings::from_file(&path).unwrap_err();
    assert!(format!("{err:#}").contains("broken.toml"));
}

#[test]
fn missing_explicit_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Settings::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
    assert!(err.to_string().contains("unable to read settings"));
}

#[test]
fn defaults_match_the_library() {
    let settings = Settings::default();
    assert_eq!(settings.manifest_version, DEFAULT_MANIFEST_VERSION);
    assert!(settings.yaml.blank_line_between_sections);
}
