//! Configuration loading, validation and root folder resolution

use polaris_common::config::{
    load_toml_config, resolve_root_folder, TomlConfig, MAPTILER_KEY_ENV, OPENAI_KEY_ENV,
    ROOT_FOLDER_ENV,
};
use polaris_common::{Error, ExplorerMode};
use serial_test::serial;
use std::path::{Path, PathBuf};

#[test]
fn test_defaults() {
    let config = TomlConfig::default();
    assert_eq!(config.port, 5750);
    assert_eq!(config.proximity.discovery_radius_m, 150.0);
    assert_eq!(config.proximity.interaction_radius_m, 40.0);
    assert_eq!(config.narration.reveal_tick_ms, 30);
    assert_eq!(config.openai.chat_model, "gpt-4-turbo-preview");
    assert_eq!(config.openai.max_tokens, 500);
    assert_eq!(config.speech_cache.ttl_secs, 86_400);
    assert_eq!(config.tiles.prefetch_zooms, vec![14, 15, 16, 17, 18]);
    assert!(config.validate().is_ok());
}

#[test]
fn test_partial_file_keeps_other_defaults() {
    let config = TomlConfig::from_toml_str(
        r#"
port = 8080

[proximity]
mode = "atlas"
interaction_radius_m = 25.0
"#,
    )
    .unwrap();

    assert_eq!(config.port, 8080);
    assert_eq!(config.proximity.mode, ExplorerMode::Atlas);
    assert_eq!(config.proximity.interaction_radius_m, 25.0);
    assert_eq!(config.proximity.discovery_radius_m, 150.0);
    assert_eq!(config.tiles.layer, "aquarelle");
}

#[test]
fn test_radius_order_validated() {
    let err = TomlConfig::from_toml_str(
        r#"
[proximity]
discovery_radius_m = 30.0
interaction_radius_m = 40.0
"#,
    )
    .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn test_opacity_and_zoom_validated() {
    assert!(TomlConfig::from_toml_str("[proximity]\nmin_opacity = 0.0\n").is_err());
    assert!(TomlConfig::from_toml_str("[tiles]\nmin_zoom = 18\nmax_zoom = 14\n").is_err());
    assert!(TomlConfig::from_toml_str("[tiles]\nprefetch_zooms = [12]\n").is_err());
}

#[test]
fn test_tile_layer_must_be_plain_name() {
    assert!(TomlConfig::from_toml_str("[tiles]\nlayer = \"streets-v2\"\n").is_ok());
    assert!(TomlConfig::from_toml_str("[tiles]\nlayer = \"\"\n").is_err());
    assert!(TomlConfig::from_toml_str("[tiles]\nlayer = \"../secret\"\n").is_err());
}

#[test]
fn test_malformed_toml_is_config_error() {
    assert!(matches!(
        TomlConfig::from_toml_str("port = \"not a number\""),
        Err(Error::Config(_))
    ));
}

#[test]
#[serial]
fn test_load_missing_explicit_file_uses_defaults() {
    std::env::remove_var(OPENAI_KEY_ENV);
    std::env::remove_var(MAPTILER_KEY_ENV);
    let dir = tempfile::tempdir().unwrap();
    let config = load_toml_config(Some(&dir.path().join("absent.toml"))).unwrap();
    assert_eq!(config.port, 5750);
    assert!(config.openai.api_key.is_none());
}

#[test]
#[serial]
fn test_env_overrides_api_keys() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[openai]\napi_key = \"from-file\"\n").unwrap();

    std::env::set_var(OPENAI_KEY_ENV, "from-env");
    std::env::set_var(MAPTILER_KEY_ENV, "tiles-env");
    let config = load_toml_config(Some(&path)).unwrap();
    std::env::remove_var(OPENAI_KEY_ENV);
    std::env::remove_var(MAPTILER_KEY_ENV);

    assert_eq!(config.openai.api_key.as_deref(), Some("from-env"));
    assert_eq!(config.tiles.api_key.as_deref(), Some("tiles-env"));
}

#[test]
#[serial]
fn test_root_folder_priority() {
    let mut config = TomlConfig::default();
    config.root_folder = Some(PathBuf::from("/from/toml"));

    std::env::set_var(ROOT_FOLDER_ENV, "/from/env");
    assert_eq!(
        resolve_root_folder(Some(Path::new("/from/cli")), ROOT_FOLDER_ENV, &config),
        PathBuf::from("/from/cli")
    );
    assert_eq!(
        resolve_root_folder(None, ROOT_FOLDER_ENV, &config),
        PathBuf::from("/from/env")
    );

    std::env::remove_var(ROOT_FOLDER_ENV);
    assert_eq!(
        resolve_root_folder(None, ROOT_FOLDER_ENV, &config),
        PathBuf::from("/from/toml")
    );

    config.root_folder = None;
    let fallback = resolve_root_folder(None, ROOT_FOLDER_ENV, &config);
    assert!(fallback.ends_with("polaris") || fallback.ends_with("polaris_data"));
}
