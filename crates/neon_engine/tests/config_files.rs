//! Renderer config persistence

use neon_engine::config::{Config, ConfigError, RendererConfig, TextureSource};
use neon_engine::render::EmptyGroupPolicy;

#[test]
fn test_toml_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("renderer.toml");
    let config = RendererConfig::new("round-trip")
        .with_max_instances(512)
        .with_frame_rate_target(Some(144))
        .with_empty_group_policy(EmptyGroupPolicy::Reject);

    config.save_to_file(&path).unwrap();
    let loaded = RendererConfig::load_from_file(&path).unwrap();

    assert_eq!(loaded, config);
}

#[test]
fn test_ron_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("renderer.ron");
    let mut config = RendererConfig::new("ron").with_frames_in_flight(2);
    config.textures[1].source = TextureSource::Checker {
        size: 16,
        cell: 2,
        a: [0, 0, 0, 255],
        b: [255, 0, 255, 255],
    };

    config.save_to_file(&path).unwrap();
    let loaded = RendererConfig::load_from_file(&path).unwrap();

    assert_eq!(loaded, config);
    loaded.validate().unwrap();
}

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let loaded = RendererConfig::load_or_default(dir.path().join("absent.toml")).unwrap();
    assert_eq!(loaded, RendererConfig::default());
}

#[test]
fn test_unknown_extension_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("renderer.yaml");
    std::fs::write(&path, "application_name: nope").unwrap();

    assert!(matches!(
        RendererConfig::load_from_file(&path),
        Err(ConfigError::UnsupportedFormat(_))
    ));
}

#[test]
fn test_malformed_file_reports_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("renderer.toml");
    std::fs::write(&path, "frames_in_flight = \"three\"").unwrap();

    assert!(matches!(RendererConfig::load_from_file(&path), Err(ConfigError::Parse(_))));
}
