use etude_core::{ConfigError, EngineConfig};
use pretty_assertions::assert_eq;
use std::time::Duration;

#[test]
fn defaults_match_the_engine_constants() {
    let cfg = EngineConfig::default();
    assert_eq!(cfg.debounce_window_ms, 5.0);
    assert_eq!(cfg.lookahead_s, 0.6);
    assert_eq!(cfg.lead_in_s, 0.05);
    assert_eq!(cfg.tick_interval(), Duration::from_millis(60));
    assert_eq!(cfg.frame_interval(), Duration::from_millis(16));
    assert_eq!(cfg.ppq, 480);
    assert_eq!(cfg.default_velocity, 90);
}

#[test]
fn partial_json_keeps_other_defaults() {
    let cfg = EngineConfig::from_json_str(r#"{ "tempo_bpm": 96, "hit_window_ms": 80.0 }"#)
        .expect("valid config");

    assert_eq!(
        cfg,
        EngineConfig {
            tempo_bpm: 96,
            hit_window_ms: 80.0,
            ..EngineConfig::default()
        }
    );
}

#[test]
fn zero_intervals_are_clamped() {
    let cfg = EngineConfig::from_json_str(r#"{ "tick_interval_ms": 0 }"#).expect("valid config");
    assert_eq!(cfg.tick_interval(), Duration::from_millis(1));
}

#[test]
fn bad_input_is_reported() {
    assert!(matches!(
        EngineConfig::from_json_str("{ not json"),
        Err(ConfigError::Parse(_))
    ));
    assert!(matches!(
        EngineConfig::load(std::path::Path::new("/nonexistent/etude.json")),
        Err(ConfigError::Io(_))
    ));
}
