use std::io::Write;
use std::sync::Mutex;

use tempfile::{Builder, NamedTempFile};

use treasure_lens::config::PipelineConfig;
use treasure_lens::FitMode;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "TREASURE_LENS_CONFIG",
        "TREASURE_LENS_INITIAL_THRESHOLD",
        "TREASURE_LENS_LIVE_THRESHOLD",
        "TREASURE_LENS_MASK_IOU",
        "TREASURE_LENS_SIMILARITY",
        "TREASURE_LENS_SEGMENT_CLASSES",
        "TREASURE_LENS_OVERLAY_RETRIES",
        "TREASURE_LENS_FIT",
        "TREASURE_LENS_LABELS",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = PipelineConfig::load().expect("load config");
    assert_eq!(cfg.detection.initial_score_threshold, 0.3);
    assert_eq!(cfg.detection.live_score_threshold, 0.5);
    assert_eq!(cfg.segmentation.mask_iou_threshold, 0.2);
    assert_eq!(cfg.segmentation.mask_alpha_threshold, 128);
    assert_eq!(cfg.segmentation.segmentable_classes, vec!["person"]);
    assert_eq!(cfg.embedding.similarity_threshold, 0.65);
    assert_eq!(cfg.embedding.fingerprint_size, 32);
    assert_eq!(cfg.overlay.fit_mode, FitMode::Contain);
    assert_eq!(cfg.overlay.retry_limit, 10);
    assert_eq!(cfg, PipelineConfig::default());
}

#[test]
fn loads_json_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "detection": { "initial_score_threshold": 0.25, "live_score_threshold": 0.6 },
        "segmentation": { "classes": ["person", " Dog "], "mask_iou_threshold": 0.3 },
        "embedding": { "similarity_threshold": 0.7 },
        "overlay": { "fit": "cover", "retry_limit": 4, "labels": { "cup": "Mug" } }
    }"#;
    file.write_all(json.as_bytes()).expect("write config");

    std::env::set_var("TREASURE_LENS_CONFIG", file.path());
    std::env::set_var("TREASURE_LENS_LIVE_THRESHOLD", "0.55");
    std::env::set_var("TREASURE_LENS_FIT", "contain");

    let cfg = PipelineConfig::load().expect("load config");
    assert_eq!(cfg.detection.initial_score_threshold, 0.25);
    assert_eq!(cfg.detection.live_score_threshold, 0.55);
    assert_eq!(cfg.segmentation.segmentable_classes, vec!["person", "dog"]);
    assert_eq!(cfg.segmentation.mask_iou_threshold, 0.3);
    assert_eq!(cfg.embedding.similarity_threshold, 0.7);
    assert_eq!(cfg.overlay.fit_mode, FitMode::Contain);
    assert_eq!(cfg.overlay.retry_limit, 4);
    let labels = cfg.label_catalog().expect("labels");
    assert_eq!(labels.display_name("cup"), "Mug");
    assert_eq!(labels.display_name("person"), "Person");

    clear_env();
}

#[test]
fn loads_toml_by_extension() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new().suffix(".toml").tempfile().expect("temp config");
    let toml = r#"
[segmentation]
classes = ["person"]
mask_alpha_threshold = 100

[overlay]
fit = "cover"
"#;
    file.write_all(toml.as_bytes()).expect("write config");
    std::env::set_var("TREASURE_LENS_CONFIG", file.path());
    std::env::set_var("TREASURE_LENS_SEGMENT_CLASSES", "person, cat");

    let cfg = PipelineConfig::load().expect("load config");
    assert_eq!(cfg.segmentation.mask_alpha_threshold, 100);
    assert_eq!(cfg.segmentation.segmentable_classes, vec!["person", "cat"]);
    assert_eq!(cfg.overlay.fit_mode, FitMode::Cover);

    clear_env();
}

#[test]
fn labels_file_from_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut labels = NamedTempFile::new().expect("temp labels");
    labels
        .write_all(br#"{"dog": "Doggo"}"#)
        .expect("write labels");
    std::env::set_var("TREASURE_LENS_LABELS", labels.path());

    let cfg = PipelineConfig::load().expect("load config");
    let catalog = cfg.label_catalog().expect("labels");
    assert_eq!(catalog.format_label("dog", 0.5), "Doggo 50%");

    clear_env();
}

#[test]
fn rejects_out_of_range_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("TREASURE_LENS_SIMILARITY", "1.5");
    assert!(PipelineConfig::load().is_err());
    clear_env();

    std::env::set_var("TREASURE_LENS_MASK_IOU", "not-a-number");
    assert!(PipelineConfig::load().is_err());
    clear_env();

    std::env::set_var("TREASURE_LENS_OVERLAY_RETRIES", "0");
    assert!(PipelineConfig::load().is_err());
    clear_env();

    std::env::set_var("TREASURE_LENS_FIT", "stretch");
    assert!(PipelineConfig::load().is_err());
    clear_env();
}

#[test]
fn rejects_oversized_fingerprint() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    file.write_all(br#"{"embedding":{"fingerprint_size":4000000000}}"#).expect("write config");
    assert!(PipelineConfig::load_from(Some(file.path())).is_err());

    let mut file = NamedTempFile::new().expect("temp config");
    file.write_all(br#"{"embedding":{"fingerprint_size":0}}"#).expect("write config");
    assert!(PipelineConfig::load_from(Some(file.path())).is_err());

    let mut file = NamedTempFile::new().expect("temp config");
    file.write_all(br#"{"embedding":{"fingerprint_size":256}}"#).expect("write config");
    let cfg = PipelineConfig::load_from(Some(file.path())).expect("load config");
    assert_eq!(cfg.embedding.fingerprint_size, 256);
}

#[test]
fn rejects_unreadable_config() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    file.write_all(b"{ not json").expect("write config");
    std::env::set_var("TREASURE_LENS_CONFIG", file.path());
    assert!(PipelineConfig::load().is_err());

    std::env::set_var("TREASURE_LENS_CONFIG", "/nonexistent/treasure-lens.json");
    assert!(PipelineConfig::load().is_err());

    clear_env();
}
