use std::{fs, path::Path};

use plantmd::config::{AppConfig, NO_REMEDY};

#[test]
fn shipped_config_is_valid() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("conf/config.yaml");
    let raw = fs::read_to_string(path).unwrap();
    let config = AppConfig::from_yaml(&raw).unwrap();

    assert_eq!(config.model.image_size, 224);
    assert!(config.classes.iter().any(|c| c == "Tomato___healthy"));
    assert_eq!(config.remedy_for("Tomato___healthy"), NO_REMEDY);
    assert_eq!(
        config.remedy_for("Tomato___Late_blight"),
        "Apply copper-based fungicide."
    );
}
