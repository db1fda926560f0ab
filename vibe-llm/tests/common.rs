use std::sync::OnceLock;

use vibe_common::observability::{LogConfig, LogFormat};

static INIT_PATH: OnceLock<std::path::PathBuf> = OnceLock::new();

pub fn init_test_tracing() {
    let _ = INIT_PATH.get_or_init(|| {
        let format = std::env::var("VIBE_LOG_FORMAT")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(LogFormat::Text);
        let config = LogConfig {
            app_name: "vibe-llm-tests".into(),
            log_dir: Some(std::env::temp_dir().join("vibe-llm-tests")),
            emit_stderr: true,
            format,
            default_filter: "debug".into(),
        };

        vibe_common::observability::init_logging(config).unwrap_or_default()
    });
}
