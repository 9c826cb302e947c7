use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "DDT Ingest";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Directory name used under the platform data dir.
const DATA_DIR_NAME: &str = "ddt-ingest";

/// Get the application data directory.
///
/// `DDT_BASE_DIR` wins; otherwise the platform local data dir
/// (falling back to the working directory when none is known).
pub fn app_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("DDT_BASE_DIR") {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DATA_DIR_NAME)
}

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "info,ddt_ingest_lib=debug"
}
