use config::{Config, ConfigError, File as ConfigFile};
use serde::Deserialize;

/// Scan-time filters. These are process configuration, not run state: the
/// persisted run row carries the policy snapshot (see `RunOptions`), while
/// these decide what the scanner even looks at.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub min_file_size: u64,
    pub include_photos: bool,
    pub include_videos: bool,
    pub include_raw: bool,
    pub include_other: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            min_file_size: 0,
            include_photos: true,
            include_videos: true,
            include_raw: true,
            include_other: false,
        }
    }
}

pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Config").required(false))
        .build()?;
    builder.try_deserialize::<AppConfig>()
}
