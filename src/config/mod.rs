// Configuration management module
// Handles TOML configuration for the model server, frame sampling and the vector store

pub mod interactive;
pub mod settings;


pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    Config, ConfigError, DEFAULT_FRAME_INTERVAL_SECS, DEFAULT_PREVIEW_CHARS, DEFAULT_RESULT_COUNT,
    OllamaConfig, SamplingConfig, StoreConfig, validate_frame_interval,
};

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::config_dir()
}
