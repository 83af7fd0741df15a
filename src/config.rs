use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub waveform: WaveformConfig,
}

#[derive(Debug, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bearer token attached to every request, when set.
    #[serde(default)]
    pub api_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    /// Capture cadence: how much audio goes into one fragment.
    #[serde(default = "default_fragment_interval_ms")]
    pub fragment_interval_ms: u64,
    /// Samples per waveform amplitude frame.
    #[serde(default = "default_frame_size")]
    pub frame_size: usize,
}

#[derive(Debug, Deserialize)]
pub struct SessionSettings {
    /// Seconds between chunk flushes.
    #[serde(default = "default_chunk_interval_secs")]
    pub chunk_interval_secs: u64,
    #[serde(default = "default_content_type")]
    pub content_type: String,
}

#[derive(Debug, Deserialize)]
pub struct WaveformConfig {
    /// Milliseconds between waveform frames pulled by a renderer.
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_fragment_interval_ms() -> u64 {
    1000
}

fn default_frame_size() -> usize {
    128
}

fn default_chunk_interval_secs() -> u64 {
    20
}

fn default_content_type() -> String {
    "audio/pcm".to_string()
}

fn default_frame_interval_ms() -> u64 {
    33
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_token: None,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            fragment_interval_ms: default_fragment_interval_ms(),
            frame_size: default_frame_size(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            chunk_interval_secs: default_chunk_interval_secs(),
            content_type: default_content_type(),
        }
    }
}

impl Default for WaveformConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: default_frame_interval_ms(),
        }
    }
}

impl Config {
    /// Load from an optional config file plus `MEMOVOX_*` environment
    /// overrides; missing keys fall back to defaults.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("MEMOVOX").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
