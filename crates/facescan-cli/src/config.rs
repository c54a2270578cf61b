use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Client configuration: defaults, then `config.toml`, then `FACESCAN_*`
/// environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the recognition service.
    pub api_url: String,
    /// V4L2 device path.
    pub camera_device: String,
    pub capture_width: u32,
    pub capture_height: u32,
    /// Frames discarded before each grab (camera AGC/AE stabilization).
    pub warmup_frames: usize,
    pub jpeg_quality: u8,
    /// Upload ceiling in bytes; 0 disables it.
    pub max_upload_bytes: u64,
    pub request_timeout_secs: u64,
    /// Where the login token is kept.
    pub session_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:5000".to_string(),
            camera_device: "/dev/video0".to_string(),
            capture_width: 640,
            capture_height: 480,
            warmup_frames: 4,
            jpeg_quality: facescan_core::encoder::DEFAULT_JPEG_QUALITY,
            max_upload_bytes: facescan_core::encoder::DEFAULT_MAX_UPLOAD_BYTES,
            request_timeout_secs: 30,
            session_path: data_dir().join("session.json"),
        }
    }
}

impl Config {
    /// Load from `$FACESCAN_CONFIG` or `$XDG_CONFIG_HOME/facescan/config.toml`
    /// when present, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = std::env::var("FACESCAN_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"));

        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            Self::from_toml(&text).with_context(|| format!("parsing {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("FACESCAN_API_URL") {
            self.api_url = url;
        }
        if let Ok(device) = std::env::var("FACESCAN_CAMERA_DEVICE") {
            self.camera_device = device;
        }
        if let Ok(path) = std::env::var("FACESCAN_SESSION_PATH") {
            self.session_path = PathBuf::from(path);
        }
        self.capture_width = env_parse("FACESCAN_CAPTURE_WIDTH", self.capture_width);
        self.capture_height = env_parse("FACESCAN_CAPTURE_HEIGHT", self.capture_height);
        self.warmup_frames = env_parse("FACESCAN_WARMUP_FRAMES", self.warmup_frames);
        self.jpeg_quality = env_parse("FACESCAN_JPEG_QUALITY", self.jpeg_quality);
        self.max_upload_bytes = env_parse("FACESCAN_MAX_UPLOAD_BYTES", self.max_upload_bytes);
        self.request_timeout_secs =
            env_parse("FACESCAN_REQUEST_TIMEOUT_SECS", self.request_timeout_secs);
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn home() -> PathBuf {
    PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string()))
}

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home().join(".config"))
        .join("facescan")
}

fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home().join(".local/share"))
        .join("facescan")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            api_url = "https://faces.example.com"
            jpeg_quality = 90
            "#,
        )
        .unwrap();
        assert_eq!(config.api_url, "https://faces.example.com");
        assert_eq!(config.jpeg_quality, 90);
        assert_eq!(config.capture_width, 640);
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn test_bad_toml_rejected() {
        assert!(Config::from_toml("capture_width = \"wide\"").is_err());
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.jpeg_quality, 80);
        assert_eq!(config.request_timeout().as_secs(), 30);
        assert!(config.session_path.ends_with("facescan/session.json"));
    }
}
