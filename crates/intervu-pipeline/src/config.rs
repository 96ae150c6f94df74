//! Pipeline configuration.

use std::str::FromStr;
use std::time::Duration;

use intervu_analysis::OrchestratorConfig;
use intervu_capture::{CaptureSettings, MAX_RECORDING_DURATION};
use intervu_models::MAX_MEDIA_BYTES;

/// Where uploaded recordings go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UploadBackend {
    /// Multipart POST to `INTERVU_UPLOAD_URL`
    #[default]
    Http,
    /// Direct put into an R2 bucket
    R2,
}

impl FromStr for UploadBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "r2" => Ok(Self::R2),
            other => Err(format!("unknown upload backend: {}", other)),
        }
    }
}

/// Where analysis records are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    #[default]
    Firestore,
    /// Process-local; history is lost on exit
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firestore" => Ok(Self::Firestore),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown store backend: {}", other)),
        }
    }
}

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub upload_backend: UploadBackend,
    pub store_backend: StoreBackend,
    pub primary_url: Option<String>,
    pub fallback_url: Option<String>,
    /// Bound on each analysis endpoint attempt
    pub analysis_timeout: Duration,
    /// Substitute the degraded result when both endpoints fail
    pub degraded_fallback: bool,
    /// Hard ceiling on a live recording
    pub max_recording: Duration,
    pub max_upload_bytes: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            upload_backend: UploadBackend::default(),
            store_backend: StoreBackend::default(),
            primary_url: None,
            fallback_url: None,
            analysis_timeout: Duration::from_secs(180),
            degraded_fallback: true,
            max_recording: MAX_RECORDING_DURATION,
            max_upload_bytes: MAX_MEDIA_BYTES,
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            upload_backend: std::env::var("INTERVU_UPLOAD_BACKEND")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
            store_backend: std::env::var("INTERVU_STORE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
            primary_url: std::env::var("INTERVU_ANALYSIS_PRIMARY_URL")
                .ok()
                .filter(|s| !s.is_empty()),
            fallback_url: std::env::var("INTERVU_ANALYSIS_FALLBACK_URL")
                .ok()
                .filter(|s| !s.is_empty()),
            analysis_timeout: Duration::from_secs(
                std::env::var("INTERVU_ANALYSIS_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(180),
            ),
            degraded_fallback: std::env::var("INTERVU_DEGRADED_FALLBACK")
                .ok()
                .and_then(|s| parse_flag(&s))
                .unwrap_or(true),
            max_recording: Duration::from_secs(
                std::env::var("INTERVU_MAX_RECORDING_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(MAX_RECORDING_DURATION.as_secs()),
            ),
            max_upload_bytes: std::env::var("INTERVU_MAX_UPLOAD_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(MAX_MEDIA_BYTES),
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            attempt_timeout: self.analysis_timeout,
            degraded_fallback: self.degraded_fallback,
        }
    }

    pub fn capture_settings(&self) -> CaptureSettings {
        CaptureSettings {
            max_duration: self.max_recording,
            max_bytes: self.max_upload_bytes,
            ..CaptureSettings::default()
        }
    }
}

fn parse_flag(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 8] = [
        "INTERVU_UPLOAD_BACKEND",
        "INTERVU_STORE",
        "INTERVU_ANALYSIS_PRIMARY_URL",
        "INTERVU_ANALYSIS_FALLBACK_URL",
        "INTERVU_ANALYSIS_TIMEOUT_SECS",
        "INTERVU_DEGRADED_FALLBACK",
        "INTERVU_MAX_RECORDING_SECS",
        "INTERVU_MAX_UPLOAD_BYTES",
    ];

    fn clear() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear();
        let config = PipelineConfig::from_env();
        assert_eq!(config.upload_backend, UploadBackend::Http);
        assert_eq!(config.store_backend, StoreBackend::Firestore);
        assert!(config.primary_url.is_none());
        assert!(config.degraded_fallback);
        assert_eq!(config.max_recording, Duration::from_secs(120));
        assert_eq!(config.max_upload_bytes, 100 * 1024 * 1024);
        assert_eq!(config.orchestrator_config().attempt_timeout, Duration::from_secs(180));
    }

    #[test]
    #[serial]
    fn test_overrides() {
        clear();
        std::env::set_var("INTERVU_UPLOAD_BACKEND", "R2");
        std::env::set_var("INTERVU_STORE", "memory");
        std::env::set_var("INTERVU_DEGRADED_FALLBACK", "off");
        std::env::set_var("INTERVU_MAX_RECORDING_SECS", "30");
        std::env::set_var("INTERVU_ANALYSIS_PRIMARY_URL", "https://a.example/analyze");

        let config = PipelineConfig::from_env();
        assert_eq!(config.upload_backend, UploadBackend::R2);
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert!(!config.degraded_fallback);
        assert_eq!(config.capture_settings().max_duration, Duration::from_secs(30));
        assert_eq!(config.primary_url.as_deref(), Some("https://a.example/analyze"));
        clear();
    }

    #[test]
    #[serial]
    fn test_unparseable_values_fall_back_to_defaults() {
        clear();
        std::env::set_var("INTERVU_STORE", "postgres");
        std::env::set_var("INTERVU_DEGRADED_FALLBACK", "maybe");
        let config = PipelineConfig::from_env();
        assert_eq!(config.store_backend, StoreBackend::Firestore);
        assert!(config.degraded_fallback);
        clear();
    }
}
