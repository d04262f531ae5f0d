use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How much of a stream must be warm before a session counts as Ready.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionPolicy {
    /// Manifest parsed plus one loaded fragment.
    FirstFragment,
    /// Every fragment the manifest reported.
    AllFragments,
    /// At least this share of the reported fragments, in (0, 1].
    Fraction(f64),
}

impl CompletionPolicy {
    pub fn is_satisfied(&self, loaded: u32, total: u32) -> bool {
        if loaded >= total {
            return true;
        }
        match *self {
            CompletionPolicy::FirstFragment => loaded >= 1,
            CompletionPolicy::AllFragments => false,
            CompletionPolicy::Fraction(threshold) => {
                f64::from(loaded) / f64::from(total) >= threshold
            }
        }
    }
}

impl Default for CompletionPolicy {
    fn default() -> Self {
        CompletionPolicy::FirstFragment
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreloadConfig {
    #[serde(default)]
    pub completion_policy: CompletionPolicy,
    #[serde(default = "default_segment_estimate")]
    pub default_segment_estimate: u32,
    #[serde(default = "default_fragment_interval_min_ms")]
    pub fragment_interval_min_ms: u64,
    #[serde(default = "default_fragment_interval_max_ms")]
    pub fragment_interval_max_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_manifest_accept")]
    pub manifest_accept: String,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    #[serde(default = "default_follow_variants")]
    pub follow_variants: bool,
}

fn default_segment_estimate() -> u32 {
    10
}

fn default_fragment_interval_min_ms() -> u64 {
    300
}

fn default_fragment_interval_max_ms() -> u64 {
    500
}

fn default_user_agent() -> String {
    "hlswarm/0.1.0".to_string()
}

fn default_manifest_accept() -> String {
    "application/vnd.apple.mpegurl, application/x-mpegURL, text/plain, */*".to_string()
}

fn default_event_capacity() -> usize {
    64
}

fn default_follow_variants() -> bool {
    true
}

impl Default for PreloadConfig {
    fn default() -> Self {
        Self {
            completion_policy: CompletionPolicy::default(),
            default_segment_estimate: default_segment_estimate(),
            fragment_interval_min_ms: default_fragment_interval_min_ms(),
            fragment_interval_max_ms: default_fragment_interval_max_ms(),
            user_agent: default_user_agent(),
            manifest_accept: default_manifest_accept(),
            event_capacity: default_event_capacity(),
            follow_variants: default_follow_variants(),
        }
    }
}

impl PreloadConfig {
    pub fn config_dir() -> AppResult<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| AppError::Config("Cannot find home directory".into()))?;
        Ok(home.join(".hlswarm"))
    }

    pub fn config_path() -> AppResult<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    pub fn load() -> AppResult<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            return Err(AppError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the user config, falling back to defaults when it is missing or broken.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            log::warn!("Failed to load config: {}. Using defaults.", e);
            Self::default()
        })
    }

    pub fn save(&self) -> AppResult<()> {
        let dir = Self::config_dir()?;
        std::fs::create_dir_all(&dir)?;
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> AppResult<()> {
        self.validate()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.default_segment_estimate == 0 {
            return Err(AppError::Config(
                "default_segment_estimate must be at least 1".into(),
            ));
        }
        if self.fragment_interval_min_ms > self.fragment_interval_max_ms {
            return Err(AppError::Config(format!(
                "fragment interval range is inverted: {}ms > {}ms",
                self.fragment_interval_min_ms, self.fragment_interval_max_ms
            )));
        }
        if let CompletionPolicy::Fraction(threshold) = self.completion_policy {
            if !(threshold > 0.0 && threshold <= 1.0) {
                return Err(AppError::Config(format!(
                    "completion fraction must be in (0, 1], got {}",
                    threshold
                )));
            }
        }
        Ok(())
    }

    pub fn fragment_interval_range(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.fragment_interval_min_ms),
            Duration::from_millis(self.fragment_interval_max_ms),
        )
    }
}
