use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Which classifier model the worker should prepare
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub name: String,
    pub quantized: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: "quickdraw-mobilevit-small".to_string(),
            quantized: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GameConfig {
    /// Length of a whole session; the extra half second keeps the
    /// on-screen clock from flickering straight to zero.
    pub game_duration_secs: f64,
    pub countdown_secs: u32,
    pub skip_penalty_ms: u64,
    pub reject_time_delay_ms: u64,
    pub reject_time_per_label_ms: u64,
    pub start_reject_threshold: f32,
    pub sketch_padding: u32,
    pub brush_radius: f32,
    pub sampling_interval_ms: u64,
    /// Too similar to other labels, too hard to draw or too hard to
    /// understand.
    pub banned_labels: Vec<String>,
    pub label_set: String,
    pub model: ModelConfig,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            game_duration_secs: 10.0 + 0.5,
            countdown_secs: 3,
            skip_penalty_ms: 3 * 1000,
            reject_time_delay_ms: 3 * 1000,
            reject_time_per_label_ms: 3 * 1000,
            start_reject_threshold: 0.2,
            sketch_padding: 4,
            brush_radius: 1.5,
            sampling_interval_ms: 10,
            banned_labels: vec!["animal migration".to_string(), "stitches".to_string()],
            label_set: "quickdraw".to_string(),
            model: ModelConfig::default(),
        }
    }
}

impl GameConfig {
    pub fn game_duration(&self) -> Duration {
        Duration::from_secs_f64(self.game_duration_secs.max(0.0))
    }

    pub fn skip_penalty(&self) -> Duration {
        Duration::from_millis(self.skip_penalty_ms)
    }

    pub fn sampling_interval(&self) -> Duration {
        Duration::from_millis(self.sampling_interval_ms.max(1))
    }
}

pub trait ConfigStore {
    fn load(&self) -> GameConfig;
    fn save(&self, cfg: &GameConfig) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = if let Some(pd) = ProjectDirs::from("", "", "doodle-dash") {
            pd.config_dir().join("config.json")
        } else {
            PathBuf::from("doodle_dash_config.json")
        };
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> GameConfig {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(_) => return GameConfig::default(),
        };
        match serde_json::from_slice::<GameConfig>(&bytes) {
            Ok(cfg) => cfg,
            Err(err) => {
                tracing::warn!(path = %self.path.display(), %err, "ignoring malformed config");
                GameConfig::default()
            }
        }
    }

    fn save(&self, cfg: &GameConfig) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg)?;
        fs::write(&self.path, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempdir().unwrap();
        let store = FileConfigStore::with_path(dir.path().join("config.json"));
        let cfg = GameConfig::default();
        store.save(&cfg).unwrap();
        assert_eq!(store.load(), cfg);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let store = FileConfigStore::with_path(dir.path().join("nope").join("config.json"));
        assert_eq!(store.load(), GameConfig::default());
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, b"{ not json").unwrap();
        assert_eq!(FileConfigStore::with_path(&path).load(), GameConfig::default());
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, br#"{ "game_duration_secs": 60.5, "model": { "quantized": true } }"#)
            .unwrap();

        let cfg = FileConfigStore::with_path(&path).load();
        assert_eq!(cfg.game_duration_secs, 60.5);
        assert!(cfg.model.quantized);
        assert_eq!(cfg.model.name, "quickdraw-mobilevit-small");
        assert_eq!(cfg.countdown_secs, 3);
        assert_eq!(cfg.banned_labels.len(), 2);
    }

    #[test]
    fn durations_follow_fields() {
        let cfg = GameConfig::default();
        assert_eq!(cfg.game_duration(), Duration::from_millis(10_500));
        assert_eq!(cfg.skip_penalty(), Duration::from_secs(3));
        assert_eq!(cfg.sampling_interval(), Duration::from_millis(10));
    }
}
