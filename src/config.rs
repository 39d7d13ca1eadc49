//! Editor configuration passed explicitly into the image stack and event history.
//!
//! Stored as JSON. Missing keys fall back to their defaults, so older files keep loading
//! after new options are added.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::geometry::IntSize;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Size used when a new image is created without content.
    pub default_image_size: IntSize,
    /// Name given to the root layer stack.
    pub default_stack_name: String,
    pub min_generation_area_size: IntSize,
    /// Upper bound for the generation area; always further limited to the image size.
    pub max_generation_area_size: IntSize,
    pub max_undo_steps: usize,
    /// Optional cap on memory held by undo entries, in megabytes.
    pub max_undo_memory_mb: Option<usize>,
    /// Retained events per event history before old ones are baked into the base image.
    pub max_pixmap_events: usize,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            default_image_size: IntSize::new(512, 512),
            default_stack_name: "new image".to_string(),
            min_generation_area_size: IntSize::new(8, 8),
            max_generation_area_size: IntSize::new(1024, 1024),
            max_undo_steps: 50,
            max_undo_memory_mb: Some(512),
            max_pixmap_events: 20,
        }
    }
}

impl EditorConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Load `path` if it exists, otherwise defaults. A corrupt file is logged and ignored.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "ignoring unreadable configuration");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn max_undo_memory_bytes(&self) -> Option<usize> {
        self.max_undo_memory_mb.map(|mb| mb * 1024 * 1024)
    }

    /// Default configuration file location.
    /// On Linux:   ~/.config/intrapaint/config.json  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\IntraPaint\config.json
    /// On macOS:   ~/Library/Application Support/IntraPaint/config.json
    pub fn config_path() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA").ok()?;
            return Some(PathBuf::from(appdata).join("IntraPaint").join("config.json"));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").ok()?;
            return Some(
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
                    .join("IntraPaint")
                    .join("config.json"),
            );
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .or_else(|_| std::env::var("HOME").map(|home| PathBuf::from(home).join(".config")))
                .ok()?;
            Some(config_dir.join("intrapaint").join("config.json"))
        }
    }
}
