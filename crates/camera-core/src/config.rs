use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use crate::error::{CameraHubError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct RootConfig {
    pub cameras: HashMap<String, RawCameraConfig>,
    #[serde(default)]
    pub recordings: RecordingsConfig,
    #[serde(default)]
    pub motion: MotionSectionConfig,
    #[serde(default)]
    pub logs: LogsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawCameraConfig {
    pub name: String,
    pub camera: String,
    pub target_fps: u32,
    pub port: u16,
    #[serde(default = "default_quality")]
    pub stream_quality: u8,
    #[serde(default)]
    pub show_fps: bool,
    #[serde(default = "default_source_format")]
    pub source_format: String,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub source_fps: u32,
}

fn default_quality() -> u8 {
    80
}

fn default_source_format() -> String {
    "MJPG".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordingsConfig {
    #[serde(default)]
    pub save: bool,
    #[serde(default)]
    pub directory: String,
    #[serde(default = "default_max_days")]
    pub max_days_to_save: u32,
    #[serde(default)]
    pub encode_to_h264: u8,
    #[serde(default)]
    pub h264_encoder: String,
    #[serde(default)]
    pub bitrate: u32,
}

impl Default for RecordingsConfig {
    fn default() -> Self {
        Self {
            save: false,
            directory: String::new(),
            max_days_to_save: default_max_days(),
            encode_to_h264: 0,
            h264_encoder: String::new(),
            bitrate: 0,
        }
    }
}

fn default_max_days() -> u32 {
    14
}

#[derive(Debug, Clone, Deserialize)]
pub struct MotionSectionConfig {
    #[serde(default)]
    pub directory: String,
    #[serde(default = "default_max_days")]
    pub max_days_to_save: u32,
    #[serde(default)]
    pub encode_to_h264: u8,
    #[serde(default)]
    pub h264_encoder: String,
    #[serde(default)]
    pub bitrate: u32,
    #[serde(default)]
    pub cameras: HashMap<String, MotionCameraConfig>,
}

impl Default for MotionSectionConfig {
    fn default() -> Self {
        Self {
            directory: String::new(),
            max_days_to_save: default_max_days(),
            encode_to_h264: 0,
            h264_encoder: String::new(),
            bitrate: 0,
            cameras: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MotionCameraConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_noise_level")]
    pub noise_level: u8,
    #[serde(default = "default_pixel_threshold")]
    pub pixel_threshold: f32,
    #[serde(default = "default_object_threshold")]
    pub object_threshold: f32,
    #[serde(default = "default_minimum_motion_frames")]
    pub minimum_motion_frames: u32,
    #[serde(default)]
    pub pre_capture: u32,
    #[serde(default)]
    pub post_capture: u32,
    #[serde(default)]
    pub event_gap: u32,
}

fn default_noise_level() -> u8 {
    25
}
fn default_pixel_threshold() -> f32 {
    1.5
}
fn default_object_threshold() -> f32 {
    0.5
}
fn default_minimum_motion_frames() -> u32 {
    3
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogsConfig {
    #[serde(default)]
    pub save: bool,
    #[serde(default)]
    pub directory: String,
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: u32,
    #[serde(default = "default_max_files")]
    pub max_files: u32,
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            save: false,
            directory: String::new(),
            max_size_mb: default_max_size_mb(),
            max_files: default_max_files(),
            level: default_level(),
        }
    }
}

fn default_max_size_mb() -> u32 {
    10
}
fn default_max_files() -> u32 {
    5
}
fn default_level() -> String {
    "info".to_string()
}

/// A camera entry that has passed per-camera validation, with its motion
/// settings (if any) resolved. This is what the orchestrator consumes; a
/// `RawCameraConfig` that fails validation never becomes one of these.
#[derive(Debug, Clone)]
pub struct CameraConfig {
    pub id: String,
    pub raw: RawCameraConfig,
    pub norm_name: String,
    pub motion: Option<MotionCameraConfig>,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub cameras: Vec<CameraConfig>,
    pub recordings: RecordingsConfig,
    pub motion: MotionSectionConfig,
    pub logs: LogsConfig,
}

/// Lowercases a camera name and replaces spaces with underscores, the
/// on-disk directory name for that camera's recordings.
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase().replace(' ', "_")
}

/// Loads and validates the YAML configuration at `path`.
///
/// Per-camera validation failures (bad thresholds, bad fps, etc.) are
/// logged and that camera is skipped rather than aborting the whole
/// process. Malformed top-level sections (duplicate ports/names, invalid
/// `recordings`/`logs` settings) abort startup.
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    let text = fs::read_to_string(path)?;
    let root: RootConfig = serde_yaml2::from_str(&text)
        .map_err(|e| CameraHubError::Yaml(e.to_string()))?;

    if root.cameras.is_empty() {
        return Err(CameraHubError::Config("no cameras configured".into()));
    }

    validate_recordings(&root.recordings)?;
    validate_logs(&root.logs)?;

    for motion_cam_id in root.motion.cameras.keys() {
        if !root.cameras.contains_key(motion_cam_id) {
            return Err(CameraHubError::Config(format!(
                "motion.cameras references unknown camera id '{motion_cam_id}'"
            )));
        }
    }

    let mut seen_names: HashMap<String, String> = HashMap::new();
    let mut seen_ports: HashMap<u16, String> = HashMap::new();
    let mut cameras = Vec::new();

    for (id, raw) in root.cameras.into_iter() {
        if let Err(e) = validate_camera(&id, &raw) {
            warn!(camera_id = %id, error = %e, "skipping camera: validation failed");
            continue;
        }

        if let Some(existing) = seen_names.insert(raw.name.clone(), id.clone()) {
            return Err(CameraHubError::DuplicateConfigValue {
                field: "name",
                value: format!("{} (cameras '{}' and '{}')", raw.name, existing, id),
            });
        }
        if let Some(existing) = seen_ports.insert(raw.port, id.clone()) {
            return Err(CameraHubError::DuplicateConfigValue {
                field: "port",
                value: format!("{} (cameras '{}' and '{}')", raw.port, existing, id),
            });
        }

        let motion = root.motion.cameras.get(&id).cloned().filter(|m| {
            validate_motion_camera(&id, m)
                .map_err(|e| warn!(camera_id = %id, error = %e, "disabling motion detection: validation failed"))
                .is_ok()
        });

        let norm_name = normalize_name(&raw.name);
        cameras.push(CameraConfig {
            id,
            raw,
            norm_name,
            motion,
        });
    }

    if cameras.is_empty() {
        return Err(CameraHubError::Config(
            "all configured cameras failed validation".into(),
        ));
    }

    Ok(EngineConfig {
        cameras,
        recordings: root.recordings,
        motion: root.motion,
        logs: root.logs,
    })
}

fn validate_camera(id: &str, raw: &RawCameraConfig) -> Result<()> {
    if raw.name.trim().is_empty() {
        return Err(CameraHubError::Config(format!("camera '{id}': empty name")));
    }
    if raw.target_fps == 0 {
        return Err(CameraHubError::Config(format!(
            "camera '{id}': target_fps must be > 0"
        )));
    }
    if raw.port == 0 {
        return Err(CameraHubError::Config(format!("camera '{id}': port must be > 0")));
    }
    if raw.stream_quality > 100 {
        return Err(CameraHubError::Config(format!(
            "camera '{id}': stream_quality must be 0..=100"
        )));
    }
    if raw.width == 0 || raw.height == 0 {
        return Err(CameraHubError::Config(format!(
            "camera '{id}': width/height must be > 0"
        )));
    }
    Ok(())
}

fn validate_motion_camera(id: &str, m: &MotionCameraConfig) -> Result<()> {
    if !m.enabled {
        return Ok(());
    }
    if m.noise_level == 0 {
        return Err(CameraHubError::Config(format!(
            "camera '{id}': motion.noise_level must be 1..=255"
        )));
    }
    if !(m.pixel_threshold > 0.0 && m.pixel_threshold < 100.0) {
        return Err(CameraHubError::Config(format!(
            "camera '{id}': motion.pixel_threshold must be in (0,100)"
        )));
    }
    if !(m.object_threshold > 0.0 && m.object_threshold < 100.0) {
        return Err(CameraHubError::Config(format!(
            "camera '{id}': motion.object_threshold must be in (0,100)"
        )));
    }
    if m.minimum_motion_frames == 0 {
        return Err(CameraHubError::Config(format!(
            "camera '{id}': motion.minimum_motion_frames must be >= 1"
        )));
    }
    Ok(())
}

fn validate_recordings(cfg: &RecordingsConfig) -> Result<()> {
    if !cfg.save {
        return Ok(());
    }
    if cfg.directory.trim().is_empty() {
        return Err(CameraHubError::Config("recordings.directory is empty".into()));
    }
    if cfg.max_days_to_save < 1 {
        return Err(CameraHubError::Config(
            "recordings.max_days_to_save must be >= 1".into(),
        ));
    }
    if cfg.encode_to_h264 > 2 {
        return Err(CameraHubError::Config(
            "recordings.encode_to_h264 must be 0, 1 or 2".into(),
        ));
    }
    if cfg.encode_to_h264 > 0 {
        if cfg.h264_encoder.trim().is_empty() {
            return Err(CameraHubError::Config(
                "recordings.h264_encoder required when encode_to_h264 > 0".into(),
            ));
        }
        if cfg.bitrate < 1 {
            return Err(CameraHubError::Config(
                "recordings.bitrate must be >= 1 when encode_to_h264 > 0".into(),
            ));
        }
    }
    Ok(())
}

fn validate_logs(cfg: &LogsConfig) -> Result<()> {
    if !cfg.save {
        return Ok(());
    }
    if cfg.directory.trim().is_empty() {
        return Err(CameraHubError::Config("logs.directory is empty".into()));
    }
    if cfg.max_size_mb < 1 {
        return Err(CameraHubError::Config("logs.max_size_mb must be >= 1".into()));
    }
    if cfg.max_files < 1 {
        return Err(CameraHubError::Config("logs.max_files must be >= 1".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera(name: &str, port: u16) -> RawCameraConfig {
        RawCameraConfig {
            name: name.to_string(),
            camera: "/dev/video0".to_string(),
            target_fps: 10,
            port,
            stream_quality: 80,
            show_fps: true,
            source_format: "MJPG".to_string(),
            width: 1280,
            height: 720,
            source_fps: 30,
        }
    }

    #[test]
    fn normalize_name_is_idempotent() {
        let n = normalize_name("Front Door");
        assert_eq!(n, "front_door");
        assert_eq!(normalize_name(&n), n);
    }

    #[test]
    fn duplicate_port_is_rejected() {
        let mut cams = HashMap::new();
        cams.insert("cam1".to_string(), camera("Front", 8080));
        cams.insert("cam2".to_string(), camera("Back", 8080));
        let root = RootConfig {
            cameras: cams,
            recordings: RecordingsConfig::default(),
            motion: MotionSectionConfig::default(),
            logs: LogsConfig::default(),
        };

        let mut seen_ports: HashMap<u16, String> = HashMap::new();
        let mut dup = false;
        for (id, raw) in root.cameras.iter() {
            if seen_ports.insert(raw.port, id.clone()).is_some() {
                dup = true;
            }
        }
        assert!(dup);
    }

    #[test]
    fn invalid_camera_fails_validation_without_panicking() {
        let mut bad = camera("Bad", 8080);
        bad.target_fps = 0;
        assert!(validate_camera("bad", &bad).is_err());
    }
}
