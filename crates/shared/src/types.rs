//! Value types carried inside bridge messages.
//!
//! These are pure data: avatar configuration, camera framing, snapshot
//! parameters and renderer telemetry. Field names serialize as camelCase to
//! match the guest renderer's wire vocabulary.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Protocol version announced by the guest in its `READY` event.
pub const PROTOCOL_VERSION: &str = "1.0.0";

/// Camera transition length used when a camera command omits `duration`.
pub const DEFAULT_CAMERA_TRANSITION_SECONDS: f64 = 0.8;

/// Snapshot quality used when `TAKE_SNAPSHOT` omits `quality`.
pub const DEFAULT_SNAPSHOT_QUALITY: f64 = 0.92;

/// Returns true when `version` shares a major version with [`PROTOCOL_VERSION`].
///
/// Unparsable versions are treated as incompatible.
pub fn is_compatible_version(version: &str) -> bool {
    fn major(v: &str) -> Option<u64> {
        v.trim().trim_start_matches('v').split('.').next()?.parse().ok()
    }
    match (major(version), major(PROTOCOL_VERSION)) {
        (Some(theirs), Some(ours)) => theirs == ours,
        _ => false,
    }
}

// =============================================================================
// Avatar Configuration
// =============================================================================

/// Avatar appearance configuration.
///
/// The same shape carries a full configuration (`INIT_AVATAR`) and a partial
/// delta (`UPDATE_CONFIG`): absent fields mean "unchanged". Keys the schema
/// does not know about are preserved in `extra` so newer hosts can drive
/// newer renderers through an older bridge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvatarConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skin_tone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hair_style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hair_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outfit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accessories: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    /// Keys not modelled above.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl AvatarConfig {
    /// Overwrite every field present in `delta`, leaving the rest untouched.
    pub fn merge(&mut self, delta: &AvatarConfig) {
        overwrite(&mut self.avatar_id, &delta.avatar_id);
        overwrite(&mut self.body_type, &delta.body_type);
        overwrite(&mut self.skin_tone, &delta.skin_tone);
        overwrite(&mut self.hair_style, &delta.hair_style);
        overwrite(&mut self.hair_color, &delta.hair_color);
        overwrite(&mut self.outfit, &delta.outfit);
        overwrite(&mut self.accessories, &delta.accessories);
        overwrite(&mut self.background, &delta.background);
        for (key, value) in &delta.extra {
            self.extra.insert(key.clone(), value.clone());
        }
    }

    /// True when no field is set.
    pub fn is_empty(&self) -> bool {
        self.avatar_id.is_none()
            && self.body_type.is_none()
            && self.skin_tone.is_none()
            && self.hair_style.is_none()
            && self.hair_color.is_none()
            && self.outfit.is_none()
            && self.accessories.is_none()
            && self.background.is_none()
            && self.extra.is_empty()
    }
}

fn overwrite<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
    if let Some(value) = value {
        *slot = Some(value.clone());
    }
}

// =============================================================================
// Camera
// =============================================================================

/// A point or direction in renderer world space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Named camera framings understood by the guest renderer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraPreset {
    #[default]
    Default,
    Front,
    Side,
    Back,
    Closeup,
    FullBody,
}

impl CameraPreset {
    /// Position, look-at target and vertical field of view for this preset.
    pub const fn framing(self) -> (Vec3, Vec3, f64) {
        match self {
            CameraPreset::Default => (Vec3::new(0.0, 1.4, 3.2), Vec3::new(0.0, 1.0, 0.0), 40.0),
            CameraPreset::Front => (Vec3::new(0.0, 1.5, 2.4), Vec3::new(0.0, 1.3, 0.0), 35.0),
            CameraPreset::Side => (Vec3::new(2.6, 1.4, 0.0), Vec3::new(0.0, 1.1, 0.0), 40.0),
            CameraPreset::Back => (Vec3::new(0.0, 1.4, -3.0), Vec3::new(0.0, 1.1, 0.0), 40.0),
            CameraPreset::Closeup => (Vec3::new(0.0, 1.6, 0.9), Vec3::new(0.0, 1.55, 0.0), 30.0),
            CameraPreset::FullBody => (Vec3::new(0.0, 1.0, 4.2), Vec3::new(0.0, 0.9, 0.0), 45.0),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CameraPreset::Default => "default",
            CameraPreset::Front => "front",
            CameraPreset::Side => "side",
            CameraPreset::Back => "back",
            CameraPreset::Closeup => "closeup",
            CameraPreset::FullBody => "full_body",
        }
    }
}

/// Fully resolved camera move handed to the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraTarget {
    pub position: Vec3,
    pub target: Vec3,
    pub fov: f64,
    pub duration_seconds: f64,
}

impl CameraTarget {
    /// Resolve a camera command into a concrete move.
    ///
    /// Explicit `position`/`target`/`fov` win over the preset's framing; a
    /// missing preset falls back to [`CameraPreset::Default`].
    pub fn resolve(
        preset: Option<CameraPreset>,
        position: Option<Vec3>,
        target: Option<Vec3>,
        fov: Option<f64>,
        duration: Option<f64>,
    ) -> Self {
        let (preset_position, preset_target, preset_fov) = preset.unwrap_or_default().framing();
        Self {
            position: position.unwrap_or(preset_position),
            target: target.unwrap_or(preset_target),
            fov: fov.unwrap_or(preset_fov),
            duration_seconds: duration
                .filter(|d| d.is_finite())
                .map(|d| d.max(0.0))
                .unwrap_or(DEFAULT_CAMERA_TRANSITION_SECONDS),
        }
    }

    pub fn is_animated(&self) -> bool {
        self.duration_seconds > 0.0
    }
}

// =============================================================================
// Snapshots
// =============================================================================

/// Image encoding for captured frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotFormat {
    #[default]
    Png,
    Jpeg,
    Webp,
}

impl SnapshotFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            SnapshotFormat::Png => "image/png",
            SnapshotFormat::Jpeg => "image/jpeg",
            SnapshotFormat::Webp => "image/webp",
        }
    }
}

/// Parameters of a frame capture request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotOptions {
    #[serde(default)]
    pub format: SnapshotFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default)]
    pub transparent: bool,
}

impl SnapshotOptions {
    pub fn png() -> Self {
        Self::default()
    }

    /// Requested quality clamped to `0.0..=1.0`, or the default.
    pub fn effective_quality(&self) -> f64 {
        self.quality
            .filter(|q| q.is_finite())
            .map(|q| q.clamp(0.0, 1.0))
            .unwrap_or(DEFAULT_SNAPSHOT_QUALITY)
    }
}

/// A captured frame, base64-encoded inline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub base64: String,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub format: SnapshotFormat,
}

impl Snapshot {
    /// Encode raw image bytes into a snapshot payload.
    pub fn from_bytes(bytes: &[u8], width: u32, height: u32, format: SnapshotFormat) -> Self {
        Self {
            base64: STANDARD.encode(bytes),
            width,
            height,
            format,
        }
    }

    /// Decode the inline payload. Accepts an optional `data:` URL prefix.
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        let payload = match self.base64.split_once(";base64,") {
            Some((_, data)) => data,
            None => self.base64.as_str(),
        };
        STANDARD.decode(payload)
    }

    /// `data:` URL suitable for an image view.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.format.mime_type(), self.base64)
    }
}

// =============================================================================
// Telemetry
// =============================================================================

/// Periodic renderer performance sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerfReport {
    pub fps: f64,
    pub frame_time_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draw_calls: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triangles: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_overwrites_only_present_fields() {
        let mut config = AvatarConfig {
            avatar_id: Some("fox".into()),
            outfit: Some("hoodie".into()),
            hair_color: Some("black".into()),
            ..Default::default()
        };
        let mut delta = AvatarConfig {
            outfit: Some("raincoat".into()),
            ..Default::default()
        };
        delta
            .extra
            .insert("glowIntensity".into(), serde_json::json!(0.4));

        config.merge(&delta);

        assert_eq!(config.avatar_id.as_deref(), Some("fox"));
        assert_eq!(config.outfit.as_deref(), Some("raincoat"));
        assert_eq!(config.hair_color.as_deref(), Some("black"));
        assert_eq!(config.extra.get("glowIntensity"), Some(&serde_json::json!(0.4)));
    }

    #[test]
    fn unknown_config_keys_survive_a_round_trip() {
        let raw = r#"{"outfit":"hoodie","sparkles":true}"#;
        let config: AvatarConfig = serde_json::from_str(raw).expect("deserialize");
        assert_eq!(config.extra.get("sparkles"), Some(&serde_json::json!(true)));

        let back = serde_json::to_value(&config).expect("serialize");
        assert_eq!(back, serde_json::json!({"outfit": "hoodie", "sparkles": true}));
    }

    #[test]
    fn explicit_camera_position_overrides_preset() {
        let position = Vec3::new(1.0, 2.0, 3.0);
        let resolved = CameraTarget::resolve(
            Some(CameraPreset::Closeup),
            Some(position),
            None,
            None,
            Some(0.0),
        );
        let (_, closeup_target, closeup_fov) = CameraPreset::Closeup.framing();

        assert_eq!(resolved.position, position);
        assert_eq!(resolved.target, closeup_target);
        assert_eq!(resolved.fov, closeup_fov);
        assert!(!resolved.is_animated());
    }

    #[test]
    fn camera_duration_defaults_and_clamps() {
        let default = CameraTarget::resolve(None, None, None, None, None);
        assert_eq!(default.duration_seconds, DEFAULT_CAMERA_TRANSITION_SECONDS);

        let negative = CameraTarget::resolve(None, None, None, None, Some(-2.0));
        assert_eq!(negative.duration_seconds, 0.0);
    }

    #[test]
    fn snapshot_quality_is_clamped() {
        let options = SnapshotOptions {
            quality: Some(1.7),
            ..SnapshotOptions::png()
        };
        assert_eq!(options.effective_quality(), 1.0);
        assert_eq!(SnapshotOptions::png().effective_quality(), DEFAULT_SNAPSHOT_QUALITY);
    }

    #[test]
    fn snapshot_decodes_plain_and_data_url_payloads() {
        let snapshot = Snapshot::from_bytes(b"frame", 2, 2, SnapshotFormat::Png);
        assert_eq!(snapshot.decode().expect("decode"), b"frame");

        let as_url = Snapshot {
            base64: snapshot.data_url(),
            ..snapshot.clone()
        };
        assert_eq!(as_url.decode().expect("decode"), b"frame");
    }

    #[test]
    fn version_compatibility_compares_major_only() {
        assert!(is_compatible_version("1.0.0"));
        assert!(is_compatible_version("1.4.2"));
        assert!(!is_compatible_version("2.0.0"));
        assert!(!is_compatible_version("garbage"));
    }
}
