//! Physics tunables and edge-force flags
//!
//! [`PhysicsConfig`] holds the scalar tunables consumed directly by the point
//! and edge passes. The boolean options that only the edge pass cares about
//! (`dissuadeHubs`, `linLog`) are packed into an [`EdgeFlags`] bitset, which is
//! what the edge kernel receives.
//!
//! Updates are partial: a [`PhysicsUpdate`] only touches the options it
//! names, and unrecognized option names are ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{LayoutError, LayoutResult};

/// Default repulsion scaling
pub const DEFAULT_SCALING_RATIO: f32 = 1.0;

/// Default gravity strength
pub const DEFAULT_GRAVITY: f32 = 1.0;

/// Default exponent applied to edge weights
pub const DEFAULT_EDGE_INFLUENCE: u32 = 0;

/// A boolean option of the edge pass, identified by its bit position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum EdgeFlag {
    /// Divide attraction by the source node's mass
    DissuadeHubs = 0,
    /// Logarithmic instead of linear attraction
    LinLog = 1,
}

impl EdgeFlag {
    /// Bit index inside [`EdgeFlags`]
    pub const fn bit(self) -> u32 {
        self as u32
    }

    pub const fn mask(self) -> u32 {
        1 << self.bit()
    }
}

/// Bitset of [`EdgeFlag`]s as consumed by the edge kernel
///
/// Bits that do not correspond to a known flag are preserved by every
/// operation, so a flag word handed over by another component survives a
/// round trip through `set`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EdgeFlags(u32);

impl EdgeFlags {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, flag: EdgeFlag) -> bool {
        self.0 & flag.mask() != 0
    }

    /// Turn a single flag on or off
    pub fn set(&mut self, flag: EdgeFlag, on: bool) {
        if on {
            self.0 |= flag.mask();
        } else {
            self.0 &= !flag.mask();
        }
    }

    #[must_use]
    pub fn with(mut self, flag: EdgeFlag, on: bool) -> Self {
        self.set(flag, on);
        self
    }
}

/// Scalar tunables and flags for one simulation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicsConfig {
    /// Repulsion grows as 1/d² instead of 1/d
    pub prevent_overlap: bool,
    /// Gravity grows linearly with distance from the center
    pub strong_gravity: bool,
    /// Repulsion strength
    pub scaling_ratio: f32,
    /// Gravity strength
    pub gravity: f32,
    /// Exponent applied to edge weights in the attraction term
    pub edge_influence: u32,
    /// Edge pass flags
    pub flags: EdgeFlags,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            prevent_overlap: false,
            strong_gravity: false,
            scaling_ratio: DEFAULT_SCALING_RATIO,
            gravity: DEFAULT_GRAVITY,
            edge_influence: DEFAULT_EDGE_INFLUENCE,
            flags: EdgeFlags::empty(),
        }
    }
}

impl PhysicsConfig {
    pub fn dissuade_hubs(&self) -> bool {
        self.flags.contains(EdgeFlag::DissuadeHubs)
    }

    pub fn lin_log(&self) -> bool {
        self.flags.contains(EdgeFlag::LinLog)
    }

    /// Merge an update into the configuration.
    ///
    /// Returns whether anything changed.
    pub fn apply(&mut self, update: &PhysicsUpdate) -> bool {
        let before = *self;

        if let Some(v) = update.prevent_overlap {
            self.prevent_overlap = v;
        }
        if let Some(v) = update.strong_gravity {
            self.strong_gravity = v;
        }
        if let Some(v) = update.scaling_ratio {
            self.scaling_ratio = v;
        }
        if let Some(v) = update.gravity {
            self.gravity = v;
        }
        if let Some(v) = update.edge_influence {
            self.edge_influence = v;
        }
        if let Some(v) = update.dissuade_hubs {
            self.flags.set(EdgeFlag::DissuadeHubs, v);
        }
        if let Some(v) = update.lin_log {
            self.flags.set(EdgeFlag::LinLog, v);
        }

        let changed = before != *self;
        if changed {
            info!(
                scaling_ratio = self.scaling_ratio,
                gravity = self.gravity,
                edge_influence = self.edge_influence,
                prevent_overlap = self.prevent_overlap,
                strong_gravity = self.strong_gravity,
                flags = self.flags.bits(),
                "physics updated"
            );
        }
        changed
    }
}

/// A partial physics configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhysicsUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prevent_overlap: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strong_gravity: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scaling_ratio: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gravity: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge_influence: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dissuade_hubs: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lin_log: Option<bool>,
}

impl PhysicsUpdate {
    /// Option names understood by [`PhysicsUpdate`]
    pub const KEYS: [&'static str; 7] = [
        "preventOverlap",
        "strongGravity",
        "scalingRatio",
        "gravity",
        "edgeInfluence",
        "dissuadeHubs",
        "linLog",
    ];

    /// Whether the update names no option at all
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Build an update from a JSON object.
    ///
    /// Unrecognized keys are skipped and returned so the caller can report
    /// them. A recognized key with a value of the wrong type is an error.
    pub fn from_json(value: &Value) -> LayoutResult<(Self, Vec<String>)> {
        let object = value.as_object().ok_or_else(|| {
            LayoutError::Config(format!("physics must be a JSON object, got {value}"))
        })?;

        let mut known = serde_json::Map::new();
        let mut ignored = Vec::new();
        for (key, val) in object {
            if Self::KEYS.contains(&key.as_str()) {
                known.insert(key.clone(), val.clone());
            } else {
                warn!(option = %key, "ignoring unrecognized physics option");
                ignored.push(key.clone());
            }
        }

        let update = serde_json::from_value(Value::Object(known))
            .map_err(|e| LayoutError::Config(format!("invalid physics option: {e}")))?;
        Ok((update, ignored))
    }

    pub fn with_flag(mut self, flag: EdgeFlag, on: bool) -> Self {
        match flag {
            EdgeFlag::DissuadeHubs => self.dissuade_hubs = Some(on),
            EdgeFlag::LinLog => self.lin_log = Some(on),
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flag_bits_match_positions() {
        assert_eq!(EdgeFlag::DissuadeHubs.mask(), 0b01);
        assert_eq!(EdgeFlag::LinLog.mask(), 0b10);
        let flags = EdgeFlags::empty()
            .with(EdgeFlag::LinLog, true)
            .with(EdgeFlag::DissuadeHubs, true);
        assert_eq!(flags.bits(), 0b11);
    }

    #[test]
    fn flags_toggle_independently_and_keep_unrelated_bits() {
        let mut flags = EdgeFlags::from_bits(0b1000_0010);
        flags.set(EdgeFlag::DissuadeHubs, true);
        assert_eq!(flags.bits(), 0b1000_0011);
        flags.set(EdgeFlag::LinLog, false);
        assert_eq!(flags.bits(), 0b1000_0001);
        flags.set(EdgeFlag::DissuadeHubs, false);
        assert_eq!(flags.bits(), 0b1000_0000);
    }

    #[test]
    fn empty_update_changes_nothing() {
        let mut config = PhysicsConfig {
            scaling_ratio: 3.0,
            ..PhysicsConfig::default()
        };
        let before = config;
        assert!(PhysicsUpdate::default().is_empty());
        assert!(!config.apply(&PhysicsUpdate::default()));
        assert_eq!(config, before);
    }

    #[test]
    fn dissuade_hubs_round_trip_restores_flags() {
        let mut config = PhysicsConfig::default();
        config.flags.set(EdgeFlag::LinLog, true);
        let original = config.flags;

        config.apply(&PhysicsUpdate::default().with_flag(EdgeFlag::DissuadeHubs, true));
        assert!(config.dissuade_hubs());
        assert!(config.lin_log());

        config.apply(&PhysicsUpdate::default().with_flag(EdgeFlag::DissuadeHubs, false));
        assert_eq!(config.flags, original);
    }

    #[test]
    fn json_update_ignores_unknown_keys() {
        let (update, ignored) = PhysicsUpdate::from_json(&json!({
            "gravity": 2.5,
            "linLog": true,
            "charge": -30,
        }))
        .unwrap();

        assert_eq!(update.gravity, Some(2.5));
        assert_eq!(update.lin_log, Some(true));
        assert_eq!(update.scaling_ratio, None);
        assert_eq!(ignored, vec!["charge".to_string()]);
    }

    #[test]
    fn json_update_with_only_unknown_keys_is_empty() {
        let (update, ignored) = PhysicsUpdate::from_json(&json!({"theta": 0.9})).unwrap();
        assert!(update.is_empty());
        assert_eq!(ignored.len(), 1);
    }

    #[test]
    fn json_update_rejects_wrong_types() {
        let err = PhysicsUpdate::from_json(&json!({"gravity": "strong"})).unwrap_err();
        assert!(matches!(err, LayoutError::Config(_)));
        assert!(PhysicsUpdate::from_json(&json!([1, 2])).is_err());
    }

    #[test]
    fn update_serializes_only_named_options() {
        let update = PhysicsUpdate {
            edge_influence: Some(1),
            ..PhysicsUpdate::default()
        };
        let json = serde_json::to_string(&update).unwrap();
        assert_eq!(json, r#"{"edgeInfluence":1}"#);
    }
}
