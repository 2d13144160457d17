// Environment definition library: key -> configuration table loaded from RON.
use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Fog start distance used when a configuration leaves it unset or when an
/// exponential fog forces the linear bounds back to defaults.
pub const DEFAULT_FOG_START: f32 = 0.2;
/// Fog end distance counterpart of [`DEFAULT_FOG_START`].
pub const DEFAULT_FOG_END: f32 = 0.7;
/// Blend duration applied when a configuration does not specify one.
pub const DEFAULT_BLEND_TIME: f32 = 5.0;

fn default_blend_time() -> f32 {
    DEFAULT_BLEND_TIME
}

fn default_true() -> bool {
    true
}

/// Plain RGB triple used in RON files (serde-friendly stand-in for color types).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ColorDef(pub f32, pub f32, pub f32);

impl ColorDef {
    pub fn to_linear(self) -> LinearRgba {
        LinearRgba::rgb(self.0, self.1, self.2)
    }
}

/// Day cycle phase. A selection without a phase resolves as `Day`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Phase {
    Dawn,
    Day,
    Dusk,
    Night,
}

/// The audio queues an environment can feed. Each kind maps to one looping
/// queue on the audio side; tracks are keyed by their asset path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaylistKind {
    AmbientMusic,
    ActivateMusic,
    AmbientNoise,
    AmbientSound,
}

impl PlaylistKind {
    pub const ALL: [PlaylistKind; 4] = [
        PlaylistKind::AmbientMusic,
        PlaylistKind::ActivateMusic,
        PlaylistKind::AmbientNoise,
        PlaylistKind::AmbientSound,
    ];

    /// Playback volume for tracks queued under this kind.
    pub fn gain(self) -> f32 {
        match self {
            PlaylistKind::AmbientMusic | PlaylistKind::ActivateMusic => 0.55,
            PlaylistKind::AmbientNoise => 0.8,
            PlaylistKind::AmbientSound => 0.9,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FogConfig {
    pub color: ColorDef,
    pub start: f32,
    pub end: f32,
    // 0 = linear fog; > 0 switches to exponential-squared falloff.
    #[serde(default)]
    pub density: f32,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// One dome shell. Layers are stacked slightly scaled so several can be
/// alpha-blended over each other (sky gradient, clouds, celestial bodies).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkyLayer {
    pub name: String,
    #[serde(default)]
    pub texture: Option<String>,
    pub color: ColorDef,
}

/// Bounds and duration for the directional light's angular sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SunSweepDef {
    pub start_angle_deg: f32,
    pub end_angle_deg: f32,
    pub duration: f32,
}

/// A leaf environment: concrete parameter values applied to the scene.
///
/// Every inheritable field is an `Option`; an unset field falls through to
/// the next configuration in the resolved chain, and to the engine defaults
/// (black light colors, no fog, no sky, no sweep) when no chain member
/// defines it. Playlists belong to the head configuration only and do not
/// inherit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    pub key: String,
    #[serde(default = "default_blend_time")]
    pub blend_time: f32,
    #[serde(default)]
    pub ambient: Option<ColorDef>,
    #[serde(default)]
    pub sun: Option<ColorDef>,
    #[serde(default)]
    pub fog: Option<FogConfig>,
    #[serde(default)]
    pub sky: Option<Vec<SkyLayer>>,
    #[serde(default)]
    pub sun_sweep: Option<SunSweepDef>,
    #[serde(default)]
    pub playlists: HashMap<PlaylistKind, Vec<String>>,
}

impl EnvironmentConfig {
    /// Empty configuration under `key`; fields are filled in by the caller
    /// (or by deserialization).
    pub fn named(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            blend_time: DEFAULT_BLEND_TIME,
            ambient: None,
            sun: None,
            fog: None,
            sky: None,
            sun_sweep: None,
            playlists: HashMap::new(),
        }
    }
}

/// A group environment: maps phases to leaf configuration keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupConfig {
    pub key: String,
    pub phases: HashMap<Phase, String>,
}

/// Tagged environment definition, selected once at resolution time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EnvironmentDef {
    Group(GroupConfig),
    Leaf(EnvironmentConfig),
}

impl EnvironmentDef {
    pub fn key(&self) -> &str {
        match self {
            EnvironmentDef::Group(g) => &g.key,
            EnvironmentDef::Leaf(c) => &c.key,
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, EnvironmentDef::Group(_))
    }
}

// ----------------------- Library (RON) -----------------------

#[derive(Debug, Deserialize)]
struct EnvironmentsFile {
    environments: Vec<EnvironmentDef>,
}

/// All known environment definitions, owned by the app (never a global).
///
/// Editing flows clone a definition out, mutate the detached copy, then put
/// it back with [`EnvironmentLibrary::commit`]; the resolver picks the new
/// content up on its next pass through deep chain comparison.
#[derive(Resource, Default)]
pub struct EnvironmentLibrary {
    defs: HashMap<String, EnvironmentDef>,
}

impl EnvironmentLibrary {
    pub fn insert(&mut self, def: EnvironmentDef) {
        self.defs.insert(def.key().to_string(), def);
    }

    pub fn get(&self, key: &str) -> Option<&EnvironmentDef> {
        self.defs.get(key)
    }

    pub fn is_group(&self, key: &str) -> bool {
        self.get(key).is_some_and(EnvironmentDef::is_group)
    }

    /// Lazily populate `key` using `build` if it is not present yet.
    pub fn load_or_insert_with(
        &mut self,
        key: &str,
        build: impl FnOnce() -> EnvironmentDef,
    ) -> &EnvironmentDef {
        if !self.defs.contains_key(key) {
            let def = build();
            self.defs.insert(key.to_string(), def);
        }
        &self.defs[key]
    }

    /// Atomic copy-back of an edited definition. Replaces the stored value
    /// under the edited key in one step; change notification happens on the
    /// next resolution pass.
    pub fn commit(&mut self, edited: EnvironmentDef) {
        self.insert(edited);
    }

    /// Sorted keys of all group environments.
    pub fn environments(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self
            .defs
            .values()
            .filter(|d| d.is_group())
            .map(|d| d.key())
            .collect();
        keys.sort_unstable();
        keys
    }

    /// Sorted keys of all leaf configurations.
    pub fn environment_configurations(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self
            .defs
            .values()
            .filter(|d| !d.is_group())
            .map(|d| d.key())
            .collect();
        keys.sort_unstable();
        keys
    }

    /// Parse a RON environments file and merge its definitions in. Later
    /// definitions override earlier ones under the same key.
    pub fn merge_ron(&mut self, data: &str) -> Result<usize, ron::error::SpannedError> {
        let file: EnvironmentsFile = ron::from_str(data)?;
        let count = file.environments.len();
        for def in file.environments {
            self.insert(def);
        }
        Ok(count)
    }
}

/// Load the default environments file from disk, falling back to the copy
/// embedded at compile time if the asset directory is not reachable.
pub fn load_environment_library(mut library: ResMut<EnvironmentLibrary>) {
    let data = std::fs::read_to_string("assets/environments/environments.ron")
        .unwrap_or_else(|_| include_str!("../../assets/environments/environments.ron").to_string());
    match library.merge_ron(&data) {
        Ok(count) => info!("Loaded {count} environment definitions"),
        Err(e) => error!("Failed to parse environments file: {e}"),
    }
}
