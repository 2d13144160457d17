// Priority-ordered environment resolution & change detection.
use bevy::ecs::system::SystemParam;
use bevy::prelude::*;
use bevy::time::Fixed;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::plugins::audio::{update_playlists, AudioState, PlaylistTrack};
use crate::plugins::library::{
    EnvironmentConfig, EnvironmentDef, EnvironmentLibrary, FogConfig, Phase, SkyLayer, SunSweepDef,
};
use crate::plugins::sky::{self, DomeAlpha, SkyState};
use crate::plugins::sun::SunSweep;
use crate::plugins::transition::{self, ActiveTransition, FogState, LightState};

/// Priority classes for environment selections, most specific first. The
/// lowest active ordinal wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EnvPriority {
    Editing,
    User,
    Preview,
    Object,
    Region,
    Server,
    Global,
}

/// One priority level's requested environment: a definition key plus an
/// optional phase (meaningful for group definitions only).
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub phase: Option<Phase>,
    pub environment: String,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ResolveError {
    #[error("no environment registered under key {0}")]
    UnknownEnvironment(String),
    #[error("environment {environment} has no configuration for phase {phase:?}")]
    MissingPhase { environment: String, phase: Phase },
    #[error("no environment configuration {key} (wanted for phase {phase:?})")]
    UnknownConfiguration { key: String, phase: Option<Phase> },
    #[error("{0} is a group and cannot be used as a configuration")]
    GroupAsConfiguration(String),
}

// ----------------------- Events -----------------------

/// The group environment identifier changed (None = a leaf key or nothing
/// is selected).
#[derive(Event, Debug, Clone, PartialEq)]
pub struct EnvironmentChanged(pub Option<String>);

#[derive(Event, Debug, Clone, PartialEq)]
pub struct PhaseChanged(pub Option<Phase>);

/// The head of the resolved chain changed (None = no active selection).
#[derive(Event, Debug, Clone, PartialEq)]
pub struct ResolvedConfigurationChanged(pub Option<EnvironmentConfig>);

/// A resolution pass failed; previously applied state is left untouched.
#[derive(Event, Debug, Clone, PartialEq)]
pub struct ResolveFailed(pub String);

// ----------------------- Switcher -----------------------

/// Runtime toggles mirrored onto the environment implementation.
#[derive(Resource, Debug, Clone, PartialEq)]
pub struct EnvironmentSettings {
    pub follow_camera: bool,
    pub audio_enabled: bool,
}

impl Default for EnvironmentSettings {
    fn default() -> Self {
        Self { follow_camera: true, audio_enabled: true }
    }
}

/// Holds the per-priority selections and the cached outcome of the last
/// successful resolution. All queries are O(1) reads of cached state.
#[derive(Resource, Default)]
pub struct EnvironmentSwitcher {
    selections: BTreeMap<EnvPriority, Selection>,
    environment: Option<String>,
    environment_configuration: Option<String>,
    last_phase: Option<Phase>,
    chain: Vec<EnvironmentConfig>,
    force: bool,
}

impl EnvironmentSwitcher {
    /// Insert or replace the selection at `priority`; `None` removes it.
    /// Takes effect on the next fixed tick, which is how asynchronous
    /// callers are marshaled onto the frame.
    pub fn set_environment(
        &mut self,
        priority: EnvPriority,
        environment: Option<impl Into<String>>,
        phase: Option<Phase>,
    ) {
        match environment {
            Some(env) => {
                self.selections
                    .insert(priority, Selection { phase, environment: env.into() });
            }
            None => {
                self.selections.remove(&priority);
            }
        }
    }

    /// Phase of the highest-priority active selection.
    pub fn phase(&self) -> Option<Phase> {
        self.selections.values().next().and_then(|s| s.phase)
    }

    /// Rewrite the phase of the current highest-priority selection only.
    /// Which environment is selected never changes here; only which member
    /// of a group configuration is chosen.
    pub fn set_phase(&mut self, phase: Phase) {
        if self.phase() == Some(phase) {
            return;
        }
        if let Some(top) = self.selections.values_mut().next() {
            top.phase = Some(phase);
        }
    }

    /// Force a planner pass on the next resolution even if the chain is
    /// structurally unchanged.
    pub fn force_reapply(&mut self) {
        self.force = true;
    }

    /// Key of the current group environment, if the winning selection named
    /// a group.
    pub fn environment(&self) -> Option<&str> {
        self.environment.as_deref()
    }

    /// Key of the current leaf configuration, if the winning selection named
    /// a leaf directly.
    pub fn environment_configuration(&self) -> Option<&str> {
        self.environment_configuration.as_deref()
    }

    /// Head of the last successfully resolved chain.
    pub fn current_configuration(&self) -> Option<&EnvironmentConfig> {
        self.chain.first()
    }

    pub fn current_chain(&self) -> &[EnvironmentConfig] {
        &self.chain
    }

    pub fn selections(&self) -> &BTreeMap<EnvPriority, Selection> {
        &self.selections
    }
}

// ----------------------- Resolution -----------------------

/// Outcome of one resolution pass over the selections.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Resolution {
    pub environment: Option<String>,
    pub environment_configuration: Option<String>,
    pub phase: Option<Phase>,
    pub chain: Vec<EnvironmentConfig>,
}

/// Walk the selections in priority order and resolve every one of them to a
/// concrete leaf configuration. The first selection decides the externally
/// visible identifier; the rest stay in the chain for field inheritance.
pub fn resolve_chain(
    selections: &BTreeMap<EnvPriority, Selection>,
    library: &EnvironmentLibrary,
) -> Result<Resolution, ResolveError> {
    let mut r = Resolution {
        phase: selections.values().next().and_then(|s| s.phase),
        ..Default::default()
    };
    for sel in selections.values() {
        match library.get(&sel.environment) {
            Some(EnvironmentDef::Group(group)) => {
                if r.environment.is_none() && r.environment_configuration.is_none() {
                    r.environment = Some(group.key.clone());
                }
                let phase = sel.phase.unwrap_or(Phase::Day);
                // A phase missing from the group map is an authoring error;
                // falling back silently would render the wrong sky.
                let leaf_key = group.phases.get(&phase).ok_or(ResolveError::MissingPhase {
                    environment: group.key.clone(),
                    phase,
                })?;
                match library.get(leaf_key) {
                    Some(EnvironmentDef::Leaf(cfg)) => r.chain.push(cfg.clone()),
                    Some(EnvironmentDef::Group(_)) => {
                        return Err(ResolveError::GroupAsConfiguration(leaf_key.clone()))
                    }
                    None => {
                        return Err(ResolveError::UnknownConfiguration {
                            key: leaf_key.clone(),
                            phase: Some(phase),
                        })
                    }
                }
            }
            Some(EnvironmentDef::Leaf(cfg)) => {
                if r.environment.is_none() && r.environment_configuration.is_none() {
                    r.environment_configuration = Some(cfg.key.clone());
                }
                r.chain.push(cfg.clone());
            }
            None => return Err(ResolveError::UnknownEnvironment(sel.environment.clone())),
        }
    }
    Ok(r)
}

/// Target values for every parameter the engine drives, after resolving
/// inheritance through the chain and applying the engine defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedView {
    pub ambient: LinearRgba,
    pub sun: LinearRgba,
    pub fog: Option<FogConfig>,
    pub sky: Vec<SkyLayer>,
    pub sweep: Option<SunSweepDef>,
    pub blend_time: f32,
}

impl ResolvedView {
    pub fn from_chain(chain: &[EnvironmentConfig]) -> Self {
        Self {
            ambient: chain
                .iter()
                .find_map(|c| c.ambient)
                .map(|c| c.to_linear())
                .unwrap_or(LinearRgba::BLACK),
            sun: chain
                .iter()
                .find_map(|c| c.sun)
                .map(|c| c.to_linear())
                .unwrap_or(LinearRgba::BLACK),
            fog: chain.iter().find_map(|c| c.fog.clone()),
            sky: chain.iter().find_map(|c| c.sky.clone()).unwrap_or_default(),
            sweep: chain.iter().find_map(|c| c.sun_sweep.clone()),
            blend_time: chain.first().map(|c| c.blend_time).unwrap_or_default(),
        }
    }

    /// The all-defaults view used to fade everything out when the last
    /// selection is removed.
    pub fn cleared() -> Self {
        Self {
            ambient: LinearRgba::BLACK,
            sun: LinearRgba::BLACK,
            fog: None,
            sky: Vec::new(),
            sweep: None,
            blend_time: 0.0,
        }
    }
}

// ----------------------- System -----------------------

/// The live parameter state owned by the transition engine, plus the audio
/// track entities it manages.
#[derive(SystemParam)]
pub struct EnvironmentSinks<'w, 's> {
    pub lights: ResMut<'w, LightState>,
    pub fog: ResMut<'w, FogState>,
    pub sky: ResMut<'w, SkyState>,
    pub sweep: ResMut<'w, SunSweep>,
    pub audio: ResMut<'w, AudioState>,
    pub tracks: Query<'w, 's, (Entity, &'static PlaylistTrack)>,
    pub dome_alpha: Query<'w, 's, &'static DomeAlpha>,
}

/// Asset facilities used to build sky geometry. All optional so the engine
/// runs headless (tests, servers) without asset plugins.
#[derive(SystemParam)]
pub struct SkyAssets<'w> {
    pub meshes: Option<ResMut<'w, Assets<Mesh>>>,
    pub materials: Option<ResMut<'w, Assets<StandardMaterial>>>,
    pub server: Option<Res<'w, AssetServer>>,
}

#[derive(SystemParam)]
pub struct EnvironmentEvents<'w> {
    pub environment: EventWriter<'w, EnvironmentChanged>,
    pub phase: EventWriter<'w, PhaseChanged>,
    pub configuration: EventWriter<'w, ResolvedConfigurationChanged>,
    pub failed: EventWriter<'w, ResolveFailed>,
}

/// Once-per-tick resolution pass. Rebuilds the chain from the current
/// selections, compares it by value against the previous chain, and plans a
/// transition batch on structural change. A failed pass reports the error
/// and leaves all applied state untouched.
pub fn resolve_environments(
    mut commands: Commands,
    mut switcher: ResMut<EnvironmentSwitcher>,
    library: Res<EnvironmentLibrary>,
    settings: Res<EnvironmentSettings>,
    mut transition: ResMut<ActiveTransition>,
    mut sinks: EnvironmentSinks,
    mut assets: SkyAssets,
    mut events: EnvironmentEvents,
) {
    let resolved = match resolve_chain(switcher.selections(), &library) {
        Ok(r) => r,
        Err(e) => {
            error!("Environment resolution failed: {e}");
            events.failed.send(ResolveFailed(e.to_string()));
            return;
        }
    };

    let changed = switcher.force || resolved.chain != switcher.chain;
    if changed {
        let view = if resolved.chain.is_empty() {
            info!("No environments, fading out");
            ResolvedView::cleared()
        } else {
            let head = &resolved.chain[0];
            info!(
                "Switching to highest priority environment {} (blend {})",
                head.key, head.blend_time
            );
            ResolvedView::from_chain(&resolved.chain)
        };
        transition::plan_transition(
            &mut commands,
            &view,
            &mut transition,
            &mut sinks.lights,
            &mut sinks.fog,
            &mut sinks.sky,
            &mut sinks.sweep,
            &sinks.dome_alpha,
            assets.meshes.as_deref_mut(),
            assets.materials.as_deref_mut(),
            assets.server.as_deref(),
        );
        let playlists = resolved
            .chain
            .first()
            .filter(|_| settings.audio_enabled)
            .map(|c| &c.playlists);
        update_playlists(
            &mut commands,
            &mut sinks.audio,
            playlists,
            assets.server.as_deref(),
            &sinks.tracks,
        );
    }

    if resolved.chain.first() != switcher.chain.first() {
        events
            .configuration
            .send(ResolvedConfigurationChanged(resolved.chain.first().cloned()));
    }
    if resolved.environment != switcher.environment {
        events
            .environment
            .send(EnvironmentChanged(resolved.environment.clone()));
    }
    if resolved.phase != switcher.last_phase {
        events.phase.send(PhaseChanged(resolved.phase));
    }

    switcher.environment = resolved.environment;
    switcher.environment_configuration = resolved.environment_configuration;
    switcher.last_phase = resolved.phase;
    switcher.chain = resolved.chain;
    switcher.force = false;
}

// ----------------------- Plugin -----------------------

/// Wires the resolver, the transition runtime, the sun sweep, the sky dome
/// upkeep and the playlist forwarding into an app.
pub struct EnvironmentPlugin;

impl Plugin for EnvironmentPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<EnvironmentLibrary>()
            .init_resource::<EnvironmentSwitcher>()
            .init_resource::<EnvironmentSettings>()
            .init_resource::<ActiveTransition>()
            .init_resource::<LightState>()
            .init_resource::<FogState>()
            .init_resource::<SkyState>()
            .init_resource::<AudioState>()
            .init_resource::<SunSweep>()
            .init_resource::<AmbientLight>()
            .insert_resource(Time::<Fixed>::from_hz(60.0))
            .add_event::<EnvironmentChanged>()
            .add_event::<PhaseChanged>()
            .add_event::<ResolvedConfigurationChanged>()
            .add_event::<ResolveFailed>()
            .add_systems(
                FixedUpdate,
                (
                    resolve_environments,
                    transition::tick_transition,
                    crate::plugins::sun::sweep_sun,
                )
                    .chain(),
            )
            .add_systems(
                Update,
                (
                    transition::apply_light_state,
                    transition::apply_fog_state,
                    sky::apply_dome_alpha,
                    sky::poll_pending_fades,
                    sky::track_camera,
                    crate::plugins::audio::sync_audio_enabled,
                ),
            );
    }
}
