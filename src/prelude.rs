//! Convenience re-exports for frequently used types & plugins.
pub use crate::plugins::audio::{AudioState, PlaylistTrack};
pub use crate::plugins::environment::{
    EnvPriority, EnvironmentChanged, EnvironmentPlugin, EnvironmentSettings, EnvironmentSwitcher,
    PhaseChanged, ResolveError, ResolveFailed, ResolvedConfigurationChanged, ResolvedView,
    Selection,
};
pub use crate::plugins::library::{
    ColorDef, EnvironmentConfig, EnvironmentDef, EnvironmentLibrary, FogConfig, GroupConfig, Phase,
    PlaylistKind, SkyLayer, SunSweepDef, DEFAULT_BLEND_TIME, DEFAULT_FOG_END, DEFAULT_FOG_START,
};
pub use crate::plugins::scene::ScenePlugin;
pub use crate::plugins::sky::{DomeAlpha, PendingSkyFade, SkyDomeRoot, SkyState};
pub use crate::plugins::sun::{SunLight, SunSweep};
pub use crate::plugins::transition::{ActiveTransition, Blend, FogState, LightState, SIM_DT};
