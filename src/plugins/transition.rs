// Transition planning & the per-tick interpolator runtime.
use bevy::pbr::{FogFalloff, FogSettings};
use bevy::prelude::*;

use crate::plugins::environment::ResolvedView;
use crate::plugins::library::{DEFAULT_FOG_END, DEFAULT_FOG_START};
use crate::plugins::sky::{self, DomeAlpha, PendingSkyFade, SkyState};
use crate::plugins::sun::{SunLight, SunSweep};

/// Fixed simulation step driving every interpolator.
pub const SIM_DT: f32 = 1.0 / 60.0;

/// Ambient brightness applied while ambient light is enabled; zero while a
/// blend sits at black.
pub const AMBIENT_BRIGHTNESS: f32 = 800.0;

/// The live light colors owned by the runtime. Enabled flags flip exactly
/// when a blend reaches or leaves black, so lights fade instead of snapping.
#[derive(Resource, Debug, Clone, PartialEq)]
pub struct LightState {
    pub ambient: LinearRgba,
    pub ambient_enabled: bool,
    pub sun: LinearRgba,
    pub sun_enabled: bool,
}

impl Default for LightState {
    fn default() -> Self {
        Self {
            ambient: LinearRgba::BLACK,
            ambient_enabled: false,
            sun: LinearRgba::BLACK,
            sun_enabled: false,
        }
    }
}

/// The live fog parameters owned by the runtime, mirrored onto camera fog
/// components each frame.
#[derive(Resource, Debug, Clone, PartialEq)]
pub struct FogState {
    pub color: LinearRgba,
    pub start: f32,
    pub end: f32,
    // 0 = linear falloff; > 0 = exponential-squared.
    pub density: f32,
    pub enabled: bool,
}

impl Default for FogState {
    fn default() -> Self {
        Self {
            color: LinearRgba::BLACK,
            start: 0.0,
            end: 0.0,
            density: 0.0,
            enabled: false,
        }
    }
}

fn is_black(c: LinearRgba) -> bool {
    c.red == 0.0 && c.green == 0.0 && c.blue == 0.0
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    if t >= 1.0 {
        b
    } else {
        a + (b - a) * t
    }
}

fn lerp_color(a: LinearRgba, b: LinearRgba, t: f32) -> LinearRgba {
    if t >= 1.0 {
        b
    } else {
        LinearRgba::new(
            lerp(a.red, b.red, t),
            lerp(a.green, b.green, t),
            lerp(a.blue, b.blue, t),
            lerp(a.alpha, b.alpha, t),
        )
    }
}

/// One timed value blend. The sky fade-out variant doubles as a finalizer:
/// it must detach its dome on completion or abort, otherwise an invisible
/// dome would be orphaned in the scene forever.
#[derive(Debug, Clone, PartialEq)]
pub enum Blend {
    Ambient { start: LinearRgba, end: LinearRgba },
    Sun { start: LinearRgba, end: LinearRgba },
    FogColor { start: LinearRgba, end: LinearRgba },
    FogStart { start: f32, end: f32 },
    FogEnd { start: f32, end: f32 },
    FogDensity { start: f32, end: f32 },
    // Fades the fog color's alpha out, then disables fog entirely.
    FogFade { start_alpha: f32 },
    SkyAlpha { dome: Entity, start: f32, end: f32 },
}

impl Blend {
    fn apply(
        &self,
        factor: f32,
        lights: &mut LightState,
        fog: &mut FogState,
        q_alpha: &mut Query<&mut DomeAlpha>,
        commands: &mut Commands,
    ) {
        match *self {
            Blend::Ambient { start, end } => {
                let c = lerp_color(start, end, factor);
                if is_black(c) && lights.ambient_enabled {
                    lights.ambient_enabled = false;
                } else if !is_black(c) && !lights.ambient_enabled {
                    lights.ambient_enabled = true;
                }
                lights.ambient = c;
            }
            Blend::Sun { start, end } => {
                let c = lerp_color(start, end, factor);
                if is_black(c) && lights.sun_enabled {
                    lights.sun_enabled = false;
                } else if !is_black(c) && !lights.sun_enabled {
                    lights.sun_enabled = true;
                }
                lights.sun = c;
            }
            Blend::FogColor { start, end } => fog.color = lerp_color(start, end, factor),
            Blend::FogStart { start, end } => fog.start = lerp(start, end, factor),
            Blend::FogEnd { start, end } => fog.end = lerp(start, end, factor),
            Blend::FogDensity { start, end } => fog.density = lerp(start, end, factor),
            Blend::FogFade { start_alpha } => {
                fog.color.alpha = start_alpha - start_alpha * factor;
                if factor >= 1.0 {
                    fog.enabled = false;
                }
            }
            Blend::SkyAlpha { dome, start, end } => {
                let a = lerp(start, end, factor);
                if let Ok(mut alpha) = q_alpha.get_mut(dome) {
                    alpha.0 = a;
                }
                if factor >= 1.0 && end == 0.0 {
                    sky::despawn_if_present(commands, dome);
                }
            }
        }
    }

    /// Run when the owning batch is replaced before this blend completed.
    /// Plain value blends stop where they are; the sky fade-out still has to
    /// detach its dome.
    fn abort(&self, commands: &mut Commands) {
        if let Blend::SkyAlpha { dome, end, .. } = *self {
            if end == 0.0 {
                info!("Removing sky dome on aborted fade-out");
                sky::despawn_if_present(commands, dome);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Interpolator {
    blend: Blend,
    elapsed: f32,
}

/// The single live transition batch. Starting a new batch aborts every
/// interpolator still running in the previous one; nothing is dropped
/// silently.
#[derive(Resource, Default)]
pub struct ActiveTransition {
    duration: f32,
    interps: Vec<Interpolator>,
}

impl ActiveTransition {
    pub fn duration(&self) -> f32 {
        self.duration
    }

    pub fn live(&self) -> usize {
        self.interps.len()
    }

    pub fn is_idle(&self) -> bool {
        self.interps.is_empty()
    }

    /// Add a blend to the batch. Late joiners (deferred sky fade-ins) track
    /// their own elapsed time against the batch duration.
    pub fn push(&mut self, blend: Blend) {
        self.interps.push(Interpolator { blend, elapsed: 0.0 });
    }

    fn abort_all(&mut self, commands: &mut Commands) {
        for interp in self.interps.drain(..) {
            interp.blend.abort(commands);
        }
    }
}

/// Build the transition batch for a resolved-chain change. Start values are
/// read from the live state, not from the previous configuration, so an
/// interrupted transition hands over its actual midpoint.
#[allow(clippy::too_many_arguments)]
pub fn plan_transition(
    commands: &mut Commands,
    view: &ResolvedView,
    transition: &mut ActiveTransition,
    lights: &mut LightState,
    fog: &mut FogState,
    sky_state: &mut SkyState,
    sweep: &mut SunSweep,
    dome_alpha: &Query<&DomeAlpha>,
    meshes: Option<&mut Assets<Mesh>>,
    materials: Option<&mut Assets<StandardMaterial>>,
    server: Option<&AssetServer>,
) {
    transition.abort_all(commands);
    // Duration comes from the target configuration, read once here.
    transition.duration = view.blend_time;

    // Lights: enable/disable is modeled as a blend to or from black.
    let current_ambient = if lights.ambient_enabled { lights.ambient } else { LinearRgba::BLACK };
    if current_ambient != view.ambient {
        transition.push(Blend::Ambient { start: current_ambient, end: view.ambient });
    }
    let current_sun = if lights.sun_enabled { lights.sun } else { LinearRgba::BLACK };
    if current_sun != view.sun {
        transition.push(Blend::Sun { start: current_sun, end: view.sun });
    }

    // Fog.
    let target_fog = view.fog.as_ref().filter(|f| f.enabled);
    match (fog.enabled, target_fog) {
        (true, None) => {
            transition.push(Blend::FogFade { start_alpha: fog.color.alpha });
        }
        (false, Some(t)) => {
            fog.color = LinearRgba::BLACK;
            fog.enabled = true;
            transition.push(Blend::FogStart { start: 0.0, end: t.start });
            if t.density > 0.0 {
                transition.push(Blend::FogEnd { start: 0.0, end: DEFAULT_FOG_END });
                transition.push(Blend::FogDensity { start: 0.0, end: t.density });
            } else {
                transition.push(Blend::FogEnd { start: 0.0, end: t.end });
            }
            transition.push(Blend::FogColor {
                start: LinearRgba::BLACK,
                end: t.color.to_linear(),
            });
        }
        (true, Some(t)) => {
            let target_color = t.color.to_linear();
            if fog.color != target_color {
                transition.push(Blend::FogColor { start: fog.color, end: target_color });
            }
            let (fog_start, fog_end) = if t.density > 0.0 {
                (DEFAULT_FOG_START, DEFAULT_FOG_END)
            } else {
                (t.start, t.end)
            };
            if fog.density != t.density {
                transition.push(Blend::FogDensity { start: fog.density, end: t.density });
            }
            if fog.start != fog_start {
                transition.push(Blend::FogStart { start: fog.start, end: fog_start });
            }
            if fog.end != fog_end {
                transition.push(Blend::FogEnd { start: fog.end, end: fog_end });
            }
        }
        (false, None) => {}
    }

    // Sky: fade the old dome out (finalizer detaches it) and build the new
    // dome immediately at alpha zero. Both fades run concurrently.
    if view.sky != sky_state.layers {
        if let Some(old) = sky_state.dome.take() {
            // The fade-out departs from the dome's live alpha; an interrupted
            // fade-in must not snap the dome back to full opacity first. A
            // still-deferred fade-in is cancelled outright, otherwise it would
            // join this batch and fight the fade-out once its textures load.
            if let Some(mut e) = commands.get_entity(old) {
                e.remove::<PendingSkyFade>();
            }
            let start = dome_alpha.get(old).map(|a| a.0).unwrap_or(1.0);
            transition.push(Blend::SkyAlpha { dome: old, start, end: 0.0 });
        }
        sky_state.layers = view.sky.clone();
        if !view.sky.is_empty() {
            let (dome, pending) = sky::spawn_dome(commands, &view.sky, meshes, materials, server);
            sky_state.dome = Some(dome);
            if pending.is_empty() {
                transition.push(Blend::SkyAlpha { dome, start: 0.0, end: 1.0 });
            } else {
                // Textures still loading: the fade-in joins the batch once
                // the handles are ready instead of fading in missing geometry.
                commands.entity(dome).insert(PendingSkyFade { textures: pending });
            }
        }
    }

    // Sun sweep bounds: only actual changes are written, since any write
    // restarts the sweep from its new start angle.
    if let Some(def) = &view.sweep {
        let bounds = (
            def.start_angle_deg.to_radians(),
            def.end_angle_deg.to_radians(),
        );
        if sweep.bounds() != bounds {
            sweep.set_bounds(bounds.0, bounds.1);
        }
        if sweep.cycle_duration() != def.duration {
            sweep.set_duration(def.duration);
        }
    }

    if !transition.is_idle() {
        info!(
            "Environment changed, running {} interpolators over {}s",
            transition.live(),
            transition.duration
        );
    }
}

/// Advance every live interpolator by the fixed step, apply its value and
/// retire it once its factor clamps to one.
pub fn tick_transition(
    mut commands: Commands,
    mut transition: ResMut<ActiveTransition>,
    mut lights: ResMut<LightState>,
    mut fog: ResMut<FogState>,
    mut q_alpha: Query<&mut DomeAlpha>,
) {
    if transition.interps.is_empty() {
        return;
    }
    let duration = transition.duration;
    let factor_of = |elapsed: f32| {
        if duration <= 0.0 {
            1.0
        } else {
            (elapsed / duration).min(1.0)
        }
    };
    for interp in &mut transition.interps {
        interp.elapsed += SIM_DT;
        interp
            .blend
            .apply(factor_of(interp.elapsed), &mut lights, &mut fog, &mut q_alpha, &mut commands);
    }
    transition.interps.retain(|i| factor_of(i.elapsed) < 1.0);
    if transition.interps.is_empty() {
        info!("Interpolators done");
    }
}

/// Mirror the runtime-owned light state onto Bevy's light sinks.
pub fn apply_light_state(
    lights: Res<LightState>,
    mut ambient: ResMut<AmbientLight>,
    mut q_sun: Query<(&mut DirectionalLight, &mut Visibility), With<SunLight>>,
) {
    if !lights.is_changed() {
        return;
    }
    ambient.color = Color::LinearRgba(lights.ambient);
    ambient.brightness = if lights.ambient_enabled { AMBIENT_BRIGHTNESS } else { 0.0 };
    for (mut light, mut visibility) in &mut q_sun {
        light.color = Color::LinearRgba(lights.sun);
        *visibility = if lights.sun_enabled {
            Visibility::Inherited
        } else {
            Visibility::Hidden
        };
    }
}

/// Mirror the runtime-owned fog state onto every camera fog component.
pub fn apply_fog_state(fog: Res<FogState>, mut q_fog: Query<&mut FogSettings>) {
    if !fog.is_changed() {
        return;
    }
    for mut settings in &mut q_fog {
        if fog.enabled {
            settings.color = Color::LinearRgba(fog.color);
            settings.falloff = if fog.density > 0.0 {
                FogFalloff::ExponentialSquared { density: fog.density }
            } else {
                FogFalloff::Linear { start: fog.start, end: fog.end }
            };
        } else {
            settings.color = Color::NONE;
        }
    }
}
