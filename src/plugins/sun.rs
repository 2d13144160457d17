// Throttled angular sweep of the directional light position.
use bevy::prelude::*;

use crate::plugins::transition::SIM_DT;

/// Marks the directional light entity driven by the engine.
#[derive(Component)]
pub struct SunLight;

/// Distance the light is kept from the origin while sweeping.
pub const SUN_DISTANCE: f32 = 3000.0;
/// Minimum time between light position writes. Position sweeps span whole
/// day cycles, so they update far less often than color blends tick.
pub const SUN_POSITION_UPDATE_INTERVAL: f32 = 0.25;

/// Time-driven angular position state, decoupled from the blend runtime:
/// position sweeps across the full cycle duration while colors blend only
/// in the short window after a configuration change.
#[derive(Resource, Debug, Clone, PartialEq)]
pub struct SunSweep {
    start_angle: f32,
    end_angle: f32,
    duration: f32,
    progress: f32,
    update_interval: f32,
    since_last_update: f32,
}

impl Default for SunSweep {
    fn default() -> Self {
        Self {
            start_angle: 0.0,
            end_angle: std::f32::consts::PI,
            duration: 600.0,
            progress: 0.0,
            update_interval: SUN_POSITION_UPDATE_INTERVAL,
            since_last_update: 0.0,
        }
    }
}

impl SunSweep {
    pub fn bounds(&self) -> (f32, f32) {
        (self.start_angle, self.end_angle)
    }

    pub fn cycle_duration(&self) -> f32 {
        self.duration
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    /// Angle for the current progress. Writing any bound or the duration
    /// restarts the sweep, so a partial sweep never continues between stale
    /// bounds.
    pub fn current_angle(&self) -> f32 {
        if self.duration <= 0.0 {
            return self.end_angle;
        }
        self.start_angle + (self.end_angle - self.start_angle) * (self.progress / self.duration)
    }

    pub fn set_bounds(&mut self, start_angle: f32, end_angle: f32) {
        self.start_angle = start_angle;
        self.end_angle = end_angle;
        self.progress = 0.0;
    }

    pub fn set_duration(&mut self, duration: f32) {
        self.duration = duration;
        self.progress = 0.0;
    }

    fn advance(&mut self, dt: f32) -> bool {
        self.progress = (self.progress + dt).min(self.duration);
        self.since_last_update += dt;
        if self.since_last_update > self.update_interval {
            self.since_last_update = 0.0;
            true
        } else {
            false
        }
    }
}

/// Advance the sweep each tick but only touch the light transform when the
/// throttle interval has elapsed.
pub fn sweep_sun(
    mut sweep: ResMut<SunSweep>,
    mut q_sun: Query<&mut Transform, With<SunLight>>,
) {
    if !sweep.advance(SIM_DT) {
        return;
    }
    let angle = sweep.current_angle();
    let position = Quat::from_rotation_y(-angle) * Vec3::new(-SUN_DISTANCE, 0.0, 0.0);
    for mut transform in &mut q_sun {
        *transform = Transform::from_translation(position).looking_at(Vec3::ZERO, Vec3::Y);
    }
}
