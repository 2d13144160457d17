// Demo scene: a ground plane, a camera with fog, the swept sun light and
// keyboard bindings for switching environments and phases.
use bevy::math::primitives::Cuboid;
use bevy::pbr::FogSettings;
use bevy::prelude::*;

use crate::plugins::environment::{EnvPriority, EnvironmentSettings, EnvironmentSwitcher};
use crate::plugins::library::{load_environment_library, EnvironmentLibrary, Phase};
use crate::plugins::sun::SunLight;

pub struct ScenePlugin;

impl Plugin for ScenePlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, (load_environment_library, setup_scene).chain())
            .add_systems(Update, handle_keys);
    }
}

fn setup_scene(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    mut switcher: ResMut<EnvironmentSwitcher>,
) {
    commands.spawn((
        Camera3dBundle {
            transform: Transform::from_xyz(-20.0, 12.0, 28.0)
                .looking_at(Vec3::new(0.0, 2.0, 0.0), Vec3::Y),
            ..default()
        },
        FogSettings::default(),
    ));

    commands.spawn((
        DirectionalLightBundle {
            directional_light: DirectionalLight {
                illuminance: 40_000.0,
                shadows_enabled: true,
                ..default()
            },
            transform: Transform::from_xyz(-3000.0, 0.0, 0.0).looking_at(Vec3::ZERO, Vec3::Y),
            ..default()
        },
        SunLight,
    ));

    commands.spawn(PbrBundle {
        mesh: meshes.add(Mesh::from(Cuboid { half_size: Vec3::new(400.0, 0.5, 400.0) })),
        material: materials.add(StandardMaterial {
            base_color: Color::srgb(0.25, 0.4, 0.2),
            perceptual_roughness: 0.95,
            ..default()
        }),
        transform: Transform::from_xyz(0.0, -0.5, 0.0),
        ..default()
    });

    switcher.set_environment(EnvPriority::Global, Some("Coastal"), Some(Phase::Day));
}

fn handle_keys(
    keys: Res<ButtonInput<KeyCode>>,
    library: Res<EnvironmentLibrary>,
    mut switcher: ResMut<EnvironmentSwitcher>,
    mut settings: ResMut<EnvironmentSettings>,
) {
    for (key, phase) in [
        (KeyCode::Digit1, Phase::Dawn),
        (KeyCode::Digit2, Phase::Day),
        (KeyCode::Digit3, Phase::Dusk),
        (KeyCode::Digit4, Phase::Night),
    ] {
        if keys.just_pressed(key) {
            switcher.set_phase(phase);
        }
    }
    if keys.just_pressed(KeyCode::KeyS) {
        // User override with a standalone leaf configuration.
        switcher.set_environment(EnvPriority::User, Some("StormFront"), None);
    }
    if keys.just_pressed(KeyCode::KeyC) {
        switcher.set_environment(EnvPriority::User, None::<String>, None);
    }
    if keys.just_pressed(KeyCode::KeyF) {
        switcher.force_reapply();
    }
    if keys.just_pressed(KeyCode::KeyM) {
        settings.audio_enabled = !settings.audio_enabled;
        info!("Audio enabled: {}", settings.audio_enabled);
    }
    if keys.just_pressed(KeyCode::KeyL) {
        info!("Environments: {:?}", library.environments());
        info!(
            "Configurations: {:?}",
            library.environment_configurations()
        );
    }
    if keys.just_pressed(KeyCode::KeyV) {
        settings.follow_camera = !settings.follow_camera;
        info!("Follow camera: {}", settings.follow_camera);
    }
}
