// Sky dome construction, alpha application and camera tracking.
use bevy::pbr::NotShadowCaster;
use bevy::prelude::*;
use bevy::render::mesh::{Indices, PrimitiveTopology};
use bevy::render::render_asset::RenderAssetUsages;

use crate::plugins::environment::EnvironmentSettings;
use crate::plugins::library::SkyLayer;
use crate::plugins::transition::{ActiveTransition, Blend};

pub const DOME_RADIUS: f32 = 1500.0;
// Shrink factor between stacked dome shells so they never z-fight.
pub const DOME_LAYER_SCALE_STEP: f32 = 0.01;

/// Root entity of the currently attached dome plus the layer list it was
/// built from, used by the planner to detect sky swaps.
#[derive(Resource, Default)]
pub struct SkyState {
    pub dome: Option<Entity>,
    pub layers: Vec<SkyLayer>,
}

/// Marks the root of a spawned dome hierarchy.
#[derive(Component)]
pub struct SkyDomeRoot;

/// Blended global alpha of a dome, written by the interpolator runtime and
/// copied onto the layer materials each frame.
#[derive(Component, Debug, PartialEq)]
pub struct DomeAlpha(pub f32);

/// A dome whose textures are still loading. Its fade-in is deferred until
/// every handle is ready so we never fade in missing geometry.
#[derive(Component)]
pub struct PendingSkyFade {
    pub textures: Vec<Handle<Image>>,
}

// Inside-facing UV sphere suitable for equirectangular sky textures.
fn inverted_dome_mesh(longitudes: u32, latitudes: u32, radius: f32) -> Mesh {
    let longs = longitudes.max(3);
    let lats = latitudes.max(2);
    let mut positions = Vec::with_capacity(((longs + 1) * (lats + 1)) as usize);
    let mut uvs = Vec::with_capacity(positions.capacity());
    let mut normals = Vec::with_capacity(positions.capacity());
    for y in 0..=lats {
        let v = y as f32 / lats as f32;
        let theta = (v - 0.5) * std::f32::consts::PI;
        for x in 0..=longs {
            let u = x as f32 / longs as f32;
            let phi = (u - 0.5) * std::f32::consts::TAU;
            let px = theta.cos() * phi.cos();
            let py = theta.sin();
            let pz = theta.cos() * phi.sin();
            positions.push([radius * px, radius * py, radius * pz]);
            normals.push([-px, -py, -pz]);
            uvs.push([u, 1.0 - v]);
        }
    }
    let mut indices: Vec<u32> = Vec::with_capacity((longs * lats * 6) as usize);
    let row_stride = longs + 1;
    for y in 0..lats {
        for x in 0..longs {
            let i0 = y * row_stride + x;
            let i1 = i0 + 1;
            let i2 = i0 + row_stride;
            let i3 = i2 + 1;
            indices.extend_from_slice(&[i0, i1, i2, i1, i3, i2]);
        }
    }
    let mut mesh = Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default());
    mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, positions);
    mesh.insert_attribute(Mesh::ATTRIBUTE_NORMAL, normals);
    mesh.insert_attribute(Mesh::ATTRIBUTE_UV_0, uvs);
    mesh.insert_indices(Indices::U32(indices));
    mesh
}

/// Spawn a layered dome at alpha zero. Returns the root entity and the
/// texture handles that still have to finish loading before the fade-in may
/// start. Without asset facilities (headless runs) only the bare hierarchy
/// is created.
pub fn spawn_dome(
    commands: &mut Commands,
    layers: &[SkyLayer],
    meshes: Option<&mut Assets<Mesh>>,
    materials: Option<&mut Assets<StandardMaterial>>,
    server: Option<&AssetServer>,
) -> (Entity, Vec<Handle<Image>>) {
    let root = commands
        .spawn((SpatialBundle::default(), SkyDomeRoot, DomeAlpha(0.0)))
        .id();
    let mut pending = Vec::new();

    if let (Some(meshes), Some(materials)) = (meshes, materials) {
        let mesh = meshes.add(inverted_dome_mesh(48, 24, DOME_RADIUS));
        for (i, layer) in layers.iter().enumerate() {
            let texture = layer.texture.as_ref().and_then(|path| {
                let handle = server?.load(path.clone());
                pending.push(handle.clone());
                Some(handle)
            });
            let color = layer.color.to_linear().with_alpha(0.0);
            let material = materials.add(StandardMaterial {
                base_color: Color::LinearRgba(color),
                base_color_texture: texture,
                unlit: true,
                alpha_mode: AlphaMode::Blend,
                ..default()
            });
            let scale = 1.0 - i as f32 * DOME_LAYER_SCALE_STEP;
            let child = commands
                .spawn((
                    PbrBundle {
                        mesh: mesh.clone(),
                        material,
                        transform: Transform::from_scale(Vec3::splat(scale)),
                        ..default()
                    },
                    NotShadowCaster,
                ))
                .id();
            commands.entity(root).add_child(child);
        }
    }
    (root, pending)
}

/// Detach-if-present: finalizers may run twice (completion then abort of a
/// later batch) or target an already removed dome.
pub fn despawn_if_present(commands: &mut Commands, entity: Entity) {
    if let Some(entity) = commands.get_entity(entity) {
        entity.despawn_recursive();
    }
}

/// Copy the blended dome alpha onto every layer material.
pub fn apply_dome_alpha(
    q_domes: Query<(&DomeAlpha, &Children), Changed<DomeAlpha>>,
    q_layers: Query<&Handle<StandardMaterial>>,
    materials: Option<ResMut<Assets<StandardMaterial>>>,
) {
    let Some(mut materials) = materials else { return };
    for (alpha, children) in &q_domes {
        for child in children {
            if let Ok(handle) = q_layers.get(*child) {
                if let Some(material) = materials.get_mut(handle) {
                    material.base_color = material.base_color.with_alpha(alpha.0);
                }
            }
        }
    }
}

/// Start the deferred fade-in of a dome once all of its textures are ready.
pub fn poll_pending_fades(
    mut commands: Commands,
    mut transition: ResMut<ActiveTransition>,
    server: Option<Res<AssetServer>>,
    q_pending: Query<(Entity, &PendingSkyFade)>,
) {
    for (dome, pending) in &q_pending {
        let ready = match &server {
            Some(server) => pending
                .textures
                .iter()
                .all(|h| server.is_loaded_with_dependencies(h)),
            None => true,
        };
        if ready {
            commands.entity(dome).remove::<PendingSkyFade>();
            transition.push(Blend::SkyAlpha { dome, start: 0.0, end: 1.0 });
        }
    }
}

/// Keep the dome centered on the camera, or parked at the origin when the
/// follow toggle is off.
pub fn track_camera(
    settings: Res<EnvironmentSettings>,
    q_cam: Query<&Transform, (With<Camera3d>, Without<SkyDomeRoot>)>,
    mut q_domes: Query<&mut Transform, With<SkyDomeRoot>>,
) {
    let Ok(cam) = q_cam.get_single() else { return };
    for mut transform in &mut q_domes {
        transform.translation = if settings.follow_camera {
            Vec3::new(cam.translation.x, 0.0, cam.translation.z)
        } else {
            Vec3::ZERO
        };
    }
}
