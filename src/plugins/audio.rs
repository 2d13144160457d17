// Playlist forwarding: diffing environment playlists into looping audio
// entities keyed by asset path.
use bevy::audio::{PlaybackMode, Volume};
use bevy::prelude::*;
use std::collections::HashMap;

use crate::plugins::environment::{EnvironmentSettings, EnvironmentSwitcher};
use crate::plugins::library::PlaylistKind;

/// One queued looping track.
#[derive(Component, Debug, Clone, PartialEq)]
pub struct PlaylistTrack {
    pub kind: PlaylistKind,
    pub path: String,
}

/// Track lists currently forwarded to the audio side, per playlist kind.
#[derive(Resource, Default)]
pub struct AudioState {
    playing: HashMap<PlaylistKind, Vec<String>>,
}

impl AudioState {
    pub fn playing(&self, kind: PlaylistKind) -> &[String] {
        self.playing.get(&kind).map(Vec::as_slice).unwrap_or_default()
    }
}

/// Diff the target playlists against what is currently queued: removed
/// tracks are despawned, added tracks spawned. Unchanged tracks keep
/// playing across environment switches.
pub fn update_playlists(
    commands: &mut Commands,
    state: &mut AudioState,
    target: Option<&HashMap<PlaylistKind, Vec<String>>>,
    server: Option<&AssetServer>,
    tracks: &Query<(Entity, &'static PlaylistTrack)>,
) {
    for kind in PlaylistKind::ALL {
        let new_list: Vec<String> = target
            .and_then(|t| t.get(&kind))
            .cloned()
            .unwrap_or_default();
        let old_list = state.playing.get(&kind).cloned().unwrap_or_default();
        if new_list == old_list {
            continue;
        }

        for path in old_list.iter().filter(|p| !new_list.contains(p)) {
            for (entity, track) in tracks.iter() {
                if track.kind == kind && &track.path == path {
                    commands.entity(entity).despawn();
                }
            }
        }

        for path in new_list.iter().filter(|p| !old_list.contains(p)) {
            let mut track = commands.spawn(PlaylistTrack { kind, path: path.clone() });
            if let Some(server) = server {
                track.insert(AudioBundle {
                    source: server.load(path.clone()),
                    settings: PlaybackSettings {
                        mode: PlaybackMode::Loop,
                        volume: Volume::new(kind.gain()),
                        ..default()
                    },
                });
            }
        }

        state.playing.insert(kind, new_list);
    }
}

/// React to the audio toggle: muting clears every queue, re-enabling
/// rebuilds them from the current head configuration.
pub fn sync_audio_enabled(
    mut commands: Commands,
    settings: Res<EnvironmentSettings>,
    switcher: Res<EnvironmentSwitcher>,
    mut state: ResMut<AudioState>,
    server: Option<Res<AssetServer>>,
    tracks: Query<(Entity, &'static PlaylistTrack)>,
) {
    if !settings.is_changed() || settings.is_added() {
        return;
    }
    let target = switcher
        .current_configuration()
        .filter(|_| settings.audio_enabled)
        .map(|c| &c.playlists);
    update_playlists(&mut commands, &mut state, target, server.as_deref(), &tracks);
}
