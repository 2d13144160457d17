use bevy::prelude::*;

use skyshift::plugins::environment::EnvironmentPlugin;
use skyshift::plugins::scene::ScenePlugin;

fn main() {
    App::new()
        .insert_resource(ClearColor(Color::srgb(0.02, 0.02, 0.04)))
        .insert_resource(Msaa::Sample4)
        .add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window { title: "Skyshift".into(), ..default() }),
            ..default()
        }))
        .add_plugins(EnvironmentPlugin) // resolver + blend runtime + sinks
        .add_plugins(ScenePlugin)       // demo world & key bindings
        .run();
}
