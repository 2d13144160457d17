use bevy::prelude::*;
use skyshift::prelude::*;

fn build_app() -> App {
    let mut app = App::new();
    app.add_plugins(MinimalPlugins).add_plugins(EnvironmentPlugin);
    app
}

fn tick(app: &mut App, n: usize) {
    for _ in 0..n {
        app.world_mut().run_schedule(FixedUpdate);
    }
}

fn insert_leaf(app: &mut App, cfg: EnvironmentConfig) {
    app.world_mut()
        .resource_mut::<EnvironmentLibrary>()
        .insert(EnvironmentDef::Leaf(cfg));
}

fn select(app: &mut App, priority: EnvPriority, key: Option<&str>) {
    app.world_mut()
        .resource_mut::<EnvironmentSwitcher>()
        .set_environment(priority, key, None);
}

#[test]
fn blend_lands_exactly_on_the_target() {
    let mut app = build_app();
    let mut cfg = EnvironmentConfig::named("A");
    cfg.ambient = Some(ColorDef(0.2, 0.4, 0.6));
    cfg.blend_time = 2.0;
    insert_leaf(&mut app, cfg);
    select(&mut app, EnvPriority::Global, Some("A"));

    tick(&mut app, 125);
    let lights = app.world().resource::<LightState>();
    assert_eq!(lights.ambient, ColorDef(0.2, 0.4, 0.6).to_linear());
    assert!(lights.ambient_enabled);
    assert!(app.world().resource::<ActiveTransition>().is_idle());
}

#[test]
fn zero_blend_time_applies_instantly() {
    let mut app = build_app();
    let mut cfg = EnvironmentConfig::named("A");
    cfg.ambient = Some(ColorDef(0.7, 0.1, 0.1));
    cfg.blend_time = 0.0;
    insert_leaf(&mut app, cfg);
    select(&mut app, EnvPriority::Global, Some("A"));

    tick(&mut app, 1);
    let lights = app.world().resource::<LightState>();
    assert_eq!(lights.ambient, ColorDef(0.7, 0.1, 0.1).to_linear());
    assert!(app.world().resource::<ActiveTransition>().is_idle());
}

#[test]
fn retarget_starts_from_the_live_midpoint() {
    let mut app = build_app();
    let mut a = EnvironmentConfig::named("A");
    a.ambient = Some(ColorDef(0.0, 0.0, 1.0));
    a.blend_time = 2.0;
    insert_leaf(&mut app, a);
    let mut b = EnvironmentConfig::named("B");
    b.ambient = Some(ColorDef(1.0, 0.0, 0.0));
    b.blend_time = 2.0;
    insert_leaf(&mut app, b);

    select(&mut app, EnvPriority::Global, Some("A"));
    tick(&mut app, 60);
    let mid = app.world().resource::<LightState>().ambient;
    assert!((mid.blue - 0.5).abs() < 1e-3);

    // Interrupt half way: the new blend departs from the live value, it
    // never snaps back to either configuration.
    select(&mut app, EnvPriority::User, Some("B"));
    tick(&mut app, 1);
    let lights = app.world().resource::<LightState>();
    assert!(lights.ambient.blue <= mid.blue);
    assert!(lights.ambient.blue > 0.0);

    tick(&mut app, 125);
    let lights = app.world().resource::<LightState>();
    assert_eq!(lights.ambient, ColorDef(1.0, 0.0, 0.0).to_linear());
}

#[test]
fn blend_to_black_disables_the_light() {
    let mut app = build_app();
    let mut a = EnvironmentConfig::named("A");
    a.ambient = Some(ColorDef(0.5, 0.5, 0.5));
    a.sun = Some(ColorDef(1.0, 1.0, 0.9));
    a.blend_time = 1.0;
    insert_leaf(&mut app, a);
    let mut b = EnvironmentConfig::named("B");
    b.ambient = Some(ColorDef(0.0, 0.0, 0.0));
    b.sun = Some(ColorDef(0.0, 0.0, 0.0));
    b.blend_time = 1.0;
    insert_leaf(&mut app, b);

    select(&mut app, EnvPriority::Global, Some("A"));
    tick(&mut app, 70);
    let lights = app.world().resource::<LightState>();
    assert!(lights.ambient_enabled);
    assert!(lights.sun_enabled);

    select(&mut app, EnvPriority::User, Some("B"));
    tick(&mut app, 70);
    let lights = app.world().resource::<LightState>();
    assert!(!lights.ambient_enabled);
    assert!(!lights.sun_enabled);
    assert_eq!(lights.ambient, LinearRgba::BLACK);
}

#[test]
fn fog_disable_fades_out_then_turns_off() {
    let mut app = build_app();
    let mut a = EnvironmentConfig::named("A");
    a.fog = Some(FogConfig {
        color: ColorDef(0.6, 0.6, 0.7),
        start: 0.1,
        end: 0.5,
        density: 0.0,
        enabled: true,
    });
    a.blend_time = 1.0;
    insert_leaf(&mut app, a);
    let mut b = EnvironmentConfig::named("B");
    b.blend_time = 1.0;
    insert_leaf(&mut app, b);

    select(&mut app, EnvPriority::Global, Some("A"));
    tick(&mut app, 70);
    let fog = app.world().resource::<FogState>();
    assert!(fog.enabled);
    assert_eq!(fog.color, ColorDef(0.6, 0.6, 0.7).to_linear());
    assert!((fog.start - 0.1).abs() < 1e-6);
    assert!((fog.end - 0.5).abs() < 1e-6);

    // Replace the selection so no chain member carries fog: the alpha fades
    // to zero, then the fog switches off.
    select(&mut app, EnvPriority::Global, Some("B"));
    tick(&mut app, 30);
    let fog = app.world().resource::<FogState>();
    assert!(fog.enabled);
    assert!(fog.color.alpha < 1.0 && fog.color.alpha > 0.0);
    tick(&mut app, 40);
    let fog = app.world().resource::<FogState>();
    assert!(!fog.enabled);
    assert_eq!(fog.color.alpha, 0.0);
}

#[test]
fn exponential_fog_forces_default_linear_bounds() {
    let mut app = build_app();
    let mut a = EnvironmentConfig::named("A");
    a.fog = Some(FogConfig {
        color: ColorDef(0.3, 0.3, 0.3),
        start: 0.05,
        end: 0.35,
        density: 1.6,
        enabled: true,
    });
    a.blend_time = 1.0;
    insert_leaf(&mut app, a);

    select(&mut app, EnvPriority::Global, Some("A"));
    tick(&mut app, 70);
    let fog = app.world().resource::<FogState>();
    assert!((fog.density - 1.6).abs() < 1e-6);
    // Density > 0 overrides the authored linear bounds.
    assert_eq!(fog.end, DEFAULT_FOG_END);
}

fn sky_leaf(key: &str, layer: &str, blend_time: f32) -> EnvironmentConfig {
    let mut cfg = EnvironmentConfig::named(key);
    cfg.sky = Some(vec![SkyLayer {
        name: layer.into(),
        texture: None,
        color: ColorDef(1.0, 1.0, 1.0),
    }]);
    cfg.blend_time = blend_time;
    cfg
}

#[test]
fn sky_swap_fades_old_dome_out_and_despawns_it() {
    let mut app = build_app();
    insert_leaf(&mut app, sky_leaf("A", "day", 1.0));
    insert_leaf(&mut app, sky_leaf("B", "night", 1.0));

    select(&mut app, EnvPriority::Global, Some("A"));
    tick(&mut app, 70);
    let dome_a = app.world().resource::<SkyState>().dome.unwrap();
    assert_eq!(app.world().get::<DomeAlpha>(dome_a).unwrap().0, 1.0);

    select(&mut app, EnvPriority::User, Some("B"));
    tick(&mut app, 30);
    let dome_b = app.world().resource::<SkyState>().dome.unwrap();
    assert_ne!(dome_a, dome_b);
    // Old dome is mid fade-out, both domes coexist.
    let alpha = app.world().get::<DomeAlpha>(dome_a).unwrap().0;
    assert!(alpha < 1.0 && alpha > 0.0);

    tick(&mut app, 40);
    assert!(app.world().get_entity(dome_a).is_none());
    assert_eq!(app.world().get::<DomeAlpha>(dome_b).unwrap().0, 1.0);
}

#[test]
fn aborted_fade_out_still_detaches_the_dome() {
    let mut app = build_app();
    insert_leaf(&mut app, sky_leaf("A", "day", 1.0));
    insert_leaf(&mut app, sky_leaf("B", "night", 1.0));

    select(&mut app, EnvPriority::Global, Some("A"));
    tick(&mut app, 70);
    let dome_a = app.world().resource::<SkyState>().dome.unwrap();

    select(&mut app, EnvPriority::User, Some("B"));
    tick(&mut app, 30);
    assert!(app.world().get_entity(dome_a).is_some());

    // Interrupt the fade-out with another switch: the finalizer must run.
    select(&mut app, EnvPriority::User, None);
    tick(&mut app, 1);
    assert!(app.world().get_entity(dome_a).is_none());
}

#[test]
fn interrupted_fade_in_hands_over_its_live_alpha() {
    let mut app = build_app();
    insert_leaf(&mut app, sky_leaf("A", "day", 1.0));
    insert_leaf(&mut app, sky_leaf("B", "night", 1.0));

    select(&mut app, EnvPriority::Global, Some("A"));
    tick(&mut app, 30);
    let dome_a = app.world().resource::<SkyState>().dome.unwrap();
    let mid = app.world().get::<DomeAlpha>(dome_a).unwrap().0;
    assert!(mid > 0.4 && mid < 0.6);

    // Swap skies while the fade-in is half way: the fade-out departs from
    // the live alpha instead of snapping the dome back to full opacity.
    select(&mut app, EnvPriority::Global, Some("B"));
    tick(&mut app, 1);
    let alpha = app.world().get::<DomeAlpha>(dome_a).unwrap().0;
    assert!(alpha <= mid);
    assert!(alpha > mid - 0.05);
}

#[test]
fn sky_swap_cancels_a_deferred_fade_in() {
    let mut app = build_app();
    insert_leaf(&mut app, sky_leaf("A", "day", 1.0));
    insert_leaf(&mut app, sky_leaf("B", "night", 1.0));

    select(&mut app, EnvPriority::Global, Some("A"));
    tick(&mut app, 1);
    let dome_a = app.world().resource::<SkyState>().dome.unwrap();
    app.world_mut()
        .entity_mut(dome_a)
        .insert(PendingSkyFade { textures: Vec::new() });

    select(&mut app, EnvPriority::Global, Some("B"));
    tick(&mut app, 1);
    // The old dome is fading out; its deferred fade-in must be gone with it.
    assert!(app.world().get::<PendingSkyFade>(dome_a).is_none());
    let live = app.world().resource::<ActiveTransition>().live();
    app.world_mut().run_schedule(Update);
    assert_eq!(app.world().resource::<ActiveTransition>().live(), live);
}

#[test]
fn deferred_fade_in_joins_the_batch_once_assets_are_ready() {
    let mut app = build_app();
    insert_leaf(&mut app, sky_leaf("A", "day", 1.0));

    select(&mut app, EnvPriority::Global, Some("A"));
    tick(&mut app, 1);
    let dome = app.world().resource::<SkyState>().dome.unwrap();
    app.world_mut()
        .entity_mut(dome)
        .insert(PendingSkyFade { textures: Vec::new() });

    // Without an asset server every handle counts as loaded, so one poll
    // releases the fade and starts the blend.
    let live = app.world().resource::<ActiveTransition>().live();
    app.world_mut().run_schedule(Update);
    assert!(app.world().get::<PendingSkyFade>(dome).is_none());
    assert_eq!(app.world().resource::<ActiveTransition>().live(), live + 1);
}

#[test]
fn removing_the_last_selection_fades_everything_out() {
    let mut app = build_app();
    let mut a = sky_leaf("A", "day", 1.0);
    a.ambient = Some(ColorDef(0.5, 0.5, 0.5));
    insert_leaf(&mut app, a);

    select(&mut app, EnvPriority::Global, Some("A"));
    tick(&mut app, 70);
    let dome = app.world().resource::<SkyState>().dome.unwrap();

    select(&mut app, EnvPriority::Global, None);
    tick(&mut app, 5);
    assert!(app.world().get_entity(dome).is_none());
    let lights = app.world().resource::<LightState>();
    assert!(!lights.ambient_enabled);
    assert_eq!(lights.ambient, LinearRgba::BLACK);
}
