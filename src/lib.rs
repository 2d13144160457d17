//! Library entry for integration tests & external tooling.
//! Exposes plugin modules and a prelude for common types.

pub mod plugins {
    pub mod audio;
    pub mod environment;
    pub mod library;
    pub mod scene;
    pub mod sky;
    pub mod sun;
    pub mod transition;
}
pub mod prelude;
