pub mod arena;
pub mod camera;
pub mod debug_lines;
pub mod error;
pub mod game;
pub mod ground_probe;
pub mod hud;
pub mod input;
pub mod physics;
pub mod playback;
pub mod settings;
pub mod utilities;
pub mod vehicle;
