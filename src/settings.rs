use crate::error::SettingsError;
use crate::utilities::{watch, SerdeJsonQuick};
use notify::{DebouncedEvent, RecommendedWatcher};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub physics: PhysicsSettings,
    pub car: CarSettings,
    pub probe: ProbeSettings,
    pub camera: CameraSettings,
    pub arena: ArenaSettings,
}

impl SerdeJsonQuick for Settings {
    type Error = SettingsError;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsSettings {
    pub gravity: [f32; 3],
    pub timestep: f32,
}

impl Default for PhysicsSettings {
    fn default() -> Self {
        PhysicsSettings {
            gravity: [0.0, -9.0, 0.0],
            timestep: 1.0 / 60.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CarSettings {
    /// Full hitbox size (width, height, length).
    pub hitbox: [f32; 3],
    pub spawn: [f32; 3],
    pub density: f32,
    pub friction: f32,
    pub restitution: f32,

    pub move_speed: f32,
    pub boost_force: f32,
    pub max_speed: f32,
    pub jump_impulse: f32,
    pub jump_cooldown_ticks: u32,

    /// Radians per tick.
    pub turn_rate: f32,
    pub air_pitch_rate: f32,
    pub air_yaw_rate: f32,
    pub air_roll_rate: f32,

    pub flip_duration_ticks: u32,
    pub flip_boost: f32,
    pub flip_vertical_decay: f32,
    /// Roll share of a diagonal flip axis relative to its pitch share.
    pub diagonal_flip_blend: f32,

    pub boost_rising_threshold: f32,
    pub boost_gravity_weight: f32,
}

impl Default for CarSettings {
    fn default() -> Self {
        CarSettings {
            hitbox: [2.0, 0.7, 3.6],
            spawn: [0.0, 1.5, 0.0],
            density: 1.0,
            friction: 0.7,
            restitution: 0.0,
            move_speed: 14.0,
            boost_force: 0.6,
            max_speed: 23.0,
            jump_impulse: 30.0,
            jump_cooldown_ticks: 10,
            turn_rate: 0.05,
            air_pitch_rate: 0.05,
            air_yaw_rate: 0.04,
            air_roll_rate: 0.06,
            flip_duration_ticks: 30,
            flip_boost: 6.0,
            flip_vertical_decay: 0.95,
            diagonal_flip_blend: 1.0,
            boost_rising_threshold: 0.5,
            boost_gravity_weight: 0.8,
        }
    }
}

impl CarSettings {
    pub fn half_extents(&self) -> [f32; 3] {
        [
            self.hitbox[0] / 2.0,
            self.hitbox[1] / 2.0,
            self.hitbox[2] / 2.0,
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSettings {
    pub ray_length: f32,
    pub corner_epsilon: f32,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        ProbeSettings {
            ray_length: 0.3,
            corner_epsilon: 0.01,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    /// Offset behind the car in car-local space.
    pub backward_offset: [f32; 3],
    pub height: f32,
    /// Landing blend progress added per tick.
    pub blend_rate: f32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        CameraSettings {
            backward_offset: [0.0, 0.0, 8.0],
            height: 3.0,
            blend_rate: 0.05,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaSettings {
    pub floor_width: f32,
    pub floor_length: f32,
    pub floor_thickness: f32,
    pub wall_height: f32,
    pub wall_thickness: f32,
    pub ball_radius: f32,
    pub ball_spawn: [f32; 3],
    pub ball_density: f32,
    pub ball_restitution: f32,
}

impl Default for ArenaSettings {
    fn default() -> Self {
        ArenaSettings {
            floor_width: 50.0,
            floor_length: 140.0,
            floor_thickness: 0.2,
            wall_height: 20.0,
            wall_thickness: 0.5,
            ball_radius: 0.8,
            ball_spawn: [0.0, 5.0, -10.0],
            ball_density: 0.3,
            ball_restitution: 0.6,
        }
    }
}

pub struct SettingsWatcher {
    path: PathBuf,
    channel: (RecommendedWatcher, Receiver<DebouncedEvent>),
}

impl SettingsWatcher {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<SettingsWatcher, SettingsError> {
        let path = path.as_ref().to_path_buf();
        let channel = watch(&[&path])?;
        Ok(SettingsWatcher { path, channel })
    }

    /// Returns freshly parsed settings if the file was written since the last poll.
    pub fn poll(&self) -> Option<Settings> {
        let mut changed = false;
        while let Ok(event) = self.channel.1.try_recv() {
            if let DebouncedEvent::Write(_) | DebouncedEvent::Create(_) = event {
                changed = true;
            }
        }
        if !changed {
            return None;
        }

        match Settings::load_json(&self.path) {
            Ok(settings) => {
                info!(path = %self.path.display(), "settings reloaded");
                Some(settings)
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to reload settings");
                None
            }
        }
    }
}
