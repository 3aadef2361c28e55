use crate::arena::Arena;
use crate::camera::{CameraTracker, CameraTransform};
use crate::debug_lines::{LineBatch, LineSystem};
use crate::error::PhysicsError;
use crate::hud::Hud;
use crate::input::InputState;
use crate::physics::{EntityId, EntityKind, Physics};
use crate::settings::Settings;
use crate::utilities::{arr3, point_arr3, quat_arr4};
use crate::vehicle::{TickReport, VehicleController};
use rapier3d::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

const PROBE_LINES: &str = "probe";

#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct VisualProxy {
    pub entity: EntityId,
    pub label: &'static str,
    pub position: [f32; 3],
    /// `[x, y, z, w]`
    pub rotation: [f32; 4],
    /// Half extents for boxes, radius on every axis for balls.
    pub scale: [f32; 3],
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct CameraFrame {
    pub position: [f32; 3],
    pub target: [f32; 3],
    pub rotation: [f32; 4],
}

impl From<&CameraTransform> for CameraFrame {
    fn from(t: &CameraTransform) -> Self {
        CameraFrame {
            position: point_arr3(&t.position),
            target: point_arr3(&t.target),
            rotation: quat_arr4(&t.rotation),
        }
    }
}

/// Everything a renderer needs for one tick.
#[derive(Debug, Clone, Serialize)]
pub struct Frame {
    pub tick: u64,
    pub proxies: Vec<VisualProxy>,
    pub hitbox: Option<VisualProxy>,
    pub camera: Option<CameraFrame>,
    pub lines: LineBatch,
    #[serde(skip)]
    pub report: Option<TickReport>,
}

fn scale_of(kind: &EntityKind) -> [f32; 3] {
    match *kind {
        EntityKind::Car { half_extents } | EntityKind::Wall { half_extents } => arr3(&half_extents),
        EntityKind::Ball { radius } => [radius; 3],
        EntityKind::Floor {
            width,
            length,
            thickness,
        } => [width / 2.0, thickness / 2.0, length / 2.0],
    }
}

fn proxy(entity: EntityId, kind: &EntityKind, body: &RigidBody) -> VisualProxy {
    VisualProxy {
        entity,
        label: kind.name(),
        position: arr3(body.translation()),
        rotation: quat_arr4(body.rotation()),
        scale: scale_of(kind),
    }
}

/// Owns the simulation and runs the fixed tick order:
/// physics step, ground probe and vehicle control, camera, frame.
pub struct Game {
    settings: Settings,
    physics: Physics,
    arena: Arena,
    car: VehicleController,
    camera: CameraTracker,
    lines: LineSystem,
    proxies: BTreeMap<EntityId, VisualProxy>,
    hud: Hud,
    tick: u64,
}

impl Game {
    pub fn new(settings: Settings) -> Game {
        Game::with_physics(Physics::new(&settings.physics), settings)
    }

    /// Starts with the physics world still initializing; see [`Game::finish_physics_init`].
    pub fn pending(settings: Settings) -> Game {
        Game::with_physics(Physics::pending(&settings.physics), settings)
    }

    fn with_physics(mut physics: Physics, settings: Settings) -> Game {
        let arena = Arena::build(&mut physics, &settings.arena);
        let car = VehicleController::spawn(&mut physics, &settings.car, &settings.probe);
        let camera = CameraTracker::new(&settings.camera);

        let mut game = Game {
            settings,
            physics,
            arena,
            car,
            camera,
            lines: LineSystem::new(),
            proxies: BTreeMap::new(),
            hud: Hud::default(),
            tick: 0,
        };
        game.sync_proxies();
        game
    }

    pub fn finish_physics_init(&mut self) {
        self.physics.initialize();
        self.sync_proxies();
    }

    fn sync_proxies(&mut self) {
        let physics = &self.physics;
        self.proxies = physics
            .entities()
            .filter_map(|(entity, kind)| {
                physics
                    .body(entity)
                    .map(|body| (entity, proxy(entity, &kind, body)))
            })
            .collect();
    }

    pub fn tick(&mut self, input: &InputState) -> Frame {
        self.tick += 1;

        let proxies = &mut self.proxies;
        self.physics.step(|entity, kind, body| {
            proxies.insert(entity, proxy(entity, &kind, body));
        });

        let report = self.car.update(&mut self.physics, input);
        self.lines.show_probe(PROBE_LINES, self.car.last_probe());

        let car_entity = self.car.entity();
        let camera = match self.physics.pose(car_entity) {
            Some(pose) => self.camera.update(&pose, self.car.state().grounded),
            None => None,
        };

        let linvel = self
            .physics
            .body(car_entity)
            .map_or(Vector::zeros(), |b| *b.linvel());
        self.hud
            .update(&linvel, self.car.state(), self.camera.transition_progress());

        let hitbox = self.proxies.get(&car_entity).map(|p| VisualProxy {
            label: "hitbox",
            scale: arr3(&self.car.half_extents()),
            ..*p
        });

        Frame {
            tick: self.tick,
            proxies: self.proxies.values().copied().collect(),
            hitbox,
            camera: camera.as_ref().map(CameraFrame::from),
            lines: self.lines.batch(),
            report,
        }
    }

    /// Applies reloaded settings. Geometry changes rebuild the affected bodies in place.
    pub fn apply_settings(&mut self, settings: Settings) {
        if settings.physics != self.settings.physics {
            self.physics.set_gravity(settings.physics.gravity);
            self.physics.set_timestep(settings.physics.timestep);
        }

        if let Err(err) = self
            .car
            .apply_settings(&mut self.physics, &settings.car, &settings.probe)
        {
            warn!(%err, "car settings not applied");
        }

        if settings.arena != self.settings.arena {
            if let Err(err) = self.arena.apply_settings(&mut self.physics, &settings.arena) {
                warn!(%err, "arena settings not applied");
            }
        }

        self.camera.apply_settings(&settings.camera);
        self.settings = settings;
        self.sync_proxies();
        info!("settings applied");
    }

    /// Puts the car and the ball back on their spawn points.
    pub fn reset(&mut self) -> Result<(), PhysicsError> {
        self.car.reset(&mut self.physics)?;
        self.arena.reset_ball(&mut self.physics)?;
        self.sync_proxies();
        Ok(())
    }

    pub fn physics(&self) -> &Physics {
        &self.physics
    }

    pub fn physics_mut(&mut self) -> &mut Physics {
        &mut self.physics
    }

    pub fn car(&self) -> &VehicleController {
        &self.car
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn camera(&self) -> &CameraTracker {
        &self.camera
    }

    pub fn hud(&self) -> &Hud {
        &self.hud
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn car_pose(&self) -> Option<Isometry<Real>> {
        self.physics.pose(self.car.entity())
    }
}
