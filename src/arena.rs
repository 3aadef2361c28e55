use crate::error::PhysicsError;
use crate::physics::{EntityId, EntityKind, Material, Physics};
use crate::settings::ArenaSettings;
use rapier3d::prelude::*;
use tracing::info;

/// Static pitch geometry plus the ball. The floor's top face sits at y = 0.
pub struct Arena {
    settings: ArenaSettings,
    pub floor: EntityId,
    pub walls: [EntityId; 4],
    pub ceiling: EntityId,
    pub ball: EntityId,
}

impl Arena {
    pub fn build(physics: &mut Physics, settings: &ArenaSettings) -> Arena {
        let s = settings;
        let static_material = Material {
            density: 1.0,
            friction: 0.8,
            restitution: 0.1,
        };

        let floor = physics.add_entity(
            EntityKind::Floor {
                width: s.floor_width,
                length: s.floor_length,
                thickness: s.floor_thickness,
            },
            Isometry::translation(0.0, -s.floor_thickness / 2.0, 0.0),
            static_material,
        );

        let half_w = s.floor_width / 2.0;
        let half_l = s.floor_length / 2.0;
        let half_t = s.wall_thickness / 2.0;
        let half_h = s.wall_height / 2.0;

        let side = vector![half_t, half_h, half_l];
        let end = vector![half_w + s.wall_thickness, half_h, half_t];
        let walls = [
            (side, vector![-(half_w + half_t), half_h, 0.0]),
            (side, vector![half_w + half_t, half_h, 0.0]),
            (end, vector![0.0, half_h, -(half_l + half_t)]),
            (end, vector![0.0, half_h, half_l + half_t]),
        ]
        .map(|(half_extents, at)| {
            physics.add_entity(
                EntityKind::Wall { half_extents },
                Isometry::translation(at.x, at.y, at.z),
                static_material,
            )
        });

        let ceiling = physics.add_entity(
            EntityKind::Wall {
                half_extents: vector![half_w, half_t, half_l],
            },
            Isometry::translation(0.0, s.wall_height + half_t, 0.0),
            static_material,
        );

        let ball = physics.add_entity(
            EntityKind::Ball {
                radius: s.ball_radius,
            },
            ball_spawn(s),
            ball_material(s),
        );

        info!(
            width = s.floor_width,
            length = s.floor_length,
            height = s.wall_height,
            "arena built"
        );

        Arena {
            settings: s.clone(),
            floor,
            walls,
            ceiling,
            ball,
        }
    }

    pub fn settings(&self) -> &ArenaSettings {
        &self.settings
    }

    pub fn static_entities(&self) -> Vec<EntityId> {
        let mut ids = vec![self.floor];
        ids.extend_from_slice(&self.walls);
        ids.push(self.ceiling);
        ids
    }

    pub fn reset_ball(&self, physics: &mut Physics) -> Result<(), PhysicsError> {
        physics.teleport(self.ball, ball_spawn(&self.settings))
    }

    /// Applies new arena settings. Only the ball changes in place; new
    /// pitch dimensions tear the arena down and build it again.
    pub fn apply_settings(
        &mut self,
        physics: &mut Physics,
        settings: &ArenaSettings,
    ) -> Result<(), PhysicsError> {
        let geometry_changed = settings.floor_width != self.settings.floor_width
            || settings.floor_length != self.settings.floor_length
            || settings.floor_thickness != self.settings.floor_thickness
            || settings.wall_height != self.settings.wall_height
            || settings.wall_thickness != self.settings.wall_thickness;

        if geometry_changed {
            for id in self.static_entities() {
                physics.remove_entity(id)?;
            }
            physics.remove_entity(self.ball)?;
            *self = Arena::build(physics, settings);
            return Ok(());
        }

        physics.rebuild_with(
            self.ball,
            EntityKind::Ball {
                radius: settings.ball_radius,
            },
            ball_material(settings),
        )?;
        self.settings = settings.clone();
        Ok(())
    }
}

fn ball_spawn(s: &ArenaSettings) -> Isometry<Real> {
    Isometry::translation(s.ball_spawn[0], s.ball_spawn[1], s.ball_spawn[2])
}

fn ball_material(s: &ArenaSettings) -> Material {
    Material {
        density: s.ball_density,
        friction: 0.5,
        restitution: s.ball_restitution,
    }
}
