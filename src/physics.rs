use crate::error::PhysicsError;
use crate::ground_probe::RayCaster;
use crate::settings::PhysicsSettings;
use crate::utilities::vec3;
use rapier3d::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u32);

/// Logical entity type, carrying the geometry its collider is built from.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum EntityKind {
    Car { half_extents: Vector<Real> },
    Ball { radius: Real },
    Floor { width: Real, length: Real, thickness: Real },
    Wall { half_extents: Vector<Real> },
}

impl EntityKind {
    pub fn is_dynamic(&self) -> bool {
        match self {
            EntityKind::Car { .. } | EntityKind::Ball { .. } => true,
            EntityKind::Floor { .. } | EntityKind::Wall { .. } => false,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::Car { .. } => "car",
            EntityKind::Ball { .. } => "ball",
            EntityKind::Floor { .. } => "floor",
            EntityKind::Wall { .. } => "wall",
        }
    }

    fn shape(&self) -> ColliderBuilder {
        match *self {
            EntityKind::Car { half_extents } | EntityKind::Wall { half_extents } => {
                ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z)
            }
            EntityKind::Ball { radius } => ColliderBuilder::ball(radius),
            EntityKind::Floor {
                width,
                length,
                thickness,
            } => ColliderBuilder::cuboid(width / 2.0, thickness / 2.0, length / 2.0),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Material {
    pub density: Real,
    pub friction: Real,
    pub restitution: Real,
}

impl Default for Material {
    fn default() -> Self {
        Material {
            density: 1.0,
            friction: 0.5,
            restitution: 0.0,
        }
    }
}

struct PhysicsObject {
    entity: EntityId,
    kind: EntityKind,
    material: Material,
    body: RigidBodyHandle,
}

struct QueuedEntity {
    entity: EntityId,
    kind: EntityKind,
    transform: Isometry<Real>,
    material: Material,
}

struct Engine {
    gravity: Vector<Real>,
    integration_parameters: IntegrationParameters,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd: CCDSolver,
    query_pipeline: QueryPipeline,
}

impl Engine {
    fn new(settings: &PhysicsSettings) -> Engine {
        Engine {
            gravity: vec3(settings.gravity),
            integration_parameters: IntegrationParameters {
                dt: settings.timestep,
                ..Default::default()
            },
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
        }
    }

    fn insert(
        &mut self,
        kind: &EntityKind,
        transform: Isometry<Real>,
        material: &Material,
    ) -> RigidBodyHandle {
        let builder = if kind.is_dynamic() {
            RigidBodyBuilder::dynamic()
        } else {
            RigidBodyBuilder::fixed()
        };
        let body = builder
            .position(transform)
            .linvel(vector![0.0, 0.0, 0.0])
            .ccd_enabled(kind.is_dynamic())
            .build();
        let handle = self.bodies.insert(body);

        let collider = kind
            .shape()
            .density(material.density)
            .friction(material.friction)
            .restitution(material.restitution)
            .build();
        self.colliders
            .insert_with_parent(collider, handle, &mut self.bodies);

        handle
    }

    fn remove(&mut self, handle: RigidBodyHandle) -> bool {
        self.bodies
            .remove(
                handle,
                &mut self.islands,
                &mut self.colliders,
                &mut self.impulse_joints,
                &mut self.multibody_joints,
                true,
            )
            .is_some()
    }

    fn refresh_queries(&mut self) {
        self.query_pipeline.update(&self.colliders);
    }

    fn step(&mut self) {
        self.pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd,
            Some(&mut self.query_pipeline),
            &(),
            &(),
        );
    }
}

/// Owns the rapier world and the flat entity → body list.
///
/// The world may start out pending: entities added before [`Physics::initialize`]
/// are queued and created once it runs.
pub struct Physics {
    settings: PhysicsSettings,
    engine: Option<Engine>,
    objects: Vec<PhysicsObject>,
    queued: Vec<QueuedEntity>,
    next_id: u32,
}

impl Physics {
    pub fn new(settings: &PhysicsSettings) -> Physics {
        let mut physics = Physics::pending(settings);
        physics.initialize();
        physics
    }

    pub fn pending(settings: &PhysicsSettings) -> Physics {
        Physics {
            settings: settings.clone(),
            engine: None,
            objects: vec![],
            queued: vec![],
            next_id: 0,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.engine.is_some()
    }

    pub fn initialize(&mut self) {
        if self.engine.is_some() {
            return;
        }
        self.engine = Some(Engine::new(&self.settings));
        info!("physics initialized");

        let queued = std::mem::take(&mut self.queued);
        if !queued.is_empty() {
            info!(count = queued.len(), "adding queued physics entities");
        }
        for q in queued {
            self.create(q.entity, q.kind, q.transform, q.material);
        }
    }

    pub fn set_gravity(&mut self, gravity: [f32; 3]) {
        self.settings.gravity = gravity;
        if let Some(engine) = &mut self.engine {
            engine.gravity = vec3(gravity);
        }
    }

    pub fn set_timestep(&mut self, timestep: f32) {
        self.settings.timestep = timestep;
        if let Some(engine) = &mut self.engine {
            engine.integration_parameters.dt = timestep;
        }
    }

    pub fn timestep(&self) -> f32 {
        self.settings.timestep
    }

    pub fn add_entity(
        &mut self,
        kind: EntityKind,
        transform: Isometry<Real>,
        material: Material,
    ) -> EntityId {
        let entity = EntityId(self.next_id);
        self.next_id += 1;

        if self.engine.is_none() {
            warn!(?entity, kind = kind.name(), "physics not initialized yet, queueing entity");
            self.queued.push(QueuedEntity {
                entity,
                kind,
                transform,
                material,
            });
        } else {
            self.create(entity, kind, transform, material);
        }

        entity
    }

    fn create(
        &mut self,
        entity: EntityId,
        kind: EntityKind,
        transform: Isometry<Real>,
        material: Material,
    ) {
        if let Some(engine) = &mut self.engine {
            let body = engine.insert(&kind, transform, &material);
            engine.refresh_queries();
            debug!(?entity, kind = kind.name(), "physics entity added");
            self.objects.push(PhysicsObject {
                entity,
                kind,
                material,
                body,
            });
        }
    }

    pub fn remove_entity(&mut self, entity: EntityId) -> Result<(), PhysicsError> {
        if let Some(index) = self.queued.iter().position(|q| q.entity == entity) {
            self.queued.remove(index);
            debug!(?entity, "queued physics entity dropped");
            return Ok(());
        }

        let index = self.objects.iter().position(|o| o.entity == entity);
        match (index, &mut self.engine) {
            (Some(index), Some(engine)) => {
                let object = self.objects.remove(index);
                engine.remove(object.body);
                engine.refresh_queries();
                debug!(?entity, kind = object.kind.name(), "physics entity removed");
                Ok(())
            }
            _ => {
                warn!(?entity, "entity not found in physics system");
                Err(PhysicsError::MissingEntity(entity))
            }
        }
    }

    /// Destroys and recreates the entity's body with a new shape, keeping its pose and velocity.
    pub fn rebuild_with(
        &mut self,
        entity: EntityId,
        kind: EntityKind,
        material: Material,
    ) -> Result<(), PhysicsError> {
        if let Some(q) = self.queued.iter_mut().find(|q| q.entity == entity) {
            q.kind = kind;
            q.material = material;
            return Ok(());
        }

        let engine = self.engine.as_mut().ok_or(PhysicsError::NotReady)?;
        let object = self
            .objects
            .iter_mut()
            .find(|o| o.entity == entity)
            .ok_or(PhysicsError::MissingEntity(entity))?;

        let (position, linvel, angvel) = match engine.bodies.get(object.body) {
            Some(body) => (*body.position(), *body.linvel(), *body.angvel()),
            None => return Err(PhysicsError::MissingEntity(entity)),
        };

        engine.remove(object.body);
        let body = engine.insert(&kind, position, &material);
        if let Some(rb) = engine.bodies.get_mut(body) {
            rb.set_linvel(linvel, true);
            rb.set_angvel(angvel, true);
        }
        engine.refresh_queries();

        object.body = body;
        object.kind = kind;
        object.material = material;
        info!(?entity, kind = kind.name(), "physics entity rebuilt");
        Ok(())
    }

    /// Advances the world by one timestep, then hands every body to `sync` so
    /// visuals match the new pose within the same tick.
    pub fn step<F: FnMut(EntityId, EntityKind, &RigidBody)>(&mut self, mut sync: F) {
        let engine = match &mut self.engine {
            Some(engine) => engine,
            None => return,
        };
        engine.step();

        for object in self.objects.iter() {
            if let Some(body) = engine.bodies.get(object.body) {
                sync(object.entity, object.kind, body);
            }
        }
    }

    pub fn entity_count(&self) -> usize {
        self.objects.len() + self.queued.len()
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.objects.iter().any(|o| o.entity == entity)
            || self.queued.iter().any(|q| q.entity == entity)
    }

    pub fn kind(&self, entity: EntityId) -> Option<EntityKind> {
        self.objects
            .iter()
            .find(|o| o.entity == entity)
            .map(|o| o.kind)
            .or_else(|| {
                self.queued
                    .iter()
                    .find(|q| q.entity == entity)
                    .map(|q| q.kind)
            })
    }

    pub fn material(&self, entity: EntityId) -> Option<Material> {
        self.objects
            .iter()
            .find(|o| o.entity == entity)
            .map(|o| o.material)
    }

    pub fn handle(&self, entity: EntityId) -> Option<RigidBodyHandle> {
        self.objects
            .iter()
            .find(|o| o.entity == entity)
            .map(|o| o.body)
    }

    pub fn body(&self, entity: EntityId) -> Option<&RigidBody> {
        let handle = self.handle(entity)?;
        self.engine.as_ref()?.bodies.get(handle)
    }

    pub fn body_mut(&mut self, entity: EntityId) -> Option<&mut RigidBody> {
        let handle = self.handle(entity)?;
        self.engine.as_mut()?.bodies.get_mut(handle)
    }

    pub fn pose(&self, entity: EntityId) -> Option<Isometry<Real>> {
        self.body(entity).map(|b| *b.position())
    }

    /// Moves a body to `pose` and brings it to rest.
    pub fn teleport(&mut self, entity: EntityId, pose: Isometry<Real>) -> Result<(), PhysicsError> {
        let handle = self
            .handle(entity)
            .ok_or(PhysicsError::MissingEntity(entity))?;
        let engine = self.engine.as_mut().ok_or(PhysicsError::NotReady)?;
        let body = engine
            .bodies
            .get_mut(handle)
            .ok_or(PhysicsError::MissingEntity(entity))?;
        body.set_position(pose, true);
        body.set_linvel(vector![0.0, 0.0, 0.0], true);
        body.set_angvel(vector![0.0, 0.0, 0.0], true);
        Ok(())
    }

    pub fn entities(&self) -> impl Iterator<Item = (EntityId, EntityKind)> + '_ {
        self.objects.iter().map(|o| (o.entity, o.kind))
    }
}

impl RayCaster for Physics {
    fn cast_ray(
        &self,
        origin: &Point<Real>,
        dir: &Vector<Real>,
        max_toi: Real,
        exclude: Option<EntityId>,
    ) -> Option<Real> {
        let engine = self.engine.as_ref()?;
        let mut filter = QueryFilter::new();
        if let Some(handle) = exclude.and_then(|e| self.handle(e)) {
            filter = filter.exclude_rigid_body(handle);
        }
        let ray = Ray::new(*origin, *dir);
        engine
            .query_pipeline
            .cast_ray(&engine.bodies, &engine.colliders, &ray, max_toi, true, filter)
            .map(|(_collider, toi)| toi)
    }
}
