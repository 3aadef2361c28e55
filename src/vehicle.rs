use crate::error::PhysicsError;
use crate::ground_probe::{GroundProbe, ProbeReport};
use crate::input::InputState;
use crate::physics::{EntityId, EntityKind, Material, Physics};
use crate::settings::{CarSettings, ProbeSettings};
use crate::utilities::{flatten, is_finite_vec, vec3};
use rapier3d::na::{Unit, UnitQuaternion};
use rapier3d::prelude::*;
use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;
use tracing::{debug, warn};

/// Car-local forward. Right is +X, up is +Y.
pub fn local_forward() -> Vector<Real> {
    -Vector::z()
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlipKind {
    Front,
    Back,
    Left,
    Right,
    FrontLeft,
    FrontRight,
    BackLeft,
    BackRight,
}

impl FlipKind {
    /// `None` means no direction is held: the double jump is a plain upward impulse.
    pub fn classify(input: &InputState) -> Option<FlipKind> {
        let longitudinal = input.forward as i8 - input.backward as i8;
        let lateral = input.right as i8 - input.left as i8;
        match (longitudinal, lateral) {
            (1, 0) => Some(FlipKind::Front),
            (-1, 0) => Some(FlipKind::Back),
            (0, -1) => Some(FlipKind::Left),
            (0, 1) => Some(FlipKind::Right),
            (1, -1) => Some(FlipKind::FrontLeft),
            (1, 1) => Some(FlipKind::FrontRight),
            (-1, -1) => Some(FlipKind::BackLeft),
            (-1, 1) => Some(FlipKind::BackRight),
            _ => None,
        }
    }

    /// (forward, right) components, each -1, 0 or 1.
    fn components(self) -> (Real, Real) {
        match self {
            FlipKind::Front => (1.0, 0.0),
            FlipKind::Back => (-1.0, 0.0),
            FlipKind::Left => (0.0, -1.0),
            FlipKind::Right => (0.0, 1.0),
            FlipKind::FrontLeft => (1.0, -1.0),
            FlipKind::FrontRight => (1.0, 1.0),
            FlipKind::BackLeft => (-1.0, -1.0),
            FlipKind::BackRight => (-1.0, 1.0),
        }
    }

    pub fn is_diagonal(self) -> bool {
        let (lon, lat) = self.components();
        lon != 0.0 && lat != 0.0
    }

    /// Horizontal car-local direction the flip launches toward.
    pub fn local_direction(self) -> Vector<Real> {
        let (lon, lat) = self.components();
        (local_forward() * lon + Vector::x() * lat).normalize()
    }

    /// Car-local rotation axis and the sign applied to the flip angle.
    ///
    /// Pitch turns about +X (a negative angle dips the nose), roll about +Z
    /// (a positive angle drops the left side). `diagonal_blend` scales the roll
    /// share of diagonal axes.
    pub fn local_axis(self, diagonal_blend: Real) -> (Unit<Vector<Real>>, Real) {
        let (lon, lat) = self.components();
        let pitch = -lon;
        let roll = if self.is_diagonal() {
            -lat * diagonal_blend
        } else {
            -lat
        };
        let direction = if pitch != 0.0 {
            pitch.signum()
        } else {
            roll.signum()
        };
        let axis = Unit::new_normalize(vector![pitch, 0.0, roll] * direction);
        (axis, direction)
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FlipState {
    pub kind: FlipKind,
    /// World-space axis, fixed at commit time.
    pub axis: Unit<Vector<Real>>,
    pub direction: Real,
    pub progress_ticks: u32,
    pub duration_ticks: u32,
    pub rotation_per_tick: Real,
    pub carried_linear_velocity: Vector<Real>,
    pub base_rotation: UnitQuaternion<Real>,
}

impl FlipState {
    pub fn commit(
        kind: FlipKind,
        rotation: &UnitQuaternion<Real>,
        linvel: &Vector<Real>,
        tuning: &CarSettings,
    ) -> FlipState {
        let (local_axis, direction) = kind.local_axis(tuning.diagonal_flip_blend);
        let axis = Unit::new_normalize(rotation * local_axis.into_inner());

        let heading = flatten(&(rotation * kind.local_direction()));
        let launch = if heading.norm() > 1.0e-4 {
            heading.normalize() * tuning.flip_boost
        } else {
            Vector::zeros()
        };

        let duration_ticks = tuning.flip_duration_ticks;
        FlipState {
            kind,
            axis,
            direction,
            progress_ticks: 0,
            duration_ticks,
            rotation_per_tick: TAU / duration_ticks as Real,
            carried_linear_velocity: linvel + launch,
            base_rotation: *rotation,
        }
    }

    pub fn is_well_formed(&self) -> bool {
        self.duration_ticks > 0
            && self.rotation_per_tick.is_finite()
            && self.direction.abs() == 1.0
            && is_finite_vec(&self.axis)
            && is_finite_vec(&self.carried_linear_velocity)
            && self.base_rotation.coords.iter().all(|c| c.is_finite())
    }

    /// Signed angle swept after `progress` ticks.
    pub fn angle_at(&self, progress: u32) -> Real {
        self.rotation_per_tick * progress as Real * self.direction
    }

    pub fn total_angle(&self) -> Real {
        self.rotation_per_tick * self.duration_ticks as Real
    }

    /// World-space rotation about the stored axis, pre-multiplied onto the commit orientation.
    pub fn rotation_at(&self, progress: u32) -> UnitQuaternion<Real> {
        UnitQuaternion::from_axis_angle(&self.axis, self.angle_at(progress)) * self.base_rotation
    }

    pub fn is_complete(&self) -> bool {
        self.progress_ticks >= self.duration_ticks
    }
}

/// The slice of rigid-body state the controller reads and writes each tick.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Kinematics {
    pub rotation: UnitQuaternion<Real>,
    pub linvel: Vector<Real>,
    pub angvel: Vector<Real>,
    pub inv_mass: Real,
}

impl Kinematics {
    pub fn from_body(body: &RigidBody) -> Kinematics {
        let mass = body.mass();
        Kinematics {
            rotation: *body.rotation(),
            linvel: *body.linvel(),
            angvel: *body.angvel(),
            inv_mass: if mass > 0.0 { 1.0 / mass } else { 0.0 },
        }
    }

    pub fn write_to(&self, body: &mut RigidBody) {
        body.set_rotation(self.rotation, true);
        body.set_linvel(self.linvel, true);
        body.set_angvel(self.angvel, true);
    }

    pub fn apply_impulse(&mut self, impulse: Vector<Real>) {
        self.linvel += impulse * self.inv_mass;
    }

    pub fn forward(&self) -> Vector<Real> {
        self.rotation * local_forward()
    }

    fn rotate_local(&mut self, axis: &Unit<Vector<Real>>, angle: Real) {
        self.rotation *= UnitQuaternion::from_axis_angle(axis, angle);
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct TickReport {
    pub impulse: Option<Vector<Real>>,
    pub flip_committed: Option<FlipKind>,
    pub flip_finished: bool,
    pub flip_aborted: bool,
    pub landed: bool,
    pub took_off: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VehicleState {
    pub grounded: bool,
    pub was_airborne_last_tick: bool,
    pub jump_cooldown_ticks: u32,
    pub double_jump_available: bool,
    pub jump_key_latched: bool,
    pub flip: Option<FlipState>,
    pub move_speed: Real,
    pub boost_force: Real,
    pub jump_impulse: Real,
}

impl VehicleState {
    pub fn new(tuning: &CarSettings) -> VehicleState {
        VehicleState {
            grounded: false,
            was_airborne_last_tick: true,
            jump_cooldown_ticks: 0,
            double_jump_available: false,
            jump_key_latched: false,
            flip: None,
            move_speed: tuning.move_speed,
            boost_force: tuning.boost_force,
            jump_impulse: tuning.jump_impulse,
        }
    }

    pub fn apply_tuning(&mut self, tuning: &CarSettings) {
        self.move_speed = tuning.move_speed;
        self.boost_force = tuning.boost_force;
        self.jump_impulse = tuning.jump_impulse;
    }

    pub fn is_flipping(&self) -> bool {
        self.flip.is_some()
    }

    pub fn tick(
        &mut self,
        input: &InputState,
        grounded: bool,
        kin: &mut Kinematics,
        tuning: &CarSettings,
    ) -> TickReport {
        let mut report = TickReport::default();
        self.observe_ground(grounded, &mut report);

        if self.jump_cooldown_ticks > 0 {
            self.jump_cooldown_ticks -= 1;
        }
        let jump_pressed = input.jump && !self.jump_key_latched;
        self.jump_key_latched = input.jump;

        if jump_pressed && self.jump_cooldown_ticks == 0 && self.flip.is_none() {
            if self.grounded {
                self.jump(kin, tuning, &mut report);
            } else if self.double_jump_available {
                self.double_jump(input, kin, tuning, &mut report);
            }
        }

        let flipping = self.flip.is_some();
        if flipping {
            self.advance_flip(kin, tuning, &mut report);
        } else if self.grounded {
            self.drive(input, kin, tuning);
        } else {
            self.steer_in_air(input, kin, tuning);
        }

        if input.boost {
            self.boost(kin, tuning);
        }
        // A flip keeps its carried velocity uncapped.
        if !flipping {
            clamp_horizontal_speed(kin, tuning.max_speed);
        }

        report
    }

    fn observe_ground(&mut self, grounded: bool, report: &mut TickReport) {
        self.was_airborne_last_tick = !self.grounded;
        if grounded && !self.grounded {
            self.double_jump_available = true;
            report.landed = true;
        }
        if !grounded && self.grounded {
            report.took_off = true;
        }
        self.grounded = grounded;
    }

    fn jump(&mut self, kin: &mut Kinematics, tuning: &CarSettings, report: &mut TickReport) {
        let impulse = Vector::y() * self.jump_impulse;
        kin.apply_impulse(impulse);
        report.impulse = Some(impulse);
        self.jump_cooldown_ticks = tuning.jump_cooldown_ticks;
    }

    fn double_jump(
        &mut self,
        input: &InputState,
        kin: &mut Kinematics,
        tuning: &CarSettings,
        report: &mut TickReport,
    ) {
        match FlipKind::classify(input) {
            None => {
                let impulse = Vector::y() * self.jump_impulse;
                kin.apply_impulse(impulse);
                report.impulse = Some(impulse);
            }
            Some(kind) => {
                self.flip = Some(FlipState::commit(kind, &kin.rotation, &kin.linvel, tuning));
                report.flip_committed = Some(kind);
            }
        }
        self.double_jump_available = false;
        self.jump_cooldown_ticks = tuning.jump_cooldown_ticks;
    }

    fn advance_flip(
        &mut self,
        kin: &mut Kinematics,
        tuning: &CarSettings,
        report: &mut TickReport,
    ) {
        let mut flip = match self.flip {
            Some(flip) => flip,
            None => return,
        };
        if !flip.is_well_formed() {
            self.flip = None;
            report.flip_aborted = true;
            return;
        }

        flip.progress_ticks += 1;
        kin.rotation = flip.rotation_at(flip.progress_ticks);
        kin.angvel = Vector::zeros();

        flip.carried_linear_velocity.y *= tuning.flip_vertical_decay;
        kin.linvel = flip.carried_linear_velocity;

        if flip.is_complete() {
            self.flip = None;
            report.flip_finished = true;
        } else {
            self.flip = Some(flip);
        }
    }

    fn drive(&self, input: &InputState, kin: &mut Kinematics, tuning: &CarSettings) {
        let throttle = (input.forward as i8 - input.backward as i8) as Real;
        if throttle != 0.0 {
            let v = kin.forward() * self.move_speed * throttle;
            kin.linvel = vector![v.x, kin.linvel.y, v.z];

            let steer = (input.left as i8 - input.right as i8) as Real;
            if steer != 0.0 {
                // Reversing swings the nose the other way.
                kin.rotate_local(&Vector::y_axis(), tuning.turn_rate * steer * throttle);
            }
        }
        kin.angvel = Vector::zeros();
    }

    fn steer_in_air(&self, input: &InputState, kin: &mut Kinematics, tuning: &CarSettings) {
        let pitch = (input.backward as i8 - input.forward as i8) as Real * tuning.air_pitch_rate;
        let yaw = (input.left as i8 - input.right as i8) as Real * tuning.air_yaw_rate;
        let roll =
            (input.barrel_left as i8 - input.barrel_right as i8) as Real * tuning.air_roll_rate;

        for (axis, angle) in [
            (Vector::x_axis(), pitch),
            (Vector::y_axis(), yaw),
            (Vector::z_axis(), roll),
        ] {
            if angle != 0.0 {
                kin.rotate_local(&axis, angle);
                kin.angvel = Vector::zeros();
            }
        }
    }

    fn boost(&self, kin: &mut Kinematics, tuning: &CarSettings) {
        // Boost pushes along the ground plane only.
        let push = flatten(&kin.forward()) * self.boost_force;
        let vy = kin.linvel.y;
        let y = if vy > tuning.boost_rising_threshold {
            vy
        } else {
            vy * tuning.boost_gravity_weight
        };
        kin.linvel = vector![kin.linvel.x + push.x, y, kin.linvel.z + push.z];
    }
}

fn clamp_horizontal_speed(kin: &mut Kinematics, max_speed: Real) {
    let horizontal = flatten(&kin.linvel);
    let speed = horizontal.norm();
    if speed > max_speed && speed > 0.0 {
        let scaled = horizontal * (max_speed / speed);
        kin.linvel = vector![scaled.x, kin.linvel.y, scaled.z];
    }
}

pub struct VehicleController {
    entity: EntityId,
    half_extents: Vector<Real>,
    tuning: CarSettings,
    probe: GroundProbe,
    state: VehicleState,
    last_probe: ProbeReport,
}

impl VehicleController {
    pub fn spawn(
        physics: &mut Physics,
        tuning: &CarSettings,
        probe: &ProbeSettings,
    ) -> VehicleController {
        let half_extents = vec3(tuning.half_extents());
        let entity = physics.add_entity(
            EntityKind::Car { half_extents },
            Isometry::translation(tuning.spawn[0], tuning.spawn[1], tuning.spawn[2]),
            material(tuning),
        );

        VehicleController {
            entity,
            half_extents,
            tuning: tuning.clone(),
            probe: GroundProbe::new(probe),
            state: VehicleState::new(tuning),
            last_probe: ProbeReport::default(),
        }
    }

    /// Runs one control tick. Returns `None` while the car has no body yet.
    pub fn update(&mut self, physics: &mut Physics, input: &InputState) -> Option<TickReport> {
        let pose = match physics.pose(self.entity) {
            Some(pose) => pose,
            None => {
                self.state.jump_key_latched = input.jump;
                return None;
            }
        };

        self.last_probe = self
            .probe
            .probe(&*physics, &pose, &self.half_extents, Some(self.entity));

        let body = physics.body_mut(self.entity)?;
        let mut kin = Kinematics::from_body(body);
        let report = self
            .state
            .tick(input, self.last_probe.grounded, &mut kin, &self.tuning);
        kin.write_to(body);

        self.log(&report);
        Some(report)
    }

    fn log(&self, report: &TickReport) {
        if report.landed {
            debug!(entity = ?self.entity, "car landed");
        }
        if report.took_off {
            debug!(entity = ?self.entity, "car left the ground");
        }
        if let Some(impulse) = report.impulse {
            debug!(entity = ?self.entity, impulse = impulse.y, "jump");
        }
        if let Some(kind) = report.flip_committed {
            debug!(entity = ?self.entity, ?kind, "flip committed");
        }
        if report.flip_finished {
            debug!(entity = ?self.entity, "flip finished");
        }
        if report.flip_aborted {
            warn!(entity = ?self.entity, "malformed flip aborted");
        }
    }

    /// Applies new tuning; a hitbox change rebuilds the body in place.
    pub fn apply_settings(
        &mut self,
        physics: &mut Physics,
        tuning: &CarSettings,
        probe: &ProbeSettings,
    ) -> Result<(), PhysicsError> {
        let half_extents = vec3(tuning.half_extents());
        let material_changed = material(tuning) != material(&self.tuning);
        if half_extents != self.half_extents || material_changed {
            physics.rebuild_with(self.entity, EntityKind::Car { half_extents }, material(tuning))?;
            self.half_extents = half_extents;
        }

        self.tuning = tuning.clone();
        self.probe = GroundProbe::new(probe);
        self.state.apply_tuning(tuning);
        Ok(())
    }

    /// Puts the car back on its spawn point with fresh state.
    pub fn reset(&mut self, physics: &mut Physics) -> Result<(), PhysicsError> {
        let spawn = self.tuning.spawn;
        physics.teleport(self.entity, Isometry::translation(spawn[0], spawn[1], spawn[2]))?;
        self.state = VehicleState::new(&self.tuning);
        self.last_probe = ProbeReport::default();
        Ok(())
    }

    pub fn entity(&self) -> EntityId {
        self.entity
    }

    pub fn state(&self) -> &VehicleState {
        &self.state
    }

    pub fn last_probe(&self) -> &ProbeReport {
        &self.last_probe
    }

    pub fn half_extents(&self) -> Vector<Real> {
        self.half_extents
    }

    pub fn tuning(&self) -> &CarSettings {
        &self.tuning
    }
}

fn material(tuning: &CarSettings) -> Material {
    Material {
        density: tuning.density,
        friction: tuning.friction,
        restitution: tuning.restitution,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Key;
    use approx::assert_relative_eq;

    fn tuning() -> CarSettings {
        CarSettings::default()
    }

    fn kin() -> Kinematics {
        Kinematics {
            rotation: UnitQuaternion::identity(),
            linvel: Vector::zeros(),
            angvel: Vector::zeros(),
            inv_mass: 0.5,
        }
    }

    fn idle() -> InputState {
        InputState::default()
    }

    fn jump() -> InputState {
        idle().with(Key::Jump)
    }

    fn level_flip(kind: FlipKind, t: &CarSettings) -> FlipState {
        FlipState::commit(kind, &UnitQuaternion::identity(), &Vector::zeros(), t)
    }

    /// Grounded car that has seen at least one grounded tick.
    fn settled() -> VehicleState {
        let mut state = VehicleState::new(&tuning());
        state.tick(&idle(), true, &mut kin(), &tuning());
        state
    }

    #[test]
    fn cooldown_blocks_a_second_ground_jump() {
        let t = tuning();
        let mut state = settled();
        let mut k = kin();

        let report = state.tick(&jump(), true, &mut k, &t);
        assert_eq!(report.impulse, Some(vector![0.0, t.jump_impulse, 0.0]));
        assert_eq!(state.jump_cooldown_ticks, 10);

        // Fresh press edges every tick, still grounded: all inside the window.
        for tick in 1..10 {
            let input = if tick % 2 == 0 { jump() } else { idle() };
            let report = state.tick(&input, true, &mut k, &t);
            assert_eq!(report.impulse, None, "tick {}", tick);
        }

        // Tick 10 with a new edge: the window has closed.
        state.tick(&idle(), true, &mut k, &t);
        let report = state.tick(&jump(), true, &mut k, &t);
        assert!(report.impulse.is_some());
    }

    #[test]
    fn cooldown_expires_on_the_tenth_tick() {
        let t = tuning();
        let mut state = settled();
        let mut k = kin();
        state.tick(&jump(), true, &mut k, &t);

        for tick in 1..10 {
            let input = if tick == 9 { idle() } else { jump() };
            assert_eq!(state.tick(&input, true, &mut k, &t).impulse, None);
        }
        let report = state.tick(&jump(), true, &mut k, &t);
        assert!(report.impulse.is_some());
    }

    #[test]
    fn held_jump_key_fires_once() {
        let t = tuning();
        let mut state = settled();
        let mut k = kin();

        let mut impulses = 0;
        for _ in 0..40 {
            if state.tick(&jump(), true, &mut k, &t).impulse.is_some() {
                impulses += 1;
            }
        }
        assert_eq!(impulses, 1);
    }

    #[test]
    fn ground_jump_adds_velocity_through_inverse_mass() {
        let t = tuning();
        let mut state = settled();
        let mut k = kin();
        k.linvel = vector![1.0, 0.0, 0.0];

        state.tick(&jump(), true, &mut k, &t);
        assert_relative_eq!(k.linvel.y, t.jump_impulse * 0.5);
        assert!(state.double_jump_available);
    }

    #[test]
    fn double_jump_is_consumed_until_next_landing() {
        let t = tuning();
        let mut state = settled();
        let mut k = kin();
        assert!(state.double_jump_available);

        state.tick(&idle(), false, &mut k, &t);
        let report = state.tick(&jump(), false, &mut k, &t);
        assert!(report.impulse.is_some());
        assert!(!state.double_jump_available);

        // Still airborne, cooldown long gone: nothing left to spend.
        for _ in 0..20 {
            state.tick(&idle(), false, &mut k, &t);
        }
        let report = state.tick(&jump(), false, &mut k, &t);
        assert_eq!(report, TickReport::default());
        assert!(!state.double_jump_available);

        let report = state.tick(&idle(), true, &mut k, &t);
        assert!(report.landed);
        assert!(state.double_jump_available);
    }

    #[test]
    fn flip_commit_consumes_double_jump() {
        let t = tuning();
        let mut state = settled();
        let mut k = kin();
        state.tick(&idle(), false, &mut k, &t);

        let report = state.tick(&jump().with(Key::Forward), false, &mut k, &t);
        assert_eq!(report.flip_committed, Some(FlipKind::Front));
        assert!(!state.double_jump_available);
        assert!(state.is_flipping());
    }

    #[test]
    fn landing_mid_flip_restores_double_jump_but_keeps_the_flip() {
        let t = tuning();
        let mut state = settled();
        let mut k = kin();
        state.tick(&idle(), false, &mut k, &t);
        state.tick(&jump().with(Key::Left), false, &mut k, &t);

        let report = state.tick(&idle(), true, &mut k, &t);
        assert!(report.landed);
        assert!(state.double_jump_available);
        assert!(state.is_flipping());
    }

    #[test]
    fn grounded_jump_with_direction_never_starts_a_flip() {
        let t = tuning();
        let mut state = settled();
        let mut k = kin();

        let report = state.tick(&jump().with(Key::Forward).with(Key::Left), true, &mut k, &t);
        assert!(report.impulse.is_some());
        assert_eq!(report.flip_committed, None);
        assert!(!state.is_flipping());
    }

    #[test]
    fn classify_covers_every_direction_combination() {
        let cases = [
            (vec![], None),
            (vec![Key::Forward], Some(FlipKind::Front)),
            (vec![Key::Backward], Some(FlipKind::Back)),
            (vec![Key::Left], Some(FlipKind::Left)),
            (vec![Key::Right], Some(FlipKind::Right)),
            (vec![Key::Forward, Key::Left], Some(FlipKind::FrontLeft)),
            (vec![Key::Forward, Key::Right], Some(FlipKind::FrontRight)),
            (vec![Key::Backward, Key::Left], Some(FlipKind::BackLeft)),
            (vec![Key::Backward, Key::Right], Some(FlipKind::BackRight)),
            (vec![Key::Forward, Key::Backward], None),
            (vec![Key::Left, Key::Right, Key::Forward], Some(FlipKind::Front)),
        ];
        for (keys, expected) in cases.iter() {
            let mut input = idle();
            for k in keys {
                input.set(*k, true);
            }
            assert_eq!(FlipKind::classify(&input), *expected, "{:?}", keys);
        }
    }

    const KINDS: [FlipKind; 8] = [
        FlipKind::Front,
        FlipKind::Back,
        FlipKind::Left,
        FlipKind::Right,
        FlipKind::FrontLeft,
        FlipKind::FrontRight,
        FlipKind::BackLeft,
        FlipKind::BackRight,
    ];

    #[test]
    fn every_flip_sweeps_one_full_revolution() {
        let t = tuning();
        let rotation = UnitQuaternion::from_euler_angles(0.1, 0.8, -0.2);
        for kind in KINDS.iter() {
            let flip = FlipState::commit(*kind, &rotation, &Vector::zeros(), &t);
            assert_relative_eq!(flip.total_angle(), TAU, epsilon = 1.0e-5);
            assert_relative_eq!(flip.direction.abs(), 1.0);

            let end = flip.rotation_at(flip.duration_ticks);
            assert!(end.angle_to(&rotation) < 1.0e-3, "{:?}", kind);

            let halfway = flip.rotation_at(flip.duration_ticks / 2);
            assert_relative_eq!(
                halfway.angle_to(&rotation),
                std::f32::consts::PI,
                epsilon = 1.0e-3
            );
        }
    }

    #[test]
    fn flip_runs_for_exactly_its_duration() {
        let t = tuning();
        let mut state = settled();
        let mut k = kin();
        state.tick(&idle(), false, &mut k, &t);
        let start = k.rotation;

        let report = state.tick(&jump().with(Key::Backward), false, &mut k, &t);
        assert_eq!(report.flip_committed, Some(FlipKind::Back));

        let mut ticks = 1;
        while state.is_flipping() {
            let report = state.tick(&idle(), false, &mut k, &t);
            ticks += 1;
            assert!(ticks <= t.flip_duration_ticks);
            if !state.is_flipping() {
                assert!(report.flip_finished);
            }
        }
        assert_eq!(ticks, t.flip_duration_ticks);
        assert!(k.rotation.angle_to(&start) < 1.0e-3);
    }

    #[test]
    fn front_flip_dips_the_nose_first() {
        let t = tuning();
        let flip = level_flip(FlipKind::Front, &t);
        let nose = flip.rotation_at(3) * local_forward();
        assert!(nose.y < 0.0);

        let flip = level_flip(FlipKind::Back, &t);
        let nose = flip.rotation_at(3) * local_forward();
        assert!(nose.y > 0.0);
    }

    #[test]
    fn side_flips_drop_the_matching_side() {
        let t = tuning();
        let left = level_flip(FlipKind::Left, &t);
        let right_side = left.rotation_at(3) * Vector::x();
        assert!(right_side.y > 0.0);

        let right = level_flip(FlipKind::Right, &t);
        let right_side = right.rotation_at(3) * Vector::x();
        assert!(right_side.y < 0.0);
    }

    #[test]
    fn flip_axis_follows_the_car_heading() {
        let t = tuning();
        let yawed = UnitQuaternion::from_axis_angle(&Vector::y_axis(), std::f32::consts::FRAC_PI_2);
        let flip = FlipState::commit(FlipKind::Front, &yawed, &Vector::zeros(), &t);

        let expected = yawed * Vector::x();
        assert_relative_eq!(flip.axis.into_inner(), expected, epsilon = 1.0e-5);

        // Launch follows the yawed nose, which now points at -X.
        assert_relative_eq!(flip.carried_linear_velocity.x, -t.flip_boost, epsilon = 1.0e-4);
        assert_relative_eq!(flip.carried_linear_velocity.z, 0.0, epsilon = 1.0e-4);
    }

    #[test]
    fn diagonal_axes_are_unit_length_and_blendable() {
        for kind in KINDS.iter() {
            for blend in [0.5, 1.0, 2.0].iter() {
                let (axis, direction) = kind.local_axis(*blend);
                assert_relative_eq!(axis.norm(), 1.0, epsilon = 1.0e-6);
                assert_eq!(direction.abs(), 1.0);
            }
        }
        let (narrow, _) = FlipKind::FrontLeft.local_axis(0.5);
        let (wide, _) = FlipKind::FrontLeft.local_axis(2.0);
        assert!(narrow.z.abs() < wide.z.abs());
    }

    #[test]
    fn fast_flip_is_not_speed_capped() {
        let t = tuning();
        let mut state = settled();
        let mut k = kin();
        state.tick(&idle(), false, &mut k, &t);
        k.linvel = vector![0.0, 2.0, -20.0];

        state.tick(&jump().with(Key::Forward), false, &mut k, &t);
        let flip = state.flip.unwrap();
        assert_relative_eq!(flip.carried_linear_velocity.z, -20.0 - t.flip_boost, epsilon = 1.0e-4);
        assert!(flip.carried_linear_velocity.z < -t.max_speed);
        assert_eq!(k.linvel, flip.carried_linear_velocity);

        state.tick(&idle(), false, &mut k, &t);
        assert_eq!(k.linvel, state.flip.unwrap().carried_linear_velocity);
    }

    #[test]
    fn flip_carries_momentum_and_decays_vertical_velocity() {
        let t = tuning();
        let mut state = settled();
        let mut k = kin();
        state.tick(&idle(), false, &mut k, &t);
        k.linvel = vector![2.0, 4.0, 0.0];

        state.tick(&jump().with(Key::Right), false, &mut k, &t);
        assert_relative_eq!(k.linvel.y, 4.0 * t.flip_vertical_decay, epsilon = 1.0e-5);
        assert_relative_eq!(k.linvel.x, 2.0 + t.flip_boost, epsilon = 1.0e-5);

        // Physics may change the body's velocity between ticks; the flip overrides it.
        k.linvel = Vector::zeros();
        state.tick(&idle(), false, &mut k, &t);
        let decay = t.flip_vertical_decay;
        assert_relative_eq!(k.linvel.y, 4.0 * decay * decay, epsilon = 1.0e-5);
        assert_relative_eq!(k.linvel.x, 2.0 + t.flip_boost, epsilon = 1.0e-5);
        assert_eq!(k.angvel, Vector::zeros());
    }

    #[test]
    fn inputs_during_a_flip_cannot_start_another() {
        let t = tuning();
        let mut state = settled();
        let mut k = kin();
        state.tick(&idle(), false, &mut k, &t);
        state.tick(&jump().with(Key::Forward), false, &mut k, &t);
        let committed = state.flip.unwrap();

        // Land, regain double jump, spam jump with a new direction.
        for i in 0..(t.flip_duration_ticks - 2) {
            let input = if i % 2 == 0 { jump().with(Key::Left) } else { idle() };
            let report = state.tick(&input, i > 3, &mut k, &t);
            assert_eq!(report.flip_committed, None);
            assert_eq!(report.impulse, None);
            assert_eq!(state.flip.unwrap().kind, committed.kind);
        }
    }

    #[test]
    fn malformed_flip_is_aborted() {
        let t = tuning();
        let mut state = settled();
        let mut k = kin();
        state.tick(&idle(), false, &mut k, &t);

        let mut bad = FlipState::commit(FlipKind::Front, &k.rotation, &k.linvel, &t);
        bad.duration_ticks = 0;
        state.flip = Some(bad);

        let report = state.tick(&idle(), false, &mut k, &t);
        assert!(report.flip_aborted);
        assert!(!state.is_flipping());
        assert!(k.rotation.coords.iter().all(|c| c.is_finite()));
    }

    #[test]
    fn zero_duration_tuning_aborts_instead_of_spinning() {
        let mut t = tuning();
        t.flip_duration_ticks = 0;
        let mut state = settled();
        let mut k = kin();
        state.tick(&idle(), false, &mut k, &t);

        let report = state.tick(&jump().with(Key::Forward), false, &mut k, &t);
        assert_eq!(report.flip_committed, Some(FlipKind::Front));
        assert!(report.flip_aborted);
        assert!(!state.is_flipping());
    }

    #[test]
    fn driving_keeps_vertical_velocity_and_zeroes_spin() {
        let t = tuning();
        let mut state = settled();
        let mut k = kin();
        k.linvel = vector![0.0, -3.0, 0.0];
        k.angvel = vector![0.4, 0.2, 0.1];

        state.tick(&idle().with(Key::Forward), true, &mut k, &t);
        assert_relative_eq!(k.linvel, vector![0.0, -3.0, -t.move_speed], epsilon = 1.0e-5);
        assert_eq!(k.angvel, Vector::zeros());

        state.tick(&idle().with(Key::Backward), true, &mut k, &t);
        assert_relative_eq!(k.linvel, vector![0.0, -3.0, t.move_speed], epsilon = 1.0e-5);
    }

    #[test]
    fn steering_only_turns_while_moving() {
        let t = tuning();
        let mut state = settled();
        let mut k = kin();

        state.tick(&idle().with(Key::Left), true, &mut k, &t);
        assert_eq!(k.rotation, UnitQuaternion::identity());

        state.tick(&idle().with(Key::Forward).with(Key::Left), true, &mut k, &t);
        assert!(k.forward().x < 0.0);
        assert_relative_eq!(k.rotation.angle(), t.turn_rate, epsilon = 1.0e-5);
    }

    #[test]
    fn reversing_inverts_steering() {
        let t = tuning();
        let mut state = settled();
        let mut k = kin();
        state.tick(&idle().with(Key::Backward).with(Key::Left), true, &mut k, &t);
        assert!(k.forward().x > 0.0);
    }

    #[test]
    fn air_controls_rotate_about_local_axes() {
        let t = tuning();
        let mut state = settled();
        let mut k = kin();
        state.tick(&idle(), false, &mut k, &t);
        k.angvel = vector![1.0, 1.0, 1.0];

        state.tick(&idle().with(Key::Forward), false, &mut k, &t);
        assert!(k.forward().y < 0.0);
        assert_eq!(k.angvel, Vector::zeros());

        let mut k = kin();
        state.tick(&idle().with(Key::BarrelLeft), false, &mut k, &t);
        assert!((k.rotation * Vector::x()).y > 0.0);

        let mut k = kin();
        state.tick(&idle().with(Key::Right), false, &mut k, &t);
        assert!(k.forward().x > 0.0);
    }

    #[test]
    fn air_without_input_keeps_physics_spin() {
        let t = tuning();
        let mut state = settled();
        let mut k = kin();
        state.tick(&idle(), false, &mut k, &t);
        k.angvel = vector![0.0, 2.0, 0.0];
        state.tick(&idle(), false, &mut k, &t);
        assert_eq!(k.angvel, vector![0.0, 2.0, 0.0]);
    }

    #[test]
    fn boost_passes_rising_velocity_through() {
        let t = tuning();
        let mut state = settled();
        let mut k = kin();
        state.tick(&idle(), false, &mut k, &t);
        k.linvel = vector![0.0, 5.0, 0.0];

        state.tick(&idle().with(Key::Boost), false, &mut k, &t);
        assert_relative_eq!(k.linvel.y, 5.0);
        assert_relative_eq!(k.linvel.z, -t.boost_force, epsilon = 1.0e-5);
    }

    #[test]
    fn boost_blends_falling_velocity_toward_gravity() {
        let t = tuning();
        let mut state = settled();
        let mut k = kin();
        state.tick(&idle(), false, &mut k, &t);
        k.linvel = vector![0.0, -5.0, 0.0];

        state.tick(&idle().with(Key::Boost), false, &mut k, &t);
        assert_relative_eq!(k.linvel.y, -5.0 * t.boost_gravity_weight, epsilon = 1.0e-5);
        assert!(k.linvel.y < 0.0);
    }

    #[test]
    fn boost_is_capped_at_max_speed() {
        let t = tuning();
        let mut state = settled();
        let mut k = kin();
        for _ in 0..200 {
            state.tick(&idle().with(Key::Boost), false, &mut k, &t);
        }
        assert_relative_eq!(flatten(&k.linvel).norm(), t.max_speed, epsilon = 1.0e-3);
    }

    #[test]
    fn landing_is_reported_once() {
        let t = tuning();
        let mut state = VehicleState::new(&t);
        let mut k = kin();

        assert!(!state.double_jump_available);
        assert!(state.tick(&idle(), true, &mut k, &t).landed);
        assert!(!state.tick(&idle(), true, &mut k, &t).landed);
        assert!(!state.was_airborne_last_tick);

        assert!(state.tick(&idle(), false, &mut k, &t).took_off);
        assert!(state.tick(&idle(), true, &mut k, &t).landed);
        assert!(state.was_airborne_last_tick);
    }
}
