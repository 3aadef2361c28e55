use crate::settings::CameraSettings;
use crate::utilities::vec3;
use rapier3d::na::UnitQuaternion;
use rapier3d::prelude::*;

/// Progress this close to 1 counts as settled; absorbs accumulated rounding of the blend rate.
const SETTLE_EPSILON: Real = 1.0e-4;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CameraTrackState {
    pub transition_progress: Real,
    pub last_grounded_rotation: UnitQuaternion<Real>,
    /// Orientation held while airborne and blended away from after landing.
    pub air_rotation: UnitQuaternion<Real>,
    pub was_airborne: bool,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CameraTransform {
    pub position: Point<Real>,
    pub target: Point<Real>,
    pub rotation: UnitQuaternion<Real>,
}

/// Chase camera that holds still through jumps and flips and eases back on landing.
#[derive(Debug, Clone)]
pub struct CameraTracker {
    backward_offset: Vector<Real>,
    height: Real,
    blend_rate: Real,
    state: Option<CameraTrackState>,
}

impl CameraTracker {
    pub fn new(settings: &CameraSettings) -> CameraTracker {
        CameraTracker {
            backward_offset: vec3(settings.backward_offset),
            height: settings.height,
            blend_rate: settings.blend_rate,
            state: None,
        }
    }

    pub fn apply_settings(&mut self, settings: &CameraSettings) {
        self.backward_offset = vec3(settings.backward_offset);
        self.height = settings.height;
        self.blend_rate = settings.blend_rate;
    }

    pub fn state(&self) -> Option<&CameraTrackState> {
        self.state.as_ref()
    }

    pub fn transition_progress(&self) -> Real {
        self.state.map_or(1.0, |s| s.transition_progress)
    }

    /// Advances one tick. Returns `None` until a finite car pose has been seen.
    pub fn update(&mut self, car: &Isometry<Real>, grounded: bool) -> Option<CameraTransform> {
        let finite = car.translation.vector.iter().all(|c| c.is_finite())
            && car.rotation.coords.iter().all(|c| c.is_finite());
        if !finite {
            return None;
        }

        let live = car.rotation;
        let state = self.state.get_or_insert(CameraTrackState {
            transition_progress: 1.0,
            last_grounded_rotation: live,
            air_rotation: live,
            was_airborne: !grounded,
        });

        let rotation = if grounded {
            if state.was_airborne {
                state.transition_progress = 0.0;
            }
            if state.transition_progress < 1.0 {
                state.transition_progress += self.blend_rate;
                if state.transition_progress >= 1.0 - SETTLE_EPSILON {
                    state.transition_progress = 1.0;
                }
            }

            if state.transition_progress < 1.0 {
                state
                    .air_rotation
                    .try_slerp(&live, state.transition_progress, 1.0e-6)
                    .unwrap_or(live)
            } else {
                state.last_grounded_rotation = live;
                live
            }
        } else {
            // Frozen at the last settled orientation, never a half-finished blend.
            if !state.was_airborne {
                state.air_rotation = state.last_grounded_rotation;
            }
            state.air_rotation
        };
        state.was_airborne = !grounded;

        Some(self.place(car, rotation))
    }

    fn place(&self, car: &Isometry<Real>, rotation: UnitQuaternion<Real>) -> CameraTransform {
        let target = Point::from(car.translation.vector);
        CameraTransform {
            position: target + rotation * self.backward_offset + Vector::y() * self.height,
            target,
            rotation,
        }
    }
}
