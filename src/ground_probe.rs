use crate::physics::EntityId;
use crate::settings::ProbeSettings;
use crate::utilities::is_finite_vec;
use rapier3d::prelude::*;
use tracing::warn;

/// Bottom corners in hitbox units: rear-left, rear-right, front-right, front-left.
pub const CORNERS: [(Real, Real); 4] = [(-1.0, 1.0), (1.0, 1.0), (1.0, -1.0), (-1.0, -1.0)];

pub trait RayCaster {
    /// Distance along `dir` to the first collider hit within `max_toi`.
    fn cast_ray(
        &self,
        origin: &Point<Real>,
        dir: &Vector<Real>,
        max_toi: Real,
        exclude: Option<EntityId>,
    ) -> Option<Real>;
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ProbeRay {
    pub corner: usize,
    pub origin: Point<Real>,
    pub end: Point<Real>,
    pub hit: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeReport {
    pub hits: usize,
    pub grounded: bool,
    /// Only samples that produced finite geometry.
    pub rays: Vec<ProbeRay>,
    pub skipped: usize,
}

/// Grounded only when every corner reports a hit.
pub fn all_corners_hit(hits: &[bool]) -> bool {
    hits.len() == CORNERS.len() && hits.iter().all(|h| *h)
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct GroundProbe {
    pub ray_length: Real,
    pub corner_epsilon: Real,
}

impl GroundProbe {
    pub fn new(settings: &ProbeSettings) -> GroundProbe {
        GroundProbe {
            ray_length: settings.ray_length,
            corner_epsilon: settings.corner_epsilon,
        }
    }

    /// World-space ray origins, just below the hitbox's bottom face.
    pub fn corner_origins(
        &self,
        pose: &Isometry<Real>,
        half_extents: &Vector<Real>,
    ) -> [Point<Real>; 4] {
        let mut origins = [Point::origin(); 4];
        for (i, (sx, sz)) in CORNERS.iter().enumerate() {
            let local = point![
                sx * half_extents.x,
                -(half_extents.y + self.corner_epsilon),
                sz * half_extents.z
            ];
            origins[i] = pose * local;
        }
        origins
    }

    pub fn probe<C: RayCaster + ?Sized>(
        &self,
        caster: &C,
        pose: &Isometry<Real>,
        half_extents: &Vector<Real>,
        exclude: Option<EntityId>,
    ) -> ProbeReport {
        let down = pose.rotation * -Vector::y();
        let origins = self.corner_origins(pose, half_extents);

        let mut report = ProbeReport::default();
        let mut hits = [false; 4];

        for (corner, origin) in origins.iter().enumerate() {
            if !is_finite_vec(&origin.coords) || !is_finite_vec(&down) {
                report.skipped += 1;
                continue;
            }

            let toi = caster.cast_ray(origin, &down, self.ray_length, exclude);
            if toi.map_or(false, |t| !t.is_finite()) {
                report.skipped += 1;
                continue;
            }

            let hit = toi.is_some();
            let end = origin + down * toi.unwrap_or(self.ray_length);
            hits[corner] = hit;
            report.rays.push(ProbeRay {
                corner,
                origin: *origin,
                end,
                hit,
            });
        }

        if report.skipped > 0 {
            warn!(skipped = report.skipped, "ground probe produced non-finite samples");
        }

        report.hits = hits.iter().filter(|h| **h).count();
        report.grounded = report.skipped == 0 && all_corners_hit(&hits);
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_xorshift::XorShiftRng;
    use std::cell::RefCell;

    /// Answers rays from a fixed per-corner table, in cast order.
    struct ScriptedCaster {
        answers: RefCell<Vec<Option<Real>>>,
    }

    impl ScriptedCaster {
        fn new(mut answers: Vec<Option<Real>>) -> ScriptedCaster {
            answers.reverse();
            ScriptedCaster {
                answers: RefCell::new(answers),
            }
        }
    }

    impl RayCaster for ScriptedCaster {
        fn cast_ray(
            &self,
            _origin: &Point<Real>,
            _dir: &Vector<Real>,
            _max_toi: Real,
            _exclude: Option<EntityId>,
        ) -> Option<Real> {
            self.answers.borrow_mut().pop().flatten()
        }
    }

    /// Flat infinite plane at y = 0.
    struct Plane;

    impl RayCaster for Plane {
        fn cast_ray(
            &self,
            origin: &Point<Real>,
            dir: &Vector<Real>,
            max_toi: Real,
            _exclude: Option<EntityId>,
        ) -> Option<Real> {
            if dir.y >= 0.0 {
                return None;
            }
            let t = -origin.y / dir.y;
            if t >= 0.0 && t <= max_toi {
                Some(t)
            } else {
                None
            }
        }
    }

    fn probe() -> GroundProbe {
        GroundProbe {
            ray_length: 0.3,
            corner_epsilon: 0.01,
        }
    }

    fn half() -> Vector<Real> {
        vector![1.0, 0.35, 1.8]
    }

    #[test]
    fn grounded_requires_all_four_hits() {
        let mut rng = XorShiftRng::seed_from_u64(7);
        for _ in 0..200 {
            let pattern: Vec<bool> = (0..4).map(|_| rng.gen_bool(0.7)).collect();
            let caster = ScriptedCaster::new(
                pattern.iter().map(|h| if *h { Some(0.1) } else { None }).collect(),
            );
            let report = probe().probe(&caster, &Isometry::identity(), &half(), None);

            assert_eq!(report.grounded, pattern.iter().all(|h| *h));
            assert_eq!(report.hits, pattern.iter().filter(|h| **h).count());
        }
    }

    #[test]
    fn one_missing_corner_makes_the_car_airborne() {
        for missing in 0..4 {
            let mut answers = vec![Some(0.05); 4];
            answers[missing] = None;
            let report =
                probe().probe(&ScriptedCaster::new(answers), &Isometry::identity(), &half(), None);

            assert!(!report.grounded);
            assert_eq!(report.hits, 3);
            assert!(!report.rays[missing].hit);
        }
    }

    #[test]
    fn resting_on_plane_is_grounded() {
        let pose = Isometry::translation(0.0, 0.35, 0.0);
        let report = probe().probe(&Plane, &pose, &half(), None);
        assert!(report.grounded);
        assert_eq!(report.rays.len(), 4);
    }

    #[test]
    fn hovering_above_threshold_is_airborne() {
        let pose = Isometry::translation(0.0, 1.0, 0.0);
        let report = probe().probe(&Plane, &pose, &half(), None);
        assert!(!report.grounded);
        assert_eq!(report.hits, 0);
        for ray in report.rays.iter() {
            assert!(((ray.origin - ray.end).norm() - 0.3).abs() < 1e-5);
        }
    }

    #[test]
    fn tilted_car_only_touches_with_one_side() {
        // Rolled 30 degrees: the raised side's rays point away from the plane's reach.
        let pose = Isometry::new(vector![0.0, 0.9, 0.0], vector![0.0, 0.0, 0.5236]);
        let report = probe().probe(&Plane, &pose, &half(), None);
        assert!(!report.grounded);
        assert!(report.hits < 4);
    }

    #[test]
    fn corners_follow_vehicle_rotation() {
        let pose = Isometry::new(
            vector![5.0, 1.0, 0.0],
            vector![0.0, std::f32::consts::FRAC_PI_2, 0.0],
        );
        let origins = probe().corner_origins(&pose, &half());

        // A quarter yaw swaps the x and z extents.
        for o in origins.iter() {
            assert!(((o.x - 5.0).abs() - 1.8).abs() < 1e-4);
            assert!((o.z.abs() - 1.0).abs() < 1e-4);
            assert!((o.y - (1.0 - 0.36)).abs() < 1e-4);
        }
    }

    #[test]
    fn nan_samples_are_skipped_and_never_ground_the_car() {
        let caster = ScriptedCaster::new(vec![Some(0.1), Some(Real::NAN), Some(0.1), Some(0.1)]);
        let report = probe().probe(&caster, &Isometry::identity(), &half(), None);

        assert!(!report.grounded);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.rays.len(), 3);
        for ray in report.rays.iter() {
            assert!(ray.end.coords.iter().all(|c| c.is_finite()));
        }
    }

    #[test]
    fn non_finite_pose_skips_every_sample() {
        let pose = Isometry::translation(Real::NAN, 0.0, 0.0);
        let report = probe().probe(&Plane, &pose, &half(), None);
        assert_eq!(report.skipped, 4);
        assert!(report.rays.is_empty());
        assert!(!report.grounded);
    }
}
