use crate::vehicle::{FlipKind, VehicleState};
use rapier3d::prelude::*;
use std::fmt;

#[derive(Clone, PartialEq, Debug, Default)]
pub struct Hud {
    /// Metres per second.
    pub speed: f32,
    pub grounded: bool,
    pub flip: Option<FlipKind>,
    pub double_jump: bool,
    pub camera_progress: f32,
}

impl Hud {
    pub fn update(&mut self, linvel: &Vector<Real>, vehicle: &VehicleState, camera_progress: f32) {
        self.speed = linvel.norm();
        self.grounded = vehicle.grounded;
        self.flip = vehicle.flip.map(|f| f.kind);
        self.double_jump = vehicle.double_jump_available;
        self.camera_progress = camera_progress;
    }

    pub fn speed_kmh(&self) -> f32 {
        (self.speed * 3.6 * 10.0).round() / 10.0
    }
}

impl fmt::Display for Hud {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Speed: {} km/h | {} | ",
            self.speed_kmh(),
            if self.grounded { "grounded" } else { "airborne" }
        )?;
        match self.flip {
            Some(kind) => write!(f, "flip: {:?} | ", kind)?,
            None => write!(f, "flip: - | ")?,
        }
        write!(
            f,
            "double jump: {} | camera: {}%",
            if self.double_jump { "ready" } else { "spent" },
            (self.camera_progress * 100.0).round()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::CarSettings;

    #[test]
    fn speed_is_rounded_to_one_decimal_kmh() {
        let hud = Hud {
            speed: 10.0,
            ..Default::default()
        };
        assert_eq!(hud.speed_kmh(), 36.0);

        let hud = Hud {
            speed: 1.234,
            ..Default::default()
        };
        assert_eq!(hud.speed_kmh(), 4.4);
    }

    #[test]
    fn summary_line_reflects_vehicle_state() {
        let mut state = VehicleState::new(&CarSettings::default());
        state.grounded = true;
        state.double_jump_available = true;

        let mut hud = Hud::default();
        hud.update(&vector![3.0, 0.0, 4.0], &state, 0.5);

        assert_eq!(
            hud.to_string(),
            "Speed: 18 km/h | grounded | flip: - | double jump: ready | camera: 50%"
        );
    }
}
