use crate::ground_probe::ProbeReport;
use crate::utilities::point_arr3;
use serde::Serialize;
use std::collections::BTreeMap;

pub const HIT_COLOR: [f32; 4] = [0.0, 1.0, 0.0, 1.0];
pub const MISS_COLOR: [f32; 4] = [1.0, 0.0, 0.0, 1.0];

#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct LineDesc {
    pub color: [f32; 4],
    pub a: [f32; 3],
    pub b: [f32; 3],
}

impl LineDesc {
    fn is_finite(&self) -> bool {
        self.a.iter().chain(self.b.iter()).all(|c| c.is_finite())
    }
}

/// Flat vertex/colour buffers, two entries per line.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LineBatch {
    pub points: Vec<[f32; 3]>,
    pub colors: Vec<[f32; 4]>,
}

impl LineBatch {
    pub fn line_count(&self) -> usize {
        self.points.len() / 2
    }
}

#[derive(Debug, Clone, Default)]
pub struct LineSystem {
    lines: BTreeMap<String, LineDesc>,
}

impl LineSystem {
    pub fn new() -> LineSystem {
        Default::default()
    }

    /// Replaces the named line. Lines with non-finite endpoints are dropped.
    pub fn set_line(&mut self, name: impl Into<String>, line: LineDesc) {
        let name = name.into();
        if line.is_finite() {
            self.lines.insert(name, line);
        } else {
            self.lines.remove(&name);
        }
    }

    pub fn remove_line(&mut self, name: &str) -> Option<LineDesc> {
        self.lines.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&LineDesc> {
        self.lines.get(name)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// One line per probe ray; corners without a finite sample this tick are cleared.
    pub fn show_probe(&mut self, prefix: &str, report: &ProbeReport) {
        for corner in 0..4 {
            self.lines.remove(&format!("{}{}", prefix, corner));
        }
        for ray in report.rays.iter() {
            self.set_line(
                format!("{}{}", prefix, ray.corner),
                LineDesc {
                    color: if ray.hit { HIT_COLOR } else { MISS_COLOR },
                    a: point_arr3(&ray.origin),
                    b: point_arr3(&ray.end),
                },
            );
        }
    }

    pub fn batch(&self) -> LineBatch {
        let points = self.lines.values().flat_map(|l| vec![l.a, l.b]).collect();
        let colors = self
            .lines
            .values()
            .flat_map(|l| vec![l.color, l.color])
            .collect();
        LineBatch { points, colors }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ground_probe::ProbeRay;
    use rapier3d::prelude::*;

    fn line(y: f32) -> LineDesc {
        LineDesc {
            color: HIT_COLOR,
            a: [0.0, y, 0.0],
            b: [0.0, y - 1.0, 0.0],
        }
    }

    #[test]
    fn named_lines_are_replaced() {
        let mut lines = LineSystem::new();
        lines.set_line("a", line(1.0));
        lines.set_line("a", line(2.0));
        lines.set_line("b", line(3.0));

        assert_eq!(lines.len(), 2);
        assert_eq!(lines.get("a"), Some(&line(2.0)));

        let batch = lines.batch();
        assert_eq!(batch.line_count(), 2);
        assert_eq!(batch.points.len(), batch.colors.len());
    }

    #[test]
    fn non_finite_lines_are_never_kept() {
        let mut lines = LineSystem::new();
        lines.set_line("a", line(1.0));
        lines.set_line("a", line(f32::NAN));
        assert!(lines.is_empty());
    }

    #[test]
    fn probe_rays_are_coloured_by_hit() {
        let mut lines = LineSystem::new();
        let report = ProbeReport {
            hits: 1,
            grounded: false,
            rays: vec![
                ProbeRay {
                    corner: 0,
                    origin: point![0.0, 1.0, 0.0],
                    end: point![0.0, 0.8, 0.0],
                    hit: true,
                },
                ProbeRay {
                    corner: 2,
                    origin: point![1.0, 1.0, 0.0],
                    end: point![1.0, 0.7, 0.0],
                    hit: false,
                },
            ],
            skipped: 2,
        };
        lines.show_probe("probe", &report);

        assert_eq!(lines.len(), 2);
        assert_eq!(lines.get("probe0").unwrap().color, HIT_COLOR);
        assert_eq!(lines.get("probe2").unwrap().color, MISS_COLOR);

        // Next tick drops the corner that stopped producing a sample.
        let next = ProbeReport {
            rays: vec![report.rays[1]],
            ..Default::default()
        };
        lines.show_probe("probe", &next);
        assert!(lines.get("probe0").is_none());
        assert_eq!(lines.len(), 1);
    }
}
