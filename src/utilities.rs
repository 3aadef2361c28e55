use notify::{DebouncedEvent, RecommendedWatcher, RecursiveMode, Watcher};
use rapier3d::prelude::*;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::mpsc::{channel, Receiver};
use std::time::Duration;

pub fn watch<P: AsRef<Path>>(
    paths: &[P],
) -> notify::Result<(RecommendedWatcher, Receiver<DebouncedEvent>)> {
    let (tx, rx) = channel();
    let mut watcher: RecommendedWatcher = Watcher::new(tx, Duration::from_secs_f32(0.2))?;

    for p in paths.iter() {
        watcher.watch(p, RecursiveMode::NonRecursive)?;
    }

    Ok((watcher, rx))
}

pub trait SerdeJsonQuick: Serialize + DeserializeOwned {
    type Error: From<std::io::Error> + From<serde_json::Error>;

    fn load_json<P: AsRef<Path>>(path: P) -> Result<Self, Self::Error> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<(), Self::Error> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}

pub fn vec3(v: [f32; 3]) -> Vector<Real> {
    vector![v[0], v[1], v[2]]
}

pub fn arr3(v: &Vector<Real>) -> [f32; 3] {
    [v.x, v.y, v.z]
}

pub fn point_arr3(p: &Point<Real>) -> [f32; 3] {
    [p.x, p.y, p.z]
}

/// Quaternion as `[x, y, z, w]`.
pub fn quat_arr4(q: &Rotation<Real>) -> [f32; 4] {
    [q.i, q.j, q.k, q.w]
}

pub fn is_finite_vec(v: &Vector<Real>) -> bool {
    v.iter().all(|c| c.is_finite())
}

/// Drops the vertical component, keeping the horizontal plane.
pub fn flatten(v: &Vector<Real>) -> Vector<Real> {
    vector![v.x, 0.0, v.z]
}
