use crate::physics::EntityId;
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PhysicsError {
    #[error("physics world is not initialized yet")]
    NotReady,
    #[error("entity {0:?} is not registered with the physics world")]
    MissingEntity(EntityId),
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read or write settings: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed settings json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to watch settings file: {0}")]
    Watch(#[from] notify::Error),
}

#[derive(Debug, Error)]
pub enum RecordingError {
    #[error("failed to read or write recording: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed recording json: {0}")]
    Json(#[from] serde_json::Error),
}
