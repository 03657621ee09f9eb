use thiserror::Error;

use crate::consts::MIN_TRACK_POINTS;
use crate::protocol::ClientError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("track has {found} waypoints, need at least {MIN_TRACK_POINTS}")]
    InsufficientWaypoints { found: usize },
    #[error("not connected to the session server")]
    NotConnected,
    #[error("no track loaded")]
    NoTrack,
}

impl SessionError {
    /// Status line shown by the presentation layer
    pub fn status_message(&self) -> String {
        match self {
            SessionError::Client(e) => e.status_message(),
            SessionError::InsufficientWaypoints { .. } => format!("Track data invalid ({self})"),
            SessionError::NotConnected => "Cannot reach server (not connected)".to_string(),
            SessionError::NoTrack => "No track loaded, start a session first".to_string(),
        }
    }
}
