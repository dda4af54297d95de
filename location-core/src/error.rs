use thiserror::Error;

use crate::model::Level;

/// A fetch for one level settled with an error.
///
/// Recoverable and local: other levels keep their options and the picker
/// stays interactive. The message is the rendered error chain that was also
/// stored in the level's [`RequestStatus`](crate::model::RequestStatus).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to load {level} options: {message}")]
pub struct FetchFailed {
    pub level: Level,
    pub message: String,
}
