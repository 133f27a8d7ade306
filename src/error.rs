use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::routes::Envelope;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CarpoolError {
    #[error("Invalid fields: {}", .0.join(", "))]
    Validation(Vec<&'static str>),

    #[error("'{0}' is not a stop")]
    UnknownStop(String),

    #[error("'{0}' is not a destination")]
    UnknownDestination(String),

    #[error("'{0}' already has a pending request")]
    DuplicateRequest(String),

    #[error("No request from '{rider}' at '{stop}'")]
    NotFound { rider: String, stop: String },

    #[error("Could not build a recommendation")]
    Recommendation,
}

impl CarpoolError {
    /// unknown stops are a client error when asking for a recommendation
    /// and a server error when mutating a queue.
    pub fn status(&self) -> StatusCode {
        match self {
            CarpoolError::Validation(_)
            | CarpoolError::UnknownDestination(_)
            | CarpoolError::Recommendation => StatusCode::BAD_REQUEST,
            CarpoolError::UnknownStop(_)
            | CarpoolError::DuplicateRequest(_)
            | CarpoolError::NotFound { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for CarpoolError {
    fn into_response(self) -> Response {
        let status = self.status();

        (status, Json(Envelope::<()>::failure(self.to_string()))).into_response()
    }
}
