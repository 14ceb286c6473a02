use thiserror::Error;

use crate::{
    lifecycle::{Action, LifecycleError},
    orders::InvalidRating,
    session::SessionError,
};

/// Everything that can keep a client operation from taking effect.
///
/// Transport failures and server-side rejections are told apart only for the
/// message shown to the user; in both cases nothing changed locally.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("server responded with HTTP {0}")]
    Http(u16),

    #[error("not authenticated")]
    Unauthorized,

    /// The server answered `success: false`; the message is passed through.
    #[error("rejected by server: {0}")]
    Rejected(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    /// Refused locally, no request was sent.
    #[error(transparent)]
    IllegalAction(#[from] LifecycleError),

    #[error("{action} already in progress for order {order_id}")]
    Busy { action: Action, order_id: String },

    #[error("invalid input: {0}")]
    Validation(String),

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl ClientError {
    /// The notification text shown to the user for this failure.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Transport(_) => "Network error, please check your connection".into(),
            ClientError::Http(_) => "Server error, please try again later".into(),
            ClientError::Unauthorized => "Your session has expired, please log in again".into(),
            ClientError::Rejected(message) => message.clone(),
            ClientError::Malformed(_) => "Unexpected error, please try again".into(),
            ClientError::IllegalAction(e) => e.to_string(),
            ClientError::Busy { .. } => "This request is already being processed".into(),
            ClientError::Validation(message) => message.clone(),
            ClientError::Session(_) => "Could not access the saved session".into(),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::Transport(e.to_string())
    }
}

impl From<InvalidRating> for ClientError {
    fn from(e: InvalidRating) -> Self {
        ClientError::Validation(e.to_string())
    }
}
