//! Caller identification.
//!
//! Requests name their owner in the `X-Owner-Id` header. There is no
//! authentication layer: the header is trusted as-is.

use super::state::ServerState;
use crate::library::OwnerId;

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::IntoResponse,
};
use tracing::debug;

pub const HEADER_OWNER_ID_KEY: &str = "X-Owner-Id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Owner {
    pub id: OwnerId,
}

#[derive(Debug, PartialEq, Eq)]
pub enum OwnerExtractionError {
    Missing,
    Invalid,
}

impl IntoResponse for OwnerExtractionError {
    fn into_response(self) -> axum::response::Response {
        let message = match self {
            OwnerExtractionError::Missing => "Missing X-Owner-Id header",
            OwnerExtractionError::Invalid => "Invalid X-Owner-Id header",
        };
        (StatusCode::UNAUTHORIZED, message).into_response()
    }
}

fn extract_owner_from_headers(parts: &Parts) -> Result<Owner, OwnerExtractionError> {
    let value = parts
        .headers
        .get(HEADER_OWNER_ID_KEY)
        .ok_or(OwnerExtractionError::Missing)?;
    let id = value
        .to_str()
        .ok()
        .and_then(|s| s.trim().parse::<OwnerId>().ok())
        .filter(|id| *id > 0)
        .ok_or_else(|| {
            debug!("Rejecting owner header {:?}", value);
            OwnerExtractionError::Invalid
        })?;
    Ok(Owner { id })
}

impl FromRequestParts<ServerState> for Owner {
    type Rejection = OwnerExtractionError;

    async fn from_request_parts(
        parts: &mut Parts,
        _ctx: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        extract_owner_from_headers(parts)
    }
}
