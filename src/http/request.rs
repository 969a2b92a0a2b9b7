//! Request id correlation.
//!
//! # Responsibilities
//! - Echo the client's `Request-Id` on the response for correlation
//!
//! # Design Decisions
//! - No id is minted when the client sent none; header parsing reports
//!   the absence and duplicate detection only ever keys on client ids

use axum::http::HeaderName;
use tower_http::request_id::PropagateRequestIdLayer;

/// Lower-case wire name of the request id header.
pub const REQUEST_ID_HEADER: &str = "request-id";

/// Layer copying the request's `Request-Id` onto the response.
pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::new(HeaderName::from_static(REQUEST_ID_HEADER))
}
