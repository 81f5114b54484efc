//! Server-Sent Events stream of pipeline events

use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;

use crate::config::SERVICE_NAME;
use crate::AppState;

/// GET /events
///
/// Streams `ApplicationCommitted`, `UploadsProcessed`, `SatelliteFailed`,
/// `InviteBatchCompleted` and `ApplicationResent` as they happen.
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    onboard_common::sse::create_event_sse_stream(SERVICE_NAME, &state.event_bus)
}
