use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use tracing::{info, warn};

use crate::realtime::RowChange;
use crate::state::AppState;
use crate::util::require_household;
use crate::AppResult;

const KEEP_ALIVE: Duration = Duration::from_secs(15);

fn to_event(change: &RowChange) -> Option<Event> {
    match Event::default().event("change").json_data(change) {
        Ok(event) => Some(event),
        Err(err) => {
            warn!(target: "homestock", event = "change_encode_failed", error = %err);
            None
        }
    }
}

/// GET /api/households/{id}/changes
///
/// Server-sent events, one `change` event per row change in the household.
pub async fn stream(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let household_id = require_household(&id)?.to_string();
    info!(target: "homestock", event = "changes_subscribed", household_id = %household_id);
    let events = state
        .feed
        .subscribe(&household_id)
        .into_stream()
        .filter_map(|change| async move { to_event(&change).map(Ok) });
    Ok(Sse::new(events).keep_alive(KeepAlive::new().interval(KEEP_ALIVE)))
}
