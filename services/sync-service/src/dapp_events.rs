use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, warn};
use vs_api_types::DappEvent;
use vs_sync_core::{EventBroadcaster, ListenerId};

use crate::AppState;

#[derive(Debug, Deserialize)]
pub(crate) struct DappEventsQuery {
    host: Option<String>,
}

/// Removes its listener from the broadcaster when the SSE stream is dropped.
struct ListenerGuard {
    events: EventBroadcaster,
    id: ListenerId,
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.events.unsubscribe(self.id);
        debug!(id = self.id, "dapp listener disconnected");
    }
}

/// Server-sent stream of dapp notifications. Each SSE event is named after the
/// method (`chainChanged`, `isTestnet`, ...) and carries the full `{method, params}`
/// message. The listener is unsubscribed as soon as the response stream is dropped.
pub(crate) async fn dapp_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DappEventsQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = state.controller.events().clone();
    let (id, receiver) = events.subscribe(query.host.clone());
    debug!(id, host = ?query.host, "dapp listener connected");

    let guard = ListenerGuard { events, id };
    let stream = UnboundedReceiverStream::new(receiver).map(move |event| {
        let _listener = &guard;
        Ok(sse_event(&event))
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("hb"))
}

fn sse_event(event: &DappEvent) -> Event {
    match Event::default().event(event.method()).json_data(event) {
        Ok(encoded) => encoded,
        Err(err) => {
            warn!(?err, method = event.method(), "failed to encode dapp event");
            Event::default().event(event.method())
        }
    }
}
