//! GET /api/ws/events/:id/roster
//!
//! Live roster for the host dashboard. The subscription is opened before
//! the snapshot is read, so nothing registered in between is lost; a
//! change already contained in the snapshot merges idempotently.
//!
//! ```text
//! { "type": "snapshot", "data": { "kind": "full", "attendees": [...], "counts": {...} } }
//! { "type": "change",   "data": { "kind": "delta", "change": {...}, "counts": {...} } }
//! { "type": "error",    "message": "Live updates interrupted" }
//! ```

use super::parse_id;
use crate::auth::CurrentUser;
use crate::error::DomainError;
use crate::roster::{RosterCounts, RosterState};
use crate::server::AppState;
use crate::types::{Attendee, EventId};
use async_stream::stream;
use axum::{
    extract::{Path, State, WebSocketUpgrade},
    response::Response,
};
use futures::{Stream, StreamExt};
use iamin_core::change_feed::{ChangeEvent, ChangeFeedError};
use iamin_runtime::metrics::RosterMetrics;
use iamin_web::AppError;
use iamin_web::handlers::{WsMessage, pump};
use serde::{Deserialize, Serialize};

/// Message sent when the feed breaks; the client reconnects for a fresh snapshot.
pub const INTERRUPTED: &str = "Live updates interrupted";

/// Payload of roster frames.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RosterFrame {
    /// Whole roster, newest first
    Full {
        /// Attendees
        attendees: Vec<Attendee>,
        /// Counts
        counts: RosterCounts,
    },
    /// One merged change
    Delta {
        /// The change as delivered
        change: ChangeEvent<Attendee>,
        /// Counts after merging it
        counts: RosterCounts,
    },
}

/// Upgrade to a roster socket for an event the caller hosts.
pub async fn roster_socket(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    let event_id: EventId = parse_id(&event_id, "event_id")?;
    state.owned_event(event_id, &user).await?;

    let subscription = state
        .realtime
        .subscribe_roster(event_id)
        .await
        .map_err(DomainError::from)?;
    let snapshot = state
        .repo
        .attendees_for_event(event_id)
        .await
        .map_err(DomainError::from)?;

    tracing::info!(event_id = %event_id, user_id = %user.id, "Roster socket opened");
    Ok(ws.on_upgrade(move |socket| async move {
        RosterMetrics::socket_opened();
        pump(socket, roster_frames(snapshot, subscription)).await;
        RosterMetrics::socket_closed();
        tracing::info!(event_id = %event_id, "Roster socket closed");
    }))
}

/// Snapshot frame, then one delta per change until the feed ends or fails.
///
/// The roster view lives inside the stream, so merges happen in delivery
/// order on the socket's task. Dropping the stream drops `changes`.
pub fn roster_frames<S>(
    snapshot: Vec<Attendee>,
    changes: S,
) -> impl Stream<Item = WsMessage<RosterFrame>> + Send + 'static
where
    S: Stream<Item = Result<ChangeEvent<Attendee>, ChangeFeedError>> + Send + Unpin + 'static,
{
    stream! {
        let mut changes = changes;
        let mut roster = RosterState::from_snapshot(snapshot);
        yield WsMessage::Snapshot {
            data: RosterFrame::Full {
                attendees: roster.attendees().to_vec(),
                counts: roster.counts(),
            },
        };

        while let Some(next) = changes.next().await {
            match next {
                Ok(change) => {
                    roster.apply(change.clone());
                    RosterMetrics::record_change();
                    yield WsMessage::Change {
                        data: RosterFrame::Delta {
                            change,
                            counts: roster.counts(),
                        },
                    };
                },
                Err(error) => {
                    tracing::warn!(%error, "Roster feed ended");
                    yield WsMessage::Error { message: INTERRUPTED.to_string() };
                    break;
                },
            }
        }
    }
}
