use axum::http::{ header, HeaderName, HeaderValue };
use axum::response::{ IntoResponse, Response };
use axum::response::sse::{ Event, Sse };
use futures::{ stream, Stream, StreamExt };
use log::{ debug, error };
use std::convert::Infallible;
use uuid::Uuid;

use crate::llm::chat::TextStream;
use crate::models::chat::StreamEvent;

pub const DONE_SENTINEL: &str = "[DONE]";

/// Turns provider fragments into `delta` events followed by the `[DONE]` sentinel.
///
/// A provider error ends the stream without the sentinel. Dropping the returned
/// stream (client gone) drops `upstream` with it.
pub fn relay_events(
    upstream: TextStream,
    request_id: Uuid
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    stream::unfold(Some((upstream, 0usize)), move |state| async move {
        let (mut upstream, forwarded) = state?;
        match upstream.next().await {
            Some(Ok(text)) => {
                match Event::default().json_data(StreamEvent::Delta { text }) {
                    Ok(event) => Some((Ok(event), Some((upstream, forwarded + 1)))),
                    Err(e) => {
                        error!("[{}] could not encode stream event: {}", request_id, e);
                        None
                    }
                }
            }
            Some(Err(e)) => {
                error!("[{}] /api/chat stream error after {} fragments: {}", request_id, forwarded, e);
                None
            }
            None => {
                debug!("[{}] stream finished after {} fragments", request_id, forwarded);
                Some((Ok(Event::default().data(DONE_SENTINEL)), None))
            }
        }
    })
}

pub fn event_stream_response(upstream: TextStream, request_id: Uuid) -> Response {
    let headers = [
        (header::CACHE_CONTROL, HeaderValue::from_static("no-cache, no-transform")),
        (header::CONNECTION, HeaderValue::from_static("keep-alive")),
        (HeaderName::from_static("x-accel-buffering"), HeaderValue::from_static("no")),
    ];
    (headers, Sse::new(relay_events(upstream, request_id))).into_response()
}
