//! Server-sent event payloads from a streaming response body.

use crate::error::{KernelError, Result};
use eventsource_stream::Eventsource;
use futures::future;
use futures::stream::{BoxStream, Stream, StreamExt};
use std::fmt::Display;

/// The `data` field of every event in a byte stream, skipping events without data.
///
/// Event framing, multi-byte characters split across network chunks and
/// comment lines are handled by `eventsource-stream`.
pub(crate) fn data_payloads<S, B, E>(bytes: S) -> BoxStream<'static, Result<String>>
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    bytes
        .eventsource()
        .filter_map(|event| {
            future::ready(match event {
                Ok(event) if event.data.trim().is_empty() => None,
                Ok(event) => Some(Ok(event.data)),
                Err(e) => Some(Err(KernelError::GatewayError(format!(
                    "Event stream error: {}",
                    e
                )))),
            })
        })
        .boxed()
}
