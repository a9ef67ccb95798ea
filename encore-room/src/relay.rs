//! HTTP transport through an encore relay
//!
//! `connect` opens the room's SSE stream (`GET /rooms/{id}/events`) and only
//! returns once the relay has answered, so nothing sent afterwards is missed.
//! Two tasks serve each handle:
//! - the inbound pump decodes SSE frames into the handle's receiver and stops
//!   when the handle is dropped;
//! - the uplink posts queued events one at a time (`POST /rooms/{id}/events`)
//!   and exits after draining once the handle is gone, so a final
//!   `player_leave` still goes out.
//!
//! Delivery matches the in-process hub: at-most-once, no retry, and the
//! sender hears its own events back.

use crate::channel::{ChannelHandle, Transport};
use encore_common::events::SyncEvent;
use encore_common::{Error, Result};
use futures::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::Url;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const POST_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens room channels on a remote relay
///
/// Cloning shares the HTTP connection pool.
#[derive(Clone, Debug)]
pub struct RelayTransport {
    http: reqwest::Client,
    base: Url,
    capacity: usize,
}

impl RelayTransport {
    /// Relay at `base_url` (e.g. `http://127.0.0.1:5780`)
    ///
    /// `capacity` bounds how far a handle may fall behind before it loses
    /// events.
    pub fn new(base_url: &str, capacity: usize) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| Error::InvalidInput(format!("Bad relay URL {}: {}", base_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(Error::InvalidInput(format!("Bad relay URL {}", base_url)));
        }
        // No overall timeout: the event stream stays open for the session
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| Error::ChannelUnavailable(e.to_string()))?;

        Ok(Self {
            http,
            base,
            capacity: capacity.max(1),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn events_url(&self, room_id: &str) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["rooms", room_id, "events"]);
        }
        url
    }
}

impl Transport for RelayTransport {
    async fn connect(&self, room_id: &str) -> Result<ChannelHandle> {
        if room_id.is_empty() {
            return Err(Error::InvalidInput("room id must not be empty".to_string()));
        }
        let url = self.events_url(room_id);
        debug!(url = %url, "Opening relay event stream");

        let response = self
            .http
            .get(url.clone())
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| Error::ChannelUnavailable(format!("relay {}: {}", self.base, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::ChannelUnavailable(format!(
                "relay {} answered {} for room {}",
                self.base, status, room_id
            )));
        }

        let (inbound_tx, inbound_rx) = broadcast::channel(self.capacity);
        let (uplink_tx, uplink_rx) = mpsc::unbounded_channel();
        let stop = CancellationToken::new();

        tokio::spawn(pump_inbound(
            room_id.to_string(),
            response,
            inbound_tx,
            stop.clone(),
        ));
        tokio::spawn(pump_uplink(self.http.clone(), url, uplink_rx));

        info!("Connected to room {} via relay {}", room_id, self.base);
        Ok(ChannelHandle::remote(
            room_id,
            inbound_rx,
            uplink_tx,
            stop.drop_guard(),
        ))
    }
}

async fn pump_inbound(
    room_id: String,
    response: reqwest::Response,
    tx: broadcast::Sender<SyncEvent>,
    stop: CancellationToken,
) {
    let mut body = response.bytes_stream();
    let mut decoder = SseDecoder::default();

    loop {
        let chunk = tokio::select! {
            _ = stop.cancelled() => break,
            chunk = body.next() => chunk,
        };
        match chunk {
            Some(Ok(bytes)) => {
                for frame in decoder.push(&bytes) {
                    deliver(&room_id, frame, &tx);
                }
            }
            Some(Err(e)) => {
                warn!("Relay stream for room {} failed: {}", room_id, e);
                break;
            }
            None => {
                warn!("Relay closed the stream for room {}", room_id);
                break;
            }
        }
    }
    // Dropping `tx` closes the handle's receiver
    debug!("Inbound pump for room {} stopped", room_id);
}

fn deliver(room_id: &str, frame: SseFrame, tx: &broadcast::Sender<SyncEvent>) {
    if frame.event.as_deref() == Some("connected") || frame.data.is_empty() {
        return;
    }
    match SyncEvent::from_json(&frame.data) {
        Ok(event) => {
            // No receiver just means the handle is going away
            let _ = tx.send(event);
        }
        Err(e) => warn!("Dropping bad event in room {}: {}", room_id, e),
    }
}

async fn pump_uplink(http: reqwest::Client, url: Url, mut queue: mpsc::UnboundedReceiver<SyncEvent>) {
    while let Some(event) = queue.recv().await {
        let kind = event.event_type().as_str();
        let result = http
            .post(url.clone())
            .timeout(POST_TIMEOUT)
            .json(&event)
            .send()
            .await;
        match result {
            Ok(response) if response.status().is_success() => {
                debug!("Posted {} to {}", kind, url);
            }
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                warn!("Relay rejected {} ({}): {}", kind, status, body);
            }
            Err(e) => warn!("Failed to post {}: {}", kind, e),
        }
    }
    debug!("Uplink to {} closed", url);
}

/// One decoded server-sent event
#[derive(Debug, Default, PartialEq, Eq)]
struct SseFrame {
    event: Option<String>,
    data: String,
}

/// Incremental `text/event-stream` decoder
///
/// Frames end at a blank line. Comment lines (keep-alives) are skipped and
/// multi-line data is joined with `\n`.
#[derive(Default)]
struct SseDecoder {
    buf: Vec<u8>,
}

impl SseDecoder {
    fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(end) = find_blank_line(&self.buf) {
            let raw: Vec<u8> = self.buf.drain(..end.0).collect();
            self.buf.drain(..end.1 - end.0);
            if let Some(frame) = parse_frame(&String::from_utf8_lossy(&raw)) {
                frames.push(frame);
            }
        }
        frames
    }
}

/// Start of the first blank-line terminator and the length through its end
fn find_blank_line(buf: &[u8]) -> Option<(usize, usize)> {
    let mut i = 0;
    while i < buf.len() {
        if buf[i] == b'\n' {
            if buf.get(i + 1) == Some(&b'\n') {
                return Some((i, i + 2));
            }
            if buf.get(i + 1) == Some(&b'\r') && buf.get(i + 2) == Some(&b'\n') {
                return Some((i, i + 3));
            }
        }
        i += 1;
    }
    None
}

fn parse_frame(raw: &str) -> Option<SseFrame> {
    let mut frame = SseFrame::default();
    let mut data: Vec<&str> = Vec::new();

    for line in raw.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => frame.event = Some(value.to_string()),
            "data" => data.push(value),
            _ => {}
        }
    }

    if frame.event.is_none() && data.is_empty() {
        return None;
    }
    frame.data = data.join("\n");
    Some(frame)
}
