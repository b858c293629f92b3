// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Multipart JPEG streaming.
//!
//! One [`StreamSession`] serves one client: it emits the response preamble,
//! then acquires, encodes and writes parts until the client goes away or
//! anything fails. A failed step ends the session, it never resumes a part
//! halfway or reconnects.

use crate::{
    config::Timings,
    encoder,
    error::{AcquireError, CaptureError, ConversionError, TransportError},
    session::SensorSession,
};
use std::{
    fmt,
    io::Write,
    sync::Mutex,
    thread,
    time::{Duration, Instant},
};
use tracing::{debug, info, instrument};

pub const BOUNDARY: &str = "frame";
pub const STREAM_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";
pub const NO_CACHE: &str = "no-store, no-cache, must-revalidate, max-age=0";
pub const PART_TRAILER: &[u8] = b"\r\n";

/// Header preceding each JPEG part.
pub fn part_header(len: usize) -> String {
    format!("--{BOUNDARY}\r\nContent-Type: image/jpeg\r\nContent-Length: {len}\r\n\r\n")
}

/// Raw HTTP response head for transports that own the socket.
pub fn preamble() -> String {
    format!(
        "HTTP/1.1 200 OK\r\n\
         Content-Type: {STREAM_CONTENT_TYPE}\r\n\
         Cache-Control: {NO_CACHE}\r\n\
         Pragma: no-cache\r\n\
         Connection: close\r\n\r\n"
    )
}

/// Where a stream session writes its bytes.
pub trait PartSink {
    /// Emits the response preamble. Transports that send headers on their
    /// own keep the default.
    fn begin(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Whether the peer still looks connected.
    fn is_connected(&self) -> bool;

    /// Writes all of `bytes` or fails.
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError>;
}

/// Sink over a plain byte writer, emitting the raw HTTP preamble itself.
#[derive(Debug)]
pub struct WriterSink<W> {
    inner: W,
    connected: bool,
}

impl<W: Write> WriterSink<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            connected: true,
        }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> PartSink for WriterSink<W> {
    fn begin(&mut self) -> Result<(), TransportError> {
        self.write_all(preamble().as_bytes())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::Disconnected);
        }
        let res = self.inner.write_all(bytes).and_then(|_| self.inner.flush());
        res.map_err(|e| {
            self.connected = false;
            TransportError::Io(e)
        })
    }
}

/// Why a stream session ended.
#[derive(Debug)]
pub enum StreamEnd {
    /// The transport reported the peer gone between parts.
    ClientGone,
    Acquire(AcquireError),
    Conversion(ConversionError),
    Transport(TransportError),
    /// Another thread panicked while holding the session.
    Poisoned,
}

impl StreamEnd {
    /// Ends that are routine for a streaming client.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, StreamEnd::ClientGone | StreamEnd::Transport(_))
    }
}

impl fmt::Display for StreamEnd {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StreamEnd::ClientGone => f.write_str("client disconnected"),
            StreamEnd::Acquire(e) => write!(f, "acquire: {e}"),
            StreamEnd::Conversion(e) => write!(f, "encode: {e}"),
            StreamEnd::Transport(e) => write!(f, "transport: {e}"),
            StreamEnd::Poisoned => f.write_str("session lock poisoned"),
        }
    }
}

/// Counters of a finished session.
#[derive(Debug)]
pub struct StreamSummary {
    pub frames: u64,
    pub nulls: u64,
    pub elapsed: Duration,
    pub end: StreamEnd,
}

impl StreamSummary {
    pub fn fps(&self) -> f64 {
        fps(self.frames, self.elapsed)
    }
}

fn fps(frames: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        frames as f64 / secs
    } else {
        0.0
    }
}

/// Per-connection streaming loop.
#[derive(Debug)]
pub struct StreamSession {
    frames: u64,
    nulls: u64,
    started: Instant,
    stream_yield: Duration,
    stats_window: u32,
}

impl StreamSession {
    pub fn new(timings: &Timings) -> Self {
        Self {
            frames: 0,
            nulls: 0,
            started: Instant::now(),
            stream_yield: timings.stream_yield,
            stats_window: timings.stats_window,
        }
    }

    /// Streams until the client leaves or a step fails.
    ///
    /// The session lock is held for one frame at a time so other handlers
    /// get a turn between frames. A sink that blocks holds the lock with it,
    /// so sinks must bound their writes.
    #[instrument(skip_all)]
    pub fn run<S>(mut self, pipeline: &Mutex<SensorSession>, sink: &mut S) -> StreamSummary
    where
        S: PartSink + ?Sized,
    {
        info!("stream client connected");
        if let Err(e) = sink.begin() {
            return self.finish(StreamEnd::Transport(e));
        }

        let end = loop {
            if !sink.is_connected() {
                break StreamEnd::ClientGone;
            }
            let step = match pipeline.lock() {
                Ok(mut session) => self.step(&mut session, sink),
                Err(_) => Err(StreamEnd::Poisoned),
            };
            if let Err(end) = step {
                break end;
            }
            self.count_frame();
            if self.stream_yield.is_zero() {
                thread::yield_now();
            } else {
                thread::sleep(self.stream_yield);
            }
        };

        self.finish(end)
    }

    /// Acquire, encode, transmit and release one frame.
    fn step<S>(&mut self, session: &mut SensorSession, sink: &mut S) -> Result<(), StreamEnd>
    where
        S: PartSink + ?Sized,
    {
        let quality = session.jpeg_quality();
        let frame = session.acquire().map_err(StreamEnd::Acquire)?;
        self.nulls += frame.nulls() as u64;
        let encoded = encoder::to_encoded(frame, quality).map_err(StreamEnd::Conversion)?;
        transmit(sink, encoded.as_bytes()).map_err(StreamEnd::Transport)?;
        encoded.release();
        Ok(())
    }

    fn count_frame(&mut self) {
        self.frames += 1;
        if self.stats_window > 0 && self.frames % self.stats_window as u64 == 0 {
            let elapsed = self.started.elapsed();
            info!(
                frames = self.frames,
                elapsed = ?elapsed,
                fps = %format!("{:.2}", fps(self.frames, elapsed)),
                "stream stats"
            );
        }
    }

    fn finish(self, end: StreamEnd) -> StreamSummary {
        let summary = StreamSummary {
            frames: self.frames,
            nulls: self.nulls,
            elapsed: self.started.elapsed(),
            end,
        };
        if summary.end.is_disconnect() {
            info!(frames = summary.frames, "stream client left: {}", summary.end);
        } else {
            info!(frames = summary.frames, "stream aborted: {}", summary.end);
        }
        summary
    }
}

/// Writes one complete part: header, payload, trailer.
pub fn transmit<S>(sink: &mut S, jpeg: &[u8]) -> Result<(), TransportError>
where
    S: PartSink + ?Sized,
{
    sink.write_all(part_header(jpeg.len()).as_bytes())?;
    sink.write_all(jpeg)?;
    sink.write_all(PART_TRAILER)?;
    debug!(bytes = jpeg.len(), "part sent");
    Ok(())
}

/// Captures one frame as an owned JPEG, for single-shot requests.
pub fn snapshot(session: &mut SensorSession) -> Result<Vec<u8>, CaptureError> {
    let quality = session.jpeg_quality();
    let frame = session.acquire()?;
    let encoded = encoder::to_encoded(frame, quality)?;
    let jpeg = encoded.as_bytes().to_vec();
    encoded.release();
    debug!(bytes = jpeg.len(), "snapshot captured");
    Ok(jpeg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_header_format() {
        assert_eq!(
            part_header(1234),
            "--frame\r\nContent-Type: image/jpeg\r\nContent-Length: 1234\r\n\r\n"
        );
    }

    #[test]
    fn preamble_declares_multipart() {
        let head = preamble();
        assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(head.contains("Content-Type: multipart/x-mixed-replace; boundary=frame\r\n"));
        assert!(head.contains("Pragma: no-cache\r\n"));
        assert!(head.ends_with("\r\n\r\n"));
    }
}
