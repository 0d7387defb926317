//! Frame extraction for the bracket-delimited tracker protocol.
//!
//! Wire format:
//! ```text
//! ...[CS*123456*0002*LK][CS*123456*0009*UD,170623...]...
//!    └──── one frame ────┘
//! ```
//!
//! TCP delivers an arbitrary chunking of that stream: one read may hold half a
//! frame, three frames, or stray bytes left over from a device reboot.  This
//! module recovers the frame sequence.
//!
//! # Algorithm
//!
//! Repeatedly find the next `]`.  If there is none, everything left becomes
//! the remainder and waits for more bytes.  Otherwise take the nearest `[`
//! before it: `[` through `]` is a frame.  With no `[` in front, the bytes up
//! to and including that `]` are corrupt and dropped.  Every iteration
//! consumes at least one `]`, so the loop terminates on any input.
//!
//! Decisions are only taken at a `]`, and everything before an undecided `]`
//! is retained, so the frames produced depend only on the concatenated bytes
//! and never on where the reads happened to split them.

use std::borrow::Cow;

use bytes::{Buf, Bytes, BytesMut};
use tracing::warn;

/// Opening frame delimiter.
pub const FRAME_START: u8 = b'[';

/// Closing frame delimiter.
pub const FRAME_END: u8 = b']';

/// Default cap on bytes retained while waiting for a closing delimiter.
pub const DEFAULT_MAX_PENDING: usize = 16 * 1024;

/// One complete `[`...`]` frame, delimiters included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(Bytes);

impl Frame {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Frame text for the parser.  Invalid UTF-8 is replaced, never rejected.
    pub fn to_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Frame {
    fn from(value: &str) -> Self {
        Self(Bytes::copy_from_slice(value.as_bytes()))
    }
}

/// Result of one [`extract`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// Complete frames in stream order.
    pub frames: Vec<Frame>,
    /// Bytes not yet terminated by a `]`, to be prepended to the next read.
    pub remainder: Bytes,
    /// Number of bytes dropped as corrupt framing.
    pub discarded: usize,
}

/// Splits `remainder ++ incoming` into complete frames and a new remainder.
///
/// Pure function of its inputs; [`FrameDecoder`] wraps it for per-connection
/// use.
///
/// ```rust
/// use trackgate_core::protocol::frame::extract;
///
/// let first = extract(b"", b"garbage][CS*1*0002*LK][CS*1*00");
/// assert_eq!(first.frames.len(), 1);
/// assert_eq!(first.frames[0].as_bytes(), b"[CS*1*0002*LK]");
///
/// let second = extract(&first.remainder, b"02*LK]");
/// assert_eq!(second.frames[0].as_bytes(), b"[CS*1*0002*LK]");
/// assert!(second.remainder.is_empty());
/// ```
pub fn extract(remainder: &[u8], incoming: &[u8]) -> Extraction {
    let mut buf = BytesMut::with_capacity(remainder.len() + incoming.len());
    buf.extend_from_slice(remainder);
    buf.extend_from_slice(incoming);

    let mut frames = Vec::new();
    let discarded = drain_frames(&mut buf, &mut frames);

    Extraction {
        frames,
        remainder: buf.freeze(),
        discarded,
    }
}

/// Moves every complete frame out of `buf`, returning how many bytes were
/// dropped along the way.  On return `buf` holds no `]`.
fn drain_frames(buf: &mut BytesMut, frames: &mut Vec<Frame>) -> usize {
    let mut discarded = 0;

    while let Some(close) = buf.iter().position(|&b| b == FRAME_END) {
        match buf[..close].iter().rposition(|&b| b == FRAME_START) {
            Some(open) => {
                if open > 0 {
                    warn!(
                        "dropping {open} byte(s) of unframed data before frame: {:?}",
                        String::from_utf8_lossy(&buf[..open])
                    );
                    discarded += open;
                    buf.advance(open);
                }
                let frame = buf.split_to(close - open + 1).freeze();
                frames.push(Frame(frame));
            }
            None => {
                warn!(
                    "discarding corrupt framing: {:?}",
                    String::from_utf8_lossy(&buf[..=close])
                );
                discarded += close + 1;
                buf.advance(close + 1);
            }
        }
    }

    discarded
}

/// Stateful per-connection wrapper around [`extract`].
///
/// Holds the pending bytes of one connection and enforces an upper bound on
/// them, so a peer that never sends `]` cannot grow the buffer forever.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    max_pending: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_max_pending(DEFAULT_MAX_PENDING)
    }

    /// Creates a decoder that retains at most `max_pending` unterminated bytes.
    pub fn with_max_pending(max_pending: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            max_pending: max_pending.max(1),
        }
    }

    /// Appends `data` and returns every frame it completes, in order.
    pub fn feed(&mut self, data: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(data);
        let mut frames = Vec::new();
        drain_frames(&mut self.buffer, &mut frames);
        self.enforce_bound();
        frames
    }

    /// Number of bytes waiting for a closing delimiter.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Drops all pending bytes.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    fn enforce_bound(&mut self) {
        let len = self.buffer.len();
        if len <= self.max_pending {
            return;
        }
        match self.buffer.iter().rposition(|&b| b == FRAME_START) {
            Some(open) if len - open <= self.max_pending => {
                warn!(
                    "pending buffer exceeded {} bytes; keeping the last partial frame",
                    self.max_pending
                );
                self.buffer.advance(open);
            }
            _ => {
                warn!(
                    "pending buffer exceeded {} bytes with no usable frame start; clearing",
                    self.max_pending
                );
                self.buffer.clear();
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
