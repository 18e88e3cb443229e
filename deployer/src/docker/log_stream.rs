//! Docker multiplexed log stream decoding
//!
//! With `Tty: false` the runtime interleaves stdout and stderr in one byte
//! stream. Each frame is an 8-byte header followed by its payload:
//!
//! ```text
//! [kind, 0, 0, 0, len >> 24, len >> 16, len >> 8, len] payload...
//! ```

/// Length of a frame header in bytes
pub const HEADER_LENGTH: usize = 8;

const FRAME_SIZE_OFFSET: usize = 4;

/// Stream a frame was written to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdin,
    Stdout,
    Stderr,
    Unknown(u8),
}

impl StreamKind {
    pub fn from_tag(tag: u8) -> Self {
        match tag {
            0 => StreamKind::Stdin,
            1 => StreamKind::Stdout,
            2 => StreamKind::Stderr,
            other => StreamKind::Unknown(other),
        }
    }

    pub fn tag(&self) -> u8 {
        match self {
            StreamKind::Stdin => 0,
            StreamKind::Stdout => 1,
            StreamKind::Stderr => 2,
            StreamKind::Unknown(tag) => *tag,
        }
    }
}

/// One decoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFrame {
    pub stream: StreamKind,
    pub payload: Vec<u8>,
}

impl LogFrame {
    /// Payload as text, replacing invalid UTF-8
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }

    /// Encode this frame in the multiplexed wire format
    pub fn encode(&self) -> Vec<u8> {
        let length = u32::try_from(self.payload.len()).unwrap_or(u32::MAX);

        let mut data = Vec::with_capacity(HEADER_LENGTH + self.payload.len());
        data.push(self.stream.tag());
        data.extend_from_slice(&[0, 0, 0]);
        data.extend_from_slice(&length.to_be_bytes());
        data.extend_from_slice(&self.payload[..length as usize]);
        data
    }
}

/// Result of attempting to decode one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A complete frame and the number of bytes it occupied
    Frame { frame: LogFrame, consumed: usize },

    /// Not enough bytes yet; the caller should retry once more data arrives
    Incomplete,
}

impl Decoded {
    /// Bytes consumed from the buffer (zero when incomplete)
    pub fn consumed(&self) -> usize {
        match self {
            Decoded::Frame { consumed, .. } => *consumed,
            Decoded::Incomplete => 0,
        }
    }
}

/// Try to decode one frame starting at `offset`.
///
/// Never mutates `data`; the returned payload is an independent copy.
pub fn decode_frame(data: &[u8], offset: usize) -> Decoded {
    let remaining = match data.get(offset..) {
        Some(remaining) if remaining.len() >= HEADER_LENGTH => remaining,
        _ => return Decoded::Incomplete,
    };

    let mut length_bytes = [0u8; 4];
    length_bytes.copy_from_slice(&remaining[FRAME_SIZE_OFFSET..HEADER_LENGTH]);
    let length = u32::from_be_bytes(length_bytes) as usize;

    let body = &remaining[HEADER_LENGTH..];
    if length > body.len() {
        return Decoded::Incomplete;
    }

    Decoded::Frame {
        frame: LogFrame {
            stream: StreamKind::from_tag(remaining[0]),
            payload: body[..length].to_vec(),
        },
        consumed: HEADER_LENGTH + length,
    }
}

/// Decode every complete frame in `data`, returning them with the bytes consumed.
///
/// A trailing partial frame is left unconsumed.
pub fn decode_all(data: &[u8]) -> (Vec<LogFrame>, usize) {
    let mut frames = Vec::new();
    let mut offset = 0;

    while let Decoded::Frame { frame, consumed } = decode_frame(data, offset) {
        frames.push(frame);
        offset += consumed;
    }

    (frames, offset)
}
