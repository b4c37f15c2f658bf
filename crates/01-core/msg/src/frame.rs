use std::sync::Arc;

use crate::Loc;

/// Audio frame; `buf` is opaque to the dispatch core.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioFrame {
    /// Frame name; must not be empty.
    pub name: String,
    /// Encoded or raw sample bytes.
    pub buf: Arc<[u8]>,
    /// Capture timestamp in milliseconds.
    pub timestamp: i64,
    /// Sample rate in Hertz.
    pub sample_rate: u32,
    /// Channel count.
    pub channels: u16,
    /// Explicit destination; the router's default is used when absent.
    pub dest: Option<Loc>,
}

impl AudioFrame {
    /// Creates an empty 16 kHz mono frame.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            buf: Arc::from([]),
            timestamp: 0,
            sample_rate: 16_000,
            channels: 1,
            dest: None,
        }
    }

    /// Replaces the frame buffer.
    pub fn with_buf(mut self, buf: impl Into<Arc<[u8]>>) -> Self {
        self.buf = buf.into();
        self
    }
}

/// Video frame; `buf` is opaque to the dispatch core.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoFrame {
    /// Frame name; must not be empty.
    pub name: String,
    /// Encoded or raw pixel bytes.
    pub buf: Arc<[u8]>,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Capture timestamp in milliseconds.
    pub timestamp: i64,
    /// Explicit destination; the router's default is used when absent.
    pub dest: Option<Loc>,
}

impl VideoFrame {
    /// Creates an empty zero-sized frame.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            buf: Arc::from([]),
            width: 0,
            height: 0,
            timestamp: 0,
            dest: None,
        }
    }

    /// Replaces the frame buffer and dimensions.
    pub fn with_image(mut self, width: u32, height: u32, buf: impl Into<Arc<[u8]>>) -> Self {
        self.width = width;
        self.height = height;
        self.buf = buf.into();
        self
    }
}
