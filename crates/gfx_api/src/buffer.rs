//! GPU buffers
//!
//! A [`Buffer`] is a caller-owned handle to vertex or index storage. Debug
//! builds enforce at most one upload per buffer per frame: the context stamps
//! each upload with its frame counter and refuses a second upload carrying
//! the same stamp.

use serde::{Deserialize, Serialize};

use crate::backend::BufferId;
use crate::error::{RenderError, RenderResult};

/// What a buffer holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BufferUsage {
    /// Vertex attributes
    Vertex,
    /// 16- or 32-bit indices
    Index,
}

/// How often the contents change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BufferStorageHint {
    /// Written once, drawn many times
    Static,
    /// Rewritten occasionally
    Dynamic,
    /// Rewritten every frame
    Stream,
}

/// Caller-owned GPU buffer
#[derive(Debug)]
pub struct Buffer {
    pub(crate) id: BufferId,
    usage: BufferUsage,
    hint: BufferStorageHint,
    size: usize,
    last_upload_frame: Option<u64>,
}

impl Buffer {
    pub(crate) fn new(id: BufferId, usage: BufferUsage, hint: BufferStorageHint) -> Self {
        Self {
            id,
            usage,
            hint,
            size: 0,
            last_upload_frame: None,
        }
    }

    /// Backend handle
    pub fn id(&self) -> BufferId {
        self.id
    }

    /// Usage kind
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    /// Storage hint
    pub fn hint(&self) -> BufferStorageHint {
        self.hint
    }

    /// Current size in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    /// Frame stamp of the most recent upload
    pub fn last_upload_frame(&self) -> Option<u64> {
        self.last_upload_frame
    }

    /// Refuse a second upload within `frame` in debug builds
    pub(crate) fn check_upload(&self, frame: u64) -> RenderResult<()> {
        if cfg!(debug_assertions) && self.last_upload_frame == Some(frame) {
            return Err(RenderError::BufferUpdatedTwice {
                buffer: self.id.0,
                frame,
            });
        }
        Ok(())
    }

    /// Record a successful upload at `frame`
    pub(crate) fn stamp_upload(&mut self, frame: u64) {
        self.last_upload_frame = Some(frame);
    }

    /// Check that `offset + len` lies inside the buffer
    pub(crate) fn check_range(&self, offset: usize, len: usize) -> RenderResult<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.size => Ok(()),
            _ => Err(RenderError::InvalidOperation(format!(
                "Update of {} bytes at offset {} overruns buffer {} of {} bytes",
                len, offset, self.id.0, self.size
            ))),
        }
    }

    pub(crate) fn set_size(&mut self, size: usize) {
        self.size = size;
    }
}
