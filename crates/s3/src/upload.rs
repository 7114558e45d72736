//! Splitting a streamed body into multipart-upload parts

use bytes::{Bytes, BytesMut};
use futures::TryStreamExt;
use shift_core::{ByteStream, Result};

/// Size of every multipart part except the last
pub const PART_SIZE: usize = 8 * 1024 * 1024;

/// Re-chunks a byte stream into fixed-size parts
pub(crate) struct PartReader {
    stream: ByteStream,
    buffer: BytesMut,
    part_size: usize,
    finished: bool,
}

impl PartReader {
    pub(crate) fn new(stream: ByteStream, part_size: usize) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(part_size),
            part_size,
            finished: false,
        }
    }

    /// Next part of exactly `part_size` bytes, or the shorter tail.
    /// `None` once the stream is drained.
    pub(crate) async fn next_part(&mut self) -> Result<Option<Bytes>> {
        while !self.finished && self.buffer.len() < self.part_size {
            match self.stream.try_next().await? {
                Some(chunk) => self.buffer.extend_from_slice(&chunk),
                None => self.finished = true,
            }
        }

        if self.buffer.is_empty() {
            return Ok(None);
        }

        let len = self.buffer.len().min(self.part_size);
        Ok(Some(self.buffer.split_to(len).freeze()))
    }

    /// True when no bytes remain
    pub(crate) fn is_exhausted(&self) -> bool {
        self.finished && self.buffer.is_empty()
    }
}
