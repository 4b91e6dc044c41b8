//! Command batches: the unit of work for one USB round trip.
//!
//! A [`CommandBatch`] collects MPSSE opcodes in one buffer and sizes a second
//! buffer for the bytes the chip will send back. Encoders reserve regions in
//! both and return a [`CommandHandle`] describing where their bytes live.
//! After [`TransportSession::submit`](crate::TransportSession::submit) fills
//! the response buffer, the handle reads back that command's slice of it.
//!
//! Handles carry the id of the batch that issued them and the batch
//! generation at the time. [`CommandBatch::reset`] bumps the generation, so a
//! handle kept across a reset is rejected with [`Error::StaleHandle`] instead
//! of silently reading another command's bytes.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Error, Result};

static NEXT_BATCH_ID: AtomicU64 = AtomicU64::new(1);

/// Capacity a stream should have to fit `additional` more bytes.
///
/// Grows to at least 3/2 of the current capacity so that a long run of small
/// reservations costs amortized O(1) per byte. Returns `capacity` unchanged
/// when the request already fits.
pub(crate) fn grown_capacity(len: usize, capacity: usize, additional: usize) -> usize {
    let required = len.saturating_add(additional);
    if required <= capacity {
        return capacity;
    }
    required.max(capacity.saturating_add(capacity / 2))
}

fn reserve_in(buf: &mut Vec<u8>, additional: usize) -> Result<usize> {
    let offset = buf.len();
    let end = offset
        .checked_add(additional)
        .ok_or(Error::InvalidArgument("reservation overflows the batch"))?;

    let target = grown_capacity(offset, buf.capacity(), additional);
    if target > buf.capacity() {
        buf.try_reserve_exact(target - offset)?;
    }
    buf.resize(end, 0);
    Ok(offset)
}

/// Location of one command's bytes inside a [`CommandBatch`].
///
/// Handles are cheap to copy. They stay valid until the batch they came from
/// is reset or released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandHandle {
    batch: u64,
    generation: u64,
    command_offset: usize,
    command_len: usize,
    response_offset: usize,
    response_len: usize,
}

impl CommandHandle {
    /// Offset of the command bytes in the command stream.
    pub fn command_offset(&self) -> usize {
        self.command_offset
    }

    /// Number of command bytes.
    pub fn command_len(&self) -> usize {
        self.command_len
    }

    /// Offset of the expected reply in the response stream.
    pub fn response_offset(&self) -> usize {
        self.response_offset
    }

    /// Number of bytes the device sends back for this command.
    pub fn response_len(&self) -> usize {
        self.response_len
    }

    /// Whether the command neither sends nor expects anything.
    pub fn is_empty(&self) -> bool {
        self.command_len == 0 && self.response_len == 0
    }
}

/// Outgoing MPSSE commands plus room for the replies they produce.
#[derive(Debug)]
pub struct CommandBatch {
    id: u64,
    generation: u64,
    commands: Vec<u8>,
    responses: Vec<u8>,
    completed: bool,
}

impl Default for CommandBatch {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandBatch {
    /// Create an empty batch. No memory is allocated until the first
    /// reservation.
    pub fn new() -> Self {
        Self {
            id: NEXT_BATCH_ID.fetch_add(1, Ordering::Relaxed),
            generation: 0,
            commands: Vec::new(),
            responses: Vec::new(),
            completed: false,
        }
    }

    /// The full command stream, in the order it will be sent.
    pub fn commands(&self) -> &[u8] {
        &self.commands
    }

    /// Number of command bytes reserved so far.
    pub fn command_len(&self) -> usize {
        self.commands.len()
    }

    /// Number of response bytes the device is expected to send.
    pub fn response_len(&self) -> usize {
        self.responses.len()
    }

    /// Bytes the command stream can hold before it reallocates.
    pub fn command_capacity(&self) -> usize {
        self.commands.capacity()
    }

    /// Bytes the response stream can hold before it reallocates.
    pub fn response_capacity(&self) -> usize {
        self.responses.capacity()
    }

    /// Whether nothing has been reserved since creation or the last reset.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.responses.is_empty()
    }

    /// Whether the batch has been submitted successfully and its responses
    /// can be read.
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    fn ensure_building(&self) -> Result<()> {
        if self.completed {
            return Err(Error::InvalidArgument(
                "batch was already submitted; reset it before adding commands",
            ));
        }
        Ok(())
    }

    fn check(&self, handle: &CommandHandle) -> Result<()> {
        if handle.batch != self.id || handle.generation != self.generation {
            return Err(Error::StaleHandle);
        }
        Ok(())
    }

    /// Grow the command stream by `n` zeroed bytes and return their offset.
    pub fn reserve_command(&mut self, n: usize) -> Result<usize> {
        self.ensure_building()?;
        reserve_in(&mut self.commands, n)
    }

    /// Grow the response stream by `n` bytes and return their offset.
    pub fn reserve_response(&mut self, n: usize) -> Result<usize> {
        self.ensure_building()?;
        reserve_in(&mut self.responses, n)
    }

    /// Reserve `command_len` command bytes and `response_len` response bytes
    /// as one command.
    pub fn reserve(&mut self, command_len: usize, response_len: usize) -> Result<CommandHandle> {
        let command_offset = self.reserve_command(command_len)?;
        let response_offset = self.reserve_response(response_len)?;
        Ok(CommandHandle {
            batch: self.id,
            generation: self.generation,
            command_offset,
            command_len,
            response_offset,
            response_len,
        })
    }

    /// Append `bytes` as one command expecting `response_len` reply bytes.
    pub fn push(&mut self, bytes: &[u8], response_len: usize) -> Result<CommandHandle> {
        let handle = self.reserve(bytes.len(), response_len)?;
        self.command_mut(&handle)?.copy_from_slice(bytes);
        Ok(handle)
    }

    /// The command bytes a handle refers to.
    pub fn command(&self, handle: &CommandHandle) -> Result<&[u8]> {
        self.check(handle)?;
        let start = handle.command_offset;
        Ok(&self.commands[start..start + handle.command_len])
    }

    /// Mutable access to the command bytes a handle refers to.
    pub fn command_mut(&mut self, handle: &CommandHandle) -> Result<&mut [u8]> {
        self.check(handle)?;
        let start = handle.command_offset;
        Ok(&mut self.commands[start..start + handle.command_len])
    }

    /// The reply bytes for a handle. Only available once the batch has
    /// completed a submission.
    pub fn response(&self, handle: &CommandHandle) -> Result<&[u8]> {
        self.check(handle)?;
        if !self.completed {
            return Err(Error::ResponsePending);
        }
        let start = handle.response_offset;
        Ok(&self.responses[start..start + handle.response_len])
    }

    /// Empty both streams, keeping their allocations for reuse.
    ///
    /// Every handle issued before the reset becomes stale.
    pub fn reset(&mut self) {
        self.commands.clear();
        self.responses.clear();
        self.completed = false;
        self.generation = self.generation.wrapping_add(1);
    }

    /// Free the batch storage.
    pub fn release(self) {}

    pub(crate) fn response_buffer_mut(&mut self) -> &mut [u8] {
        &mut self.responses
    }

    pub(crate) fn mark_completed(&mut self) {
        self.completed = true;
    }

    /// Forget whatever a failed submission left in the response stream.
    pub(crate) fn discard_responses(&mut self) {
        self.responses.fill(0);
        self.completed = false;
    }
}
