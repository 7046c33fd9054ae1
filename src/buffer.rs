//! A growable byte region with independent head/tail cursors.
//!
//! Mirrors the teacher crate's `Parser`/`Response` buffers (boxed byte
//! slices addressed by explicit cursor arithmetic, grown on demand) but
//! generalizes them into one reusable type shared by the read and write
//! sides of a [`Connection`](crate::http::transport::Connection), and
//! exposes the in-place `collapse`/`shift` edits the chunked-decoder and
//! URL-rewriter need.
//!
//! Bytes in `[head, tail)` are the live payload; bytes outside are scratch.
//! All growth preserves the logical payload. A magic sentinel guards
//! against use of a zeroed-out (destroyed) buffer.

use crate::errors::ErrorKind;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::sleep;

const BUFFER_MAGIC: u32 = 0x1234_4321;

/// A growable byte region with independent head/tail cursors.
///
/// See the module docs for the invariants. All "checked offset" operations
/// (`collapse`, `shift`, `snip`) validate their arguments against the
/// current region size; out-of-range `collapse` is a documented silent
/// no-op (matching the design contract), everything else fails loudly.
#[derive(Debug)]
pub struct Buffer {
    region: Vec<u8>,
    head: usize,
    tail: usize,
    magic: u32,
}

impl Buffer {
    /// Allocates a new buffer with the given initial capacity.
    pub fn init(capacity: usize) -> Result<Self, ErrorKind> {
        if capacity == 0 {
            return Err(ErrorKind::AllocationFailure);
        }

        Ok(Self {
            region: vec![0u8; capacity],
            head: 0,
            tail: 0,
            magic: BUFFER_MAGIC,
        })
    }

    /// Zeroes the region and releases it. After this call the buffer must
    /// not be used again (enforced by consuming `self`).
    pub fn destroy(mut self) {
        self.region.fill(0);
        self.magic = 0;
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.region.len()
    }

    #[inline(always)]
    pub fn used(&self) -> usize {
        self.tail - self.head
    }

    #[inline(always)]
    pub fn slack(&self) -> usize {
        self.capacity() - self.used()
    }

    #[inline(always)]
    pub fn head(&self) -> usize {
        self.head
    }

    #[inline(always)]
    pub fn tail(&self) -> usize {
        self.tail
    }

    /// The live payload, `region[head..tail]`.
    #[inline(always)]
    pub fn as_slice(&self) -> &[u8] {
        &self.region[self.head..self.tail]
    }

    #[inline(always)]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.region[self.head..self.tail]
    }

    /// The whole backing region, live payload and scratch alike. `collapse`
    /// and `shift` operate on this, not just on `as_slice()`, because
    /// downstream consumers (chunk decoding, URL rewriting) address bytes
    /// by absolute offset into the region.
    #[inline(always)]
    pub fn whole_region(&self) -> &[u8] {
        &self.region
    }

    #[inline(always)]
    pub fn integrity(&self) -> bool {
        self.magic == BUFFER_MAGIC
    }

    /// True iff the magic sentinel is intact and the cursor invariant
    /// `head <= tail <= capacity` holds.
    pub fn is_sane(&self) -> bool {
        self.integrity() && self.head <= self.tail && self.tail <= self.capacity()
    }

    /// Appends `bytes` to the tail, growing the buffer if necessary.
    pub fn append(&mut self, bytes: &[u8]) -> Result<(), ErrorKind> {
        self.append_ex(bytes, bytes.len())
    }

    /// Appends the first `n` bytes of `bytes` to the tail.
    pub fn append_ex(&mut self, bytes: &[u8], n: usize) -> Result<(), ErrorKind> {
        if n > bytes.len() {
            return Err(ErrorKind::AllocationFailure);
        }

        if n > self.slack() {
            self.extend(n.max(self.capacity()))?;
        }

        self.region[self.tail..self.tail + n].copy_from_slice(&bytes[..n]);
        self.tail += n;
        Ok(())
    }

    /// Removes `range` bytes starting at absolute offset `off`, shifting
    /// everything after them left and zero-filling the vacated tail.
    /// Silently does nothing if `off`/`range` fall outside the region, per
    /// the design contract (the original's `buf_collapse` is the same:
    /// an out-of-range request is a no-op, not an error).
    pub fn collapse(&mut self, off: usize, range: usize) {
        if range > self.capacity() || off >= self.capacity() {
            return;
        }

        if range == self.capacity() {
            self.clear();
            return;
        }

        let from = off + range;
        let end = self.capacity();
        if from > end {
            return;
        }

        self.region.copy_within(from..end, off);
        let zero_from = end - range;
        self.region[zero_from..end].fill(0);

        self.tail = self.tail.saturating_sub(range);
        if self.tail < self.head {
            self.tail = self.head;
        }
    }

    /// Opens a zero-filled gap of `range` bytes at `head + off`, growing the
    /// buffer first if there isn't enough slack. The tail advances by
    /// `range`.
    pub fn shift(&mut self, off: usize, range: usize) -> Result<(), ErrorKind> {
        if range == 0 {
            return Ok(());
        }

        if range > self.slack() {
            self.extend(range)?;
        }

        let from = self.head + off;
        let to = from + range;
        let moved = self.tail - from;

        self.region.copy_within(from..from + moved, to);
        self.region[from..from + range].fill(0);

        self.tail += range;
        Ok(())
    }

    /// Grows the capacity by `by` bytes, preserving `head`/`tail` offsets.
    pub fn extend(&mut self, by: usize) -> Result<(), ErrorKind> {
        if by == 0 {
            return Ok(());
        }

        self.region
            .try_reserve(by)
            .map_err(|_| ErrorKind::AllocationFailure)?;
        self.region.resize(self.capacity() + by, 0);
        Ok(())
    }

    /// Pulls the tail back by `n` bytes (`n <= used`), zeroing them.
    pub fn snip(&mut self, n: usize) {
        let n = n.min(self.used());
        let new_tail = self.tail - n;
        self.region[new_tail..self.tail].fill(0);
        self.tail = new_tail;
    }

    /// Zeroes the whole region and resets both cursors to the start.
    pub fn clear(&mut self) {
        self.region.fill(0);
        self.head = 0;
        self.tail = 0;
    }

    /// Drops `n` bytes already consumed from the head, without touching
    /// the rest of the live payload. Used once a parser has consumed a
    /// prefix (e.g. the request line) and wants the rest addressed from
    /// offset 0 again.
    pub fn consume_head(&mut self, n: usize) {
        let n = n.min(self.used());
        self.head += n;
    }

    /// Finds the first occurrence of `needle` within the live payload at
    /// or after absolute offset `from`, returning an absolute offset.
    /// Used by the HTTP transaction layer to locate header terminators
    /// and chunk-size line boundaries.
    pub fn find_from(&self, needle: &[u8], from: usize) -> Option<usize> {
        if from >= self.tail {
            return None;
        }
        memchr::memmem::find(&self.region[from..self.tail], needle).map(|pos| from + pos)
    }

    /// Compacts the buffer by moving the live payload back to offset 0,
    /// discarding already-consumed head bytes. Called between pipelined
    /// reads so `slack()` reflects real room at the tail.
    pub fn compact(&mut self) {
        if self.head == 0 {
            return;
        }

        let used = self.used();
        self.region.copy_within(self.head..self.tail, 0);
        self.region[used..self.tail].fill(0);
        self.head = 0;
        self.tail = used;
    }
}

/// Plaintext and TLS I/O. Generic over `AsyncRead`/`AsyncWrite` so a single
/// implementation covers a raw file, a `TcpStream`, or anything else tokio
/// can drive — the design's `read_fd`/`read_socket` split collapses to one
/// generic function; only TLS needs distinct partial-read-on-timeout
/// semantics, because a `want-read` condition is not an error.
impl Buffer {
    /// Reads until `want` bytes have been consumed into the tail or the
    /// peer closes the connection (`Ok(0)` from the underlying reader).
    /// `read_timeout` bounds the whole operation, not each syscall: on
    /// timeout this is a fatal [`ErrorKind::TransportError`], matching the
    /// design's "transport errors are fatal for that transaction" rule for
    /// plaintext I/O.
    pub async fn read_exact_or_eof<R: AsyncRead + Unpin>(
        &mut self,
        io: &mut R,
        want: usize,
        read_timeout: Duration,
    ) -> Result<usize, ErrorKind> {
        if want > self.slack() {
            self.extend(want.max(self.capacity()))?;
        }

        let mut total = 0;
        let deadline = sleep(read_timeout);
        tokio::pin!(deadline);

        while total < want {
            tokio::select! {
                biased;

                result = io.read(&mut self.region[self.tail..self.tail + (want - total)]) => {
                    let n = result?;
                    if n == 0 {
                        break;
                    }
                    self.tail += n;
                    total += n;
                }
                _ = &mut deadline => {
                    return Err(ErrorKind::TransportError(crate::errors::IoError(
                        std::io::Error::new(std::io::ErrorKind::TimedOut, "read timeout"),
                    )));
                }
            }
        }

        Ok(total)
    }

    /// Reads into whatever slack is currently available (growing it first
    /// if there is none), returning as soon as any bytes arrive or the peer
    /// closes. Used by the header-scan loop, which only needs "more bytes,
    /// whatever you've got".
    pub async fn read_some<R: AsyncRead + Unpin>(
        &mut self,
        io: &mut R,
        read_timeout: Duration,
    ) -> Result<usize, ErrorKind> {
        if self.slack() == 0 {
            self.extend(self.capacity().max(4096))?;
        }

        tokio::select! {
            biased;

            result = io.read(&mut self.region[self.tail..]) => {
                let n = result?;
                self.tail += n;
                Ok(n)
            }
            _ = sleep(read_timeout) => {
                Err(ErrorKind::TransportError(crate::errors::IoError(
                    std::io::Error::new(std::io::ErrorKind::TimedOut, "read timeout"),
                )))
            }
        }
    }

    /// TLS read with "want-read" readiness semantics: each inner read is
    /// bounded by `readiness_timeout` (default 1s); a timeout there is not
    /// an error, it just stops the read and returns whatever was gathered
    /// so far. An overall read returning `Ok(0)` still means peer-closed.
    pub async fn read_tls<R: AsyncRead + Unpin>(
        &mut self,
        io: &mut R,
        want: usize,
        readiness_timeout: Duration,
    ) -> Result<usize, ErrorKind> {
        if want > self.slack() {
            self.extend(want.max(self.capacity()))?;
        }

        let mut total = 0;
        while total < want {
            tokio::select! {
                biased;

                result = io.read(&mut self.region[self.tail..self.tail + (want - total)]) => {
                    let n = result?;
                    if n == 0 {
                        break;
                    }
                    self.tail += n;
                    total += n;
                }
                _ = sleep(readiness_timeout) => {
                    break;
                }
            }
        }

        Ok(total)
    }

    /// Drains the live payload to `io`, advancing `head` by the bytes
    /// accepted. On full success `head` is reset to the region start and
    /// `used()` is zero.
    pub async fn write_all_to<W: AsyncWrite + Unpin>(
        &mut self,
        io: &mut W,
        write_timeout: Duration,
    ) -> Result<(), ErrorKind> {
        tokio::select! {
            biased;

            result = io.write_all(self.as_slice()) => {
                result?;
                self.head = 0;
                self.tail = 0;
                Ok(())
            }
            _ = sleep(write_timeout) => {
                Err(ErrorKind::TransportError(crate::errors::IoError(
                    std::io::Error::new(std::io::ErrorKind::TimedOut, "write timeout"),
                )))
            }
        }
    }
}
