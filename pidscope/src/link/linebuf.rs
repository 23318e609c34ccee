//! Reassembly buffer for newline delimited text arriving in arbitrary chunks.

use std::io;

/// Size of the internal buffer. Also the longest line that can be returned.
pub const LINEBUF_SIZE: usize = 4096;

/// Holds bytes read from the link until a full line is available.
/// Partial lines stay in the buffer across reads.
pub struct LineBuf {
    /// Internal buffer. Valid data (possibly none) is
    /// in a slice delimited by `start` and `end`.
    buf: Box<[u8; LINEBUF_SIZE]>,
    /// Start offset of valid data in `buf`.
    start: usize,
    /// End offset of valid data in `buf`.
    end: usize,
    /// Bytes up to the next terminator belong to a line that was dropped.
    skipping: bool,
}

impl LineBuf {
    /// Returns an empty `LineBuf`.
    pub fn new() -> LineBuf {
        LineBuf {
            buf: Box::new([0; LINEBUF_SIZE]),
            start: 0,
            end: 0,
            skipping: false,
        }
    }

    pub fn empty(&self) -> bool {
        self.start == self.end
    }

    /// Returns the amount of data contained in this buffer, in bytes.
    pub fn size(&self) -> usize {
        self.end - self.start
    }

    /// True when no more data can be read in. Only happens when the
    /// buffer holds a single unterminated line of `LINEBUF_SIZE` bytes.
    pub fn full(&self) -> bool {
        self.size() == LINEBUF_SIZE
    }

    pub fn data(&self) -> &[u8] {
        &self.buf[self.start..self.end]
    }

    /// Discard the entire content of the buffer.
    pub fn flush(&mut self) {
        self.start = 0;
        self.end = 0;
        self.skipping = false;
    }

    /// Discards the buffered, unterminated line along with whatever is still
    /// to come of it, up to and including its terminator.
    pub fn drop_overlong(&mut self) {
        self.flush();
        self.skipping = true;
    }

    /// Moves the data internally to the start of the buffer.
    fn compact(&mut self) {
        if self.start != 0 {
            let len = self.size();
            self.buf.copy_within(self.start..self.end, 0);
            self.start = 0;
            self.end = len;
        }
    }

    /// Reads at most `max` bytes from `reader`. Timeouts and would-block
    /// conditions read nothing rather than failing.
    pub fn refill<T: io::Read>(&mut self, reader: &mut T, max: usize) -> io::Result<usize> {
        self.compact();
        let room = (LINEBUF_SIZE - self.end).min(max);
        if room == 0 {
            return Ok(0);
        }
        match reader.read(&mut self.buf[self.end..self.end + room]) {
            Ok(size) => {
                self.end += size;
                Ok(size)
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }

    /// Removes and returns the next complete, non-empty line, without its
    /// `\n` or `\r` terminator.
    pub fn next_line(&mut self) -> Option<Vec<u8>> {
        loop {
            let found = self.data().iter().position(|&b| b == b'\n' || b == b'\r');
            let Some(pos) = found else {
                if self.skipping {
                    self.start = self.end;
                }
                return None;
            };
            if self.skipping {
                self.start += pos + 1;
                self.skipping = false;
                continue;
            }
            let line = self.data()[..pos].to_vec();
            self.start += pos + 1;
            if !line.is_empty() {
                return Some(line);
            }
        }
    }
}

impl Default for LineBuf {
    fn default() -> Self {
        Self::new()
    }
}
