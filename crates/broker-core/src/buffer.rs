use crate::limits::INBOUND_BUFFER_CAPACITY;

/// Bounded holding area for partial lines between reads of one connection.
///
/// # Why
/// TCP (even wrapped in TLS) delivers bytes, not lines; a `SUBSCRIBE foo\n` command may
/// arrive split across two reads, or two commands may arrive in the same read. The
/// original C implementation solved this with a fixed-size per-client byte array plus
/// `memmove`-based line extraction (`client_buffer_append` / `client_buffer_extract_line`
/// in `client_manager.c`). This type is that same algorithm, minus the manual memory
/// management: `append` discards the whole buffer and logs a warning on overflow rather
/// than silently truncating, and `extract_line` returns an owned `String` instead of
/// writing into a caller-supplied fixed buffer.
///
/// # Contract
/// - `append` never grows the buffer past [`INBOUND_BUFFER_CAPACITY`]; an append that
///   would overflow discards everything already buffered (a malformed or hostile peer
///   loses its partial command, which is strictly preferable to unbounded memory growth).
/// - `extract_line` finds the first `\n`, returns the bytes before it (with any trailing
///   `\r` stripped) as a line, and shifts the remainder down. Callers must loop until it
///   returns `None` to drain every complete line produced by one `append`.
#[derive(Debug, Default)]
pub struct InboundBuffer {
    bytes: Vec<u8>,
}

impl InboundBuffer {
    pub fn new() -> Self {
        Self {
            bytes: Vec::with_capacity(256),
        }
    }

    /// Appends `data` to the tail of the buffer. Returns `false` (and discards the
    /// entire buffer) if the result would exceed [`INBOUND_BUFFER_CAPACITY`].
    pub fn append(&mut self, data: &[u8]) -> bool {
        if self.bytes.len() + data.len() > INBOUND_BUFFER_CAPACITY {
            tracing::warn!(
                buffered = self.bytes.len(),
                incoming = data.len(),
                capacity = INBOUND_BUFFER_CAPACITY,
                "inbound buffer overflow, discarding buffered data"
            );
            self.bytes.clear();
            return false;
        }
        self.bytes.extend_from_slice(data);
        true
    }

    /// Extracts one complete line (sans trailing `\r\n`/`\n`) if the buffer contains one.
    pub fn extract_line(&mut self) -> Option<String> {
        let newline_at = self.bytes.iter().position(|&b| b == b'\n')?;
        let mut line_bytes: Vec<u8> = self.bytes.drain(..=newline_at).collect();
        line_bytes.pop(); // drop the '\n'
        if line_bytes.last() == Some(&b'\r') {
            line_bytes.pop();
        }
        Some(String::from_utf8_lossy(&line_bytes).into_owned())
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }
}
