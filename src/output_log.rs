// src/output_log.rs

//! Bounded capture of a child's stdout or stderr.
//!
//! An [`OutputLog`] keeps the first [`MAX_HEAD`] bytes and a rolling tail of
//! the most recent output. Finalizing inserts a truncation banner when data
//! was dropped and rewrites non-UTF-8 output to a valid lossy encoding with
//! a notice appended. The file-teeing variant lives in the process runner
//! (`exec::process`), which writes every chunk to the command's output file
//! in addition to the in-memory log.

/// Maximum number of bytes kept at the start of the stream.
pub const MAX_HEAD: usize = 512 * 1024;

/// Number of bytes of tail retained once the head is saturated.
pub const TAIL_LENGTH: usize = 10 * 1024;

const TRUNCATION_BANNER: &str = "\n\n\
*****************************************************************************\n\
testdag: Data was removed due to excessive length. Rerun with a higher\n\
output cap if the full output is needed.\n\
*****************************************************************************\n\n";

const NON_UTF8_BANNER: &str = "\n\
*****************************************************************************\n\
testdag: The output of this test contained non-UTF8 formatted data.\n\
*****************************************************************************\n";

/// Truncating, UTF-8-validating byte buffer for child stdio.
#[derive(Debug, Default)]
pub struct OutputLog {
    head: Vec<u8>,
    tail: Vec<u8>,
    complete: Option<Vec<u8>>,
    data_dropped: bool,
    has_non_utf8: bool,
}

impl OutputLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk of raw output.
    ///
    /// Panics when called after [`finalize`](Self::finalize); a finalized
    /// log is immutable.
    pub fn add(&mut self, data: &[u8]) {
        assert!(
            self.complete.is_none(),
            "attempted to add data to a finalized output log"
        );

        if self.head.len() < MAX_HEAD {
            let space = MAX_HEAD - self.head.len();
            if data.len() <= space {
                self.head.extend_from_slice(data);
                return;
            }
            self.head.extend_from_slice(&data[..space]);
            self.tail.extend_from_slice(&data[space..]);
        } else {
            self.tail.extend_from_slice(data);
        }

        // Amortized trim: total capture never exceeds MAX_HEAD + 2 * TAIL_LENGTH.
        if self.tail.len() > 2 * TAIL_LENGTH {
            self.data_dropped = true;
            let cut = self.tail.len() - TAIL_LENGTH;
            self.tail.drain(..cut);
        }
    }

    /// Bytes currently buffered; used to check the capture bound.
    pub fn buffered_len(&self) -> usize {
        self.head.len() + self.tail.len()
    }

    /// Combine head and tail into the final buffer, inserting the truncation
    /// banner if data was dropped and rewriting non-UTF-8 content.
    ///
    /// Idempotent: the first call caches its result and later calls return
    /// the identical bytes.
    pub fn finalize(&mut self) -> &[u8] {
        if self.complete.is_none() {
            let mut buf = std::mem::take(&mut self.head);
            if self.data_dropped {
                buf.extend_from_slice(TRUNCATION_BANNER.as_bytes());
            }
            buf.append(&mut self.tail);

            if std::str::from_utf8(&buf).is_err() {
                self.has_non_utf8 = true;
                let mut rewritten =
                    String::from_utf8_lossy(&buf).into_owned().into_bytes();
                rewritten.extend_from_slice(NON_UTF8_BANNER.as_bytes());
                buf = rewritten;
            }

            self.complete = Some(buf);
        }
        self.complete.as_deref().unwrap_or(&[])
    }

    pub fn data_dropped(&self) -> bool {
        self.data_dropped
    }

    /// Set after finalization when the raw output was not valid UTF-8.
    pub fn has_non_utf8(&self) -> bool {
        self.has_non_utf8
    }
}
