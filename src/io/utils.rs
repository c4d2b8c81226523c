use std::io;

use sha1::{Digest, Sha1};

/// A writable stream that counts every byte passed through it and keeps a running
/// SHA-1 checksum of them.
///
/// Place it *outside* any buffering layer so that [`HashingCountingStream::position`]
/// is the logical offset in the final output regardless of what has been flushed.
#[derive(Clone)]
pub(crate) struct HashingCountingStream<T: io::Write> {
    pub stream: T,
    pub context: Sha1,
    pub bytes_written: u64,
}

impl<T: io::Write> HashingCountingStream<T> {
    pub fn new(file: T) -> HashingCountingStream<T> {
        Self {
            stream: file,
            context: Sha1::new(),
            bytes_written: 0,
        }
    }

    /// The number of bytes written so far
    #[inline]
    pub fn position(&self) -> u64 {
        self.bytes_written
    }

    /// Lowercase hexadecimal SHA-1 digest of everything written so far
    pub fn compute(&self) -> String {
        let digest = self.context.clone().finalize();
        base16ct::lower::encode_string(&digest)
    }

    pub fn into_inner(self) -> T {
        self.stream
    }
}

impl<T: io::Write> io::Write for HashingCountingStream<T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.stream.write(buf)?;
        self.context.update(&buf[..n]);
        self.bytes_written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}
