//! Fan-out writer for child process output

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// Writer that copies every write into two sinks
pub struct Tee<A, B> {
    capture: A,
    mirror: B,
}

impl<A: Write, B: Write> Tee<A, B> {
    pub fn new(capture: A, mirror: B) -> Self {
        Self { capture, mirror }
    }

    #[cfg(test)]
    fn into_inner(self) -> (A, B) {
        (self.capture, self.mirror)
    }
}

impl<A: Write, B: Write> Write for Tee<A, B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.capture.write_all(buf)?;
        self.mirror.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.capture.flush()?;
        self.mirror.flush()
    }
}

/// In-memory capture buffer that can be appended to from several tasks
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    /// Everything captured so far, decoded lossily as UTF-8
    pub fn to_string_lossy(&self) -> String {
        let bytes = self.0.lock().unwrap_or_else(|e| e.into_inner());
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tee_writes_both_sinks() {
        let mut tee = Tee::new(Vec::new(), Vec::new());
        tee.write_all(b"hello ").unwrap();
        tee.write_all(b"world").unwrap();

        let (capture, mirror) = tee.into_inner();
        assert_eq!(capture, b"hello world");
        assert_eq!(mirror, b"hello world");
    }

    #[test]
    fn test_shared_buffer_clones_share_storage() {
        let buffer = SharedBuffer::default();
        let mut a = buffer.clone();
        let mut b = buffer.clone();

        a.write_all(b"xxx").unwrap();
        b.write_all(b"yyy").unwrap();

        assert_eq!(buffer.to_string_lossy(), "xxxyyy");
    }

    #[test]
    fn test_shared_buffer_concurrent_append() {
        let buffer = SharedBuffer::default();
        let threads: Vec<_> = (0..4)
            .map(|_| {
                let mut writer = buffer.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        writer.write_all(b"ab").unwrap();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        let text = buffer.to_string_lossy();
        assert_eq!(text.len(), 800);
        assert_eq!(text.matches("ab").count(), 400);
    }
}
