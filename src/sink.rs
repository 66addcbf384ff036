//! Output sinks for column-chunk bytes.
//!
//! The writer only ever needs three things from its output: append a page
//! header, append raw page bytes, and report how many bytes have been written
//! so far (for page offsets in the metadata).

use std::io::Write;

use crate::error::TambakError;
use crate::format::PageHeader;

pub trait PageSink {
    /// Total bytes written to the sink since it was created.
    fn total_written(&self) -> u64;

    fn write_header(&mut self, header: &PageHeader) -> Result<(), TambakError>;

    fn write_data(&mut self, data: &[u8]) -> Result<(), TambakError>;
}

/// An in-memory sink; the bytes are available through `as_bytes`.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    buffer: Vec<u8>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }
}

impl PageSink for MemorySink {
    fn total_written(&self) -> u64 {
        self.buffer.len() as u64
    }

    fn write_header(&mut self, header: &PageHeader) -> Result<(), TambakError> {
        header.write_to(&mut self.buffer)?;
        Ok(())
    }

    fn write_data(&mut self, data: &[u8]) -> Result<(), TambakError> {
        self.buffer.extend_from_slice(data);
        Ok(())
    }
}

/// Adapts any `std::io::Write` into a sink, counting the bytes passed through.
#[derive(Debug)]
pub struct StreamSink<W: Write> {
    inner: W,
    written: u64,
}

impl<W: Write> StreamSink<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Flushes and returns the wrapped writer.
    pub fn into_inner(mut self) -> Result<W, TambakError> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> PageSink for StreamSink<W> {
    fn total_written(&self) -> u64 {
        self.written
    }

    fn write_header(&mut self, header: &PageHeader) -> Result<(), TambakError> {
        let n = header.write_to(&mut self.inner)?;
        self.written += n as u64;
        Ok(())
    }

    fn write_data(&mut self, data: &[u8]) -> Result<(), TambakError> {
        self.inner.write_all(data)?;
        self.written += data.len() as u64;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Encoding;

    #[test]
    fn test_stream_sink_counts_bytes() {
        let mut sink = StreamSink::new(Vec::new());
        let header = PageHeader::data(1, Encoding::Plain);
        sink.write_header(&header).unwrap();
        sink.write_data(&[1, 2, 3]).unwrap();
        assert_eq!(sink.total_written(), (header.serialized_size() + 3) as u64);
        let bytes = sink.into_inner().unwrap();
        assert_eq!(bytes.len(), header.serialized_size() + 3);
    }

    #[test]
    fn test_memory_sink_matches_stream_sink() {
        let header = PageHeader::dictionary(2);
        let mut memory = MemorySink::new();
        let mut stream = StreamSink::new(Vec::new());
        for sink in [&mut memory as &mut dyn PageSink, &mut stream as &mut dyn PageSink] {
            sink.write_header(&header).unwrap();
            sink.write_data(b"abc").unwrap();
        }
        assert_eq!(memory.as_bytes(), stream.get_ref().as_slice());
    }
}
