//! Append-only raw video sink

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Append-only destination for raw BGRA frames, one write per frame.
///
/// Any I/O error here is fatal to the owning session.
pub struct FrameSink {
    writer: BufWriter<File>,
    frame_len: usize,
    frames: u64,
}

impl FrameSink {
    pub fn create(path: &Path, width: u32, height: u32) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            frame_len: width as usize * height as usize * 4,
            frames: 0,
        })
    }

    pub fn append(&mut self, bgra: &[u8]) -> io::Result<()> {
        if bgra.len() != self.frame_len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "frame is {} bytes, sink expects {}",
                    bgra.len(),
                    self.frame_len
                ),
            ));
        }
        self.writer.write_all(bgra)?;
        self.frames += 1;
        Ok(())
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Flush and close, returning the frame count.
    pub fn finish(mut self) -> io::Result<u64> {
        self.writer.flush()?;
        Ok(self.frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_whole_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frames.bgra");
        let mut sink = FrameSink::create(&path, 2, 2).unwrap();

        sink.append(&[0u8; 16]).unwrap();
        sink.append(&[1u8; 16]).unwrap();
        assert_eq!(sink.frames(), 2);

        let frames = sink.finish().unwrap();
        assert_eq!(frames, 2);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 32);
    }

    #[test]
    fn rejects_misshapen_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frames.bgra");
        let mut sink = FrameSink::create(&path, 2, 2).unwrap();

        let err = sink.append(&[0u8; 15]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert_eq!(sink.frames(), 0);
    }
}
