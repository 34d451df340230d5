//! Sequential frame source over a byte reader.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use log::{trace, warn};

use crate::error::Error;
use crate::frame::FrameBuffer;
use crate::layout::packed_frame_size;
use crate::types::{PixelFormat, Size, StreamConfig};

/// A lazy, finite sequence of packed planar YUV 4:2:0 frames read from `R`.
///
/// Frames are yielded in order, each exactly `width * height * 3 / 2` bytes.
/// The source is not restartable mid-stream; re-open it to read from the
/// start again.
///
/// A final partial frame is dropped: presenting it would expose whatever
/// happened to be in the tail of the buffer, so the short read is logged and
/// the stream ends. A file shorter than one frame therefore yields no frames
/// at all.
pub struct FrameSource<R> {
    reader: R,
    size: Size,
    pixel_format: PixelFormat,
    packed_size: usize,
    buf: Vec<u8>,
    frames_read: u64,
    finished: bool,
}

impl FrameSource<BufReader<File>> {
    /// Open a frame source over a raw YUV file. The frame dimensions are not
    /// embedded in the file and must be supplied by the caller.
    pub fn open(path: impl AsRef<Path>, config: &StreamConfig) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file), config))
    }
}

impl<R: Read> FrameSource<R> {
    pub fn new(reader: R, config: &StreamConfig) -> Self {
        let size = config.size.aligned_even();
        let packed_size = packed_frame_size(size);
        FrameSource {
            reader,
            size,
            pixel_format: config.pixel_format,
            packed_size,
            buf: vec![0; packed_size],
            frames_read: 0,
            finished: false,
        }
    }

    /// Read the next frame, or `None` at end of stream.
    ///
    /// The returned frame borrows the source's internal buffer and must be
    /// consumed before the next call.
    pub fn next_frame(&mut self) -> Result<Option<FrameBuffer<'_>>, Error> {
        if self.finished {
            return Ok(None);
        }
        let mut filled = 0;
        while filled < self.packed_size {
            match self.reader.read(&mut self.buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Io(e)),
            }
        }
        if filled == 0 {
            self.finished = true;
            return Ok(None);
        }
        if filled < self.packed_size {
            warn!(
                "dropping truncated final frame ({filled} of {} bytes)",
                self.packed_size
            );
            self.finished = true;
            return Ok(None);
        }
        self.frames_read += 1;
        trace!("read frame {} ({} bytes)", self.frames_read, filled);
        Ok(Some(FrameBuffer::new(
            &self.buf,
            self.size,
            self.pixel_format,
        )?))
    }

    /// Number of complete frames read so far.
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn config(width: u32, height: u32) -> StreamConfig {
        StreamConfig {
            pixel_format: PixelFormat::Yuv420Planar,
            size: Size { width, height },
        }
    }

    #[test]
    fn yields_each_complete_frame_in_order() {
        let cfg = config(4, 4);
        let frame_size = 4 * 4 * 3 / 2;
        let mut data = Vec::new();
        for tag in [0x11u8, 0x22, 0x33] {
            data.extend(std::iter::repeat_n(tag, frame_size));
        }
        let mut source = FrameSource::new(Cursor::new(data), &cfg);
        for tag in [0x11u8, 0x22, 0x33] {
            let frame = source.next_frame().unwrap().expect("frame");
            assert!(frame.data().iter().all(|&b| b == tag));
        }
        assert!(source.next_frame().unwrap().is_none());
        assert_eq!(source.frames_read(), 3);
    }

    #[test]
    fn drops_truncated_final_frame() {
        let cfg = config(4, 4);
        let frame_size = 4 * 4 * 3 / 2;
        let data = vec![0xAB; frame_size + 7];
        let mut source = FrameSource::new(Cursor::new(data), &cfg);
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_none());
        assert_eq!(source.frames_read(), 1);
    }

    #[test]
    fn file_shorter_than_one_frame_yields_nothing() {
        let cfg = config(4, 4);
        let mut source = FrameSource::new(Cursor::new(vec![0u8; 5]), &cfg);
        assert!(source.next_frame().unwrap().is_none());
        assert_eq!(source.frames_read(), 0);
    }

    #[test]
    fn empty_file_yields_nothing() {
        let cfg = config(4, 4);
        let mut source = FrameSource::new(Cursor::new(Vec::new()), &cfg);
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn assembles_frames_from_short_reads() {
        struct OneByteAtATime(Cursor<Vec<u8>>);
        impl Read for OneByteAtATime {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                let n = buf.len().min(1);
                self.0.read(&mut buf[..n])
            }
        }
        let cfg = config(2, 2);
        let frame_size = 2 * 2 * 3 / 2;
        let reader = OneByteAtATime(Cursor::new(vec![0x5A; frame_size]));
        let mut source = FrameSource::new(reader, &cfg);
        let frame = source.next_frame().unwrap().expect("frame");
        assert_eq!(frame.data().len(), frame_size);
    }
}
