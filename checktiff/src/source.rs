//! Virtual sources
//!
//! The decoder never touches `std::fs` or a byte slice directly. It works
//! against the [`Source`] capability set (read at cursor, seek, size, close)
//! so that a file on disk and a borrowed in-memory buffer decode identically.

use crate::error::{Result, TiffError};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// Origin of a seek
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    /// Offset is absolute
    Start,
    /// Offset is relative to the cursor
    Current,
    /// Offset is relative to the end of data
    End,
}

/// Seekable, randomly accessed input
pub trait Source {
    /// Copy up to `buf.len()` bytes from the cursor into `buf`.
    ///
    /// Returns the number of bytes copied, which is short at end of data, and
    /// advances the cursor by that amount.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Move the cursor and return its new position.
    ///
    /// A target before the start of data fails with
    /// [`TiffError::NegativeSeek`] and leaves the cursor at 0. Targets past
    /// the end are accepted; reads from there return 0 bytes.
    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64>;

    /// Total length of the data
    fn size(&mut self) -> Result<u64>;

    /// Release held resources
    fn close(&mut self) -> Result<()>;

    /// Read from an absolute offset, filling as much of `buf` as the data allows
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);
        self.seek(offset, Whence::Start)?;

        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }
}

/// Resolve a seek request against a cursor and a length
fn seek_target(cursor: u64, len: u64, offset: i64, whence: Whence) -> Option<u64> {
    let base = match whence {
        Whence::Start => 0i128,
        Whence::Current => cursor as i128,
        Whence::End => len as i128,
    };
    let target = base + offset as i128;
    if target < 0 {
        None
    } else {
        Some(u64::try_from(target).unwrap_or(u64::MAX))
    }
}

/// Source over a borrowed byte buffer
#[derive(Debug, Clone)]
pub struct BufferSource<'a> {
    data: &'a [u8],
    cursor: u64,
}

impl<'a> BufferSource<'a> {
    /// Wrap a buffer; the cursor starts at 0
    pub fn new(data: &'a [u8]) -> Self {
        BufferSource { data, cursor: 0 }
    }

    /// Current cursor position
    pub fn position(&self) -> u64 {
        self.cursor
    }
}

impl Source for BufferSource<'_> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let len = self.data.len() as u64;
        if self.cursor >= len {
            return Ok(0);
        }

        let start = self.cursor as usize;
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        self.cursor += n as u64;
        Ok(n)
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        match seek_target(self.cursor, self.data.len() as u64, offset, whence) {
            Some(target) => {
                self.cursor = target;
                Ok(target)
            }
            None => {
                self.cursor = 0;
                Err(TiffError::NegativeSeek(offset))
            }
        }
    }

    fn size(&mut self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Source over a file on disk, delegating to [`std::fs::File`]
#[derive(Debug)]
pub struct FileSource {
    file: Option<File>,
    len: u64,
}

impl FileSource {
    /// Open a file for reading
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(FileSource { file: Some(file), len })
    }

    fn file(&mut self) -> Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "source is closed").into())
    }
}

impl Source for FileSource {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.file()?.read(buf)?)
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        let len = self.len;
        let file = self.file()?;
        let cursor = file.stream_position()?;
        match seek_target(cursor, len, offset, whence) {
            Some(target) => Ok(file.seek(SeekFrom::Start(target))?),
            None => {
                file.seek(SeekFrom::Start(0))?;
                Err(TiffError::NegativeSeek(offset))
            }
        }
    }

    fn size(&mut self) -> Result<u64> {
        Ok(self.len)
    }

    fn close(&mut self) -> Result<()> {
        self.file = None;
        Ok(())
    }
}

/// File-or-buffer source chosen at call time
#[derive(Debug)]
pub enum VirtualSource<'a> {
    /// File on disk
    File(FileSource),
    /// Borrowed in-memory buffer
    Buffer(BufferSource<'a>),
}

impl<'a> VirtualSource<'a> {
    /// Open a file-backed source
    pub fn open_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        FileSource::open(path).map(VirtualSource::File)
    }

    /// Borrow a buffer-backed source
    pub fn from_buffer(data: &'a [u8]) -> Self {
        VirtualSource::Buffer(BufferSource::new(data))
    }
}

impl Source for VirtualSource<'_> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self {
            VirtualSource::File(s) => s.read(buf),
            VirtualSource::Buffer(s) => s.read(buf),
        }
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        match self {
            VirtualSource::File(s) => s.seek(offset, whence),
            VirtualSource::Buffer(s) => s.seek(offset, whence),
        }
    }

    fn size(&mut self) -> Result<u64> {
        match self {
            VirtualSource::File(s) => s.size(),
            VirtualSource::Buffer(s) => s.size(),
        }
    }

    fn close(&mut self) -> Result<()> {
        match self {
            VirtualSource::File(s) => s.close(),
            VirtualSource::Buffer(s) => s.close(),
        }
    }
}
