//! A wrapper type providing direct, cheaply-cloneable access to binary data.
//!
//! See [`ByteView`] for details.

use std::borrow::Cow;
use std::fs::File;
use std::io;
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;

#[derive(Debug)]
enum Backing<'a> {
    Buf(Cow<'a, [u8]>),
    Mmap(Mmap),
}

impl Deref for Backing<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        match self {
            Backing::Buf(buf) => buf,
            Backing::Mmap(mmap) => mmap,
        }
    }
}

/// A cheaply-cloneable view over the bytes of an input file.
///
/// The view can either own a memory-mapped file or a plain buffer. Both
/// backings deref to `&[u8]`, so callers never need to know which one they
/// got. Memory-mapping is preferred for real files since ElfScope only ever
/// reads binaries, never mutates them.
#[derive(Clone, Debug)]
pub struct ByteView<'a> {
    backing: Arc<Backing<'a>>,
}

impl<'a> ByteView<'a> {
    /// Memory-maps the file at `path` for read-only access.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        Self::map_file(file)
    }

    /// Memory-maps an already-open file handle.
    pub fn map_file(file: File) -> io::Result<Self> {
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self {
            backing: Arc::new(Backing::Mmap(mmap)),
        })
    }

    /// Wraps an owned or borrowed buffer without touching the filesystem.
    ///
    /// Used by tests to exercise the pipeline against hand-built byte
    /// fixtures instead of real binaries.
    pub fn from_cow(buf: Cow<'a, [u8]>) -> Self {
        Self {
            backing: Arc::new(Backing::Buf(buf)),
        }
    }

    /// Wraps an owned buffer.
    pub fn from_vec(buf: Vec<u8>) -> Self {
        Self::from_cow(Cow::Owned(buf))
    }

    /// Returns the bytes as a slice.
    pub fn as_slice(&self) -> &[u8] {
        self
    }
}

impl Deref for ByteView<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.backing
    }
}

impl AsRef<[u8]> for ByteView<'_> {
    fn as_ref(&self) -> &[u8] {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn maps_a_real_file() {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b"elfscope").unwrap();
        let view = ByteView::map_file(file).unwrap();
        assert_eq!(view.as_slice(), b"elfscope");
    }

    #[test]
    fn wraps_an_owned_buffer() {
        let view = ByteView::from_vec(vec![1, 2, 3]);
        assert_eq!(&*view, &[1, 2, 3]);
        assert_eq!(view.clone().as_slice(), &[1, 2, 3]);
    }
}
