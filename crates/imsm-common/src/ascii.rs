//! Fixed-width, NUL-padded ASCII strings used for on-disk text fields
//! (disk serial numbers, volume names, the signature's version suffix).
//!
//! Unlike the space-padded short names found in FAT-style formats, IMSM's
//! text fields are NUL-padded and may contain embedded/trailing whitespace
//! that callers are expected to trim themselves (mirroring the
//! `imsm_read_serial` canonicalisation, which strips trailing blanks from a
//! raw SCSI INQUIRY response before storing it).

use core::fmt;
use core::str;

/// A fixed-size, NUL-padded byte array that is conventionally ASCII text.
///
/// `N` is the on-disk field width including any padding. Construction never
/// fails on non-UTF8 input; instead the bytes are copied verbatim and
/// [`AsciiArray::as_str`] falls back to `None` if they don't happen to be
/// valid UTF-8 (corrupt metadata shouldn't panic a loader).
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct AsciiArray<const N: usize> {
    raw: [u8; N],
}

impl<const N: usize> Default for AsciiArray<N> {
    fn default() -> Self {
        Self { raw: [0u8; N] }
    }
}

impl<const N: usize> fmt::Debug for AsciiArray<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AsciiArray")
            .field(&self.as_str().unwrap_or("<non-utf8>"))
            .finish()
    }
}

impl<const N: usize> fmt::Display for AsciiArray<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str().unwrap_or("<non-utf8>"))
    }
}

impl<const N: usize> AsciiArray<N> {
    pub const LEN: usize = N;

    /// Builds a NUL-padded field from a string, truncating if it doesn't fit.
    pub fn new_truncate(s: &str) -> Self {
        let bytes = s.as_bytes();
        let copy_len = bytes.len().min(N);
        Self::from_slice_unchecked(&bytes[..copy_len])
    }

    /// Builds a field from a string, failing if it is wider than `N` bytes.
    pub fn try_new(s: &str) -> Result<Self, AsciiTooLong> {
        if s.len() > N {
            return Err(AsciiTooLong { max: N, got: s.len() });
        }
        Ok(Self::from_slice_unchecked(s.as_bytes()))
    }

    pub fn from_bytes(raw: [u8; N]) -> Self {
        Self { raw }
    }

    pub fn from_slice_unchecked(slice: &[u8]) -> Self {
        let mut array = Self::default();
        array.raw[..slice.len()].copy_from_slice(slice);
        array
    }

    pub fn as_bytes(&self) -> &[u8; N] {
        &self.raw
    }

    /// Length up to the first NUL byte, or `N` if there isn't one.
    pub fn len(&self) -> usize {
        self.raw.iter().position(|b| *b == 0).unwrap_or(N)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Interprets the field as UTF-8 up to the first NUL, trimming trailing
    /// ASCII whitespace the way `imsm_read_serial` trims a raw INQUIRY
    /// response before storing it. Returns `None` if the bytes aren't valid
    /// UTF-8 (the raw bytes are still available via [`AsciiArray::as_bytes`]).
    pub fn as_str(&self) -> Option<&str> {
        str::from_utf8(&self.raw[..self.len()])
            .ok()
            .map(|s| s.trim_end())
    }
}

#[cfg(feature = "bytemuck")]
unsafe impl<const N: usize> bytemuck::Zeroable for AsciiArray<N> {}
#[cfg(feature = "bytemuck")]
unsafe impl<const N: usize> bytemuck::Pod for AsciiArray<N> {}

/// Returned by [`AsciiArray::try_new`] when the input doesn't fit the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AsciiTooLong {
    pub max: usize,
    pub got: usize,
}

impl fmt::Display for AsciiTooLong {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "string of {} bytes does not fit a {}-byte field", self.got, self.max)
    }
}
