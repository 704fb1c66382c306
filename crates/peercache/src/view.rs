// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Immutable views over cached values.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::io::{self, Cursor, Write};
use std::ops::{Bound, Range, RangeBounds};
use std::sync::Arc;

use bytes::Bytes;

/// An immutable view over a cached value.
///
/// A view holds either binary data or text, never both. Cloning and slicing are cheap: every
/// view over the same value shares one reference-counted buffer. Anything handed out for the
/// caller to mutate is a copy, so a cached value can never be changed through its view.
///
/// Views compare equal by content, regardless of whether they were built from bytes or text.
///
/// # Examples
///
/// ```
/// use peercache::ByteView;
///
/// let text = ByteView::from("hello world");
/// let bytes = ByteView::from(b"hello world".to_vec());
/// assert_eq!(text, bytes);
///
/// let hello = text.slice(..5);
/// assert_eq!(hello, "hello");
/// assert_eq!(hello.to_vec(), b"hello");
/// ```
#[derive(Clone)]
pub struct ByteView {
    repr: Repr,
}

#[derive(Clone)]
enum Repr {
    Bytes(Bytes),
    Text(Text),
}

/// A window into a shared string. The bounds always fall on char boundaries.
#[derive(Clone)]
struct Text {
    source: Arc<str>,
    range: Range<usize>,
}

impl Text {
    fn as_str(&self) -> &str {
        &self.source[self.range.clone()]
    }
}

impl ByteView {
    /// Creates an empty view.
    #[must_use]
    pub fn new() -> Self {
        Self::from(Bytes::new())
    }

    /// Creates a view holding a private copy of `data`.
    #[must_use]
    pub fn copy_from_slice(data: &[u8]) -> Self {
        Self::from(Bytes::copy_from_slice(data))
    }

    /// Returns the length of the view in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match &self.repr {
            Repr::Bytes(b) => b.len(),
            Repr::Text(t) => t.range.len(),
        }
    }

    /// Returns `true` if the view holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if the view was built from text.
    #[must_use]
    pub fn is_text(&self) -> bool {
        matches!(self.repr, Repr::Text(_))
    }

    /// Borrows the content as bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match &self.repr {
            Repr::Bytes(b) => b,
            Repr::Text(t) => t.as_str().as_bytes(),
        }
    }

    /// Borrows the content as text, if the view was built from text.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match &self.repr {
            Repr::Bytes(_) => None,
            Repr::Text(t) => Some(t.as_str()),
        }
    }

    /// Returns the byte at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.len()`.
    #[must_use]
    pub fn at(&self, index: usize) -> u8 {
        self.as_bytes()[index]
    }

    /// Returns the byte at `index`, or `None` if it is out of bounds.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<u8> {
        self.as_bytes().get(index).copied()
    }

    /// Returns a view of a sub-range without copying.
    ///
    /// # Panics
    ///
    /// Panics if the range is out of bounds, or, for a text view, if either end does not fall on
    /// a char boundary. This mirrors slicing a `[u8]` or a `str`.
    #[must_use]
    #[expect(clippy::panic, reason = "slicing out of bounds is a caller bug, as with slices and strings")]
    pub fn slice(&self, range: impl RangeBounds<usize>) -> Self {
        let range = resolve(range, self.len());
        self.try_slice(range.clone())
            .unwrap_or_else(|| panic!("range {range:?} is not a valid slice of a view of length {}", self.len()))
    }

    /// Returns a view of a sub-range without copying, or `None` if the range is not valid for
    /// this view.
    #[must_use]
    pub fn try_slice(&self, range: impl RangeBounds<usize>) -> Option<Self> {
        let range = resolve(range, self.len());
        if range.start > range.end || range.end > self.len() {
            return None;
        }

        let repr = match &self.repr {
            Repr::Bytes(b) => Repr::Bytes(b.slice(range)),
            Repr::Text(t) => {
                let text = t.as_str();
                if !text.is_char_boundary(range.start) || !text.is_char_boundary(range.end) {
                    return None;
                }
                Repr::Text(Text {
                    source: Arc::clone(&t.source),
                    range: t.range.start + range.start..t.range.start + range.end,
                })
            }
        };
        Some(Self { repr })
    }

    /// Returns a view from `from` to the end without copying.
    ///
    /// # Panics
    ///
    /// Panics under the same conditions as [`ByteView::slice`].
    #[must_use]
    pub fn slice_from(&self, from: usize) -> Self {
        self.slice(from..)
    }

    /// Returns a private copy of the content as bytes.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    /// Copies as much of the view as fits into `dest`, returning the number of bytes copied.
    pub fn copy_to(&self, dest: &mut [u8]) -> usize {
        let src = self.as_bytes();
        let n = src.len().min(dest.len());
        dest[..n].copy_from_slice(&src[..n]);
        n
    }

    /// Reads bytes starting at `offset` into `buf`, returning the number of bytes read.
    ///
    /// Returns `Ok(0)` once `offset` is at or past the end of the view.
    ///
    /// # Errors
    ///
    /// Returns [`io::ErrorKind::InvalidInput`] if `offset` does not fit in memory.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let offset = usize::try_from(offset).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let bytes = self.as_bytes();
        if offset >= bytes.len() {
            return Ok(0);
        }
        let tail = &bytes[offset..];
        let n = tail.len().min(buf.len());
        buf[..n].copy_from_slice(&tail[..n]);
        Ok(n)
    }

    /// Writes the whole view to `writer`, returning the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns any error reported by `writer`.
    pub fn write_to(&self, writer: &mut impl Write) -> io::Result<u64> {
        writer.write_all(self.as_bytes())?;
        Ok(self.len() as u64)
    }

    /// Returns a seekable reader over the view. The reader shares the view's buffer.
    #[must_use]
    pub fn reader(&self) -> Cursor<Self> {
        Cursor::new(self.clone())
    }
}

fn resolve(range: impl RangeBounds<usize>, len: usize) -> Range<usize> {
    let start = match range.start_bound() {
        Bound::Included(&s) => s,
        Bound::Excluded(&s) => s.saturating_add(1),
        Bound::Unbounded => 0,
    };
    let end = match range.end_bound() {
        Bound::Included(&e) => e.saturating_add(1),
        Bound::Excluded(&e) => e,
        Bound::Unbounded => len,
    };
    start..end
}

impl Default for ByteView {
    fn default() -> Self {
        Self::new()
    }
}

impl AsRef<[u8]> for ByteView {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl From<Bytes> for ByteView {
    fn from(value: Bytes) -> Self {
        Self { repr: Repr::Bytes(value) }
    }
}

impl From<Vec<u8>> for ByteView {
    fn from(value: Vec<u8>) -> Self {
        Self::from(Bytes::from(value))
    }
}

impl From<&[u8]> for ByteView {
    fn from(value: &[u8]) -> Self {
        Self::copy_from_slice(value)
    }
}

impl From<Arc<str>> for ByteView {
    fn from(value: Arc<str>) -> Self {
        let range = 0..value.len();
        Self {
            repr: Repr::Text(Text { source: value, range }),
        }
    }
}

impl From<String> for ByteView {
    fn from(value: String) -> Self {
        Self::from(Arc::<str>::from(value))
    }
}

impl From<&str> for ByteView {
    fn from(value: &str) -> Self {
        Self::from(Arc::<str>::from(value))
    }
}

impl PartialEq for ByteView {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for ByteView {}

impl PartialEq<[u8]> for ByteView {
    fn eq(&self, other: &[u8]) -> bool {
        self.as_bytes() == other
    }
}

impl PartialEq<&[u8]> for ByteView {
    fn eq(&self, other: &&[u8]) -> bool {
        self.as_bytes() == *other
    }
}

impl PartialEq<Vec<u8>> for ByteView {
    fn eq(&self, other: &Vec<u8>) -> bool {
        self.as_bytes() == other.as_slice()
    }
}

impl PartialEq<str> for ByteView {
    fn eq(&self, other: &str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl PartialEq<&str> for ByteView {
    fn eq(&self, other: &&str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Hash for ByteView {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_bytes().hash(state);
    }
}

/// Text views print as text; binary views print lossily as UTF-8.
impl fmt::Display for ByteView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            Repr::Text(t) => f.write_str(t.as_str()),
            Repr::Bytes(b) => f.write_str(&String::from_utf8_lossy(b)),
        }
    }
}

impl fmt::Debug for ByteView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            Repr::Text(t) => f.debug_tuple("ByteView::Text").field(&t.as_str()).finish(),
            Repr::Bytes(b) => f.debug_tuple("ByteView::Bytes").field(b).finish(),
        }
    }
}
