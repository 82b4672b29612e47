//! Big-endian primitive reader for the snapshot format.
//!
//! Every read is bounded: string lengths by their `u16` prefix, list counts
//! by `MAX_LIST_LEN`. Running out of input is reported as
//! `DecodeError::Truncated` naming the section being read.
//!
//! A compressed source is wrapped in `SourceReader` so that its own read
//! failures surface as `DecodeError::Source` while anything the decompressor
//! reports stays a decode error.

use std::fmt;
use std::io::{self, Read};

use crate::error::DecodeError;

/// Upper bound for the element count of an in-record list.
pub const MAX_LIST_LEN: usize = 1 << 16;

pub struct SnapshotReader<R: Read> {
    inner: R,
    section: &'static str,
}

impl<R: Read> SnapshotReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            section: "header",
        }
    }

    /// Name the section used in truncation errors.
    pub fn enter(&mut self, section: &'static str) {
        self.section = section;
    }

    fn fill(&mut self, buf: &mut [u8]) -> Result<(), DecodeError> {
        self.inner
            .read_exact(buf)
            .map_err(|e| match source_failure(e) {
                Ok(source) => DecodeError::Source(source),
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => DecodeError::Truncated {
                    context: self.section,
                },
                Err(e) => DecodeError::Io(e),
            })
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut buf = [0u8; N];
        self.fill(&mut buf)?;
        Ok(buf)
    }

    pub fn i32(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_be_bytes(self.array()?))
    }

    pub fn i64(&mut self) -> Result<i64, DecodeError> {
        Ok(i64::from_be_bytes(self.array()?))
    }

    pub fn f32(&mut self) -> Result<f32, DecodeError> {
        Ok(f32::from_be_bytes(self.array()?))
    }

    pub fn f64(&mut self) -> Result<f64, DecodeError> {
        Ok(f64::from_be_bytes(self.array()?))
    }

    pub fn bool(&mut self) -> Result<bool, DecodeError> {
        match self.array::<1>()?[0] {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(DecodeError::InvalidBool(other)),
        }
    }

    pub fn str(&mut self) -> Result<String, DecodeError> {
        let len = u16::from_be_bytes(self.array()?) as usize;
        let mut buf = vec![0u8; len];
        self.fill(&mut buf)?;
        String::from_utf8(buf).map_err(|_| DecodeError::InvalidUtf8)
    }

    /// A list element count, validated against `MAX_LIST_LEN`.
    pub fn list_len(&mut self, what: &'static str) -> Result<usize, DecodeError> {
        let n = self.i32()?;
        let len = usize::try_from(n).map_err(|_| DecodeError::NegativeLength { what, len: n })?;
        if len > MAX_LIST_LEN {
            return Err(DecodeError::LengthOutOfRange {
                what,
                len,
                max: MAX_LIST_LEN,
            });
        }
        Ok(len)
    }

    pub fn opt_f64(&mut self) -> Result<Option<f64>, DecodeError> {
        if self.bool()? {
            Ok(Some(self.f64()?))
        } else {
            Ok(None)
        }
    }

    pub fn opt_str(&mut self) -> Result<Option<String>, DecodeError> {
        if self.bool()? {
            Ok(Some(self.str()?))
        } else {
            Ok(None)
        }
    }

    pub fn str_list(&mut self, what: &'static str) -> Result<Vec<String>, DecodeError> {
        let len = self.list_len(what)?;
        let mut items = Vec::with_capacity(len);
        for _ in 0..len {
            items.push(self.str()?);
        }
        Ok(items)
    }

    pub fn opt_str_list(&mut self, what: &'static str) -> Result<Option<Vec<String>>, DecodeError> {
        if self.bool()? {
            Ok(Some(self.str_list(what)?))
        } else {
            Ok(None)
        }
    }

    pub fn f32_list(&mut self, what: &'static str) -> Result<Vec<f32>, DecodeError> {
        let len = self.list_len(what)?;
        let mut items = Vec::with_capacity(len);
        for _ in 0..len {
            items.push(self.f32()?);
        }
        Ok(items)
    }
}

// ============================================================================
// Source tagging
// ============================================================================

/// Marks an error raised by the underlying source rather than by a layer
/// stacked on top of it.
#[derive(Debug)]
struct SourceFailure(io::Error);

impl fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for SourceFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

/// Passes reads through, tagging every error so it can be recognized after
/// travelling through a decompressor.
pub struct SourceReader<R> {
    inner: R,
}

impl<R> SourceReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl<R: Read> Read for SourceReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner
            .read(buf)
            .map_err(|e| io::Error::new(e.kind(), SourceFailure(e)))
    }
}

/// `Ok` with the original error if `e` was raised by a `SourceReader`,
/// otherwise `Err(e)` unchanged.
fn source_failure(e: io::Error) -> Result<io::Error, io::Error> {
    if !e.get_ref().is_some_and(|inner| inner.is::<SourceFailure>()) {
        return Err(e);
    }
    let kind = e.kind();
    match e.into_inner().map(|inner| inner.downcast::<SourceFailure>()) {
        Some(Ok(failure)) => Ok(failure.0),
        _ => Err(io::Error::from(kind)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_big_endian_primitives() {
        let bytes = [0u8, 0, 0, 7, 1, 0, 2, b'o', b'k'];
        let mut r = SnapshotReader::new(&bytes[..]);
        assert_eq!(r.i32().unwrap(), 7);
        assert!(r.bool().unwrap());
        assert_eq!(r.str().unwrap(), "ok");
    }

    #[test]
    fn truncation_names_the_section() {
        let bytes = [0u8, 0, 5, b'a'];
        let mut r = SnapshotReader::new(&bytes[..]);
        r.enter("person");
        match r.str() {
            Err(DecodeError::Truncated { context }) => assert_eq!(context, "person"),
            other => panic!("expected truncation, got {other:?}"),
        }
    }

    #[test]
    fn rejects_invalid_bool_and_utf8() {
        let mut r = SnapshotReader::new(&[2u8][..]);
        assert!(matches!(r.bool(), Err(DecodeError::InvalidBool(2))));

        let mut r = SnapshotReader::new(&[0u8, 1, 0xff][..]);
        assert!(matches!(r.str(), Err(DecodeError::InvalidUtf8)));
    }

    #[test]
    fn rejects_out_of_range_list_lengths() {
        let negative = (-1i32).to_be_bytes();
        let mut r = SnapshotReader::new(&negative[..]);
        assert!(matches!(
            r.str_list("registrationNumbers"),
            Err(DecodeError::NegativeLength { len: -1, .. })
        ));

        let huge = ((MAX_LIST_LEN + 1) as i32).to_be_bytes();
        let mut r = SnapshotReader::new(&huge[..]);
        assert!(matches!(
            r.f32_list("embedding"),
            Err(DecodeError::LengthOutOfRange { len, .. }) if len == MAX_LIST_LEN + 1
        ));
    }
}
