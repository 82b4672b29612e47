//! Big-endian primitive writer for the snapshot format.
//!
//! Strings: `[u16 length][UTF-8]`. Lists: `[i32 count][elements]`.
//! Optional values: `[bool present][value if present]`.

use std::io::Write;

use crate::error::{EncodeError, Result};

/// Largest string a `u16` length prefix can describe.
pub const MAX_STRING_LEN: usize = u16::MAX as usize;

pub struct SnapshotWriter<W: Write> {
    inner: W,
    include_photos: bool,
}

impl<W: Write> SnapshotWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            include_photos: true,
        }
    }

    /// Write time entry photos as empty strings.
    pub fn strip_photos(mut self, strip: bool) -> Self {
        self.include_photos = !strip;
        self
    }

    pub fn include_photos(&self) -> bool {
        self.include_photos
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    pub fn i32(&mut self, v: i32) -> Result<()> {
        self.inner.write_all(&v.to_be_bytes())?;
        Ok(())
    }

    pub fn i64(&mut self, v: i64) -> Result<()> {
        self.inner.write_all(&v.to_be_bytes())?;
        Ok(())
    }

    pub fn f32(&mut self, v: f32) -> Result<()> {
        self.inner.write_all(&v.to_be_bytes())?;
        Ok(())
    }

    pub fn f64(&mut self, v: f64) -> Result<()> {
        self.inner.write_all(&v.to_be_bytes())?;
        Ok(())
    }

    pub fn bool(&mut self, v: bool) -> Result<()> {
        self.inner.write_all(&[v as u8])?;
        Ok(())
    }

    pub fn str(&mut self, s: &str) -> Result<()> {
        let bytes = s.as_bytes();
        if bytes.len() > MAX_STRING_LEN {
            return Err(EncodeError::StringTooLong { len: bytes.len() }.into());
        }
        self.inner.write_all(&(bytes.len() as u16).to_be_bytes())?;
        self.inner.write_all(bytes)?;
        Ok(())
    }

    /// Element count prefix for a list or a section.
    pub fn count(&mut self, what: &'static str, len: usize) -> Result<()> {
        let n = i32::try_from(len).map_err(|_| EncodeError::TooManyElements { what, len })?;
        self.i32(n)
    }

    pub fn opt_f64(&mut self, v: Option<f64>) -> Result<()> {
        self.bool(v.is_some())?;
        if let Some(v) = v {
            self.f64(v)?;
        }
        Ok(())
    }

    pub fn opt_str(&mut self, v: Option<&str>) -> Result<()> {
        self.bool(v.is_some())?;
        if let Some(v) = v {
            self.str(v)?;
        }
        Ok(())
    }

    pub fn str_list(&mut self, what: &'static str, items: &[String]) -> Result<()> {
        self.count(what, items.len())?;
        for item in items {
            self.str(item)?;
        }
        Ok(())
    }

    pub fn opt_str_list(&mut self, what: &'static str, items: Option<&Vec<String>>) -> Result<()> {
        self.bool(items.is_some())?;
        if let Some(items) = items {
            self.str_list(what, items)?;
        }
        Ok(())
    }

    pub fn f32_list(&mut self, what: &'static str, items: &[f32]) -> Result<()> {
        self.count(what, items.len())?;
        for v in items {
            self.f32(*v)?;
        }
        Ok(())
    }
}
