//! Save-state container.
//!
//! A stream is a small header followed by named module chunks:
//!
//! ```text
//! "BBSS" version:u8
//! name_len:u8 name payload_len:u32le payload
//! ...
//! ```
//!
//! Each component serializes itself into a flat payload through [`Snapshot`].
//! Payloads are read completely before `load` runs, and `load` validates the
//! whole payload before touching any state, so a failed restore never leaves
//! a component half-written.

use std::io::{self, Read, Write};

use thiserror::Error;

const MAGIC: &[u8; 4] = b"BBSS";
const VERSION: u8 = 1;
const MAX_PAYLOAD: usize = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("not a snapshot stream")]
    BadMagic,
    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u8),
    #[error("expected module `{expected}`, found `{found}`")]
    ModuleMismatch { expected: String, found: String },
    #[error("snapshot data truncated")]
    Truncated,
    #[error("invalid {0} in snapshot")]
    Invalid(&'static str),
}

/// A component that can be saved into and restored from a module payload.
pub trait Snapshot {
    fn save(&self, out: &mut Vec<u8>);

    /// Restore from `data`. On error the component is left unchanged.
    fn load(&mut self, data: &[u8]) -> Result<(), SnapshotError>;
}

pub struct SnapshotWriter<W: Write> {
    inner: W,
}

impl<W: Write> SnapshotWriter<W> {
    pub fn new(mut inner: W) -> Result<Self, SnapshotError> {
        inner.write_all(MAGIC)?;
        inner.write_all(&[VERSION])?;
        Ok(Self { inner })
    }

    pub fn module(&mut self, name: &str, component: &impl Snapshot) -> Result<(), SnapshotError> {
        let mut payload = Vec::new();
        component.save(&mut payload);
        self.raw_module(name, &payload)
    }

    pub fn raw_module(&mut self, name: &str, payload: &[u8]) -> Result<(), SnapshotError> {
        let name_len = u8::try_from(name.len()).map_err(|_| SnapshotError::Invalid("module name"))?;
        let payload_len =
            u32::try_from(payload.len()).map_err(|_| SnapshotError::Invalid("module length"))?;
        self.inner.write_all(&[name_len])?;
        self.inner.write_all(name.as_bytes())?;
        self.inner.write_all(&payload_len.to_le_bytes())?;
        self.inner.write_all(payload)?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<W, SnapshotError> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

pub struct SnapshotReader<R: Read> {
    inner: R,
}

impl<R: Read> SnapshotReader<R> {
    pub fn new(mut inner: R) -> Result<Self, SnapshotError> {
        let mut header = [0u8; 5];
        read_exact(&mut inner, &mut header)?;
        if &header[..4] != MAGIC {
            return Err(SnapshotError::BadMagic);
        }
        if header[4] != VERSION {
            return Err(SnapshotError::UnsupportedVersion(header[4]));
        }
        Ok(Self { inner })
    }

    /// Read the next chunk, which must be named `name`, and return its payload.
    pub fn raw_module(&mut self, name: &str) -> Result<Vec<u8>, SnapshotError> {
        let mut len = [0u8; 1];
        read_exact(&mut self.inner, &mut len)?;
        let mut found = vec![0u8; len[0] as usize];
        read_exact(&mut self.inner, &mut found)?;
        let found = String::from_utf8_lossy(&found).into_owned();
        if found != name {
            return Err(SnapshotError::ModuleMismatch {
                expected: name.to_string(),
                found,
            });
        }

        let mut payload_len = [0u8; 4];
        read_exact(&mut self.inner, &mut payload_len)?;
        let payload_len = u32::from_le_bytes(payload_len) as usize;
        if payload_len > MAX_PAYLOAD {
            return Err(SnapshotError::Invalid("module length"));
        }
        let mut payload = vec![0u8; payload_len];
        read_exact(&mut self.inner, &mut payload)?;
        Ok(payload)
    }

    pub fn module(
        &mut self,
        name: &str,
        component: &mut impl Snapshot,
    ) -> Result<(), SnapshotError> {
        let payload = self.raw_module(name)?;
        component.load(&payload)
    }
}

fn read_exact(r: &mut impl Read, buf: &mut [u8]) -> Result<(), SnapshotError> {
    r.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => SnapshotError::Truncated,
        _ => SnapshotError::Io(e),
    })
}

/// Cursor over a module payload.
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8], SnapshotError> {
        let end = self.pos.checked_add(n).ok_or(SnapshotError::Truncated)?;
        let out = self.data.get(self.pos..end).ok_or(SnapshotError::Truncated)?;
        self.pos = end;
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, SnapshotError> {
        Ok(self.bytes(1)?[0])
    }

    pub fn bool(&mut self) -> Result<bool, SnapshotError> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(SnapshotError::Invalid("flag")),
        }
    }

    pub fn u16_le(&mut self) -> Result<u16, SnapshotError> {
        let b = self.bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn u32_le(&mut self) -> Result<u32, SnapshotError> {
        let b = self.bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a length-prefixed block that must be exactly `expected` bytes.
    pub fn sized(
        &mut self,
        expected: usize,
        what: &'static str,
    ) -> Result<&'a [u8], SnapshotError> {
        let len = self.u32_le()? as usize;
        if len != expected {
            return Err(SnapshotError::Invalid(what));
        }
        self.bytes(len)
    }

    /// Fail if anything is left over.
    pub fn finish(&self) -> Result<(), SnapshotError> {
        if self.pos == self.data.len() {
            Ok(())
        } else {
            Err(SnapshotError::Invalid("trailing data"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Pair(u8, u16);

    impl Snapshot for Pair {
        fn save(&self, out: &mut Vec<u8>) {
            out.push(self.0);
            out.extend_from_slice(&self.1.to_le_bytes());
        }

        fn load(&mut self, data: &[u8]) -> Result<(), SnapshotError> {
            let mut r = ByteReader::new(data);
            let a = r.u8()?;
            let b = r.u16_le()?;
            r.finish()?;
            self.0 = a;
            self.1 = b;
            Ok(())
        }
    }

    #[test]
    fn module_chunks_round_trip() {
        let mut w = SnapshotWriter::new(Vec::new()).unwrap();
        w.module("pair", &Pair(7, 0x1234)).unwrap();
        let bytes = w.finish().unwrap();
        assert_eq!(&bytes[..4], MAGIC);

        let mut r = SnapshotReader::new(bytes.as_slice()).unwrap();
        let mut p = Pair(0, 0);
        r.module("pair", &mut p).unwrap();
        assert_eq!((p.0, p.1), (7, 0x1234));
    }

    #[test]
    fn wrong_module_name_is_rejected() {
        let mut w = SnapshotWriter::new(Vec::new()).unwrap();
        w.module("pair", &Pair(1, 2)).unwrap();
        let bytes = w.finish().unwrap();

        let mut r = SnapshotReader::new(bytes.as_slice()).unwrap();
        let mut p = Pair(0, 0);
        let err = r.module("other", &mut p).unwrap_err();
        assert!(matches!(err, SnapshotError::ModuleMismatch { .. }));
        assert_eq!((p.0, p.1), (0, 0));
    }

    #[test]
    fn truncated_stream_reports_truncation() {
        let mut w = SnapshotWriter::new(Vec::new()).unwrap();
        w.module("pair", &Pair(1, 2)).unwrap();
        let mut bytes = w.finish().unwrap();
        bytes.pop();

        let mut r = SnapshotReader::new(bytes.as_slice()).unwrap();
        let mut p = Pair(9, 9);
        assert!(matches!(r.module("pair", &mut p), Err(SnapshotError::Truncated)));
        assert_eq!((p.0, p.1), (9, 9));
    }

    #[test]
    fn bad_header_is_rejected() {
        assert!(matches!(
            SnapshotReader::new(&b"NOPE\x01"[..]),
            Err(SnapshotError::BadMagic)
        ));
        assert!(matches!(
            SnapshotReader::new(&b"BBSS\x09"[..]),
            Err(SnapshotError::UnsupportedVersion(9))
        ));
    }
}
