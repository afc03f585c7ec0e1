//! Payload decoders used by the bundled sources
//!
//! A decoder is an opaque `bytes -> bytes` function run on the decode pool.
//! It also says how a remote file name maps to the artifact name, e.g.
//! `dscovr_m1m_20210101.nc.gz` becomes `dscovr_m1m_20210101.nc`.

use std::io::{Cursor, Read};

use flate2::read::GzDecoder;

use crate::error::{Error, Result};

/// Turns a raw payload into artifact bytes
pub trait Decoder: Send + Sync {
    /// Decode one payload (runs on a blocking worker)
    fn decode(&self, raw: Vec<u8>) -> Result<Vec<u8>>;

    /// Artifact file name for a remote file name
    fn artifact_name<'a>(&self, remote_name: &'a str) -> &'a str {
        remote_name
    }
}

/// Stores the payload unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl Decoder for PassThrough {
    fn decode(&self, raw: Vec<u8>) -> Result<Vec<u8>> {
        Ok(raw)
    }
}

/// Inflates a gzip payload
#[derive(Debug, Clone, Copy, Default)]
pub struct Gzip;

impl Decoder for Gzip {
    fn decode(&self, raw: Vec<u8>) -> Result<Vec<u8>> {
        let mut decoder = GzDecoder::new(raw.as_slice());
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| Error::Decode(format!("gzip: {e}")))?;
        Ok(out)
    }

    fn artifact_name<'a>(&self, remote_name: &'a str) -> &'a str {
        remote_name.strip_suffix(".gz").unwrap_or(remote_name)
    }
}

/// Extracts one member of a zip payload
#[derive(Debug, Clone, Default)]
pub struct ZipMember {
    name: Option<String>,
}

impl ZipMember {
    /// Extract the first member
    pub fn first() -> Self {
        Self { name: None }
    }

    /// Extract the member called `name`
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
        }
    }
}

impl Decoder for ZipMember {
    fn decode(&self, raw: Vec<u8>) -> Result<Vec<u8>> {
        let mut archive = zip::ZipArchive::new(Cursor::new(raw))
            .map_err(|e| Error::Decode(format!("failed to read ZIP archive: {e}")))?;

        let mut member = match &self.name {
            Some(name) => archive
                .by_name(name)
                .map_err(|e| Error::Decode(format!("ZIP member {name}: {e}")))?,
            None => archive
                .by_index(0)
                .map_err(|e| Error::Decode(format!("empty ZIP archive: {e}")))?,
        };

        let mut out = Vec::with_capacity(usize::try_from(member.size()).unwrap_or(0));
        member
            .read_to_end(&mut out)
            .map_err(|e| Error::Decode(format!("ZIP member {}: {e}", member.name())))?;
        Ok(out)
    }

    fn artifact_name<'a>(&self, remote_name: &'a str) -> &'a str {
        remote_name.strip_suffix(".zip").unwrap_or(remote_name)
    }
}
