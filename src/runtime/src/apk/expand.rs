//! Package stream decomposition.
//!
//! An APK is a concatenation of independently compressed gzip members:
//! signature, control, and finally the data member holding the file
//! tree. Repository indexes use the same framing (signature + index).
//! The members are found by decoding each one in turn and measuring how
//! much of the input it consumed.

use std::io::Read;

use apk2oci_core::error::{ChartError, Result};
use flate2::bufread::GzDecoder;
use tokio::io::{AsyncRead, AsyncReadExt};

/// One compressed member of a package stream.
#[derive(Debug, Clone)]
pub struct Segment {
    compressed: Vec<u8>,
}

impl Segment {
    /// Stored (compressed) bytes of the member.
    pub fn compressed(&self) -> &[u8] {
        &self.compressed
    }

    /// Names of the tar entries in the member.
    ///
    /// Signature and control members are tar fragments without the
    /// end-of-archive marker; the tar reader stops cleanly at EOF.
    pub fn entry_names(&self) -> Result<Vec<String>> {
        let mut archive = tar::Archive::new(GzDecoder::new(self.compressed.as_slice()));
        let entries = archive
            .entries()
            .map_err(|e| ChartError::Decomposition(format!("reading segment: {}", e)))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry =
                entry.map_err(|e| ChartError::Decomposition(format!("reading segment: {}", e)))?;
            let path = entry
                .path()
                .map_err(|e| ChartError::Decomposition(format!("reading segment: {}", e)))?;
            names.push(path.to_string_lossy().into_owned());
        }
        Ok(names)
    }

    /// Read one named tar entry of the member.
    pub fn read_entry(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let mut archive = tar::Archive::new(GzDecoder::new(self.compressed.as_slice()));
        let entries = archive
            .entries()
            .map_err(|e| ChartError::Decomposition(format!("reading segment: {}", e)))?;
        for entry in entries {
            let mut entry =
                entry.map_err(|e| ChartError::Decomposition(format!("reading segment: {}", e)))?;
            let matches = entry
                .path()
                .map(|p| p.to_string_lossy() == name)
                .unwrap_or(false);
            if matches {
                let mut content = Vec::new();
                entry
                    .read_to_end(&mut content)
                    .map_err(|e| ChartError::Decomposition(format!("reading {}: {}", name, e)))?;
                return Ok(Some(content));
            }
        }
        Ok(None)
    }
}

/// A package stream split into its members.
#[derive(Debug, Clone)]
pub struct PackageSegments {
    segments: Vec<Segment>,
}

impl PackageSegments {
    /// Split a fully buffered package stream.
    pub fn split(data: &[u8]) -> Result<Self> {
        let mut segments = Vec::new();
        let mut rest = data;

        while !rest.is_empty() {
            let mut decoder = GzDecoder::new(rest);
            std::io::copy(&mut decoder, &mut std::io::sink()).map_err(|e| {
                ChartError::Decomposition(format!("segment {}: {}", segments.len(), e))
            })?;
            let remaining = decoder.into_inner();
            let consumed = rest.len() - remaining.len();
            if consumed == 0 {
                return Err(ChartError::Decomposition(format!(
                    "segment {} consumed no input",
                    segments.len()
                )));
            }

            tracing::debug!(segment = segments.len(), size = consumed, "Split package segment");
            segments.push(Segment {
                compressed: rest[..consumed].to_vec(),
            });
            rest = remaining;
        }

        if segments.is_empty() {
            return Err(ChartError::Decomposition("empty package stream".to_string()));
        }

        Ok(Self { segments })
    }

    /// Buffer a stream fully, then split it.
    pub async fn read_from<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Self> {
        let mut buf = Vec::new();
        reader
            .read_to_end(&mut buf)
            .await
            .map_err(|e| ChartError::Decomposition(format!("buffering stream: {}", e)))?;
        Self::split(&buf)
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// The data member (always the last one).
    pub fn data(&self) -> &Segment {
        // split() guarantees at least one segment
        &self.segments[self.segments.len() - 1]
    }

    /// Signature/control members preceding the data member.
    pub fn leading(&self) -> &[Segment] {
        &self.segments[..self.segments.len() - 1]
    }
}
