//! On-disk pitch curve cache
//!
//! Curves are stored beside the source audio as
//! `<source stem>_<method>_<filter radius>_<hop>_<shift>.f0`. The key is
//! derived from the file name and parameters, not the file contents: a
//! different recording saved under the same name reuses the stale curve.
//!
//! File layout (little endian): magic `RPF0`, `u64` value count, then the
//! `f32` values. Unreadable or malformed files are recomputed and
//! overwritten.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::models::PitchMethod;

const MAGIC: &[u8; 4] = b"RPF0";
const EXTENSION: &str = "f0";

/// Per-frame fundamental frequency in Hz (0 = unvoiced)
#[derive(Debug, Clone, PartialEq)]
pub struct PitchCurve {
    values: Vec<f32>,
}

impl PitchCurve {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn into_values(self) -> Vec<f32> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Parameters that, with the source name, identify a cached curve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PitchCacheKey {
    pub method: PitchMethod,
    pub filter_radius: u32,
    pub hop_length: u32,
    pub pitch_shift: i32,
}

impl PitchCacheKey {
    /// Cache file path for `source`
    pub fn path_for(&self, source: &Path) -> PathBuf {
        let stem = source
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("audio");
        let name = format!(
            "{}_{}_{}_{}_{}.{}",
            stem, self.method, self.filter_radius, self.hop_length, self.pitch_shift, EXTENSION
        );
        match source.parent() {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        }
    }
}

/// Pitch curve cache with hit/miss counters
#[derive(Debug, Default)]
pub struct AudioFrameCache {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl AudioFrameCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached curve for `(source, key)` or compute and store it
    ///
    /// A corrupt cache file is logged and replaced. Failing to write the
    /// cache is logged; the computed curve is still returned.
    pub fn get_or_compute<F, E>(
        &self,
        source: &Path,
        key: &PitchCacheKey,
        compute: F,
    ) -> Result<PitchCurve, E>
    where
        F: FnOnce() -> Result<PitchCurve, E>,
    {
        let path = key.path_for(source);
        if path.exists() {
            match read_curve(&path) {
                Ok(curve) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    tracing::info!(path = %path.display(), frames = curve.len(), "Pitch cache hit");
                    return Ok(curve);
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to load pitch cache, recomputing"
                    );
                }
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let curve = compute()?;
        if let Err(e) = write_curve(&path, &curve) {
            tracing::warn!(path = %path.display(), error = %e, "Failed to write pitch cache");
        } else {
            tracing::debug!(path = %path.display(), frames = curve.len(), "Pitch cache stored");
        }
        Ok(curve)
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

/// Read a curve file, validating magic and length
pub fn read_curve(path: &Path) -> io::Result<PitchCurve> {
    let mut bytes = Vec::new();
    std::fs::File::open(path)?.read_to_end(&mut bytes)?;

    let invalid = |msg: &str| io::Error::new(io::ErrorKind::InvalidData, msg.to_string());
    if bytes.len() < 12 || &bytes[..4] != MAGIC {
        return Err(invalid("not a pitch cache file"));
    }
    let mut count_bytes = [0u8; 8];
    count_bytes.copy_from_slice(&bytes[4..12]);
    let count = u64::from_le_bytes(count_bytes) as usize;
    let body = &bytes[12..];
    if count.checked_mul(4) != Some(body.len()) {
        return Err(invalid("pitch cache length mismatch"));
    }

    let values = body
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    Ok(PitchCurve::new(values))
}

/// Write a curve file atomically (temp file + rename)
pub fn write_curve(path: &Path, curve: &PitchCurve) -> io::Result<()> {
    let mut bytes = Vec::with_capacity(12 + curve.len() * 4);
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&(curve.len() as u64).to_le_bytes());
    for value in curve.values() {
        bytes.extend_from_slice(&value.to_le_bytes());
    }

    let tmp = path.with_extension(format!("{}.tmp", EXTENSION));
    {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)
}
