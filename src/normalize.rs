//! Image Normalizer - lossless removal of color-management chunks
//!
//! Only PNG carries chunks (gamma, chromaticities, ICC profile, sRGB intent)
//! that let a decoder alter reported pixel values. Everything else passes
//! through untouched. Chunks are copied byte-for-byte, so IDAT is never
//! recompressed.

use byteorder::{BigEndian, ByteOrder};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use thiserror::Error;

pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

/// Chunks dropped during normalization.
pub const COLOR_METADATA_CHUNKS: [[u8; 4]; 4] = [*b"gAMA", *b"cHRM", *b"iCCP", *b"sRGB"];

const IEND: [u8; 4] = *b"IEND";
const MAX_CHUNK_LEN: usize = (1 << 31) - 1;

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("Chunk stream truncated at offset {offset}")]
    Truncated { offset: usize },

    #[error("Chunk at offset {offset} declares length {len}, above the PNG limit")]
    ChunkTooLarge { offset: usize, len: usize },

    #[error("{chunk} chunk at offset {offset} fails its CRC check")]
    BadCrc { chunk: String, offset: usize },

    #[error("PNG stream has no IEND chunk")]
    MissingEnd,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Gif,
    Bmp,
    Unknown,
}

impl ImageFormat {
    /// Detect the container from its magic bytes.
    pub fn sniff(bytes: &[u8]) -> Self {
        if bytes.starts_with(&PNG_SIGNATURE) {
            ImageFormat::Png
        } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            ImageFormat::Gif
        } else if bytes.starts_with(b"BM") {
            ImageFormat::Bmp
        } else {
            ImageFormat::Unknown
        }
    }

    pub fn carries_color_metadata(self) -> bool {
        matches!(self, ImageFormat::Png)
    }
}

/// What normalization did to one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum NormalizeOutcome {
    /// Format has no color-management metadata.
    Passthrough,
    /// Nothing to strip; bytes are already canonical.
    Unchanged,
    Stripped { chunks: Vec<String> },
    /// Normalization was turned off for this run.
    Skipped,
}

impl NormalizeOutcome {
    pub fn modified(&self) -> bool {
        matches!(self, NormalizeOutcome::Stripped { .. })
    }
}

#[derive(Debug, Clone)]
pub struct Normalized {
    pub bytes: Vec<u8>,
    pub outcome: NormalizeOutcome,
}

/// Remove color-management chunks from a PNG byte stream.
///
/// Returns the rewritten stream and the names of the removed chunks, in
/// stream order. Bytes after IEND are kept. A chunk is only dropped if its
/// CRC matches; kept chunks are left for the decoder to check.
pub fn strip_color_metadata(bytes: &[u8]) -> Result<(Vec<u8>, Vec<String>), NormalizeError> {
    let mut out = Vec::with_capacity(bytes.len());
    out.extend_from_slice(&PNG_SIGNATURE);
    let mut removed = vec![];
    let mut pos = PNG_SIGNATURE.len();

    loop {
        if bytes.len() < pos + 8 {
            return if pos == bytes.len() {
                Err(NormalizeError::MissingEnd)
            } else {
                Err(NormalizeError::Truncated { offset: pos })
            };
        }
        let len = BigEndian::read_u32(&bytes[pos..pos + 4]) as usize;
        if len > MAX_CHUNK_LEN {
            return Err(NormalizeError::ChunkTooLarge { offset: pos, len });
        }
        // length + type + data + crc
        let end = pos + 12 + len;
        if bytes.len() < end {
            return Err(NormalizeError::Truncated { offset: pos });
        }
        let mut kind = [0u8; 4];
        kind.copy_from_slice(&bytes[pos + 4..pos + 8]);

        if COLOR_METADATA_CHUNKS.contains(&kind) {
            let stored = BigEndian::read_u32(&bytes[end - 4..end]);
            if crc32_ieee(&bytes[pos + 4..end - 4]) != stored {
                return Err(NormalizeError::BadCrc {
                    chunk: String::from_utf8_lossy(&kind).into_owned(),
                    offset: pos,
                });
            }
            removed.push(String::from_utf8_lossy(&kind).into_owned());
        } else {
            out.extend_from_slice(&bytes[pos..end]);
        }
        pos = end;

        if kind == IEND {
            out.extend_from_slice(&bytes[pos..]);
            return Ok((out, removed));
        }
    }
}

/// IEEE 802.3 CRC-32, as used by PNG over chunk type and data.
pub(crate) fn crc32_ieee(data: &[u8]) -> u32 {
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xEDB8_8320;
            } else {
                crc >>= 1;
            }
        }
    }
    !crc
}

/// Normalize an in-memory image without touching any file.
pub fn normalize_bytes(bytes: Vec<u8>) -> Result<Normalized, NormalizeError> {
    if !ImageFormat::sniff(&bytes).carries_color_metadata() {
        return Ok(Normalized {
            bytes,
            outcome: NormalizeOutcome::Passthrough,
        });
    }
    let (stripped, removed) = strip_color_metadata(&bytes)?;
    if removed.is_empty() {
        return Ok(Normalized {
            bytes,
            outcome: NormalizeOutcome::Unchanged,
        });
    }
    Ok(Normalized {
        bytes: stripped,
        outcome: NormalizeOutcome::Stripped { chunks: removed },
    })
}

/// Normalize the file at `path` in place.
///
/// The file is only rewritten when a chunk was removed, and then atomically;
/// on any error the original is left as it was.
pub fn normalize(path: &Path) -> Result<Normalized, NormalizeError> {
    normalize_loaded(path, fs::read(path)?)
}

/// In-place normalization of `bytes` already read from `path`.
pub fn normalize_loaded(path: &Path, bytes: Vec<u8>) -> Result<Normalized, NormalizeError> {
    let normalized = normalize_bytes(bytes)?;
    if let NormalizeOutcome::Stripped { chunks } = &normalized.outcome {
        write_atomically(path, |out| out.write_all(&normalized.bytes))?;
        log::info!("{}: stripped {}", path.display(), chunks.join(", "));
    }
    Ok(normalized)
}

/// Replace `path` with whatever `write` produces, or leave it untouched.
///
/// Output goes to a temporary file in the same directory which is synced and
/// renamed over `path` only after `write` succeeds. The temporary is removed
/// on every error path.
pub fn write_atomically<F>(path: &Path, write: F) -> io::Result<()>
where
    F: FnOnce(&mut dyn Write) -> io::Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    write(tmp.as_file_mut())?;
    tmp.as_file().sync_all()?;
    if let Ok(meta) = fs::metadata(path) {
        fs::set_permissions(tmp.path(), meta.permissions())?;
    }
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(kind: &[u8; 4], data: &[u8]) -> Vec<u8> {
        let mut out = (data.len() as u32).to_be_bytes().to_vec();
        out.extend_from_slice(kind);
        out.extend_from_slice(data);
        out.extend_from_slice(&crc32_ieee(&out[4..]).to_be_bytes());
        out
    }

    fn synthetic_png(chunks: &[Vec<u8>]) -> Vec<u8> {
        let mut out = PNG_SIGNATURE.to_vec();
        for c in chunks {
            out.extend_from_slice(c);
        }
        out
    }

    #[test]
    fn test_sniff() {
        assert_eq!(ImageFormat::sniff(&PNG_SIGNATURE), ImageFormat::Png);
        assert_eq!(ImageFormat::sniff(b"GIF89a...."), ImageFormat::Gif);
        assert_eq!(ImageFormat::sniff(b"GIF87a"), ImageFormat::Gif);
        assert_eq!(ImageFormat::sniff(b"BM\0\0"), ImageFormat::Bmp);
        assert_eq!(ImageFormat::sniff(b"\xff\xd8\xff"), ImageFormat::Unknown);
    }

    #[test]
    fn test_strip_removes_only_color_chunks() {
        let ihdr = chunk(b"IHDR", &[0; 13]);
        let idat = chunk(b"IDAT", &[1, 2, 3, 4]);
        let text = chunk(b"tEXt", b"Comment\0hi");
        let png = synthetic_png(&[
            ihdr.clone(),
            chunk(b"gAMA", &[0, 0, 0xb1, 0x8f]),
            chunk(b"sRGB", &[0]),
            text.clone(),
            chunk(b"iCCP", b"icc\0\0zz"),
            idat.clone(),
            chunk(b"cHRM", &[0; 32]),
            chunk(b"IEND", &[]),
        ]);

        let (out, removed) = strip_color_metadata(&png).unwrap();
        assert_eq!(removed, vec!["gAMA", "sRGB", "iCCP", "cHRM"]);
        assert_eq!(
            out,
            synthetic_png(&[ihdr, text, idat, chunk(b"IEND", &[])])
        );
    }

    #[test]
    fn test_strip_is_idempotent() {
        let png = synthetic_png(&[
            chunk(b"IHDR", &[0; 13]),
            chunk(b"gAMA", &[0, 0, 0xb1, 0x8f]),
            chunk(b"IDAT", &[9]),
            chunk(b"IEND", &[]),
        ]);
        let (once, _) = strip_color_metadata(&png).unwrap();
        let (twice, removed) = strip_color_metadata(&once).unwrap();
        assert!(removed.is_empty());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_crc_known_vector() {
        assert_eq!(crc32_ieee(b"123456789"), 0xCBF4_3926);
        assert_eq!(crc32_ieee(b"IEND"), 0xAE42_6082);
    }

    #[test]
    fn test_color_chunk_with_bad_crc_rejected() {
        let mut gama = chunk(b"gAMA", &[0, 0, 0xb1, 0x8f]);
        let last = gama.len() - 1;
        gama[last] ^= 0xff;
        let png = synthetic_png(&[chunk(b"IHDR", &[0; 13]), gama, chunk(b"IEND", &[])]);
        match strip_color_metadata(&png) {
            Err(NormalizeError::BadCrc { chunk, offset }) => {
                assert_eq!(chunk, "gAMA");
                assert_eq!(offset, 33);
            }
            other => panic!("expected a CRC error, got {:?}", other),
        }
    }

    #[test]
    fn test_trailing_bytes_after_iend_kept() {
        let mut png = synthetic_png(&[chunk(b"IHDR", &[0; 13]), chunk(b"IEND", &[])]);
        png.extend_from_slice(b"trailer");
        let (out, _) = strip_color_metadata(&png).unwrap();
        assert_eq!(out, png);
    }

    #[test]
    fn test_truncated_stream_rejected() {
        let mut png = synthetic_png(&[chunk(b"IHDR", &[0; 13]), chunk(b"IDAT", &[0; 16])]);
        png.truncate(png.len() - 6);
        assert!(matches!(
            strip_color_metadata(&png),
            Err(NormalizeError::Truncated { offset: 33 })
        ));
    }

    #[test]
    fn test_missing_iend_rejected() {
        let png = synthetic_png(&[chunk(b"IHDR", &[0; 13])]);
        assert!(matches!(strip_color_metadata(&png), Err(NormalizeError::MissingEnd)));
    }

    #[test]
    fn test_normalize_bytes_passthrough_for_gif() {
        let gif = b"GIF89a\x01\x00\x01\x00".to_vec();
        let n = normalize_bytes(gif.clone()).unwrap();
        assert_eq!(n.outcome, NormalizeOutcome::Passthrough);
        assert_eq!(n.bytes, gif);
    }

    #[test]
    fn test_normalize_in_place_then_unchanged() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("prog.png");
        let png = synthetic_png(&[
            chunk(b"IHDR", &[0; 13]),
            chunk(b"gAMA", &[0, 0, 0xb1, 0x8f]),
            chunk(b"IDAT", &[7]),
            chunk(b"IEND", &[]),
        ]);
        fs::write(&path, &png).unwrap();

        let first = normalize(&path).unwrap();
        assert_eq!(
            first.outcome,
            NormalizeOutcome::Stripped { chunks: vec!["gAMA".into()] }
        );
        let on_disk = fs::read(&path).unwrap();
        assert_eq!(on_disk, first.bytes);

        let second = normalize(&path).unwrap();
        assert_eq!(second.outcome, NormalizeOutcome::Unchanged);
        assert_eq!(fs::read(&path).unwrap(), on_disk);
    }

    #[test]
    fn test_failed_normalize_leaves_file_untouched() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("broken.png");
        let mut png = synthetic_png(&[
            chunk(b"IHDR", &[0; 13]),
            chunk(b"gAMA", &[0, 0, 0xb1, 0x8f]),
            chunk(b"IDAT", &[0; 32]),
        ]);
        png.truncate(png.len() - 10);
        fs::write(&path, &png).unwrap();

        assert!(normalize(&path).is_err());
        assert_eq!(fs::read(&path).unwrap(), png);
    }

    #[test]
    fn test_write_atomically_failure_keeps_original_and_cleans_up() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("prog.png");
        fs::write(&path, b"original").unwrap();

        let result = write_atomically(&path, |out| {
            out.write_all(b"partial")?;
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        });

        assert!(result.is_err());
        assert_eq!(fs::read(&path).unwrap(), b"original");
        let leftovers: Vec<_> = fs::read_dir(tmp.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn test_write_atomically_replaces() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out.json");
        fs::write(&path, b"old").unwrap();
        write_atomically(&path, |out| out.write_all(b"new")).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"new");
    }
}
