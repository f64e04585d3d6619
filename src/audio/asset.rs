//! Uploaded audio, validated before any decode work.

use crate::error::{ParlanceError, Result};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

/// Audio container types accepted for upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MimeType {
    Wav,
    Mp3,
    Mpeg,
    Webm,
}

impl MimeType {
    /// Canonical MIME string.
    pub fn as_str(&self) -> &'static str {
        match self {
            MimeType::Wav => "audio/wav",
            MimeType::Mp3 => "audio/mp3",
            MimeType::Mpeg => "audio/mpeg",
            MimeType::Webm => "audio/webm",
        }
    }

    /// File extension used for temp files and as a demuxer hint.
    pub fn extension(&self) -> &'static str {
        match self {
            MimeType::Wav => "wav",
            MimeType::Mp3 | MimeType::Mpeg => "mp3",
            MimeType::Webm => "webm",
        }
    }

    /// Guess the MIME type from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "wav" | "wave" => Some(MimeType::Wav),
            "mp3" => Some(MimeType::Mp3),
            "mpeg" | "mpga" => Some(MimeType::Mpeg),
            "webm" => Some(MimeType::Webm),
            _ => None,
        }
    }
}

impl FromStr for MimeType {
    type Err = ParlanceError;

    /// Parse a Content-Type value. Parameters such as `; codecs=opus` are ignored.
    fn from_str(s: &str) -> Result<Self> {
        let essence = s.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        match essence.as_str() {
            "audio/wav" | "audio/x-wav" | "audio/wave" => Ok(MimeType::Wav),
            "audio/mp3" => Ok(MimeType::Mp3),
            "audio/mpeg" => Ok(MimeType::Mpeg),
            "audio/webm" => Ok(MimeType::Webm),
            _ => Err(ParlanceError::UnsupportedMediaType {
                mime: s.trim().to_string(),
            }),
        }
    }
}

impl fmt::Display for MimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An uploaded recording: opaque bytes plus declared type.
///
/// Cloning is cheap; the byte buffer is shared.
#[derive(Clone)]
pub struct AudioAsset {
    bytes: Arc<[u8]>,
    mime: MimeType,
    file_name: String,
}

impl AudioAsset {
    /// Validate an upload.
    ///
    /// # Errors
    /// - `PayloadTooLarge` if `bytes` exceeds `max_bytes` (checked first)
    /// - `UnsupportedMediaType` if `mime` is not an accepted audio type
    /// - `Decode` if the buffer is empty
    pub fn new(bytes: impl Into<Arc<[u8]>>, mime: &str, max_bytes: usize) -> Result<Self> {
        let bytes = bytes.into();
        check_size(bytes.len(), max_bytes)?;
        let mime = mime.parse::<MimeType>()?;
        if bytes.is_empty() {
            return Err(ParlanceError::Decode {
                message: "audio upload is empty".to_string(),
            });
        }
        Ok(Self {
            bytes,
            file_name: format!("audio.{}", mime.extension()),
            mime,
        })
    }

    /// Load an asset from disk.
    ///
    /// The size limit is checked against file metadata before reading.
    /// Without an explicit `mime`, the type is guessed from the extension.
    pub fn from_path(path: &Path, mime: Option<&str>, max_bytes: usize) -> Result<Self> {
        let size = fs::metadata(path)?.len();
        check_size(usize::try_from(size).unwrap_or(usize::MAX), max_bytes)?;

        let mime = match mime {
            Some(m) => m.to_string(),
            None => path
                .extension()
                .and_then(|e| e.to_str())
                .and_then(MimeType::from_extension)
                .map(|m| m.as_str().to_string())
                .ok_or_else(|| ParlanceError::UnsupportedMediaType {
                    mime: format!("unknown type for {}", path.display()),
                })?,
        };

        let bytes = fs::read(path)?;
        let asset = Self::new(bytes, &mime, max_bytes)?;
        Ok(match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => asset.with_file_name(name),
            None => asset,
        })
    }

    /// Override the file name reported to remote services.
    pub fn with_file_name(mut self, name: &str) -> Self {
        self.file_name = name.to_string();
        self
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime(&self) -> MimeType {
        self.mime
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Write the raw bytes into `dir` as `input.<ext>` and return the path.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(format!("input.{}", self.mime.extension()));
        fs::write(&path, &self.bytes)?;
        Ok(path)
    }
}

impl fmt::Debug for AudioAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioAsset")
            .field("mime", &self.mime)
            .field("file_name", &self.file_name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

pub(crate) fn check_size(size: usize, max_bytes: usize) -> Result<()> {
    if size > max_bytes {
        return Err(ParlanceError::PayloadTooLarge {
            size,
            limit: max_bytes,
        });
    }
    Ok(())
}
