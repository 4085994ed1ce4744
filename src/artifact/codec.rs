//! Model blob encoding
//!
//! ```text
//! ┌──────┬─────────┬───────┬──────────────────────────────┐
//! │ HPSM │ version │ codec │ bincode(FittedModel)         │
//! │ 4 B  │ 1 B     │ 1 B   │ raw, or LZ4 size-prepended   │
//! └──────┴─────────┴───────┴──────────────────────────────┘
//! ```

use std::path::Path;

use crate::model::FittedModel;
use crate::{Error, Result};

/// Leading bytes of every model blob.
pub const MAGIC: &[u8; 4] = b"HPSM";

/// Current blob format version.
pub const FORMAT_VERSION: u8 = 1;

const HEADER_LEN: usize = MAGIC.len() + 2;

/// Payload compression of a model blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// Uncompressed bincode
    Raw,
    /// LZ4 block compression (needs the `compression` feature)
    Lz4,
}

impl Default for Codec {
    fn default() -> Self {
        if cfg!(feature = "compression") {
            Self::Lz4
        } else {
            Self::Raw
        }
    }
}

impl Codec {
    /// Codec name for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Lz4 => "lz4",
        }
    }

    const fn tag(self) -> u8 {
        match self {
            Self::Raw => 0,
            Self::Lz4 => 1,
        }
    }

    const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Raw),
            1 => Some(Self::Lz4),
            _ => None,
        }
    }
}

/// Serialize a fitted model into a blob.
///
/// # Errors
///
/// Returns `StorageError` if the model cannot be encoded and `InvalidInput`
/// when LZ4 is requested without the `compression` feature.
pub fn encode(model: &FittedModel, codec: Codec) -> Result<Vec<u8>> {
    let payload = bincode::serde::encode_to_vec(model, bincode::config::standard())
        .map_err(|e| Error::StorageError(format!("cannot encode model: {e}")))?;
    let payload = match codec {
        Codec::Raw => payload,
        #[cfg(feature = "compression")]
        Codec::Lz4 => lz4_flex::compress_prepend_size(&payload),
        #[cfg(not(feature = "compression"))]
        Codec::Lz4 => {
            return Err(Error::InvalidInput(
                "LZ4 blobs need the `compression` feature".to_string(),
            ))
        }
    };

    let mut blob = Vec::with_capacity(HEADER_LEN + payload.len());
    blob.extend_from_slice(MAGIC);
    blob.push(FORMAT_VERSION);
    blob.push(codec.tag());
    blob.extend_from_slice(&payload);
    Ok(blob)
}

/// Decode a blob read from `path`.
///
/// # Errors
///
/// Returns `Corrupt` for a bad header, an unknown version or codec, a
/// payload that does not decode, trailing bytes, or a decoded model that
/// fails [`FittedModel::validate`].
pub fn decode(path: &Path, blob: &[u8]) -> Result<FittedModel> {
    let corrupt = |reason: String| Error::Corrupt {
        path: path.to_path_buf(),
        reason,
    };

    if blob.len() < HEADER_LEN || &blob[..MAGIC.len()] != MAGIC {
        return Err(corrupt("not a model blob (bad magic)".to_string()));
    }
    let version = blob[MAGIC.len()];
    if version != FORMAT_VERSION {
        return Err(corrupt(format!("unsupported format version {version}")));
    }
    let tag = blob[MAGIC.len() + 1];
    let codec = Codec::from_tag(tag).ok_or_else(|| corrupt(format!("unknown codec {tag}")))?;

    let body = &blob[HEADER_LEN..];
    let payload = match codec {
        Codec::Raw => std::borrow::Cow::Borrowed(body),
        #[cfg(feature = "compression")]
        Codec::Lz4 => std::borrow::Cow::Owned(
            lz4_flex::decompress_size_prepended(body)
                .map_err(|e| corrupt(format!("LZ4 decompression failed: {e}")))?,
        ),
        #[cfg(not(feature = "compression"))]
        Codec::Lz4 => {
            return Err(corrupt(
                "blob is LZ4 compressed but the `compression` feature is off".to_string(),
            ))
        }
    };

    let (model, read): (FittedModel, usize) =
        bincode::serde::decode_from_slice(&payload[..], bincode::config::standard())
            .map_err(|e| corrupt(format!("cannot decode model: {e}")))?;
    if read != payload.len() {
        return Err(corrupt(format!(
            "{} trailing bytes after model",
            payload.len() - read
        )));
    }
    model.validate().map_err(|e| match e {
        Error::InvalidInput(reason) => corrupt(format!("unusable model: {reason}")),
        other => other,
    })?;
    Ok(model)
}
