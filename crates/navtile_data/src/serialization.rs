//! Binary encoding of [`TileData`].
//!
//! Layout: 4 bytes [`TILE_MAGIC`], a little-endian `u32` [`TILE_FORMAT_VERSION`],
//! followed by the bincode encoding of the tile.

use thiserror::Error;

use crate::{TileData, TileValidationError};

/// The bytes every tile blob starts with.
pub const TILE_MAGIC: [u8; 4] = *b"NTIL";

/// The version of the tile layout written by [`TileData::to_bytes`].
/// Bump this whenever a serialized type changes.
pub const TILE_FORMAT_VERSION: u32 = 1;

const HEADER_LEN: usize = TILE_MAGIC.len() + size_of::<u32>();

impl TileData {
    /// Serializes the tile into a versioned blob.
    ///
    /// # Errors
    ///
    /// Returns [`TileDataError::Empty`] if the tile has no polygons, since such a tile can never be queried.
    pub fn to_bytes(&self) -> Result<Vec<u8>, TileDataError> {
        if self.polygons.is_empty() {
            return Err(TileDataError::Empty);
        }
        let payload = bincode::serde::encode_to_vec(self, bincode::config::standard())?;
        let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
        bytes.extend_from_slice(&TILE_MAGIC);
        bytes.extend_from_slice(&TILE_FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&payload);
        Ok(bytes)
    }

    /// Deserializes a blob written by [`TileData::to_bytes`].
    ///
    /// # Errors
    ///
    /// Returns an error if the blob is truncated, was written by an incompatible version,
    /// does not decode, or contains out of range indices.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TileDataError> {
        if bytes.len() < HEADER_LEN {
            return Err(TileDataError::TooShort { len: bytes.len() });
        }
        let (magic, rest) = bytes.split_at(TILE_MAGIC.len());
        if magic != TILE_MAGIC {
            return Err(TileDataError::BadMagic);
        }
        let (version, payload) = rest.split_at(size_of::<u32>());
        let version = u32::from_le_bytes([version[0], version[1], version[2], version[3]]);
        if version != TILE_FORMAT_VERSION {
            return Err(TileDataError::UnsupportedVersion {
                found: version,
                expected: TILE_FORMAT_VERSION,
            });
        }
        let (tile, read): (TileData, usize) =
            bincode::serde::decode_from_slice(payload, bincode::config::standard())?;
        if read != payload.len() {
            tracing::warn!(
                "Ignoring {} trailing bytes after tile payload",
                payload.len() - read
            );
        }
        if tile.polygons.is_empty() {
            return Err(TileDataError::Empty);
        }
        tile.validate()?;
        Ok(tile)
    }
}

/// Errors that can occur when encoding or decoding a tile blob.
#[derive(Error, Debug)]
pub enum TileDataError {
    /// The blob cannot even hold the header.
    #[error("tile blob is too short to hold a header: got {len} bytes")]
    TooShort {
        /// The length of the blob
        len: usize,
    },
    /// The blob does not start with [`TILE_MAGIC`].
    #[error("tile blob does not start with the tile magic bytes")]
    BadMagic,
    /// The blob was written by another format version.
    #[error("unsupported tile format version {found}, expected {expected}")]
    UnsupportedVersion {
        /// The version stored in the blob
        found: u32,
        /// The version this crate reads and writes
        expected: u32,
    },
    /// The tile has no polygons.
    #[error("tile has no polygons")]
    Empty,
    /// The tile decoded, but references data that does not exist.
    #[error("tile data is inconsistent: {0}")]
    Invalid(#[from] TileValidationError),
    /// Bincode failed to encode the tile.
    #[error("failed to encode tile: {0}")]
    Encode(#[from] bincode::error::EncodeError),
    /// Bincode failed to decode the tile.
    #[error("failed to decode tile: {0}")]
    Decode(#[from] bincode::error::DecodeError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::tests::square_tile;

    #[test]
    fn blob_starts_with_magic_and_version() -> anyhow::Result<()> {
        let bytes = square_tile().to_bytes()?;
        assert_eq!(bytes[..4], TILE_MAGIC);
        assert_eq!(bytes[4..8], TILE_FORMAT_VERSION.to_le_bytes());
        assert!(bytes.len() > HEADER_LEN);
        Ok(())
    }

    #[test]
    fn decoded_tile_matches_encoded_tile() -> anyhow::Result<()> {
        let tile = square_tile();
        let decoded = TileData::from_bytes(&tile.to_bytes()?)?;
        assert_eq!(decoded, tile);
        Ok(())
    }

    #[test]
    fn empty_tile_cannot_be_encoded() {
        let result = TileData::default().to_bytes();
        assert!(matches!(result, Err(TileDataError::Empty)));
    }

    #[test]
    fn truncated_blob_is_rejected() {
        let result = TileData::from_bytes(&TILE_MAGIC);
        assert!(matches!(result, Err(TileDataError::TooShort { len: 4 })));
    }

    #[test]
    fn foreign_blob_is_rejected() -> anyhow::Result<()> {
        let mut bytes = square_tile().to_bytes()?;
        bytes[0] = b'X';
        assert!(matches!(
            TileData::from_bytes(&bytes),
            Err(TileDataError::BadMagic)
        ));
        Ok(())
    }

    #[test]
    fn other_versions_are_rejected() -> anyhow::Result<()> {
        let mut bytes = square_tile().to_bytes()?;
        bytes[4..8].copy_from_slice(&(TILE_FORMAT_VERSION + 1).to_le_bytes());
        assert!(matches!(
            TileData::from_bytes(&bytes),
            Err(TileDataError::UnsupportedVersion { found, .. }) if found == TILE_FORMAT_VERSION + 1
        ));
        Ok(())
    }

    #[test]
    fn corrupted_payload_is_rejected() -> anyhow::Result<()> {
        let bytes = square_tile().to_bytes()?;
        let truncated = &bytes[..bytes.len() / 2];
        assert!(TileData::from_bytes(truncated).is_err());
        Ok(())
    }

    #[test]
    fn inconsistent_tile_is_rejected() -> anyhow::Result<()> {
        let mut tile = square_tile();
        tile.polygons[0].vertices[0] = 40;
        let bytes = tile.to_bytes()?;
        assert!(matches!(
            TileData::from_bytes(&bytes),
            Err(TileDataError::Invalid(TileValidationError::MissingVertex {
                polygon: 0,
                vertex: 40
            }))
        ));
        Ok(())
    }
}
