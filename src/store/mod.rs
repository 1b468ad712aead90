//! Chunk store: journal entries, their chunks, the FTS5 lexical index, and
//! packed embedding vectors, all in one SQLite database.

pub mod chunks;
pub mod entries;
pub mod stats;
pub mod types;

use crate::error::{Error, Result};

/// Size in bytes of one packed vector component.
const F32_BYTES: usize = std::mem::size_of::<f32>();

/// Pack a vector as consecutive little-endian IEEE-754 f32 values, no padding.
///
/// This is the on-disk format of `chunk_vec.embedding`; it must stay byte-exact
/// with databases written by earlier versions.
pub fn pack_embedding(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * F32_BYTES);
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Unpack a blob written by [`pack_embedding`], checking it against the
/// declared dimension.
pub fn unpack_embedding(chunk_id: i64, dim: i64, bytes: &[u8]) -> Result<Vec<f32>> {
    let corrupt = || Error::Corruption {
        chunk_id,
        dim,
        byte_len: bytes.len(),
    };
    let dim_usize = usize::try_from(dim).map_err(|_| corrupt())?;
    if bytes.len() != dim_usize * F32_BYTES {
        return Err(corrupt());
    }

    Ok(bytes
        .chunks_exact(F32_BYTES)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}
