//! Fixed-count chunk codec
//!
//! A file of `len` bytes split into `n` pieces uses a chunk length of
//! `ceil(len / n)`; the last chunk holds the remainder and empty chunks are
//! never produced. That means fewer than `n` chunks come back when
//! `len < n` or when the division leaves nothing for the tail (9 bytes in 4
//! pieces is 3+3+3).

use zkv_core::{ZkvError, ZkvResult};

/// Chunk length used when splitting `len` bytes into `n` pieces.
pub fn chunk_len(len: usize, n: usize) -> ZkvResult<usize> {
    if n == 0 {
        return Err(ZkvError::protocol("chunk count must be at least 1"));
    }
    Ok(len.div_ceil(n))
}

/// Number of chunks `split` yields for `len` bytes and `n` pieces.
pub fn chunk_count(len: usize, n: usize) -> ZkvResult<usize> {
    let size = chunk_len(len, n)?;
    if size == 0 {
        return Ok(0);
    }
    Ok(len.div_ceil(size))
}

/// Split `data` into at most `n` contiguous, non-empty slices.
pub fn split(data: &[u8], n: usize) -> ZkvResult<Vec<&[u8]>> {
    let size = chunk_len(data.len(), n)?;
    if size == 0 {
        return Ok(Vec::new());
    }
    let chunks: Vec<&[u8]> = data.chunks(size).collect();
    tracing::debug!(
        len = data.len(),
        requested = n,
        chunks = chunks.len(),
        chunk_len = size,
        "split"
    );
    Ok(chunks)
}

/// Concatenate chunks in the given order. Inverse of [`split`].
pub fn combine<C: AsRef<[u8]>>(chunks: &[C]) -> Vec<u8> {
    let total = chunks.iter().map(|c| c.as_ref().len()).sum();
    let mut out = Vec::with_capacity(total);
    for chunk in chunks {
        out.extend_from_slice(chunk.as_ref());
    }
    out
}

/// Human-readable chunk name, e.g. `report.pdf.part2`.
pub fn chunk_name(filename: &str, index: u32) -> String {
    format!("{filename}.part{index}")
}
