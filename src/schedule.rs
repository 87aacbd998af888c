use crate::error::{PipelineError, Result};

/// Splits `items` into contiguous request-sized blocks, preserving order.
///
/// The last block may be shorter than `size`; empty input yields no blocks.
pub fn chunks<T>(items: &[T], size: usize) -> Result<std::slice::Chunks<'_, T>> {
    if size == 0 {
        return Err(PipelineError::invalid_argument("chunk size must be > 0"));
    }
    Ok(items.chunks(size))
}

/// Number of blocks `chunks` will yield.
pub fn chunk_count(len: usize, size: usize) -> Result<usize> {
    if size == 0 {
        return Err(PipelineError::invalid_argument("chunk size must be > 0"));
    }
    Ok(len.div_ceil(size))
}
