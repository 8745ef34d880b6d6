//! Chunk filters: deflate decompression and byte-shuffle inversion, built on
//! [`flate2`]'s streaming inflater.

use flate2::Decompress;
use flate2::FlushDecompress;

use crate::error::{H5CoroError, Result};

/// Inflate `input` (a raw zlib stream) into `output`, which must be sized
/// to exactly the uncompressed chunk size. Fails if the stream doesn't
/// decompress to completion within the provided buffer.
pub fn inflate_chunk(input: &[u8], output: &mut [u8]) -> Result<()> {
    let mut decompress = Decompress::new(true);
    let status = decompress
        .decompress(input, output, FlushDecompress::Finish)
        .map_err(|e| H5CoroError::Inflate(e.to_string()))?;
    if status != flate2::Status::StreamEnd {
        return Err(H5CoroError::Inflate(format!(
            "stream did not terminate: {status:?}"
        )));
    }
    Ok(())
}

/// Undo the HDF5 byte-shuffle filter over a contiguous element range
/// `[start_element, start_element + num_elements)` of `input`.
///
/// `input` is laid out as `type_size` planes of `shuffle_block_size =
/// input.len() / type_size` consecutive bytes; byte `j` of element `i`
/// lives at `j * shuffle_block_size + i`. The inverse gathers
/// `output[k] = input[val * shuffle_block_size + element]` for each
/// element/byte pair in the requested range.
pub fn unshuffle(
    input: &[u8],
    output: &mut [u8],
    output_offset: usize,
    type_size: usize,
) -> Result<()> {
    if type_size == 0 || type_size > 8 {
        return Err(H5CoroError::BadShuffleSize(type_size));
    }
    let shuffle_block_size = input.len() / type_size;
    let num_elements = output.len() / type_size;
    let start_element = output_offset / type_size;

    let mut dst = 0usize;
    for element in start_element..start_element + num_elements {
        for val in 0..type_size {
            let src = val * shuffle_block_size + element;
            output[dst] = input[src];
            dst += 1;
        }
    }
    Ok(())
}
