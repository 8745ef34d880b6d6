//! Dataset materializer: turns parsed [`DatasetMeta`] plus a caller-supplied
//! hyperslice into a populated, 64-byte-aligned buffer. Drives the chunk
//! index walk and the inflate/shuffle/copy steps as one pass over a single
//! scratch buffer.

use crate::error::{H5CoroError, Result};
use crate::h5::btree1::collect_chunks_v1;
use crate::h5::context::Context;
use crate::h5::dataset::{DatasetMeta, Filter, Layout};
use crate::h5::filters::{inflate_chunk, unshuffle};
use crate::h5::slicecopy::{copy_nd_slice, Range};
use crate::h5::superblock::FileLayout;
use crate::io::aligned_buf::{alloc_aligned, AlignedBuf};

/// One dimension of a caller-supplied hyperslice. `r1 == None` means
/// "end of range", resolved against the dataset's extent.
#[derive(Debug, Clone, Copy)]
pub struct SliceArg {
    pub r0: u64,
    pub r1: Option<u64>,
}

/// The materialized result: element count, output shape, and the raw
/// aligned buffer (native on-disk layout; value coercion runs on top of this).
pub struct Materialized {
    pub buffer: AlignedBuf,
    pub elements: usize,
    pub shape: [u64; crate::h5::dataset::MAX_NDIMS],
}

fn resolve_slices(meta: &DatasetMeta, slice: &[SliceArg]) -> Result<Vec<Range>> {
    if slice.len() != meta.ndims {
        return Err(H5CoroError::InvalidHyperslice("slice rank mismatches dataset rank"));
    }
    let mut out = Vec::with_capacity(meta.ndims);
    for d in 0..meta.ndims {
        let dim_len = meta.dimensions[d];
        let r0 = slice[d].r0;
        let r1 = slice[d].r1.unwrap_or(dim_len);
        if r0 > r1 || r1 > dim_len {
            return Err(H5CoroError::InvalidHyperslice("slice out of bounds"));
        }
        out.push(Range { r0, r1 });
    }
    Ok(out)
}

/// Materialize the hyperslice `slice` of `meta` read through `ctx`.
pub fn materialize(
    ctx: &Context,
    layout: FileLayout,
    meta: &DatasetMeta,
    slice: &[SliceArg],
) -> Result<Materialized> {
    let ranges = resolve_slices(meta, slice)?;
    let mut shape = [0u64; crate::h5::dataset::MAX_NDIMS];
    let mut elements: u64 = 1;
    for (d, r) in ranges.iter().enumerate() {
        shape[d] = r.len();
        elements *= r.len().max(1);
    }
    if meta.ndims == 0 {
        elements = 1;
    }

    let string_extra = usize::from(meta.type_class == crate::h5::dataset::TypeClass::String);
    let byte_len = elements as usize * meta.elementsize + string_extra;
    let mut buffer = alloc_aligned(byte_len);

    if !meta.fill.bytes.is_empty() {
        prefill(&mut buffer, &meta.fill.bytes, meta.elementsize, elements as usize);
    }

    match meta.layout {
        Layout::Compact | Layout::Contiguous => {
            read_dense(ctx, meta, &ranges, &mut buffer)?;
        }
        Layout::Chunked => {
            read_chunked(ctx, layout, meta, &ranges, &mut buffer)?;
        }
        Layout::Unknown => return Err(H5CoroError::Unsupported("unresolved data layout")),
    }

    Ok(Materialized {
        buffer,
        elements: elements as usize,
        shape,
    })
}

fn prefill(buffer: &mut [u8], fill: &[u8], element_size: usize, elements: usize) {
    for i in 0..elements {
        let off = i * element_size;
        let n = fill.len().min(element_size);
        buffer[off..off + n].copy_from_slice(&fill[..n]);
    }
}

fn read_dense(ctx: &Context, meta: &DatasetMeta, ranges: &[Range], buffer: &mut [u8]) -> Result<()> {
    match meta.ndims {
        0 => {
            ctx.read_bytes(meta.address, &mut buffer[..meta.elementsize.max(1)])?;
        }
        1 => {
            let r = ranges[0];
            let offset = meta.address + r.r0 * meta.elementsize as u64;
            ctx.read_bytes(offset, buffer)?;
        }
        _ => {
            let full_elements: u64 = meta.dimensions[..meta.ndims].iter().product();
            let mut scratch = vec![0u8; full_elements as usize * meta.elementsize];
            ctx.read_bytes(meta.address, &mut scratch)?;

            let out_shape: Vec<u64> = ranges.iter().map(Range::len).collect();
            let out_ranges: Vec<Range> = ranges
                .iter()
                .map(|r| Range { r0: 0, r1: r.len() })
                .collect();

            copy_nd_slice(
                buffer,
                &out_shape,
                &out_ranges,
                &scratch,
                &meta.dimensions[..meta.ndims],
                ranges,
                meta.elementsize as u64,
                meta.ndims,
            );
        }
    }
    Ok(())
}

fn read_chunked(
    ctx: &Context,
    layout: FileLayout,
    meta: &DatasetMeta,
    ranges: &[Range],
    buffer: &mut [u8],
) -> Result<()> {
    let chunks = collect_chunks_v1(ctx, layout, meta.address, meta.ndims)?;
    let deflate = meta.filters[Filter::Deflate as usize];
    let shuffle = meta.filters[Filter::Shuffle as usize];
    for (i, f) in meta.filters.iter().enumerate() {
        if *f && i != Filter::Deflate as usize && i != Filter::Shuffle as usize {
            return Err(H5CoroError::Unsupported("filter other than deflate/shuffle on chunked dataset"));
        }
    }

    let chunk_byte_len = meta.chunk_elements as usize * meta.elementsize;

    for record in chunks {
        let chunk_ranges: Vec<Range> = (0..meta.ndims)
            .map(|d| Range {
                r0: record.offset[d],
                r1: record.offset[d] + meta.chunk_dims[d],
            })
            .collect();

        let overlap: Option<Vec<Range>> = (0..meta.ndims)
            .map(|d| {
                let r0 = chunk_ranges[d].r0.max(ranges[d].r0);
                let r1 = chunk_ranges[d].r1.min(ranges[d].r1);
                if r0 < r1 {
                    Some(Range { r0, r1 })
                } else {
                    None
                }
            })
            .collect();
        let Some(overlap) = overlap else { continue };

        let write_ranges: Vec<Range> = (0..meta.ndims)
            .map(|d| Range {
                r0: overlap[d].r0 - ranges[d].r0,
                r1: overlap[d].r1 - ranges[d].r0,
            })
            .collect();

        // 1-D fast path: when only deflate is active and
        // the chunk is entirely inside the requested range, inflate straight
        // into the output row instead of bouncing through a scratch buffer.
        if meta.ndims == 1 && deflate && !shuffle && overlap[0] == chunk_ranges[0] {
            let mut filter_buf = vec![0u8; record.chunk_size as usize];
            ctx.io_request(record.addr, filter_buf.len(), Some(&mut filter_buf), filter_buf.len(), false)?;
            let dst_start = write_ranges[0].r0 as usize * meta.elementsize;
            inflate_chunk(&filter_buf, &mut buffer[dst_start..dst_start + chunk_byte_len])?;
            continue;
        }

        let mut filter_buf = vec![0u8; record.chunk_size as usize];
        ctx.io_request(record.addr, filter_buf.len(), Some(&mut filter_buf), filter_buf.len(), false)?;

        let mut chunk_buf = vec![0u8; chunk_byte_len];
        if deflate {
            inflate_chunk(&filter_buf, &mut chunk_buf)?;
        } else {
            chunk_buf.copy_from_slice(&filter_buf[..chunk_byte_len.min(filter_buf.len())]);
        }

        if shuffle {
            let mut unshuffled = vec![0u8; chunk_byte_len];
            unshuffle(&chunk_buf, &mut unshuffled, 0, meta.elementsize)?;
            chunk_buf = unshuffled;
        }

        let read_ranges: Vec<Range> = (0..meta.ndims)
            .map(|d| Range {
                r0: overlap[d].r0 - record.offset[d],
                r1: overlap[d].r1 - record.offset[d],
            })
            .collect();

        if meta.ndims == 1 {
            let src = &chunk_buf[read_ranges[0].r0 as usize * meta.elementsize
                ..read_ranges[0].r1 as usize * meta.elementsize];
            let dst_start = write_ranges[0].r0 as usize * meta.elementsize;
            buffer[dst_start..dst_start + src.len()].copy_from_slice(src);
        } else if meta.ndims >= 2 {
            let out_shape: Vec<u64> = ranges.iter().map(Range::len).collect();
            copy_nd_slice(
                buffer,
                &out_shape,
                &write_ranges,
                &chunk_buf,
                &meta.chunk_dims[..meta.ndims],
                &read_ranges,
                meta.elementsize as u64,
                meta.ndims,
            );
        }
    }
    Ok(())
}
