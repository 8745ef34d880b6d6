//! Version-1 B-trees (group symbol tables and chunk indexes) and the local
//! heap that backs old-style group names.

use crate::error::{H5CoroError, Result};
use crate::h5::codec::Cursor;
use crate::h5::context::Context;
use crate::h5::dataset::{HEAP_SIGNATURE, MAX_NDIMS, SNOD_SIGNATURE, TREE_SIGNATURE};
use crate::h5::superblock::FileLayout;

const GROUP_NODE_TYPE: u64 = 0;
const CHUNK_NODE_TYPE: u64 = 1;

/// Look up `name` among an old-style group's children, returning the
/// matching symbol-table entry's (link-name heap offset, object-header
/// address) if present.
///
/// Descends every child of an internal node in order rather than
/// binary-searching on keys: the tree's key ordering guarantees the
/// target lives under exactly one child, so this trades traversal speed
/// for a simpler, unambiguously-correct walk.
pub fn read_group_btree_v1(
    ctx: &Context,
    layout: FileLayout,
    btree_addr: u64,
    heap_addr: u64,
    name: &str,
) -> Result<Option<(u64, u64)>> {
    read_group_node(ctx, layout, btree_addr, heap_addr, name)
}

fn read_group_node(
    ctx: &Context,
    layout: FileLayout,
    pos: u64,
    heap_addr: u64,
    name: &str,
) -> Result<Option<(u64, u64)>> {
    let mut cur = Cursor::new(ctx, pos);
    let sig = cur.field(4)?;
    if sig as u32 != TREE_SIGNATURE {
        return Err(H5CoroError::BadMagic("v1 b-tree"));
    }
    let node_type = cur.field(1)?;
    if node_type != GROUP_NODE_TYPE {
        return Err(H5CoroError::Parse("expected group b-tree node"));
    }
    let node_level = cur.field(1)?;
    let entries_used = cur.field(2)?;
    cur.advance(layout.offset_size as u64); // left sibling
    cur.advance(layout.offset_size as u64); // right sibling

    if node_level == 0 {
        let mut cur = Cursor::new(ctx, pos + 8 + 2 * layout.offset_size as u64);
        for _ in 0..entries_used {
            cur.advance(layout.length_size as u64); // key
            let child_addr = cur.field(layout.offset_size)?;
            if let Some(found) = read_symbol_table_node(ctx, layout, child_addr, heap_addr, name)? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    } else {
        let mut cur = Cursor::new(ctx, pos + 8 + 2 * layout.offset_size as u64);
        for _ in 0..entries_used {
            cur.advance(layout.length_size as u64); // key
            let child_addr = cur.field(layout.offset_size)?;
            if let Some(found) = read_group_node(ctx, layout, child_addr, heap_addr, name)? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }
}

fn read_symbol_table_node(
    ctx: &Context,
    layout: FileLayout,
    pos: u64,
    heap_addr: u64,
    name: &str,
) -> Result<Option<(u64, u64)>> {
    let mut cur = Cursor::new(ctx, pos);
    let sig = cur.field(4)?;
    if sig as u32 != SNOD_SIGNATURE {
        return Err(H5CoroError::BadMagic("symbol table node"));
    }
    let _version = cur.field(1)?;
    cur.advance(1); // reserved
    let num_symbols = cur.field(2)?;

    for _ in 0..num_symbols {
        let link_name_offset = cur.field(layout.length_size)?;
        let obj_header_addr = cur.field(layout.offset_size)?;
        cur.advance(4); // cache type
        cur.advance(4); // reserved
        cur.advance(16); // scratch-pad

        let candidate = read_local_heap_name(ctx, heap_addr, link_name_offset)?;
        if candidate == name {
            return Ok(Some((link_name_offset, obj_header_addr)));
        }
    }
    Ok(None)
}

/// Resolve a local heap's data segment and read the NUL-terminated name at
/// `offset` within it.
pub fn read_local_heap_name(ctx: &Context, heap_addr: u64, offset: u64) -> Result<String> {
    let mut cur = Cursor::new(ctx, heap_addr);
    let sig = cur.field(4)?;
    if sig as u32 != HEAP_SIGNATURE {
        return Err(H5CoroError::BadMagic("local heap"));
    }
    let _version = cur.field(1)?;
    cur.advance(3); // reserved
    let length_size = 8; // local heap header fields are always 8 bytes wide
    let _dataseg_size = cur.field(length_size)?;
    let _freelist_offset = cur.field(length_size)?;
    let dataseg_addr = cur.field(8)?;

    let mut name_cur = Cursor::new(ctx, dataseg_addr + offset);
    let mut out = Vec::new();
    loop {
        let b = name_cur.field(1)? as u8;
        if b == 0 {
            break;
        }
        out.push(b);
    }
    Ok(String::from_utf8_lossy(&out).into_owned())
}

/// One leaf record of a chunked-dataset index b-tree: the chunk's on-disk
/// location and its logical N-D offset.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub chunk_size: u32,
    pub filter_mask: u32,
    pub offset: [u64; MAX_NDIMS],
    pub addr: u64,
}

/// Collect every chunk record reachable from a chunk-index b-tree root,
/// in no particular order — callers intersect against the requested
/// hyperslice afterward.
pub fn collect_chunks_v1(
    ctx: &Context,
    layout: FileLayout,
    btree_addr: u64,
    ndims: usize,
) -> Result<Vec<ChunkRecord>> {
    let mut out = Vec::new();
    collect_chunk_node(ctx, layout, btree_addr, ndims, &mut out)?;
    Ok(out)
}

fn collect_chunk_node(
    ctx: &Context,
    layout: FileLayout,
    pos: u64,
    ndims: usize,
    out: &mut Vec<ChunkRecord>,
) -> Result<()> {
    let mut cur = Cursor::new(ctx, pos);
    let sig = cur.field(4)?;
    if sig as u32 != TREE_SIGNATURE {
        return Err(H5CoroError::BadMagic("v1 b-tree"));
    }
    let node_type = cur.field(1)?;
    if node_type != CHUNK_NODE_TYPE {
        return Err(H5CoroError::Parse("expected chunk b-tree node"));
    }
    let node_level = cur.field(1)?;
    let entries_used = cur.field(2)?;
    cur.advance(layout.offset_size as u64); // left sibling
    cur.advance(layout.offset_size as u64); // right sibling

    // key_i, child_i pairs, followed by a final trailing key.
    for _ in 0..entries_used {
        let chunk_size = cur.field(4)? as u32;
        let filter_mask = cur.field(4)? as u32;
        let mut offset = [0u64; MAX_NDIMS];
        for d in 0..=ndims {
            if d < MAX_NDIMS {
                offset[d] = cur.field(8)?;
            } else {
                cur.advance(8);
            }
        }
        let child_addr = cur.field(layout.offset_size)?;

        if node_level == 0 {
            out.push(ChunkRecord {
                chunk_size,
                filter_mask,
                offset,
                addr: child_addr,
            });
        } else {
            collect_chunk_node(ctx, layout, child_addr, ndims, out)?;
        }
    }
    Ok(())
}
