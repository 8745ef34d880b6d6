//! Indexed ("dense") attribute lookup via v2 B-tree: header/internal/leaf
//! node parsing, the Jenkins lookup3 hash used to order records, and a
//! point lookup that reads only the single root-to-leaf path a name needs,
//! not the whole tree. Specialized to the one record type this reader
//! needs — type 8, "Attribute Name for Indexed Attributes".
//!
//! Goes straight to the b-tree rather than linearly scanning the fractal
//! heap's direct blocks first: it is the structure the format provides for
//! this exact lookup, and a linear scan defeats the purpose of having an
//! index at all.
//!
//! Each descent carries its own remaining depth and indexes the per-depth
//! `node_info` table with it, which is correct at any tree depth (as
//! opposed to indexing by the tree's total depth, which only happens to
//! work for two-level trees).

use crate::error::{H5CoroError, Result};
use crate::h5::codec::Cursor;
use crate::h5::context::Context;
use crate::h5::dataset::{V2TREE_INTERNAL_SIGNATURE, V2TREE_LEAF_SIGNATURE, V2TREE_SIGNATURE};
use crate::h5::heap::{self, HeapInfo};

/// The only v2 B-tree record type this reader needs: `H5B2_ATTR_DENSE_NAME_ID`.
const ATTR_DENSE_NAME_RECORD_TYPE: u8 = 8;

/// Signature + version + type (4+1+1) plus the trailing checksum (4),
/// subtracted from `node_size` to get the space available for records.
const METADATA_PREFIX_SIZE: u64 = 10;

fn rot(x: u32, k: u32) -> u32 {
    (x << k) | (x >> (32 - k))
}

fn mix(a: &mut u32, b: &mut u32, c: &mut u32) {
    *a = a.wrapping_sub(*c);
    *a ^= rot(*c, 4);
    *c = c.wrapping_add(*b);
    *b = b.wrapping_sub(*a);
    *b ^= rot(*a, 6);
    *a = a.wrapping_add(*c);
    *c = c.wrapping_sub(*b);
    *c ^= rot(*b, 8);
    *b = b.wrapping_add(*a);
    *a = a.wrapping_sub(*c);
    *a ^= rot(*c, 16);
    *c = c.wrapping_add(*b);
    *b = b.wrapping_sub(*a);
    *b ^= rot(*a, 19);
    *a = a.wrapping_add(*c);
    *c = c.wrapping_sub(*b);
    *c ^= rot(*b, 4);
    *b = b.wrapping_add(*a);
}

fn final_mix(a: &mut u32, b: &mut u32, c: &mut u32) {
    *c ^= *b;
    *c = c.wrapping_sub(rot(*b, 14));
    *a ^= *c;
    *a = a.wrapping_sub(rot(*c, 11));
    *b ^= *a;
    *b = b.wrapping_sub(rot(*a, 25));
    *c ^= *b;
    *c = c.wrapping_sub(rot(*b, 16));
    *a ^= *c;
    *a = a.wrapping_sub(rot(*c, 4));
    *b ^= *a;
    *b = b.wrapping_sub(rot(*a, 14));
    *c ^= *b;
    *c = c.wrapping_sub(rot(*b, 24));
}

/// HDF5's `H5_checksum_lookup3`: Bob Jenkins' lookup3 `hashlittle`, used to
/// hash an attribute name into the key a v2 B-tree orders its records by.
pub fn checksum_lookup3(key: &[u8], initval: u32) -> u32 {
    let mut length = key.len();
    let mut a = 0xdeadbeefu32.wrapping_add(length as u32).wrapping_add(initval);
    let mut b = a;
    let mut c = a;
    let mut k = key;

    while length > 12 {
        a = a.wrapping_add(u32::from_le_bytes([k[0], k[1], k[2], k[3]]));
        b = b.wrapping_add(u32::from_le_bytes([k[4], k[5], k[6], k[7]]));
        c = c.wrapping_add(u32::from_le_bytes([k[8], k[9], k[10], k[11]]));
        mix(&mut a, &mut b, &mut c);
        k = &k[12..];
        length -= 12;
    }

    if length == 0 {
        return c;
    }

    if length >= 12 {
        c = c.wrapping_add((k[11] as u32) << 24);
    }
    if length >= 11 {
        c = c.wrapping_add((k[10] as u32) << 16);
    }
    if length >= 10 {
        c = c.wrapping_add((k[9] as u32) << 8);
    }
    if length >= 9 {
        c = c.wrapping_add(k[8] as u32);
    }
    if length >= 8 {
        b = b.wrapping_add((k[7] as u32) << 24);
    }
    if length >= 7 {
        b = b.wrapping_add((k[6] as u32) << 16);
    }
    if length >= 6 {
        b = b.wrapping_add((k[5] as u32) << 8);
    }
    if length >= 5 {
        b = b.wrapping_add(k[4] as u32);
    }
    if length >= 4 {
        a = a.wrapping_add((k[3] as u32) << 24);
    }
    if length >= 3 {
        a = a.wrapping_add((k[2] as u32) << 16);
    }
    if length >= 2 {
        a = a.wrapping_add((k[1] as u32) << 8);
    }
    if length >= 1 {
        a = a.wrapping_add(k[0] as u32);
    }

    final_mix(&mut a, &mut b, &mut c);
    c
}

/// Minimum number of bytes needed to hold values up to `n`: `(log2(n) / 8)
/// + 1`, the standard rule for variable-width record-count fields.
fn bytes_needed(n: u64) -> u8 {
    (heap::highest_bit(n) / 8) as u8 + 1
}

struct Header {
    node_size: u32,
    rrec_size: u16,
    depth: u16,
    root_addr: u64,
    root_node_nrec: u16,
}

fn read_header(ctx: &Context, offset_size: usize, length_size: usize, addr: u64) -> Result<Header> {
    let mut cur = Cursor::new(ctx, addr);
    let sig = cur.field(4)?;
    if sig as u32 != V2TREE_SIGNATURE {
        return Err(H5CoroError::BadMagic("v2 b-tree header"));
    }
    let version = cur.field(1)?;
    if version != 0 {
        return Err(H5CoroError::UnsupportedVersion {
            what: "v2 b-tree header",
            version: version as u32,
        });
    }
    let record_type = cur.field(1)? as u8;
    if record_type != ATTR_DENSE_NAME_RECORD_TYPE {
        return Err(H5CoroError::Unsupported("v2 b-tree record type other than indexed attribute names"));
    }

    let node_size = cur.field(4)? as u32;
    let rrec_size = cur.field(2)? as u16;
    let depth = cur.field(2)? as u16;
    cur.advance(2); // split percent, merge percent
    let root_addr = cur.field(offset_size)?;
    let root_node_nrec = cur.field(2)? as u16;
    cur.advance(length_size as u64); // root all_nrec
    let _checksum = cur.field(4)?;

    if node_size == 0 {
        return Err(H5CoroError::Parse("v2 b-tree header has zero node size"));
    }

    Ok(Header {
        node_size,
        rrec_size,
        depth,
        root_addr,
        root_node_nrec,
    })
}

/// Per-depth record capacity, indexed `[0] = leaf, [1..=depth] = internal`
/// levels. `cum_max_nrec_size` is the
/// byte width of a child pointer's "total records beneath it" field; it is
/// zero at `[0]` since leaves have no children.
struct NodeInfo {
    cum_max_nrec_size: u8,
}

fn compute_node_info(node_size: u32, rrec_size: u16, depth: u16, offset_size: usize) -> (Vec<NodeInfo>, u8) {
    let leaf_max_nrec = ((node_size as u64 - METADATA_PREFIX_SIZE) / rrec_size as u64) as u32;
    let max_nrec_size = bytes_needed(leaf_max_nrec as u64);

    let mut table = Vec::with_capacity(depth as usize + 1);
    table.push(NodeInfo { cum_max_nrec_size: 0 });

    let mut cum_max_nrec = leaf_max_nrec as u64;
    for u in 1..=depth {
        let prev_cum_size = table[(u - 1) as usize].cum_max_nrec_size;
        let ptr_size = offset_size as u64 + max_nrec_size as u64 + prev_cum_size as u64;
        let max_nrec =
            ((node_size as u64 - (METADATA_PREFIX_SIZE + ptr_size)) / (rrec_size as u64 + ptr_size)) as u32;
        cum_max_nrec = ((max_nrec as u64 + 1) * cum_max_nrec) + max_nrec as u64;
        table.push(NodeInfo {
            cum_max_nrec_size: bytes_needed(cum_max_nrec),
        });
    }

    (table, max_nrec_size)
}

/// A decoded type-8 record: an attribute's fractal-heap ID and the hash
/// of its name, which is all a name lookup needs (the record's `flags`
/// and `corder` fields go unused here).
struct Record {
    heap_id: [u8; 8],
    hash: u32,
}

fn decode_record(raw: &[u8], rrec_size: usize) -> Record {
    let mut heap_id = [0u8; 8];
    heap_id.copy_from_slice(&raw[0..8]);
    let hash_at = rrec_size - 4;
    let hash = u32::from_le_bytes([raw[hash_at], raw[hash_at + 1], raw[hash_at + 2], raw[hash_at + 3]]);
    Record { heap_id, hash }
}

struct ChildPtr {
    addr: u64,
    node_nrec: u16,
}

fn read_leaf_records(ctx: &Context, addr: u64, nrec: u16, rrec_size: u16) -> Result<Vec<Record>> {
    let mut cur = Cursor::new(ctx, addr);
    let sig = cur.field(4)?;
    if sig as u32 != V2TREE_LEAF_SIGNATURE {
        return Err(H5CoroError::BadMagic("v2 b-tree leaf node"));
    }
    let version = cur.field(1)?;
    if version != 0 {
        return Err(H5CoroError::UnsupportedVersion {
            what: "v2 b-tree leaf node",
            version: version as u32,
        });
    }
    let record_type = cur.field(1)? as u8;
    if record_type != ATTR_DENSE_NAME_RECORD_TYPE {
        return Err(H5CoroError::Unsupported("v2 b-tree leaf record type other than indexed attribute names"));
    }

    let mut records = Vec::with_capacity(nrec as usize);
    for _ in 0..nrec {
        let raw = cur.bytes(rrec_size as usize)?;
        records.push(decode_record(&raw, rrec_size as usize));
    }
    Ok(records)
}

#[allow(clippy::too_many_arguments)]
fn read_internal_node(
    ctx: &Context,
    addr: u64,
    nrec: u16,
    rrec_size: u16,
    offset_size: usize,
    child_nrec_size: u8,
    child_cum_size: u8,
) -> Result<(Vec<Record>, Vec<ChildPtr>)> {
    let mut cur = Cursor::new(ctx, addr);
    let sig = cur.field(4)?;
    if sig as u32 != V2TREE_INTERNAL_SIGNATURE {
        return Err(H5CoroError::BadMagic("v2 b-tree internal node"));
    }
    let version = cur.field(1)?;
    if version != 0 {
        return Err(H5CoroError::UnsupportedVersion {
            what: "v2 b-tree internal node",
            version: version as u32,
        });
    }
    let record_type = cur.field(1)? as u8;
    if record_type != ATTR_DENSE_NAME_RECORD_TYPE {
        return Err(H5CoroError::Unsupported("v2 b-tree internal record type other than indexed attribute names"));
    }

    let mut records = Vec::with_capacity(nrec as usize);
    for _ in 0..nrec {
        let raw = cur.bytes(rrec_size as usize)?;
        records.push(decode_record(&raw, rrec_size as usize));
    }

    let mut children = Vec::with_capacity(nrec as usize + 1);
    for _ in 0..=nrec {
        let addr = cur.field(offset_size)?;
        let node_nrec = cur.varfield(child_nrec_size as usize)? as u16;
        cur.advance(child_cum_size as u64); // all_nrec, unused by a point lookup
        children.push(ChildPtr { addr, node_nrec });
    }

    Ok((records, children))
}

/// Binary search for `target` among `records`, sorted by hash (spec
/// §4.6.2). Returns the index of the last record compared and the sign of
/// that comparison: `0` means an exact match at that index, negative means
/// the target would sort before it, positive after.
fn locate(records: &[Record], target: u32) -> (usize, i32) {
    let mut lo = 0usize;
    let mut hi = records.len();
    let mut idx = 0usize;
    let mut cmp: i32 = -1;

    while lo < hi && cmp != 0 {
        idx = (lo + hi) / 2;
        cmp = target.cmp(&records[idx].hash) as i32;
        if cmp < 0 {
            hi = idx;
        } else {
            lo = idx + 1;
        }
    }
    (idx, cmp)
}

fn resolve(ctx: &Context, offset_size: usize, heap_info: &HeapInfo, heap_id: &[u8; 8]) -> Result<(u64, i64)> {
    let id = heap::parse_heap_id(heap_id, heap_info)?;
    let pos = heap::locate_managed_object(ctx, offset_size, heap_info, &id)?;
    Ok((pos, id.length as i64))
}

/// Look up `name` in the dense attribute index rooted at `btree_addr`,
/// whose managed objects live in the fractal heap at `heap_addr`.
/// Returns the attribute message's absolute position and byte length, or
/// `None` if no attribute with that name is indexed.
pub fn find_attribute(
    ctx: &Context,
    offset_size: usize,
    length_size: usize,
    heap_addr: u64,
    btree_addr: u64,
    name: &str,
) -> Result<Option<(u64, i64)>> {
    let header = read_header(ctx, offset_size, length_size, btree_addr)?;
    if header.root_node_nrec == 0 {
        return Ok(None);
    }

    let (node_info, max_nrec_size) =
        compute_node_info(header.node_size, header.rrec_size, header.depth, offset_size);
    let heap_info = heap::read_fractal_heap_header(ctx, offset_size, length_size, heap_addr)?;
    let target = checksum_lookup3(name.as_bytes(), 0);

    let mut node_addr = header.root_addr;
    let mut node_nrec = header.root_node_nrec;
    let mut depth = header.depth;

    loop {
        if depth == 0 {
            let records = read_leaf_records(ctx, node_addr, node_nrec, header.rrec_size)?;
            let (idx, cmp) = locate(&records, target);
            return if cmp == 0 {
                resolve(ctx, offset_size, &heap_info, &records[idx].heap_id).map(Some)
            } else {
                Ok(None)
            };
        }

        let child_cum_size = node_info[(depth - 1) as usize].cum_max_nrec_size;
        let (records, children) = read_internal_node(
            ctx,
            node_addr,
            node_nrec,
            header.rrec_size,
            offset_size,
            max_nrec_size,
            child_cum_size,
        )?;

        let (idx, cmp) = locate(&records, target);
        if cmp == 0 {
            return resolve(ctx, offset_size, &heap_info, &records[idx].heap_id).map(Some);
        }

        let child_idx = if cmp > 0 { idx + 1 } else { idx };
        let child = children
            .get(child_idx)
            .ok_or(H5CoroError::Parse("v2 b-tree internal node pointer out of range"))?;
        node_addr = child.addr;
        node_nrec = child.node_nrec;
        depth -= 1;
    }
}
