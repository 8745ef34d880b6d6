//! Fractal heap: doubling-table block walk and heap-ID dereference.
//!
//! Message parsing inside a direct block's payload is supplied by the
//! caller as a closure rather than called back into the object-header
//! parser directly, keeping this module independent of [`crate::h5::objheader`].

use crate::error::{H5CoroError, Result};
use crate::h5::codec::Cursor;
use crate::h5::context::Context;
use crate::h5::dataset::{FHDB_SIGNATURE, FHIB_SIGNATURE, FRHP_SIGNATURE, MsgType};

const FRHP_CHECKSUM_DIRECT_BLOCKS: u8 = 0x02;

/// Parsed heap header needed to walk blocks and dereference heap IDs.
#[derive(Debug, Clone, Copy)]
pub struct HeapInfo {
    pub table_width: u16,
    pub curr_num_rows: u16,
    pub starting_blk_size: u64,
    pub max_dblk_size: u64,
    pub blk_offset_size: usize,
    pub dblk_checksum: bool,
    pub root_blk_addr: u64,
    pub max_heap_size: u16,
    pub heap_off_size: usize,
    pub heap_len_size: usize,
}

pub(crate) fn highest_bit(mut value: u64) -> u32 {
    let mut bit = 0u32;
    value >>= 1;
    while value != 0 {
        bit += 1;
        value >>= 1;
    }
    bit
}

/// `ceil(bits/8)`, used for the heap's offset-size field.
fn size_offset_bits(bits: u16) -> usize {
    ((bits as usize) + 7) / 8
}

pub type MessageReader<'a> =
    dyn FnMut(&Context, MsgType, u64, i64) -> Result<i64> + 'a;

/// Parse a fractal heap header at `pos`, without walking any of its blocks.
/// Shared by [`read_fractal_heap`] (which walks every block to enumerate
/// messages) and the heap-ID dereference path, which only ever needs to
/// walk the single chain of blocks leading to one
/// managed object.
pub fn read_fractal_heap_header(
    ctx: &Context,
    offset_size: usize,
    length_size: usize,
    pos: u64,
) -> Result<HeapInfo> {
    let mut cur = Cursor::new(ctx, pos);
    let sig = cur.field(4)?;
    if sig as u32 != FRHP_SIGNATURE {
        return Err(H5CoroError::BadMagic("fractal heap"));
    }
    let version = cur.field(1)?;
    if version != 0 {
        return Err(H5CoroError::UnsupportedVersion {
            what: "fractal heap",
            version: version as u32,
        });
    }

    let _heap_obj_id_len = cur.field(2)?;
    let io_filter_len = cur.field(2)?;
    let flags = cur.field(1)? as u8;
    let max_size_mg_obj = cur.field(4)?;
    let _next_huge_obj_id = cur.field(length_size)?;
    let _btree_addr_huge_obj = cur.field(offset_size)?;
    let _free_space_mg_blks = cur.field(length_size)?;
    let _addr_free_space_mg = cur.field(offset_size)?;
    let _mg_space = cur.field(length_size)?;
    let _alloc_mg_space = cur.field(length_size)?;
    let _dblk_alloc_iter = cur.field(length_size)?;
    let mg_objs = cur.field(length_size)?;
    let _huge_obj_size = cur.field(length_size)?;
    let _huge_objs = cur.field(length_size)?;
    let _tiny_obj_size = cur.field(length_size)?;
    let _tiny_objs = cur.field(length_size)?;
    let table_width = cur.field(2)? as u16;
    let starting_blk_size = cur.field(length_size)?;
    let max_dblk_size = cur.field(length_size)?;
    let max_heap_size = cur.field(2)? as u16;
    let _start_num_rows = cur.field(2)?;
    let root_blk_addr = cur.field(offset_size)?;
    let curr_num_rows = cur.field(2)? as u16;
    let _ = mg_objs;

    if io_filter_len > 0 {
        return Err(H5CoroError::Unsupported("filtering on fractal heap"));
    }

    let _checksum = cur.field(4)?;

    let heap_len_bits = (highest_bit(max_size_mg_obj) / 8) + 1;
    let heap_len_size = (max_dblk_size as u32).min(heap_len_bits) as usize;

    Ok(HeapInfo {
        table_width,
        curr_num_rows,
        starting_blk_size,
        max_dblk_size,
        blk_offset_size: size_offset_bits(max_heap_size),
        dblk_checksum: flags & FRHP_CHECKSUM_DIRECT_BLOCKS != 0,
        root_blk_addr,
        max_heap_size,
        heap_off_size: size_offset_bits(max_heap_size),
        heap_len_size,
    })
}

/// Parse a fractal heap header at `pos` and walk its blocks, invoking
/// `on_message` for each structural message its direct blocks carry
/// (typically Link or Attribute messages).
pub fn read_fractal_heap(
    ctx: &Context,
    offset_size: usize,
    length_size: usize,
    pos: u64,
    msg_type: MsgType,
    on_message: &mut MessageReader,
) -> Result<HeapInfo> {
    let info = read_fractal_heap_header(ctx, offset_size, length_size, pos)?;

    if info.curr_num_rows == 0 {
        read_direct_block(
            ctx,
            offset_size,
            &info,
            info.starting_blk_size,
            info.root_blk_addr,
            msg_type,
            on_message,
        )?;
    } else {
        read_indirect_block(
            ctx,
            offset_size,
            &info,
            0,
            info.root_blk_addr,
            msg_type,
            on_message,
        )?;
    }

    Ok(info)
}

fn read_direct_block(
    ctx: &Context,
    offset_size: usize,
    info: &HeapInfo,
    block_size: u64,
    pos: u64,
    msg_type: MsgType,
    on_message: &mut MessageReader,
) -> Result<()> {
    let mut cur = Cursor::new(ctx, pos);
    let sig = cur.field(4)?;
    if sig as u32 != FHDB_SIGNATURE {
        return Err(H5CoroError::BadMagic("fractal heap direct block"));
    }
    let version = cur.field(1)?;
    if version != 0 {
        return Err(H5CoroError::UnsupportedVersion {
            what: "fractal heap direct block",
            version: version as u32,
        });
    }

    cur.advance(offset_size as u64); // heap header address
    cur.advance(info.blk_offset_size as u64); // block offset
    if info.dblk_checksum {
        cur.advance(4);
    }

    let header_bytes = 5 + offset_size + info.blk_offset_size + if info.dblk_checksum { 4 } else { 0 };
    let mut data_left = block_size as i64 - header_bytes as i64;

    while data_left > 0 {
        let peek_size = (1usize << highest_bit(data_left as u64)).min(8);
        let peek = cur.peek(peek_size)?;
        if peek.iter().all(|&b| b == 0) {
            break;
        }

        let data_read = on_message(ctx, msg_type, cur.pos(), data_left)?;
        cur.advance(data_read as u64);
        data_left -= data_read;
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn read_indirect_block(
    ctx: &Context,
    offset_size: usize,
    info: &HeapInfo,
    block_size: u64,
    pos: u64,
    msg_type: MsgType,
    on_message: &mut MessageReader,
) -> Result<()> {
    let mut cur = Cursor::new(ctx, pos);
    let sig = cur.field(4)?;
    if sig as u32 != FHIB_SIGNATURE {
        return Err(H5CoroError::BadMagic("fractal heap indirect block"));
    }
    let version = cur.field(1)?;
    if version != 0 {
        return Err(H5CoroError::UnsupportedVersion {
            what: "fractal heap indirect block",
            version: version as u32,
        });
    }
    cur.advance(offset_size as u64);
    cur.advance(info.blk_offset_size as u64);

    let curr_size = info.starting_blk_size * info.table_width as u64;
    let nrows = if block_size > 0 {
        (highest_bit(block_size) as i64 - highest_bit(curr_size) as i64 + 1) as u32
    } else {
        info.curr_num_rows as u32
    };
    let max_dblock_rows = (highest_bit(info.max_dblk_size) as i64
        - highest_bit(info.starting_blk_size) as i64
        + 2) as u32;
    let k = nrows.min(max_dblock_rows) * info.table_width as u32;

    for row in 0..nrows {
        let row_block_size = if row == 0 || row == 1 {
            info.starting_blk_size
        } else {
            info.starting_blk_size * (2u64 << (row - 2))
        };

        for _entry in 0..info.table_width {
            if row_block_size <= info.max_dblk_size {
                let _ = k;
                let addr = cur.field(offset_size)?;
                if addr != u64::MAX {
                    read_direct_block(ctx, offset_size, info, row_block_size, addr, msg_type, on_message)?;
                }
            } else {
                let addr = cur.field(offset_size)?;
                if addr != u64::MAX {
                    read_indirect_block(ctx, offset_size, info, row_block_size, addr, msg_type, on_message)?;
                }
            }
        }
    }

    let _checksum = cur.field(4)?;
    Ok(())
}

const HEAP_ID_VERSION_MASK: u8 = 0xC0;
const HEAP_ID_TYPE_MASK: u8 = 0x30;
const HEAP_ID_TYPE_MANAGED: u8 = 0x00;
const HEAP_ID_TYPE_HUGE: u8 = 0x10;
const HEAP_ID_TYPE_TINY: u8 = 0x20;

/// A decoded managed-object heap ID: an in-heap offset and
/// byte length, both variable-width per [`HeapInfo::heap_off_size`] /
/// [`HeapInfo::heap_len_size`].
#[derive(Debug, Clone, Copy)]
pub struct HeapId {
    pub offset: u64,
    pub length: u64,
}

/// Decode a fractal-heap ID, rejecting anything but a managed object.
/// Huge and tiny objects store their bytes outside the
/// doubling table and are out of scope here.
pub fn parse_heap_id(id: &[u8], info: &HeapInfo) -> Result<HeapId> {
    let flags = id[0];
    if flags & HEAP_ID_VERSION_MASK != 0 {
        return Err(H5CoroError::UnsupportedVersion {
            what: "fractal heap id",
            version: ((flags & HEAP_ID_VERSION_MASK) >> 6) as u32,
        });
    }
    match flags & HEAP_ID_TYPE_MASK {
        HEAP_ID_TYPE_MANAGED => {
            let mut offset = 0u64;
            for (i, b) in id[1..1 + info.heap_off_size].iter().enumerate() {
                offset |= (*b as u64) << (8 * i);
            }
            let mut length = 0u64;
            let len_start = 1 + info.heap_off_size;
            for (i, b) in id[len_start..len_start + info.heap_len_size].iter().enumerate() {
                length |= (*b as u64) << (8 * i);
            }
            Ok(HeapId { offset, length })
        }
        HEAP_ID_TYPE_HUGE => Err(H5CoroError::Unsupported("huge fractal heap object")),
        HEAP_ID_TYPE_TINY => Err(H5CoroError::Unsupported("tiny fractal heap object")),
        _ => Err(H5CoroError::Unsupported("reserved fractal heap id type")),
    }
}

/// The doubling-table geometry derived from a heap header, used to map an
/// in-heap offset to a (row, column) position without walking every block.
struct DoublingTable {
    first_row_bits: u32,
    num_id_first_row: u64,
    max_direct_rows: u32,
    starting_blk_size: u64,
}

impl DoublingTable {
    fn from_heap(info: &HeapInfo) -> Self {
        let start_bits = highest_bit(info.starting_blk_size);
        let table_width_bits = highest_bit(info.table_width as u64);
        let first_row_bits = start_bits + table_width_bits;
        let max_direct_bits = highest_bit(info.max_dblk_size);
        Self {
            first_row_bits,
            num_id_first_row: info.starting_blk_size * info.table_width as u64,
            max_direct_rows: (max_direct_bits - start_bits) + 2,
            starting_blk_size: info.starting_blk_size,
        }
    }

    fn row_block_size(&self, row: u32) -> u64 {
        if row <= 1 {
            self.starting_blk_size
        } else {
            self.starting_blk_size << (row - 1)
        }
    }

    fn lookup(&self, off: u64) -> (u32, u32) {
        if off < self.num_id_first_row {
            (0, (off / self.starting_blk_size) as u32)
        } else {
            let high_bit = highest_bit(off);
            let off_mask = 1u64 << high_bit;
            let row = high_bit - self.first_row_bits + 1;
            let col = ((off - off_mask) / self.row_block_size(row)) as u32;
            (row, col)
        }
    }
}

/// Read one indirect block's child-address table, returning the addresses
/// in row-major (row, column) order along with the block's own `block_off`
/// field (needed once a direct block is reached, to compute the in-block
/// position of a managed object).
fn read_indirect_entries(
    ctx: &Context,
    offset_size: usize,
    info: &HeapInfo,
    dtable: &DoublingTable,
    nrows: u32,
    pos: u64,
) -> Result<(Vec<u64>, u64)> {
    let mut cur = Cursor::new(ctx, pos);
    let sig = cur.field(4)?;
    if sig as u32 != FHIB_SIGNATURE {
        return Err(H5CoroError::BadMagic("fractal heap indirect block"));
    }
    let version = cur.field(1)?;
    if version != 0 {
        return Err(H5CoroError::UnsupportedVersion {
            what: "fractal heap indirect block",
            version: version as u32,
        });
    }
    cur.advance(offset_size as u64);
    let block_off = cur.varfield(info.blk_offset_size)?;

    let mut entries = Vec::with_capacity((nrows * info.table_width as u32) as usize);
    for row in 0..nrows {
        let row_block_size = dtable.row_block_size(row);
        for _ in 0..info.table_width {
            let addr = cur.field(offset_size)?;
            entries.push(addr);
            let _ = row_block_size;
        }
    }

    Ok((entries, block_off))
}

/// Dereference a managed-object heap ID to its absolute file position.
/// Walks only the single chain of indirect blocks leading
/// to the owning direct block, never the whole heap.
pub fn locate_managed_object(ctx: &Context, offset_size: usize, info: &HeapInfo, id: &HeapId) -> Result<u64> {
    let dtable = DoublingTable::from_heap(info);

    let dblock_addr = if info.curr_num_rows == 0 {
        info.root_blk_addr
    } else {
        let mut iblock_addr = info.root_blk_addr;
        let mut nrows = info.curr_num_rows as u32;
        let (mut row, mut col) = dtable.lookup(id.offset);
        let mut rel_off = id.offset;

        loop {
            let (entries, block_off) = read_indirect_entries(ctx, offset_size, info, &dtable, nrows, iblock_addr)?;
            let entry = (row * info.table_width as u32 + col) as usize;
            let addr = *entries
                .get(entry)
                .ok_or(H5CoroError::Parse("fractal heap doubling table entry out of range"))?;
            if row < dtable.max_direct_rows {
                break addr;
            }
            if addr == u64::MAX {
                return Err(H5CoroError::NotFound("fractal heap managed object".to_string()));
            }
            iblock_addr = addr;
            nrows = highest_bit(dtable.row_block_size(row)) - dtable.first_row_bits + 1;
            rel_off -= block_off;
            let (r2, c2) = dtable.lookup(rel_off);
            row = r2;
            col = c2;
        }
    };

    if dblock_addr == u64::MAX {
        return Err(H5CoroError::NotFound("fractal heap managed object".to_string()));
    }

    let mut cur = Cursor::new(ctx, dblock_addr);
    let sig = cur.field(4)?;
    if sig as u32 != FHDB_SIGNATURE {
        return Err(H5CoroError::BadMagic("fractal heap direct block"));
    }
    let version = cur.field(1)?;
    if version != 0 {
        return Err(H5CoroError::UnsupportedVersion {
            what: "fractal heap direct block",
            version: version as u32,
        });
    }
    cur.advance(offset_size as u64);
    let dblock_off = cur.varfield(info.blk_offset_size)?;

    Ok(dblock_addr + (id.offset - dblock_off))
}
