//! Object header walk and group path resolution, combined into one module
//! because they interleave: a Link message found while walking one object
//! header's messages can itself trigger descent into another object header,
//! so "parse this header's messages" and "resolve the next path segment"
//! are one recursive function, not two.

use crate::error::{H5CoroError, Result};
use crate::h5::btree1::{read_group_btree_v1, read_local_heap_name};
use crate::h5::codec::Cursor;
use crate::h5::context::Context;
use crate::h5::dataset::{
    DatasetMeta, FillValue, Layout, MsgType, TypeClass, ATTR_CREATION_TRACK_BIT, FILE_STATS_BIT,
    MAX_NDIMS, NUM_FILTERS, OHDR_SIGNATURE, SIZE_OF_CHUNK_0_MASK, STORE_CHANGE_PHASE_BIT,
};
use crate::h5::heap::read_fractal_heap;
use crate::h5::superblock::FileLayout;

const LINK_NAME_LEN_SIZE_MASK: u8 = 0x03;
const LINK_CREATION_ORDER_PRESENT_BIT: u8 = 0x04;
const LINK_TYPE_PRESENT_BIT: u8 = 0x08;
const LINK_CHAR_SET_PRESENT_BIT: u8 = 0x10;

/// Running state threaded through the recursive header walk: the path
/// segments still to resolve, and the metadata record being filled in as
/// messages are encountered at the final (dataset) object header.
struct ParseState<'a> {
    ctx: &'a Context,
    layout: FileLayout,
    path: Vec<String>,
    meta: DatasetMeta,
}

/// Resolve `url` (a `/`-separated path) against the root group found in
/// `layout`, returning the dataset's parsed metadata.
pub fn parse_dataset(ctx: &Context, layout: FileLayout, url: &str) -> Result<DatasetMeta> {
    let path: Vec<String> = url
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect();
    if path.is_empty() {
        return Err(H5CoroError::NotFound(url.to_string()));
    }

    let mut state = ParseState {
        ctx,
        layout,
        path,
        meta: DatasetMeta {
            url: url.to_string(),
            offsetsize: layout.offset_size,
            lengthsize: layout.length_size,
            ..Default::default()
        },
    };

    read_obj_hdr(&mut state, layout.root_group_address, 0)?;

    if state.meta.address == 0 && !matches!(state.meta.layout, Layout::Compact) {
        return Err(H5CoroError::NotFound(state.meta.url.clone()));
    }
    Ok(state.meta)
}

/// `dlvl` is how many path segments have already been matched (the
/// "highest data level" reached so far); messages belonging to a
/// descendant that has already been superseded are skipped.
fn read_obj_hdr(state: &mut ParseState, pos: u64, dlvl: usize) -> Result<()> {
    let sig = {
        let cur = Cursor::new(state.ctx, pos);
        cur.peek(4)?
    };
    let is_v2 = u32::from_le_bytes([sig[0], sig[1], sig[2], sig[3]]) == OHDR_SIGNATURE;
    if is_v2 {
        read_obj_hdr_v2(state, pos, dlvl)
    } else {
        read_obj_hdr_v1(state, pos, dlvl)
    }
}

fn read_obj_hdr_v1(state: &mut ParseState, pos: u64, dlvl: usize) -> Result<()> {
    let mut cur = Cursor::new(state.ctx, pos);
    let version = cur.field(1)?;
    if version != 1 {
        return Err(H5CoroError::UnsupportedVersion {
            what: "object header v1",
            version: version as u32,
        });
    }
    cur.advance(1); // reserved
    let num_messages = cur.field(2)?;
    let _obj_ref_count = cur.field(4)?;
    let obj_hdr_size = cur.field(4)?;
    // header proper is padded to an 8-byte boundary before messages start
    cur.seek(cur.pos().div_ceil(8) * 8);

    read_messages_v1(state, cur.pos(), obj_hdr_size, num_messages, dlvl)
}

fn read_messages_v1(
    state: &mut ParseState,
    mut pos: u64,
    chunk_size: u64,
    num_messages: u64,
    dlvl: usize,
) -> Result<()> {
    let end = pos + chunk_size;
    let mut messages_read = 0u64;
    let mut continuations = Vec::new();

    while messages_read < num_messages && pos < end {
        let mut cur = Cursor::new(state.ctx, pos);
        let msg_type_code = cur.field(2)?;
        let msg_size = cur.field(2)? as u64;
        let _flags = cur.field(1)?;
        cur.advance(3); // reserved
        let data_pos = cur.pos();

        if let Some(msg_type) = MsgType::from_code(msg_type_code as u16) {
            if msg_type == MsgType::HeaderCont {
                let (cont_pos, cont_len) = read_header_cont_msg(state, data_pos)?;
                continuations.push((cont_pos, cont_len));
            } else {
                dispatch_message(state, msg_type, data_pos, msg_size as i64, dlvl)?;
            }
        }

        pos = data_pos + msg_size;
        messages_read += 1;
    }

    for (cont_pos, cont_len) in continuations {
        // continuation blocks in v1 headers carry no signature of their own,
        // just more messages; the count is unknown so read until exhausted.
        read_messages_v1(state, cont_pos, cont_len, u64::MAX, dlvl)?;
    }
    Ok(())
}

fn read_obj_hdr_v2(state: &mut ParseState, pos: u64, dlvl: usize) -> Result<()> {
    let mut cur = Cursor::new(state.ctx, pos);
    let sig = cur.field(4)?;
    if sig as u32 != OHDR_SIGNATURE {
        return Err(H5CoroError::BadMagic("object header v2"));
    }
    let version = cur.field(1)?;
    if version != 2 {
        return Err(H5CoroError::UnsupportedVersion {
            what: "object header v2",
            version: version as u32,
        });
    }
    let flags = cur.field(1)? as u8;

    if flags & 0x20 != 0 {
        cur.advance(16); // access/mod/change/birth times
    }
    if flags & 0x10 != 0 {
        cur.advance(4); // max compact / min dense attrs
    }

    let chunk0_size_len = match flags & SIZE_OF_CHUNK_0_MASK {
        0 => 1,
        1 => 2,
        2 => 4,
        _ => 8,
    };
    let chunk0_size = cur.field(chunk0_size_len)?;

    let creation_order_tracked = flags & ATTR_CREATION_TRACK_BIT != 0;
    let _store_change_phase = flags & STORE_CHANGE_PHASE_BIT != 0;
    let _file_stats = flags & FILE_STATS_BIT != 0;

    read_messages_v2(state, cur.pos(), chunk0_size, creation_order_tracked, dlvl)
}

fn read_messages_v2(
    state: &mut ParseState,
    mut pos: u64,
    chunk_size: u64,
    creation_order_tracked: bool,
    dlvl: usize,
) -> Result<()> {
    let end = pos + chunk_size - 4; // trailing checksum
    let mut continuations = Vec::new();

    while pos < end {
        let mut cur = Cursor::new(state.ctx, pos);
        let msg_type_code = cur.field(1)?;
        let msg_size = cur.field(2)? as u64;
        let _flags = cur.field(1)?;
        if creation_order_tracked {
            cur.advance(2);
        }
        let data_pos = cur.pos();

        if msg_type_code == 0 && msg_size == 0 {
            break;
        }

        if let Some(msg_type) = MsgType::from_code(msg_type_code as u16) {
            if msg_type == MsgType::HeaderCont {
                let (cont_pos, cont_len) = read_header_cont_msg(state, data_pos)?;
                continuations.push((cont_pos, cont_len));
            } else {
                dispatch_message(state, msg_type, data_pos, msg_size as i64, dlvl)?;
            }
        }

        pos = data_pos + msg_size;
    }

    for (cont_pos, cont_len) in continuations {
        // v2 continuation blocks carry their own OCHK signature+checksum.
        let mut cur = Cursor::new(state.ctx, cont_pos);
        let sig = cur.field(4)?;
        if sig as u32 != crate::h5::dataset::OCHK_SIGNATURE {
            return Err(H5CoroError::BadMagic("object header continuation v2"));
        }
        read_messages_v2(state, cur.pos(), cont_len - 4, creation_order_tracked, dlvl)?;
    }
    Ok(())
}

fn read_header_cont_msg(state: &mut ParseState, pos: u64) -> Result<(u64, u64)> {
    let mut cur = Cursor::new(state.ctx, pos);
    let cont_offset = cur.field(state.layout.offset_size)?;
    let cont_length = cur.field(state.layout.length_size)?;
    Ok((cont_offset, cont_length))
}

/// Returns the number of message-body bytes consumed, needed by the
/// fractal-heap direct-block walk which has no outer message-size field.
fn dispatch_message(
    state: &mut ParseState,
    msg_type: MsgType,
    pos: u64,
    size: i64,
    dlvl: usize,
) -> Result<i64> {
    match msg_type {
        MsgType::Dataspace => read_dataspace_msg(state, pos),
        MsgType::LinkInfo => read_link_info_msg(state, pos, dlvl),
        MsgType::Datatype => read_datatype_msg(state, pos),
        MsgType::FillValue => read_fill_value_msg(state, pos, size),
        MsgType::Link => read_link_msg(state, pos, dlvl),
        MsgType::DataLayout => read_data_layout_msg(state, pos),
        MsgType::Filter => read_filter_msg(state, pos),
        MsgType::Attribute => read_attribute_msg(state, pos, size, dlvl),
        MsgType::AttributeInfo => read_attribute_info_msg(state, pos, dlvl),
        MsgType::SymbolTable => read_symbol_table_msg(state, pos, dlvl),
        MsgType::HeaderCont => unreachable!("handled by caller"),
    }
}

fn read_dataspace_msg(state: &mut ParseState, pos: u64) -> Result<i64> {
    let mut cur = Cursor::new(state.ctx, pos);
    let start = cur.pos();
    let version = cur.field(1)?;
    let dimensionality = cur.field(1)? as usize;
    let flags = cur.field(1)?;
    if version == 1 {
        cur.advance(5); // reserved
    } else {
        cur.advance(1); // type
    }

    if dimensionality > MAX_NDIMS {
        return Err(H5CoroError::Unsupported("dataspace rank exceeds MAX_NDIMS"));
    }
    state.meta.ndims = dimensionality;

    let mut elements: u64 = 1;
    for d in 0..dimensionality {
        let dim = cur.field(state.layout.length_size)?;
        state.meta.dimensions[d] = dim;
        elements *= dim.max(1);
    }
    if flags & 0x1 != 0 {
        cur.advance(state.layout.length_size as u64 * dimensionality as u64); // max dims
    }
    let _ = elements;
    let _ = start;
    Ok(cur.pos() as i64 - pos as i64)
}

fn read_datatype_msg(state: &mut ParseState, pos: u64) -> Result<i64> {
    let mut cur = Cursor::new(state.ctx, pos);
    let class_and_version = cur.field(1)?;
    let version = (class_and_version >> 4) & 0x0F;
    if version != 1 {
        return Err(H5CoroError::UnsupportedVersion {
            what: "datatype message",
            version: version as u32,
        });
    }
    let class_code = (class_and_version & 0x0F) as u8;
    let type_class = TypeClass::from_code(class_code);
    let bit_field0 = cur.field(1)?;
    cur.advance(2); // bit fields 8-23
    let size = cur.field(4)? as usize;

    state.meta.type_class = type_class;
    state.meta.typesize = size;
    state.meta.elementsize = size;
    if type_class == TypeClass::FixedPoint {
        state.meta.signed_val = bit_field0 & 0x08 != 0;
    }
    Ok(cur.pos() as i64 - pos as i64)
}

fn read_fill_value_msg(state: &mut ParseState, pos: u64, size: i64) -> Result<i64> {
    let mut cur = Cursor::new(state.ctx, pos);
    let version = cur.field(1)?;
    if version != 2 && version != 3 {
        return Err(H5CoroError::UnsupportedVersion {
            what: "fill value message",
            version: version as u32,
        });
    }
    let fill_defined;
    if version == 2 {
        cur.advance(2); // space alloc time, fill write time
        fill_defined = cur.field(1)? != 0;
    } else {
        let flags = cur.field(1)?;
        fill_defined = flags & 0x20 != 0;
    }

    if fill_defined {
        let value_size = cur.field(4)? as usize;
        if value_size > 0 {
            let bytes = cur.bytes(value_size)?;
            state.meta.fill = FillValue { bytes };
        }
    }
    Ok(size.max(cur.pos() as i64 - pos as i64))
}

fn read_link_msg(state: &mut ParseState, pos: u64, dlvl: usize) -> Result<i64> {
    let mut cur = Cursor::new(state.ctx, pos);
    let version = cur.field(1)?;
    if version != 1 {
        return Err(H5CoroError::UnsupportedVersion {
            what: "link message",
            version: version as u32,
        });
    }
    let flags = cur.field(1)? as u8;

    let link_type = if flags & LINK_TYPE_PRESENT_BIT != 0 {
        cur.field(1)?
    } else {
        0
    };
    if flags & LINK_CREATION_ORDER_PRESENT_BIT != 0 {
        cur.advance(8);
    }
    if flags & LINK_CHAR_SET_PRESENT_BIT != 0 {
        cur.advance(1);
    }

    let name_len_size = match flags & LINK_NAME_LEN_SIZE_MASK {
        0 => 1,
        1 => 2,
        2 => 4,
        _ => 8,
    };
    let name_len = cur.field(name_len_size)? as usize;
    let name = String::from_utf8_lossy(&cur.bytes(name_len)?).into_owned();

    if link_type != 0 {
        return Ok(cur.pos() as i64 - pos as i64); // soft/external links unsupported
    }
    let target_addr = cur.field(state.layout.offset_size)?;

    maybe_descend(state, &name, target_addr, dlvl)?;
    Ok(cur.pos() as i64 - pos as i64)
}

fn maybe_descend(state: &mut ParseState, name: &str, target_addr: u64, dlvl: usize) -> Result<()> {
    if dlvl < state.path.len() && state.path[dlvl] == name {
        if dlvl + 1 == state.path.len() {
            state.meta.address = target_addr;
        }
        read_obj_hdr(state, target_addr, dlvl + 1)?;
    }
    Ok(())
}

fn read_link_info_msg(state: &mut ParseState, pos: u64, dlvl: usize) -> Result<i64> {
    let mut cur = Cursor::new(state.ctx, pos);
    let _version = cur.field(1)?;
    let flags = cur.field(1)?;
    if flags & 0x1 != 0 {
        cur.advance(8); // max creation index
    }
    let fractal_heap_addr = cur.field(state.layout.offset_size)?;
    let name_index_btree_addr = cur.field(state.layout.offset_size)?;
    if flags & 0x2 != 0 {
        cur.advance(state.layout.offset_size as u64); // creation order index btree
    }

    if fractal_heap_addr != u64::MAX && name_index_btree_addr != u64::MAX {
        let layout = state.layout;
        let path = state.path.clone();
        let mut found: Option<(String, u64)> = None;
        {
            let target = path.get(dlvl).cloned();
            let mut on_message = |ctx: &Context, _mt: MsgType, mpos: u64, left: i64| -> Result<i64> {
                let (name, addr, consumed) = read_link_msg_body(ctx, layout, mpos)?;
                if found.is_none() {
                    if let Some(t) = &target {
                        if *t == name {
                            found = Some((name, addr));
                        }
                    }
                }
                Ok(consumed.min(left))
            };
            read_fractal_heap(
                state.ctx,
                state.layout.offset_size,
                state.layout.length_size,
                fractal_heap_addr,
                MsgType::Link,
                &mut on_message,
            )?;
        }
        if let Some((name, addr)) = found {
            maybe_descend(state, &name, addr, dlvl)?;
        }
    }
    Ok(cur.pos() as i64 - pos as i64)
}

/// Parse a link message body directly (no outer object-header message
/// wrapper), as stored inside a fractal heap's dense-link direct blocks.
fn read_link_msg_body(ctx: &Context, layout: FileLayout, pos: u64) -> Result<(String, u64, i64)> {
    let mut cur = Cursor::new(ctx, pos);
    let _version = cur.field(1)?;
    let flags = cur.field(1)? as u8;

    let link_type = if flags & LINK_TYPE_PRESENT_BIT != 0 {
        cur.field(1)?
    } else {
        0
    };
    if flags & LINK_CREATION_ORDER_PRESENT_BIT != 0 {
        cur.advance(8);
    }
    if flags & LINK_CHAR_SET_PRESENT_BIT != 0 {
        cur.advance(1);
    }
    let name_len_size = match flags & LINK_NAME_LEN_SIZE_MASK {
        0 => 1,
        1 => 2,
        2 => 4,
        _ => 8,
    };
    let name_len = cur.field(name_len_size)? as usize;
    let name = String::from_utf8_lossy(&cur.bytes(name_len)?).into_owned();
    let target_addr = if link_type == 0 {
        cur.field(layout.offset_size)?
    } else {
        0
    };
    Ok((name, target_addr, cur.pos() as i64 - pos as i64))
}

fn read_data_layout_msg(state: &mut ParseState, pos: u64) -> Result<i64> {
    let mut cur = Cursor::new(state.ctx, pos);
    let version = cur.field(1)?;
    if version != 3 {
        return Err(H5CoroError::UnsupportedVersion {
            what: "data layout message",
            version: version as u32,
        });
    }
    let layout_class = cur.field(1)? as u8;
    state.meta.layout = Layout::from_code(layout_class);

    match state.meta.layout {
        Layout::Compact => {
            let size = cur.field(2)? as i64;
            state.meta.address = cur.pos();
            state.meta.size = size;
            cur.advance(size as u64);
        }
        Layout::Contiguous => {
            state.meta.address = cur.field(state.layout.offset_size)?;
            state.meta.size = cur.field(state.layout.length_size)? as i64;
        }
        Layout::Chunked => {
            let chunk_ndims = cur.field(1)? as usize;
            state.meta.address = cur.field(state.layout.offset_size)?;
            let mut chunk_elements: u64 = 1;
            for d in 0..chunk_ndims.saturating_sub(1) {
                let dim = cur.field(4)?;
                state.meta.chunk_dims[d] = dim;
                chunk_elements *= dim.max(1);
            }
            let _elem_size = cur.field(4)?; // last "dimension" is the element size
            state.meta.chunk_elements = chunk_elements;
        }
        Layout::Unknown => {
            return Err(H5CoroError::Unsupported("unknown data layout class"));
        }
    }
    Ok(cur.pos() as i64 - pos as i64)
}

fn read_filter_msg(state: &mut ParseState, pos: u64) -> Result<i64> {
    let mut cur = Cursor::new(state.ctx, pos);
    let version = cur.field(1)?;
    let num_filters = cur.field(1)? as usize;
    if version == 1 {
        cur.advance(6); // reserved
    }

    for _ in 0..num_filters {
        let id = cur.field(2)?;
        let name_len = if version == 1 || id >= 256 {
            cur.field(2)? as usize
        } else {
            0
        };
        cur.advance(2); // flags
        let num_values = cur.field(2)? as usize;
        if name_len > 0 {
            cur.advance(name_len as u64);
        }
        for _ in 0..num_values {
            cur.advance(4);
        }
        if version == 1 && num_values % 2 != 0 {
            cur.advance(4); // padding
        }

        let filter = crate::h5::dataset::Filter::from_code(id as u16);
        if filter != crate::h5::dataset::Filter::Invalid {
            state.meta.filters[filter as usize] = true;
        }
    }
    Ok(cur.pos() as i64 - pos as i64)
}

fn round_up_8(n: usize) -> u64 {
    (n as u64).div_ceil(8) * 8
}

/// Parse an attribute message in place: an attribute is stored as a
/// name/datatype/dataspace triplet followed by its value, directly in the
/// owning object's header rather than as a separate object. A match against
/// the final path segment repurposes [`DatasetMeta`] to describe the
/// attribute's value instead of the dataset's — the same trick
/// [`read_data_layout_msg`] plays for `Contiguous` datasets, since an
/// attribute's value is always stored contiguously.
fn read_attribute_msg(state: &mut ParseState, pos: u64, size: i64, dlvl: usize) -> Result<i64> {
    let mut cur = Cursor::new(state.ctx, pos);
    let version = cur.field(1)?;
    if version != 1 && version != 3 {
        return Err(H5CoroError::UnsupportedVersion {
            what: "attribute message",
            version: version as u32,
        });
    }

    cur.advance(1); // reserved (v1) / flags (v3)
    let name_size = cur.field(2)? as usize;
    let datatype_size = cur.field(2)? as usize;
    let dataspace_size = cur.field(2)? as usize;
    if version == 3 {
        cur.advance(1); // character encoding
    }

    let name_start = cur.pos();
    let name_bytes = cur.bytes(name_size)?;
    let nul_at = name_bytes.iter().position(|&b| b == 0).unwrap_or(name_bytes.len());
    let name = String::from_utf8_lossy(&name_bytes[..nul_at]).into_owned();
    cur.seek(if version == 1 {
        name_start + round_up_8(name_size)
    } else {
        name_start + name_size as u64
    });

    if dlvl >= state.path.len() || state.path[dlvl] != name {
        return Ok(size);
    }

    let datatype_start = cur.pos();
    read_datatype_msg(state, datatype_start)?;
    cur.seek(if version == 1 {
        datatype_start + round_up_8(datatype_size)
    } else {
        datatype_start + datatype_size as u64
    });

    let dataspace_start = cur.pos();
    read_dataspace_msg(state, dataspace_start)?;
    cur.seek(if version == 1 {
        dataspace_start + round_up_8(dataspace_size)
    } else {
        dataspace_start + dataspace_size as u64
    });

    let elements: u64 = if state.meta.ndims == 0 {
        1
    } else {
        state.meta.dimensions[..state.meta.ndims].iter().map(|d| d.max(1)).product()
    };

    state.meta.layout = Layout::Contiguous;
    state.meta.filters = [false; NUM_FILTERS];
    state.meta.address = cur.pos();
    state.meta.size = (state.meta.typesize as u64 * elements) as i64;

    Ok(size)
}

/// Parse an attribute-info message and, if the object carries a dense
/// (indexed) attribute set, look up the final path segment in its v2
/// B-tree. Skips the linear fractal-heap scan a reference implementation
/// would fall back to when the b-tree lookup misses, keeping a lookup to
/// the single-block path the index is there to provide.
fn read_attribute_info_msg(state: &mut ParseState, pos: u64, dlvl: usize) -> Result<i64> {
    let mut cur = Cursor::new(state.ctx, pos);
    let version = cur.field(1)?;
    if version != 0 {
        return Err(H5CoroError::UnsupportedVersion {
            what: "attribute info message",
            version: version as u32,
        });
    }
    let flags = cur.field(1)?;
    if flags & 0x1 != 0 {
        cur.advance(2); // max creation index
    }
    let heap_addr = cur.field(state.layout.offset_size)?;
    let name_bt2_addr = cur.field(state.layout.offset_size)?;
    if flags & 0x2 != 0 {
        cur.advance(state.layout.offset_size as u64); // creation order v2 b-tree
    }

    if heap_addr != u64::MAX && name_bt2_addr != u64::MAX {
        if let Some(name) = state.path.get(dlvl).cloned() {
            let found = crate::h5::btree2::find_attribute(
                state.ctx,
                state.layout.offset_size,
                state.layout.length_size,
                heap_addr,
                name_bt2_addr,
                &name,
            )?;
            if let Some((msg_pos, msg_len)) = found {
                read_attribute_msg(state, msg_pos, msg_len, dlvl)?;
            }
        }
    }
    Ok(cur.pos() as i64 - pos as i64)
}

fn read_symbol_table_msg(state: &mut ParseState, pos: u64, dlvl: usize) -> Result<i64> {
    let mut cur = Cursor::new(state.ctx, pos);
    let btree_addr = cur.field(state.layout.offset_size)?;
    let heap_addr = cur.field(state.layout.offset_size)?;

    let target = state.path.get(dlvl).cloned();
    if let Some(name) = target {
        if let Some((link_name_offset, obj_header_addr)) =
            read_group_btree_v1(state.ctx, state.layout, btree_addr, heap_addr, &name)?
        {
            let resolved_name = read_local_heap_name(state.ctx, heap_addr, link_name_offset)?;
            if resolved_name == name {
                maybe_descend(state, &resolved_name, obj_header_addr, dlvl)?;
            }
        }
    }
    Ok(cur.pos() as i64 - pos as i64)
}
