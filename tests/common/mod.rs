//! Hand-rolled HDF5 byte-layout builders shared by the integration tests.
//!
//! These build the minimal subset of the format §4 parses: a v2 superblock,
//! v2 object headers with compact Link messages, Dataspace/Datatype/Data
//! Layout/Filter Pipeline messages, and a v1 chunk-index b-tree. Every field
//! width and ordering mirrors `src/h5/superblock.rs`, `src/h5/objheader.rs`,
//! and `src/h5/btree1.rs` exactly — this is a fixture generator, not a
//! general-purpose HDF5 writer.

#![allow(dead_code)]

pub const OFFSET_SIZE: usize = 8;
pub const LENGTH_SIZE: usize = 8;

/// A growable byte buffer with little-endian field helpers and support for
/// patching a forward reference (an address) once its target is known.
pub struct Builder {
    buf: Vec<u8>,
}

impl Builder {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn pos(&self) -> u64 {
        self.buf.len() as u64
    }

    pub fn bytes(&mut self, b: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(b);
        self
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn u16(&mut self, v: u16) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u64(&mut self, v: u64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    /// Little-endian field of `n` bytes (n <= 8), used for offset/length
    /// fields whose width is a runtime parameter in the real format.
    pub fn uN(&mut self, v: u64, n: usize) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes()[..n]);
        self
    }

    pub fn zeros(&mut self, n: usize) -> &mut Self {
        self.buf.extend(std::iter::repeat_n(0u8, n));
        self
    }

    /// Reserve an 8-byte slot to be patched later with a forward address;
    /// returns the slot's absolute byte position.
    pub fn placeholder_u64(&mut self) -> usize {
        let p = self.buf.len();
        self.u64(0);
        p
    }

    pub fn patch_u64(&mut self, at: usize, v: u64) {
        self.buf[at..at + 8].copy_from_slice(&v.to_le_bytes());
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }
}

/// One object-header v2 message: type code + size-prefixed body, no
/// creation-order field, no padding (matches `read_messages_v2`'s
/// no-creation-order-tracked path).
pub fn msg(type_code: u8, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.push(type_code);
    out.extend_from_slice(&(body.len() as u16).to_le_bytes());
    out.push(0); // flags
    out.extend_from_slice(body);
    out
}

/// Wrap concatenated messages in a v2 object header container. `flags = 0`
/// (no timestamps, no phase-change thresholds, no creation-order tracking),
/// so the chunk-0 size field is 1 byte wide — every fixture built here stays
/// under 256 bytes of messages.
pub fn obj_header_v2(messages: &[Vec<u8>]) -> Vec<u8> {
    let mut msgs_bytes = Vec::new();
    for m in messages {
        msgs_bytes.extend_from_slice(m);
    }
    let chunk0_size = msgs_bytes.len() + 4; // + trailing checksum
    assert!(chunk0_size <= 255, "fixture exceeds 1-byte chunk-0 size");

    let mut out = Builder::new();
    out.bytes(b"OHDR");
    out.u8(2); // version
    out.u8(0); // flags
    out.u8(chunk0_size as u8);
    out.bytes(&msgs_bytes);
    out.zeros(4); // checksum (unchecked by the parser)
    out.into_vec()
}

/// A compact Link message (message type 0x06) naming a hard link to
/// `target_addr`. Matches `read_link_msg`'s version-1, flags=0 layout:
/// 1-byte name-length field, no creation order, no char set.
pub fn link_message(name: &str, target_addr: u64) -> Vec<u8> {
    let mut body = Builder::new();
    body.u8(1); // version
    body.u8(0); // flags: 1-byte name-len field, hard link, no extras
    body.u8(name.len() as u8);
    body.bytes(name.as_bytes());
    body.u64(target_addr);
    msg(0x06, &body.into_vec())
}

/// A Dataspace message (type 0x01), version 1, simple (no max-dims).
pub fn dataspace_message(dims: &[u64]) -> Vec<u8> {
    let mut body = Builder::new();
    body.u8(1); // version
    body.u8(dims.len() as u8); // dimensionality
    body.u8(0); // flags: no max dims
    body.zeros(5); // reserved
    for &d in dims {
        body.uN(d, LENGTH_SIZE);
    }
    msg(0x01, &body.into_vec())
}

/// A Datatype message (type 0x03). `class` is the HDF5 datatype class code
/// (0 = fixed-point, 1 = floating-point, 3 = string).
pub fn datatype_message(class: u8, size: u32, signed: bool) -> Vec<u8> {
    let mut body = Builder::new();
    let bit0 = if signed { 0x08 } else { 0x00 };
    body.u8((1 << 4) | class); // version 1, class in low nibble
    body.u8(bit0);
    body.u16(0); // bit fields 8-23
    body.u32(size);
    msg(0x03, &body.into_vec())
}

/// A Data Layout message (type 0x08), contiguous storage.
pub fn data_layout_contiguous(address: u64, size: u64) -> Vec<u8> {
    let mut body = Builder::new();
    body.u8(3); // version
    body.u8(1); // layout class: contiguous
    body.uN(address, OFFSET_SIZE);
    body.uN(size, LENGTH_SIZE);
    msg(0x08, &body.into_vec())
}

/// A Data Layout message (type 0x08), chunked storage. `chunk_dims` is the
/// spatial chunk shape (the trailing element-size "dimension" is derived
/// from `elem_size` and appended automatically, matching real HDF5 files).
pub fn data_layout_chunked(btree_address: u64, chunk_dims: &[u64], elem_size: u32) -> Vec<u8> {
    let mut body = Builder::new();
    body.u8(3); // version
    body.u8(2); // layout class: chunked
    body.u8((chunk_dims.len() + 1) as u8); // chunk rank incl. element-size slot
    body.uN(btree_address, OFFSET_SIZE);
    for &d in chunk_dims {
        body.u32(d as u32);
    }
    body.u32(elem_size);
    msg(0x08, &body.into_vec())
}

/// A Filter Pipeline message (type 0x0B), version 1, a single unnamed
/// filter with no client values (deflate = id 1, shuffle = id 2).
pub fn filter_message(filter_ids: &[u16]) -> Vec<u8> {
    let mut body = Builder::new();
    body.u8(1); // version
    body.u8(filter_ids.len() as u8);
    body.zeros(6); // reserved
    for &id in filter_ids {
        body.u16(id);
        body.u16(0); // name length (none)
        body.u16(0); // flags
        body.u16(0); // num client values
    }
    msg(0x0B, &body.into_vec())
}

/// A v2 superblock followed by nothing else; returns the full byte vector
/// and the absolute position of the root-group object-header address slot
/// so the caller can patch it in once the root header's address is known.
pub fn superblock_v2() -> (Vec<u8>, usize) {
    let mut b = Builder::new();
    b.u64(h5_signature());
    b.u8(2); // version
    b.u8(OFFSET_SIZE as u8);
    b.u8(LENGTH_SIZE as u8);
    b.u8(0); // file consistency flags
    b.u64(0); // base address
    b.u64(u64::MAX); // superblock extension address (absent)
    b.u64(u64::MAX); // end-of-file address (unchecked by the parser)
    let root_patch = b.placeholder_u64();
    b.u32(0); // checksum (unchecked)
    (b.into_vec(), root_patch)
}

/// The `"\x89HDF\r\n\x1a\n"` signature as the little-endian u64 the parser
/// compares against.
pub fn h5_signature() -> u64 {
    0x0A1A_0A0D_4644_4889
}

/// One chunk-index b-tree leaf entry: `(chunk_size, filter_mask, offset,
/// addr)` laid out exactly as `collect_chunk_node` reads it for a 1-D
/// dataset (key = chunk_size, filter_mask, two 8-byte offset slots — the
/// spatial offset and the trailing element-size slot — then the child
/// address).
pub fn chunk_btree_v1_leaf(entries: &[(u32, u64, u64)]) -> Vec<u8> {
    let mut b = Builder::new();
    b.bytes(b"TREE");
    b.u8(1); // node type: chunk index
    b.u8(0); // node level: leaf
    b.u16(entries.len() as u16);
    b.uN(u64::MAX, OFFSET_SIZE); // left sibling (absent)
    b.uN(u64::MAX, OFFSET_SIZE); // right sibling (absent)
    for &(chunk_size, offset, addr) in entries {
        b.u32(chunk_size);
        b.u32(0); // filter mask
        b.u64(offset); // spatial offset (dim 0)
        b.u64(0); // element-size slot (unused by the 1-D reader)
        b.uN(addr, OFFSET_SIZE);
    }
    b.into_vec()
}

/// A local heap's header (fixed 32 bytes: sig + version + reserved +
/// dataseg-size + freelist-offset + dataseg-addr) followed by a data
/// segment packing each of `names` as a NUL-terminated string.
/// `heap_addr` is the heap's own absolute file position, needed because
/// the header's `dataseg_addr` field is itself an absolute address
/// (`heap_addr + 32`). Returns the heap's bytes and each name's offset
/// into the data segment, matching what `read_local_heap_name` expects.
pub fn local_heap(heap_addr: u64, names: &[&str]) -> (Vec<u8>, Vec<u64>) {
    let mut dataseg = Vec::new();
    let mut offsets = Vec::new();
    for name in names {
        offsets.push(dataseg.len() as u64);
        dataseg.extend_from_slice(name.as_bytes());
        dataseg.push(0);
    }
    let mut b = Builder::new();
    b.bytes(b"HEAP");
    b.u8(1); // version
    b.zeros(3); // reserved
    b.u64(dataseg.len() as u64); // data segment size
    b.u64(0); // free list offset
    b.u64(heap_addr + 32); // data segment address
    b.bytes(&dataseg);
    (b.into_vec(), offsets)
}

/// A v1-style symbol-table node (`SNOD`): `(link-name-heap-offset,
/// object-header-address)` pairs, matching `read_symbol_table_node`'s
/// fixed 40-byte-per-entry layout.
pub fn symbol_table_node(entries: &[(u64, u64)]) -> Vec<u8> {
    let mut b = Builder::new();
    b.bytes(b"SNOD");
    b.u8(1); // version
    b.u8(0); // reserved
    b.u16(entries.len() as u16);
    for &(name_offset, obj_header_addr) in entries {
        b.uN(name_offset, LENGTH_SIZE);
        b.uN(obj_header_addr, OFFSET_SIZE);
        b.u32(0); // cache type
        b.u32(0); // reserved
        b.zeros(16); // scratch pad
    }
    b.into_vec()
}

/// A leaf-level v1 group b-tree node with one `(key, child-addr)` entry
/// per symbol-table-node child (the key value itself is never compared by
/// `read_group_node`'s leaf-level walk, only the child it indexes).
pub fn group_btree_v1_leaf(entries: &[u64]) -> Vec<u8> {
    let mut b = Builder::new();
    b.bytes(b"TREE");
    b.u8(0); // node type: group
    b.u8(0); // node level: leaf
    b.u16(entries.len() as u16);
    b.uN(u64::MAX, OFFSET_SIZE); // left sibling
    b.uN(u64::MAX, OFFSET_SIZE); // right sibling
    for &child_addr in entries {
        b.uN(0, LENGTH_SIZE); // key (unused)
        b.uN(child_addr, OFFSET_SIZE);
    }
    b.into_vec()
}

/// Build a complete one-dataset file whose root group is a v1-style
/// symbol-table group (local heap + group b-tree + symbol-table node)
/// instead of the compact Link message [`build_file_with_trailer`] uses —
/// exercises `read_symbol_table_msg`'s b-tree/local-heap walk end to end.
pub fn build_file_with_symbol_table_group(
    dataset_name: &str,
    make_messages: impl Fn(u64) -> Vec<Vec<u8>>,
    make_trailer: impl Fn(u64) -> Vec<u8>,
) -> Vec<u8> {
    let (sb, root_patch) = superblock_v2();
    let mut file = sb;

    let heap_addr = file.len() as u64;
    let (heap_bytes, name_offsets) = local_heap(heap_addr, &[dataset_name]);
    file.extend_from_slice(&heap_bytes);

    let snod_addr = file.len() as u64;
    // object-header address is a placeholder until the dataset's position
    // is known below; the field's width doesn't depend on its value.
    let snod_bytes = symbol_table_node(&[(name_offsets[0], 0)]);
    let obj_addr_patch = snod_addr as usize + 8 + LENGTH_SIZE; // header(8) + link-name-offset field
    file.extend_from_slice(&snod_bytes);

    let btree_addr = file.len() as u64;
    file.extend_from_slice(&group_btree_v1_leaf(&[snod_addr]));

    let root_header = {
        let mut body = Builder::new();
        body.uN(btree_addr, OFFSET_SIZE);
        body.uN(heap_addr, OFFSET_SIZE);
        obj_header_v2(&[msg(0x11, &body.into_vec())])
    };
    let root_header_start = file.len() as u64;
    file.extend_from_slice(&root_header);
    let dataset_addr = file.len() as u64;

    file[obj_addr_patch..obj_addr_patch + 8].copy_from_slice(&dataset_addr.to_le_bytes());

    let probe_header = obj_header_v2(&make_messages(0));
    let trailer_addr = dataset_addr + probe_header.len() as u64;
    let dataset_header = obj_header_v2(&make_messages(trailer_addr));
    assert_eq!(
        dataset_header.len(),
        probe_header.len(),
        "message size must not depend on the address value"
    );
    file.extend_from_slice(&dataset_header);
    file.extend_from_slice(&make_trailer(trailer_addr));

    file[root_patch..root_patch + 8].copy_from_slice(&root_header_start.to_le_bytes());
    file
}

/// Build a complete one-dataset file: superblock -> root group object
/// header (one compact Link to the dataset) -> dataset object header ->
/// trailer. `make_messages(trailer_addr)` builds the dataset's message list
/// (so a Data Layout message can embed the trailer's address); `make_trailer
/// (trailer_addr)` builds whatever follows the header — raw contiguous data,
/// or a chunk-index b-tree plus chunk blobs, with `trailer_addr` itself as
/// the first byte's address so nested structures can compute their own
/// addresses relative to it.
pub fn build_file_with_trailer(
    dataset_name: &str,
    make_messages: impl Fn(u64) -> Vec<Vec<u8>>,
    make_trailer: impl Fn(u64) -> Vec<u8>,
) -> Vec<u8> {
    let (sb, root_patch) = superblock_v2();
    let mut file = sb;

    // Build the root header with a placeholder link target, so its length
    // (and thus the dataset's address) is known before the address value.
    let link_target_patch_in_root: usize;
    let root_header = {
        let mut body = Builder::new();
        body.u8(1); // version
        body.u8(0); // flags
        body.u8(dataset_name.len() as u8);
        body.bytes(dataset_name.as_bytes());
        let patch_pos = body.pos() as usize;
        body.u64(0); // placeholder target address
        let link_body = body.into_vec();
        link_target_patch_in_root = patch_pos;
        obj_header_v2(&[msg(0x06, &link_body)])
    };

    let root_header_start = file.len() as u64;
    file.extend_from_slice(&root_header);
    let dataset_addr = file.len() as u64;

    // The link message lives inside the object-header wrapper, which adds a
    // fixed 7-byte prefix ("OHDR" + version + flags + chunk0-size) before
    // the message list starts; the message itself adds a fixed 4-byte
    // header (type + size + flags) before its body.
    let patch_at = root_header_start as usize + 7 + 4 + link_target_patch_in_root;
    file[patch_at..patch_at + 8].copy_from_slice(&dataset_addr.to_le_bytes());

    // Message byte length never depends on the *value* of an embedded
    // fixed-width address field, only its presence — so a probe pass with a
    // placeholder address reveals the real trailer address.
    let probe_header = obj_header_v2(&make_messages(0));
    let trailer_addr = dataset_addr + probe_header.len() as u64;

    let dataset_header = obj_header_v2(&make_messages(trailer_addr));
    assert_eq!(
        dataset_header.len(),
        probe_header.len(),
        "message size must not depend on the address value"
    );
    file.extend_from_slice(&dataset_header);
    file.extend_from_slice(&make_trailer(trailer_addr));

    file[root_patch..root_patch + 8].copy_from_slice(&root_header_start.to_le_bytes());
    file
}

/// Convenience wrapper for the common contiguous-layout case: the trailer is
/// exactly the raw element data, and `make_messages(data_addr)` embeds that
/// address in its Data Layout message.
pub fn build_file(
    dataset_name: &str,
    make_messages: impl Fn(u64) -> Vec<Vec<u8>>,
    data: &[u8],
) -> Vec<u8> {
    build_file_with_trailer(dataset_name, make_messages, |_addr| data.to_vec())
}
