//! Superblock parser: versions 0 and 2 are the only ones supported, with
//! 1 and 3 rejected outright.

use crate::error::{H5CoroError, Result};
use crate::h5::context::Context;
use crate::h5::dataset::H5_SIGNATURE_LE;
use tracing::debug;

/// Per-resource layout derived from the superblock: the width of offset and
/// length fields used throughout the rest of the file, and the root group's
/// object-header address.
#[derive(Debug, Clone, Copy)]
pub struct FileLayout {
    pub offset_size: usize,
    pub length_size: usize,
    pub root_group_address: u64,
    pub version: u8,
}

pub fn read_superblock(ctx: &Context) -> Result<FileLayout> {
    let mut sig = [0u8; 8];
    ctx.read_bytes(0, &mut sig)?;
    let signature = u64::from_le_bytes(sig);
    if signature != H5_SIGNATURE_LE {
        return Err(H5CoroError::BadMagic("superblock"));
    }

    let mut ver = [0u8; 1];
    ctx.read_bytes(8, &mut ver)?;
    let version = ver[0];
    if version != 0 && version != 2 {
        return Err(H5CoroError::UnsupportedVersion {
            what: "superblock",
            version: version as u32,
        });
    }

    let layout = if version == 0 {
        let mut sizes = [0u8; 2];
        ctx.read_bytes(13, &mut sizes)?;
        let offset_size = sizes[0] as usize;
        let length_size = sizes[1] as usize;

        let mut base = [0u8; 8];
        ctx.read_bytes(24, &mut base[..offset_size])?;
        let base_address = le_field(&base, offset_size);
        if base_address != 0 {
            return Err(H5CoroError::Unsupported("non-zero h5 file base address"));
        }

        // base/freespace/eof/driver-info addresses (offset_size each), then
        // the root group symbol table entry's link-name-offset field, which
        // is sized by length_size, not offset_size.
        let root_pos = 24 + 4 * offset_size as u64 + length_size as u64;
        let mut root = [0u8; 8];
        ctx.read_bytes(root_pos, &mut root[..offset_size])?;
        let root_group_address = le_field(&root, offset_size);

        FileLayout {
            offset_size,
            length_size,
            root_group_address,
            version,
        }
    } else {
        let mut sizes = [0u8; 2];
        ctx.read_bytes(9, &mut sizes)?;
        let offset_size = sizes[0] as usize;
        let length_size = sizes[1] as usize;

        let mut base = [0u8; 8];
        ctx.read_bytes(12, &mut base[..offset_size])?;
        let base_address = le_field(&base, offset_size);
        if base_address != 0 {
            return Err(H5CoroError::Unsupported("non-zero h5 file base address"));
        }

        let root_pos = 12 + 3 * offset_size as u64;
        let mut root = [0u8; 8];
        ctx.read_bytes(root_pos, &mut root[..offset_size])?;
        let root_group_address = le_field(&root, offset_size);

        FileLayout {
            offset_size,
            length_size,
            root_group_address,
            version,
        }
    };

    debug!(
        offset_size = layout.offset_size,
        length_size = layout.length_size,
        root = layout.root_group_address,
        "parsed superblock"
    );
    Ok(layout)
}

fn le_field(raw: &[u8], size: usize) -> u64 {
    let mut value = 0u64;
    for (i, b) in raw[..size].iter().enumerate() {
        value |= (*b as u64) << (8 * i);
    }
    value
}
