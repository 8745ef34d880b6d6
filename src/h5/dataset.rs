//! Dataset-shaped constants and metadata record: message-type codes,
//! object-header/fractal-heap/b-tree magic numbers, and the per-dataset
//! metadata record the cache holds.

/// Object header message type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum MsgType {
    Dataspace = 0x1,
    LinkInfo = 0x2,
    Datatype = 0x3,
    FillValue = 0x5,
    Link = 0x6,
    DataLayout = 0x8,
    Filter = 0xB,
    Attribute = 0xC,
    HeaderCont = 0x10,
    SymbolTable = 0x11,
    AttributeInfo = 0x15,
}

impl MsgType {
    pub fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            0x1 => Self::Dataspace,
            0x2 => Self::LinkInfo,
            0x3 => Self::Datatype,
            0x5 => Self::FillValue,
            0x6 => Self::Link,
            0x8 => Self::DataLayout,
            0xB => Self::Filter,
            0xC => Self::Attribute,
            0x10 => Self::HeaderCont,
            0x11 => Self::SymbolTable,
            0x15 => Self::AttributeInfo,
            _ => return None,
        })
    }
}

/// Structural signatures, little-endian, 4 bytes unless noted.
pub const H5_SIGNATURE_LE: u64 = 0x0A1A_0A0D_4644_4889;
pub const OHDR_SIGNATURE: u32 = 0x5244_484F;
pub const FRHP_SIGNATURE: u32 = 0x5048_5246;
pub const FHDB_SIGNATURE: u32 = 0x4244_4846;
pub const FHIB_SIGNATURE: u32 = 0x4249_4846;
pub const OCHK_SIGNATURE: u32 = 0x4B48_434F;
pub const TREE_SIGNATURE: u32 = 0x4545_5254;
pub const HEAP_SIGNATURE: u32 = 0x5041_4548;
pub const SNOD_SIGNATURE: u32 = 0x444F_4E53;
pub const V2TREE_SIGNATURE: u32 = 0x4448_5442;
pub const V2TREE_INTERNAL_SIGNATURE: u32 = 0x4E49_5442;
pub const V2TREE_LEAF_SIGNATURE: u32 = 0x464C_5442;

/// Object header v1 flag bits.
pub const SIZE_OF_CHUNK_0_MASK: u8 = 0x03;
pub const ATTR_CREATION_TRACK_BIT: u8 = 0x04;
pub const STORE_CHANGE_PHASE_BIT: u8 = 0x10;
pub const FILE_STATS_BIT: u8 = 0x20;

pub const MAX_NDIMS: usize = 2;

/// Datatype class, the HDF5 datatype message class field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TypeClass {
    FixedPoint = 0,
    FloatingPoint = 1,
    Time = 2,
    String = 3,
    BitField = 4,
    Opaque = 5,
    Compound = 6,
    Reference = 7,
    Enumerated = 8,
    VariableLength = 9,
    Array = 10,
    #[default]
    Unknown = 11,
}

impl TypeClass {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Self::FixedPoint,
            1 => Self::FloatingPoint,
            2 => Self::Time,
            3 => Self::String,
            4 => Self::BitField,
            5 => Self::Opaque,
            6 => Self::Compound,
            7 => Self::Reference,
            8 => Self::Enumerated,
            9 => Self::VariableLength,
            10 => Self::Array,
            _ => Self::Unknown,
        }
    }
}

/// Data layout class, the Data Layout message's class field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Layout {
    Compact = 0,
    Contiguous = 1,
    Chunked = 2,
    #[default]
    Unknown = 3,
}

impl Layout {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Self::Compact,
            1 => Self::Contiguous,
            2 => Self::Chunked,
            _ => Self::Unknown,
        }
    }
}

/// Filter pipeline entries, indexed by HDF5 registered filter id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Filter {
    Invalid = 0,
    Deflate = 1,
    Shuffle = 2,
    Fletcher32 = 3,
    Szip = 4,
    NBit = 5,
    ScaleOffset = 6,
}

pub const NUM_FILTERS: usize = 7;

impl Filter {
    pub fn from_code(code: u16) -> Self {
        match code {
            1 => Self::Deflate,
            2 => Self::Shuffle,
            3 => Self::Fletcher32,
            4 => Self::Szip,
            5 => Self::NBit,
            6 => Self::ScaleOffset,
            _ => Self::Invalid,
        }
    }
}

/// Fill value, stored as raw bytes re-interpreted by the reader per
/// `typesize` — the enclosing [`DatasetMeta`] already knows `typesize`, so
/// a tagged union isn't needed here.
#[derive(Debug, Clone, Default)]
pub struct FillValue {
    pub bytes: Vec<u8>,
}

/// Cached shape of one dataset: the parsed-out contents of its object
/// header, independent of any particular read request. This is what
/// [`crate::h5::metadata_repo::MetadataRepo`] stores keyed by
/// `(resource, dataset)`.
#[derive(Debug, Clone, Default)]
pub struct DatasetMeta {
    pub url: String,
    pub type_class: TypeClass,
    pub layout: Layout,
    pub fill: FillValue,
    pub filters: [bool; NUM_FILTERS],
    pub signed_val: bool,
    pub typesize: usize,
    pub ndims: usize,
    pub elementsize: usize,
    pub offsetsize: usize,
    pub lengthsize: usize,
    pub dimensions: [u64; MAX_NDIMS],
    pub chunk_elements: u64,
    pub chunk_dims: [u64; MAX_NDIMS],
    pub address: u64,
    pub size: i64,
}

impl DatasetMeta {
    pub fn is_chunked(&self) -> bool {
        self.layout == Layout::Chunked
    }
}
