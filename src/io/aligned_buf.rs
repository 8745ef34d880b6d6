use aligned_vec::{AVec, ConstAlign};

/// Output buffers are allocated at this alignment so SIMD-oriented consumers
/// can operate on them directly.
pub const OUTPUT_ALIGN: usize = 64;

pub type AlignedBuf = AVec<u8, ConstAlign<OUTPUT_ALIGN>>;

/// Allocate a zeroed, 64-byte-aligned buffer of `size` bytes.
pub fn alloc_aligned(size: usize) -> AlignedBuf {
    AVec::from_iter(OUTPUT_ALIGN, std::iter::repeat_n(0u8, size))
}
