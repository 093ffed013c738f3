//! A `Tag` is the boundary word written at both ends of every block:
//! the block size with the allocation flag in the low bits.

/// Boundary tag for block metadata.
///
/// Block sizes are multiples of [`ALIGNMENT`](crate::ALIGNMENT),
/// so the low three bits are free to hold flags.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct Tag(pub u32);

impl core::fmt::Debug for Tag {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tag")
            .field("size", &self.size())
            .field("is_allocated", &self.is_allocated())
            .finish()
    }
}

impl core::fmt::Display for Tag {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "[{}:{}]", self.size(), if self.is_allocated() { 'a' } else { 'f' })
    }
}

impl Tag {
    pub const ALLOCATED_FLAG: u32 = 1 << 0;
    pub const FLAG_MASK: u32 = 0x7;

    /// The largest block size a tag can describe.
    pub const MAX_SIZE: usize = (u32::MAX & !Self::FLAG_MASK) as usize;

    /// The zero-size allocated tag that terminates the heap.
    pub const EPILOGUE: Tag = Tag(Self::ALLOCATED_FLAG);

    /// Packs a size and an allocation flag into one word.
    #[inline]
    #[track_caller]
    pub fn pack(size: usize, allocated: bool) -> Self {
        debug_assert!(size & Self::FLAG_MASK as usize == 0, "size {size} collides with flag bits");
        debug_assert!(size <= Self::MAX_SIZE);

        Self(size as u32 | if allocated { Self::ALLOCATED_FLAG } else { 0 })
    }

    #[inline]
    pub fn size(self) -> usize {
        (self.0 & !Self::FLAG_MASK) as usize
    }

    #[inline]
    pub fn is_allocated(self) -> bool {
        self.0 & Self::ALLOCATED_FLAG != 0
    }

    #[inline]
    pub fn to_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }

    #[inline]
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(u32::from_le_bytes(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_and_unpack() {
        let tag = Tag::pack(4096, true);
        assert_eq!(tag.size(), 4096);
        assert!(tag.is_allocated());

        let tag = Tag::pack(4096, false);
        assert_eq!(tag.size(), 4096);
        assert!(!tag.is_allocated());
        assert_eq!(tag.0, 4096);

        assert_eq!(Tag::EPILOGUE.size(), 0);
        assert!(Tag::EPILOGUE.is_allocated());
    }

    #[test]
    fn stray_flag_bits_are_masked_from_size() {
        let tag = Tag(24 | 0x6);
        assert_eq!(tag.size(), 24);
        assert!(!tag.is_allocated());
    }

    #[test]
    fn bytes_are_little_endian() {
        let tag = Tag::pack(Tag::MAX_SIZE, true);
        assert_eq!(Tag::from_bytes(tag.to_bytes()), tag);
        assert_eq!(Tag::pack(8, true).to_bytes(), [9, 0, 0, 0]);
    }

    #[test]
    fn display_matches_checker_dump() {
        assert_eq!(std::format!("{}", Tag::pack(16, false)), "[16:f]");
        assert_eq!(std::format!("{}", Tag::pack(8, true)), "[8:a]");
    }
}
