//! Two-level page table: directory entries and table entries.
//!
//! The reference implementation packs these as C bit-fields
//! (`unsigned int pfn : N; unsigned int valid : 1;`), which is exactly the
//! pattern this workspace's redesign notes call out as non-portable and not
//! worth imitating: bit-field layout is compiler-defined, not something a
//! safe Rust struct should rely on. [`Pde`] and [`Pte`] instead wrap a plain
//! `u32` behind accessors, with the top bit marking the entry allocated and
//! the rest holding a physical frame index.

use crate::addr::FrameIndex;

const ALLOCATED_BIT: u32 = 1 << 31;
const FRAME_MASK: u32 = !ALLOCATED_BIT;

/// An entry in the page directory: points at the physical frame holding a
/// page table, or is empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pde(u32);

/// An entry in a page table: points at the physical frame holding a data
/// page, or is empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pte(u32);

macro_rules! entry_impl {
    ($t:ty) => {
        impl $t {
            pub fn empty() -> Self {
                Self(0)
            }

            pub fn allocated(&self) -> bool {
                self.0 & ALLOCATED_BIT != 0
            }

            pub fn frame_index(&self) -> Option<FrameIndex> {
                self.allocated().then(|| FrameIndex((self.0 & FRAME_MASK) as usize))
            }

            pub fn set_frame(&mut self, frame: FrameIndex) {
                debug_assert!(frame.0 as u32 & ALLOCATED_BIT == 0, "frame index too large to tag");
                self.0 = ALLOCATED_BIT | (frame.0 as u32 & FRAME_MASK);
            }

            pub fn clear(&mut self) {
                self.0 = 0;
            }

            pub fn to_bits(self) -> u32 {
                self.0
            }

            pub fn from_bits(bits: u32) -> Self {
                Self(bits)
            }
        }
    };
}

entry_impl!(Pde);
entry_impl!(Pte);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_entry_has_no_frame() {
        let pde = Pde::empty();
        assert!(!pde.allocated());
        assert!(pde.frame_index().is_none());
    }

    #[test]
    fn set_frame_round_trips() {
        let mut pte = Pte::empty();
        pte.set_frame(FrameIndex(1234));
        assert!(pte.allocated());
        assert_eq!(pte.frame_index().unwrap().0, 1234);
        pte.clear();
        assert!(!pte.allocated());
    }
}
