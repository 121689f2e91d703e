//! The layout engine.
//!
//! Everything here is a `const fn` so layouts can be folded at compile time. A
//! layout is described as an ordered list of [`Member`]s. Each member is either a
//! fixed-size value or a trailing array placeholder. A placeholder takes no bytes
//! in the static part of the layout but still carries the alignment of its
//! element type, since its elements are appended after the header at runtime.
//!
//! ```
//! use flexclass::layout::Member;
//! use flexclass::layout::compute_layout;
//!
//! const LAYOUT: flexclass::layout::StaticLayout<3> = compute_layout([
//!     Member::of::<u8>(),
//!     Member::of::<u32>(),
//!     Member::trailing::<u64>(),
//! ]);
//!
//! assert_eq!(LAYOUT.offsets(), &[0, 4, 8]);
//! assert_eq!(LAYOUT.size(), 8);
//! assert_eq!(LAYOUT.align(), 8);
//! ```

use core::mem::align_of;
use core::mem::size_of;

use crate::types::ErrorKind;
use crate::types::FlexError;
use crate::types::FlexResult;

/// Rounds `pos` up to the next multiple of `align`.
///
/// `align` must be a non-zero power of two and the result must fit in a `usize`.
/// Both are checked, a violation panics (at compile time when used in a const).
///
/// ```
/// use flexclass::layout::align_up;
///
/// assert_eq!(align_up(0, 8), 0);
/// assert_eq!(align_up(1, 8), 8);
/// assert_eq!(align_up(8, 8), 8);
/// assert_eq!(align_up(9, 4), 12);
/// ```
#[inline]
pub const fn align_up(pos: usize, align: usize) -> usize {
    let Some(ret) = checked_align_up(pos, align) else {
        panic!("aligned position overflowed usize");
    };
    return ret;
}

/// Like [`align_up`] but returns `None` instead of panicking when the rounded
/// position does not fit in a `usize`.
#[inline]
pub const fn checked_align_up(pos: usize, align: usize) -> Option<usize> {
    assert!(align.is_power_of_two(), "alignment must be a non-zero power of two");
    let mask = align - 1;
    let Some(bumped) = pos.checked_add(mask) else {
        return None;
    };
    return Some(bumped & !mask);
}

/// Describes one member of a layout: its size and its alignment.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Member {
    size:  usize,
    align: usize,
}

impl Member {
    /// A member with an explicit size and alignment.
    ///
    /// # Panics
    ///
    /// If `align` is not a non-zero power of two.
    pub const fn new(size: usize, align: usize) -> Self {
        assert!(align.is_power_of_two(), "alignment must be a non-zero power of two");
        return Self { size, align };
    }

    /// A member holding a single `T`. Zero-sized types give a zero-sized member.
    pub const fn of<T>() -> Self {
        return Self {
            size:  size_of::<T>(),
            align: align_of::<T>(),
        };
    }

    /// The placeholder for a trailing array of `T`: no bytes in the static
    /// layout, but the alignment of `T`.
    pub const fn trailing<T>() -> Self {
        return Self {
            size:  0,
            align: align_of::<T>(),
        };
    }

    #[inline]
    pub const fn size(self) -> usize {
        return self.size;
    }

    #[inline]
    pub const fn align(self) -> usize {
        return self.align;
    }
}

/// Folds members into a layout one at a time.
///
/// This is the building block of [`compute_layout`] and is handy when the
/// member list is not known as a fixed-size array.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LayoutFold {
    pos:   usize,
    align: usize,
    count: usize,
}

impl LayoutFold {
    pub const fn new() -> Self {
        return Self {
            pos:   0,
            align: 1,
            count: 0,
        };
    }

    /// Places `member` at the first offset at or after the end of the previous
    /// member that satisfies its alignment, and returns that offset.
    ///
    /// A zero-sized member still rounds the position up, so it can push the
    /// next member further out even though it takes no bytes itself.
    pub const fn push(&mut self, member: Member) -> usize {
        let offset = align_up(self.pos, member.align);
        let Some(end) = offset.checked_add(member.size) else {
            panic!("layout size overflowed usize");
        };
        self.pos = end;
        if member.align > self.align {
            self.align = member.align;
        }
        self.count += 1;
        return offset;
    }

    /// The end of the last member placed so far.
    #[inline]
    pub const fn size(&self) -> usize {
        return self.pos;
    }

    /// The largest alignment seen so far, at least 1.
    #[inline]
    pub const fn align(&self) -> usize {
        return self.align;
    }

    /// The number of members placed so far.
    #[inline]
    pub const fn count(&self) -> usize {
        return self.count;
    }
}

impl Default for LayoutFold {
    fn default() -> Self {
        return Self::new();
    }
}

/// The computed layout of `N` members.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StaticLayout<const N: usize> {
    offsets: [usize; N],
    size:    usize,
    align:   usize,
}

impl<const N: usize> StaticLayout<N> {
    /// The offset of the member at `index`.
    ///
    /// # Panics
    ///
    /// If `index >= N`.
    #[inline]
    pub const fn offset(&self, index: usize) -> usize {
        return self.offsets[index];
    }

    #[inline]
    pub const fn offsets(&self) -> &[usize; N] {
        return &self.offsets;
    }

    /// The end of the last member. This does not include tail padding.
    #[inline]
    pub const fn size(&self) -> usize {
        return self.size;
    }

    /// The size rounded up to the alignment. This is what a `#[repr(C)]`
    /// record with the same members occupies.
    #[inline]
    pub const fn padded_size(&self) -> usize {
        return align_up(self.size, self.align);
    }

    #[inline]
    pub const fn align(&self) -> usize {
        return self.align;
    }

    #[inline]
    pub const fn len(&self) -> usize {
        return N;
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        return N == 0;
    }
}

/// Computes the offset of every member, the static size and the alignment of
/// the member list, in declaration order.
///
/// The overall alignment is the largest member alignment, or 1 for an empty
/// list. Offsets never decrease and members never overlap.
pub const fn compute_layout<const N: usize>(members: [Member; N]) -> StaticLayout<N> {
    let mut fold = LayoutFold::new();
    let mut offsets = [0usize; N];
    let mut i = 0;
    while i < N {
        offsets[i] = fold.push(members[i]);
        i += 1;
    }
    return StaticLayout {
        offsets: offsets,
        size:    fold.size(),
        align:   fold.align(),
    };
}

/// The number of bytes a trailing array of `count` elements of `T` needs when
/// it starts at `offset`, counting the padding that realigns `offset` for `T`.
///
/// `offset` must be cumulative: the header size plus every byte already
/// reserved for earlier arrays of the same object, so each array is padded
/// relative to the ones before it.
pub const fn num_required_bytes<T>(offset: usize, count: usize) -> FlexResult<usize> {
    let Some(start) = checked_align_up(offset, align_of::<T>()) else {
        return Err(FlexError::new(ErrorKind::SizeOverflow));
    };
    let Some(bytes) = count.checked_mul(size_of::<T>()) else {
        return Err(FlexError::new(ErrorKind::SizeOverflow));
    };
    let Some(end) = start.checked_add(bytes) else {
        return Err(FlexError::new(ErrorKind::SizeOverflow));
    };
    return Ok(end - offset);
}

#[cfg(test)]
mod tests;
