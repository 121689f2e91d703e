use core::mem::align_of;
use core::mem::needs_drop;
use core::mem::size_of;
use core::ptr::NonNull;

use super::FlexClass;
use super::HandleList;
use crate::layout::Member;
use crate::layout::align_up;

/// Used as the `AFTER` parameter of the adjacent handles to say that the
/// array starts right after the header instead of after a sibling array.
pub const AFTER_HEADER: usize = usize::MAX;

/// Where a handle finds the beginning of its array.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Anchor {
    /// The handle stores the begin pointer itself.
    Stored,
    /// The array begins right after the header, realigned for its elements.
    /// Only valid for the first trailing array.
    Header,
    /// The array begins right after the end of the array at this index,
    /// realigned for its elements. Only valid for the array right after it.
    After(usize),
}

/// A header field that records, or derives, where its trailing array lives.
///
/// The handle is created with [`Handle::unset`] and handed to the header
/// constructor. Once every array of the object is built the engine calls
/// [`Handle::set_location`] exactly once. After that `begin` and `end` only
/// read.
///
/// # Safety
///
/// `begin` and `end` must report the extent passed to `set_location`. When
/// `TRACKS_END` is `true`, `end` must return `Some` after `set_location`; when it
/// is `false` `end` must return `None`. `ANCHOR` must describe how `begin` is
/// found, the engine relies on it to place derived arrays.
///
/// # Rejected handle lists
///
/// A class whose handles the engine cannot build or tear down fails to
/// compile as soon as an object of it is made.
///
/// Elements that need dropping must have a handle that knows the end:
///
/// ```compile_fail
/// use flexclass::Array;
/// use flexclass::FlexBox;
///
/// struct Names {
///     arrays: (Array<String>,),
/// }
/// flexclass::impl_flex_class!(Names => arrays: (Array<String>,));
///
/// let _ = FlexBox::new((2usize,), |arrays| Names { arrays });
/// ```
///
/// Zero-sized elements are not supported:
///
/// ```compile_fail
/// use flexclass::FlexBox;
/// use flexclass::Range;
///
/// struct Units {
///     arrays: (Range<()>,),
/// }
/// flexclass::impl_flex_class!(Units => arrays: (Range<()>,));
///
/// let _ = FlexBox::new((3usize,), |arrays| Units { arrays });
/// ```
///
/// Only the first array can sit right after the header:
///
/// ```compile_fail
/// use flexclass::AdjacentArray;
/// use flexclass::FlexBox;
/// use flexclass::Range;
///
/// struct Late {
///     arrays: (Range<u8>, AdjacentArray<u16>),
/// }
/// flexclass::impl_flex_class!(Late => arrays: (Range<u8>, AdjacentArray<u16>));
///
/// let _ = FlexBox::new((2usize, 2usize), |arrays| Late { arrays });
/// ```
///
/// An adjacent array must come directly after the array it follows:
///
/// ```compile_fail
/// use flexclass::AdjacentArray;
/// use flexclass::AdjacentRange;
/// use flexclass::FlexBox;
/// use flexclass::Range;
///
/// struct Gap {
///     arrays: (Range<u8>, AdjacentRange<u16, 0>, AdjacentArray<u32, 0>),
/// }
/// flexclass::impl_flex_class!(Gap => arrays: (Range<u8>, AdjacentRange<u16, 0>, AdjacentArray<u32, 0>));
///
/// let _ = FlexBox::new((1usize, 1usize, 1usize), |arrays| Gap { arrays });
/// ```
///
/// And the array it follows has to know where it ends:
///
/// ```compile_fail
/// use flexclass::AdjacentArray;
/// use flexclass::Array;
/// use flexclass::FlexBox;
///
/// struct Blind {
///     arrays: (Array<u8>, AdjacentArray<u16, 0>),
/// }
/// flexclass::impl_flex_class!(Blind => arrays: (Array<u8>, AdjacentArray<u16, 0>));
///
/// let _ = FlexBox::new((1usize, 1usize), |arrays| Blind { arrays });
/// ```
///
/// The same holds for an adjacent handle kept in the header outside the
/// handle list:
///
/// ```compile_fail
/// use flexclass::AdjacentArray;
/// use flexclass::Array;
/// use flexclass::FlexBox;
/// use flexclass::Handle;
///
/// struct Stray {
///     arrays: (Array<u8>,),
///     stray:  AdjacentArray<u16, 0>,
/// }
/// flexclass::impl_flex_class!(Stray => arrays: (Array<u8>,));
///
/// let boxed = FlexBox::new((4usize,), |arrays| Stray {
///     arrays,
///     stray: AdjacentArray::unset(),
/// })
/// .unwrap();
/// let _ = boxed.begin(|s| &s.stray);
/// ```
pub unsafe trait Handle: Sized {
    /// The element type of the array.
    type Elem;

    /// Whether the handle can produce the end of its array. Arrays whose
    /// elements need dropping require this.
    const TRACKS_END: bool;

    const ANCHOR: Anchor = Anchor::Stored;

    /// The handle before its array exists.
    fn unset() -> Self;

    /// Records where the array was built.
    ///
    /// # Safety
    ///
    /// `begin..end` must be the fully constructed array of this handle inside
    /// the allocation that also holds the header containing `self`.
    unsafe fn set_location(&mut self, begin: NonNull<Self::Elem>, end: NonNull<Self::Elem>);

    /// The first element of the array.
    ///
    /// # Safety
    ///
    /// `owner` must point to the live flexible object whose header contains
    /// `self`, with provenance over its whole allocation.
    unsafe fn begin<O: FlexClass>(&self, owner: NonNull<O>) -> NonNull<Self::Elem>;

    /// One past the last element of the array, if the handle knows it.
    ///
    /// # Safety
    ///
    /// Same as [`Handle::begin`].
    unsafe fn end<O: FlexClass>(&self, owner: NonNull<O>) -> Option<NonNull<Self::Elem>>;
}

/// Everything the engine needs to know about a handle at compile time.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct HandleDesc {
    member:     Member,
    elem_size:  usize,
    anchor:     Anchor,
    tracks_end: bool,
    needs_drop: bool,
}

impl HandleDesc {
    pub const fn of<H: Handle>() -> Self {
        return Self {
            member:     Member::trailing::<H::Elem>(),
            elem_size:  size_of::<H::Elem>(),
            anchor:     H::ANCHOR,
            tracks_end: H::TRACKS_END,
            needs_drop: needs_drop::<H::Elem>(),
        };
    }

    /// The trailing array placeholder for the layout engine.
    pub const fn member(&self) -> Member {
        return self.member;
    }

    pub const fn anchor(&self) -> Anchor {
        return self.anchor;
    }

    pub const fn tracks_end(&self) -> bool {
        return self.tracks_end;
    }

    pub const fn needs_drop(&self) -> bool {
        return self.needs_drop;
    }
}

/// Rejects handle lists the engine cannot build or tear down. Used from
/// inline `const` blocks so a bad list fails the build.
pub(crate) const fn validate_handles(descs: &[HandleDesc]) {
    let mut i = 0;
    while i < descs.len() {
        let desc = descs[i];
        if desc.elem_size == 0 {
            panic!("zero-sized trailing array elements are not supported");
        }
        if desc.needs_drop && !desc.tracks_end {
            panic!("a trailing array whose elements need dropping must use a handle that tracks its end");
        }
        match desc.anchor {
            Anchor::Stored => {}
            Anchor::Header => {
                if i != 0 {
                    panic!("only the first trailing array can begin right after the header");
                }
            }
            Anchor::After(j) => {
                if j.wrapping_add(1) != i {
                    panic!("an adjacent array must directly follow the array it is anchored to");
                }
                if !descs[j].tracks_end {
                    panic!("an adjacent array must follow an array that tracks its end");
                }
            }
        }
        i += 1;
    }
}

/// Rounds `ptr` up to the alignment of `T`.
///
/// # Safety
///
/// The rounded pointer must stay inside the allocation of `ptr`.
#[inline]
pub(crate) unsafe fn align_ptr<T>(ptr: NonNull<u8>) -> NonNull<T> {
    let addr = ptr.as_ptr().addr();
    let pad = align_up(addr, align_of::<T>()) - addr;
    return unsafe { ptr.add(pad) }.cast();
}

/// The first byte after the header of `owner`.
#[inline]
pub(crate) unsafe fn header_end<O>(owner: NonNull<O>) -> NonNull<u8> {
    return unsafe { owner.cast::<u8>().add(size_of::<O>()) };
}

/// The begin of an array placed right after the header, or right after the
/// array at index `AFTER`.
pub(crate) unsafe fn adjacent_begin<T, O: FlexClass, const AFTER: usize>(owner: NonNull<O>) -> NonNull<T> {
    const {
        assert!(
            AFTER == AFTER_HEADER || AFTER < <O::Handles as HandleList>::LEN,
            "adjacent array anchored to an array that does not exist"
        );
        assert!(
            AFTER == AFTER_HEADER || <O::Handles as HandleList>::DESCS[AFTER].tracks_end(),
            "an adjacent array must follow an array that tracks its end"
        );
    };
    if AFTER == AFTER_HEADER {
        return unsafe { align_ptr(header_end(owner)) };
    }

    let handles = unsafe { owner.as_ref() }.handles();
    let Some(end) = (unsafe { handles.end_of(owner, AFTER) }) else {
        panic!("the array an adjacent array follows has no recorded end");
    };
    return unsafe { align_ptr(end) };
}
