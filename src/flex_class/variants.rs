use core::fmt;
use core::marker::PhantomData;
use core::mem::size_of;
use core::ptr::NonNull;
use core::slice;

use super::AFTER_HEADER;
use super::Anchor;
use super::FlexClass;
use super::Handle;
use super::handle::adjacent_begin;

/// Stores only the begin of its array. The length has to be kept elsewhere,
/// so elements that need dropping can't use it.
pub struct Array<T> {
    begin: NonNull<T>,
}

unsafe impl<T: Send> Send for Array<T> {}
unsafe impl<T: Sync> Sync for Array<T> {}

impl<T> Array<T> {
    #[inline]
    pub const fn as_ptr(&self) -> NonNull<T> {
        return self.begin;
    }

    /// # Safety
    ///
    /// `len` must not exceed the number of elements the array was built with.
    #[inline]
    pub unsafe fn as_slice(&self, len: usize) -> &[T] {
        return unsafe { slice::from_raw_parts(self.begin.as_ptr(), len) };
    }

    /// # Safety
    ///
    /// Same as [`Array::as_slice`].
    #[inline]
    pub unsafe fn as_mut_slice(&mut self, len: usize) -> &mut [T] {
        return unsafe { slice::from_raw_parts_mut(self.begin.as_ptr(), len) };
    }
}

unsafe impl<T> Handle for Array<T> {
    type Elem = T;

    const TRACKS_END: bool = false;

    fn unset() -> Self {
        return Self {
            begin: NonNull::dangling(),
        };
    }

    unsafe fn set_location(&mut self, begin: NonNull<T>, _end: NonNull<T>) {
        self.begin = begin;
    }

    unsafe fn begin<O: FlexClass>(&self, _owner: NonNull<O>) -> NonNull<T> {
        return self.begin;
    }

    unsafe fn end<O: FlexClass>(&self, _owner: NonNull<O>) -> Option<NonNull<T>> {
        return None;
    }
}

impl<T> fmt::Debug for Array<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Array").field("begin", &self.begin).finish()
    }
}

/// Stores both ends of its array, so it can hand out slices on its own.
pub struct Range<T> {
    begin: NonNull<T>,
    end:   NonNull<T>,
}

unsafe impl<T: Send> Send for Range<T> {}
unsafe impl<T: Sync> Sync for Range<T> {}

impl<T> Range<T> {
    #[inline]
    pub const fn as_ptr(&self) -> NonNull<T> {
        return self.begin;
    }

    /// One past the last element.
    #[inline]
    pub const fn end_ptr(&self) -> NonNull<T> {
        return self.end;
    }

    #[inline]
    pub fn len(&self) -> usize {
        // Nothing to count between the ends of a zero-sized array.
        if size_of::<T>() == 0 {
            return 0;
        }
        // The begin never passes the end, and an unset range is empty.
        return unsafe { self.end.offset_from(self.begin) } as usize;
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        return self.begin == self.end;
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        return unsafe { slice::from_raw_parts(self.begin.as_ptr(), self.len()) };
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        let len = self.len();
        return unsafe { slice::from_raw_parts_mut(self.begin.as_ptr(), len) };
    }
}

unsafe impl<T> Handle for Range<T> {
    type Elem = T;

    const TRACKS_END: bool = true;

    fn unset() -> Self {
        return Self {
            begin: NonNull::dangling(),
            end:   NonNull::dangling(),
        };
    }

    unsafe fn set_location(&mut self, begin: NonNull<T>, end: NonNull<T>) {
        self.begin = begin;
        self.end = end;
    }

    unsafe fn begin<O: FlexClass>(&self, _owner: NonNull<O>) -> NonNull<T> {
        return self.begin;
    }

    unsafe fn end<O: FlexClass>(&self, _owner: NonNull<O>) -> Option<NonNull<T>> {
        return Some(self.end);
    }
}

impl<T: fmt::Debug> fmt::Debug for Range<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

/// Stores nothing. The array is found right after the header, or right after
/// the array at index `AFTER` when that is not [`AFTER_HEADER`].
pub struct AdjacentArray<T, const AFTER: usize = AFTER_HEADER> {
    _elem: PhantomData<T>,
}

unsafe impl<T, const AFTER: usize> Handle for AdjacentArray<T, AFTER> {
    type Elem = T;

    const TRACKS_END: bool = false;

    const ANCHOR: Anchor = if AFTER == AFTER_HEADER {
        Anchor::Header
    } else {
        Anchor::After(AFTER)
    };

    fn unset() -> Self {
        return Self { _elem: PhantomData };
    }

    unsafe fn set_location(&mut self, _begin: NonNull<T>, _end: NonNull<T>) {}

    unsafe fn begin<O: FlexClass>(&self, owner: NonNull<O>) -> NonNull<T> {
        return unsafe { adjacent_begin::<T, O, AFTER>(owner) };
    }

    unsafe fn end<O: FlexClass>(&self, _owner: NonNull<O>) -> Option<NonNull<T>> {
        return None;
    }
}

impl<T, const AFTER: usize> fmt::Debug for AdjacentArray<T, AFTER> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AdjacentArray")
    }
}

/// Stores only the end of its array. The begin is found the same way as for
/// [`AdjacentArray`].
pub struct AdjacentRange<T, const AFTER: usize = AFTER_HEADER> {
    end: Option<NonNull<T>>,
}

unsafe impl<T: Send, const AFTER: usize> Send for AdjacentRange<T, AFTER> {}
unsafe impl<T: Sync, const AFTER: usize> Sync for AdjacentRange<T, AFTER> {}

impl<T, const AFTER: usize> AdjacentRange<T, AFTER> {
    /// One past the last element, `None` until the array is built.
    #[inline]
    pub const fn end_ptr(&self) -> Option<NonNull<T>> {
        return self.end;
    }
}

unsafe impl<T, const AFTER: usize> Handle for AdjacentRange<T, AFTER> {
    type Elem = T;

    const TRACKS_END: bool = true;

    const ANCHOR: Anchor = if AFTER == AFTER_HEADER {
        Anchor::Header
    } else {
        Anchor::After(AFTER)
    };

    fn unset() -> Self {
        return Self { end: None };
    }

    unsafe fn set_location(&mut self, _begin: NonNull<T>, end: NonNull<T>) {
        self.end = Some(end);
    }

    unsafe fn begin<O: FlexClass>(&self, owner: NonNull<O>) -> NonNull<T> {
        return unsafe { adjacent_begin::<T, O, AFTER>(owner) };
    }

    unsafe fn end<O: FlexClass>(&self, _owner: NonNull<O>) -> Option<NonNull<T>> {
        return self.end;
    }
}

impl<T, const AFTER: usize> fmt::Debug for AdjacentRange<T, AFTER> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdjacentRange").field("end", &self.end).finish()
    }
}
