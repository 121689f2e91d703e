use core::mem;
use core::mem::align_of;
use core::mem::size_of;
use core::ptr::NonNull;

use super::ArrayArg;
use super::handle::align_ptr;
use crate::layout::checked_align_up;

/// Drops the elements of `begin..end`, last element first.
///
/// # Safety
///
/// `begin..end` must be initialized elements of one array that are not used
/// again.
pub(crate) unsafe fn reverse_destroy<T>(begin: NonNull<T>, end: NonNull<T>) {
    let mut cur = end;
    while cur > begin {
        cur = unsafe { cur.sub(1) };
        unsafe { cur.drop_in_place() };
    }
}

/// Owns the elements built so far while one array is being initialized.
struct ArrayGuard<T> {
    begin: NonNull<T>,
    end:   NonNull<T>,
}

impl<T> Drop for ArrayGuard<T> {
    fn drop(&mut self) {
        unsafe { reverse_destroy(self.begin, self.end) };
    }
}

/// Owns one fully built trailing array until the whole object is built.
///
/// Builders are kept on the stack in array order, so when a later array fails
/// they drop in reverse and tear the finished arrays down last to first.
pub(crate) struct ArrayBuilder<T> {
    begin: NonNull<T>,
    end:   NonNull<T>,
}

impl<T> ArrayBuilder<T> {
    #[inline]
    pub(crate) const fn new() -> Self {
        return Self {
            begin: NonNull::dangling(),
            end:   NonNull::dangling(),
        };
    }

    /// Builds the array from `arg` at the first address at or after `cursor`
    /// aligned for `T`, and returns the address one past its last element.
    ///
    /// If producing an element fails or panics, the elements already built for
    /// this array are dropped in reverse before the error leaves, and the
    /// builder stays empty.
    ///
    /// # Safety
    ///
    /// `cursor..limit` must be unused, writable bytes of one allocation.
    ///
    /// # Panics
    ///
    /// If the array does not fit before `limit`.
    pub(crate) unsafe fn build<E, A: ArrayArg<T, E>>(
        &mut self,
        cursor: NonNull<u8>,
        limit: NonNull<u8>,
        mut arg: A,
    ) -> Result<NonNull<u8>, E> {
        let len = arg.len();
        let fits = match (checked_align_up(cursor.as_ptr().addr(), align_of::<T>()), len.checked_mul(size_of::<T>())) {
            (Some(start), Some(bytes)) => start.checked_add(bytes).is_some_and(|end| end <= limit.as_ptr().addr()),
            _ => false,
        };
        assert!(fits, "trailing array of {} elements overruns its allocation", len);

        let begin = unsafe { align_ptr::<T>(cursor) };
        let mut guard = ArrayGuard { begin, end: begin };
        for index in 0..len {
            let elem = arg.next_elem(index)?;
            unsafe { guard.end.write(elem) };
            guard.end = unsafe { guard.end.add(1) };
        }

        let end = guard.end;
        mem::forget(guard);
        self.begin = begin;
        self.end = end;
        return Ok(end.cast());
    }

    /// Gives up ownership of the built array and returns its extent.
    #[inline]
    pub(crate) fn release(&mut self) -> (NonNull<T>, NonNull<T>) {
        let extent = (self.begin, self.end);
        self.end = self.begin;
        return extent;
    }
}

impl<T> Drop for ArrayBuilder<T> {
    fn drop(&mut self) {
        unsafe { reverse_destroy(self.begin, self.end) };
    }
}
