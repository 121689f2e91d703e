use core::mem::needs_drop;
use core::ptr::NonNull;

use super::ArrayArg;
use super::FlexClass;
use super::Handle;
use super::HandleDesc;
use super::builder::ArrayBuilder;
use super::builder::reverse_destroy;
use crate::layout::num_required_bytes;
use crate::types::ErrorKind;
use crate::types::FlexError;
use crate::types::FlexResult;

/// The ordered handles of a flexible class, one per trailing array. This is
/// implemented for tuples of up to eight [`Handle`]s, the tuple order being
/// the order the arrays are laid out and built in.
///
/// # Safety
///
/// `DESCS` must describe the handles in order, `end_of` must return the end
/// reported by the handle at `index`, and `drop_arrays` must drop every array
/// whose elements need dropping, last array first.
pub unsafe trait HandleList: Sized {
    const LEN: usize;

    const DESCS: &'static [HandleDesc];

    /// Every handle unset.
    fn unset() -> Self;

    /// The end of the array at `index` as a byte pointer, `None` if that handle
    /// does not track its end or there is no such array.
    ///
    /// # Safety
    ///
    /// `owner` must point to the live object whose header holds `self`.
    unsafe fn end_of<O>(&self, owner: NonNull<O>, index: usize) -> Option<NonNull<u8>>
    where
        O: FlexClass<Handles = Self>;

    /// Drops the elements of every array, last array first and each array
    /// back to front.
    ///
    /// # Safety
    ///
    /// `owner` must point to the live object whose header holds `self`, and the
    /// arrays must not be used afterwards.
    unsafe fn drop_arrays<O>(&self, owner: NonNull<O>)
    where
        O: FlexClass<Handles = Self>;
}

/// The initializers for every trailing array of a class whose handles are `H`:
/// a tuple with one [`ArrayArg`] per handle, in the same order.
///
/// # Safety
///
/// `build` must only return `Ok` once every handle of `H` has been given the
/// location of its fully built array, and must never touch bytes past the
/// cursor plus what `required_bytes` reported.
pub unsafe trait ArrayArgs<H: HandleList, E> {
    /// The bytes every array needs, padding included, when the first one may
    /// start at `offset`.
    fn required_bytes(&self, offset: usize) -> FlexResult<usize>;

    /// Builds every array in order starting at `cursor`, then records their
    /// locations in the handles of `owner`.
    ///
    /// On failure the arrays already built are dropped, last first, before the
    /// error is returned. The header is left to the caller.
    ///
    /// # Safety
    ///
    /// `owner` must point to a constructed header at the start of an
    /// allocation that ends at `limit`, and `cursor` must be the end of that
    /// header.
    unsafe fn build<O>(self, owner: NonNull<O>, cursor: NonNull<u8>, limit: NonNull<u8>) -> Result<(), E>
    where
        O: FlexClass<Handles = H>;
}

/// Drops the elements of the array behind `handle`, if they need it.
#[inline]
unsafe fn drop_array<O: FlexClass, H: Handle>(handle: &H, owner: NonNull<O>) {
    if !needs_drop::<H::Elem>() {
        return;
    }
    let begin = unsafe { handle.begin(owner) };
    let Some(end) = (unsafe { handle.end(owner) }) else {
        unreachable!("arrays whose elements need dropping always track their end");
    };
    unsafe { reverse_destroy(begin, end) };
}

#[inline]
fn overflow() -> FlexError {
    return FlexError::new(ErrorKind::SizeOverflow);
}

macro_rules! impl_handle_tuple {
    ($len:expr; $(($idx:tt, $h:ident, $a:ident, $b:ident)),*; [$($rev:tt),*]) => {
        unsafe impl<$($h: Handle),*> HandleList for ($($h,)*) {
            const LEN: usize = $len;

            const DESCS: &'static [HandleDesc] = &[$(HandleDesc::of::<$h>()),*];

            #[inline]
            fn unset() -> Self {
                return ($(<$h as Handle>::unset(),)*);
            }

            #[allow(unused_variables)]
            unsafe fn end_of<O>(&self, owner: NonNull<O>, index: usize) -> Option<NonNull<u8>>
            where
                O: FlexClass<Handles = Self>,
            {
                $(
                    if index == $idx {
                        return unsafe { self.$idx.end(owner) }.map(NonNull::cast);
                    }
                )*
                return None;
            }

            #[allow(unused_variables)]
            unsafe fn drop_arrays<O>(&self, owner: NonNull<O>)
            where
                O: FlexClass<Handles = Self>,
            {
                $(
                    unsafe { drop_array(&self.$rev, owner) };
                )*
            }
        }

        unsafe impl<E, $($h: Handle, $a: ArrayArg<<$h as Handle>::Elem, E>),*> ArrayArgs<($($h,)*), E> for ($($a,)*) {
            #[allow(unused_mut, unused_variables)]
            fn required_bytes(&self, offset: usize) -> FlexResult<usize> {
                let mut total = 0usize;
                $(
                    let Some(at) = offset.checked_add(total) else {
                        return Err(overflow());
                    };
                    let needed = num_required_bytes::<<$h as Handle>::Elem>(at, self.$idx.len())?;
                    let Some(sum) = total.checked_add(needed) else {
                        return Err(overflow());
                    };
                    total = sum;
                )*
                return Ok(total);
            }

            #[allow(unused_mut, unused_variables, unused_assignments)]
            unsafe fn build<O>(self, owner: NonNull<O>, cursor: NonNull<u8>, limit: NonNull<u8>) -> Result<(), E>
            where
                O: FlexClass<Handles = ($($h,)*)>,
            {
                let mut cursor = cursor;
                $(
                    let mut $b = ArrayBuilder::<<$h as Handle>::Elem>::new();
                    cursor = unsafe { $b.build::<E, $a>(cursor, limit, self.$idx) }?;
                )*

                let handles = unsafe { (*owner.as_ptr()).handles_mut() };
                $(
                    let (begin, end) = $b.release();
                    unsafe { handles.$idx.set_location(begin, end) };
                )*
                return Ok(());
            }
        }
    };
}

impl_handle_tuple!(0; ; []);
impl_handle_tuple!(1; (0, H0, A0, b0); [0]);
impl_handle_tuple!(2; (0, H0, A0, b0), (1, H1, A1, b1); [1, 0]);
impl_handle_tuple!(3; (0, H0, A0, b0), (1, H1, A1, b1), (2, H2, A2, b2); [2, 1, 0]);
impl_handle_tuple!(4; (0, H0, A0, b0), (1, H1, A1, b1), (2, H2, A2, b2), (3, H3, A3, b3); [3, 2, 1, 0]);
impl_handle_tuple!(
    5;
    (0, H0, A0, b0), (1, H1, A1, b1), (2, H2, A2, b2), (3, H3, A3, b3), (4, H4, A4, b4);
    [4, 3, 2, 1, 0]
);
impl_handle_tuple!(
    6;
    (0, H0, A0, b0), (1, H1, A1, b1), (2, H2, A2, b2), (3, H3, A3, b3), (4, H4, A4, b4),
    (5, H5, A5, b5);
    [5, 4, 3, 2, 1, 0]
);
impl_handle_tuple!(
    7;
    (0, H0, A0, b0), (1, H1, A1, b1), (2, H2, A2, b2), (3, H3, A3, b3), (4, H4, A4, b4),
    (5, H5, A5, b5), (6, H6, A6, b6);
    [6, 5, 4, 3, 2, 1, 0]
);
impl_handle_tuple!(
    8;
    (0, H0, A0, b0), (1, H1, A1, b1), (2, H2, A2, b2), (3, H3, A3, b3), (4, H4, A4, b4),
    (5, H5, A5, b5), (6, H6, A6, b6), (7, H7, A7, b7);
    [7, 6, 5, 4, 3, 2, 1, 0]
);
