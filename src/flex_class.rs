//! The object lifecycle engine.
//!
//! A flexible class is a header type `O` whose fields include one [`Handle`] per
//! trailing array, grouped in a tuple. An object of that class is a single
//! allocation: the header at the start, then every array in handle order, each
//! realigned for its element type.
//!
//! ```text
//! [ header O | pad | array 0 | pad | array 1 | ... ]
//! ```
//!
//! [`make_in`] and [`try_make_in`] build such an object with strong failure
//! guarantees, [`destroy_in`] tears it down. [`FlexBox`] wraps both in an
//! owning pointer.

mod args;
mod boxed;
mod builder;
mod handle;
mod lifecycle;
mod list;
mod variants;

pub use args::*;
pub use boxed::FlexBox;
pub use handle::AFTER_HEADER;
pub use handle::Anchor;
pub use handle::Handle;
pub use handle::HandleDesc;
pub use lifecycle::*;
pub use list::ArrayArgs;
pub use list::HandleList;
pub use variants::*;

/// A header type that owns trailing arrays.
///
/// Implement it with [`impl_flex_class!`](crate::impl_flex_class) rather than
/// by hand.
///
/// # Safety
///
/// `handles` and `handles_mut` must return the same field of `self` on every
/// call, and that field must be part of `self`, not borrowed from elsewhere.
pub unsafe trait FlexClass: Sized {
    /// The tuple of handles, in array order.
    type Handles: HandleList;

    fn handles(&self) -> &Self::Handles;

    fn handles_mut(&mut self) -> &mut Self::Handles;
}

/// Implements [`FlexClass`] for a header type.
///
/// With a field name and a handle tuple type, the field holds the handles:
///
/// ```
/// use flexclass::Range;
/// use flexclass::AdjacentArray;
///
/// struct Message {
///     id:     u32,
///     arrays: (Range<String>, AdjacentArray<u8, 0>),
/// }
/// flexclass::impl_flex_class!(Message => arrays: (Range<String>, AdjacentArray<u8, 0>));
/// ```
///
/// With just the type, the class has no trailing arrays.
#[macro_export]
macro_rules! impl_flex_class {
    ($ty:ty => $field:ident : $handles:ty) => {
        unsafe impl $crate::FlexClass for $ty {
            type Handles = $handles;

            #[inline]
            fn handles(&self) -> &Self::Handles {
                return &self.$field;
            }

            #[inline]
            fn handles_mut(&mut self) -> &mut Self::Handles {
                return &mut self.$field;
            }
        }
    };
    ($ty:ty) => {
        unsafe impl $crate::FlexClass for $ty {
            type Handles = ();

            #[inline]
            fn handles(&self) -> &() {
                return &();
            }

            #[inline]
            fn handles_mut(&mut self) -> &mut () {
                return $crate::no_handles_mut();
            }
        }
    };
}

/// The handle tuple of a class without arrays.
#[doc(hidden)]
#[inline]
pub fn no_handles_mut<'a>() -> &'a mut () {
    // A unit is zero-sized, any aligned non-null pointer is a valid one.
    return unsafe { core::ptr::NonNull::<()>::dangling().as_mut() };
}

#[cfg(test)]
mod tests;
