//! # Flexible Classes
//!
//! The `flexclass` crate builds objects made of a header and several trailing
//! arrays, all inside one `#[no_std]` allocation. The header is an ordinary
//! struct. Each trailing array is tracked by a handle stored in the header, and
//! the arrays are laid out one after the other right behind it.
//!
//! Keeping everything in one block means one allocation instead of one per
//! array, and the arrays sit next to the header in memory. The cost is that the
//! object can never grow, the lengths are fixed when it is made.
//!
//! ```
//! use flexclass::AdjacentArray;
//! use flexclass::FlexBox;
//! use flexclass::Range;
//! use flexclass::arg_iter;
//!
//! struct Mesh {
//!     name:   &'static str,
//!     arrays: (Range<[f32; 3]>, AdjacentArray<u16, 0>),
//! }
//! flexclass::impl_flex_class!(Mesh => arrays: (Range<[f32; 3]>, AdjacentArray<u16, 0>));
//!
//! let verts: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
//! let mesh = FlexBox::new((arg_iter(3, verts), 3usize), |arrays| Mesh { name: "tri", arrays }).unwrap();
//!
//! assert_eq!(mesh.name, "tri");
//! assert_eq!(mesh.arrays.0.len(), 3);
//! assert_eq!(mesh.slice(|m| &m.arrays.0)[1], [1.0, 0.0, 0.0]);
//! ```
//!
//! Construction is all or nothing. If the header constructor or any element
//! fails, by returning an error or by panicking, everything already built is
//! dropped in reverse order and the memory is given back before the failure
//! reaches the caller.
//!
//! The layout engine under [`layout`] is usable on its own: it computes, at
//! compile time, where members land in a `#[repr(C)]` style record.
//!
//! Lastly, the allocator API is not stable yet, so this crate provides an
//! alternate trait `AltAllocator` that works like the `Allocator` trait and is
//! what every `*_in` function takes.
//!
//! # Feature Flags
//! * `std_alloc` - This feature enables a wrapper called `Global` that implements
//!   `AltAllocator` using the standard allocator APIs, along with `make`,
//!   `try_make`, `destroy` and `FlexBox::new` that use it.
//!
//! * `experimental_allocator` - This feature enables the use of the unstable `Allocator` trait for
//!   custom memory allocators. Further, if used in conjunction with `std_alloc` this will re-export
//!   the `Global` type from the `std` crate instead of the `Global` wrapper defined in this crate.
//!
//! * `alloc_api2` - This feature implements `AltAllocator` for every `allocator-api2`
//!   allocator. It is ignored when `experimental_allocator` is enabled.

#![no_std]
#![cfg_attr(feature = "experimental_allocator", feature(allocator_api))]

#[cfg(any(feature = "std_alloc", test))]
extern crate std;

pub mod alloc;
mod flex_class;
pub mod layout;
pub mod types;

pub use flex_class::*;
