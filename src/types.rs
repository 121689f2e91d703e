mod errors;

pub use errors::*;

pub use crate::alloc::AltAllocator;
#[cfg(feature = "std_alloc")]
pub use crate::alloc::Global;
