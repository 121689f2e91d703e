use core::alloc::Layout;
use core::any::type_name;
use core::fmt;
use core::mem;
use core::mem::size_of;
use core::ptr;
use core::ptr::NonNull;

use super::ArrayArgs;
use super::FlexClass;
use super::HandleList;
use super::handle::header_end;
use super::handle::validate_handles;
use crate::alloc::AltAllocator;
#[cfg(feature = "std_alloc")]
use crate::alloc::Global;
use crate::layout::LayoutFold;
use crate::layout::Member;
use crate::types::ErrorKind;
use crate::types::FlexError;
use crate::types::FlexResult;

/// A raw pointer to a flexible object together with the layout of its
/// allocation. The layout is needed to give the memory back.
///
/// This is what [`make_in`] returns and [`destroy_in`] consumes. It does not
/// own anything: copying it does not copy the object, and dropping it leaks.
pub struct RawFlex<O> {
    ptr:    *mut O,
    layout: Layout,
}

impl<O> RawFlex<O> {
    /// The null object. Destroying it does nothing.
    pub const fn null() -> Self {
        return Self {
            ptr:    ptr::null_mut(),
            layout: Layout::new::<()>(),
        };
    }

    #[inline]
    pub(crate) const fn new(ptr: NonNull<O>, layout: Layout) -> Self {
        return Self {
            ptr:    ptr.as_ptr(),
            layout: layout,
        };
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        return self.ptr.is_null();
    }

    /// The header of the object.
    #[inline]
    pub const fn as_ptr(&self) -> *mut O {
        return self.ptr;
    }

    #[inline]
    pub fn as_non_null(&self) -> Option<NonNull<O>> {
        return NonNull::new(self.ptr);
    }

    /// The layout the object was allocated with: the header plus every array.
    #[inline]
    pub const fn layout(&self) -> Layout {
        return self.layout;
    }
}

impl<O> Clone for RawFlex<O> {
    fn clone(&self) -> Self {
        return *self;
    }
}

impl<O> Copy for RawFlex<O> {}

impl<O> fmt::Debug for RawFlex<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawFlex")
            .field("ptr", &self.ptr)
            .field("layout", &self.layout)
            .finish()
    }
}

/// Undoes a partially made object when construction fails or unwinds.
///
/// Before the header is written it only frees the allocation. After it drops
/// the header first. Arrays are owned by their builders and gone by the time
/// this runs.
struct DeleteGuard<'a, O, A: AltAllocator> {
    ptr:     NonNull<O>,
    layout:  Layout,
    alloc:   &'a A,
    created: bool,
}

impl<O, A: AltAllocator> DeleteGuard<'_, O, A> {
    #[inline]
    fn release(self) -> NonNull<O> {
        let ptr = self.ptr;
        mem::forget(self);
        return ptr;
    }
}

impl<O, A: AltAllocator> Drop for DeleteGuard<'_, O, A> {
    fn drop(&mut self) {
        log::debug!(
            "rolling back a partially made {} ({} bytes, header built: {})",
            type_name::<O>(),
            self.layout.size(),
            self.created
        );
        if self.created {
            unsafe { self.ptr.drop_in_place() };
        }
        unsafe { free_buffer(self.alloc, self.ptr.cast(), self.layout) };
    }
}

/// The alignment of the whole object: the largest of the header alignment and
/// every element alignment.
const fn object_align<O: FlexClass>() -> usize {
    let descs = <O::Handles as HandleList>::DESCS;
    let mut fold = LayoutFold::new();
    fold.push(Member::of::<O>());
    let mut i = 0;
    while i < descs.len() {
        fold.push(descs[i].member());
        i += 1;
    }
    return fold.align();
}

/// The layout of an object with the header `O` and the arrays described by
/// `args`.
fn object_layout<O, Args, E>(args: &Args) -> FlexResult<Layout>
where
    O: FlexClass,
    Args: ArrayArgs<O::Handles, E>,
{
    let header = size_of::<O>();
    let arrays = args.required_bytes(header)?;
    let Some(size) = header.checked_add(arrays) else {
        return Err(FlexError::new(ErrorKind::SizeOverflow));
    };
    let align = const { object_align::<O>() };
    let Ok(layout) = Layout::from_size_align(size, align) else {
        return Err(FlexError::new(ErrorKind::LayoutFailure));
    };
    return Ok(layout);
}

fn allocate_buffer<A: AltAllocator>(alloc: &A, layout: Layout) -> FlexResult<NonNull<u8>> {
    if layout.size() == 0 {
        // Nothing to hold, so nothing is allocated. The pointer still has to
        // be aligned for the header.
        let dangling = ptr::without_provenance_mut::<u8>(layout.align());
        return Ok(unsafe { NonNull::new_unchecked(dangling) });
    }
    let buffer = alloc.allocate(layout)?;
    return Ok(buffer.cast());
}

unsafe fn free_buffer<A: AltAllocator>(alloc: &A, ptr: NonNull<u8>, layout: Layout) {
    if layout.size() != 0 {
        unsafe { alloc.deallocate(ptr, layout) };
    }
}

/// Makes a flexible object in memory from `alloc`.
///
/// `args` holds one initializer per trailing array, in handle order. Steps,
/// in order: compute the layout, allocate it, construct the header by calling
/// `ctor` with every handle unset, then build the arrays in order. Once every
/// array is built each handle is given its location.
///
/// If anything fails, by returning `Err` or by panicking, everything already
/// built is dropped in reverse order of construction, the memory is given
/// back, and the failure continues to the caller. Nothing leaks.
///
/// # Errors
///
/// `E` is whatever the header constructor or an array initializer returns, or
/// a [`FlexError`] converted into `E` when the size overflows, the layout is
/// invalid, or the allocation fails.
pub fn try_make_in<O, A, Args, E, F>(alloc: &A, args: Args, ctor: F) -> Result<RawFlex<O>, E>
where
    O: FlexClass,
    A: AltAllocator,
    Args: ArrayArgs<O::Handles, E>,
    E: From<FlexError>,
    F: FnOnce(O::Handles) -> Result<O, E>,
{
    const { validate_handles(<O::Handles as HandleList>::DESCS) };

    let layout = object_layout::<O, Args, E>(&args)?;
    let buffer = allocate_buffer(alloc, layout)?;
    log::trace!(
        "allocated {} bytes aligned to {} for {}",
        layout.size(),
        layout.align(),
        type_name::<O>()
    );

    let mut guard = DeleteGuard {
        ptr:     buffer.cast::<O>(),
        layout:  layout,
        alloc:   alloc,
        created: false,
    };

    let header = ctor(<O::Handles as HandleList>::unset())?;
    unsafe { guard.ptr.write(header) };
    guard.created = true;

    let cursor = unsafe { header_end(guard.ptr) };
    let limit = unsafe { buffer.add(layout.size()) };
    unsafe { args.build(guard.ptr, cursor, limit) }?;

    return Ok(RawFlex::new(guard.release(), layout));
}

/// [`try_make_in`] with an infallible header constructor. The only errors are
/// the ones of the engine itself.
pub fn make_in<O, A, Args, F>(alloc: &A, args: Args, ctor: F) -> FlexResult<RawFlex<O>>
where
    O: FlexClass,
    A: AltAllocator,
    Args: ArrayArgs<O::Handles, FlexError>,
    F: FnOnce(O::Handles) -> O,
{
    return try_make_in(alloc, args, |handles| Ok(ctor(handles)));
}

/// [`try_make_in`] using the global allocator.
#[cfg(feature = "std_alloc")]
pub fn try_make<O, Args, E, F>(args: Args, ctor: F) -> Result<RawFlex<O>, E>
where
    O: FlexClass,
    Args: ArrayArgs<O::Handles, E>,
    E: From<FlexError>,
    F: FnOnce(O::Handles) -> Result<O, E>,
{
    return try_make_in(&Global, args, ctor);
}

/// [`make_in`] using the global allocator.
#[cfg(feature = "std_alloc")]
pub fn make<O, Args, F>(args: Args, ctor: F) -> FlexResult<RawFlex<O>>
where
    O: FlexClass,
    Args: ArrayArgs<O::Handles, FlexError>,
    F: FnOnce(O::Handles) -> O,
{
    return make_in(&Global, args, ctor);
}

/// Destroys a flexible object and gives its memory back to `alloc`.
///
/// The arrays are dropped last to first, each back to front, then the header
/// is dropped and the memory freed. A null object is ignored.
///
/// # Safety
///
/// `raw` must be null or come from [`make_in`] or [`try_make_in`] with the
/// same allocator, and must not be used again.
pub unsafe fn destroy_in<O: FlexClass, A: AltAllocator>(alloc: &A, raw: RawFlex<O>) {
    let Some(owner) = raw.as_non_null() else {
        return;
    };
    const { validate_handles(<O::Handles as HandleList>::DESCS) };
    log::trace!("destroying {} ({} bytes)", type_name::<O>(), raw.layout.size());

    let handles = unsafe { owner.as_ref() }.handles();
    unsafe { handles.drop_arrays(owner) };
    unsafe { owner.drop_in_place() };
    unsafe { free_buffer(alloc, owner.cast(), raw.layout) };
}

/// [`destroy_in`] using the global allocator.
///
/// # Safety
///
/// `raw` must be null or come from [`make`] or [`try_make`].
#[cfg(feature = "std_alloc")]
pub unsafe fn destroy<O: FlexClass>(raw: RawFlex<O>) {
    unsafe { destroy_in(&Global, raw) };
}
