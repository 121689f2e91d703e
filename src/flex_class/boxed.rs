use core::alloc::Layout;
use core::fmt;
use core::marker::PhantomData;
use core::mem::ManuallyDrop;
use core::mem::size_of;
use core::ops::Deref;
use core::ptr;
use core::ptr::NonNull;
use core::slice;

use super::ArrayArgs;
use super::FlexClass;
use super::Handle;
use super::RawFlex;
use super::destroy_in;
use super::try_make_in;
use crate::alloc::AltAllocator;
#[cfg(feature = "std_alloc")]
use crate::alloc::Global;
use crate::types::FlexError;
use crate::types::FlexResult;

/// An owning pointer to a flexible object, destroyed when dropped.
///
/// It derefs to the header. The header is not handed out mutably, since
/// replacing a handle would lose track of its array; use
/// [`FlexBox::header_mut`] when that is really needed. The elements of the
/// arrays are reached through [`FlexBox::slice`] and [`FlexBox::slice_mut`].
pub struct FlexBox<O: FlexClass, A: AltAllocator> {
    ptr:    NonNull<O>,
    layout: Layout,
    alloc:  A,
    _owns:  PhantomData<O>,
}

unsafe impl<O: FlexClass + Send, A: AltAllocator + Send> Send for FlexBox<O, A> {}
unsafe impl<O: FlexClass + Sync, A: AltAllocator + Sync> Sync for FlexBox<O, A> {}

impl<O: FlexClass, A: AltAllocator> FlexBox<O, A> {
    /// Makes an object in memory from `alloc`. See [`try_make_in`].
    pub fn try_new_in<Args, E, F>(alloc: A, args: Args, ctor: F) -> Result<Self, E>
    where
        Args: ArrayArgs<O::Handles, E>,
        E: From<FlexError>,
        F: FnOnce(O::Handles) -> Result<O, E>,
    {
        let raw = try_make_in(&alloc, args, ctor)?;
        return Ok(unsafe { Self::from_raw_in(raw, alloc) });
    }

    /// Makes an object in memory from `alloc`, with an infallible header
    /// constructor.
    pub fn new_in<Args, F>(alloc: A, args: Args, ctor: F) -> FlexResult<Self>
    where
        Args: ArrayArgs<O::Handles, FlexError>,
        F: FnOnce(O::Handles) -> O,
    {
        return Self::try_new_in(alloc, args, |handles| Ok(ctor(handles)));
    }

    /// Takes ownership of an object made with `alloc`.
    ///
    /// # Safety
    ///
    /// `raw` must come from [`try_make_in`] or [`super::make_in`] with an
    /// allocator that `alloc` can free, and must not be used or destroyed
    /// elsewhere.
    ///
    /// # Panics
    ///
    /// If `raw` is null.
    pub unsafe fn from_raw_in(raw: RawFlex<O>, alloc: A) -> Self {
        let Some(ptr) = raw.as_non_null() else {
            panic!("cannot box a null flexible object");
        };
        return Self {
            ptr:    ptr,
            layout: raw.layout(),
            alloc:  alloc,
            _owns:  PhantomData,
        };
    }

    /// Gives up ownership. The object has to be destroyed with
    /// [`destroy_in`] and the returned allocator.
    pub fn into_raw(self) -> (RawFlex<O>, A) {
        let this = ManuallyDrop::new(self);
        let alloc = unsafe { ptr::read(&this.alloc) };
        return (RawFlex::new(this.ptr, this.layout), alloc);
    }

    #[inline]
    pub const fn as_ptr(&self) -> NonNull<O> {
        return self.ptr;
    }

    /// The layout of the whole allocation.
    #[inline]
    pub const fn layout(&self) -> Layout {
        return self.layout;
    }

    #[inline]
    pub const fn allocator(&self) -> &A {
        return &self.alloc;
    }

    /// # Safety
    ///
    /// No handle may be overwritten or moved out.
    #[inline]
    pub unsafe fn header_mut(&mut self) -> &mut O {
        return unsafe { self.ptr.as_mut() };
    }

    /// The first element of the array of the handle `select` picks.
    ///
    /// ```
    /// use flexclass::AdjacentArray;
    /// use flexclass::FlexBox;
    /// use flexclass::arg_with;
    ///
    /// struct Squares {
    ///     arrays: (AdjacentArray<u64>,),
    /// }
    /// flexclass::impl_flex_class!(Squares => arrays: (AdjacentArray<u64>,));
    ///
    /// let squares = FlexBox::new((arg_with(4, |i| (i * i) as u64),), |arrays| Squares { arrays }).unwrap();
    /// let third = unsafe { squares.begin(|s| &s.arrays.0).add(2).read() };
    /// assert_eq!(third, 4);
    /// ```
    pub fn begin<H, S>(&self, select: S) -> NonNull<H::Elem>
    where
        H: Handle,
        S: FnOnce(&O) -> &H,
    {
        let handle = select(&**self);
        self.assert_owned(handle);
        return unsafe { handle.begin(self.ptr) };
    }

    /// The elements of the array of the handle `select` picks. The handle has
    /// to track its end.
    ///
    /// # Panics
    ///
    /// If `select` returns a handle that is not part of this header.
    pub fn slice<H, S>(&self, select: S) -> &[H::Elem]
    where
        H: Handle,
        S: FnOnce(&O) -> &H,
    {
        let (data, len) = self.extent(select);
        return unsafe { slice::from_raw_parts(data.as_ptr(), len) };
    }

    /// Mutable version of [`FlexBox::slice`].
    pub fn slice_mut<H, S>(&mut self, select: S) -> &mut [H::Elem]
    where
        H: Handle,
        S: FnOnce(&O) -> &H,
    {
        let (data, len) = self.extent(select);
        return unsafe { slice::from_raw_parts_mut(data.as_ptr(), len) };
    }

    fn extent<H, S>(&self, select: S) -> (NonNull<H::Elem>, usize)
    where
        H: Handle,
        S: FnOnce(&O) -> &H,
    {
        const {
            assert!(H::TRACKS_END, "only handles that track their end can produce a slice");
            assert!(size_of::<H::Elem>() != 0, "zero-sized trailing array elements are not supported");
        };
        let handle = select(&**self);
        self.assert_owned(handle);
        let Some(end) = (unsafe { handle.end(self.ptr) }) else {
            return (NonNull::dangling(), 0);
        };
        let begin = unsafe { handle.begin(self.ptr) };
        let len = unsafe { end.offset_from(begin) } as usize;
        return (begin, len);
    }

    fn assert_owned<H>(&self, handle: &H) {
        let start = self.ptr.as_ptr().addr();
        let at = ptr::from_ref(handle).addr();
        assert!(
            at >= start && at + size_of::<H>() <= start + size_of::<O>(),
            "the selected handle is not part of this object"
        );
    }
}

#[cfg(feature = "std_alloc")]
impl<O: FlexClass> FlexBox<O, Global> {
    /// Makes an object with the global allocator. See [`try_make_in`].
    pub fn try_new<Args, E, F>(args: Args, ctor: F) -> Result<Self, E>
    where
        Args: ArrayArgs<O::Handles, E>,
        E: From<FlexError>,
        F: FnOnce(O::Handles) -> Result<O, E>,
    {
        return Self::try_new_in(Global, args, ctor);
    }

    /// Makes an object with the global allocator and an infallible header
    /// constructor.
    pub fn new<Args, F>(args: Args, ctor: F) -> FlexResult<Self>
    where
        Args: ArrayArgs<O::Handles, FlexError>,
        F: FnOnce(O::Handles) -> O,
    {
        return Self::new_in(Global, args, ctor);
    }
}

impl<O: FlexClass, A: AltAllocator> Deref for FlexBox<O, A> {
    type Target = O;

    #[inline]
    fn deref(&self) -> &O {
        return unsafe { self.ptr.as_ref() };
    }
}

impl<O: FlexClass, A: AltAllocator> Drop for FlexBox<O, A> {
    fn drop(&mut self) {
        unsafe { destroy_in(&self.alloc, RawFlex::new(self.ptr, self.layout)) };
    }
}

impl<O: FlexClass + fmt::Debug, A: AltAllocator> fmt::Debug for FlexBox<O, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}
