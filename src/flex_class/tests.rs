use core::alloc::Layout;
use core::cell::Cell;
use core::cell::RefCell;
use core::mem::align_of;
use core::mem::size_of;
use core::ptr;
use core::ptr::NonNull;
use std::boxed::Box;
use std::format;
use std::panic::AssertUnwindSafe;
use std::panic::catch_unwind;
use std::rc::Rc;
use std::string::String;
use std::thread_local;
use std::vec;
use std::vec::Vec;

use super::*;
use crate::layout::num_required_bytes;
use crate::types::AllocError;
use crate::types::AltAllocator;
use crate::types::ErrorKind;
use crate::types::FlexError;

#[derive(Default)]
struct Counters {
    allocs:    Cell<usize>,
    frees:     Cell<usize>,
    allocated: Cell<usize>,
    freed:     Cell<usize>,
}

/// Counts every allocation and free that goes through it.
#[derive(Clone, Default)]
struct Tracker(Rc<Counters>);

impl Tracker {
    fn allocs(&self) -> usize {
        return self.0.allocs.get();
    }

    fn frees(&self) -> usize {
        return self.0.frees.get();
    }

    fn assert_balanced(&self) {
        assert_eq!(self.0.allocs.get(), self.0.frees.get());
        assert_eq!(self.0.allocated.get(), self.0.freed.get());
    }
}

unsafe impl AltAllocator for Tracker {
    fn allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
        let ptr = unsafe { std::alloc::alloc(layout) };
        let Some(ptr) = NonNull::new(ptr) else {
            return Err(AllocError);
        };
        self.0.allocs.set(self.0.allocs.get() + 1);
        self.0.allocated.set(self.0.allocated.get() + layout.size());
        return Ok(NonNull::slice_from_raw_parts(ptr, layout.size()));
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        self.0.frees.set(self.0.frees.get() + 1);
        self.0.freed.set(self.0.freed.get() + layout.size());
        unsafe { std::alloc::dealloc(ptr.as_ptr(), layout) };
    }
}

struct NoAlloc;

unsafe impl AltAllocator for NoAlloc {
    fn allocate(&self, _: Layout) -> Result<NonNull<[u8]>, AllocError> {
        return Err(AllocError);
    }
    unsafe fn deallocate(&self, _: NonNull<u8>, _: Layout) {
        return;
    }
}

thread_local! {
    static NEXT_ID: Cell<usize> = const { Cell::new(0) };
    static FAIL_AT: Cell<usize> = const { Cell::new(usize::MAX) };
    static DROPPED: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

fn fail_at(id: usize) {
    FAIL_AT.set(id);
}

fn dropped() -> Vec<usize> {
    return DROPPED.with_borrow(|d| d.clone());
}

#[derive(Debug, PartialEq)]
enum Boom {
    Thrown,
    Flex(FlexError),
}

impl From<FlexError> for Boom {
    fn from(err: FlexError) -> Self {
        return Boom::Flex(err);
    }
}

/// Gets a sequential id on construction and logs it when dropped. Fails once
/// the id reaches the one set with `fail_at`.
#[derive(Debug)]
struct Thrower {
    id: usize,
}

impl Thrower {
    fn try_new() -> Result<Self, Boom> {
        let id = NEXT_ID.get();
        if id == FAIL_AT.get() {
            return Err(Boom::Thrown);
        }
        NEXT_ID.set(id + 1);
        return Ok(Self { id });
    }
}

impl Default for Thrower {
    fn default() -> Self {
        let Ok(thrower) = Self::try_new() else {
            panic!("thrower {} refused to be built", NEXT_ID.get());
        };
        return thrower;
    }
}

impl Drop for Thrower {
    fn drop(&mut self) {
        DROPPED.with_borrow_mut(|d| d.push(self.id));
    }
}

struct Empty;
crate::impl_flex_class!(Empty);

struct Plain {
    value: u32,
}
crate::impl_flex_class!(Plain);

struct Numbers {
    arrays: (Range<u64>,),
}
crate::impl_flex_class!(Numbers => arrays: (Range<u64>,));

struct Padded {
    tag:    u8,
    arrays: (AdjacentRange<u8>, AdjacentRange<i64, 0>),
}
crate::impl_flex_class!(Padded => arrays: (AdjacentRange<u8>, AdjacentRange<i64, 0>));

struct Chained {
    arrays: (Range<String>, AdjacentRange<u32, 0>, AdjacentArray<u16, 1>),
}
crate::impl_flex_class!(Chained => arrays: (Range<String>, AdjacentRange<u32, 0>, AdjacentArray<u16, 1>));

struct CharLong {
    c:      u8,
    arrays: (AdjacentArray<i64>,),
}
crate::impl_flex_class!(CharLong => arrays: (AdjacentArray<i64>,));

struct Buffer {
    len:    usize,
    arrays: (Array<u32>,),
}
crate::impl_flex_class!(Buffer => arrays: (Array<u32>,));

struct Pair {
    arrays: (Range<Thrower>, Range<Thrower>),
}
crate::impl_flex_class!(Pair => arrays: (Range<Thrower>, Range<Thrower>));

struct Guarded {
    head:   Thrower,
    arrays: (Range<Thrower>, AdjacentRange<Thrower, 0>),
}
crate::impl_flex_class!(Guarded => arrays: (Range<Thrower>, AdjacentRange<Thrower, 0>));

#[allow(dead_code)]
struct Triple {
    first:  Thrower,
    second: Thrower,
    third:  Thrower,
}
crate::impl_flex_class!(Triple);

struct Mixed {
    arrays: (Range<u8>, Range<u64>, Range<u16>),
}
crate::impl_flex_class!(Mixed => arrays: (Range<u8>, Range<u64>, Range<u16>));

#[test]
fn handle_descriptions() {
    assert_eq!(<Range<u64> as Handle>::ANCHOR, Anchor::Stored);
    assert_eq!(<AdjacentArray<u8> as Handle>::ANCHOR, Anchor::Header);
    assert_eq!(<AdjacentRange<u8, 2> as Handle>::ANCHOR, Anchor::After(2));

    let descs = <<Chained as FlexClass>::Handles as HandleList>::DESCS;
    assert_eq!(descs.len(), 3);
    assert!(descs[0].tracks_end() && descs[0].needs_drop());
    assert!(descs[1].tracks_end() && !descs[1].needs_drop());
    assert!(!descs[2].tracks_end());
    assert_eq!(descs[2].member().size(), 0);
    assert_eq!(descs[2].member().align(), align_of::<u16>());
}

#[test]
fn empty_class_allocates_nothing() {
    let tracker = Tracker::default();
    let raw = make_in(&tracker, (), |_| Empty).unwrap();
    assert!(!raw.is_null());
    assert_eq!(raw.layout().size(), 0);
    assert_eq!(tracker.allocs(), 0);

    unsafe { destroy_in(&tracker, raw) };
    assert_eq!(tracker.frees(), 0);
}

#[test]
fn header_only() {
    let tracker = Tracker::default();
    let raw = make_in(&tracker, (), |_| Plain { value: 42 }).unwrap();
    assert_eq!(raw.layout(), Layout::new::<Plain>());
    assert_eq!(unsafe { (*raw.as_ptr()).value }, 42);

    unsafe { destroy_in(&tracker, raw) };
    assert_eq!(tracker.allocs(), 1);
    tracker.assert_balanced();
}

#[test]
fn single_default_array() {
    let tracker = Tracker::default();
    let raw = make_in(&tracker, (10usize,), |arrays| Numbers { arrays }).unwrap();
    let numbers = unsafe { &*raw.as_ptr() };

    assert_eq!(numbers.arrays.0.len(), 10);
    assert!(numbers.arrays.0.as_slice().iter().all(|n| *n == 0));
    assert_eq!(raw.layout().size(), size_of::<Numbers>() + 10 * size_of::<u64>());
    assert_eq!(raw.layout().align(), align_of::<Numbers>());

    // The array follows the header directly.
    let header_end = raw.as_ptr().addr() + size_of::<Numbers>();
    assert_eq!(numbers.arrays.0.as_ptr().as_ptr().addr(), header_end);

    unsafe { destroy_in(&tracker, raw) };
    tracker.assert_balanced();
}

#[test]
fn zero_length_array() {
    let tracker = Tracker::default();
    let raw = make_in(&tracker, (arg(0),), |arrays| Numbers { arrays }).unwrap();
    let numbers = unsafe { &*raw.as_ptr() };
    assert!(numbers.arrays.0.is_empty());
    assert_eq!(raw.layout().size(), size_of::<Numbers>());

    unsafe { destroy_in(&tracker, raw) };
    tracker.assert_balanced();
}

#[test]
fn arrays_realign_for_wider_elements() {
    let tracker = Tracker::default();
    let raw = make_in(
        &tracker,
        (arg_with(1, |_| 7u8), arg_with(2, |i| i as i64 - 1)),
        |arrays| Padded { tag: 3, arrays },
    )
    .unwrap();
    let owner = NonNull::new(raw.as_ptr()).unwrap();
    let padded = unsafe { owner.as_ref() };

    let bytes = unsafe { padded.arrays.0.begin(owner) };
    let longs = unsafe { padded.arrays.1.begin(owner) };
    // One byte, then padding up to the next 8 byte boundary.
    assert_eq!(bytes.as_ptr().addr() % align_of::<i64>(), 0);
    assert_eq!(longs.as_ptr().addr() - bytes.as_ptr().addr(), 8);
    assert_eq!(raw.layout().size(), size_of::<Padded>() + 8 + 2 * size_of::<i64>());

    assert_eq!(padded.tag, 3);
    assert_eq!(unsafe { bytes.read() }, 7);
    assert_eq!(unsafe { longs.read() }, -1);
    assert_eq!(unsafe { longs.add(1).read() }, 0);

    unsafe { destroy_in(&tracker, raw) };
    tracker.assert_balanced();
}

#[test]
fn longs_realign_after_a_single_char() {
    let tracker = Tracker::default();
    let raw = make_in(&tracker, (arg_with(1000, |i| i as i64),), |arrays| CharLong { c: 1, arrays }).unwrap();
    let owner = NonNull::new(raw.as_ptr()).unwrap();
    let header = unsafe { owner.as_ref() };

    // The header is a single byte, the longs start at the next 8 byte boundary.
    let longs = unsafe { header.arrays.0.begin(owner) };
    assert_eq!(longs.as_ptr().addr() - ptr::from_ref(&header.c).addr(), 8);
    assert_eq!(raw.layout().size(), 8 + 1000 * size_of::<i64>());
    assert_eq!(raw.layout().align(), align_of::<i64>());

    assert_eq!(header.c, 1);
    assert_eq!(unsafe { longs.read() }, 0);
    assert_eq!(unsafe { longs.add(999).read() }, 999);
    assert!((0..1000).all(|i| unsafe { longs.add(i).read() } == i as i64));

    unsafe { destroy_in(&tracker, raw) };
    tracker.assert_balanced();
}

#[test]
fn unset_range_of_zero_sized_is_empty() {
    let units = <Range<()> as Handle>::unset();
    assert_eq!(units.len(), 0);
    assert!(units.is_empty());
    assert!(units.as_slice().is_empty());
}

#[test]
fn adjacent_arrays_follow_their_sibling() {
    let tracker = Tracker::default();
    let boxed = FlexBox::new_in(
        tracker.clone(),
        (
            arg_iter(3, ["a", "bc", "def"]),
            arg_with(4, |i| (i * 10) as u32),
            arg_with(5, |i| i as u16),
        ),
        |arrays| Chained { arrays },
    )
    .unwrap();

    let words = boxed.slice(|c| &c.arrays.0);
    assert_eq!(words, ["a", "bc", "def"]);
    assert_eq!(boxed.slice(|c| &c.arrays.1), [0, 10, 20, 30]);

    let words_end = boxed.arrays.0.end_ptr().as_ptr().addr();
    let tens = boxed.begin(|c| &c.arrays.1);
    assert_eq!(tens.as_ptr().addr(), words_end);

    let shorts = boxed.begin(|c| &c.arrays.2);
    assert_eq!(shorts.as_ptr().addr(), tens.as_ptr().addr() + 4 * size_of::<u32>());
    let shorts: Vec<u16> = (0..5).map(|i| unsafe { shorts.add(i).read() }).collect();
    assert_eq!(shorts, [0, 1, 2, 3, 4]);

    drop(boxed);
    assert_eq!(tracker.allocs(), 1);
    tracker.assert_balanced();
}

#[test]
fn array_handle_keeps_length_elsewhere() {
    let tracker = Tracker::default();
    let raw = make_in(&tracker, (arg_with(6, |i| 1u32 << i),), |arrays| Buffer { len: 6, arrays }).unwrap();
    let buffer = unsafe { &*raw.as_ptr() };
    let values = unsafe { buffer.arrays.0.as_slice(buffer.len) };
    assert_eq!(values, [1, 2, 4, 8, 16, 32]);

    unsafe { destroy_in(&tracker, raw) };
    tracker.assert_balanced();
}

#[test]
fn elements_drop_in_reverse() {
    let tracker = Tracker::default();
    let raw = make_in(&tracker, (arg(10), arg(0)), |arrays| Pair { arrays }).unwrap();
    assert!(dropped().is_empty());

    unsafe { destroy_in(&tracker, raw) };
    assert_eq!(dropped(), [9, 8, 7, 6, 5, 4, 3, 2, 1, 0]);
    tracker.assert_balanced();
}

#[test]
fn destroy_drops_arrays_then_header() {
    let tracker = Tracker::default();
    // The header is built first and gets id 0.
    let raw = make_in(&tracker, (arg(3), arg(2)), |arrays| Guarded {
        head: Thrower::default(),
        arrays,
    })
    .unwrap();
    let guarded = unsafe { &*raw.as_ptr() };
    assert_eq!(guarded.head.id, 0);

    unsafe { destroy_in(&tracker, raw) };
    assert_eq!(dropped(), [5, 4, 3, 2, 1, 0]);
    tracker.assert_balanced();
}

#[test]
fn failing_header_frees_memory() {
    let tracker = Tracker::default();
    let result = try_make_in(&tracker, (arg(4),), |_: (Range<u64>,)| -> Result<Numbers, Boom> {
        return Err(Boom::Thrown);
    });
    assert_eq!(result.err(), Some(Boom::Thrown));
    assert_eq!(tracker.allocs(), 1);
    tracker.assert_balanced();
}

#[test]
fn failing_header_field_unwinds_earlier_fields() {
    let tracker = Tracker::default();
    fail_at(2);
    let result = try_make_in(&tracker, (), |_| -> Result<Triple, Boom> {
        let first = Thrower::try_new()?;
        let second = Thrower::try_new()?;
        let third = Thrower::try_new()?;
        return Ok(Triple { first, second, third });
    });
    assert_eq!(result.err(), Some(Boom::Thrown));
    assert_eq!(dropped(), [1, 0]);
    tracker.assert_balanced();
}

#[test]
fn panicking_header_frees_memory() {
    let tracker = Tracker::default();
    let result = catch_unwind(AssertUnwindSafe(|| {
        return make_in(&tracker, (arg(8),), |_| -> Numbers { panic!("header") });
    }));
    assert!(result.is_err());
    assert_eq!(tracker.allocs(), 1);
    tracker.assert_balanced();
}

#[test]
fn failing_element_unwinds_everything() {
    let tracker = Tracker::default();
    fail_at(15);
    let result = try_make_in(
        &tracker,
        (try_arg_with(10, |_| Thrower::try_new()), try_arg_with(10, |_| Thrower::try_new())),
        |arrays| Ok(Pair { arrays }),
    );
    assert_eq!(result.err(), Some(Boom::Thrown));
    // The partial second array goes first, then the whole first one.
    assert_eq!(dropped(), [14, 13, 12, 11, 10, 9, 8, 7, 6, 5, 4, 3, 2, 1, 0]);
    tracker.assert_balanced();
}

#[test]
fn panicking_element_unwinds_everything() {
    let tracker = Tracker::default();
    fail_at(15);
    let result = catch_unwind(AssertUnwindSafe(|| {
        return make_in(&tracker, (arg(10), arg(10)), |arrays| Pair { arrays });
    }));
    assert!(result.is_err());
    assert_eq!(dropped(), [14, 13, 12, 11, 10, 9, 8, 7, 6, 5, 4, 3, 2, 1, 0]);
    tracker.assert_balanced();
}

#[test]
fn failing_element_drops_header_after_arrays() {
    let tracker = Tracker::default();
    fail_at(4);
    let result = catch_unwind(AssertUnwindSafe(|| {
        return make_in(&tracker, (arg(2), arg(2)), |arrays| Guarded {
            head: Thrower::default(),
            arrays,
        });
    }));
    assert!(result.is_err());
    assert_eq!(dropped(), [3, 2, 1, 0]);
    tracker.assert_balanced();
}

#[test]
fn allocation_failure_skips_construction() {
    let called = Cell::new(false);
    let result = make_in(&NoAlloc, (arg(4),), |arrays| {
        called.set(true);
        return Numbers { arrays };
    });
    assert_eq!(result.err().map(FlexError::kind), Some(ErrorKind::AllocFailure));
    assert!(!called.get());
}

#[test]
fn oversized_requests_are_rejected() {
    let tracker = Tracker::default();

    let result = make_in(&tracker, (arg(usize::MAX / 4),), |arrays| Numbers { arrays });
    assert_eq!(result.err().map(FlexError::kind), Some(ErrorKind::SizeOverflow));

    let result = make_in(&tracker, (arg(isize::MAX as usize), arg(0), arg(0)), |arrays| Mixed { arrays });
    assert_eq!(result.err().map(FlexError::kind), Some(ErrorKind::LayoutFailure));

    let result = try_make_in(&tracker, (arg(usize::MAX / 4),), |arrays| Ok::<_, Boom>(Numbers { arrays }));
    assert_eq!(result.err(), Some(Boom::Flex(FlexError::new(ErrorKind::SizeOverflow))));

    assert_eq!(tracker.allocs(), 0);
}

#[test]
fn null_destroy_does_nothing() {
    let tracker = Tracker::default();
    unsafe { destroy_in(&tracker, RawFlex::<Numbers>::null()) };
    assert!(RawFlex::<Numbers>::null().is_null());
    assert_eq!(tracker.frees(), 0);
}

#[test]
#[should_panic(expected = "iterator ran out")]
fn short_iterator_panics() {
    let _ = make_in(&Tracker::default(), (arg_iter(4, [1u64, 2]),), |arrays| Numbers { arrays });
}

#[test]
fn boxed_round_trip_through_raw() {
    let tracker = Tracker::default();
    let mut boxed = FlexBox::new_in(tracker.clone(), (arg_with(3, |i| i as u64),), |arrays| Numbers { arrays }).unwrap();
    boxed.slice_mut(|n| &n.arrays.0)[1] = 99;
    assert_eq!(boxed.slice(|n| &n.arrays.0), [0, 99, 2]);
    assert_eq!(boxed.layout().size(), size_of::<Numbers>() + 3 * size_of::<u64>());

    let (raw, alloc) = boxed.into_raw();
    assert_eq!(tracker.frees(), 0);
    let boxed = unsafe { FlexBox::from_raw_in(raw, alloc) };
    assert_eq!(boxed.arrays.0.as_slice(), [0, 99, 2]);
    assert_eq!(format!("{:?}", boxed.arrays.0), "[0, 99, 2]");

    drop(boxed);
    tracker.assert_balanced();
}

#[test]
#[should_panic(expected = "not part of this object")]
fn slice_rejects_foreign_handles() {
    let one = FlexBox::new_in(Tracker::default(), (arg(2),), |arrays| Numbers { arrays }).unwrap();
    let stray: &'static Range<u64> = Box::leak(Box::new(<Range<u64> as Handle>::unset()));
    let _ = one.slice(|_| stray);
}

#[test]
fn random_lengths_stay_in_bounds() {
    fastrand::seed(0x5eed_f1e7);
    for _ in 0..200 {
        let lens = [fastrand::usize(0..40), fastrand::usize(0..40), fastrand::usize(0..40)];
        let tracker = Tracker::default();
        let raw = make_in(
            &tracker,
            (
                arg_with(lens[0], |i| i as u8),
                arg_with(lens[1], |i| i as u64 * 3),
                arg_with(lens[2], |i| i as u16 + 7),
            ),
            |arrays| Mixed { arrays },
        )
        .unwrap();

        let mut expected = size_of::<Mixed>();
        expected += num_required_bytes::<u8>(expected, lens[0]).unwrap();
        expected += num_required_bytes::<u64>(expected, lens[1]).unwrap();
        expected += num_required_bytes::<u16>(expected, lens[2]).unwrap();
        assert_eq!(raw.layout().size(), expected);

        let mixed = unsafe { &*raw.as_ptr() };
        let (a, b, c) = &mixed.arrays;
        let limit = raw.as_ptr().addr() + raw.layout().size();
        let mut at = raw.as_ptr().addr() + size_of::<Mixed>();
        for (begin, end, align) in [
            (a.as_ptr().as_ptr().addr(), a.end_ptr().as_ptr().addr(), align_of::<u8>()),
            (b.as_ptr().as_ptr().addr(), b.end_ptr().as_ptr().addr(), align_of::<u64>()),
            (c.as_ptr().as_ptr().addr(), c.end_ptr().as_ptr().addr(), align_of::<u16>()),
        ] {
            assert_eq!(begin % align, 0);
            assert!(begin >= at && end <= limit);
            at = end;
        }

        assert_eq!(a.as_slice(), (0..lens[0]).map(|i| i as u8).collect::<Vec<_>>());
        assert_eq!(b.as_slice(), (0..lens[1]).map(|i| i as u64 * 3).collect::<Vec<_>>());
        assert_eq!(c.as_slice(), (0..lens[2]).map(|i| i as u16 + 7).collect::<Vec<_>>());

        unsafe { destroy_in(&tracker, raw) };
        tracker.assert_balanced();
    }
}

#[cfg(feature = "std_alloc")]
#[test]
fn global_allocator_helpers() {
    let raw = make((arg_iter(2, vec![5u64, 6]),), |arrays| Numbers { arrays }).unwrap();
    assert_eq!(unsafe { &*raw.as_ptr() }.arrays.0.as_slice(), [5, 6]);
    unsafe { destroy(raw) };

    let boxed = FlexBox::try_new((try_arg_with(2, |i| Ok::<_, Boom>(i as u64)),), |arrays| {
        return Ok(Numbers { arrays });
    })
    .unwrap();
    assert_eq!(boxed.slice(|n| &n.arrays.0), [0, 1]);
}
