use core::mem::align_of;
use core::mem::offset_of;
use core::mem::size_of;
use std::vec::Vec;

use super::*;

#[allow(dead_code)]
#[repr(C)]
struct Mixed {
    a: u8,
    b: u32,
    c: u16,
    d: u64,
    e: u8,
}

#[allow(dead_code)]
#[repr(C)]
struct WithEmpty {
    a: u8,
    z: (),
    b: u16,
}

#[test]
fn align_up_rounds() {
    assert_eq!(align_up(0, 1), 0);
    assert_eq!(align_up(13, 1), 13);
    assert_eq!(align_up(1, 2), 2);
    assert_eq!(align_up(7, 8), 8);
    assert_eq!(align_up(16, 8), 16);
    assert_eq!(align_up(17, 16), 32);

    assert_eq!(checked_align_up(usize::MAX, 1), Some(usize::MAX));
    assert_eq!(checked_align_up(usize::MAX, 2), None);
    assert_eq!(checked_align_up(usize::MAX - 7, 8), Some(usize::MAX - 7));
}

#[test]
#[should_panic]
fn align_up_rejects_bad_alignment() {
    let _ = align_up(3, 3);
}

#[test]
#[should_panic]
fn member_rejects_zero_alignment() {
    let _ = Member::new(4, 0);
}

#[test]
fn empty_list() {
    const LAYOUT: StaticLayout<0> = compute_layout([]);
    assert_eq!(LAYOUT.size(), 0);
    assert_eq!(LAYOUT.align(), 1);
    assert_eq!(LAYOUT.padded_size(), 0);
    assert!(LAYOUT.is_empty());
}

#[test]
fn matches_repr_c() {
    const LAYOUT: StaticLayout<5> = compute_layout([
        Member::of::<u8>(),
        Member::of::<u32>(),
        Member::of::<u16>(),
        Member::of::<u64>(),
        Member::of::<u8>(),
    ]);

    assert_eq!(LAYOUT.len(), 5);
    assert_eq!(LAYOUT.offset(0), offset_of!(Mixed, a));
    assert_eq!(LAYOUT.offset(1), offset_of!(Mixed, b));
    assert_eq!(LAYOUT.offset(2), offset_of!(Mixed, c));
    assert_eq!(LAYOUT.offset(3), offset_of!(Mixed, d));
    assert_eq!(LAYOUT.offset(4), offset_of!(Mixed, e));
    assert_eq!(LAYOUT.align(), align_of::<Mixed>());
    assert_eq!(LAYOUT.padded_size(), size_of::<Mixed>());
    assert!(LAYOUT.size() <= size_of::<Mixed>());
}

#[test]
fn zero_sized_member_still_rounds() {
    let layout = compute_layout([Member::of::<u8>(), Member::of::<()>(), Member::of::<u16>()]);
    assert_eq!(layout.offsets(), &[0, 1, 2]);
    assert_eq!(layout.padded_size(), size_of::<WithEmpty>());

    // A placeholder for a wider element pushes the next member out even though
    // it takes no bytes itself.
    let layout = compute_layout([Member::of::<u8>(), Member::trailing::<u64>(), Member::of::<u8>()]);
    assert_eq!(layout.offsets(), &[0, 8, 8]);
    assert_eq!(layout.size(), 9);
    assert_eq!(layout.align(), 8);
    assert_eq!(layout.padded_size(), 16);
}

#[test]
fn trailing_placeholders_only() {
    let layout = compute_layout([Member::trailing::<u32>(), Member::trailing::<u16>()]);
    assert_eq!(layout.offsets(), &[0, 0]);
    assert_eq!(layout.size(), 0);
    assert_eq!(layout.align(), 4);
}

#[test]
fn fold_counts_members() {
    let mut fold = LayoutFold::default();
    assert_eq!(fold.push(Member::new(3, 1)), 0);
    assert_eq!(fold.push(Member::new(8, 8)), 8);
    assert_eq!(fold.push(Member::new(0, 4)), 16);
    assert_eq!(fold.count(), 3);
    assert_eq!(fold.size(), 16);
    assert_eq!(fold.align(), 8);
}

#[test]
fn required_bytes() {
    // Already aligned, no padding.
    assert_eq!(num_required_bytes::<u64>(16, 10), Ok(80));
    // Realign from 17 up to 24 first.
    assert_eq!(num_required_bytes::<u64>(17, 10), Ok(7 + 80));
    assert_eq!(num_required_bytes::<u8>(17, 3), Ok(3));
    // No elements still reserves the padding.
    assert_eq!(num_required_bytes::<u32>(5, 0), Ok(3));

    let err = num_required_bytes::<u64>(0, usize::MAX / 4);
    assert_eq!(err.map_err(FlexError::kind), Err(ErrorKind::SizeOverflow));

    let err = num_required_bytes::<u8>(usize::MAX, 1);
    assert_eq!(err.map_err(FlexError::kind), Err(ErrorKind::SizeOverflow));

    let err = num_required_bytes::<u64>(usize::MAX - 3, 0);
    assert_eq!(err.map_err(FlexError::kind), Err(ErrorKind::SizeOverflow));
}

#[test]
fn random_member_lists() {
    fastrand::seed(0x5eed_f1e7);
    for _ in 0..500 {
        let count = fastrand::usize(0..12);
        let mut members = Vec::new();
        for _ in 0..count {
            let align = 1usize << fastrand::u32(0..5);
            let size = if fastrand::bool() { 0 } else { align * fastrand::usize(1..4) };
            members.push(Member::new(size, align));
        }

        let mut fold = LayoutFold::new();
        let offsets: Vec<usize> = members.iter().map(|m| fold.push(*m)).collect();

        let mut expected_align = 1;
        for (i, m) in members.iter().enumerate() {
            assert_eq!(offsets[i] % m.align(), 0);
            if i + 1 < members.len() {
                assert!(offsets[i] + m.size() <= offsets[i + 1]);
            }
            expected_align = expected_align.max(m.align());
        }
        assert_eq!(fold.align(), expected_align);
        assert_eq!(fold.count(), count);
        match members.last() {
            Some(last) => assert_eq!(fold.size(), offsets[count - 1] + last.size()),
            None => assert_eq!(fold.size(), 0),
        }
    }
}
