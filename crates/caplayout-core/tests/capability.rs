//! Boundary behavior of the compressed-capability bounds model.
//!
//! The literal values mirror the reference behavior of the Morello 128-bit
//! compressed format.

use caplayout_core::{CapabilityEncoder, CheriArch};

fn encoder() -> CapabilityEncoder
{
    CapabilityEncoder::new(CheriArch::Morello)
}

#[test]
fn test_required_precision()
{
    let enc = encoder();
    let check = |base: u64, top: u64| enc.required_precision(base, top - base);

    assert_eq!(check(0x0000_0000, 0x0010_0000), 1);
    assert_eq!(check(0x0000_0004, 0x0000_1004), 11);
    assert_eq!(check(0x0FFF_FFFF, 0x1000_0000), 1);
    assert_eq!(check(0x0000_0FFF, 0x0000_2001), 13);
}

#[test]
fn test_max_representable_length()
{
    let enc = encoder();

    assert_eq!(enc.max_representable_length(0xF1), 0xFFF);
    assert_eq!(enc.max_representable_length(0xF2), 0xFFF);
    assert_eq!(enc.max_representable_length(0xF4), 0xFFF);
    assert_eq!(enc.max_representable_length(0xF8), 0x1FF8);
    assert_eq!(enc.max_representable_length(0xF0), 0x3FF0);
}

#[test]
fn test_max_length_is_representable_at_its_base()
{
    let enc = encoder();
    for base in [0xF0u64, 0xF1, 0xF2, 0xF4, 0xF8] {
        let max = enc.max_representable_length(base);
        assert_eq!(enc.representable_range(base, max), (base, max), "base {base:#x}");
    }
}

#[test]
fn test_representable_range_covers_request()
{
    let enc = encoder();
    let cases = [
        (0u64, 0x10_0000u64),
        (0x100, 4),
        (0xFFF, 4),
        (0x1003, 0x1002),
        (0x12345, 0x54321),
        (0x7, 0xFFFF_FFFF),
    ];
    for (base, length) in cases {
        let (rep_base, rep_length) = enc.representable_range(base, length);
        assert!(rep_base <= base, "base {base:#x} length {length:#x}");
        assert!(
            rep_base + rep_length >= base + length,
            "base {base:#x} length {length:#x}"
        );
    }
}

#[test]
fn test_small_objects_are_always_exact()
{
    // The exact band of the 128-bit format: anything under 4 KiB has
    // precise bounds at any alignment.
    let enc = encoder();
    for base in [0u64, 1, 0x3, 0xFFF, 0x10001, 0xDEAD_BEEF] {
        for length in [0u64, 1, 0x10, 0xFFF] {
            assert_eq!(enc.representable_range(base, length), (base, length));
        }
    }
}

#[test]
fn test_riscv_profile_matches_concentrate_parameters()
{
    let enc = CapabilityEncoder::new(CheriArch::Riscv64);
    assert_eq!(enc.required_precision(0x0000_0004, 0x1000), 11);
    assert_eq!(enc.max_representable_length(0xF0), 0x3FF0);
}
