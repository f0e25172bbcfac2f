mod common;

use common::{KERNEL_END, Machine};
use kernel_alloc::FrameStats;
use kernel_memory_addresses::PhysicalAddress;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// Runs `f`, expects it to panic, and returns the panic message.
fn panic_message(f: impl FnOnce()) -> String {
    let payload = catch_unwind(AssertUnwindSafe(f)).expect_err("operation did not halt");
    payload
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| payload.downcast_ref::<&str>().map(ToString::to_string))
        .unwrap_or_default()
}

/// Unaligned, below-range, and above-range addresses for a machine.
fn bad_addresses(m: &Machine) -> [(PhysicalAddress, &'static str); 3] {
    [
        (m.frame(1) + 0x18, "is not page aligned"),
        (PhysicalAddress::new(KERNEL_END & !0xFFF), "lies below the first managed frame"),
        (m.range().end(), "lies at or above the top of managed memory"),
    ]
}

fn snapshot(m: &Machine) -> (FrameStats, Vec<i8>) {
    let counts = m.range().frames().map(|pa| m.frames.read_ref(pa)).collect();
    (m.frames.stats(), counts)
}

#[test]
fn every_operation_rejects_unmanaged_addresses_without_mutation() {
    let m = Machine::booted(4);
    m.frames.increment_ref(m.frame(2));
    let before = snapshot(&m);

    let ops: [(&str, &dyn Fn(PhysicalAddress)); 5] = [
        ("free_page", &|pa: PhysicalAddress| m.frames.free_page(pa)),
        ("increment_ref", &|pa: PhysicalAddress| {
            m.frames.increment_ref(pa);
        }),
        ("decrement_ref", &|pa: PhysicalAddress| {
            m.frames.decrement_ref(pa);
        }),
        ("read_ref", &|pa: PhysicalAddress| {
            m.frames.read_ref(pa);
        }),
        ("release_mapping", &|pa: PhysicalAddress| {
            m.frames.release_mapping(pa);
        }),
    ];

    for (name, op) in ops {
        for (pa, reason) in bad_addresses(&m) {
            let msg = panic_message(|| op(pa));
            assert!(msg.starts_with(&format!("{name}: ")), "{msg:?} does not name {name}");
            assert!(msg.contains(reason), "{msg:?} does not say {reason:?}");
            assert_eq!(snapshot(&m), before, "{name}({pa}) mutated state");
        }
    }
}

#[test]
#[should_panic(expected = "free_page: address 0x0000000080022010 is not page aligned")]
fn free_page_unaligned() {
    let m = Machine::booted(2);
    m.frames.free_page(m.frame(0) + 0x10);
}

#[test]
#[should_panic(expected = "free_page: address 0x0000000080021000 lies below the first managed frame")]
fn free_page_inside_kernel_image() {
    let m = Machine::booted(2);
    m.frames.free_page(PhysicalAddress::new(0x8002_1000));
}

#[test]
#[should_panic(expected = "free_page: address 0x0000000080024000 lies at or above the top")]
fn free_page_at_top_of_memory() {
    let m = Machine::booted(2);
    m.frames.free_page(m.range().end());
}

#[test]
#[should_panic(expected = "increment_ref: address")]
fn increment_ref_out_of_range() {
    let m = Machine::booted(2);
    m.frames.increment_ref(PhysicalAddress::new(0x1000));
}

#[test]
#[should_panic(expected = "read_ref: address")]
fn read_ref_unaligned() {
    let m = Machine::booted(2);
    m.frames.read_ref(m.frame(1) + 1);
}

#[test]
#[should_panic(expected = "free_range: address")]
fn free_range_past_the_top() {
    let m = Machine::new(2);
    let end = m.range().end() + 0x2000;
    m.frames.free_range(m.frame(0), end);
}

#[test]
fn free_range_checks_the_whole_span_before_releasing() {
    let m = Machine::new(4);
    let end = m.range().end() + 0x1000;
    let msg = panic_message(|| m.frames.free_range(m.frame(0), end));
    assert!(msg.starts_with("free_range: "), "{msg}");
    assert!(msg.contains("lies at or above the top"), "{msg}");
    assert_eq!(m.frames.stats().free, 0);
}

#[test]
fn free_range_below_the_range_releases_nothing() {
    let m = Machine::new(4);
    let start = PhysicalAddress::new(KERNEL_END & !0xFFF);
    let msg = panic_message(|| m.frames.free_range(start, m.frame(3)));
    assert!(msg.starts_with("free_range: "), "{msg}");
    assert_eq!(m.frames.stats().free, 0);
}

#[test]
#[should_panic(expected = "free_page: frame 0x0000000080022000 is already free")]
fn double_free_is_fatal() {
    let m = Machine::booted(2);
    let pa = m.frames.allocate_page().unwrap();
    m.frames.free_page(pa);
    m.frames.free_page(pa);
}

#[test]
fn double_free_leaves_the_free_list_intact() {
    let m = Machine::booted(3);
    let pa = m.frames.allocate_page().unwrap();
    m.frames.free_page(pa);

    let msg = panic_message(|| m.frames.free_page(pa));
    assert!(msg.contains("is already free"), "{msg}");
    assert_eq!(m.frames.stats().free, 3);

    let mut got = m.drain();
    got.sort();
    assert_eq!(got, vec![m.frame(0), m.frame(1), m.frame(2)]);
}

#[test]
fn free_range_over_free_frames_releases_nothing() {
    let m = Machine::new(4);
    m.frames.free_range(m.frame(2), m.frame(3));
    assert_eq!(m.frames.stats().free, 1);

    let msg = panic_message(|| m.frames.free_range(m.frame(0), m.range().end()));
    assert_eq!(msg, format!("free_range: frame {} is already free", m.frame(2)));
    assert_eq!(m.frames.stats().free, 1);
}

#[test]
#[should_panic(expected = "release_mapping: reference count of frame")]
fn release_mapping_underflow_is_fatal_when_strict() {
    use kernel_alloc::{AllocatorConfig, UnderflowPolicy};

    let m = Machine::booted_with(2, AllocatorConfig::new().with_underflow(UnderflowPolicy::Fatal));
    let pa = m.frames.allocate_page().unwrap();
    m.frames.release_mapping(pa);
}
