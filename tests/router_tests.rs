use std::{cell::RefCell, ptr, rc::Rc};

use compis::{
    bus::OPEN_BUS,
    peripheral::{shared, FnPeripheral, RegisterLatch},
    AddressMapBuilder, AddressSpace, Binding, Bus, ConfigError,
};
use tracing_subscriber::fmt;

#[cfg(test)]
#[ctor::ctor]
fn init() {
    let fmt_subscriber = fmt::Subscriber::builder()
        .with_max_level(tracing::Level::DEBUG)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(fmt_subscriber)
        .expect("Unable to set global tracing subscriber");
}

fn memory_bus() -> Bus {
    AddressMapBuilder::new()
        .address_mask(AddressSpace::Program, 0x000F_FFFF)
        .ram(AddressSpace::Program, 0x00000, 0x3FFFF, "LMCS")
        .ram(AddressSpace::Program, 0x40000, 0x4FFFF, "MMCS0")
        .unmapped(AddressSpace::Program, 0x80000, 0xEFFFF, "NOP")
        .rom(AddressSpace::Program, 0xF0000, 0xFFFFF, "UMCS", &[0xEA, 0x5B, 0xE0])
        .build()
        .unwrap()
}

#[test]
fn test_every_address_in_a_range_resolves_to_its_binding() {
    let bus = memory_bus();
    let lmcs = bus.region(AddressSpace::Program, 0).unwrap();

    for address in (0x00000..=0x3FFFF).step_by(0x1001).chain([0x3FFFF]) {
        assert!(ptr::eq(
            bus.resolve(AddressSpace::Program, address),
            &lmcs.binding
        ));
    }

    for address in [0x50000, 0x6FFFF, 0x7FFFF] {
        assert!(bus.region(AddressSpace::Program, address).is_none());
        assert!(bus.resolve(AddressSpace::Program, address).is_unmapped());
    }
}

#[test]
fn test_mask_is_applied_before_resolution() {
    let bus = memory_bus();

    for address in [0x123456u32, 0xFFF0_0010, 0x00F0_0000, 0x7FFFF] {
        assert!(ptr::eq(
            bus.resolve(AddressSpace::Program, address),
            bus.resolve(AddressSpace::Program, address & 0x000F_FFFF)
        ));
    }
}

#[test]
fn test_masked_address_aliases_low_memory() {
    let mut bus = memory_bus();

    // 0x123456 only has 20 address lines to travel on.
    bus.write(AddressSpace::Program, 0x123456, 0x9C);
    assert_eq!(bus.read(AddressSpace::Program, 0x023456), 0x9C);
    assert_eq!(
        bus.region(AddressSpace::Program, 0x123456).unwrap().label,
        bus.region(AddressSpace::Program, 0x023456).unwrap().label
    );
}

#[test]
fn test_independent_ram_blocks() {
    let mut bus = memory_bus();

    bus.write(AddressSpace::Program, 0x1000, 0x42);
    assert_eq!(bus.read(AddressSpace::Program, 0x1000), 0x42);
    assert_eq!(bus.read(AddressSpace::Program, 0x40000), 0x00);

    bus.write(AddressSpace::Program, 0x40000, 0x24);
    assert_eq!(bus.read(AddressSpace::Program, 0x40000), 0x24);
    assert_eq!(bus.read(AddressSpace::Program, 0x00000), 0x00);
    assert_eq!(bus.read(AddressSpace::Program, 0x1000), 0x42);
}

#[test]
fn test_nop_window_reads_fill_and_drops_writes() {
    let mut bus = memory_bus();

    assert_eq!(bus.read(AddressSpace::Program, 0x90000), OPEN_BUS);
    bus.write(AddressSpace::Program, 0x90000, 0x12);
    assert_eq!(bus.read(AddressSpace::Program, 0x90000), OPEN_BUS);

    let diagnostics = bus.diagnostics();
    assert_eq!(diagnostics.unmapped_reads, 2);
    assert_eq!(diagnostics.unmapped_writes, 1);
}

#[test]
fn test_custom_fill_value() {
    let mut bus = AddressMapBuilder::new()
        .unmapped_fill(0x00)
        .unmapped_with_fill(AddressSpace::Io, 0x0300, 0x030F, "floating", 0xAA)
        .build()
        .unwrap();

    assert_eq!(bus.read(AddressSpace::Io, 0x0305), 0xAA);
    assert_eq!(bus.read(AddressSpace::Io, 0x0400), 0x00);
    assert!(matches!(
        bus.resolve(AddressSpace::Io, 0x0400),
        Binding::Unmapped { fill: 0x00 }
    ));
}

#[test]
fn test_rom_ignores_writes() {
    let mut bus = memory_bus();

    let before = bus.read(AddressSpace::Program, 0xF0001);
    bus.write(AddressSpace::Program, 0xF0001, !before);
    assert_eq!(bus.read(AddressSpace::Program, 0xF0001), before);
    assert_eq!(bus.read(AddressSpace::Program, 0xF0000), 0xEA);
    assert_eq!(bus.read(AddressSpace::Program, 0xFFFFF), 0xFF);
    assert_eq!(bus.diagnostics().dropped_writes, 1);
}

#[test]
fn test_ram_round_trip_over_every_block_edge() {
    let mut bus = memory_bus();

    for (address, value) in [(0x00000, 0x01), (0x3FFFF, 0x02), (0x40000, 0x03), (0x4FFFF, 0x04)] {
        bus.write(AddressSpace::Program, address, value);
        assert_eq!(bus.read(AddressSpace::Program, address), value);
    }
}

#[test]
fn test_handler_receives_window_offsets() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = seen.clone();
    let device = shared(FnPeripheral::new(
        |offset| 0x40 | offset as u8,
        move |offset, value| log.borrow_mut().push((offset, value)),
    ));

    let mut bus = AddressMapBuilder::new()
        .handler(AddressSpace::Io, 0x0080, 0x0087, "PIT", device)
        .build()
        .unwrap();

    assert_eq!(bus.read(AddressSpace::Io, 0x0083), 0x43);
    bus.write(AddressSpace::Io, 0x0087, 0x36);
    assert_eq!(*seen.borrow(), vec![(7, 0x36)]);

    assert_eq!(bus.read(AddressSpace::Io, 0x0088), OPEN_BUS);
}

#[test]
fn test_overlap_rejected_deterministically() {
    let build = || {
        AddressMapBuilder::new()
            .handler(
                AddressSpace::Io,
                0x0100,
                0x011A,
                "RTC",
                shared(RegisterLatch::new("RTC", 0x1B)),
            )
            .handler(
                AddressSpace::Io,
                0x0100,
                0x017E,
                "RTC wide",
                shared(RegisterLatch::new("RTC", 0x7F)),
            )
            .build()
    };

    for _ in 0..3 {
        let err = build().unwrap_err();
        assert_eq!(
            err,
            ConfigError::Overlap {
                space: AddressSpace::Io,
                first: "RTC".to_string(),
                second: "RTC wide".to_string(),
            }
        );
    }
}

#[test]
fn test_adjacent_ranges_do_not_overlap() {
    let result = AddressMapBuilder::new()
        .ram(AddressSpace::Program, 0x00000, 0x0FFFF, "a")
        .ram(AddressSpace::Program, 0x10000, 0x1FFFF, "b")
        .build();
    assert!(result.is_ok());
}

#[test]
fn test_masked_address_past_space_limit_is_unmapped() {
    let mut bus = AddressMapBuilder::new()
        .address_mask(AddressSpace::Program, 0xFFFF_FFFF)
        .ram(AddressSpace::Program, 0x00000, 0xFFFFF, "all")
        .build()
        .unwrap();

    assert_eq!(bus.mask(AddressSpace::Program, 0x100000), 0x100000);
    assert!(bus.resolve(AddressSpace::Program, 0x100000).is_unmapped());
    assert!(bus.region(AddressSpace::Program, 0x100000).is_none());

    bus.write(AddressSpace::Program, 0x100000, 0x5A);
    assert_eq!(bus.read(AddressSpace::Program, 0x100000), OPEN_BUS);
    // The write did not wrap onto the bottom of RAM.
    assert_eq!(bus.read(AddressSpace::Program, 0x00000), 0x00);

    let diagnostics = bus.diagnostics();
    assert_eq!(diagnostics.unmapped_writes, 1);
    assert_eq!(diagnostics.unmapped_reads, 1);
}

#[test]
fn test_default_mask_folds_onto_twenty_bits() {
    let bus = memory_bus();
    assert_eq!(bus.mask(AddressSpace::Program, 0x1F_FFF0), 0xF_FFF0);
    assert_eq!(bus.mask(AddressSpace::Io, 0xFFFF), 0xFFFF);
}
