use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    error::{ConfigError, SnapshotError},
    memory::{RamBlock, RomBlock, Store},
    peripheral::{HandlerPair, SharedPeripheral},
};

/// Value a floating data bus reads as when no chip drives it.
pub const OPEN_BUS: u8 = 0xFF;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressSpace {
    Program,
    Io,
}

impl AddressSpace {
    fn index(self) -> usize {
        match self {
            AddressSpace::Program => 0,
            AddressSpace::Io => 1,
        }
    }

    /// Highest address the space decodes by default: a 20-bit memory bus and
    /// a 16-bit I/O bus.
    pub fn default_limit(self) -> u32 {
        match self {
            AddressSpace::Program => 0x000F_FFFF,
            AddressSpace::Io => 0xFFFF,
        }
    }
}

impl fmt::Display for AddressSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressSpace::Program => write!(f, "program"),
            AddressSpace::Io => write!(f, "I/O"),
        }
    }
}

/// What an address range is wired to.
#[derive(Debug, Clone)]
pub enum Binding {
    Ram(RamBlock),
    Rom(RomBlock),
    Handler(HandlerPair),
    Unmapped { fill: u8 },
}

impl Binding {
    pub fn is_unmapped(&self) -> bool {
        matches!(self, Binding::Unmapped { .. })
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Ram(block) => write!(f, "RAM size={:#07X}", block.len()),
            Binding::Rom(block) => write!(f, "{}", block),
            Binding::Handler(pair) if pair.is_writable() => write!(f, "I/O read/write"),
            Binding::Handler(_) => write!(f, "I/O read-only"),
            Binding::Unmapped { fill } => write!(f, "NOP fill={:#04X}", fill),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AddressRange {
    pub label: String,
    pub space: AddressSpace,
    pub start: u32,
    pub end: u32,
    pub binding: Binding,
    pub overlay: bool,
}

/// Bytes in the inclusive window `start..=end`, if that fits a `usize`.
fn span_len(start: u32, end: u32) -> Option<usize> {
    usize::try_from(end - start).ok()?.checked_add(1)
}

impl AddressRange {
    pub fn contains(&self, address: u32) -> bool {
        address >= self.start && address <= self.end
    }

    pub fn len(&self) -> usize {
        span_len(self.start, self.end).unwrap_or(usize::MAX)
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    fn overlaps(&self, other: &AddressRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "0x{:05X} - 0x{:05X} {} ({}){}",
            self.start,
            self.end,
            self.binding,
            self.label,
            if self.overlay { " [overlay]" } else { "" }
        )
    }
}

/// Counters for accesses that hit nothing or were refused. These travel with
/// save states; they never turn into errors.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusDiagnostics {
    pub unmapped_reads: u64,
    pub unmapped_writes: u64,
    pub dropped_writes: u64,
}

/// The interface a CPU core drives: byte accesses in program space and port
/// accesses in I/O space.
pub trait CpuIo {
    fn read_byte(&mut self, address: u32) -> u8;
    fn write_byte(&mut self, address: u32, value: u8);
    fn port_in(&mut self, port: u16) -> u8;
    fn port_out(&mut self, port: u16, value: u8);
}

enum ReadOutcome {
    Mapped(u8),
    Unmapped(u8),
}

enum WriteOutcome {
    Stored,
    Dropped,
    Unmapped,
}

#[derive(Debug, Clone)]
struct SpaceMap {
    mask: u32,
    limit: u32,
    // Both lists are sorted by start and free of internal overlap.
    overlays: Vec<AddressRange>,
    ranges: Vec<AddressRange>,
    idle: Binding,
}

impl SpaceMap {
    fn find(list: &[AddressRange], address: u32) -> Option<usize> {
        let index = list.partition_point(|range| range.end < address);
        list.get(index)
            .filter(|range| range.start <= address)
            .map(|_| index)
    }

    fn locate(&self, address: u32) -> Option<&AddressRange> {
        if let Some(index) = Self::find(&self.overlays, address) {
            return Some(&self.overlays[index]);
        }
        Self::find(&self.ranges, address).map(|index| &self.ranges[index])
    }

    fn locate_mut(&mut self, address: u32) -> Option<&mut AddressRange> {
        if let Some(index) = Self::find(&self.overlays, address) {
            return Some(&mut self.overlays[index]);
        }
        Self::find(&self.ranges, address).map(move |index| &mut self.ranges[index])
    }

    fn resolve(&self, address: u32) -> &Binding {
        if address > self.limit {
            return &self.idle;
        }
        self.locate(address)
            .map(|range| &range.binding)
            .unwrap_or(&self.idle)
    }

    fn read(&self, address: u32) -> ReadOutcome {
        let range = match self.locate(address).filter(|_| address <= self.limit) {
            Some(range) => range,
            None => return ReadOutcome::Unmapped(self.idle_fill()),
        };

        let offset = address - range.start;
        match &range.binding {
            Binding::Ram(block) => ReadOutcome::Mapped(block.read(offset)),
            Binding::Rom(block) => ReadOutcome::Mapped(block.read(offset)),
            Binding::Handler(pair) => ReadOutcome::Mapped(pair.read(offset)),
            Binding::Unmapped { fill } => ReadOutcome::Unmapped(*fill),
        }
    }

    fn write(&mut self, address: u32, value: u8) -> WriteOutcome {
        if address > self.limit {
            return WriteOutcome::Unmapped;
        }
        let range = match self.locate_mut(address) {
            Some(range) => range,
            None => return WriteOutcome::Unmapped,
        };

        let offset = address - range.start;
        match &mut range.binding {
            Binding::Ram(block) => {
                block.write(offset, value);
                WriteOutcome::Stored
            }
            Binding::Rom(block) => {
                block.write(offset, value);
                WriteOutcome::Dropped
            }
            Binding::Handler(pair) => {
                if pair.write(offset, value) {
                    WriteOutcome::Stored
                } else {
                    WriteOutcome::Dropped
                }
            }
            Binding::Unmapped { .. } => WriteOutcome::Unmapped,
        }
    }

    fn idle_fill(&self) -> u8 {
        match self.idle {
            Binding::Unmapped { fill } => fill,
            _ => OPEN_BUS,
        }
    }

    /// Ranges in the order they are consulted.
    fn iter(&self) -> impl Iterator<Item = &AddressRange> {
        self.overlays.iter().chain(self.ranges.iter())
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = &mut AddressRange> {
        self.overlays.iter_mut().chain(self.ranges.iter_mut())
    }
}

/// Routes every CPU access to the store or peripheral that owns the address.
///
/// The bus never looks inside a peripheral window; it only forwards the
/// offset and the byte. Tables are fixed once [`AddressMapBuilder::build`]
/// returns.
#[derive(Debug, Clone)]
pub struct Bus {
    spaces: [SpaceMap; 2],
    diagnostics: BusDiagnostics,
}

impl Bus {
    fn map(&self, space: AddressSpace) -> &SpaceMap {
        &self.spaces[space.index()]
    }

    /// `address` as it appears on the external bus of `space`.
    pub fn mask(&self, space: AddressSpace, address: u32) -> u32 {
        address & self.map(space).mask
    }

    /// The binding that serves `address` once the space's address mask has
    /// been applied. Addresses outside every range resolve to the space's
    /// idle `Unmapped` binding.
    pub fn resolve(&self, space: AddressSpace, address: u32) -> &Binding {
        self.map(space).resolve(self.mask(space, address))
    }

    /// The declared range serving `address`, if any.
    pub fn region(&self, space: AddressSpace, address: u32) -> Option<&AddressRange> {
        let map = self.map(space);
        let address = self.mask(space, address);
        if address > map.limit {
            return None;
        }
        map.locate(address)
    }

    pub fn ranges(&self, space: AddressSpace) -> impl Iterator<Item = &AddressRange> {
        self.map(space).iter()
    }

    pub fn diagnostics(&self) -> BusDiagnostics {
        self.diagnostics
    }

    pub fn read(&mut self, space: AddressSpace, address: u32) -> u8 {
        let address = self.mask(space, address);

        match self.spaces[space.index()].read(address) {
            ReadOutcome::Mapped(value) => value,
            ReadOutcome::Unmapped(fill) => {
                self.diagnostics.unmapped_reads += 1;
                tracing::trace!("[BUS] Unmapped {} read {:#07X}", space, address);
                fill
            }
        }
    }

    pub fn write(&mut self, space: AddressSpace, address: u32, value: u8) {
        let address = self.mask(space, address);

        match self.spaces[space.index()].write(address, value) {
            WriteOutcome::Stored => {}
            WriteOutcome::Dropped => {
                self.diagnostics.dropped_writes += 1;
                tracing::trace!(
                    "[BUS] Dropped {} write {:#07X} = {:02X}",
                    space,
                    address,
                    value
                );
            }
            WriteOutcome::Unmapped => {
                self.diagnostics.unmapped_writes += 1;
                tracing::trace!(
                    "[BUS] Unmapped {} write {:#07X} = {:02X}",
                    space,
                    address,
                    value
                );
            }
        }
    }

    pub fn read_word(&mut self, space: AddressSpace, address: u32) -> u16 {
        let low_byte = self.read(space, address) as u16;
        let high_byte = self.read(space, address.wrapping_add(1)) as u16;
        (high_byte << 8) | low_byte
    }

    pub fn write_word(&mut self, space: AddressSpace, address: u32, value: u16) {
        let low_byte = (value & 0x00FF) as u8;
        let high_byte = ((value & 0xFF00) >> 8) as u8;
        self.write(space, address, low_byte);
        self.write(space, address.wrapping_add(1), high_byte);
    }

    /// Zero every RAM block and clear the diagnostic counters. ROM contents
    /// and peripheral bindings are untouched.
    pub fn reset(&mut self) {
        for map in self.spaces.iter_mut() {
            for range in map.iter_mut() {
                if let Binding::Ram(block) = &mut range.binding {
                    block.clear();
                }
            }
        }
        self.diagnostics = BusDiagnostics::default();
    }

    /// Captures exactly the RAM contents and diagnostic counters.
    pub fn snapshot(&self) -> BusSnapshot {
        let ram = self
            .ram_blocks()
            .map(|(range, block)| RamImage {
                space: range.space,
                label: range.label.clone(),
                data: block.data().to_vec(),
            })
            .collect();

        BusSnapshot {
            ram,
            diagnostics: self.diagnostics,
        }
    }

    /// Loads a snapshot taken from a bus with the same RAM layout. Nothing is
    /// modified unless the whole snapshot matches.
    pub fn restore(&mut self, snapshot: &BusSnapshot) -> Result<(), SnapshotError> {
        let blocks: Vec<_> = self.ram_blocks().collect();
        if blocks.len() != snapshot.ram.len() {
            return Err(SnapshotError::BlockCount {
                expected: blocks.len(),
                found: snapshot.ram.len(),
            });
        }

        for ((range, block), image) in blocks.iter().zip(&snapshot.ram) {
            if range.label != image.label || range.space != image.space {
                return Err(SnapshotError::BlockLabel {
                    expected: range.label.clone(),
                    found: image.label.clone(),
                });
            }
            if block.len() != image.data.len() {
                return Err(SnapshotError::BlockSize {
                    label: range.label.clone(),
                    expected: block.len(),
                    found: image.data.len(),
                });
            }
        }

        let mut images = snapshot.ram.iter();
        for map in self.spaces.iter_mut() {
            for range in map.iter_mut() {
                if let Binding::Ram(block) = &mut range.binding {
                    if let Some(image) = images.next() {
                        block.load(&image.data);
                    }
                }
            }
        }
        self.diagnostics = snapshot.diagnostics;

        Ok(())
    }

    fn ram_blocks(&self) -> impl Iterator<Item = (&AddressRange, &RamBlock)> {
        self.spaces
            .iter()
            .flat_map(|map| map.iter())
            .filter_map(|range| match &range.binding {
                Binding::Ram(block) => Some((range, block)),
                _ => None,
            })
    }
}

impl CpuIo for Bus {
    fn read_byte(&mut self, address: u32) -> u8 {
        self.read(AddressSpace::Program, address)
    }

    fn write_byte(&mut self, address: u32, value: u8) {
        self.write(AddressSpace::Program, address, value)
    }

    fn port_in(&mut self, port: u16) -> u8 {
        self.read(AddressSpace::Io, port as u32)
    }

    fn port_out(&mut self, port: u16, value: u8) {
        self.write(AddressSpace::Io, port as u32, value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RamImage {
    pub space: AddressSpace,
    pub label: String,
    pub data: Vec<u8>,
}

/// Save-state payload of a [`Bus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusSnapshot {
    pub ram: Vec<RamImage>,
    pub diagnostics: BusDiagnostics,
}

#[derive(Debug, Clone)]
enum PendingBinding {
    Ram,
    RamBlock(RamBlock),
    Rom(Vec<u8>),
    Handler(HandlerPair),
    Unmapped(Option<u8>),
}

#[derive(Debug, Clone)]
struct PendingRange {
    label: String,
    space: AddressSpace,
    start: u32,
    end: u32,
    binding: PendingBinding,
    overlay: bool,
}

/// Collects the address ranges of a machine and validates them into a
/// [`Bus`].
///
/// Ranges in one space must not overlap. A range marked with
/// [`overlay`](Self::overlay) takes precedence over the base ranges it
/// covers; two overlays may not overlap each other.
#[derive(Debug, Clone)]
pub struct AddressMapBuilder {
    ranges: Vec<PendingRange>,
    masks: [u32; 2],
    limits: [u32; 2],
    fill: u8,
}

impl Default for AddressMapBuilder {
    fn default() -> Self {
        Self {
            ranges: Vec::new(),
            masks: [
                AddressSpace::Program.default_limit(),
                AddressSpace::Io.default_limit(),
            ],
            limits: [
                AddressSpace::Program.default_limit(),
                AddressSpace::Io.default_limit(),
            ],
            fill: OPEN_BUS,
        }
    }
}

impl AddressMapBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mask ANDed into every address of `space` before lookup, for CPUs whose
    /// external bus is narrower than their internal address arithmetic.
    pub fn address_mask(&mut self, space: AddressSpace, mask: u32) -> &mut Self {
        self.masks[space.index()] = mask;
        self
    }

    pub fn space_limit(&mut self, space: AddressSpace, limit: u32) -> &mut Self {
        self.limits[space.index()] = limit;
        self
    }

    /// Value read back from unmapped addresses.
    pub fn unmapped_fill(&mut self, fill: u8) -> &mut Self {
        self.fill = fill;
        self
    }

    fn push(
        &mut self,
        space: AddressSpace,
        start: u32,
        end: u32,
        label: &str,
        binding: PendingBinding,
    ) -> &mut Self {
        self.ranges.push(PendingRange {
            label: label.to_string(),
            space,
            start,
            end,
            binding,
            overlay: false,
        });
        self
    }

    pub fn ram(&mut self, space: AddressSpace, start: u32, end: u32, label: &str) -> &mut Self {
        self.push(space, start, end, label, PendingBinding::Ram)
    }

    /// Bind a caller-supplied RAM block; its size must match the range.
    pub fn ram_block(
        &mut self,
        space: AddressSpace,
        start: u32,
        end: u32,
        label: &str,
        block: RamBlock,
    ) -> &mut Self {
        self.push(space, start, end, label, PendingBinding::RamBlock(block))
    }

    pub fn rom(
        &mut self,
        space: AddressSpace,
        start: u32,
        end: u32,
        label: &str,
        image: &[u8],
    ) -> &mut Self {
        self.push(space, start, end, label, PendingBinding::Rom(image.to_vec()))
    }

    pub fn unmapped(&mut self, space: AddressSpace, start: u32, end: u32, label: &str) -> &mut Self {
        self.push(space, start, end, label, PendingBinding::Unmapped(None))
    }

    pub fn unmapped_with_fill(
        &mut self,
        space: AddressSpace,
        start: u32,
        end: u32,
        label: &str,
        fill: u8,
    ) -> &mut Self {
        self.push(space, start, end, label, PendingBinding::Unmapped(Some(fill)))
    }

    pub fn handler(
        &mut self,
        space: AddressSpace,
        start: u32,
        end: u32,
        label: &str,
        device: SharedPeripheral,
    ) -> &mut Self {
        self.push(
            space,
            start,
            end,
            label,
            PendingBinding::Handler(HandlerPair::new(device)),
        )
    }

    pub fn read_handler(
        &mut self,
        space: AddressSpace,
        start: u32,
        end: u32,
        label: &str,
        device: SharedPeripheral,
    ) -> &mut Self {
        self.push(
            space,
            start,
            end,
            label,
            PendingBinding::Handler(HandlerPair::read_only(device)),
        )
    }

    /// Give the most recently added range precedence over the base ranges it
    /// overlaps.
    pub fn overlay(&mut self) -> &mut Self {
        match self.ranges.last_mut() {
            Some(range) => range.overlay = true,
            None => tracing::debug!("[BUS] overlay() called before any range was added"),
        }
        self
    }

    pub fn build(&self) -> Result<Bus, ConfigError> {
        let mut program = self.space_map(AddressSpace::Program);
        let mut io = self.space_map(AddressSpace::Io);

        for pending in &self.ranges {
            let range = self.validate(pending)?;
            let map = match range.space {
                AddressSpace::Program => &mut program,
                AddressSpace::Io => &mut io,
            };
            let list = if range.overlay {
                &mut map.overlays
            } else {
                &mut map.ranges
            };

            // Registration order decides which label is reported first.
            if let Some(existing) = list.iter().find(|other| other.overlaps(&range)) {
                return Err(ConfigError::Overlap {
                    space: range.space,
                    first: existing.label.clone(),
                    second: range.label,
                });
            }
            tracing::debug!("[BUS] {} map: {}", range.space, range);
            list.push(range);
        }

        for map in [&mut program, &mut io] {
            map.overlays.sort_by_key(|range| range.start);
            map.ranges.sort_by_key(|range| range.start);
        }

        Ok(Bus {
            spaces: [program, io],
            diagnostics: BusDiagnostics::default(),
        })
    }

    fn space_map(&self, space: AddressSpace) -> SpaceMap {
        SpaceMap {
            mask: self.masks[space.index()],
            limit: self.limits[space.index()],
            overlays: Vec::new(),
            ranges: Vec::new(),
            idle: Binding::Unmapped { fill: self.fill },
        }
    }

    fn validate(&self, pending: &PendingRange) -> Result<AddressRange, ConfigError> {
        if pending.end < pending.start {
            return Err(ConfigError::EmptyRange {
                space: pending.space,
                label: pending.label.clone(),
                start: pending.start,
                end: pending.end,
            });
        }

        let limit = self.limits[pending.space.index()];
        if pending.end > limit {
            return Err(ConfigError::OutOfSpace {
                space: pending.space,
                label: pending.label.clone(),
                end: pending.end,
                limit,
            });
        }

        let size = span_len(pending.start, pending.end).ok_or_else(|| {
            ConfigError::RangeTooLarge {
                space: pending.space,
                label: pending.label.clone(),
                start: pending.start,
                end: pending.end,
            }
        })?;
        let binding = match &pending.binding {
            PendingBinding::Ram => Binding::Ram(RamBlock::new(size)),
            PendingBinding::RamBlock(block) => {
                if block.len() != size {
                    return Err(ConfigError::StoreSize {
                        label: pending.label.clone(),
                        expected: size,
                        actual: block.len(),
                    });
                }
                Binding::Ram(block.clone())
            }
            PendingBinding::Rom(image) => {
                if image.len() > size {
                    return Err(ConfigError::RomTooLarge {
                        label: pending.label.clone(),
                        window: size,
                        actual: image.len(),
                    });
                }
                Binding::Rom(RomBlock::new(image, size).with_name(pending.label.clone()))
            }
            PendingBinding::Handler(pair) => Binding::Handler(pair.clone()),
            PendingBinding::Unmapped(fill) => Binding::Unmapped {
                fill: fill.unwrap_or(self.fill),
            },
        };

        Ok(AddressRange {
            label: pending.label.clone(),
            space: pending.space,
            start: pending.start,
            end: pending.end,
            binding,
            overlay: pending.overlay,
        })
    }
}
