use std::fmt::{self, Debug};

use serde::{Deserialize, Serialize};

/// A contiguous byte array mapped directly into an address range.
///
/// Offsets are relative to the start of the range the store is bound to.
pub trait Store: Debug {
    fn read(&self, offset: u32) -> u8;
    fn write(&mut self, offset: u32, value: u8);
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct RamBlock {
    data: Vec<u8>,
}

impl RamBlock {
    pub fn new(size: usize) -> Self {
        RamBlock {
            data: vec![0x00; size],
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Zero the whole block, as a machine reset does.
    pub fn clear(&mut self) {
        self.data.fill(0x00);
    }

    pub(crate) fn load(&mut self, data: &[u8]) {
        self.data.copy_from_slice(data);
    }
}

impl Store for RamBlock {
    fn read(&self, offset: u32) -> u8 {
        match self.data.get(offset as usize) {
            Some(value) => *value,
            None => {
                tracing::warn!(
                    "Attempt to read from out of bounds RAM offset {:#07X}, returning 0xFF",
                    offset
                );
                0xFF
            }
        }
    }

    fn write(&mut self, offset: u32, value: u8) {
        if let Some(cell) = self.data.get_mut(offset as usize) {
            *cell = value;
        }
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}

#[derive(Debug, Default, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct RomBlock {
    pub name: Option<String>,
    data: Vec<u8>,
}

impl RomBlock {
    /// Places `image` at the start of a `size`-byte window. The tail of the
    /// window past the image reads as 0xFF (erased EPROM). Bytes of `image`
    /// beyond `size` are not kept; callers check the length first.
    pub fn new(image: &[u8], size: usize) -> Self {
        let mut data = vec![0xFF; size];
        let len = image.len().min(size);
        data[..len].copy_from_slice(&image[..len]);

        RomBlock { name: None, data }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl Store for RomBlock {
    fn read(&self, offset: u32) -> u8 {
        self.data.get(offset as usize).copied().unwrap_or(0xFF)
    }

    fn write(&mut self, offset: u32, _value: u8) {
        tracing::trace!("Attempt to write to ROM offset {:#07X}", offset);
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}

impl fmt::Display for RomBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ROM name={:?} size={:#07X}",
            self.name.as_deref().unwrap_or("<anonymous>"),
            self.data.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ram_starts_zeroed_and_round_trips() {
        let mut ram = RamBlock::new(0x100);
        assert_eq!(ram.read(0x10), 0x00);

        ram.write(0x10, 0xA5);
        assert_eq!(ram.read(0x10), 0xA5);

        ram.clear();
        assert_eq!(ram.read(0x10), 0x00);
    }

    #[test]
    fn test_ram_out_of_bounds_is_open_bus() {
        let mut ram = RamBlock::new(0x10);
        ram.write(0x20, 0x55);
        assert_eq!(ram.read(0x20), 0xFF);
    }

    #[test]
    fn test_rom_pads_short_images_and_ignores_writes() {
        let mut rom = RomBlock::new(&[0xEA, 0x00, 0x01], 0x10);
        assert_eq!(rom.len(), 0x10);
        assert_eq!(rom.read(0), 0xEA);
        assert_eq!(rom.read(3), 0xFF);

        rom.write(0, 0x00);
        assert_eq!(rom.read(0), 0xEA);
    }
}
