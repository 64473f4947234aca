use std::{fs::File, io::Read, path::PathBuf};

use serde::Serialize;

/// Where a ROM dump lands in the program space, plus the checksums a loader
/// can verify it against. The bus only uses `offset` and `length`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct RomRegion {
    pub name: &'static str,
    pub offset: u32,
    pub length: u32,
    pub crc32: u32,
    pub sha1: &'static str,
}

impl RomRegion {
    pub fn end(&self) -> u32 {
        self.offset + self.length - 1
    }
}

/// BIOS EPROM behind the upper memory chip select.
pub const COMPIS_ROM: RomRegion = RomRegion {
    name: "compis.rom",
    offset: 0xF0000,
    length: 0x10000,
    crc32: 0x8987_7688,
    sha1: "7daa1762f24e05472eafc025879da90fe61d0225",
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RomImage {
    pub path: Option<PathBuf>,
    pub data: Vec<u8>,
}

impl RomImage {
    pub fn new(data: &[u8]) -> Self {
        Self {
            path: None,
            data: data.to_vec(),
        }
    }

    pub fn load(path: PathBuf) -> anyhow::Result<Self> {
        let mut file = File::open(&path)?;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;

        tracing::info!("Loaded ROM {:?} ({} bytes)", path, buffer.len());

        Ok(Self {
            path: Some(path),
            data: buffer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compis_rom_fills_the_top_64k() {
        assert_eq!(COMPIS_ROM.end(), 0xFFFFF);
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(RomImage::load(PathBuf::from("does/not/exist.rom")).is_err());
    }
}
