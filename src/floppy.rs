// Floppy geometry descriptors advertised through the device registry.
// Parsing the images themselves is left to the disk layer.

use serde::Serialize;

pub const SECTOR_SIZE: u16 = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FloppyFormat {
    pub name: &'static str,
    pub description: &'static str,
    pub extension: &'static str,
    pub heads: u8,
    pub tracks: u8,
    pub sectors_per_track: u8,
    pub sector_length: u16,
    pub first_sector_id: u8,
}

impl FloppyFormat {
    /// Size in bytes of a raw sector dump with this geometry.
    pub const fn image_size(&self) -> usize {
        self.heads as usize
            * self.tracks as usize
            * self.sectors_per_track as usize
            * self.sector_length as usize
    }
}

/// The iSBX-218A controller's 8-sector, 512-byte-per-sector layouts.
pub const COMPIS_FORMATS: &[FloppyFormat] = &[
    FloppyFormat {
        name: "compis_ss",
        description: "Compis single sided 320KB",
        extension: "img",
        heads: 1,
        tracks: 80,
        sectors_per_track: 8,
        sector_length: SECTOR_SIZE,
        first_sector_id: 1,
    },
    FloppyFormat {
        name: "compis_ds",
        description: "Compis double sided 640KB",
        extension: "img",
        heads: 2,
        tracks: 80,
        sectors_per_track: 8,
        sector_length: SECTOR_SIZE,
        first_sector_id: 1,
    },
];

/// Formats any floppy device accepts unless its machine says otherwise.
pub const GENERIC_FORMATS: &[FloppyFormat] = &[
    FloppyFormat {
        name: "dsk_360",
        description: "Raw 360KB sector dump",
        extension: "dsk",
        heads: 2,
        tracks: 40,
        sectors_per_track: 9,
        sector_length: SECTOR_SIZE,
        first_sector_id: 1,
    },
    FloppyFormat {
        name: "dsk_720",
        description: "Raw 720KB sector dump",
        extension: "dsk",
        heads: 2,
        tracks: 80,
        sectors_per_track: 9,
        sector_length: SECTOR_SIZE,
        first_sector_id: 1,
    },
];

/// Pick the format whose raw image size matches `image_len`.
pub fn identify(formats: &'static [FloppyFormat], image_len: usize) -> Option<&'static FloppyFormat> {
    let format = formats
        .iter()
        .find(|format| format.image_size() == image_len);
    if format.is_none() {
        tracing::warn!(
            "No floppy format matches an image of {} bytes (known sizes: {:?})",
            image_len,
            formats.iter().map(FloppyFormat::image_size).collect::<Vec<_>>()
        );
    }
    format
}

/// Comma separated file extensions of `formats`, first occurrence order.
pub fn extensions(formats: &[FloppyFormat]) -> String {
    let mut seen: Vec<&str> = Vec::new();
    for format in formats {
        if !seen.contains(&format.extension) {
            seen.push(format.extension);
        }
    }
    seen.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compis_image_sizes() {
        assert_eq!(COMPIS_FORMATS[0].image_size(), 327_680);
        assert_eq!(COMPIS_FORMATS[1].image_size(), 655_360);
    }

    #[test]
    fn test_identify_by_size() {
        let format = identify(COMPIS_FORMATS, 655_360).unwrap();
        assert_eq!(format.name, "compis_ds");
        assert!(identify(COMPIS_FORMATS, 737_280).is_none());
        assert_eq!(identify(GENERIC_FORMATS, 737_280).unwrap().name, "dsk_720");
    }

    #[test]
    fn test_extensions_are_deduplicated() {
        assert_eq!(extensions(COMPIS_FORMATS), "img");
        assert_eq!(extensions(&[GENERIC_FORMATS[0], COMPIS_FORMATS[0]]), "dsk,img");
    }
}
