// Configuration and save-state error types

use thiserror::Error;

use crate::bus::AddressSpace;

/// Fatal problems found while assembling a machine. A machine that fails
/// with one of these must not start.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{space} range {label:?} is empty: end {end:#07X} < start {start:#07X}")]
    EmptyRange {
        space: AddressSpace,
        label: String,
        start: u32,
        end: u32,
    },

    #[error("{space} range {label:?} ends at {end:#07X}, past the space limit {limit:#07X}")]
    OutOfSpace {
        space: AddressSpace,
        label: String,
        end: u32,
        limit: u32,
    },

    #[error("{space} range {label:?} at {start:#07X}..={end:#07X} is too large to back on this host")]
    RangeTooLarge {
        space: AddressSpace,
        label: String,
        start: u32,
        end: u32,
    },

    #[error("{space} ranges {first:?} and {second:?} overlap without explicit precedence")]
    Overlap {
        space: AddressSpace,
        first: String,
        second: String,
    },

    #[error("range {label:?} spans {expected:#X} bytes but its store holds {actual:#X}")]
    StoreSize {
        label: String,
        expected: usize,
        actual: usize,
    },

    #[error("ROM image for {label:?} is {actual:#X} bytes, window holds {window:#X}")]
    RomTooLarge {
        label: String,
        window: usize,
        actual: usize,
    },

    #[error("no device registered with handle {0}")]
    UnknownDevice(usize),

    #[error("device {device:?} already overrides {kind:?}")]
    DuplicateOverride { device: String, kind: String },

    #[error("key {key:?} placed at row {row} bit {bit}, outside the 8x16 matrix")]
    KeyOutOfMatrix { key: String, row: u8, bit: u8 },

    #[error("row {row} bit {bit} is already taken by {existing:?}, cannot place {key:?}")]
    KeyCellTaken {
        row: u8,
        bit: u8,
        existing: String,
        key: String,
    },

    #[error("key {0:?} appears in more than one matrix cell")]
    DuplicateKey(String),
}

/// Problems restoring a bus snapshot.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("snapshot has {found} RAM blocks, bus has {expected}")]
    BlockCount { expected: usize, found: usize },

    #[error("snapshot block {found:?} does not match bus block {expected:?}")]
    BlockLabel { expected: String, found: String },

    #[error("snapshot block {label:?} holds {found:#X} bytes, bus block holds {expected:#X}")]
    BlockSize {
        label: String,
        expected: usize,
        found: usize,
    },
}
