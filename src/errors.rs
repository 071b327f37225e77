use crate::sections::SectionId;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("read of {width} bytes at offset {offset:#x} runs past end of buffer ({len:#x})")]
    OutOfBounds {
        offset: usize,
        width: usize,
        len: usize,
    },

    #[error("bad magic {found:#06x} at offset 0")]
    InvalidMagic { found: u16 },

    #[error("header truncated: need {expected:#x} bytes, have {actual:#x}")]
    TruncatedHeader { expected: usize, actual: usize },

    #[error("{slot} points to {value:#x}, outside {min:#x}..={len:#x}")]
    PointerOutOfBounds {
        slot: SectionId,
        value: u32,
        min: usize,
        len: usize,
    },

    #[error("sections overlap or are out of order at offset {offset:#x}")]
    OverlappingOrUnsortedSections { offset: usize },

    #[error("terrain at {offset:#x} needs {needed} bytes, only {available} remain")]
    InsufficientData {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("hex {index} holds terrain {terrain_type} variant {variant}; both must fit in 4 bits")]
    ValueOutOfRange {
        index: usize,
        terrain_type: u8,
        variant: u8,
    },

    #[error("grid is {actual:?} hexes, but the header says {expected:?}")]
    DimensionMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("mission text is {len} bytes; the limit is {max}")]
    TextTooLong { len: usize, max: usize },

    #[error("mission text has a non-printable character at byte {index}")]
    NonPrintableText { index: usize },

    #[error("no mission text block {index} (found {count})")]
    MissingTextBlock { index: usize, count: usize },

    #[error("{0} is not present in this scenario")]
    SectionAbsent(SectionId),

    #[error("magic {found:#06x} is not a convertible legacy format")]
    UnsupportedMagic { found: u16 },

    #[error("legacy count {slot} holds {}, which is not a whole non-negative number", as_float(.bits))]
    InvalidLegacyCount { slot: usize, bits: u32 },

    #[error("rebuilt scenario is {actual} bytes, expected {expected}")]
    RoundTripSizeMismatch { expected: usize, actual: usize },

    #[error("container is not valid: {0}")]
    ContainerInvalid(Box<CodecError>),
}

fn as_float(bits: &u32) -> f32 {
    f32::from_bits(*bits)
}
