use crate::{
    errors::CodecError,
    header::{Header, COUNTS_OFFSET, HEADER_LEN, POINTERS_OFFSET},
    sections::{rebuild, slice_sections, SectionId, SectionLayout},
    utils::byte_view::ByteView,
};
use std::{fmt, str::FromStr};
use tracing::{debug, info_span};

/// No pointer table; configuration bytes up to a fixed payload offset.
pub const FIXED_OFFSET_MAGIC: u16 = 0x1210;
/// Same geometry as the current header, but counts are stored as `f32` and
/// PTR1/PTR2 hold placeholder floats.
pub const FLOAT_COUNT_MAGIC: u16 = 0x1220;

pub const LEGACY_PAYLOAD_OFFSET: usize = 0x200;
pub const STAND_IN_LEN: usize = 128;

pub const DEFAULT_MAP_WIDTH: u32 = 125;
pub const DEFAULT_MAP_HEIGHT: u32 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LegacyVariant {
    FixedOffset,
    FloatCount,
}

impl LegacyVariant {
    pub fn magic(self) -> u16 {
        match self {
            Self::FixedOffset => FIXED_OFFSET_MAGIC,
            Self::FloatCount => FLOAT_COUNT_MAGIC,
        }
    }

    pub fn detect(bytes: &[u8]) -> Option<Self> {
        let magic = ByteView::new(bytes).read_u16(0).ok()?;
        [Self::FixedOffset, Self::FloatCount]
            .into_iter()
            .find(|v| v.magic() == magic)
    }
}

impl fmt::Display for LegacyVariant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::FixedOffset => "fixed",
            Self::FloatCount => "float",
        })
    }
}

impl FromStr for LegacyVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fixed" => Ok(Self::FixedOffset),
            "float" => Ok(Self::FloatCount),
            _ => Err(format!("unknown legacy variant {s:?}; expected \"fixed\" or \"float\"")),
        }
    }
}

/// Legacy headers never stored map dimensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConvertOptions {
    pub map_width: u32,
    pub map_height: u32,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            map_width: DEFAULT_MAP_WIDTH,
            map_height: DEFAULT_MAP_HEIGHT,
        }
    }
}

pub fn convert(
    legacy: &[u8],
    variant: LegacyVariant,
    options: &ConvertOptions,
) -> Result<Vec<u8>, CodecError> {
    let _span = info_span!("convert", %variant, len = legacy.len()).entered();

    let found = ByteView::new(legacy)
        .read_u16(0)
        .map_err(|_| CodecError::TruncatedHeader {
            expected: HEADER_LEN,
            actual: legacy.len(),
        })?;
    // Current-format files land here too; there is nothing to convert.
    if found != variant.magic() {
        return Err(CodecError::UnsupportedMagic { found });
    }

    match variant {
        LegacyVariant::FixedOffset => convert_fixed_offset(legacy, options),
        LegacyVariant::FloatCount => convert_float_count(legacy, options),
    }
}

fn convert_fixed_offset(legacy: &[u8], options: &ConvertOptions) -> Result<Vec<u8>, CodecError> {
    if legacy.len() <= LEGACY_PAYLOAD_OFFSET {
        return Err(CodecError::InsufficientData {
            offset: LEGACY_PAYLOAD_OFFSET,
            needed: 1,
            available: legacy.len().saturating_sub(LEGACY_PAYLOAD_OFFSET),
        });
    }

    // The legacy configuration bytes are not carried over. Copying them into
    // this region corrupts the runtime settings of the current format.
    let mut prefix = vec![0; LEGACY_PAYLOAD_OFFSET];
    Header::new(options.map_width, options.map_height).write_into(&mut prefix)?;

    let payload = &legacy[LEGACY_PAYLOAD_OFFSET..];
    let stand_in = [0; STAND_IN_LEN];
    let sections = SectionId::ALL.map(|id| match id {
        SectionId::Ptr3 => (id, payload),
        _ => (id, &stand_in[..]),
    });
    debug!(payload_len = payload.len(), "fixed-offset payload becomes PTR3");
    rebuild(&prefix, sections)
}

fn convert_float_count(legacy: &[u8], options: &ConvertOptions) -> Result<Vec<u8>, CodecError> {
    if legacy.len() < HEADER_LEN {
        return Err(CodecError::TruncatedHeader {
            expected: HEADER_LEN,
            actual: legacy.len(),
        });
    }
    let r = ByteView::new(legacy);

    let mut header = Header::new(options.map_width, options.map_height);
    for (i, count) in header.counts.iter_mut().enumerate() {
        let value = r.read_f32(COUNTS_OFFSET + i * 4)?;
        *count = float_count(value).ok_or(CodecError::InvalidLegacyCount {
            slot: i + 1,
            bits: value.to_bits(),
        })?;
    }
    debug!(
        ptr1 = r.read_f32(POINTERS_OFFSET)?,
        ptr2 = r.read_f32(POINTERS_OFFSET + 4)?,
        counts = ?header.counts,
        "float-count header"
    );

    let mut pointers = SectionId::ALL.map(|id| (id, 0));
    for (id, value) in &mut pointers {
        *value = r.read_u32(id.header_offset())?;
    }
    let layout = SectionLayout::compute(&pointers, legacy.len())?;

    let mut prefix = legacy[..layout.prefix_end(legacy.len())].to_vec();
    header.write_into(&mut prefix)?;
    let sections = slice_sections(legacy, &layout);
    rebuild(&prefix, sections.into_iter())
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
fn float_count(value: f32) -> Option<u32> {
    if !value.is_finite() || value < 0.0 || value.fract() != 0.0 || value > u32::MAX as f32 {
        return None;
    }
    Some(value as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{header::FIXED_COUNTS, mission_text, tests::scenario_bytes};
    use std::error::Error;

    fn fixed_offset_legacy(payload_len: usize) -> Vec<u8> {
        let mut buf = vec![0xab; LEGACY_PAYLOAD_OFFSET];
        buf[..2].copy_from_slice(&FIXED_OFFSET_MAGIC.to_le_bytes());
        buf.extend((0..payload_len).map(|i| (i % 251) as u8));
        buf
    }

    fn float_count_legacy() -> Vec<u8> {
        let mut buf = vec![0; 0x400];
        let mut w = ByteView::new(&mut buf[..]);
        w.write_u16(0, FLOAT_COUNT_MAGIC).unwrap();
        for (i, &count) in FIXED_COUNTS.iter().enumerate() {
            #[allow(clippy::cast_precision_loss)]
            let count = count as f32;
            w.write_u32(COUNTS_OFFSET + i * 4, count.to_bits()).unwrap();
        }
        w.write_u32(POINTERS_OFFSET, 1.0f32.to_bits()).unwrap();
        w.write_u32(POINTERS_OFFSET + 4, 2.0f32.to_bits()).unwrap();
        w.write_u32(SectionId::Ptr3.header_offset(), 0x300).unwrap();
        w.write_u32(SectionId::Ptr4.header_offset(), 0x200).unwrap();
        w.write_bytes(0x80, b"Allied forces must take the ridge by dawn")
            .unwrap();
        for (i, b) in buf[0x200..].iter_mut().enumerate() {
            *b = (i % 7) as u8 + 1;
        }
        buf
    }

    #[test]
    fn fixed_offset_payload_keeps_its_offset() -> Result<(), Box<dyn Error>> {
        let legacy = fixed_offset_legacy(300);
        let out = convert(&legacy, LegacyVariant::FixedOffset, &ConvertOptions::default())?;
        assert_eq!(out.len(), LEGACY_PAYLOAD_OFFSET + 300 + 5 * STAND_IN_LEN);

        let header = Header::decode(&out)?;
        assert_eq!(header.counts, FIXED_COUNTS);
        assert_eq!((header.map_width, header.map_height), (125, 100));
        assert_eq!(header.pointers[..2], [0, 0]);
        assert_eq!(header.pointer(SectionId::Ptr3), 0x200);
        assert_eq!(header.pointer(SectionId::Ptr4), 0x200 + 300);
        assert_eq!(header.pointer(SectionId::Ptr8), 0x200 + 300 + 4 * 128);

        assert!(out[HEADER_LEN..LEGACY_PAYLOAD_OFFSET].iter().all(|&b| b == 0));
        assert_eq!(&out[0x200..0x200 + 300], &legacy[0x200..]);
        assert!(out[0x200 + 300..].iter().all(|&b| b == 0));
        Ok(())
    }

    #[test]
    fn dimensions_can_be_overridden() -> Result<(), Box<dyn Error>> {
        let options = ConvertOptions {
            map_width: 40,
            map_height: 30,
        };
        let out = convert(&fixed_offset_legacy(10), LegacyVariant::FixedOffset, &options)?;
        let header = Header::decode(&out)?;
        assert_eq!((header.map_width, header.map_height), (40, 30));
        Ok(())
    }

    #[test]
    fn float_counts_become_integers() -> Result<(), Box<dyn Error>> {
        let legacy = float_count_legacy();
        let out = convert(&legacy, LegacyVariant::FloatCount, &ConvertOptions::default())?;
        assert_eq!(out.len(), legacy.len());

        let header = Header::decode(&out)?;
        assert_eq!(header.counts, FIXED_COUNTS);
        assert_eq!(header.pointers[..2], [0, 0]);
        assert_eq!(header.pointer(SectionId::Ptr3), 0x300);
        assert_eq!(header.pointer(SectionId::Ptr4), 0x200);
        assert_eq!(&out[HEADER_LEN..], &legacy[HEADER_LEN..]);

        let blocks = mission_text::extract(&out[..0x200]);
        assert_eq!(blocks.len(), 1);
        Ok(())
    }

    #[test]
    fn fractional_count_rejected() {
        let mut legacy = float_count_legacy();
        legacy[COUNTS_OFFSET + 8..COUNTS_OFFSET + 12].copy_from_slice(&2.5f32.to_le_bytes());
        assert_eq!(
            convert(&legacy, LegacyVariant::FloatCount, &ConvertOptions::default()),
            Err(CodecError::InvalidLegacyCount {
                slot: 3,
                bits: 2.5f32.to_bits(),
            })
        );
    }

    #[test]
    fn modern_and_unknown_magic_rejected() {
        let modern = scenario_bytes(0x200, &[]);
        for variant in [LegacyVariant::FixedOffset, LegacyVariant::FloatCount] {
            assert_eq!(
                convert(&modern, variant, &ConvertOptions::default()),
                Err(CodecError::UnsupportedMagic { found: 0x1230 })
            );
        }
        let mut unknown = fixed_offset_legacy(10);
        unknown[..2].copy_from_slice(&0x9999u16.to_le_bytes());
        assert_eq!(
            convert(&unknown, LegacyVariant::FixedOffset, &ConvertOptions::default()),
            Err(CodecError::UnsupportedMagic { found: 0x9999 })
        );
    }

    #[test]
    fn variant_must_match_magic() {
        let legacy = float_count_legacy();
        assert_eq!(LegacyVariant::detect(&legacy), Some(LegacyVariant::FloatCount));
        assert!(matches!(
            convert(&legacy, LegacyVariant::FixedOffset, &ConvertOptions::default()),
            Err(CodecError::UnsupportedMagic { .. })
        ));
    }
}
