use crate::{
    config::Config,
    errors::CodecError,
    header::{Header, FIXED_COUNTS, HEADER_LEN, MAGIC, MAP_HEIGHT_OFFSET, MAP_WIDTH_OFFSET},
    mission_text::{self, MissionTextBlock},
    sections::{rebuild, slice_sections, SectionId, SectionLayout},
    terrain::TerrainGrid,
    utils::byte_view::ByteView,
};
use indexmap::IndexMap;
use std::{
    error::Error,
    fmt,
    fs,
    fs::File,
    io,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};
use tracing::{debug, info, info_span, warn};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadState {
    Valid,
    /// The buffer is kept for inspection, but nothing can be mutated or saved.
    Invalid(CodecError),
}

/// An owned scenario image plus what was decoded from it. Mutations never
/// touch `self`; they return a new container over a modified copy.
#[derive(Clone, Debug)]
pub struct ScenarioContainer {
    raw: Vec<u8>,
    header: Option<Header>,
    layout: SectionLayout,
    state: LoadState,
    terrain_offset: usize,
}

impl ScenarioContainer {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Box<dyn Error>> {
        Self::load_with(path, &Config::default())
    }

    /// Only I/O failures are errors here. Format errors produce an invalid
    /// container; see `state`.
    pub fn load_with(path: impl AsRef<Path>, config: &Config) -> Result<Self, Box<dyn Error>> {
        let path = path.as_ref();
        let _span = info_span!("load", path = %path.display()).entered();
        let raw = fs::read(path)?;
        let result = Self::from_bytes_with(raw, config);
        if let LoadState::Invalid(error) = &result.state {
            warn!(%error, "scenario did not parse");
        }
        Ok(result)
    }

    pub fn from_bytes(raw: Vec<u8>) -> Self {
        Self::from_bytes_with(raw, &Config::default())
    }

    pub fn from_bytes_with(raw: Vec<u8>, config: &Config) -> Self {
        Self::parse(raw, config.terrain_offset)
    }

    fn parse(raw: Vec<u8>, terrain_offset: usize) -> Self {
        let mut result = Self {
            raw,
            header: None,
            layout: SectionLayout::default(),
            state: LoadState::Valid,
            terrain_offset,
        };
        let header = match Header::decode(&result.raw) {
            Ok(header) => header,
            Err(error) => {
                result.state = LoadState::Invalid(error);
                return result;
            }
        };
        match SectionLayout::compute(&header.section_pointers(), result.raw.len()) {
            Ok(layout) => result.layout = layout,
            Err(error) => result.state = LoadState::Invalid(error),
        }
        result.header = Some(header);
        result
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    pub fn is_valid(&self) -> bool {
        self.state == LoadState::Valid
    }

    pub fn error(&self) -> Option<&CodecError> {
        match &self.state {
            LoadState::Valid => None,
            LoadState::Invalid(error) => Some(error),
        }
    }

    pub fn into_valid(self) -> Result<Self, CodecError> {
        match self.state {
            LoadState::Valid => Ok(self),
            LoadState::Invalid(error) => Err(error),
        }
    }

    fn require_valid(&self) -> Result<&Header, CodecError> {
        match (&self.state, &self.header) {
            (LoadState::Valid, Some(header)) => Ok(header),
            (LoadState::Invalid(error), _) => Err(CodecError::ContainerInvalid(Box::new(error.clone()))),
            (LoadState::Valid, None) => unreachable!("valid container without header"),
        }
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn header(&self) -> Option<&Header> {
        self.header.as_ref()
    }

    pub fn layout(&self) -> &SectionLayout {
        &self.layout
    }

    pub fn terrain_offset(&self) -> usize {
        self.terrain_offset
    }

    /// Header plus mission text: everything before the first section.
    pub fn prefix(&self) -> &[u8] {
        &self.raw[..self.layout.prefix_end(self.raw.len())]
    }

    /// Active sections in file order, sliced from the current buffer.
    pub fn sections(&self) -> IndexMap<SectionId, &[u8]> {
        slice_sections(&self.raw, &self.layout)
    }

    /// `None` when the section's pointer is zero.
    pub fn section(&self, id: SectionId) -> Option<&[u8]> {
        self.layout.get(id).map(|b| &self.raw[b.start..b.end])
    }

    pub fn mission_text(&self) -> Vec<MissionTextBlock> {
        if self.header.is_none() {
            return Vec::new();
        }
        mission_text::extract(self.prefix())
    }

    pub fn terrain(&self) -> Result<TerrainGrid, CodecError> {
        let header = self.require_valid()?;
        TerrainGrid::decode(
            &self.raw,
            self.terrain_offset,
            dimension(header.map_width),
            dimension(header.map_height),
        )
    }

    pub fn validate(&self) -> ValidationReport {
        validate(&self.raw, self.terrain_offset)
    }

    pub fn mutate_terrain(&self, grid: &TerrainGrid) -> Result<Self, CodecError> {
        let header = self.require_valid()?;
        let expected = (dimension(header.map_width), dimension(header.map_height));
        let actual = (grid.width(), grid.height());
        if expected != actual {
            return Err(CodecError::DimensionMismatch { expected, actual });
        }
        let mut raw = self.raw.clone();
        grid.write_into(&mut raw, self.terrain_offset)?;
        Ok(self.reparse(raw))
    }

    pub fn mutate_mission_text(&self, index: usize, new_text: &str) -> Result<Self, CodecError> {
        self.require_valid()?;
        let blocks = self.mission_text();
        let block = blocks.get(index).ok_or(CodecError::MissingTextBlock {
            index,
            count: blocks.len(),
        })?;
        let mut raw = self.raw.clone();
        mission_text::replace(&mut raw, block, new_text)?;
        debug!(index, offset = block.offset, len = block.len, "replaced mission text");
        // Pointers do not move; sections are re-sliced from the new buffer.
        Ok(self.reparse(raw))
    }

    /// Rewrites the dimension slots. The terrain grid is stored at a fixed
    /// offset, so the new size must still fit in the file.
    pub fn set_map_dimensions(&self, width: u32, height: u32) -> Result<Self, CodecError> {
        self.require_valid()?;
        let needed = dimension(width).saturating_mul(dimension(height));
        let available = self.raw.len().saturating_sub(self.terrain_offset);
        if needed > available {
            return Err(CodecError::InsufficientData {
                offset: self.terrain_offset,
                needed,
                available,
            });
        }
        let mut raw = self.raw.clone();
        let mut w = ByteView::new(&mut raw[..]);
        w.write_u32(MAP_WIDTH_OFFSET, width)?;
        w.write_u32(MAP_HEIGHT_OFFSET, height)?;
        Ok(self.reparse(raw))
    }

    /// Swaps one section's payload. Sections after it shift, and their
    /// pointers are rewritten.
    pub fn replace_section(&self, id: SectionId, data: &[u8]) -> Result<Self, CodecError> {
        self.require_valid()?;
        if self.layout.get(id).is_none() {
            return Err(CodecError::SectionAbsent(id));
        }
        let sections = self
            .sections()
            .into_iter()
            .map(|(other, bytes)| if other == id { (other, data) } else { (other, bytes) });
        let raw = rebuild(self.prefix(), sections)?;
        let result = self.reparse(raw);
        result.require_valid()?;
        Ok(result)
    }

    fn reparse(&self, raw: Vec<u8>) -> Self {
        Self::parse(raw, self.terrain_offset)
    }

    /// Reassembles the file from its prefix and sections, in file order.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        self.require_valid()?;
        let out = rebuild(self.prefix(), self.sections())?;
        same_size(self.raw.len(), out)
    }

    /// The whole file is built in memory first, then written beside the
    /// destination and renamed over it.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn Error>> {
        let path = path.as_ref();
        let _span = info_span!("save", path = %path.display()).entered();
        let out = self.to_bytes()?;
        write_atomic(path, &out)?;
        info!(len = out.len(), "saved scenario");
        Ok(())
    }
}

fn dimension(value: u32) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

// Unmodified sections always rebuild to the loaded size. A mismatch is a
// codec defect, so it is reported instead of written.
fn same_size(expected: usize, out: Vec<u8>) -> Result<Vec<u8>, CodecError> {
    if out.len() != expected {
        return Err(CodecError::RoundTripSizeMismatch {
            expected,
            actual: out.len(),
        });
    }
    Ok(out)
}

pub fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    if let Err(e) = write_synced(&tmp, data).and_then(|()| fs::rename(&tmp, path)) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}

fn write_synced(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    out.write_all(data)?;
    let file = out.into_inner().map_err(io::IntoInnerError::into_error)?;
    file.sync_all()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Violation {
    TruncatedHeader { len: usize },
    MagicMismatch { found: u16 },
    CountMismatch { slot: usize, expected: u32, found: u32 },
    PlaceholderPointer { slot: usize, value: u32 },
    PointerOutOfBounds { slot: SectionId, value: u32 },
    NonMonotonicSections { offset: usize },
    TerrainOutOfBounds { offset: usize, needed: usize, available: usize },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::TruncatedHeader { len } => write!(f, "file is only {len} bytes"),
            Self::MagicMismatch { found } => write!(f, "magic is {found:#06x}, expected {MAGIC:#06x}"),
            Self::CountMismatch {
                slot,
                expected,
                found,
            } => write!(f, "count {slot} is {found}, expected {expected}"),
            Self::PlaceholderPointer { slot, value } => write!(f, "PTR{slot} is {value:#x}, expected 0"),
            Self::PointerOutOfBounds { slot, value } => write!(f, "{slot} points outside the file ({value:#x})"),
            Self::NonMonotonicSections { offset } => {
                write!(f, "two sections start at {offset:#x}")
            }
            Self::TerrainOutOfBounds {
                offset,
                needed,
                available,
            } => write!(
                f,
                "terrain at {offset:#x} needs {needed} bytes, only {available} remain"
            ),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Collects every violated invariant instead of stopping at the first.
pub fn validate(raw: &[u8], terrain_offset: usize) -> ValidationReport {
    let mut violations = Vec::new();
    let header = match Header::decode_any(raw) {
        Ok(header) => header,
        Err(_) => {
            if let Ok(found) = ByteView::new(raw).read_u16(0) {
                if found != MAGIC {
                    violations.push(Violation::MagicMismatch { found });
                }
            }
            violations.push(Violation::TruncatedHeader { len: raw.len() });
            return ValidationReport { violations };
        }
    };
    if header.magic != MAGIC {
        violations.push(Violation::MagicMismatch {
            found: header.magic,
        });
    }
    for (i, (&found, &expected)) in header.counts.iter().zip(&FIXED_COUNTS).enumerate() {
        if found != expected {
            violations.push(Violation::CountMismatch {
                slot: i + 1,
                expected,
                found,
            });
        }
    }
    for (i, &value) in header.pointers[..2].iter().enumerate() {
        if value != 0 {
            violations.push(Violation::PlaceholderPointer { slot: i + 1, value });
        }
    }

    let mut starts = Vec::with_capacity(6);
    for (slot, value) in header.section_pointers() {
        if value == 0 {
            continue;
        }
        let start = dimension(value);
        if start < HEADER_LEN || start > raw.len() {
            violations.push(Violation::PointerOutOfBounds { slot, value });
        } else {
            starts.push(start);
        }
    }
    starts.sort_unstable();
    for pair in starts.windows(2) {
        if pair[0] == pair[1] {
            violations.push(Violation::NonMonotonicSections { offset: pair[0] });
        }
    }

    let needed = header.hex_count();
    let available = raw.len().saturating_sub(terrain_offset);
    if needed > available {
        violations.push(Violation::TerrainOutOfBounds {
            offset: terrain_offset,
            needed,
            available,
        });
    }
    ValidationReport { violations }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        terrain::Hex,
        tests::{scenario_bytes, scenario_with_text, temp_path, ALLIED_1, AXIS_1},
    };

    #[test]
    fn bad_magic_stops_before_pointers() {
        let mut raw = scenario_bytes(0x8000, &[(SectionId::Ptr3, 0x9000)]);
        raw[..2].copy_from_slice(&0x9999u16.to_le_bytes());
        let container = ScenarioContainer::from_bytes(raw);
        assert_eq!(
            container.error(),
            Some(&CodecError::InvalidMagic { found: 0x9999 })
        );
        assert!(container.header().is_none());
        assert!(container.layout().is_empty());
        assert_eq!(
            container.into_valid().unwrap_err(),
            CodecError::InvalidMagic { found: 0x9999 }
        );
    }

    #[test]
    fn short_file_with_bad_magic() {
        let container = ScenarioContainer::from_bytes(vec![0x99, 0x99, 0, 0]);
        assert_eq!(
            container.error(),
            Some(&CodecError::InvalidMagic { found: 0x9999 })
        );
        assert_eq!(container.validate().violations, [
            Violation::MagicMismatch { found: 0x9999 },
            Violation::TruncatedHeader { len: 4 },
        ]);
    }

    #[test]
    fn size_change_on_rebuild_is_refused() {
        assert_eq!(same_size(3, vec![1, 2, 3]), Ok(vec![1, 2, 3]));
        assert_eq!(
            same_size(4, vec![1, 2, 3]),
            Err(CodecError::RoundTripSizeMismatch {
                expected: 4,
                actual: 3,
            })
        );
    }

    #[test]
    fn bad_pointer_keeps_raw_buffer() {
        let raw = scenario_bytes(0x1000, &[(SectionId::Ptr5, 0x2000)]);
        let container = ScenarioContainer::from_bytes(raw.clone());
        assert!(matches!(
            container.error(),
            Some(CodecError::PointerOutOfBounds {
                slot: SectionId::Ptr5,
                ..
            })
        ));
        assert_eq!(container.raw(), &raw[..]);
        assert!(container.header().is_some());
        assert!(matches!(
            container.to_bytes(),
            Err(CodecError::ContainerInvalid(_))
        ));
        assert!(matches!(
            container.mutate_mission_text(0, "x"),
            Err(CodecError::ContainerInvalid(_))
        ));
    }

    #[test]
    fn absent_and_present_sections() {
        let container = ScenarioContainer::from_bytes(scenario_bytes(0x3000, &[
            (SectionId::Ptr4, 0x1000),
            (SectionId::Ptr3, 0x2000),
        ]));
        assert!(container.is_valid());
        assert_eq!(container.section(SectionId::Ptr4).map(<[u8]>::len), Some(0x1000));
        assert_eq!(container.section(SectionId::Ptr7), None);
        assert_eq!(container.prefix().len(), 0x1000);
    }

    #[test]
    fn unmutated_rebuild_is_identical() -> Result<(), Box<dyn Error>> {
        let raw = scenario_with_text(&[ALLIED_1, AXIS_1]);
        let container = ScenarioContainer::from_bytes(raw.clone());
        assert!(container.to_bytes()? == raw);
        Ok(())
    }

    #[test]
    fn text_mutation_leaves_original_alone() -> Result<(), Box<dyn Error>> {
        let raw = scenario_with_text(&[ALLIED_1, AXIS_1]);
        let container = ScenarioContainer::from_bytes(raw.clone());
        let edited = container.mutate_mission_text(1, "Axis holds the line")?;

        assert!(container.raw() == &raw[..]);
        assert_eq!(edited.raw().len(), raw.len());
        assert_eq!(edited.mission_text()[1].text, "Axis holds the line");
        assert_eq!(edited.mission_text()[0].text, ALLIED_1);
        assert_eq!(edited.layout(), container.layout());
        assert_eq!(
            container.mutate_mission_text(5, "x").unwrap_err(),
            CodecError::MissingTextBlock { index: 5, count: 2 }
        );
        Ok(())
    }

    #[test]
    fn terrain_mutation_in_place() -> Result<(), Box<dyn Error>> {
        let container = ScenarioContainer::from_bytes(scenario_with_text(&[ALLIED_1]));
        let mut grid = container.terrain()?;
        *grid.get_mut(3, 2).unwrap() = Hex::new(10, 1);
        let edited = container.mutate_terrain(&grid)?;

        let offset = container.terrain_offset() + 2 * grid.width() + 3;
        assert_eq!(edited.raw()[offset], 0x1a);
        assert_eq!(edited.terrain()?.get(3, 2), Some(Hex::new(10, 1)));
        assert_eq!(edited.raw().len(), container.raw().len());

        let wrong = TerrainGrid::new(1, 1);
        assert!(matches!(
            container.mutate_terrain(&wrong),
            Err(CodecError::DimensionMismatch { .. })
        ));
        Ok(())
    }

    #[test]
    fn dimensions_must_fit() -> Result<(), Box<dyn Error>> {
        let container = ScenarioContainer::from_bytes(scenario_with_text(&[ALLIED_1]));
        let resized = container.set_map_dimensions(20, 10)?;
        let header = resized.header().unwrap();
        assert_eq!((header.map_width, header.map_height), (20, 10));
        assert_eq!(resized.terrain()?.cells().len(), 200);
        assert!(matches!(
            container.set_map_dimensions(10_000, 10_000),
            Err(CodecError::InsufficientData { .. })
        ));
        Ok(())
    }

    #[test]
    fn replacing_a_section_moves_later_ones() -> Result<(), Box<dyn Error>> {
        let container = ScenarioContainer::from_bytes(scenario_bytes(0x3000, &[
            (SectionId::Ptr4, 0x1000),
            (SectionId::Ptr3, 0x2000),
        ]));
        let edited = container.replace_section(SectionId::Ptr4, &[9; 0x10])?;
        assert_eq!(edited.raw().len(), 0x3000 - 0x1000 + 0x10);
        let header = edited.header().unwrap();
        assert_eq!(header.pointer(SectionId::Ptr4), 0x1000);
        assert_eq!(header.pointer(SectionId::Ptr3), 0x1010);
        assert_eq!(edited.section(SectionId::Ptr4), Some(&[9; 0x10][..]));
        assert_eq!(
            container.replace_section(SectionId::Ptr6, &[]).unwrap_err(),
            CodecError::SectionAbsent(SectionId::Ptr6)
        );
        Ok(())
    }

    #[test]
    fn validation_lists_every_problem() {
        let mut raw = scenario_bytes(0x1000, &[
            (SectionId::Ptr3, 0x800),
            (SectionId::Ptr4, 0x800),
            (SectionId::Ptr5, 0x5000),
        ]);
        raw[0x04] = 99;
        let report = validate(&raw, 0x6000);
        assert!(!report.is_valid());
        assert!(report.violations.contains(&Violation::CountMismatch {
            slot: 1,
            expected: FIXED_COUNTS[0],
            found: 99,
        }));
        assert!(report.violations.contains(&Violation::PointerOutOfBounds {
            slot: SectionId::Ptr5,
            value: 0x5000,
        }));
        assert!(report
            .violations
            .contains(&Violation::NonMonotonicSections { offset: 0x800 }));
        assert!(report
            .violations
            .iter()
            .any(|v| matches!(v, Violation::TerrainOutOfBounds { .. })));
        // validate never changes the container's own state
        let container = ScenarioContainer::from_bytes(raw);
        let before = container.state().clone();
        container.validate();
        assert_eq!(container.state(), &before);
    }

    #[test]
    fn save_writes_whole_file() -> Result<(), Box<dyn Error>> {
        let raw = scenario_with_text(&[ALLIED_1, AXIS_1]);
        let path = temp_path("save_writes_whole_file.scn");
        ScenarioContainer::from_bytes(raw.clone()).save(&path)?;
        let reloaded = ScenarioContainer::load(&path)?;
        assert!(reloaded.is_valid());
        assert!(reloaded.raw() == &raw[..]);
        fs::remove_file(&path)?;
        Ok(())
    }

    #[test]
    fn failed_save_leaves_destination() -> Result<(), Box<dyn Error>> {
        let path = temp_path("failed_save_leaves_destination.scn");
        fs::write(&path, b"keep me")?;
        let invalid = ScenarioContainer::from_bytes(vec![0; 4]);
        assert!(invalid.save(&path).is_err());
        assert_eq!(fs::read(&path)?, b"keep me");
        fs::remove_file(&path)?;
        Ok(())
    }
}
