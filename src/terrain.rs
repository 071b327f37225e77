use crate::{errors::CodecError, utils::byte_view::ByteView};
use std::fmt;

/// Absolute offset of the terrain grid in every known scenario file. It does
/// not move with the section pointers.
pub const DEFAULT_TERRAIN_OFFSET: usize = 0x6000;

/// Highest terrain type with a known meaning.
pub const MAX_KNOWN_TERRAIN: u8 = 16;
/// Highest variant with a known meaning.
pub const MAX_KNOWN_VARIANT: u8 = 12;

const NIBBLE_MAX: u8 = 0x0f;

/// One hex. Packed as `variant << 4 | terrain_type`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Hex {
    pub terrain_type: u8,
    pub variant: u8,
}

impl Hex {
    pub fn new(terrain_type: u8, variant: u8) -> Self {
        Self {
            terrain_type,
            variant,
        }
    }

    pub fn unpack(byte: u8) -> Self {
        Self {
            terrain_type: byte & NIBBLE_MAX,
            variant: byte >> 4,
        }
    }

    pub fn pack(self) -> Option<u8> {
        if self.terrain_type > NIBBLE_MAX || self.variant > NIBBLE_MAX {
            return None;
        }
        Some(self.variant << 4 | self.terrain_type)
    }

    pub fn class(self) -> TerrainClass {
        TerrainClass::of(self.terrain_type)
    }
}

/// The raw terrain value is never capped or remapped; callers that display a
/// clamped value do so themselves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TerrainClass {
    Known(u8),
    Unknown(u8),
}

impl TerrainClass {
    pub fn of(terrain_type: u8) -> Self {
        if terrain_type <= MAX_KNOWN_TERRAIN {
            Self::Known(terrain_type)
        } else {
            Self::Unknown(terrain_type)
        }
    }

    pub fn raw(self) -> u8 {
        match self {
            Self::Known(t) | Self::Unknown(t) => t,
        }
    }
}

/// Row-major hex grid: index `i` is `(i % width, i / width)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TerrainGrid {
    width: usize,
    height: usize,
    cells: Vec<Hex>,
}

impl TerrainGrid {
    /// A grid of default hexes.
    ///
    /// # Panics
    ///
    /// Panics if `width * height` overflows `usize`.
    pub fn new(width: usize, height: usize) -> Self {
        let len = width.checked_mul(height).expect("terrain grid size overflows usize");
        Self {
            width,
            height,
            cells: vec![Hex::default(); len],
        }
    }

    pub fn decode(
        raw: &[u8],
        offset: usize,
        width: usize,
        height: usize,
    ) -> Result<Self, CodecError> {
        let needed = width.saturating_mul(height);
        let available = raw.len().saturating_sub(offset);
        let bytes = offset
            .checked_add(needed)
            .and_then(|end| raw.get(offset..end))
            .ok_or(CodecError::InsufficientData {
                offset,
                needed,
                available,
            })?;
        let cells = bytes
            .iter()
            .map(|&b| Hex::unpack(b))
            .collect();
        Ok(Self {
            width,
            height,
            cells,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        self.cells
            .iter()
            .enumerate()
            .map(|(index, &hex)| {
                hex.pack().ok_or(CodecError::ValueOutOfRange {
                    index,
                    terrain_type: hex.terrain_type,
                    variant: hex.variant,
                })
            })
            .collect()
    }

    /// Re-encodes the grid over the bytes it was decoded from.
    pub fn write_into(&self, raw: &mut [u8], offset: usize) -> Result<(), CodecError> {
        let encoded = self.encode()?;
        let available = raw.len().saturating_sub(offset);
        if available < encoded.len() {
            return Err(CodecError::InsufficientData {
                offset,
                needed: encoded.len(),
                available,
            });
        }
        ByteView::new(raw).write_bytes(offset, &encoded)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn cells(&self) -> &[Hex] {
        &self.cells
    }

    pub fn position(&self, index: usize) -> (usize, usize) {
        let width = self.width.max(1);
        (index % width, index / width)
    }

    fn index(&self, x: usize, y: usize) -> Option<usize> {
        (x < self.width && y < self.height).then(|| y * self.width + x)
    }

    pub fn get(&self, x: usize, y: usize) -> Option<Hex> {
        self.index(x, y).map(|i| self.cells[i])
    }

    pub fn get_mut(&mut self, x: usize, y: usize) -> Option<&mut Hex> {
        let i = self.index(x, y)?;
        Some(&mut self.cells[i])
    }

    /// Returns false when `(x, y)` is off the map.
    pub fn set(&mut self, x: usize, y: usize, hex: Hex) -> bool {
        match self.get_mut(x, y) {
            Some(cell) => {
                *cell = hex;
                true
            }
            None => false,
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Hex]> {
        // chunks() panics on zero
        self.cells.chunks(self.width.max(1))
    }
}

/// Two hex digits per hex, variant first, one map row per line.
impl fmt::Display for TerrainGrid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for row in self.rows() {
            for (i, hex) in row.iter().enumerate() {
                if i != 0 {
                    f.write_str(" ")?;
                }
                write!(f, "{:x}{:x}", hex.variant, hex.terrain_type)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn low_nibble_is_terrain_type() {
        let hex = Hex::unpack(0x1a);
        assert_eq!(hex, Hex::new(10, 1));
        assert_eq!(hex.pack(), Some(0x1a));
    }

    #[test]
    fn every_nibble_pair_packs_back() {
        for t in 0..=15 {
            for v in 0..=15 {
                let hex = Hex::new(t, v);
                assert_eq!(Hex::unpack(hex.pack().unwrap()), hex);
            }
        }
    }

    #[test]
    fn row_major_addressing() -> Result<(), Box<dyn Error>> {
        let raw: Vec<u8> = (0..12).collect();
        let grid = TerrainGrid::decode(&raw, 2, 3, 2)?;
        assert_eq!(grid.get(0, 0), Some(Hex::new(2, 0)));
        assert_eq!(grid.get(2, 1), Some(Hex::new(7, 0)));
        assert_eq!(grid.get(3, 0), None);
        assert_eq!(grid.position(4), (1, 1));
        assert_eq!(grid.to_string(), "02 03 04\n05 06 07\n");
        Ok(())
    }

    #[test]
    fn short_buffer_is_insufficient() {
        let raw = [0u8; 10];
        assert_eq!(
            TerrainGrid::decode(&raw, 4, 4, 2),
            Err(CodecError::InsufficientData {
                offset: 4,
                needed: 8,
                available: 6,
            })
        );
        assert!(TerrainGrid::decode(&raw, 40, 1, 1).is_err());
    }

    #[test]
    #[should_panic(expected = "overflows")]
    fn oversized_grid_panics() {
        let _grid = TerrainGrid::new(usize::MAX, 2);
    }

    #[test]
    fn wide_values_are_rejected() {
        let mut grid = TerrainGrid::new(2, 1);
        assert!(grid.set(1, 0, Hex::new(19, 0)));
        assert!(!grid.set(2, 0, Hex::new(1, 0)));
        assert_eq!(grid.encode(), Err(CodecError::ValueOutOfRange {
            index: 1,
            terrain_type: 19,
            variant: 0,
        }));
        assert_eq!(Hex::new(19, 0).class(), TerrainClass::Unknown(19));
        assert_eq!(Hex::new(16, 0).class(), TerrainClass::Known(16));
    }

    #[test]
    fn write_into_touches_only_the_grid() -> Result<(), Box<dyn Error>> {
        let mut raw = vec![0xee; 8];
        let mut grid = TerrainGrid::decode(&raw, 2, 2, 2)?;
        *grid.get_mut(0, 1).unwrap() = Hex::new(3, 4);
        grid.write_into(&mut raw, 2)?;
        assert_eq!(raw, [0xee, 0xee, 0xee, 0xee, 0x43, 0xee, 0xee, 0xee]);
        Ok(())
    }
}
