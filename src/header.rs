use crate::{errors::CodecError, sections::SectionId, utils::byte_view::ByteView};

pub const MAGIC: u16 = 0x1230;
pub const HEADER_LEN: usize = 0x60;

/// Values a freshly built header carries in count slots 1-10.
pub const FIXED_COUNTS: [u32; 10] = [6, 16, 8, 64, 32, 128, 4, 2, 1, 0];

pub const COUNTS_OFFSET: usize = 0x04;
pub const MAP_HEIGHT_OFFSET: usize = 0x2c;
pub const MAP_WIDTH_OFFSET: usize = 0x30;
pub const RESERVED_TAIL_OFFSET: usize = 0x34;
pub const POINTERS_OFFSET: usize = 0x40;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    pub magic: u16,
    pub reserved: u16,
    pub counts: [u32; 10],
    pub map_height: u32,
    pub map_width: u32,
    /// 0x34..0x40. Zero in every known file, but kept verbatim.
    pub reserved_tail: [u8; 12],
    /// PTR1..PTR8. PTR1 and PTR2 are always zero in this format.
    pub pointers: [u32; 8],
}

impl Header {
    pub fn new(map_width: u32, map_height: u32) -> Self {
        Self {
            magic: MAGIC,
            reserved: 0,
            counts: FIXED_COUNTS,
            map_height,
            map_width,
            reserved_tail: [0; 12],
            pointers: [0; 8],
        }
    }

    /// The magic is checked first, so a short file with the wrong magic is
    /// `InvalidMagic`, not `TruncatedHeader`.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        if let Ok(found) = ByteView::new(bytes).read_u16(0) {
            if found != MAGIC {
                return Err(CodecError::InvalidMagic { found });
            }
        }
        Self::decode_any(bytes)
    }

    /// Decodes the header geometry without checking the magic.
    pub fn decode_any(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < HEADER_LEN {
            return Err(CodecError::TruncatedHeader {
                expected: HEADER_LEN,
                actual: bytes.len(),
            });
        }
        let r = ByteView::new(&bytes[..HEADER_LEN]);
        let mut counts = [0; 10];
        for (i, count) in counts.iter_mut().enumerate() {
            *count = r.read_u32(COUNTS_OFFSET + i * 4)?;
        }
        let mut pointers = [0; 8];
        for (i, pointer) in pointers.iter_mut().enumerate() {
            *pointer = r.read_u32(POINTERS_OFFSET + i * 4)?;
        }
        let mut reserved_tail = [0; 12];
        reserved_tail.copy_from_slice(r.bytes(RESERVED_TAIL_OFFSET, 12)?);
        Ok(Self {
            magic: r.read_u16(0)?,
            reserved: r.read_u16(2)?,
            counts,
            map_height: r.read_u32(MAP_HEIGHT_OFFSET)?,
            map_width: r.read_u32(MAP_WIDTH_OFFSET)?,
            reserved_tail,
            pointers,
        })
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0; HEADER_LEN];
        // Every offset below is inside the fixed-size buffer.
        self.write_into(&mut buf).unwrap();
        buf
    }

    /// Overwrites the first `HEADER_LEN` bytes of `buf`.
    pub fn write_into(&self, buf: &mut [u8]) -> Result<(), CodecError> {
        let mut w = ByteView::new(buf);
        w.write_u16(0, self.magic)?;
        w.write_u16(2, self.reserved)?;
        for (i, &count) in self.counts.iter().enumerate() {
            w.write_u32(COUNTS_OFFSET + i * 4, count)?;
        }
        w.write_u32(MAP_HEIGHT_OFFSET, self.map_height)?;
        w.write_u32(MAP_WIDTH_OFFSET, self.map_width)?;
        w.write_bytes(RESERVED_TAIL_OFFSET, &self.reserved_tail)?;
        for (i, &pointer) in self.pointers.iter().enumerate() {
            w.write_u32(POINTERS_OFFSET + i * 4, pointer)?;
        }
        Ok(())
    }

    pub fn pointer(&self, id: SectionId) -> u32 {
        self.pointers[id.slot()]
    }

    pub fn set_pointer(&mut self, id: SectionId, value: u32) {
        self.pointers[id.slot()] = value;
    }

    /// PTR3..PTR8 in slot order, including inactive (zero) ones.
    pub fn section_pointers(&self) -> [(SectionId, u32); 6] {
        SectionId::ALL.map(|id| (id, self.pointer(id)))
    }

    pub fn hex_count(&self) -> usize {
        let width = usize::try_from(self.map_width).unwrap_or(usize::MAX);
        let height = usize::try_from(self.map_height).unwrap_or(usize::MAX);
        width.saturating_mul(height)
    }
}
