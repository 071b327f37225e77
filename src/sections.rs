use crate::{
    errors::CodecError,
    header::{HEADER_LEN, POINTERS_OFFSET},
    utils::byte_view::ByteView,
};
use arrayvec::ArrayVec;
use indexmap::IndexMap;
use std::fmt;
use tracing::debug;

/// A pointer-addressed section. PTR1 and PTR2 never address anything.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SectionId {
    Ptr3,
    Ptr4,
    Ptr5,
    Ptr6,
    Ptr7,
    Ptr8,
}

impl SectionId {
    pub const ALL: [Self; 6] = [
        Self::Ptr3,
        Self::Ptr4,
        Self::Ptr5,
        Self::Ptr6,
        Self::Ptr7,
        Self::Ptr8,
    ];

    /// Index into `Header::pointers`.
    pub fn slot(self) -> usize {
        self as usize + 2
    }

    pub fn header_offset(self) -> usize {
        POINTERS_OFFSET + self.slot() * 4
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Ptr3 => "PTR3",
            Self::Ptr4 => "PTR4",
            Self::Ptr5 => "PTR5",
            Self::Ptr6 => "PTR6",
            Self::Ptr7 => "PTR7",
            Self::Ptr8 => "PTR8",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.name() == name)
    }
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SectionBounds {
    pub id: SectionId,
    pub start: usize,
    pub end: usize,
}

impl SectionBounds {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Active sections in ascending file-offset order. Each section runs up to
/// the next one's start, and the last one runs to end of file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SectionLayout {
    entries: ArrayVec<SectionBounds, 6>,
}

impl SectionLayout {
    pub fn compute(pointers: &[(SectionId, u32)], file_len: usize) -> Result<Self, CodecError> {
        let mut active: ArrayVec<(SectionId, usize), 6> = ArrayVec::new();
        for &(id, value) in pointers {
            if value == 0 {
                continue;
            }
            let start = usize::try_from(value).unwrap_or(usize::MAX);
            if start < HEADER_LEN || start > file_len {
                return Err(CodecError::PointerOutOfBounds {
                    slot: id,
                    value,
                    min: HEADER_LEN,
                    len: file_len,
                });
            }
            if active.iter().any(|&(other, _)| other == id) || active.is_full() {
                return Err(CodecError::OverlappingOrUnsortedSections { offset: start });
            }
            active.push((id, start));
        }

        // File order, never slot order.
        active.sort_unstable_by_key(|&(_, start)| start);

        let mut entries = ArrayVec::new();
        for (i, &(id, start)) in active.iter().enumerate() {
            let end = active.get(i + 1).map_or(file_len, |&(_, next)| next);
            if end == start && i + 1 < active.len() {
                return Err(CodecError::OverlappingOrUnsortedSections { offset: start });
            }
            entries.push(SectionBounds { id, start, end });
        }

        let layout = Self { entries };
        debug!(?layout, file_len, "computed section layout");
        Ok(layout)
    }

    pub fn entries(&self) -> &[SectionBounds] {
        &self.entries
    }

    pub fn get(&self, id: SectionId) -> Option<SectionBounds> {
        self.entries.iter().copied().find(|b| b.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// End of the pre-first-section prefix (header plus mission text).
    pub fn prefix_end(&self, file_len: usize) -> usize {
        self.entries.first().map_or(file_len, |b| b.start)
    }

    pub fn ids(&self) -> impl Iterator<Item = SectionId> + '_ {
        self.entries.iter().map(|b| b.id)
    }
}

pub struct OrderedSections<'a> {
    pub layout: SectionLayout,
    /// Keyed by name, iterated in file order.
    pub sections: IndexMap<SectionId, &'a [u8]>,
}

pub fn extract<'a>(
    raw: &'a [u8],
    pointers: &[(SectionId, u32)],
) -> Result<OrderedSections<'a>, CodecError> {
    let layout = SectionLayout::compute(pointers, raw.len())?;
    let sections = slice_sections(raw, &layout);
    Ok(OrderedSections { layout, sections })
}

pub fn slice_sections<'a>(raw: &'a [u8], layout: &SectionLayout) -> IndexMap<SectionId, &'a [u8]> {
    layout
        .entries()
        .iter()
        .map(|b| (b.id, &raw[b.start..b.end]))
        .collect()
}

/// Concatenates `prefix` with the sections in the order given, rewriting the
/// pointer slots in the prefix's header to each section's new start. Slots
/// for sections not given are cleared. When no section changed length, the
/// pointers come out identical to the ones the sections were extracted with.
pub fn rebuild<'a>(
    prefix: &[u8],
    sections: impl IntoIterator<Item = (SectionId, &'a [u8])>,
) -> Result<Vec<u8>, CodecError> {
    if prefix.len() < HEADER_LEN {
        return Err(CodecError::TruncatedHeader {
            expected: HEADER_LEN,
            actual: prefix.len(),
        });
    }

    let sections: Vec<_> = sections.into_iter().collect();
    let total = prefix.len() + sections.iter().map(|(_, data)| data.len()).sum::<usize>();
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(prefix);

    let mut seen = ArrayVec::<SectionId, 6>::new();
    let mut pointers = [0u32; 6];
    for (i, &(id, data)) in sections.iter().enumerate() {
        let start = out.len();
        if seen.contains(&id) || (data.is_empty() && i + 1 < sections.len()) {
            return Err(CodecError::OverlappingOrUnsortedSections { offset: start });
        }
        seen.push(id);
        pointers[id as usize] =
            u32::try_from(start).map_err(|_| CodecError::PointerOutOfBounds {
                slot: id,
                value: u32::MAX,
                min: HEADER_LEN,
                len: total,
            })?;
        out.extend_from_slice(data);
    }

    let mut w = ByteView::new(&mut out[..HEADER_LEN]);
    for id in SectionId::ALL {
        w.write_u32(id.header_offset(), pointers[id as usize])?;
    }
    Ok(out)
}
