use crate::{errors::CodecError, header::HEADER_LEN, utils::byte_view::ByteView};
use std::fmt;
use tracing::trace;

/// Shorter printable runs are incidental strings, not briefing lines.
pub const MIN_BLOCK_LEN: usize = 30;
pub const MAX_TEXT_LEN: usize = 127;

const PAD: u8 = b' ';

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Allied,
    Axis,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.pad(match self {
            Self::Allied => "Allied",
            Self::Axis => "Axis",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MissionTextBlock {
    /// Position among all blocks in the prefix.
    pub index: usize,
    /// Absolute file offset.
    pub offset: usize,
    /// Byte length of the run. Never changes.
    pub len: usize,
    /// The run with trailing padding removed.
    pub text: String,
}

impl MissionTextBlock {
    pub fn side(&self) -> Side {
        if self.index % 2 == 0 {
            Side::Allied
        } else {
            Side::Axis
        }
    }
}

fn is_printable(b: u8) -> bool {
    (0x20..=0x7e).contains(&b)
}

/// Scans the prefix (file offset 0 up to the first section) for briefing
/// lines. The header itself is skipped.
pub fn extract(prefix: &[u8]) -> Vec<MissionTextBlock> {
    let mut blocks = Vec::new();
    let mut pos = HEADER_LEN.min(prefix.len());
    while pos < prefix.len() {
        if !is_printable(prefix[pos]) {
            pos += 1;
            continue;
        }
        let start = pos;
        while pos < prefix.len() && is_printable(prefix[pos]) {
            pos += 1;
        }
        let run = &prefix[start..pos];
        if run.len() < MIN_BLOCK_LEN {
            continue;
        }
        let text = String::from_utf8_lossy(run).trim_end().to_string();
        trace!(offset = start, len = run.len(), %text, "mission text block");
        blocks.push(MissionTextBlock {
            index: blocks.len(),
            offset: start,
            len: run.len(),
            text,
        });
    }
    blocks
}

pub fn lines_for(blocks: &[MissionTextBlock], side: Side) -> Vec<&MissionTextBlock> {
    blocks.iter().filter(|b| b.side() == side).collect()
}

pub fn allied_lines(blocks: &[MissionTextBlock]) -> Vec<&MissionTextBlock> {
    lines_for(blocks, Side::Allied)
}

pub fn axis_lines(blocks: &[MissionTextBlock]) -> Vec<&MissionTextBlock> {
    lines_for(blocks, Side::Axis)
}

/// Encodes `new_text` to exactly `len` bytes, padding with spaces or
/// truncating.
pub fn encode_text(new_text: &str, len: usize) -> Result<Vec<u8>, CodecError> {
    let bytes = new_text.as_bytes();
    if bytes.len() > MAX_TEXT_LEN {
        return Err(CodecError::TextTooLong {
            len: bytes.len(),
            max: MAX_TEXT_LEN,
        });
    }
    // A control byte would split the run, and shift every later block to
    // the other side.
    if let Some(index) = bytes.iter().position(|&b| !is_printable(b)) {
        return Err(CodecError::NonPrintableText { index });
    }
    let mut out = bytes[..bytes.len().min(len)].to_vec();
    out.resize(len, PAD);
    Ok(out)
}

/// Overwrites `block` in place. The buffer never changes size.
pub fn replace(raw: &mut [u8], block: &MissionTextBlock, new_text: &str) -> Result<(), CodecError> {
    let encoded = encode_text(new_text, block.len)?;
    ByteView::new(raw).write_bytes(block.offset, &encoded)
}
