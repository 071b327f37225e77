use crate::{
    container::ScenarioContainer,
    errors::CodecError,
    mission_text::{self, MissionTextBlock},
    sections::{rebuild, SectionId},
};
use std::{error::Error, fmt::Write};
use tracing::info_span;

pub const PREFIX_FILE: &str = "./prefix.bin";
pub const MAP_FILE: &str = "./.map";
pub const MISSION_FILE: &str = "./mission.txt";

/// Writes the prefix, each section, and a `.map` listing sections in file
/// order. `mission.txt` is for reading only; `build_parts` ignores it.
pub fn extract_parts(
    container: &ScenarioContainer,
    write: &mut impl FnMut(&str, &[u8]) -> Result<(), Box<dyn Error>>,
) -> Result<(), Box<dyn Error>> {
    let _span = info_span!("extract_parts").entered();
    if let Some(error) = container.error() {
        return Err(CodecError::ContainerInvalid(Box::new(error.clone())).into());
    }

    write(PREFIX_FILE, container.prefix())?;

    let mut map = String::with_capacity(64);
    for (id, data) in container.sections() {
        writeln!(map, "{id}")?;
        write(&format!("./{id}.bin"), data)?;
    }
    write(MAP_FILE, map.as_bytes())?;

    let dump = dump_mission_text(&container.mission_text())?;
    write(MISSION_FILE, dump.as_bytes())?;
    Ok(())
}

pub fn build_parts(
    read: impl Fn(&str) -> Result<Vec<u8>, Box<dyn Error>>,
) -> Result<Vec<u8>, Box<dyn Error>> {
    let _span = info_span!("build_parts").entered();
    let prefix = read(PREFIX_FILE)?;
    let map = String::from_utf8(read(MAP_FILE).map_err(|_| "missing map")?)?;

    let mut parts = Vec::with_capacity(6);
    for name in map.lines() {
        let id = SectionId::from_name(name).ok_or("bad section name in map")?;
        parts.push((id, read(&format!("./{name}.bin"))?));
    }
    let out = rebuild(&prefix, parts.iter().map(|(id, data)| (*id, &data[..])))?;
    Ok(out)
}

pub fn dump_mission_text(blocks: &[MissionTextBlock]) -> Result<String, std::fmt::Error> {
    let mut out = String::with_capacity(1 << 10);
    for block in blocks {
        writeln!(
            out,
            "{:>3} {:<6} @{:#06x} [{}] {}",
            block.index,
            block.side(),
            block.offset,
            block.len,
            block.text,
        )?;
    }
    if !blocks.is_empty() {
        let allied = mission_text::allied_lines(blocks).len();
        let axis = mission_text::axis_lines(blocks).len();
        writeln!(out, "# {allied} allied, {axis} axis")?;
    }
    Ok(out)
}
