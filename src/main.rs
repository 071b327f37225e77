#![warn(clippy::pedantic, clippy::cargo)]
#![allow(clippy::module_name_repetitions, clippy::multiple_crate_versions)]
#![cfg_attr(feature = "strict", deny(warnings))]

use clap::Parser;
use scenario_codec::{
    build_parts,
    container::write_atomic,
    convert,
    extract_parts,
    mission_text::{allied_lines, axis_lines},
    parts::dump_mission_text,
    Config,
    Hex,
    LegacyVariant,
    ScenarioContainer,
};
use std::{
    error::Error,
    fs,
    io,
    path::{Path, PathBuf},
    process,
};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(name = "scenario-codec", about = "Inspect, edit and convert scenario files")]
enum Command {
    Info(Info),
    Extract(Extract),
    Build(Build),
    Text(Text),
    Terrain(Terrain),
    SetHex(SetHex),
    Resize(Resize),
    Convert(Convert),
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let r = match Command::parse() {
        Command::Info(cmd) => cmd.run(),
        Command::Extract(cmd) => cmd.run(),
        Command::Build(cmd) => cmd.run(),
        Command::Text(cmd) => cmd.run(),
        Command::Terrain(cmd) => cmd.run(),
        Command::SetHex(cmd) => cmd.run(),
        Command::Resize(cmd) => cmd.run(),
        Command::Convert(cmd) => cmd.run(),
    };
    if let Err(e) = r {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn read_config(path: Option<&Path>) -> Result<Config, Box<dyn Error>> {
    match path {
        Some(path) => Config::from_ini(&fs::read_to_string(path)?),
        None => Ok(Config::default()),
    }
}

fn load_valid(input: &Path, config_path: Option<&Path>) -> Result<ScenarioContainer, Box<dyn Error>> {
    let config = read_config(config_path)?;
    Ok(ScenarioContainer::load_with(input, &config)?.into_valid()?)
}

/// Print the header, sections, mission text and validation report
#[derive(Parser)]
struct Info {
    input: PathBuf,
    #[clap(short, long = "config")]
    config_path: Option<PathBuf>,
}

impl Info {
    fn run(self) -> Result<(), Box<dyn Error>> {
        let config = read_config(self.config_path.as_deref())?;
        let container = ScenarioContainer::load_with(&self.input, &config)?;

        println!("{} ({} bytes)", self.input.display(), container.raw().len());
        if let Some(error) = container.error() {
            println!("INVALID: {error}");
        }
        if let Some(header) = container.header() {
            println!("magic     {:#06x}", header.magic);
            println!("counts    {:?}", header.counts);
            println!("map       {}x{}", header.map_width, header.map_height);
            for (i, pointer) in header.pointers.iter().enumerate() {
                println!("PTR{}      {pointer:#x}", i + 1);
            }
        }

        println!();
        println!("prefix    0x0000..{:#06x}", container.prefix().len());
        for b in container.layout().entries() {
            println!("{:<9} {:#06x}..{:#06x} ({} bytes)", b.id, b.start, b.end, b.len());
        }

        let blocks = container.mission_text();
        println!();
        println!("allied briefing:");
        for block in allied_lines(&blocks) {
            println!("  {}", block.text);
        }
        println!("axis briefing:");
        for block in axis_lines(&blocks) {
            println!("  {}", block.text);
        }

        let report = container.validate();
        println!();
        if report.is_valid() {
            println!("valid");
        } else {
            for violation in &report.violations {
                println!("violation: {violation}");
            }
        }
        Ok(())
    }
}

/// Split a scenario into its prefix and sections
#[derive(Parser)]
struct Extract {
    input: PathBuf,
    #[clap(short, long)]
    output: PathBuf,
    #[clap(short, long = "config")]
    config_path: Option<PathBuf>,
}

impl Extract {
    fn run(self) -> Result<(), Box<dyn Error>> {
        let container = load_valid(&self.input, self.config_path.as_deref())?;
        if !self.output.exists() {
            fs::create_dir(&self.output)?;
        }
        extract_parts(&container, &mut fs_writer(&self.output))?;
        Ok(())
    }
}

/// Reassemble a scenario from an extracted directory
#[derive(Parser)]
struct Build {
    input: PathBuf,
    #[clap(short, long)]
    output: PathBuf,
    #[clap(short, long = "config")]
    config_path: Option<PathBuf>,
}

impl Build {
    fn run(self) -> Result<(), Box<dyn Error>> {
        let config = read_config(self.config_path.as_deref())?;
        let out = build_parts(|path| Ok(fs::read(self.input.join(path))?))?;
        // Fail before writing anything the codec itself cannot read back.
        let built = ScenarioContainer::from_bytes_with(out, &config).into_valid()?;
        for violation in &built.validate().violations {
            warn!(%violation, "built scenario");
        }
        write_atomic(&self.output, built.raw())?;
        Ok(())
    }
}

/// Replace one mission text block, keeping its length
#[derive(Parser)]
struct Text {
    input: PathBuf,
    #[clap(long)]
    block: usize,
    #[clap(long)]
    text: String,
    #[clap(short, long)]
    output: PathBuf,
    #[clap(short, long = "config")]
    config_path: Option<PathBuf>,
}

impl Text {
    fn run(self) -> Result<(), Box<dyn Error>> {
        let container = load_valid(&self.input, self.config_path.as_deref())?;
        let edited = container.mutate_mission_text(self.block, &self.text)?;
        let dump = dump_mission_text(&edited.mission_text())?;
        print!("{dump}");
        edited.save(&self.output)?;
        Ok(())
    }
}

/// Print the terrain grid, two hex digits (variant, type) per hex
#[derive(Parser)]
struct Terrain {
    input: PathBuf,
    #[clap(short, long = "config")]
    config_path: Option<PathBuf>,
}

impl Terrain {
    fn run(self) -> Result<(), Box<dyn Error>> {
        let container = load_valid(&self.input, self.config_path.as_deref())?;
        let grid = container.terrain()?;
        print!("{grid}");
        Ok(())
    }
}

/// Set one hex's terrain type and variant
#[derive(Parser)]
struct SetHex {
    input: PathBuf,
    x: usize,
    y: usize,
    terrain_type: u8,
    variant: u8,
    #[clap(short, long)]
    output: PathBuf,
    #[clap(short, long = "config")]
    config_path: Option<PathBuf>,
}

impl SetHex {
    fn run(self) -> Result<(), Box<dyn Error>> {
        let container = load_valid(&self.input, self.config_path.as_deref())?;
        let mut grid = container.terrain()?;
        if !grid.set(self.x, self.y, Hex::new(self.terrain_type, self.variant)) {
            return Err(format!("({}, {}) is off the map", self.x, self.y).into());
        }
        container.mutate_terrain(&grid)?.save(&self.output)?;
        Ok(())
    }
}

/// Change the map dimensions stored in the header
#[derive(Parser)]
struct Resize {
    input: PathBuf,
    width: u32,
    height: u32,
    #[clap(short, long)]
    output: PathBuf,
    #[clap(short, long = "config")]
    config_path: Option<PathBuf>,
}

impl Resize {
    fn run(self) -> Result<(), Box<dyn Error>> {
        let container = load_valid(&self.input, self.config_path.as_deref())?;
        container
            .set_map_dimensions(self.width, self.height)?
            .save(&self.output)?;
        Ok(())
    }
}

/// Convert a legacy scenario to the current layout
#[derive(Parser)]
struct Convert {
    input: PathBuf,
    /// "fixed" or "float"; detected from the magic when omitted
    #[clap(long)]
    variant: Option<LegacyVariant>,
    #[clap(long)]
    width: Option<u32>,
    #[clap(long)]
    height: Option<u32>,
    #[clap(short, long)]
    output: PathBuf,
    #[clap(short, long = "config")]
    config_path: Option<PathBuf>,
}

impl Convert {
    fn run(self) -> Result<(), Box<dyn Error>> {
        let config = read_config(self.config_path.as_deref())?;
        let mut options = config.legacy;
        if let Some(width) = self.width {
            options.map_width = width;
        }
        if let Some(height) = self.height {
            options.map_height = height;
        }

        let legacy = fs::read(&self.input)?;
        let variant = match self.variant {
            Some(variant) => variant,
            None => LegacyVariant::detect(&legacy).ok_or("not a known legacy scenario")?,
        };
        let out = convert(&legacy, variant, &options)?;
        write_atomic(&self.output, &out)?;
        Ok(())
    }
}

fn fs_writer(root: &Path) -> impl Fn(&str, &[u8]) -> Result<(), Box<dyn Error>> + '_ {
    |path, data| {
        let path = root.join(path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, data)?;
        Ok(())
    }
}
