#![warn(clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]
#![cfg_attr(feature = "strict", deny(warnings))]

pub use crate::{
    config::Config,
    container::{validate, LoadState, ScenarioContainer, ValidationReport, Violation},
    errors::CodecError,
    header::Header,
    legacy::{convert, ConvertOptions, LegacyVariant},
    mission_text::{MissionTextBlock, Side},
    parts::{build_parts, extract_parts},
    sections::{OrderedSections, SectionBounds, SectionId, SectionLayout},
    terrain::{Hex, TerrainClass, TerrainGrid},
};

pub mod config;
pub mod container;
pub mod errors;
pub mod header;
pub mod legacy;
pub mod mission_text;
pub mod parts;
pub mod sections;
pub mod terrain;
mod utils;
