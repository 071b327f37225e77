use crate::{legacy::ConvertOptions, terrain::DEFAULT_TERRAIN_OFFSET};
use std::{collections::HashMap, error::Error};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub terrain_offset: usize,
    pub legacy: ConvertOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            terrain_offset: DEFAULT_TERRAIN_OFFSET,
            legacy: ConvertOptions::default(),
        }
    }
}

impl Config {
    pub fn from_ini(ini: &str) -> Result<Self, Box<dyn Error>> {
        let data: HashMap<String, HashMap<String, String>> = serde_ini::from_str(ini)?;
        let mut result = Self::default();
        for (section, pairs) in data {
            match section.as_str() {
                "layout" => {
                    for (key, value) in pairs {
                        match key.as_str() {
                            "terrain_offset" => result.terrain_offset = parse_int(&value)?,
                            _ => return Err(format!("unexpected key {key:?} in [layout]").into()),
                        }
                    }
                }
                "legacy" => {
                    for (key, value) in pairs {
                        match key.as_str() {
                            "width" => result.legacy.map_width = parse_int(&value)?,
                            "height" => result.legacy.map_height = parse_int(&value)?,
                            _ => return Err(format!("unexpected key {key:?} in [legacy]").into()),
                        }
                    }
                }
                _ => {
                    return Err("unexpected section in ini".into());
                }
            }
        }
        Ok(result)
    }
}

/// Decimal, or hex with a `0x` prefix.
fn parse_int<T: TryFrom<u64>>(s: &str) -> Result<T, Box<dyn Error>> {
    let s = s.trim();
    let n = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16)?,
        None => s.parse()?,
    };
    T::try_from(n).map_err(|_| format!("{s} is out of range").into())
}
