/*
Copyright 2024 oceanbin developers

This file is part of oceanbin.

oceanbin is a free software: you can redistribute it and/or modify
it under the terms of the GNU General Public License as published by
the Free Software Foundation; either version 3 of the License, or
(at your option) any later version.

oceanbin is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
GNU General Public License for more details.

You should have received a copy of the GNU General Public License
along with oceanbin. If not, see https://www.gnu.org/licenses/.
*/

//! Module responsible for parsing and checking the configuration file.
//!
//! To provide meaningful error messages. The configuration file uses
//! [YAML](https://en.wikipedia.org/wiki/YAML) and `serde` to enforce
//! strong typing and automatic type checking.
//!
//! The structures and their fields in this module directly correspond to
//! the fields inside `config.yaml` so you can check this documentation
//! for more details how to set the config file.

use crate::codec::Compression;
use crate::errors::ConfigError;
use crate::grid::{LocatorParams, Region, ResamplePolicy};
use chrono::NaiveDate;
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Kind of a listed input file.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    Coordinates,
    Daily,
    Currents,
    Component,
}

/// One binary file to process.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct InputFile {
    pub path: PathBuf,

    pub kind: InputKind,

    /// _(Optional)_ Body encoding of daily files written by
    /// older tools with version tag `1` for every encoding.
    ///
    /// When not set, the encoding is taken from the version tag.
    #[serde(default)]
    pub legacy_compression: Option<Compression>,
}

/// Fields with information about input files.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct Input {
    /// _(Optional)_ Coordinates file shared by daily field files.
    ///
    /// Required when any daily file is listed, as daily
    /// headers do not store the grid shape.
    #[serde(default)]
    pub coordinates: Option<PathBuf>,

    /// List of files to inspect and probe.
    #[serde(default)]
    pub files: Vec<InputFile>,
}

impl Input {
    pub fn check_bounds(&self) -> Result<(), ConfigError> {
        let has_daily = self.files.iter().any(|f| f.kind == InputKind::Daily);

        if has_daily && self.coordinates.is_none() {
            return Err(ConfigError::OutOfBounds(
                "Daily files require a coordinates file",
            ));
        }

        Ok(())
    }
}

/// Named point at which every input file is sampled.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct Probe {
    pub label: String,

    /// Longitude in degrees, either in `-180..180`
    /// or `0..360` convention matching the grid.
    pub lon: f32,

    /// Latitude in degrees.
    pub lat: f32,
}

impl Probe {
    pub fn check_bounds(&self) -> Result<(), ConfigError> {
        if !(-90.0..=90.0).contains(&self.lat) {
            return Err(ConfigError::OutOfBounds(
                "Probe latitude is too low or too high",
            ));
        }

        if !(-180.0..=360.0).contains(&self.lon) {
            return Err(ConfigError::OutOfBounds(
                "Probe longitude is too low or too high",
            ));
        }

        Ok(())
    }
}

/// Conversion of a field from a regular grid onto another grid.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct Regrid {
    /// Single component file with the field on a regular grid.
    pub source: PathBuf,

    /// Coordinates file of the target grid.
    pub target: PathBuf,

    /// Date written to the output daily file header.
    pub date: NaiveDate,

    /// Name of the output daily file, placed in the output directory.
    pub output: String,

    /// _(Optional)_ Body encoding of the output. Defaults to `none`.
    #[serde(default)]
    pub compression: Compression,
}

/// _(Optional)_ Fields with output settings.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct Output {
    /// _(Optional)_ Directory for produced files.
    /// It must not exist or be empty.
    ///
    /// Defaults to `./output/`.
    #[serde(default = "Output::default_directory")]
    pub directory: PathBuf,
}

impl Output {
    fn default_directory() -> PathBuf {
        PathBuf::from("./output/")
    }
}

impl Default for Output {
    fn default() -> Self {
        Output {
            directory: Output::default_directory(),
        }
    }
}

/// _(Optional)_ Fields with information about
/// resources available for processing.
#[derive(Clone, PartialEq, PartialOrd, Debug, Deserialize)]
pub struct Resources {
    /// _(Optional)_ Thread count used for processing files.
    /// Every file is processed independently, so the thread
    /// pool will use up to this number of workers.
    ///
    /// Cannot be less than `1`. Defaults to `1`.
    #[serde(default = "Resources::default_threads")]
    pub threads: u16,

    /// _(Optional)_ Heap memory limit in MB.
    /// Useful for enabling meaningful Out-of-memory error messages,
    /// as full grids can reach tens of millions of cells and every
    /// worker holds its own copy of the arrays.
    ///
    /// Cannot be less than `128`. Defaults to whole addressable-space
    /// (`2^32` or `2^64` bytes).
    #[serde(default = "Resources::default_memory")]
    pub memory: usize,
}

impl Resources {
    fn default_threads() -> u16 {
        1
    }

    fn default_memory() -> usize {
        usize::MAX / (1024 * 1024)
    }

    /// Checks if thread count and memory limit are
    /// above limits.
    pub fn check_bounds(&self) -> Result<(), ConfigError> {
        if self.threads < 1 {
            return Err(ConfigError::OutOfBounds(
                "Available threads cannot be less than 1",
            ));
        }

        if self.memory < 128 {
            return Err(ConfigError::OutOfBounds(
                "Available memory cannot be less than 128 MB",
            ));
        }

        Ok(())
    }
}

impl Default for Resources {
    fn default() -> Self {
        Resources {
            threads: Resources::default_threads(),
            memory: Resources::default_memory(),
        }
    }
}

/// Main config structure representing the fields in
/// configuration file.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct Config {
    pub input: Input,

    #[serde(default)]
    pub probes: Vec<Probe>,

    /// _(Optional)_ Region in which field statistics are reported.
    #[serde(default)]
    pub region: Option<Region>,

    #[serde(default)]
    pub locator: LocatorParams,

    #[serde(default)]
    pub resampling: ResamplePolicy,

    #[serde(default)]
    pub regrid: Vec<Regrid>,

    #[serde(default)]
    pub output: Output,

    #[serde(default)]
    pub resources: Resources,
}

impl Config {
    /// Config structure constructor, responsible for
    /// deserializing configuration and checking it.
    pub fn new_from_file(file_path: &Path) -> Result<Config, ConfigError> {
        let data = fs::read(file_path)?;
        Config::new_from_slice(data.as_slice())
    }

    pub fn new_from_slice(data: &[u8]) -> Result<Config, ConfigError> {
        let config: Config = serde_yaml::from_slice(data)?;

        config.input.check_bounds()?;
        config.resources.check_bounds()?;
        config.resampling.check_bounds()?;

        for probe in &config.probes {
            probe.check_bounds()?;
        }

        if config.locator.km_per_degree <= 0.0 {
            return Err(ConfigError::OutOfBounds(
                "Degree length must be positive",
            ));
        }

        if config.locator.far_node_km.is_nan() || config.locator.far_node_km < 0.0 {
            return Err(ConfigError::OutOfBounds(
                "Far node distance cannot be negative",
            ));
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::{Config, InputKind};
    use crate::codec::Compression;
    use crate::errors::ConfigError;

    const FULL_CONFIG: &str = r#"
input:
  coordinates: data/eke_coords.bin
  files:
    - path: data/currents_2011_03.bin
      kind: currents
    - path: data/daily/eke_20110311.bin
      kind: daily
      legacy_compression: half
probes:
  - label: Fukushima
    lon: 141.03
    lat: 37.42
region:
  west: 135.0
  east: 150.0
  south: 30.0
  north: 45.0
locator:
  far_node_km: 25.0
resampling:
  ceiling: 3000.0
regrid:
  - source: data/k_regular.bin
    target: data/eke_coords.bin
    date: 2011-03-11
    output: eke_20110311.bin
    compression: half
resources:
  threads: 4
"#;

    #[test]
    fn full_config() {
        let config = Config::new_from_slice(FULL_CONFIG.as_bytes()).unwrap();

        assert_eq!(config.input.files.len(), 2);
        assert_eq!(config.input.files[1].kind, InputKind::Daily);
        assert_eq!(
            config.input.files[1].legacy_compression,
            Some(Compression::Half)
        );
        assert_eq!(config.resampling.fill_value, 0.0);
        assert_eq!(config.resampling.ceiling, Some(3000.0));
        assert_eq!(config.locator.km_per_degree, 111.0);
        assert_eq!(config.locator.far_node_km, 25.0);
        assert_eq!(config.regrid[0].compression, Compression::Half);
        assert_eq!(config.resources.threads, 4);
        assert!(config.region.is_some());
    }

    #[test]
    fn daily_requires_coordinates() {
        let yaml = r#"
input:
  files:
    - path: eke_20110311.bin
      kind: daily
"#;

        assert!(matches!(
            Config::new_from_slice(yaml.as_bytes()),
            Err(ConfigError::OutOfBounds(_))
        ));
    }

    #[test]
    fn far_node_bounds() {
        let yaml = r#"
input:
  files: []
locator:
  far_node_km: -1.0
"#;

        assert!(matches!(
            Config::new_from_slice(yaml.as_bytes()),
            Err(ConfigError::OutOfBounds(_))
        ));
    }

    #[test]
    fn probe_bounds() {
        let yaml = r#"
input:
  files: []
probes:
  - label: nowhere
    lon: 10.0
    lat: 95.0
"#;

        assert!(matches!(
            Config::new_from_slice(yaml.as_bytes()),
            Err(ConfigError::OutOfBounds(_))
        ));
    }
}
