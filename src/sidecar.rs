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

//! Module with the JSON metadata document written next to
//! grid files.
//!
//! The document lists every produced file with its date, shape,
//! coordinate ranges and encoding, so consumers know how to read
//! each binary file. [`FileRecord::check_header`] keeps the metadata
//! and the self-describing headers in sync.

use crate::codec::{Compression, DailyEncoding, Header};
use crate::errors::SidecarError;
use crate::grid::Grid;
use chrono::{Local, NaiveDateTime};
use float_cmp::approx_eq;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Name of the grid file variant stored in metadata.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Coordinates,
    Daily,
    Currents,
    Component,
}

impl From<&Header> for RecordKind {
    fn from(header: &Header) -> Self {
        match header {
            Header::Coordinates { .. } => RecordKind::Coordinates,
            Header::Daily { .. } => RecordKind::Daily,
            Header::Currents { .. } => RecordKind::Currents,
            Header::Component { .. } => RecordKind::Component,
        }
    }
}

/// Human readable layout of one file variant.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct FormatDescription {
    pub header: String,
    pub data_order: String,
    pub note: String,
}

impl FormatDescription {
    pub fn for_kind(kind: RecordKind) -> Self {
        let (header, data_order) = match kind {
            RecordKind::Coordinates => ("version(=1), n_lat, n_lon", "lon, lat (float32)"),
            RecordKind::Daily => (
                "version, year, month, day[, max_error_scaled if version==2]",
                "field (float32 if version==1, float16 codes if version==2)",
            ),
            RecordKind::Currents => (
                "version(2|3), n_lat, n_lon, year, month[, day if version==3]",
                "lon, lat, u, v (float32)",
            ),
            RecordKind::Component => (
                "version(=2), n_lat, n_lon, 1",
                "lon, lat, field (float32)",
            ),
        };

        FormatDescription {
            header: header.to_string(),
            data_order: data_order.to_string(),
            note: "little-endian 32-bit integers, NaN values represent land mask".to_string(),
        }
    }
}

/// Shared grid of a set of files.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct GridRecord {
    pub n_lat: usize,
    pub n_lon: usize,
    pub total_cells: usize,
    pub coordinates_file: String,
}

/// Description of one produced file.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct FileRecord {
    pub file: String,
    pub kind: RecordKind,
    pub version: i32,

    /// `YYYY-MM-DD`, or `YYYY-MM` for monthly files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,

    pub compression: Compression,

    /// `[n_lat, n_lon]`
    pub grid_shape: [usize; 2],

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon_range: Option<[f32; 2]>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat_range: Option<[f32; 2]>,

    /// Declared quantization error of half-float bodies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_error: Option<f32>,
}

impl FileRecord {
    /// Describes a written file from its header and,
    /// when the file carries one, its grid.
    pub fn new(file: &str, header: &Header, grid: Option<&Grid>) -> Self {
        let (n_lat, n_lon) = header.shape();
        let ranges = grid.map(Grid::ranges).unwrap_or_default();

        let max_error = match header {
            Header::Daily { encoding, .. } => encoding.max_error(),
            _ => None,
        };

        FileRecord {
            file: file.to_string(),
            kind: RecordKind::from(header),
            version: header.version(),
            date: header.date().map(|date| date.label()),
            compression: header.body_layout().1,
            grid_shape: [n_lat, n_lon],
            lon_range: ranges.lon.map(|(lo, hi)| [lo, hi]),
            lat_range: ranges.lat.map(|(lo, hi)| [lo, hi]),
            max_error,
        }
    }

    /// Verifies that a decoded header agrees with this record.
    pub fn check_header(&self, header: &Header) -> Result<(), SidecarError> {
        if self.kind != RecordKind::from(header) {
            return Err(SidecarError::HeaderMismatch("file kind differs"));
        }

        if self.version != header.version() {
            return Err(SidecarError::HeaderMismatch("version differs"));
        }

        if self.compression != header.body_layout().1 {
            return Err(SidecarError::HeaderMismatch("compression differs"));
        }

        let (n_lat, n_lon) = header.shape();
        if self.grid_shape != [n_lat, n_lon] {
            return Err(SidecarError::HeaderMismatch("grid shape differs"));
        }

        if self.date != header.date().map(|date| date.label()) {
            return Err(SidecarError::HeaderMismatch("date differs"));
        }

        if let Header::Daily {
            encoding: encoding @ DailyEncoding::Half { .. },
            ..
        } = header
        {
            match (self.max_error, encoding.max_error()) {
                (Some(recorded), Some(declared))
                    if approx_eq!(f32, recorded, declared, ulps = 2) => {}
                _ => return Err(SidecarError::HeaderMismatch("max error differs")),
            }
        }

        Ok(())
    }
}

/// Metadata document of a set of processed files.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Sidecar {
    pub description: String,

    /// Layout of every variant present in `files`.
    pub binary_format: BTreeMap<RecordKind, FormatDescription>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid: Option<GridRecord>,

    pub files: Vec<FileRecord>,

    /// Processing parameters (fill value, scaling constants, ...).
    #[serde(default)]
    pub parameters: BTreeMap<String, f64>,

    pub processing_date: NaiveDateTime,
}

impl Sidecar {
    pub fn new(description: &str) -> Self {
        Sidecar {
            description: description.to_string(),
            binary_format: BTreeMap::new(),
            grid: None,
            files: vec![],
            parameters: BTreeMap::new(),
            processing_date: Local::now().naive_local(),
        }
    }

    /// Adds a file record, describing its variant if not yet present.
    pub fn push(&mut self, record: FileRecord) {
        self.binary_format
            .entry(record.kind)
            .or_insert_with(|| FormatDescription::for_kind(record.kind));

        self.files.push(record);
    }

    pub fn record_for(&self, file: &str) -> Option<&FileRecord> {
        self.files.iter().find(|record| record.file == file)
    }

    pub fn save(&self, path: &Path) -> Result<(), SidecarError> {
        debug!("Saving metadata to {}", path.display());

        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;

        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, SidecarError> {
        let reader = BufReader::new(File::open(path)?);

        Ok(serde_json::from_reader(reader)?)
    }
}

#[cfg(test)]
mod tests {
    use super::{FileRecord, GridRecord, RecordKind, Sidecar};
    use crate::codec::{DailyEncoding, DateStamp, Header};
    use crate::errors::SidecarError;
    use crate::grid::Grid;

    fn daily_header() -> Header {
        Header::Daily {
            shape: (1793, 2324),
            date: DateStamp {
                year: 2011,
                month: 3,
                day: Some(11),
            },
            encoding: DailyEncoding::Half {
                max_error_scaled: 1250,
            },
        }
    }

    #[test]
    fn record_matches_header() {
        let header = daily_header();
        let record = FileRecord::new("eke_20110311.bin", &header, None);

        assert_eq!(record.kind, RecordKind::Daily);
        assert_eq!(record.date.as_deref(), Some("2011-03-11"));
        assert_eq!(record.max_error, Some(1.25));
        assert!(record.check_header(&header).is_ok());

        let other = Header::Daily {
            shape: (1793, 2324),
            date: DateStamp {
                year: 2011,
                month: 3,
                day: Some(11),
            },
            encoding: DailyEncoding::Float32,
        };
        assert!(matches!(
            record.check_header(&other),
            Err(SidecarError::HeaderMismatch(_))
        ));
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.json");

        let grid = Grid::from_axes(&[109.0, 251.3], &[0.0, 72.5]);
        let header = Header::Currents {
            n_lat: 2,
            n_lon: 2,
            date: DateStamp::monthly(2011, 3),
        };

        let mut sidecar = Sidecar::new("surface currents");
        sidecar.grid = Some(GridRecord {
            n_lat: 2,
            n_lon: 2,
            total_cells: 4,
            coordinates_file: "coords.bin".to_string(),
        });
        sidecar.push(FileRecord::new("currents_2011_03.bin", &header, Some(&grid)));
        sidecar.parameters.insert("fill_value".to_string(), 0.0);
        sidecar.save(&path).unwrap();

        let loaded = Sidecar::load(&path).unwrap();
        assert_eq!(loaded, sidecar);

        let record = loaded.record_for("currents_2011_03.bin").unwrap();
        assert_eq!(record.date.as_deref(), Some("2011-03"));
        assert_eq!(record.lon_range, Some([109.0, 251.3]));
        assert!(loaded.binary_format.contains_key(&RecordKind::Currents));
    }
}
