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

//! Sub-module describing file headers of all grid file variants
//! and the body layout each header implies.

use super::blocks::read_i32s;
use crate::constants::{
    COMPONENT_VERSION, COORDINATES_VERSION, CURRENTS_DAILY_VERSION, CURRENTS_MONTHLY_VERSION,
    DAILY_F32_VERSION, DAILY_HALF_VERSION, ERROR_SCALE, HEADER_INT_SIZE,
};
use crate::errors::GridFileError;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Element type of body blocks.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// Little-endian `f32` per cell.
    None,

    /// Little-endian half-precision code per cell.
    Half,
}

impl Default for Compression {
    fn default() -> Self {
        Compression::None
    }
}

impl Compression {
    pub fn element_size(self) -> usize {
        match self {
            Compression::None => 4,
            Compression::Half => 2,
        }
    }
}

/// Date stored in the header, day is absent in monthly files.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct DateStamp {
    pub year: i32,
    pub month: i32,
    pub day: Option<i32>,
}

impl DateStamp {
    pub fn monthly(year: i32, month: i32) -> Self {
        DateStamp {
            year,
            month,
            day: None,
        }
    }

    /// Calendar date, first of the month for monthly stamps.
    /// `None` when the stamp is not a valid date.
    pub fn to_naive_date(self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(
            self.year,
            u32::try_from(self.month).ok()?,
            u32::try_from(self.day.unwrap_or(1)).ok()?,
        )
    }

    /// `YYYY-MM-DD` or `YYYY-MM` for monthly stamps.
    pub fn label(self) -> String {
        match self.day {
            Some(day) => format!("{:04}-{:02}-{:02}", self.year, self.month, day),
            None => format!("{:04}-{:02}", self.year, self.month),
        }
    }
}

impl From<NaiveDate> for DateStamp {
    fn from(date: NaiveDate) -> Self {
        DateStamp {
            year: date.year(),
            month: date.month() as i32,
            day: Some(date.day() as i32),
        }
    }
}

/// Body encoding of a daily field file.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum DailyEncoding {
    Float32,

    /// Half-precision codes with declared quantization
    /// error bound multiplied by 1000.
    Half { max_error_scaled: i32 },
}

impl DailyEncoding {
    pub fn compression(self) -> Compression {
        match self {
            DailyEncoding::Float32 => Compression::None,
            DailyEncoding::Half { .. } => Compression::Half,
        }
    }

    /// Declared quantization error in physical units.
    pub fn max_error(self) -> Option<f32> {
        match self {
            DailyEncoding::Float32 => None,
            DailyEncoding::Half { max_error_scaled } => Some(max_error_scaled as f32 / ERROR_SCALE),
        }
    }
}

/// Variant of a grid file a reader expects.
///
/// The leading version integer alone does not identify the variant
/// (several variants share tag values), so the caller names it.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum FileKind {
    Coordinates,

    /// Daily field on a grid of `shape`, which the header does not store.
    Daily { shape: (usize, usize) },

    /// Daily field from files whose version tag (always `1`) does not
    /// describe the body; the encoding is taken from the caller.
    LegacyDaily {
        shape: (usize, usize),
        compression: Compression,
    },

    Currents,
    Component,
}

impl FileKind {
    pub fn name(self) -> &'static str {
        match self {
            FileKind::Coordinates => "coordinates",
            FileKind::Daily { .. } | FileKind::LegacyDaily { .. } => "daily field",
            FileKind::Currents => "combined velocity",
            FileKind::Component => "single component",
        }
    }
}

/// Tagged union over all header layouts.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Header {
    /// `[1, n_lat, n_lon]`, body `lon, lat`.
    Coordinates { n_lat: usize, n_lon: usize },

    /// `[1, year, month, day]` with `f32` body or
    /// `[2, year, month, day, max_error_scaled]` with half-float body.
    Daily {
        shape: (usize, usize),
        date: DateStamp,
        encoding: DailyEncoding,
    },

    /// `[2, n_lat, n_lon, year, month]` or `[3, n_lat, n_lon, year, month, day]`,
    /// body `lon, lat, u, v`.
    Currents {
        n_lat: usize,
        n_lon: usize,
        date: DateStamp,
    },

    /// `[2, n_lat, n_lon, 1]`, body `lon, lat, field`.
    Component { n_lat: usize, n_lon: usize },
}

impl Header {
    pub fn version(&self) -> i32 {
        match self {
            Header::Coordinates { .. } => COORDINATES_VERSION,
            Header::Daily { encoding, .. } => match encoding {
                DailyEncoding::Float32 => DAILY_F32_VERSION,
                DailyEncoding::Half { .. } => DAILY_HALF_VERSION,
            },
            Header::Currents { date, .. } => match date.day {
                Some(_) => CURRENTS_DAILY_VERSION,
                None => CURRENTS_MONTHLY_VERSION,
            },
            Header::Component { .. } => COMPONENT_VERSION,
        }
    }

    /// Grid shape `(n_lat, n_lon)` of the body blocks.
    pub fn shape(&self) -> (usize, usize) {
        match *self {
            Header::Coordinates { n_lat, n_lon }
            | Header::Currents { n_lat, n_lon, .. }
            | Header::Component { n_lat, n_lon } => (n_lat, n_lon),
            Header::Daily { shape, .. } => shape,
        }
    }

    pub fn date(&self) -> Option<DateStamp> {
        match *self {
            Header::Daily { date, .. } | Header::Currents { date, .. } => Some(date),
            _ => None,
        }
    }

    /// Number of body blocks and their element type.
    pub fn body_layout(&self) -> (usize, Compression) {
        match self {
            Header::Coordinates { .. } => (2, Compression::None),
            Header::Daily { encoding, .. } => (1, encoding.compression()),
            Header::Currents { .. } => (4, Compression::None),
            Header::Component { .. } => (3, Compression::None),
        }
    }

    /// Header integers in file order.
    pub fn to_ints(&self) -> Result<Vec<i32>, GridFileError> {
        let (n_lat, n_lon) = self.shape();

        let ints = match self {
            Header::Coordinates { .. } => {
                vec![self.version(), dim_to_i32(n_lat)?, dim_to_i32(n_lon)?]
            }
            Header::Daily { date, encoding, .. } => {
                let day = date
                    .day
                    .ok_or(GridFileError::InconsistentHeader("daily file without day"))?;
                let mut ints = vec![self.version(), date.year, date.month, day];

                if let DailyEncoding::Half { max_error_scaled } = encoding {
                    ints.push(*max_error_scaled);
                }

                ints
            }
            Header::Currents { date, .. } => {
                let mut ints = vec![
                    self.version(),
                    dim_to_i32(n_lat)?,
                    dim_to_i32(n_lon)?,
                    date.year,
                    date.month,
                ];

                if let Some(day) = date.day {
                    ints.push(day);
                }

                ints
            }
            Header::Component { .. } => {
                vec![self.version(), dim_to_i32(n_lat)?, dim_to_i32(n_lon)?, 1]
            }
        };

        Ok(ints)
    }

    /// Total header size in bytes.
    pub fn byte_len(&self) -> Result<usize, GridFileError> {
        Ok(self.to_ints()?.len() * HEADER_INT_SIZE)
    }

    /// Parses the header of the requested variant from the file start,
    /// branching on the leading version integer.
    pub fn parse(kind: FileKind, bytes: &[u8]) -> Result<Header, GridFileError> {
        let version = read_i32s(bytes, 0, 1)?[0];

        let unsupported = || GridFileError::UnsupportedVersion {
            variant: kind.name(),
            version,
        };

        match kind {
            FileKind::Coordinates => {
                if version != COORDINATES_VERSION {
                    return Err(unsupported());
                }

                let ints = read_i32s(bytes, 0, 3)?;

                Ok(Header::Coordinates {
                    n_lat: dim_from_i32(ints[1])?,
                    n_lon: dim_from_i32(ints[2])?,
                })
            }
            FileKind::Daily { shape } => {
                let encoding = match version {
                    DAILY_F32_VERSION => DailyEncoding::Float32,
                    DAILY_HALF_VERSION => DailyEncoding::Half {
                        max_error_scaled: read_i32s(bytes, 0, 5)?[4],
                    },
                    _ => return Err(unsupported()),
                };

                Ok(Header::Daily {
                    shape,
                    date: read_day_stamp(bytes)?,
                    encoding,
                })
            }
            FileKind::LegacyDaily { shape, compression } => {
                if version != DAILY_F32_VERSION {
                    return Err(unsupported());
                }

                let encoding = match compression {
                    Compression::None => DailyEncoding::Float32,
                    Compression::Half => DailyEncoding::Half {
                        max_error_scaled: read_i32s(bytes, 0, 5)?[4],
                    },
                };

                Ok(Header::Daily {
                    shape,
                    date: read_day_stamp(bytes)?,
                    encoding,
                })
            }
            FileKind::Currents => {
                let ints = match version {
                    CURRENTS_MONTHLY_VERSION => read_i32s(bytes, 0, 5)?,
                    CURRENTS_DAILY_VERSION => read_i32s(bytes, 0, 6)?,
                    _ => return Err(unsupported()),
                };

                Ok(Header::Currents {
                    n_lat: dim_from_i32(ints[1])?,
                    n_lon: dim_from_i32(ints[2])?,
                    date: DateStamp {
                        year: ints[3],
                        month: ints[4],
                        day: ints.get(5).copied(),
                    },
                })
            }
            FileKind::Component => {
                if version != COMPONENT_VERSION {
                    return Err(unsupported());
                }

                let ints = read_i32s(bytes, 0, 4)?;

                if ints[3] != 1 {
                    return Err(GridFileError::InconsistentHeader(
                        "single component file must declare exactly one field",
                    ));
                }

                Ok(Header::Component {
                    n_lat: dim_from_i32(ints[1])?,
                    n_lon: dim_from_i32(ints[2])?,
                })
            }
        }
    }
}

fn read_day_stamp(bytes: &[u8]) -> Result<DateStamp, GridFileError> {
    let ints = read_i32s(bytes, 0, 4)?;

    Ok(DateStamp {
        year: ints[1],
        month: ints[2],
        day: Some(ints[3]),
    })
}

fn dim_from_i32(dim: i32) -> Result<usize, GridFileError> {
    usize::try_from(dim)
        .map_err(|_| GridFileError::InvalidShape(format!("negative grid dimension {}", dim)))
}

fn dim_to_i32(dim: usize) -> Result<i32, GridFileError> {
    i32::try_from(dim)
        .map_err(|_| GridFileError::InvalidShape(format!("grid dimension {} too large", dim)))
}
