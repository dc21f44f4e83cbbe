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

//! Module responsible for reading and writing grid files.
//!
//! A grid file is a fixed-size header of little-endian `i32` values
//! immediately followed by body blocks of exactly `n_lat * n_lon`
//! elements each, without padding:
//!
//! | Variant | Header ints | Body (in order) |
//! |---|---|---|
//! | Coordinates | `1, n_lat, n_lon` | `lon, lat` (`f32`) |
//! | Daily field | `1, year, month, day` | `field` (`f32`) |
//! | Daily field | `2, year, month, day, max_error_scaled` | `field` (half-float) |
//! | Currents v2 | `2, n_lat, n_lon, year, month` | `lon, lat, u, v` (`f32`) |
//! | Currents v3 | `3, n_lat, n_lon, year, month, day` | `lon, lat, u, v` (`f32`) |
//! | Component | `2, n_lat, n_lon, 1` | `lon, lat, field` (`f32`) |
//!
//! Files are always read whole, because consumers need complete grids
//! in memory. Writers check every array shape before touching the disk
//! and write through a temporary file renamed into place, so an
//! interrupted write never leaves a file that looks valid.

mod blocks;
pub mod header;

pub use self::header::{Compression, DailyEncoding, DateStamp, FileKind, Header};

use self::blocks::{read_f32_block, read_u16_block, write_f32_block, write_i32s, write_u16_block};
use crate::constants::ERROR_SCALE;
use crate::errors::GridFileError;
use crate::grid::{Field, Grid};
use crate::halffloat;
use log::{debug, warn};
use ndarray::Array2;
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Any grid file decoded to full precision:
/// the header and its body blocks in file order.
#[derive(Clone, PartialEq, Debug)]
pub struct GridFile {
    pub header: Header,
    pub blocks: Vec<Field>,
}

/// Daily field file content.
#[derive(Clone, PartialEq, Debug)]
pub struct DailyField {
    pub date: DateStamp,
    pub encoding: DailyEncoding,
    pub values: Field,
}

/// Combined velocity file content.
#[derive(Clone, PartialEq, Debug)]
pub struct Currents {
    pub date: DateStamp,
    pub grid: Grid,
    pub u: Field,
    pub v: Field,
}

/// Single component file content.
#[derive(Clone, PartialEq, Debug)]
pub struct Component {
    pub grid: Grid,
    pub values: Field,
}

/// Reads the whole file and decodes it as the requested variant.
pub fn read(path: &Path, kind: FileKind) -> Result<GridFile, GridFileError> {
    debug!("Reading {} file {}", kind.name(), path.display());

    let bytes = fs::read(path).map_err(|err| match err.kind() {
        ErrorKind::NotFound => GridFileError::FileNotFound(path.to_path_buf()),
        _ => GridFileError::Io(err),
    })?;

    decode(&bytes, kind)
}

/// Decodes file bytes as the requested variant.
///
/// The declared body size is checked against the available bytes
/// before any block is interpreted.
pub fn decode(bytes: &[u8], kind: FileKind) -> Result<GridFile, GridFileError> {
    let header = Header::parse(kind, bytes)?;

    let (n_lat, n_lon) = header.shape();
    let (block_count, compression) = header.body_layout();
    let header_len = header.byte_len()?;

    let cells = n_lat.checked_mul(n_lon).ok_or_else(|| {
        GridFileError::InvalidShape(format!("{}×{} grid is too large", n_lat, n_lon))
    })?;

    let block_len = cells
        .checked_mul(compression.element_size())
        .ok_or_else(|| GridFileError::InvalidShape("block size overflows".to_string()))?;

    let expected = block_len
        .checked_mul(block_count)
        .and_then(|body| body.checked_add(header_len))
        .ok_or_else(|| GridFileError::InvalidShape("body size overflows".to_string()))?;

    if bytes.len() < expected {
        return Err(GridFileError::TruncatedFile {
            expected,
            actual: bytes.len(),
        });
    }

    if bytes.len() > expected {
        warn!(
            "Ignoring {} bytes after the declared {} file body",
            bytes.len() - expected,
            kind.name()
        );
    }

    let mut blocks = Vec::with_capacity(block_count);

    for k in 0..block_count {
        let offset = header_len + k * block_len;

        let values = match compression {
            Compression::None => read_f32_block(bytes, offset, cells)?,
            Compression::Half => halffloat::decode_slice(&read_u16_block(bytes, offset, cells)?),
        };

        let block = Array2::from_shape_vec((n_lat, n_lon), values)
            .map_err(|err| GridFileError::InvalidShape(err.to_string()))?;

        blocks.push(block);
    }

    Ok(GridFile { header, blocks })
}

/// Writes any grid file.
pub fn write(path: &Path, file: &GridFile) -> Result<(), GridFileError> {
    let blocks: Vec<&Field> = file.blocks.iter().collect();

    write_parts(path, &file.header, &blocks)
}

pub fn read_coordinates(path: &Path) -> Result<Grid, GridFileError> {
    let file = read(path, FileKind::Coordinates)?;
    let [lon, lat] = into_blocks(file.blocks)?;

    Ok(Grid::new(lon, lat)?)
}

pub fn write_coordinates(path: &Path, grid: &Grid) -> Result<Header, GridFileError> {
    let (n_lat, n_lon) = grid.shape();
    let header = Header::Coordinates { n_lat, n_lon };

    write_parts(path, &header, &[grid.lon(), grid.lat()])?;

    Ok(header)
}

/// Reads a daily field file whose version tag describes the body.
/// The grid shape comes from the companion coordinates file.
pub fn read_daily(path: &Path, shape: (usize, usize)) -> Result<DailyField, GridFileError> {
    daily_from_file(read(path, FileKind::Daily { shape })?)
}

/// Reads a daily field file written with version tag `1` regardless
/// of body encoding, which the caller must know.
pub fn read_daily_legacy(
    path: &Path,
    shape: (usize, usize),
    compression: Compression,
) -> Result<DailyField, GridFileError> {
    daily_from_file(read(path, FileKind::LegacyDaily { shape, compression })?)
}

fn daily_from_file(file: GridFile) -> Result<DailyField, GridFileError> {
    let (date, encoding) = match file.header {
        Header::Daily { date, encoding, .. } => (date, encoding),
        _ => return Err(GridFileError::InconsistentHeader("expected daily header")),
    };

    let [values] = into_blocks(file.blocks)?;

    Ok(DailyField {
        date,
        encoding,
        values,
    })
}

/// Writes a daily field file, returning the written header.
///
/// With half-float compression the declared error bound is the
/// largest quantization error over finite cells, rounded up to
/// the next thousandth.
pub fn write_daily(
    path: &Path,
    date: DateStamp,
    values: &Field,
    compression: Compression,
) -> Result<Header, GridFileError> {
    if date.day.is_none() {
        return Err(GridFileError::InconsistentHeader("daily file without day"));
    }

    let (encoding, codes) = match compression {
        Compression::None => (DailyEncoding::Float32, None),
        Compression::Half => {
            let flat: Vec<f32> = values.iter().copied().collect();
            let codes = halffloat::encode_slice(&flat);
            let max_error = halffloat::quantization_error(&flat, &codes);

            // `as` saturates for infinite errors
            let encoding = DailyEncoding::Half {
                max_error_scaled: (max_error * ERROR_SCALE).ceil() as i32,
            };

            (encoding, Some(codes))
        }
    };

    let header = Header::Daily {
        shape: values.dim(),
        date,
        encoding,
    };

    write_encoded(path, &header, &[values], codes.as_deref())?;

    Ok(header)
}

pub fn read_currents(path: &Path) -> Result<Currents, GridFileError> {
    let file = read(path, FileKind::Currents)?;

    let date = file
        .header
        .date()
        .ok_or(GridFileError::InconsistentHeader("expected currents header"))?;
    let [lon, lat, u, v] = into_blocks(file.blocks)?;

    Ok(Currents {
        date,
        grid: Grid::new(lon, lat)?,
        u,
        v,
    })
}

/// Writes a combined velocity file, version 3 when
/// the date has a day and version 2 otherwise.
pub fn write_currents(path: &Path, currents: &Currents) -> Result<Header, GridFileError> {
    let (n_lat, n_lon) = currents.grid.shape();
    let header = Header::Currents {
        n_lat,
        n_lon,
        date: currents.date,
    };

    write_parts(
        path,
        &header,
        &[
            currents.grid.lon(),
            currents.grid.lat(),
            &currents.u,
            &currents.v,
        ],
    )?;

    Ok(header)
}

pub fn read_component(path: &Path) -> Result<Component, GridFileError> {
    let file = read(path, FileKind::Component)?;
    let [lon, lat, values] = into_blocks(file.blocks)?;

    Ok(Component {
        grid: Grid::new(lon, lat)?,
        values,
    })
}

pub fn write_component(path: &Path, component: &Component) -> Result<Header, GridFileError> {
    let (n_lat, n_lon) = component.grid.shape();
    let header = Header::Component { n_lat, n_lon };

    write_parts(
        path,
        &header,
        &[
            component.grid.lon(),
            component.grid.lat(),
            &component.values,
        ],
    )?;

    Ok(header)
}

fn into_blocks<const N: usize>(blocks: Vec<Field>) -> Result<[Field; N], GridFileError> {
    blocks
        .try_into()
        .map_err(|blocks: Vec<Field>| {
            GridFileError::InvalidShape(format!("expected {} blocks, got {}", N, blocks.len()))
        })
}

/// Checks that blocks match the header layout.
fn validate(header: &Header, blocks: &[&Field]) -> Result<(), GridFileError> {
    let (block_count, _) = header.body_layout();

    if blocks.len() != block_count {
        return Err(GridFileError::InvalidShape(format!(
            "{} blocks given but the header requires {}",
            blocks.len(),
            block_count
        )));
    }

    for (k, block) in blocks.iter().enumerate() {
        if block.dim() != header.shape() {
            return Err(GridFileError::InvalidShape(format!(
                "block {} is {:?} but the grid is {:?}",
                k,
                block.dim(),
                header.shape()
            )));
        }
    }

    Ok(())
}

fn write_parts(path: &Path, header: &Header, blocks: &[&Field]) -> Result<(), GridFileError> {
    validate(header, blocks)?;

    let codes: Option<Vec<u16>> = match header.body_layout().1 {
        Compression::None => None,
        Compression::Half => Some(
            blocks
                .iter()
                .flat_map(|block| block.iter().map(|&v| halffloat::encode(v)))
                .collect(),
        ),
    };

    write_encoded(path, header, blocks, codes.as_deref())
}

/// Writes the file through a temporary sibling. With `codes` given,
/// the body is the half-float codes of all blocks in block order.
fn write_encoded(
    path: &Path,
    header: &Header,
    blocks: &[&Field],
    codes: Option<&[u16]>,
) -> Result<(), GridFileError> {
    let header_ints = header.to_ints()?;
    validate(header, blocks)?;

    let cells: usize = blocks.iter().map(|block| block.len()).sum();
    let compression = header.body_layout().1;

    match (compression, codes) {
        (Compression::None, None) => {}
        (Compression::Half, Some(codes)) if codes.len() == cells => {}
        _ => {
            return Err(GridFileError::InconsistentHeader(
                "body encoding does not match the header",
            ))
        }
    }

    debug!("Writing {:?} file {}", header, path.display());

    let partial = partial_path(path);

    let written = write_body(&partial, &header_ints, blocks, codes)
        .and_then(|_| fs::rename(&partial, path));

    if let Err(err) = written {
        // leftover is not interpretable by readers, removal is best-effort
        let _ = fs::remove_file(&partial);
        return Err(err.into());
    }

    Ok(())
}

fn write_body(
    path: &Path,
    header_ints: &[i32],
    blocks: &[&Field],
    codes: Option<&[u16]>,
) -> std::io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);

    write_i32s(&mut writer, header_ints)?;

    match codes {
        Some(codes) => write_u16_block(&mut writer, codes)?,
        None => {
            for block in blocks {
                write_f32_block(&mut writer, block.iter())?;
            }
        }
    }

    writer.flush()?;
    writer.into_inner().map_err(|err| err.into_error())?.sync_all()
}

/// Hidden sibling of the target path used during writing.
fn partial_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    path.with_file_name(format!(".{}.partial", name))
}

#[cfg(test)]
mod tests {
    use super::{
        decode, read_component, read_coordinates, read_currents, read_daily, read_daily_legacy,
        write_component, write_coordinates, write_currents, write_daily, Component, Compression,
        Currents, DailyEncoding, DateStamp, FileKind,
    };
    use crate::errors::GridFileError;
    use crate::grid::Grid;
    use crate::halffloat;
    use ndarray::{array, Array2};
    use std::fs;

    fn sample_grid() -> Grid {
        Grid::new(
            array![[120.0, 120.5, 121.0], [120.1, 120.6, 121.1]],
            array![[15.0, 15.1, 15.2], [15.5, 15.6, 15.7]],
        )
        .unwrap()
    }

    #[test]
    fn coordinates_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eke_coords.bin");
        let grid = sample_grid();

        write_coordinates(&path, &grid).unwrap();

        assert_eq!(fs::metadata(&path).unwrap().len(), 12 + 2 * 6 * 4);
        assert_eq!(read_coordinates(&path).unwrap(), grid);
    }

    #[test]
    fn currents_daily_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("currents_2011_03_11.bin");

        let currents = Currents {
            date: DateStamp {
                year: 2011,
                month: 3,
                day: Some(11),
            },
            grid: sample_grid(),
            u: array![[0.1, f32::NAN, -0.3], [0.0, 1.5, 2.0]],
            v: Array2::from_elem((2, 3), -0.25),
        };

        let header = write_currents(&path, &currents).unwrap();
        assert_eq!(header.version(), 3);

        let read_back = read_currents(&path).unwrap();
        assert_eq!(read_back.date, currents.date);
        assert_eq!(read_back.grid, currents.grid);
        assert!(read_back.u[[0, 1]].is_nan());
        assert_eq!(read_back.u[[1, 2]], 2.0);
        assert_eq!(read_back.v, currents.v);
    }

    #[test]
    fn daily_half_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eke_20110311.bin");
        let values = array![[0.0, 1500.25, f32::NAN], [2999.9, 0.001, 12.5]];

        let header = write_daily(
            &path,
            DateStamp {
                year: 2011,
                month: 3,
                day: Some(11),
            },
            &values,
            Compression::Half,
        )
        .unwrap();

        // header 5 ints + 6 codes
        assert_eq!(fs::metadata(&path).unwrap().len(), 20 + 12);

        let daily = read_daily(&path, (2, 3)).unwrap();
        assert_eq!(daily.date.day, Some(11));
        assert_eq!(header.version(), 2);

        let max_error = daily.encoding.max_error().unwrap();
        assert!(max_error > 0.0 && max_error <= 1.0);

        for (read, original) in daily.values.iter().zip(values.iter()) {
            if original.is_nan() {
                assert!(read.is_nan());
            } else {
                assert!((read - original).abs() <= max_error);
            }
        }
    }

    #[test]
    fn daily_float_and_legacy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eke_20110601.bin");
        let values = array![[1.0, 2.0], [3.0, 4.0]];
        let date = DateStamp {
            year: 2011,
            month: 6,
            day: Some(1),
        };

        write_daily(&path, date, &values, Compression::None).unwrap();

        let daily = read_daily(&path, (2, 2)).unwrap();
        assert_eq!(daily.encoding, DailyEncoding::Float32);
        assert_eq!(daily.values, values);

        let legacy = read_daily_legacy(&path, (2, 2), Compression::None).unwrap();
        assert_eq!(legacy, daily);

        // a half-float file written by old tools carries tag 1 and 5 ints
        let mut old_bytes = vec![];
        for v in [1i32, 2011, 6, 1, 500] {
            old_bytes.extend_from_slice(&v.to_le_bytes());
        }
        for code in [0x3C00u16, 0x4000, 0x4200, 0x4400] {
            old_bytes.extend_from_slice(&code.to_le_bytes());
        }
        let old_path = dir.path().join("eke_old.bin");
        fs::write(&old_path, old_bytes).unwrap();

        let legacy = read_daily_legacy(&old_path, (2, 2), Compression::Half).unwrap();
        assert_eq!(legacy.values, values);
        assert_eq!(legacy.encoding.max_error(), Some(0.5));
    }

    #[test]
    fn component_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("currents_u_2011_03.bin");
        let component = Component {
            grid: sample_grid(),
            values: Array2::from_elem((2, 3), 0.5),
        };

        write_component(&path, &component).unwrap();
        assert_eq!(read_component(&path).unwrap(), component);
    }

    #[test]
    fn invalid_shape_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("currents.bin");

        let currents = Currents {
            date: DateStamp::monthly(2011, 3),
            grid: sample_grid(),
            u: Array2::zeros((2, 3)),
            v: Array2::zeros((3, 2)),
        };

        let err = write_currents(&path, &currents).unwrap_err();
        assert!(matches!(err, GridFileError::InvalidShape(_)));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn failed_write_leaves_no_partial() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target_dir");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("keep.bin"), [0u8]).unwrap();

        let err = write_coordinates(&target, &sample_grid()).unwrap_err();
        assert!(matches!(err, GridFileError::Io(_)));

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["target_dir".to_string()]);
        assert!(target.join("keep.bin").is_file());
    }

    #[test]
    fn half_body_holds_encoded_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eke_20110311.bin");
        let values = array![[0.1, 1234.5, f32::NAN], [-2.0, 65504.0, 1.0e-7]];

        write_daily(
            &path,
            DateStamp {
                year: 2011,
                month: 3,
                day: Some(11),
            },
            &values,
            Compression::Half,
        )
        .unwrap();

        let bytes = fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 5 * 4 + 6 * 2);

        let body: Vec<u16> = bytes[20..]
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        let expected: Vec<u16> = values.iter().map(|&v| halffloat::encode(v)).collect();
        assert_eq!(body, expected);
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.bin");

        assert!(matches!(
            read_coordinates(&path),
            Err(GridFileError::FileNotFound(p)) if p == path
        ));
    }

    #[test]
    fn unsupported_version() {
        let mut bytes = vec![];
        for v in [4i32, 1, 1] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes.extend_from_slice(&[0u8; 8]);

        assert!(matches!(
            decode(&bytes, FileKind::Coordinates),
            Err(GridFileError::UnsupportedVersion { version: 4, .. })
        ));
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let mut bytes = vec![];
        for v in [1i32, 1, 1] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes.extend_from_slice(&2.5f32.to_le_bytes());
        bytes.extend_from_slice(&(-1.0f32).to_le_bytes());
        bytes.extend_from_slice(&[0xAB; 3]);

        let file = decode(&bytes, FileKind::Coordinates).unwrap();
        assert_eq!(file.blocks[0][[0, 0]], 2.5);
        assert_eq!(file.blocks[1][[0, 0]], -1.0);
    }
}
