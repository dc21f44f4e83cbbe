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

//! Sub-module with little-endian reading and writing
//! of header integers and body blocks.
//!
//! All values are converted explicitly with `to_le_bytes`/`from_le_bytes`
//! so the layout does not depend on host endianness.

use crate::constants::HEADER_INT_SIZE;
use crate::errors::GridFileError;
use std::io::{self, Write};

fn checked_slice(
    bytes: &[u8],
    offset: usize,
    count: usize,
    size: usize,
) -> Result<&[u8], GridFileError> {
    let end = count
        .checked_mul(size)
        .and_then(|len| len.checked_add(offset))
        .ok_or_else(|| GridFileError::InvalidShape("block size overflows".to_string()))?;

    bytes.get(offset..end).ok_or(GridFileError::TruncatedFile {
        expected: end,
        actual: bytes.len(),
    })
}

/// Reads `count` header integers starting at `offset`.
pub fn read_i32s(bytes: &[u8], offset: usize, count: usize) -> Result<Vec<i32>, GridFileError> {
    let slice = checked_slice(bytes, offset, count, HEADER_INT_SIZE)?;

    Ok(slice
        .chunks_exact(4)
        .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Reads a block of `count` `f32` values starting at `offset`.
pub fn read_f32_block(bytes: &[u8], offset: usize, count: usize) -> Result<Vec<f32>, GridFileError> {
    let slice = checked_slice(bytes, offset, count, 4)?;

    Ok(slice
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Reads a block of `count` half-precision codes starting at `offset`.
pub fn read_u16_block(bytes: &[u8], offset: usize, count: usize) -> Result<Vec<u16>, GridFileError> {
    let slice = checked_slice(bytes, offset, count, 2)?;

    Ok(slice
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect())
}

pub fn write_i32s<W: Write>(writer: &mut W, values: &[i32]) -> io::Result<()> {
    for value in values {
        writer.write_all(&value.to_le_bytes())?;
    }

    Ok(())
}

pub fn write_f32_block<'a, W: Write>(
    writer: &mut W,
    values: impl Iterator<Item = &'a f32>,
) -> io::Result<()> {
    for value in values {
        writer.write_all(&value.to_le_bytes())?;
    }

    Ok(())
}

pub fn write_u16_block<W: Write>(writer: &mut W, codes: &[u16]) -> io::Result<()> {
    for code in codes {
        writer.write_all(&code.to_le_bytes())?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{read_f32_block, read_u16_block, write_f32_block, write_i32s, write_u16_block};
    use crate::errors::GridFileError;

    #[test]
    fn little_endian_layout() {
        let mut buffer = vec![];

        write_i32s(&mut buffer, &[1, -2]).unwrap();
        write_f32_block(&mut buffer, [1.0f32].iter()).unwrap();
        write_u16_block(&mut buffer, &[0x3C00]).unwrap();

        assert_eq!(
            buffer,
            vec![1, 0, 0, 0, 0xFE, 0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x80, 0x3F, 0x00, 0x3C]
        );

        assert_eq!(read_f32_block(&buffer, 8, 1).unwrap(), vec![1.0]);
        assert_eq!(read_u16_block(&buffer, 12, 1).unwrap(), vec![0x3C00]);
    }

    #[test]
    fn short_block_is_truncated() {
        let buffer = vec![0u8; 10];

        let err = read_f32_block(&buffer, 4, 2).unwrap_err();
        assert!(matches!(
            err,
            GridFileError::TruncatedFile {
                expected: 12,
                actual: 10
            }
        ));
    }
}
