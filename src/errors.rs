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

//! Error types returned by the crate.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Error while reading config.yaml: {0}")]
    Config(#[from] ConfigError),

    #[error("Error while handling grid file: {0}")]
    GridFile(#[from] GridFileError),

    #[error("Error in grid data: {0}")]
    Grid(#[from] GridError),

    #[error("Error while locating grid cell: {0}")]
    Locate(#[from] LocateError),

    #[error("Error while handling metadata: {0}")]
    Sidecar(#[from] SidecarError),

    #[error("Error while creating ThreadPool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Error while writing CSV output: {0}")]
    Csv(#[from] csv::Error),

    #[error("Error while handling output: {0}")]
    Io(#[from] std::io::Error),

    #[error("Output cannot be prepared: {0}")]
    FaultyOutput(&'static str),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot open config.yaml: {0}")]
    CantOpenFile(#[from] std::io::Error),

    #[error("Cannot deserialize config.yaml: {0}")]
    CantDeserialize(#[from] serde_yaml::Error),

    #[error("Configuration component is out of bounds {0}")]
    OutOfBounds(&'static str),
}

#[derive(Error, Debug)]
pub enum GridFileError {
    #[error("File {0} does not exist")]
    FileNotFound(PathBuf),

    #[error("File is truncated: header declares {expected} bytes but only {actual} are present")]
    TruncatedFile { expected: usize, actual: usize },

    #[error("Unsupported version tag {version} for {variant} file")]
    UnsupportedVersion { variant: &'static str, version: i32 },

    #[error("Array shape does not match the grid: {0}")]
    InvalidShape(String),

    #[error("Header fields are inconsistent: {0}")]
    InconsistentHeader(&'static str),

    #[error("Grid data error: {0}")]
    Grid(#[from] GridError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GridError {
    #[error("Arrays have different shapes: {0:?} and {1:?}")]
    ShapeMismatch((usize, usize), (usize, usize)),

    #[error("Axis {0} must have at least 2 points")]
    AxisTooShort(&'static str),

    #[error("Axis {0} is not strictly monotonic")]
    NotMonotonic(&'static str),

    #[error("Grid is curvilinear and has no regular axes")]
    NotSeparable,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocateError {
    #[error("Grid has no cells")]
    EmptyGrid,

    #[error("No grid cell has finite distance to the target")]
    NoFiniteCell,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchError {
    #[error("Searched value is out of array bounds")]
    OutOfBounds,

    #[error("Searched array is empty")]
    EmptyArray,
}

#[derive(Error, Debug)]
pub enum SidecarError {
    #[error("Cannot access metadata file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot (de)serialize metadata: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Metadata does not match file header: {0}")]
    HeaderMismatch(&'static str),
}
