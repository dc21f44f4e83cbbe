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

//! Module with the coordinate grid and field data model,
//! and with operations answering questions about grids:
//! which cell is closest to a point ([`locator`]) and what
//! a field looks like on another grid ([`resampler`]).
//!
//! All arrays are `n_lat × n_lon` with row-major index order,
//! the first (slower-varying) index being the latitude axis.
//! Grids may be regular or curvilinear (e.g. tripole ocean grids),
//! so no closed-form relation between index and coordinate is assumed.

mod bisection;
pub mod locator;
pub mod resampler;

use crate::errors::GridError;
use ndarray::{s, Array2};
use serde::Deserialize;
use std::ops::Range;

pub use self::locator::{locate, Located, LocatorParams};
pub use self::resampler::{resample, RegularAxes, ResamplePolicy};

/// Physical quantity sampled on a grid (velocity component in m/s,
/// diffusivity in m²/s). Land and no-data cells hold NaN.
pub type Field = Array2<f32>;

/// Pair of same-shaped longitude and latitude arrays.
///
/// Coordinates are immutable once the grid is constructed.
#[derive(Clone, PartialEq, Debug)]
pub struct Grid {
    lon: Array2<f32>,
    lat: Array2<f32>,
}

impl Grid {
    /// Creates a grid from node coordinates, checking
    /// that both arrays have the same shape.
    pub fn new(lon: Array2<f32>, lat: Array2<f32>) -> Result<Self, GridError> {
        if lon.dim() != lat.dim() {
            return Err(GridError::ShapeMismatch(lon.dim(), lat.dim()));
        }

        Ok(Grid { lon, lat })
    }

    /// Creates a regular grid from 1D axes,
    /// repeating longitudes along rows and latitudes along columns.
    pub fn from_axes(lons: &[f32], lats: &[f32]) -> Self {
        let shape = (lats.len(), lons.len());

        let lon = Array2::from_shape_fn(shape, |(_, j)| lons[j]);
        let lat = Array2::from_shape_fn(shape, |(i, _)| lats[i]);

        Grid { lon, lat }
    }

    pub fn lon(&self) -> &Array2<f32> {
        &self.lon
    }

    pub fn lat(&self) -> &Array2<f32> {
        &self.lat
    }

    /// Grid shape as `(n_lat, n_lon)`.
    pub fn shape(&self) -> (usize, usize) {
        self.lon.dim()
    }

    pub fn len(&self) -> usize {
        self.lon.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lon.is_empty()
    }

    pub fn into_parts(self) -> (Array2<f32>, Array2<f32>) {
        (self.lon, self.lat)
    }

    /// Checks that the field can be paired with this grid.
    pub fn check_field(&self, field: &Field) -> Result<(), GridError> {
        if field.dim() != self.shape() {
            return Err(GridError::ShapeMismatch(self.shape(), field.dim()));
        }

        Ok(())
    }

    /// Longitude and latitude ranges, ignoring NaN nodes.
    pub fn ranges(&self) -> CoordRanges {
        CoordRanges {
            lon: nan_min_max(self.lon.iter()),
            lat: nan_min_max(self.lat.iter()),
        }
    }

    /// Extracts 1D axes of a separable grid, where longitude
    /// varies only along columns and latitude only along rows.
    pub fn regular_axes(&self) -> Result<RegularAxes, GridError> {
        if self.is_empty() {
            return Err(GridError::AxisTooShort("lon"));
        }

        let lons = self.lon.row(0).to_vec();
        let lats = self.lat.column(0).to_vec();

        let lon_separable = self
            .lon
            .rows()
            .into_iter()
            .all(|row| row.iter().zip(&lons).all(|(a, b)| a == b));

        let lat_separable = self
            .lat
            .columns()
            .into_iter()
            .all(|col| col.iter().zip(&lats).all(|(a, b)| a == b));

        if !lon_separable || !lat_separable {
            return Err(GridError::NotSeparable);
        }

        RegularAxes::new(lons, lats)
    }

    /// Finds the smallest index window that contains
    /// all nodes lying inside the region.
    ///
    /// Returns `None` when no node is inside.
    pub fn crop(&self, region: &Region) -> Option<Window> {
        let mut rows: Option<(usize, usize)> = None;
        let mut cols: Option<(usize, usize)> = None;

        for ((i, j), &lon) in self.lon.indexed_iter() {
            if !region.contains(lon, self.lat[[i, j]]) {
                continue;
            }

            rows = Some(rows.map_or((i, i), |(lo, hi)| (lo.min(i), hi.max(i))));
            cols = Some(cols.map_or((j, j), |(lo, hi)| (lo.min(j), hi.max(j))));
        }

        let (rows, cols) = (rows?, cols?);

        Some(Window {
            rows: rows.0..rows.1 + 1,
            cols: cols.0..cols.1 + 1,
        })
    }
}

/// Coordinate extent of a grid, `None` when all values are NaN.
#[derive(Copy, Clone, PartialEq, Debug, Default)]
pub struct CoordRanges {
    pub lon: Option<(f32, f32)>,
    pub lat: Option<(f32, f32)>,
}

/// Geographic box in degrees, edges inclusive.
#[derive(Copy, Clone, PartialEq, PartialOrd, Debug, Deserialize)]
pub struct Region {
    pub west: f32,
    pub east: f32,
    pub south: f32,
    pub north: f32,
}

impl Region {
    pub fn contains(&self, lon: f32, lat: f32) -> bool {
        (self.west..=self.east).contains(&lon) && (self.south..=self.north).contains(&lat)
    }
}

/// Rectangular index window of a grid.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Window {
    pub rows: Range<usize>,
    pub cols: Range<usize>,
}

impl Window {
    /// Cuts the window out of any array shaped like the grid.
    pub fn apply(&self, array: &Array2<f32>) -> Array2<f32> {
        array
            .slice(s![self.rows.clone(), self.cols.clone()])
            .to_owned()
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.cols.len())
    }
}

/// Summary of valid (non-NaN) values in a field.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct FieldStats {
    pub total_cells: usize,
    pub valid_cells: usize,
    pub min: Option<f32>,
    pub max: Option<f32>,
    pub mean: Option<f64>,
}

impl FieldStats {
    pub fn new(field: &Field) -> Self {
        let mut valid_cells = 0;
        let mut sum = 0.0;

        for value in field.iter().filter(|v| !v.is_nan()) {
            valid_cells += 1;
            sum += f64::from(*value);
        }

        let min_max = nan_min_max(field.iter());

        FieldStats {
            total_cells: field.len(),
            valid_cells,
            min: min_max.map(|m| m.0),
            max: min_max.map(|m| m.1),
            mean: if valid_cells > 0 {
                Some(sum / valid_cells as f64)
            } else {
                None
            },
        }
    }

    /// Share of valid cells in percent.
    pub fn valid_percent(&self) -> f64 {
        if self.total_cells == 0 {
            return 0.0;
        }

        100.0 * self.valid_cells as f64 / self.total_cells as f64
    }
}

fn nan_min_max<'a>(values: impl Iterator<Item = &'a f32>) -> Option<(f32, f32)> {
    values
        .filter(|v| !v.is_nan())
        .fold(None, |acc, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

#[cfg(test)]
mod tests {
    use super::{FieldStats, Grid, Region, Window};
    use crate::errors::GridError;
    use ndarray::{array, Array2};

    #[test]
    fn shape_check() {
        let lon = Array2::<f32>::zeros((2, 3));
        let lat = Array2::<f32>::zeros((3, 2));

        assert_eq!(
            Grid::new(lon, lat),
            Err(GridError::ShapeMismatch((2, 3), (3, 2)))
        );
    }

    #[test]
    fn axes_roundtrip() {
        let grid = Grid::from_axes(&[120.0, 121.0, 122.0], &[15.0, 16.0]);

        assert_eq!(grid.shape(), (2, 3));
        assert_eq!(grid.lon()[[1, 2]], 122.0);
        assert_eq!(grid.lat()[[1, 2]], 16.0);

        let axes = grid.regular_axes().unwrap();
        assert_eq!(axes.lons(), &[120.0, 121.0, 122.0]);
        assert_eq!(axes.lats(), &[15.0, 16.0]);
    }

    #[test]
    fn axes_fill_every_node() {
        let grid = Grid::from_axes(&[1.0, 2.0, 3.0], &[-1.0, -2.0]);

        assert_eq!(grid.lon(), &array![[1.0, 2.0, 3.0], [1.0, 2.0, 3.0]]);
        assert_eq!(grid.lat(), &array![[-1.0, -1.0, -1.0], [-2.0, -2.0, -2.0]]);

        let empty = Grid::from_axes(&[], &[5.0]);
        assert_eq!(empty.shape(), (1, 0));
        assert!(empty.is_empty());
    }

    #[test]
    fn curvilinear_has_no_axes() {
        let lon = array![[0.0, 1.0], [0.1, 1.1]];
        let lat = array![[0.0, 0.0], [1.0, 1.0]];
        let grid = Grid::new(lon, lat).unwrap();

        assert_eq!(grid.regular_axes(), Err(GridError::NotSeparable));
    }

    #[test]
    fn ranges_skip_nan() {
        let lon = array![[f32::NAN, 110.0], [250.0, 130.0]];
        let lat = array![[0.0, f32::NAN], [72.5, 10.0]];
        let grid = Grid::new(lon, lat).unwrap();

        let ranges = grid.ranges();
        assert_eq!(ranges.lon, Some((110.0, 250.0)));
        assert_eq!(ranges.lat, Some((0.0, 72.5)));
    }

    #[test]
    fn crop_window() {
        let grid = Grid::from_axes(&[0.0, 1.0, 2.0, 3.0], &[10.0, 11.0, 12.0]);
        let region = Region {
            west: 0.5,
            east: 2.0,
            south: 11.0,
            north: 20.0,
        };

        let window = grid.crop(&region).unwrap();
        assert_eq!(
            window,
            Window {
                rows: 1..3,
                cols: 1..3
            }
        );

        let cropped = window.apply(grid.lon());
        assert_eq!(cropped, array![[1.0, 2.0], [1.0, 2.0]]);

        let outside = Region {
            west: 50.0,
            east: 60.0,
            south: 0.0,
            north: 1.0,
        };
        assert!(grid.crop(&outside).is_none());
    }

    #[test]
    fn stats() {
        let field = array![[1.0, f32::NAN], [3.0, 2.0]];
        let stats = FieldStats::new(&field);

        assert_eq!(stats.valid_cells, 3);
        assert_eq!(stats.min, Some(1.0));
        assert_eq!(stats.max, Some(3.0));
        assert_eq!(stats.mean, Some(2.0));
        assert!((stats.valid_percent() - 75.0).abs() < 1e-9);
    }
}
