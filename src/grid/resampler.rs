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

//! Module converting a field sampled on a regular grid
//! onto an arbitrary (possibly curvilinear) target grid
//! with bilinear interpolation.

use super::{bisection, Field, Grid};
use crate::constants::DEFAULT_FILL_VALUE;
use crate::errors::{ConfigError, GridError};
use log::debug;
use ndarray::{Array2, Zip};
use serde::Deserialize;

/// 1D coordinate axes of a separable source grid.
#[derive(Clone, PartialEq, Debug)]
pub struct RegularAxes {
    lons: Vec<f32>,
    lats: Vec<f32>,
}

impl RegularAxes {
    /// Creates axes checking that each has at least two
    /// points and is strictly ascending or strictly descending.
    pub fn new(lons: Vec<f32>, lats: Vec<f32>) -> Result<Self, GridError> {
        check_axis(&lons, "lon")?;
        check_axis(&lats, "lat")?;

        Ok(RegularAxes { lons, lats })
    }

    pub fn lons(&self) -> &[f32] {
        &self.lons
    }

    pub fn lats(&self) -> &[f32] {
        &self.lats
    }

    /// Shape `(n_lat, n_lon)` of fields defined on these axes.
    pub fn shape(&self) -> (usize, usize) {
        (self.lats.len(), self.lons.len())
    }
}

fn check_axis(axis: &[f32], name: &'static str) -> Result<(), GridError> {
    if axis.len() < 2 {
        return Err(GridError::AxisTooShort(name));
    }

    let ascending = axis.windows(2).all(|w| w[0] < w[1]);
    let descending = axis.windows(2).all(|w| w[0] > w[1]);

    if !ascending && !descending {
        return Err(GridError::NotMonotonic(name));
    }

    Ok(())
}

/// Post-processing policy of resampled values.
#[derive(Copy, Clone, PartialEq, PartialOrd, Debug, Deserialize)]
pub struct ResamplePolicy {
    /// _(Optional)_ Value assigned to target nodes outside
    /// the source grid (or with NaN coordinates).
    ///
    /// Defaults to `0.0`.
    #[serde(default = "ResamplePolicy::default_fill_value")]
    pub fill_value: f32,

    /// _(Optional)_ Physical maximum to which interpolated values
    /// are bounded, e.g. a diffusivity cap. NaN values are kept.
    ///
    /// No bounding by default.
    #[serde(default)]
    pub ceiling: Option<f32>,
}

impl ResamplePolicy {
    fn default_fill_value() -> f32 {
        DEFAULT_FILL_VALUE
    }

    /// Checks if policy values can be used.
    pub fn check_bounds(&self) -> Result<(), ConfigError> {
        if let Some(ceiling) = self.ceiling {
            if !ceiling.is_finite() {
                return Err(ConfigError::OutOfBounds(
                    "Resampling ceiling must be a finite number",
                ));
            }
        }

        Ok(())
    }

    fn bound(&self, value: f32) -> f32 {
        match self.ceiling {
            Some(ceiling) if value > ceiling => ceiling,
            _ => value,
        }
    }
}

impl Default for ResamplePolicy {
    fn default() -> Self {
        ResamplePolicy {
            fill_value: ResamplePolicy::default_fill_value(),
            ceiling: None,
        }
    }
}

/// Evaluates the source field at every node of the target grid.
///
/// The field must be shaped `(n_lat, n_lon)` of the source axes.
/// NaN source values used with non-zero weight make the result NaN;
/// callers wanting other behaviour must fill NaNs beforehand.
pub fn resample(
    field: &Field,
    axes: &RegularAxes,
    target: &Grid,
    policy: &ResamplePolicy,
) -> Result<Field, GridError> {
    if field.dim() != axes.shape() {
        return Err(GridError::ShapeMismatch(axes.shape(), field.dim()));
    }

    debug!(
        "Resampling {:?} field onto {:?} grid",
        field.dim(),
        target.shape()
    );

    let mut resampled = Array2::from_elem(target.shape(), policy.fill_value);

    Zip::from(&mut resampled)
        .and(target.lon())
        .and(target.lat())
        .for_each(|out, &lon, &lat| {
            if let Some(value) = interpolate_bilinear(field, axes, lon, lat) {
                *out = policy.bound(value);
            }
        });

    Ok(resampled)
}

/// Bilinear interpolation at a single point,
/// `None` when the point is outside the axes.
fn interpolate_bilinear(field: &Field, axes: &RegularAxes, lon: f32, lat: f32) -> Option<f32> {
    let (j, tx) = bracket(&axes.lons, lon)?;
    let (i, ty) = bracket(&axes.lats, lat)?;

    let corners = [
        ((i, j), (1.0 - ty) * (1.0 - tx)),
        ((i, j + 1), (1.0 - ty) * tx),
        ((i + 1, j), ty * (1.0 - tx)),
        ((i + 1, j + 1), ty * tx),
    ];

    // zero-weight corners are skipped so NaN neighbours
    // do not spoil points lying exactly on valid nodes
    let value: f64 = corners
        .iter()
        .filter(|(_, weight)| *weight != 0.0)
        .map(|(index, weight)| weight * f64::from(field[*index]))
        .sum();

    Some(value as f32)
}

/// Finds the axis cell containing `x` and the fractional
/// position of `x` inside it.
fn bracket(axis: &[f32], x: f32) -> Option<(usize, f64)> {
    let index = bisection::find_left_closest(axis, &x).ok()?;

    // point on the last node belongs to the last cell
    let index = index.min(axis.len() - 2);

    let x0 = f64::from(axis[index]);
    let x1 = f64::from(axis[index + 1]);

    Some((index, (f64::from(x) - x0) / (x1 - x0)))
}
