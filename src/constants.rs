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

//! Module containing constants used by the crate.

/// Version tag of coordinates-only files.
pub const COORDINATES_VERSION: i32 = 1;

/// Version tag of daily field files with float32 body.
pub const DAILY_F32_VERSION: i32 = 1;

/// Version tag of daily field files with half-float body
/// and declared quantization error.
pub const DAILY_HALF_VERSION: i32 = 2;

/// Version tag of monthly combined velocity files.
pub const CURRENTS_MONTHLY_VERSION: i32 = 2;

/// Version tag of daily combined velocity files.
pub const CURRENTS_DAILY_VERSION: i32 = 3;

/// Version tag of single component files with coordinates.
pub const COMPONENT_VERSION: i32 = 2;

/// Size in bytes of every header integer.
pub const HEADER_INT_SIZE: usize = 4;

/// Divisor converting `max_error_scaled` header integer
/// to quantization error in physical units.
pub const ERROR_SCALE: f32 = 1000.0;

/// Approximate length of one degree in kilometres,
/// used by the planar distance of the locator.
pub const KM_PER_DEGREE: f64 = 111.0;

/// Distance in kilometres above which a located node
/// is reported as far from the query point.
pub const FAR_NODE_KM: f64 = 50.0;

/// Value assigned to resampled cells outside the source grid.
pub const DEFAULT_FILL_VALUE: f32 = 0.0;
