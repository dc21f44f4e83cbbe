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

//! Module answering which grid cell corresponds
//! to a given longitude and latitude.
//!
//! Because the grid may be curvilinear the search is a brute-force
//! scan over every node, `O(n_lat·n_lon)` per query. Callers doing
//! many queries against the same grid should build their own
//! spatial index.

use super::{Field, Grid};
use crate::constants::{FAR_NODE_KM, KM_PER_DEGREE};
use crate::errors::LocateError;
use log::debug;
use serde::Deserialize;

/// Parameters of the point-to-cell search.
#[derive(Copy, Clone, PartialEq, PartialOrd, Debug, Deserialize)]
pub struct LocatorParams {
    /// _(Optional)_ Length of one degree in kilometres used
    /// to convert planar degree distance to an approximate
    /// distance. Defaults to `111.0`, which is reasonable only
    /// at mid-latitudes and is not a geodesic distance.
    #[serde(default = "LocatorParams::default_km_per_degree")]
    pub km_per_degree: f64,

    /// _(Optional)_ Distance in kilometres above which the closest
    /// node is reported as far from the query point, usually
    /// a point outside the grid coverage. Defaults to `50.0`.
    #[serde(default = "LocatorParams::default_far_node_km")]
    pub far_node_km: f64,
}

impl LocatorParams {
    fn default_km_per_degree() -> f64 {
        KM_PER_DEGREE
    }

    fn default_far_node_km() -> f64 {
        FAR_NODE_KM
    }
}

impl Default for LocatorParams {
    fn default() -> Self {
        LocatorParams {
            km_per_degree: LocatorParams::default_km_per_degree(),
            far_node_km: LocatorParams::default_far_node_km(),
        }
    }
}

/// Closest grid node found for a query point.
#[derive(Copy, Clone, PartialEq, PartialOrd, Debug)]
pub struct Located {
    pub i: usize,
    pub j: usize,

    /// Squared planar distance in degrees².
    pub distance_sq: f64,

    /// Approximate distance in kilometres.
    pub distance_km: f64,
}

impl Located {
    /// Checks if the field holds a valid (non-NaN) value
    /// in the located cell.
    ///
    /// The locator only compares coordinates, so the found cell
    /// can be land for a given field.
    pub fn is_valid(&self, field: &Field) -> bool {
        field
            .get((self.i, self.j))
            .map_or(false, |value| !value.is_nan())
    }

    /// Checks if the node lies further from the query
    /// point than the configured distance.
    pub fn is_far(&self, params: &LocatorParams) -> bool {
        self.distance_km > params.far_node_km
    }

    /// Value of the field in the located cell.
    pub fn value(&self, field: &Field) -> Option<f32> {
        field.get((self.i, self.j)).copied()
    }
}

/// Finds the grid node with the smallest squared planar distance
/// `(lon - target_lon)² + (lat - target_lat)²` to the target.
///
/// Ties resolve to the first node in row-major scan order.
/// Nodes with NaN coordinates are scanned too, but a NaN distance
/// never compares smaller, so they are never returned; when no node
/// has a finite distance [`LocateError::NoFiniteCell`] is returned.
pub fn locate(
    grid: &Grid,
    target_lon: f32,
    target_lat: f32,
    params: &LocatorParams,
) -> Result<Located, LocateError> {
    if grid.is_empty() {
        return Err(LocateError::EmptyGrid);
    }

    let target_lon = f64::from(target_lon);
    let target_lat = f64::from(target_lat);

    let mut closest: Option<(usize, usize, f64)> = None;

    for ((i, j), &lon) in grid.lon().indexed_iter() {
        let dlon = f64::from(lon) - target_lon;
        let dlat = f64::from(grid.lat()[[i, j]]) - target_lat;
        let distance_sq = dlon * dlon + dlat * dlat;

        let is_closer = match closest {
            None => !distance_sq.is_nan(),
            Some((_, _, min_sq)) => distance_sq < min_sq,
        };

        if is_closer {
            closest = Some((i, j, distance_sq));
        }
    }

    let (i, j, distance_sq) = closest.ok_or(LocateError::NoFiniteCell)?;

    let located = Located {
        i,
        j,
        distance_sq,
        distance_km: distance_sq.sqrt() * params.km_per_degree,
    };

    debug!(
        "Located ({:.3}, {:.3}) at cell ({}, {}), {:.2} km away",
        target_lon, target_lat, i, j, located.distance_km
    );

    Ok(located)
}
