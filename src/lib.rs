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

//! oceanbin reads and writes compact binary grids of ocean surface
//! fields (eddy kinetic energy, surface currents) on curvilinear
//! lon/lat grids.
//!
//! The crate provides:
//! - [`halffloat`]: IEEE 754 binary16 decoding and encoding used by
//!   compressed daily files,
//! - [`codec`]: self-describing little-endian grid file variants,
//! - [`grid`]: the grid data model, nearest-cell lookup and bilinear
//!   resampling from regular grids,
//! - [`sidecar`]: JSON metadata written next to produced files,
//! - [`tasks`]: a config-driven batch driver used by the `oceanbin` binary.
//!
//! NaN is the land mask everywhere: it is preserved by the codecs
//! and ignored by statistics.

pub mod codec;
pub mod configuration;
pub mod constants;
pub mod errors;
pub mod grid;
pub mod halffloat;
pub mod sidecar;
pub mod tasks;
