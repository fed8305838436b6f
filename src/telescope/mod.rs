// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Telescope/array-model handling.

mod read;

pub(crate) use read::{read_station_layout, ReadTelescopeError};

use marlu::{LatLngHeight, RADec, XyzGeodetic};

use crate::math::num_cross_baselines;

/// How visibilities are polarised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum PolMode {
    /// Scalar visibilities; no parallactic-angle rotation is applied.
    Scalar,

    /// Full-polarisation visibilities; parallactic-angle rotation (Jones R)
    /// is evaluated and folded into the beam response.
    Full,
}

/// An interferometer description: station geometry, phase centre and
/// polarisation mode. Each compute device gets its own copy at setup and
/// treats it as read-only for the whole run.
#[derive(Debug, Clone)]
pub(crate) struct TelescopeModel {
    /// Geodetic station positions relative to the array centre \[metres\].
    pub(crate) station_positions: Vec<XyzGeodetic>,

    pub(crate) station_names: Vec<String>,

    /// The Earth position of the interferometer.
    pub(crate) array_position: LatLngHeight,

    pub(crate) phase_centre: RADec,

    pub(crate) pol_mode: PolMode,
}

impl TelescopeModel {
    pub(crate) fn new(
        station_positions: Vec<XyzGeodetic>,
        array_position: LatLngHeight,
        phase_centre: RADec,
        pol_mode: PolMode,
    ) -> TelescopeModel {
        let station_names = (0..station_positions.len())
            .map(|i| format!("ST{i:03}"))
            .collect();
        TelescopeModel {
            station_positions,
            station_names,
            array_position,
            phase_centre,
            pol_mode,
        }
    }

    pub(crate) fn num_stations(&self) -> usize {
        self.station_positions.len()
    }

    pub(crate) fn num_baselines(&self) -> usize {
        num_cross_baselines(self.num_stations())
    }

    /// Station-index pairs for all cross-correlation baselines, in baseline
    /// order.
    pub(crate) fn baseline_pairs(&self) -> Vec<(usize, usize)> {
        let num_stations = self.num_stations();
        let mut pairs = Vec::with_capacity(self.num_baselines());
        for st1 in 0..num_stations {
            for st2 in st1 + 1..num_stations {
                pairs.push((st1, st2));
            }
        }
        pairs
    }
}
