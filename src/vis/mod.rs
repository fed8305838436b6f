// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Visibility blocks: one contiguous group of time steps' worth of
//! cross-correlations (and optionally auto-correlations).


use marlu::{Jones, UVW};
use ndarray::prelude::*;

/// The visibilities of one time block.
///
/// Each compute device owns one of these (filled during simulation) and two
/// host-side copies (the double buffer read by the output stage). All arrays
/// are allocated once at their maximum size and never reallocated; the number
/// of *active* times in the block is `num_times`, which may be less than the
/// time capacity for the final block of a run.
pub(crate) struct VisBlock {
    /// Cross-correlation visibilities (`[time][channel][baseline]`).
    pub(crate) cross: Array3<Jones<f32>>,

    /// Auto-correlation visibilities (`[time][channel][station]`), if they
    /// were asked for.
    pub(crate) autos: Option<Array3<Jones<f32>>>,

    /// Baseline coordinates (`[time][baseline]`) \[metres\]. Populated by the
    /// output stage once per combined block; device-side blocks leave these
    /// zeroed.
    pub(crate) uvws: Array2<UVW>,

    /// The number of active time samples in this block.
    pub(crate) num_times: usize,

    /// The absolute time index of the block's first sample.
    pub(crate) start_time_index: usize,
}

impl VisBlock {
    /// Allocate a block for `block_capacity` times, `num_channels` channels
    /// and `num_baselines` cross-correlation baselines. Auto-correlation
    /// arrays are only allocated when `num_stations` is supplied.
    pub(crate) fn new(
        block_capacity: usize,
        num_channels: usize,
        num_baselines: usize,
        num_stations: Option<usize>,
    ) -> VisBlock {
        VisBlock {
            cross: Array3::default((block_capacity, num_channels, num_baselines)),
            autos: num_stations
                .map(|num_stations| Array3::default((block_capacity, num_channels, num_stations))),
            uvws: Array2::from_elem(
                (block_capacity, num_baselines),
                UVW {
                    u: 0.0,
                    v: 0.0,
                    w: 0.0,
                },
            ),
            num_times: block_capacity,
            start_time_index: 0,
        }
    }

    /// Zero all visibilities and reset the block metadata for a new block.
    pub(crate) fn clear(&mut self) {
        self.cross.fill(Jones::default());
        if let Some(autos) = self.autos.as_mut() {
            autos.fill(Jones::default());
        }
        self.num_times = 0;
        self.start_time_index = 0;
    }

    /// Copy another block's contents into this one without reallocating.
    /// Both blocks must have been created with the same dimensions.
    pub(crate) fn copy_from(&mut self, other: &VisBlock) {
        self.cross.assign(&other.cross);
        match (self.autos.as_mut(), other.autos.as_ref()) {
            (Some(dest), Some(src)) => dest.assign(src),
            (None, None) => (),
            _ => unreachable!("blocks in a run either all have autos or none do"),
        }
        self.uvws.assign(&other.uvws);
        self.num_times = other.num_times;
        self.start_time_index = other.start_time_index;
    }

    /// Element-wise add another block's visibilities into this one.
    pub(crate) fn accumulate(&mut self, other: &VisBlock) {
        self.cross += &other.cross;
        if let (Some(dest), Some(src)) = (self.autos.as_mut(), other.autos.as_ref()) {
            *dest += src;
        }
    }
}
