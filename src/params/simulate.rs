// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Parameters for visibility simulation.

use std::path::PathBuf;

use log::info;
use vec1::Vec1;

use crate::beam::Beam;
use crate::io::write::{ObsMeta, OutputHandles, VisOutputType};
use crate::sim::{self, SimulateError, SimulationPlan};
use crate::sky::SkyModel;
use crate::telescope::TelescopeModel;

/// Everything a simulation run needs, fully validated.
pub(crate) struct SimulateParams {
    pub(crate) plan: SimulationPlan,

    /// The ordered sky chunks; each fits the device-side chunk buffers.
    pub(crate) sky_chunks: Vec<SkyModel>,

    pub(crate) telescope: TelescopeModel,

    /// Interface to beam code.
    pub(crate) beam: Box<dyn Beam>,

    /// The output visibility files.
    pub(crate) outputs: Vec1<(PathBuf, VisOutputType)>,
}

impl std::fmt::Debug for SimulateParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulateParams").finish_non_exhaustive()
    }
}

impl SimulateParams {
    pub(crate) fn run(&self) -> Result<(), SimulateError> {
        let meta = ObsMeta {
            num_channels: self.plan.num_channels,
            total_times: self.plan.total_times,
            block_capacity: self.plan.block_length.get(),
            start_time: self.plan.start_time,
            time_res: self.plan.time_res,
            dut1: self.plan.dut1,
            freq_start_hz: self.plan.freq_start_hz,
            freq_inc_hz: self.plan.freq_inc_hz,
            write_autos: self.plan.write_autos,
            phase_centre: self.telescope.phase_centre,
            array_position: self.telescope.array_position,
            station_positions: self.telescope.station_positions.clone(),
            station_names: self.telescope.station_names.clone(),
            baseline_pairs: self.telescope.baseline_pairs(),
        };
        let mut out = OutputHandles::new(&self.outputs, &meta)?;

        let message = sim::run(
            &self.plan,
            &self.sky_chunks,
            &self.telescope,
            &*self.beam,
            &mut out,
        )?;
        info!("{message}");
        Ok(())
    }
}
