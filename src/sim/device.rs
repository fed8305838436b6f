// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Per-device simulation resources.
//!
//! Everything a compute participant touches lives in its device's bundle:
//! sky-chunk working copies, a private telescope model, Jones workspaces, the
//! device-resident visibility block and per-stage timers. Bundles are
//! allocated once, in device-index order, before the block loop starts, and
//! released when the driver drops them; nothing is resized mid-run.
//!
//! The two host-resident blocks of each device (the double buffer the output
//! stage reads) live in a separate [`HostSlots`] so that a compute thread can
//! exclusively own its bundle while the writer accesses the host side. The
//! block-parity barrier schedule guarantees the slot locks are never
//! contended.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use marlu::{c64, AzEl, Jones, UVW};
use ndarray::Array2;

use super::{SimulateError, SimulationPlan};
use crate::sky::SkyModel;
use crate::telescope::{PolMode, TelescopeModel};
use crate::vis::VisBlock;

/// A resumable stopwatch for one pipeline stage.
#[derive(Debug, Default)]
pub(crate) struct Timer {
    total: Duration,
    started: Option<Instant>,
}

impl Timer {
    pub(crate) fn resume(&mut self) {
        self.started = Some(Instant::now());
    }

    pub(crate) fn pause(&mut self) {
        if let Some(started) = self.started.take() {
            self.total += started.elapsed();
        }
    }

    pub(crate) fn elapsed(&self) -> Duration {
        match self.started {
            Some(started) => self.total + started.elapsed(),
            None => self.total,
        }
    }
}

/// Elapsed time per compute-pipeline phase, for the end-of-run report.
#[derive(Debug, Default)]
pub(crate) struct StageTimers {
    pub(crate) compute: Timer,
    pub(crate) init_copy: Timer,
    pub(crate) clip: Timer,
    pub(crate) jones_e: Timer,
    pub(crate) jones_k: Timer,
    pub(crate) join: Timer,
    pub(crate) correlate: Timer,
}

/// All of a device's simulation memory.
pub(crate) struct DeviceBundle {
    pub(crate) device_index: usize,

    /// The unmodified sky chunk being processed.
    pub(crate) sky_chunk: SkyModel,

    /// A copy of the sky chunk after horizon clipping.
    pub(crate) local_sky: SkyModel,

    /// The telescope model, created as a copy.
    pub(crate) telescope: TelescopeModel,

    pub(crate) baseline_pairs: Vec<(usize, usize)>,

    /// Station (u,v,w) coordinates at the work unit's time.
    pub(crate) station_uvws: Vec<UVW>,

    /// Station-beam scratch: source azimuth/elevations at the work unit's
    /// time.
    pub(crate) azels: Vec<AzEl>,

    /// Station-beam response (`[station][source]`).
    pub(crate) jones_e: Array2<Jones<f64>>,

    /// Parallactic-angle rotation folded with the beam response. Only
    /// allocated for polarisation-capable telescopes.
    pub(crate) jones_r: Option<Array2<Jones<f64>>>,

    /// Interferometric phase terms (`[station][source]`).
    pub(crate) jones_k: Array2<c64>,

    /// The joined Jones products fed to correlation.
    pub(crate) jones_j: Array2<Jones<f64>>,

    /// The device-resident visibility block.
    pub(crate) vis_block: VisBlock,

    pub(crate) timers: StageTimers,
}

/// A device's two host-resident visibility blocks, indexed by block parity.
pub(crate) struct HostSlots {
    pub(crate) slots: [Mutex<VisBlock>; 2],
}

impl DeviceBundle {
    /// Allocate all of a device's buffers from the plan's maxima.
    pub(crate) fn new(
        plan: &SimulationPlan,
        telescope: &TelescopeModel,
        device_index: usize,
    ) -> Result<DeviceBundle, SimulateError> {
        let num_stations = telescope.num_stations();
        let num_baselines = telescope.num_baselines();
        let max_sources = plan.max_sources_per_chunk.get();

        // Refuse buffer sizes the host can't plausibly satisfy before any
        // allocation is attempted; an actual out-of-memory aborts the
        // process, so this is the only place the size can be rejected.
        let jones_elements = num_stations
            .checked_mul(max_sources)
            .and_then(|n| n.checked_mul(4))
            .ok_or(SimulateError::Allocation { device_index })?;
        let block_elements = plan
            .block_length
            .get()
            .checked_mul(plan.num_channels)
            .and_then(|n| n.checked_mul(num_baselines.max(num_stations)))
            .ok_or(SimulateError::Allocation { device_index })?;
        if jones_elements.max(block_elements) > isize::MAX as usize / 64 {
            return Err(SimulateError::Allocation { device_index });
        }

        let telescope = telescope.clone();
        let baseline_pairs = telescope.baseline_pairs();
        Ok(DeviceBundle {
            device_index,
            sky_chunk: SkyModel::with_capacity(max_sources),
            local_sky: SkyModel::with_capacity(max_sources),
            station_uvws: vec![UVW::default(); num_stations],
            azels: Vec::with_capacity(max_sources),
            jones_e: Array2::default((num_stations, max_sources)),
            jones_r: match telescope.pol_mode {
                PolMode::Full => Some(Array2::default((num_stations, max_sources))),
                PolMode::Scalar => None,
            },
            jones_k: Array2::default((num_stations, max_sources)),
            jones_j: Array2::default((num_stations, max_sources)),
            vis_block: new_block(plan, &telescope),
            telescope,
            baseline_pairs,
            timers: StageTimers::default(),
        })
    }
}

impl HostSlots {
    pub(crate) fn new(plan: &SimulationPlan, telescope: &TelescopeModel) -> HostSlots {
        HostSlots {
            slots: [
                Mutex::new(new_block(plan, telescope)),
                Mutex::new(new_block(plan, telescope)),
            ],
        }
    }
}

fn new_block(plan: &SimulationPlan, telescope: &TelescopeModel) -> VisBlock {
    VisBlock::new(
        plan.block_length.get(),
        plan.num_channels,
        telescope.num_baselines(),
        plan.write_autos.then(|| telescope.num_stations()),
    )
}
