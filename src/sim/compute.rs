// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The block compute stage: one invocation per device per block.

use crossbeam_utils::atomic::AtomicCell;
use log::trace;
use marlu::precession::get_lmst;
use ndarray::prelude::*;

use super::device::{DeviceBundle, HostSlots};
use super::work_queue::{WorkQueue, WorkUnit};
use super::{SimulateError, SimulationPlan};
use crate::beam::Beam;
use crate::model::{
    correlate, correlate_autos, evaluate_jones_e, evaluate_jones_k, evaluate_jones_r, jones_join,
    station_uvws_into,
};
use crate::sky::SkyModel;

/// Fill this device's visibility block for `block_index`, claiming work
/// units from the shared queue until the block is exhausted, then copy the
/// block into the host slot for the block's parity.
///
/// On error the caller is responsible for raising the shared abort flag;
/// this function itself checks the flag at claim and channel granularity and
/// unwinds without further accumulation once it's set.
pub(crate) fn simulate_block(
    plan: &SimulationPlan,
    bundle: &mut DeviceBundle,
    host: &HostSlots,
    sky_chunks: &[SkyModel],
    beam: &dyn Beam,
    block_index: usize,
    queue: &WorkQueue,
    abort: &AtomicCell<bool>,
) -> Result<(), SimulateError> {
    let DeviceBundle {
        device_index,
        sky_chunk,
        local_sky,
        telescope,
        baseline_pairs,
        station_uvws,
        azels,
        jones_e,
        jones_r,
        jones_k,
        jones_j,
        vis_block,
        timers,
    } = bundle;
    timers.compute.resume();

    // Clear the visibility block and set its metadata.
    vis_block.clear();
    let (start_time_index, num_times_block) = plan.block_extent(block_index);
    vis_block.num_times = num_times_block;
    vis_block.start_time_index = start_time_index;

    let longitude_rad = telescope.array_position.longitude_rad;
    let latitude_rad = telescope.array_position.latitude_rad;
    let num_units = num_times_block * sky_chunks.len();

    // Go through all possible work units in the block. A work unit is the
    // simulation of one time against one sky chunk.
    let mut previous_chunk_index = None;
    loop {
        let counter = queue.claim();
        if counter >= num_units || abort.load() {
            break;
        }
        let unit = WorkUnit::from_counter(counter, num_times_block);

        // Copy the sky chunk in only if it differs from the previous one.
        if previous_chunk_index != Some(unit.chunk_index) {
            previous_chunk_index = Some(unit.chunk_index);
            timers.init_copy.resume();
            sky_chunk.copy_from(&sky_chunks[unit.chunk_index]);
            timers.init_copy.pause();
        }

        let sim_time_index = start_time_index + unit.time_index;
        let lst_rad = get_lmst(longitude_rad, plan.centroid(sim_time_index), plan.dut1);

        // Apply the horizon clip, if enabled.
        let sky: &mut SkyModel = if plan.horizon_clip {
            timers.clip.resume();
            sky_chunk.horizon_clip(lst_rad, latitude_rad, local_sky, azels);
            timers.clip.pause();
            &mut *local_sky
        } else {
            sky_chunk.azels_into(lst_rad, latitude_rad, azels);
            &mut *sky_chunk
        };
        let num_src = sky.num_sources();
        if num_src == 0 {
            continue;
        }

        trace!(
            "Time {}/{}, chunk {}/{} [device {}, {} sources]",
            sim_time_index + 1,
            plan.total_times,
            unit.chunk_index + 1,
            sky_chunks.len(),
            device_index,
            num_src
        );

        // Station (u,v,w) coordinates for this time.
        timers.init_copy.resume();
        let phase_hadec = telescope.phase_centre.to_hadec(lst_rad);
        station_uvws_into(&telescope.station_positions, phase_hadec, station_uvws);
        timers.init_copy.pause();

        for i_chan in 0..plan.num_channels {
            if abort.load() {
                break;
            }
            let freq_hz = plan.freq_start_hz + i_chan as f64 * plan.freq_inc_hz;

            // Scale source fluxes with spectral index for this channel.
            sky.scale_flux_with_frequency(freq_hz);

            // Evaluate the station beam (Jones E).
            timers.jones_e.resume();
            evaluate_jones_e(beam, azels, freq_hz, jones_e.view_mut())?;
            timers.jones_e.pause();

            // Evaluate parallactic-angle rotation (Jones R) and fold it into
            // the beam response, for polarisation-capable telescopes.
            let jones_er = match jones_r.as_mut() {
                Some(jones_r) => {
                    timers.jones_e.resume();
                    evaluate_jones_r(sky, lst_rad, latitude_rad, jones_e.view(), jones_r.view_mut());
                    timers.jones_e.pause();
                    jones_r.view()
                }
                None => jones_e.view(),
            };

            // Evaluate the interferometric phase (Jones K).
            timers.jones_k.resume();
            evaluate_jones_k(
                sky,
                station_uvws,
                freq_hz,
                plan.flux_filter_min_jy,
                plan.flux_filter_max_jy,
                jones_k.view_mut(),
            );
            timers.jones_k.pause();

            // Join Jones K with Jones R*E if R exists, otherwise with Jones E
            // directly.
            timers.join.resume();
            jones_join(jones_k.view(), jones_er, jones_j.view_mut(), num_src);
            timers.join.pause();

            // Correlate into this (time, channel) slice of the block.
            timers.correlate.resume();
            correlate(
                jones_j.view(),
                sky,
                baseline_pairs,
                vis_block.cross.slice_mut(s![unit.time_index, i_chan, ..]),
            );
            if let Some(autos) = vis_block.autos.as_mut() {
                correlate_autos(
                    jones_j.view(),
                    sky,
                    autos.slice_mut(s![unit.time_index, i_chan, ..]),
                );
            }
            timers.correlate.pause();
        }
    }

    // Copy the visibility block into this block-parity's host slot.
    timers.init_copy.resume();
    {
        let mut slot = host.slots[block_index % 2]
            .lock()
            .expect("no panics while a slot is held");
        slot.copy_from(vis_block);
    }
    timers.init_copy.pause();

    timers.compute.pause();
    Ok(())
}
