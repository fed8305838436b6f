// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The block output stage: combines the per-device blocks of a completed
//! time block and persists the result.

use log::debug;
use marlu::precession::get_lmst;
use marlu::UVW;

use super::device::{HostSlots, Timer};
use super::SimulationPlan;
use crate::io::write::{OutputHandles, VisWriteError};
use crate::model::station_uvws_into;
use crate::noise::add_system_noise;
use crate::telescope::TelescopeModel;

/// Combine and write the completed block `block_index`.
///
/// Only ever invoked after all compute participants have passed the barrier
/// that follows their work on this block, so every host slot of the block's
/// parity is quiescent. Device 0's host block is the fold target: after this
/// call it holds the combined visibilities.
pub(crate) fn write_block(
    plan: &SimulationPlan,
    telescope: &TelescopeModel,
    baseline_pairs: &[(usize, usize)],
    host_slots: &[HostSlots],
    block_index: usize,
    out: &mut OutputHandles,
    write_timer: &mut Timer,
) -> Result<(), VisWriteError> {
    write_timer.resume();
    debug!("Combining and writing block {block_index}");

    let parity = block_index % 2;
    let (first, rest) = host_slots
        .split_first()
        .expect("the driver sets up at least one device");

    // Sum all devices' blocks into device 0's.
    let mut combined = first.slots[parity]
        .lock()
        .expect("no panics while a slot is held");
    for device_slots in rest {
        let device_block = device_slots.slots[parity]
            .lock()
            .expect("no panics while a slot is held");
        combined.accumulate(&device_block);
    }

    // Calculate baseline (u,v,w) coordinates for the block.
    let longitude_rad = telescope.array_position.longitude_rad;
    for i_time in 0..combined.num_times {
        let sim_time_index = combined.start_time_index + i_time;
        let lst_rad = get_lmst(longitude_rad, plan.centroid(sim_time_index), plan.dut1);
        let phase_hadec = telescope.phase_centre.to_hadec(lst_rad);
        station_uvws_into(
            &telescope.station_positions,
            phase_hadec,
            &mut out.station_uvws,
        );

        let station_uvws = &out.station_uvws;
        for (uvw, &(st1, st2)) in combined
            .uvws
            .row_mut(i_time)
            .iter_mut()
            .zip(baseline_pairs.iter())
        {
            *uvw = UVW {
                u: station_uvws[st1].u - station_uvws[st2].u,
                v: station_uvws[st1].v - station_uvws[st2].v,
                w: station_uvws[st1].w - station_uvws[st2].w,
            };
        }
    }

    // Add uncorrelated system noise to the combined visibilities.
    if let Some(noise) = plan.noise {
        add_system_noise(&mut combined, noise, block_index);
    }

    out.write_block(&combined, block_index)?;
    write_timer.pause();
    Ok(())
}
