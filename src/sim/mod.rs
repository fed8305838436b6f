// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The block-pipelined simulation scheduler.
//!
//! Observation time is split into blocks of at most `block_length` samples.
//! The driver runs `num_vis_blocks + 1` loop iterations: iteration `b`
//! simulates block `b` (when `b < num_vis_blocks`) concurrently with writing
//! block `b - 1` (when `b > 0`); the final iteration only writes the last
//! block. One worker thread is bound to each compute device and exactly one
//! more performs the writing, all created once for the whole run.
//!
//! Two barriers separate consecutive iterations. After the first, every
//! participant has finished its work for the iteration and the shared
//! work-unit counter is reset (by the barrier leader); the second ensures
//! the reset is visible to all before anyone claims units for the new block.
//! Within an iteration, compute writes host-side blocks of parity `b % 2`
//! while the writer reads parity `!(b % 2)`, so the two never touch the same
//! buffer between barriers.

mod compute;
mod device;
mod output;
#[cfg(test)]
mod tests;
mod work_queue;

pub(crate) use device::{DeviceBundle, HostSlots, Timer};
pub(crate) use work_queue::WorkQueue;

use std::num::NonZeroUsize;
use std::sync::Barrier;
use std::thread::{self, ScopedJoinHandle};
use std::time::Instant;

use crossbeam_utils::atomic::AtomicCell;
use hifitime::{Duration, Epoch};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{debug, info, warn};
use scopeguard::defer_on_unwind;
use thiserror::Error;

use crate::beam::{Beam, BeamType};
use crate::io::write::{OutputHandles, VisWriteError};
use crate::math::div_ceil;
use crate::model::ModelError;
use crate::noise::NoiseParams;
use crate::sky::SkyModel;
use crate::telescope::TelescopeModel;
use crate::PROGRESS_BARS;

/// Parameters fixed for the whole of a simulation run.
#[derive(Debug, Clone)]
pub(crate) struct SimulationPlan {
    pub(crate) total_times: usize,
    pub(crate) block_length: NonZeroUsize,
    pub(crate) num_channels: usize,

    /// The leading edge of the first time sample.
    pub(crate) start_time: Epoch,
    pub(crate) time_res: Duration,

    /// UT1 - UTC.
    pub(crate) dut1: Duration,

    pub(crate) freq_start_hz: f64,
    pub(crate) freq_inc_hz: f64,

    pub(crate) num_devices: NonZeroUsize,

    /// Run compute and output sequentially on the calling thread rather than
    /// in a worker pool. Only valid with one device.
    pub(crate) single_thread: bool,

    pub(crate) horizon_clip: bool,
    pub(crate) flux_filter_min_jy: f64,
    pub(crate) flux_filter_max_jy: f64,
    pub(crate) write_autos: bool,
    pub(crate) max_sources_per_chunk: NonZeroUsize,
    pub(crate) noise: Option<NoiseParams>,
}

impl SimulationPlan {
    /// How many time blocks the run is split into.
    pub(crate) fn num_vis_blocks(&self) -> usize {
        div_ceil(self.total_times, self.block_length.get())
    }

    /// A block's absolute start-time index and its number of active times.
    /// The final block may be short.
    pub(crate) fn block_extent(&self, block_index: usize) -> (usize, usize) {
        let start = block_index * self.block_length.get();
        let num_times = self.block_length.get().min(self.total_times - start);
        (start, num_times)
    }

    /// The centroid timestamp of a time sample.
    pub(crate) fn centroid(&self, time_index: usize) -> Epoch {
        self.start_time + self.time_res * time_index as i64 + self.time_res / 2
    }
}

#[derive(Error, Debug)]
pub(crate) enum SimulateError {
    #[error(
        "Couldn't allocate buffers for device {device_index}; the requested dimensions are too large"
    )]
    Allocation { device_index: usize },

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    VisWrite(#[from] VisWriteError),

    #[error(transparent)]
    IO(#[from] std::io::Error),
}

/// Run the whole simulation: set up per-device resources, drive the block
/// loop, report timings and finalise the sinks. Returns a message describing
/// what was written.
pub(crate) fn run(
    plan: &SimulationPlan,
    sky_chunks: &[SkyModel],
    telescope: &TelescopeModel,
    beam: &dyn Beam,
    out: &mut OutputHandles,
) -> Result<String, SimulateError> {
    let num_devices = plan.num_devices.get();
    let num_vis_blocks = plan.num_vis_blocks();

    // Initialise each device's memory, in device-index order.
    debug!("Setting up {num_devices} device bundle(s)");
    let mut bundles = Vec::with_capacity(num_devices);
    let mut host_slots = Vec::with_capacity(num_devices);
    for device_index in 0..num_devices {
        bundles.push(DeviceBundle::new(plan, telescope, device_index)?);
        host_slots.push(HostSlots::new(plan, telescope));
    }
    let baseline_pairs = telescope.baseline_pairs();

    let progress = ProgressBar::with_draw_target(
        Some(num_vis_blocks as u64),
        if PROGRESS_BARS.load() {
            ProgressDrawTarget::stdout()
        } else {
            ProgressDrawTarget::hidden()
        },
    )
    .with_style(
        ProgressStyle::default_bar()
            .template("{msg:18}: [{wide_bar:.blue}] {pos:3}/{len:3} blocks ({elapsed_precise}<{eta_precise})")
            .unwrap()
            .progress_chars("=> "),
    )
    .with_position(0)
    .with_message("Simulating blocks");

    info!(
        "Starting simulation: {} time steps in {} block(s) of up to {}, {} channel(s), {} device(s)",
        plan.total_times,
        num_vis_blocks,
        plan.block_length,
        plan.num_channels,
        num_devices
    );
    let sim_start = Instant::now();
    let queue = WorkQueue::new();
    let abort = AtomicCell::new(false);
    let mut write_timer = Timer::default();
    let mut run_log: Vec<String> = vec![];

    if num_devices == 1 && plan.single_thread {
        // Degraded mode: compute and output time-share the calling thread,
        // with the same per-block schedule and buffer parity as the worker
        // pool.
        let bundle = &mut bundles[0];
        let mut result: Result<(), SimulateError> = Ok(());
        for b in 0..=num_vis_blocks {
            if !abort.load() && b < num_vis_blocks {
                if let Err(e) = compute::simulate_block(
                    plan,
                    bundle,
                    &host_slots[0],
                    sky_chunks,
                    beam,
                    b,
                    &queue,
                    &abort,
                ) {
                    abort.store(true);
                    result = result.and(Err(e));
                }
            }
            if !abort.load() && b > 0 {
                if let Err(e) = output::write_block(
                    plan,
                    telescope,
                    &baseline_pairs,
                    &host_slots,
                    b - 1,
                    out,
                    &mut write_timer,
                ) {
                    abort.store(true);
                    result = result.and(Err(e.into()));
                }
            }
            queue.reset();
            if b < num_vis_blocks && !abort.load() {
                block_complete(b, num_vis_blocks, sim_start, &progress, &mut run_log);
            }
        }
        result?;
    } else {
        let barrier = Barrier::new(num_devices + 1);
        let scoped_threads_result: Result<(), SimulateError> = thread::scope(|scope| {
            let barrier = &barrier;
            let queue = &queue;
            let abort = &abort;
            let host_slots = &host_slots;
            let baseline_pairs = &baseline_pairs;

            // Compute participants, one per device.
            let mut compute_handles: Vec<ScopedJoinHandle<Result<(), SimulateError>>> = vec![];
            for (bundle, host) in bundles.iter_mut().zip(host_slots.iter()) {
                let handle = thread::Builder::new()
                    .name(format!("compute-{}", bundle.device_index))
                    .spawn_scoped(scope, move || {
                        defer_on_unwind! { abort.store(true); }

                        let mut result = Ok(());
                        for b in 0..=num_vis_blocks {
                            if !abort.load() && b < num_vis_blocks {
                                if let Err(e) = compute::simulate_block(
                                    plan, bundle, host, sky_chunks, beam, b, queue, abort,
                                ) {
                                    abort.store(true);
                                    result = result.and(Err(e));
                                }
                            }
                            // Barrier A: everyone is done with this
                            // iteration; the leader resets the work-unit
                            // counter for the next block.
                            if barrier.wait().is_leader() {
                                queue.reset();
                            }
                            // Barrier B: the reset is visible to all before
                            // any new claims are made.
                            barrier.wait();
                        }
                        result
                    })
                    .expect("OS can create threads");
                compute_handles.push(handle);
            }

            // The output participant performs no device compute.
            let out = &mut *out;
            let write_timer = &mut write_timer;
            let run_log = &mut run_log;
            let progress = progress.clone();
            let write_handle: ScopedJoinHandle<Result<(), SimulateError>> =
                thread::Builder::new()
                    .name("write".to_string())
                    .spawn_scoped(scope, move || {
                        defer_on_unwind! { abort.store(true); }
                        progress.tick();

                        let mut result = Ok(());
                        for b in 0..=num_vis_blocks {
                            if !abort.load() && b > 0 {
                                if let Err(e) = output::write_block(
                                    plan,
                                    telescope,
                                    baseline_pairs,
                                    host_slots,
                                    b - 1,
                                    out,
                                    write_timer,
                                ) {
                                    abort.store(true);
                                    result = result.and(Err(e.into()));
                                }
                            }
                            if barrier.wait().is_leader() {
                                queue.reset();
                            }
                            barrier.wait();
                            if b < num_vis_blocks && !abort.load() {
                                block_complete(b, num_vis_blocks, sim_start, &progress, run_log);
                            }
                        }
                        result
                    })
                    .expect("OS can create threads");

            // Join all thread handles. This propagates any errors and lets
            // us know if any threads panicked (panics abort in release
            // builds, per the Cargo.toml).
            let mut joined: Result<(), SimulateError> = Ok(());
            for handle in compute_handles {
                joined = joined.and(handle.join().unwrap());
            }
            joined.and(write_handle.join().unwrap())
        });
        scoped_threads_result?;
    }
    progress.abandon_with_message("Finished simulating");

    // If there are sources in the simulation and the station beam is not
    // normalised at the phase centre, the configured noise RMS may give a
    // very unexpected signal-to-noise ratio.
    let have_sources = sky_chunks.iter().any(|chunk| chunk.num_sources() > 0);
    if plan.noise.is_some() && have_sources && !matches!(beam.get_beam_type(), BeamType::None) {
        warn!("System noise was added to visibilities without station-beam");
        warn!("normalisation at the phase centre. This may lead to an");
        warn!("invalid signal-to-noise ratio.");
    }

    record_timing(&bundles, &write_timer, sim_start, &mut run_log);

    // Close all sinks, embedding the run's log text.
    let message = out.finalise(&run_log.join("\n"))?;
    info!("Simulation complete");
    Ok(message)
}

/// Log one block's completion and remember the line for the sinks' embedded
/// run log.
fn block_complete(
    block_index: usize,
    num_vis_blocks: usize,
    sim_start: Instant,
    progress: &ProgressBar,
    run_log: &mut Vec<String>,
) {
    let line = format!(
        "Block {}/{} complete. Simulation time elapsed: {:.3} s",
        block_index + 1,
        num_vis_blocks,
        sim_start.elapsed().as_secs_f64()
    );
    info!("{line}");
    run_log.push(line);
    progress.inc(1);
}

/// Log the end-of-run timing report: per-device compute totals, the write
/// total, and the percentage breakdown across pipeline phases.
fn record_timing(
    bundles: &[DeviceBundle],
    write_timer: &Timer,
    sim_start: Instant,
    run_log: &mut Vec<String>,
) {
    let mut t_init = 0.0;
    let mut t_clip = 0.0;
    let mut t_e = 0.0;
    let mut t_k = 0.0;
    let mut t_join = 0.0;
    let mut t_correlate = 0.0;
    let mut t_compute = 0.0;

    let mut lines = vec![format!(
        "Total wall time: {:.3} s",
        sim_start.elapsed().as_secs_f64()
    )];
    for bundle in bundles {
        let timers = &bundle.timers;
        let compute = timers.compute.elapsed().as_secs_f64();
        lines.push(format!(
            "Compute: {compute:.3} s [device {}]",
            bundle.device_index
        ));
        t_init += timers.init_copy.elapsed().as_secs_f64();
        t_clip += timers.clip.elapsed().as_secs_f64();
        t_e += timers.jones_e.elapsed().as_secs_f64();
        t_k += timers.jones_k.elapsed().as_secs_f64();
        t_join += timers.join.elapsed().as_secs_f64();
        t_correlate += timers.correlate.elapsed().as_secs_f64();
        t_compute += compute;
    }
    lines.push(format!(
        "Write: {:.3} s",
        write_timer.elapsed().as_secs_f64()
    ));

    if t_compute > 0.0 {
        let t_components = t_init + t_clip + t_e + t_k + t_join + t_correlate;
        lines.push("Compute components:".to_string());
        for (name, t) in [
            ("Initialise & copy", t_init),
            ("Horizon clip", t_clip),
            ("Jones E", t_e),
            ("Jones K", t_k),
            ("Jones join", t_join),
            ("Jones correlate", t_correlate),
            ("Other", t_compute - t_components),
        ] {
            lines.push(format!("  {name}: {:4.1}%", (t / t_compute) * 100.0));
        }
    }

    for line in lines {
        info!("{line}");
        run_log.push(line);
    }
}
