// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Scheduler, ordering and end-to-end tests.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use approx::assert_abs_diff_eq;
use hifitime::{Duration, Epoch};
use marlu::{AzEl, Jones};

use super::*;
use crate::beam::{Beam, BeamError, BeamType, NoBeam};
use crate::io::write::{read_binary, BinaryFileSink, BlockSink, ObsMeta, OutputHandles};
use crate::sky::Source;
use crate::telescope::{PolMode, TelescopeModel};
use crate::vis::VisBlock;

fn test_plan(total_times: usize, block_length: usize, num_channels: usize) -> SimulationPlan {
    SimulationPlan {
        total_times,
        block_length: NonZeroUsize::new(block_length).unwrap(),
        num_channels,
        start_time: Epoch::from_gpst_seconds(1090008640.0),
        time_res: Duration::from_seconds(2.0),
        dut1: Duration::default(),
        freq_start_hz: 150e6,
        freq_inc_hz: 80e3,
        num_devices: NonZeroUsize::new(1).unwrap(),
        single_thread: false,
        horizon_clip: false,
        flux_filter_min_jy: f64::MIN,
        flux_filter_max_jy: f64::MAX,
        write_autos: false,
        max_sources_per_chunk: NonZeroUsize::new(16).unwrap(),
        noise: None,
    }
}

fn test_telescope(num_stations: usize) -> TelescopeModel {
    crate::telescope::tests::test_telescope(num_stations, PolMode::Scalar)
}

fn obs_meta(plan: &SimulationPlan, telescope: &TelescopeModel) -> ObsMeta {
    ObsMeta {
        num_channels: plan.num_channels,
        total_times: plan.total_times,
        block_capacity: plan.block_length.get(),
        start_time: plan.start_time,
        time_res: plan.time_res,
        dut1: plan.dut1,
        freq_start_hz: plan.freq_start_hz,
        freq_inc_hz: plan.freq_inc_hz,
        write_autos: plan.write_autos,
        phase_centre: telescope.phase_centre,
        array_position: telescope.array_position,
        station_positions: telescope.station_positions.clone(),
        station_names: telescope.station_names.clone(),
        baseline_pairs: telescope.baseline_pairs(),
    }
}

/// A source exactly at the phase centre correlates to its flux on every
/// baseline, whatever the geometry.
fn phase_centre_chunks(telescope: &TelescopeModel, flux_i: f64) -> Vec<SkyModel> {
    let sources = [Source {
        radec: telescope.phase_centre,
        flux_i,
        spectral_index: 0.0,
        ref_freq_hz: 150e6,
    }];
    SkyModel::chunk_sources(&sources, telescope.phase_centre, 16)
}

// ---------------------------------------------------------------------------
// Plan arithmetic.
// ---------------------------------------------------------------------------

#[test]
fn block_count_is_ceiling_division_and_extents_cover_the_run() {
    for (total_times, block_length) in
        [(1, 1), (4, 2), (5, 2), (7, 3), (8, 8), (9, 8), (100, 7), (1, 64)]
    {
        let plan = test_plan(total_times, block_length, 1);
        let num_blocks = plan.num_vis_blocks();
        assert_eq!(
            num_blocks,
            (total_times + block_length - 1) / block_length,
            "total_times={total_times} block_length={block_length}"
        );

        let mut covered = 0;
        for b in 0..num_blocks {
            let (start, num_times) = plan.block_extent(b);
            assert_eq!(start, b * block_length);
            assert!(num_times >= 1);
            assert!(num_times <= block_length);
            covered += num_times;
        }
        assert_eq!(covered, total_times);
    }
}

// ---------------------------------------------------------------------------
// Double-buffer parity: a model of the barrier schedule.
// ---------------------------------------------------------------------------

#[test]
fn double_buffer_parities_never_collide() {
    // Model the schedule: in iteration `b`, compute writes parity `b % 2`
    // (for b < n) and output reads parity `!(b % 2)` (for b > 0). The slot
    // output reads must have last been written by compute in iteration
    // `b - 1`, and never be the slot compute is writing concurrently.
    for num_blocks in 1..=9 {
        let mut last_writer: [Option<usize>; 2] = [None, None];
        for b in 0..=num_blocks {
            let write_parity = (b < num_blocks).then_some(b % 2);
            let read_parity = (b > 0).then_some(1 - b % 2);

            if let (Some(w), Some(r)) = (write_parity, read_parity) {
                assert_ne!(w, r, "iteration {b}: compute and output share a slot");
            }
            if let Some(r) = read_parity {
                assert_eq!(
                    last_writer[r],
                    Some(b - 1),
                    "iteration {b}: output reads a stale block"
                );
            }
            if let Some(w) = write_parity {
                last_writer[w] = Some(b);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Combination: the per-device fold.
// ---------------------------------------------------------------------------

#[test]
fn fold_is_an_element_wise_sum_independent_of_order() {
    let make_block = |scale: f32| {
        let mut block = VisBlock::new(2, 2, 3, None);
        block.num_times = 2;
        for (i, jones) in block.cross.iter_mut().enumerate() {
            *jones = Jones::identity() * (scale + i as f32);
        }
        block
    };

    // Fold in ascending device order...
    let mut forward = make_block(1.0);
    forward.accumulate(&make_block(10.0));
    forward.accumulate(&make_block(100.0));

    // ... and descending.
    let mut backward = make_block(100.0);
    backward.accumulate(&make_block(10.0));
    backward.accumulate(&make_block(1.0));

    for (a, b) in forward.cross.iter().zip(backward.cross.iter()) {
        assert_abs_diff_eq!(*a, *b);
    }
    assert_abs_diff_eq!(forward.cross[[0, 0, 0]][0].re, 111.0);
}

// ---------------------------------------------------------------------------
// End-to-end scenarios.
// ---------------------------------------------------------------------------

#[test]
fn empty_sky_writes_all_blocks_in_order_with_zero_amplitudes() {
    // 1 device, 4 time steps, block length 2: two full-size blocks; no sky
    // chunks at all.
    let plan = test_plan(4, 2, 3);
    let telescope = test_telescope(3);

    let tmp = tempfile::NamedTempFile::new().unwrap();
    let meta = obs_meta(&plan, &telescope);
    let mut out = OutputHandles {
        writers: vec![(
            tmp.path().to_path_buf(),
            Box::new(BinaryFileSink::new(tmp.path(), &meta).unwrap()),
        )],
        station_uvws: vec![marlu::UVW::default(); telescope.num_stations()],
    };

    run(&plan, &[], &telescope, &NoBeam, &mut out).unwrap();

    let contents = read_binary(tmp.path()).unwrap();
    assert_eq!(contents.blocks.len(), 2);
    for (i, block) in contents.blocks.iter().enumerate() {
        assert_eq!(block.block_index, i);
        assert_eq!(block.start_time_index, 2 * i);
        assert_eq!(block.num_times, 2);
        for jones in block.cross.iter() {
            assert_abs_diff_eq!(*jones, Jones::default());
        }
        // Baseline coordinates are still computed for an empty sky.
        assert!(block.uvws.iter().any(|uvw| uvw.u.abs() > 0.0));
    }
    assert!(contents.run_log.contains("Block 2/2 complete"));
}

#[test]
fn two_devices_racing_for_one_unit_produce_a_single_contribution() {
    // Both devices' compute participants race to claim the single work unit;
    // exactly one performs the accumulation, and the fold must still produce
    // the single device's value.
    let mut plan = test_plan(1, 1, 1);
    plan.num_devices = NonZeroUsize::new(2).unwrap();
    let telescope = test_telescope(3);
    let sky_chunks = phase_centre_chunks(&telescope, 2.0);

    for _ in 0..10 {
        let recorder = RecordingSink::shared();
        let mut out = OutputHandles {
            writers: vec![(PathBuf::from("memory"), Box::new(recorder.clone()))],
            station_uvws: vec![marlu::UVW::default(); telescope.num_stations()],
        };
        run(&plan, &sky_chunks, &telescope, &NoBeam, &mut out).unwrap();

        let written = recorder.blocks.lock().unwrap();
        assert_eq!(written.len(), 1);
        let (block_index, cross) = &written[0];
        assert_eq!(*block_index, 0);
        // One device's contribution only: XX == flux, not 2 * flux.
        for jones in cross.iter() {
            assert_abs_diff_eq!(jones[0].re, 2.0, epsilon = 1e-5);
            assert_abs_diff_eq!(jones[0].im, 0.0, epsilon = 1e-5);
        }
    }
}

#[test]
fn single_thread_mode_matches_the_threaded_schedule() {
    let telescope = test_telescope(3);
    let sky_chunks = phase_centre_chunks(&telescope, 1.5);

    let run_with = |single_thread: bool| {
        let mut plan = test_plan(5, 2, 2);
        plan.single_thread = single_thread;
        let recorder = RecordingSink::shared();
        let mut out = OutputHandles {
            writers: vec![(PathBuf::from("memory"), Box::new(recorder.clone()))],
            station_uvws: vec![marlu::UVW::default(); telescope.num_stations()],
        };
        run(&plan, &sky_chunks, &telescope, &NoBeam, &mut out).unwrap();
        let blocks = recorder.blocks.lock().unwrap();
        blocks.clone()
    };

    let threaded = run_with(false);
    let sequential = run_with(true);
    assert_eq!(threaded.len(), 3);
    assert_eq!(sequential.len(), 3);
    for ((i1, c1), (i2, c2)) in threaded.iter().zip(sequential.iter()) {
        assert_eq!(i1, i2);
        for (a, b) in c1.iter().zip(c2.iter()) {
            assert_abs_diff_eq!(*a, *b);
        }
    }
}

// ---------------------------------------------------------------------------
// Abort propagation.
// ---------------------------------------------------------------------------

/// A beam that always fails, standing in for a device operation going bad
/// mid-block.
struct FailingBeam;

impl Beam for FailingBeam {
    fn get_beam_type(&self) -> BeamType {
        BeamType::None
    }

    fn calc_jones(
        &self,
        _azel: AzEl,
        _freq_hz: f64,
        station_index: usize,
    ) -> Result<Jones<f64>, BeamError> {
        Err(BeamError::Injected { station_index })
    }
}

#[test]
fn device_error_aborts_the_run_without_further_blocks() {
    let plan = test_plan(4, 2, 1);
    let telescope = test_telescope(3);
    let sky_chunks = phase_centre_chunks(&telescope, 1.0);
    let beam = FailingBeam;

    let recorder = RecordingSink::shared();
    let mut out = OutputHandles {
        writers: vec![(PathBuf::from("memory"), Box::new(recorder.clone()))],
        station_uvws: vec![marlu::UVW::default(); telescope.num_stations()],
    };
    let result = run(&plan, &sky_chunks, &telescope, &beam, &mut out);

    assert!(matches!(result, Err(SimulateError::Model(_))));
    // The failure happened while computing block 0, so nothing was combined
    // or written.
    assert!(recorder.blocks.lock().unwrap().is_empty());
}

/// A sink that fails on a chosen block index.
struct FailingSink {
    recorder: RecordingSink,
    fail_on_block: usize,
}

impl BlockSink for FailingSink {
    fn write_block(
        &mut self,
        block: &VisBlock,
        block_index: usize,
    ) -> Result<(), crate::io::write::VisWriteError> {
        if block_index == self.fail_on_block {
            return Err(crate::io::write::VisWriteError::IO(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )));
        }
        self.recorder.write_block(block, block_index)
    }

    fn finalise(&mut self, _run_log: &str) -> Result<(), crate::io::write::VisWriteError> {
        Ok(())
    }
}

#[test]
fn write_error_aborts_without_rolling_back_written_blocks() {
    let plan = test_plan(6, 2, 1);
    let telescope = test_telescope(3);
    let sky_chunks = phase_centre_chunks(&telescope, 1.0);

    let recorder = RecordingSink::shared();
    let mut out = OutputHandles {
        writers: vec![(
            PathBuf::from("memory"),
            Box::new(FailingSink {
                recorder: recorder.clone(),
                fail_on_block: 1,
            }),
        )],
        station_uvws: vec![marlu::UVW::default(); telescope.num_stations()],
    };
    let result = run(&plan, &sky_chunks, &telescope, &NoBeam, &mut out);

    assert!(matches!(result, Err(SimulateError::VisWrite(_))));
    // Block 0 was already written and stands; block 1 failed; block 2 was
    // never attempted.
    let written = recorder.blocks.lock().unwrap();
    assert_eq!(written.len(), 1);
    assert_eq!(written[0].0, 0);
}

// ---------------------------------------------------------------------------
// Test support.
// ---------------------------------------------------------------------------

/// Records combined blocks in arrival order; clones share the record.
#[derive(Clone)]
struct RecordingSink {
    blocks: Arc<Mutex<Vec<(usize, Vec<Jones<f32>>)>>>,
}

impl RecordingSink {
    fn shared() -> RecordingSink {
        RecordingSink {
            blocks: Arc::new(Mutex::new(vec![])),
        }
    }
}

impl BlockSink for RecordingSink {
    fn write_block(
        &mut self,
        block: &VisBlock,
        block_index: usize,
    ) -> Result<(), crate::io::write::VisWriteError> {
        let num_times = block.num_times;
        self.blocks.lock().unwrap().push((
            block_index,
            block
                .cross
                .slice(ndarray::s![..num_times, .., ..])
                .iter()
                .copied()
                .collect(),
        ));
        Ok(())
    }

    fn finalise(&mut self, _run_log: &str) -> Result<(), crate::io::write::VisWriteError> {
        Ok(())
    }
}
