// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The measurement-set sink, backed by Marlu.

use std::path::{Path, PathBuf};

use log::debug;
use marlu::{History, MeasurementSetWriter, ObsContext as MarluObsContext, VisContext, VisWrite};
use ndarray::prelude::*;

use super::{ObsMeta, VisWriteError};
use crate::vis::VisBlock;

pub(crate) struct MeasurementSetSink {
    writer: MeasurementSetWriter,
    path: PathBuf,
    meta: ObsMeta,
    vis_ctx: VisContext,
    initialised: bool,
}

impl MeasurementSetSink {
    pub(crate) fn new(path: &Path, meta: &ObsMeta) -> MeasurementSetSink {
        let writer = MeasurementSetWriter::new(
            path,
            meta.phase_centre,
            meta.array_position,
            meta.station_positions.clone(),
            meta.dut1,
            false,
        );
        let vis_ctx = VisContext {
            num_sel_timesteps: meta.total_times,
            start_timestamp: meta.start_time,
            int_time: meta.time_res,
            num_sel_chans: meta.num_channels,
            start_freq_hz: meta.freq_start_hz,
            freq_resolution_hz: meta.freq_inc_hz,
            sel_baselines: meta.baseline_pairs.clone(),
            avg_time: 1,
            avg_freq: 1,
            num_vis_pols: 4,
        };
        MeasurementSetSink {
            writer,
            path: path.to_path_buf(),
            meta: meta.clone(),
            vis_ctx,
            initialised: false,
        }
    }

    fn initialise(&mut self) -> Result<(), VisWriteError> {
        debug!("Initialising measurement set {}", self.path.display());
        let meta = &self.meta;
        let (s_lat, c_lat) = meta.array_position.latitude_rad.sin_cos();
        let obs_ctx = MarluObsContext {
            sched_start_timestamp: meta.start_time,
            sched_duration: meta.time_res * meta.total_times as i64,
            name: None,
            phase_centre: meta.phase_centre,
            pointing_centre: None,
            array_pos: meta.array_position,
            ant_positions_enh: meta
                .station_positions
                .iter()
                .map(|xyz| xyz.to_enh_inner(s_lat, c_lat))
                .collect(),
            ant_names: meta.station_names.clone(),
            field_name: None,
            project_id: None,
            observer: None,
        };

        // It's possible that the command-line call has invalid UTF-8. So use
        // args_os and attempt to convert to UTF-8 strings. If there are
        // problems on the way, don't bother trying to write the CMDLINE key.
        let cmd_line = std::env::args_os()
            .map(|a| a.into_string())
            .collect::<Result<Vec<String>, _>>()
            .map(|v| v.join(" "))
            .ok();
        let history = History {
            application: Some("visgen"),
            cmd_line: cmd_line.as_deref(),
            message: None,
        };
        self.writer
            .initialize(&self.vis_ctx, &obs_ctx, Some(&history))?;
        Ok(())
    }
}

impl super::BlockSink for MeasurementSetSink {
    fn write_block(&mut self, block: &VisBlock, block_index: usize) -> Result<(), VisWriteError> {
        if !self.initialised {
            self.initialise()?;
            self.initialised = true;
        }

        debug!("Writing block {block_index} to the measurement set");
        let num_times = block.num_times;
        let chunk_vis_ctx = VisContext {
            start_timestamp: self.meta.start_time
                + self.meta.time_res * block.start_time_index as i64,
            num_sel_timesteps: num_times,
            ..self.vis_ctx.clone()
        };

        let data_tfb = block.cross.slice(s![..num_times, .., ..]);
        let weights_tfb = Array3::from_elem(data_tfb.dim(), 1.0f32);
        self.writer
            .write_vis(data_tfb, weights_tfb.view(), &chunk_vis_ctx)?;
        Ok(())
    }

    fn finalise(&mut self, _run_log: &str) -> Result<(), VisWriteError> {
        // A run with zero blocks still produces a valid, empty measurement
        // set.
        if !self.initialised {
            self.initialise()?;
            self.initialised = true;
        }
        self.writer.finalise()?;
        Ok(())
    }
}
