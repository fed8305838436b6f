// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Summarise the contents of a binary visibility file.

use std::path::PathBuf;

use clap::Parser;
use log::info;

use super::VisgenError;
use crate::io::write::read_binary;

#[derive(Parser, Debug)]
pub(super) struct VisInfoArgs {
    /// Path to the binary visibility file.
    #[clap(name = "VIS_FILE", parse(from_os_str))]
    vis_file: PathBuf,

    /// Also print the run log embedded in the file.
    #[clap(long)]
    show_log: bool,
}

impl VisInfoArgs {
    pub(super) fn run(self) -> Result<(), VisgenError> {
        let contents = read_binary(&self.vis_file)?;

        info!("{}:", self.vis_file.display());
        info!(
            "  {} stations, {} baselines, {} channels, {} time steps",
            contents.num_stations,
            contents.num_baselines,
            contents.num_channels,
            contents.total_times
        );
        info!("  {} visibility block(s)", contents.blocks.len());
        for block in &contents.blocks {
            let autos = match &block.autos {
                Some(_) => ", with autos",
                None => "",
            };
            info!(
                "    block {}: times {}..{}{autos}",
                block.block_index,
                block.start_time_index,
                block.start_time_index + block.num_times,
            );
        }
        if self.show_log && !contents.run_log.is_empty() {
            info!("Embedded run log:");
            for line in contents.run_log.lines() {
                info!("  {line}");
            }
        }
        Ok(())
    }
}
