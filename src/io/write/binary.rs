// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The flat binary visibility format.
//!
//! A little-endian stream of records: a header record (written when the
//! first block arrives), one record per visibility block, and a final
//! run-log record written at finalisation. Visibilities are stored as
//! 4-polarisation single-precision complex values in
//! `[time][channel][baseline]` order, preceded by the block's baseline
//! (u,v,w) coordinates.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::debug;
use marlu::{Jones, UVW};
use ndarray::prelude::*;

use super::{ObsMeta, VisWriteError};
use crate::vis::VisBlock;

const MAGIC: &[u8; 8] = b"VISGEN\0\0";
const FORMAT_VERSION: u32 = 1;

const RECORD_BLOCK: u8 = 1;
const RECORD_LOG: u8 = 2;

pub(crate) struct BinaryFileSink {
    file: BufWriter<File>,
    meta: ObsMeta,
    wrote_header: bool,
}

impl BinaryFileSink {
    pub(crate) fn new(path: &Path, meta: &ObsMeta) -> Result<BinaryFileSink, VisWriteError> {
        let file = BufWriter::new(File::create(path)?);
        Ok(BinaryFileSink {
            file,
            meta: meta.clone(),
            wrote_header: false,
        })
    }

    fn write_header(&mut self) -> Result<(), VisWriteError> {
        let meta = &self.meta;
        self.file.write_all(MAGIC)?;
        self.file.write_u32::<LittleEndian>(FORMAT_VERSION)?;
        self.file
            .write_u64::<LittleEndian>(meta.num_stations() as u64)?;
        self.file
            .write_u64::<LittleEndian>(meta.num_baselines() as u64)?;
        self.file
            .write_u64::<LittleEndian>(meta.num_channels as u64)?;
        self.file
            .write_u64::<LittleEndian>(meta.total_times as u64)?;
        self.file
            .write_u64::<LittleEndian>(meta.block_capacity as u64)?;
        self.file
            .write_u8(if meta.write_autos { 1 } else { 0 })?;
        self.file
            .write_f64::<LittleEndian>(meta.start_time.to_gpst_seconds())?;
        self.file
            .write_f64::<LittleEndian>(meta.time_res.to_seconds())?;
        self.file.write_f64::<LittleEndian>(meta.freq_start_hz)?;
        self.file.write_f64::<LittleEndian>(meta.freq_inc_hz)?;
        Ok(())
    }
}

impl super::BlockSink for BinaryFileSink {
    fn write_block(&mut self, block: &VisBlock, block_index: usize) -> Result<(), VisWriteError> {
        if !self.wrote_header {
            self.write_header()?;
            self.wrote_header = true;
        }

        debug!("Writing block {block_index} to the binary file");
        let num_times = block.num_times;
        self.file.write_u8(RECORD_BLOCK)?;
        self.file.write_u64::<LittleEndian>(block_index as u64)?;
        self.file
            .write_u64::<LittleEndian>(block.start_time_index as u64)?;
        self.file.write_u64::<LittleEndian>(num_times as u64)?;

        for uvw in block.uvws.slice(s![..num_times, ..]).iter() {
            self.file.write_f64::<LittleEndian>(uvw.u)?;
            self.file.write_f64::<LittleEndian>(uvw.v)?;
            self.file.write_f64::<LittleEndian>(uvw.w)?;
        }
        write_jones(&mut self.file, block.cross.slice(s![..num_times, .., ..]))?;
        if let Some(autos) = block.autos.as_ref() {
            write_jones(&mut self.file, autos.slice(s![..num_times, .., ..]))?;
        }
        Ok(())
    }

    fn finalise(&mut self, run_log: &str) -> Result<(), VisWriteError> {
        // An empty file with no blocks still gets its header.
        if !self.wrote_header {
            self.write_header()?;
            self.wrote_header = true;
        }
        self.file.write_u8(RECORD_LOG)?;
        self.file
            .write_u64::<LittleEndian>(run_log.len() as u64)?;
        self.file.write_all(run_log.as_bytes())?;
        self.file.flush()?;
        Ok(())
    }
}

fn write_jones(
    file: &mut BufWriter<File>,
    vis: ArrayView3<Jones<f32>>,
) -> Result<(), VisWriteError> {
    for jones in vis.iter() {
        for pol in 0..4 {
            file.write_f32::<LittleEndian>(jones[pol].re)?;
            file.write_f32::<LittleEndian>(jones[pol].im)?;
        }
    }
    Ok(())
}

/// A block as read back from a binary visibility file.
pub(crate) struct BinaryBlock {
    pub(crate) block_index: usize,
    pub(crate) start_time_index: usize,
    pub(crate) num_times: usize,
    pub(crate) uvws: Array2<UVW>,
    pub(crate) cross: Array3<Jones<f32>>,
    pub(crate) autos: Option<Array3<Jones<f32>>>,
}

/// The contents of a binary visibility file.
pub(crate) struct BinaryContents {
    pub(crate) num_stations: usize,
    pub(crate) num_baselines: usize,
    pub(crate) num_channels: usize,
    pub(crate) total_times: usize,
    pub(crate) blocks: Vec<BinaryBlock>,
    pub(crate) run_log: String,
}

/// Read a binary visibility file back in. Used by inspection tooling and
/// tests; simulation never reads its own output.
pub(crate) fn read_binary(path: &Path) -> Result<BinaryContents, VisWriteError> {
    let mut file = BufReader::new(File::open(path)?);

    let mut magic = [0u8; 8];
    file.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(VisWriteError::CorruptBinaryFile("bad magic"));
    }
    if file.read_u32::<LittleEndian>()? != FORMAT_VERSION {
        return Err(VisWriteError::CorruptBinaryFile("unsupported version"));
    }
    let num_stations = file.read_u64::<LittleEndian>()? as usize;
    let num_baselines = file.read_u64::<LittleEndian>()? as usize;
    let num_channels = file.read_u64::<LittleEndian>()? as usize;
    let total_times = file.read_u64::<LittleEndian>()? as usize;
    let _block_capacity = file.read_u64::<LittleEndian>()? as usize;
    let has_autos = file.read_u8()? != 0;
    let _start_time_gps = file.read_f64::<LittleEndian>()?;
    let _time_res_s = file.read_f64::<LittleEndian>()?;
    let _freq_start_hz = file.read_f64::<LittleEndian>()?;
    let _freq_inc_hz = file.read_f64::<LittleEndian>()?;

    let mut blocks = vec![];
    let mut run_log = String::new();
    loop {
        let tag = match file.read_u8() {
            Ok(tag) => tag,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        };
        match tag {
            RECORD_BLOCK => {
                let block_index = file.read_u64::<LittleEndian>()? as usize;
                let start_time_index = file.read_u64::<LittleEndian>()? as usize;
                let num_times = file.read_u64::<LittleEndian>()? as usize;

                let mut uvws = Array2::from_elem((num_times, num_baselines), UVW::default());
                for uvw in uvws.iter_mut() {
                    uvw.u = file.read_f64::<LittleEndian>()?;
                    uvw.v = file.read_f64::<LittleEndian>()?;
                    uvw.w = file.read_f64::<LittleEndian>()?;
                }
                let cross = read_jones(&mut file, (num_times, num_channels, num_baselines))?;
                let autos = has_autos
                    .then(|| read_jones(&mut file, (num_times, num_channels, num_stations)))
                    .transpose()?;
                blocks.push(BinaryBlock {
                    block_index,
                    start_time_index,
                    num_times,
                    uvws,
                    cross,
                    autos,
                });
            }
            RECORD_LOG => {
                let len = file.read_u64::<LittleEndian>()? as usize;
                let mut bytes = vec![0u8; len];
                file.read_exact(&mut bytes)?;
                run_log = String::from_utf8(bytes)
                    .map_err(|_| VisWriteError::CorruptBinaryFile("run log is not UTF-8"))?;
            }
            _ => return Err(VisWriteError::CorruptBinaryFile("unknown record tag")),
        }
    }

    Ok(BinaryContents {
        num_stations,
        num_baselines,
        num_channels,
        total_times,
        blocks,
        run_log,
    })
}

fn read_jones(
    file: &mut BufReader<File>,
    shape: (usize, usize, usize),
) -> Result<Array3<Jones<f32>>, VisWriteError> {
    let mut vis = Array3::default(shape);
    for jones in vis.iter_mut() {
        let mut j: Jones<f32> = *jones;
        for pol in 0..4 {
            let re = file.read_f32::<LittleEndian>()?;
            let im = file.read_f32::<LittleEndian>()?;
            j[pol] = num_complex::Complex32::new(re, im);
        }
        *jones = j;
    }
    Ok(vis)
}
