/*
Copyright 2024 oceanbin developers

This file is part of oceanbin.

oceanbin is a free software: you can redistribute it and/or modify
it under the terms of the GNU General Public License as published by
the Free Software Foundation; either version 3 of the License, or
(at your option) any later version.

oceanbin is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
GNU General Public License for more details.

You should have received a copy of the GNU General Public License
along with oceanbin. If not, see https://www.gnu.org/licenses/.
*/

//! Batch driver processing the files listed in the configuration.
//!
//! Every input file is read on the threadpool independently of the others.
//! A file that fails to decode is reported with `error!` and skipped,
//! the remaining files are still processed. For each file the driver
//! computes field statistics (optionally limited to a region), samples
//! the configured probe points and records the file in the metadata
//! document. Regrid jobs resample a regular-grid component file onto
//! the grid of a coordinates file and write a daily field file.
//!
//! Results are written into the output directory:
//! `probes.csv`, `stats.csv`, `metadata.json` and the regridded files.

use crate::codec::{self, DateStamp, Header};
use crate::configuration::{Config, InputFile, InputKind, Regrid};
use crate::constants::ERROR_SCALE;
use crate::errors::{ConfigError, TaskError};
use crate::grid::{locate, resample, Field, FieldStats, Grid};
use crate::sidecar::{FileRecord, GridRecord, Sidecar};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info, warn};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::Serialize;
use std::{
    fs,
    path::Path,
    sync::{mpsc, Arc},
};

/// Value of a field sampled at the grid node closest to a probe point.
#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct ProbeRow {
    pub file: String,
    pub field: &'static str,
    pub label: String,
    pub target_lon: f32,
    pub target_lat: f32,
    pub i: usize,
    pub j: usize,
    pub cell_lon: f32,
    pub cell_lat: f32,
    pub distance_km: f64,
    pub value: Option<f32>,
    pub is_valid: bool,
}

/// Statistics of one field of a file.
#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct StatsRow {
    pub file: String,
    pub field: &'static str,
    pub cropped: bool,
    pub total_cells: usize,
    pub valid_cells: usize,
    pub valid_percent: f64,
    pub min: Option<f32>,
    pub max: Option<f32>,
    pub mean: Option<f64>,
}

impl StatsRow {
    fn new(file: &str, field: &'static str, cropped: bool, stats: &FieldStats) -> Self {
        StatsRow {
            file: file.to_string(),
            field,
            cropped,
            total_cells: stats.total_cells,
            valid_cells: stats.valid_cells,
            valid_percent: stats.valid_percent(),
            min: stats.min,
            max: stats.max,
            mean: stats.mean,
        }
    }
}

/// Everything produced from a single input file.
#[derive(Clone, PartialEq, Debug)]
pub struct FileReport {
    pub record: FileRecord,
    pub stats: Vec<StatsRow>,
    pub probes: Vec<ProbeRow>,
}

/// Input file decoded to its grid and named fields.
struct Loaded {
    header: Header,
    grid: Arc<Grid>,
    fields: Vec<(&'static str, Field)>,
}

/// Main driver function, processing all files listed in the configuration.
///
/// Errors of individual files are logged and do not stop the run,
/// errors of the output or of the shared coordinates file do.
pub fn main(config: &Config) -> Result<(), TaskError> {
    info!("Preparing the output directory");
    prepare_output_dir(&config.output.directory)?;

    debug!("Setting up ThreadPool");
    let threadpool = ThreadPoolBuilder::new()
        .num_threads(config.resources.threads as usize)
        .build()?;

    let shared_grid = match &config.input.coordinates {
        Some(path) => {
            info!("Reading shared coordinates from {}", path.display());
            Some(Arc::new(codec::read_coordinates(path)?))
        }
        None => None,
    };

    let mut sidecar = Sidecar::new("Ocean surface fields converted to compact binary grids");
    set_parameters(&mut sidecar, config);

    if let (Some(path), Some(grid)) = (&config.input.coordinates, &shared_grid) {
        let (n_lat, n_lon) = grid.shape();
        sidecar.grid = Some(GridRecord {
            n_lat,
            n_lon,
            total_cells: grid.len(),
            coordinates_file: file_name(path),
        });
    }

    let reports = process_files(config, shared_grid, &threadpool);

    info!("Processed {} of {} files", reports.len(), config.input.files.len());

    let mut stats = vec![];
    let mut probes = vec![];

    for report in reports {
        sidecar.push(report.record);
        stats.extend(report.stats);
        probes.extend(report.probes);
    }

    if !config.regrid.is_empty() {
        info!("Running {} regrid jobs", config.regrid.len());

        let records: Vec<Result<FileRecord, TaskError>> = threadpool.install(|| {
            config
                .regrid
                .par_iter()
                .map(|job| run_regrid(job, config))
                .collect()
        });

        for (job, record) in config.regrid.iter().zip(records) {
            match record {
                Ok(record) => sidecar.push(record),
                Err(err) => error!("Regrid of {} failed: {}", job.source.display(), err),
            }
        }
    }

    info!("Writing output");

    let out_dir = &config.output.directory;
    save_rows(&out_dir.join("probes.csv"), &probes)?;
    save_rows(&out_dir.join("stats.csv"), &stats)?;
    sidecar.save(&out_dir.join("metadata.json"))?;

    Ok(())
}

/// Checks that the output directory is empty, creating it when missing,
/// so results of different runs are never mixed.
fn prepare_output_dir(out_path: &Path) -> Result<(), TaskError> {
    debug!("Checking and setting output directory");

    if out_path.is_dir() {
        if out_path.read_dir()?.next().is_none() {
            debug!("Output directory exists but is empty so continuing");
        } else {
            return Err(TaskError::FaultyOutput(
                "Output directory exists and is not empty",
            ));
        }
    } else {
        debug!("Output directory does not exist so creating a new one");
        fs::create_dir_all(out_path)?;
    }

    Ok(())
}

fn set_parameters(sidecar: &mut Sidecar, config: &Config) {
    let parameters = &mut sidecar.parameters;

    parameters.insert(
        "fill_value".to_string(),
        f64::from(config.resampling.fill_value),
    );
    parameters.insert("km_per_degree".to_string(), config.locator.km_per_degree);
    parameters.insert("far_node_km".to_string(), config.locator.far_node_km);
    parameters.insert("error_scale".to_string(), f64::from(ERROR_SCALE));

    if let Some(ceiling) = config.resampling.ceiling {
        parameters.insert("ceiling".to_string(), f64::from(ceiling));
    }
}

/// Deploys input files onto the threadpool and gathers their reports
/// in the order of the configuration.
fn process_files(
    config: &Config,
    shared_grid: Option<Arc<Grid>>,
    threadpool: &ThreadPool,
) -> Vec<FileReport> {
    let files_count = config.input.files.len();

    let files_bar = ProgressBar::new(files_count as u64);
    files_bar.set_style(
        ProgressStyle::default_bar()
            .template("{prefix} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}")
            .progress_chars("#>-"),
    );
    files_bar.set_prefix("Processed files");

    let config = Arc::new(config.clone());
    let (tx, rx) = mpsc::channel();

    for (index, input) in config.input.files.iter().enumerate() {
        let tx = tx.clone();
        let input = input.clone();
        let config = Arc::clone(&config);
        let shared_grid = shared_grid.clone();

        threadpool.spawn(move || {
            let report = process_file(&input, shared_grid, &config);

            if tx.send((index, input, report)).is_err() {
                error!("Receiver of file reports has been dropped");
            }
        });
    }

    // receiving ends when every worker has dropped its sender
    drop(tx);

    let mut reports = Vec::with_capacity(files_count);

    for (index, input, report) in rx {
        match report {
            Ok(report) => reports.push((index, report)),
            Err(err) => {
                error!(
                    "Processing {} failed, skipping the file: {}",
                    input.path.display(),
                    err
                );
                // make sure the message is written before the progress bar updates
                println!();
            }
        }
        files_bar.inc(1);
    }

    files_bar.finish_with_message("All files finished");

    reports.sort_by_key(|(index, _)| *index);
    reports.into_iter().map(|(_, report)| report).collect()
}

/// Reads, inspects and probes a single file.
pub fn process_file(
    input: &InputFile,
    shared_grid: Option<Arc<Grid>>,
    config: &Config,
) -> Result<FileReport, TaskError> {
    let name = file_name(&input.path);
    let loaded = load(input, shared_grid)?;

    for (field, values) in &loaded.fields {
        loaded.grid.check_field(values)?;
        debug!("{}: {} field of shape {:?}", name, field, values.dim());
    }

    let stats = field_stats(&name, &loaded, config);
    let probes = sample_probes(&name, &loaded, config)?;

    let record = FileRecord::new(&name, &loaded.header, Some(loaded.grid.as_ref()));

    Ok(FileReport {
        record,
        stats,
        probes,
    })
}

fn load(input: &InputFile, shared_grid: Option<Arc<Grid>>) -> Result<Loaded, TaskError> {
    let loaded = match input.kind {
        InputKind::Coordinates => {
            let grid = codec::read_coordinates(&input.path)?;
            let (n_lat, n_lon) = grid.shape();

            Loaded {
                header: Header::Coordinates { n_lat, n_lon },
                grid: Arc::new(grid),
                fields: vec![],
            }
        }
        InputKind::Daily => {
            let grid = shared_grid.ok_or(ConfigError::OutOfBounds(
                "Daily files require a coordinates file",
            ))?;
            let shape = grid.shape();

            let daily = match input.legacy_compression {
                Some(compression) => codec::read_daily_legacy(&input.path, shape, compression)?,
                None => codec::read_daily(&input.path, shape)?,
            };

            Loaded {
                header: Header::Daily {
                    shape,
                    date: daily.date,
                    encoding: daily.encoding,
                },
                grid,
                fields: vec![("values", daily.values)],
            }
        }
        InputKind::Currents => {
            let currents = codec::read_currents(&input.path)?;
            let (n_lat, n_lon) = currents.grid.shape();

            Loaded {
                header: Header::Currents {
                    n_lat,
                    n_lon,
                    date: currents.date,
                },
                grid: Arc::new(currents.grid),
                fields: vec![("u", currents.u), ("v", currents.v)],
            }
        }
        InputKind::Component => {
            let component = codec::read_component(&input.path)?;
            let (n_lat, n_lon) = component.grid.shape();

            Loaded {
                header: Header::Component { n_lat, n_lon },
                grid: Arc::new(component.grid),
                fields: vec![("values", component.values)],
            }
        }
    };

    Ok(loaded)
}

fn field_stats(name: &str, loaded: &Loaded, config: &Config) -> Vec<StatsRow> {
    let window = match &config.region {
        Some(region) => {
            let window = loaded.grid.crop(region);

            if window.is_none() {
                warn!("{}: no grid node inside the region, using the whole grid", name);
            }

            window
        }
        None => None,
    };

    loaded
        .fields
        .iter()
        .map(|(field, values)| {
            let stats = match &window {
                Some(window) => FieldStats::new(&window.apply(values)),
                None => FieldStats::new(values),
            };

            info!(
                "{}: {} has {:.1}% valid cells",
                name,
                field,
                stats.valid_percent()
            );

            StatsRow::new(name, *field, window.is_some(), &stats)
        })
        .collect()
}

fn sample_probes(name: &str, loaded: &Loaded, config: &Config) -> Result<Vec<ProbeRow>, TaskError> {
    let mut rows = vec![];

    if loaded.fields.is_empty() {
        return Ok(rows);
    }

    for probe in &config.probes {
        let located = locate(&loaded.grid, probe.lon, probe.lat, &config.locator)?;

        if located.is_far(&config.locator) {
            warn!(
                "{}: closest node to {} is {:.1} km away",
                name, probe.label, located.distance_km
            );
        }

        for (field, values) in &loaded.fields {
            rows.push(ProbeRow {
                file: name.to_string(),
                field: *field,
                label: probe.label.clone(),
                target_lon: probe.lon,
                target_lat: probe.lat,
                i: located.i,
                j: located.j,
                cell_lon: loaded.grid.lon()[[located.i, located.j]],
                cell_lat: loaded.grid.lat()[[located.i, located.j]],
                distance_km: located.distance_km,
                value: located.value(values),
                is_valid: located.is_valid(values),
            });
        }
    }

    Ok(rows)
}

/// Resamples a regular-grid component file onto the target grid
/// and writes it as a daily field file.
///
/// The written file is read back and checked against its metadata record.
pub fn run_regrid(job: &Regrid, config: &Config) -> Result<FileRecord, TaskError> {
    debug!("Regridding {} onto {}", job.source.display(), job.target.display());

    let source = codec::read_component(&job.source)?;
    let axes = source.grid.regular_axes()?;
    let target = codec::read_coordinates(&job.target)?;

    let values = resample(&source.values, &axes, &target, &config.resampling)?;

    let out_path = config.output.directory.join(&job.output);
    let header = codec::write_daily(&out_path, DateStamp::from(job.date), &values, job.compression)?;
    let record = FileRecord::new(&job.output, &header, Some(&target));

    let written = codec::read_daily(&out_path, target.shape())?;
    record.check_header(&Header::Daily {
        shape: target.shape(),
        date: written.date,
        encoding: written.encoding,
    })?;

    info!("Written {}", out_path.display());

    Ok(record)
}

fn save_rows<T: Serialize>(out_path: &Path, rows: &[T]) -> Result<(), TaskError> {
    debug!("Saving {} rows to {}", rows.len(), out_path.display());

    let mut out_file = csv::Writer::from_path(out_path)?;

    for row in rows {
        out_file.serialize(row)?;
    }

    out_file.flush()?;

    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::{main, process_file, run_regrid};
    use crate::codec::{self, Component, Compression, Currents, DateStamp};
    use crate::configuration::{Config, InputFile, InputKind, Probe, Regrid};
    use crate::errors::{GridFileError, TaskError};
    use crate::grid::{Grid, Region};
    use crate::sidecar::{RecordKind, Sidecar};
    use chrono::NaiveDate;
    use float_cmp::approx_eq;
    use ndarray::{array, Array2};
    use std::path::Path;
    use std::sync::Arc;

    fn base_config(out_dir: &Path) -> Config {
        let yaml = format!(
            "input:\n  files: []\noutput:\n  directory: {}\n",
            out_dir.display()
        );

        Config::new_from_slice(yaml.as_bytes()).unwrap()
    }

    fn input(path: &Path, kind: InputKind) -> InputFile {
        InputFile {
            path: path.to_path_buf(),
            kind,
            legacy_compression: None,
        }
    }

    #[test]
    fn currents_are_probed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("currents_2011_03.bin");

        let currents = Currents {
            date: DateStamp::monthly(2011, 3),
            grid: Grid::from_axes(&[140.0, 141.0, 142.0], &[37.0, 38.0]),
            u: array![[0.1, 0.2, f32::NAN], [0.4, 0.5, 0.6]],
            v: array![[-0.1, -0.2, f32::NAN], [-0.4, -0.5, -0.6]],
        };
        codec::write_currents(&path, &currents).unwrap();

        let mut config = base_config(&dir.path().join("output"));
        config.probes = vec![
            Probe {
                label: "coast".to_string(),
                lon: 141.9,
                lat: 37.2,
            },
            Probe {
                label: "offshore".to_string(),
                lon: 141.1,
                lat: 37.9,
            },
        ];

        let report = process_file(&input(&path, InputKind::Currents), None, &config).unwrap();

        assert_eq!(report.record.kind, RecordKind::Currents);
        assert_eq!(report.stats.len(), 2);
        assert_eq!(report.stats[0].valid_cells, 5);
        assert_eq!(report.probes.len(), 4);

        let coast = &report.probes[0];
        assert_eq!((coast.i, coast.j), (0, 2));
        assert!(!coast.is_valid);

        let offshore_v = &report.probes[3];
        assert_eq!(offshore_v.field, "v");
        assert_eq!(offshore_v.value, Some(-0.5));
        assert!(approx_eq!(
            f64,
            offshore_v.distance_km,
            (0.02f64).sqrt() * 111.0,
            epsilon = 1e-2
        ));
    }

    #[test]
    fn daily_uses_shared_grid_and_region() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eke_20110311.bin");

        let grid = Grid::from_axes(&[0.0, 1.0, 2.0], &[0.0, 1.0]);
        let values = array![[1.0, 2.0, 3.0], [4.0, f32::NAN, 6.0]];
        codec::write_daily(
            &path,
            DateStamp::from(NaiveDate::from_ymd(2011, 3, 11)),
            &values,
            Compression::Half,
        )
        .unwrap();

        let mut config = base_config(&dir.path().join("output"));
        config.region = Some(Region {
            west: 0.5,
            east: 2.0,
            south: 0.0,
            north: 1.0,
        });

        let report = process_file(
            &input(&path, InputKind::Daily),
            Some(Arc::new(grid)),
            &config,
        )
        .unwrap();

        let stats = &report.stats[0];
        assert!(stats.cropped);
        assert_eq!(stats.total_cells, 4);
        assert_eq!(stats.valid_cells, 3);
        assert_eq!(stats.max, Some(6.0));

        assert_eq!(report.record.date.as_deref(), Some("2011-03-11"));
        assert_eq!(report.record.compression, Compression::Half);

        let missing = process_file(&input(&path, InputKind::Daily), None, &config);
        assert!(matches!(missing, Err(TaskError::Config(_))));
    }

    #[test]
    fn regrid_writes_checked_daily_file() {
        let dir = tempfile::tempdir().unwrap();
        let source_path = dir.path().join("k_regular.bin");
        let target_path = dir.path().join("coords.bin");
        let out_dir = dir.path().join("output");
        std::fs::create_dir(&out_dir).unwrap();

        let source_grid = Grid::from_axes(&[0.0, 1.0, 2.0], &[0.0, 1.0, 2.0]);
        let source_values = Array2::from_shape_fn((3, 3), |(i, j)| (i + j) as f32);
        codec::write_component(
            &source_path,
            &Component {
                grid: source_grid,
                values: source_values,
            },
        )
        .unwrap();

        let target = Grid::new(
            array![[0.5, 1.5], [0.5, 5.0]],
            array![[0.5, 0.5], [1.5, 1.5]],
        )
        .unwrap();
        codec::write_coordinates(&target_path, &target).unwrap();

        let config = base_config(&out_dir);
        let job = Regrid {
            source: source_path,
            target: target_path,
            date: NaiveDate::from_ymd(2011, 3, 11),
            output: "eke_20110311.bin".to_string(),
            compression: Compression::None,
        };

        let record = run_regrid(&job, &config).unwrap();
        assert_eq!(record.kind, RecordKind::Daily);
        assert_eq!(record.grid_shape, [2, 2]);

        let daily = codec::read_daily(&out_dir.join("eke_20110311.bin"), (2, 2)).unwrap();
        assert_eq!(daily.values, array![[1.0, 2.0], [2.0, 0.0]]);
    }

    #[test]
    fn run_skips_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("component.bin");
        let broken = dir.path().join("broken.bin");
        let out_dir = dir.path().join("output");

        codec::write_component(
            &good,
            &Component {
                grid: Grid::from_axes(&[0.0, 1.0], &[0.0, 1.0]),
                values: array![[1.0, 2.0], [3.0, 4.0]],
            },
        )
        .unwrap();
        std::fs::write(&broken, [2u8, 0, 0, 0, 9]).unwrap();

        let mut config = base_config(&out_dir);
        config.input.files = vec![
            input(&broken, InputKind::Component),
            input(&good, InputKind::Component),
        ];
        config.probes = vec![Probe {
            label: "corner".to_string(),
            lon: 0.9,
            lat: 0.9,
        }];

        main(&config).unwrap();

        let sidecar = Sidecar::load(&out_dir.join("metadata.json")).unwrap();
        assert_eq!(sidecar.files.len(), 1);
        assert_eq!(sidecar.files[0].file, "component.bin");

        let mut reader = csv::Reader::from_path(out_dir.join("probes.csv")).unwrap();
        let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(&rows[0][2], "corner");
        assert_eq!(rows[0][10].parse::<f32>().unwrap(), 4.0);
        assert_eq!(&rows[0][11], "true");

        assert!(matches!(
            codec::read_component(&broken),
            Err(GridFileError::TruncatedFile { .. })
        ));

        // a second run must not mix results with the previous one
        assert!(matches!(main(&config), Err(TaskError::FaultyOutput(_))));
    }
}
