//! GPX loading.
//!
//! Turns `.gpx` files into [`Track`] values. Each `<trk>` becomes one track;
//! its `<trkseg>` elements become the track's segments. Timestamps are
//! normalised through [`crate::time::parse_timestamp`]. Heart rates from
//! Garmin's `TrackPointExtension` (`<ns3:hr>` or `<gpxtpx:hr>`) are attached
//! to the points they were recorded with.
//!
//! A broken file never stops a directory load: it is recorded in
//! [`LoadReport::failures`] and the remaining files are read.

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use quick_xml::events::Event;

use crate::error::{Result, TrackError};
use crate::time::parse_timestamp;
use crate::{GpsPoint, Track, TrackPoint};

/// A file that could not be read.
#[derive(Debug)]
pub struct LoadFailure {
    pub path: PathBuf,
    pub error: TrackError,
}

/// Outcome of loading a directory.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Tracks in file-name order, then document order within a file.
    pub tracks: Vec<Track>,
    pub failures: Vec<LoadFailure>,
    pub files_read: usize,
}

/// Read every `.gpx` file directly inside `dir`.
///
/// Files are visited in file-name order so the resulting collection is
/// reproducible. Subdirectories are not descended into. Only a missing or
/// unreadable directory is an error.
pub fn load_directory(dir: &Path) -> Result<LoadReport> {
    let files = list_gpx_files(dir)?;
    let total = files.len();

    if total == 0 {
        warn!("No .gpx files found in {}", dir.display());
    }

    #[cfg(feature = "parallel")]
    let results: Vec<(PathBuf, Result<Vec<Track>>)> = {
        use rayon::prelude::*;
        files
            .into_par_iter()
            .enumerate()
            .map(|(k, path)| {
                info!("Reading file {}/{}: {}", k + 1, total, path.display());
                let result = read_gpx_file(&path);
                (path, result)
            })
            .collect()
    };

    #[cfg(not(feature = "parallel"))]
    let results: Vec<(PathBuf, Result<Vec<Track>>)> = files
        .into_iter()
        .enumerate()
        .map(|(k, path)| {
            info!("Reading file {}/{}: {}", k + 1, total, path.display());
            let result = read_gpx_file(&path);
            (path, result)
        })
        .collect();

    let mut report = LoadReport {
        files_read: total,
        ..LoadReport::default()
    };

    for (path, result) in results {
        match result {
            Ok(tracks) => report.tracks.extend(tracks),
            Err(error) => {
                warn!("Skipping {}: {}", path.display(), error);
                report.failures.push(LoadFailure { path, error });
            }
        }
    }

    info!(
        "Loaded {} tracks from {} files ({} failed)",
        report.tracks.len(),
        total,
        report.failures.len()
    );

    Ok(report)
}

fn list_gpx_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| TrackError::io(dir, e))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| TrackError::io(dir, e))?.path();
        let is_gpx = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("gpx"));
        if is_gpx && path.is_file() {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

/// Read all tracks from one GPX file.
pub fn read_gpx_file(path: &Path) -> Result<Vec<Track>> {
    let file = File::open(path).map_err(|e| TrackError::io(path, e))?;
    read_gpx(BufReader::new(file), path)
}

/// Read all tracks from a GPX document.
///
/// `source` is only used to label errors and log lines.
///
/// A `<trk>` without any valid point is skipped with a warning rather than
/// failing the whole document.
pub fn read_gpx<R: Read>(mut reader: R, source: &Path) -> Result<Vec<Track>> {
    let parse_error = |message: String| TrackError::GpxParse {
        path: source.to_path_buf(),
        message,
    };

    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .map_err(|e| TrackError::io(source, e))?;

    let document = gpx::read(bytes.as_slice()).map_err(|e| parse_error(e.to_string()))?;

    let heart_rates = match read_heart_rates(&bytes) {
        Ok(rates) => rates,
        Err(e) => {
            debug!("{}: ignoring heart rates: {}", source.display(), e);
            Vec::new()
        }
    };

    let file_time = match document.metadata.as_ref().and_then(|m| m.time.as_ref()) {
        Some(time) => Some(convert_time(time).map_err(|e| parse_error(e.to_string()))?),
        None => None,
    };

    let mut tracks = Vec::with_capacity(document.tracks.len());

    for (track_index, gpx_track) in document.tracks.into_iter().enumerate() {
        let mut segments = Vec::with_capacity(gpx_track.segments.len());
        let mut dropped = 0usize;

        for (segment_index, segment) in gpx_track.segments.iter().enumerate() {
            let rates = heart_rates
                .get(track_index)
                .and_then(|t| t.get(segment_index))
                .filter(|rates| rates.len() == segment.points.len());

            let mut points = Vec::with_capacity(segment.points.len());
            for (point_index, waypoint) in segment.points.iter().enumerate() {
                let geo_point = waypoint.point();
                let position = GpsPoint::new(geo_point.y(), geo_point.x());
                if !position.is_valid() {
                    dropped += 1;
                    continue;
                }
                let time = match &waypoint.time {
                    Some(t) => Some(convert_time(t).map_err(|e| parse_error(e.to_string()))?),
                    None => None,
                };
                let mut point = TrackPoint::new(position, time);
                if let Some(bpm) = rates.and_then(|r| r[point_index]) {
                    point = point.with_heart_rate(bpm);
                }
                points.push(point);
            }
            segments.push(points);
        }

        if dropped > 0 {
            debug!("{}: dropped {} points with invalid coordinates", source.display(), dropped);
        }

        let mut track = match Track::from_segments(segments) {
            Ok(track) => track,
            Err(TrackError::EmptyTrack) => {
                warn!(
                    "{}: skipping track {:?} with no points",
                    source.display(),
                    gpx_track.name.as_deref().unwrap_or("<unnamed>")
                );
                continue;
            }
            Err(e) => return Err(e),
        };

        if let Some(name) = gpx_track.name {
            track = track.with_name(name);
        }
        if let Some(activity_type) = gpx_track.type_ {
            track = track.with_activity_type(activity_type);
        }
        if let Some(start) = file_time {
            track = track.with_start_date(start);
        }

        tracks.push(track);
    }

    Ok(tracks)
}

/// Heart rate per point, indexed by `<trk>`, `<trkseg>` and `<trkpt>` in
/// document order.
type HeartRates = Vec<Vec<Vec<Option<f64>>>>;

/// Second pass over the raw document for the extension values `gpx` skips.
///
/// Elements are matched by local name so any namespace prefix works.
fn read_heart_rates(bytes: &[u8]) -> std::result::Result<HeartRates, quick_xml::Error> {
    let mut reader = quick_xml::Reader::from_reader(bytes);
    let mut buf = Vec::new();
    let mut rates: HeartRates = Vec::new();
    let mut in_hr = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"hr" => in_hr = true,
                name => open_element(&mut rates, name),
            },
            Event::Empty(e) => open_element(&mut rates, e.local_name().as_ref()),
            Event::End(e) if e.local_name().as_ref() == b"hr" => in_hr = false,
            Event::Text(text) if in_hr => {
                let bpm = std::str::from_utf8(&text)
                    .ok()
                    .and_then(|s| s.trim().parse::<f64>().ok());
                if let Some(slot) = rates
                    .last_mut()
                    .and_then(|t| t.last_mut())
                    .and_then(|s| s.last_mut())
                {
                    *slot = bpm;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(rates)
}

fn open_element(rates: &mut HeartRates, name: &[u8]) {
    match name {
        b"trk" => rates.push(Vec::new()),
        b"trkseg" => {
            if let Some(track) = rates.last_mut() {
                track.push(Vec::new());
            }
        }
        b"trkpt" => {
            if let Some(segment) = rates.last_mut().and_then(|t| t.last_mut()) {
                segment.push(None);
            }
        }
        _ => {}
    }
}

fn convert_time(time: &gpx::Time) -> Result<DateTime<Utc>> {
    let iso = time.format().map_err(|e| TrackError::InvalidTimestamp {
        input: e.to_string(),
    })?;
    parse_timestamp(&iso)
}
