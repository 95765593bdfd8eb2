//! # Track Overlay
//!
//! Select recorded GPS activities and overlay them on a web map.
//!
//! This library provides:
//! - GPX loading into immutable [`Track`] values
//! - Date and activity-type selection
//! - Removal of far-away outlier tracks (holidays, trips abroad)
//! - GeoJSON and Leaflet HTML output
//!
//! ## Features
//!
//! - **`parallel`** - Parse GPX files in parallel with rayon
//! - **`cli`** - Build the `track-overlay` command line tool (default)
//!
//! ## Quick Start
//!
//! ```rust
//! use track_overlay::{GpsPoint, Track, TrackPoint, PipelineConfig, pipeline};
//!
//! let morning_run = Track::new(vec![
//!     TrackPoint::new(GpsPoint::new(51.5074, -0.1278), None),
//!     TrackPoint::new(GpsPoint::new(51.5080, -0.1290), None),
//! ])
//! .unwrap()
//! .with_activity_type("running");
//!
//! let mut config = PipelineConfig::default();
//! config.criteria.activities.insert("running".to_string());
//!
//! let selected = pipeline::run(vec![morning_run], &config);
//! assert_eq!(selected.len(), 1);
//! ```

use chrono::{DateTime, Utc};
use std::ops::Range;

pub mod error;
pub use error::{Result, TrackError};

pub mod geo_utils;
pub mod time;

// Parsing collaborator
pub mod gpx_reader;
pub use gpx_reader::{load_directory, read_gpx, read_gpx_file, LoadFailure, LoadReport};

pub mod selector;
pub use selector::{select, SelectionCriteria};

pub mod outliers;
pub use outliers::{detect_outliers, remove_outliers, OutlierConfig, OutlierMethod, OutlierReport};

pub mod pipeline;
pub use pipeline::PipelineConfig;

// Rendering collaborator
pub mod render;
pub use render::{tracks_to_geojson, GeoJsonFile, LeafletMap, MapStyle, Renderer};

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use track_overlay::GpsPoint;
/// let point = GpsPoint::new(51.5074, -0.1278); // London
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// Bounding box of a set of points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from GPS points.
    pub fn from_points(points: &[GpsPoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        Some(geo_utils::compute_bounds(points))
    }

    /// Get the center point of the bounds.
    pub fn center(&self) -> GpsPoint {
        GpsPoint::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }

    /// Half the diagonal of the box, in meters.
    pub fn radius_meters(&self) -> f64 {
        let south_west = GpsPoint::new(self.min_lat, self.min_lng);
        let north_east = GpsPoint::new(self.max_lat, self.max_lng);
        geo_utils::haversine_distance(&south_west, &north_east) / 2.0
    }
}

/// One recorded fix along an activity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackPoint {
    pub position: GpsPoint,
    /// Normalised to UTC; absent when the source had no `<time>`.
    pub time: Option<DateTime<Utc>>,
    /// Beats per minute from a Garmin `TrackPointExtension`, if recorded.
    pub heart_rate: Option<f64>,
}

impl TrackPoint {
    pub fn new(position: GpsPoint, time: Option<DateTime<Utc>>) -> Self {
        Self { position, time, heart_rate: None }
    }

    pub fn with_heart_rate(mut self, bpm: f64) -> Self {
        self.heart_rate = Some(bpm);
        self
    }
}

/// One recorded activity.
///
/// A `Track` always holds at least one point; [`Track::new`] refuses an
/// empty sequence. Tracks are never mutated once built: selection and outlier
/// removal only decide which tracks survive.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    name: Option<String>,
    activity_type: Option<String>,
    start_date: Option<DateTime<Utc>>,
    points: Vec<TrackPoint>,
    /// Indices into `points` where a new GPX segment begins (never 0).
    segment_starts: Vec<usize>,
}

/// The working set handed from stage to stage. Order is preserved.
pub type TrackCollection = Vec<Track>;

impl Track {
    /// Build a single-segment track.
    ///
    /// The start date defaults to the timestamp of the first point that has
    /// one. Returns [`TrackError::EmptyTrack`] for an empty sequence.
    pub fn new(points: Vec<TrackPoint>) -> Result<Self> {
        Self::from_segments(vec![points])
    }

    /// Build a track from several segments, concatenated in order.
    /// Empty segments are dropped.
    pub fn from_segments(segments: Vec<Vec<TrackPoint>>) -> Result<Self> {
        let mut points = Vec::new();
        let mut segment_starts = Vec::new();

        for segment in segments.into_iter().filter(|s| !s.is_empty()) {
            if !points.is_empty() {
                segment_starts.push(points.len());
            }
            points.extend(segment);
        }

        if points.is_empty() {
            return Err(TrackError::EmptyTrack);
        }

        let start_date = points.iter().find_map(|p| p.time);

        Ok(Self {
            name: None,
            activity_type: None,
            start_date,
            points,
            segment_starts,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_activity_type(mut self, activity_type: impl Into<String>) -> Self {
        self.activity_type = Some(activity_type.into());
        self
    }

    /// Override the start date (e.g. from GPX `<metadata><time>`).
    pub fn with_start_date(mut self, start_date: DateTime<Utc>) -> Self {
        self.start_date = Some(start_date);
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn activity_type(&self) -> Option<&str> {
        self.activity_type.as_deref()
    }

    pub fn start_date(&self) -> Option<DateTime<Utc>> {
        self.start_date
    }

    pub fn points(&self) -> &[TrackPoint] {
        &self.points
    }

    /// Positions only, in recorded order.
    pub fn positions(&self) -> Vec<GpsPoint> {
        self.points.iter().map(|p| p.position).collect()
    }

    /// Iterate over the recorded segments.
    pub fn segments(&self) -> impl Iterator<Item = &[TrackPoint]> + '_ {
        self.segment_ranges().map(move |r| &self.points[r])
    }

    fn segment_ranges(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        let starts = std::iter::once(0).chain(self.segment_starts.iter().copied());
        let ends = self
            .segment_starts
            .iter()
            .copied()
            .chain(std::iter::once(self.points.len()));
        starts.zip(ends).map(|(start, end)| start..end)
    }

    /// Mean position of all points.
    pub fn center(&self) -> GpsPoint {
        geo_utils::compute_center(&self.positions())
    }

    pub fn bounds(&self) -> Bounds {
        geo_utils::compute_bounds(&self.positions())
    }

    /// Length in meters, summed per segment (no jump between segments).
    pub fn distance_meters(&self) -> f64 {
        self.segments()
            .map(|segment| {
                let positions: Vec<GpsPoint> = segment.iter().map(|p| p.position).collect();
                geo_utils::polyline_length(&positions)
            })
            .sum()
    }

    /// Whether any point carries a heart rate.
    pub fn has_heart_rate(&self) -> bool {
        self.points.iter().any(|p| p.heart_rate.is_some())
    }

    /// Name for log lines.
    pub fn label(&self) -> &str {
        self.name().unwrap_or("<unnamed>")
    }
}

// ============================================================================
// Tests
// ============================================================================
