//! Map output.
//!
//! Tracks are converted to a GeoJSON `FeatureCollection` (one
//! `MultiLineString` per track, one line per segment) which is either written
//! as-is or embedded in a standalone Leaflet page over OpenStreetMap tiles.
//!
//! Tracks with heart-rate data carry a `heart_rate` property shaped like
//! their coordinates. The Leaflet page colours each step of such a track by
//! its heart rate, scaled to that track's own range.

use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{Result, TrackError};
use crate::Track;

/// Something that can draw a collection of tracks.
pub trait Renderer {
    type Output;

    /// Draw `tracks`. An empty slice is valid and must not fail.
    fn render(&mut self, tracks: &[Track]) -> Result<Self::Output>;
}

#[derive(Debug, Serialize)]
struct TrackProperties<'a> {
    name: Option<&'a str>,
    activity_type: Option<&'a str>,
    start_date: Option<String>,
    point_count: usize,
    distance_m: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    heart_rate: Option<Vec<Vec<Option<f64>>>>,
}

/// Build a GeoJSON `FeatureCollection` for `tracks`.
///
/// Coordinates are `[longitude, latitude]` as GeoJSON requires.
///
/// ```
/// use track_overlay::{tracks_to_geojson, GpsPoint, Track, TrackPoint};
///
/// let track = Track::new(vec![
///     TrackPoint::new(GpsPoint::new(51.5, -0.12), None),
///     TrackPoint::new(GpsPoint::new(51.6, -0.13), None),
/// ])
/// .unwrap();
///
/// let geojson = tracks_to_geojson(&[track]);
/// assert_eq!(geojson["features"][0]["geometry"]["coordinates"][0][1][0], -0.13);
/// ```
pub fn tracks_to_geojson(tracks: &[Track]) -> Value {
    let features: Vec<Value> = tracks.iter().map(track_feature).collect();
    json!({
        "type": "FeatureCollection",
        "features": features,
    })
}

fn track_feature(track: &Track) -> Value {
    let lines: Vec<Vec<[f64; 2]>> = track
        .segments()
        .map(|segment| {
            segment
                .iter()
                .map(|p| [p.position.longitude, p.position.latitude])
                .collect()
        })
        .collect();

    let properties = TrackProperties {
        name: track.name(),
        activity_type: track.activity_type(),
        start_date: track.start_date().map(|d| d.to_rfc3339()),
        point_count: track.points().len(),
        distance_m: track.distance_meters().round(),
        heart_rate: track.has_heart_rate().then(|| heart_rate_lines(track)),
    };

    json!({
        "type": "Feature",
        "geometry": {
            "type": "MultiLineString",
            "coordinates": lines,
        },
        "properties": properties,
    })
}

/// Heart rate per point, carried forward within a segment over points that
/// have none. Points before the first reading of a segment stay `None`.
fn heart_rate_lines(track: &Track) -> Vec<Vec<Option<f64>>> {
    track
        .segments()
        .map(|segment| {
            let mut last = None;
            segment
                .iter()
                .map(|p| {
                    if p.heart_rate.is_some() {
                        last = p.heart_rate;
                    }
                    last
                })
                .collect()
        })
        .collect()
}

// ============================================================================
// GeoJSON file
// ============================================================================

/// Writes the FeatureCollection to a file as pretty-printed JSON.
#[derive(Debug, Clone)]
pub struct GeoJsonFile {
    pub path: PathBuf,
}

impl GeoJsonFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Renderer for GeoJsonFile {
    type Output = PathBuf;

    fn render(&mut self, tracks: &[Track]) -> Result<PathBuf> {
        let body = serde_json::to_string_pretty(&tracks_to_geojson(tracks))?;
        write_output(&self.path, &body)?;
        info!("Wrote {} tracks to {}", tracks.len(), self.path.display());
        Ok(self.path.clone())
    }
}

// ============================================================================
// Leaflet HTML map
// ============================================================================

/// Line styling for the HTML map.
#[derive(Debug, Clone)]
pub struct MapStyle {
    /// Default: "map-all"
    pub title: String,
    /// Line width in pixels. Default: 4
    pub line_weight: f64,
    /// Line opacity. Default: 0.5
    pub line_opacity: f64,
    /// Colours cycled through per track. Also the low-to-high heart-rate
    /// scale.
    pub palette: Vec<String>,
    pub tile_url: String,
    pub attribution: String,
}

impl Default for MapStyle {
    fn default() -> Self {
        Self {
            title: "map-all".to_string(),
            line_weight: 4.0,
            line_opacity: 0.5,
            palette: ["#440154", "#3b528b", "#21918c", "#5ec962", "#fde725"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            tile_url: "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
            attribution: "&copy; OpenStreetMap contributors".to_string(),
        }
    }
}

/// Writes a standalone HTML page showing the tracks over OpenStreetMap.
#[derive(Debug, Clone)]
pub struct LeafletMap {
    pub path: PathBuf,
    pub style: MapStyle,
}

impl LeafletMap {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), style: MapStyle::default() }
    }

    pub fn with_style(mut self, style: MapStyle) -> Self {
        self.style = style;
        self
    }

    /// The page for `tracks`, without writing it.
    pub fn to_html(&self, tracks: &[Track]) -> Result<String> {
        let geojson = serde_json::to_string(&tracks_to_geojson(tracks))?;
        let palette = serde_json::to_string(&self.style.palette)?;
        let notice = if tracks.is_empty() {
            r#"<div id="notice">No tracks matched the selection.</div>"#
        } else {
            ""
        };

        Ok(format!(
            r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{title}</title>
<link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css">
<script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"></script>
<style>
html, body, #map {{ height: 100%; margin: 0; }}
#notice {{ position: absolute; top: 10px; left: 50px; z-index: 1000; background: white; padding: 6px 10px; font-family: sans-serif; }}
</style>
</head>
<body>
{notice}
<div id="map"></div>
<script>
var tracks = {geojson};
var palette = {palette};
var map = L.map('map').setView([0, 0], 2);
L.tileLayer({tile_url:?}, {{ attribution: {attribution:?}, maxZoom: 19 }}).addTo(map);
var group = L.featureGroup().addTo(map);
function lineStyle(colour) {{
  return {{ color: colour, weight: {weight}, opacity: {opacity} }};
}}
function describe(p) {{
  return (p.name || 'unnamed') + '<br>' + (p.activity_type || '') + '<br>' + (p.start_date || '');
}}
function scale(value, low, high) {{
  var t = high > low ? (value - low) / (high - low) : 0;
  return palette[Math.min(palette.length - 1, Math.floor(t * palette.length))];
}}
tracks.features.forEach(function (feature, index) {{
  var p = feature.properties;
  var colour = palette[index % palette.length];
  if (!p.heart_rate) {{
    L.geoJSON(feature, {{ style: lineStyle(colour) }}).bindPopup(describe(p)).addTo(group);
    return;
  }}
  var values = [].concat.apply([], p.heart_rate).filter(function (v) {{ return v !== null; }});
  var low = Math.floor(Math.min.apply(null, values));
  var high = Math.ceil(Math.max.apply(null, values));
  feature.geometry.coordinates.forEach(function (line, s) {{
    for (var i = 0; i + 1 < line.length; i++) {{
      var bpm = p.heart_rate[s][i];
      var step = [[line[i][1], line[i][0]], [line[i + 1][1], line[i + 1][0]]];
      L.polyline(step, lineStyle(bpm === null ? colour : scale(bpm, low, high)))
        .bindPopup(describe(p) + '<br>' + (bpm === null ? '' : bpm + ' bpm'))
        .addTo(group);
    }}
  }});
}});
var bounds = group.getBounds();
if (bounds.isValid()) {{ map.fitBounds(bounds); }}
</script>
</body>
</html>
"#,
            title = self.style.title,
            notice = notice,
            geojson = geojson,
            palette = palette,
            tile_url = self.style.tile_url,
            attribution = self.style.attribution,
            weight = self.style.line_weight,
            opacity = self.style.line_opacity,
        ))
    }
}

impl Renderer for LeafletMap {
    type Output = PathBuf;

    fn render(&mut self, tracks: &[Track]) -> Result<PathBuf> {
        let html = self.to_html(tracks)?;
        write_output(&self.path, &html)?;
        info!("Wrote map with {} tracks to {}", tracks.len(), self.path.display());
        Ok(self.path.clone())
    }
}

fn write_output(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).map_err(|e| TrackError::io(path, e))
}
