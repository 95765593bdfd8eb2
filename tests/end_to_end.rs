//! Load GPX files from disk, select, drop outliers and render.

use std::fs;
use std::path::Path;

use serde_json::Value;
use tempfile::TempDir;
use track_overlay::pipeline::{run, run_and_render};
use track_overlay::time::parse_timestamp;
use track_overlay::{load_directory, GeoJsonFile, LeafletMap, PipelineConfig};

/// A GPX document with one track of four points starting at (lat, lon).
fn gpx(name: &str, activity: &str, time: &str, lat: f64, lon: f64) -> String {
    let points: String = (0..4)
        .map(|k| {
            format!(
                r#"<trkpt lat="{:.6}" lon="{:.6}"><time>{}</time></trkpt>"#,
                lat + k as f64 * 0.0002,
                lon,
                time
            )
        })
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="end-to-end" xmlns="http://www.topografix.com/GPX/1/1">
  <metadata><time>{time}</time></metadata>
  <trk>
    <name>{name}</name>
    <type>{activity}</type>
    <trkseg>{points}</trkseg>
  </trk>
</gpx>"#
    )
}

/// `clustered` tracks within ~1km of central London plus one ~500km away.
fn write_fixture(dir: &Path, clustered: usize) {
    for i in 0..clustered {
        let body = gpx(
            &format!("home-{i:02}"),
            "running",
            "2023-05-01T08:00:00.000Z",
            51.5000 + i as f64 * 0.0008,
            -0.1200,
        );
        fs::write(dir.join(format!("home-{i:02}.gpx")), body).unwrap();
    }
    let trip = gpx("trip", "running", "2023-06-01T08:00:00Z", 51.5, 7.0);
    fs::write(dir.join("zz-trip.gpx"), trip).unwrap();
}

fn feature_names(geojson: &Value) -> Vec<String> {
    geojson["features"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["properties"]["name"].as_str().unwrap().to_string())
        .collect()
}

#[test]
fn one_far_track_of_eleven_is_dropped_from_the_map() {
    let input = TempDir::new().unwrap();
    write_fixture(input.path(), 10);
    fs::write(input.path().join("broken.gpx"), "<gpx").unwrap();

    let report = load_directory(input.path()).unwrap();
    assert_eq!(report.tracks.len(), 11);
    assert_eq!(report.failures.len(), 1);

    let output = TempDir::new().unwrap();
    let path = output.path().join("tracks.geojson");
    let config = PipelineConfig { filter_outliers: true, ..PipelineConfig::default() };
    run_and_render(report.tracks, &config, &mut GeoJsonFile::new(&path)).unwrap();

    let geojson: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    let names = feature_names(&geojson);
    assert_eq!(names.len(), 10);
    assert!(names.iter().all(|n| n.starts_with("home-")));
}

#[test]
fn one_far_track_of_ten_is_kept() {
    let input = TempDir::new().unwrap();
    write_fixture(input.path(), 9);

    let report = load_directory(input.path()).unwrap();
    let config = PipelineConfig { filter_outliers: true, ..PipelineConfig::default() };
    let tracks = run(report.tracks, &config);

    assert_eq!(tracks.len(), 10);
    assert_eq!(tracks.last().unwrap().name(), Some("trip"));
}

#[test]
fn since_after_every_track_renders_an_empty_map() {
    let input = TempDir::new().unwrap();
    write_fixture(input.path(), 3);

    let mut config = PipelineConfig { filter_outliers: true, ..PipelineConfig::default() };
    config.criteria.since = Some(parse_timestamp("2024-01-01").unwrap());

    let output = TempDir::new().unwrap();
    let path = output.path().join("map-all.html");
    let report = load_directory(input.path()).unwrap();
    run_and_render(report.tracks, &config, &mut LeafletMap::new(&path)).unwrap();

    let html = fs::read_to_string(&path).unwrap();
    assert!(html.contains("No tracks matched the selection."));
}

#[test]
fn since_compares_normalised_timestamps() {
    let input = TempDir::new().unwrap();
    write_fixture(input.path(), 3);

    // The trip starts at 2023-06-01T08:00:00Z, i.e. 10:00 at +02:00
    let mut config = PipelineConfig::default();
    config.criteria.since = Some(parse_timestamp("2023-06-01T10:00:00+02:00").unwrap());

    let report = load_directory(input.path()).unwrap();
    let tracks = run(report.tracks, &config);
    let names: Vec<&str> = tracks.iter().filter_map(|t| t.name()).collect();
    assert_eq!(names, vec!["trip"]);
}

#[test]
fn unknown_activity_selects_nothing() {
    let input = TempDir::new().unwrap();
    write_fixture(input.path(), 3);

    let mut config = PipelineConfig::default();
    config.criteria.activities.insert("swimming".to_string());

    let report = load_directory(input.path()).unwrap();
    assert!(run(report.tracks, &config).is_empty());
}
