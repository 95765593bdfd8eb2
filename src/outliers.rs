//! # Outlier Track Removal
//!
//! Recorded activities normally cluster around a few places (home, work).
//! A track recorded on holiday pulls the map view out to a whole continent.
//! This module finds such tracks and drops them, but only when they are a
//! small minority of the collection.
//!
//! ## Algorithm
//!
//! Two ways to decide which tracks are "far":
//!
//! - [`OutlierMethod::CentroidDistance`] (default)
//!   1. Each track is reduced to the mean of its points.
//!   2. The reference point is the component-wise median of those centres,
//!      so the far tracks themselves cannot drag it away.
//!   3. Each track's distance is the haversine distance from its centre to
//!      the reference.
//!   4. A track is far if its distance exceeds
//!      `max(far_distance_multiplier * median distance, min_far_distance_m)`.
//!
//! - [`OutlierMethod::DensityClusters`]
//!   1. Each track is reduced to the centre and half-diagonal of its
//!      bounding box.
//!   2. The centres are clustered with DBSCAN, neighbourhood radius
//!      `max(cluster_radius_multiplier * largest half-diagonal, min_far_distance_m)`.
//!      Neighbour queries use an R-tree over the centres.
//!   3. Every track outside the largest cluster is far.
//!
//! Both thresholds depend on the population they are computed from, so
//! dropping a far track can expose another one. Detection therefore repeats
//! on the survivors until a pass finds nothing new. The far tracks of all
//! passes are removed together, and only if
//! `far / total < max_outlier_fraction` (strict) against the original count;
//! otherwise nothing is removed. Either way the result is a fixed point:
//! running removal again on its own output removes nothing.
//!
//! With the default 10%, one far track out of ten is kept, one out of eleven
//! is removed.

use std::collections::VecDeque;

use log::{debug, info};
use rstar::primitives::GeomWithData;
use rstar::{RTree, AABB};

use crate::geo_utils::{haversine_distance, median, median_center, meters_to_degrees};
use crate::{GpsPoint, Track};

/// How far tracks are identified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutlierMethod {
    /// Distance of each track centre from the median centre.
    #[default]
    CentroidDistance,
    /// DBSCAN over bounding-box centres; everything outside the largest
    /// cluster is far.
    DensityClusters,
}

/// Configuration for outlier removal.
#[derive(Debug, Clone)]
pub struct OutlierConfig {
    pub method: OutlierMethod,

    /// Far tracks are removed only if they make up strictly less than this
    /// share of the collection.
    /// Default: 0.10
    pub max_outlier_fraction: f64,

    /// Multiple of the median centre distance beyond which a track is far
    /// (centroid method).
    /// Default: 10.0
    pub far_distance_multiplier: f64,

    /// Lower bound for the far threshold and the cluster radius, in meters.
    /// Keeps a tight cluster from flagging ordinary variation.
    /// Default: 10000.0 meters
    pub min_far_distance_m: f64,

    /// Multiple of the largest track half-diagonal used as the DBSCAN
    /// neighbourhood radius (density method).
    /// Default: 10.0
    pub cluster_radius_multiplier: f64,

    /// Neighbours (including itself) a track needs to seed a cluster
    /// (density method).
    /// Default: 5
    pub min_cluster_size: usize,
}

impl Default for OutlierConfig {
    fn default() -> Self {
        Self {
            method: OutlierMethod::CentroidDistance,
            max_outlier_fraction: 0.10,
            far_distance_multiplier: 10.0,
            min_far_distance_m: 10_000.0,
            cluster_radius_multiplier: 10.0,
            min_cluster_size: 5,
        }
    }
}

/// What the detector decided for a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct OutlierReport {
    /// Indices of the far tracks found over all passes, ascending.
    pub far: Vec<usize>,
    /// Whether the far tracks are few enough to be removed.
    pub removed: bool,
    /// Far threshold (centroid) or cluster radius (density) of the last
    /// pass, in meters.
    pub threshold_m: f64,
    /// Detection passes run.
    pub passes: usize,
    pub total: usize,
}

/// Classify tracks as near or far without removing anything.
///
/// Each pass runs on the tracks not yet flagged. Passes stop when one flags
/// nothing, when the flagged tracks stop being a minority of `tracks`, or
/// when fewer than two tracks remain. Collections with fewer than two tracks
/// have no far group.
pub fn detect_outliers(tracks: &[Track], config: &OutlierConfig) -> OutlierReport {
    let total = tracks.len();
    let mut remaining: Vec<usize> = (0..total).collect();
    let mut far: Vec<usize> = Vec::new();
    let mut threshold_m = 0.0;
    let mut passes = 0;

    while remaining.len() >= 2 {
        let view: Vec<&Track> = remaining.iter().map(|&i| &tracks[i]).collect();
        let (pass_far, pass_threshold) = match config.method {
            OutlierMethod::CentroidDistance => far_by_centroid_distance(&view, config),
            OutlierMethod::DensityClusters => far_by_density(&view, config),
        };
        passes += 1;
        threshold_m = pass_threshold;

        if pass_far.is_empty() {
            break;
        }

        debug!(
            "Pass {}: {} of {} tracks beyond {:.0}m",
            passes,
            pass_far.len(),
            remaining.len(),
            pass_threshold
        );

        far.extend(pass_far.iter().map(|&j| remaining[j]));
        if !minority(far.len(), total, config.max_outlier_fraction) {
            break;
        }

        remaining = remaining
            .into_iter()
            .enumerate()
            .filter(|(j, _)| pass_far.binary_search(j).is_err())
            .map(|(_, i)| i)
            .collect();
    }

    far.sort_unstable();
    let removed = minority(far.len(), total, config.max_outlier_fraction);

    OutlierReport { far, removed, threshold_m, passes, total }
}

/// Remove far tracks if they form a small enough minority.
///
/// Order of the surviving tracks is preserved. The output is a fixed point:
/// calling this again on it removes nothing.
///
/// # Example
/// ```
/// use track_overlay::{remove_outliers, GpsPoint, OutlierConfig, Track, TrackPoint};
///
/// let at = |lat: f64, lng: f64| {
///     Track::new(vec![TrackPoint::new(GpsPoint::new(lat, lng), None)]).unwrap()
/// };
///
/// // Eleven runs around London, one trip to Rome
/// let mut tracks: Vec<Track> = (0..11).map(|i| at(51.50 + i as f64 * 0.0005, -0.12)).collect();
/// tracks.push(at(41.90, 12.49));
///
/// let kept = remove_outliers(tracks, &OutlierConfig::default());
/// assert_eq!(kept.len(), 11);
/// ```
pub fn remove_outliers(tracks: Vec<Track>, config: &OutlierConfig) -> Vec<Track> {
    let report = detect_outliers(&tracks, config);

    if report.far.is_empty() {
        info!("No outliers found");
        return tracks;
    }

    if !report.removed {
        info!(
            "{} of {} tracks are far from the rest, too many to treat as outliers; keeping all",
            report.far.len(),
            report.total
        );
        return tracks;
    }

    info!("Filtering out {} (of {}) outliers", report.far.len(), report.total);

    let mut far = report.far.iter().peekable();
    tracks
        .into_iter()
        .enumerate()
        .filter_map(|(i, track)| {
            if far.peek() == Some(&&i) {
                far.next();
                debug!("Dropping outlier {}", track.label());
                None
            } else {
                Some(track)
            }
        })
        .collect()
}

/// Strict share test: `far / total < max_fraction`.
fn minority(far: usize, total: usize, max_fraction: f64) -> bool {
    far > 0 && total > 0 && (far as f64) / (total as f64) < max_fraction
}

// ============================================================================
// Centroid distance
// ============================================================================

fn far_by_centroid_distance(tracks: &[&Track], config: &OutlierConfig) -> (Vec<usize>, f64) {
    let centers: Vec<GpsPoint> = tracks.iter().map(|t| t.center()).collect();
    let reference = median_center(&centers);

    let distances: Vec<f64> = centers
        .iter()
        .map(|c| haversine_distance(c, &reference))
        .collect();

    let typical = median(distances.clone());
    let threshold = (typical * config.far_distance_multiplier).max(config.min_far_distance_m);

    debug!(
        "Reference ({:.5}, {:.5}), median distance {:.0}m, far beyond {:.0}m",
        reference.latitude, reference.longitude, typical, threshold
    );

    let far = distances
        .iter()
        .enumerate()
        .filter(|(_, d)| **d > threshold)
        .map(|(i, _)| i)
        .collect();

    (far, threshold)
}

// ============================================================================
// Density clusters
// ============================================================================

type IndexedCenter = GeomWithData<[f64; 2], usize>;

const NOISE: usize = usize::MAX;

fn far_by_density(tracks: &[&Track], config: &OutlierConfig) -> (Vec<usize>, f64) {
    let mut centers = Vec::with_capacity(tracks.len());
    let mut max_radius: f64 = 0.0;
    for track in tracks {
        let bounds = track.bounds();
        centers.push(bounds.center());
        max_radius = max_radius.max(bounds.radius_meters());
    }

    let eps = (config.cluster_radius_multiplier * max_radius).max(config.min_far_distance_m);
    let labels = dbscan(&centers, eps, config.min_cluster_size);

    let cluster_count = labels.iter().filter(|l| **l != NOISE).max().map_or(0, |m| m + 1);
    let mut sizes = vec![0usize; cluster_count];
    let mut noise = 0usize;
    for &label in &labels {
        if label == NOISE {
            noise += 1;
        } else {
            sizes[label] += 1;
        }
    }

    for (cluster, size) in sizes.iter().enumerate() {
        debug!("Cluster {}: {} members", cluster, size);
    }
    if noise > 0 {
        debug!("Unclustered: {} members", noise);
    }

    let groups = cluster_count + usize::from(noise > 0);
    if groups <= 1 {
        return (Vec::new(), eps);
    }

    // Ties go to the lowest cluster id
    let largest = sizes
        .iter()
        .enumerate()
        .max_by(|(ia, a), (ib, b)| a.cmp(b).then(ib.cmp(ia)))
        .map(|(i, _)| i);

    let Some(keep) = largest else {
        return (Vec::new(), eps);
    };

    let far = labels
        .iter()
        .enumerate()
        .filter(|(_, l)| **l != keep)
        .map(|(i, _)| i)
        .collect();

    (far, eps)
}

/// DBSCAN over GPS points. Returns one label per point, [`NOISE`] for
/// points that belong to no cluster. Cluster ids follow discovery order.
fn dbscan(points: &[GpsPoint], eps: f64, min_samples: usize) -> Vec<usize> {
    let tree: RTree<IndexedCenter> = RTree::bulk_load(
        points
            .iter()
            .enumerate()
            .map(|(i, p)| IndexedCenter::new([p.longitude, p.latitude], i))
            .collect(),
    );

    let region = |i: usize| -> Vec<usize> {
        let p = &points[i];
        let deg = meters_to_degrees(eps, p.latitude);
        let envelope = AABB::from_corners(
            [p.longitude - deg, p.latitude - deg],
            [p.longitude + deg, p.latitude + deg],
        );
        let mut found: Vec<usize> = tree
            .locate_in_envelope(&envelope)
            .map(|c| c.data)
            .filter(|&j| haversine_distance(p, &points[j]) <= eps)
            .collect();
        found.sort_unstable();
        found
    };

    let mut labels = vec![NOISE; points.len()];
    let mut visited = vec![false; points.len()];
    let mut next_cluster = 0usize;

    for i in 0..points.len() {
        if visited[i] {
            continue;
        }
        visited[i] = true;

        let neighbours = region(i);
        if neighbours.len() < min_samples {
            continue;
        }

        let cluster = next_cluster;
        next_cluster += 1;
        labels[i] = cluster;

        let mut queue: VecDeque<usize> = neighbours.into_iter().collect();
        while let Some(j) = queue.pop_front() {
            if labels[j] == NOISE {
                labels[j] = cluster;
            }
            if visited[j] {
                continue;
            }
            visited[j] = true;

            let expansion = region(j);
            if expansion.len() >= min_samples {
                queue.extend(expansion);
            }
        }
    }

    labels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TrackPoint;

    /// A short track near central London, offset by `i` (~100m steps).
    fn near(i: usize) -> Track {
        let lat = 51.5000 + i as f64 * 0.0009;
        let points = (0..5)
            .map(|k| TrackPoint::new(GpsPoint::new(lat + k as f64 * 0.0002, -0.1200), None))
            .collect();
        Track::new(points).unwrap().with_name(format!("near-{i}"))
    }

    /// A short track ~500km east of London.
    fn far(i: usize) -> Track {
        let points = (0..5)
            .map(|k| TrackPoint::new(GpsPoint::new(51.5 + k as f64 * 0.0002, 7.0 + i as f64 * 0.01), None))
            .collect();
        Track::new(points).unwrap().with_name(format!("far-{i}"))
    }

    fn collection(near_count: usize, far_count: usize) -> Vec<Track> {
        let mut tracks: Vec<Track> = (0..near_count).map(near).collect();
        tracks.extend((0..far_count).map(far));
        tracks
    }

    fn density() -> OutlierConfig {
        OutlierConfig { method: OutlierMethod::DensityClusters, ..OutlierConfig::default() }
    }

    #[test]
    fn test_fewer_than_two_tracks_is_noop() {
        let report = detect_outliers(&collection(0, 1), &OutlierConfig::default());
        assert!(report.far.is_empty());
        assert!(!report.removed);
        assert_eq!(remove_outliers(Vec::new(), &OutlierConfig::default()).len(), 0);
    }

    #[test]
    fn test_exactly_ten_percent_is_kept() {
        let tracks = collection(9, 1);
        let report = detect_outliers(&tracks, &OutlierConfig::default());
        assert_eq!(report.far, vec![9]);
        assert!(!report.removed);

        let kept = remove_outliers(tracks, &OutlierConfig::default());
        assert_eq!(kept.len(), 10);
    }

    #[test]
    fn test_under_ten_percent_is_removed() {
        let tracks = collection(10, 1);
        let report = detect_outliers(&tracks, &OutlierConfig::default());
        assert_eq!(report.far, vec![10]);
        assert!(report.removed);

        let kept = remove_outliers(tracks, &OutlierConfig::default());
        assert_eq!(kept.len(), 10);
        assert!(kept.iter().all(|t| t.label().starts_with("near-")));
    }

    #[test]
    fn test_far_track_position_does_not_matter() {
        let mut tracks = collection(10, 0);
        tracks.insert(3, far(0));
        let kept = remove_outliers(tracks, &OutlierConfig::default());
        let names: Vec<&str> = kept.iter().map(|t| t.label()).collect();
        assert_eq!(names.len(), 10);
        assert_eq!(names[3], "near-3");
        assert!(!names.contains(&"far-0"));
    }

    #[test]
    fn test_identical_positions_have_no_far_group() {
        let tracks: Vec<Track> = (0..12).map(|_| near(0)).collect();
        let report = detect_outliers(&tracks, &OutlierConfig::default());
        assert!(report.far.is_empty());
        assert!(!report.removed);
    }

    #[test]
    fn test_large_far_group_is_kept() {
        let tracks = collection(6, 4);
        let report = detect_outliers(&tracks, &OutlierConfig::default());
        assert!(!report.removed);
        assert_eq!(remove_outliers(tracks, &OutlierConfig::default()).len(), 10);
    }

    #[test]
    fn test_remove_outliers_is_idempotent() {
        let config = OutlierConfig::default();
        let once = remove_outliers(collection(20, 1), &config);
        let twice = remove_outliers(once.clone(), &config);
        assert_eq!(once.len(), 20);
        assert_eq!(once, twice);
    }

    /// Single-point track `north_km` north and `east_km` east of (0, 0).
    fn offset(name: &str, north_km: f64, east_km: f64) -> Track {
        let position = GpsPoint::new(north_km / 111.195, east_km / 111.195);
        Track::new(vec![TrackPoint::new(position, None)])
            .unwrap()
            .with_name(name)
    }

    /// Tracks at the origin, tracks 5km north and south of it, one 30km
    /// east and one 500km east. Removing the 500km track halves the median
    /// distance, which brings the 30km track over the threshold.
    fn tiered(at_origin: usize, north: usize, south: usize) -> Vec<Track> {
        let mut tracks: Vec<Track> = (0..at_origin).map(|i| offset(&format!("origin-{i}"), 0.0, 0.0)).collect();
        tracks.extend((0..north).map(|i| offset(&format!("north-{i}"), 5.0, 0.0)));
        tracks.extend((0..south).map(|i| offset(&format!("south-{i}"), -5.0, 0.0)));
        tracks.push(offset("nearby trip", 0.0, 30.0));
        tracks.push(offset("far trip", 0.0, 500.0));
        tracks
    }

    #[test]
    fn test_tiered_distances_over_budget_keep_everything() {
        // 13 tracks: the 500km track alone would be a minority, but the
        // 30km track it uncovers makes 2/13 which is not
        let config = OutlierConfig::default();
        let tracks = tiered(6, 3, 2);

        let report = detect_outliers(&tracks, &config);
        assert_eq!(report.far, vec![11, 12]);
        assert_eq!(report.passes, 2);
        assert!(!report.removed);

        let once = remove_outliers(tracks.clone(), &config);
        assert_eq!(once, tracks);
        let twice = remove_outliers(once.clone(), &config);
        assert_eq!(twice, once);
    }

    #[test]
    fn test_tiered_distances_removed_in_passes() {
        // 21 tracks: 2/21 is a minority, both trips go in one call and a
        // second call finds nothing
        let config = OutlierConfig::default();
        let tracks = tiered(10, 5, 4);

        let report = detect_outliers(&tracks, &config);
        assert_eq!(report.far, vec![19, 20]);
        assert_eq!(report.passes, 3);
        assert!(report.removed);

        let once = remove_outliers(tracks, &config);
        assert_eq!(once.len(), 19);
        assert!(once.iter().all(|t| !t.label().contains("trip")));

        let twice = remove_outliers(once.clone(), &config);
        assert_eq!(twice, once);
        assert!(detect_outliers(&once, &config).far.is_empty());
    }

    #[test]
    fn test_density_removal_is_idempotent() {
        let config = density();
        let once = remove_outliers(collection(12, 1), &config);
        assert_eq!(once.len(), 12);
        let twice = remove_outliers(once.clone(), &config);
        assert_eq!(twice, once);
    }

    #[test]
    fn test_threshold_floor_keeps_local_spread() {
        // 20 tracks spread over ~2km: no median-based threshold should split them
        let tracks: Vec<Track> = (0..20).map(near).collect();
        let report = detect_outliers(&tracks, &OutlierConfig::default());
        assert!(report.far.is_empty());
        assert_eq!(report.threshold_m, 10_000.0);
    }

    #[test]
    fn test_density_exactly_ten_percent_is_kept() {
        let tracks = collection(9, 1);
        let report = detect_outliers(&tracks, &density());
        assert_eq!(report.far, vec![9]);
        assert!(!report.removed);
    }

    #[test]
    fn test_density_under_ten_percent_is_removed() {
        let kept = remove_outliers(collection(10, 1), &density());
        assert_eq!(kept.len(), 10);
        assert!(kept.iter().all(|t| t.label().starts_with("near-")));
    }

    #[test]
    fn test_density_small_collection_is_single_group() {
        // Fewer tracks than min_cluster_size: everything is noise, one group
        let report = detect_outliers(&collection(3, 1), &density());
        assert!(report.far.is_empty());
    }

    #[test]
    fn test_density_two_clusters() {
        // Two dense groups; the smaller one is far but 5/16 is too many to drop
        let report = detect_outliers(&collection(11, 5), &density());
        assert_eq!(report.far, (11..16).collect::<Vec<_>>());
        assert!(!report.removed);
    }

    #[test]
    fn test_dbscan_labels() {
        let mut points: Vec<GpsPoint> = (0..5).map(|i| GpsPoint::new(51.5 + i as f64 * 0.001, -0.12)).collect();
        points.push(GpsPoint::new(48.85, 2.35));
        let labels = dbscan(&points, 2_000.0, 3);
        assert!(labels[..5].iter().all(|l| *l == 0));
        assert_eq!(labels[5], NOISE);
    }

    #[test]
    fn test_minority_rule() {
        assert!(!minority(1, 10, 0.10));
        assert!(minority(1, 11, 0.10));
        assert!(!minority(0, 11, 0.10));
        assert!(!minority(2, 20, 0.10));
        assert!(minority(2, 21, 0.10));
    }
}
