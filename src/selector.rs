//! Date and activity-type selection.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use log::debug;

use crate::Track;

/// Which tracks to keep.
///
/// The default keeps everything.
#[derive(Debug, Clone, Default)]
pub struct SelectionCriteria {
    /// Keep tracks starting at or after this instant. Tracks without a start
    /// date cannot be placed in time and are dropped when this is set.
    pub since: Option<DateTime<Utc>>,
    /// Keep tracks whose activity type is one of these (exact match).
    /// Empty means no activity filtering; a track without a type is then kept.
    pub activities: HashSet<String>,
}

impl SelectionCriteria {
    pub fn new(since: Option<DateTime<Utc>>, activities: impl IntoIterator<Item = String>) -> Self {
        Self {
            since,
            activities: activities.into_iter().collect(),
        }
    }

    /// Both predicates must hold.
    pub fn matches(&self, track: &Track) -> bool {
        if let Some(since) = self.since {
            match track.start_date() {
                Some(start) if start >= since => {}
                Some(start) => {
                    debug!("Skipping {}: too old ({})", track.label(), start.to_rfc3339());
                    return false;
                }
                None => {
                    debug!("Skipping {}: no start date", track.label());
                    return false;
                }
            }
        }

        if !self.activities.is_empty() {
            let wanted = track
                .activity_type()
                .is_some_and(|activity| self.activities.contains(activity));
            if !wanted {
                debug!(
                    "Skipping {}: wrong type ({:?})",
                    track.label(),
                    track.activity_type()
                );
                return false;
            }
        }

        true
    }
}

/// Keep the tracks that pass `criteria`, preserving input order.
///
/// An empty result is valid.
///
/// # Example
/// ```
/// use track_overlay::{select, GpsPoint, SelectionCriteria, Track, TrackPoint};
///
/// let walk = Track::new(vec![TrackPoint::new(GpsPoint::new(51.5, -0.1), None)])
///     .unwrap()
///     .with_activity_type("walking");
///
/// let criteria = SelectionCriteria::new(None, ["cycling".to_string()]);
/// assert!(select(vec![walk], &criteria).is_empty());
/// ```
pub fn select(tracks: Vec<Track>, criteria: &SelectionCriteria) -> Vec<Track> {
    tracks.into_iter().filter(|t| criteria.matches(t)).collect()
}
