//! Selection followed by optional outlier removal.
//!
//! The pipeline holds no state and does no I/O of its own; rendering is
//! delegated to a [`Renderer`].

use log::{info, warn};

use crate::error::Result;
use crate::outliers::{remove_outliers, OutlierConfig};
use crate::render::Renderer;
use crate::selector::{select, SelectionCriteria};
use crate::{Track, TrackCollection};

/// Everything [`run`] needs to know.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub criteria: SelectionCriteria,
    /// Off by default: outlier removal is a pass-through unless asked for.
    pub filter_outliers: bool,
    pub outliers: OutlierConfig,
}

/// Select tracks by date and activity, then drop outliers if enabled.
///
/// Outliers are judged against the selected tracks only, never against the
/// full input.
pub fn run(raw_tracks: Vec<Track>, config: &PipelineConfig) -> TrackCollection {
    let loaded = raw_tracks.len();
    let selected = select(raw_tracks, &config.criteria);
    info!("Selected {} of {} tracks", selected.len(), loaded);

    if !config.filter_outliers {
        return selected;
    }

    remove_outliers(selected, &config.outliers)
}

/// [`run`], then hand the surviving tracks to `renderer`.
///
/// An empty result is still rendered.
pub fn run_and_render<R: Renderer>(
    raw_tracks: Vec<Track>,
    config: &PipelineConfig,
    renderer: &mut R,
) -> Result<R::Output> {
    let tracks = run(raw_tracks, config);
    if tracks.is_empty() {
        warn!("No tracks left to plot; the map will be empty");
    }
    renderer.render(&tracks)
}
