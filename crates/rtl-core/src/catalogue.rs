//! Seismicity forecast catalogues.
//!
//! A forecast consists of stochastic event sets (SES), each an independent
//! realization of future seismicity holding zero or more earthquakes. Earthquakes
//! are ordered by SES and then chronologically, and can be screened out by
//! magnitude and by distance to the exposure before any damage is computed.

use crate::models::{Earthquake, Location};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::info;

/// Mean earth radius used for epicentral distances, in km.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two points, in km.
pub fn epicentral_distance_km(a: Location, b: Location) -> f64 {
    let (lat1, lat2) = (a.latitude.to_radians(), b.latitude.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (b.longitude - a.longitude).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// One earthquake of a forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastEvent {
    pub ses_id: u32,
    pub earthquake: Earthquake,
    /// Whether the earthquake survived filtering and is to be assessed.
    #[serde(default = "default_to_run")]
    pub to_run: bool,
}

fn default_to_run() -> bool {
    true
}

impl ForecastEvent {
    /// Creates an event that is to be run.
    pub fn new(ses_id: u32, earthquake: Earthquake) -> Self {
        Self {
            ses_id,
            earthquake,
            to_run: true,
        }
    }

    /// Catalogue-wide identifier `"{ses_id}-{event_id}"`.
    pub fn key(&self) -> String {
        format!("{}-{}", self.ses_id, self.earthquake.event_id)
    }
}

/// How SES identifiers are enumerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SesNumbering {
    /// Only SES that appear in the catalogue.
    FromCatalogue,
    /// Every id in `first..=last`, including SES with no earthquakes.
    Continuous { first: u32, last: u32 },
}

/// Counts reported by [`ForecastCatalogue::filter`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterReport {
    pub total: usize,
    pub above_magnitude: usize,
    pub kept: usize,
}

/// Forecast earthquakes ordered by SES and time.
#[derive(Debug, Clone, Default)]
pub struct ForecastCatalogue {
    events: Vec<ForecastEvent>,
}

impl ForecastCatalogue {
    /// Sorts events by `(ses_id, time)` and numbers earthquakes without an id
    /// chronologically within their SES, starting at 1.
    pub fn new(mut events: Vec<ForecastEvent>) -> Self {
        events.sort_by(|a, b| {
            a.ses_id
                .cmp(&b.ses_id)
                .then(a.earthquake.time.cmp(&b.earthquake.time))
        });

        let mut current_ses = None;
        let mut counter = 0;
        for event in &mut events {
            if current_ses != Some(event.ses_id) {
                current_ses = Some(event.ses_id);
                counter = 0;
            }
            counter += 1;
            if event.earthquake.event_id.is_empty() {
                event.earthquake.event_id = counter.to_string();
            }
        }

        Self { events }
    }

    /// All events in order.
    pub fn events(&self) -> &[ForecastEvent] {
        &self.events
    }

    /// Number of events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the catalogue has no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Marks events to run: magnitude at least `min_magnitude` and epicentre within
    /// `max_distance_km` of at least one of `locations`.
    pub fn filter(
        &mut self,
        min_magnitude: f64,
        max_distance_km: f64,
        locations: &[Location],
    ) -> FilterReport {
        let mut report = FilterReport {
            total: self.events.len(),
            ..Default::default()
        };

        for event in &mut self.events {
            let strong_enough = event.earthquake.magnitude >= min_magnitude;
            let close_enough = strong_enough
                && locations.iter().any(|l| {
                    epicentral_distance_km(event.earthquake.epicentre, *l) <= max_distance_km
                });
            if strong_enough {
                report.above_magnitude += 1;
            }
            event.to_run = close_enough;
            if close_enough {
                report.kept += 1;
            }
        }

        info!(
            total = report.total,
            min_magnitude,
            above_magnitude = report.above_magnitude,
            max_distance_km,
            kept = report.kept,
            "Filtered forecast catalogue"
        );
        report
    }

    /// SES identifiers to process, in ascending order.
    pub fn ses_ids(&self, numbering: SesNumbering) -> Vec<u32> {
        match numbering {
            SesNumbering::FromCatalogue => self
                .events
                .iter()
                .map(|e| e.ses_id)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
            SesNumbering::Continuous { first, last } => (first..=last).collect(),
        }
    }

    /// Events of one SES in chronological order.
    pub fn events_of(&self, ses_id: u32) -> impl Iterator<Item = &ForecastEvent> + '_ {
        self.events.iter().filter(move |e| e.ses_id == ses_id)
    }
}
