/*
  Copyright© 2023 Raúl Wolters(1)

  This file is part of hull-watershed.

  hull-watershed is free software: you can redistribute it and/or modify it
  under the terms of the European Union Public License version 1.2 or later, as
  published by the European Commission.

  hull-watershed is distributed in the hope that it will be useful, but WITHOUT
  ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
  FOR A PARTICULAR PURPOSE. See the European Union Public License for more
  details.

  You should have received a copy of the EUPL in an/all official language(s) of
  the European Union along with hull-watershed.  If not, see
  <https://ec.europa.eu/info/european-union-public-licence_en/>.

  (1) Resident of the Kingdom of the Netherlands; agreement between licensor and
  licensee subject to Dutch law as per article 15 of the EUPL.
*/

//! End-to-end recomputation: session state, the pure pipeline function and a
//! scheduler that runs recomputations off the caller's thread.
//!
//! The [`Session`] owns the only mutable state (the marker store). Every marker
//! edit returns a [`MarkersChanged`] event carrying an immutable snapshot of
//! everything the pipeline needs. Events can be run synchronously with
//! [`PipelineJob::run`], or handed to a [`Scheduler`], which runs them on the
//! rayon thread pool and only ever publishes the result of the newest event.

use std::sync::{
  atomic::{AtomicU64, Ordering},
  mpsc, Arc,
};
use std::time::{Duration, Instant};

use image::{DynamicImage, GrayImage, Luma, RgbImage};
use serde::{Deserialize, Serialize};

use crate::calibration::CalibrationConfig;
use crate::contours::analyze_region;
use crate::error::{HullError, HullResult};
use crate::markers::{Marker, MarkerClass, MarkerStore, MARKER_RADIUS};
use crate::metrics::{composite, RegionMetrics};
use crate::preprocess::{edge_barriers, surface_from_gray, surface_from_rgb};
use crate::split::{split_regions, Region, RegionMasks, BINARY_THRESHOLD, FRAME_WIDTH};
use crate::watershed::{CancelProbe, LabelMap, TransformBuilder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
/// Tunable knobs of the pipeline. The defaults reproduce the reference
/// behaviour.
pub struct PipelineOptions {
  /// Run Canny edge-barrier enhancement before flooding
  pub edge_barriers: bool,
  /// Inverse binary threshold applied to the discrete label image
  pub threshold: u8,
  /// Width of the border frame that is cleared before thresholding
  pub frame_width: usize,
  /// Radius of the seed disc painted around each marker
  pub seed_radius: u32,
}

impl Default for PipelineOptions {
  fn default() -> Self {
    PipelineOptions {
      edge_barriers: true,
      threshold: BINARY_THRESHOLD,
      frame_width: FRAME_WIDTH,
      seed_radius: MARKER_RADIUS as u32,
    }
  }
}

#[derive(Debug)]
/// Everything a single recomputation produces.
pub struct PipelineOutput {
  /// Raw watershed labels
  pub label_map: LabelMap,
  /// Labels rendered as an 8-bit image with black ridgelines
  pub segmented: GrayImage,
  /// Binary silhouette masks above and below the waterline
  pub masks: RegionMasks,
  /// Metrics of the above-water region, or why they could not be computed
  pub wind: HullResult<RegionMetrics>,
  /// Metrics of the below-water region, or why they could not be computed
  pub current: HullResult<RegionMetrics>,
  /// Original image with both regions, their centroids and the midship
  /// reference point drawn in
  pub composite: RgbImage,
}

impl PipelineOutput {
  pub fn region(&self, region: Region) -> &HullResult<RegionMetrics> {
    match region {
      Region::Wind => &self.wind,
      Region::Current => &self.current,
    }
  }
}

////////////////////////////////////////////////////////////////////////////////
//                              PIPELINE FUNCTION                             //
////////////////////////////////////////////////////////////////////////////////

fn check(cancelled: CancelProbe) -> HullResult<()> {
  if cancelled() {
    Err(HullError::Cancelled)
  } else {
    Ok(())
  }
}

/// Runs the whole pipeline on `image` with the given `markers`.
///
/// Fails as a whole only when there is nothing to segment
/// ([`HullError::EmptyMarkerSet`]), when the options are invalid, or when
/// `cancelled` fires. A region whose metrics cannot be computed is reported in
/// its own field of the output, and does not affect the other region.
pub fn run_pipeline(
  image: &RgbImage,
  markers: &[Marker],
  calibration: &CalibrationConfig,
  options: &PipelineOptions,
  cancelled: CancelProbe,
) -> HullResult<PipelineOutput> {
  if markers.is_empty() {
    return Err(HullError::EmptyMarkerSet);
  }
  //The watershed's ridge frame would otherwise be thresholded into the silhouette
  if options.frame_width == 0 {
    return Err(HullError::InvalidOptions("frame width must be at least 1 px".into()));
  }
  let watershed = TransformBuilder::new()
    .set_seed_radius(options.seed_radius)
    .build()
    .map_err(HullError::InvalidOptions)?;

  #[cfg(feature = "debug")]
  let mut perf = crate::performance_monitoring::PerfReport::default();
  let start = Instant::now();

  //(1) build the surface to flood. Edge enhancement is optional
  let surface = if options.edge_barriers {
    match edge_barriers(image).and_then(|barriers| surface_from_gray(&barriers)) {
      Ok(surface) => surface,
      Err(err) => {
        log::warn!("{err}; segmenting the unmodified image");
        surface_from_rgb(image)?
      }
    }
  } else {
    surface_from_rgb(image)?
  };
  #[cfg(feature = "debug")]
  {
    perf.preprocess_ms = start.elapsed().as_millis() as usize;
  }
  check(cancelled)?;

  //(2) flood
  #[cfg(feature = "debug")]
  let flood_start = Instant::now();
  let label_map = watershed.segment(surface.view(), markers, cancelled)?;
  #[cfg(feature = "debug")]
  {
    perf.flood_ms = flood_start.elapsed().as_millis() as usize;
  }
  check(cancelled)?;

  //(3) cut the silhouette at the waterline
  #[cfg(feature = "debug")]
  let split_start = Instant::now();
  let masks =
    split_regions(&label_map, calibration.waterline_px(), options.threshold, options.frame_width);
  #[cfg(feature = "debug")]
  {
    perf.split_ms = split_start.elapsed().as_millis() as usize;
  }
  check(cancelled)?;

  //(4) measure both regions independently
  #[cfg(feature = "debug")]
  let contour_start = Instant::now();
  let measure = |region: Region| {
    analyze_region(masks.get(region), region)
      .map(|geometry| RegionMetrics::from_geometry(&geometry, calibration))
  };
  let (wind, current) = rayon::join(|| measure(Region::Wind), || measure(Region::Current));
  for result in [&wind, &current] {
    match result {
      Ok(metrics) => log::info!("{metrics}"),
      Err(err) => log::warn!("{err}"),
    }
  }
  #[cfg(feature = "debug")]
  {
    perf.contour_ms = contour_start.elapsed().as_millis() as usize;
  }

  //(5) render outputs
  let (rows, cols) = label_map.dim();
  let discrete = label_map.to_discrete();
  let segmented =
    GrayImage::from_fn(cols as u32, rows as u32, |x, y| Luma([discrete[(y as usize, x as usize)]]));
  let composite =
    composite(image, &masks, wind.as_ref().ok(), current.as_ref().ok(), calibration);

  #[cfg(feature = "debug")]
  {
    perf.total_ms = start.elapsed().as_millis() as usize;
    log::debug!("{perf}");
  }
  log::debug!("pipeline finished in {:.1} ms", start.elapsed().as_secs_f64() * 1e3);

  Ok(PipelineOutput { label_map, segmented, masks, wind, current, composite })
}

////////////////////////////////////////////////////////////////////////////////
//                             SESSION & EVENTS                               //
////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone)]
/// Immutable snapshot of one pipeline invocation.
pub struct PipelineJob {
  image: Arc<RgbImage>,
  markers: Vec<Marker>,
  calibration: CalibrationConfig,
  options: PipelineOptions,
}

impl PipelineJob {
  pub fn markers(&self) -> &[Marker] {
    &self.markers
  }

  /// Runs the pipeline on this snapshot
  pub fn run(&self, cancelled: CancelProbe) -> HullResult<PipelineOutput> {
    run_pipeline(&self.image, &self.markers, &self.calibration, &self.options, cancelled)
  }
}

#[derive(Debug, Clone)]
/// Emitted whenever the marker set changes; the payload is the job that
/// recomputes everything for the new marker set.
pub struct MarkersChanged(pub PipelineJob);

/// One image being annotated, together with its marker store.
pub struct Session {
  image: Arc<RgbImage>,
  markers: MarkerStore,
  calibration: CalibrationConfig,
  options: PipelineOptions,
}

impl Session {
  pub fn new(image: RgbImage, calibration: CalibrationConfig) -> Self {
    Session {
      image: Arc::new(image),
      markers: MarkerStore::new(),
      calibration,
      options: PipelineOptions::default(),
    }
  }

  /// Starts a session on any decoded image; grayscale input is expanded to
  /// three channels.
  pub fn from_dynamic(image: &DynamicImage, calibration: CalibrationConfig) -> Self {
    Self::new(image.to_rgb8(), calibration)
  }

  pub fn with_options(mut self, options: PipelineOptions) -> Self {
    self.options = options;
    self
  }

  pub fn image(&self) -> &RgbImage {
    &self.image
  }

  pub fn markers(&self) -> &MarkerStore {
    &self.markers
  }

  pub fn calibration(&self) -> &CalibrationConfig {
    &self.calibration
  }

  /// Places a marker and returns the resulting recomputation event
  pub fn add_marker(&mut self, x: i32, y: i32, class: MarkerClass) -> MarkersChanged {
    self.markers.add(x, y, class);
    MarkersChanged(self.snapshot())
  }

  /// Deletes the marker under `(x, y)`. Returns `None` when no marker was hit,
  /// in which case nothing needs recomputing.
  pub fn delete_marker(&mut self, x: i32, y: i32) -> Option<MarkersChanged> {
    let removed = self.markers.delete_nearest(x, y)?;
    log::debug!("removed {:?} marker at ({}, {})", removed.class, removed.x, removed.y);
    Some(MarkersChanged(self.snapshot()))
  }

  pub fn snapshot(&self) -> PipelineJob {
    PipelineJob {
      image: Arc::clone(&self.image),
      markers: self.markers.markers().to_vec(),
      calibration: self.calibration,
      options: self.options,
    }
  }

  /// Synchronously recomputes everything for the current marker set
  pub fn recompute(&self) -> HullResult<PipelineOutput> {
    self.snapshot().run(&crate::watershed::never_cancelled)
  }
}

////////////////////////////////////////////////////////////////////////////////
//                                 SCHEDULER                                  //
////////////////////////////////////////////////////////////////////////////////

#[derive(Debug)]
/// A result released by the [`Scheduler`].
pub struct Published {
  /// Generation of the event that produced this result
  pub generation: u64,
  pub result: HullResult<PipelineOutput>,
}

/// Runs [`MarkersChanged`] events in the background with supersede semantics.
///
/// Every dispatch starts a new generation. A running job keeps checking
/// whether it is still the newest generation and stops early if it is not;
/// results of outdated generations are never handed out.
pub struct Scheduler {
  generation: Arc<AtomicU64>,
  sender: mpsc::Sender<Published>,
  receiver: mpsc::Receiver<Published>,
}

impl Default for Scheduler {
  fn default() -> Self {
    let (sender, receiver) = mpsc::channel();
    Scheduler { generation: Arc::new(AtomicU64::new(0)), sender, receiver }
  }
}

impl Scheduler {
  pub fn new() -> Self {
    Self::default()
  }

  /// Generation of the most recent dispatch (0 before the first)
  pub fn latest_generation(&self) -> u64 {
    self.generation.load(Ordering::SeqCst)
  }

  /// Starts recomputing for `event`, superseding every earlier dispatch.
  /// Returns the generation assigned to this event.
  pub fn dispatch(&self, event: MarkersChanged) -> u64 {
    let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
    let latest = Arc::clone(&self.generation);
    let sender = self.sender.clone();
    let MarkersChanged(job) = event;

    rayon::spawn(move || {
      let superseded = || latest.load(Ordering::SeqCst) != generation;
      let result = job.run(&superseded);
      if superseded() {
        log::debug!("discarding result of superseded generation {generation}");
        return;
      }
      //The receiving end lives as long as the scheduler
      let _ = sender.send(Published { generation, result });
    });
    generation
  }

  /// Waits up to `timeout` for the result of the newest dispatch, dropping
  /// any stale results that arrive first.
  pub fn wait_latest(&self, timeout: Duration) -> Option<Published> {
    let deadline = Instant::now() + timeout;
    loop {
      let remaining = deadline.checked_duration_since(Instant::now())?;
      let published = self.receiver.recv_timeout(remaining).ok()?;
      if published.generation == self.latest_generation() {
        return Some(published);
      }
    }
  }

  /// Returns the result of the newest dispatch if it is already available.
  pub fn try_latest(&self) -> Option<Published> {
    let latest = self.latest_generation();
    self.receiver.try_iter().filter(|published| published.generation == latest).last()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::calibration::CalibrationConstants;
  use image::Rgb;

  fn session(size: u32) -> Session {
    let image = RgbImage::from_pixel(size, size, Rgb([200, 200, 200]));
    Session::new(image, CalibrationConfig::new(CalibrationConstants::default()).unwrap())
  }

  #[test]
  fn empty_marker_set_is_reported() {
    let s = session(40);
    assert!(matches!(s.recompute(), Err(HullError::EmptyMarkerSet)));
  }

  #[test]
  fn invalid_seed_radius_is_reported() {
    let options = PipelineOptions { seed_radius: 0, ..Default::default() };
    let mut s = session(40).with_options(options);
    s.add_marker(10, 10, MarkerClass::Internal);
    assert!(matches!(s.recompute(), Err(HullError::InvalidOptions(_))));
  }

  #[test]
  fn zero_frame_width_is_rejected() {
    let options: PipelineOptions = serde_json::from_str(r#"{"frame_width": 0}"#).unwrap();
    let mut s = session(40).with_options(options);
    s.add_marker(20, 20, MarkerClass::Internal);
    s.add_marker(2, 2, MarkerClass::External);
    assert!(matches!(s.recompute(), Err(HullError::InvalidOptions(_))));
  }

  #[test]
  fn missed_delete_emits_no_event() {
    let mut s = session(40);
    assert!(s.delete_marker(3, 3).is_none());
    s.add_marker(20, 20, MarkerClass::Internal);
    assert!(s.delete_marker(30, 30).is_none());
    let event = s.delete_marker(21, 22).unwrap();
    assert!(event.0.markers().is_empty());
  }

  #[test]
  fn tiny_image_falls_back_and_reports_degenerate_regions() {
    let mut s = session(2);
    s.add_marker(0, 0, MarkerClass::Internal);
    let out = s.recompute().unwrap();
    assert!(matches!(out.wind, Err(HullError::DegenerateContour { region: Region::Wind })));
    assert!(matches!(out.current, Err(HullError::DegenerateContour { region: Region::Current })));
    assert_eq!(out.composite.dimensions(), (2, 2));
  }

  #[test]
  fn cancelled_pipeline_stops() {
    let mut s = session(30);
    s.add_marker(15, 15, MarkerClass::Internal);
    assert!(matches!(s.snapshot().run(&|| true), Err(HullError::Cancelled)));
  }

  #[test]
  fn options_deserialize_with_defaults() {
    let options: PipelineOptions = serde_json::from_str(r#"{"edge_barriers": false}"#).unwrap();
    assert!(!options.edge_barriers);
    assert_eq!(options.threshold, BINARY_THRESHOLD);
    assert_eq!(options.frame_width, FRAME_WIDTH);
  }

  #[test]
  fn scheduler_publishes_only_newest_generation() {
    let mut s = session(120);
    let scheduler = Scheduler::new();
    let first = scheduler.dispatch(s.add_marker(60, 60, MarkerClass::Internal));
    let second = scheduler.dispatch(s.add_marker(5, 5, MarkerClass::External));
    assert_eq!((first, second), (1, 2));

    let published = scheduler.wait_latest(Duration::from_secs(60)).unwrap();
    assert_eq!(published.generation, 2);
    let output = published.result.unwrap();
    assert_eq!(output.label_map.region_count(), 2);
    //nothing older shows up afterwards
    assert!(scheduler.try_latest().is_none());
  }

  #[test]
  fn scheduler_forwards_failures() {
    let s = session(20);
    let scheduler = Scheduler::new();
    scheduler.dispatch(MarkersChanged(s.snapshot()));
    let published = scheduler.wait_latest(Duration::from_secs(60)).unwrap();
    assert!(matches!(published.result, Err(HullError::EmptyMarkerSet)));
  }
}
