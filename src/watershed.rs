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

//! Marker-controlled watershed.
//!
//! The input surface is treated as a landscape whose local steepness is the
//! intensity difference between neighbouring pixels. Water starts to flow from
//! the seed discs painted around the user's markers and the water level is
//! raised one step at a time. A pixel is claimed by whichever seed region's
//! water reaches it first. When water from two *different* seed classes meets,
//! the meeting pixel is turned into a wall (the ridge sentinel) rather than
//! being given to either side.
//!
//! Every seed of the same [`MarkerClass`] paints the same label, so the output
//! has at most two regions (internal and external) plus the ridge lines that
//! separate them.
//!
//! # Artifacts and peculiarities
//! The 1px-wide frame of the surface is never flooded: it is marked as ridge
//! before flooding starts, which also overpaints any seed pixels on the frame.
//! Downstream consumers are expected to mask this frame out again.

use std::collections::VecDeque;

use ndarray as nd;

use crate::error::{HullError, HullResult};
use crate::markers::{Marker, MarkerClass, MARKER_RADIUS};

/// Label of pixels that no seed region could reach
pub const UNLABELLED: i32 = 0;
/// Label of the walls between two different seed regions
pub const RIDGE: i32 = -1;
/// Label painted by [`MarkerClass::Internal`] seeds
pub const INTERNAL_LABEL: i32 = 125;
/// Label painted by [`MarkerClass::External`] seeds
pub const EXTERNAL_LABEL: i32 = 255;

//Pixels that wait in one of the flooding queues
const IN_QUEUE: i32 = -2;
//One queue per possible intensity difference between two u8 pixels
const NUM_LEVELS: usize = u8::MAX as usize + 1;

/// Cancellation probe handed to the flood. The flood stops with
/// [`HullError::Cancelled`] as soon as the probe returns `true`.
pub type CancelProbe<'a> = &'a (dyn Fn() -> bool + Sync);

/// Probe that never cancels, for callers that do not need cancellation.
pub fn never_cancelled() -> bool {
  false
}

impl MarkerClass {
  /// The seed label painted for this class
  pub fn label(self) -> i32 {
    match self {
      MarkerClass::Internal => INTERNAL_LABEL,
      MarkerClass::External => EXTERNAL_LABEL,
    }
  }
}

////////////////////////////////////////////////////////////////////////////////
//                              HELPER FUNCTIONS                              //
////////////////////////////////////////////////////////////////////////////////

#[inline]
fn neighbours_4con(index: (usize, usize)) -> [(usize, usize); 4] {
  let (r, c) = index;
  [(r + 1, c), (r, c + 1), (r, c - 1), (r - 1, c)]
}

#[inline]
fn neighbours_8con(index: (usize, usize)) -> [(usize, usize); 8] {
  let (r, c) = index;
  [
    (r + 1, c),
    (r + 1, c + 1),
    (r + 1, c - 1),
    (r, c + 1),
    (r, c - 1),
    (r - 1, c),
    (r - 1, c + 1),
    (r - 1, c - 1),
  ]
}

#[inline(always)]
fn is_interior(index: (usize, usize), shape: (usize, usize)) -> bool {
  index.0 > 0 && index.1 > 0 && index.0 + 1 < shape.0 && index.1 + 1 < shape.1
}

/// Steepness between two pixels: the largest per-channel intensity difference
#[inline]
fn steepness(surface: &nd::ArrayView3<u8>, a: (usize, usize), b: (usize, usize)) -> usize {
  surface
    .slice(nd::s![a.0, a.1, ..])
    .iter()
    .zip(surface.slice(nd::s![b.0, b.1, ..]).iter())
    .map(|(&pa, &pb)| pa.abs_diff(pb) as usize)
    .max()
    .unwrap_or(0)
}

fn mark_frame(labels: &mut nd::Array2<i32>) {
  let (rows, cols) = labels.dim();
  if rows == 0 || cols == 0 {
    return;
  }
  labels.row_mut(0).fill(RIDGE);
  labels.row_mut(rows - 1).fill(RIDGE);
  labels.column_mut(0).fill(RIDGE);
  labels.column_mut(cols - 1).fill(RIDGE);
}

////////////////////////////////////////////////////////////////////////////////
//                                 LABEL MAP                                  //
////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq, Eq)]
/// Output of the watershed: one `i32` label per pixel, indexed `(row, column)`.
///
/// Cells hold [`UNLABELLED`], [`RIDGE`], or the label of the seed class that
/// claimed them ([`INTERNAL_LABEL`] or [`EXTERNAL_LABEL`]).
pub struct LabelMap {
  labels: nd::Array2<i32>,
}

impl LabelMap {
  /// The degenerate segmentation of a `rows x cols` image that has no seeds:
  /// an unlabelled interior inside a ridge frame.
  pub fn uniform(rows: usize, cols: usize) -> Self {
    let mut labels = nd::Array2::from_elem((rows, cols), UNLABELLED);
    mark_frame(&mut labels);
    LabelMap { labels }
  }

  pub fn view(&self) -> nd::ArrayView2<'_, i32> {
    self.labels.view()
  }

  /// `(rows, columns)`
  pub fn dim(&self) -> (usize, usize) {
    self.labels.dim()
  }

  /// Label at image position `(x, y)`, `None` outside the image
  pub fn at(&self, x: usize, y: usize) -> Option<i32> {
    self.labels.get((y, x)).copied()
  }

  /// Number of pixels carrying `label`
  pub fn count(&self, label: i32) -> usize {
    self.labels.iter().filter(|&&l| l == label).count()
  }

  /// Number of distinct seed regions present in the map
  pub fn region_count(&self) -> usize {
    let seen = self.labels.fold([false; u8::MAX as usize + 1], |mut seen, &label| {
      if (1..=u8::MAX as i32).contains(&label) {
        seen[label as usize] = true;
      }
      seen
    });
    seen.iter().filter(|&&present| present).count()
  }

  /// Converts the labels into an 8-bit image. Labels are saturated into the
  /// `u8` range, which renders the ridge sentinel as solid black (0).
  pub fn to_discrete(&self) -> nd::Array2<u8> {
    self.labels.mapv(|label| num_traits::clamp(label, 0, u8::MAX as i32) as u8)
  }

  pub fn into_inner(self) -> nd::Array2<i32> {
    self.labels
  }
}

////////////////////////////////////////////////////////////////////////////////
//                          WATERSHED TRANSFORMS                              //
////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// Neighbourhood used when a pixel decides which region it joins.
///
/// Water always spreads to the 4 direct neighbours. With `Eight`, a pixel that
/// only *diagonally* touches a second region also becomes ridge, which yields
/// walls that stay closed under 8-connected contour following.
pub enum Connectivity {
  #[default]
  Four,
  Eight,
}

#[derive(Debug, Clone)]
/// Builder for configuring a marker-controlled watershed transform.
///
/// Once the desired options are set, a watershed transform object can be
/// generated with the `build()` associated function. This returns a trait
/// object of the type `Box<dyn Watershed + Send + Sync>`, which can be shared
/// between threads.
pub struct TransformBuilder {
  seed_radius: u32,
  connectivity: Connectivity,
}

impl Default for TransformBuilder {
  fn default() -> Self {
    TransformBuilder { seed_radius: MARKER_RADIUS as u32, connectivity: Connectivity::Four }
  }
}

impl TransformBuilder {
  /// Largest seed disc radius accepted by `build()`
  pub const MAX_SEED_RADIUS: u32 = 64;

  /// creates a new `TransformBuilder` with 5px seed discs and 4-connected
  /// region voting
  pub fn new() -> Self {
    Self::default()
  }

  /// Set the radius of the disc painted around each marker.
  pub fn set_seed_radius(mut self, seed_radius: u32) -> Self {
    self.seed_radius = seed_radius;
    self
  }

  /// Set the neighbourhood used to decide region membership.
  pub fn set_connectivity(mut self, connectivity: Connectivity) -> Self {
    self.connectivity = connectivity;
    self
  }

  /// Build a `Box<dyn Watershed + Send + Sync>` from the current builder
  /// configuration. This function returns an `Err` if the seed radius is zero
  /// or larger than [`Self::MAX_SEED_RADIUS`].
  pub fn build(self) -> Result<Box<dyn Watershed + Send + Sync>, String> {
    if self.seed_radius == 0 || self.seed_radius > Self::MAX_SEED_RADIUS {
      Err(format!(
        "Seed radius was set at {}, which is outside of the allowed range (1..={}).",
        self.seed_radius,
        Self::MAX_SEED_RADIUS
      ))?
    }
    Ok(Box::new(MarkerWatershed { seed_radius: self.seed_radius, connectivity: self.connectivity }))
  }
}

/// Actual trait for performing the watershed transform. This trait is dyn-safe,
/// which means that trait objects may be constructed from it.
pub trait Watershed {
  /// Paints the seed discs of `markers`, in order, onto an all-unlabelled map
  /// of the given `(rows, columns)` shape. Discs are clipped to the map.
  fn seed_markers(&self, shape: (usize, usize), markers: &[Marker]) -> nd::Array2<i32>;

  /// Floods `surface` (indexed `(row, column, channel)`) starting from the
  /// labelled pixels of `seeds`. Returns an error if the shapes disagree or if
  /// `cancelled` fires.
  fn transform(
    &self,
    surface: nd::ArrayView3<u8>,
    seeds: nd::Array2<i32>,
    cancelled: CancelProbe,
  ) -> HullResult<LabelMap>;

  /// Seeds and floods in one go. Without markers the result is
  /// [`LabelMap::uniform`].
  fn segment(
    &self,
    surface: nd::ArrayView3<u8>,
    markers: &[Marker],
    cancelled: CancelProbe,
  ) -> HullResult<LabelMap> {
    let (rows, cols, _) = surface.dim();
    if markers.is_empty() {
      log::warn!("segmenting without markers, returning a uniform label map");
      return Ok(LabelMap::uniform(rows, cols));
    }
    let seeds = self.seed_markers((rows, cols), markers);
    self.transform(surface, seeds, cancelled)
  }
}

/// Implementation of the marker-controlled (segmenting) watershed algorithm.
///
/// See the module documentation for a general introduction to the algorithm.
///
/// Flooding uses one FIFO queue per water level. Pixels bordering a region
/// are queued at the level given by their steepness towards that region; the
/// lowest non-empty queue is always drained first, and pixels within one level
/// are handled in arrival order. The output is therefore fully deterministic.
///
/// # Memory usage
/// Besides the `Array2<i32>` output, the transform keeps at most one queue
/// entry per pixel, so memory usage is roughly three times the size of the
/// label map.
pub struct MarkerWatershed {
  seed_radius: u32,
  connectivity: Connectivity,
}

impl MarkerWatershed {
  fn vote(&self, labels: &nd::Array2<i32>, idx: (usize, usize)) -> i32 {
    let vote = |lab: i32, neigh: i32| {
      if neigh <= 0 {
        lab
      } else if lab == UNLABELLED || lab == neigh {
        neigh
      } else {
        RIDGE
      }
    };
    match self.connectivity {
      Connectivity::Four => neighbours_4con(idx).iter().fold(UNLABELLED, |lab, &n| vote(lab, labels[n])),
      Connectivity::Eight => neighbours_8con(idx).iter().fold(UNLABELLED, |lab, &n| vote(lab, labels[n])),
    }
  }
}

impl Watershed for MarkerWatershed {
  fn seed_markers(&self, shape: (usize, usize), markers: &[Marker]) -> nd::Array2<i32> {
    let mut seeds = nd::Array2::from_elem(shape, UNLABELLED);
    let r = self.seed_radius as i64;
    let (rows, cols) = (shape.0 as i64, shape.1 as i64);

    for marker in markers {
      let label = marker.class.label();
      let (mx, my) = (marker.x as i64, marker.y as i64);
      //Clip the bounding box of the disc to the image
      let (y0, y1) = ((my - r).max(0), (my + r).min(rows - 1));
      let (x0, x1) = ((mx - r).max(0), (mx + r).min(cols - 1));
      for y in y0..=y1 {
        for x in x0..=x1 {
          if (x - mx).pow(2) + (y - my).pow(2) <= r * r {
            seeds[(y as usize, x as usize)] = label;
          }
        }
      }
    }
    seeds
  }

  fn transform(
    &self,
    surface: nd::ArrayView3<u8>,
    seeds: nd::Array2<i32>,
    cancelled: CancelProbe,
  ) -> HullResult<LabelMap> {
    //(1) check shapes and wall off the frame
    let (rows, cols, _) = surface.dim();
    let shape = (rows, cols);
    if seeds.dim() != shape {
      return Err(nd::ShapeError::from_kind(nd::ErrorKind::IncompatibleShape).into());
    }
    let mut labels = seeds;
    mark_frame(&mut labels);

    //(2) queue every unlabelled pixel that touches a seed, at the level of its
    //gentlest slope towards a seed
    let mut queues: Vec<VecDeque<(usize, usize)>> = vec![VecDeque::new(); NUM_LEVELS];
    for r in 1..rows.saturating_sub(1) {
      for c in 1..cols.saturating_sub(1) {
        if labels[(r, c)] != UNLABELLED {
          continue;
        }
        let level = neighbours_4con((r, c))
          .into_iter()
          .filter(|&n| labels[n] > 0)
          .map(|n| steepness(&surface, (r, c), n))
          .min();
        if let Some(level) = level {
          queues[level].push_back((r, c));
          labels[(r, c)] = IN_QUEUE;
        }
      }
    }
    log::debug!(
      "flooding {rows}x{cols} px from {} seeded px",
      labels.iter().filter(|&&l| l > 0).count()
    );

    //(3) set-up progress bar
    #[cfg(feature = "progress")]
    let bar = crate::set_up_bar(NUM_LEVELS as u64);

    //(4) raise the water level until every queue is drained
    let mut level = 0;
    let mut probed_level = usize::MAX;
    'flooding: loop {
      //(i) find the lowest level that still has pixels waiting
      while queues[level].is_empty() {
        level += 1;
        if level == NUM_LEVELS {
          break 'flooding;
        }
      }
      if level != probed_level {
        if cancelled() {
          log::debug!("flood cancelled at water level {level}");
          return Err(HullError::Cancelled);
        }
        probed_level = level;
        #[cfg(feature = "progress")]
        bar.set_position(level as u64);
      }

      //(ii) let the neighbours decide which region the pixel joins
      let Some(idx) = queues[level].pop_front() else { continue };
      let lab = self.vote(&labels, idx);
      //A queued pixel always borders a labelled one; fall back to a wall if not
      debug_assert!(lab != UNLABELLED);
      let lab = if lab == UNLABELLED { RIDGE } else { lab };
      labels[idx] = lab;
      if lab == RIDGE {
        continue;
      }

      //(iii) spread the water to unlabelled neighbours
      for n in neighbours_4con(idx) {
        if labels[n] == UNLABELLED && is_interior(n, shape) {
          let n_level = steepness(&surface, idx, n);
          queues[n_level].push_back(n);
          labels[n] = IN_QUEUE;
          level = level.min(n_level);
        }
      }
    }

    #[cfg(feature = "progress")]
    bar.finish_and_clear();

    Ok(LabelMap { labels })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn uniform_surface(rows: usize, cols: usize) -> nd::Array3<u8> {
    nd::Array3::from_elem((rows, cols, 3), 90)
  }

  fn engine() -> Box<dyn Watershed + Send + Sync> {
    TransformBuilder::new().build().unwrap()
  }

  #[test]
  fn builder_rejects_bad_radius() {
    assert!(TransformBuilder::new().set_seed_radius(0).build().is_err());
    assert!(TransformBuilder::new().set_seed_radius(65).build().is_err());
    assert!(TransformBuilder::new().set_seed_radius(64).build().is_ok());
  }

  #[test]
  fn seeds_are_discs_painted_in_order() {
    let markers = [
      Marker::new(10, 10, MarkerClass::External),
      Marker::new(13, 10, MarkerClass::Internal),
    ];
    let seeds = engine().seed_markers((30, 30), &markers);
    //centre and radius of the first disc
    assert_eq!(seeds[(10, 5)], EXTERNAL_LABEL);
    assert_eq!(seeds[(10, 4)], UNLABELLED);
    assert_eq!(seeds[(15, 10)], EXTERNAL_LABEL);
    //overlap goes to the later marker
    assert_eq!(seeds[(10, 10)], INTERNAL_LABEL);
    assert_eq!(seeds[(10, 18)], INTERNAL_LABEL);
    //corners of the bounding box are outside the disc
    assert_eq!(seeds[(15, 18)], UNLABELLED);
  }

  #[test]
  fn out_of_range_markers_are_clipped() {
    let markers = [Marker::new(-3, 2, MarkerClass::External), Marker::new(500, 500, MarkerClass::Internal)];
    let seeds = engine().seed_markers((20, 20), &markers);
    assert_eq!(seeds[(2, 0)], EXTERNAL_LABEL);
    assert_eq!(seeds[(2, 2)], EXTERNAL_LABEL);
    assert_eq!(seeds.iter().filter(|&&l| l == INTERNAL_LABEL).count(), 0);
  }

  #[test]
  fn no_markers_gives_uniform_map() {
    let surface = uniform_surface(12, 9);
    let map = engine().segment(surface.view(), &[], &never_cancelled).unwrap();
    assert_eq!(map, LabelMap::uniform(12, 9));
    assert_eq!(map.region_count(), 0);
    assert_eq!(map.count(RIDGE), 2 * 12 + 2 * 9 - 4);
  }

  #[test]
  fn two_classes_on_uniform_image() {
    let surface = uniform_surface(800, 800);
    let markers = [Marker::new(400, 300, MarkerClass::Internal), Marker::new(10, 10, MarkerClass::External)];
    let map = engine().segment(surface.view(), &markers, &never_cancelled).unwrap();

    assert_eq!(map.dim(), (800, 800));
    assert_eq!(map.region_count(), 2);
    assert_eq!(map.at(400, 300), Some(INTERNAL_LABEL));
    assert_eq!(map.at(10, 10), Some(EXTERNAL_LABEL));
    //ridge pixels separate the regions (besides the frame)
    assert!(map.count(RIDGE) > 4 * 799);
  }

  #[test]
  fn different_regions_never_touch() {
    let surface = uniform_surface(60, 80);
    let markers = [
      Marker::new(20, 20, MarkerClass::Internal),
      Marker::new(60, 40, MarkerClass::External),
      Marker::new(5, 50, MarkerClass::External),
    ];
    for connectivity in [Connectivity::Four, Connectivity::Eight] {
      let ws = TransformBuilder::new().set_connectivity(connectivity).build().unwrap();
      let labels = ws.segment(surface.view(), &markers, &never_cancelled).unwrap().into_inner();
      for ((r, c), &l) in labels.indexed_iter() {
        if l <= 0 || !is_interior((r, c), (60, 80)) {
          continue;
        }
        for n in neighbours_4con((r, c)) {
          assert!(labels[n] <= 0 || labels[n] == l, "regions touch at {:?}", (r, c));
        }
      }
    }
  }

  #[test]
  fn ridge_follows_intensity_wall() {
    //bright vertical bar at column 30 splits a dark plain in two
    let mut surface = nd::Array3::<u8>::zeros((40, 60, 1));
    surface.slice_mut(nd::s![.., 30, ..]).fill(255);
    let markers = [Marker::new(10, 20, MarkerClass::Internal), Marker::new(50, 20, MarkerClass::External)];
    let map = engine().segment(surface.view(), &markers, &never_cancelled).unwrap();

    for y in 1..39 {
      for x in 1..29 {
        assert_eq!(map.at(x, y), Some(INTERNAL_LABEL), "at {:?}", (x, y));
      }
      for x in 32..59 {
        assert_eq!(map.at(x, y), Some(EXTERNAL_LABEL), "at {:?}", (x, y));
      }
    }
  }

  #[test]
  fn flood_is_deterministic() {
    use ndarray_rand::{rand_distr::Uniform, RandomExt};
    let surface = nd::Array3::<u8>::random((64, 64, 3), Uniform::new(0, 255));
    let markers = [Marker::new(32, 32, MarkerClass::Internal), Marker::new(3, 60, MarkerClass::External)];
    let ws = engine();
    let a = ws.segment(surface.view(), &markers, &never_cancelled).unwrap();
    let b = ws.segment(surface.view(), &markers, &never_cancelled).unwrap();
    assert_eq!(a, b);
  }

  #[test]
  fn cancelled_flood_stops() {
    let surface = uniform_surface(30, 30);
    let markers = [Marker::new(15, 15, MarkerClass::Internal)];
    let result = engine().segment(surface.view(), &markers, &|| true);
    assert!(matches!(result, Err(HullError::Cancelled)));
  }

  #[test]
  fn mismatched_seed_shape_is_an_error() {
    let surface = uniform_surface(10, 10);
    let seeds = nd::Array2::from_elem((10, 11), UNLABELLED);
    assert!(matches!(engine().transform(surface.view(), seeds, &never_cancelled), Err(HullError::Shape(_))));
  }

  #[test]
  fn region_count_ignores_ridges_and_queue_markers() {
    let mut labels = nd::Array2::from_elem((4, 4), INTERNAL_LABEL);
    labels[(0, 0)] = RIDGE;
    labels[(1, 1)] = IN_QUEUE;
    labels[(2, 2)] = UNLABELLED;
    let map = LabelMap { labels };
    assert_eq!(map.region_count(), 1);

    let mut labels = map.into_inner();
    labels[(3, 3)] = EXTERNAL_LABEL;
    labels[(3, 2)] = EXTERNAL_LABEL;
    assert_eq!(LabelMap { labels }.region_count(), 2);
  }

  #[test]
  fn discrete_image_renders_ridges_black() {
    let map = LabelMap::uniform(5, 5);
    let discrete = map.to_discrete();
    assert_eq!(discrete[(0, 0)], 0);
    assert_eq!(discrete[(2, 2)], 0);

    let surface = uniform_surface(20, 20);
    let markers = [Marker::new(10, 10, MarkerClass::Internal)];
    let discrete = engine().segment(surface.view(), &markers, &never_cancelled).unwrap().to_discrete();
    assert_eq!(discrete[(10, 10)], INTERNAL_LABEL as u8);
    assert_eq!(discrete[(0, 10)], 0);
  }
}
