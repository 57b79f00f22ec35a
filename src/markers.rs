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

//! Storage for the seed points a user places on the hull profile.

/// Radius (in pixels) of a painted seed disc. A click within this distance of
/// a marker counts as a click "on" that marker.
pub const MARKER_RADIUS: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Which side of the hull outline a seed marker belongs to.
pub enum MarkerClass {
  /// Seed inside the hull silhouette
  Internal,
  /// Seed in the background around the hull
  External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// A single seed point in image coordinates (origin top-left, y downward).
///
/// Coordinates are not checked against the image extent: a marker outside the
/// image is legal and simply paints a clipped (possibly empty) seed disc.
pub struct Marker {
  pub x: i32,
  pub y: i32,
  pub class: MarkerClass,
}

impl Marker {
  pub fn new(x: i32, y: i32, class: MarkerClass) -> Self {
    Marker { x, y, class }
  }

  /// Euclidean distance between this marker and the point `(x, y)`
  pub fn distance_to(&self, x: i32, y: i32) -> f64 {
    let dx = self.x as f64 - x as f64;
    let dy = self.y as f64 - y as f64;
    (dx * dx + dy * dy).sqrt()
  }
}

#[derive(Debug, Clone, Default)]
/// Ordered collection of seed markers.
///
/// Insertion order matters: seed discs are painted in this order, so later
/// markers overpaint earlier ones where they overlap.
pub struct MarkerStore {
  markers: Vec<Marker>,
}

impl MarkerStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Appends a marker. Duplicates and out-of-image positions are accepted.
  pub fn add(&mut self, x: i32, y: i32, class: MarkerClass) {
    self.markers.push(Marker::new(x, y, class));
  }

  /// Removes the marker closest to `(x, y)`, but only if it lies within
  /// [`MARKER_RADIUS`] of the click. Ties go to the marker that was inserted
  /// first. Returns the removed marker, or `None` if nothing was removed
  /// (which includes calling this on an empty store).
  pub fn delete_nearest(&mut self, x: i32, y: i32) -> Option<Marker> {
    //Find the closest marker. Strict comparison keeps the first of equals
    let (idx, dist) = self
      .markers
      .iter()
      .enumerate()
      .map(|(idx, marker)| (idx, marker.distance_to(x, y)))
      .fold(None, |best: Option<(usize, f64)>, (idx, dist)| match best {
        Some((_, best_dist)) if best_dist <= dist => best,
        _ => Some((idx, dist)),
      })?;

    if dist <= MARKER_RADIUS {
      Some(self.markers.remove(idx))
    } else {
      None
    }
  }

  pub fn len(&self) -> usize {
    self.markers.len()
  }

  pub fn is_empty(&self) -> bool {
    self.markers.is_empty()
  }

  pub fn markers(&self) -> &[Marker] {
    &self.markers
  }

  pub fn iter(&self) -> std::slice::Iter<'_, Marker> {
    self.markers.iter()
  }

  pub fn clear(&mut self) {
    self.markers.clear()
  }
}

impl<'a> IntoIterator for &'a MarkerStore {
  type Item = &'a Marker;
  type IntoIter = std::slice::Iter<'a, Marker>;

  fn into_iter(self) -> Self::IntoIter {
    self.markers.iter()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use rand::{rngs::StdRng, Rng, SeedableRng};

  #[test]
  fn delete_on_empty_store_is_a_no_op() {
    let mut store = MarkerStore::new();
    assert_eq!(store.delete_nearest(10, 10), None);
    assert!(store.is_empty());
  }

  #[test]
  fn click_near_internal_marker_deletes_it() {
    let mut store = MarkerStore::new();
    store.add(400, 300, MarkerClass::Internal);
    store.add(10, 10, MarkerClass::External);

    let removed = store.delete_nearest(402, 301).unwrap();
    assert_eq!(removed, Marker::new(400, 300, MarkerClass::Internal));
    assert_eq!(store.markers(), &[Marker::new(10, 10, MarkerClass::External)]);
  }

  #[test]
  fn click_outside_radius_keeps_markers() {
    let mut store = MarkerStore::new();
    store.add(100, 100, MarkerClass::External);
    //distance is sqrt(4^2 + 4^2) ~ 5.66
    assert_eq!(store.delete_nearest(104, 104), None);
    assert_eq!(store.len(), 1);
    //exactly on the radius still counts
    assert!(store.delete_nearest(105, 100).is_some());
  }

  #[test]
  fn ties_go_to_first_inserted() {
    let mut store = MarkerStore::new();
    store.add(50, 48, MarkerClass::Internal);
    store.add(50, 52, MarkerClass::External);
    let removed = store.delete_nearest(50, 50).unwrap();
    assert_eq!(removed.class, MarkerClass::Internal);
    assert_eq!(store.markers()[0].class, MarkerClass::External);
  }

  #[test]
  fn duplicates_and_out_of_range_markers_are_kept() {
    let mut store = MarkerStore::new();
    store.add(-20, 5000, MarkerClass::External);
    store.add(3, 3, MarkerClass::Internal);
    store.add(3, 3, MarkerClass::Internal);
    assert_eq!(store.len(), 3);
    store.delete_nearest(3, 3);
    assert_eq!(store.len(), 2);
  }

  #[test]
  fn delete_removes_at_most_one_marker_within_radius() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..200 {
      let mut store = MarkerStore::new();
      for _ in 0..rng.gen_range(0..12) {
        let class = if rng.gen_bool(0.5) { MarkerClass::Internal } else { MarkerClass::External };
        store.add(rng.gen_range(0..40), rng.gen_range(0..40), class);
      }
      let before: Vec<Marker> = store.markers().to_vec();
      let (cx, cy) = (rng.gen_range(0..40), rng.gen_range(0..40));

      match store.delete_nearest(cx, cy) {
        Some(removed) => {
          assert_eq!(before.len() - store.len(), 1);
          assert!(removed.distance_to(cx, cy) <= MARKER_RADIUS);
          //nothing in the original store was strictly closer
          assert!(before.iter().all(|m| m.distance_to(cx, cy) >= removed.distance_to(cx, cy)));
        }
        None => {
          assert_eq!(before.len(), store.len());
          assert!(before.iter().all(|m| m.distance_to(cx, cy) > MARKER_RADIUS));
        }
      }
    }
  }
}
