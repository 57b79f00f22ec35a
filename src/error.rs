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

//! Error type shared by every stage of the hull segmentation pipeline.

use ndarray as nd;
use thiserror::Error;

use crate::split::Region;

/// Errors that can occur while segmenting a hull profile or measuring its
/// wind and current regions.
///
/// Deleting a marker from an empty store and a misordered contour hierarchy are
/// not represented here: the former is a no-op (see
/// [`MarkerStore::delete_nearest`](crate::markers::MarkerStore::delete_nearest))
/// and the latter cannot happen because contours are always sorted by area.
#[derive(Debug, Error)]
pub enum HullError {
  /// The pipeline was asked to segment an image without any seed markers.
  #[error("no seed markers have been placed, the segmentation is degenerate")]
  EmptyMarkerSet,

  /// The outer contour of a region encloses no area, so its centroid is
  /// undefined.
  #[error("the {region} region has no enclosed area, its centroid is undefined")]
  DegenerateContour { region: Region },

  /// The calibration constants cannot produce a pixel/metre scale.
  #[error("invalid calibration: {0}")]
  InvalidCalibration(String),

  /// Pipeline options were rejected by the transform builder.
  #[error("invalid pipeline options: {0}")]
  InvalidOptions(String),

  /// Edge enhancement could not run on the supplied image.
  #[error("edge enhancement failed: {0}")]
  Preprocess(String),

  /// An intermediate buffer did not have the expected dimensions.
  #[error("image buffer has an unexpected shape: {0}")]
  Shape(#[from] nd::ShapeError),

  /// A newer trigger superseded this computation before it finished.
  #[error("computation was superseded by a newer request")]
  Cancelled,
}

/// Convenience alias used throughout the crate.
pub type HullResult<T> = Result<T, HullError>;
