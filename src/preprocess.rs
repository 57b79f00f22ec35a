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

//! Optional edge-barrier enhancement and conversion of images into the
//! topographic surfaces flooded by the watershed.
//!
//! Weak hull outlines let the flood leak from one seed class into the other.
//! Running a Canny detector, closing the gaps in its edge map and inverting the
//! result turns every detected outline into a dark barrier line on a bright
//! plain. The watershed floods by intensity *difference*, so the barrier lines
//! become steep walls that the ridge will follow.
//!
//! None of this is required for the segmentation to work: when edge
//! enhancement fails the pipeline floods the unmodified colour image.

use image::{imageops, GrayImage, RgbImage};
use imageproc::distance_transform::Norm;
use ndarray as nd;

use crate::error::{HullError, HullResult};

/// Low hysteresis threshold of the Canny detector (0-255 intensity units)
pub const CANNY_LOW: f32 = 50.0;
/// High hysteresis threshold of the Canny detector (0-255 intensity units)
pub const CANNY_HIGH: f32 = 210.0;
/// Radius of the square closing element (1 -> 3x3)
const CLOSING_RADIUS: u8 = 1;
//Smallest extent that fits the 3x3 stencils used by Canny and the closing
const MIN_EXTENT: u32 = 3;

/// Builds the edge-barrier surface of `image`:
/// 1. convert to grayscale;
/// 2. detect edges with Canny ([`CANNY_LOW`], [`CANNY_HIGH`]);
/// 3. close the edge map once with a 3x3 square to bridge one-pixel gaps;
/// 4. invert, so edges become dark barriers on a white background.
pub fn edge_barriers(image: &RgbImage) -> HullResult<GrayImage> {
  let (width, height) = image.dimensions();
  if width < MIN_EXTENT || height < MIN_EXTENT {
    return Err(HullError::Preprocess(format!(
      "image of {width}x{height} px is too small for edge detection (needs at least {MIN_EXTENT}x{MIN_EXTENT})"
    )));
  }

  let gray = imageops::grayscale(image);
  let edges = imageproc::edges::canny(&gray, CANNY_LOW, CANNY_HIGH);

  //Every entry of the 3x3 closing kernel is non-zero, so it acts as a square
  let mut barriers = imageproc::morphology::close(&edges, Norm::LInf, CLOSING_RADIUS);
  imageops::invert(&mut barriers);

  log::debug!(
    "edge barriers: {} of {} px are barrier pixels",
    barriers.pixels().filter(|px| px.0[0] == 0).count(),
    width as usize * height as usize
  );
  Ok(barriers)
}

/// Converts a colour image into a `(row, column, channel)` surface with three
/// channels.
pub fn surface_from_rgb(image: &RgbImage) -> HullResult<nd::Array3<u8>> {
  let (width, height) = image.dimensions();
  let shape = (height as usize, width as usize, 3);
  Ok(nd::Array3::from_shape_vec(shape, image.as_raw().clone())?)
}

/// Converts a grayscale image into a `(row, column, channel)` surface with a
/// single channel.
pub fn surface_from_gray(image: &GrayImage) -> HullResult<nd::Array3<u8>> {
  let (width, height) = image.dimensions();
  let shape = (height as usize, width as usize, 1);
  Ok(nd::Array3::from_shape_vec(shape, image.as_raw().clone())?)
}
