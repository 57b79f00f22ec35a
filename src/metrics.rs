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

//! Conversion of region geometry to physical units, and the annotated overlay.

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_circle_mut;
use ndarray as nd;
use num_traits::ToPrimitive;

use crate::calibration::CalibrationConfig;
use crate::contours::RegionGeometry;
use crate::split::{Region, RegionMasks};

/// Fill colour of the wind region in the composite image
pub const WIND_COLOUR: Rgb<u8> = Rgb([0, 255, 0]);
/// Fill colour of the current region in the composite image
pub const CURRENT_COLOUR: Rgb<u8> = Rgb([0, 0, 255]);
/// Colour of the per-region centroid markers
pub const CENTROID_COLOUR: Rgb<u8> = Rgb([0, 0, 0]);
/// Colour of the combined midship reference marker
pub const MIDSHIP_COLOUR: Rgb<u8> = Rgb([255, 255, 255]);
const MARK_RADIUS: i32 = 4;

#[derive(Debug, Clone, Copy, PartialEq)]
/// Projected area and lever arm of one region, in pixels and metres.
pub struct RegionMetrics {
  pub region: Region,
  /// Net silhouette area (air gaps removed), px²
  pub area_px: f64,
  /// Net silhouette area, m²
  pub area_m2: f64,
  /// Centroid `(x, y)` in image pixels
  pub centroid_px: (f64, f64),
  /// Centroid `(x, y)` scaled to metres, measured from the image origin
  pub centroid_m: (f64, f64),
  /// Horizontal distance between centroid and midship, m
  pub moment_arm_m: f64,
}

impl RegionMetrics {
  pub fn from_geometry(geometry: &RegionGeometry, calibration: &CalibrationConfig) -> Self {
    let (cx, cy) = geometry.centroid_px;
    RegionMetrics {
      region: geometry.region,
      area_px: geometry.net_area_px,
      area_m2: calibration.area_to_m2(geometry.net_area_px),
      centroid_px: (cx, cy),
      centroid_m: (calibration.len_to_m(cx), calibration.len_to_m(cy)),
      moment_arm_m: calibration.len_to_m((cx - calibration.midship_px()).abs()),
    }
  }
}

impl std::fmt::Display for RegionMetrics {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "{} area {:.1} m² ({:.0} px²), centroid ({:.1}, {:.1}) px, moment arm {:.2} m",
      self.region, self.area_m2, self.area_px, self.centroid_px.0, self.centroid_px.1, self.moment_arm_m
    )
  }
}

fn to_point(x: f64, y: f64) -> Option<(i32, i32)> {
  Some((x.round().to_i32()?, y.round().to_i32()?))
}

fn paint_mask(canvas: &mut RgbImage, mask: nd::ArrayView2<u8>, colour: Rgb<u8>) {
  for ((row, col), _) in mask.indexed_iter().filter(|&(_, &px)| px > 0) {
    if let Some(px) = canvas.get_pixel_mut_checked(col as u32, row as u32) {
      *px = colour;
    }
  }
}

/// Draws both regions filled in their colours over a copy of `original`, marks
/// each available centroid, and, when both regions were measured, marks the
/// combined reference point `(midship, mean centroid height)`.
pub fn composite(
  original: &RgbImage,
  masks: &RegionMasks,
  wind: Option<&RegionMetrics>,
  current: Option<&RegionMetrics>,
  calibration: &CalibrationConfig,
) -> RgbImage {
  let mut canvas = original.clone();
  paint_mask(&mut canvas, masks.get(Region::Wind), WIND_COLOUR);
  paint_mask(&mut canvas, masks.get(Region::Current), CURRENT_COLOUR);

  for metrics in [wind, current].into_iter().flatten() {
    if let Some(centre) = to_point(metrics.centroid_px.0, metrics.centroid_px.1) {
      draw_filled_circle_mut(&mut canvas, centre, MARK_RADIUS, CENTROID_COLOUR);
    }
  }

  if let (Some(wind), Some(current)) = (wind, current) {
    let y = (wind.centroid_px.1 + current.centroid_px.1) / 2.0;
    if let Some(centre) = to_point(calibration.midship_px(), y) {
      draw_filled_circle_mut(&mut canvas, centre, MARK_RADIUS, MIDSHIP_COLOUR);
    }
  }
  canvas
}
