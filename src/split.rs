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

//! Recovers the hull silhouette from a label map and cuts it at the waterline.

use ndarray as nd;
use rayon::prelude::*;

use crate::watershed::LabelMap;

/// Default inverse-threshold level: pixels at or below it become foreground
pub const BINARY_THRESHOLD: u8 = 150;
/// Default width (px) of the frame painted over the watershed's border ridge
pub const FRAME_WIDTH: usize = 2;

const FOREGROUND: u8 = u8::MAX;
const BACKGROUND: u8 = 0;
//Colour of the background class in the discrete label image
const BACKGROUND_LABEL: u8 = u8::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Part of the hull silhouette relative to the waterline.
pub enum Region {
  /// Above the waterline, exposed to wind
  Wind,
  /// Below the waterline, exposed to current
  Current,
}

impl std::fmt::Display for Region {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Region::Wind => write!(f, "wind"),
      Region::Current => write!(f, "current"),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Binary masks (0 / 255) of the silhouette above and below the waterline.
/// Together they cover exactly the pixels of the full silhouette mask.
pub struct RegionMasks {
  pub wind: nd::Array2<u8>,
  pub current: nd::Array2<u8>,
}

impl RegionMasks {
  pub fn get(&self, region: Region) -> nd::ArrayView2<'_, u8> {
    match region {
      Region::Wind => self.wind.view(),
      Region::Current => self.current.view(),
    }
  }
}

/// Paints a `width`-pixel frame of background colour around `discrete`,
/// hiding the ridge the watershed leaves along the image border.
pub fn clear_frame(discrete: &mut nd::Array2<u8>, width: usize) {
  let (rows, cols) = discrete.dim();
  let (wr, wc) = (width.min(rows), width.min(cols));
  discrete.slice_mut(nd::s![..wr, ..]).fill(BACKGROUND_LABEL);
  discrete.slice_mut(nd::s![rows - wr.., ..]).fill(BACKGROUND_LABEL);
  discrete.slice_mut(nd::s![.., ..wc]).fill(BACKGROUND_LABEL);
  discrete.slice_mut(nd::s![.., cols - wc..]).fill(BACKGROUND_LABEL);
}

/// Inverse binary threshold: pixels brighter than `threshold` become
/// background (0), all others foreground (255). On a discrete label image
/// this keeps the internal class and the black ridgelines.
pub fn binarize(discrete: nd::ArrayView2<u8>, threshold: u8) -> nd::Array2<u8> {
  let mut mask = nd::Array2::zeros(discrete.dim());
  nd::Zip::from(&mut mask)
    .and(&discrete)
    .par_for_each(|m, &px| *m = if px > threshold { BACKGROUND } else { FOREGROUND });
  mask
}

/// Splits a binary mask at `waterline_px`. Row `y` goes to the wind mask if
/// `y < waterline_px` and to the current mask otherwise.
pub fn split_at_waterline(mask: nd::ArrayView2<u8>, waterline_px: f64) -> RegionMasks {
  let mut wind = mask.to_owned();
  let mut current = mask.to_owned();

  //Black out the rows that belong to the other region
  wind.axis_iter_mut(nd::Axis(0)).into_par_iter().enumerate().for_each(|(row, mut px)| {
    if row as f64 >= waterline_px {
      px.fill(BACKGROUND)
    }
  });
  current.axis_iter_mut(nd::Axis(0)).into_par_iter().enumerate().for_each(|(row, mut px)| {
    if (row as f64) < waterline_px {
      px.fill(BACKGROUND)
    }
  });

  RegionMasks { wind, current }
}

/// Full region split of a label map: render to 8 bits, clear the border
/// frame, threshold, and cut at the waterline.
pub fn split_regions(labels: &LabelMap, waterline_px: f64, threshold: u8, frame_width: usize) -> RegionMasks {
  let mut discrete = labels.to_discrete();
  clear_frame(&mut discrete, frame_width);
  let mask = binarize(discrete.view(), threshold);
  log::debug!(
    "silhouette mask holds {} px, waterline at row {waterline_px:.1}",
    mask.iter().filter(|&&px| px == FOREGROUND).count()
  );
  split_at_waterline(mask.view(), waterline_px)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::watershed::{EXTERNAL_LABEL, INTERNAL_LABEL};

  #[test]
  fn frame_is_cleared() {
    let mut img = nd::Array2::<u8>::zeros((6, 7));
    clear_frame(&mut img, 2);
    assert_eq!(img[(1, 3)], BACKGROUND_LABEL);
    assert_eq!(img[(4, 3)], BACKGROUND_LABEL);
    assert_eq!(img[(3, 1)], BACKGROUND_LABEL);
    assert_eq!(img[(3, 5)], BACKGROUND_LABEL);
    assert_eq!(img[(2, 2)], 0);
    assert_eq!(img[(3, 4)], 0);
    //frames wider than the image just cover everything
    let mut tiny = nd::Array2::<u8>::zeros((3, 3));
    clear_frame(&mut tiny, 5);
    assert!(tiny.iter().all(|&px| px == BACKGROUND_LABEL));
  }

  #[test]
  fn threshold_keeps_internal_class_and_ridges() {
    let discrete = nd::array![[INTERNAL_LABEL as u8, EXTERNAL_LABEL as u8, 0, 150, 151]];
    let mask = binarize(discrete.view(), BINARY_THRESHOLD);
    assert_eq!(mask, nd::array![[255u8, 0, 255, 255, 0]]);
  }

  #[test]
  fn waterline_partitions_mask() {
    let mask = nd::Array2::from_elem((10, 4), FOREGROUND);
    let masks = split_at_waterline(mask.view(), 6.3);
    for row in 0..10 {
      let wind = masks.wind[(row, 0)] == FOREGROUND;
      let current = masks.current[(row, 0)] == FOREGROUND;
      assert_eq!(wind, row <= 6, "row {row}");
      assert_ne!(wind, current, "row {row}");
    }
    assert_eq!(masks.get(Region::Wind), masks.wind.view());
  }

  #[test]
  fn waterline_outside_image() {
    let mask = nd::Array2::from_elem((5, 5), FOREGROUND);
    let above = split_at_waterline(mask.view(), -1.0);
    assert!(above.wind.iter().all(|&px| px == BACKGROUND));
    assert_eq!(above.current, mask);
    let below = split_at_waterline(mask.view(), 1e6);
    assert_eq!(below.wind, mask);
  }
}
