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

//! Contour hierarchy extraction and area/centroid computation per region mask.
//!
//! Contours are found with Suzuki-Abe border following, without point
//! simplification. The order in which border following reports contours says
//! nothing about which one is the silhouette, so contours are always sorted by
//! enclosed area before the largest one is taken as the outer boundary. Every
//! other contour in the mask counts as an air gap and is subtracted from it,
//! whatever its nesting depth.

use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType};
use ndarray as nd;

use crate::error::{HullError, HullResult};
use crate::split::Region;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
/// Raw area moments of a closed polygon, computed with Green's theorem.
///
/// `m00` is signed: its sign follows the orientation of the polygon. The
/// centroid is orientation independent.
pub struct Moments {
  pub m00: f64,
  pub m10: f64,
  pub m01: f64,
}

impl Moments {
  /// Moments of the polygon through `points` (implicitly closed)
  pub fn of_polygon(points: &[(i32, i32)]) -> Self {
    let mut moments = Moments::default();
    if points.len() < 3 {
      return moments;
    }
    for (i, &(xi, yi)) in points.iter().enumerate() {
      let (xj, yj) = points[(i + 1) % points.len()];
      let (xi, yi, xj, yj) = (xi as f64, yi as f64, xj as f64, yj as f64);
      let cross = xi * yj - xj * yi;
      moments.m00 += cross;
      moments.m10 += cross * (xi + xj);
      moments.m01 += cross * (yi + yj);
    }
    moments.m00 /= 2.0;
    moments.m10 /= 6.0;
    moments.m01 /= 6.0;
    moments
  }

  /// Enclosed area (shoelace formula)
  pub fn area(&self) -> f64 {
    self.m00.abs()
  }

  /// `(m10 / m00, m01 / m00)`, or `None` for a polygon without area
  pub fn centroid(&self) -> Option<(f64, f64)> {
    if self.m00 == 0.0 {
      None
    } else {
      Some((self.m10 / self.m00, self.m01 / self.m00))
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorderKind {
  /// Boundary between a foreground component and the background around it
  Outer,
  /// Boundary between a foreground component and a background pocket in it
  Hole,
}

#[derive(Debug, Clone, PartialEq)]
/// A closed border in pixel coordinates `(x, y)`, with its place in the
/// hierarchy. `parent` indexes into the owning [`ContourHierarchy`].
pub struct Contour {
  pub points: Vec<(i32, i32)>,
  pub kind: BorderKind,
  pub parent: Option<usize>,
  pub moments: Moments,
}

impl Contour {
  pub fn area(&self) -> f64 {
    self.moments.area()
  }
}

#[derive(Debug, Clone, Default)]
/// All contours of a mask, sorted by enclosed area (largest first).
pub struct ContourHierarchy {
  contours: Vec<Contour>,
}

impl ContourHierarchy {
  /// Traces every border in `mask` (non-zero pixels are foreground) and sorts
  /// the result by enclosed area, descending. Parent links are remapped to the
  /// sorted order.
  pub fn extract(mask: nd::ArrayView2<u8>) -> Self {
    let (rows, cols) = mask.dim();
    let image = GrayImage::from_fn(cols as u32, rows as u32, |x, y| Luma([mask[(y as usize, x as usize)]]));

    let traced: Vec<Contour> = find_contours::<i32>(&image)
      .into_iter()
      .map(|c| {
        let points: Vec<(i32, i32)> = c.points.iter().map(|p| (p.x, p.y)).collect();
        Contour {
          moments: Moments::of_polygon(&points),
          points,
          kind: match c.border_type {
            BorderType::Outer => BorderKind::Outer,
            BorderType::Hole => BorderKind::Hole,
          },
          parent: c.parent,
        }
      })
      .collect();

    //Sort by area, then translate the parent indices
    let mut order: Vec<usize> = (0..traced.len()).collect();
    order.sort_by(|&a, &b| traced[b].area().total_cmp(&traced[a].area()));
    let mut new_index = vec![0; traced.len()];
    for (new, &old) in order.iter().enumerate() {
      new_index[old] = new;
    }

    let mut traced: Vec<Option<Contour>> = traced.into_iter().map(Some).collect();
    let contours = order
      .iter()
      .filter_map(|&old| traced[old].take())
      .map(|mut contour| {
        contour.parent = contour.parent.map(|p| new_index[p]);
        contour
      })
      .collect();
    ContourHierarchy { contours }
  }

  pub fn contours(&self) -> &[Contour] {
    &self.contours
  }

  pub fn len(&self) -> usize {
    self.contours.len()
  }

  pub fn is_empty(&self) -> bool {
    self.contours.is_empty()
  }

  /// The silhouette boundary: the contour enclosing the largest area
  pub fn outer(&self) -> Option<&Contour> {
    self.contours.first()
  }

  /// Number of parent links between contour `idx` and `ancestor`, or `None`
  /// if `ancestor` does not enclose `idx`
  pub fn depth_below(&self, idx: usize, ancestor: usize) -> Option<usize> {
    let mut depth = 0;
    let mut current = idx;
    while current != ancestor {
      current = self.contours[current].parent?;
      depth += 1;
    }
    Some(depth)
  }
}

#[derive(Debug, Clone, PartialEq)]
/// Pixel-space geometry of one region.
pub struct RegionGeometry {
  pub region: Region,
  /// Area enclosed by the outer silhouette boundary
  pub outer_area_px: f64,
  /// Summed area of every contour other than the outer boundary
  pub hole_area_px: f64,
  /// `outer_area_px - hole_area_px`
  pub net_area_px: f64,
  /// Centroid of the outer boundary `(x, y)`
  pub centroid_px: (f64, f64),
  /// Number of contours traced in the mask
  pub contours: usize,
  /// Contours that do not lie inside the outer boundary. They are still
  /// subtracted, but usually point at a stray blob in the mask
  pub detached: usize,
}

/// Measures the silhouette in `mask`. Fails with
/// [`HullError::DegenerateContour`] if the mask is empty or its largest contour
/// encloses no area.
pub fn analyze_region(mask: nd::ArrayView2<u8>, region: Region) -> HullResult<RegionGeometry> {
  let hierarchy = ContourHierarchy::extract(mask);
  let outer = hierarchy.outer().ok_or(HullError::DegenerateContour { region })?;
  let centroid_px = outer.moments.centroid().ok_or(HullError::DegenerateContour { region })?;
  let outer_area_px = outer.area();

  let others = || hierarchy.contours().iter().enumerate().skip(1);
  let hole_area_px: f64 = others().map(|(_, contour)| contour.area()).sum();
  let detached = others().filter(|&(idx, _)| hierarchy.depth_below(idx, 0).is_none()).count();
  if detached > 0 {
    log::warn!("{region} mask: {detached} contour(s) lie outside the silhouette");
  }

  Ok(RegionGeometry {
    region,
    outer_area_px,
    hole_area_px,
    net_area_px: outer_area_px - hole_area_px,
    centroid_px,
    contours: hierarchy.len(),
    detached,
  })
}
