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

//! Pixel ↔ metre calibration of a ship profile image.
//!
//! The image is calibrated against the vessel's length between perpendiculars
//! (LPP): the user supplies the LPP in metres together with the pixel columns of
//! the aft and forward perpendiculars, plus the draught and the pixel row of the
//! hull bottom. Everything else is derived here and cannot be supplied by hand.

use serde::{Deserialize, Serialize};

use crate::error::{HullError, HullResult};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
/// Raw calibration constants as measured on the image.
pub struct CalibrationConstants {
  /// Length between perpendiculars, in metres
  pub lpp_m: f64,
  /// Vertical distance from waterline to hull bottom, in metres
  pub draught_m: f64,
  /// Pixel column of the aft perpendicular
  pub lpp_px_min: f64,
  /// Pixel column of the forward perpendicular
  pub lpp_px_max: f64,
  /// Pixel row of the hull bottom (keel line)
  pub bottom_px: f64,
}

impl Default for CalibrationConstants {
  /// Reference vessel: 265 m LPP spanning pixel columns 105..737, 15 m draught,
  /// keel on row 710.
  fn default() -> Self {
    CalibrationConstants {
      lpp_m: 265.0,
      draught_m: 15.0,
      lpp_px_min: 105.0,
      lpp_px_max: 737.0,
      bottom_px: 710.0,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
/// Calibration constants together with the scale factors and reference
/// positions derived from them. Construct with [`CalibrationConfig::new`].
pub struct CalibrationConfig {
  constants: CalibrationConstants,
  lpp_px_len: f64,
  px_to_m: f64,
  m_to_px: f64,
  waterline_px: f64,
  midship_px: f64,
}

impl CalibrationConfig {
  /// Derives the pixel/metre scales, waterline row and midship column from
  /// `constants`. Fails if the constants cannot describe a real scale (zero or
  /// negative LPP span, non-finite values, negative draught).
  pub fn new(constants: CalibrationConstants) -> HullResult<Self> {
    let CalibrationConstants { lpp_m, draught_m, lpp_px_min, lpp_px_max, bottom_px } = constants;

    if ![lpp_m, draught_m, lpp_px_min, lpp_px_max, bottom_px].iter().all(|v| v.is_finite()) {
      return Err(HullError::InvalidCalibration("constants must be finite".into()));
    }
    if lpp_m <= 0.0 {
      return Err(HullError::InvalidCalibration(format!("LPP must be positive, got {lpp_m} m")));
    }
    if lpp_px_max <= lpp_px_min {
      return Err(HullError::InvalidCalibration(format!(
        "forward perpendicular (px {lpp_px_max}) must lie right of the aft one (px {lpp_px_min})"
      )));
    }
    if draught_m < 0.0 {
      return Err(HullError::InvalidCalibration(format!("draught must not be negative, got {draught_m} m")));
    }

    let lpp_px_len = lpp_px_max - lpp_px_min;
    let px_to_m = lpp_m / lpp_px_len;
    let m_to_px = lpp_px_len / lpp_m;

    Ok(CalibrationConfig {
      constants,
      lpp_px_len,
      px_to_m,
      m_to_px,
      waterline_px: bottom_px - draught_m * m_to_px,
      midship_px: lpp_px_min + lpp_px_len / 2.0,
    })
  }

  pub fn constants(&self) -> &CalibrationConstants {
    &self.constants
  }

  /// LPP measured in pixels
  pub fn lpp_px_len(&self) -> f64 {
    self.lpp_px_len
  }

  /// Metres per pixel
  pub fn px_to_m(&self) -> f64 {
    self.px_to_m
  }

  /// Pixels per metre
  pub fn m_to_px(&self) -> f64 {
    self.m_to_px
  }

  /// Image row of the waterline. Rows above it (smaller y) are wind-exposed,
  /// rows at or below it are current-exposed.
  pub fn waterline_px(&self) -> f64 {
    self.waterline_px
  }

  /// Image column of midship, the reference for moment arms
  pub fn midship_px(&self) -> f64 {
    self.midship_px
  }

  /// Converts a pixel area to square metres
  pub fn area_to_m2(&self, area_px: f64) -> f64 {
    area_px * self.px_to_m * self.px_to_m
  }

  /// Converts a pixel length to metres
  pub fn len_to_m(&self, len_px: f64) -> f64 {
    len_px * self.px_to_m
  }
}

impl TryFrom<CalibrationConstants> for CalibrationConfig {
  type Error = HullError;

  fn try_from(constants: CalibrationConstants) -> HullResult<Self> {
    CalibrationConfig::new(constants)
  }
}
