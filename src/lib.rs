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


//! Hull-watershed measures the wind and current areas of a ship from a side
//! profile image, using the marker-controlled watershed algorithm (see Digabel &
//! Lantuéjoul, 1978[^1]) to separate the hull from its background.
//!
//! # Features
//! The user places two kinds of seed markers on the image: *internal* markers on
//! the ship and *external* markers on the background. From there on, everything
//! is recomputed automatically:
//! 1. The image is turned into a topographic surface. By default, Canny edges are
//! detected, closed and inverted so that the hull outline acts as a wall.
//! 2. The watershed floods the surface from the marker seeds. Where water from an
//! internal and an external seed meet, a ridgeline is drawn.
//! 3. The hull silhouette is cut at the waterline into a *wind* (above water) and
//! a *current* (below water) region.
//! 4. For both regions, the contour hierarchy is traced. Holes are subtracted
//! and the net area, centroid and moment arm about midship are computed, both in
//! pixels and in metres.
//!
//! Conversion between pixels and metres follows from a handful of calibration
//! constants (length between perpendiculars, draught and their pixel positions),
//! see [`calibration`].
//!
//! In addition, `hull-watershed` provides extra functionality which can be
//! accessed via cargo feature gates. A list of all additional features [can be found
//! below](#cargo-feature-gates).
//!
//! ## Short example: measuring a profile
//! All state lives in a [`Session`](pipeline::Session). Each marker edit returns
//! a `MarkersChanged` event, which can be run directly or handed to a
//! [`Scheduler`](pipeline::Scheduler) that recomputes in the background and only
//! ever publishes the newest result.
//! ```rust
//! use hull_watershed::prelude::*;
//!
//! //A white canvas with a dark hull drawn in
//! let mut img = image::RgbImage::from_pixel(200, 120, image::Rgb([255, 255, 255]));
//! for x in 40..160 {
//!   for y in 60..100 {
//!     img.put_pixel(x, y, image::Rgb([30, 30, 30]));
//!   }
//! }
//! let constants = CalibrationConstants {
//!   lpp_m: 60.0,
//!   draught_m: 5.0,
//!   lpp_px_min: 40.0,
//!   lpp_px_max: 160.0,
//!   bottom_px: 100.0,
//! };
//! let mut session = Session::new(img, CalibrationConfig::new(constants).unwrap());
//! session.add_marker(100, 80, MarkerClass::Internal);
//! let MarkersChanged(job) = session.add_marker(5, 5, MarkerClass::External);
//!
//! let output = job.run(&never_cancelled).unwrap();
//! if let Ok(current) = &output.current {
//!   println!("{current}");
//! }
//! ```
//! [^1]: H. Digabel and C. Lantuéjoul. **Iterative algorithms.** *In Actes du Second Symposium Européen d’Analyse Quantitative des Microstructures en Sciences des Matériaux, Biologie et Medécine*, October 1978.
//!
//! # Cargo feature gates
//! *By default, all features behind cargo feature gates are **disabled***
//! - `jemalloc`: this feature enables the [jemalloc allocator](https://jemalloc.net).
//! From the jemalloc website: *"jemalloc is a general purpose `malloc`(3)
//! implementation that emphasizes fragmentation avoidance and scalable concurrency
//! support."*. Jemalloc is enabled though usage of the `jemalloc` crate, which
//! increases compile times considerably. To compile `hull-watershed` with the
//! `jemalloc` feature, jemalloc must be installed on the host system.
//! - `progress`: this feature enables a progress bar over the water levels of the
//! watershed flood. Enabling this feature adds the `indicatif` crate as a
//! dependency, which should not considerably slow down compile times.
//! - `debug`: this feature enables performance monitoring output. After every
//! pipeline run, a summary of the time spent per stage is emitted through the
//! `log` facade at debug level. Enabling this feature does not add additional
//! dependencies.
//!
//! # Logging
//! `hull-watershed` logs through the [`log`](https://docs.rs/log) facade and
//! does not install a logger itself. Published metrics are logged at info
//! level, the preprocessing fallback and degenerate regions at warn level.

pub mod calibration;
pub mod contours;
pub mod error;
pub mod markers;
pub mod metrics;
pub mod pipeline;
pub mod preprocess;
pub mod split;
pub mod watershed;

//Set Jemalloc as the global allocator for this crate
#[cfg(feature = "jemalloc")]
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

//Utility prelude for batch import
pub mod prelude {
  pub use crate::calibration::{CalibrationConfig, CalibrationConstants};
  pub use crate::error::{HullError, HullResult};
  pub use crate::markers::{Marker, MarkerClass, MarkerStore};
  pub use crate::metrics::RegionMetrics;
  pub use crate::pipeline::{
    MarkersChanged, PipelineJob, PipelineOptions, PipelineOutput, Published, Scheduler, Session,
  };
  pub use crate::split::Region;
  pub use crate::watershed::{never_cancelled, LabelMap, TransformBuilder, Watershed};
}

////////////////////////////////////////////////////////////////////////////////
//                              HELPER FUNCTIONS                              //
////////////////////////////////////////////////////////////////////////////////

#[cfg(feature = "progress")]
pub(crate) fn set_up_bar(levels: u64) -> indicatif::ProgressBar {
  const TEMPLATE: &str = "{spinner}[{elapsed}/{duration}] water level {pos}/{len}{bar:60}";
  let bar = indicatif::ProgressBar::new(levels);
  match indicatif::ProgressStyle::with_template(TEMPLATE) {
    Ok(style) => bar.set_style(style),
    Err(err) => log::warn!("could not style progress bar: {err}"),
  }
  bar
}

////////////////////////////////////////////////////////////////////////////////
//                             OPTIONAL MODULES                               //
////////////////////////////////////////////////////////////////////////////////
#[cfg(feature = "debug")]
pub(crate) mod performance_monitoring {

  #[derive(Clone, Debug, Default)]
  pub struct PerfReport {
    pub preprocess_ms: usize,
    pub flood_ms: usize,
    pub split_ms: usize,
    pub contour_ms: usize,
    pub total_ms: usize,
  }

  impl PerfReport {
    pub fn stages_total(&self) -> usize {
      self.preprocess_ms + self.flood_ms + self.split_ms + self.contour_ms
    }
  }

  impl std::fmt::Display for PerfReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      writeln!(f, ">---------[Performance Summary]---------")?;
      writeln!(f, ">  Preprocessing: {}ms", self.preprocess_ms)?;
      writeln!(f, ">  Flooding: {}ms", self.flood_ms)?;
      writeln!(f, ">  Waterline split: {}ms", self.split_ms)?;
      writeln!(f, ">  Contours & metrics: {}ms", self.contour_ms)?;
      writeln!(f, ">--------------------------------+ total")?;
      writeln!(
        f,
        ">  {}ms with {}ms overhead (Δt)",
        self.total_ms,
        self.total_ms.saturating_sub(self.stages_total())
      )
    }
  }

  #[cfg(test)]
  mod tests {
    use super::*;

    #[test]
    fn overhead_never_underflows() {
      let report = PerfReport { flood_ms: 10, total_ms: 4, ..Default::default() };
      assert!(report.to_string().contains("4ms with 0ms overhead"));
    }
  }
}
