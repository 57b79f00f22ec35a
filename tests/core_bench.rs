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


use hull_watershed::prelude::*;
use ndarray as nd;
use ndarray_rand::{rand_distr::Uniform, RandomExt};

#[test]
fn core_bench() {
  //Create a random uniform colour field
  let rf = nd::Array3::<u8>::random((512, 512, 3), Uniform::new(0, 254));
  let img = image::RgbImage::from_raw(512, 512, rf.into_raw_vec()).unwrap();

  //Set-up a session with a ring of external markers around one internal marker
  let cal = CalibrationConfig::new(CalibrationConstants {
    lpp_m: 100.0,
    draught_m: 10.0,
    lpp_px_min: 56.0,
    lpp_px_max: 456.0,
    bottom_px: 400.0,
  })
  .unwrap();
  let mut session = Session::new(img, cal);
  session.add_marker(256, 256, MarkerClass::Internal);
  for (x, y) in [(20, 20), (256, 20), (492, 20), (20, 492), (256, 492), (492, 492)] {
    session.add_marker(x, y, MarkerClass::External);
  }
  let job = session.snapshot();

  println!("Testing 1 to {} threads performance", rayon::current_num_threads());

  //Time with num cores
  let results: Vec<f64> = (1..=rayon::current_num_threads())
    .map(|num_threads| {
      //Set core count
      println!("Running pipeline with {num_threads} thread(s)");
      let pool = rayon::ThreadPoolBuilder::new().num_threads(num_threads).build().unwrap();
      //Time the full recomputation
      let start = std::time::Instant::now();
      let output = pool.install(|| job.run(&never_cancelled)).unwrap();
      assert_eq!(output.label_map.dim(), (512, 512));
      start.elapsed().as_secs_f64()
    })
    .collect();

  //Print per run results
  for (threads, time) in results.iter().enumerate().map(|(i, t)| (i + 1, t)) {
    println!("{threads:02} threads = {time:000.02}s");
  }

  //Print total results
  let average = (1.0 / (results.len() as f64)) * results.iter().sum::<f64>();
  println!("Average time: {average:.02}");
}
