#![no_main]
use arbitrary::Arbitrary;
use geo_types::{Coord, LineString};
use libfuzzer_sys::fuzz_target;
use ssp_trajectory_core::{substring, Substring};

#[derive(Debug, Arbitrary)]
struct FuzzData {
    points: Vec<(i16, i16)>,
    start: f64,
    end: f64,
    normalized: bool,
}

fuzz_target!(|data: FuzzData| {
    if data.points.len() < 2 || !data.start.is_finite() || !data.end.is_finite() {
        return;
    }
    let line: LineString<f64> = data
        .points
        .iter()
        .map(|&(x, y)| Coord {
            x: f64::from(x) / 100.0,
            y: f64::from(y) / 100.0,
        })
        .collect::<Vec<_>>()
        .into();

    match substring(&line, data.start, data.end, data.normalized) {
        Substring::Line(cut) => {
            assert!(cut.0.len() >= 2);
            assert!(cut.0.windows(2).all(|pair| pair[0] != pair[1]));
        }
        Substring::Point(_) | Substring::Empty => {}
    }
});
