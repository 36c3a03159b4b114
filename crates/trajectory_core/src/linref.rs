//! Linear referencing on planar line strings.
//!
//! Distances are Euclidean in whatever units the coordinates carry: meters
//! for a line in a projected system, degrees for a geodetic one. A negative
//! distance is measured back from the end of the line.

use std::cmp::Ordering;

use geo_types::{Coord, LineString};

/// Result of trimming a line between two linearly referenced positions.
#[derive(Debug, Clone, PartialEq)]
pub enum Substring {
    /// The input line had no vertices.
    Empty,
    /// Both positions resolved to the same place on the line.
    Point(Coord<f64>),
    Line(LineString<f64>),
}

pub fn segment_length(a: Coord<f64>, b: Coord<f64>) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    (dx * dx + dy * dy).sqrt()
}

pub fn line_length(line: &LineString<f64>) -> f64 {
    let mut length = 0.0;
    for pair in line.0.windows(2) {
        length += segment_length(pair[0], pair[1]);
    }
    length
}

/// Distance of every vertex from the start of the line, following the line.
pub fn cumulative_distances(line: &LineString<f64>) -> Vec<f64> {
    let mut distances = Vec::with_capacity(line.0.len());
    let mut travelled = 0.0;
    for (index, coord) in line.0.iter().enumerate() {
        if index > 0 {
            travelled += segment_length(line.0[index - 1], *coord);
        }
        distances.push(travelled);
    }
    distances
}

/// Point at `distance` along the line, clamped to its ends.
pub fn interpolate_point(line: &LineString<f64>, distance: f64) -> Option<Coord<f64>> {
    let first = *line.0.first()?;
    let last = *line.0.last()?;
    let length = line_length(line);
    let distance = if distance < 0.0 {
        length + distance
    } else {
        distance
    };
    if distance <= 0.0 {
        return Some(first);
    }
    if distance >= length {
        return Some(last);
    }

    let mut travelled = 0.0;
    for pair in line.0.windows(2) {
        let segment = segment_length(pair[0], pair[1]);
        if travelled + segment >= distance {
            if segment == 0.0 {
                return Some(pair[0]);
            }
            return Some(lerp(pair[0], pair[1], (distance - travelled) / segment));
        }
        travelled += segment;
    }
    Some(last)
}

/// Closest point lying on the line, which may fall between vertices.
pub fn closest_point(line: &LineString<f64>, point: Coord<f64>) -> Option<Coord<f64>> {
    nearest_location(line, point).map(|location| location.coord)
}

pub fn distance_to_line(line: &LineString<f64>, point: Coord<f64>) -> f64 {
    nearest_location(line, point)
        .map(|location| location.distance)
        .unwrap_or(f64::INFINITY)
}

/// Distance along the line to the point on it closest to `point`. The first
/// segment wins when several are equally close.
pub fn locate_point(line: &LineString<f64>, point: Coord<f64>) -> f64 {
    nearest_location(line, point)
        .map(|location| location.position)
        .unwrap_or(0.0)
}

/// Trims `line` to the part between `start` and `end`.
///
/// With `normalized` set, both values are fractions of the line's length.
/// Positions beyond either end collapse onto that end. When `start > end`
/// the returned line runs backwards, from the `start` position to the `end`
/// position. Interior vertices strictly inside the range are kept as-is and
/// consecutive duplicate vertices are dropped.
pub fn substring(line: &LineString<f64>, start: f64, end: f64, normalized: bool) -> Substring {
    if line.0.is_empty() {
        return Substring::Empty;
    }
    let length = line_length(line);
    let scale = if normalized { length } else { 1.0 };
    let limit = if normalized { 1.0 } else { length };

    // Cases that can only produce a point.
    if start == end {
        return point_at(line, start * scale);
    }
    if start >= limit && end >= limit {
        return point_at(line, length);
    }
    if -start >= limit && -end >= limit {
        return point_at(line, 0.0);
    }

    let start = start * scale;
    let end = end * scale;

    // Positions counted from opposite ends that meet or cross.
    if start < 0.0 && 0.0 < end && start.abs() + end >= length {
        return point_at(line, end);
    }
    if end < 0.0 && 0.0 < start && end.abs() + start >= length {
        return point_at(line, start);
    }

    let from = if start < 0.0 { length + start } else { start };
    let to = if end < 0.0 { length + end } else { end };
    if from > to {
        reversed_cut(line, start, end, length)
    } else {
        forward_cut(line, start, end, length)
    }
}

/// Walks from the `start` position to the `end` position, `start` lying
/// before `end` on the line.
fn forward_cut(line: &LineString<f64>, start: f64, end: f64, length: f64) -> Substring {
    let (Some(start_point), Some(end_point)) =
        (interpolate_point(line, start), interpolate_point(line, end))
    else {
        return Substring::Empty;
    };
    let (lo, hi) = clamped_range(start, end, length);
    finish(walk(line, start_point, end_point, lo, hi))
}

/// `start` lies after `end`: cut from `end` to `start` and flip the result so
/// it still begins at `start`.
fn reversed_cut(line: &LineString<f64>, start: f64, end: f64, length: f64) -> Substring {
    let (Some(start_point), Some(end_point)) =
        (interpolate_point(line, start), interpolate_point(line, end))
    else {
        return Substring::Empty;
    };
    let (lo, hi) = clamped_range(end, start, length);
    let mut coords = walk(line, end_point, start_point, lo, hi);
    coords.reverse();
    finish(coords)
}

fn clamped_range(from: f64, to: f64, length: f64) -> (f64, f64) {
    let mut lo = if from < 0.0 { length + from } else { from };
    let mut hi = if to < 0.0 { length + to } else { to };
    if lo < 0.0 {
        lo = 0.0;
    }
    if hi > length {
        hi = length;
    }
    (lo, hi)
}

fn walk(
    line: &LineString<f64>,
    first: Coord<f64>,
    last: Coord<f64>,
    lo: f64,
    hi: f64,
) -> Vec<Coord<f64>> {
    let mut coords = vec![first];
    let mut travelled = 0.0;
    for pair in line.0.windows(2) {
        if lo < travelled && travelled < hi {
            coords.push(pair[0]);
        } else if travelled >= hi {
            break;
        }
        travelled += segment_length(pair[0], pair[1]);
    }
    coords.push(last);
    coords
}

fn finish(mut coords: Vec<Coord<f64>>) -> Substring {
    coords.dedup();
    match coords.as_slice() {
        [] => Substring::Empty,
        [only] => Substring::Point(*only),
        _ => Substring::Line(LineString::new(coords)),
    }
}

fn point_at(line: &LineString<f64>, distance: f64) -> Substring {
    match interpolate_point(line, distance) {
        Some(coord) => Substring::Point(coord),
        None => Substring::Empty,
    }
}

fn lerp(a: Coord<f64>, b: Coord<f64>, fraction: f64) -> Coord<f64> {
    Coord {
        x: a.x + fraction * (b.x - a.x),
        y: a.y + fraction * (b.y - a.y),
    }
}

#[derive(Debug, Clone, Copy)]
struct NearestLocation {
    coord: Coord<f64>,
    distance: f64,
    position: f64,
}

fn nearest_location(line: &LineString<f64>, point: Coord<f64>) -> Option<NearestLocation> {
    let first = *line.0.first()?;
    if line.0.len() == 1 {
        return Some(NearestLocation {
            coord: first,
            distance: segment_length(point, first),
            position: 0.0,
        });
    }

    let mut best: Option<NearestLocation> = None;
    let mut travelled = 0.0;
    for pair in line.0.windows(2) {
        let segment = segment_length(pair[0], pair[1]);
        let (fraction, coord) = project_onto_segment(point, pair[0], pair[1]);
        let distance = segment_length(point, coord);
        if best.map_or(true, |best| distance < best.distance) {
            best = Some(NearestLocation {
                coord,
                distance,
                position: travelled + fraction * segment,
            });
        }
        travelled += segment;
    }
    best
}

fn project_onto_segment(point: Coord<f64>, a: Coord<f64>, b: Coord<f64>) -> (f64, Coord<f64>) {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let length_sq = dx * dx + dy * dy;
    if length_sq == 0.0 {
        return (0.0, a);
    }
    let fraction = ((point.x - a.x) * dx + (point.y - a.y) * dy) / length_sq;
    if fraction <= 0.0 {
        (0.0, a)
    } else if fraction >= 1.0 {
        (1.0, b)
    } else {
        (fraction, lerp(a, b, fraction))
    }
}

pub(crate) fn cmp_f64(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (true, true) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::coord;

    fn zigzag() -> LineString<f64> {
        // Segments of length 10, 10 and 10.
        LineString::from(vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (20.0, 10.0)])
    }

    fn coords(sub: &Substring) -> Vec<(f64, f64)> {
        match sub {
            Substring::Line(line) => line.0.iter().map(|c| (c.x, c.y)).collect(),
            other => panic!("expected a line, got {:?}", other),
        }
    }

    #[test]
    fn measures_length_and_cumulative_distances() {
        let line = zigzag();
        assert_eq!(line_length(&line), 30.0);
        assert_eq!(cumulative_distances(&line), vec![0.0, 10.0, 20.0, 30.0]);
    }

    #[test]
    fn interpolates_and_clamps() {
        let line = zigzag();
        assert_eq!(interpolate_point(&line, 15.0), Some(coord! { x: 10.0, y: 5.0 }));
        assert_eq!(interpolate_point(&line, 45.0), Some(coord! { x: 20.0, y: 10.0 }));
        assert_eq!(interpolate_point(&line, -5.0), Some(coord! { x: 15.0, y: 10.0 }));
        assert_eq!(interpolate_point(&line, -99.0), Some(coord! { x: 0.0, y: 0.0 }));
        assert_eq!(interpolate_point(&LineString::new(vec![]), 1.0), None);
    }

    #[test]
    fn equal_positions_give_a_point() {
        let line = zigzag();
        for distance in [0.0, 5.0, 10.0, 17.5, 30.0] {
            let expected = interpolate_point(&line, distance).unwrap();
            assert_eq!(
                substring(&line, distance, distance, false),
                Substring::Point(expected)
            );
        }
    }

    #[test]
    fn full_range_reproduces_the_line() {
        let line = zigzag();
        let sub = substring(&line, 0.0, line_length(&line), false);
        assert_eq!(sub, Substring::Line(line.clone()));
        let normalized = substring(&line, 0.0, 1.0, true);
        assert_eq!(normalized, Substring::Line(line));
    }

    #[test]
    fn forward_cut_keeps_interior_vertices() {
        let line = zigzag();
        let sub = substring(&line, 5.0, 25.0, false);
        assert_eq!(
            coords(&sub),
            vec![(5.0, 0.0), (10.0, 0.0), (10.0, 10.0), (15.0, 10.0)]
        );
    }

    #[test]
    fn cut_on_a_vertex_does_not_duplicate_it() {
        let line = zigzag();
        let sub = substring(&line, 10.0, 20.0, false);
        assert_eq!(coords(&sub), vec![(10.0, 0.0), (10.0, 10.0)]);
    }

    #[test]
    fn reversed_cut_runs_from_start_to_end() {
        let line = zigzag();
        let forward = substring(&line, 5.0, 25.0, false);
        let backward = substring(&line, 25.0, 5.0, false);

        let mut expected = coords(&forward);
        expected.reverse();
        assert_eq!(coords(&backward), expected);
        assert_eq!(coords(&backward)[0], (15.0, 10.0));
    }

    #[test]
    fn reversed_cut_matches_forward_cut_for_arbitrary_positions() {
        let line = LineString::from(vec![
            (0.0, 0.0),
            (3.0, 4.0),
            (3.0, 9.0),
            (-1.0, 12.0),
            (-1.0, 20.0),
        ]);
        let length = line_length(&line);
        let positions = [0.0, 1.5, 5.0, 7.25, 10.0, 14.0, length];
        for &a in &positions {
            for &b in &positions {
                if a >= b {
                    continue;
                }
                let mut forward = coords(&substring(&line, a, b, false));
                forward.reverse();
                assert_eq!(coords(&substring(&line, b, a, false)), forward, "{a} {b}");
            }
        }
    }

    #[test]
    fn overrun_past_end_collapses_to_endpoint() {
        let line = zigzag();
        assert_eq!(
            substring(&line, 31.0, 40.0, false),
            Substring::Point(coord! { x: 20.0, y: 10.0 })
        );
        assert_eq!(
            substring(&line, 1.0, 2.0, true),
            Substring::Point(coord! { x: 20.0, y: 10.0 })
        );
    }

    #[test]
    fn overrun_before_start_collapses_to_start() {
        let line = zigzag();
        assert_eq!(
            substring(&line, -31.0, -40.0, false),
            Substring::Point(coord! { x: 0.0, y: 0.0 })
        );
        assert_eq!(
            substring(&line, -1.0, -2.0, true),
            Substring::Point(coord! { x: 0.0, y: 0.0 })
        );
    }

    #[test]
    fn one_sided_overrun_is_clamped() {
        let line = zigzag();
        let sub = substring(&line, 25.0, 100.0, false);
        assert_eq!(coords(&sub), vec![(15.0, 10.0), (20.0, 10.0)]);

        let reversed = substring(&line, 100.0, 25.0, false);
        assert_eq!(coords(&reversed), vec![(20.0, 10.0), (15.0, 10.0)]);
    }

    #[test]
    fn negative_positions_count_from_the_end() {
        let line = zigzag();
        let sub = substring(&line, 5.0, -5.0, false);
        assert_eq!(
            coords(&sub),
            vec![(5.0, 0.0), (10.0, 0.0), (10.0, 10.0), (15.0, 10.0)]
        );
        // 20 back from the end overlaps 15 in from the start.
        assert_eq!(
            substring(&line, -20.0, 15.0, false),
            Substring::Point(coord! { x: 10.0, y: 5.0 })
        );
    }

    #[test]
    fn normalized_positions_scale_by_length() {
        let line = zigzag();
        let sub = substring(&line, 0.5, 0.25, true);
        assert_eq!(coords(&sub), vec![(10.0, 5.0), (10.0, 0.0), (7.5, 0.0)]);
    }

    #[test]
    fn degenerate_lines() {
        assert_eq!(
            substring(&LineString::new(vec![]), 0.0, 1.0, false),
            Substring::Empty
        );
        let single = LineString::from(vec![(1.0, 2.0)]);
        assert_eq!(
            substring(&single, 0.0, 1.0, false),
            Substring::Point(coord! { x: 1.0, y: 2.0 })
        );
        let repeated = LineString::from(vec![(1.0, 2.0), (1.0, 2.0), (1.0, 2.0)]);
        assert_eq!(
            substring(&repeated, 0.0, 1.0, false),
            Substring::Point(coord! { x: 1.0, y: 2.0 })
        );
    }

    #[test]
    fn repeated_vertices_are_dropped() {
        let line = LineString::from(vec![(0.0, 0.0), (5.0, 0.0), (5.0, 0.0), (10.0, 0.0)]);
        let sub = substring(&line, 1.0, 9.0, false);
        assert_eq!(coords(&sub), vec![(1.0, 0.0), (5.0, 0.0), (9.0, 0.0)]);
    }

    #[test]
    fn locates_points_between_vertices() {
        let line = zigzag();
        let point = coord! { x: 12.0, y: 4.0 };
        assert_eq!(closest_point(&line, point), Some(coord! { x: 10.0, y: 4.0 }));
        assert_eq!(locate_point(&line, point), 14.0);
        assert_eq!(distance_to_line(&line, point), 2.0);
        assert_eq!(locate_point(&line, coord! { x: -3.0, y: 0.0 }), 0.0);
        assert_eq!(locate_point(&line, coord! { x: 25.0, y: 10.0 }), 30.0);
    }
}
