//! Douglas–Peucker polyline simplification over (lon, lat, elevation).
//!
//! The tolerance is expressed in the coordinate units (fractional degrees).
//! The selected points are always a subsequence of the input that keeps both
//! endpoints, and the output is renumbered `1..=m`.

use crate::models::TrackPoint;

/// Simplify a track with Douglas–Peucker.
///
/// Inputs of 0, 1 or 2 points are returned unchanged. A negative or NaN
/// tolerance behaves like 0 (only exactly collinear points are dropped).
pub fn simplify(points: &[TrackPoint], tolerance_deg: f64) -> Vec<TrackPoint> {
    if points.len() <= 2 {
        return points.to_vec();
    }

    let tolerance = if tolerance_deg.is_nan() {
        0.0
    } else {
        tolerance_deg.max(0.0)
    };

    let keep = select_indices(points, tolerance);

    points
        .iter()
        .zip(keep.iter())
        .filter(|(_, &kept)| kept)
        .map(|(p, _)| *p)
        .zip(1u32..)
        .map(|(p, sequence)| TrackPoint { sequence, ..p })
        .collect()
}

/// Mark the indices Douglas–Peucker retains.
///
/// Equivalent to the recursive formulation, with an explicit stack of
/// `(first, last)` segments so long tracks cannot exhaust the call stack.
fn select_indices(points: &[TrackPoint], tolerance: f64) -> Vec<bool> {
    let last = points.len() - 1;
    let mut keep = vec![false; points.len()];
    keep[0] = true;
    keep[last] = true;

    let mut stack = vec![(0usize, last)];
    while let Some((first, end)) = stack.pop() {
        if end <= first + 1 {
            continue;
        }

        let a = coords(&points[first]);
        let b = coords(&points[end]);

        // First maximum wins on ties.
        let mut max_dist = -1.0;
        let mut split = first;
        for (i, p) in points.iter().enumerate().take(end).skip(first + 1) {
            let d = perpendicular_distance(coords(p), a, b);
            if d > max_dist {
                max_dist = d;
                split = i;
            }
        }

        if max_dist > tolerance {
            keep[split] = true;
            stack.push((split, end));
            stack.push((first, split));
        }
    }

    keep
}

fn coords(p: &TrackPoint) -> [f64; 3] {
    [p.lon, p.lat, p.elevation]
}

/// Distance from `p` to the line through `a` and `b`, or to `a` when they coincide.
fn perpendicular_distance(p: [f64; 3], a: [f64; 3], b: [f64; 3]) -> f64 {
    let ab = sub(b, a);
    let ap = sub(p, a);
    let ab_len = norm(ab);
    if ab_len == 0.0 {
        return norm(ap);
    }
    norm(cross(ab, ap)) / ab_len
}

fn sub(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn norm(v: [f64; 3]) -> f64 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}
