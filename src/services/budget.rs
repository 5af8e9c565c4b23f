//! Fit a route into a language-model token budget.
//!
//! Tolerance-to-point-count is nonlinear and differs per course, so instead of
//! a fixed number of passes the tolerance is doubled until the serialized route
//! fits. Every round simplifies the original points, never the previous result.

use thiserror::Error;

use crate::models::TrackPoint;
use crate::services::prompt::{serialize_route, TokenEstimator};
use crate::services::simplify::simplify;

/// Upper bound on tolerance doublings.
pub const MAX_BUDGET_ITERATIONS: u32 = 64;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BudgetError {
    #[error("initial tolerance must be positive and finite, got {0}")]
    InvalidTolerance(f64),
    #[error("route still needs {tokens} tokens at its minimum of two points (budget {max_tokens})")]
    Exhausted { tokens: usize, max_tokens: usize },
    #[error("route did not fit {max_tokens} tokens after {iterations} simplification rounds")]
    IterationCap { iterations: u32, max_tokens: usize },
}

/// Return the least-simplified version of `points` whose serialization fits `max_tokens`.
pub fn fit<E: TokenEstimator + ?Sized>(
    points: &[TrackPoint],
    estimator: &E,
    max_tokens: usize,
    initial_tolerance: f64,
) -> Result<Vec<TrackPoint>, BudgetError> {
    fit_rendered(points, serialize_route, estimator, max_tokens, initial_tolerance)
}

/// Like [`fit`], but the budget applies to `render(points)`, the full text
/// that will be sent (e.g. the route wrapped in a prompt).
pub fn fit_rendered<R, E>(
    points: &[TrackPoint],
    render: R,
    estimator: &E,
    max_tokens: usize,
    initial_tolerance: f64,
) -> Result<Vec<TrackPoint>, BudgetError>
where
    R: Fn(&[TrackPoint]) -> String,
    E: TokenEstimator + ?Sized,
{
    let tokens = estimator.estimate(&render(points));
    if tokens <= max_tokens {
        return Ok(points.to_vec());
    }
    if points.len() <= 2 {
        return Err(BudgetError::Exhausted { tokens, max_tokens });
    }
    if !initial_tolerance.is_finite() || initial_tolerance <= 0.0 {
        return Err(BudgetError::InvalidTolerance(initial_tolerance));
    }

    let mut tolerance = initial_tolerance;
    for iteration in 1..=MAX_BUDGET_ITERATIONS {
        let simplified = simplify(points, tolerance);
        let tokens = estimator.estimate(&render(&simplified));

        tracing::debug!(
            "Budget round {}: tolerance {:e} -> {} points, {} tokens (budget {})",
            iteration,
            tolerance,
            simplified.len(),
            tokens,
            max_tokens
        );

        if tokens <= max_tokens {
            return Ok(simplified);
        }
        if simplified.len() <= 2 {
            return Err(BudgetError::Exhausted { tokens, max_tokens });
        }

        tolerance *= 2.0;
        if !tolerance.is_finite() {
            break;
        }
    }

    Err(BudgetError::IterationCap {
        iterations: MAX_BUDGET_ITERATIONS,
        max_tokens,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::prompt::CharRatioEstimator;
    use std::cell::Cell;

    fn wiggly(n: u32) -> Vec<TrackPoint> {
        (1..=n)
            .map(|i| TrackPoint {
                lat: 37.5 + (i as f64 * 0.7).sin() * 0.01,
                lon: 127.0 + i as f64 * 0.0005,
                elevation: 20.0 + (i as f64 * 0.3).cos() * 5.0,
                sequence: i,
            })
            .collect()
    }

    fn lines(text: &str) -> usize {
        text.lines().count()
    }

    #[test]
    fn test_small_route_returned_unchanged() {
        let points = wiggly(10);
        let out = fit(&points, &lines, 100, 0.0001).unwrap();
        assert_eq!(out, points);
    }

    #[test]
    fn test_large_route_is_simplified_to_fit() {
        let points = wiggly(500);
        let out = fit(&points, &lines, 50, 0.00001).unwrap();
        assert!(out.len() <= 50, "got {} points", out.len());
        assert!(out.len() >= 2);
        assert_eq!(out[0].lat, points[0].lat);
        assert_eq!(out.last().unwrap().lon, points[499].lon);
    }

    #[test]
    fn test_each_round_starts_from_original() {
        // Fitting to a budget must give the same answer as simplifying the
        // original at the final tolerance.
        let points = wiggly(300);
        let est = CharRatioEstimator::default();
        let out = fit(&points, &est, 400, 0.0001).unwrap();
        let mut tol = 0.0001;
        let mut expected = simplify(&points, tol);
        while est.estimate(&serialize_route(&expected)) > 400 {
            tol *= 2.0;
            expected = simplify(&points, tol);
        }
        assert_eq!(out, expected);
    }

    #[test]
    fn test_unachievable_budget_terminates_with_error() {
        let points = wiggly(1000);
        let calls = Cell::new(0u32);
        let counting = |text: &str| {
            calls.set(calls.get() + 1);
            text.len()
        };
        let err = fit(&points, &counting, 5, 0.000001).unwrap_err();
        assert!(matches!(err, BudgetError::Exhausted { max_tokens: 5, .. }));
        assert!(calls.get() <= MAX_BUDGET_ITERATIONS + 1);
    }

    #[test]
    fn test_two_point_route_over_budget_fails_immediately() {
        let points = wiggly(2);
        let err = fit(&points, &|_: &str| 1_000usize, 10, 0.1).unwrap_err();
        assert_eq!(
            err,
            BudgetError::Exhausted {
                tokens: 1_000,
                max_tokens: 10
            }
        );
    }

    #[test]
    fn test_estimator_that_never_fits_hits_iteration_cap_or_floor() {
        // Constant estimator: shedding points never helps, loop must still stop.
        let points = wiggly(400);
        let err = fit(&points, &|_: &str| usize::MAX, 10, 1e-12).unwrap_err();
        assert!(matches!(
            err,
            BudgetError::Exhausted { .. } | BudgetError::IterationCap { .. }
        ));
    }

    #[test]
    fn test_budget_covers_rendered_text() {
        // Five header lines around the route must count against the budget.
        let points = wiggly(400);
        let render = |pts: &[TrackPoint]| format!("a\nb\nc\nd\ne\n{}", serialize_route(pts));
        let out = fit_rendered(&points, render, &lines, 100, 0.00001).unwrap();
        assert!(lines(&render(&out)) <= 100);
        assert!(out.len() <= 95);
    }

    #[test]
    fn test_invalid_tolerance() {
        let points = wiggly(100);
        let err = fit(&points, &lines, 5, 0.0).unwrap_err();
        assert_eq!(err, BudgetError::InvalidTolerance(0.0));
        assert!(fit(&points, &lines, 5, f64::NAN).is_err());
    }
}
