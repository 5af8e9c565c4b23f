//! Text form of a course route as sent to the language model.
//!
//! The budget loop estimates tokens on exactly this string, so anything that
//! builds a prompt around a route must embed `serialize_route` output verbatim.

use crate::models::{CourseRecord, TrackPoint};

/// Token estimator collaborator. Any `Fn(&str) -> usize` qualifies.
pub trait TokenEstimator {
    fn estimate(&self, text: &str) -> usize;
}

impl<F> TokenEstimator for F
where
    F: Fn(&str) -> usize,
{
    fn estimate(&self, text: &str) -> usize {
        self(text)
    }
}

/// Rough estimator for when no model-side tokenizer is wired in.
///
/// Digits and punctuation tokenize densely, so one token per
/// `chars_per_token` characters, rounded up.
#[derive(Debug, Clone, Copy)]
pub struct CharRatioEstimator {
    pub chars_per_token: f64,
}

impl Default for CharRatioEstimator {
    fn default() -> Self {
        Self {
            chars_per_token: 3.0,
        }
    }
}

impl TokenEstimator for CharRatioEstimator {
    fn estimate(&self, text: &str) -> usize {
        if self.chars_per_token <= 0.0 {
            return text.chars().count();
        }
        (text.chars().count() as f64 / self.chars_per_token).ceil() as usize
    }
}

/// Serialize points as one `lat,lon,ele` line per point.
///
/// Coordinates keep 6 decimals (~0.1 m) and elevation 1 decimal.
pub fn serialize_route(points: &[TrackPoint]) -> String {
    let mut out = String::with_capacity(points.len() * 28);
    for p in points {
        out.push_str(&format!("{:.6},{:.6},{:.1}\n", p.lat, p.lon, p.elevation));
    }
    out
}

/// Prompt asking the model to describe a course, with the route embedded.
pub fn course_description_prompt(course: &CourseRecord, route: &str) -> String {
    format!(
        "Describe this running course for runners in two or three sentences.\n\
         Name: {}\nDistance: {:.1} km\nElevation: {:.0}-{:.0} m\nArea: {}\n\
         Route (lat,lon,ele per line):\n{}",
        course.name,
        course.distance_km,
        course.min_elevation,
        course.max_elevation,
        course.area,
        route
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_route_format() {
        let points = [
            TrackPoint {
                lat: 37.5,
                lon: 127.0,
                elevation: 12.34,
                sequence: 1,
            },
            TrackPoint {
                lat: 37.512345678,
                lon: 126.9,
                elevation: 0.0,
                sequence: 2,
            },
        ];
        assert_eq!(
            serialize_route(&points),
            "37.500000,127.000000,12.3\n37.512346,126.900000,0.0\n"
        );
    }

    #[test]
    fn test_serialize_empty() {
        assert_eq!(serialize_route(&[]), "");
    }

    #[test]
    fn test_char_ratio_estimator() {
        let est = CharRatioEstimator::default();
        assert_eq!(est.estimate(""), 0);
        assert_eq!(est.estimate("abc"), 1);
        assert_eq!(est.estimate("abcd"), 2);
    }

    #[test]
    fn test_closure_is_estimator() {
        let words = |text: &str| text.split_whitespace().count();
        assert_eq!(words.estimate("one two three"), 3);
    }
}
