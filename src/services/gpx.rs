//! GPX track parser.
//!
//! Reads either of the two point-list shapes a GPX document can carry:
//! - a track: `<trk><trkseg><trkpt/>...</trkseg>...</trk>`
//! - a route: `<rte><rtept/>...</rte>`
//!
//! Track points win when both are present. Whichever shape is used, the result
//! is a single ordered list of `TrackPoint`s numbered from 1 in document order.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

use crate::models::TrackPoint;

/// Errors that can occur during GPX parsing.
#[derive(Debug, Error)]
pub enum GpxError {
    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("<{element}> is missing required attribute '{attribute}'")]
    MissingAttribute { element: String, attribute: String },
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// Which GPX structure a point came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PointSource {
    Track,
    Route,
}

impl PointSource {
    fn from_element(local: &str) -> Option<Self> {
        match local {
            "trkpt" => Some(PointSource::Track),
            "rtept" => Some(PointSource::Route),
            _ => None,
        }
    }

    fn element(self) -> &'static str {
        match self {
            PointSource::Track => "trkpt",
            PointSource::Route => "rtept",
        }
    }
}

/// A point whose `<ele>` child may still be pending.
struct OpenPoint {
    source: PointSource,
    lat: f64,
    lon: f64,
    ele: Option<f64>,
}

/// Parse GPX bytes into an ordered, 1-based sequence of track points.
///
/// Returns an empty list when the document contains neither track nor route
/// points. A missing `<ele>` defaults to 0 (GPX marks it optional); a present
/// but unparsable one is an error.
pub fn parse_track_points(gpx: &[u8]) -> Result<Vec<TrackPoint>, GpxError> {
    let mut reader = Reader::from_reader(gpx);

    let mut track: Vec<(f64, f64, f64)> = Vec::new();
    let mut route: Vec<(f64, f64, f64)> = Vec::new();

    let mut open: Option<OpenPoint> = None;
    let mut reading_ele = false;

    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let local = local_name_str(e.name().as_ref());
                if let Some(source) = PointSource::from_element(&local) {
                    let (lat, lon) = read_lat_lon(e, source)?;
                    open = Some(OpenPoint {
                        source,
                        lat,
                        lon,
                        ele: None,
                    });
                } else if local == "ele" && open.is_some() {
                    reading_ele = true;
                }
            }
            Ok(Event::Empty(ref e)) => {
                // Self-closing <trkpt lat=".." lon=".."/> never produces an End event.
                let local = local_name_str(e.name().as_ref());
                if let Some(source) = PointSource::from_element(&local) {
                    let (lat, lon) = read_lat_lon(e, source)?;
                    match source {
                        PointSource::Track => track.push((lat, lon, 0.0)),
                        PointSource::Route => route.push((lat, lon, 0.0)),
                    }
                }
            }
            Ok(Event::Text(ref e)) => {
                if reading_ele {
                    read_ele(&e.unescape().unwrap_or_default(), open.as_mut())?;
                }
            }
            Ok(Event::CData(ref e)) => {
                if reading_ele {
                    read_ele(&String::from_utf8_lossy(e), open.as_mut())?;
                }
            }
            Ok(Event::End(ref e)) => {
                let local = local_name_str(e.name().as_ref());
                match local.as_str() {
                    "ele" => {
                        reading_ele = false;
                    }
                    "trkpt" | "rtept" => {
                        if let Some(point) = open.take() {
                            let entry = (point.lat, point.lon, point.ele.unwrap_or(0.0));
                            match point.source {
                                PointSource::Track => track.push(entry),
                                PointSource::Route => route.push(entry),
                            }
                        }
                        reading_ele = false;
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(GpxError::Xml(e)),
            _ => {}
        }
        buf.clear();
    }

    let (source, raw) = if !track.is_empty() {
        (PointSource::Track, track)
    } else {
        (PointSource::Route, route)
    };

    if raw.is_empty() {
        tracing::debug!("GPX contains no track or route points");
        return Ok(Vec::new());
    }

    tracing::debug!(
        "Parsed {} points from GPX {} shape",
        raw.len(),
        source.element()
    );

    Ok(raw
        .into_iter()
        .zip(1u32..)
        .map(|((lat, lon, elevation), sequence)| TrackPoint {
            lat,
            lon,
            elevation,
            sequence,
        })
        .collect())
}

/// Read the required `lat`/`lon` attributes of a point element.
fn read_lat_lon(e: &BytesStart<'_>, source: PointSource) -> Result<(f64, f64), GpxError> {
    let mut lat: Option<f64> = None;
    let mut lon: Option<f64> = None;

    for attr in e.attributes().flatten() {
        let key = std::str::from_utf8(attr.key.as_ref()).unwrap_or("");
        let val = std::str::from_utf8(&attr.value).unwrap_or("").trim();
        let target = match key {
            "lat" => &mut lat,
            "lon" => &mut lon,
            _ => continue,
        };
        let parsed = val.parse::<f64>().map_err(|_| GpxError::InvalidValue {
            field: format!("{}@{}", source.element(), key),
            message: format!("not a valid number: '{}'", val),
        })?;
        *target = Some(parsed);
    }

    let missing = |attribute: &str| GpxError::MissingAttribute {
        element: source.element().to_string(),
        attribute: attribute.to_string(),
    };
    Ok((lat.ok_or_else(|| missing("lat"))?, lon.ok_or_else(|| missing("lon"))?))
}

/// Extract the local name from a potentially namespaced XML element name.
/// e.g. `gpx:trkpt` -> `trkpt`, `trkpt` -> `trkpt`
fn read_ele(text: &str, point: Option<&mut OpenPoint>) -> Result<(), GpxError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(());
    }
    let ele = text.parse::<f64>().map_err(|_| GpxError::InvalidValue {
        field: "ele".to_string(),
        message: format!("not a valid number: '{}'", text),
    })?;
    if let Some(point) = point {
        point.ele = Some(ele);
    }
    Ok(())
}

fn local_name_str(full: &[u8]) -> String {
    let s = std::str::from_utf8(full).unwrap_or("");
    match s.rfind(':') {
        Some(pos) => s[pos + 1..].to_string(),
        None => s.to_string(),
    }
}
