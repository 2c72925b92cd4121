use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::{GpxtxError, ParseError};
use crate::gpx_types::*;

type Result<T> = std::result::Result<T, ParseError>;

/// Read and decode the waypoint file behind a generator.
pub fn load_waypoints(path: &Path, kind: WaypointFileType) -> std::result::Result<WaypointSet, GpxtxError> {
    let xml = std::fs::read_to_string(path).map_err(|source| GpxtxError::WaypointLoad {
        path: path.to_path_buf(),
        source,
    })?;
    parse_waypoints(&xml, kind).map_err(|source| GpxtxError::WaypointParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse a GPX XML string into the ordered point sequence selected by `kind`.
pub fn parse_waypoints(xml: &str, kind: WaypointFileType) -> Result<WaypointSet> {
    let mut reader = Reader::from_str(xml);
    let wanted = kind.point_element();
    let mut points = Vec::new();
    let mut seen_root = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if !seen_root {
                    check_root(&e)?;
                    seen_root = true;
                    continue;
                }
                if e.local_name().as_ref() == wanted {
                    if let Some(pt) = parse_point(&e)? {
                        points.push(pt);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ParseError::XmlParse(e)),
            _ => {}
        }
    }

    if !seen_root {
        return Err(ParseError::MissingRoot);
    }

    Ok(WaypointSet::new(points))
}

fn check_root(e: &BytesStart<'_>) -> Result<()> {
    let name = e.local_name();
    if name.as_ref() == b"gpx" {
        Ok(())
    } else {
        Err(ParseError::UnexpectedRoot(
            String::from_utf8_lossy(name.as_ref()).into_owned(),
        ))
    }
}

/// A point with a missing coordinate is skipped; a malformed one is an error.
fn parse_point(e: &BytesStart<'_>) -> Result<Option<Waypoint>> {
    match parse_lat_lon(e) {
        Ok((lat, lon)) => Ok(Some(Waypoint::new(lat, lon))),
        Err(ParseError::MissingAttribute { element, attribute }) => {
            log::warn!("skipping <{element}> without '{attribute}' attribute");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Parse lat/lon attributes from a point element's start tag.
fn parse_lat_lon(e: &BytesStart<'_>) -> Result<(f64, f64)> {
    let mut lat: Option<f64> = None;
    let mut lon: Option<f64> = None;

    for attr_result in e.attributes() {
        let attr = attr_result.map_err(|e| ParseError::XmlParse(e.into()))?;
        let key = attr.key.local_name();
        let val = std::str::from_utf8(&attr.value).unwrap_or_default();
        match key.as_ref() {
            b"lat" => {
                lat = Some(val.trim().parse::<f64>().map_err(|_| {
                    ParseError::InvalidAttribute {
                        element: "point",
                        attribute: "lat",
                        value: val.to_string(),
                    }
                })?);
            }
            b"lon" => {
                lon = Some(val.trim().parse::<f64>().map_err(|_| {
                    ParseError::InvalidAttribute {
                        element: "point",
                        attribute: "lon",
                        value: val.to_string(),
                    }
                })?);
            }
            _ => {}
        }
    }

    let lat = lat.ok_or(ParseError::MissingAttribute {
        element: "point",
        attribute: "lat",
    })?;
    let lon = lon.ok_or(ParseError::MissingAttribute {
        element: "point",
        attribute: "lon",
    })?;

    Ok((lat, lon))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIXED: &str = r#"<?xml version="1.0"?>
<gpx version="1.1">
  <wpt lat="35.0" lon="139.0"><name>First</name></wpt>
  <rte>
    <rtept lat="10.0" lon="20.0"/>
    <rtept lat="11.0" lon="21.0"/>
  </rte>
  <wpt lat="36.0" lon="140.0"/>
  <trk>
    <trkseg>
      <trkpt lat="1.0" lon="2.0"><ele>10.0</ele></trkpt>
    </trkseg>
    <trkseg>
      <trkpt lat="3.0" lon="4.0"/>
    </trkseg>
  </trk>
</gpx>"#;

    #[test]
    fn test_minimal_waypoint() {
        let xml = r#"<?xml version="1.0"?>
<gpx version="1.1">
  <wpt lat="35.6762" lon="139.6503"/>
</gpx>"#;
        let set = parse_waypoints(xml, WaypointFileType::Gpx).unwrap();
        assert_eq!(set.len(), 1);
        assert!((set[0].lat - 35.6762).abs() < 1e-10);
        assert!((set[0].lon - 139.6503).abs() < 1e-10);
    }

    #[test]
    fn test_waypoints_keep_document_order() {
        let set = parse_waypoints(MIXED, WaypointFileType::Gpx).unwrap();
        assert_eq!(
            set.iter().copied().collect::<Vec<_>>(),
            vec![Waypoint::new(35.0, 139.0), Waypoint::new(36.0, 140.0)]
        );
    }

    #[test]
    fn test_route_points() {
        let set = parse_waypoints(MIXED, WaypointFileType::GpxRoute).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set[1], Waypoint::new(11.0, 21.0));
    }

    #[test]
    fn test_track_points_span_segments() {
        let set = parse_waypoints(MIXED, WaypointFileType::GpxTrack).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set[0], Waypoint::new(1.0, 2.0));
        assert_eq!(set[1], Waypoint::new(3.0, 4.0));
    }

    #[test]
    fn test_empty_gpx() {
        let xml = r#"<?xml version="1.0"?><gpx version="1.1"></gpx>"#;
        let set = parse_waypoints(xml, WaypointFileType::Gpx).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_self_closing_root() {
        let set = parse_waypoints("<gpx/>", WaypointFileType::Gpx).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_with_namespace() {
        let xml = r#"<?xml version="1.0"?>
<gpx xmlns="http://www.topografix.com/GPX/1/1" version="1.1">
  <wpt lat="35.0" lon="139.0"><name>Test</name></wpt>
</gpx>"#;
        let set = parse_waypoints(xml, WaypointFileType::Gpx).unwrap();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_missing_lat_lon_skipped() {
        let xml = r#"<?xml version="1.0"?>
<gpx version="1.1">
  <wpt lat="35.0" lon="139.0"><name>Good</name></wpt>
  <wpt><name>Bad - no coords</name></wpt>
  <wpt lat="36.0"/>
  <wpt lat="37.0" lon="141.0"><name>Also Good</name></wpt>
</gpx>"#;
        let set = parse_waypoints(xml, WaypointFileType::Gpx).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set[1], Waypoint::new(37.0, 141.0));
    }

    #[test]
    fn test_invalid_coordinate_is_error() {
        let xml = r#"<gpx><wpt lat="north" lon="139.0"/></gpx>"#;
        let err = parse_waypoints(xml, WaypointFileType::Gpx).unwrap_err();
        assert!(matches!(
            err,
            ParseError::InvalidAttribute { attribute: "lat", .. }
        ));
    }

    #[test]
    fn test_wrong_root_is_error() {
        let xml = r#"<kml><wpt lat="1.0" lon="2.0"/></kml>"#;
        let err = parse_waypoints(xml, WaypointFileType::Gpx).unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedRoot(ref name) if name == "kml"));
    }

    #[test]
    fn test_no_root_is_error() {
        let err = parse_waypoints("", WaypointFileType::Gpx).unwrap_err();
        assert!(matches!(err, ParseError::MissingRoot));
    }

    #[test]
    fn test_mismatched_tags_is_error() {
        let xml = r#"<gpx><wpt lat="1.0" lon="2.0"></trk></gpx>"#;
        assert!(matches!(
            parse_waypoints(xml, WaypointFileType::Gpx),
            Err(ParseError::XmlParse(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_waypoints(Path::new("does/not/exist.gpx"), WaypointFileType::Gpx)
            .unwrap_err();
        assert!(matches!(err, GpxtxError::WaypointLoad { .. }));
    }

    #[test]
    fn test_load_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(
            &mut file,
            br#"<gpx><wpt lat="12.34" lon="-56.78"/></gpx>"#,
        )
        .unwrap();
        let set = load_waypoints(file.path(), WaypointFileType::Gpx).unwrap();
        assert_eq!(set[0], Waypoint::new(12.34, -56.78));
    }
}
