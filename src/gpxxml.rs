use quick_xml::Reader;
use quick_xml::events::{BytesRef, BytesStart, Event};
use time::format_description::well_known::Iso8601;
use time::{OffsetDateTime, PrimitiveDateTime};
use tracing::{debug, trace};

use crate::error::{Axis, CoordinateError, ParseError, Warning};
use crate::model::{Document, Point, PointLocation, Route, Segment, Track};

/// Namespace URIs of GPX 1.0 and 1.1 both start with this.
const GPX_NAMESPACE_PREFIX: &str = "http://www.topografix.com/GPX/";
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const MIN_HEART_RATE: f64 = 30.0;
const MAX_HEART_RATE: f64 = 220.0;

/// A decoded document plus the non-fatal problems found while decoding it.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub document: Document,
    pub warnings: Vec<Warning>,
}

/// Decodes raw GPX bytes into a [`Document`].
///
/// Structural problems (malformed XML, a root element other than `<gpx>`,
/// bad coordinates) fail the whole decode. Unreadable or missing
/// timestamps and elevations only produce [`Warning`]s.
pub fn decode(input: &[u8]) -> Result<Decoded, ParseError> {
    let input = input.strip_prefix(UTF8_BOM).unwrap_or(input);
    let mut decoder = Decoder {
        reader: Reader::from_reader(input),
        warnings: Vec::new(),
    };

    let document = decoder.read_document()?;

    debug!(
        tracks = document.tracks.len(),
        routes = document.routes.len(),
        waypoints = document.waypoints.len(),
        warnings = decoder.warnings.len(),
        "decoded GPX document"
    );
    for warning in &decoder.warnings {
        trace!(%warning, "point warning");
    }

    Ok(Decoded {
        document,
        warnings: decoder.warnings,
    })
}

/// Raw text of the optional children of a point element.
#[derive(Default)]
struct PointFields {
    elevation: Option<String>,
    time: Option<String>,
    name: Option<String>,
    heart_rate: Option<f64>,
}

struct Decoder<'a> {
    reader: Reader<&'a [u8]>,
    warnings: Vec<Warning>,
}

impl<'a> Decoder<'a> {
    fn read_document(&mut self) -> Result<Document, ParseError> {
        let (root, has_children) = self.read_root()?;
        check_root(&root)?;

        let mut document = Document::default();
        for attr in root.attributes() {
            let attr = attr.map_err(|e| self.malformed(e.to_string()))?;
            let key = attr.key.local_name();
            if !matches!(key.as_ref(), b"version" | b"creator") {
                continue;
            }
            let value = attr
                .unescape_value()
                .map_err(|e| self.malformed(e.to_string()))?
                .into_owned();
            match key.as_ref() {
                b"version" => document.version = Some(value),
                _ => document.creator = Some(value),
            }
        }

        if has_children {
            self.read_gpx_children(&mut document)?;
        }
        self.expect_eof()?;

        Ok(document)
    }

    fn read_root(&mut self) -> Result<(BytesStart<'a>, bool), ParseError> {
        loop {
            match self.read_event()? {
                Event::Start(e) => return Ok((e, true)),
                Event::Empty(e) => return Ok((e, false)),
                Event::Text(e) if is_blank(&e) => {}
                Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_) => {}
                Event::Eof => return Err(self.malformed("document has no root element")),
                _ => return Err(self.malformed("unexpected content before the root element")),
            }
        }
    }

    fn expect_eof(&mut self) -> Result<(), ParseError> {
        loop {
            match self.read_event()? {
                Event::Eof => return Ok(()),
                Event::Text(e) if is_blank(&e) => {}
                Event::Comment(_) | Event::PI(_) => {}
                _ => return Err(self.malformed("unexpected content after the root element")),
            }
        }
    }

    fn read_gpx_children(&mut self, document: &mut Document) -> Result<(), ParseError> {
        loop {
            match self.next("gpx")? {
                Event::Start(e) => match e.local_name().as_ref() {
                    b"wpt" => {
                        let location = PointLocation::Waypoint {
                            index: document.waypoints.len(),
                        };
                        let point = self.read_point(&e, location, true)?;
                        document.waypoints.push(point);
                    }
                    b"rte" => {
                        let route = self.read_route(document.routes.len())?;
                        document.routes.push(route);
                    }
                    b"trk" => {
                        let track = self.read_track(document.tracks.len())?;
                        document.tracks.push(track);
                    }
                    b"metadata" => document.name = self.read_metadata()?,
                    b"extensions" => {
                        if let Some(hint) = self.find_in_extensions(is_activity_tag, |text| Some(text.to_owned()))? {
                            document.activity_hint.get_or_insert(hint);
                        }
                    }
                    _ => self.skip(&e)?,
                },
                Event::Empty(e) => match e.local_name().as_ref() {
                    b"wpt" => {
                        let location = PointLocation::Waypoint {
                            index: document.waypoints.len(),
                        };
                        let point = self.read_point(&e, location, false)?;
                        document.waypoints.push(point);
                    }
                    b"rte" => document.routes.push(Route::default()),
                    b"trk" => document.tracks.push(Track::default()),
                    _ => {}
                },
                Event::End(_) => return Ok(()),
                _ => {}
            }
        }
    }

    fn read_metadata(&mut self) -> Result<Option<String>, ParseError> {
        let mut name = None;
        loop {
            match self.next("metadata")? {
                Event::Start(e) if e.local_name().as_ref() == b"name" => {
                    name = non_empty(self.read_text(&e)?);
                }
                Event::Start(e) => self.skip(&e)?,
                Event::End(_) => return Ok(name),
                _ => {}
            }
        }
    }

    fn read_route(&mut self, route: usize) -> Result<Route, ParseError> {
        let mut name = None;
        let mut points = Vec::new();

        loop {
            let (e, has_children) = match self.next("rte")? {
                Event::Start(e) => (e, true),
                Event::Empty(e) => (e, false),
                Event::End(_) => break,
                _ => continue,
            };
            match e.local_name().as_ref() {
                b"rtept" => {
                    let location = PointLocation::RoutePoint {
                        route,
                        point: points.len(),
                    };
                    points.push(self.read_point(&e, location, has_children)?);
                }
                b"name" if has_children => name = non_empty(self.read_text(&e)?),
                _ if has_children => self.skip(&e)?,
                _ => {}
            }
        }

        Ok(Route::new(name, points))
    }

    fn read_track(&mut self, track: usize) -> Result<Track, ParseError> {
        let mut name = None;
        let mut activity_type = None;
        let mut segments = Vec::new();
        let mut segment_index = 0;

        loop {
            match self.next("trk")? {
                Event::Start(e) => match e.local_name().as_ref() {
                    b"name" => name = non_empty(self.read_text(&e)?),
                    b"type" => activity_type = non_empty(self.read_text(&e)?),
                    b"trkseg" => {
                        let points = self.read_segment(track, segment_index)?;
                        segment_index += 1;
                        // Empty segments carry no data and are dropped.
                        if let Some(segment) = Segment::new(points) {
                            segments.push(segment);
                        }
                    }
                    _ => self.skip(&e)?,
                },
                Event::Empty(e) if e.local_name().as_ref() == b"trkseg" => segment_index += 1,
                Event::End(_) => break,
                _ => {}
            }
        }

        Ok(Track::new(name, activity_type, segments))
    }

    fn read_segment(&mut self, track: usize, segment: usize) -> Result<Vec<Point>, ParseError> {
        let mut points = Vec::new();

        loop {
            let (e, has_children) = match self.next("trkseg")? {
                Event::Start(e) => (e, true),
                Event::Empty(e) => (e, false),
                Event::End(_) => return Ok(points),
                _ => continue,
            };
            if e.local_name().as_ref() == b"trkpt" {
                let location = PointLocation::TrackPoint {
                    track,
                    segment,
                    point: points.len(),
                };
                points.push(self.read_point(&e, location, has_children)?);
            } else if has_children {
                self.skip(&e)?;
            }
        }
    }

    /// Reads a `wpt`, `rtept` or `trkpt` element. Called after its start tag.
    fn read_point(
        &mut self,
        start: &BytesStart<'a>,
        location: PointLocation,
        has_children: bool,
    ) -> Result<Point, ParseError> {
        let (lat, lon) = self.read_coordinates(start, location)?;
        let mut point =
            Point::new(lat, lon).map_err(|reason| ParseError::InvalidCoordinate { location, reason })?;

        let fields = if has_children {
            self.read_point_fields()?
        } else {
            PointFields::default()
        };
        let is_track_point = matches!(location, PointLocation::TrackPoint { .. });

        match fields.elevation {
            Some(raw) => match raw.parse::<f64>() {
                Ok(elevation) if elevation.is_finite() => point = point.with_elevation(elevation),
                _ => self.warnings.push(Warning::InvalidElevation {
                    location,
                    value: raw,
                }),
            },
            None if is_track_point => self.warnings.push(Warning::MissingElevation { location }),
            None => {}
        }

        match fields.time {
            Some(raw) => match parse_timestamp(&raw) {
                Some(time) => point = point.with_time(time),
                None => self.warnings.push(Warning::InvalidTimestamp {
                    location,
                    value: raw,
                }),
            },
            None if is_track_point => self.warnings.push(Warning::MissingTimestamp { location }),
            None => {}
        }

        if let Some(bpm) = fields.heart_rate {
            point = point.with_heart_rate(bpm);
        }
        if let Some(name) = fields.name {
            point = point.with_name(name);
        }

        Ok(point)
    }

    fn read_coordinates(
        &self,
        start: &BytesStart<'a>,
        location: PointLocation,
    ) -> Result<(f64, f64), ParseError> {
        let mut lat = None;
        let mut lon = None;

        for attr in start.attributes() {
            let attr = attr.map_err(|e| self.malformed(e.to_string()))?;
            match attr.key.local_name().as_ref() {
                b"lat" => lat = Some(String::from_utf8_lossy(&attr.value).into_owned()),
                b"lon" => lon = Some(String::from_utf8_lossy(&attr.value).into_owned()),
                _ => {}
            }
        }

        let coordinate = |axis: Axis, raw: Option<String>| {
            let raw = raw.ok_or(CoordinateError::Missing { axis })?;
            raw.trim()
                .parse::<f64>()
                .map_err(|_| CoordinateError::NotNumeric { axis, value: raw })
        };
        let invalid = |reason| ParseError::InvalidCoordinate { location, reason };

        let lat = coordinate(Axis::Latitude, lat).map_err(invalid)?;
        let lon = coordinate(Axis::Longitude, lon).map_err(invalid)?;
        Ok((lat, lon))
    }

    fn read_point_fields(&mut self) -> Result<PointFields, ParseError> {
        let mut fields = PointFields::default();
        loop {
            match self.next("point")? {
                Event::Start(e) => match e.local_name().as_ref() {
                    b"ele" => fields.elevation = non_empty(self.read_text(&e)?),
                    b"time" => fields.time = non_empty(self.read_text(&e)?),
                    b"name" => fields.name = non_empty(self.read_text(&e)?),
                    b"extensions" => {
                        let heart_rate = self.find_in_extensions(is_heart_rate_tag, parse_heart_rate)?;
                        fields.heart_rate = fields.heart_rate.or(heart_rate);
                    }
                    _ => self.skip(&e)?,
                },
                Event::End(_) => return Ok(fields),
                _ => {}
            }
        }
    }

    /// Walks an `<extensions>` block and returns the first element, at any
    /// depth, whose local name satisfies `matches` and whose text `accept`
    /// turns into a value. Rejected candidates do not end the search.
    fn find_in_extensions<T>(
        &mut self,
        matches: fn(&[u8]) -> bool,
        accept: fn(&str) -> Option<T>,
    ) -> Result<Option<T>, ParseError> {
        let mut found = None;
        let mut depth = 0usize;

        loop {
            match self.next("extensions")? {
                Event::Start(e) => {
                    if found.is_none() && matches(e.local_name().as_ref()) {
                        found = non_empty(self.read_text(&e)?).and_then(|text| accept(&text));
                    } else {
                        depth += 1;
                    }
                }
                Event::End(_) => {
                    if depth == 0 {
                        return Ok(found);
                    }
                    depth -= 1;
                }
                _ => {}
            }
        }
    }

    /// Collects the text content of the element opened by `start`, up to and
    /// including its end tag. Nested elements are skipped.
    fn read_text(&mut self, start: &BytesStart<'a>) -> Result<String, ParseError> {
        let mut text = String::new();

        loop {
            match self.next("text")? {
                Event::Text(e) => text.push_str(&self.utf8(e.as_ref())?),
                Event::CData(e) => text.push_str(&self.utf8(e.as_ref())?),
                Event::GeneralRef(e) => self.push_reference(&mut text, &e)?,
                Event::Start(e) => self.skip(&e)?,
                Event::End(_) => break,
                _ => {}
            }
        }

        trace!(
            element = %String::from_utf8_lossy(start.name().as_ref()),
            text = %text.trim(),
            "read element text"
        );
        Ok(text.trim().to_owned())
    }

    fn push_reference(&self, text: &mut String, reference: &BytesRef<'a>) -> Result<(), ParseError> {
        match reference.resolve_char_ref() {
            Ok(Some(ch)) => text.push(ch),
            Ok(None) => {
                let name = self.utf8(reference.as_ref())?;
                match name.as_str() {
                    "amp" => text.push('&'),
                    "lt" => text.push('<'),
                    "gt" => text.push('>'),
                    "quot" => text.push('"'),
                    "apos" => text.push('\''),
                    // Entities declared in a DTD are not expanded; keep them verbatim.
                    other => {
                        text.push('&');
                        text.push_str(other);
                        text.push(';');
                    }
                }
            }
            Err(e) => return Err(self.malformed(e.to_string())),
        }
        Ok(())
    }

    fn skip(&mut self, start: &BytesStart<'a>) -> Result<(), ParseError> {
        match self.reader.read_to_end(start.name()) {
            Ok(_) => Ok(()),
            Err(e) => Err(self.xml_error(&e)),
        }
    }

    fn read_event(&mut self) -> Result<Event<'a>, ParseError> {
        match self.reader.read_event() {
            Ok(event) => Ok(event),
            Err(e) => Err(self.xml_error(&e)),
        }
    }

    /// Next event inside an open element; running out of input is an error.
    fn next(&mut self, inside: &str) -> Result<Event<'a>, ParseError> {
        match self.read_event()? {
            Event::Eof => Err(self.malformed(format!("unexpected end of document inside <{inside}>"))),
            event => Ok(event),
        }
    }

    fn utf8(&self, bytes: &[u8]) -> Result<String, ParseError> {
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|e| self.malformed(format!("invalid UTF-8: {e}")))
    }

    fn xml_error(&self, e: &quick_xml::Error) -> ParseError {
        ParseError::MalformedXml {
            position: self.reader.error_position(),
            message: e.to_string(),
        }
    }

    fn malformed(&self, message: impl Into<String>) -> ParseError {
        ParseError::MalformedXml {
            position: self.reader.buffer_position(),
            message: message.into(),
        }
    }
}

/// The root must be `<gpx>`, and if its namespace is declared it must be a GPX one.
fn check_root(root: &BytesStart<'_>) -> Result<(), ParseError> {
    let name = root.name();
    let found = String::from_utf8_lossy(name.as_ref()).into_owned();
    if name.local_name().as_ref() != b"gpx" {
        return Err(ParseError::WrongSchema { found });
    }

    let namespace_attr = match name.prefix() {
        Some(prefix) => [b"xmlns:".as_slice(), prefix.as_ref()].concat(),
        None => b"xmlns".to_vec(),
    };
    for attr in root.attributes().flatten() {
        if attr.key.as_ref() == namespace_attr.as_slice() {
            let uri = String::from_utf8_lossy(&attr.value);
            if !uri.starts_with(GPX_NAMESPACE_PREFIX) {
                return Err(ParseError::WrongSchema {
                    found: format!("{found} xmlns=\"{uri}\""),
                });
            }
        }
    }

    Ok(())
}

/// ISO-8601 with an offset, or without one, in which case UTC is assumed.
fn parse_timestamp(s: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(s, &Iso8601::DEFAULT).ok().or_else(|| {
        PrimitiveDateTime::parse(s, &Iso8601::DEFAULT)
            .ok()
            .map(PrimitiveDateTime::assume_utc)
    })
}

fn is_heart_rate_tag(name: &[u8]) -> bool {
    let name = String::from_utf8_lossy(name).to_lowercase();
    name == "hr" || name.contains("heartrate") || name.contains("heart_rate")
}

fn parse_heart_rate(text: &str) -> Option<f64> {
    text.parse::<f64>()
        .ok()
        .filter(|bpm| (MIN_HEART_RATE..=MAX_HEART_RATE).contains(bpm))
}

fn is_activity_tag(name: &[u8]) -> bool {
    let name = String::from_utf8_lossy(name).to_lowercase();
    name.contains("sport") || name.contains("activity")
}

fn is_blank(bytes: &[u8]) -> bool {
    bytes.iter().all(|b| b.is_ascii_whitespace())
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}
