//! Fixture record types.
//!
//! A small aerodrome model exercising every field kind the engine stores:
//!
//! - [`Airport`]: string reference, scalars, a vector of runways.
//! - [`Runway`]: narrow integers and a flag, stored inline in vectors.
//! - [`Taxiway`]: a self-referencing linked record.
//! - [`TaxiPath`]: a variable-size record with an inline [`PathPoint`] array.

use std::borrow::Cow;

use tabula_arena::{
    ByteReader, ByteWriter, Plain, Record, RecordLayout, Ref, StringRecord, Vector,
};

/// An airport record.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Airport {
    pub code: Ref<StringRecord>,
    pub elevation_ft: i32,
    pub latitude: f64,
    pub longitude: f64,
    pub runways: Vector<Runway>,
}

impl Plain for Airport {
    const SIZE: usize = 28;

    fn type_name() -> Cow<'static, str> {
        Cow::Borrowed("Airport")
    }

    fn encode(&self, w: &mut ByteWriter<'_>) {
        w.put(&self.code);
        w.put_i32(self.elevation_ft);
        w.put_f64(self.latitude);
        w.put_f64(self.longitude);
        w.put(&self.runways);
    }

    fn decode(r: &mut ByteReader<'_>) -> Self {
        Airport {
            code: r.get(),
            elevation_ft: r.get_i32(),
            latitude: r.get_f64(),
            longitude: r.get_f64(),
            runways: r.get(),
        }
    }
}

/// A runway, stored inline in an airport's runway vector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Runway {
    pub heading_deg: u16,
    pub length_m: u32,
    pub surface: u8,
    pub lighted: bool,
}

impl Runway {
    pub fn new(heading_deg: u16, length_m: u32) -> Self {
        Self {
            heading_deg,
            length_m,
            surface: 0,
            lighted: true,
        }
    }
}

impl Plain for Runway {
    const SIZE: usize = 8;

    fn type_name() -> Cow<'static, str> {
        Cow::Borrowed("Runway")
    }

    fn encode(&self, w: &mut ByteWriter<'_>) {
        w.put_u16(self.heading_deg);
        w.put_u32(self.length_m);
        w.put_u8(self.surface);
        w.put(&self.lighted);
    }

    fn decode(r: &mut ByteReader<'_>) -> Self {
        Runway {
            heading_deg: r.get_u16(),
            length_m: r.get_u32(),
            surface: r.get_u8(),
            lighted: r.get(),
        }
    }
}

/// A taxiway segment linked to the next one.
///
/// `id` holds the record's own offset, patched on allocation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Taxiway {
    pub width_m: f32,
    pub id: i32,
    pub next: Ref<Taxiway>,
}

impl Taxiway {
    pub fn new(width_m: f32, next: Ref<Taxiway>) -> Self {
        Self {
            width_m,
            id: -1,
            next,
        }
    }
}

impl Plain for Taxiway {
    const SIZE: usize = 12;
    const SELF_OFFSET: Option<usize> = Some(4);

    fn type_name() -> Cow<'static, str> {
        Cow::Borrowed("Taxiway")
    }

    fn encode(&self, w: &mut ByteWriter<'_>) {
        w.put_f32(self.width_m);
        w.put_i32(self.id);
        w.put(&self.next);
    }

    fn decode(r: &mut ByteReader<'_>) -> Self {
        Taxiway {
            width_m: r.get_f32(),
            id: r.get_i32(),
            next: r.get(),
        }
    }
}

/// One vertex of a taxi path, in metres from the aerodrome reference point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PathPoint {
    pub x: f32,
    pub y: f32,
}

impl Plain for PathPoint {
    const SIZE: usize = 8;

    fn type_name() -> Cow<'static, str> {
        Cow::Borrowed("PathPoint")
    }

    fn encode(&self, w: &mut ByteWriter<'_>) {
        w.put_f32(self.x);
        w.put_f32(self.y);
    }

    fn decode(r: &mut ByteReader<'_>) -> Self {
        PathPoint {
            x: r.get_f32(),
            y: r.get_f32(),
        }
    }
}

/// A taxi route along one taxiway, stored as a polyline.
///
/// ```text
/// 0  taxiway      Ref<Taxiway>
/// 4  point_count  i32
/// 8  points       point_count * PathPoint
/// ```
pub struct TaxiPath {
    _private: (),
}

impl TaxiPath {
    pub const HEADER: usize = 8;
    pub const TAXIWAY_AT: usize = 0;
    pub const COUNT_AT: usize = 4;
}

impl Record for TaxiPath {
    fn type_name() -> Cow<'static, str> {
        Cow::Borrowed("TaxiPath")
    }

    fn layout() -> RecordLayout {
        RecordLayout::variable(Self::HEADER, <PathPoint as Plain>::SIZE, Self::COUNT_AT)
    }
}
