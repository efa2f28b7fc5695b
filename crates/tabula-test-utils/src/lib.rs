//! Test utilities and fixture records for Tabula development.
//!
//! Provides the aerodrome fixture types in [`fixtures`] and a
//! [`TestContextBuilder`] that declares them with small pages, so tests hit
//! page growth and block chaining with only a handful of records.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

pub use fixtures::{Airport, PathPoint, Runway, TaxiPath, Taxiway};

use tabula_arena::{
    ArenaError, Context, ContextBuilder, ContextConfig, IntMap, MapEntry, MapHead, Ref,
    StringRecord, TableConfig, VectorBlock,
};

/// Builder for contexts holding the fixture types.
pub struct TestContextBuilder {
    records_per_page: u32,
    string_page_records: u32,
    map_bucket_count: u32,
}

impl TestContextBuilder {
    pub fn new() -> Self {
        Self {
            records_per_page: 4,
            string_page_records: 64,
            map_bucket_count: 16,
        }
    }

    /// Records per page for every fixture table.
    pub fn records_per_page(mut self, n: u32) -> Self {
        self.records_per_page = n;
        self
    }

    /// Default bucket count for maps.
    pub fn map_bucket_count(mut self, n: u32) -> Self {
        self.map_bucket_count = n;
        self
    }

    /// The declaration, for callers that load instead of build.
    pub fn declare(&self) -> ContextBuilder {
        let config = ContextConfig {
            table: TableConfig::new(self.records_per_page),
            map_bucket_count: self.map_bucket_count,
            ..ContextConfig::default()
        };
        // A head is 12 bytes plus 4 per bucket; keep a few per page.
        let head_records = self.map_bucket_count.max(64);
        ContextBuilder::new()
            .with_config(config)
            .with_type::<Airport>()
            .with_type::<Taxiway>()
            .with_type::<TaxiPath>()
            .with_vector::<Runway>()
            .with_map::<Ref<Airport>>()
            .with_map::<i32>()
            .with_strings()
            .with_capacity::<StringRecord>(self.string_page_records)
            .with_capacity::<TaxiPath>(self.records_per_page.max(8))
            .with_capacity::<VectorBlock<Runway>>(self.records_per_page.max(8))
            .with_capacity::<MapHead<Ref<Airport>>>(head_records)
            .with_capacity::<MapHead<i32>>(head_records)
            .with_capacity::<VectorBlock<MapEntry<Ref<Airport>>>>(64)
            .with_capacity::<VectorBlock<MapEntry<i32>>>(64)
    }

    pub fn build(&self) -> Context {
        self.declare().build().expect("fixture declaration is valid")
    }

    /// Load a stream written from a context of this declaration.
    pub fn load(&self, bytes: &[u8]) -> Result<Context, ArenaError> {
        self.declare().read_from(&mut &bytes[..])
    }
}

impl Default for TestContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Codes, elevations and runway headings of the sample airports.
pub const SAMPLE_AIRPORTS: &[(&str, i32, &[u16])] = &[
    ("KSEA", 433, &[160, 161, 162]),
    ("KPDX", 31, &[100, 280]),
    ("KBFI", 21, &[140]),
    ("KPAE", 608, &[160, 340]),
    ("KGEG", 2376, &[30, 210, 40]),
    ("KBOI", 2871, &[100]),
];

/// Allocate the sample airports with their runways, indexed by code.
///
/// Returns the airports in sample order and a map from the interned code
/// string's offset to each airport.
pub fn populate_airports(
    ctx: &Context,
) -> Result<(Vec<Ref<Airport>>, IntMap<Ref<Airport>>), ArenaError> {
    ctx.write(|d| {
        let index = d.new_map_default::<Ref<Airport>>()?;
        let mut airports = Vec::new();
        for (i, &(code, elevation_ft, headings)) in SAMPLE_AIRPORTS.iter().enumerate() {
            let runways = d.new_vector::<Runway>(1)?;
            {
                let mut w = d.vector_mut(runways)?;
                for &h in headings {
                    w.push(Runway::new(h, 2000 + 100 * h as u32))?;
                }
            }
            let code = d.allocate_string(code)?;
            let airport = d.allocate(Airport {
                code,
                elevation_ft,
                latitude: 45.0 + i as f64,
                longitude: -122.0 - i as f64,
                runways,
            })?;
            d.map_mut(index)?.add(code.offset(), airport)?;
            airports.push(airport);
        }
        Ok((airports, index))
    })
}

/// Build a chain of `n` taxiway segments and return its head.
pub fn taxiway_chain(ctx: &Context, n: usize) -> Result<Ref<Taxiway>, ArenaError> {
    let mut head = Ref::null();
    for i in 0..n {
        head = ctx.allocate(Taxiway::new(10.0 + i as f32, head))?;
    }
    Ok(head)
}

/// Allocate a taxi path along `taxiway` through `points`.
pub fn taxi_path(
    ctx: &Context,
    taxiway: Ref<Taxiway>,
    points: &[PathPoint],
) -> Result<Ref<TaxiPath>, ArenaError> {
    ctx.write(|d| {
        d.allocate_record::<TaxiPath>(points.len(), |w| {
            w.put(&taxiway);
            w.put_i32(0);
            for p in points {
                w.put(p);
            }
        })
    })
}

/// Serialize a context into a fresh buffer.
pub fn save(ctx: &Context) -> Result<Vec<u8>, ArenaError> {
    let mut buf = Vec::new();
    ctx.write_to(&mut buf)?;
    Ok(buf)
}
