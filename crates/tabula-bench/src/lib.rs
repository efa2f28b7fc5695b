//! Benchmark profiles for the Tabula record engine.
//!
//! Provides pre-populated contexts for benchmarks:
//!
//! - [`airport_profile`]: `n` fixture airports with runways, indexed by code
//! - [`int_map_profile`]: one map with `n` dense integer keys

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use tabula_arena::{ArenaError, Context, IntMap, Ref};
use tabula_test_utils::{Airport, Runway, TestContextBuilder};

/// Records per page used by every profile.
pub const PROFILE_PAGE_RECORDS: u32 = 4096;

/// Fixture declaration sized for benchmarking.
pub fn profile_fixture() -> TestContextBuilder {
    TestContextBuilder::new()
        .records_per_page(PROFILE_PAGE_RECORDS)
        .map_bucket_count(1024)
}

/// Build a context holding `n` airports, each with four runways, plus an
/// index from airport number to airport.
pub fn airport_profile(n: usize) -> Result<(Context, IntMap<Ref<Airport>>), ArenaError> {
    let ctx = profile_fixture().build();
    let index = ctx.write(|d| {
        let index = d.new_map_default::<Ref<Airport>>()?;
        for i in 0..n {
            let runways = d.new_vector::<Runway>(4)?;
            d.vector_mut(runways)?.extend(
                (0..4u16).map(|k| Runway::new(k * 90, 2500 + i as u32 % 1000)),
            )?;
            let code = d.allocate_string(&format!("A{i:05}"))?;
            let airport = d.allocate(Airport {
                code,
                elevation_ft: (i % 5000) as i32,
                latitude: (i % 90) as f64,
                longitude: -((i % 180) as f64),
                runways,
            })?;
            d.map_mut(index)?.add(i as i32, airport)?;
        }
        Ok::<_, ArenaError>(index)
    })?;
    Ok((ctx, index))
}

/// Build a context holding one map with keys `0..n`.
pub fn int_map_profile(n: usize, buckets: usize) -> Result<(Context, IntMap<i32>), ArenaError> {
    let ctx = profile_fixture().build();
    let map = ctx.write(|d| {
        let map = d.new_map::<i32>(buckets)?;
        let mut w = d.map_mut(map)?;
        for k in 0..n as i32 {
            w.add(k, k.wrapping_mul(7))?;
        }
        Ok::<_, ArenaError>(map)
    })?;
    Ok((ctx, map))
}
