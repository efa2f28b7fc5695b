//! Vector, map and string integration tests over the fixture model.

use tabula_arena::{ArenaError, Cursor, IntMap, Ref, StringRecord, Vector};
use tabula_test_utils::{populate_airports, Airport, Runway, TestContextBuilder};

// ── Vectors ─────────────────────────────────────────────────────

#[test]
fn runway_vector_chains_blocks() {
    let ctx = TestContextBuilder::new().build();
    let _scope = ctx.enter();
    let runways = Vector::<Runway>::new(1).unwrap();
    for h in 0..40u16 {
        runways.push(Runway::new(h, 1000)).unwrap();
    }
    assert_eq!(runways.len().unwrap(), 40);
    let caps = ctx.read(|d| d.vector(runways).unwrap().block_capacities().unwrap());
    assert_eq!(caps[0], 1);
    assert!(caps.len() > 3);
    assert!(caps.windows(2).all(|w| w[1] >= w[0]));
    for (i, rw) in runways.to_vec().unwrap().iter().enumerate() {
        assert_eq!(rw.heading_deg, i as u16);
    }
}

#[test]
fn element_cursor_edits_in_place() {
    let ctx = TestContextBuilder::new().build();
    let (airports, _) = populate_airports(&ctx).unwrap();
    let _scope = ctx.enter();
    let seattle = airports[0].get().unwrap();
    let second: Cursor<Runway> = seattle.runways.cursor(1).unwrap();
    second.set(Runway::new(161, 9999)).unwrap();
    assert_eq!(seattle.runways.get(1).unwrap().length_m, 9999);
}

#[test]
fn record_field_update_through_ref() {
    let ctx = TestContextBuilder::new().build();
    let (airports, _) = populate_airports(&ctx).unwrap();
    let _scope = ctx.enter();
    airports[2].update(|a| a.elevation_ft += 100).unwrap();
    assert_eq!(airports[2].get().unwrap().elevation_ft, 121);
}

#[test]
fn vectors_contains_and_last() {
    let ctx = TestContextBuilder::new().build();
    let (airports, _) = populate_airports(&ctx).unwrap();
    let spokane = ctx.get(airports[4]).unwrap();
    ctx.read(|d| {
        let view = d.vector(spokane.runways).unwrap();
        assert!(view.contains(&Runway::new(210, 23000)).unwrap());
        assert_eq!(view.last().unwrap().map(|r| r.heading_deg), Some(40));
        assert_eq!(view.iter().count(), 3);
    });
}

// ── Maps ────────────────────────────────────────────────────────

#[test]
fn airport_index_by_code() {
    let ctx = TestContextBuilder::new().build();
    let (airports, index) = populate_airports(&ctx).unwrap();
    let _scope = ctx.enter();
    assert_eq!(index.len().unwrap(), airports.len());
    let boise = index.try_get_str("KBOI").unwrap().unwrap();
    assert_eq!(&*boise.get().unwrap().code.value().unwrap(), "KBOI");
    let code = StringRecord::find("KPDX").unwrap().unwrap();
    assert_eq!(index.get(code.offset()).unwrap(), airports[1]);
}

#[test]
fn map_of_vectors_keyed_by_elevation_band() {
    let ctx = TestContextBuilder::new().build();
    let (airports, _) = populate_airports(&ctx).unwrap();
    let _scope = ctx.enter();
    let bands = IntMap::<i32>::new(4).unwrap();
    for r in &airports {
        let band = r.get().unwrap().elevation_ft / 1000;
        let seen = bands.try_get(band).unwrap().unwrap_or(0);
        bands.set(band, seen + 1).unwrap();
    }
    let mut entries = bands.entries().unwrap();
    entries.sort();
    assert_eq!(entries, [(0, 4), (2, 2)]);
}

#[test]
fn duplicate_key_reports_key() {
    let ctx = TestContextBuilder::new().build();
    let _scope = ctx.enter();
    let m = IntMap::<Ref<Airport>>::new(8).unwrap();
    m.add(-9, Ref::null()).unwrap();
    let err = m.add(-9, Ref::from_offset(0)).unwrap_err();
    assert!(matches!(err, ArenaError::DuplicateKey { key: -9 }));
    assert!(m.get(-9).unwrap().is_null());
}

// ── Ambient scope errors ────────────────────────────────────────

#[test]
fn handles_need_a_scope() {
    let ctx = TestContextBuilder::new().build();
    let v = ctx.write(|d| d.new_vector::<Runway>(2)).unwrap();
    assert!(matches!(v.len(), Err(ArenaError::NoCurrentContext)));
    let _scope = ctx.enter();
    assert_eq!(v.len().unwrap(), 0);
}

#[test]
fn misaligned_ref_is_rejected() {
    let ctx = TestContextBuilder::new().build();
    let (airports, _) = populate_airports(&ctx).unwrap();
    let stray = Ref::<Airport>::from_offset(airports[1].offset() + 4);
    assert!(matches!(ctx.get(stray), Err(ArenaError::InvalidRef { .. })));
    let past_end = Ref::<Airport>::from_offset(10_000);
    assert!(matches!(ctx.get(past_end), Err(ArenaError::InvalidRef { .. })));
}
