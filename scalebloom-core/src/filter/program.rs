//! The atomic unit behind every filter operation

use super::generation::GenerationStore;
use crate::hash::{self, HashMaterial};
use crate::sizing::SegmentSizer;
use crate::store::{AtomicUnit, StoreTxn, UnitDigest};
use crate::{Operation, Request, Result};

/// Canonical source of the unit; its digest is the registration key
///
/// Bump the revision whenever the semantics of `run` change so stores never
/// execute a stale registration under the new digest.
const UNIT_SOURCE: &str = "scalebloom/scaling-bloom-filter/rev-1 \
    ops=check,insert,insertnx,remove,count \
    hash=sha1x4 index=kirsch-mitzenmacher sizing=optimal-halving";

/// Scaling Bloom filter program run by the store
///
/// One program serves every filter: namespace, capacity, precision and
/// profile all arrive with the request.
#[derive(Debug, Default)]
pub struct ScalingProgram;

impl ScalingProgram {
    pub fn new() -> Self {
        Self
    }

    /// Digest the program registers under
    pub fn unit_digest() -> UnitDigest {
        UnitDigest::of(UNIT_SOURCE.as_bytes())
    }
}

impl AtomicUnit for ScalingProgram {
    fn digest(&self) -> UnitDigest {
        Self::unit_digest()
    }

    fn run(&self, txn: &mut dyn StoreTxn, request: &Request) -> Result<u64> {
        let config = request.config;
        config.validate()?;

        let mut gens = GenerationStore::new(txn, &request.namespace, config);
        let sizer = SegmentSizer::new(config);
        let derive = || hash::derive(&request.data, config.profile());

        let reply = match request.op {
            Operation::Count => gens.count()?,
            Operation::Check => u64::from(check(&mut gens, &sizer, &derive())?),
            Operation::Insert => {
                insert(&mut gens, &sizer, &derive())?;
                1
            }
            Operation::InsertNx => {
                let material = derive();
                if check(&mut gens, &sizer, &material)? {
                    0
                } else {
                    insert(&mut gens, &sizer, &material)?;
                    1
                }
            }
            Operation::Remove => {
                remove(&mut gens, &sizer, &derive())?;
                1
            }
        };

        Ok(reply)
    }
}

/// Scan segments oldest first, stopping at the first one holding every bit
fn check<T: StoreTxn + ?Sized>(
    gens: &mut GenerationStore<'_, T>,
    sizer: &SegmentSizer,
    material: &HashMaterial,
) -> Result<bool> {
    let current = gens.current_segment()?;

    for segment in 1..=current {
        let params = sizer.params(segment)?;
        let mut found = true;
        for offset in hash::positions(material, params.k, params.bits) {
            if !gens.get_bit(segment, offset)? {
                found = false;
                break;
            }
        }
        if found {
            return Ok(true);
        }
    }

    Ok(false)
}

/// Advance the counter and set the element's bits in the segment it lands in
///
/// The target segment is sized before the counter moves, so a sizing failure
/// leaves the filter untouched.
fn insert<T: StoreTxn + ?Sized>(
    gens: &mut GenerationStore<'_, T>,
    sizer: &SegmentSizer,
    material: &HashMaterial,
) -> Result<()> {
    let params = sizer.params(gens.next_segment()?)?;
    let segment = gens.advance()?;
    debug_assert_eq!(segment, params.segment);

    for offset in hash::positions(material, params.k, params.bits) {
        gens.set_bit(segment, offset, true)?;
    }
    Ok(())
}

/// Clear the element's bits in the current segment only
///
/// Earlier segments are left alone even if the element was written there,
/// and any other element sharing a cleared bit may start reading as absent.
fn remove<T: StoreTxn + ?Sized>(
    gens: &mut GenerationStore<'_, T>,
    sizer: &SegmentSizer,
    material: &HashMaterial,
) -> Result<()> {
    let segment = gens.current_segment()?;
    if segment == 0 {
        return Ok(());
    }

    let params = sizer.params(segment)?;
    for offset in hash::positions(material, params.k, params.bits) {
        gens.set_bit(segment, offset, false)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{BackingStore, Bitmap, MemoryStore, StoredValue};
    use crate::{FilterConfig, Profile};
    use std::sync::Arc;

    fn setup(entries: u64) -> (MemoryStore, UnitDigest, FilterConfig) {
        let store = MemoryStore::default();
        let digest = store.register_unit(Arc::new(ScalingProgram::new())).unwrap();
        (store, digest, FilterConfig::new(entries, 0.01).unwrap())
    }

    fn call(
        store: &MemoryStore,
        digest: &UnitDigest,
        config: FilterConfig,
        op: Operation,
        data: &[u8],
    ) -> u64 {
        store
            .execute(digest, &Request::new("p", config, op, data))
            .unwrap()
    }

    #[test]
    fn test_insert_writes_expected_bits() {
        let (store, digest, config) = setup(100);
        assert_eq!(call(&store, &digest, config, Operation::Insert, b"item"), 1);

        let params = crate::sizing::segment_params(&config, 1).unwrap();
        let material = hash::derive(b"item", Profile::Standard);
        let mut expected = Bitmap::new();
        for offset in hash::positions(&material, params.k, params.bits) {
            expected.set(offset, true);
        }

        match store.get("p:1") {
            Some(StoredValue::Bits(bitmap)) => {
                assert_eq!(bitmap.count_ones(), expected.count_ones());
                for offset in hash::positions(&material, params.k, params.bits) {
                    assert!(bitmap.get(offset));
                }
            }
            other => panic!("unexpected value {:?}", other),
        }
    }

    #[test]
    fn test_check_on_empty_filter_touches_nothing() {
        let (store, digest, config) = setup(10);
        assert_eq!(call(&store, &digest, config, Operation::Check, b"x"), 0);
        assert_eq!(call(&store, &digest, config, Operation::Count, b""), 0);
        assert_eq!(call(&store, &digest, config, Operation::Remove, b"x"), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_insertnx_reply() {
        let (store, digest, config) = setup(10);
        assert_eq!(call(&store, &digest, config, Operation::InsertNx, b"x"), 1);
        assert_eq!(call(&store, &digest, config, Operation::InsertNx, b"x"), 0);
        assert_eq!(call(&store, &digest, config, Operation::Count, b""), 1);
    }

    #[test]
    fn test_remove_targets_current_segment() {
        let (store, digest, config) = setup(1);
        call(&store, &digest, config, Operation::Insert, b"first");
        call(&store, &digest, config, Operation::Insert, b"second");
        let segment_one = store.get("p:1");

        // "first" lives in segment 1; removal only clears segment 2
        call(&store, &digest, config, Operation::Remove, b"first");
        assert_eq!(store.get("p:1"), segment_one);
        assert_eq!(call(&store, &digest, config, Operation::Check, b"first"), 1);

        call(&store, &digest, config, Operation::Remove, b"second");
        let params = crate::sizing::segment_params(&config, 2).unwrap();
        let material = hash::derive(b"second", Profile::Standard);
        match store.get("p:2") {
            Some(StoredValue::Bits(bitmap)) => {
                for offset in hash::positions(&material, params.k, params.bits) {
                    assert!(!bitmap.get(offset));
                }
            }
            other => panic!("unexpected value {:?}", other),
        }
        assert_eq!(call(&store, &digest, config, Operation::Count, b""), 2);
    }

    #[test]
    fn test_sizing_failure_leaves_counter() {
        let store = MemoryStore::default();
        let digest = store.register_unit(Arc::new(ScalingProgram::new())).unwrap();
        let config = FilterConfig::new(1, 0.99).unwrap();
        let result = store.execute(&digest, &Request::new("bad", config, Operation::Insert, b"x"));
        assert!(matches!(result, Err(crate::BloomError::Sizing { .. })));
        assert!(store.is_empty());
    }
}
