//! The checked-state primitive: `compute(state) -> (state, checksum)`.
//!
//! The checksum is a `blake3` digest of the state's canonical JSON
//! encoding, truncated to 16 hex characters (64 bits of entropy). Canonical
//! ordering comes for free from `serde_json`'s default `Map`
//! representation, which is a `BTreeMap` unless the `preserve_order`
//! feature is enabled (it is not, here), so object keys are always emitted
//! in sorted order regardless of a state's field-insertion order.

use crate::error::SyncError;
use serde::Serialize;

/// `(state, checksum)`: the unit of peer-observable value.
///
/// `checksum` is guaranteed equal to `compute(&state).checksum` for as long
/// as nothing has mutated `state` out from under this value — the public
/// API of the crate only ever constructs one through [`compute`].
#[derive(Debug, Clone, PartialEq)]
pub struct CheckedState<S> {
    pub state: S,
    pub checksum: String,
}

const CHECKSUM_HEX_LEN: usize = 16;

/// Hash `state`'s canonical serialization, deterministically and
/// independent of struct/map key enumeration order.
pub fn checksum_of<S: Serialize>(state: &S) -> Result<String, SyncError> {
    let canonical = serde_json::to_vec(state).map_err(|e| SyncError::StateNotSerializable(e.to_string()))?;
    let digest = blake3::hash(&canonical);
    Ok(digest.to_hex()[..CHECKSUM_HEX_LEN].to_string())
}

/// Produce a `CheckedState` by computing `state`'s checksum.
pub fn compute<S: Serialize>(state: S) -> Result<CheckedState<S>, SyncError> {
    let checksum = checksum_of(&state)?;
    Ok(CheckedState { state, checksum })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use std::collections::BTreeMap as StdBTreeMap;
    use std::collections::HashMap;

    #[test]
    fn is_deterministic() {
        let a = compute(5_i64).unwrap();
        let b = compute(5_i64).unwrap();
        assert_eq!(a.checksum, b.checksum);
    }

    #[test]
    fn differs_for_different_states() {
        let a = compute(5_i64).unwrap();
        let b = compute(6_i64).unwrap();
        assert_ne!(a.checksum, b.checksum);
    }

    #[derive(Serialize)]
    struct Wrapper {
        map: HashMap<String, i32>,
    }

    #[test]
    fn independent_of_map_key_insertion_order() {
        let mut first = HashMap::new();
        first.insert("b".to_string(), 2);
        first.insert("a".to_string(), 1);

        let mut second = HashMap::new();
        second.insert("a".to_string(), 1);
        second.insert("b".to_string(), 2);

        let checksum_a = checksum_of(&Wrapper { map: first }).unwrap();
        let checksum_b = checksum_of(&Wrapper { map: second }).unwrap();
        assert_eq!(checksum_a, checksum_b);
    }

    #[test]
    fn cross_peer_determinism_via_reducer() {
        // Two independent peers starting from the same state and applying
        // the same action must land on the same checksum.
        fn counter_reducer(state: i64, action: &str) -> i64 {
            match action {
                "inc" => state + 1,
                _ => state,
            }
        }

        let peer_a = compute(counter_reducer(0, "inc")).unwrap();
        let peer_b = compute(counter_reducer(0, "inc")).unwrap();
        assert_eq!(peer_a.checksum, peer_b.checksum);
    }

    #[test]
    fn checksum_has_expected_length() {
        let checked = compute(42_i64).unwrap();
        assert_eq!(checked.checksum.len(), CHECKSUM_HEX_LEN);
    }

    #[test]
    fn btreemap_state_is_also_stable() {
        let mut map: StdBTreeMap<String, i32> = StdBTreeMap::new();
        map.insert("x".into(), 1);
        let a = checksum_of(&map).unwrap();
        let b = checksum_of(&map).unwrap();
        assert_eq!(a, b);
    }
}
