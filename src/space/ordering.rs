//! Signed DOF encoding, component ordering and marker/list conversions.
//!
//! A signed DOF `d >= 0` is used as stored; `-1 - d` marks the same DOF seen
//! with flipped orientation. Vector-valued spaces replicate the scalar DOFs
//! `vdim` times. [`Ordering::NodeMajor`] runs over all nodes of one
//! component before the next component; [`Ordering::ComponentMajor`] runs
//! over the components of one node before the next node.

use serde::{Deserialize, Serialize};

use crate::dof_error::DofSieveError;

/// Layout of the components of a vector-valued space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ordering {
    /// `vdof = dof + component * ndofs` (all DOFs of component 0 first).
    #[default]
    NodeMajor,
    /// `vdof = dof * vdim + component` (components of one DOF adjacent).
    ComponentMajor,
}

impl Ordering {
    /// Numeric code used by the text format.
    pub fn code(self) -> u32 {
        match self {
            Ordering::NodeMajor => 0,
            Ordering::ComponentMajor => 1,
        }
    }

    pub fn from_code(code: u32) -> Result<Self, DofSieveError> {
        match code {
            0 => Ok(Ordering::NodeMajor),
            1 => Ok(Ordering::ComponentMajor),
            other => Err(DofSieveError::Parse {
                line: 0,
                message: format!("unknown ordering code {other}"),
            }),
        }
    }
}

/// Signed form of `dof` seen with flipped orientation.
#[inline]
pub fn encode_flip(dof: i64) -> i64 {
    -1 - dof
}

/// Unsigned index of a signed DOF.
#[inline]
pub fn decode(dof: i64) -> usize {
    if dof >= 0 { dof as usize } else { (-1 - dof) as usize }
}

/// Unsigned index and sign (`1.0` or `-1.0`) of a signed DOF.
#[inline]
pub fn decode_signed(dof: i64) -> (usize, f64) {
    if dof >= 0 {
        (dof as usize, 1.0)
    } else {
        ((-1 - dof) as usize, -1.0)
    }
}

/// Signed DOF `base + local` where a negative `local` carries the flip.
#[inline]
pub fn encode_offset(base: usize, local: i64) -> i64 {
    if local >= 0 {
        base as i64 + local
    } else {
        encode_flip(base as i64 + encode_flip(local))
    }
}

#[inline]
fn vdof_index(dof: usize, component: usize, ndofs: usize, vdim: usize, ordering: Ordering) -> usize {
    match ordering {
        Ordering::NodeMajor => dof + component * ndofs,
        Ordering::ComponentMajor => dof * vdim + component,
    }
}

/// Vector DOF of scalar `dof` in `component`, keeping the sign.
#[inline]
pub fn dof_to_vdof(dof: i64, component: usize, ndofs: usize, vdim: usize, ordering: Ordering) -> i64 {
    let idx = vdof_index(decode(dof), component, ndofs, vdim, ordering) as i64;
    if dof >= 0 { idx } else { encode_flip(idx) }
}

/// Inverse of [`dof_to_vdof`] for unsigned vector DOFs: `(dof, component)`.
pub fn vdof_to_dof(vdof: usize, ndofs: usize, vdim: usize, ordering: Ordering) -> (usize, usize) {
    match ordering {
        Ordering::NodeMajor => (vdof % ndofs.max(1), vdof / ndofs.max(1)),
        Ordering::ComponentMajor => (vdof / vdim.max(1), vdof % vdim.max(1)),
    }
}

/// Expand scalar DOFs to vector DOFs, grouped by component:
/// `out[c * dofs.len() + i] = dof_to_vdof(dofs[i], c)`.
pub fn dofs_to_vdofs(dofs: &[i64], ndofs: usize, vdim: usize, ordering: Ordering) -> Vec<i64> {
    (0..vdim)
        .flat_map(|c| dofs.iter().map(move |&d| dof_to_vdof(d, c, ndofs, vdim, ordering)))
        .collect()
}

/// Indices of the set entries of `marker`, ascending.
pub fn marker_to_list(marker: &[bool]) -> Vec<usize> {
    marker
        .iter()
        .enumerate()
        .filter_map(|(i, &m)| m.then_some(i))
        .collect()
}

/// Marker of length `len` with the entries of `list` set.
pub fn list_to_marker(list: &[usize], len: usize) -> Result<Vec<bool>, DofSieveError> {
    let mut marker = vec![false; len];
    for &i in list {
        *marker
            .get_mut(i)
            .ok_or_else(|| DofSieveError::out_of_range("marker", i, len))? = true;
    }
    Ok(marker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn component_mapping_examples() {
        assert_eq!(dof_to_vdof(3, 1, 5, 2, Ordering::NodeMajor), 8);
        assert_eq!(dof_to_vdof(3, 1, 5, 2, Ordering::ComponentMajor), 7);
        for ord in [Ordering::NodeMajor, Ordering::ComponentMajor] {
            assert_eq!(dof_to_vdof(4, 0, 5, 1, ord), 4);
        }
        assert_eq!(Ordering::default(), Ordering::NodeMajor);
        assert_eq!(Ordering::from_code(Ordering::ComponentMajor.code()).unwrap(), Ordering::ComponentMajor);
        assert_eq!(Ordering::NodeMajor.code(), 0);
    }

    #[test]
    fn flipped_dofs_keep_their_sign() {
        let d = encode_flip(3);
        let v = dof_to_vdof(d, 1, 5, 2, Ordering::NodeMajor);
        assert_eq!(v, encode_flip(8));
        assert_eq!(decode_signed(v), (8, -1.0));
        assert_eq!(encode_offset(10, encode_flip(2)), encode_flip(12));
    }

    #[test]
    fn dofs_to_vdofs_groups_by_component() {
        let v = dofs_to_vdofs(&[0, 2], 3, 2, Ordering::ComponentMajor);
        assert_eq!(v, vec![0, 4, 1, 5]);
        let v = dofs_to_vdofs(&[0, 2], 3, 2, Ordering::NodeMajor);
        assert_eq!(v, vec![0, 2, 3, 5]);
    }

    #[test]
    fn marker_out_of_range() {
        assert!(list_to_marker(&[4], 3).is_err());
    }

    proptest! {
        #[test]
        fn flip_round_trip(d in 0i64..1_000_000) {
            prop_assert_eq!(decode(encode_flip(d)), d as usize);
            prop_assert_eq!(decode(d), d as usize);
            prop_assert_eq!(encode_flip(encode_flip(d)), d);
        }

        #[test]
        fn marker_round_trip(marker in proptest::collection::vec(any::<bool>(), 0..64)) {
            let list = marker_to_list(&marker);
            prop_assert_eq!(list_to_marker(&list, marker.len()).unwrap(), marker);
        }

        #[test]
        fn vdof_mapping_is_a_bijection(ndofs in 1usize..20, vdim in 1usize..4, node_major in any::<bool>()) {
            let ordering = if node_major { Ordering::NodeMajor } else { Ordering::ComponentMajor };
            let mut seen = vec![false; ndofs * vdim];
            for dof in 0..ndofs {
                for c in 0..vdim {
                    let v = dof_to_vdof(dof as i64, c, ndofs, vdim, ordering) as usize;
                    prop_assert!(!seen[v]);
                    seen[v] = true;
                    prop_assert_eq!(vdof_to_dof(v, ndofs, vdim, ordering), (dof, c));
                }
            }
        }
    }
}
