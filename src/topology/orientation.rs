//! Relative orientation of a sub-entity (edge or face) as seen from a cell.
//!
//! An orientation is an element of the dihedral group D_N acting on the
//! entity's vertex cycle: `rot` is the position of the cell's first local
//! corner inside the canonical cycle, `flip` tells whether the cell walks the
//! cycle backwards. Edges only ever use `rot` (D_2 has no distinct flip).

use core::fmt::{Debug, Formatter};

use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Eq, PartialEq, Hash, Default, Serialize, Deserialize)]
pub struct Orientation {
    pub rot: u8,
    pub flip: bool,
}

impl Debug for Orientation {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Orientation")
            .field("rot", &self.rot)
            .field("flip", &self.flip)
            .finish()
    }
}

impl Orientation {
    pub const IDENTITY: Orientation = Orientation {
        rot: 0,
        flip: false,
    };

    /// Orientation of an edge walked backwards.
    pub const REVERSED_EDGE: Orientation = Orientation {
        rot: 1,
        flip: false,
    };

    #[inline]
    pub fn is_identity(self) -> bool {
        self.rot == 0 && !self.flip
    }

    /// Canonical corner hit by local corner `k` of an `n`-cycle.
    #[inline]
    pub fn corner_map(self, n: usize, k: usize) -> usize {
        let rot = self.rot as usize % n.max(1);
        if self.flip {
            (rot + n - k % n) % n
        } else {
            (rot + k) % n
        }
    }

    /// Orientation taking the canonical cycle onto `local`, or `None` when the
    /// two lists are not the same cycle.
    pub fn of(local: &[usize], canonical: &[usize]) -> Option<Orientation> {
        let n = canonical.len();
        if local.len() != n || n == 0 {
            return None;
        }
        let rot = canonical.iter().position(|&v| v == local[0])?;
        let flip = n > 2 && canonical[(rot + 1) % n] != local[1];
        let o = Orientation {
            rot: rot as u8,
            flip,
        };
        (0..n)
            .all(|k| canonical[o.corner_map(n, k)] == local[k])
            .then_some(o)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_orientation() {
        assert_eq!(Orientation::of(&[4, 9], &[4, 9]), Some(Orientation::IDENTITY));
        assert_eq!(
            Orientation::of(&[9, 4], &[4, 9]),
            Some(Orientation::REVERSED_EDGE)
        );
        assert_eq!(Orientation::of(&[9, 5], &[4, 9]), None);
    }

    #[test]
    fn quad_orientations_cover_dihedral_group() {
        let canonical = [10, 11, 12, 13];
        let mut seen = std::collections::HashSet::new();
        for rot in 0..4 {
            for flip in [false, true] {
                let o = Orientation { rot, flip };
                let local: Vec<usize> = (0..4).map(|k| canonical[o.corner_map(4, k)]).collect();
                assert_eq!(Orientation::of(&local, &canonical), Some(o));
                seen.insert(local);
            }
        }
        assert_eq!(seen.len(), 8);
    }

    #[test]
    fn mismatched_cycle_is_rejected() {
        assert_eq!(Orientation::of(&[1, 3, 2, 4], &[1, 2, 3, 4]), None);
    }
}
