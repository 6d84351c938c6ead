//! Polynomial order masks and the edge/face order fixed point of
//! variable-order spaces.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};
use static_assertions::const_assert;

use crate::dof_error::DofSieveError;
use crate::topology::mesh::{EntityKind, MeshTopology};
use crate::topology::nonconforming::SlaveEntity;

/// Highest polynomial order representable in an [`OrderMask`].
pub const MAX_ORDER: u8 = 63;

const_assert!((MAX_ORDER as u32) < u64::BITS);

/// Validate a requested polynomial order.
pub fn check_order(order: u32) -> Result<u8, DofSieveError> {
    if order > MAX_ORDER as u32 {
        return Err(DofSieveError::OrderOutOfRange {
            order,
            min: 0,
            max: MAX_ORDER,
        });
    }
    Ok(order as u8)
}

/// Set of polynomial orders an entity must support; bit `p` stands for order `p`.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderMask(u64);

impl OrderMask {
    pub const EMPTY: OrderMask = OrderMask(0);

    pub fn single(order: u8) -> Result<Self, DofSieveError> {
        let p = check_order(order as u32)?;
        Ok(OrderMask(1u64 << p))
    }

    pub fn bits(self) -> u64 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, order: u8) -> bool {
        order <= MAX_ORDER && self.0 & (1u64 << order) != 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn min_order(self) -> Option<u8> {
        (!self.is_empty()).then(|| self.0.trailing_zeros() as u8)
    }

    pub fn max_order(self) -> Option<u8> {
        (!self.is_empty()).then(|| (63 - self.0.leading_zeros()) as u8)
    }

    /// Mask holding only the lowest order of `self`.
    pub fn lowest(self) -> OrderMask {
        OrderMask(self.0 & self.0.wrapping_neg())
    }

    /// Orders in ascending order.
    pub fn orders(self) -> impl Iterator<Item = u8> {
        (0..=MAX_ORDER).filter(move |&p| self.contains(p))
    }
}

impl BitOr for OrderMask {
    type Output = OrderMask;
    fn bitor(self, rhs: OrderMask) -> OrderMask {
        OrderMask(self.0 | rhs.0)
    }
}

impl BitOrAssign for OrderMask {
    fn bitor_assign(&mut self, rhs: OrderMask) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for OrderMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.orders()).finish()
    }
}

/// Orders required on each edge and face of a variable-order space.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EntityOrders {
    pub edges: Vec<OrderMask>,
    pub faces: Vec<OrderMask>,
}

impl EntityOrders {
    pub fn masks(&self, kind: EntityKind) -> &[OrderMask] {
        match kind {
            EntityKind::Edge => &self.edges,
            EntityKind::Face => &self.faces,
            EntityKind::Vertex => &[],
        }
    }

    fn masks_mut(&mut self, kind: EntityKind) -> &mut Vec<OrderMask> {
        match kind {
            EntityKind::Face => &mut self.faces,
            _ => &mut self.edges,
        }
    }
}

/// Derive edge/face order masks from element orders.
///
/// Masks start from the orders of the incident elements. Then, until nothing
/// changes, every master picks up the lowest order of each of its slaves
/// (skipped when `relaxed`), and every face pushes its orders onto its edges.
pub fn compute_entity_orders<M: MeshTopology + ?Sized>(
    mesh: &M,
    element_orders: &[u8],
    relaxed: bool,
) -> Result<EntityOrders, DofSieveError> {
    if element_orders.len() != mesh.num_elements() {
        return Err(DofSieveError::SizeMismatch {
            what: "element orders",
            expected: mesh.num_elements(),
            found: element_orders.len(),
        });
    }
    let dim = mesh.dimension();
    let mut out = EntityOrders {
        edges: vec![OrderMask::EMPTY; if dim >= 2 { mesh.num_edges() } else { 0 }],
        faces: vec![OrderMask::EMPTY; if dim >= 3 { mesh.num_faces() } else { 0 }],
    };
    for (elem, &p) in element_orders.iter().enumerate() {
        let mask = OrderMask::single(p)?;
        if dim >= 2 {
            for &(e, _) in mesh.element_edges(elem) {
                out.edges[e] |= mask;
            }
        }
        if dim >= 3 {
            for &(f, _) in mesh.element_faces(elem) {
                out.faces[f] |= mask;
            }
        }
    }

    let mut iterations = 0usize;
    loop {
        let mut changed = false;
        if !relaxed {
            for kind in [EntityKind::Edge, EntityKind::Face] {
                let Some(list) = mesh.nc_list(kind) else {
                    continue;
                };
                let masks = out.masks_mut(kind);
                for master in list.masters() {
                    let mut mask = masks[master.index];
                    for slave in &master.slaves {
                        if let SlaveEntity::Regular(s) = slave.entity {
                            mask |= masks[s].lowest();
                        }
                    }
                    if mask != masks[master.index] {
                        masks[master.index] = mask;
                        changed = true;
                    }
                }
            }
        }
        for f in 0..out.faces.len() {
            let fmask = out.faces[f];
            for &(e, _) in mesh.face_edges(f) {
                let merged = out.edges[e] | fmask;
                if merged != out.edges[e] {
                    out.edges[e] = merged;
                    changed = true;
                }
            }
        }
        iterations += 1;
        log::trace!("entity order iteration {iterations}: changed = {changed}");
        if !changed {
            break;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::generation::quad_mesh;
    use crate::topology::refine::refine;

    #[test]
    fn mask_queries() {
        let m = OrderMask::single(2).unwrap() | OrderMask::single(5).unwrap();
        assert_eq!(m.min_order(), Some(2));
        assert_eq!(m.max_order(), Some(5));
        assert_eq!(m.lowest(), OrderMask::single(2).unwrap());
        assert_eq!(m.orders().collect::<Vec<_>>(), vec![2, 5]);
        assert_eq!(m.len(), 2);
        assert!(OrderMask::single(64).is_err());
        assert_eq!(format!("{m:?}"), "{2, 5}");
    }

    #[test]
    fn shared_edge_carries_both_orders() {
        let mesh = quad_mesh(2, 1, [0.0, 0.0], [2.0, 1.0]).unwrap();
        let orders = compute_entity_orders(&mesh, &[2, 3], false).unwrap();
        let shared = mesh.find_edge(1, 4).unwrap();
        assert_eq!(orders.edges[shared].orders().collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn master_edge_picks_up_slave_minimum_unless_relaxed() {
        let mesh = quad_mesh(2, 1, [0.0, 0.0], [2.0, 1.0]).unwrap();
        let fine = refine(&mesh, &[1]).unwrap();
        // element 0 is the unrefined left quad; children inherit order 2
        let mut orders = vec![2u8; fine.num_elements()];
        orders[0] = 4;
        let list = fine.nc_list(EntityKind::Edge).unwrap();
        let master = list.masters()[0].index;

        let strict = compute_entity_orders(&fine, &orders, false).unwrap();
        assert_eq!(strict.edges[master].orders().collect::<Vec<_>>(), vec![2, 4]);

        let relaxed = compute_entity_orders(&fine, &orders, true).unwrap();
        assert_eq!(relaxed.edges[master].orders().collect::<Vec<_>>(), vec![4]);
    }
}
