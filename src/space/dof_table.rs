//! DOF allocation: per-entity DOF blocks and the element-to-DOF table.
//!
//! Global DOFs are numbered vertices first, then edges, faces and element
//! interiors. Each entity kind is laid out either uniformly (every entity
//! owns the same number of DOFs, found by arithmetic) or through a
//! [`VariantTable`] when orders or geometries differ between entities.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::basis::BasisCatalog;
use crate::debug_invariants::DebugInvariants;
use crate::dof_error::DofSieveError;
use crate::space::ordering::decode;
use crate::space::orders::{EntityOrders, OrderMask};
use crate::topology::cell_type::CellType;
use crate::topology::mesh::{EntityKind, MeshTopology};

/// Offsets of the DOF blocks ("variants") of a set of entities.
///
/// `offsets` holds one start offset per variant, entity after entity, plus a
/// trailing sentinel with the table's total size, so the size of any variant
/// is `offsets[k + 1] - offsets[k]`. `row_starts[i]` is the position of
/// entity `i`'s first variant in `offsets`.
///
/// # Invariants
/// - `row_starts` is non-decreasing, starts at 0 and ends at `orders.len()`.
/// - `offsets.len() == orders.len() + 1` and `offsets` is non-decreasing.
/// - Orders strictly increase within each entity.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VariantTable {
    row_starts: Vec<usize>,
    offsets: Vec<usize>,
    orders: Vec<u8>,
}

impl VariantTable {
    /// One variant per set bit of each mask, lowest order first.
    pub fn build(
        masks: &[OrderMask],
        mut block_size: impl FnMut(usize, u8) -> usize,
    ) -> Self {
        let mut row_starts = Vec::with_capacity(masks.len() + 1);
        let mut offsets = Vec::with_capacity(masks.len() + 1);
        let mut orders = Vec::with_capacity(masks.len());
        let mut next = 0usize;
        for (i, mask) in masks.iter().enumerate() {
            row_starts.push(orders.len());
            for p in mask.orders() {
                offsets.push(next);
                orders.push(p);
                next += block_size(i, p);
            }
        }
        row_starts.push(orders.len());
        offsets.push(next);
        let table = Self {
            row_starts,
            offsets,
            orders,
        };
        crate::debug_invariants!(table.validate_invariants(), "VariantTable::build");
        table
    }

    pub fn num_entities(&self) -> usize {
        self.row_starts.len().saturating_sub(1)
    }

    /// Total number of DOFs in the table.
    pub fn total(&self) -> usize {
        self.offsets.last().copied().unwrap_or(0)
    }

    pub fn num_variants(&self, entity: usize) -> usize {
        match (self.row_starts.get(entity), self.row_starts.get(entity + 1)) {
            (Some(a), Some(b)) => b - a,
            _ => 0,
        }
    }

    /// Local DOF range and order of `variant`, or `None` past the last variant.
    pub fn variant(&self, entity: usize, variant: usize) -> Option<(Range<usize>, u8)> {
        if variant >= self.num_variants(entity) {
            return None;
        }
        let k = self.row_starts[entity] + variant;
        Some((self.offsets[k]..self.offsets[k + 1], self.orders[k]))
    }

    /// Index of the variant of `entity` with polynomial order `order`.
    pub fn find_order(&self, entity: usize, order: u8) -> Option<usize> {
        let start = *self.row_starts.get(entity)?;
        let end = *self.row_starts.get(entity + 1)?;
        self.orders[start..end].iter().position(|&p| p == order)
    }
}

impl DebugInvariants for VariantTable {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "VariantTable");
    }

    fn validate_invariants(&self) -> Result<(), DofSieveError> {
        if self.row_starts.first().copied().unwrap_or(0) != 0
            || self.row_starts.last().copied().unwrap_or(0) != self.orders.len()
        {
            return Err(DofSieveError::InvariantViolation(
                "variant rows do not cover the order list".into(),
            ));
        }
        if self.offsets.len() != self.orders.len() + 1 {
            return Err(DofSieveError::InvariantViolation(format!(
                "{} offsets for {} variants (missing sentinel?)",
                self.offsets.len(),
                self.orders.len()
            )));
        }
        if self.row_starts.windows(2).any(|w| w[0] > w[1])
            || self.offsets.windows(2).any(|w| w[0] > w[1])
        {
            return Err(DofSieveError::InvariantViolation(
                "variant table is not monotone".into(),
            ));
        }
        for w in self.row_starts.windows(2) {
            if self.orders[w[0]..w[1]].windows(2).any(|o| o[0] >= o[1]) {
                return Err(DofSieveError::InvariantViolation(
                    "variant orders must increase within an entity".into(),
                ));
            }
        }
        Ok(())
    }
}

/// How the DOF blocks of one entity kind are located.
#[derive(Clone, Debug, PartialEq)]
pub enum EntityBlocks {
    /// Every entity owns `per_entity` DOFs of order `order`.
    Uniform { per_entity: usize, order: u8 },
    /// Possibly several variants per entity.
    Variants(VariantTable),
    /// Exactly one block per entity with explicit offsets (`offsets.len() == n + 1`).
    PerEntity { offsets: Vec<usize>, orders: Vec<u8> },
}

/// DOF blocks of all entities of one kind, starting at global DOF `base`.
#[derive(Clone, Debug, PartialEq)]
pub struct EntityDofLayout {
    base: usize,
    count: usize,
    blocks: EntityBlocks,
}

impl EntityDofLayout {
    pub fn uniform(base: usize, count: usize, per_entity: usize, order: u8) -> Self {
        Self {
            base,
            count,
            blocks: EntityBlocks::Uniform { per_entity, order },
        }
    }

    pub fn variants(base: usize, table: VariantTable) -> Self {
        Self {
            base,
            count: table.num_entities(),
            blocks: EntityBlocks::Variants(table),
        }
    }

    pub fn per_entity(base: usize, sizes_orders: impl IntoIterator<Item = (usize, u8)>) -> Self {
        let mut offsets = vec![0];
        let mut orders = Vec::new();
        for (size, p) in sizes_orders {
            let last = offsets.last().copied().unwrap_or(0);
            offsets.push(last + size);
            orders.push(p);
        }
        Self {
            base,
            count: orders.len(),
            blocks: EntityBlocks::PerEntity { offsets, orders },
        }
    }

    pub fn base(&self) -> usize {
        self.base
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn blocks(&self) -> &EntityBlocks {
        &self.blocks
    }

    /// Total number of DOFs owned by this entity kind.
    pub fn len(&self) -> usize {
        match &self.blocks {
            EntityBlocks::Uniform { per_entity, .. } => self.count * per_entity,
            EntityBlocks::Variants(t) => t.total(),
            EntityBlocks::PerEntity { offsets, .. } => offsets.last().copied().unwrap_or(0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn num_variants(&self, entity: usize) -> usize {
        if entity >= self.count {
            return 0;
        }
        match &self.blocks {
            EntityBlocks::Variants(t) => t.num_variants(entity),
            EntityBlocks::Uniform { .. } | EntityBlocks::PerEntity { .. } => 1,
        }
    }

    /// Global DOF range and order of a variant; `None` when it does not exist.
    pub fn variant(&self, entity: usize, variant: usize) -> Option<(Range<usize>, u8)> {
        if entity >= self.count {
            return None;
        }
        let (range, order) = match &self.blocks {
            EntityBlocks::Uniform { per_entity, order } => {
                if variant > 0 {
                    return None;
                }
                (entity * per_entity..(entity + 1) * per_entity, *order)
            }
            EntityBlocks::Variants(t) => t.variant(entity, variant)?,
            EntityBlocks::PerEntity { offsets, orders } => {
                if variant > 0 {
                    return None;
                }
                (offsets[entity]..offsets[entity + 1], orders[entity])
            }
        };
        Some((self.base + range.start..self.base + range.end, order))
    }

    /// Index of the variant carrying `order`.
    pub fn find_order(&self, entity: usize, order: u8) -> Option<usize> {
        if entity >= self.count {
            return None;
        }
        match &self.blocks {
            EntityBlocks::Variants(t) => t.find_order(entity, order),
            EntityBlocks::Uniform { order: p, .. } => (*p == order).then_some(0),
            EntityBlocks::PerEntity { orders, .. } => (orders[entity] == order).then_some(0),
        }
    }
}

/// DOF blocks of every entity kind of a space (scalar, before `vdim`).
#[derive(Clone, Debug, PartialEq)]
pub struct DofLayout {
    pub(crate) dim: usize,
    /// DOFs per vertex.
    pub(crate) vertex_dofs: usize,
    pub(crate) vertex_order: u8,
    pub(crate) num_vertices: usize,
    pub(crate) edges: EntityDofLayout,
    pub(crate) faces: EntityDofLayout,
    pub(crate) interiors: EntityDofLayout,
}

impl DofLayout {
    pub fn ndofs(&self) -> usize {
        self.num_vertices * self.vertex_dofs
            + self.edges.len()
            + self.faces.len()
            + self.interiors.len()
    }

    pub fn dimension(&self) -> usize {
        self.dim
    }

    pub fn num_vertex_dofs(&self) -> usize {
        self.num_vertices * self.vertex_dofs
    }

    pub fn num_edge_dofs(&self) -> usize {
        self.edges.len()
    }

    pub fn num_face_dofs(&self) -> usize {
        self.faces.len()
    }

    pub fn num_interior_dofs(&self) -> usize {
        self.interiors.len()
    }

    pub fn entities(&self, kind: EntityKind) -> Option<&EntityDofLayout> {
        match kind {
            EntityKind::Vertex => None,
            EntityKind::Edge => Some(&self.edges),
            EntityKind::Face => Some(&self.faces),
        }
    }

    pub fn interiors(&self) -> &EntityDofLayout {
        &self.interiors
    }

    pub fn num_variants(&self, kind: EntityKind, index: usize) -> usize {
        match kind {
            EntityKind::Vertex => usize::from(index < self.num_vertices),
            EntityKind::Edge => self.edges.num_variants(index),
            EntityKind::Face => self.faces.num_variants(index),
        }
    }
}

/// Inputs of [`allocate`] that depend on the space rather than the mesh.
pub struct AllocationRequest<'a> {
    /// Per-element orders; empty for a uniform-order space.
    pub element_orders: &'a [u8],
    /// Edge/face masks of a variable-order space.
    pub entity_orders: Option<&'a EntityOrders>,
}

fn uniform_geometry(geoms: impl Iterator<Item = CellType>) -> Option<Option<CellType>> {
    let mut first = None;
    for g in geoms {
        match first {
            None => first = Some(g),
            Some(f) if f != g => return None,
            Some(_) => {}
        }
    }
    Some(first)
}

/// Allocate the global DOF blocks of every mesh entity.
pub fn allocate<M, C>(
    mesh: &M,
    catalog: &C,
    request: AllocationRequest<'_>,
) -> Result<DofLayout, DofSieveError>
where
    M: MeshTopology + ?Sized,
    C: BasisCatalog,
{
    let dim = mesh.dimension();
    let base_order = catalog.default_order();
    let variable = !request.element_orders.is_empty();
    if variable && request.element_orders.len() != mesh.num_elements() {
        return Err(DofSieveError::SizeMismatch {
            what: "element orders",
            expected: mesh.num_elements(),
            found: request.element_orders.len(),
        });
    }
    let elem_order = |e: usize| {
        if variable {
            request.element_orders[e]
        } else {
            base_order
        }
    };

    let num_vertices = mesh.num_vertices();
    let vertex_dofs = catalog.num_dofs(CellType::Vertex, base_order);
    let mut next = num_vertices * vertex_dofs;

    let num_edges = if dim >= 2 { mesh.num_edges() } else { 0 };
    let edges = match (variable, request.entity_orders) {
        (true, Some(orders)) => {
            let table = VariantTable::build(&orders.edges[..num_edges.min(orders.edges.len())], |_, p| {
                catalog.num_dofs(CellType::Segment, p)
            });
            EntityDofLayout::variants(next, table)
        }
        (true, None) => {
            return Err(DofSieveError::InconsistentMesh(
                "variable-order allocation without entity orders".into(),
            ));
        }
        (false, _) => EntityDofLayout::uniform(
            next,
            num_edges,
            catalog.num_dofs(CellType::Segment, base_order),
            base_order,
        ),
    };
    next += edges.len();

    let num_faces = if dim >= 3 { mesh.num_faces() } else { 0 };
    let face_geom = uniform_geometry((0..num_faces).map(|f| mesh.face_geometry(f)));
    let faces = match (variable, face_geom, request.entity_orders) {
        (false, Some(g), _) => EntityDofLayout::uniform(
            next,
            num_faces,
            g.map_or(0, |g| catalog.num_dofs(g, base_order)),
            base_order,
        ),
        (true, _, Some(orders)) => {
            let table = VariantTable::build(&orders.faces[..num_faces.min(orders.faces.len())], |f, p| {
                catalog.num_dofs(mesh.face_geometry(f), p)
            });
            EntityDofLayout::variants(next, table)
        }
        _ => {
            // mixed face geometries at a single order
            let masks = vec![OrderMask::single(base_order)?; num_faces];
            let table = VariantTable::build(&masks, |f, p| catalog.num_dofs(mesh.face_geometry(f), p));
            EntityDofLayout::variants(next, table)
        }
    };
    next += faces.len();

    let ne = mesh.num_elements();
    let elem_geom = uniform_geometry((0..ne).map(|e| mesh.element_geometry(e)));
    let interiors = match (variable, elem_geom) {
        (false, Some(g)) => EntityDofLayout::uniform(
            next,
            ne,
            g.map_or(0, |g| catalog.num_dofs(g, base_order)),
            base_order,
        ),
        _ => EntityDofLayout::per_entity(
            next,
            (0..ne).map(|e| {
                let p = elem_order(e);
                (catalog.num_dofs(mesh.element_geometry(e), p), p)
            }),
        ),
    };

    let layout = DofLayout {
        dim,
        vertex_dofs,
        vertex_order: base_order,
        num_vertices,
        edges,
        faces,
        interiors,
    };
    log::debug!(
        "allocated {} DOFs (vertex {}, edge {}, face {}, interior {})",
        layout.ndofs(),
        layout.num_vertex_dofs(),
        layout.num_edge_dofs(),
        layout.num_face_dofs(),
        layout.num_interior_dofs()
    );
    Ok(layout)
}

/// Signed DOFs of every element, stored as CSR rows.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementDofTable {
    row_starts: Vec<usize>,
    dofs: Vec<i64>,
    ndofs: usize,
}

impl ElementDofTable {
    pub fn from_rows(rows: impl IntoIterator<Item = Vec<i64>>, ndofs: usize) -> Self {
        let mut row_starts = vec![0];
        let mut dofs = Vec::new();
        for row in rows {
            dofs.extend(row);
            row_starts.push(dofs.len());
        }
        let table = Self {
            row_starts,
            dofs,
            ndofs,
        };
        crate::debug_invariants!(table.validate_invariants(), "ElementDofTable::from_rows");
        table
    }

    pub fn num_rows(&self) -> usize {
        self.row_starts.len().saturating_sub(1)
    }

    pub fn ndofs(&self) -> usize {
        self.ndofs
    }

    pub fn row(&self, elem: usize) -> Result<&[i64], DofSieveError> {
        if elem >= self.num_rows() {
            return Err(DofSieveError::out_of_range("element", elem, self.num_rows()));
        }
        Ok(&self.dofs[self.row_starts[elem]..self.row_starts[elem + 1]])
    }

    pub fn rows(&self) -> impl Iterator<Item = &[i64]> + '_ {
        self.row_starts
            .windows(2)
            .map(move |w| &self.dofs[w[0]..w[1]])
    }

    /// For each DOF, the first element using it and its local index there.
    pub fn dof_to_element(&self) -> Vec<Option<(usize, usize)>> {
        let mut out = vec![None; self.ndofs];
        for (e, row) in self.rows().enumerate() {
            for (local, &d) in row.iter().enumerate() {
                let slot = &mut out[decode(d)];
                if slot.is_none() {
                    *slot = Some((e, local));
                }
            }
        }
        out
    }
}

impl DebugInvariants for ElementDofTable {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "ElementDofTable");
    }

    fn validate_invariants(&self) -> Result<(), DofSieveError> {
        if self.row_starts.first() != Some(&0) || self.row_starts.last() != Some(&self.dofs.len()) {
            return Err(DofSieveError::InvariantViolation(
                "element rows do not cover the DOF list".into(),
            ));
        }
        if let Some(&d) = self.dofs.iter().find(|&&d| decode(d) >= self.ndofs) {
            return Err(DofSieveError::InvariantViolation(format!(
                "element DOF {d} outside [0, {})",
                self.ndofs
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basis::LagrangeCollection;
    use crate::topology::generation::{hex_mesh, quad_mesh};

    #[test]
    fn variant_table_sizes_and_sentinel() {
        let masks = [
            OrderMask::single(2).unwrap() | OrderMask::single(3).unwrap(),
            OrderMask::EMPTY,
            OrderMask::single(4).unwrap(),
        ];
        let t = VariantTable::build(&masks, |_, p| p as usize - 1);
        assert_eq!(t.num_entities(), 3);
        assert_eq!(t.variant(0, 0), Some((0..1, 2)));
        assert_eq!(t.variant(0, 1), Some((1..3, 3)));
        assert_eq!(t.variant(0, 2), None);
        assert_eq!(t.num_variants(1), 0);
        assert_eq!(t.variant(2, 0), Some((3..6, 4)));
        assert_eq!(t.total(), 6);
        assert_eq!(t.find_order(0, 3), Some(1));
        assert!(t.validate_invariants().is_ok());
    }

    #[test]
    fn uniform_quad_counts() {
        let mesh = quad_mesh(2, 2, [0.0, 0.0], [1.0, 1.0]).unwrap();
        let fec = LagrangeCollection::new(3, 2).unwrap();
        let request = AllocationRequest {
            element_orders: &[],
            entity_orders: None,
        };
        let layout = allocate(&mesh, &fec, request).unwrap();
        // 9 vertices, 12 edges * 2, 4 elements * 4
        assert_eq!(layout.ndofs(), 9 + 24 + 16);
        assert_eq!(layout.edges.variant(1, 0), Some((11..13, 3)));
        assert_eq!(layout.edges.variant(1, 1), None);
    }

    #[test]
    fn uniform_hex_counts() {
        let mesh = hex_mesh(1, 1, 1, [0.0; 3], [1.0; 3]).unwrap();
        let fec = LagrangeCollection::new(2, 3).unwrap();
        let request = AllocationRequest {
            element_orders: &[],
            entity_orders: None,
        };
        let layout = allocate(&mesh, &fec, request).unwrap();
        assert_eq!(layout.ndofs(), 27);
        assert_eq!(layout.num_face_dofs(), 6);
    }

    #[test]
    fn element_table_inverse() {
        let t = ElementDofTable::from_rows(vec![vec![0, 1], vec![-2, 2]], 3);
        assert_eq!(t.row(1).unwrap(), &[-2, 2]);
        assert_eq!(t.dof_to_element(), vec![Some((0, 0)), Some((0, 1)), Some((1, 1))]);
        assert!(t.row(2).is_err());
    }
}
