//! On-demand lookup of the global DOFs of vertices, edges, faces, elements
//! and boundary elements.
//!
//! Entity DOF lists always start with the DOFs of the entity's vertices,
//! followed by the DOFs of its edges (faces only), followed by the entity's
//! own DOFs. Element lists follow the same pattern with the element's
//! faces and interior appended. DOFs shared with a neighbour are permuted
//! (and possibly sign-flipped) by the catalog's ordering for the
//! orientation under which the element sees the entity.

use std::ops::Range;

use crate::basis::BasisCatalog;
use crate::dof_error::DofSieveError;
use crate::space::dof_table::DofLayout;
use crate::space::ordering::encode_offset;
use crate::topology::cell_type::CellType;
use crate::topology::mesh::{EntityKind, MeshTopology};
use crate::topology::orientation::Orientation;

/// Placeholder for synthesized DOFs that dependency construction must skip.
pub const IGNORED_DOF: i64 = i64::MIN;

/// DOFs of one variant of an entity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntityDofs {
    /// Polynomial order of the variant.
    pub order: u8,
    /// Vertex (and edge) DOFs followed by the entity's own DOFs.
    pub dofs: Vec<i64>,
    /// Number of trailing DOFs owned by the entity itself.
    pub owned: usize,
}

impl EntityDofs {
    /// Number of leading DOFs inherited from lower-dimensional entities.
    pub fn inherited(&self) -> usize {
        self.dofs.len() - self.owned
    }
}

pub struct DofLocator<'a, M: ?Sized, C> {
    mesh: &'a M,
    catalog: &'a C,
    layout: &'a DofLayout,
}

impl<'a, M, C> DofLocator<'a, M, C>
where
    M: MeshTopology + ?Sized,
    C: BasisCatalog,
{
    pub fn new(mesh: &'a M, catalog: &'a C, layout: &'a DofLayout) -> Self {
        Self {
            mesh,
            catalog,
            layout,
        }
    }

    pub fn layout(&self) -> &DofLayout {
        self.layout
    }

    fn vertex_block(&self, v: usize) -> Result<Range<usize>, DofSieveError> {
        if v >= self.layout.num_vertices {
            return Err(DofSieveError::out_of_range("vertex", v, self.layout.num_vertices));
        }
        let n = self.layout.vertex_dofs;
        Ok(v * n..(v + 1) * n)
    }

    fn push_vertices(&self, out: &mut Vec<i64>, vertices: &[usize]) -> Result<(), DofSieveError> {
        for &v in vertices {
            out.extend(self.vertex_block(v)?.map(|d| d as i64));
        }
        Ok(())
    }

    /// Append the own DOFs of `kind` entity `index` at `order`, seen with `orientation`.
    fn push_oriented(
        &self,
        out: &mut Vec<i64>,
        kind: EntityKind,
        index: usize,
        geometry: CellType,
        order: u8,
        orientation: Orientation,
    ) -> Result<(), DofSieveError> {
        let entities = self
            .layout
            .entities(kind)
            .ok_or(DofSieveError::Unsupported("oriented vertex DOFs"))?;
        let variant = entities
            .find_order(index, order)
            .ok_or(DofSieveError::MissingDofs {
                entity: kind.name(),
                index,
                order,
            })?;
        let (range, _) = entities
            .variant(index, variant)
            .ok_or(DofSieveError::MissingDofs {
                entity: kind.name(),
                index,
                order,
            })?;
        if range.is_empty() {
            return Ok(());
        }
        let ordering = self.catalog.dof_ordering(geometry, order, orientation);
        if ordering.len() != range.len() {
            return Err(DofSieveError::SizeMismatch {
                what: "entity DOF ordering",
                expected: range.len(),
                found: ordering.len(),
            });
        }
        out.extend(ordering.into_iter().map(|ind| encode_offset(range.start, ind)));
        Ok(())
    }

    /// DOFs of `variant` of an entity, or `None` when the variant does not exist.
    pub fn entity_dofs(
        &self,
        kind: EntityKind,
        index: usize,
        variant: usize,
    ) -> Result<Option<EntityDofs>, DofSieveError> {
        match kind {
            EntityKind::Vertex => {
                if variant > 0 {
                    return Ok(None);
                }
                let dofs: Vec<i64> = self.vertex_block(index)?.map(|d| d as i64).collect();
                Ok(Some(EntityDofs {
                    order: self.layout.vertex_order,
                    owned: dofs.len(),
                    dofs,
                }))
            }
            EntityKind::Edge => {
                let Some((range, order)) = self.layout.edges.variant(index, variant) else {
                    return Ok(None);
                };
                let mut dofs = Vec::with_capacity(2 * self.layout.vertex_dofs + range.len());
                self.push_vertices(&mut dofs, &self.mesh.edge_vertices(index))?;
                let owned = range.len();
                dofs.extend(range.map(|d| d as i64));
                Ok(Some(EntityDofs { order, dofs, owned }))
            }
            EntityKind::Face => {
                let Some((range, order)) = self.layout.faces.variant(index, variant) else {
                    return Ok(None);
                };
                let vertices = self.mesh.face_vertices(index);
                let edges = self.mesh.face_edges(index);
                let ned = self.catalog.num_dofs(CellType::Segment, order);
                let mut dofs = Vec::with_capacity(
                    vertices.len() * self.layout.vertex_dofs + edges.len() * ned + range.len(),
                );
                self.push_vertices(&mut dofs, vertices)?;
                for &(e, ori) in edges {
                    self.push_oriented(&mut dofs, EntityKind::Edge, e, CellType::Segment, order, ori)?;
                }
                let owned = range.len();
                dofs.extend(range.map(|d| d as i64));
                Ok(Some(EntityDofs { order, dofs, owned }))
            }
        }
    }

    /// DOFs of the variant of an entity with polynomial order `order`.
    pub fn entity_dofs_of_order(
        &self,
        kind: EntityKind,
        index: usize,
        order: u8,
    ) -> Result<Option<EntityDofs>, DofSieveError> {
        let variant = match self.layout.entities(kind) {
            None => 0,
            Some(entities) => match entities.find_order(index, order) {
                Some(v) => v,
                None => return Ok(None),
            },
        };
        self.entity_dofs(kind, index, variant)
    }

    /// Number of variants of an entity.
    pub fn num_variants(&self, kind: EntityKind, index: usize) -> usize {
        self.layout.num_variants(kind, index)
    }

    /// DOFs of an edge seen as a zero-height face of `master_geometry`: the
    /// edge's vertex and own DOFs sit where the face's first two vertices and
    /// first edge would; every other slot is [`IGNORED_DOF`].
    pub fn degenerate_face_dofs(
        &self,
        edge: usize,
        master_geometry: CellType,
        variant: usize,
    ) -> Result<Option<EntityDofs>, DofSieveError> {
        let Some(edofs) = self.entity_dofs(EntityKind::Edge, edge, variant)? else {
            return Ok(None);
        };
        let nvd = self.layout.vertex_dofs;
        let nv = master_geometry.num_vertices();
        let ne = master_geometry.num_edges();
        let order = edofs.order;
        let ned = self.catalog.num_dofs(CellType::Segment, order);
        let len = nv * nvd + ne * ned + self.catalog.num_dofs(master_geometry, order);
        if ned != edofs.owned || len < 2 * nvd + ned {
            return Err(DofSieveError::SizeMismatch {
                what: "degenerate face DOFs",
                expected: ned,
                found: edofs.owned,
            });
        }
        let mut dofs = vec![IGNORED_DOF; len];
        dofs[..2 * nvd].copy_from_slice(&edofs.dofs[..2 * nvd]);
        dofs[nv * nvd..nv * nvd + ned].copy_from_slice(&edofs.dofs[2 * nvd..]);
        Ok(Some(EntityDofs {
            order,
            dofs,
            owned: 0,
        }))
    }

    /// Polynomial order of element `elem`.
    pub fn element_order(&self, elem: usize) -> Result<u8, DofSieveError> {
        self.layout
            .interiors
            .variant(elem, 0)
            .map(|(_, p)| p)
            .ok_or_else(|| DofSieveError::out_of_range("element", elem, self.layout.interiors.count()))
    }

    /// Interior DOFs of an element (unsigned, contiguous).
    pub fn element_interior_dofs(&self, elem: usize) -> Result<Vec<i64>, DofSieveError> {
        let (range, _) = self
            .layout
            .interiors
            .variant(elem, 0)
            .ok_or_else(|| DofSieveError::out_of_range("element", elem, self.layout.interiors.count()))?;
        Ok(range.map(|d| d as i64).collect())
    }

    /// Own DOFs of one variant of an edge or face.
    pub fn own_dofs(
        &self,
        kind: EntityKind,
        index: usize,
        variant: usize,
    ) -> Result<Option<Vec<i64>>, DofSieveError> {
        let range = match kind {
            EntityKind::Vertex => (variant == 0).then(|| self.vertex_block(index)).transpose()?,
            EntityKind::Edge => self.layout.edges.variant(index, variant).map(|(r, _)| r),
            EntityKind::Face => self.layout.faces.variant(index, variant).map(|(r, _)| r),
        };
        Ok(range.map(|r| r.map(|d| d as i64).collect()))
    }

    /// Signed DOFs of an element: vertices, edges, faces, interior.
    pub fn element_dofs(&self, elem: usize) -> Result<Vec<i64>, DofSieveError> {
        let ne = self.mesh.num_elements();
        if elem >= ne {
            return Err(DofSieveError::out_of_range("element", elem, ne));
        }
        let geometry = self.mesh.element_geometry(elem);
        let order = self.element_order(elem)?;
        let dim = self.layout.dim;
        let vertices = self.mesh.element_vertices(elem);
        let edges: &[(usize, Orientation)] = if dim >= 2 {
            self.mesh.element_edges(elem)
        } else {
            &[]
        };
        let faces: &[(usize, Orientation)] = if dim >= 3 {
            self.mesh.element_faces(elem)
        } else {
            &[]
        };
        let interior = self.element_interior_dofs(elem)?;

        let ned = self.catalog.num_dofs(CellType::Segment, order);
        let nfd: usize = faces
            .iter()
            .map(|&(f, _)| self.catalog.num_dofs(self.mesh.face_geometry(f), order))
            .sum();
        let mut dofs = Vec::with_capacity(
            vertices.len() * self.layout.vertex_dofs + edges.len() * ned + nfd + interior.len(),
        );
        self.push_vertices(&mut dofs, vertices)?;
        for &(e, ori) in edges {
            self.push_oriented(&mut dofs, EntityKind::Edge, e, CellType::Segment, order, ori)?;
        }
        for (local, &(f, ori)) in faces.iter().enumerate() {
            let face_geometry = geometry.face_geometry(local);
            self.push_oriented(&mut dofs, EntityKind::Face, f, face_geometry, order, ori)?;
        }
        dofs.extend(interior);
        Ok(dofs)
    }

    /// DOFs of a boundary element, at the order of its adjacent element.
    pub fn boundary_element_dofs(&self, bel: usize) -> Result<Vec<i64>, DofSieveError> {
        let nbe = self.mesh.num_boundary_elements();
        if bel >= nbe {
            return Err(DofSieveError::out_of_range("boundary element", bel, nbe));
        }
        let entity = self.mesh.boundary_entity(bel);
        let order = self.element_order(entity.element)?;
        let found = match self.entity_dofs_of_order(entity.kind, entity.index, order)? {
            Some(found) => Some(found),
            None => self.entity_dofs(entity.kind, entity.index, 0)?,
        };
        found.map(|e| e.dofs).ok_or(DofSieveError::MissingDofs {
            entity: entity.kind.name(),
            index: entity.index,
            order,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basis::LagrangeCollection;
    use crate::space::dof_table::{AllocationRequest, allocate};
    use crate::space::ordering::decode;
    use crate::topology::generation::{hex_mesh, interval_mesh, quad_mesh};

    fn uniform(order: u8, dim: usize) -> (LagrangeCollection, AllocationRequest<'static>) {
        (
            LagrangeCollection::new(order, dim).unwrap(),
            AllocationRequest {
                element_orders: &[],
                entity_orders: None,
            },
        )
    }

    #[test]
    fn shared_edge_dofs_are_reversed_between_neighbours() {
        let mesh = quad_mesh(2, 1, [0.0, 0.0], [2.0, 1.0]).unwrap();
        let (fec, req) = uniform(3, 2);
        let layout = allocate(&mesh, &fec, req).unwrap();
        let loc = DofLocator::new(&mesh, &fec, &layout);
        let left = loc.element_dofs(0).unwrap();
        let right = loc.element_dofs(1).unwrap();
        assert_eq!(left.len(), 16);
        // left edge 1 runs 1 -> 4 (canonical), right edge 3 runs 1 -> 4 as well
        // (local 0 -> 3), so both see the same order
        assert_eq!(&left[4 + 2..4 + 4], &right[4 + 6..4 + 8]);
    }

    #[test]
    fn missing_variant_is_soft() {
        let mesh = quad_mesh(1, 1, [0.0, 0.0], [1.0, 1.0]).unwrap();
        let (fec, req) = uniform(2, 2);
        let layout = allocate(&mesh, &fec, req).unwrap();
        let loc = DofLocator::new(&mesh, &fec, &layout);
        assert!(loc.entity_dofs(EntityKind::Edge, 0, 1).unwrap().is_none());
        assert!(loc.entity_dofs(EntityKind::Vertex, 0, 1).unwrap().is_none());
        let e = loc.entity_dofs(EntityKind::Edge, 0, 0).unwrap().unwrap();
        assert_eq!(e.dofs.len(), 3);
        assert_eq!(e.owned, 1);
    }

    #[test]
    fn interval_elements_skip_edges() {
        let mesh = interval_mesh(2, 0.0, 1.0).unwrap();
        let (fec, req) = uniform(3, 1);
        let layout = allocate(&mesh, &fec, req).unwrap();
        assert_eq!(layout.ndofs(), 3 + 4);
        let loc = DofLocator::new(&mesh, &fec, &layout);
        assert_eq!(loc.element_dofs(1).unwrap(), vec![1, 2, 5, 6]);
    }

    #[test]
    fn hex_element_covers_every_dof_once() {
        let mesh = hex_mesh(1, 1, 1, [0.0; 3], [1.0; 3]).unwrap();
        let (fec, req) = uniform(3, 3);
        let layout = allocate(&mesh, &fec, req).unwrap();
        let loc = DofLocator::new(&mesh, &fec, &layout);
        let mut dofs: Vec<usize> = loc.element_dofs(0).unwrap().into_iter().map(decode).collect();
        dofs.sort_unstable();
        assert_eq!(dofs, (0..layout.ndofs()).collect::<Vec<_>>());
    }

    #[test]
    fn degenerate_face_layout() {
        let mesh = quad_mesh(1, 1, [0.0, 0.0], [1.0, 1.0]).unwrap();
        let (fec, req) = uniform(3, 2);
        let layout = allocate(&mesh, &fec, req).unwrap();
        let loc = DofLocator::new(&mesh, &fec, &layout);
        let edge = loc.entity_dofs(EntityKind::Edge, 0, 0).unwrap().unwrap();
        let deg = loc
            .degenerate_face_dofs(0, CellType::Quadrilateral, 0)
            .unwrap()
            .unwrap();
        assert_eq!(deg.dofs.len(), 16);
        assert_eq!(&deg.dofs[..2], &edge.dofs[..2]);
        assert_eq!(&deg.dofs[4..6], &edge.dofs[2..]);
        assert_eq!(deg.dofs.iter().filter(|&&d| d == IGNORED_DOF).count(), 12);
    }
}
