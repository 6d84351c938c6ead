//! In-memory unstructured mesh implementing [`MeshTopology`].
//!
//! Edges are numbered in order of first appearance and stored with their
//! lower vertex first. Faces keep the vertex cycle of the first element that
//! references them. Boundary elements are the exterior entities of codimension
//! one, i.e. those touched by a single element and not part of a
//! master/slave relation.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use itertools::Itertools;

use crate::dof_error::DofSieveError;
use crate::topology::cell_type::CellType;
use crate::topology::mesh::{BoundaryEntity, EntityKind, MeshOperation, MeshTopology};
use crate::topology::nonconforming::{NcList, SlaveEntity};
use crate::topology::orientation::Orientation;
use crate::topology::transforms::CoarseFineTransforms;

/// Rule assigning an attribute to an exterior entity from its centroid.
#[derive(Clone)]
pub struct BoundaryAttributes(Arc<dyn Fn(&[f64]) -> u32 + Send + Sync>);

impl BoundaryAttributes {
    pub fn new(rule: impl Fn(&[f64]) -> u32 + Send + Sync + 'static) -> Self {
        Self(Arc::new(rule))
    }

    /// Every boundary entity gets the same attribute.
    pub fn constant(attr: u32) -> Self {
        Self::new(move |_| attr)
    }

    pub fn attribute(&self, centroid: &[f64]) -> u32 {
        (self.0)(centroid)
    }
}

impl fmt::Debug for BoundaryAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BoundaryAttributes(..)")
    }
}

impl Default for BoundaryAttributes {
    fn default() -> Self {
        Self::constant(1)
    }
}

#[derive(Clone, Debug)]
struct ElementRecord {
    geometry: CellType,
    attribute: u32,
    vertices: Vec<usize>,
    edges: Vec<(usize, Orientation)>,
    faces: Vec<(usize, Orientation)>,
}

#[derive(Clone, Debug)]
struct FaceRecord {
    geometry: CellType,
    vertices: Vec<usize>,
    edges: Vec<(usize, Orientation)>,
}

/// Collects vertices and elements, then derives the full topology.
#[derive(Clone, Debug, Default)]
pub struct MeshBuilder {
    dimension: usize,
    coordinates: Vec<Vec<f64>>,
    elements: Vec<(CellType, Vec<usize>, u32)>,
    boundary: BoundaryAttributes,
}

impl MeshBuilder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ..Default::default()
        }
    }

    pub fn add_vertex(&mut self, coords: Vec<f64>) -> usize {
        self.coordinates.push(coords);
        self.coordinates.len() - 1
    }

    pub fn add_element(&mut self, geometry: CellType, vertices: Vec<usize>, attribute: u32) -> usize {
        self.elements.push((geometry, vertices, attribute));
        self.elements.len() - 1
    }

    pub fn boundary_attributes(mut self, rule: BoundaryAttributes) -> Self {
        self.boundary = rule;
        self
    }

    pub fn build(self) -> Result<InMemoryMesh, DofSieveError> {
        let MeshBuilder {
            dimension,
            coordinates,
            elements,
            boundary,
        } = self;
        if dimension == 0 || dimension > 3 {
            return Err(DofSieveError::InconsistentMesh(format!(
                "mesh dimension {dimension} not in 1..=3"
            )));
        }
        if let Some((i, c)) = coordinates.iter().enumerate().find(|(_, c)| c.len() != dimension) {
            return Err(DofSieveError::InconsistentMesh(format!(
                "vertex {i} has {} coordinates, expected {dimension}",
                c.len()
            )));
        }

        let mut mesh = InMemoryMesh {
            dimension,
            sequence: 0,
            coordinates,
            elements: Vec::with_capacity(elements.len()),
            edges: Vec::new(),
            faces: Vec::new(),
            edge_lookup: HashMap::new(),
            face_lookup: HashMap::new(),
            boundary: Vec::new(),
            boundary_rule: boundary,
            nc_edges: NcList::new(),
            nc_faces: NcList::new(),
            last_operation: MeshOperation::None,
            refinement: None,
            derefinement: None,
        };
        for (geometry, vertices, attribute) in elements {
            mesh.insert_element(geometry, vertices, attribute)?;
        }
        mesh.classify_boundary();
        Ok(mesh)
    }
}

/// Unstructured mesh with explicit entity tables.
#[derive(Clone, Debug)]
pub struct InMemoryMesh {
    dimension: usize,
    sequence: u64,
    coordinates: Vec<Vec<f64>>,
    elements: Vec<ElementRecord>,
    edges: Vec<[usize; 2]>,
    faces: Vec<FaceRecord>,
    edge_lookup: HashMap<[usize; 2], usize>,
    face_lookup: HashMap<Vec<usize>, usize>,
    boundary: Vec<BoundaryEntity>,
    boundary_rule: BoundaryAttributes,
    nc_edges: NcList,
    nc_faces: NcList,
    last_operation: MeshOperation,
    refinement: Option<CoarseFineTransforms>,
    derefinement: Option<CoarseFineTransforms>,
}

impl InMemoryMesh {
    fn insert_element(
        &mut self,
        geometry: CellType,
        vertices: Vec<usize>,
        attribute: u32,
    ) -> Result<(), DofSieveError> {
        let elem = self.elements.len();
        if geometry.dimension() != self.dimension {
            return Err(DofSieveError::InconsistentMesh(format!(
                "element {elem} is {geometry:?} in a {}D mesh",
                self.dimension
            )));
        }
        if vertices.len() != geometry.num_vertices() {
            return Err(DofSieveError::InconsistentMesh(format!(
                "element {elem} has {} vertices, {geometry:?} needs {}",
                vertices.len(),
                geometry.num_vertices()
            )));
        }
        if let Some(&v) = vertices.iter().find(|&&v| v >= self.coordinates.len()) {
            return Err(DofSieveError::out_of_range("vertex", v, self.coordinates.len()));
        }

        let edges = geometry
            .edge_vertices()
            .iter()
            .map(|&[a, b]| self.edge_between(vertices[a], vertices[b]))
            .collect();

        let mut faces = Vec::with_capacity(geometry.num_faces());
        for local in geometry.face_vertices().iter().take(geometry.num_faces()) {
            let cycle: Vec<usize> = local.iter().map(|&i| vertices[i]).collect();
            faces.push(self.face_with(cycle)?);
        }

        self.elements.push(ElementRecord {
            geometry,
            attribute,
            vertices,
            edges,
            faces,
        });
        Ok(())
    }

    fn edge_between(&mut self, a: usize, b: usize) -> (usize, Orientation) {
        let key = [a.min(b), a.max(b)];
        let id = match self.edge_lookup.get(&key) {
            Some(&id) => id,
            None => {
                self.edges.push(key);
                self.edge_lookup.insert(key, self.edges.len() - 1);
                self.edges.len() - 1
            }
        };
        let ori = if a <= b {
            Orientation::IDENTITY
        } else {
            Orientation::REVERSED_EDGE
        };
        (id, ori)
    }

    fn face_with(&mut self, cycle: Vec<usize>) -> Result<(usize, Orientation), DofSieveError> {
        let key: Vec<usize> = cycle.iter().copied().sorted_unstable().collect();
        if let Some(&id) = self.face_lookup.get(&key) {
            let ori = Orientation::of(&cycle, &self.faces[id].vertices).ok_or_else(|| {
                DofSieveError::InconsistentMesh(format!(
                    "face {id}: vertex cycle {cycle:?} does not match {:?}",
                    self.faces[id].vertices
                ))
            })?;
            return Ok((id, ori));
        }
        let geometry = CellType::polygon(cycle.len()).ok_or_else(|| {
            DofSieveError::InconsistentMesh(format!("face with {} vertices", cycle.len()))
        })?;
        let edges = geometry
            .edge_vertices()
            .iter()
            .map(|&[a, b]| self.edge_between(cycle[a], cycle[b]))
            .collect();
        self.faces.push(FaceRecord {
            geometry,
            vertices: cycle,
            edges,
        });
        let id = self.faces.len() - 1;
        self.face_lookup.insert(key, id);
        Ok((id, Orientation::IDENTITY))
    }

    /// Recompute exterior boundary entities, skipping master/slave entities.
    fn classify_boundary(&mut self) {
        let kind = match self.dimension {
            1 => EntityKind::Vertex,
            2 => EntityKind::Edge,
            _ => EntityKind::Face,
        };
        let mut touching: Vec<Vec<usize>> = vec![Vec::new(); self.num_entities(kind)];
        for (e, rec) in self.elements.iter().enumerate() {
            let ids: Vec<usize> = match kind {
                EntityKind::Vertex => rec.vertices.clone(),
                EntityKind::Edge => rec.edges.iter().map(|&(i, _)| i).collect(),
                EntityKind::Face => rec.faces.iter().map(|&(i, _)| i).collect(),
            };
            for i in ids {
                touching[i].push(e);
            }
        }
        let nc = match kind {
            EntityKind::Edge => Some(&self.nc_edges),
            EntityKind::Face => Some(&self.nc_faces),
            EntityKind::Vertex => None,
        };
        let mut hidden = vec![false; touching.len()];
        if let Some(list) = nc {
            for m in list.masters() {
                hidden[m.index] = true;
                for s in &m.slaves {
                    if let SlaveEntity::Regular(i) = s.entity {
                        hidden[i] = true;
                    }
                }
            }
        }

        self.boundary.clear();
        for (index, elems) in touching.iter().enumerate() {
            if elems.len() != 1 || hidden[index] {
                continue;
            }
            let centroid = self.entity_centroid(kind, index);
            self.boundary.push(BoundaryEntity {
                kind,
                index,
                element: elems[0],
                attribute: self.boundary_rule.attribute(&centroid),
            });
        }
    }

    fn entity_centroid(&self, kind: EntityKind, index: usize) -> Vec<f64> {
        let verts: Vec<usize> = match kind {
            EntityKind::Vertex => vec![index],
            EntityKind::Edge => self.edges[index].to_vec(),
            EntityKind::Face => self.faces[index].vertices.clone(),
        };
        let mut c = vec![0.0; self.dimension];
        for v in &verts {
            for (cd, xd) in c.iter_mut().zip(&self.coordinates[*v]) {
                *cd += xd / verts.len() as f64;
            }
        }
        c
    }

    /// Install master/slave lists for edges and faces.
    pub fn set_nc_lists(&mut self, edges: NcList, faces: NcList) -> Result<(), DofSieveError> {
        for (list, count, kind) in [
            (&edges, self.edges.len(), "edge"),
            (&faces, self.faces.len(), "face"),
        ] {
            for m in list.masters() {
                if m.index >= count {
                    return Err(DofSieveError::out_of_range(kind, m.index, count));
                }
                for s in &m.slaves {
                    let limit = match s.entity {
                        SlaveEntity::Regular(_) => count,
                        SlaveEntity::DegenerateEdge(_) => self.edges.len(),
                    };
                    if s.entity.index() >= limit {
                        return Err(DofSieveError::out_of_range(kind, s.entity.index(), limit));
                    }
                }
            }
        }
        self.nc_edges = edges;
        self.nc_faces = faces;
        self.classify_boundary();
        Ok(())
    }

    /// Record an adaptation step: bump the sequence and keep its transforms.
    pub fn record_operation(
        &mut self,
        previous_sequence: u64,
        operation: MeshOperation,
        transforms: Option<CoarseFineTransforms>,
    ) {
        self.sequence = previous_sequence + 1;
        self.last_operation = operation;
        self.refinement = None;
        self.derefinement = None;
        match operation {
            MeshOperation::Refine => self.refinement = transforms,
            MeshOperation::Derefine => self.derefinement = transforms,
            MeshOperation::None | MeshOperation::Rebalance => {}
        }
    }

    pub fn vertex_coordinates(&self, v: usize) -> &[f64] {
        &self.coordinates[v]
    }

    pub fn coordinates(&self) -> &[Vec<f64>] {
        &self.coordinates
    }

    pub fn element_attribute(&self, elem: usize) -> u32 {
        self.elements[elem].attribute
    }

    pub fn boundary_rule(&self) -> &BoundaryAttributes {
        &self.boundary_rule
    }

    /// Edge joining two vertices, if any.
    pub fn find_edge(&self, a: usize, b: usize) -> Option<usize> {
        self.edge_lookup.get(&[a.min(b), a.max(b)]).copied()
    }

    /// Face with the given vertex set, if any.
    pub fn find_face(&self, vertices: &[usize]) -> Option<usize> {
        let key: Vec<usize> = vertices.iter().copied().sorted_unstable().collect();
        self.face_lookup.get(&key).copied()
    }

    /// Physical coordinates of reference point `x` in element `elem`.
    pub fn map_to_physical(&self, elem: usize, x: &[f64]) -> Vec<f64> {
        let rec = &self.elements[elem];
        let phi = rec.geometry.vertex_shape(x);
        let mut out = vec![0.0; self.dimension];
        for (w, &v) in phi.iter().zip(&rec.vertices) {
            for (od, xd) in out.iter_mut().zip(&self.coordinates[v]) {
                *od += w * xd;
            }
        }
        out
    }
}

impl MeshTopology for InMemoryMesh {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn sequence(&self) -> u64 {
        self.sequence
    }

    fn num_vertices(&self) -> usize {
        self.coordinates.len()
    }

    fn num_edges(&self) -> usize {
        self.edges.len()
    }

    fn num_faces(&self) -> usize {
        self.faces.len()
    }

    fn num_elements(&self) -> usize {
        self.elements.len()
    }

    fn num_boundary_elements(&self) -> usize {
        self.boundary.len()
    }

    fn element_geometry(&self, elem: usize) -> CellType {
        self.elements[elem].geometry
    }

    fn face_geometry(&self, face: usize) -> CellType {
        self.faces[face].geometry
    }

    fn element_vertices(&self, elem: usize) -> &[usize] {
        &self.elements[elem].vertices
    }

    fn element_edges(&self, elem: usize) -> &[(usize, Orientation)] {
        &self.elements[elem].edges
    }

    fn element_faces(&self, elem: usize) -> &[(usize, Orientation)] {
        &self.elements[elem].faces
    }

    fn edge_vertices(&self, edge: usize) -> [usize; 2] {
        self.edges[edge]
    }

    fn face_vertices(&self, face: usize) -> &[usize] {
        &self.faces[face].vertices
    }

    fn face_edges(&self, face: usize) -> &[(usize, Orientation)] {
        &self.faces[face].edges
    }

    fn boundary_entity(&self, bel: usize) -> BoundaryEntity {
        self.boundary[bel]
    }

    fn nc_list(&self, kind: EntityKind) -> Option<&NcList> {
        match kind {
            EntityKind::Edge => Some(&self.nc_edges),
            EntityKind::Face => Some(&self.nc_faces),
            EntityKind::Vertex => None,
        }
    }

    fn last_operation(&self) -> MeshOperation {
        self.last_operation
    }

    fn refinement_transforms(&self) -> Option<&CoarseFineTransforms> {
        self.refinement.as_ref()
    }

    fn derefinement_transforms(&self) -> Option<&CoarseFineTransforms> {
        self.derefinement.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_quads() -> InMemoryMesh {
        let mut b = MeshBuilder::new(2);
        for &(x, y) in &[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0), (0.0, 1.0), (1.0, 1.0), (2.0, 1.0)] {
            b.add_vertex(vec![x, y]);
        }
        b.add_element(CellType::Quadrilateral, vec![0, 1, 4, 3], 1);
        b.add_element(CellType::Quadrilateral, vec![1, 2, 5, 4], 1);
        b.build().expect("valid mesh")
    }

    #[test]
    fn shared_edge_is_deduplicated() {
        let mesh = two_quads();
        assert_eq!(mesh.num_edges(), 7);
        let shared = mesh.find_edge(1, 4).expect("shared edge");
        assert_eq!(mesh.element_edges(0)[1].0, shared);
        assert_eq!(mesh.element_edges(1)[3].0, shared);
        assert_eq!(mesh.num_boundary_elements(), 6);
    }

    #[test]
    fn edge_orientation_follows_vertex_ids() {
        let mesh = two_quads();
        // element 0, local edge 2 runs 3 -> 4 (stored as [3, 4])
        let (_, o) = mesh.element_edges(0)[2];
        assert!(o.is_identity());
        let mut b = MeshBuilder::new(2);
        for &(x, y) in &[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)] {
            b.add_vertex(vec![x, y]);
        }
        b.add_element(CellType::Quadrilateral, vec![1, 2, 3, 0], 1);
        let m = b.build().expect("mesh");
        // local edge 3 runs vertex 1 -> vertex 0
        assert_eq!(m.element_edges(0)[3].1, Orientation::REVERSED_EDGE);
    }

    #[test]
    fn rejects_wrong_vertex_count() {
        let mut b = MeshBuilder::new(2);
        b.add_vertex(vec![0.0, 0.0]);
        b.add_element(CellType::Quadrilateral, vec![0, 0, 0], 1);
        assert!(b.build().is_err());
    }
}
