//! The finite element space: DOF layout, conforming operators and their
//! life cycle across mesh updates.
//!
//! A space is built for one mesh sequence. Derived data (the element DOF
//! table, its inverse and the conforming operators) is computed lazily and
//! stamped with that sequence. [`FiniteElementSpace::update`] moves the space
//! to a newer mesh, or applies pending element order changes, and can build
//! the operator mapping old DOF vectors to new ones.

use std::fmt;
use std::sync::Arc;

use nalgebra_sparse::CsrMatrix;
use serde::{Deserialize, Serialize};

use crate::basis::BasisCatalog;
use crate::debug_invariants::DebugInvariants;
use crate::dof_error::DofSieveError;
use crate::linalg::sparse::{boolean_mult, boolean_mult_transpose};
use crate::linalg::{LinearOperator, ProductOperator};
use crate::space::cache::{InvalidateCache, VersionedCache};
use crate::space::conforming::{ConformingOperators, ConstraintBuilder};
use crate::space::dof_table::{AllocationRequest, DofLayout, ElementDofTable, allocate};
use crate::space::locator::{DofLocator, EntityDofs};
use crate::space::ordering::{self, Ordering, marker_to_list};
use crate::space::orders::{EntityOrders, check_order, compute_entity_orders};
use crate::topology::mesh::{EntityKind, MeshOperation, MeshTopology};
use crate::transfer::{RefinementOperator, SpaceSnapshot, derefinement_matrix};

/// How the update operator after a refinement is represented.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperatorKind {
    /// Apply local interpolation matrices element by element.
    #[default]
    MatrixFree,
    /// Assemble a sparse matrix.
    Assembled,
}

/// Construction options of a [`FiniteElementSpace`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceOptions {
    /// Number of vector components.
    pub vdim: usize,
    pub ordering: Ordering,
    /// Let a master edge/face keep only the orders of its own elements
    /// instead of also picking up the lowest order of its slaves.
    pub relaxed_hp: bool,
    pub operator_kind: OperatorKind,
}

impl Default for SpaceOptions {
    fn default() -> Self {
        Self {
            vdim: 1,
            ordering: Ordering::NodeMajor,
            relaxed_hp: false,
            operator_kind: OperatorKind::MatrixFree,
        }
    }
}

impl SpaceOptions {
    pub fn with_vdim(mut self, vdim: usize) -> Self {
        self.vdim = vdim;
        self
    }

    pub fn with_ordering(mut self, ordering: Ordering) -> Self {
        self.ordering = ordering;
        self
    }

    pub fn with_relaxed_hp(mut self, relaxed: bool) -> Self {
        self.relaxed_hp = relaxed;
        self
    }

    pub fn with_operator_kind(mut self, kind: OperatorKind) -> Self {
        self.operator_kind = kind;
        self
    }

    fn validate(&self) -> Result<(), DofSieveError> {
        if self.vdim == 0 {
            return Err(DofSieveError::Unsupported("vdim must be at least 1"));
        }
        Ok(())
    }
}

fn build_layout<M, C>(
    mesh: &M,
    catalog: &C,
    element_orders: &[u8],
    relaxed: bool,
) -> Result<(Option<EntityOrders>, DofLayout), DofSieveError>
where
    M: MeshTopology,
    C: BasisCatalog,
{
    let entity_orders = if element_orders.is_empty() {
        None
    } else {
        Some(compute_entity_orders(mesh, element_orders, relaxed)?)
    };
    let layout = allocate(
        mesh,
        catalog,
        AllocationRequest {
            element_orders,
            entity_orders: entity_orders.as_ref(),
        },
    )?;
    Ok((entity_orders, layout))
}

/// Element orders on `mesh` derived from the orders on the mesh it was
/// adapted from: children inherit their parent's order, a derefined element
/// takes the highest order of its former children.
fn updated_element_orders<M: MeshTopology>(mesh: &M, old: &[u8]) -> Result<Vec<u8>, DofSieveError> {
    let ne = mesh.num_elements();
    match mesh.last_operation() {
        MeshOperation::Refine => {
            let t = mesh
                .refinement_transforms()
                .ok_or(DofSieveError::MissingTransforms("refinement"))?;
            if t.embeddings().len() != ne {
                return Err(DofSieveError::SizeMismatch {
                    what: "refinement embeddings",
                    expected: ne,
                    found: t.embeddings().len(),
                });
            }
            t.embeddings()
                .iter()
                .map(|e| {
                    old.get(e.parent)
                        .copied()
                        .ok_or_else(|| DofSieveError::out_of_range("coarse element", e.parent, old.len()))
                })
                .collect()
        }
        MeshOperation::Derefine => {
            let t = mesh
                .derefinement_transforms()
                .ok_or(DofSieveError::MissingTransforms("derefinement"))?;
            if t.embeddings().len() != old.len() {
                return Err(DofSieveError::SizeMismatch {
                    what: "derefinement embeddings",
                    expected: old.len(),
                    found: t.embeddings().len(),
                });
            }
            let mut orders: Vec<Option<u8>> = vec![None; ne];
            for (fine, e) in t.embeddings().iter().enumerate() {
                let slot = orders
                    .get_mut(e.parent)
                    .ok_or_else(|| DofSieveError::out_of_range("coarse element", e.parent, ne))?;
                *slot = Some(slot.map_or(old[fine], |p| p.max(old[fine])));
            }
            orders
                .into_iter()
                .enumerate()
                .map(|(e, p)| {
                    p.ok_or_else(|| {
                        DofSieveError::InconsistentMesh(format!("element {e} has no former children"))
                    })
                })
                .collect()
        }
        MeshOperation::None | MeshOperation::Rebalance => {
            if ne != old.len() {
                return Err(DofSieveError::Unsupported(
                    "element orders across a mesh change without transforms",
                ));
            }
            Ok(old.to_vec())
        }
    }
}

/// Global DOF numbering of a (possibly vector-valued, variable-order)
/// finite element space on a mesh, with its conforming operators.
pub struct FiniteElementSpace<M, C> {
    mesh: Arc<M>,
    catalog: Arc<C>,
    options: SpaceOptions,
    /// Mesh sequence the layout was built for.
    sequence: u64,
    /// Per-element orders; empty while the space has a uniform order.
    element_orders: Vec<u8>,
    /// `element_orders` differs from the orders the layout was built with.
    orders_changed: bool,
    entity_orders: Option<EntityOrders>,
    layout: DofLayout,
    element_table: VersionedCache<ElementDofTable>,
    dof_elements: VersionedCache<Vec<Option<(usize, usize)>>>,
    conforming: VersionedCache<ConformingOperators>,
    update_operator: Option<Box<dyn LinearOperator>>,
}

/// Everything [`FiniteElementSpace::update`] replaces, so a failed update
/// can put the previous state back.
struct LayoutState<M> {
    mesh: Arc<M>,
    sequence: u64,
    element_orders: Vec<u8>,
    orders_changed: bool,
    entity_orders: Option<EntityOrders>,
    layout: DofLayout,
}

impl<M, C> FiniteElementSpace<M, C>
where
    M: MeshTopology,
    C: BasisCatalog,
{
    /// A uniform-order space using `catalog.default_order()` everywhere.
    pub fn new(mesh: Arc<M>, catalog: Arc<C>, options: SpaceOptions) -> Result<Self, DofSieveError> {
        Self::with_element_orders(mesh, catalog, options, Vec::new())
    }

    /// A space with explicit per-element orders (uniform when `orders` is empty).
    pub fn with_element_orders(
        mesh: Arc<M>,
        catalog: Arc<C>,
        options: SpaceOptions,
        orders: Vec<u8>,
    ) -> Result<Self, DofSieveError> {
        options.validate()?;
        if !orders.is_empty() && orders.len() != mesh.num_elements() {
            return Err(DofSieveError::SizeMismatch {
                what: "element orders",
                expected: mesh.num_elements(),
                found: orders.len(),
            });
        }
        for &p in &orders {
            check_order(p as u32)?;
        }
        let (entity_orders, layout) = build_layout(&*mesh, &*catalog, &orders, options.relaxed_hp)?;
        log::debug!(
            "space on mesh sequence {}: {} DOFs, vdim {}",
            mesh.sequence(),
            layout.ndofs(),
            options.vdim
        );
        Ok(Self {
            sequence: mesh.sequence(),
            mesh,
            catalog,
            options,
            element_orders: orders,
            orders_changed: false,
            entity_orders,
            layout,
            element_table: VersionedCache::new(),
            dof_elements: VersionedCache::new(),
            conforming: VersionedCache::new(),
            update_operator: None,
        })
    }

    pub fn mesh(&self) -> &Arc<M> {
        &self.mesh
    }

    pub fn catalog(&self) -> &Arc<C> {
        &self.catalog
    }

    pub fn options(&self) -> &SpaceOptions {
        &self.options
    }

    pub fn vdim(&self) -> usize {
        self.options.vdim
    }

    pub fn ordering(&self) -> Ordering {
        self.options.ordering
    }

    /// Mesh sequence the space was last built for.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn layout(&self) -> &DofLayout {
        &self.layout
    }

    /// Edge/face order masks of a variable-order space.
    pub fn entity_orders(&self) -> Option<&EntityOrders> {
        self.entity_orders.as_ref()
    }

    /// Number of scalar DOFs.
    pub fn ndofs(&self) -> usize {
        self.layout.ndofs()
    }

    /// Number of vector DOFs (`vdim * ndofs`).
    pub fn vsize(&self) -> usize {
        self.options.vdim * self.ndofs()
    }

    pub fn locator(&self) -> DofLocator<'_, M, C> {
        DofLocator::new(&*self.mesh, &*self.catalog, &self.layout)
    }

    fn ensure_current(&self) -> Result<(), DofSieveError> {
        let mesh = self.mesh.sequence();
        if mesh != self.sequence {
            return Err(DofSieveError::StaleSpace {
                space: self.sequence,
                mesh,
            });
        }
        Ok(())
    }

    // ---- element orders ----

    /// Whether the space carries per-element orders.
    pub fn is_variable_order(&self) -> bool {
        !self.element_orders.is_empty()
    }

    /// Order of element `elem`, including changes not yet applied by [`Self::update`].
    pub fn element_order(&self, elem: usize) -> Result<u8, DofSieveError> {
        let ne = self.mesh.num_elements();
        if elem >= ne {
            return Err(DofSieveError::out_of_range("element", elem, ne));
        }
        Ok(self
            .element_orders
            .get(elem)
            .copied()
            .unwrap_or_else(|| self.catalog.default_order()))
    }

    /// Per-element orders as set; empty for a uniform-order space.
    pub fn element_orders(&self) -> &[u8] {
        &self.element_orders
    }

    pub fn max_element_order(&self) -> u8 {
        self.element_orders
            .iter()
            .copied()
            .max()
            .unwrap_or_else(|| self.catalog.default_order())
    }

    /// Change the order of one element. Takes effect on the next [`Self::update`].
    pub fn set_element_order(&mut self, elem: usize, order: u8) -> Result<(), DofSieveError> {
        let ne = self.mesh.num_elements();
        if elem >= ne {
            return Err(DofSieveError::out_of_range("element", elem, ne));
        }
        let order = check_order(order as u32)?;
        if self.element_orders.is_empty() {
            if order == self.catalog.default_order() {
                return Ok(());
            }
            self.element_orders = vec![self.catalog.default_order(); ne];
        }
        if self.element_orders[elem] != order {
            self.element_orders[elem] = order;
            self.orders_changed = true;
        }
        Ok(())
    }

    // ---- update ----

    /// Rebuild the space for `mesh`, or for pending element order changes.
    ///
    /// With `want_transform`, a mesh change must be exactly one refinement or
    /// derefinement step, and the operator mapping old DOF vectors to new ones
    /// becomes available through [`Self::update_operator`].
    pub fn update(&mut self, mesh: Arc<M>, want_transform: bool) -> Result<(), DofSieveError> {
        let new_sequence = mesh.sequence();
        let mesh_changed = new_sequence != self.sequence;
        if !mesh_changed && !self.orders_changed {
            return Ok(());
        }
        if mesh_changed && self.orders_changed {
            return Err(DofSieveError::MeshAndOrdersChanged);
        }
        if mesh_changed && want_transform && new_sequence != self.sequence + 1 {
            return Err(DofSieveError::UpdateSequence {
                expected_from: self.sequence,
                found: new_sequence,
            });
        }

        let old = if mesh_changed && want_transform {
            Some(self.snapshot()?)
        } else {
            None
        };
        let element_orders = if mesh_changed && self.is_variable_order() {
            updated_element_orders(&*mesh, &self.element_orders)?
        } else {
            self.element_orders.clone()
        };
        let (entity_orders, layout) =
            build_layout(&*mesh, &*self.catalog, &element_orders, self.options.relaxed_hp)?;

        let previous = self.swap_state(LayoutState {
            mesh,
            sequence: new_sequence,
            element_orders,
            orders_changed: false,
            entity_orders,
            layout,
        });
        let previous_operator = self.update_operator.take();

        match old {
            Some(old) => match self.build_update_operator(old) {
                Ok(op) => self.update_operator = op,
                Err(err) => {
                    self.swap_state(previous);
                    self.update_operator = previous_operator;
                    log::warn!("update to mesh sequence {new_sequence} rolled back: {err}");
                    return Err(err);
                }
            },
            None if !mesh_changed => log::debug!("element orders changed; no update operator built"),
            None => {}
        }
        log::debug!(
            "space updated to mesh sequence {}: {} DOFs",
            self.sequence,
            self.layout.ndofs()
        );
        Ok(())
    }

    /// Install `state` and return the one it replaces. Caches are dropped.
    fn swap_state(&mut self, mut state: LayoutState<M>) -> LayoutState<M> {
        std::mem::swap(&mut self.mesh, &mut state.mesh);
        std::mem::swap(&mut self.sequence, &mut state.sequence);
        std::mem::swap(&mut self.element_orders, &mut state.element_orders);
        std::mem::swap(&mut self.orders_changed, &mut state.orders_changed);
        std::mem::swap(&mut self.entity_orders, &mut state.entity_orders);
        std::mem::swap(&mut self.layout, &mut state.layout);
        self.invalidate_cache();
        state
    }

    fn build_update_operator(
        &self,
        old: SpaceSnapshot,
    ) -> Result<Option<Box<dyn LinearOperator>>, DofSieveError> {
        match self.mesh.last_operation() {
            MeshOperation::Refine => {
                let transforms = self
                    .mesh
                    .refinement_transforms()
                    .ok_or(DofSieveError::MissingTransforms("refinement"))?;
                let op = RefinementOperator::new(&*self.catalog, old, self.snapshot()?, transforms)?;
                let op: Box<dyn LinearOperator> = match self.options.operator_kind {
                    OperatorKind::MatrixFree => Box::new(op),
                    OperatorKind::Assembled => Box::new(op.assemble()?),
                };
                Ok(Some(op))
            }
            MeshOperation::Derefine => {
                let transforms = self
                    .mesh
                    .derefinement_transforms()
                    .ok_or(DofSieveError::MissingTransforms("derefinement"))?;
                let t = derefinement_matrix(&*self.catalog, &old, &self.snapshot()?, transforms)?;
                let ops = self.conforming_operators()?;
                match (&ops.prolongation, &ops.restriction) {
                    (Some(p), Some(r)) => {
                        let factors: Vec<Box<dyn LinearOperator>> =
                            vec![Box::new(p.clone()), Box::new(r.clone()), Box::new(t)];
                        Ok(Some(Box::new(ProductOperator::new(factors)?)))
                    }
                    _ => Ok(Some(Box::new(t))),
                }
            }
            MeshOperation::None | MeshOperation::Rebalance => {
                log::warn!("mesh changed without refinement or derefinement; no update operator");
                Ok(None)
            }
        }
    }

    /// Operator mapping DOF vectors of the previous space to this one.
    pub fn update_operator(&self) -> Option<&dyn LinearOperator> {
        self.update_operator.as_deref()
    }

    pub fn take_update_operator(&mut self) -> Option<Box<dyn LinearOperator>> {
        self.update_operator.take()
    }

    /// Map a DOF vector of the previous space through the update operator.
    pub fn update_vector(&self, old: &[f64]) -> Result<Vec<f64>, DofSieveError> {
        self.update_operator
            .as_deref()
            .ok_or(DofSieveError::Unsupported("no update operator; update with want_transform"))?
            .apply_vec(old)
    }

    /// Frozen element DOFs, geometries and orders for transfer operators.
    pub fn snapshot(&self) -> Result<SpaceSnapshot, DofSieveError> {
        let table = self.element_table()?.clone();
        let locator = self.locator();
        let ne = self.mesh.num_elements();
        let orders = (0..ne)
            .map(|e| locator.element_order(e))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SpaceSnapshot {
            table,
            geometries: (0..ne).map(|e| self.mesh.element_geometry(e)).collect(),
            orders,
            ndofs: self.ndofs(),
            vdim: self.options.vdim,
            ordering: self.options.ordering,
        })
    }

    // ---- element and entity DOFs ----

    /// Signed DOFs of every element.
    pub fn element_table(&self) -> Result<&ElementDofTable, DofSieveError> {
        self.ensure_current()?;
        self.element_table.get_or_try_init(self.sequence, || {
            let locator = self.locator();
            let rows = (0..self.mesh.num_elements())
                .map(|e| locator.element_dofs(e))
                .collect::<Result<Vec<_>, _>>()?;
            let table = ElementDofTable::from_rows(rows, self.ndofs());
            table.debug_assert_invariants();
            Ok(table)
        })
    }

    pub fn element_dofs(&self, elem: usize) -> Result<&[i64], DofSieveError> {
        self.element_table()?.row(elem)
    }

    pub fn element_vdofs(&self, elem: usize) -> Result<Vec<i64>, DofSieveError> {
        Ok(self.dofs_to_vdofs(self.element_dofs(elem)?))
    }

    pub fn boundary_element_dofs(&self, bel: usize) -> Result<Vec<i64>, DofSieveError> {
        self.ensure_current()?;
        self.locator().boundary_element_dofs(bel)
    }

    pub fn boundary_element_vdofs(&self, bel: usize) -> Result<Vec<i64>, DofSieveError> {
        Ok(self.dofs_to_vdofs(&self.boundary_element_dofs(bel)?))
    }

    pub fn vertex_dofs(&self, vertex: usize) -> Result<Vec<i64>, DofSieveError> {
        self.locator()
            .own_dofs(EntityKind::Vertex, vertex, 0)?
            .ok_or_else(|| DofSieveError::out_of_range("vertex", vertex, self.mesh.num_vertices()))
    }

    /// Own DOFs of one variant of an edge; `None` when the variant does not exist.
    pub fn edge_interior_dofs(&self, edge: usize, variant: usize) -> Result<Option<Vec<i64>>, DofSieveError> {
        let n = self.mesh.num_edges();
        if edge >= n {
            return Err(DofSieveError::out_of_range("edge", edge, n));
        }
        self.locator().own_dofs(EntityKind::Edge, edge, variant)
    }

    /// Own DOFs of one variant of a face; `None` when the variant does not exist.
    pub fn face_interior_dofs(&self, face: usize, variant: usize) -> Result<Option<Vec<i64>>, DofSieveError> {
        let n = self.mesh.num_faces();
        if face >= n {
            return Err(DofSieveError::out_of_range("face", face, n));
        }
        self.locator().own_dofs(EntityKind::Face, face, variant)
    }

    pub fn element_interior_dofs(&self, elem: usize) -> Result<Vec<i64>, DofSieveError> {
        self.locator().element_interior_dofs(elem)
    }

    /// Closure DOFs of one variant of an entity.
    pub fn entity_dofs(
        &self,
        kind: EntityKind,
        index: usize,
        variant: usize,
    ) -> Result<Option<EntityDofs>, DofSieveError> {
        self.locator().entity_dofs(kind, index, variant)
    }

    pub fn num_entity_variants(&self, kind: EntityKind, index: usize) -> usize {
        self.layout.num_variants(kind, index)
    }

    /// First element containing `dof` and the DOF's local index there.
    pub fn dof_element(&self, dof: usize) -> Result<Option<(usize, usize)>, DofSieveError> {
        let map = self
            .dof_elements
            .get_or_try_init(self.sequence, || Ok(self.element_table()?.dof_to_element()))?;
        map.get(dof)
            .copied()
            .ok_or_else(|| DofSieveError::out_of_range("dof", dof, map.len()))
    }

    // ---- vector DOFs ----

    pub fn dof_to_vdof(&self, dof: i64, component: usize) -> i64 {
        ordering::dof_to_vdof(dof, component, self.ndofs(), self.options.vdim, self.options.ordering)
    }

    pub fn dofs_to_vdofs(&self, dofs: &[i64]) -> Vec<i64> {
        ordering::dofs_to_vdofs(dofs, self.ndofs(), self.options.vdim, self.options.ordering)
    }

    /// `(dof, component)` of an unsigned vector DOF.
    pub fn vdof_to_dof(&self, vdof: usize) -> Result<(usize, usize), DofSieveError> {
        if vdof >= self.vsize() {
            return Err(DofSieveError::out_of_range("vdof", vdof, self.vsize()));
        }
        Ok(ordering::vdof_to_dof(
            vdof,
            self.ndofs(),
            self.options.vdim,
            self.options.ordering,
        ))
    }

    // ---- conforming operators ----

    /// `P`, `R` and `Q`, built on first use.
    pub fn conforming_operators(&self) -> Result<&ConformingOperators, DofSieveError> {
        self.ensure_current()?;
        self.conforming.get_or_try_init(self.sequence, || {
            let variable = self.entity_orders.is_some();
            if !variable && !self.mesh.is_nonconforming() {
                return Ok(ConformingOperators {
                    num_true_dofs: self.ndofs(),
                    ..Default::default()
                });
            }
            let ops = ConstraintBuilder::new(&*self.mesh, &*self.catalog, self.locator(), variable)
                .build(self.options.vdim, self.options.ordering)?;
            log::debug!(
                "conforming operators: {} of {} DOFs are true DOFs ({} passes)",
                ops.num_true_dofs,
                self.ndofs(),
                ops.passes
            );
            Ok(ops)
        })
    }

    /// Conforming prolongation `P` (vsize × true vsize); `None` is the identity.
    pub fn conforming_prolongation(&self) -> Result<Option<&CsrMatrix<f64>>, DofSieveError> {
        Ok(self.conforming_operators()?.prolongation.as_ref())
    }

    /// Conforming restriction `R` (true vsize × vsize); `None` is the identity.
    pub fn conforming_restriction(&self) -> Result<Option<&CsrMatrix<f64>>, DofSieveError> {
        Ok(self.conforming_operators()?.restriction.as_ref())
    }

    /// Restriction `Q` reading true DOFs from their highest-order variant.
    pub fn variant_interpolation(&self) -> Result<Option<&CsrMatrix<f64>>, DofSieveError> {
        Ok(self.conforming_operators()?.variant_interpolation.as_ref())
    }

    pub fn num_true_dofs(&self) -> Result<usize, DofSieveError> {
        Ok(self.conforming_operators()?.num_true_dofs)
    }

    pub fn true_vsize(&self) -> Result<usize, DofSieveError> {
        Ok(self.options.vdim * self.num_true_dofs()?)
    }

    // ---- essential DOFs and marker conversions ----

    /// Marker of the vdofs on boundary elements whose attribute is marked in
    /// `bdr_attr_marker` (index `attribute - 1`). With `component`, only that
    /// component is marked.
    pub fn essential_vdofs(
        &self,
        bdr_attr_marker: &[bool],
        component: Option<usize>,
    ) -> Result<Vec<bool>, DofSieveError> {
        let vdim = self.options.vdim;
        if let Some(c) = component {
            if c >= vdim {
                return Err(DofSieveError::out_of_range("component", c, vdim));
            }
        }
        let mut marker = vec![false; self.vsize()];
        let locator = self.locator();
        for bel in 0..self.mesh.num_boundary_elements() {
            let attribute = self.mesh.boundary_entity(bel).attribute as usize;
            let marked = attribute
                .checked_sub(1)
                .and_then(|a| bdr_attr_marker.get(a))
                .copied()
                .unwrap_or(false);
            if !marked {
                continue;
            }
            let dofs = locator.boundary_element_dofs(bel)?;
            let components = match component {
                Some(c) => c..c + 1,
                None => 0..vdim,
            };
            for c in components {
                for &d in &dofs {
                    marker[ordering::decode(self.dof_to_vdof(d, c))] = true;
                }
            }
        }
        Ok(marker)
    }

    /// Essential true vdofs, ascending.
    pub fn essential_true_dofs(
        &self,
        bdr_attr_marker: &[bool],
        component: Option<usize>,
    ) -> Result<Vec<usize>, DofSieveError> {
        let ess = self.essential_vdofs(bdr_attr_marker, component)?;
        Ok(match self.conforming_restriction()? {
            Some(r) => marker_to_list(&boolean_mult(r, &ess)),
            None => marker_to_list(&ess),
        })
    }

    /// Mark the true vdofs influenced by a marked local vdof (`Pᵀ`).
    pub fn convert_to_conforming_vdofs(&self, marker: &[bool]) -> Result<Vec<bool>, DofSieveError> {
        check_marker(marker, self.vsize())?;
        Ok(match self.conforming_prolongation()? {
            Some(p) => boolean_mult_transpose(p, marker),
            None => marker.to_vec(),
        })
    }

    /// Mark the local vdofs that copy a marked true vdof (`Rᵀ`).
    pub fn convert_from_conforming_vdofs(&self, marker: &[bool]) -> Result<Vec<bool>, DofSieveError> {
        check_marker(marker, self.true_vsize()?)?;
        Ok(match self.conforming_restriction()? {
            Some(r) => boolean_mult_transpose(r, marker),
            None => marker.to_vec(),
        })
    }
}

fn check_marker(marker: &[bool], len: usize) -> Result<(), DofSieveError> {
    if marker.len() != len {
        return Err(DofSieveError::SizeMismatch {
            what: "vdof marker",
            expected: len,
            found: marker.len(),
        });
    }
    Ok(())
}

impl<M, C> InvalidateCache for FiniteElementSpace<M, C> {
    fn invalidate_cache(&mut self) {
        self.element_table.invalidate_cache();
        self.dof_elements.invalidate_cache();
        self.conforming.invalidate_cache();
    }
}

impl<M, C> fmt::Debug for FiniteElementSpace<M, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FiniteElementSpace")
            .field("sequence", &self.sequence)
            .field("options", &self.options)
            .field("ndofs", &self.layout.ndofs())
            .field("variable_order", &!self.element_orders.is_empty())
            .field("orders_changed", &self.orders_changed)
            .field("has_update_operator", &self.update_operator.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basis::LagrangeCollection;
    use crate::topology::generation::{interval_mesh, quad_mesh};
    use crate::topology::refine::refine;

    fn quad_space(order: u8) -> FiniteElementSpace<crate::topology::InMemoryMesh, LagrangeCollection> {
        let mesh = Arc::new(quad_mesh(2, 1, [0.0, 0.0], [2.0, 1.0]).unwrap());
        FiniteElementSpace::new(mesh, Arc::new(LagrangeCollection::new(order, 2).unwrap()), SpaceOptions::default())
            .unwrap()
    }

    #[test]
    fn options_builders_and_validation() {
        let o = SpaceOptions::default()
            .with_vdim(3)
            .with_ordering(Ordering::ComponentMajor)
            .with_relaxed_hp(true)
            .with_operator_kind(OperatorKind::Assembled);
        assert_eq!(o.vdim, 3);
        assert_eq!(o.ordering, Ordering::ComponentMajor);
        assert!(o.relaxed_hp);
        assert!(SpaceOptions::default().with_vdim(0).validate().is_err());
    }

    #[test]
    fn conforming_space_has_identity_operators() {
        let s = quad_space(2);
        assert_eq!(s.ndofs(), 15);
        assert!(s.conforming_prolongation().unwrap().is_none());
        assert_eq!(s.true_vsize().unwrap(), 15);
        assert_eq!(s.element_dofs(1).unwrap().len(), 9);
    }

    #[test]
    fn order_change_is_pending_until_update() {
        let mut s = quad_space(1);
        s.set_element_order(0, 2).unwrap();
        assert!(s.is_variable_order());
        assert_eq!(s.element_order(0).unwrap(), 2);
        assert_eq!(s.ndofs(), 6);
        let mesh = s.mesh().clone();
        s.update(mesh, false).unwrap();
        assert_eq!(s.max_element_order(), 2);
        assert!(s.ndofs() > 6);
        assert!(s.update_operator().is_none());
    }

    #[test]
    fn mesh_and_order_change_together_is_rejected() {
        let mut s = quad_space(1);
        s.set_element_order(1, 2).unwrap();
        let fine = Arc::new(refine(s.mesh(), &[0]).unwrap());
        assert_eq!(s.update(fine, true), Err(DofSieveError::MeshAndOrdersChanged));
    }

    #[test]
    fn skipped_sequence_is_rejected_with_transform() {
        let mesh = interval_mesh(2, 0.0, 1.0).unwrap();
        let f1 = refine(&mesh, &[0]).unwrap();
        let f2 = Arc::new(refine(&f1, &[0]).unwrap());
        let mut s = FiniteElementSpace::new(
            Arc::new(mesh),
            Arc::new(LagrangeCollection::new(1, 1).unwrap()),
            SpaceOptions::default(),
        )
        .unwrap();
        assert_eq!(
            s.update(f2.clone(), true),
            Err(DofSieveError::UpdateSequence {
                expected_from: 0,
                found: 2
            })
        );
        s.update(f2, false).unwrap();
        assert_eq!(s.sequence(), 2);
        assert_eq!(s.ndofs(), 5);
    }

    #[test]
    fn refined_children_inherit_parent_order() {
        let mut s = quad_space(1);
        s.set_element_order(1, 3).unwrap();
        let mesh = s.mesh().clone();
        s.update(mesh, false).unwrap();
        let fine = Arc::new(refine(s.mesh(), &[1]).unwrap());
        s.update(fine, false).unwrap();
        assert_eq!(s.element_order(0).unwrap(), 1);
        for child in 1..5 {
            assert_eq!(s.element_order(child).unwrap(), 3);
        }
    }
}
