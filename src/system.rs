//! Numbering of the unknowns within a single cell.
use crate::allocators::DimAllocator;
use crate::basis::{BaseElement, ScalarBasis};
use crate::cell::CellMapping;
use crate::error::{Error, Result};
use crate::layout::BaseElementCatalog;
use crate::{Real, SmallDim};
use nalgebra::{DMatrix, DVector, DefaultAllocator, OPoint};
use serde::{Deserialize, Serialize};
use std::iter::repeat;
use std::ops::Range;

/// The cell-local layout of a vector-valued finite element built from scalar base elements.
///
/// Every component uses the basis of its base element. The cell-local coefficient vector
/// stores all coefficients of component 0, followed by all coefficients of component 1,
/// and so on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiniteElementSystem {
    dim: usize,
    base_elements: Vec<BaseElement>,
    component_base_elements: Vec<usize>,
    // Length n_components + 1
    component_dof_offsets: Vec<usize>,
}

impl FiniteElementSystem {
    /// Builds the system for the given catalog, whose entries must be listed in component order.
    pub fn new(catalog: &BaseElementCatalog, dim: usize) -> Result<Self> {
        for element in &catalog.elements {
            // Rejects elements that cannot be evaluated
            ScalarBasis::<f64>::new(*element, dim)?;
        }

        let component_base_elements: Vec<usize> = catalog
            .multiplicities
            .iter()
            .enumerate()
            .flat_map(|(b, &multiplicity)| repeat(b).take(multiplicity))
            .collect();
        let mut component_dof_offsets = Vec::with_capacity(component_base_elements.len() + 1);
        component_dof_offsets.push(0);
        let mut offset = 0;
        for &b in &component_base_elements {
            offset += catalog.elements[b].n_dofs(dim);
            component_dof_offsets.push(offset);
        }

        Ok(Self {
            dim,
            base_elements: catalog.elements.clone(),
            component_base_elements,
            component_dof_offsets,
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn n_components(&self) -> usize {
        self.component_base_elements.len()
    }

    /// The length of the cell-local coefficient vector.
    pub fn n_dofs_per_cell(&self) -> usize {
        self.component_dof_offsets.last().copied().unwrap_or(0)
    }

    pub fn base_elements(&self) -> &[BaseElement] {
        &self.base_elements
    }

    pub fn component_base_element_index(&self, component: usize) -> usize {
        self.component_base_elements[component]
    }

    pub fn component_base_element(&self, component: usize) -> &BaseElement {
        &self.base_elements[self.component_base_elements[component]]
    }

    /// The range of the cell-local coefficient vector belonging to the given component.
    ///
    /// # Panics
    /// Panics if `component` is out of bounds.
    pub fn component_dofs(&self, component: usize) -> Range<usize> {
        self.component_dof_offsets[component]..self.component_dof_offsets[component + 1]
    }

    /// Computes cell-local coefficients that interpolate the given function.
    ///
    /// `f(component, x)` is evaluated at the physical images of the unisolvent points of each
    /// component's basis. The result reproduces `f` exactly whenever `f` lies in the finite
    /// element space on the cell, e.g. for polynomials of degree at most $k$ on affine cells.
    pub fn interpolate<T, D>(
        &self,
        cell: &dyn CellMapping<T, D>,
        f: impl Fn(usize, &OPoint<T, D>) -> T,
    ) -> Result<DVector<T>>
    where
        T: Real,
        D: SmallDim,
        DefaultAllocator: DimAllocator<T, D>,
    {
        if D::dim() != self.dim {
            return Err(Error::DimensionMismatch {
                what: "spatial dimension",
                expected: self.dim,
                actual: D::dim(),
            });
        }

        let mut coefficients = DVector::zeros(self.n_dofs_per_cell());
        for (b, element) in self.base_elements.iter().enumerate() {
            let components: Vec<usize> = (0..self.n_components())
                .filter(|&component| self.component_base_elements[component] == b)
                .collect();
            if components.is_empty() {
                continue;
            }

            let basis = ScalarBasis::<T>::new(*element, self.dim)?;
            let n = basis.n_dofs();
            let points = basis.unisolvent_points::<D>();
            let mut row = vec![T::zero(); n];
            let mut vandermonde = DMatrix::zeros(n, n);
            for (i, xi) in points.iter().enumerate() {
                basis.populate_basis(&mut row, xi);
                for (j, &phi_j) in row.iter().enumerate() {
                    vandermonde[(i, j)] = phi_j;
                }
            }
            let lu = vandermonde.lu();
            let physical_points: Vec<_> = points
                .iter()
                .map(|xi| cell.map_reference_coords(xi))
                .collect();

            for component in components {
                let rhs = DVector::from_iterator(n, physical_points.iter().map(|x| f(component, x)));
                let solution = lu.solve(&rhs).ok_or(Error::SingularInterpolation)?;
                coefficients
                    .rows_range_mut(self.component_dofs(component))
                    .copy_from(&solution);
            }
        }
        Ok(coefficients)
    }
}
