//! Point evaluation for a number of components that is only known at runtime.
//!
//! Evaluating several components at once is most efficient when the number of components is
//! fixed at compile time, which is what [`PointEvaluation`] does. The number of compositional
//! fields sharing a basis is only known at runtime, however, so [`make_point_evaluation`]
//! selects the matching specialization for a runtime cardinality and returns it behind the
//! object-safe [`DynamicPointEvaluation`] trait. Cardinalities up to
//! [`MAX_EVALUATION_CARDINALITY`] are supported; callers split larger groups.
use crate::allocators::DimAllocator;
use crate::basis::{BaseElement, ScalarBasis};
use crate::cell::CellMapping;
use crate::error::{Error, Result};
use crate::mapping::{EvaluationFlags, MappingInfo, UpdateFlags};
use crate::system::FiniteElementSystem;
use crate::{Real, SmallDim};
use itertools::izip;
use nalgebra::{DefaultAllocator, OPoint, OVector};
use std::array;
use std::fmt::Debug;

/// The largest number of components a single point evaluation handles.
pub const MAX_EVALUATION_CARDINALITY: usize = 10;

/// Where a point evaluation takes the cell geometry from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum GeometrySource {
    /// Geometry is read from a [`MappingInfo`] shared with other evaluators.
    Shared,
    /// The evaluator owns its geometry, which must be rebound through
    /// [`DynamicPointEvaluation::reinit`] for every cell.
    Own,
}

impl GeometrySource {
    /// Tensor-product bases can use shared geometry, all others need their own.
    pub fn preferred_for(element: &BaseElement) -> Self {
        if element.is_tensor_product() {
            GeometrySource::Shared
        } else {
            GeometrySource::Own
        }
    }
}

/// Evaluation of a fixed set of consecutive components at the points of one cell.
///
/// The methods taking a point index may only be called after a successful call to
/// [`evaluate`](Self::evaluate) that computed the corresponding quantity.
pub trait DynamicPointEvaluation<T, D>: Debug
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    /// The first solution component handled by this evaluation.
    fn first_component(&self) -> usize;

    /// The number of consecutive components handled by this evaluation.
    fn n_components(&self) -> usize;

    fn base_element(&self) -> &BaseElement;

    fn uses_shared_geometry(&self) -> bool;

    /// Rebinds the evaluator's own geometry for the quantities in `flags`. Does nothing for
    /// evaluators using shared geometry.
    fn reinit(&mut self, cell: &dyn CellMapping<T, D>, points: &[OPoint<T, D>], flags: EvaluationFlags) -> Result<()>;

    /// Evaluates the components at all points of the current geometry.
    ///
    /// `shared` is ignored by evaluators that own their geometry.
    fn evaluate(&mut self, shared: &MappingInfo<T, D>, coefficients: &[T], flags: EvaluationFlags) -> Result<()>;

    /// The number of points evaluated by the last call to [`evaluate`](Self::evaluate).
    fn n_points(&self) -> usize;

    /// The quantities computed by the last call to [`evaluate`](Self::evaluate). Empty if it failed.
    fn evaluated(&self) -> EvaluationFlags;

    /// Discards all evaluated quantities and the evaluator's own geometry.
    fn clear(&mut self);

    /// Writes the value of each component at the given point into `values`.
    ///
    /// # Panics
    /// Panics if `values.len() != self.n_components()`, if `point` is out of bounds or if
    /// values were not computed.
    fn value_into(&self, point: usize, values: &mut [T]);

    /// Writes the physical gradient of each component at the given point into `gradients`.
    ///
    /// # Panics
    /// Panics if `gradients.len() != self.n_components()`, if `point` is out of bounds or if
    /// gradients were not computed.
    fn gradient_into(&self, point: usize, gradients: &mut [OVector<T, D>]);

    fn get_value(&self, point: usize) -> Vec<T> {
        let mut values = vec![T::zero(); self.n_components()];
        self.value_into(point, &mut values);
        values
    }

    fn get_gradient(&self, point: usize) -> Vec<OVector<T, D>> {
        let mut gradients = vec![OVector::<T, D>::zeros(); self.n_components()];
        self.gradient_into(point, &mut gradients);
        gradients
    }
}

/// Point evaluation of `N` consecutive components that share a base element.
#[derive(Debug, Clone)]
pub struct PointEvaluation<T, D, const N: usize>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    first_component: usize,
    basis: ScalarBasis<T>,
    // Start of each component's coefficients in the cell-local coefficient vector
    dof_offsets: [usize; N],
    own_geometry: Option<MappingInfo<T, D>>,
    evaluated: EvaluationFlags,
    basis_values: Vec<T>,
    basis_gradients: Vec<OVector<T, D>>,
    values: Vec<[T; N]>,
    gradients: Vec<[OVector<T, D>; N]>,
}

impl<T, D, const N: usize> PointEvaluation<T, D, N>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    /// Creates an evaluation of components `first_component .. first_component + N` of the system.
    ///
    /// `update_flags` are only used for the geometry of evaluators with [`GeometrySource::Own`].
    pub fn new(
        system: &FiniteElementSystem,
        first_component: usize,
        geometry: GeometrySource,
        update_flags: UpdateFlags,
    ) -> Result<Self> {
        if N == 0 || N > MAX_EVALUATION_CARDINALITY {
            return Err(Error::UnsupportedCardinality {
                requested: N,
                max: MAX_EVALUATION_CARDINALITY,
            });
        }
        if D::dim() != system.dim() {
            return Err(Error::DimensionMismatch {
                what: "spatial dimension",
                expected: system.dim(),
                actual: D::dim(),
            });
        }
        if first_component + N > system.n_components() {
            return Err(Error::IndexOutOfBounds {
                what: "solution components",
                index: first_component + N - 1,
                len: system.n_components(),
            });
        }
        let base_index = system.component_base_element_index(first_component);
        let components = first_component..first_component + N;
        if components
            .clone()
            .any(|c| system.component_base_element_index(c) != base_index)
        {
            return Err(Error::InvalidConfiguration(format!(
                "components {:?} do not share a base element",
                components
            )));
        }

        let basis = ScalarBasis::new(*system.component_base_element(first_component), system.dim())?;
        let n_dofs = basis.n_dofs();
        let own_geometry = match geometry {
            GeometrySource::Shared => None,
            GeometrySource::Own => Some(MappingInfo::new(update_flags)),
        };

        Ok(Self {
            first_component,
            basis,
            dof_offsets: array::from_fn(|i| system.component_dofs(first_component + i).start),
            own_geometry,
            evaluated: EvaluationFlags::default(),
            basis_values: vec![T::zero(); n_dofs],
            basis_gradients: vec![OVector::<T, D>::zeros(); n_dofs],
            values: Vec::new(),
            gradients: Vec::new(),
        })
    }

    /// The values of all `N` components at the given point.
    ///
    /// # Panics
    /// Panics if `point` is out of bounds or if values were not computed.
    pub fn value(&self, point: usize) -> &[T; N] {
        assert!(self.evaluated.values, "Values were not computed by the last evaluation");
        &self.values[point]
    }

    /// The physical gradients of all `N` components at the given point.
    ///
    /// # Panics
    /// Panics if `point` is out of bounds or if gradients were not computed.
    pub fn gradient(&self, point: usize) -> &[OVector<T, D>; N] {
        assert!(self.evaluated.gradients, "Gradients were not computed by the last evaluation");
        &self.gradients[point]
    }
}

impl<T, D, const N: usize> DynamicPointEvaluation<T, D> for PointEvaluation<T, D, N>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    fn first_component(&self) -> usize {
        self.first_component
    }

    fn n_components(&self) -> usize {
        N
    }

    fn base_element(&self) -> &BaseElement {
        self.basis.element()
    }

    fn uses_shared_geometry(&self) -> bool {
        self.own_geometry.is_none()
    }

    fn reinit(&mut self, cell: &dyn CellMapping<T, D>, points: &[OPoint<T, D>], flags: EvaluationFlags) -> Result<()> {
        match &mut self.own_geometry {
            Some(mapping) => mapping.reinit_with(cell, points, flags.into()),
            None => Ok(()),
        }
    }

    fn evaluate(&mut self, shared: &MappingInfo<T, D>, coefficients: &[T], flags: EvaluationFlags) -> Result<()> {
        self.evaluated = EvaluationFlags::default();
        let Self {
            basis,
            dof_offsets,
            own_geometry,
            evaluated,
            basis_values,
            basis_gradients,
            values,
            gradients,
            ..
        } = self;
        let mapping = own_geometry.as_ref().unwrap_or(shared);

        let n_dofs = basis.n_dofs();
        let required_len = dof_offsets[N - 1] + n_dofs;
        if coefficients.len() < required_len {
            return Err(Error::DimensionMismatch {
                what: "cell-local coefficients",
                expected: required_len,
                actual: coefficients.len(),
            });
        }
        if flags.gradients && !mapping.computed_flags().contains(UpdateFlags::GRADIENTS) {
            return Err(Error::UnsupportedFlags(UpdateFlags::GRADIENTS));
        }

        let n_points = mapping.n_points();
        values.resize(n_points, [T::zero(); N]);
        gradients.resize(n_points, array::from_fn(|_| OVector::<T, D>::zeros()));

        for (q, xi) in mapping.reference_points().iter().enumerate() {
            if flags.values {
                basis.populate_basis(basis_values, xi);
                for (value, &offset) in izip!(values[q].iter_mut(), dof_offsets.iter()) {
                    *value = izip!(&coefficients[offset..offset + n_dofs], basis_values.iter())
                        .fold(T::zero(), |sum, (&u_j, &phi_j)| sum + u_j * phi_j);
                }
            }

            if flags.gradients {
                basis.populate_basis_gradients(basis_gradients, xi);
                let j_inv_t = &mapping.inverse_jacobians_transposed()[q];
                for (gradient, &offset) in izip!(gradients[q].iter_mut(), dof_offsets.iter()) {
                    let mut reference_gradient = OVector::<T, D>::zeros();
                    for (&u_j, grad_phi_j) in izip!(&coefficients[offset..offset + n_dofs], basis_gradients.iter()) {
                        reference_gradient.axpy(u_j, grad_phi_j, T::one());
                    }
                    gradient.gemv(T::one(), j_inv_t, &reference_gradient, T::zero());
                }
            }
        }
        *evaluated = flags;
        Ok(())
    }

    fn n_points(&self) -> usize {
        self.values.len()
    }

    fn evaluated(&self) -> EvaluationFlags {
        self.evaluated
    }

    fn clear(&mut self) {
        self.evaluated = EvaluationFlags::default();
        self.values.clear();
        self.gradients.clear();
        if let Some(mapping) = &mut self.own_geometry {
            mapping.clear();
        }
    }

    fn value_into(&self, point: usize, values: &mut [T]) {
        assert_eq!(values.len(), N, "Output must hold one value per component");
        values.copy_from_slice(self.value(point));
    }

    fn gradient_into(&self, point: usize, gradients: &mut [OVector<T, D>]) {
        assert_eq!(gradients.len(), N, "Output must hold one gradient per component");
        for (output, gradient) in izip!(gradients.iter_mut(), self.gradient(point).iter()) {
            output.copy_from(gradient);
        }
    }
}

/// Creates a point evaluation for `n_components` consecutive components starting at
/// `first_component`, specialized for exactly that number of components.
///
/// Fails with [`Error::UnsupportedCardinality`] unless `1 <= n_components <=`
/// [`MAX_EVALUATION_CARDINALITY`].
pub fn make_point_evaluation<T, D>(
    system: &FiniteElementSystem,
    first_component: usize,
    n_components: usize,
    geometry: GeometrySource,
    update_flags: UpdateFlags,
) -> Result<Box<dyn DynamicPointEvaluation<T, D>>>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    macro_rules! dispatch {
        ($($n:literal),*) => {
            match n_components {
                $(
                    $n => {
                        let evaluation =
                            PointEvaluation::<T, D, $n>::new(system, first_component, geometry, update_flags)?;
                        Ok(Box::new(evaluation) as Box<dyn DynamicPointEvaluation<T, D>>)
                    }
                )*
                _ => Err(Error::UnsupportedCardinality {
                    requested: n_components,
                    max: MAX_EVALUATION_CARDINALITY,
                }),
            }
        };
    }

    dispatch!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10)
}
