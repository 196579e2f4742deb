//! Evaluation of the complete solution at arbitrary points of one cell.
use crate::allocators::DimAllocator;
use crate::basis::MAX_REFERENCE_DIM;
use crate::cell::CellMapping;
use crate::dispatch::{make_point_evaluation, DynamicPointEvaluation, GeometrySource, MAX_EVALUATION_CARDINALITY};
use crate::error::{Error, Result};
use crate::layout::{composition_chunks, FieldLayout};
use crate::mapping::{EvaluationFlags, MappingInfo, UpdateFlags};
use crate::system::FiniteElementSystem;
use crate::{Real, SmallDim};
use log::debug;
use nalgebra::{DefaultAllocator, OMatrix, OPoint, OVector};
use std::array;
use std::convert::TryFrom;
use std::iter::once;
use std::sync::Arc;

/// The field a scalar-valued (or composition chunk) evaluation belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FieldRole {
    Pressure,
    Temperature,
    FluidPressure,
    CompactionPressure,
    Compositions,
}

/// Evaluation of a vector field with one component per spatial dimension.
#[derive(Debug)]
pub struct VectorPointEvaluation<T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    evaluation: Box<dyn DynamicPointEvaluation<T, D>>,
}

impl<T, D> VectorPointEvaluation<T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    fn new(system: &FiniteElementSystem, first_component: usize, update_flags: UpdateFlags) -> Result<Self> {
        let geometry = GeometrySource::preferred_for(system.component_base_element(first_component));
        let evaluation = make_point_evaluation(system, first_component, D::dim(), geometry, update_flags)?;
        Ok(Self { evaluation })
    }

    pub fn first_component(&self) -> usize {
        self.evaluation.first_component()
    }

    pub fn n_points(&self) -> usize {
        self.evaluation.n_points()
    }

    /// The vector value at the given point.
    ///
    /// # Panics
    /// Panics if `point` is out of bounds or if the last call to
    /// [`SolutionEvaluator::reinit`] did not compute values.
    pub fn value(&self, point: usize) -> OVector<T, D> {
        let mut value = OVector::<T, D>::zeros();
        self.evaluation.value_into(point, value.as_mut_slice());
        value
    }

    /// The gradient at the given point, with entry $(i, j)$ holding $\partial u_i / \partial x_j$.
    ///
    /// # Panics
    /// Panics if `point` is out of bounds or if the last call to
    /// [`SolutionEvaluator::reinit`] did not compute gradients.
    pub fn gradient(&self, point: usize) -> OMatrix<T, D, D> {
        let mut rows: [OVector<T, D>; MAX_REFERENCE_DIM] = array::from_fn(|_| OVector::<T, D>::zeros());
        self.evaluation.gradient_into(point, &mut rows[..D::dim()]);
        OMatrix::<T, D, D>::from_fn(|i, j| rows[i][j])
    }

    pub fn evaluation(&self) -> &dyn DynamicPointEvaluation<T, D> {
        self.evaluation.as_ref()
    }
}

/// The evaluation of a scalar field or of a chunk of compositional fields.
#[derive(Debug)]
pub struct FieldEvaluation<T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    role: FieldRole,
    evaluation: Box<dyn DynamicPointEvaluation<T, D>>,
}

impl<T, D> FieldEvaluation<T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    pub fn role(&self) -> FieldRole {
        self.role
    }

    pub fn evaluation(&self) -> &dyn DynamicPointEvaluation<T, D> {
        self.evaluation.as_ref()
    }
}

/// Evaluates all components of the solution at a set of points in one cell.
///
/// Sub-evaluations are created once for the layout: one for the velocity, one per scalar field,
/// one per chunk of compositional fields that share a basis, and, with melt transport, one
/// for the fluid velocity. Sub-evaluations with tensor-product bases share a single geometry
/// cache, while the others maintain their own.
///
/// Typical use is to call [`reinit`](Self::reinit) for each cell and then query
/// [`get_solution`](Self::get_solution) or [`get_gradients`](Self::get_gradients) for each
/// point.
#[derive(Debug)]
pub struct SolutionEvaluator<T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    layout: Arc<FieldLayout>,
    update_flags: UpdateFlags,
    evaluated: EvaluationFlags,
    mapping_info: MappingInfo<T, D>,
    velocity: VectorPointEvaluation<T, D>,
    fluid_velocity: Option<VectorPointEvaluation<T, D>>,
    fields: Vec<FieldEvaluation<T, D>>,
}

impl<T, D> SolutionEvaluator<T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    /// Creates an evaluator for the given layout.
    ///
    /// `update_flags` must be either [`UpdateFlags::VALUES`] or
    /// `UpdateFlags::VALUES | UpdateFlags::GRADIENTS`.
    pub fn new(layout: Arc<FieldLayout>, update_flags: UpdateFlags) -> Result<Self> {
        if update_flags != UpdateFlags::VALUES && update_flags != UpdateFlags::VALUES | UpdateFlags::GRADIENTS {
            return Err(Error::UnsupportedFlags(update_flags));
        }
        if layout.dim() != D::dim() {
            return Err(Error::DimensionMismatch {
                what: "spatial dimension",
                expected: layout.dim(),
                actual: D::dim(),
            });
        }

        let system = layout.system();
        let catalog = layout.base_elements();
        let components = layout.component_indices();
        let scalar = |role, first_component: usize| -> Result<FieldEvaluation<T, D>> {
            let geometry = GeometrySource::preferred_for(system.component_base_element(first_component));
            let evaluation = make_point_evaluation(system, first_component, 1, geometry, update_flags)?;
            Ok(FieldEvaluation { role, evaluation })
        };

        let velocity = VectorPointEvaluation::new(system, components.velocities[0], update_flags)?;
        let mut fields = vec![
            scalar(FieldRole::Pressure, components.pressure)?,
            scalar(FieldRole::Temperature, components.temperature)?,
        ];
        let fluid_velocity = match &components.melt {
            Some(melt) => {
                fields.push(scalar(FieldRole::FluidPressure, melt.fluid_pressure)?);
                fields.push(scalar(FieldRole::CompactionPressure, melt.compaction_pressure)?);
                Some(VectorPointEvaluation::new(system, melt.fluid_velocities[0], update_flags)?)
            }
            None => None,
        };

        let chunks = composition_chunks(&layout, MAX_EVALUATION_CARDINALITY)?;
        let n_groups = layout.composition_base_element_indices().len();
        if chunks.len() > n_groups {
            debug!(
                "Compositional fields in {} basis groups are evaluated in {} chunks of at most {} fields",
                n_groups,
                chunks.len(),
                MAX_EVALUATION_CARDINALITY
            );
        }
        for chunk in &chunks {
            let element = &catalog.elements[chunk.base_element];
            debug!(
                "Composition chunk: fields {:?} (components {:?}) with {}",
                chunk.fields(),
                chunk.components(),
                element
            );
            let evaluation = make_point_evaluation(
                system,
                chunk.first_component,
                chunk.width,
                GeometrySource::preferred_for(element),
                update_flags,
            )?;
            fields.push(FieldEvaluation {
                role: FieldRole::Compositions,
                evaluation,
            });
        }

        let n_own_geometry = fields
            .iter()
            .map(FieldEvaluation::evaluation)
            .chain(once(velocity.evaluation()))
            .chain(fluid_velocity.iter().map(VectorPointEvaluation::evaluation))
            .filter(|evaluation| !evaluation.uses_shared_geometry())
            .count();
        debug!(
            "Solution evaluator with {:?}: {} sub-evaluations, {} with their own geometry",
            update_flags,
            fields.len() + 1 + fluid_velocity.iter().count(),
            n_own_geometry
        );

        Ok(Self {
            layout,
            update_flags,
            evaluated: EvaluationFlags::default(),
            mapping_info: MappingInfo::new(update_flags),
            velocity,
            fluid_velocity,
            fields,
        })
    }

    pub fn layout(&self) -> &FieldLayout {
        &self.layout
    }

    pub fn update_flags(&self) -> UpdateFlags {
        self.update_flags
    }

    /// The geometry cache shared by all sub-evaluations with tensor-product bases.
    pub fn mapping_info(&self) -> &MappingInfo<T, D> {
        &self.mapping_info
    }

    /// The number of points bound by the last call to [`reinit`](Self::reinit).
    pub fn n_points(&self) -> usize {
        self.mapping_info.n_points()
    }

    /// The sub-evaluations of all fields except the velocity and fluid velocity, in the order
    /// pressure, temperature, fluid pressure, compaction pressure, composition chunks.
    pub fn field_evaluations(&self) -> &[FieldEvaluation<T, D>] {
        &self.fields
    }

    /// Binds the evaluator to the given cell and reference points and evaluates the solution
    /// described by the cell-local coefficients.
    ///
    /// `flags` selects what to compute and may only contain [`UpdateFlags::VALUES`] and
    /// [`UpdateFlags::GRADIENTS`]. Gradients can only be computed if the evaluator was
    /// created with [`UpdateFlags::GRADIENTS`], and Jacobians are only inverted when gradients
    /// are requested. If an error is returned, the evaluator holds no points and all queries fail.
    pub fn reinit(
        &mut self,
        cell: &dyn CellMapping<T, D>,
        points: &[OPoint<T, D>],
        coefficients: &[T],
        flags: UpdateFlags,
    ) -> Result<()> {
        self.invalidate();
        match self.bind_and_evaluate(cell, points, coefficients, flags) {
            Ok(evaluated) => {
                self.evaluated = evaluated;
                Ok(())
            }
            Err(err) => {
                self.invalidate();
                Err(err)
            }
        }
    }

    fn bind_and_evaluate(
        &mut self,
        cell: &dyn CellMapping<T, D>,
        points: &[OPoint<T, D>],
        coefficients: &[T],
        flags: UpdateFlags,
    ) -> Result<EvaluationFlags> {
        let evaluation_flags = EvaluationFlags::try_from(flags)?;
        if evaluation_flags.gradients && !self.update_flags.contains(UpdateFlags::GRADIENTS) {
            return Err(Error::UnsupportedFlags(UpdateFlags::GRADIENTS));
        }
        let n_dofs = self.layout.system().n_dofs_per_cell();
        if coefficients.len() != n_dofs {
            return Err(Error::DimensionMismatch {
                what: "cell-local coefficients",
                expected: n_dofs,
                actual: coefficients.len(),
            });
        }

        self.mapping_info.reinit_with(cell, points, flags)?;
        let shared = &self.mapping_info;
        let evaluations = once(&mut self.velocity.evaluation)
            .chain(self.fields.iter_mut().map(|field| &mut field.evaluation))
            .chain(self.fluid_velocity.iter_mut().map(|v| &mut v.evaluation));
        for evaluation in evaluations {
            evaluation.reinit(cell, points, evaluation_flags)?;
            evaluation.evaluate(shared, coefficients, evaluation_flags)?;
        }
        Ok(evaluation_flags)
    }

    // Leaves no points and no evaluated quantities behind
    fn invalidate(&mut self) {
        self.evaluated = EvaluationFlags::default();
        self.mapping_info.clear();
        let evaluations = once(&mut self.velocity.evaluation)
            .chain(self.fields.iter_mut().map(|field| &mut field.evaluation))
            .chain(self.fluid_velocity.iter_mut().map(|v| &mut v.evaluation));
        for evaluation in evaluations {
            evaluation.clear();
        }
    }

    /// Writes the value of every solution component at the given point into `solution`.
    ///
    /// `solution` must have one entry per component of the layout.
    pub fn get_solution(&self, point: usize, solution: &mut [T]) -> Result<()> {
        self.check_query(point, solution.len(), self.evaluated.values, UpdateFlags::VALUES)?;
        for evaluation in self.evaluations() {
            let first = evaluation.first_component();
            evaluation.value_into(point, &mut solution[first..first + evaluation.n_components()]);
        }
        Ok(())
    }

    /// Writes the physical gradient of every solution component at the given point into
    /// `gradients`.
    ///
    /// `gradients` must have one entry per component of the layout.
    pub fn get_gradients(&self, point: usize, gradients: &mut [OVector<T, D>]) -> Result<()> {
        self.check_query(point, gradients.len(), self.evaluated.gradients, UpdateFlags::GRADIENTS)?;
        for evaluation in self.evaluations() {
            let first = evaluation.first_component();
            evaluation.gradient_into(point, &mut gradients[first..first + evaluation.n_components()]);
        }
        Ok(())
    }

    /// Returns the evaluation of the fluid velocity if `use_fluid_velocity` is set, and of the
    /// velocity otherwise.
    ///
    /// Asking for the fluid velocity without melt transport is a configuration error.
    pub fn get_velocity_or_fluid_velocity_evaluator(
        &self,
        use_fluid_velocity: bool,
    ) -> Result<&VectorPointEvaluation<T, D>> {
        if use_fluid_velocity {
            self.fluid_velocity.as_ref().ok_or_else(|| {
                Error::InvalidConfiguration("the fluid velocity is only available with melt transport".to_string())
            })
        } else {
            Ok(&self.velocity)
        }
    }

    // Velocity first, then scalar fields and composition chunks, then fluid velocity
    fn evaluations(&self) -> impl Iterator<Item = &dyn DynamicPointEvaluation<T, D>> {
        once(self.velocity.evaluation())
            .chain(self.fields.iter().map(FieldEvaluation::evaluation))
            .chain(self.fluid_velocity.iter().map(VectorPointEvaluation::evaluation))
    }

    fn check_query(&self, point: usize, buffer_len: usize, evaluated: bool, required: UpdateFlags) -> Result<()> {
        let n_components = self.layout.n_components();
        if buffer_len != n_components {
            return Err(Error::DimensionMismatch {
                what: "output buffer",
                expected: n_components,
                actual: buffer_len,
            });
        }
        if point >= self.n_points() {
            return Err(Error::IndexOutOfBounds {
                what: "evaluation points",
                index: point,
                len: self.n_points(),
            });
        }
        if !evaluated {
            return Err(Error::UnsupportedFlags(required));
        }
        Ok(())
    }
}
