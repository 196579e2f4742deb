//! Evaluation of the solution on many cells in parallel.
use crate::allocators::DimAllocator;
use crate::cell::CellMapping;
use crate::evaluator::SolutionEvaluator;
use crate::layout::FieldLayout;
use crate::mapping::UpdateFlags;
use crate::{Real, SmallDim};
use eyre::WrapErr;
use log::debug;
use nalgebra::{DMatrix, DefaultAllocator, OPoint};
use rayon::prelude::*;
use std::sync::Arc;

/// A cell, the reference points to evaluate at and the cell-local coefficients of the solution.
#[derive(Debug, Clone, Copy)]
pub struct CellEvaluationRequest<'a, T, D, C>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    pub cell: &'a C,
    pub points: &'a [OPoint<T, D>],
    pub coefficients: &'a [T],
}

/// Evaluates the solution values for every request.
///
/// Returns, for each request, a matrix with one row per solution component and one column per
/// point. Every rayon job creates its own [`SolutionEvaluator`], so the evaluators are never
/// shared between threads.
pub fn evaluate_solution_par<T, D, C>(
    layout: &Arc<FieldLayout>,
    requests: &[CellEvaluationRequest<'_, T, D, C>],
) -> eyre::Result<Vec<DMatrix<T>>>
where
    T: Real,
    D: SmallDim,
    C: CellMapping<T, D> + Sync,
    OPoint<T, D>: Sync,
    DefaultAllocator: DimAllocator<T, D>,
{
    debug!("Evaluating solution on {} cells in parallel", requests.len());
    requests
        .par_iter()
        .enumerate()
        .map_init(
            || SolutionEvaluator::<T, D>::new(Arc::clone(layout), UpdateFlags::VALUES),
            |evaluator, (index, request)| {
                let evaluator = match evaluator {
                    Ok(evaluator) => evaluator,
                    Err(err) => {
                        return Err(eyre::Report::new(err.clone()).wrap_err("failed to create solution evaluator"))
                    }
                };
                evaluate_request(evaluator, request)
                    .wrap_err_with(|| format!("failed to evaluate solution for request {}", index))
            },
        )
        .collect()
}

fn evaluate_request<T, D, C>(
    evaluator: &mut SolutionEvaluator<T, D>,
    request: &CellEvaluationRequest<'_, T, D, C>,
) -> crate::Result<DMatrix<T>>
where
    T: Real,
    D: SmallDim,
    C: CellMapping<T, D>,
    DefaultAllocator: DimAllocator<T, D>,
{
    evaluator.reinit(request.cell, request.points, request.coefficients, UpdateFlags::VALUES)?;
    let n_components = evaluator.layout().n_components();
    let mut values = DMatrix::zeros(n_components, evaluator.n_points());
    let mut solution = vec![T::zero(); n_components];
    for q in 0..evaluator.n_points() {
        evaluator.get_solution(q, &mut solution)?;
        values.column_mut(q).copy_from_slice(&solution);
    }
    Ok(values)
}
