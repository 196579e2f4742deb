use fenris_fields::cell::HypercubeCell;
use fenris_fields::error::Error;
use fenris_fields::evaluator::{FieldRole, SolutionEvaluator};
use fenris_fields::layout::{FieldConfiguration, FieldLayout};
use fenris_fields::mapping::{EvaluationFlags, UpdateFlags};
use fenris_fields::ErrorKind;
use nalgebra::{Point2, Vector2, U2, U3};
use std::sync::Arc;

fn layout(config: FieldConfiguration) -> Arc<FieldLayout> {
    Arc::new(FieldLayout::new(config).unwrap())
}

fn compositions(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("C{}", i)).collect()
}

const ALL: UpdateFlags = UpdateFlags::VALUES.union(UpdateFlags::GRADIENTS);

#[test]
fn construction_flags_are_validated() {
    let layout = layout(FieldConfiguration::new(2));
    for flags in [
        UpdateFlags::NOTHING,
        UpdateFlags::GRADIENTS,
        UpdateFlags::VALUES | UpdateFlags::HESSIANS,
        UpdateFlags::QUADRATURE_POINTS,
    ] {
        let err = SolutionEvaluator::<f64, U2>::new(layout.clone(), flags).unwrap_err();
        assert_eq!(err, Error::UnsupportedFlags(flags));
    }
    assert!(SolutionEvaluator::<f64, U2>::new(layout.clone(), UpdateFlags::VALUES).is_ok());
    assert!(SolutionEvaluator::<f64, U2>::new(layout, ALL).is_ok());
}

#[test]
fn construction_requires_matching_dimension() {
    let err = SolutionEvaluator::<f64, U3>::new(layout(FieldConfiguration::new(2)), ALL).unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { expected: 2, actual: 3, .. }));
}

#[test]
fn compositions_are_split_into_chunks() {
    let evaluator = SolutionEvaluator::<f64, U2>::new(
        layout(FieldConfiguration::new(2).with_compositional_fields(compositions(23))),
        ALL,
    )
    .unwrap();

    let roles: Vec<FieldRole> = evaluator.field_evaluations().iter().map(|f| f.role()).collect();
    assert_eq!(
        roles,
        vec![
            FieldRole::Pressure,
            FieldRole::Temperature,
            FieldRole::Compositions,
            FieldRole::Compositions,
            FieldRole::Compositions
        ]
    );
    let chunks: Vec<(usize, usize)> = evaluator
        .field_evaluations()
        .iter()
        .filter(|f| f.role() == FieldRole::Compositions)
        .map(|f| (f.evaluation().first_component(), f.evaluation().n_components()))
        .collect();
    assert_eq!(chunks, vec![(4, 10), (14, 10), (24, 3)]);
}

#[test]
fn discontinuous_polynomial_fields_own_their_geometry() {
    let config = FieldConfiguration::new(2)
        .with_melt_transport(true)
        .with_locally_conservative_discretization(true);
    let evaluator = SolutionEvaluator::<f64, U2>::new(layout(config), ALL).unwrap();
    for field in evaluator.field_evaluations() {
        let own = matches!(
            field.role(),
            FieldRole::Pressure | FieldRole::FluidPressure | FieldRole::CompactionPressure
        );
        assert_eq!(field.evaluation().uses_shared_geometry(), !own, "{:?}", field.role());
    }
    assert!(evaluator
        .get_velocity_or_fluid_velocity_evaluator(false)
        .unwrap()
        .evaluation()
        .uses_shared_geometry());
}

#[test]
fn fluid_velocity_requires_melt_transport() {
    let evaluator = SolutionEvaluator::<f64, U2>::new(layout(FieldConfiguration::new(2)), ALL).unwrap();
    let err = evaluator
        .get_velocity_or_fluid_velocity_evaluator(true)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    let velocity = evaluator
        .get_velocity_or_fluid_velocity_evaluator(false)
        .unwrap();
    assert_eq!(velocity.first_component(), 0);

    let melt = SolutionEvaluator::<f64, U2>::new(layout(FieldConfiguration::new(2).with_melt_transport(true)), ALL)
        .unwrap();
    let fluid_velocity = melt.get_velocity_or_fluid_velocity_evaluator(true).unwrap();
    assert_eq!(
        fluid_velocity.first_component(),
        melt.layout().component_indices().melt.as_ref().unwrap().fluid_velocities[0]
    );
}

#[test]
fn reinit_validates_input() {
    let layout = layout(FieldConfiguration::new(2).with_compositional_fields(["a"]));
    let n_dofs = layout.system().n_dofs_per_cell();
    let cell = HypercubeCell::<f64, U2>::reference();
    let points = [Point2::origin()];
    let coefficients = vec![0.0; n_dofs];

    let mut values_only = SolutionEvaluator::<f64, U2>::new(layout.clone(), UpdateFlags::VALUES).unwrap();
    let err = values_only
        .reinit(&cell, &points, &coefficients, ALL)
        .unwrap_err();
    assert_eq!(err, Error::UnsupportedFlags(UpdateFlags::GRADIENTS));

    let mut evaluator = SolutionEvaluator::<f64, U2>::new(layout, ALL).unwrap();
    let err = evaluator
        .reinit(&cell, &points, &coefficients, UpdateFlags::VALUES | UpdateFlags::JXW_VALUES)
        .unwrap_err();
    assert_eq!(err, Error::UnsupportedFlags(UpdateFlags::JXW_VALUES));

    let err = evaluator
        .reinit(&cell, &points, &coefficients[1..], UpdateFlags::VALUES)
        .unwrap_err();
    assert_eq!(
        err,
        Error::DimensionMismatch {
            what: "cell-local coefficients",
            expected: n_dofs,
            actual: n_dofs - 1
        }
    );
}

#[test]
fn queries_are_validated() {
    let layout = layout(FieldConfiguration::new(2).with_compositional_fields(["a"]));
    let n = layout.n_components();
    let coefficients = vec![1.0; layout.system().n_dofs_per_cell()];
    let mut evaluator = SolutionEvaluator::<f64, U2>::new(layout, ALL).unwrap();
    let points = [Point2::origin(), Point2::new(0.5, 0.5)];
    evaluator
        .reinit(&HypercubeCell::reference(), &points, &coefficients, UpdateFlags::VALUES)
        .unwrap();
    assert_eq!(evaluator.n_points(), 2);
    assert_eq!(evaluator.mapping_info().n_points(), 2);

    let mut solution = vec![0.0; n];
    evaluator.get_solution(1, &mut solution).unwrap();
    // All coefficients are one, so every component is one everywhere
    assert!(solution.iter().all(|&u| (u - 1.0).abs() <= 1e-12));

    let mut short = vec![0.0; n - 1];
    let err = evaluator.get_solution(0, &mut short).unwrap_err();
    assert_eq!(
        err,
        Error::DimensionMismatch {
            what: "output buffer",
            expected: n,
            actual: n - 1
        }
    );
    let err = evaluator.get_solution(2, &mut solution).unwrap_err();
    assert_eq!(
        err,
        Error::IndexOutOfBounds {
            what: "evaluation points",
            index: 2,
            len: 2
        }
    );

    // Gradients were not requested in the last reinit
    let mut gradients = vec![Vector2::zeros(); n];
    let err = evaluator.get_gradients(0, &mut gradients).unwrap_err();
    assert_eq!(err, Error::UnsupportedFlags(UpdateFlags::GRADIENTS));

    evaluator
        .reinit(&HypercubeCell::reference(), &points, &coefficients, ALL)
        .unwrap();
    evaluator.get_gradients(0, &mut gradients).unwrap();
    assert!(gradients.iter().all(|g| g.norm() <= 1e-12));
}

#[test]
fn failed_reinit_invalidates_previous_results() {
    let layout = layout(FieldConfiguration::new(2));
    let coefficients = vec![0.0; layout.system().n_dofs_per_cell()];
    let n = layout.n_components();
    let mut evaluator = SolutionEvaluator::<f64, U2>::new(layout, ALL).unwrap();
    let points = [Point2::origin()];
    evaluator
        .reinit(&HypercubeCell::reference(), &points, &coefficients, ALL)
        .unwrap();

    let collapsed = HypercubeCell::from_vertices(vec![Point2::new(0.0, 0.0); 4]).unwrap();
    let err = evaluator
        .reinit(&collapsed, &points, &coefficients, ALL)
        .unwrap_err();
    assert_eq!(err, Error::SingularJacobian { point: 0 });

    let mut solution = vec![0.0; n];
    assert!(evaluator.get_solution(0, &mut solution).is_err());
}

#[test]
fn rejected_reinit_leaves_no_stale_values() {
    let layout = layout(FieldConfiguration::new(2));
    let n_dofs = layout.system().n_dofs_per_cell();
    let n = layout.n_components();
    let mut evaluator = SolutionEvaluator::<f64, U2>::new(layout, ALL).unwrap();
    let cell = HypercubeCell::reference();
    let points = [Point2::origin()];
    evaluator
        .reinit(&cell, &points, &vec![3.0; n_dofs], ALL)
        .unwrap();
    let velocity = evaluator.get_velocity_or_fluid_velocity_evaluator(false).unwrap();
    assert!((velocity.value(0) - Vector2::new(3.0, 3.0)).norm() <= 1e-12);

    let err = evaluator
        .reinit(&cell, &points, &vec![3.0; n_dofs - 1], ALL)
        .unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { .. }));
    assert_eq!(evaluator.n_points(), 0);
    let velocity = evaluator.get_velocity_or_fluid_velocity_evaluator(false).unwrap();
    assert_eq!(velocity.n_points(), 0);
    assert_eq!(velocity.evaluation().evaluated(), EvaluationFlags::default());
    assert!(evaluator
        .field_evaluations()
        .iter()
        .all(|field| field.evaluation().n_points() == 0));
    let mut solution = vec![0.0; n];
    assert!(evaluator.get_solution(0, &mut solution).is_err());
}

#[test]
fn gradients_only_reinit_does_not_expose_previous_values() {
    let layout = layout(FieldConfiguration::new(2));
    let n_dofs = layout.system().n_dofs_per_cell();
    let n = layout.n_components();
    let mut evaluator = SolutionEvaluator::<f64, U2>::new(layout, ALL).unwrap();
    let cell = HypercubeCell::reference();
    let points = [Point2::origin()];
    evaluator
        .reinit(&cell, &points, &vec![3.0; n_dofs], UpdateFlags::VALUES)
        .unwrap();
    evaluator
        .reinit(&cell, &points, &vec![7.0; n_dofs], UpdateFlags::GRADIENTS)
        .unwrap();

    let velocity = evaluator.get_velocity_or_fluid_velocity_evaluator(false).unwrap();
    assert_eq!(velocity.evaluation().evaluated(), EvaluationFlags { values: false, gradients: true });
    assert!(velocity.gradient(0).norm() <= 1e-12);
    let mut solution = vec![0.0; n];
    assert_eq!(
        evaluator.get_solution(0, &mut solution).unwrap_err(),
        Error::UnsupportedFlags(UpdateFlags::VALUES)
    );
}

#[test]
fn values_on_degenerate_cell_do_not_need_inverse_jacobians() {
    let layout = layout(FieldConfiguration::new(2));
    let n_dofs = layout.system().n_dofs_per_cell();
    let n = layout.n_components();
    let mut evaluator = SolutionEvaluator::<f64, U2>::new(layout, ALL).unwrap();
    let collapsed = HypercubeCell::from_vertices(vec![Point2::new(0.0, 0.0); 4]).unwrap();
    let points = [Point2::origin(), Point2::new(0.5, -0.5)];
    let coefficients = vec![2.0; n_dofs];

    evaluator
        .reinit(&collapsed, &points, &coefficients, UpdateFlags::VALUES)
        .unwrap();
    let mut solution = vec![0.0; n];
    for q in 0..points.len() {
        evaluator.get_solution(q, &mut solution).unwrap();
        assert!(solution.iter().all(|&u| (u - 2.0).abs() <= 1e-12));
    }

    let err = evaluator
        .reinit(&collapsed, &points, &coefficients, ALL)
        .unwrap_err();
    assert_eq!(err, Error::SingularJacobian { point: 0 });
}
