use fenris_fields::basis::BaseElement;
use fenris_fields::cell::HypercubeCell;
use fenris_fields::dispatch::{
    make_point_evaluation, DynamicPointEvaluation, GeometrySource, PointEvaluation, MAX_EVALUATION_CARDINALITY,
};
use fenris_fields::error::Error;
use fenris_fields::layout::{FieldConfiguration, FieldLayout};
use fenris_fields::mapping::{EvaluationFlags, MappingInfo, UpdateFlags};
use fenris_fields::ErrorKind;
use matrixcompare::assert_scalar_eq;
use nalgebra::{Point2, Vector2, U2};
use util::assert_panics;

fn layout_with_compositions(n: usize) -> FieldLayout {
    let names: Vec<String> = (0..n).map(|i| format!("C{}", i)).collect();
    FieldLayout::new(FieldConfiguration::new(2).with_compositional_fields(names)).unwrap()
}

const FLAGS: UpdateFlags = UpdateFlags::VALUES.union(UpdateFlags::GRADIENTS);

#[test]
fn cardinality_bounds() {
    let layout = layout_with_compositions(12);
    let system = layout.system();
    let first = layout.component_indices().compositional_fields[0];

    for k in [0, MAX_EVALUATION_CARDINALITY + 1] {
        let err = make_point_evaluation::<f64, U2>(system, first, k, GeometrySource::Shared, FLAGS).unwrap_err();
        assert_eq!(
            err,
            Error::UnsupportedCardinality {
                requested: k,
                max: MAX_EVALUATION_CARDINALITY
            }
        );
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    for k in 1..=MAX_EVALUATION_CARDINALITY {
        let evaluation = make_point_evaluation::<f64, U2>(system, first, k, GeometrySource::Shared, FLAGS).unwrap();
        assert_eq!(evaluation.n_components(), k);
        assert_eq!(evaluation.first_component(), first);
        assert_eq!(evaluation.base_element(), &BaseElement::lagrange(2));
        assert!(evaluation.uses_shared_geometry());
    }
}

#[test]
fn components_must_share_base_element() {
    let layout = layout_with_compositions(2);
    // Velocity (Q2) followed by pressure (Q1)
    let err = make_point_evaluation::<f64, U2>(layout.system(), 0, 3, GeometrySource::Shared, FLAGS).unwrap_err();
    assert!(matches!(err, Error::InvalidConfiguration(_)));
}

#[test]
fn components_must_exist() {
    let layout = layout_with_compositions(2);
    let n = layout.n_components();
    let err = make_point_evaluation::<f64, U2>(layout.system(), n - 1, 2, GeometrySource::Shared, FLAGS).unwrap_err();
    assert_eq!(
        err,
        Error::IndexOutOfBounds {
            what: "solution components",
            index: n,
            len: n
        }
    );
}

#[test]
fn geometry_source_follows_basis_structure() {
    assert_eq!(
        GeometrySource::preferred_for(&BaseElement::lagrange(1)),
        GeometrySource::Shared
    );
    assert_eq!(
        GeometrySource::preferred_for(&BaseElement::discontinuous_lagrange(0)),
        GeometrySource::Shared
    );
    assert_eq!(
        GeometrySource::preferred_for(&BaseElement::discontinuous_polynomial(1)),
        GeometrySource::Own
    );
}

#[test]
fn static_evaluation_of_velocity() {
    let layout = layout_with_compositions(0);
    let system = layout.system();
    let cell = HypercubeCell::axis_aligned(&Point2::new(0.0, 0.0), &Point2::new(2.0, 4.0));
    // u = (x, y^2), both in Q2
    let coefficients = system
        .interpolate(&cell, |component, x: &Point2<f64>| match component {
            0 => x.x,
            1 => x.y * x.y,
            _ => 0.0,
        })
        .unwrap();

    let mut evaluation = PointEvaluation::<f64, U2, 2>::new(system, 0, GeometrySource::Shared, FLAGS).unwrap();
    let mut mapping = MappingInfo::<f64, U2>::new(FLAGS);
    let points = [Point2::new(0.0, 0.0), Point2::new(0.5, -0.5)];
    mapping.reinit(&cell, &points).unwrap();
    evaluation
        .evaluate(&mapping, coefficients.as_slice(), EvaluationFlags::values_and_gradients())
        .unwrap();

    assert_eq!(DynamicPointEvaluation::n_points(&evaluation), 2);
    // Reference point (0.5, -0.5) maps to (1.5, 1)
    let [u, v] = *evaluation.value(1);
    assert_scalar_eq!(u, 1.5, comp = abs, tol = 1e-12);
    assert_scalar_eq!(v, 1.0, comp = abs, tol = 1e-12);

    let [grad_u, grad_v] = evaluation.gradient(1);
    assert!((grad_u - Vector2::new(1.0, 0.0)).norm() <= 1e-12);
    assert!((grad_v - Vector2::new(0.0, 2.0)).norm() <= 1e-12);

    let mut values = [0.0; 2];
    evaluation.value_into(0, &mut values);
    assert_scalar_eq!(values[0], 1.0, comp = abs, tol = 1e-12);
    assert_scalar_eq!(values[1], 4.0, comp = abs, tol = 1e-12);
    assert_eq!(evaluation.get_value(0).len(), 2);
    assert_eq!(evaluation.get_gradient(0).len(), 2);
}

#[test]
fn own_geometry_ignores_shared_mapping() {
    let config = FieldConfiguration::new(2).with_locally_conservative_discretization(true);
    let layout = FieldLayout::new(config).unwrap();
    let system = layout.system();
    let pressure = layout.component_indices().pressure;
    let cell = HypercubeCell::axis_aligned(&Point2::new(1.0, 1.0), &Point2::new(3.0, 2.0));
    let coefficients = system
        .interpolate(&cell, |_, x: &Point2<f64>| 2.0 * x.x - x.y)
        .unwrap();

    let mut evaluation = make_point_evaluation::<f64, U2>(system, pressure, 1, GeometrySource::Own, FLAGS).unwrap();
    assert!(!evaluation.uses_shared_geometry());
    let points = [Point2::new(1.0, 1.0)];
    evaluation
        .reinit(&cell, &points, EvaluationFlags::values_and_gradients())
        .unwrap();

    // An unbound shared mapping must not be consulted
    let unbound = MappingInfo::<f64, U2>::new(FLAGS);
    evaluation
        .evaluate(&unbound, coefficients.as_slice(), EvaluationFlags::values_and_gradients())
        .unwrap();
    assert_eq!(evaluation.n_points(), 1);
    assert_scalar_eq!(evaluation.get_value(0)[0], 2.0 * 3.0 - 2.0, comp = abs, tol = 1e-12);
    assert!((evaluation.get_gradient(0)[0] - Vector2::new(2.0, -1.0)).norm() <= 1e-12);
}

#[test]
fn evaluation_validates_input() {
    let layout = layout_with_compositions(0);
    let system = layout.system();
    let cell = HypercubeCell::<f64, U2>::reference();
    let mut evaluation = make_point_evaluation::<f64, U2>(system, 0, 2, GeometrySource::Shared, FLAGS).unwrap();

    let mut values_only = MappingInfo::<f64, U2>::new(UpdateFlags::VALUES);
    values_only.reinit(&cell, &[Point2::origin()]).unwrap();
    let coefficients = vec![0.0; system.n_dofs_per_cell()];
    let err = evaluation
        .evaluate(&values_only, &coefficients, EvaluationFlags::values_and_gradients())
        .unwrap_err();
    assert_eq!(err, Error::UnsupportedFlags(UpdateFlags::GRADIENTS));

    let err = evaluation
        .evaluate(&values_only, &coefficients[..10], EvaluationFlags::values())
        .unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { .. }));
    assert!(evaluation
        .evaluate(&values_only, &coefficients, EvaluationFlags::values())
        .is_ok());
}

#[test]
fn value_and_gradient_output_must_match_cardinality() {
    let layout = layout_with_compositions(0);
    let system = layout.system();
    let mut evaluation = PointEvaluation::<f64, U2, 2>::new(system, 0, GeometrySource::Shared, FLAGS).unwrap();
    let mut mapping = MappingInfo::<f64, U2>::new(FLAGS);
    mapping
        .reinit(&HypercubeCell::reference(), &[Point2::origin()])
        .unwrap();
    let coefficients = vec![0.0; system.n_dofs_per_cell()];
    evaluation
        .evaluate(&mapping, &coefficients, EvaluationFlags::values_and_gradients())
        .unwrap();

    assert_panics!(evaluation.value_into(0, &mut [0.0; 3]));
    assert_panics!(evaluation.value_into(0, &mut [0.0; 1]));
    assert_panics!(evaluation.gradient_into(0, &mut [Vector2::<f64>::zeros(); 3]));
    // Out of bounds point
    assert_panics!(evaluation.value_into(1, &mut [0.0; 2]));
    evaluation.value_into(0, &mut [0.0; 2]);
}

#[test]
fn only_evaluated_quantities_can_be_read() {
    let layout = layout_with_compositions(0);
    let system = layout.system();
    let mut evaluation = PointEvaluation::<f64, U2, 2>::new(system, 0, GeometrySource::Shared, FLAGS).unwrap();
    let mut mapping = MappingInfo::<f64, U2>::new(FLAGS);
    mapping
        .reinit(&HypercubeCell::reference(), &[Point2::origin()])
        .unwrap();
    let coefficients = vec![1.0; system.n_dofs_per_cell()];

    evaluation
        .evaluate(&mapping, &coefficients, EvaluationFlags::values())
        .unwrap();
    assert_eq!(evaluation.evaluated(), EvaluationFlags::values());
    assert_eq!(evaluation.value(0), &[1.0, 1.0]);
    assert_panics!(evaluation.gradient_into(0, &mut [Vector2::<f64>::zeros(); 2]));

    // A failed evaluation leaves nothing readable
    assert!(evaluation
        .evaluate(&mapping, &coefficients[..1], EvaluationFlags::values())
        .is_err());
    assert_eq!(evaluation.evaluated(), EvaluationFlags::default());
    assert_panics!(evaluation.value_into(0, &mut [0.0; 2]));

    evaluation
        .evaluate(&mapping, &coefficients, EvaluationFlags::values())
        .unwrap();
    evaluation.clear();
    assert_eq!(DynamicPointEvaluation::n_points(&evaluation), 0);
    assert_eq!(evaluation.evaluated(), EvaluationFlags::default());
}
