use fenris_fields::cell::{CellMapping, HypercubeCell};
use fenris_fields::error::Error;
use fenris_fields::proptest::{quadrilateral, reference_point2};
use matrixcompare::assert_matrix_eq;
use nalgebra::{Matrix2, Matrix3, Point2, Point3, U2, U3};
use proptest::prelude::*;

#[test]
fn reference_cell_is_identity() {
    let cell = HypercubeCell::<f64, U3>::reference();
    let xi = Point3::new(0.25, -0.5, 0.75);
    assert_eq!(cell.map_reference_coords(&xi), xi);
    assert_matrix_eq!(cell.reference_jacobian(&xi), Matrix3::identity(), comp = abs, tol = 1e-14);
}

#[test]
fn axis_aligned_vertices_are_lexicographic() {
    let cell = HypercubeCell::axis_aligned(&Point2::new(1.0, 2.0), &Point2::new(3.0, 6.0));
    let expected = [
        Point2::new(1.0, 2.0),
        Point2::new(3.0, 2.0),
        Point2::new(1.0, 6.0),
        Point2::new(3.0, 6.0),
    ];
    assert_eq!(cell.vertices(), &expected);
}

#[test]
fn axis_aligned_map_and_jacobian() {
    let cell = HypercubeCell::axis_aligned(&Point2::new(1.0, 2.0), &Point2::new(3.0, 6.0));
    let x = cell.map_reference_coords(&Point2::new(0.0, 0.5));
    assert_eq!(x, Point2::new(2.0, 5.0));
    let j = cell.reference_jacobian(&Point2::new(0.3, -0.1));
    assert_matrix_eq!(j, Matrix2::new(1.0, 0.0, 0.0, 2.0), comp = abs, tol = 1e-14);
}

#[test]
fn wrong_number_of_vertices_is_rejected() {
    let vertices = vec![Point2::new(0.0, 0.0), Point2::new(1.0, 0.0), Point2::new(0.0, 1.0)];
    let err = HypercubeCell::<f64, U2>::from_vertices(vertices).unwrap_err();
    assert_eq!(
        err,
        Error::DimensionMismatch {
            what: "cell vertices",
            expected: 4,
            actual: 3
        }
    );
}

proptest! {
    #[test]
    fn vertices_are_images_of_reference_corners(cell in quadrilateral()) {
        let reference = HypercubeCell::<f64, U2>::reference();
        for (corner, vertex) in reference.vertices().iter().zip(cell.vertices()) {
            let x = cell.map_reference_coords(corner);
            prop_assert!((x - vertex).norm() <= 1e-12);
        }
    }

    #[test]
    fn jacobian_matches_finite_differences(cell in quadrilateral(), xi in reference_point2()) {
        let h = 1e-6;
        let j = cell.reference_jacobian(&xi);
        prop_assert!(j.determinant() > 0.0);
        for b in 0..2 {
            let mut xi_plus = xi;
            let mut xi_minus = xi;
            xi_plus[b] += h;
            xi_minus[b] -= h;
            let column = (cell.map_reference_coords(&xi_plus) - cell.map_reference_coords(&xi_minus)) / (2.0 * h);
            for a in 0..2 {
                prop_assert!((column[a] - j[(a, b)]).abs() <= 1e-6);
            }
        }
    }
}
