use nalgebra::allocator::Allocator;
use nalgebra::{DefaultAllocator, DimName, OPoint};

/// Poor man's approx assertion for matrices
#[macro_export]
macro_rules! assert_approx_matrix_eq {
    ($x:expr, $y:expr, abstol = $tol:expr) => {{
        let diff = $x - $y;

        let max_absdiff = diff.abs().max();
        let approx_eq = max_absdiff <= $tol;

        if !approx_eq {
            println!("abstol: {:e}", $tol);
            println!("left: {}", $x);
            println!("right: {}", $y);
            println!("diff: {:e}", diff);
        }
        assert!(approx_eq);
    }};
}

/// Approx assertion for slices of scalars, reporting the first offending entry.
#[macro_export]
macro_rules! assert_approx_slice_eq {
    ($x:expr, $y:expr, abstol = $tol:expr) => {{
        let x: &[f64] = &$x;
        let y: &[f64] = &$y;
        assert_eq!(x.len(), y.len(), "Slices must have the same length");
        for (i, (a, b)) in x.iter().zip(y.iter()).enumerate() {
            if (a - b).abs() > $tol {
                println!("abstol: {:e}", $tol);
                println!("left: {:?}", x);
                println!("right: {:?}", y);
                panic!("Entries at index {} differ: {} vs {}", i, a, b);
            }
        }
    }};
}

#[macro_export]
macro_rules! assert_panics {
    ($e:expr) => {{
        use std::panic::catch_unwind;
        use std::stringify;
        let expr_string = stringify!($e);
        let result = catch_unwind(|| $e);
        if result.is_ok() {
            panic!("assert_panics!({}) failed.", expr_string);
        }
    }};
}

pub fn prefix_sum(counts: impl IntoIterator<Item = usize>, x0: usize) -> impl Iterator<Item = usize> {
    counts.into_iter().scan(x0, |sum, x| {
        let current = *sum;
        *sum += x;
        Some(current)
    })
}

/// A uniform grid of `n^d` points covering the interior of the reference cell $[-1, 1]^d$,
/// with the first coordinate running fastest.
pub fn reference_grid<D>(n: usize) -> Vec<OPoint<f64, D>>
where
    D: DimName,
    DefaultAllocator: Allocator<f64, D>,
{
    let coordinate = |i: usize| -1.0 + (2.0 * i as f64 + 1.0) / n as f64;
    let n_points = n.pow(D::dim() as u32);
    (0..n_points)
        .map(|mut index| {
            let mut point = OPoint::<f64, D>::origin();
            for a in 0..D::dim() {
                point[a] = coordinate(index % n);
                index /= n;
            }
            point
        })
        .collect()
}
