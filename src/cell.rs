//! Cell geometry: maps from the reference cell $[-1, 1]^d$ to physical cells.
use crate::allocators::DimAllocator;
use crate::error::{Error, Result};
use crate::{Real, SmallDim};
use nalgebra::{DefaultAllocator, OMatrix, OPoint, OVector};
use numeric_literals::replace_float_literals;

/// A map from reference coordinates to physical coordinates of a single cell.
pub trait CellMapping<T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    /// Maps reference coordinates to physical coordinates in the cell.
    fn map_reference_coords(&self, reference_coords: &OPoint<T, D>) -> OPoint<T, D>;

    /// Compute the Jacobian of the transformation from the reference cell to the physical cell
    /// at the given reference coordinates.
    fn reference_jacobian(&self, reference_coords: &OPoint<T, D>) -> OMatrix<T, D, D>;
}

/// A quadrilateral or hexahedral cell with a multilinear geometry map.
///
/// Vertices are numbered lexicographically with the first coordinate running fastest,
/// i.e. vertex `v` sits at the reference corner whose coordinate `a` is $+1$ if bit `a`
/// of `v` is set and $-1$ otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct HypercubeCell<T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    vertices: Vec<OPoint<T, D>>,
}

impl<T, D> HypercubeCell<T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    pub fn from_vertices(vertices: Vec<OPoint<T, D>>) -> Result<Self> {
        let expected = 1 << D::dim();
        if vertices.len() != expected {
            return Err(Error::DimensionMismatch {
                what: "cell vertices",
                expected,
                actual: vertices.len(),
            });
        }
        Ok(Self { vertices })
    }

    /// The cell $[-1, 1]^d$ itself.
    pub fn reference() -> Self {
        let min = OPoint::from(OVector::<T, D>::repeat(-T::one()));
        let max = OPoint::from(OVector::<T, D>::repeat(T::one()));
        Self::axis_aligned(&min, &max)
    }

    /// The axis-aligned box with the given lower and upper corners.
    pub fn axis_aligned(min: &OPoint<T, D>, max: &OPoint<T, D>) -> Self {
        let vertices = (0..1 << D::dim())
            .map(|v| {
                let mut x = min.clone();
                for a in 0..D::dim() {
                    if v & (1 << a) != 0 {
                        x[a] = max[a];
                    }
                }
                x
            })
            .collect();
        Self { vertices }
    }

    pub fn vertices(&self) -> &[OPoint<T, D>] {
        &self.vertices
    }

    /// Value of the multilinear shape function `v` at `xi`, or its derivative in direction
    /// `direction` if given.
    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    fn shape_function(v: usize, xi: &OPoint<T, D>, direction: Option<usize>) -> T {
        let mut result = 1.0;
        for a in 0..D::dim() {
            let sign = if v & (1 << a) != 0 { 1.0 } else { -1.0 };
            result *= if direction == Some(a) {
                sign / 2.0
            } else {
                (1.0 + sign * xi[a]) / 2.0
            };
        }
        result
    }
}

impl<T, D> CellMapping<T, D> for HypercubeCell<T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    fn map_reference_coords(&self, xi: &OPoint<T, D>) -> OPoint<T, D> {
        let mut x = OPoint::<T, D>::origin();
        for (v, vertex) in self.vertices.iter().enumerate() {
            x.coords.axpy(Self::shape_function(v, xi, None), &vertex.coords, T::one());
        }
        x
    }

    fn reference_jacobian(&self, xi: &OPoint<T, D>) -> OMatrix<T, D, D> {
        OMatrix::<T, D, D>::from_fn(|i, j| {
            self.vertices
                .iter()
                .enumerate()
                .map(|(v, vertex)| vertex[i] * Self::shape_function(v, xi, Some(j)))
                .fold(T::zero(), |sum, term| sum + term)
        })
    }
}
