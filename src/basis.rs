//! Scalar basis functions on the reference hypercube $[-1, 1]^d$.
use crate::allocators::DimAllocator;
use crate::error::{Error, Result};
use crate::{Real, SmallDim};
use nalgebra::{convert, DefaultAllocator, OPoint, OVector};
use num::integer::binomial;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::{Display, Formatter};

/// The largest reference dimension supported by [`ScalarBasis`].
pub const MAX_REFERENCE_DIM: usize = 3;

/// The family of a basis function space.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BasisKind {
    /// Continuous Lagrange polynomials of degree $k$ in each coordinate direction ($Q_k$).
    Lagrange,
    /// Discontinuous Lagrange polynomials of degree $k$ in each coordinate direction ($DGQ_k$).
    DiscontinuousLagrange,
    /// Discontinuous polynomials of total degree $k$ ($DGP_k$).
    DiscontinuousPolynomial,
}

/// Describes a scalar basis function space by its family and polynomial degree.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BaseElement {
    pub kind: BasisKind,
    pub degree: usize,
}

impl BaseElement {
    pub fn lagrange(degree: usize) -> Self {
        Self {
            kind: BasisKind::Lagrange,
            degree,
        }
    }

    pub fn discontinuous_lagrange(degree: usize) -> Self {
        Self {
            kind: BasisKind::DiscontinuousLagrange,
            degree,
        }
    }

    pub fn discontinuous_polynomial(degree: usize) -> Self {
        Self {
            kind: BasisKind::DiscontinuousPolynomial,
            degree,
        }
    }

    pub fn is_continuous(&self) -> bool {
        self.kind == BasisKind::Lagrange
    }

    /// Whether the basis is a tensor product of univariate bases.
    ///
    /// Only tensor-product bases can be evaluated against a geometry cache shared
    /// between several evaluators.
    pub fn is_tensor_product(&self) -> bool {
        match self.kind {
            BasisKind::Lagrange | BasisKind::DiscontinuousLagrange => true,
            BasisKind::DiscontinuousPolynomial => false,
        }
    }

    /// The number of basis functions on a reference cell of the given dimension.
    pub fn n_dofs(&self, dim: usize) -> usize {
        match self.kind {
            BasisKind::Lagrange | BasisKind::DiscontinuousLagrange => (self.degree + 1).pow(dim as u32),
            BasisKind::DiscontinuousPolynomial => binomial(self.degree + dim, dim),
        }
    }
}

impl Display for BaseElement {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let family = match self.kind {
            BasisKind::Lagrange => "Q",
            BasisKind::DiscontinuousLagrange => "DGQ",
            BasisKind::DiscontinuousPolynomial => "DGP",
        };
        write!(f, "{}({})", family, self.degree)
    }
}

/// Evaluates the basis functions of a [`BaseElement`] on the reference cell.
///
/// Tensor-product bases use Lagrange polynomials on equispaced nodes, numbered lexicographically
/// with the first coordinate running fastest. The $DGP_k$ basis consists of the monomials
/// of total degree at most $k$, ordered by total degree.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarBasis<T> {
    element: BaseElement,
    dim: usize,
    n_dofs: usize,
    // Equispaced nodes on [-1, 1] for tensor-product bases
    nodes: Vec<T>,
    // Flattened with stride `dim`. Node indices per direction for tensor-product bases,
    // monomial exponents otherwise.
    multi_indices: Vec<usize>,
}

impl<T: Real> ScalarBasis<T> {
    pub fn new(element: BaseElement, dim: usize) -> Result<Self> {
        if dim == 0 || dim > MAX_REFERENCE_DIM {
            return Err(Error::InvalidConfiguration(format!(
                "reference dimension {} is not supported",
                dim
            )));
        }
        if element.kind == BasisKind::Lagrange && element.degree == 0 {
            return Err(Error::InvalidConfiguration(
                "continuous Lagrange elements require a degree of at least 1".to_string(),
            ));
        }

        let k = element.degree;
        let nodes = if k == 0 {
            vec![T::zero()]
        } else {
            (0..=k)
                .map(|i| convert::<f64, T>(-1.0 + 2.0 * i as f64 / k as f64))
                .collect()
        };

        // Decode j = sum_a m_a (k + 1)^a, i.e. the first direction runs fastest
        let decode = |j: usize| {
            let mut remainder = j;
            (0..dim)
                .map(|_| {
                    let m = remainder % (k + 1);
                    remainder /= k + 1;
                    m
                })
                .collect::<Vec<_>>()
        };
        let mut indices: Vec<Vec<usize>> = (0..(k + 1).pow(dim as u32)).map(decode).collect();
        if !element.is_tensor_product() {
            indices.retain(|exponents| exponents.iter().sum::<usize>() <= k);
            indices.sort_by_key(|exponents| exponents.iter().sum::<usize>());
        }

        let n_dofs = indices.len();
        debug_assert_eq!(n_dofs, element.n_dofs(dim));
        Ok(Self {
            element,
            dim,
            n_dofs,
            nodes,
            multi_indices: indices.concat(),
        })
    }

    pub fn element(&self) -> &BaseElement {
        &self.element
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn n_dofs(&self) -> usize {
        self.n_dofs
    }

    fn multi_index(&self, dof: usize) -> &[usize] {
        &self.multi_indices[self.dim * dof..self.dim * (dof + 1)]
    }

    /// Value and derivative of the univariate factor with the given index at `x`.
    fn univariate(&self, index: usize, x: T) -> (T, T) {
        if self.element.is_tensor_product() {
            let t = &self.nodes;
            let mut value = T::one();
            let mut derivative = T::zero();
            for (l, &t_l) in t.iter().enumerate() {
                if l == index {
                    continue;
                }
                let factor = (x - t_l) / (t[index] - t_l);
                // Product rule, accumulated alongside the product itself
                derivative = derivative * factor + value / (t[index] - t_l);
                value *= factor;
            }
            (value, derivative)
        } else if index == 0 {
            (T::one(), T::zero())
        } else {
            let n = convert::<f64, T>(index as f64);
            (x.powi(index as i32), n * x.powi(index as i32 - 1))
        }
    }

    /// Evaluates each basis function at the given reference coordinates.
    ///
    /// # Panics
    /// Panics if `values` does not have exactly one entry per basis function, or if the
    /// dimension of `xi` does not match the dimension of the basis.
    pub fn populate_basis<D>(&self, values: &mut [T], xi: &OPoint<T, D>)
    where
        D: SmallDim,
        DefaultAllocator: DimAllocator<T, D>,
    {
        assert_eq!(values.len(), self.n_dofs, "Buffer must hold one value per basis function");
        assert_eq!(D::dim(), self.dim, "Point dimension must match basis dimension");
        for (dof, value) in values.iter_mut().enumerate() {
            *value = self
                .multi_index(dof)
                .iter()
                .enumerate()
                .map(|(a, &m)| self.univariate(m, xi[a]).0)
                .fold(T::one(), |product, factor| product * factor);
        }
    }

    /// Evaluates the reference gradient of each basis function at the given reference coordinates.
    ///
    /// # Panics
    /// Same conditions as [`populate_basis`](Self::populate_basis).
    pub fn populate_basis_gradients<D>(&self, gradients: &mut [OVector<T, D>], xi: &OPoint<T, D>)
    where
        D: SmallDim,
        DefaultAllocator: DimAllocator<T, D>,
    {
        assert_eq!(gradients.len(), self.n_dofs, "Buffer must hold one gradient per basis function");
        assert_eq!(D::dim(), self.dim, "Point dimension must match basis dimension");
        let mut values = [T::zero(); MAX_REFERENCE_DIM];
        let mut derivatives = [T::zero(); MAX_REFERENCE_DIM];
        for (dof, gradient) in gradients.iter_mut().enumerate() {
            for (a, &m) in self.multi_index(dof).iter().enumerate() {
                let (value, derivative) = self.univariate(m, xi[a]);
                values[a] = value;
                derivatives[a] = derivative;
            }
            for a in 0..self.dim {
                gradient[a] = (0..self.dim)
                    .map(|b| if a == b { derivatives[b] } else { values[b] })
                    .fold(T::one(), |product, factor| product * factor);
            }
        }
    }

    /// Reference points on which the basis is unisolvent, one per basis function.
    ///
    /// For tensor-product bases these are the Lagrange nodes, so that the basis function
    /// with index `i` is one at point `i` and zero at all others.
    pub fn unisolvent_points<D>(&self) -> Vec<OPoint<T, D>>
    where
        D: SmallDim,
        DefaultAllocator: DimAllocator<T, D>,
    {
        assert_eq!(D::dim(), self.dim, "Point dimension must match basis dimension");
        let k = self.element.degree;
        (0..self.n_dofs)
            .map(|dof| {
                let mut point = OPoint::<T, D>::origin();
                for (a, &m) in self.multi_index(dof).iter().enumerate() {
                    point[a] = if self.element.is_tensor_product() {
                        self.nodes[m]
                    } else if k == 0 {
                        T::zero()
                    } else {
                        // Principal lattice of the simplex spanned by the lower corner of the cell
                        convert::<f64, T>(-1.0 + 2.0 * m as f64 / k as f64)
                    };
                }
                point
            })
            .collect()
    }
}
