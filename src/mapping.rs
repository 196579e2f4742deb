//! Geometry cache for evaluation at an ordered set of points in one cell.
use crate::allocators::DimAllocator;
use crate::cell::CellMapping;
use crate::error::{Error, Result};
use crate::{Real, SmallDim};
use nalgebra::{DefaultAllocator, OMatrix, OPoint};
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// Selects which quantities are computed when a cell is (re)bound.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct UpdateFlags {
    bits: u8,
}

impl UpdateFlags {
    pub const NOTHING: Self = Self { bits: 0 };
    pub const VALUES: Self = Self { bits: 1 };
    pub const GRADIENTS: Self = Self { bits: 1 << 1 };
    pub const HESSIANS: Self = Self { bits: 1 << 2 };
    pub const QUADRATURE_POINTS: Self = Self { bits: 1 << 3 };
    pub const JXW_VALUES: Self = Self { bits: 1 << 4 };

    const NAMES: [(Self, &'static str); 5] = [
        (Self::VALUES, "VALUES"),
        (Self::GRADIENTS, "GRADIENTS"),
        (Self::HESSIANS, "HESSIANS"),
        (Self::QUADRATURE_POINTS, "QUADRATURE_POINTS"),
        (Self::JXW_VALUES, "JXW_VALUES"),
    ];

    pub const fn bits(self) -> u8 {
        self.bits
    }

    pub const fn is_empty(self) -> bool {
        self.bits == 0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.bits & other.bits == other.bits
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.bits & other.bits != 0
    }

    pub const fn union(self, other: Self) -> Self {
        Self {
            bits: self.bits | other.bits,
        }
    }

    /// The flags in `self` that are not in `other`.
    pub const fn difference(self, other: Self) -> Self {
        Self {
            bits: self.bits & !other.bits,
        }
    }
}

impl BitOr for UpdateFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for UpdateFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.union(rhs);
    }
}

impl BitAnd for UpdateFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self {
            bits: self.bits & rhs.bits,
        }
    }
}

impl fmt::Debug for UpdateFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "NOTHING");
        }
        let mut first = true;
        for (flag, name) in Self::NAMES {
            if self.contains(flag) {
                if !first {
                    write!(f, " | ")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// The quantities a point evaluation computes from the coefficients of a cell.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct EvaluationFlags {
    pub values: bool,
    pub gradients: bool,
}

impl EvaluationFlags {
    pub fn values() -> Self {
        Self {
            values: true,
            gradients: false,
        }
    }

    pub fn values_and_gradients() -> Self {
        Self {
            values: true,
            gradients: true,
        }
    }
}

impl TryFrom<UpdateFlags> for EvaluationFlags {
    type Error = Error;

    /// Translates update flags into evaluation flags.
    ///
    /// Fails with [`Error::UnsupportedFlags`] if anything other than values and gradients is requested.
    fn try_from(flags: UpdateFlags) -> Result<Self> {
        let unsupported = flags.difference(UpdateFlags::VALUES | UpdateFlags::GRADIENTS);
        if !unsupported.is_empty() {
            return Err(Error::UnsupportedFlags(unsupported));
        }
        Ok(Self {
            values: flags.contains(UpdateFlags::VALUES),
            gradients: flags.contains(UpdateFlags::GRADIENTS),
        })
    }
}

impl From<EvaluationFlags> for UpdateFlags {
    fn from(flags: EvaluationFlags) -> Self {
        let mut update_flags = UpdateFlags::NOTHING;
        if flags.values {
            update_flags |= UpdateFlags::VALUES;
        }
        if flags.gradients {
            update_flags |= UpdateFlags::GRADIENTS;
        }
        update_flags
    }
}

/// Cached geometry of one cell at an ordered set of reference points.
///
/// Physical points are always computed. Inverse transposed Jacobians are only computed when
/// [`UpdateFlags::GRADIENTS`] is both enabled for the cache and requested by the current
/// rebind, and Jacobian determinants likewise for [`UpdateFlags::GRADIENTS`] or
/// [`UpdateFlags::JXW_VALUES`].
#[derive(Debug, Clone)]
pub struct MappingInfo<T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    update_flags: UpdateFlags,
    computed: UpdateFlags,
    reference_points: Vec<OPoint<T, D>>,
    physical_points: Vec<OPoint<T, D>>,
    inverse_jacobians_t: Vec<OMatrix<T, D, D>>,
    jacobian_determinants: Vec<T>,
}

impl<T, D> MappingInfo<T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    pub fn new(update_flags: UpdateFlags) -> Self {
        Self {
            update_flags,
            computed: UpdateFlags::NOTHING,
            reference_points: Vec::new(),
            physical_points: Vec::new(),
            inverse_jacobians_t: Vec::new(),
            jacobian_determinants: Vec::new(),
        }
    }

    pub fn update_flags(&self) -> UpdateFlags {
        self.update_flags
    }

    /// The quantities computed by the last successful rebind.
    pub fn computed_flags(&self) -> UpdateFlags {
        self.computed
    }

    /// Binds the cache to the given cell and reference points, computing everything enabled
    /// for the cache.
    ///
    /// Buffers are reused, so no allocation takes place unless the number of points exceeds
    /// the largest number of points seen so far. If an error is returned, the cache holds no points.
    pub fn reinit(&mut self, cell: &dyn CellMapping<T, D>, points: &[OPoint<T, D>]) -> Result<()> {
        self.reinit_with(cell, points, self.update_flags)
    }

    /// Like [`reinit`](Self::reinit), but only computes the quantities in `requested` that are
    /// also enabled for the cache.
    ///
    /// Jacobians are not inverted unless gradients are requested, so a values-only rebind
    /// succeeds on cells with degenerate Jacobians.
    pub fn reinit_with(
        &mut self,
        cell: &dyn CellMapping<T, D>,
        points: &[OPoint<T, D>],
        requested: UpdateFlags,
    ) -> Result<()> {
        self.clear();
        let computed = self.update_flags & requested;
        self.reference_points.extend_from_slice(points);
        self.physical_points
            .extend(points.iter().map(|xi| cell.map_reference_coords(xi)));

        let need_inverse = computed.contains(UpdateFlags::GRADIENTS);
        let need_determinant = computed.intersects(UpdateFlags::GRADIENTS | UpdateFlags::JXW_VALUES);
        if need_determinant {
            for (q, xi) in points.iter().enumerate() {
                let j = cell.reference_jacobian(xi);
                self.jacobian_determinants.push(j.determinant());
                if need_inverse {
                    match j.try_inverse() {
                        Some(j_inv) => self.inverse_jacobians_t.push(j_inv.transpose()),
                        None => {
                            self.clear();
                            return Err(Error::SingularJacobian { point: q });
                        }
                    }
                }
            }
        }
        self.computed = computed;
        Ok(())
    }

    /// Removes all points from the cache.
    pub fn clear(&mut self) {
        self.computed = UpdateFlags::NOTHING;
        self.reference_points.clear();
        self.physical_points.clear();
        self.inverse_jacobians_t.clear();
        self.jacobian_determinants.clear();
    }

    pub fn n_points(&self) -> usize {
        self.reference_points.len()
    }

    pub fn reference_points(&self) -> &[OPoint<T, D>] {
        &self.reference_points
    }

    pub fn physical_points(&self) -> &[OPoint<T, D>] {
        &self.physical_points
    }

    /// The inverse transposed Jacobian $J^{-T}$ at each point.
    ///
    /// Empty unless the last rebind computed [`UpdateFlags::GRADIENTS`].
    pub fn inverse_jacobians_transposed(&self) -> &[OMatrix<T, D, D>] {
        &self.inverse_jacobians_t
    }

    pub fn jacobian_determinants(&self) -> &[T] {
        &self.jacobian_determinants
    }
}
