//! Component layout and point evaluation for coupled multi-field finite element solutions.
//!
//! A [`FieldLayout`](layout::FieldLayout) assigns a flat, deterministic numbering to all
//! scalar unknowns of a configuration consisting of velocity, pressure, temperature,
//! an arbitrary number of compositional fields and optional melt transport variables.
//! A [`SolutionEvaluator`](evaluator::SolutionEvaluator) evaluates the solution and its
//! gradient at arbitrary points inside a single cell, given the cell-local coefficients.
use nalgebra::{DimMin, DimName};

pub mod allocators;
pub mod basis;
pub mod cell;
pub mod dispatch;
pub mod error;
pub mod evaluator;
pub mod layout;
pub mod mapping;
pub mod parallel;
pub mod system;

#[cfg(feature = "proptest-support")]
pub mod proptest;

pub extern crate nalgebra;

pub use error::{Error, ErrorKind, Result};

/// Real scalar types supported by the evaluation routines.
pub trait Real: nalgebra::RealField + Copy {}

impl<T: nalgebra::RealField + Copy> Real for T {}

/// A small, fixed-size dimension.
///
/// Used as a trait alias for various traits frequently needed by generic routines.
pub trait SmallDim: DimName + DimMin<Self, Output = Self> {}

impl<D> SmallDim for D where D: DimName + DimMin<Self, Output = Self> {}
