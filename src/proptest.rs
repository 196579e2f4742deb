//! Proptest strategies for configurations, reference points and cells.
use crate::basis::BaseElement;
use crate::cell::HypercubeCell;
use crate::layout::{CompositionalField, FieldConfiguration};
use ::proptest::collection::vec;
use ::proptest::prelude::*;
use nalgebra::{Point2, Point3, U2, U3};

/// Parameters for generating valid [`FieldConfiguration`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldConfigurationParams {
    pub dim: Option<usize>,
    pub max_compositional_fields: usize,
    /// Whether compositional fields may override the shared discretization.
    pub allow_discretization_overrides: bool,
}

impl Default for FieldConfigurationParams {
    fn default() -> Self {
        Self {
            dim: None,
            max_compositional_fields: 25,
            allow_discretization_overrides: true,
        }
    }
}

impl FieldConfigurationParams {
    pub fn with_dim(self, dim: usize) -> Self {
        Self { dim: Some(dim), ..self }
    }

    pub fn with_max_compositional_fields(self, max_compositional_fields: usize) -> Self {
        Self {
            max_compositional_fields,
            ..self
        }
    }

    pub fn with_discretization_overrides(self, allow: bool) -> Self {
        Self {
            allow_discretization_overrides: allow,
            ..self
        }
    }
}

/// Discretizations that are valid for compositional fields in any configuration.
pub fn composition_element() -> impl Strategy<Value = BaseElement> {
    prop_oneof![
        Just(BaseElement::lagrange(1)),
        Just(BaseElement::lagrange(2)),
        Just(BaseElement::discontinuous_lagrange(0)),
        Just(BaseElement::discontinuous_lagrange(1)),
        Just(BaseElement::discontinuous_polynomial(1)),
    ]
}

fn compositional_fields(
    max_fields: usize,
    allow_overrides: bool,
) -> impl Strategy<Value = Vec<CompositionalField>> {
    let discretization = if allow_overrides {
        proptest::option::weighted(0.3, composition_element()).boxed()
    } else {
        Just(None).boxed()
    };
    vec(discretization, 0..=max_fields).prop_map(|discretizations| {
        discretizations
            .into_iter()
            .enumerate()
            .map(|(i, discretization)| CompositionalField {
                name: format!("field {}", i),
                discretization,
            })
            .collect()
    })
}

impl Arbitrary for FieldConfiguration {
    type Parameters = FieldConfigurationParams;
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(params: Self::Parameters) -> Self::Strategy {
        let dim = match params.dim {
            Some(dim) => Just(dim).boxed(),
            None => (2..=3usize).boxed(),
        };
        let fields = compositional_fields(params.max_compositional_fields, params.allow_discretization_overrides);
        let flags = any::<[bool; 5]>();
        let degrees = (1..=3usize, 1..=3usize, 1..=2usize);
        (dim, fields, flags, degrees)
            .prop_map(|(dim, fields, flags, (velocity, temperature, composition))| {
                let [melt, direct, conservative, discontinuous_compaction, discontinuous_composition] = flags;
                FieldConfiguration {
                    dim,
                    compositional_fields: fields,
                    include_melt_transport: melt,
                    use_direct_stokes_solver: direct,
                    // A continuous pressure needs a velocity degree of at least 2
                    use_locally_conservative_discretization: conservative || velocity == 1,
                    use_discontinuous_compaction_pressure: discontinuous_compaction,
                    use_discontinuous_composition_discretization: discontinuous_composition,
                    stokes_velocity_degree: velocity,
                    temperature_degree: temperature,
                    composition_degree: composition,
                }
            })
            .boxed()
    }
}

pub fn reference_point2() -> impl Strategy<Value = Point2<f64>> {
    [-1.0..=1.0, -1.0..=1.0].prop_map(|[x, y]| Point2::new(x, y))
}

pub fn reference_point3() -> impl Strategy<Value = Point3<f64>> {
    [-1.0..=1.0, -1.0..=1.0, -1.0..=1.0].prop_map(|[x, y, z]| Point3::new(x, y, z))
}

/// Quadrilaterals obtained by slightly perturbing the vertices of an axis-aligned rectangle.
///
/// The perturbation is small enough for the geometry map to stay invertible.
pub fn quadrilateral() -> impl Strategy<Value = HypercubeCell<f64, U2>> {
    let corner = [-5.0..5.0, -5.0..5.0];
    let extents = [0.5..3.0, 0.5..3.0];
    let perturbations = vec([-0.1..0.1, -0.1..0.1], 4);
    (corner, extents, perturbations).prop_map(|([x0, y0], [w, h], perturbations)| {
        let vertices = perturbations
            .into_iter()
            .enumerate()
            .map(|(v, [dx, dy])| {
                let x = x0 + if v & 1 != 0 { w } else { 0.0 };
                let y = y0 + if v & 2 != 0 { h } else { 0.0 };
                Point2::new(x + dx * w, y + dy * h)
            })
            .collect();
        HypercubeCell::from_vertices(vertices).expect("Quadrilaterals always have four vertices")
    })
}

/// Axis-aligned boxes in 3D.
pub fn axis_aligned_hexahedron() -> impl Strategy<Value = HypercubeCell<f64, U3>> {
    let corner = [-5.0..5.0, -5.0..5.0, -5.0..5.0];
    let extents = [0.5..3.0, 0.5..3.0, 0.5..3.0];
    (corner, extents).prop_map(|([x0, y0, z0], [w, h, d])| {
        HypercubeCell::axis_aligned(&Point3::new(x0, y0, z0), &Point3::new(x0 + w, y0 + h, z0 + d))
    })
}
