//! Flat numbering of the unknowns of a coupled multi-field discretization.
//!
//! The solution consists of a velocity, a pressure, a temperature, any number of compositional
//! fields and, optionally, the melt transport variables fluid pressure, compaction pressure
//! and fluid velocity. Each scalar unknown is a *component*. Components are numbered in the
//! canonical order
//!
//! ```text
//! velocity, [fluid pressure, compaction pressure, fluid velocity], pressure, temperature, compositions
//! ```
//!
//! and grouped into *blocks* for the algebraic view of the system. The numbering only depends
//! on the [`FieldConfiguration`], so that identical configurations always produce identical
//! layouts.
use crate::basis::{BaseElement, BasisKind};
use crate::error::{Error, Result};
use crate::system::FiniteElementSystem;
use itertools::{izip, Itertools};
use log::debug;
use serde::{Deserialize, Serialize};
use std::iter::repeat;
use std::ops::Range;

pub const VELOCITY: &str = "velocity";
pub const PRESSURE: &str = "pressure";
pub const TEMPERATURE: &str = "temperature";
pub const FLUID_PRESSURE: &str = "fluid pressure";
pub const COMPACTION_PRESSURE: &str = "compaction pressure";
pub const FLUID_VELOCITY: &str = "fluid velocity";

const RESERVED_NAMES: [&str; 6] = [
    VELOCITY,
    PRESSURE,
    TEMPERATURE,
    FLUID_PRESSURE,
    COMPACTION_PRESSURE,
    FLUID_VELOCITY,
];

/// Declaration of a compositional field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositionalField {
    pub name: String,
    /// Overrides the discretization shared by compositional fields.
    pub discretization: Option<BaseElement>,
}

impl CompositionalField {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            discretization: None,
        }
    }

    pub fn with_discretization(mut self, element: BaseElement) -> Self {
        self.discretization = Some(element);
        self
    }
}

/// Describes which fields make up the solution and how they are discretized.
///
/// The configuration is fixed for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldConfiguration {
    pub dim: usize,
    pub compositional_fields: Vec<CompositionalField>,
    pub include_melt_transport: bool,
    pub use_direct_stokes_solver: bool,
    /// Use a discontinuous pressure space $DGP_{k-1}$ instead of $Q_{k-1}$.
    pub use_locally_conservative_discretization: bool,
    /// Use a discontinuous compaction pressure space even without locally conservative discretization.
    pub use_discontinuous_compaction_pressure: bool,
    /// Use $DGQ$ instead of $Q$ for compositional fields without their own discretization.
    pub use_discontinuous_composition_discretization: bool,
    pub stokes_velocity_degree: usize,
    pub temperature_degree: usize,
    pub composition_degree: usize,
}

impl Default for FieldConfiguration {
    fn default() -> Self {
        Self {
            dim: 2,
            compositional_fields: Vec::new(),
            include_melt_transport: false,
            use_direct_stokes_solver: false,
            use_locally_conservative_discretization: false,
            use_discontinuous_compaction_pressure: false,
            use_discontinuous_composition_discretization: false,
            stokes_velocity_degree: 2,
            temperature_degree: 2,
            composition_degree: 2,
        }
    }
}

impl FieldConfiguration {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            ..Self::default()
        }
    }

    /// Appends compositional fields with the given names and the shared discretization.
    pub fn with_compositional_fields<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.compositional_fields
            .extend(names.into_iter().map(CompositionalField::new));
        self
    }

    pub fn with_compositional_field(mut self, field: CompositionalField) -> Self {
        self.compositional_fields.push(field);
        self
    }

    pub fn with_melt_transport(mut self, include: bool) -> Self {
        self.include_melt_transport = include;
        self
    }

    pub fn with_direct_stokes_solver(mut self, direct: bool) -> Self {
        self.use_direct_stokes_solver = direct;
        self
    }

    pub fn with_locally_conservative_discretization(mut self, enabled: bool) -> Self {
        self.use_locally_conservative_discretization = enabled;
        self
    }

    pub fn with_discontinuous_compaction_pressure(mut self, enabled: bool) -> Self {
        self.use_discontinuous_compaction_pressure = enabled;
        self
    }

    pub fn with_discontinuous_composition_discretization(mut self, enabled: bool) -> Self {
        self.use_discontinuous_composition_discretization = enabled;
        self
    }

    pub fn with_stokes_velocity_degree(mut self, degree: usize) -> Self {
        self.stokes_velocity_degree = degree;
        self
    }

    pub fn with_temperature_degree(mut self, degree: usize) -> Self {
        self.temperature_degree = degree;
        self
    }

    pub fn with_composition_degree(mut self, degree: usize) -> Self {
        self.composition_degree = degree;
        self
    }

    pub fn n_compositional_fields(&self) -> usize {
        self.compositional_fields.len()
    }

    pub fn velocity_element(&self) -> BaseElement {
        BaseElement::lagrange(self.stokes_velocity_degree)
    }

    pub fn pressure_element(&self) -> BaseElement {
        let degree = self.stokes_velocity_degree.saturating_sub(1);
        if self.use_locally_conservative_discretization {
            BaseElement::discontinuous_polynomial(degree)
        } else {
            BaseElement::lagrange(degree)
        }
    }

    pub fn compaction_pressure_element(&self) -> BaseElement {
        let degree = self.stokes_velocity_degree.saturating_sub(1);
        if self.use_locally_conservative_discretization || self.use_discontinuous_compaction_pressure {
            BaseElement::discontinuous_polynomial(degree)
        } else {
            BaseElement::lagrange(degree)
        }
    }

    pub fn temperature_element(&self) -> BaseElement {
        BaseElement::lagrange(self.temperature_degree)
    }

    /// The discretization of compositional fields that do not declare their own.
    pub fn default_composition_element(&self) -> BaseElement {
        if self.use_discontinuous_composition_discretization {
            BaseElement::discontinuous_lagrange(self.composition_degree)
        } else {
            BaseElement::lagrange(self.composition_degree)
        }
    }

    /// The discretization of the compositional field with the given index.
    ///
    /// # Panics
    /// Panics if `index` is not the index of a declared compositional field.
    pub fn composition_element(&self, index: usize) -> BaseElement {
        self.compositional_fields[index]
            .discretization
            .unwrap_or_else(|| self.default_composition_element())
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Err(Error::InvalidConfiguration(reason));

        if !(2..=3).contains(&self.dim) {
            return invalid(format!("dimension must be 2 or 3, got {}", self.dim));
        }
        if self.stokes_velocity_degree == 0 {
            return invalid("the Stokes velocity degree must be at least 1".to_string());
        }

        let mut elements = vec![
            ("pressure", self.pressure_element()),
            ("temperature", self.temperature_element()),
        ];
        if self.include_melt_transport {
            elements.push(("compaction pressure", self.compaction_pressure_element()));
        }
        elements.extend(
            self.compositional_fields
                .iter()
                .enumerate()
                .map(|(i, field)| (field.name.as_str(), self.composition_element(i))),
        );
        for (name, element) in elements {
            if element.kind == BasisKind::Lagrange && element.degree == 0 {
                return invalid(format!("continuous discretization of {} requires a degree of at least 1", name));
            }
        }

        for (i, field) in self.compositional_fields.iter().enumerate() {
            if field.name.is_empty() {
                return invalid(format!("compositional field {} has an empty name", i));
            }
            if RESERVED_NAMES.contains(&field.name.as_str()) {
                return invalid(format!("{} is reserved and cannot name a compositional field", field.name));
            }
        }
        let fields = &self.compositional_fields;
        for (i, field) in fields.iter().enumerate() {
            if fields[..i].iter().any(|other| other.name == field.name) {
                return invalid(format!("compositional field {} is declared more than once", field.name));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MeltComponentIndices {
    pub fluid_pressure: usize,
    pub compaction_pressure: usize,
    pub fluid_velocities: Vec<usize>,
}

/// The component index of every scalar unknown.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentIndices {
    pub velocities: Vec<usize>,
    pub pressure: usize,
    pub temperature: usize,
    pub compositional_fields: Vec<usize>,
    pub melt: Option<MeltComponentIndices>,
}

impl ComponentIndices {
    pub fn n_components(&self) -> usize {
        let n_melt = self
            .melt
            .as_ref()
            .map(|melt| 2 + melt.fluid_velocities.len())
            .unwrap_or(0);
        self.velocities.len() + 2 + self.compositional_fields.len() + n_melt
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MeltBlockIndices {
    pub fluid_pressure: usize,
    pub compaction_pressure: usize,
    pub fluid_velocities: usize,
}

/// The block index of every field. All components of a vector field share one block.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockIndices {
    pub velocities: usize,
    pub pressure: usize,
    pub temperature: usize,
    pub compositional_fields: Vec<usize>,
    pub melt: Option<MeltBlockIndices>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MeltBaseElementIndices {
    pub fluid_pressure: usize,
    pub compaction_pressure: usize,
    pub fluid_velocities: usize,
}

/// The index into [`BaseElementCatalog::elements`] used by every field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BaseElementIndices {
    pub velocities: usize,
    pub pressure: usize,
    pub temperature: usize,
    pub compositional_fields: Vec<usize>,
    pub melt: Option<MeltBaseElementIndices>,
}

/// The distinct basis function spaces of the solution, in component order.
///
/// Base element `b` is used by `multiplicities[b]` consecutive components, so that the
/// multiplicities sum up to the number of components.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BaseElementCatalog {
    pub elements: Vec<BaseElement>,
    pub multiplicities: Vec<usize>,
    pub indices: BaseElementIndices,
}

impl BaseElementCatalog {
    pub fn n_components(&self) -> usize {
        self.multiplicities.iter().sum()
    }
}

/// Returns the component indices together with the total number of components.
pub fn compute_component_indices(config: &FieldConfiguration) -> (ComponentIndices, usize) {
    let mut n_components = 0;
    let mut next = || {
        let component = n_components;
        n_components += 1;
        component
    };

    let velocities = (0..config.dim).map(|_| next()).collect();
    let melt = if config.include_melt_transport {
        let fluid_pressure = next();
        let compaction_pressure = next();
        let fluid_velocities = (0..config.dim).map(|_| next()).collect();
        Some(MeltComponentIndices {
            fluid_pressure,
            compaction_pressure,
            fluid_velocities,
        })
    } else {
        None
    };
    let pressure = next();
    let temperature = next();
    let compositional_fields = (0..config.n_compositional_fields())
        .map(|_| next())
        .collect();

    let indices = ComponentIndices {
        velocities,
        pressure,
        temperature,
        compositional_fields,
        melt,
    };
    (indices, n_components)
}

/// Returns the block indices together with the total number of blocks.
///
/// Velocity and pressure share a block when a direct solver is used. With melt transport,
/// fluid and compaction pressure always share a block, so that the Stokes part of the system
/// keeps its 2x2 block structure for the Schur complement preconditioner.
pub fn compute_block_indices(config: &FieldConfiguration) -> (BlockIndices, usize) {
    let split = if config.use_direct_stokes_solver { 0 } else { 1 };
    let mut block = 0;

    let velocities = block;
    block += split;
    let melt = if config.include_melt_transport {
        let pressures = block;
        block += 1;
        let fluid_velocities = block;
        block += 1;
        Some(MeltBlockIndices {
            fluid_pressure: pressures,
            compaction_pressure: pressures,
            fluid_velocities,
        })
    } else {
        None
    };
    let pressure = block;
    block += 1;
    let temperature = block;
    block += 1;
    let compositional_fields = (0..config.n_compositional_fields())
        .map(|_| {
            block += 1;
            block - 1
        })
        .collect();

    let indices = BlockIndices {
        velocities,
        pressure,
        temperature,
        compositional_fields,
        melt,
    };
    (indices, block)
}

/// Returns the catalog of basis function spaces.
///
/// Compositional fields form maximal runs of consecutive fields with the same discretization,
/// and each run gets its own catalog entry. Runs are never merged across positions, so two
/// fields with the same discretization that are separated by a field with another
/// discretization end up in different entries. Without compositional fields, the catalog still
/// contains the shared composition entry with multiplicity zero.
pub fn compute_base_elements(config: &FieldConfiguration) -> BaseElementCatalog {
    let mut elements = Vec::new();
    let mut multiplicities = Vec::new();
    let mut push = |element: BaseElement, multiplicity: usize| {
        elements.push(element);
        multiplicities.push(multiplicity);
        elements.len() - 1
    };

    let velocities = push(config.velocity_element(), config.dim);
    let melt = if config.include_melt_transport {
        let fluid_pressure = push(config.pressure_element(), 1);
        let compaction_pressure = push(config.compaction_pressure_element(), 1);
        let fluid_velocities = push(config.velocity_element(), config.dim);
        Some(MeltBaseElementIndices {
            fluid_pressure,
            compaction_pressure,
            fluid_velocities,
        })
    } else {
        None
    };
    let pressure = push(config.pressure_element(), 1);
    let temperature = push(config.temperature_element(), 1);

    let n_c = config.n_compositional_fields();
    let mut compositional_fields = Vec::with_capacity(n_c);
    if n_c == 0 {
        push(config.default_composition_element(), 0);
    } else {
        let runs = (0..n_c).group_by(|&i| config.composition_element(i));
        for (element, run) in &runs {
            let run_length = run.count();
            let base_element = push(element, run_length);
            compositional_fields.extend(repeat(base_element).take(run_length));
        }
    }

    BaseElementCatalog {
        elements,
        multiplicities,
        indices: BaseElementIndices {
            velocities,
            pressure,
            temperature,
            compositional_fields,
            melt,
        },
    }
}

/// Maps every component to the block it belongs to.
///
/// In debug builds, fails with [`Error::IncompleteBlockMapping`] if a component is not assigned
/// to any block, which indicates that the two index structures are inconsistent.
pub fn component_to_block(components: &ComponentIndices, blocks: &BlockIndices) -> Result<Vec<usize>> {
    let n_components = components.n_components();
    let mut map = vec![usize::MAX; n_components];
    let mut assign = |component: usize, block: usize| {
        map.get_mut(component)
            .map(|entry| *entry = block)
            .ok_or(Error::IndexOutOfBounds {
                what: "component to block map",
                index: component,
                len: n_components,
            })
    };

    for &component in &components.velocities {
        assign(component, blocks.velocities)?;
    }
    assign(components.pressure, blocks.pressure)?;
    assign(components.temperature, blocks.temperature)?;
    for (&component, &block) in izip!(&components.compositional_fields, &blocks.compositional_fields) {
        assign(component, block)?;
    }
    if let (Some(melt_components), Some(melt_blocks)) = (&components.melt, &blocks.melt) {
        for &component in &melt_components.fluid_velocities {
            assign(component, melt_blocks.fluid_velocities)?;
        }
        assign(melt_components.fluid_pressure, melt_blocks.fluid_pressure)?;
        assign(melt_components.compaction_pressure, melt_blocks.compaction_pressure)?;
    }

    if cfg!(debug_assertions) {
        if let Some(component) = map.iter().position(|&block| block == usize::MAX) {
            return Err(Error::IncompleteBlockMapping { component });
        }
    }
    Ok(map)
}

/// A named field of the solution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub first_component_index: usize,
    pub n_components: usize,
    pub block_index: usize,
    pub base_element_index: usize,
}

impl Variable {
    pub fn components(&self) -> Range<usize> {
        self.first_component_index..self.first_component_index + self.n_components
    }
}

/// A contiguous range of compositional fields that share a basis and are evaluated together.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompositionChunk {
    pub base_element: usize,
    /// Index of the first compositional field in the chunk.
    pub first_field: usize,
    pub first_component: usize,
    pub width: usize,
}

impl CompositionChunk {
    pub fn fields(&self) -> Range<usize> {
        self.first_field..self.first_field + self.width
    }

    pub fn components(&self) -> Range<usize> {
        self.first_component..self.first_component + self.width
    }
}

/// All index spaces and the basis catalog derived from a [`FieldConfiguration`].
///
/// A layout is computed once per run and never modified afterwards. It is typically shared
/// between evaluators through an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldLayout {
    config: FieldConfiguration,
    n_components: usize,
    component_indices: ComponentIndices,
    n_blocks: usize,
    block_indices: BlockIndices,
    components_to_blocks: Vec<usize>,
    base_elements: BaseElementCatalog,
    system: FiniteElementSystem,
    variables: Vec<Variable>,
}

impl FieldLayout {
    pub fn new(config: FieldConfiguration) -> Result<Self> {
        config.validate()?;
        let (component_indices, n_components) = compute_component_indices(&config);
        let (block_indices, n_blocks) = compute_block_indices(&config);
        let components_to_blocks = component_to_block(&component_indices, &block_indices)?;
        let base_elements = compute_base_elements(&config);
        debug_assert_eq!(base_elements.n_components(), n_components);
        let system = FiniteElementSystem::new(&base_elements, config.dim)?;
        let variables = collect_variables(&config, &component_indices, &block_indices, &base_elements);

        debug!(
            "Field layout: {} components in {} blocks, {} base elements, {} dofs per cell",
            n_components,
            n_blocks,
            base_elements.elements.len(),
            system.n_dofs_per_cell()
        );

        Ok(Self {
            config,
            n_components,
            component_indices,
            n_blocks,
            block_indices,
            components_to_blocks,
            base_elements,
            system,
            variables,
        })
    }

    pub fn config(&self) -> &FieldConfiguration {
        &self.config
    }

    pub fn dim(&self) -> usize {
        self.config.dim
    }

    pub fn n_components(&self) -> usize {
        self.n_components
    }

    pub fn n_blocks(&self) -> usize {
        self.n_blocks
    }

    pub fn n_compositional_fields(&self) -> usize {
        self.config.n_compositional_fields()
    }

    pub fn component_indices(&self) -> &ComponentIndices {
        &self.component_indices
    }

    pub fn block_indices(&self) -> &BlockIndices {
        &self.block_indices
    }

    pub fn components_to_blocks(&self) -> &[usize] {
        &self.components_to_blocks
    }

    pub fn base_elements(&self) -> &BaseElementCatalog {
        &self.base_elements
    }

    /// The numbering of the unknowns within a single cell.
    pub fn system(&self) -> &FiniteElementSystem {
        &self.system
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Looks up a field by name, e.g. `"fluid velocity"` or the name of a compositional field.
    pub fn variable(&self, name: &str) -> Result<&Variable> {
        self.variables
            .iter()
            .find(|variable| variable.name == name)
            .ok_or_else(|| Error::VariableNotFound(name.to_string()))
    }

    /// Returns the index of the compositional field with the given name.
    pub fn compositional_index_for_name(&self, name: &str) -> Result<usize> {
        self.config
            .compositional_fields
            .iter()
            .position(|field| field.name == name)
            .ok_or_else(|| Error::CompositionNotFound(name.to_string()))
    }

    pub fn name_for_compositional_index(&self, index: usize) -> Result<&str> {
        let fields = &self.config.compositional_fields;
        fields
            .get(index)
            .map(|field| field.name.as_str())
            .ok_or(Error::IndexOutOfBounds {
                what: "compositional fields",
                index,
                len: fields.len(),
            })
    }

    pub fn compositional_name_exists(&self, name: &str) -> bool {
        self.config
            .compositional_fields
            .iter()
            .any(|field| field.name == name)
    }

    /// The distinct base elements used by compositional fields, in declaration order.
    pub fn composition_base_element_indices(&self) -> Vec<usize> {
        self.base_elements
            .indices
            .compositional_fields
            .iter()
            .copied()
            .unique()
            .collect()
    }

    /// The indices of all compositional fields discretized with the given base element.
    pub fn compositional_field_indices_with_base_element(&self, base_element: usize) -> Vec<usize> {
        self.base_elements
            .indices
            .compositional_fields
            .iter()
            .positions(|&b| b == base_element)
            .collect()
    }
}

fn collect_variables(
    config: &FieldConfiguration,
    components: &ComponentIndices,
    blocks: &BlockIndices,
    base_elements: &BaseElementCatalog,
) -> Vec<Variable> {
    let bases = &base_elements.indices;
    let variable = |name: &str, first_component_index, n_components, block_index, base_element_index| Variable {
        name: name.to_string(),
        first_component_index,
        n_components,
        block_index,
        base_element_index,
    };

    let mut variables = vec![variable(
        VELOCITY,
        components.velocities[0],
        config.dim,
        blocks.velocities,
        bases.velocities,
    )];
    if let (Some(c), Some(b), Some(e)) = (&components.melt, &blocks.melt, &bases.melt) {
        variables.push(variable(FLUID_PRESSURE, c.fluid_pressure, 1, b.fluid_pressure, e.fluid_pressure));
        variables.push(variable(
            COMPACTION_PRESSURE,
            c.compaction_pressure,
            1,
            b.compaction_pressure,
            e.compaction_pressure,
        ));
        variables.push(variable(
            FLUID_VELOCITY,
            c.fluid_velocities[0],
            config.dim,
            b.fluid_velocities,
            e.fluid_velocities,
        ));
    }
    variables.push(variable(PRESSURE, components.pressure, 1, blocks.pressure, bases.pressure));
    variables.push(variable(
        TEMPERATURE,
        components.temperature,
        1,
        blocks.temperature,
        bases.temperature,
    ));
    for (field, &component, &block, &base) in izip!(
        &config.compositional_fields,
        &components.compositional_fields,
        &blocks.compositional_fields,
        &bases.compositional_fields
    ) {
        variables.push(variable(&field.name, component, 1, block, base));
    }
    variables
}

/// Splits the compositional fields into chunks that are evaluated together.
///
/// Every maximal run of consecutive fields sharing a base element is split, in declaration
/// order, into chunks of `max_width` fields, except for the last chunk of each run which may
/// be narrower. The chunks exactly tile the compositional fields.
pub fn composition_chunks(layout: &FieldLayout, max_width: usize) -> Result<Vec<CompositionChunk>> {
    if max_width == 0 {
        return Err(Error::InvalidConfiguration(
            "composition chunks must have a positive width".to_string(),
        ));
    }

    let field_bases = &layout.base_elements().indices.compositional_fields;
    let field_components = &layout.component_indices().compositional_fields;
    let mut chunks = Vec::new();
    let runs = (0..field_bases.len()).group_by(|&i| field_bases[i]);
    for (base_element, run) in &runs {
        let run: Vec<usize> = run.collect();
        for fields in run.chunks(max_width) {
            chunks.push(CompositionChunk {
                base_element,
                first_field: fields[0],
                first_component: field_components[fields[0]],
                width: fields.len(),
            });
        }
    }
    Ok(chunks)
}
