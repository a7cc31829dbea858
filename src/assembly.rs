//! Region linking, element evaluation and assembly of the global time-stepping system.
//!
//! The engine holds the regions of the local partition. Each region is linked once before
//! assembly: linking checks the region against the supported combinations of classification
//! and geometry, selects a kernel, caches the quadrature rule and allocates scratch buffers.
//! Assembly then walks all elements and scatters the θ-scheme contributions
//!
//! ```text
//! J = M / Δt + θ K(uᵏ),    r = M / Δt uⁿ - (1 - θ) K(uᵏ) uⁿ + f
//! ```
//!
//! into a global COO matrix and right-hand side.
use crate::basis::BasisProvider;
use crate::classification::PhysicalDomain;
use crate::config::EngineConfig;
use crate::dofs::{DofLayout, DofNumbering};
use crate::error::ConfigurationError;
use crate::kernel::scratch::{LocalSystem, ScratchBuffers};
use crate::kernel::{check_supported, select_kernel, KernelContext, RegionKernel};
use crate::mesh::{ElementRef, MeshElement};
use crate::region::{Region, RegionLink};
use eyre::eyre;
use log::{debug, info};
use nalgebra::DVector;
use nalgebra_sparse::CooMatrix;

/// Global field values the kernels are evaluated at.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldState {
    /// Current nonlinear iterate `uᵏ`.
    pub current: DVector<f64>,
    /// Solution of the previous time step `uⁿ`.
    pub previous: DVector<f64>,
    /// Nodal temperatures indexed by global node id. May be empty if no law depends on it.
    pub temperature: DVector<f64>,
}

impl FieldState {
    /// Zero fields of the given size and no temperature.
    pub fn zeros(dof_count: usize) -> Self {
        Self {
            current: DVector::zeros(dof_count),
            previous: DVector::zeros(dof_count),
            temperature: DVector::zeros(0),
        }
    }

    pub fn with_temperature(mut self, temperature: DVector<f64>) -> Self {
        self.temperature = temperature;
        self
    }
}

/// The linearized system of one time step (or nonlinear iteration).
#[derive(Debug, Clone)]
pub struct AssembledSystem {
    pub jacobian: CooMatrix<f64>,
    pub rhs: DVector<f64>,
}

/// Global operators of a single region.
#[derive(Debug, Clone)]
pub struct RegionOperators {
    pub mass: CooMatrix<f64>,
    pub stiffness: CooMatrix<f64>,
    pub load: DVector<f64>,
}

#[derive(Debug)]
pub struct AssemblyEngine<B> {
    basis: B,
    config: EngineConfig,
    mesh_dim: usize,
    numbering: DofNumbering,
    regions: Vec<Region>,
}

/// Gathers the entries of a global vector at the given indices.
fn gather_global_to_local(global: &DVector<f64>, indices: &[usize], local: &mut DVector<f64>) -> eyre::Result<()> {
    if indices.len() != local.len() {
        return Err(eyre!("cannot gather {} DOFs into a local vector of length {}", indices.len(), local.len()));
    }
    for (value, &index) in local.iter_mut().zip(indices) {
        *value = *global
            .get(index)
            .ok_or_else(|| eyre!("DOF {} out of bounds for a global vector of length {}", index, global.len()))?;
    }
    Ok(())
}

fn scatter_matrix(coo: &mut CooMatrix<f64>, dofs: &[usize], local: impl Fn(usize, usize) -> f64) {
    for (i, &row) in dofs.iter().enumerate() {
        for (j, &col) in dofs.iter().enumerate() {
            let value = local(i, j);
            if value != 0.0 {
                coo.push(row, col, value);
            }
        }
    }
}

impl<B: BasisProvider> AssemblyEngine<B> {
    pub fn new(basis: B, config: EngineConfig, mesh_dim: usize, numbering: DofNumbering) -> eyre::Result<Self> {
        config.validate()?;
        if numbering.multiplicity() != &config.multiplicity {
            return Err(ConfigurationError::InvalidConfig(format!(
                "DOF numbering uses multiplicities {:?}, but the configuration declares {:?}",
                numbering.multiplicity(),
                config.multiplicity
            ))
            .into());
        }
        Ok(Self {
            basis,
            config,
            mesh_dim,
            numbering,
            regions: Vec::new(),
        })
    }

    pub fn basis(&self) -> &B {
        &self.basis
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn mesh_dim(&self) -> usize {
        self.mesh_dim
    }

    pub fn numbering(&self) -> &DofNumbering {
        &self.numbering
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn region(&self, index: usize) -> Option<&Region> {
        self.regions.get(index)
    }

    pub fn dof_count(&self) -> usize {
        self.numbering.total()
    }

    /// Adds a region and returns its index. The region must be linked before assembly.
    pub fn add_region(&mut self, region: Region) -> usize {
        self.regions.push(region);
        self.regions.len() - 1
    }

    /// Resolves an element reference to the element.
    pub fn element(&self, reference: ElementRef) -> Option<&MeshElement> {
        self.regions
            .get(reference.region)
            .and_then(|region| region.elements.get(reference.element))
    }

    fn region_index(&self, index: usize) -> eyre::Result<usize> {
        if index < self.regions.len() {
            Ok(index)
        } else {
            Err(eyre!("region index {} out of bounds ({} regions)", index, self.regions.len()))
        }
    }

    /// Changes the classification of a region. The region must be linked again.
    pub fn reclassify_region(&mut self, index: usize, classification: PhysicalDomain) -> eyre::Result<()> {
        let index = self.region_index(index)?;
        let region = &mut self.regions[index];
        region.classification = classification;
        region.link = None;
        Ok(())
    }

    /// Checks that facet elements reference existing bulk elements.
    fn check_facet_references(&self, region: &Region) -> Result<(), ConfigurationError> {
        for element in &region.elements {
            let facet = match element.facet {
                Some(facet) => facet,
                None if region.classification.is_interface() => {
                    return Err(ConfigurationError::MissingFacetCoupling {
                        region: region.name.clone(),
                        element: element.id,
                        classification: region.classification,
                    })
                }
                None => continue,
            };
            let references = std::iter::once(facet.master).chain(facet.slave);
            for reference in references {
                if self.element(reference).is_none() {
                    return Err(ConfigurationError::DanglingElementReference {
                        region: region.name.clone(),
                        target: reference.region,
                        element: reference.element,
                    });
                }
            }
            if region.classification.is_interface() && facet.slave.is_none() {
                return Err(ConfigurationError::MissingFacetCoupling {
                    region: region.name.clone(),
                    element: element.id,
                    classification: region.classification,
                });
            }
        }
        Ok(())
    }

    /// Selects the kernel of a region and allocates its scratch buffers.
    ///
    /// Empty regions are left unlinked and skipped by assembly.
    pub fn link_region(&mut self, index: usize) -> eyre::Result<()> {
        let index = self.region_index(index)?;
        let region = &self.regions[index];
        if region.is_empty() {
            debug!("Region '{}' has no elements, leaving it unlinked", region.name);
            return Ok(());
        }
        let kernel = select_kernel(
            &region.name,
            region.classification,
            region.geometry,
            region.material.as_deref(),
            self.mesh_dim,
            &self.config,
        )?;
        self.link_region_with_kernel(index, kernel)
    }

    /// Links a region with the given kernel instead of the one the dispatch table selects.
    ///
    /// The region is still checked against the supported classifications and geometries.
    pub fn link_region_with_kernel(&mut self, index: usize, kernel: Box<dyn RegionKernel>) -> eyre::Result<()> {
        let index = self.region_index(index)?;
        let region = &self.regions[index];
        check_supported(region.classification, region.geometry, self.mesh_dim)?;
        for element in &region.elements {
            element.check_consistency(&region.name)?;
            if element.geometry != region.geometry {
                return Err(eyre!(
                    "element {} of region '{}' is a {} element, but the region declares {}",
                    element.id,
                    region.name,
                    element.geometry,
                    region.geometry
                ));
            }
        }
        self.check_facet_references(region)?;

        let layout = DofLayout::for_region(
            &region.name,
            region.classification,
            region.geometry,
            &self.config.multiplicity,
            self.config.interface_coupling,
        )?;
        let scratch = ScratchBuffers::allocate(region.classification, region.geometry, &layout)?;
        let quadrature = self.basis.quadrature(region.geometry)?.clone();
        let curved = region
            .elements
            .first()
            .map(|element| self.basis.is_curved(element))
            .unwrap_or(false);

        info!(
            "Linked region '{}' ({:?}, {} elements of type {}) with kernel '{}'",
            region.name,
            region.classification,
            region.elements.len(),
            region.geometry,
            kernel.name()
        );
        debug!(
            "Region '{}': {} scratch, layout {:?}, {} quadrature points, curved: {}",
            region.name,
            scratch.layout_name(),
            layout,
            quadrature.len(),
            curved
        );

        self.regions[index].link = Some(RegionLink {
            kernel,
            scratch,
            layout,
            quadrature,
            curved,
        });
        Ok(())
    }

    pub fn link_all(&mut self) -> eyre::Result<()> {
        for index in 0..self.regions.len() {
            self.link_region(index)?;
        }
        Ok(())
    }

    /// Computes the local system of one element.
    ///
    /// The returned system holds the local operators and the global indices of the element's
    /// DOFs. It lives in the region's scratch buffers and is overwritten by the next call.
    pub fn compute_element(&mut self, region: usize, element: usize, state: &FieldState) -> eyre::Result<&LocalSystem> {
        let region = self.region_index(region)?;
        let mut link = self.regions[region].link.take().ok_or_else(|| ConfigurationError::UnlinkedRegion {
            region: self.regions[region].name.clone(),
        })?;
        let result = self.compute_linked_element(&mut link, region, element, state);
        self.regions[region].link = Some(link);
        result?;

        self.regions[region]
            .link
            .as_ref()
            .map(|link| link.scratch.system())
            .ok_or_else(|| eyre!("region link disappeared during element computation"))
    }

    fn compute_linked_element(
        &self,
        link: &mut RegionLink,
        region_index: usize,
        element_index: usize,
        state: &FieldState,
    ) -> eyre::Result<()> {
        let region = &self.regions[region_index];
        let element = region.elements.get(element_index).ok_or_else(|| {
            eyre!(
                "element index {} out of bounds for region '{}' with {} elements",
                element_index,
                region.name,
                region.elements.len()
            )
        })?;
        let master = element
            .facet
            .and_then(|facet| self.element(facet.master));
        let slave = element
            .facet
            .and_then(|facet| facet.slave)
            .and_then(|slave| self.element(slave));

        let system = link.scratch.system_mut();
        let sides = master.zip(slave);
        let count = self.numbering.collect_element_dofs(
            region.classification,
            self.config.interface_coupling,
            element,
            sides,
            &mut system.dofs,
        )?;
        if count == system.len() {
            gather_global_to_local(&state.current, &system.dofs, &mut system.solution)?;
            gather_global_to_local(&state.previous, &system.dofs, &mut system.previous)?;
        }

        let context = KernelContext {
            region: &region.name,
            basis: &self.basis,
            config: &self.config,
            material: region.material.as_deref(),
            parameters: &region.parameters,
            quadrature: &link.quadrature,
            curved: link.curved,
            master,
            slave,
            temperature: state.temperature.as_slice(),
        };
        let written = link.kernel.compute_element(element, &context, &mut link.scratch)?;
        let declared = link.layout.total();
        if written != declared || count != declared {
            return Err(ConfigurationError::DofCountMismatch {
                region: region.name.clone(),
                declared,
                written: if written != declared { written } else { count },
            }
            .into());
        }
        Ok(())
    }

    fn check_linked(&self) -> eyre::Result<()> {
        for region in &self.regions {
            if !region.is_empty() && !region.is_linked() {
                return Err(ConfigurationError::UnlinkedRegion {
                    region: region.name.clone(),
                }
                .into());
            }
        }
        Ok(())
    }

    fn check_state(&self, state: &FieldState) -> eyre::Result<()> {
        let n = self.dof_count();
        if state.current.len() != n || state.previous.len() != n {
            return Err(eyre!(
                "field state has {} current and {} previous values, but the model has {} DOFs",
                state.current.len(),
                state.previous.len(),
                n
            ));
        }
        Ok(())
    }

    /// Assembles the global Jacobian and right-hand side of the θ-scheme.
    pub fn assemble(&mut self, state: &FieldState) -> eyre::Result<AssembledSystem> {
        self.check_linked()?;
        self.check_state(state)?;
        let n = self.dof_count();
        let dt = self.config.time.dt;
        let theta = self.config.time.theta;
        let mut jacobian = CooMatrix::new(n, n);
        let mut rhs = DVector::zeros(n);

        for region in 0..self.regions.len() {
            if !self.regions[region].is_linked() {
                continue;
            }
            for element in 0..self.regions[region].elements.len() {
                let system = self.compute_element(region, element, state)?;
                scatter_matrix(&mut jacobian, &system.dofs, |i, j| {
                    system.mass[(i, j)] / dt + theta * system.stiffness[(i, j)]
                });
                let local_rhs = &system.mass * &system.previous / dt
                    - &system.stiffness * &system.previous * (1.0 - theta)
                    + &system.load;
                for (&dof, value) in system.dofs.iter().zip(local_rhs.iter()) {
                    rhs[dof] += value;
                }
            }
        }
        Ok(AssembledSystem { jacobian, rhs })
    }

    /// Assembles the global mass matrix, stiffness matrix and load vector of a single region.
    pub fn assemble_region_operators(&mut self, region: usize, state: &FieldState) -> eyre::Result<RegionOperators> {
        let region = self.region_index(region)?;
        self.check_state(state)?;
        let n = self.dof_count();
        let mut operators = RegionOperators {
            mass: CooMatrix::new(n, n),
            stiffness: CooMatrix::new(n, n),
            load: DVector::zeros(n),
        };
        let target = &self.regions[region];
        if target.is_empty() {
            return Ok(operators);
        }
        if !target.is_linked() {
            return Err(ConfigurationError::UnlinkedRegion {
                region: target.name.clone(),
            }
            .into());
        }

        for element in 0..self.regions[region].elements.len() {
            let system = self.compute_element(region, element, state)?;
            scatter_matrix(&mut operators.mass, &system.dofs, |i, j| system.mass[(i, j)]);
            scatter_matrix(&mut operators.stiffness, &system.dofs, |i, j| system.stiffness[(i, j)]);
            for (&dof, value) in system.dofs.iter().zip(system.load.iter()) {
                operators.load[dof] += value;
            }
        }
        Ok(operators)
    }
}
