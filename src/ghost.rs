//! Map from (facet, layer) pairs of layered interfaces to the elements holding them.
//!
//! Thin shells are represented by `L` layers of facet elements on top of the same facet. A
//! rank assembling an element next to a shell may need the shell element of a facet it does not
//! own. The coordinator knows the mesh-wide enumeration of shell facets and their layers; it
//! builds the full map and sends every rank the entries it owns plus the entries it asked for.
use crate::comm::{Communicator, CommunicatorExt, COORDINATOR};
use crate::error::ConfigurationError;
use crate::region::Region;
use itertools::Itertools;
use log::debug;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

/// Key `facet * layer_count + layer` of a ghost layer element.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GhostKey(u64);

impl GhostKey {
    pub fn new(facet: usize, layer: usize, layer_count: usize) -> Result<Self, ConfigurationError> {
        if layer >= layer_count {
            return Err(ConfigurationError::GhostMap(format!(
                "layer {} of facet {} is out of range for {} layers",
                layer, facet, layer_count
            )));
        }
        (facet as u64)
            .checked_mul(layer_count as u64)
            .and_then(|key| key.checked_add(layer as u64))
            .map(Self)
            .ok_or_else(|| {
                ConfigurationError::GhostMap(format!("key of facet {} with {} layers overflows", facet, layer_count))
            })
    }

    /// Splits the key into facet and layer. `None` if there are no layers.
    pub fn decompose(&self, layer_count: usize) -> Option<(usize, usize)> {
        let l = layer_count as u64;
        if l == 0 {
            return None;
        }
        Some(((self.0 / l) as usize, (self.0 % l) as usize))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GhostEntry {
    /// Global id of the layer element.
    pub element: usize,
    /// Region the element belongs to.
    pub region: usize,
    /// Rank owning the element.
    pub owner: usize,
}

/// One layer element in the coordinator's enumeration of shell facets.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerRecord {
    pub facet: usize,
    pub layer: usize,
    pub element: usize,
    pub region: usize,
    pub owner: usize,
}

/// A facet of the interface sideset, in the mesh-wide enumeration order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidesetFacet {
    pub facet: usize,
    /// Rank owning the facet and its layer elements.
    pub owner: usize,
}

/// The coordinator's view of a layered interface.
///
/// `layer_regions[l]` is the index into `regions` of the region holding layer `l`. Each layer
/// region lists one element per sideset facet, in the order of `facets`.
#[derive(Debug, Copy, Clone)]
pub struct LayerEnumeration<'a> {
    pub facets: &'a [SidesetFacet],
    pub regions: &'a [Region],
    pub layer_regions: &'a [usize],
}

impl<'a> LayerEnumeration<'a> {
    pub fn layer_count(&self) -> usize {
        self.layer_regions.len()
    }

    /// Walks every layer region alongside the facet enumeration.
    ///
    /// Records are produced facet by facet, with the layers of a facet in order. The `i`-th
    /// element of every layer region must be attached to the `i`-th sideset facet.
    pub fn records(&self) -> Result<Vec<LayerRecord>, ConfigurationError> {
        if self.layer_regions.is_empty() && !self.facets.is_empty() {
            return Err(ConfigurationError::GhostMap(
                "a layered interface needs at least one layer region".to_string(),
            ));
        }

        let mut layers = Vec::with_capacity(self.layer_regions.len());
        for (layer, &index) in self.layer_regions.iter().enumerate() {
            let region = self.regions.get(index).ok_or_else(|| {
                ConfigurationError::GhostMap(format!("layer {} refers to missing region {}", layer, index))
            })?;
            if region.elements.len() != self.facets.len() {
                return Err(ConfigurationError::GhostMap(format!(
                    "layer region '{}' has {} elements, but the sideset has {} facets",
                    region.name,
                    region.elements.len(),
                    self.facets.len()
                )));
            }
            for (element, sideset) in region.elements.iter().zip(self.facets) {
                let coupling = element.facet.ok_or_else(|| {
                    ConfigurationError::GhostMap(format!(
                        "element {} of layer region '{}' is not attached to a facet",
                        element.id, region.name
                    ))
                })?;
                if coupling.facet_id != sideset.facet || coupling.layer != layer {
                    return Err(ConfigurationError::GhostMap(format!(
                        "element {} of region '{}' is attached to layer {} of facet {}, \
                         but the enumeration expects layer {} of facet {} at this position",
                        element.id, region.name, coupling.layer, coupling.facet_id, layer, sideset.facet
                    )));
                }
            }
            layers.push((index, region));
        }

        let mut records = Vec::with_capacity(self.facets.len() * layers.len());
        for (i, sideset) in self.facets.iter().enumerate() {
            for (layer, &(index, region)) in layers.iter().enumerate() {
                records.push(LayerRecord {
                    facet: sideset.facet,
                    layer,
                    element: region.elements[i].id,
                    region: index,
                    owner: sideset.owner,
                });
            }
        }
        Ok(records)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct GhostElementMap {
    layer_count: usize,
    entries: FxHashMap<GhostKey, GhostEntry>,
}

/// Outcome of the coordinator's construction, shared with every rank.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BuildStatus {
    layer_count: usize,
    error: Option<String>,
}

impl GhostElementMap {
    /// Builds the complete map from the enumeration of layer elements.
    ///
    /// Records must list the layers `0..layer_count` of each facet consecutively and in order,
    /// and every facet exactly once.
    pub fn from_records(records: &[LayerRecord], layer_count: usize) -> Result<Self, ConfigurationError> {
        if layer_count == 0 && !records.is_empty() {
            return Err(ConfigurationError::GhostMap("layer count must be positive".to_string()));
        }
        let mut entries = FxHashMap::default();
        entries.reserve(records.len());
        let mut current_facet = None;
        let mut expected_layer = 0;

        for record in records {
            if record.layer != expected_layer {
                return Err(ConfigurationError::GhostMap(format!(
                    "expected layer {} but found layer {} of facet {}",
                    expected_layer, record.layer, record.facet
                )));
            }
            if record.layer > 0 && current_facet != Some(record.facet) {
                return Err(ConfigurationError::GhostMap(format!(
                    "layer {} of facet {} does not follow the previous layers of the same facet",
                    record.layer, record.facet
                )));
            }
            current_facet = Some(record.facet);
            expected_layer = (record.layer + 1) % layer_count;

            let key = GhostKey::new(record.facet, record.layer, layer_count)?;
            let entry = GhostEntry {
                element: record.element,
                region: record.region,
                owner: record.owner,
            };
            if entries.insert(key, entry).is_some() {
                return Err(ConfigurationError::GhostMap(format!(
                    "layer {} of facet {} appears more than once",
                    record.layer, record.facet
                )));
            }
        }
        if expected_layer != 0 {
            return Err(ConfigurationError::GhostMap(format!(
                "facet {:?} has only {} of {} layers",
                current_facet, expected_layer, layer_count
            )));
        }
        Ok(Self { layer_count, entries })
    }

    /// Builds the map collectively.
    ///
    /// The coordinator passes its enumeration of the layered interface; other ranks pass
    /// `None`. Every rank passes the facets it needs to resolve. On return, each rank holds the
    /// entries it owns and the entries it requested. If the layer regions do not match the
    /// facet enumeration, or the enumeration violates the ordering or uniqueness requirements,
    /// every rank returns the same error.
    pub fn construct<C: Communicator>(
        comm: &C,
        enumeration: Option<LayerEnumeration<'_>>,
        requested_facets: &[usize],
    ) -> eyre::Result<Self> {
        comm.barrier();
        let requests = comm.gather(COORDINATOR, requested_facets.to_vec())?;

        let (outcome, status) = if let Some(requests) = requests {
            let enumeration =
                enumeration.ok_or_else(|| eyre::eyre!("the coordinator must provide the layer enumeration"))?;
            let layer_count = enumeration.layer_count();
            let outcome = enumeration
                .records()
                .and_then(|records| Self::from_records(&records, layer_count))
                .map(|map| (map, requests));
            let status = BuildStatus {
                layer_count,
                error: outcome.as_ref().err().map(|error| error.to_string()),
            };
            (Some(outcome), Some(status))
        } else {
            (None, None)
        };
        let status = comm.broadcast(COORDINATOR, status)?;
        if let Some(message) = status.error {
            return Err(ConfigurationError::GhostMap(message).into());
        }

        let subsets = match outcome {
            Some(Ok((map, requests))) => Some(map.partition(comm.size(), &requests)),
            _ => None,
        };
        let subset: Vec<(GhostKey, GhostEntry)> = comm.scatter(COORDINATOR, subsets)?;
        comm.barrier();

        debug!(
            "Rank {} holds {} ghost map entries ({} layers)",
            comm.rank(),
            subset.len(),
            status.layer_count
        );
        Ok(Self {
            layer_count: status.layer_count,
            entries: subset.into_iter().collect(),
        })
    }

    /// Splits the entries by rank: each rank gets the entries it owns and those it requested.
    fn partition(&self, size: usize, requests: &[Vec<usize>]) -> Vec<Vec<(GhostKey, GhostEntry)>> {
        let requested: Vec<FxHashSet<usize>> = requests.iter().map(|facets| facets.iter().copied().collect()).collect();
        let mut subsets = vec![Vec::new(); size];
        for key in self.entries.keys().copied().sorted_unstable() {
            let entry = self.entries[&key];
            let Some((facet, _)) = key.decompose(self.layer_count) else {
                continue;
            };
            for (rank, subset) in subsets.iter_mut().enumerate() {
                if entry.owner == rank || requested.get(rank).map_or(false, |facets| facets.contains(&facet)) {
                    subset.push((key, entry));
                }
            }
        }
        subsets
    }

    pub fn layer_count(&self) -> usize {
        self.layer_count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: GhostKey) -> Option<&GhostEntry> {
        self.entries.get(&key)
    }

    /// Looks up the element holding the given layer of a facet.
    pub fn resolve(&self, facet: usize, layer: usize) -> Option<&GhostEntry> {
        let key = GhostKey::new(facet, layer, self.layer_count).ok()?;
        self.entries.get(&key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (GhostKey, &GhostEntry)> {
        self.entries.iter().map(|(key, entry)| (*key, entry))
    }
}
