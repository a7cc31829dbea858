//! Saving and restoring the simulation state.
//!
//! The coordinator performs all file I/O. A checkpoint is a JSON document with three groups:
//! the mesh identity, the time metadata and the declared fields.
//!
//! Loading is a two-phase protocol. The coordinator reads the artifact and decides whether it
//! matches the running model; the decision is broadcast, and only if it is positive are the
//! time metadata and fields broadcast and applied on every rank. Either every rank restores the
//! checkpoint or none does.
use crate::comm::{Communicator, CommunicatorExt, COORDINATOR};
use crate::mesh::MeshIdentity;
use eyre::WrapErr;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Version of the artifact layout written by [`save`].
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TimeMetadata {
    pub timestamp: f64,
    pub step: u64,
    /// Index of the outer (e.g. coupling) loop the checkpoint was taken in.
    pub loop_index: u64,
}

/// The restorable state of a simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationState {
    pub mesh: MeshIdentity,
    pub time: TimeMetadata,
    /// Declared fields by name.
    pub fields: BTreeMap<String, Vec<f64>>,
}

impl SimulationState {
    pub fn new(mesh: MeshIdentity) -> Self {
        Self {
            mesh,
            time: TimeMetadata::default(),
            fields: BTreeMap::new(),
        }
    }

    /// Declares a field. Loading a checkpoint requires every declared field to be present.
    pub fn declare_field(&mut self, name: impl Into<String>, values: Vec<f64>) {
        self.fields.insert(name.into(), values);
    }

    pub fn field(&self, name: &str) -> Option<&[f64]> {
        self.fields.get(name).map(Vec::as_slice)
    }
}

/// The on-disk artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointArtifact {
    pub version: u32,
    pub mesh: MeshIdentity,
    pub time: TimeMetadata,
    pub fields: BTreeMap<String, Vec<f64>>,
}

impl CheckpointArtifact {
    pub fn from_state(state: &SimulationState) -> Self {
        Self {
            version: FORMAT_VERSION,
            mesh: state.mesh,
            time: state.time,
            fields: state.fields.clone(),
        }
    }

    pub fn read(path: &Path) -> eyre::Result<Self> {
        let file = File::open(path).wrap_err_with(|| format!("failed to open checkpoint {}", path.display()))?;
        serde_json::from_reader(BufReader::new(file))
            .wrap_err_with(|| format!("failed to parse checkpoint {}", path.display()))
    }

    /// Checks that every stored value is finite.
    ///
    /// JSON has no representation for NaN or infinities, so such values could not be read back.
    pub fn ensure_finite(&self) -> eyre::Result<()> {
        if !self.time.timestamp.is_finite() {
            eyre::bail!("timestamp {} is not finite", self.time.timestamp);
        }
        for (name, values) in &self.fields {
            if let Some((index, value)) = values.iter().enumerate().find(|(_, value)| !value.is_finite()) {
                eyre::bail!("field '{}' has the non-finite value {} at index {}", name, value, index);
            }
        }
        Ok(())
    }

    /// Writes to a temporary file next to `path` and renames it into place.
    ///
    /// Nothing is written if the artifact holds non-finite values.
    pub fn write_atomically(&self, path: &Path) -> eyre::Result<()> {
        self.ensure_finite()?;
        let temporary = temporary_path(path);
        {
            let file = File::create(&temporary)
                .wrap_err_with(|| format!("failed to create {}", temporary.display()))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, self).wrap_err("failed to serialize checkpoint")?;
            writer.flush()?;
            writer
                .get_ref()
                .sync_all()
                .wrap_err_with(|| format!("failed to sync {}", temporary.display()))?;
        }
        fs::rename(&temporary, path)
            .wrap_err_with(|| format!("failed to move checkpoint into place at {}", path.display()))
    }
}

fn temporary_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|name| name.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Whether an artifact can be restored into the running model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compatibility {
    Compatible,
    Incompatible(String),
}

impl Compatibility {
    pub fn is_compatible(&self) -> bool {
        matches!(self, Self::Compatible)
    }
}

/// Outcome of [`load`], identical on every rank.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadStatus {
    Loaded,
    Incompatible,
}

impl LoadStatus {
    /// Status code for drivers: zero on success.
    pub fn code(&self) -> i32 {
        match self {
            Self::Loaded => 0,
            Self::Incompatible => 1,
        }
    }
}

/// Checks an artifact against the running model.
///
/// The artifact must have the current format version and the same mesh identity, and contain
/// every declared field with the declared length. Additional fields in the artifact are ignored.
pub fn check_compatibility(artifact: &CheckpointArtifact, state: &SimulationState) -> Compatibility {
    if artifact.version != FORMAT_VERSION {
        return Compatibility::Incompatible(format!(
            "format version {} is not supported (expected {})",
            artifact.version, FORMAT_VERSION
        ));
    }
    if artifact.mesh != state.mesh {
        return Compatibility::Incompatible(format!(
            "checkpoint mesh {:?} does not match the model mesh {:?}",
            artifact.mesh, state.mesh
        ));
    }
    for (name, values) in &state.fields {
        match artifact.fields.get(name) {
            None => return Compatibility::Incompatible(format!("field '{}' is missing", name)),
            Some(stored) if stored.len() != values.len() => {
                return Compatibility::Incompatible(format!(
                    "field '{}' has {} values, expected {}",
                    name,
                    stored.len(),
                    values.len()
                ))
            }
            Some(_) => {}
        }
    }
    Compatibility::Compatible
}

/// Saves the state. Only the coordinator's state is written.
///
/// All ranks return the coordinator's outcome. States with non-finite values are rejected and
/// leave any existing checkpoint at `path` in place.
pub fn save<C: Communicator>(comm: &C, path: impl AsRef<Path>, state: &SimulationState) -> eyre::Result<()> {
    let path = path.as_ref();
    let outcome = if comm.is_coordinator() {
        let result = CheckpointArtifact::from_state(state).write_atomically(path);
        match &result {
            Ok(()) => info!(
                "Saved checkpoint of step {} (t = {}) to {}",
                state.time.step,
                state.time.timestamp,
                path.display()
            ),
            Err(error) => warn!("Failed to save checkpoint to {}: {:#}", path.display(), error),
        }
        Some(result.err().map(|error| format!("{:#}", error)))
    } else {
        None
    };
    comm.barrier();
    match comm.broadcast(COORDINATOR, outcome)? {
        None => Ok(()),
        Some(message) => Err(eyre::eyre!("checkpoint save failed on the coordinator: {}", message)),
    }
}

/// Restores the state from a checkpoint if it matches the running model.
///
/// Unreadable or malformed artifacts are treated as incompatible. An incompatible checkpoint
/// leaves the state untouched on every rank.
pub fn load<C: Communicator>(
    comm: &C,
    path: impl AsRef<Path>,
    state: &mut SimulationState,
) -> eyre::Result<LoadStatus> {
    let path = path.as_ref();
    let artifact = if comm.is_coordinator() {
        let decision = CheckpointArtifact::read(path).map(|artifact| {
            let compatibility = check_compatibility(&artifact, state);
            (artifact, compatibility)
        });
        match decision {
            Ok((artifact, Compatibility::Compatible)) => Some(artifact),
            Ok((_, Compatibility::Incompatible(reason))) => {
                warn!("Rejecting checkpoint {}: {}", path.display(), reason);
                None
            }
            Err(error) => {
                warn!("Rejecting checkpoint {}: {:#}", path.display(), error);
                None
            }
        }
    } else {
        None
    };

    comm.barrier();
    let flag = comm.is_coordinator().then(|| artifact.is_some());
    if !comm.broadcast(COORDINATOR, flag)? {
        return Ok(LoadStatus::Incompatible);
    }

    let payload = artifact.map(|artifact| (artifact.time, artifact.fields));
    let (time, mut fields): (TimeMetadata, BTreeMap<String, Vec<f64>>) = comm.broadcast(COORDINATOR, payload)?;
    state.time = time;
    for (name, values) in state.fields.iter_mut() {
        if let Some(stored) = fields.remove(name) {
            *values = stored;
        }
    }
    info!("Loaded checkpoint of step {} (t = {})", time.step, time.timestamp);
    Ok(LoadStatus::Loaded)
}
