//! fenris-comm
//! ===========
//!
//! Blocking message passing between the ranks of an SPMD program.
//!
//! The [`Communicator`] trait is the minimal set of primitives the assembly engine consumes:
//! rank queries, a barrier and blocking byte-level point-to-point messages. Typed messages,
//! broadcasts and gathers are layered on top in [`CommunicatorExt`], so that every backend
//! only needs to move bytes.
//!
//! Two backends are always available:
//!
//! - [`SerialCommunicator`], a single rank that talks to nobody.
//! - [`ThreadCommunicator`], a group of ranks living in the same process, one per thread,
//!   connected by channels. This is what tests use to exercise multi-rank protocols.
//!
//! With the `mpi` feature enabled, [`Communicator`] is also implemented for
//! `mpi::topology::SimpleCommunicator`.

use eyre::{eyre, WrapErr};
use serde::de::DeserializeOwned;
use serde::Serialize;

mod thread;

#[cfg(feature = "mpi")]
mod mpi_backend;

pub use thread::ThreadCommunicator;

/// The rank that performs all I/O and all "decide once, tell everyone" logic.
pub const COORDINATOR: usize = 0;

/// Blocking point-to-point communication between the ranks of a group.
///
/// All operations block until they complete. A receive that is never matched by a send
/// blocks forever: there are no timeouts.
pub trait Communicator {
    /// The rank of the calling process within the group.
    fn rank(&self) -> usize;

    /// The number of ranks in the group.
    fn size(&self) -> usize;

    /// Blocks until every rank in the group has entered the barrier.
    fn barrier(&self);

    /// Sends a message to the given rank.
    ///
    /// # Panics
    ///
    /// Implementations panic if `destination` is not a valid rank or if the destination
    /// rank has shut down.
    fn send_bytes(&self, destination: usize, payload: Vec<u8>);

    /// Receives the next message sent by the given rank.
    ///
    /// Messages between a given pair of ranks are delivered in the order they were sent.
    fn receive_bytes(&self, source: usize) -> Vec<u8>;

    fn is_coordinator(&self) -> bool {
        self.rank() == COORDINATOR
    }
}

/// Typed messaging built on top of [`Communicator`].
///
/// Values are serialized with `serde_json`. Floating-point values round-trip exactly.
pub trait CommunicatorExt: Communicator {
    fn send<T: Serialize + ?Sized>(&self, destination: usize, value: &T) -> eyre::Result<()> {
        let payload = serde_json::to_vec(value)
            .wrap_err_with(|| format!("failed to encode message for rank {destination}"))?;
        self.send_bytes(destination, payload);
        Ok(())
    }

    /// Sends the same value to every rank in the list.
    fn send_to_many<T: Serialize + ?Sized>(&self, destinations: &[usize], value: &T) -> eyre::Result<()> {
        let payload = serde_json::to_vec(value).wrap_err("failed to encode message")?;
        for &destination in destinations {
            self.send_bytes(destination, payload.clone());
        }
        Ok(())
    }

    fn receive<T: DeserializeOwned>(&self, source: usize) -> eyre::Result<T> {
        let payload = self.receive_bytes(source);
        serde_json::from_slice(&payload)
            .wrap_err_with(|| format!("failed to decode message received from rank {source}"))
    }

    /// Distributes a value from `root` to every rank.
    ///
    /// The root must pass `Some(value)`, all other ranks pass `None`. Every rank returns the
    /// root's value.
    fn broadcast<T>(&self, root: usize, value: Option<T>) -> eyre::Result<T>
    where
        T: Serialize + DeserializeOwned,
    {
        if self.rank() == root {
            let value = value.ok_or_else(|| eyre!("broadcast root {root} did not provide a value"))?;
            let others: Vec<_> = (0..self.size()).filter(|&r| r != root).collect();
            self.send_to_many(&others, &value)?;
            Ok(value)
        } else {
            self.receive(root)
        }
    }

    /// Collects one value from every rank on `root`.
    ///
    /// The root returns `Some(values)` ordered by rank, every other rank returns `None`.
    fn gather<T>(&self, root: usize, value: T) -> eyre::Result<Option<Vec<T>>>
    where
        T: Serialize + DeserializeOwned,
    {
        if self.rank() == root {
            let mut values = Vec::with_capacity(self.size());
            for source in 0..root {
                values.push(self.receive(source)?);
            }
            values.push(value);
            for source in (root + 1)..self.size() {
                values.push(self.receive(source)?);
            }
            Ok(Some(values))
        } else {
            self.send(root, &value)?;
            Ok(None)
        }
    }

    /// Sends the `r`-th value to rank `r` from `root`.
    ///
    /// The root must pass exactly one value per rank. Every rank returns its own value.
    fn scatter<T>(&self, root: usize, values: Option<Vec<T>>) -> eyre::Result<T>
    where
        T: Serialize + DeserializeOwned,
    {
        if self.rank() == root {
            let values = values.ok_or_else(|| eyre!("scatter root {root} did not provide values"))?;
            if values.len() != self.size() {
                return Err(eyre!(
                    "scatter expects {} values, got {}",
                    self.size(),
                    values.len()
                ));
            }
            let mut own = None;
            for (destination, value) in values.into_iter().enumerate() {
                if destination == root {
                    own = Some(value);
                } else {
                    self.send(destination, &value)?;
                }
            }
            own.ok_or_else(|| eyre!("scatter root {root} is not part of the group"))
        } else {
            self.receive(root)
        }
    }
}

impl<C: Communicator + ?Sized> CommunicatorExt for C {}

/// A group consisting of a single rank.
///
/// Collective operations degenerate to no-ops. Point-to-point messages have nobody to go to,
/// so sending or receiving panics.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialCommunicator;

impl Communicator for SerialCommunicator {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn barrier(&self) {}

    fn send_bytes(&self, destination: usize, _payload: Vec<u8>) {
        panic!("SerialCommunicator cannot send to rank {destination}");
    }

    fn receive_bytes(&self, source: usize) -> Vec<u8> {
        panic!("SerialCommunicator cannot receive from rank {source}");
    }
}
