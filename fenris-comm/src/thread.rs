use crate::Communicator;
use std::fmt;
use std::fmt::{Debug, Formatter};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Barrier};

/// One rank of an in-process group whose ranks run on separate threads.
///
/// Every ordered pair of ranks is connected by its own channel, which gives the same
/// per-pair FIFO guarantee as MPI point-to-point messages. Sends never block; receives block
/// until a matching message arrives.
///
/// ```
/// use fenris_comm::{Communicator, CommunicatorExt, ThreadCommunicator};
///
/// let ranks = ThreadCommunicator::create_group(2);
/// std::thread::scope(|scope| {
///     for comm in ranks {
///         scope.spawn(move || {
///             let value = comm.broadcast(0, (comm.rank() == 0).then_some(42_u32)).unwrap();
///             assert_eq!(value, 42);
///         });
///     }
/// });
/// ```
pub struct ThreadCommunicator {
    rank: usize,
    // Indexed by destination rank
    outgoing: Vec<Sender<Vec<u8>>>,
    // Indexed by source rank
    incoming: Vec<Receiver<Vec<u8>>>,
    barrier: Arc<Barrier>,
}

impl Debug for ThreadCommunicator {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadCommunicator")
            .field("rank", &self.rank)
            .field("size", &self.outgoing.len())
            .finish()
    }
}

impl ThreadCommunicator {
    /// Creates the communicators of a group with the given number of ranks.
    ///
    /// The returned vector is ordered by rank. Each communicator is meant to be moved into
    /// its own thread.
    pub fn create_group(size: usize) -> Vec<Self> {
        assert!(size > 0, "a communicator group needs at least one rank");
        let barrier = Arc::new(Barrier::new(size));

        // Channel (source, destination) carries messages from source to destination
        let (outgoing, by_source): (Vec<Vec<Sender<Vec<u8>>>>, Vec<Vec<Receiver<Vec<u8>>>>) =
            (0..size)
                .map(|_| (0..size).map(|_| channel()).unzip::<_, _, Vec<_>, Vec<_>>())
                .unzip();
        let mut incoming: Vec<Vec<Receiver<Vec<u8>>>> = (0..size).map(|_| Vec::with_capacity(size)).collect();
        for receivers in by_source {
            for (destination, receiver) in receivers.into_iter().enumerate() {
                incoming[destination].push(receiver);
            }
        }

        outgoing
            .into_iter()
            .zip(incoming)
            .enumerate()
            .map(|(rank, (outgoing, incoming))| Self {
                rank,
                outgoing,
                incoming,
                barrier: Arc::clone(&barrier),
            })
            .collect()
    }
}

impl Communicator for ThreadCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.outgoing.len()
    }

    fn barrier(&self) {
        self.barrier.wait();
    }

    fn send_bytes(&self, destination: usize, payload: Vec<u8>) {
        let sender = self
            .outgoing
            .get(destination)
            .unwrap_or_else(|| panic!("rank {destination} is not part of a group of size {}", self.size()));
        sender
            .send(payload)
            .unwrap_or_else(|_| panic!("rank {destination} has shut down, rank {} cannot send to it", self.rank));
    }

    fn receive_bytes(&self, source: usize) -> Vec<u8> {
        let receiver = self
            .incoming
            .get(source)
            .unwrap_or_else(|| panic!("rank {source} is not part of a group of size {}", self.size()));
        receiver
            .recv()
            .unwrap_or_else(|_| panic!("rank {source} has shut down, rank {} cannot receive from it", self.rank))
    }
}
