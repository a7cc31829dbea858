use crate::Communicator;
use mpi::collective::CommunicatorCollectives;
use mpi::point_to_point::{Destination, Source};
use mpi::topology::SimpleCommunicator;

impl Communicator for SimpleCommunicator {
    fn rank(&self) -> usize {
        mpi::topology::Communicator::rank(self) as usize
    }

    fn size(&self) -> usize {
        mpi::topology::Communicator::size(self) as usize
    }

    fn barrier(&self) {
        CommunicatorCollectives::barrier(self);
    }

    fn send_bytes(&self, destination: usize, payload: Vec<u8>) {
        let process = mpi::topology::Communicator::process_at_rank(self, destination as i32);
        process.send(&payload[..]);
    }

    fn receive_bytes(&self, source: usize) -> Vec<u8> {
        let process = mpi::topology::Communicator::process_at_rank(self, source as i32);
        let (payload, _status) = process.receive_vec::<u8>();
        payload
    }
}
