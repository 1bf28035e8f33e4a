/// Byte forwarding between the client socket and the PTY master
mod bridge;
mod engine;
mod graph;

pub use bridge::{Bridge, PtyResizer};
pub use engine::{CHUNK_SIZE, ControlHandler, Piping, PipingError};
pub use graph::PipingGraph;
