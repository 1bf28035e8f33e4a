/// Source → destinations wiring with one output buffer per destination
use std::collections::{BTreeMap, BTreeSet};
use std::os::fd::RawFd;

/// Directed graph of descriptors.
///
/// A descriptor has a buffer exactly while some source still feeds it.
/// Only the engine that owns the graph mutates it.
#[derive(Debug, Default, Clone)]
pub struct PipingGraph {
    readers_to_writers: BTreeMap<RawFd, BTreeSet<RawFd>>,
    writers_to_readers: BTreeMap<RawFd, BTreeSet<RawFd>>,
    buffers: BTreeMap<RawFd, Vec<u8>>,
}

impl PipingGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from `(source, destinations)` pairs
    pub fn from_edges<I, D>(edges: I) -> Self
    where
        I: IntoIterator<Item = (RawFd, D)>,
        D: IntoIterator<Item = RawFd>,
    {
        let mut graph = Self::new();
        for (source, destinations) in edges {
            for destination in destinations {
                graph.add_edge(source, destination);
            }
        }
        graph
    }

    pub fn add_edge(&mut self, source: RawFd, destination: RawFd) {
        self.readers_to_writers
            .entry(source)
            .or_default()
            .insert(destination);
        self.writers_to_readers
            .entry(destination)
            .or_default()
            .insert(source);
        self.buffers.entry(destination).or_default();
    }

    /// Liveness: the engine runs while this is true
    pub fn has_sources(&self) -> bool {
        !self.readers_to_writers.is_empty()
    }

    pub fn sources(&self) -> impl Iterator<Item = RawFd> + '_ {
        self.readers_to_writers.keys().copied()
    }

    pub fn destinations(&self) -> impl Iterator<Item = RawFd> + '_ {
        self.writers_to_readers.keys().copied()
    }

    pub fn is_source(&self, fd: RawFd) -> bool {
        self.readers_to_writers.contains_key(&fd)
    }

    pub fn is_destination(&self, fd: RawFd) -> bool {
        self.writers_to_readers.contains_key(&fd)
    }

    pub fn destinations_of(&self, source: RawFd) -> Vec<RawFd> {
        self.readers_to_writers
            .get(&source)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Append a chunk read from `source` to every destination it feeds
    pub fn enqueue(&mut self, source: RawFd, data: &[u8]) {
        let Some(destinations) = self.readers_to_writers.get(&source) else {
            return;
        };
        for destination in destinations {
            if let Some(buffer) = self.buffers.get_mut(destination) {
                buffer.extend_from_slice(data);
            }
        }
    }

    pub fn pending(&self, destination: RawFd) -> &[u8] {
        self.buffers
            .get(&destination)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn has_pending(&self, destination: RawFd) -> bool {
        !self.pending(destination).is_empty()
    }

    /// Drop the first `written` bytes of a destination buffer after a (partial) write
    pub fn consume(&mut self, destination: RawFd, written: usize) {
        if let Some(buffer) = self.buffers.get_mut(&destination) {
            let written = written.min(buffer.len());
            buffer.drain(..written);
        }
    }

    /// Deregister `fd` as a source.
    ///
    /// Returns the destinations left without any writer, together with the
    /// bytes still queued for them; those descriptors are no longer part of
    /// the graph. Sources that end up with no destination are pruned too.
    pub fn remove_source(&mut self, fd: RawFd) -> Vec<(RawFd, Vec<u8>)> {
        let mut orphaned = Vec::new();
        let Some(destinations) = self.readers_to_writers.remove(&fd) else {
            return orphaned;
        };
        for destination in destinations {
            let now_unfed = match self.writers_to_readers.get_mut(&destination) {
                Some(readers) => {
                    readers.remove(&fd);
                    readers.is_empty()
                }
                None => false,
            };
            if now_unfed {
                self.writers_to_readers.remove(&destination);
                let pending = self.buffers.remove(&destination).unwrap_or_default();
                orphaned.push((destination, pending));
            }
        }
        orphaned
    }

    /// Deregister `fd` as a destination, discarding whatever was queued for it.
    ///
    /// Returns the sources that no longer feed anything; they were pruned.
    pub fn remove_destination(&mut self, fd: RawFd) -> Vec<RawFd> {
        let mut pruned = Vec::new();
        self.buffers.remove(&fd);
        let Some(sources) = self.writers_to_readers.remove(&fd) else {
            return pruned;
        };
        for source in sources {
            let now_idle = match self.readers_to_writers.get_mut(&source) {
                Some(writers) => {
                    writers.remove(&fd);
                    writers.is_empty()
                }
                None => false,
            };
            if now_idle {
                self.readers_to_writers.remove(&source);
                pruned.push(source);
            }
        }
        pruned
    }

    /// Drain every buffer (used once the engine has stopped reading)
    pub fn take_pending(&mut self) -> Vec<(RawFd, Vec<u8>)> {
        self.buffers
            .iter_mut()
            .filter(|(_, buffer)| !buffer.is_empty())
            .map(|(fd, buffer)| (*fd, std::mem::take(buffer)))
            .collect()
    }

    #[cfg(test)]
    fn buffer_keys(&self) -> Vec<RawFd> {
        self.buffers.keys().copied().collect()
    }
}
