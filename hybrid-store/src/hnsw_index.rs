//! HNSW vector index adapter. Persists by snapshotting vectors and the id
//! map; the graph itself is rebuilt on load.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use hnsw_rs::prelude::*;
use serde::{Deserialize, Serialize};

/// Distance function used by the vector index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceKind {
    L2,
    Cosine,
    Dot,
    L1,
}

/// Graph construction parameters, persisted in the index metadata so that
/// reload and compaction rebuild with the same shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HnswConfig {
    pub max_connections: usize,
    pub max_elements: usize,
    pub max_layers: usize,
    pub ef_construction: usize,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            max_connections: 16,
            max_elements: 10_000,
            max_layers: 16,
            ef_construction: 200,
        }
    }
}

/// Internal graph wrapper so the distance type can be picked at runtime.
/// Each variant carries a different generic parameter, so every operation
/// dispatches with an explicit match.
enum Graph {
    L2(Hnsw<'static, f32, DistL2>),
    Cosine(Hnsw<'static, f32, DistCosine>),
    Dot(Hnsw<'static, f32, DistDot>),
    L1(Hnsw<'static, f32, DistL1>),
}

impl Graph {
    fn new(distance: DistanceKind, config: &HnswConfig) -> Self {
        let c = config;
        match distance {
            DistanceKind::L2 => Graph::L2(Hnsw::new(
                c.max_connections,
                c.max_elements,
                c.max_layers,
                c.ef_construction,
                DistL2 {},
            )),
            DistanceKind::Cosine => Graph::Cosine(Hnsw::new(
                c.max_connections,
                c.max_elements,
                c.max_layers,
                c.ef_construction,
                DistCosine {},
            )),
            DistanceKind::Dot => Graph::Dot(Hnsw::new(
                c.max_connections,
                c.max_elements,
                c.max_layers,
                c.ef_construction,
                DistDot {},
            )),
            DistanceKind::L1 => Graph::L1(Hnsw::new(
                c.max_connections,
                c.max_elements,
                c.max_layers,
                c.ef_construction,
                DistL1 {},
            )),
        }
    }

    fn insert(&self, data: (&[f32], usize)) {
        match self {
            Graph::L2(h) => h.insert(data),
            Graph::Cosine(h) => h.insert(data),
            Graph::Dot(h) => h.insert(data),
            Graph::L1(h) => h.insert(data),
        }
    }

    fn parallel_insert(&self, data: &[(&Vec<f32>, usize)]) {
        match self {
            Graph::L2(h) => h.parallel_insert(data),
            Graph::Cosine(h) => h.parallel_insert(data),
            Graph::Dot(h) => h.parallel_insert(data),
            Graph::L1(h) => h.parallel_insert(data),
        }
    }

    fn search(&self, query: &[f32], k: usize, ef: usize) -> Vec<Neighbour> {
        match self {
            Graph::L2(h) => h.search(query, k, ef),
            Graph::Cosine(h) => h.search(query, k, ef),
            Graph::Dot(h) => h.search(query, k, ef),
            Graph::L1(h) => h.search(query, k, ef),
        }
    }

    fn set_searching_mode(&mut self, on: bool) {
        match self {
            Graph::L2(h) => h.set_searching_mode(on),
            Graph::Cosine(h) => h.set_searching_mode(on),
            Graph::Dot(h) => h.set_searching_mode(on),
            Graph::L1(h) => h.set_searching_mode(on),
        }
    }
}

/// HNSW index keyed by the hybrid index's internal `u64` doc ids.
///
/// hnsw_rs has no delete, so removals are tombstoned and skipped at search
/// time; `compact` rebuilds the graph from the live rows. Snapshots keep
/// only live rows, so a reloaded index never resurrects deleted ids.
pub struct VectorIndex {
    dimension: usize,
    distance: DistanceKind,
    config: HnswConfig,
    graph: Graph,
    /// doc id -> internal slot; absent for tombstoned ids.
    id_to_slot: HashMap<u64, usize>,
    /// internal slot -> doc id (stale for tombstoned slots).
    slot_to_id: Vec<u64>,
    /// Stored vectors, for snapshots and rebuilds.
    vectors: Vec<Vec<f32>>,
    tombstones: HashSet<usize>,
    searching: bool,
}

impl VectorIndex {
    pub fn new(dimension: usize, distance: DistanceKind, config: HnswConfig) -> Self {
        Self {
            dimension,
            distance,
            config,
            graph: Graph::new(distance, &config),
            id_to_slot: HashMap::new(),
            slot_to_id: Vec::new(),
            vectors: Vec::new(),
            tombstones: HashSet::new(),
            searching: false,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of live (non-tombstoned) ids.
    pub fn len(&self) -> usize {
        self.id_to_slot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_slot.is_empty()
    }

    fn ensure_mutable(&mut self) {
        if self.searching {
            self.graph.set_searching_mode(false);
            self.searching = false;
        }
    }

    /// Toggle the engine's searching-mode optimization. Mutations clear it
    /// automatically.
    pub fn set_searching_mode(&mut self, on: bool) {
        if self.searching != on {
            self.graph.set_searching_mode(on);
            self.searching = on;
        }
    }

    /// Insert one vector. Reinserting an existing id replaces its vector in
    /// the snapshot; the graph keeps the old point under the same slot, so
    /// heavy churn warrants a `compact`.
    pub fn insert(&mut self, vector: &[f32], id: u64) {
        debug_assert_eq!(vector.len(), self.dimension);
        self.ensure_mutable();
        let slot = self.slot_for(id, vector.to_vec());
        self.graph.insert((vector, slot));
    }

    /// Batch insert through the engine's parallel path.
    pub fn insert_batch(&mut self, items: &[(u64, Vec<f32>)]) {
        if items.is_empty() {
            return;
        }
        self.ensure_mutable();
        let mut slots = Vec::with_capacity(items.len());
        for (id, vector) in items {
            slots.push(self.slot_for(*id, vector.clone()));
        }
        let batch: Vec<(&Vec<f32>, usize)> = items
            .iter()
            .zip(slots)
            .map(|((_, v), slot)| (v, slot))
            .collect();
        self.graph.parallel_insert(&batch);
    }

    fn slot_for(&mut self, id: u64, vector: Vec<f32>) -> usize {
        if let Some(&slot) = self.id_to_slot.get(&id) {
            self.vectors[slot] = vector;
            self.tombstones.remove(&slot);
            slot
        } else {
            let slot = self.slot_to_id.len();
            self.id_to_slot.insert(id, slot);
            self.slot_to_id.push(id);
            self.vectors.push(vector);
            slot
        }
    }

    /// Tombstone one id. Unknown ids are ignored.
    pub fn delete(&mut self, id: u64) {
        if let Some(slot) = self.id_to_slot.remove(&id) {
            self.tombstones.insert(slot);
        }
    }

    pub fn delete_batch(&mut self, ids: &[u64]) {
        for id in ids {
            self.delete(*id);
        }
    }

    /// Top-k search. Returns `(id, distance)` pairs ordered by increasing
    /// distance, tombstoned rows skipped.
    pub fn search(&self, query: &[f32], k: usize, ef: usize) -> Vec<(u64, f32)> {
        if query.len() != self.dimension || k == 0 {
            return Vec::new();
        }
        // Ask for extra neighbours so tombstones cannot crowd out live rows.
        let ask = k + self.tombstones.len();
        let neighbours = self.graph.search(query, ask, ef.max(ask));
        let mut out = Vec::with_capacity(k.min(neighbours.len()));
        for n in neighbours {
            if self.tombstones.contains(&n.d_id) {
                continue;
            }
            out.push((self.slot_to_id[n.d_id], n.distance));
            if out.len() >= k {
                break;
            }
        }
        out
    }

    fn data_path(dir: &Path, basename: &str) -> PathBuf {
        dir.join(format!("{basename}.data"))
    }

    fn graph_path(dir: &Path, basename: &str) -> PathBuf {
        dir.join(format!("{basename}.graph"))
    }

    pub fn snapshot_exists(dir: &Path, basename: &str) -> bool {
        Self::data_path(dir, basename).exists() && Self::graph_path(dir, basename).exists()
    }

    /// Snapshot the live rows to `<basename>.data` (vectors) and
    /// `<basename>.graph` (row -> doc id map). Both files are written to a
    /// temp name first and renamed into place.
    pub fn save(&self, dir: &Path, basename: &str) -> io::Result<()> {
        fs::create_dir_all(dir)?;
        let graph_path = Self::graph_path(dir, basename);
        let data_path = Self::data_path(dir, basename);
        let graph_tmp = graph_path.with_extension("graph.tmp");
        let data_tmp = data_path.with_extension("data.tmp");
        {
            let mut w = io::BufWriter::new(fs::File::create(&graph_tmp)?);
            let mut row = 0usize;
            for (slot, id) in self.slot_to_id.iter().enumerate() {
                if self.tombstones.contains(&slot) {
                    continue;
                }
                writeln!(w, "{row}\t{id}")?;
                row += 1;
            }
            w.flush()?;
        }
        {
            let mut w = io::BufWriter::new(fs::File::create(&data_tmp)?);
            for (slot, v) in self.vectors.iter().enumerate() {
                if self.tombstones.contains(&slot) {
                    continue;
                }
                let dim = v.len() as u32;
                w.write_all(&dim.to_le_bytes())?;
                w.write_all(bytemuck::cast_slice(&v[..]))?;
            }
            w.flush()?;
        }
        fs::rename(graph_tmp, graph_path)?;
        fs::rename(data_tmp, data_path)?;
        Ok(())
    }

    /// Load a snapshot and rebuild the graph by reinserting every row.
    pub fn load(
        dir: &Path,
        basename: &str,
        dimension: usize,
        distance: DistanceKind,
        config: HnswConfig,
    ) -> io::Result<Self> {
        let mut ids: Vec<u64> = Vec::new();
        for line in BufReader::new(fs::File::open(Self::graph_path(dir, basename))?).lines() {
            let line = line?;
            let id = line
                .split('\t')
                .nth(1)
                .and_then(|s| s.parse::<u64>().ok())
                .ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidData, "malformed id map row")
                })?;
            ids.push(id);
        }

        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(ids.len());
        let mut r = BufReader::new(fs::File::open(Self::data_path(dir, basename))?);
        let mut dim_buf = [0u8; 4];
        loop {
            match r.read_exact(&mut dim_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            }
            let dim = u32::from_le_bytes(dim_buf) as usize;
            if dim != dimension {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("vector row has dimension {dim}, index expects {dimension}"),
                ));
            }
            let mut bytes = vec![0u8; 4 * dim];
            r.read_exact(&mut bytes)?;
            vectors.push(bytemuck::pod_collect_to_vec(&bytes));
        }
        if vectors.len() != ids.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "vector snapshot and id map row counts differ",
            ));
        }

        // Size the rebuilt graph for at least the snapshot population.
        let mut sized = config;
        sized.max_elements = sized.max_elements.max(ids.len());
        let mut index = Self::new(dimension, distance, sized);
        let items: Vec<(u64, Vec<f32>)> = ids.into_iter().zip(vectors).collect();
        index.insert_batch(&items);
        Ok(index)
    }

    /// Rebuild the graph from live rows with the given config, dropping all
    /// tombstones and compacting slots.
    pub fn compact(&mut self, config: HnswConfig) {
        let ids = std::mem::take(&mut self.slot_to_id);
        let vectors = std::mem::take(&mut self.vectors);
        let tombstones = std::mem::take(&mut self.tombstones);
        self.id_to_slot.clear();
        self.config = config;
        self.graph = Graph::new(self.distance, &self.config);
        self.searching = false;

        let live: Vec<(u64, Vec<f32>)> = ids
            .into_iter()
            .zip(vectors)
            .enumerate()
            .filter(|(slot, _)| !tombstones.contains(slot))
            .map(|(_, pair)| pair)
            .collect();
        self.insert_batch(&live);
    }
}
