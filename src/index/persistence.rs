//! Binary persistence for a (graph, store) pair
//!
//! Layout, all integers and floats little-endian:
//!
//! ```text
//! [magic "HNSW"][version u32][D u32][metric u8][M u32][ef_construction u32]
//! [N u64][max_layer u32][entry_point u64]
//! N x D f32                    vector table, node-index order
//! N x u64                      external ids, node-index order
//! per node: [layer_count u32] then per layer [neighbor_count u32][neighbor u64]*
//! ```
//!
//! An empty graph stores `u64::MAX` as its entry point. Adjacency is written
//! verbatim because construction is randomized and cannot be replayed.

use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::distance::Metric;
use super::error::{IndexError, IndexResult};
use super::hnsw::{HnswGraph, HnswParams, MAX_LEVEL};
use super::store::VectorStore;

pub const MAGIC: [u8; 4] = *b"HNSW";
pub const FORMAT_VERSION: u32 = 1;

/// Size of the fixed header in bytes
pub const HEADER_LEN: usize = 4 + 4 + 4 + 1 + 4 + 4 + 8 + 4 + 8;

const NO_ENTRY_POINT: u64 = u64::MAX;

/// Decoded fixed-size header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexHeader {
    pub version: u32,
    pub dimensions: u32,
    pub metric: Metric,
    pub m: u32,
    pub ef_construction: u32,
    pub count: u64,
    pub max_layer: u32,
    pub entry_point: Option<u64>,
}

impl IndexHeader {
    /// Smallest body that can hold `count` nodes: vectors, ids and one layer count each
    fn min_body_len(&self) -> IndexResult<u64> {
        let count = self.count;
        let vectors = count
            .checked_mul(self.dimensions as u64)
            .and_then(|v| v.checked_mul(4));
        let ids = count.checked_mul(8);
        let layer_counts = count.checked_mul(4);
        match (vectors, ids, layer_counts) {
            (Some(v), Some(i), Some(l)) => v
                .checked_add(i)
                .and_then(|s| s.checked_add(l))
                .ok_or_else(|| IndexError::CorruptFormat("declared size overflows".to_string())),
            _ => Err(IndexError::CorruptFormat(
                "declared size overflows".to_string(),
            )),
        }
    }
}

/// Serializes and deserializes a (graph, store) pair
pub struct PersistenceCodec;

impl PersistenceCodec {
    /// Write the pair to `path` atomically (temp file, then rename)
    pub fn save(graph: &HnswGraph, store: &VectorStore, path: impl AsRef<Path>) -> IndexResult<()> {
        let path = path.as_ref();
        info!("Saving index to: {}", path.display());

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = temp_path(path);
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        Self::write_to(&mut writer, graph, store)?;
        writer.flush()?;

        let file = writer.into_inner().map_err(|e| IndexError::Io(e.into_error()))?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp_path, path)?;

        info!("Saved {} vectors to {}", store.size(), path.display());
        Ok(())
    }

    /// Read a pair previously written by [`PersistenceCodec::save`]
    pub fn load(path: impl AsRef<Path>) -> IndexResult<(HnswGraph, VectorStore)> {
        let path = path.as_ref();
        info!("Loading index from: {}", path.display());

        let bytes = fs::read(path)?;
        let (graph, store) = Self::decode(&bytes)?;

        info!(
            "Loaded {} vectors ({} dimensions, metric={}, max layer {})",
            store.size(),
            graph.dimensions(),
            graph.metric(),
            graph.max_layer()
        );
        Ok((graph, store))
    }

    /// Read only the fixed header of an index file
    pub fn read_header(path: impl AsRef<Path>) -> IndexResult<IndexHeader> {
        let mut bytes = Vec::with_capacity(HEADER_LEN);
        File::open(path.as_ref())?
            .take(HEADER_LEN as u64)
            .read_to_end(&mut bytes)?;
        let mut reader = ByteReader::new(&bytes);
        read_header(&mut reader)
    }

    /// Encode into an in-memory buffer
    pub fn encode(graph: &HnswGraph, store: &VectorStore) -> IndexResult<Vec<u8>> {
        let mut bytes = Vec::new();
        Self::write_to(&mut bytes, graph, store)?;
        Ok(bytes)
    }

    pub fn write_to<W: Write>(writer: &mut W, graph: &HnswGraph, store: &VectorStore) -> IndexResult<()> {
        if graph.len() != store.size() || store.dimensions().is_some_and(|d| d != graph.dimensions()) {
            return Err(IndexError::InvalidParams(format!(
                "graph ({} nodes, {}D) does not match store ({} vectors, {:?}D)",
                graph.len(),
                graph.dimensions(),
                store.size(),
                store.dimensions()
            )));
        }

        let params = graph.params();
        writer.write_all(&MAGIC)?;
        writer.write_all(&FORMAT_VERSION.to_le_bytes())?;
        write_u32(writer, graph.dimensions(), "dimensions")?;
        writer.write_all(&[params.metric.to_byte()])?;
        write_u32(writer, params.m, "m")?;
        write_u32(writer, params.ef_construction, "ef_construction")?;
        writer.write_all(&(store.size() as u64).to_le_bytes())?;
        write_u32(writer, graph.max_layer(), "max_layer")?;
        let entry = graph.entry_point().map_or(NO_ENTRY_POINT, |e| e as u64);
        writer.write_all(&entry.to_le_bytes())?;

        for (_, _, vector) in store.iter() {
            for value in vector {
                writer.write_all(&value.to_le_bytes())?;
            }
        }

        for id in store.ids() {
            writer.write_all(&id.to_le_bytes())?;
        }

        for node in 0..graph.len() {
            let layers = graph.adjacency(node);
            write_u32(writer, layers.len(), "layer_count")?;
            for neighbors in layers {
                write_u32(writer, neighbors.len(), "neighbor_count")?;
                for &neighbor in neighbors {
                    writer.write_all(&(neighbor as u64).to_le_bytes())?;
                }
            }
        }

        Ok(())
    }

    /// Decode a full index from bytes
    pub fn decode(bytes: &[u8]) -> IndexResult<(HnswGraph, VectorStore)> {
        let mut reader = ByteReader::new(bytes);
        let header = read_header(&mut reader)?;

        let needed = (HEADER_LEN as u64).saturating_add(header.min_body_len()?);
        if (bytes.len() as u64) < needed {
            return Err(IndexError::TruncatedFile {
                needed,
                available: bytes.len() as u64,
            });
        }

        let dimensions = header.dimensions as usize;
        let count = to_usize(header.count, "node count")?;
        let params = HnswParams {
            metric: header.metric,
            m: header.m as usize,
            ef_construction: header.ef_construction as usize,
            seed: None,
        };

        let mut vectors = Vec::with_capacity(count);
        let mut row = Vec::with_capacity(dimensions.min(reader.remaining() / 4));
        for _ in 0..count {
            row.clear();
            for _ in 0..dimensions {
                row.push(reader.read_f32()?);
            }
            vectors.push(row.clone());
        }

        let mut store = VectorStore::with_capacity(dimensions, count);
        for vector in &vectors {
            let id = reader.read_u64()?;
            store.put(id, vector).map_err(|e| match e {
                IndexError::DuplicateId(id) => {
                    IndexError::CorruptFormat(format!("duplicate vector id {}", id))
                }
                other => other,
            })?;
        }
        drop(vectors);

        let mut adjacency = Vec::with_capacity(count);
        for _ in 0..count {
            let layer_count = reader.read_u32()? as usize;
            if layer_count > header.max_layer as usize + 1 {
                return Err(IndexError::CorruptFormat(format!(
                    "layer count {} exceeds max layer {}",
                    layer_count, header.max_layer
                )));
            }
            let mut layers = Vec::with_capacity(layer_count);
            for layer in 0..layer_count {
                let neighbor_count = reader.read_u32()? as usize;
                if neighbor_count >= count {
                    return Err(IndexError::CorruptFormat(format!(
                        "neighbor count {} on layer {} but only {} nodes",
                        neighbor_count, layer, count
                    )));
                }
                if neighbor_count > params.max_degree(layer) {
                    return Err(IndexError::CorruptFormat(format!(
                        "neighbor count {} exceeds cap {} on layer {}",
                        neighbor_count,
                        params.max_degree(layer),
                        layer
                    )));
                }
                let mut neighbors = Vec::with_capacity(neighbor_count.min(reader.remaining() / 8));
                for _ in 0..neighbor_count {
                    neighbors.push(to_usize(reader.read_u64()?, "neighbor index")?);
                }
                layers.push(neighbors);
            }
            adjacency.push(layers);
        }

        if reader.remaining() > 0 {
            return Err(IndexError::CorruptFormat(format!(
                "{} trailing bytes after adjacency lists",
                reader.remaining()
            )));
        }

        let entry_point = header
            .entry_point
            .map(|e| to_usize(e, "entry point"))
            .transpose()?;
        let graph = HnswGraph::from_parts(
            dimensions,
            params,
            adjacency,
            entry_point,
            header.max_layer as usize,
        )?;

        debug!("Decoded {} nodes from {} bytes", graph.len(), bytes.len());
        Ok((graph, store))
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_u32<W: Write>(writer: &mut W, value: usize, field: &str) -> IndexResult<()> {
    let value = u32::try_from(value).map_err(|_| {
        IndexError::InvalidParams(format!("{} value {} does not fit in u32", field, value))
    })?;
    writer.write_all(&value.to_le_bytes())?;
    Ok(())
}

fn to_usize(value: u64, field: &str) -> IndexResult<usize> {
    usize::try_from(value)
        .map_err(|_| IndexError::CorruptFormat(format!("{} {} does not fit in usize", field, value)))
}

fn read_header(reader: &mut ByteReader<'_>) -> IndexResult<IndexHeader> {
    let magic = reader.take(4)?;
    if magic != MAGIC {
        return Err(IndexError::CorruptFormat(format!(
            "invalid magic bytes: expected {:?}, found {:?}",
            MAGIC, magic
        )));
    }

    let version = reader.read_u32()?;
    if version != FORMAT_VERSION {
        return Err(IndexError::CorruptFormat(format!(
            "unsupported format version {} (expected {})",
            version, FORMAT_VERSION
        )));
    }

    let dimensions = reader.read_u32()?;
    let metric_byte = reader.read_u8()?;
    let metric = Metric::from_byte(metric_byte)
        .ok_or_else(|| IndexError::CorruptFormat(format!("unknown metric tag {}", metric_byte)))?;
    let m = reader.read_u32()?;
    let ef_construction = reader.read_u32()?;
    let count = reader.read_u64()?;
    let max_layer = reader.read_u32()?;
    let entry_point = match reader.read_u64()? {
        NO_ENTRY_POINT => None,
        entry => Some(entry),
    };

    if dimensions == 0 {
        return Err(IndexError::CorruptFormat("dimensions must be positive".to_string()));
    }
    if max_layer as usize > MAX_LEVEL {
        return Err(IndexError::CorruptFormat(format!(
            "max layer {} exceeds limit {}",
            max_layer, MAX_LEVEL
        )));
    }
    HnswParams {
        metric,
        m: m as usize,
        ef_construction: ef_construction as usize,
        seed: None,
    }
    .validate()
    .map_err(|e| IndexError::CorruptFormat(format!("bad parameters: {}", e)))?;

    Ok(IndexHeader {
        version,
        dimensions,
        metric,
        m,
        ef_construction,
        count,
        max_layer,
        entry_point,
    })
}

/// Cursor over a byte slice that reports short reads as truncation
struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, n: usize) -> IndexResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(IndexError::TruncatedFile {
                needed: (self.pos + n) as u64,
                available: self.bytes.len() as u64,
            });
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> IndexResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn read_u8(&mut self) -> IndexResult<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    fn read_u32(&mut self) -> IndexResult<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    fn read_u64(&mut self) -> IndexResult<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    fn read_f32(&mut self) -> IndexResult<f32> {
        Ok(f32::from_le_bytes(self.read_array()?))
    }
}
