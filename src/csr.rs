//! Compressed sparse row validation and GPU upload (C6).
//!
//! Hierarchical algorithms (Relativity Atlas) need both a forward adjacency
//! (outgoing neighbors / children) and an inverse adjacency (incoming
//! neighbors / parents) in CSR form. This module validates both against the
//! invariants in the data model before anything touches the GPU, so a bad
//! graph never leaves partial GPU state behind.

use crate::{Edge, LayoutError, Result};

/// A single compressed-sparse-row adjacency: `offsets[N+1]`, `indices[E]`.
#[derive(Debug, Clone, Default)]
pub struct Csr {
    pub offsets: Vec<u32>,
    pub indices: Vec<u32>,
}

impl Csr {
    /// Number of rows (nodes) this CSR was built for.
    pub fn node_count(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    /// Number of entries (edges).
    pub fn edge_count(&self) -> usize {
        self.indices.len()
    }

    /// Validate the three invariants from the data model:
    /// `offsets[0] == 0`, offsets monotone non-decreasing,
    /// `offsets[N] == E`, and every `indices[i] < node_count`.
    pub fn validate(&self, node_count: u32) -> Result<()> {
        let expected_len = node_count as usize + 1;
        if self.offsets.len() != expected_len {
            return Err(LayoutError::InvalidCsr {
                field: "offsets.len",
                expected: expected_len.to_string(),
                actual: self.offsets.len().to_string(),
            });
        }
        if self.offsets[0] != 0 {
            return Err(LayoutError::InvalidCsr {
                field: "offsets[0]",
                expected: "0".to_string(),
                actual: self.offsets[0].to_string(),
            });
        }
        for w in self.offsets.windows(2) {
            if w[1] < w[0] {
                return Err(LayoutError::InvalidCsr {
                    field: "offsets monotonicity",
                    expected: format!(">= {}", w[0]),
                    actual: w[1].to_string(),
                });
            }
        }
        let last = *self.offsets.last().unwrap_or(&0);
        if last as usize != self.indices.len() {
            return Err(LayoutError::InvalidCsr {
                field: "offsets[N]",
                expected: self.indices.len().to_string(),
                actual: last.to_string(),
            });
        }
        for (i, &idx) in self.indices.iter().enumerate() {
            if idx >= node_count {
                return Err(LayoutError::InvalidCsr {
                    field: "indices[i]",
                    expected: format!("< {node_count}"),
                    actual: format!("indices[{i}]={idx}"),
                });
            }
        }
        Ok(())
    }
}

/// Forward + inverse CSR pair, built together from a directed edge list so
/// the two representations can never disagree on edge count.
#[derive(Debug, Clone, Default)]
pub struct CsrPair {
    pub forward: Csr,
    pub inverse: Csr,
}

impl CsrPair {
    /// Build forward (outgoing) and inverse (incoming) CSR adjacency from a
    /// directed edge list. Edges are treated as directed regardless of
    /// whether the algorithm ultimately uses the graph symmetrically.
    pub fn build(node_count: u32, edges: &[Edge]) -> Self {
        let n = node_count as usize;
        let mut out_degree = vec![0u32; n];
        let mut in_degree = vec![0u32; n];
        for e in edges {
            out_degree[e.source as usize] += 1;
            in_degree[e.target as usize] += 1;
        }

        let forward = build_one(&out_degree, edges, |e| (e.source, e.target));
        let inverse = build_one(&in_degree, edges, |e| (e.target, e.source));

        Self { forward, inverse }
    }

    /// Validate both directions and that they agree on total edge count.
    pub fn validate(&self, node_count: u32) -> Result<()> {
        self.forward.validate(node_count)?;
        self.inverse.validate(node_count)?;
        if self.forward.edge_count() != self.inverse.edge_count() {
            return Err(LayoutError::InvalidCsr {
                field: "forward/inverse edge count",
                expected: self.forward.edge_count().to_string(),
                actual: self.inverse.edge_count().to_string(),
            });
        }
        Ok(())
    }
}

fn build_one(degree: &[u32], edges: &[Edge], key: impl Fn(&Edge) -> (u32, u32)) -> Csr {
    let n = degree.len();
    let mut offsets = Vec::with_capacity(n + 1);
    offsets.push(0u32);
    for &d in degree {
        offsets.push(offsets.last().unwrap() + d);
    }

    let mut cursor = offsets.clone();
    let mut indices = vec![0u32; edges.len()];
    for e in edges {
        let (row, col) = key(e);
        let slot = &mut cursor[row as usize];
        indices[*slot as usize] = col;
        *slot += 1;
    }

    Csr { offsets, indices }
}

/// GPU-side buffers for one CSR direction, with the capacity bookkeeping
/// the uploader needs to reject graphs that outgrow pre-allocated storage.
pub struct CsrBuffers {
    pub offsets: wgpu::Buffer,
    pub indices: wgpu::Buffer,
    pub max_nodes: u32,
    pub max_edges: u32,
}

impl CsrBuffers {
    /// Allocate CSR storage buffers sized for `max_nodes` / `max_edges`.
    pub fn new(ctx: &crate::GpuContext, max_nodes: u32, max_edges: u32, label: &str) -> Self {
        let offsets = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("{label} CSR Offsets")),
            size: ((max_nodes as u64 + 1) * 4).max(4),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let indices = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("{label} CSR Indices")),
            size: (max_edges as u64 * 4).max(4),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self {
            offsets,
            indices,
            max_nodes,
            max_edges,
        }
    }

    /// Validate capacity and upload a CSR to the GPU. Validation of the CSR
    /// invariants themselves is the caller's responsibility (see
    /// [`Csr::validate`]) — this only checks the pre-allocated buffers are
    /// large enough, which is a distinct, cheaper check that must also run
    /// before any encoder referencing these buffers is recorded.
    pub fn upload(&self, ctx: &crate::GpuContext, csr: &Csr) -> Result<()> {
        let node_count = csr.node_count() as u32;
        if node_count > self.max_nodes {
            return Err(LayoutError::CapacityExceeded {
                field: "csr.node_count",
                expected: self.max_nodes,
                actual: node_count,
                node_count,
                edge_count: csr.edge_count() as u32,
            });
        }
        let edge_count = csr.edge_count() as u32;
        if edge_count > self.max_edges {
            return Err(LayoutError::CapacityExceeded {
                field: "csr.edge_count",
                expected: self.max_edges,
                actual: edge_count,
                node_count,
                edge_count,
            });
        }
        ctx.queue
            .write_buffer(&self.offsets, 0, bytemuck::cast_slice(&csr.offsets));
        ctx.queue
            .write_buffer(&self.indices, 0, bytemuck::cast_slice(&csr.indices));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_edges() -> Vec<Edge> {
        vec![Edge::new(0, 1), Edge::new(1, 2), Edge::new(2, 3)]
    }

    #[test]
    fn builds_valid_forward_and_inverse() {
        let pair = CsrPair::build(4, &chain_edges());
        assert!(pair.validate(4).is_ok());
        assert_eq!(pair.forward.offsets, vec![0, 1, 2, 3, 3]);
        assert_eq!(pair.forward.indices, vec![1, 2, 3]);
        assert_eq!(pair.inverse.offsets, vec![0, 0, 1, 2, 3]);
        assert_eq!(pair.inverse.indices, vec![0, 1, 2]);
    }

    #[test]
    fn rejects_wrong_offsets_length() {
        let csr = Csr {
            offsets: vec![0, 1, 2],
            indices: vec![0, 1],
        };
        let err = csr.validate(4).unwrap_err();
        assert!(matches!(err, LayoutError::InvalidCsr { field: "offsets.len", .. }));
    }

    #[test]
    fn rejects_non_monotone_offsets() {
        let csr = Csr {
            offsets: vec![0, 3, 1, 3],
            indices: vec![0, 0, 0],
        };
        let err = csr.validate(3).unwrap_err();
        assert!(matches!(
            err,
            LayoutError::InvalidCsr { field: "offsets monotonicity", .. }
        ));
    }

    #[test]
    fn rejects_out_of_range_index() {
        let csr = Csr {
            offsets: vec![0, 1],
            indices: vec![5],
        };
        let err = csr.validate(1).unwrap_err();
        assert!(matches!(err, LayoutError::InvalidCsr { field: "indices[i]", .. }));
    }

    #[test]
    fn rejects_offsets_n_mismatch() {
        let csr = Csr {
            offsets: vec![0, 1, 5],
            indices: vec![0],
        };
        let err = csr.validate(2).unwrap_err();
        assert!(matches!(err, LayoutError::InvalidCsr { field: "offsets[N]", .. }));
    }

    #[test]
    fn capacity_check_rejects_oversized_csr() {
        let ctx_buffers_max_nodes = 2u32;
        let csr = Csr {
            offsets: vec![0, 1, 2, 2],
            indices: vec![1, 2],
        };
        // Exercise just the arithmetic the uploader performs, without a GPU.
        let node_count = csr.node_count() as u32;
        assert!(node_count > ctx_buffers_max_nodes);
    }
}
