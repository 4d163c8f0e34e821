// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! SWC skeleton files.
//!
//! One row per node, `id type x y z radius parent`, parent `-1` for the root,
//! rows in breadth-first order so a parent always precedes its children.
//! Coordinates and radii carry four decimals; [`quantized`] applies the same
//! rounding to a graph so that writing and reading back is exact.

use autorecon_structures::{
    stage_write, NeuriteType, NodeId, ReconError, ReconResult, SkeletonGraph, SkeletonNode,
    StagedFile,
};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// 10^4, four decimals
const SCALE: f64 = 10_000.0;

/// Round to the precision written to SWC files
pub fn quantize(value: f64) -> f64 {
    (value * SCALE).round() / SCALE
}

/// Copy of `graph` with positions and radii rounded to file precision
pub fn quantized(graph: &SkeletonGraph) -> ReconResult<SkeletonGraph> {
    let mut out = SkeletonGraph::with_capacity(graph.len());
    for node in graph.nodes() {
        out.add_node(SkeletonNode::new(
            node.id,
            node.kind,
            node.position.map(quantize),
            quantize(node.radius),
        ))?;
    }
    for node in graph.nodes() {
        out.set_parent(node.id, graph.parent(node.id))?;
    }
    Ok(out)
}

/// Render `graph` as SWC text. Each `header` line becomes a `#` comment.
pub fn to_swc_string(graph: &SkeletonGraph, header: &[String]) -> ReconResult<String> {
    graph.validate()?;
    let order = graph.breadth_first()?;

    let mut text = String::with_capacity(64 * (order.len() + header.len() + 2));
    for line in header {
        let _ = writeln!(text, "# {}", line);
    }
    let _ = writeln!(text, "# id type x y z radius parent");
    for id in order {
        let node = graph
            .node(id)
            .ok_or_else(|| ReconError::Internal(format!("node {} missing from arena", id)))?;
        let parent = graph.parent(id).map(|p| i64::from(p.0)).unwrap_or(-1);
        let [x, y, z] = node.position.map(quantize);
        let _ = writeln!(
            text,
            "{} {} {:.4} {:.4} {:.4} {:.4} {}",
            id,
            node.kind.swc_code(),
            x,
            y,
            z,
            quantize(node.radius),
            parent
        );
    }
    Ok(text)
}

/// Render `graph` into a temp file next to `path`. Nothing appears at `path`
/// until the returned file is committed.
pub fn stage_swc(path: &Path, graph: &SkeletonGraph, header: &[String]) -> ReconResult<StagedFile> {
    let text = to_swc_string(graph, header)?;
    let staged = stage_write(path, text.as_bytes())?;
    debug!(
        target: "autorecon-skeleton",
        "[SWC] staged {} nodes for {}",
        graph.len(),
        path.display()
    );
    Ok(staged)
}

/// Write an SWC file atomically: temp file in the target directory, then
/// rename over `path`.
pub fn write_swc(path: &Path, graph: &SkeletonGraph, header: &[String]) -> ReconResult<()> {
    stage_swc(path, graph, header)?.commit()?;
    info!(
        target: "autorecon-skeleton",
        "[SWC] wrote {} nodes to {}",
        graph.len(),
        path.display()
    );
    Ok(())
}

fn malformed(line_no: usize, message: impl std::fmt::Display) -> ReconError {
    ReconError::MalformedInput(format!("swc line {}: {}", line_no, message))
}

/// Parse SWC text back into a graph. Comment and blank lines are skipped.
pub fn parse_swc(text: &str) -> ReconResult<SkeletonGraph> {
    let mut rows: Vec<(SkeletonNode, Option<NodeId>, usize)> = Vec::new();
    for (i, raw) in text.lines().enumerate() {
        let line_no = i + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 7 {
            return Err(malformed(
                line_no,
                format!("expected 7 fields, found {}", fields.len()),
            ));
        }

        let id: u32 = fields[0]
            .parse()
            .map_err(|_| malformed(line_no, format!("bad id '{}'", fields[0])))?;
        if id == 0 {
            return Err(malformed(line_no, "node id 0 is not allowed"));
        }
        let code: i32 = fields[1]
            .parse()
            .map_err(|_| malformed(line_no, format!("bad type '{}'", fields[1])))?;
        let kind = NeuriteType::from_swc_code(code).ok_or_else(|| {
            if code == 0 {
                malformed(line_no, "background type 0 cannot be a skeleton node")
            } else {
                malformed(line_no, format!("unknown type code {}", code))
            }
        })?;

        let mut numbers = [0.0f64; 4];
        for (slot, field) in numbers.iter_mut().zip(&fields[2..6]) {
            *slot = field
                .parse()
                .map_err(|_| malformed(line_no, format!("bad number '{}'", field)))?;
        }
        let parent: i64 = fields[6]
            .parse()
            .map_err(|_| malformed(line_no, format!("bad parent '{}'", fields[6])))?;
        let parent = match parent {
            -1 => None,
            p if p > 0 && p <= i64::from(u32::MAX) => Some(NodeId(p as u32)),
            p => return Err(malformed(line_no, format!("invalid parent id {}", p))),
        };

        let [x, y, z, radius] = numbers;
        rows.push((SkeletonNode::new(NodeId(id), kind, [x, y, z], radius), parent, line_no));
    }

    let mut graph = SkeletonGraph::with_capacity(rows.len());
    for (node, _, line_no) in &rows {
        graph
            .add_node(*node)
            .map_err(|e| malformed(*line_no, e))?;
    }
    for (node, parent, line_no) in &rows {
        if let Some(p) = parent {
            if !graph.contains(*p) {
                return Err(malformed(*line_no, format!("unknown parent {}", p)));
            }
            graph.set_parent(node.id, Some(*p))?;
        }
    }
    graph.validate()?;
    debug!(target: "autorecon-skeleton", "[SWC] parsed {} nodes", graph.len());
    Ok(graph)
}

pub fn read_swc(path: &Path) -> ReconResult<SkeletonGraph> {
    let text = fs::read_to_string(path)
        .map_err(|e| ReconError::from_io(format!("reading {}", path.display()), e))?;
    parse_swc(&text)
}
