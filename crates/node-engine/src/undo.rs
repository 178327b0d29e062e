//! Undo/redo system using compressed snapshots
//!
//! Every committed edit pushes a zstd-compressed JSON snapshot of the whole
//! graph. Undo and redo move a cursor over the linear history and
//! decompress the snapshot under it, so no mutation needs an inverse.

use std::collections::VecDeque;

use serde::Serialize;

use crate::error::{NodeEngineError, Result};
use crate::types::WorkflowGraph;

/// Default zstd level: favors push/pop latency over ratio
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Undo/redo stack using compressed snapshots
pub struct UndoStack {
    /// Compressed graph states (zstd)
    snapshots: VecDeque<Vec<u8>>,
    /// Index of the snapshot matching the live graph
    cursor: usize,
    /// Maximum number of snapshots to keep
    capacity: usize,
    compression_level: i32,
}

impl UndoStack {
    /// Create a new undo stack holding at most `capacity` snapshots
    pub fn new(capacity: usize) -> Self {
        Self::with_compression_level(capacity, DEFAULT_COMPRESSION_LEVEL)
    }

    pub fn with_compression_level(capacity: usize, compression_level: i32) -> Self {
        Self {
            snapshots: VecDeque::new(),
            cursor: 0,
            capacity: capacity.max(1),
            compression_level,
        }
    }

    /// Push a new snapshot onto the stack
    ///
    /// Discards any redo history beyond the cursor, then evicts the oldest
    /// snapshots while over capacity. The snapshot under the cursor is
    /// never evicted.
    pub fn push(&mut self, graph: &WorkflowGraph) -> Result<()> {
        let json = serde_json::to_vec(graph)?;
        let compressed = zstd::encode_all(&json[..], self.compression_level)
            .map_err(|e| NodeEngineError::Compression(e.to_string()))?;

        if !self.snapshots.is_empty() {
            self.snapshots.truncate(self.cursor + 1);
        }
        self.snapshots.push_back(compressed);
        self.cursor = self.snapshots.len() - 1;

        while self.snapshots.len() > self.capacity && self.cursor > 0 {
            self.snapshots.pop_front();
            self.cursor -= 1;
        }

        Ok(())
    }

    /// Move back one snapshot
    ///
    /// Returns the previous graph state, or `None` at the bottom of history.
    pub fn undo(&mut self) -> Option<Result<WorkflowGraph>> {
        if !self.can_undo() {
            return None;
        }
        self.cursor -= 1;
        Some(self.decompress(self.cursor))
    }

    /// Move forward one snapshot
    ///
    /// Returns the next graph state, or `None` at the top of history.
    pub fn redo(&mut self) -> Option<Result<WorkflowGraph>> {
        if !self.can_redo() {
            return None;
        }
        self.cursor += 1;
        Some(self.decompress(self.cursor))
    }

    /// Get the graph under the cursor without moving it
    pub fn current(&self) -> Option<Result<WorkflowGraph>> {
        if self.snapshots.is_empty() {
            None
        } else {
            Some(self.decompress(self.cursor))
        }
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.snapshots.len()
    }

    /// Get the number of snapshots
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Clear all snapshots
    pub fn clear(&mut self) {
        self.snapshots.clear();
        self.cursor = 0;
    }

    /// Get the total compressed size of all snapshots
    pub fn compressed_size(&self) -> usize {
        self.snapshots.iter().map(Vec::len).sum()
    }

    /// Snapshot of the undo/redo availability, for the host UI
    pub fn state(&self) -> UndoRedoState {
        UndoRedoState {
            can_undo: self.can_undo(),
            can_redo: self.can_redo(),
            undo_count: self.cursor,
            redo_count: self.snapshots.len().saturating_sub(self.cursor + 1),
        }
    }

    fn decompress(&self, index: usize) -> Result<WorkflowGraph> {
        let compressed = self
            .snapshots
            .get(index)
            .ok_or_else(|| NodeEngineError::Compression(format!("no snapshot at {}", index)))?;
        let json = zstd::decode_all(&compressed[..])
            .map_err(|e| NodeEngineError::Compression(e.to_string()))?;
        Ok(serde_json::from_slice(&json)?)
    }
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Undo/redo availability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UndoRedoState {
    pub can_undo: bool,
    pub can_redo: bool,
    pub undo_count: usize,
    pub redo_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GraphNode;

    fn make_graph(name: &str) -> WorkflowGraph {
        let mut graph = WorkflowGraph::new("test", name);
        graph
            .nodes
            .push(GraphNode::new("node1", "text-input").with_data(serde_json::json!({"name": name})));
        graph
    }

    #[test]
    fn test_push_and_undo() {
        let mut stack = UndoStack::new(10);

        stack.push(&make_graph("first")).unwrap();
        stack.push(&make_graph("second")).unwrap();
        stack.push(&make_graph("third")).unwrap();

        assert_eq!(stack.current().unwrap().unwrap().name, "third");
        assert_eq!(stack.undo().unwrap().unwrap().name, "second");
        assert_eq!(stack.undo().unwrap().unwrap().name, "first");

        // Can't undo further
        assert!(stack.undo().is_none());
    }

    #[test]
    fn test_round_trip_restores_graphs() {
        let mut stack = UndoStack::new(10);
        let g1 = make_graph("first");
        let g2 = make_graph("second");

        stack.push(&g1).unwrap();
        stack.push(&g2).unwrap();

        assert_eq!(stack.undo().unwrap().unwrap(), g1);
        assert_eq!(stack.redo().unwrap().unwrap(), g2);
        assert!(stack.redo().is_none());
    }

    #[test]
    fn test_push_truncates_redo() {
        let mut stack = UndoStack::new(10);

        stack.push(&make_graph("first")).unwrap();
        stack.push(&make_graph("second")).unwrap();
        stack.undo();

        stack.push(&make_graph("third")).unwrap();

        assert!(!stack.can_redo());
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.current().unwrap().unwrap().name, "third");
        assert_eq!(stack.undo().unwrap().unwrap().name, "first");
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut stack = UndoStack::new(3);

        for i in 0..5 {
            stack.push(&make_graph(&format!("graph_{}", i))).unwrap();
        }

        assert_eq!(stack.len(), 3);
        assert_eq!(stack.current().unwrap().unwrap().name, "graph_4");

        // Can only undo twice (to graph_3 and graph_2)
        stack.undo();
        assert_eq!(stack.undo().unwrap().unwrap().name, "graph_2");
        assert!(!stack.can_undo());
    }

    #[test]
    fn test_capacity_one_keeps_cursor() {
        let mut stack = UndoStack::new(0);
        assert_eq!(stack.capacity(), 1);

        stack.push(&make_graph("a")).unwrap();
        stack.push(&make_graph("b")).unwrap();
        assert_eq!(stack.len(), 1);
        assert_eq!(stack.current().unwrap().unwrap().name, "b");
        assert!(stack.undo().is_none());
    }

    #[test]
    fn test_state_counts() {
        let mut stack = UndoStack::with_compression_level(10, 1);
        assert_eq!(
            stack.state(),
            UndoRedoState {
                can_undo: false,
                can_redo: false,
                undo_count: 0,
                redo_count: 0,
            }
        );

        stack.push(&make_graph("first")).unwrap();
        stack.push(&make_graph("second")).unwrap();
        stack.push(&make_graph("third")).unwrap();
        stack.undo();

        let state = stack.state();
        assert!(state.can_undo && state.can_redo);
        assert_eq!((state.undo_count, state.redo_count), (1, 1));
        assert!(stack.compressed_size() > 0);

        stack.clear();
        assert!(stack.is_empty());
    }
}
