//! Linear undo/redo over the committed annotation list.
//!
//! Redo stores whole-list snapshots rather than inverse operations: undo
//! pushes the list as it was before the pop, clear pushes the list it
//! empties, and redo swaps the most recent snapshot back in. Editing
//! sessions are short, so the memory cost stays small.

use std::mem;

use crate::annotation::Annotation;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationHistory {
    current: Vec<Annotation>,
    redo: Vec<Vec<Annotation>>,
}

impl AnnotationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.current
    }

    pub fn can_undo(&self) -> bool {
        !self.current.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo.len()
    }

    /// Appending diverges from any undone state, so redo is dropped.
    pub fn commit(&mut self, annotation: Annotation) {
        self.current.push(annotation);
        self.redo.clear();
    }

    pub fn undo(&mut self) -> bool {
        if self.current.is_empty() {
            return false;
        }
        self.redo.push(self.current.clone());
        self.current.pop();
        true
    }

    pub fn redo(&mut self) -> bool {
        match self.redo.pop() {
            Some(snapshot) => {
                self.current = snapshot;
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) -> bool {
        if self.current.is_empty() {
            return false;
        }
        let snapshot = mem::take(&mut self.current);
        self.redo.push(snapshot);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;

    fn marker(n: usize) -> Annotation {
        Annotation::Marker {
            points: vec![Point::new(0.0, 0.0), Point::new(n as f64, n as f64)],
        }
    }

    fn arrow() -> Annotation {
        Annotation::Arrow {
            start: Point::new(1.0, 1.0),
            end: Point::new(30.0, 40.0),
        }
    }

    #[test]
    fn undoing_every_commit_fills_redo_with_growing_snapshots() {
        let mut history = AnnotationHistory::new();
        let n = 5;
        for i in 0..n {
            history.commit(marker(i + 1));
        }
        for _ in 0..n {
            assert!(history.undo());
        }
        assert!(history.annotations().is_empty());
        assert_eq!(history.redo_depth(), n);

        // Snapshots pushed later are smaller: n, n-1, ..., 1 from bottom to top.
        let sizes: Vec<usize> = history.redo.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![5, 4, 3, 2, 1]);
    }

    #[test]
    fn undo_then_redo_restores_exact_list() {
        let mut history = AnnotationHistory::new();
        history.commit(marker(3));
        history.commit(arrow());
        let before = history.annotations().to_vec();

        history.undo();
        assert_eq!(history.annotations(), &before[..1]);
        history.redo();
        assert_eq!(history.annotations(), before.as_slice());
        assert!(!history.can_redo());
    }

    #[test]
    fn commit_after_undo_discards_redo() {
        let mut history = AnnotationHistory::new();
        history.commit(marker(1));
        history.commit(marker(2));
        history.undo();
        history.commit(arrow());
        assert!(!history.redo());
        assert_eq!(history.annotations().len(), 2);
        assert_eq!(history.annotations()[1], arrow());
    }

    #[test]
    fn empty_history_operations_are_noops() {
        let mut history = AnnotationHistory::new();
        assert!(!history.undo());
        assert!(!history.redo());
        assert!(!history.clear());
        assert_eq!(history.redo_depth(), 0);
    }

    #[test]
    fn clear_is_recoverable_through_redo() {
        let mut history = AnnotationHistory::new();
        history.commit(marker(1));
        history.commit(arrow());
        let before = history.annotations().to_vec();

        assert!(history.clear());
        assert!(history.annotations().is_empty());
        assert!(history.redo());
        assert_eq!(history.annotations(), before.as_slice());
    }
}
