//! Disjoint-set forest over state indices
//!
//! Records which PTA state each merged-away state now lives in. Every state
//! starts as its own representative; a merge points the absorbed
//! representative at the survivor, so chains never form cycles.

#[derive(Debug, Clone, Default)]
pub struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    pub fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Add a fresh singleton and return its index
    pub fn push(&mut self) -> usize {
        let index = self.parent.len();
        self.parent.push(index);
        index
    }

    /// Representative of `x`, compressing the path behind it
    pub fn find(&mut self, x: usize) -> usize {
        let root = self.resolve(x);
        let mut current = x;
        while self.parent[current] != root {
            let next = self.parent[current];
            self.parent[current] = root;
            current = next;
        }
        root
    }

    /// Representative of `x` without modifying the forest
    pub fn resolve(&self, x: usize) -> usize {
        let mut current = x;
        while self.parent[current] != current {
            current = self.parent[current];
        }
        current
    }

    /// Make `survivor`'s set absorb `absorbed`'s set
    ///
    /// Returns false when both already share a representative.
    pub fn union_into(&mut self, survivor: usize, absorbed: usize) -> bool {
        let survivor = self.find(survivor);
        let absorbed = self.find(absorbed);
        if survivor == absorbed {
            return false;
        }
        self.parent[absorbed] = survivor;
        true
    }

    pub fn is_representative(&self, x: usize) -> bool {
        self.parent[x] == x
    }
}
