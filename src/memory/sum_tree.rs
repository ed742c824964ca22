/// Binary tree whose internal nodes hold the sum of their children.
///
/// The leaf level is padded to a power of two so leaves are laid out left to
/// right in index order. Prefix-sum lookups and single-leaf updates are
/// `O(log n)`.
#[derive(Debug, Clone)]
pub struct SumTree {
    tree: Vec<f32>,
    capacity: usize,
    leaves: usize,
}

impl SumTree {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let leaves = capacity.next_power_of_two();
        SumTree {
            tree: vec![0.0; 2 * leaves - 1],
            capacity,
            leaves,
        }
    }

    fn leaf(&self, ix: usize) -> usize {
        ix + self.leaves - 1
    }

    fn leaf_values(&self) -> &[f32] {
        let start = self.leaves - 1;
        &self.tree[start..start + self.capacity]
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Set leaf `ix` to `value` and recompute every ancestor from its children.
    pub fn update(&mut self, ix: usize, value: f32) {
        let mut node = self.leaf(ix);
        self.tree[node] = value;
        while node > 0 {
            node = (node - 1) / 2;
            self.tree[node] = self.tree[2 * node + 1] + self.tree[2 * node + 2];
        }
    }

    /// Leaf value at `ix`.
    pub fn get(&self, ix: usize) -> f32 {
        self.tree[self.leaf(ix)]
    }

    /// Leaf whose cumulative range contains `value`, as `(ix, leaf value)`.
    ///
    /// Values at or beyond the total land on the last non-empty leaf.
    pub fn find(&self, mut value: f32) -> (usize, f32) {
        let mut node = 0;
        loop {
            let left = 2 * node + 1;
            if left >= self.tree.len() {
                break;
            }
            let right = left + 1;
            if value < self.tree[left] || self.tree[right] <= 0.0 {
                node = left;
            } else {
                value -= self.tree[left];
                node = right;
            }
        }
        (node + 1 - self.leaves, self.tree[node])
    }

    pub fn total(&self) -> f32 {
        self.tree[0]
    }

    /// Largest leaf value.
    pub fn max(&self) -> f32 {
        self.leaf_values()
            .iter()
            .fold(0.0_f32, |acc, &v| acc.max(v))
    }

    pub fn clear(&mut self) {
        self.tree.iter_mut().for_each(|v| *v = 0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sum_tree() {
        let mut tree = SumTree::new(5);
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        for (ix, &v) in values.iter().enumerate() {
            tree.update(ix, v);
        }

        assert_eq!(tree.total(), 15.0);
        assert_eq!(tree.max(), 5.0);
        assert_eq!(tree.find(0.5), (0, 1.0));
        assert_eq!(tree.find(1.5), (1, 2.0));
        assert_eq!(tree.find(6.5), (3, 4.0));
        assert_eq!(tree.find(14.9), (4, 5.0));

        tree.update(4, 0.5);
        assert_eq!(tree.total(), 10.5);
    }

    #[test]
    fn test_total_does_not_drift() {
        let mut tree = SumTree::new(8);
        for round in 0..10_000 {
            let ix = round % 8;
            let value = if round % 3 == 0 { 1.0e6 } else { 1.0e-3 * (round % 7) as f32 };
            tree.update(ix, value);
        }
        for ix in 0..8 {
            tree.update(ix, 0.25);
        }
        assert_eq!(tree.total(), 2.0);
        assert_eq!(tree.find(1.9), (7, 0.25));
    }

    #[test]
    fn test_find_skips_empty_right_subtree() {
        let mut tree = SumTree::new(4);
        tree.update(0, 1.0);
        tree.update(1, 1.0);
        // values past the total must still land on a filled leaf
        let (ix, value) = tree.find(5.0);
        assert_eq!(ix, 1);
        assert_eq!(value, 1.0);
    }
}
