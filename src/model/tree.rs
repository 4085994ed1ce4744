//! CART regression tree (squared-error splits)
//!
//! Trees are grown on a subset of frame rows against an arbitrary target
//! slice, so forests can pass bootstrap samples and boosting can pass
//! residuals without copying the feature matrix.

use serde::{Deserialize, Serialize};

use crate::frame::FeatureFrame;
use crate::search::Configuration;
use crate::{Error, Result};

/// Stopping rules shared by every tree-based family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeParams {
    /// Maximum depth; `None` grows until the other rules stop it
    pub max_depth: Option<usize>,
    /// Minimum rows a node needs before it may split
    pub min_samples_split: usize,
    /// Minimum rows each child must keep
    pub min_samples_leaf: usize,
}

impl TreeParams {
    /// Read `max_depth`, `min_samples_split` and `min_samples_leaf`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` on wrongly typed values or
    /// `min_samples_split < 2`.
    pub fn from_config(config: &Configuration, default_depth: Option<usize>) -> Result<Self> {
        let params = Self {
            max_depth: config.opt_usize_or("max_depth", default_depth)?,
            min_samples_split: config.usize_or("min_samples_split", 2)?,
            min_samples_leaf: config.usize_or("min_samples_leaf", 1)?,
        };
        if params.min_samples_split < 2 {
            return Err(Error::InvalidInput(
                "min_samples_split must be at least 2".to_string(),
            ));
        }
        Ok(params)
    }
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

struct Split {
    feature: usize,
    threshold: f64,
}

/// Binary regression tree stored as a node arena; node 0 is the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    /// Grow a tree on `rows` of `frame`, predicting `target[row]`.
    ///
    /// `rows` may repeat indices (bootstrap samples).
    ///
    /// # Errors
    ///
    /// Returns `FitFailure` if `rows` is empty.
    pub fn fit(
        frame: &FeatureFrame,
        target: &[f64],
        rows: &[usize],
        params: TreeParams,
    ) -> Result<Self> {
        if rows.is_empty() {
            return Err(Error::FitFailure(
                "cannot grow a tree on zero rows".to_string(),
            ));
        }
        let mut tree = Self { nodes: Vec::new() };
        let mut rows = rows.to_vec();
        tree.grow(frame, target, &mut rows, 0, params);
        Ok(tree)
    }

    /// Number of nodes (splits and leaves).
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Depth of the deepest leaf (a single leaf has depth 0).
    #[must_use]
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], at: usize) -> usize {
            match nodes[at] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, left).max(walk(nodes, right)),
            }
        }
        walk(&self.nodes, 0)
    }

    /// Check that the arena is a well-formed tree over `n_features` inputs.
    ///
    /// Children always sit after their parent, which also rules out cycles.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` describing the first malformed node.
    pub fn validate(&self, n_features: usize) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(Error::InvalidInput("tree has no nodes".to_string()));
        }
        for (at, node) in self.nodes.iter().enumerate() {
            match *node {
                Node::Leaf { value } if !value.is_finite() => {
                    return Err(Error::InvalidInput(format!(
                        "leaf {at} has non-finite value {value}"
                    )));
                }
                Node::Leaf { .. } => {}
                Node::Split {
                    feature,
                    left,
                    right,
                    ..
                } => {
                    if feature >= n_features {
                        return Err(Error::InvalidInput(format!(
                            "node {at} splits on feature {feature} of {n_features}"
                        )));
                    }
                    for child in [left, right] {
                        if child <= at || child >= self.nodes.len() {
                            return Err(Error::InvalidInput(format!(
                                "node {at} points at invalid child {child}"
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Predict one row laid out in training feature order.
    #[must_use]
    pub fn predict_row(&self, row: &[f64]) -> f64 {
        let mut at = 0;
        loop {
            match self.nodes[at] {
                Node::Leaf { value } => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => at = if row[feature] <= threshold { left } else { right },
            }
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn grow(
        &mut self,
        frame: &FeatureFrame,
        target: &[f64],
        rows: &mut [usize],
        depth: usize,
        params: TreeParams,
    ) -> usize {
        let n = rows.len();
        let value = rows.iter().map(|&r| target[r]).sum::<f64>() / n as f64;
        let at = self.nodes.len();
        self.nodes.push(Node::Leaf { value });

        let depth_left = params.max_depth.is_none_or(|max| depth < max);
        if !depth_left || n < params.min_samples_split || n < 2 * params.min_samples_leaf {
            return at;
        }
        let Some(split) = best_split(frame, target, rows, value, params.min_samples_leaf) else {
            return at;
        };

        let mid = partition(rows, |r| frame.row(r)[split.feature] <= split.threshold);
        let (left_rows, right_rows) = rows.split_at_mut(mid);
        let left = self.grow(frame, target, left_rows, depth + 1, params);
        let right = self.grow(frame, target, right_rows, depth + 1, params);
        self.nodes[at] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        at
    }
}

/// Move rows satisfying `pred` to the front; returns how many did.
fn partition(rows: &mut [usize], pred: impl Fn(usize) -> bool) -> usize {
    let mut mid = 0;
    for i in 0..rows.len() {
        if pred(rows[i]) {
            rows.swap(i, mid);
            mid += 1;
        }
    }
    mid
}

/// Lowest children SSE over every feature and every boundary between
/// distinct values. Targets are centred on the node mean to keep the
/// sum-of-squares arithmetic well conditioned.
#[allow(clippy::cast_precision_loss)]
fn best_split(
    frame: &FeatureFrame,
    target: &[f64],
    rows: &[usize],
    node_mean: f64,
    min_leaf: usize,
) -> Option<Split> {
    let n = rows.len();
    let centred: Vec<f64> = rows.iter().map(|&r| target[r] - node_mean).collect();
    let total_sum: f64 = centred.iter().sum();
    let total_sq: f64 = centred.iter().map(|v| v * v).sum();
    let parent_sse = total_sq - total_sum * total_sum / n as f64;
    if parent_sse <= f64::EPSILON * n as f64 {
        return None;
    }

    let mut best: Option<(f64, Split)> = None;
    let mut pairs: Vec<(f64, f64)> = Vec::with_capacity(n);
    for feature in 0..frame.n_features() {
        pairs.clear();
        pairs.extend(
            rows.iter()
                .zip(&centred)
                .map(|(&r, &y)| (frame.row(r)[feature], y)),
        );
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        let (mut left_sum, mut left_sq) = (0.0, 0.0);
        for i in 0..n - 1 {
            let (x, y) = pairs[i];
            left_sum += y;
            left_sq += y * y;
            let next = pairs[i + 1].0;
            let (n_left, n_right) = (i + 1, n - i - 1);
            if x == next || n_left < min_leaf || n_right < min_leaf {
                continue;
            }
            let right_sum = total_sum - left_sum;
            let right_sq = total_sq - left_sq;
            let sse = (left_sq - left_sum * left_sum / n_left as f64)
                + (right_sq - right_sum * right_sum / n_right as f64);

            if best.as_ref().is_none_or(|(b, _)| sse < *b) {
                let mut threshold = x + (next - x) / 2.0;
                if threshold >= next {
                    threshold = x;
                }
                best = Some((sse, Split { feature, threshold }));
            }
        }
    }

    best.filter(|(sse, _)| *sse < parent_sse - 1e-12 * parent_sse)
        .map(|(_, split)| split)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FeatureList;

    fn step_frame() -> FeatureFrame {
        let rows: Vec<Vec<f64>> = (0..20).map(|i| vec![f64::from(i)]).collect();
        let target = (0..20).map(|i| if i < 10 { 1.0 } else { 5.0 }).collect();
        FeatureFrame::from_rows(FeatureList::new(["x"]).unwrap(), &rows, target).unwrap()
    }

    #[test]
    fn test_learns_step_function() {
        let frame = step_frame();
        let rows: Vec<usize> = (0..frame.n_rows()).collect();
        let tree =
            RegressionTree::fit(&frame, frame.target(), &rows, TreeParams::default()).unwrap();

        assert_eq!(tree.depth(), 1);
        assert!((tree.predict_row(&[3.0]) - 1.0).abs() < 1e-12);
        assert!((tree.predict_row(&[12.0]) - 5.0).abs() < 1e-12);
        // boundary sits halfway between 9 and 10
        assert!((tree.predict_row(&[9.4]) - 1.0).abs() < 1e-12);
        assert!((tree.predict_row(&[9.6]) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_max_depth_zero_is_mean() {
        let frame = step_frame();
        let rows: Vec<usize> = (0..frame.n_rows()).collect();
        let params = TreeParams {
            max_depth: Some(0),
            ..TreeParams::default()
        };
        let tree = RegressionTree::fit(&frame, frame.target(), &rows, params).unwrap();
        assert_eq!(tree.node_count(), 1);
        assert!((tree.predict_row(&[0.0]) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_min_samples_leaf_respected() {
        let frame = step_frame();
        let rows: Vec<usize> = (0..frame.n_rows()).collect();
        let params = TreeParams {
            min_samples_leaf: 15,
            ..TreeParams::default()
        };
        let tree = RegressionTree::fit(&frame, frame.target(), &rows, params).unwrap();
        assert_eq!(tree.node_count(), 1);
    }

    #[test]
    fn test_empty_rows_fail() {
        let frame = step_frame();
        assert!(matches!(
            RegressionTree::fit(&frame, frame.target(), &[], TreeParams::default()),
            Err(Error::FitFailure(_))
        ));
    }
}
