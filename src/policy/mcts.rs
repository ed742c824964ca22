use std::collections::{BTreeMap, BTreeSet};

use log::debug;
use ndarray::{Array1, ArrayView1};
use rand::rngs::StdRng;
use rand_distr::{Distribution, Gamma};

use super::{check_candidates, ExplorationPolicy, PolicyKind};
use crate::error::{PallasError, Result};
use crate::params::{ParamDef, ParamSet, ParamType};

pub const PARAMS: &[ParamDef] = &[
    ParamDef::new("cPUCT", ParamType::Float),
    ParamDef::new("alpha", ParamType::Float),
    ParamDef::new("epsilon", ParamType::Float),
    ParamDef::new("tau", ParamType::Float),
    ParamDef::new("resetCycle", ParamType::Int),
    ParamDef::new("maxTreeSize", ParamType::Int),
];

/// Node count past which the tree is dropped at the next episode end
pub const DEFAULT_MAX_TREE_SIZE: usize = 100_000;

#[derive(Debug, Clone)]
struct Edge {
    prior: f32,
    value: f32,
    visits: u32,
    child: usize,
}

#[derive(Debug, Clone, Default)]
struct Node {
    visits: u32,
    edges: BTreeMap<usize, Edge>,
}

/// PUCT search over the tree of action sequences taken from the episode
/// start.
///
/// Each selection descends one level: priors come from the action values,
/// Dirichlet noise is mixed in, and the action maximising
/// `Q + c·(ε·P + (1 − ε)·η)·√N / (1 + n)` is taken. At episode end the
/// observed returns are averaged into the edges along the path.
///
/// The tree is rebuilt from an empty root every `resetCycle` episodes, and at
/// any episode end where it holds more than `maxTreeSize` nodes. Setting both
/// to 0 lets it grow without limit.
#[derive(Debug, Clone)]
pub struct MctsPolicy {
    c_puct: f32,
    epsilon: f32,
    tau: f32,
    reset_cycle: usize,
    max_nodes: usize,
    episodes: usize,
    noise: Gamma<f32>,
    nodes: Vec<Node>,
    path: Vec<(usize, usize)>,
}

impl MctsPolicy {
    pub fn new(c_puct: f32, alpha: f32, epsilon: f32, tau: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&epsilon) {
            return Err(PallasError::invalid_parameter(
                "epsilon".to_string(),
                format!("must be within [0, 1], got {}", epsilon),
            ));
        }
        if !(tau > 0.0) {
            return Err(PallasError::invalid_parameter(
                "tau".to_string(),
                format!("must be positive, got {}", tau),
            ));
        }
        let noise = Gamma::new(alpha, 1.0).map_err(|e| {
            PallasError::invalid_parameter("alpha".to_string(), format!("invalid Dirichlet shape {}: {}", alpha, e))
        })?;
        Ok(MctsPolicy {
            c_puct,
            epsilon,
            tau,
            reset_cycle: 0,
            max_nodes: DEFAULT_MAX_TREE_SIZE,
            episodes: 0,
            noise,
            nodes: vec![Node::default()],
            path: Vec::new(),
        })
    }

    pub fn from_params(params: &ParamSet) -> Result<Self> {
        let mut policy = Self::new(
            params.float_or("cPUCT", 2.5),
            params.float_or("alpha", 0.6),
            params.float_or("epsilon", 0.8),
            params.float_or("tau", 1.1),
        )?;
        policy.reset_cycle = params.usize_or("resetCycle", 0)?;
        policy.max_nodes = params.usize_or("maxTreeSize", DEFAULT_MAX_TREE_SIZE)?;
        Ok(policy)
    }

    pub fn tree_size(&self) -> usize {
        self.nodes.len()
    }

    fn current_node(&self) -> usize {
        match self.path.last() {
            Some(&(node, action)) => self.nodes[node].edges.get(&action).map_or(0, |e| e.child),
            None => 0,
        }
    }

    fn refresh_priors(&mut self, node: usize, values: ArrayView1<f32>, available: &BTreeSet<usize>) {
        for &action in available {
            let prior = values[action].max(0.0);
            if let Some(edge) = self.nodes[node].edges.get_mut(&action) {
                edge.prior = prior;
                continue;
            }
            self.nodes.push(Node::default());
            let child = self.nodes.len() - 1;
            self.nodes[node].edges.insert(
                action,
                Edge {
                    prior,
                    value: 0.0,
                    visits: 0,
                    child,
                },
            );
        }
        let total: f32 = self.nodes[node].edges.values().map(|e| e.prior).sum();
        if total > 0.0 && total.is_finite() {
            for edge in self.nodes[node].edges.values_mut() {
                edge.prior /= total;
            }
        }
    }

    fn dirichlet(&self, n: usize, rng: &mut StdRng) -> Vec<f32> {
        let draws: Vec<f32> = (0..n).map(|_| self.noise.sample(rng)).collect();
        let total: f32 = draws.iter().sum();
        if total > 0.0 {
            draws.iter().map(|d| d / total).collect()
        } else {
            vec![1.0 / n as f32; n]
        }
    }
}

impl ExplorationPolicy for MctsPolicy {
    fn kind(&self) -> PolicyKind {
        PolicyKind::Mcts
    }

    fn select(&mut self, values: ArrayView1<f32>, available: &BTreeSet<usize>, rng: &mut StdRng) -> Result<usize> {
        check_candidates(values, available)?;
        let node = self.current_node();
        self.refresh_priors(node, values, available);
        self.nodes[node].visits += 1;

        let noise = self.dirichlet(available.len(), rng);
        let parent_visits = (self.nodes[node].visits as f32).sqrt();
        let mut best: Option<(usize, f32)> = None;
        for (&action, eta) in available.iter().zip(noise) {
            let edge = &self.nodes[node].edges[&action];
            let prior = self.epsilon * edge.prior + (1.0 - self.epsilon) * eta;
            let score = edge.value + self.c_puct * prior * parent_visits / (1.0 + edge.visits as f32);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((action, score));
            }
        }
        let (action, _) = best.ok_or_else(|| PallasError::protocol("policy", "no available actions to choose from"))?;
        if let Some(edge) = self.nodes[node].edges.get_mut(&action) {
            edge.visits += 1;
        }
        self.path.push((node, action));
        Ok(action)
    }

    /// Visit counts of the node last searched, sharpened by `1/tau`.
    fn visit_distribution(&self, action_count: usize) -> Option<Array1<f32>> {
        let &(node, _) = self.path.last()?;
        let mut distribution = Array1::zeros(action_count);
        for (&action, edge) in &self.nodes[node].edges {
            if action < action_count {
                distribution[action] = (edge.visits as f32).powf(1.0 / self.tau);
            }
        }
        let total = distribution.sum();
        if total > 0.0 {
            distribution /= total;
        }
        Some(distribution)
    }

    fn end_episode(&mut self, returns: &[f32]) {
        for (&(node, action), &ret) in self.path.iter().zip(returns) {
            if let Some(edge) = self.nodes[node].edges.get_mut(&action) {
                edge.value += (ret - edge.value) / edge.visits.max(1) as f32;
            }
        }
        self.path.clear();
        self.episodes += 1;
        let scheduled = self.reset_cycle > 0 && self.episodes % self.reset_cycle == 0;
        let oversized = self.max_nodes > 0 && self.nodes.len() > self.max_nodes;
        if scheduled || oversized {
            debug!("resetting search tree of {} nodes", self.nodes.len());
            self.nodes = vec![Node::default()];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;

    #[test]
    fn path_descends_and_resets() {
        let mut policy = MctsPolicy::new(2.5, 0.6, 0.8, 1.1).unwrap();
        let mut rng = StdRng::seed_from_u64(6);
        let values = array![0.2, 0.5, 0.3];
        let first = policy.select(values.view(), &BTreeSet::from([0, 1, 2]), &mut rng).unwrap();
        let mut rest = BTreeSet::from([0, 1, 2]);
        rest.remove(&first);
        let second = policy.select(values.view(), &rest, &mut rng).unwrap();
        assert!(rest.contains(&second));
        // root + three children + two grandchildren
        assert_eq!(policy.tree_size(), 6);

        let dist = policy.visit_distribution(3).unwrap();
        assert!((dist.sum() - 1.0).abs() < 1e-5);
        assert_eq!(dist[second], 1.0);

        policy.end_episode(&[1.0, 1.0]);
        assert!(policy.visit_distribution(3).is_none());
        let root_edge = &policy.nodes[0].edges[&first];
        assert_eq!(root_edge.value, 1.0);
    }

    #[test]
    fn oversized_tree_is_dropped_at_episode_end() {
        let params = ParamSet::parse("policy", "maxTreeSize = 5", PARAMS).unwrap();
        let mut policy = MctsPolicy::from_params(&params).unwrap();
        let mut rng = StdRng::seed_from_u64(2);
        let values = array![0.5, 0.5];
        let all = BTreeSet::from([0, 1]);
        for _ in 0..3 {
            policy.select(values.view(), &all, &mut rng).unwrap();
        }
        assert_eq!(policy.tree_size(), 7);
        policy.end_episode(&[0.0, 0.0, 0.0]);
        assert_eq!(policy.tree_size(), 1);

        // under the limit the tree survives
        policy.select(values.view(), &all, &mut rng).unwrap();
        policy.end_episode(&[1.0]);
        assert_eq!(policy.tree_size(), 3);
        assert_eq!(MctsPolicy::new(2.5, 0.6, 0.8, 1.1).unwrap().max_nodes, DEFAULT_MAX_TREE_SIZE);
    }

    #[test]
    fn rejects_bad_shape() {
        assert!(MctsPolicy::new(2.5, 0.0, 0.8, 1.1).is_err());
    }
}
