//! Pattern-driven graph rewriting
//!
//! A [`RewriteRule`] publishes a pattern and a replacement action. The
//! [`PassManager`] orders the registered rules by their `run_after` /
//! `run_before` declarations once, when it is built, and then runs each rule to
//! completion on the graph.
//!
//! ## Rules (default set)
//!
//! 1. **Tile legalization** - rank-3 Tile wrapped in Reshapes to rank 4
//! 2. **Permute fusion** - two consecutive Permutes composed into one (or none)
//! 3. **Mul-into-Quantize fusion** - constant multiplier folded into thresholds
//! 4. **StridedSlice layout** - NHWC masks and bounds converted to NCHW
//! 5. **Dead node elimination** - unconsumed operators and orphan data removed
//!
//! A rule that does not apply to a match returns `Ok(false)` and leaves the
//! graph untouched; every error aborts the run.

mod dead_nodes;
mod fuse_permutes;
mod mul_quantize;
mod order;
mod strided_slice_layout;
mod tile_reshape;

use std::collections::HashSet;

pub use dead_nodes::DeadNodeElimination;
pub use fuse_permutes::FusePermutesSequence;
pub use mul_quantize::MulQuantizeFuse;
pub use strided_slice_layout::StridedSliceLayout;
pub use tile_reshape::TileReshaper;

use crate::error::GraphError;
use crate::ir::{Graph, NodeId};
use crate::pattern::{Match, Pattern, find_first};

/// Maximum number of fixed-point iterations to prevent runaway loops.
pub const MAX_ITERATIONS: usize = 10;

/// How the driver re-applies a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuleMode {
    /// Every match is offered to the rule once.
    #[default]
    Once,
    /// Sweeps repeat until a sweep rewrites nothing, bounded by the pass
    /// manager's iteration limit.
    FixedPoint,
}

pub trait RewriteRule {
    /// Unique name, used by `run_after` / `run_before` and in logs.
    fn name(&self) -> &'static str;

    fn run_after(&self) -> Vec<&'static str> {
        Vec::new()
    }

    fn run_before(&self) -> Vec<&'static str> {
        Vec::new()
    }

    fn mode(&self) -> RuleMode {
        RuleMode::Once
    }

    /// Pattern driving [`RewriteRule::replace_pattern`]. Rules that override
    /// [`RewriteRule::find_and_replace`] may have none.
    fn pattern(&self) -> Result<Option<Pattern>, GraphError> {
        Ok(None)
    }

    /// Rewrite one match. Returns `Ok(false)`, without touching the graph, when
    /// a guard rejects the match.
    fn replace_pattern(&self, _graph: &mut Graph, _m: &Match) -> Result<bool, GraphError> {
        Ok(false)
    }

    /// Apply the rule to the whole graph, returning how many rewrites happened.
    fn find_and_replace(&self, graph: &mut Graph, max_iterations: usize) -> Result<usize, GraphError> {
        let Some(pattern) = self.pattern()? else {
            return Ok(0);
        };

        match self.mode() {
            RuleMode::Once => sweep(self, graph, &pattern),
            RuleMode::FixedPoint => {
                let mut total = 0;
                for iteration in 0..max_iterations {
                    let rewrites = sweep(self, graph, &pattern)?;
                    if rewrites == 0 {
                        log::debug!(
                            "{}: converged after {} iteration(s)",
                            self.name(),
                            iteration + 1
                        );
                        return Ok(total);
                    }
                    total += rewrites;
                }
                log::warn!(
                    "{}: still rewriting after {} iterations, stopping",
                    self.name(),
                    max_iterations
                );
                Ok(total)
            }
        }
    }
}

/// Offer every match to the rule once. The matcher is re-run after each
/// rewrite, so matches are never reused across a mutation.
fn sweep<R: RewriteRule + ?Sized>(
    rule: &R,
    graph: &mut Graph,
    pattern: &Pattern,
) -> Result<usize, GraphError> {
    let mut attempted: HashSet<Vec<NodeId>> = HashSet::new();
    let mut rewrites = 0;

    while let Some(m) = find_first(graph, pattern, |m| attempted.contains(&m.signature())) {
        let signature = m.signature();
        if rule.replace_pattern(graph, &m)? {
            log::info!("{}: rewrote match {:?}", rule.name(), signature);
            rewrites += 1;
        }
        attempted.insert(signature);
    }
    Ok(rewrites)
}

/// Number of rewrites per rule, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub rewrites: Vec<(&'static str, usize)>,
}

impl PassReport {
    pub fn total(&self) -> usize {
        self.rewrites.iter().map(|(_, n)| n).sum()
    }

    pub fn get(&self, rule: &str) -> Option<usize> {
        self.rewrites
            .iter()
            .find(|(name, _)| *name == rule)
            .map(|&(_, n)| n)
    }
}

/// Ordered set of rewrite rules.
pub struct PassManager {
    rules: Vec<Box<dyn RewriteRule>>,
    max_iterations: usize,
}

impl PassManager {
    pub fn builder() -> PassManagerBuilder {
        PassManagerBuilder::default()
    }

    /// Rule names in execution order.
    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|rule| rule.name()).collect()
    }

    /// Run every rule, in order, on `graph`.
    pub fn run(&self, graph: &mut Graph) -> Result<PassReport, GraphError> {
        let mut report = PassReport::default();
        for rule in &self.rules {
            let rewrites = rule.find_and_replace(graph, self.max_iterations)?;
            if rewrites > 0 {
                graph.validate()?;
                log::info!("{}: {} rewrite(s)", rule.name(), rewrites);
            } else {
                log::debug!("{}: nothing to rewrite", rule.name());
            }
            report.rewrites.push((rule.name(), rewrites));
        }
        Ok(report)
    }
}

pub struct PassManagerBuilder {
    rules: Vec<Box<dyn RewriteRule>>,
    disabled: HashSet<String>,
    max_iterations: usize,
}

impl Default for PassManagerBuilder {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            disabled: HashSet::new(),
            max_iterations: MAX_ITERATIONS,
        }
    }
}

impl PassManagerBuilder {
    pub fn rule(mut self, rule: impl RewriteRule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    /// Register the built-in rules.
    pub fn default_rules(self) -> Self {
        self.rule(TileReshaper)
            .rule(FusePermutesSequence)
            .rule(MulQuantizeFuse)
            .rule(StridedSliceLayout)
            .rule(DeadNodeElimination)
    }

    /// Leave a registered rule out of the run.
    pub fn disable(mut self, name: &str) -> Self {
        self.disabled.insert(name.to_string());
        self
    }

    /// Iteration limit for fixed-point rules.
    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Validate every pattern and sort the rules. Fails on a malformed
    /// pattern, a duplicate rule name or an ordering cycle.
    pub fn build(self) -> Result<PassManager, GraphError> {
        let rules: Vec<Box<dyn RewriteRule>> = self
            .rules
            .into_iter()
            .filter(|rule| !self.disabled.contains(rule.name()))
            .collect();

        for rule in &rules {
            rule.pattern()?;
        }

        let order = order::sort_rules(&rules)?;
        let mut slots: Vec<Option<Box<dyn RewriteRule>>> = rules.into_iter().map(Some).collect();
        let rules = order
            .into_iter()
            .filter_map(|i| slots[i].take())
            .collect();

        Ok(PassManager {
            rules,
            max_iterations: self.max_iterations,
        })
    }
}
