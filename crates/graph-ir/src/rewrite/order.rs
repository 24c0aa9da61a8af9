//! Rule ordering from `run_after` / `run_before` declarations.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use crate::error::GraphError;

use super::RewriteRule;

/// Execution order of `rules` as indices into the slice.
///
/// Every declared dependency is honored; ties keep registration order. A
/// reference to a rule that is not registered (or was disabled) is ignored.
pub(crate) fn sort_rules(rules: &[Box<dyn RewriteRule>]) -> Result<Vec<usize>, GraphError> {
    let mut index: HashMap<&'static str, usize> = HashMap::new();
    for (i, rule) in rules.iter().enumerate() {
        if index.insert(rule.name(), i).is_some() {
            return Err(GraphError::DuplicateRule(rule.name().to_string()));
        }
    }

    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); rules.len()];
    let mut in_degree = vec![0usize; rules.len()];
    let mut depend = |before: usize, after: usize| {
        successors[before].push(after);
        in_degree[after] += 1;
    };

    for (i, rule) in rules.iter().enumerate() {
        for name in rule.run_after() {
            match index.get(name) {
                Some(&j) => depend(j, i),
                None => log::debug!("{}: run_after '{}' is not registered", rule.name(), name),
            }
        }
        for name in rule.run_before() {
            match index.get(name) {
                Some(&j) => depend(i, j),
                None => log::debug!("{}: run_before '{}' is not registered", rule.name(), name),
            }
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = (0..rules.len())
        .filter(|&i| in_degree[i] == 0)
        .map(Reverse)
        .collect();
    let mut order = Vec::with_capacity(rules.len());
    while let Some(Reverse(i)) = ready.pop() {
        order.push(i);
        for &next in &successors[i] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push(Reverse(next));
            }
        }
    }

    if order.len() != rules.len() {
        let stuck = (0..rules.len())
            .filter(|&i| in_degree[i] > 0)
            .map(|i| rules[i].name().to_string())
            .collect();
        return Err(GraphError::RuleCycle(stuck));
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named {
        name: &'static str,
        after: Vec<&'static str>,
        before: Vec<&'static str>,
    }

    impl RewriteRule for Named {
        fn name(&self) -> &'static str {
            self.name
        }

        fn run_after(&self) -> Vec<&'static str> {
            self.after.clone()
        }

        fn run_before(&self) -> Vec<&'static str> {
            self.before.clone()
        }
    }

    fn rule(
        name: &'static str,
        after: &[&'static str],
        before: &[&'static str],
    ) -> Box<dyn RewriteRule> {
        Box::new(Named {
            name,
            after: after.to_vec(),
            before: before.to_vec(),
        })
    }

    fn names(rules: &[Box<dyn RewriteRule>], order: &[usize]) -> Vec<&'static str> {
        order.iter().map(|&i| rules[i].name()).collect()
    }

    #[test]
    fn test_registration_order_without_constraints() {
        let rules = vec![rule("a", &[], &[]), rule("b", &[], &[]), rule("c", &[], &[])];
        let order = sort_rules(&rules).unwrap();
        assert_eq!(names(&rules, &order), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_run_after_and_run_before() {
        let rules = vec![
            rule("cleanup", &["fuse"], &[]),
            rule("fuse", &[], &[]),
            rule("layout", &[], &["fuse"]),
        ];
        let order = sort_rules(&rules).unwrap();
        assert_eq!(names(&rules, &order), vec!["layout", "fuse", "cleanup"]);
    }

    #[test]
    fn test_unknown_dependency_ignored() {
        let rules = vec![rule("a", &["missing"], &[]), rule("b", &[], &[])];
        let order = sort_rules(&rules).unwrap();
        assert_eq!(names(&rules, &order), vec!["a", "b"]);
    }

    #[test]
    fn test_cycle_is_config_error() {
        let rules = vec![
            rule("a", &["b"], &[]),
            rule("b", &["c"], &[]),
            rule("c", &["a"], &[]),
            rule("free", &[], &[]),
        ];
        assert_eq!(
            sort_rules(&rules),
            Err(GraphError::RuleCycle(vec![
                "a".to_string(),
                "b".to_string(),
                "c".to_string()
            ]))
        );
    }

    #[test]
    fn test_duplicate_rule_rejected() {
        let rules = vec![rule("a", &[], &[]), rule("a", &[], &[])];
        assert_eq!(
            sort_rules(&rules),
            Err(GraphError::DuplicateRule("a".to_string()))
        );
    }
}
