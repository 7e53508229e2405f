//! DFS-based topological sort, shared by make ordering (§4.4), `WITH`
//! assembly (§4.8), and the Concertina scheduler (§4.9). Lifted near-verbatim
//! from the teacher's `utils/toposort.rs`; it's the right tool for all three
//! because each models its ordering problem the same way: a list of
//! `(key, depends_on)` pairs with no inherent total order, stable by the
//! caller's input order when there's a choice.

use std::collections::HashMap;

type Dag = Vec<Vec<usize>>;

struct Toposort {
    nodes: Vec<Node>,
    order: Vec<usize>,
}

#[derive(Clone, Copy)]
struct Node {
    visiting: bool,
    done: bool,
}

/// Returns `None` if `dependencies` contains a cycle. Otherwise, an order
/// where every key comes after all of its dependencies.
pub fn toposort<Key: Eq + std::hash::Hash + Clone>(
    dependencies: &[(Key, Vec<Key>)],
) -> Option<Vec<Key>> {
    let index: HashMap<&Key, usize> = dependencies
        .iter()
        .enumerate()
        .map(|(i, (key, _))| (key, i))
        .collect();

    let dag: Dag = dependencies
        .iter()
        .map(|(_, deps)| {
            deps.iter()
                .filter_map(|d| index.get(d).copied())
                .collect()
        })
        .collect();

    let empty = Node {
        visiting: false,
        done: false,
    };
    let mut state = Toposort {
        nodes: vec![empty; index.len()],
        order: Vec::with_capacity(index.len()),
    };

    for start in 0..index.len() {
        state.visit(&dag, start).ok()?;
    }

    Some(
        state
            .order
            .iter()
            .map(|i| dependencies[*i].0.clone())
            .collect(),
    )
}

impl Toposort {
    fn visit(&mut self, dag: &Dag, n: usize) -> Result<(), ()> {
        let node = self.nodes[n];
        if node.done {
            return Ok(());
        }
        if node.visiting {
            return Err(());
        }
        self.nodes[n].visiting = true;

        for m in dag[n].clone() {
            self.visit(dag, m)?;
        }

        self.nodes[n].visiting = false;
        self.nodes[n].done = true;
        self.order.push(n);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_by_dependency() {
        let deps = vec![
            ("c", vec!["b"]),
            ("b", vec!["a"]),
            ("a", vec![]),
        ];
        let order = toposort(&deps).unwrap();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn detects_cycles() {
        let deps = vec![("a", vec!["b"]), ("b", vec!["a"])];
        assert!(toposort(&deps).is_none());
    }
}
