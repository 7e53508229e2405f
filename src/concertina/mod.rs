//! The Concertina executor (§4.9): a single-threaded, cooperative scheduler
//! over a small action graph. Each action is either a `none`-launcher marker
//! (already satisfied, nothing to run) or a `query` that the caller's
//! [`crate::runner::SqlRunner`] executes, with `is_final` set exactly for
//! actions whose predicate the caller asked to see rows for.

pub mod display;

use std::collections::HashSet;

use crate::error::Error;
use crate::runner::SqlRunner;
use crate::utils::toposort;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionType {
    Data,
    Intermediate,
    Final,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Launcher {
    None,
    Query,
}

#[derive(Debug, Clone)]
pub struct Action {
    pub name: String,
    pub action_type: ActionType,
    pub requires: Vec<String>,
    pub launcher: Launcher,
    pub engine: String,
    pub predicate: String,
    pub sql: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionStatus {
    Ready,
    Running,
    Complete,
}

pub struct Graph {
    pub actions: Vec<Action>,
    status: Vec<ActionStatus>,
}

/// One action's outcome: `Some((header, rows))` for a final query, `None`
/// for everything else (side-effecting queries, and `none`-launcher markers).
pub type ActionResult = Option<(Vec<String>, Vec<Vec<String>>)>;

impl Graph {
    pub fn build(actions: Vec<Action>) -> Result<Self, Error> {
        let deps: Vec<(String, Vec<String>)> =
            actions.iter().map(|a| (a.name.clone(), a.requires.clone())).collect();
        let order = toposort(&deps)
            .ok_or_else(|| Error::simple("dependency cycle in the Concertina action graph"))?;

        let mut by_name: std::collections::HashMap<String, Action> =
            actions.into_iter().map(|a| (a.name.clone(), a)).collect();
        let ordered: Vec<Action> = order
            .into_iter()
            .filter_map(|name| by_name.remove(&name))
            .collect();
        let status = vec![ActionStatus::Ready; ordered.len()];
        Ok(Graph { actions: ordered, status })
    }

    pub fn status_of(&self, name: &str) -> Option<ActionStatus> {
        self.actions.iter().position(|a| a.name == name).map(|i| self.status[i])
    }

    pub fn ready_names(&self) -> Vec<&str> {
        self.actions
            .iter()
            .zip(&self.status)
            .filter(|(_, s)| **s == ActionStatus::Ready)
            .map(|(a, _)| a.name.as_str())
            .collect()
    }

    /// Runs every action exactly once, in topological order, against
    /// `runner`. Returns the final-query results keyed by predicate name, in
    /// action order.
    pub fn run(&mut self, runner: &dyn SqlRunner) -> Result<Vec<(String, ActionResult)>, Error> {
        let mut results = Vec::new();
        let mut completed: HashSet<String> = HashSet::new();

        for i in 0..self.actions.len() {
            let action = self.actions[i].clone();
            for dep in &action.requires {
                if !completed.contains(dep) {
                    return Err(Error::simple(format!(
                        "action `{}` ran before its dependency `{dep}` completed",
                        action.name
                    )));
                }
            }

            self.status[i] = ActionStatus::Running;
            log::info!("concertina: scheduling action `{}` on engine `{}`", action.name, action.engine);
            let outcome = match action.launcher {
                Launcher::None => None,
                Launcher::Query => {
                    let is_final = action.action_type == ActionType::Final;
                    runner.run(&action.sql, &action.engine, is_final)?
                }
            };
            self.status[i] = ActionStatus::Complete;
            log::info!("concertina: action `{}` complete", action.name);
            completed.insert(action.name.clone());
            results.push((action.name.clone(), outcome));
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::NullRunner;

    fn action(name: &str, requires: &[&str], launcher: Launcher) -> Action {
        Action {
            name: name.to_string(),
            action_type: ActionType::Intermediate,
            requires: requires.iter().map(|s| s.to_string()).collect(),
            launcher,
            engine: "sqlite".to_string(),
            predicate: name.to_string(),
            sql: format!("SELECT * FROM {name}"),
        }
    }

    #[test]
    fn orders_actions_by_dependency() {
        let graph = Graph::build(vec![
            action("B", &["A"], Launcher::Query),
            action("A", &[], Launcher::Query),
        ])
        .unwrap();
        let names: Vec<&str> = graph.actions.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn runs_every_action_exactly_once() {
        let mut graph = Graph::build(vec![
            action("A", &[], Launcher::Query),
            action("B", &["A"], Launcher::Query),
        ])
        .unwrap();
        let runner = NullRunner;
        let results = graph.run(&runner).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(graph.status_of("A"), Some(ActionStatus::Complete));
        assert_eq!(graph.status_of("B"), Some(ActionStatus::Complete));
    }

    #[test]
    fn cyclic_requirements_are_rejected() {
        let err = Graph::build(vec![action("A", &["B"], Launcher::Query), action("B", &["A"], Launcher::Query)]);
        assert!(err.is_err());
    }
}
