//! Pluggable graph display (§4.9): three renderers over the same
//! [`Graph`] state, matching the teacher's habit of keeping presentation
//! concerns as small, swappable trait impls rather than branching deep
//! inside the scheduler.

use strum_macros::{Display, EnumString};

use super::{ActionStatus, Graph};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum DisplayMode {
    None,
    Ascii,
    Graph,
}

pub fn render(graph: &Graph, mode: DisplayMode) -> String {
    match mode {
        DisplayMode::None => String::new(),
        DisplayMode::Ascii => render_ascii(graph),
        DisplayMode::Graph => render_graphviz(graph),
    }
}

fn status_glyph(status: ActionStatus) -> &'static str {
    match status {
        ActionStatus::Ready => ".",
        ActionStatus::Running => "*",
        ActionStatus::Complete => "x",
    }
}

fn render_ascii(graph: &Graph) -> String {
    let mut out = String::new();
    for action in &graph.actions {
        let status = graph.status_of(&action.name).unwrap_or(ActionStatus::Ready);
        out.push_str(&format!("[{}] {}", status_glyph(status), action.name));
        if !action.requires.is_empty() {
            out.push_str(" <- ");
            out.push_str(&action.requires.join(", "));
        }
        out.push('\n');
    }
    out
}

/// A minimal Graphviz `dot` source — enough for the colab-notebook-style
/// `graph` display mode to hand to a renderer; this crate doesn't render
/// images itself.
fn render_graphviz(graph: &Graph) -> String {
    let mut out = String::from("digraph concertina {\n");
    for action in &graph.actions {
        out.push_str(&format!("  \"{}\";\n", action.name));
        for dep in &action.requires {
            out.push_str(&format!("  \"{dep}\" -> \"{}\";\n", action.name));
        }
    }
    out.push_str("}\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concertina::{Action, ActionType, Launcher};

    fn graph() -> Graph {
        Graph::build(vec![Action {
            name: "A".to_string(),
            action_type: ActionType::Final,
            requires: Vec::new(),
            launcher: Launcher::Query,
            engine: "sqlite".to_string(),
            predicate: "A".to_string(),
            sql: "SELECT 1".to_string(),
        }])
        .unwrap()
    }

    #[test]
    fn none_mode_renders_empty() {
        assert_eq!(render(&graph(), DisplayMode::None), "");
    }

    #[test]
    fn ascii_mode_lists_each_action() {
        assert!(render(&graph(), DisplayMode::Ascii).contains("A"));
    }

    #[test]
    fn graph_mode_emits_dot_source() {
        assert!(render(&graph(), DisplayMode::Graph).starts_with("digraph"));
    }
}
