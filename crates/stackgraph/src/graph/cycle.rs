//! Cycle detection for the dependency graph

use std::collections::{BTreeMap, BTreeSet};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    White,
    Gray,
    Black,
}

/// Find a cycle in the `requires` relation using a three-color DFS.
///
/// Returns the cycle as a path whose first and last element are the same
/// step, e.g. `["a", "b", "c", "a"]` for `a -> b -> c -> a`.
pub(super) fn find_cycle(edges: &BTreeMap<String, BTreeSet<String>>) -> Option<Vec<String>> {
    let mut marks: BTreeMap<&str, Mark> = edges.keys().map(|k| (k.as_str(), Mark::White)).collect();
    let mut path = Vec::new();

    for node in edges.keys() {
        if marks.get(node.as_str()) == Some(&Mark::White)
            && let Some(cycle) = visit(edges, node, &mut marks, &mut path)
        {
            return Some(cycle);
        }
    }
    None
}

fn visit<'a>(
    edges: &'a BTreeMap<String, BTreeSet<String>>,
    node: &'a str,
    marks: &mut BTreeMap<&'a str, Mark>,
    path: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    marks.insert(node, Mark::Gray);
    path.push(node);

    if let Some(deps) = edges.get(node) {
        for dep in deps {
            match marks.get(dep.as_str()).copied().unwrap_or(Mark::White) {
                Mark::White => {
                    if let Some(cycle) = visit(edges, dep, marks, path) {
                        return Some(cycle);
                    }
                }
                Mark::Gray => {
                    // Back edge: the cycle is the stack suffix starting at `dep`
                    let start = path.iter().position(|p| *p == dep.as_str()).unwrap_or(0);
                    let mut cycle: Vec<String> =
                        path[start..].iter().map(|p| (*p).to_string()).collect();
                    cycle.push(dep.clone());
                    return Some(cycle);
                }
                Mark::Black => {}
            }
        }
    }

    path.pop();
    marks.insert(node, Mark::Black);
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edges(pairs: &[(&str, &[&str])]) -> BTreeMap<String, BTreeSet<String>> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
            .collect()
    }

    #[test]
    fn test_acyclic() {
        let e = edges(&[("a", &[]), ("b", &["a"]), ("c", &["a", "b"])]);
        assert!(find_cycle(&e).is_none());
    }

    #[test]
    fn test_reports_cycle_path() {
        let e = edges(&[("a", &["b"]), ("b", &["c"]), ("c", &["a"]), ("d", &[])]);
        let cycle = find_cycle(&e).unwrap();
        assert_eq!(cycle, vec!["a", "b", "c", "a"]);
    }

    #[test]
    fn test_cycle_excludes_entry_path() {
        // x leads into the cycle but is not part of it
        let e = edges(&[("x", &["y"]), ("y", &["z"]), ("z", &["y"])]);
        let cycle = find_cycle(&e).unwrap();
        assert_eq!(cycle, vec!["y", "z", "y"]);
    }
}
