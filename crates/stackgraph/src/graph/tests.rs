use super::*;

fn dict(pairs: &[(&str, &[&str])]) -> GraphDict {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
        .collect()
}

fn position(order: &[String], name: &str) -> usize {
    order.iter().position(|n| n == name).unwrap()
}

#[test]
fn test_add_step_rejects_duplicates() {
    let mut graph = Graph::new();
    graph.add_step(Step::new("vpc")).unwrap();
    let err = graph.add_step(Step::new("vpc")).unwrap_err();
    assert!(matches!(err, GraphError::DuplicateStep(name) if name == "vpc"));
    assert!(!graph.add_step_if_not_exists(Step::new("vpc")));
    assert!(graph.add_step_if_not_exists(Step::new("bastion")));
    assert_eq!(graph.len(), 2);
}

#[test]
fn test_add_dependency_requires_both_endpoints() {
    let mut graph = Graph::new();
    graph.add_step(Step::new("bastion")).unwrap();

    let err = graph.add_dependency("bastion", "vpc").unwrap_err();
    assert!(matches!(err, GraphError::DanglingDependency { .. }));

    let err = graph.add_dependency("missing", "bastion").unwrap_err();
    assert!(matches!(err, GraphError::StepNotFound(_)));

    let err = graph.add_dependency("bastion", "bastion").unwrap_err();
    assert!(matches!(err, GraphError::SelfDependency(_)));
}

#[test]
fn test_from_definitions_with_required_by() {
    let graph = Graph::from_definitions([
        StepDefinition::new(Step::new("vpc")).required_by(["bastion"]),
        StepDefinition::new(Step::new("bastion")),
        StepDefinition::new(Step::new("app")).requires(["bastion"]),
    ])
    .unwrap();

    assert_eq!(graph.requires("bastion"), BTreeSet::from(["vpc".to_string()]));
    assert_eq!(graph.required_by("bastion"), BTreeSet::from(["app".to_string()]));
    assert_eq!(
        graph.transitive_dependencies("app"),
        BTreeSet::from(["bastion".to_string(), "vpc".to_string()])
    );
    assert_eq!(
        graph.transitive_dependents("vpc"),
        BTreeSet::from(["app".to_string(), "bastion".to_string()])
    );
}

#[test]
fn test_required_by_self_is_rejected() {
    let err = Graph::from_definitions([StepDefinition::new(Step::new("vpc")).required_by(["vpc"])])
        .unwrap_err();
    assert!(matches!(err, GraphError::SelfDependency(name) if name == "vpc"));
}

#[test]
fn test_required_by_unknown_step_is_dangling() {
    let err = Graph::from_definitions([StepDefinition::new(Step::new("vpc")).required_by(["app"])])
        .unwrap_err();
    assert!(matches!(err, GraphError::DanglingDependency { dependency, .. } if dependency == "app"));
}

#[test]
fn test_cycle_is_detected_before_ordering() {
    let err = Graph::from_definitions([
        StepDefinition::new(Step::new("a")).requires(["c"]),
        StepDefinition::new(Step::new("b")).requires(["a"]),
        StepDefinition::new(Step::new("c")).requires(["b"]),
    ])
    .unwrap_err();

    let member = err.cycle_member().unwrap().to_string();
    assert!(["a", "b", "c"].contains(&member.as_str()));
    assert!(err.to_string().contains(" -> "));
}

#[test]
fn test_cycle_via_required_by() {
    let err = Graph::from_definitions([
        StepDefinition::new(Step::new("a")).requires(["b"]),
        StepDefinition::new(Step::new("b")).required_by(["a"]).requires(["a"]),
    ])
    .unwrap_err();
    assert!(matches!(err, GraphError::Cycle { .. }));
}

#[test]
fn test_topological_order_respects_edges() {
    let graph = Graph::from_dict(&dict(&[
        ("vpc", &[]),
        ("db", &["vpc"]),
        ("bastion", &["vpc"]),
        ("app", &["db", "bastion"]),
        ("dns", &[]),
    ]))
    .unwrap();

    let build = graph.topological_order(false).unwrap();
    let destroy = graph.topological_order(true).unwrap();
    assert_eq!(build.len(), 5);

    for (step, deps) in graph.to_dict() {
        for dep in deps {
            assert!(position(&build, &dep) < position(&build, &step));
            assert!(position(&destroy, &dep) > position(&destroy, &step));
        }
    }
}

#[test]
fn test_topological_order_is_deterministic() {
    let graph = Graph::from_dict(&dict(&[("c", &[]), ("b", &[]), ("a", &["c"])])).unwrap();
    assert_eq!(graph.topological_order(false).unwrap(), vec!["b", "c", "a"]);
}

#[test]
fn test_dict_round_trip() {
    let data = dict(&[("stack1", &[]), ("stack2", &["stack1"]), ("stack3", &["stack1", "stack2"])]);
    let graph = Graph::from_dict(&data).unwrap();
    assert_eq!(graph.to_dict(), data);
    assert!(graph.steps().all(Step::is_pending));
}

#[test]
fn test_from_dict_rejects_unknown_dependency() {
    let err = Graph::from_dict(&dict(&[("stack2", &["stack1"])])).unwrap_err();
    assert!(matches!(err, GraphError::DanglingDependency { .. }));
}

#[test]
fn test_dumps_and_loads() {
    let graph = Graph::from_dict(&dict(&[("stack1", &[]), ("stack2", &["stack1"])])).unwrap();
    let json = graph.dumps(false).unwrap();
    assert_eq!(json, r#"{"stack1":[],"stack2":["stack1"]}"#);
    assert_eq!(Graph::loads(&json).unwrap().to_dict(), graph.to_dict());
    assert!(matches!(Graph::loads("not json"), Err(GraphError::Json(_))));
}

#[test]
fn test_prune_removes_edges() {
    let mut graph =
        Graph::from_dict(&dict(&[("vpc", &[]), ("bastion", &["vpc"]), ("other", &[])])).unwrap();
    let removed = graph.prune("vpc").unwrap();
    assert_eq!(removed.name(), "vpc");
    assert!(graph.prune("vpc").is_none());
    assert_eq!(graph.to_dict(), dict(&[("bastion", &[]), ("other", &[])]));
}

#[test]
fn test_filtered_keeps_dependencies() {
    let graph = Graph::from_dict(&dict(&[
        ("vpc", &[]),
        ("bastion", &["vpc"]),
        ("app", &["bastion"]),
        ("other", &[]),
    ]))
    .unwrap();

    let filtered = graph.filtered(["bastion"]).unwrap();
    assert_eq!(filtered.to_dict(), dict(&[("bastion", &["vpc"]), ("vpc", &[])]));

    assert!(matches!(graph.filtered(["nope"]), Err(GraphError::StepNotFound(_))));
}

#[test]
fn test_filtered_dependents_keeps_dependents() {
    let graph = Graph::from_dict(&dict(&[
        ("vpc", &[]),
        ("bastion", &["vpc"]),
        ("app", &["bastion"]),
        ("other", &[]),
    ]))
    .unwrap();

    let filtered = graph.filtered_dependents(["bastion"]).unwrap();
    assert_eq!(filtered.to_dict(), dict(&[("app", &["bastion"]), ("bastion", &[])]));

    let filtered = graph.filtered_dependents(["vpc"]).unwrap();
    assert_eq!(filtered.len(), 3);
    assert_eq!(filtered.topological_order(true).unwrap(), ["app", "bastion", "vpc"]);

    assert!(matches!(graph.filtered_dependents(["nope"]), Err(GraphError::StepNotFound(_))));
}

#[test]
fn test_transposed() {
    let graph = Graph::from_dict(&dict(&[("vpc", &[]), ("bastion", &["vpc"])])).unwrap();
    let transposed = graph.transposed();
    assert_eq!(transposed.to_dict(), dict(&[("bastion", &[]), ("vpc", &["bastion"])]));
}

#[test]
fn test_max_in_degree() {
    let graph =
        Graph::from_dict(&dict(&[("vpc", &[]), ("a", &["vpc"]), ("b", &["vpc"]), ("c", &["a"])]))
            .unwrap();
    assert_eq!(graph.max_in_degree(), 2);
    assert_eq!(Graph::new().max_in_degree(), 0);
}

#[test]
fn test_replace_dependencies() {
    let mut graph =
        Graph::from_dict(&dict(&[("vpc", &[]), ("dns", &[]), ("app", &["vpc"])])).unwrap();

    graph.replace_dependencies("app", ["dns"]).unwrap();
    assert_eq!(graph.requires("app"), BTreeSet::from(["dns".to_string()]));

    let err = graph.replace_dependencies("app", ["dns", "gone"]).unwrap_err();
    assert!(matches!(err, GraphError::DanglingDependency { .. }));
    assert_eq!(graph.requires("app"), BTreeSet::from(["dns".to_string()]));

    assert!(matches!(
        graph.replace_dependencies("nope", Vec::<String>::new()),
        Err(GraphError::StepNotFound(_))
    ));
}
