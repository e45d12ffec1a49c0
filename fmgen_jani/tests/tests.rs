use fmgen_core::*;
use fmgen_jani::*;
use serde_json::json;

fn uniform(lower: f64, upper: f64) -> Expression {
    Expression::Distribution(Distribution::uniform(lower, upper).unwrap())
}

fn sampler(dest: Destination) -> Model {
    let mut automaton = Automaton::new("sampler");
    automaton.add_location("idle");
    automaton.add_location("done");
    automaton.make_initial("idle").unwrap();
    for var in ["x", "y"] {
        automaton
            .add_variable(Variable::new(var, Type::Real, Some(0.0.into()), true))
            .unwrap();
    }
    automaton
        .add_edge(Edge::new("idle", dest).with_action("sample"))
        .unwrap();
    let mut model = Model::new("sampling");
    model.add_automaton(automaton).unwrap();
    let mut composition = Composition::default();
    composition.add_element("sampler").unwrap();
    model.set_composition(composition).unwrap();
    model
}

#[test]
fn single_distribution() -> Result<(), ExpansionError> {
    let mut model = sampler(
        Destination::new("done")
            .with_assignment(Assignment::new("y", 1.0.into(), 0))
            .with_assignment(Assignment::new("x", uniform(1.0, 3.0), 1)),
    );
    expand_random_variables(&mut model, 100)?;

    let automaton = model.automaton("sampler").unwrap();
    let expanded = "idle_sample_e0_dest_0_expanded_assign_1";
    let after = "idle_sample_e0_dest_0_after_assign_1";
    assert!(automaton.locations().any(|loc| loc == expanded));
    assert!(automaton.locations().any(|loc| loc == after));

    let edges = automaton.edges();
    assert_eq!(edges.len(), 3);
    // the original edge keeps the preceding assignments
    assert_eq!(edges[0].destinations[0].location, expanded);
    assert_eq!(edges[0].destinations[0].assignments.len(), 1);

    let branch = &edges[1];
    assert_eq!(branch.action.as_deref(), Some(format!("{expanded}_branch").as_str()));
    assert_eq!(branch.destinations.len(), 100);
    let mut total = 0.;
    for dest in &branch.destinations {
        assert_eq!(dest.location, after);
        let Some(Value::Real(p)) = dest.probability.as_ref().and_then(Expression::as_literal) else {
            panic!("probabilities are real literals");
        };
        assert!((p - 0.01).abs() < 1e-9);
        total += p;
    }
    assert!((total - 1.).abs() < 1e-9);

    let value = |k: usize| match branch.destinations[k].assignments[0].value.as_literal() {
        Some(Value::Real(value)) => *value,
        _ => panic!("discretized values are real literals"),
    };
    assert_eq!(value(0), 1.0);
    assert!((value(10) - 1.2).abs() < 1e-9);
    assert!((value(99) - 2.98).abs() < 1e-9);

    let continuation = &edges[2];
    assert_eq!(continuation.location, after);
    assert_eq!(continuation.destinations[0].location, "done");
    assert!(continuation.destinations[0].assignments.is_empty());

    // new actions are synchronized on their own
    let composition = model.composition().unwrap();
    assert!(composition.has_sync(&format!("{expanded}_branch")));
    assert!(composition.has_sync(&format!("{after}_continue")));
    Ok(())
}

#[test]
fn two_distributions_in_one_assignment() -> Result<(), ExpansionError> {
    let value = Expression::binary(OpTag::Mul, uniform(0.0, 1.0), uniform(1.0, 2.0));
    let mut model = sampler(Destination::new("done").with_assignment(Assignment::new("x", value, 0)));
    expand_random_variables(&mut model, 10)?;
    let automaton = model.automaton("sampler").unwrap();
    let branch = &automaton.edges()[1];
    assert_eq!(branch.destinations.len(), 100);
    // the right operand varies fastest
    assert_eq!(
        branch.destinations[1].assignments[0].value.to_string(),
        "(0.0 * 1.1)"
    );
    Ok(())
}

#[test]
fn chained_distributions() -> Result<(), ExpansionError> {
    let mut model = sampler(
        Destination::new("done")
            .with_assignment(Assignment::new("x", uniform(0.0, 1.0), 0))
            .with_assignment(Assignment::new("y", uniform(0.0, 1.0), 1)),
    );
    expand_random_variables(&mut model, 4)?;
    let automaton = model.automaton("sampler").unwrap();
    // original edge, then branch and continuation for x, then branch and continuation for y
    let edges = automaton.edges();
    assert_eq!(edges.len(), 5);
    assert_eq!(edges[1].destinations.len(), 4);
    assert_eq!(edges[3].destinations.len(), 4);
    assert_eq!(edges[4].destinations[0].location, "done");
    assert!(edges.iter().all(|edge| {
        edge.destinations
            .iter()
            .flat_map(|dest| &dest.assignments)
            .all(|assignment| !assignment.value.contains_distribution())
    }));
    Ok(())
}

#[test]
fn random_initial_value() {
    let mut model = Model::new("random");
    model
        .add_variable(Variable::new("x", Type::Real, Some(uniform(0.0, 1.0)), true))
        .unwrap();
    assert_eq!(
        expand_random_variables(&mut model, 100),
        Err(ExpansionError::RandomInitialValue("x".to_owned()))
    );
}

#[test]
fn random_guard() {
    let mut automaton = Automaton::new("a");
    automaton.add_location("l");
    automaton.make_initial("l").unwrap();
    automaton
        .add_edge(
            Edge::new("l", Destination::new("l")).with_guard(Expression::binary(
                OpTag::Less,
                uniform(0.0, 1.0),
                0.5.into(),
            )),
        )
        .unwrap();
    let mut model = Model::new("random");
    model.add_automaton(automaton).unwrap();
    assert!(matches!(
        expand_random_variables(&mut model, 100),
        Err(ExpansionError::RandomGuard { .. })
    ));
}

#[test]
fn model_round_trip() -> Result<(), serde_json::Error> {
    let json = json!({
        "jani-version": 1,
        "name": "traffic",
        "type": "mdp",
        "metadata": {"description": "test"},
        "features": ["arrays"],
        "variables": [
            {"name": "cars.valid", "type": "bool", "transient": false, "initial-value": false},
            {"name": "queue", "type": {"kind": "array", "base": "int"}, "transient": false,
             "initial-value": {"op": "ac", "var": "i", "length": 3, "exp": 0}}
        ],
        "constants": [{"name": "limit", "type": "int", "value": 3}],
        "actions": [{"name": "cars_on_send"}, {"name": "noop"}],
        "automata": [
            {
                "name": "light",
                "locations": [{"name": "green"}, {"name": "red"}],
                "initial-locations": ["green"],
                "edges": [{
                    "location": "green",
                    "action": "cars_on_send",
                    "guard": {"exp": {"op": "<", "left": {"op": "aa", "exp": "queue", "index": 0}, "right": "limit"}},
                    "destinations": [{"location": "red", "assignments": [
                        {"ref": "cars.valid", "value": true, "index": 0}
                    ]}]
                }]
            },
            {
                "name": "cars",
                "locations": [{"name": "waiting"}],
                "initial-locations": ["waiting"],
                "edges": [
                    {"location": "waiting", "action": "cars_on_send", "destinations": [{"location": "waiting", "assignments": []}]},
                    {"location": "waiting", "action": "noop", "destinations": [{"location": "waiting", "assignments": []}]}
                ]
            }
        ],
        "system": {
            "elements": [{"automaton": "light"}, {"automaton": "cars"}],
            "syncs": [
                {"result": "cars_on_send", "synchronise": ["cars_on_send", "cars_on_send"]},
                {"result": "noop", "synchronise": [null, "noop"]}
            ]
        },
        "properties": [{"name": "p", "expression": true}]
    });
    let model = Model::from_json(json.clone())?;
    assert_eq!(model.automata().len(), 2);
    assert_eq!(model.features().collect::<Vec<_>>(), [Feature::Arrays]);
    assert_eq!(model.to_json()?, json);
    Ok(())
}

#[test]
fn parse_rejects_unknown_features() {
    let json = json!({
        "jani-version": 1,
        "name": "m",
        "type": "mdp",
        "features": ["derived-operators"],
        "automata": [],
        "system": {"elements": []}
    });
    assert!(Model::from_json(json).is_err());
}

#[test]
fn parse_rejects_inconsistent_syncs() {
    let json = json!({
        "jani-version": 1,
        "name": "m",
        "type": "mdp",
        "automata": [{"name": "a", "locations": [{"name": "l"}], "initial-locations": ["l"]}],
        "system": {
            "elements": [{"automaton": "a"}],
            "syncs": [{"result": "go", "synchronise": ["go"]}]
        }
    });
    assert!(Model::from_json(json).is_err());
}

#[test]
fn lowering_helpers() {
    let mut automaton = Automaton::new("a");
    automaton.add_location("l");
    automaton.make_initial("l").unwrap();
    let norm = Expression::from_json(&json!({"op": "norm2d", "x": "x", "y": 1})).unwrap();
    automaton
        .add_edge(
            Edge::new(
                "l",
                Destination::new("l").with_assignment(Assignment::new("d", norm, 0)),
            )
            .with_guard(Expression::binary(
                OpTag::Equal,
                Expression::from_json(&json!({"op": "round", "exp": "r"})).unwrap(),
                1i64.into(),
            )),
        )
        .unwrap();
    let mut model = Model::new("helpers");
    model.add_automaton(automaton).unwrap();
    model.lower_helpers();
    let edge = &model.automaton("a").unwrap().edges()[0];
    assert!(!edge.destinations[0].assignments[0].value.contains_op(OpTag::Norm2d));
    assert!(edge.guard.as_ref().unwrap().contains_op(OpTag::Floor));
}
