use fmgen_core::*;
use fmgen_jani::{Feature, Model, Sync};
use fmgen_scxml::*;
use serde_json::{Value as Json, json};

fn description(json: Json) -> ModelDescription {
    serde_json::from_value(json).expect("valid description")
}

fn sync<'a>(model: &'a Model, result: &str) -> &'a Sync {
    model
        .composition()
        .expect("composition")
        .syncs()
        .iter()
        .find(|sync| sync.result == result)
        .unwrap_or_else(|| panic!("missing sync '{result}'"))
}

fn participants(model: &Model, result: &str) -> Vec<(String, String)> {
    let elements = model.composition().expect("composition").elements();
    let mut participants: Vec<_> = sync(model, result)
        .participants()
        .map(|(idx, action)| (elements[idx].clone(), action.to_owned()))
        .collect();
    participants.sort();
    participants
}

fn pair(automaton: &str, action: &str) -> (String, String) {
    (automaton.to_owned(), action.to_owned())
}

fn drainer(timer: bool) -> Json {
    let mut interfaces = vec![json!({
        "kind": "event", "name": "level", "direction": "receive", "fields": {"data": "int32"}
    })];
    let mut drain = json!({
        "location": "idle",
        "guard": "battery_percent > 0",
        "destinations": [{"location": "idle", "assignments": [
            {"target": "battery_percent", "value": "battery_percent - 1"}
        ]}]
    });
    if timer {
        interfaces.push(json!({"kind": "timer", "name": "drain", "rate": 1.0}));
        drain["action"] = json!("ros_time_rate.drain_on_receive");
    }
    json!({
        "name": "Drainer",
        "locations": ["idle"],
        "initial": ["idle"],
        "variables": [{"name": "battery_percent", "type": "int32", "expr": "100"}],
        "interfaces": interfaces,
        "edges": [
            drain,
            {
                "location": "idle",
                "action": "level_on_receive",
                "guard": "_event.data < 20",
                "destinations": [{"location": "idle", "assignments": [
                    {"target": "battery_percent", "value": "100"}
                ]}]
            }
        ]
    })
}

fn manager() -> Json {
    json!({
        "name": "Manager",
        "locations": ["idle"],
        "initial": ["idle"],
        "variables": [{"name": "battery_alarm", "type": "bool", "expr": "false"}],
        "interfaces": [
            {"kind": "event", "name": "level", "direction": "send", "fields": {"data": "int32"}}
        ],
        "edges": [{
            "location": "idle",
            "action": "level_on_send",
            "destinations": [{"location": "idle", "assignments": [
                {"target": "level.data", "value": "15"},
                {"target": "battery_alarm", "value": "level.data < 20"}
            ]}]
        }]
    })
}

#[test]
fn battery_drainer() -> anyhow::Result<()> {
    let desc = description(json!({
        "name": "battery",
        "automata": [drainer(false), manager()],
        "properties": [{"name": "alarm", "expression": {"op": "filter"}}]
    }));
    let model = convert(&desc, &ConversionConfig::default())?;

    let names: Vec<_> = model.automata().iter().map(Automaton::name).collect();
    assert_eq!(names, ["Drainer", "Manager", "level"]);
    let valid = model.variable("level.valid").expect("validity flag");
    assert_eq!(valid.r#type, Type::Bool);
    assert_eq!(valid.initial_value, Some(false.into()));
    let data = model.variable("level.data").expect("payload");
    assert_eq!(data.r#type, Type::Int);
    assert_eq!(data.initial_value, Some(0i64.into()));

    assert_eq!(
        participants(&model, "level_on_send"),
        [pair("Manager", "level_on_send"), pair("level", "level_on_send")]
    );
    assert_eq!(
        participants(&model, "level_on_receive"),
        [pair("Drainer", "level_on_receive"), pair("level", "level_on_receive")]
    );

    let drainer = model.automaton("Drainer").unwrap();
    let receive = drainer
        .edges()
        .iter()
        .find(|edge| edge.action.as_deref() == Some("level_on_receive"))
        .unwrap();
    assert_eq!(receive.guard.as_ref().unwrap().to_string(), "(level.data < 20)");

    // the sender validates the payload after writing it
    let manager = model.automaton("Manager").unwrap();
    let assignments = &manager.edges()[0].destinations[0].assignments;
    assert_eq!(assignments.len(), 3);
    assert_eq!(assignments[2].target, Expression::identifier("level.valid"));
    assert_eq!(assignments[2].index, 2);

    let level = model.automaton("level").unwrap();
    assert_eq!(level.locations().collect::<Vec<_>>(), ["received", "waiting"]);
    assert_eq!(level.initial_locations().collect::<Vec<_>>(), ["waiting"]);
    assert_eq!(model.properties().len(), 1);
    Ok(())
}

#[test]
fn timed_battery_drainer() -> anyhow::Result<()> {
    let desc = description(json!({
        "name": "battery",
        "automata": [drainer(true), manager()]
    }));
    let model = convert(&desc, &ConversionConfig::default())?;
    assert!(model.automaton(GLOBAL_TIMER).is_some());

    assert_eq!(
        participants(&model, GLOBAL_TIMER_TICK),
        [
            pair(GLOBAL_TIMER, GLOBAL_TIMER_TICK),
            pair("level", GLOBAL_TIMER_ENABLE)
        ]
    );
    assert_eq!(
        participants(&model, "ros_time_rate.drain_on_receive"),
        [
            pair("Drainer", "ros_time_rate.drain_on_receive"),
            pair(GLOBAL_TIMER, "ros_time_rate.drain_on_receive"),
            pair("level", GLOBAL_TIMER_ENABLE),
        ]
    );
    // no automaton is created for the timer's events
    assert!(model.automaton("ros_time_rate.drain").is_none());

    let tick = &model.automaton(GLOBAL_TIMER).unwrap().edges()[0];
    assert_eq!(
        tick.guard.as_ref().unwrap().to_string(),
        "((t < 100) ∧ ¬drain_needed)"
    );
    Ok(())
}

#[test]
fn single_assignment() -> anyhow::Result<()> {
    let desc = description(json!({
        "name": "answer",
        "automata": [{
            "name": "counter",
            "locations": ["Initial"],
            "initial": ["Initial"],
            "variables": [{"name": "x", "type": "int32"}],
            "edges": [{
                "location": "Initial",
                "destinations": [{"location": "Initial", "assignments": [{"target": "x", "value": "42"}]}]
            }]
        }]
    }));
    let model = convert(&desc, &ConversionConfig::default())?;
    let counter = model.automaton("counter").unwrap();
    assert_eq!(counter.initial_locations().count(), 1);
    assert_eq!(counter.variable("x").unwrap().initial_value, Some(0i64.into()));
    let edge = &counter.edges()[0];
    assert_eq!(edge.action.as_deref(), Some("counter_action_0"));

    let json = model.to_json()?;
    assert_eq!(
        json["automata"][0]["edges"][0]["destinations"][0]["assignments"],
        json!([{"ref": "x", "value": 42, "index": 0}])
    );
    assert_eq!(
        json["system"],
        json!({
            "elements": [{"automaton": "counter"}],
            "syncs": [{"result": "counter_action_0", "synchronise": ["counter_action_0"]}]
        })
    );
    Ok(())
}

#[test]
fn received_but_never_sent() {
    let desc = description(json!({
        "name": "lonely",
        "automata": [drainer(false)]
    }));
    let err = convert(&desc, &ConversionConfig::default()).unwrap_err();
    assert_eq!(
        err.downcast_ref::<SyncError>(),
        Some(&SyncError::NoSender("level".to_owned()))
    );
}

#[test]
fn optional_events_without_sender() -> anyhow::Result<()> {
    let desc = description(json!({
        "name": "navigation",
        "automata": [{
            "name": "client",
            "locations": ["idle", "waiting"],
            "initial": ["idle"],
            "interfaces": [{"kind": "action-client", "action": "/nav"}],
            "edges": [
                {"location": "idle", "action": "action_nav_goal_on_send", "destinations": [{"location": "waiting"}]},
                {"location": "waiting", "action": "action_nav_feedback_on_receive", "destinations": [{"location": "waiting"}]},
                {"location": "waiting", "action": "action_nav_goal_rejected_on_receive", "destinations": [{"location": "idle"}]}
            ]
        }]
    }));
    let mut model = convert(&desc, &ConversionConfig::default())?;
    let client = model.automaton("client").unwrap();
    assert_eq!(client.edges().len(), 1);
    assert!(client.has_action("action_nav_goal_on_send"));
    assert_eq!(model.remove_edges_with_action("action_nav_feedback_on_receive"), 0);

    // the goal is sent, but nobody receives it
    let goal = model.automaton("action_nav_goal").unwrap();
    assert_eq!(goal.locations().collect::<Vec<_>>(), ["waiting"]);
    assert_eq!(goal.edges()[0].destinations[0].location, "waiting");
    assert!(model.automaton("action_nav_feedback").is_none());
    Ok(())
}

#[test]
fn array_payloads() -> anyhow::Result<()> {
    let desc = description(json!({
        "name": "scanner",
        "automata": [
            {
                "name": "lidar",
                "locations": ["on"],
                "initial": ["on"],
                "interfaces": [{"kind": "publisher", "topic": "/scan", "fields": {"ranges": "float64[]"}}],
                "edges": [{
                    "location": "on",
                    "action": "topic_scan_msg_on_send",
                    "destinations": [{"location": "on", "assignments": [
                        {"target": "topic_scan_msg.ranges", "value": "[1.5, 2]"}
                    ]}]
                }]
            },
            {
                "name": "planner",
                "locations": ["on"],
                "initial": ["on"],
                "variables": [{"name": "last", "type": "float64[4]"}],
                "interfaces": [{"kind": "subscriber", "topic": "/scan", "fields": {"ranges": "float64[]"}}],
                "edges": [{
                    "location": "on",
                    "action": "topic_scan_msg_on_receive",
                    "destinations": [{"location": "on", "assignments": [
                        {"target": "last", "value": "_event.ranges"}
                    ]}]
                }]
            }
        ]
    }));
    let config = ConversionConfig {
        max_array_size: 4,
        ..Default::default()
    };
    let model = convert(&desc, &config)?;
    assert!(model.features().any(|feature| feature == Feature::Arrays));

    let ranges = model.variable("topic_scan_msg.ranges").unwrap();
    assert_eq!(ranges.r#type, Type::Array(Box::new(Type::Real)));
    assert!(ranges.initial_value.as_ref().unwrap().contains_op(OpTag::ArrayCreate));
    let length = model.variable("topic_scan_msg.ranges.length").unwrap();
    assert_eq!(length.initial_value, Some(0i64.into()));

    let sent = &model.automaton("lidar").unwrap().edges()[0].destinations[0].assignments;
    assert_eq!(sent[0].value.to_string(), "[1.5, 2.0, 0.0, 0.0]");
    assert_eq!(sent[1].target, Expression::identifier("topic_scan_msg.ranges.length"));
    assert_eq!(sent[1].value, Expression::from(2i64));
    assert_eq!(sent[2].target, Expression::identifier("topic_scan_msg.valid"));

    let received = &model.automaton("planner").unwrap().edges()[0].destinations[0].assignments;
    assert_eq!(received[0].value, Expression::identifier("topic_scan_msg.ranges"));
    assert_eq!(received[1].target, Expression::identifier("last.length"));
    assert_eq!(
        received[1].value,
        Expression::identifier("topic_scan_msg.ranges.length")
    );
    Ok(())
}

#[test]
fn matrix_payloads() -> anyhow::Result<()> {
    let desc = description(json!({
        "name": "mapping",
        "automata": [
            {
                "name": "mapper",
                "locations": ["on"],
                "initial": ["on"],
                "interfaces": [{"kind": "publisher", "topic": "/map", "fields": {"grid": "float64[][]"}}],
                "edges": [{
                    "location": "on",
                    "action": "topic_map_msg_on_send",
                    "destinations": [{"location": "on", "assignments": [
                        {"target": "topic_map_msg.grid", "value": "[[1.0], [2.0, 3.0]]"}
                    ]}]
                }]
            },
            {
                "name": "planner",
                "locations": ["on"],
                "initial": ["on"],
                "variables": [{"name": "local", "type": "float64[3][3]"}],
                "interfaces": [{"kind": "subscriber", "topic": "/map", "fields": {"grid": "float64[][]"}}],
                "edges": [{
                    "location": "on",
                    "action": "topic_map_msg_on_receive",
                    "guard": "_event.grid[1].length > 1",
                    "destinations": [{"location": "on", "assignments": [
                        {"target": "local", "value": "_event.grid"}
                    ]}]
                }]
            }
        ]
    }));
    let config = ConversionConfig {
        max_array_size: 3,
        ..Default::default()
    };
    let model = convert(&desc, &config)?;

    let rows = model.variable("topic_map_msg.grid.length").unwrap();
    assert_eq!(rows.r#type, Type::Int);
    let columns = model.variable("topic_map_msg.grid.d2.length").unwrap();
    assert_eq!(columns.r#type, Type::Array(Box::new(Type::Int)));
    assert!(columns.initial_value.as_ref().unwrap().contains_op(OpTag::ArrayCreate));

    let sent = &model.automaton("mapper").unwrap().edges()[0].destinations[0].assignments;
    let rendered: Vec<_> = sent[1..]
        .iter()
        .map(|a| format!("{}:{} := {}", a.index, a.target, a.value))
        .collect();
    assert_eq!(
        rendered,
        [
            "1:topic_map_msg.grid.length := 2",
            "1:topic_map_msg.grid.d2.length := [1, 2, 0]",
            "2:topic_map_msg.valid := true",
        ]
    );

    let planner = model.automaton("planner").unwrap();
    assert!(planner.variable("local.d2.length").is_some());
    let edge = &planner.edges()[0];
    assert_eq!(
        edge.guard.as_ref().unwrap().to_string(),
        "(topic_map_msg.grid.d2.length[1] > 1)"
    );
    let received = &edge.destinations[0].assignments;
    assert_eq!(received[2].target, Expression::identifier("local.d2.length"));
    assert_eq!(
        received[2].value,
        Expression::identifier("topic_map_msg.grid.d2.length")
    );
    Ok(())
}

#[test]
fn random_assignments() -> anyhow::Result<()> {
    let desc = description(json!({
        "name": "dice",
        "automata": [{
            "name": "roller",
            "locations": ["ready", "rolled"],
            "initial": ["ready"],
            "variables": [{"name": "x", "type": "float64", "transient": true}],
            "edges": [{
                "location": "ready",
                "action": "roll",
                "destinations": [{"location": "rolled", "assignments": [
                    {"target": "x", "value": "Math.random() * 6"}
                ]}]
            }]
        }]
    }));
    let config = ConversionConfig {
        resolution: 6,
        ..Default::default()
    };
    let model = convert(&desc, &config)?;
    let roller = model.automaton("roller").unwrap();
    assert_eq!(roller.edges().len(), 3);
    assert_eq!(roller.edges()[1].destinations.len(), 6);
    assert!(model.composition().unwrap().has_sync("roll"));
    Ok(())
}

#[test]
fn trigonometry_and_helpers() -> anyhow::Result<()> {
    let desc = description(json!({
        "name": "angles",
        "constants": [
            {"name": "half", "type": "float64", "value": "1 / 2"},
            {"name": "free", "type": "int32"}
        ],
        "automata": [{
            "name": "arm",
            "locations": ["l"],
            "initial": ["l"],
            "variables": [{"name": "y", "type": "float64", "transient": true}],
            "edges": [{
                "location": "l",
                "destinations": [{"location": "l", "assignments": [
                    {"target": "y", "value": "Math.sin(half)"}
                ]}]
            }]
        }]
    }));
    let model = convert(&desc, &ConversionConfig::default())?;
    assert!(model.features().any(|feature| feature == Feature::TrigonometricFunctions));
    assert_eq!(model.constant("half").unwrap().value, Some(0.5.into()));
    assert_eq!(model.constant("free").unwrap().value, None);
    Ok(())
}

#[test]
fn mistyped_constant() {
    let desc = description(json!({
        "name": "m",
        "constants": [{"name": "flag", "type": "bool", "value": "1"}],
        "automata": []
    }));
    assert!(convert(&desc, &ConversionConfig::default()).is_err());
}
