use crate::{
    timers::{TIMER_PREFIX, Timer},
    types::{BaseType, DataType},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Payload schema of an event: field name and type.
pub type Fields = BTreeMap<String, DataType>;

/// Whether an automaton sends or receives an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    /// The automaton sends the event.
    Send,
    /// The automaton receives the event.
    Receive,
}

/// One side of a plain event, as exposed by an [`Interface`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Name of the plain event.
    pub event: String,
    /// Whether the event is sent or received.
    pub direction: Direction,
    /// Payload schema, if declared.
    pub fields: Option<Fields>,
}

impl Endpoint {
    fn new(event: String, direction: Direction, fields: Option<Fields>) -> Self {
        Self {
            event,
            direction,
            fields,
        }
    }

    /// The action of the edges that send or receive the event.
    pub fn action(&self) -> String {
        match self.direction {
            Direction::Send => format!("{}_on_send", self.event),
            Direction::Receive => format!("{}_on_receive", self.event),
        }
    }
}

/// A communication interface declared by a state machine.
///
/// Every protocol kind expands into plain events (see [`Interface::endpoints`]).
///
/// ```
/// # use fmgen_scxml::{Direction, Interface};
/// let client = Interface::ServiceClient {
///     service: "/robot/charge".to_owned(),
///     request: Default::default(),
///     response: Default::default(),
/// };
/// let endpoints = client.endpoints();
/// assert_eq!(endpoints[0].event, "srv_robot__charge_request");
/// assert_eq!(endpoints[0].direction, Direction::Send);
/// assert_eq!(endpoints[1].action(), "srv_robot__charge_response_on_receive");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Interface {
    /// A plain event.
    Event {
        /// Name of the event.
        name: String,
        /// Whether it is sent or received.
        direction: Direction,
        /// Payload schema.
        #[serde(default)]
        fields: Option<Fields>,
    },
    /// A topic publisher.
    Publisher {
        /// The topic.
        topic: String,
        /// Message fields.
        #[serde(default)]
        fields: Option<Fields>,
    },
    /// A topic subscriber.
    Subscriber {
        /// The topic.
        topic: String,
        /// Message fields.
        #[serde(default)]
        fields: Option<Fields>,
    },
    /// A service client.
    ServiceClient {
        /// The service.
        service: String,
        /// Request fields.
        #[serde(default)]
        request: Option<Fields>,
        /// Response fields.
        #[serde(default)]
        response: Option<Fields>,
    },
    /// A service server.
    ServiceServer {
        /// The service.
        service: String,
        /// Request fields.
        #[serde(default)]
        request: Option<Fields>,
        /// Response fields.
        #[serde(default)]
        response: Option<Fields>,
    },
    /// An action client.
    ActionClient {
        /// The action.
        action: String,
        /// Goal fields.
        #[serde(default)]
        goal: Option<Fields>,
        /// Feedback fields.
        #[serde(default)]
        feedback: Option<Fields>,
        /// Result fields.
        #[serde(default)]
        result: Option<Fields>,
    },
    /// An action server.
    ActionServer {
        /// The action.
        action: String,
        /// Goal fields.
        #[serde(default)]
        goal: Option<Fields>,
        /// Feedback fields.
        #[serde(default)]
        feedback: Option<Fields>,
        /// Result fields.
        #[serde(default)]
        result: Option<Fields>,
    },
    /// A periodic timer.
    Timer {
        /// Name of the timer.
        name: String,
        /// Rate, in Hz.
        rate: f64,
    },
    /// A behavior-tree leaf node.
    BtNode {
        /// The node id.
        id: String,
    },
}

/// Strips the leading `/` and replaces the other ones with `__`.
pub(crate) fn sanitize(name: &str) -> String {
    name.strip_prefix('/').unwrap_or(name).replace('/', "__")
}

impl Interface {
    /// The name of the interface (event, topic, service, action, timer or node id).
    pub fn interface_name(&self) -> &str {
        match self {
            Interface::Event { name, .. } | Interface::Timer { name, .. } => name,
            Interface::Publisher { topic, .. } | Interface::Subscriber { topic, .. } => topic,
            Interface::ServiceClient { service, .. } | Interface::ServiceServer { service, .. } => {
                service
            }
            Interface::ActionClient { action, .. } | Interface::ActionServer { action, .. } => {
                action
            }
            Interface::BtNode { id } => id,
        }
    }

    /// The protocol kind of the interface.
    pub fn interface_type(&self) -> &'static str {
        match self {
            Interface::Event { .. } => "event",
            Interface::Publisher { .. } => "publisher",
            Interface::Subscriber { .. } => "subscriber",
            Interface::ServiceClient { .. } => "service-client",
            Interface::ServiceServer { .. } => "service-server",
            Interface::ActionClient { .. } => "action-client",
            Interface::ActionServer { .. } => "action-server",
            Interface::Timer { .. } => "timer",
            Interface::BtNode { .. } => "bt-node",
        }
    }

    /// The timer declared by the interface, if it is one.
    pub fn timer(&self) -> Option<Timer> {
        match self {
            Interface::Timer { name, rate } => Some(Timer::new(sanitize(name), *rate)),
            _ => None,
        }
    }

    /// The plain events sent and received through the interface.
    pub fn endpoints(&self) -> Vec<Endpoint> {
        use Direction::{Receive, Send};
        match self {
            Interface::Event {
                name,
                direction,
                fields,
            } => vec![Endpoint::new(name.clone(), *direction, fields.clone())],
            Interface::Publisher { topic, fields } => vec![Endpoint::new(
                format!("topic_{}_msg", sanitize(topic)),
                Send,
                fields.clone(),
            )],
            Interface::Subscriber { topic, fields } => vec![Endpoint::new(
                format!("topic_{}_msg", sanitize(topic)),
                Receive,
                fields.clone(),
            )],
            Interface::ServiceClient {
                service,
                request,
                response,
            } => service_endpoints(service, request.as_ref(), response.as_ref(), Send, Receive),
            Interface::ServiceServer {
                service,
                request,
                response,
            } => service_endpoints(service, request.as_ref(), response.as_ref(), Receive, Send),
            Interface::ActionClient {
                action,
                goal,
                feedback,
                result,
            } => action_endpoints(
                action,
                goal.as_ref(),
                feedback.as_ref(),
                result.as_ref(),
                Send,
                Receive,
            ),
            Interface::ActionServer {
                action,
                goal,
                feedback,
                result,
            } => action_endpoints(
                action,
                goal.as_ref(),
                feedback.as_ref(),
                result.as_ref(),
                Receive,
                Send,
            ),
            Interface::Timer { name, .. } => vec![Endpoint::new(
                format!("{TIMER_PREFIX}{}", sanitize(name)),
                Receive,
                Some(Fields::new()),
            )],
            Interface::BtNode { id } => {
                let id = sanitize(id);
                let status =
                    Fields::from([("status".to_owned(), DataType::scalar(BaseType::Int))]);
                vec![
                    Endpoint::new(format!("bt_{id}_tick"), Receive, Some(Fields::new())),
                    Endpoint::new(format!("bt_{id}_response"), Send, Some(status)),
                    Endpoint::new(format!("bt_{id}_halt"), Receive, Some(Fields::new())),
                    Endpoint::new(format!("bt_{id}_halt_response"), Send, Some(Fields::new())),
                ]
            }
        }
    }
}

fn service_endpoints(
    service: &str,
    request: Option<&Fields>,
    response: Option<&Fields>,
    request_dir: Direction,
    response_dir: Direction,
) -> Vec<Endpoint> {
    let service = sanitize(service);
    vec![
        Endpoint::new(
            format!("srv_{service}_request"),
            request_dir,
            request.cloned(),
        ),
        Endpoint::new(
            format!("srv_{service}_response"),
            response_dir,
            response.cloned(),
        ),
    ]
}

fn action_endpoints(
    action: &str,
    goal: Option<&Fields>,
    feedback: Option<&Fields>,
    result: Option<&Fields>,
    goal_dir: Direction,
    reply_dir: Direction,
) -> Vec<Endpoint> {
    let action = sanitize(action);
    vec![
        Endpoint::new(format!("action_{action}_goal"), goal_dir, goal.cloned()),
        Endpoint::new(
            format!("action_{action}_goal_accepted"),
            reply_dir,
            Some(Fields::new()),
        ),
        Endpoint::new(
            format!("action_{action}_goal_rejected"),
            reply_dir,
            Some(Fields::new()),
        ),
        Endpoint::new(
            format!("action_{action}_feedback"),
            reply_dir,
            feedback.cloned(),
        ),
        Endpoint::new(
            format!("action_{action}_result"),
            reply_dir,
            result.cloned(),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sanitized_names() {
        assert_eq!(sanitize("/a/b/c"), "a__b__c");
        assert_eq!(sanitize("level"), "level");
    }

    #[test]
    fn action_sides_mirror() {
        let client: Interface = serde_json::from_value(json!({
            "kind": "action-client",
            "action": "/nav",
            "goal": {"x": "float64"}
        }))
        .unwrap();
        let server = Interface::ActionServer {
            action: "/nav".to_owned(),
            goal: None,
            feedback: None,
            result: None,
        };
        let client = client.endpoints();
        let server = server.endpoints();
        assert_eq!(client.len(), 5);
        for (client, server) in client.iter().zip(&server) {
            assert_eq!(client.event, server.event);
            assert_ne!(client.direction, server.direction);
        }
        assert_eq!(client[0].action(), "action_nav_goal_on_send");
        assert_eq!(server[0].action(), "action_nav_goal_on_receive");
        assert_eq!(
            client[0].fields.as_ref().and_then(|fields| fields.get("x")),
            Some(&DataType::scalar(BaseType::Real))
        );
    }

    #[test]
    fn undeclared_fields() {
        let publisher: Interface = serde_json::from_value(json!({
            "kind": "publisher",
            "topic": "/level",
            "fields": {"data": "int32"}
        }))
        .unwrap();
        let subscriber: Interface =
            serde_json::from_value(json!({"kind": "subscriber", "topic": "/level"})).unwrap();
        let sent = &publisher.endpoints()[0];
        let received = &subscriber.endpoints()[0];
        assert_eq!(received.fields, None);

        let mut registry = crate::EventRegistry::default();
        registry
            .add_sender(&sent.event, "a", &sent.action(), sent.fields.as_ref())
            .unwrap();
        registry
            .add_receiver(&received.event, "b", &received.action(), received.fields.as_ref())
            .unwrap();
        assert_eq!(registry.get("topic_level_msg").unwrap().fields(), sent.fields.as_ref());
    }

    #[test]
    fn bt_and_timer_endpoints() {
        let node = Interface::BtNode {
            id: "check_battery".to_owned(),
        };
        let names: Vec<_> = node.endpoints().into_iter().map(|e| e.event).collect();
        assert_eq!(
            names,
            [
                "bt_check_battery_tick",
                "bt_check_battery_response",
                "bt_check_battery_halt",
                "bt_check_battery_halt_response"
            ]
        );
        let timer = Interface::Timer {
            name: "tick".to_owned(),
            rate: 10.,
        };
        assert_eq!(timer.endpoints()[0].action(), "ros_time_rate.tick_on_receive");
        assert_eq!(timer.timer().map(|t| t.rate), Some(10.));
        assert_eq!(timer.interface_type(), "timer");
    }
}
