pub const TOPIC_ROOMS_PREFIX: &str = "/house/rooms";
pub const TOPIC_AGENT_PREFIX: &str = "/house/agents/HeatingControl";

pub const TOPIC_ANY_HEATING: &str = "/house/agents/HeatingControl/values/allOverHeating";
pub const TOPIC_RELAY: &str = "/house/agents/HeatingControl/values/relay";

pub fn room_temperature(room: &str) -> String {
    format!("{TOPIC_ROOMS_PREFIX}/{room}/Temperature")
}

pub fn room_config(room: &str) -> String {
    format!("{TOPIC_AGENT_PREFIX}/{room}/config")
}

pub fn room_value(room: &str, value: &str) -> String {
    format!("{TOPIC_AGENT_PREFIX}/{room}/values/{value}")
}

pub fn room_heartbeat(room: &str) -> String {
    format!("{TOPIC_AGENT_PREFIX}/{room}/heartbeat")
}

pub fn room_subscriptions(room: &str) -> String {
    format!("{TOPIC_AGENT_PREFIX}/{room}/subscriptions")
}

pub fn heating_source(room: &str) -> String {
    format!("{room}/heating")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomTopic<'a> {
    Temperature(&'a str),
    Config(&'a str),
}

pub fn parse_room_topic(topic: &str) -> Option<RoomTopic<'_>> {
    if let Some(rest) = topic.strip_prefix(TOPIC_ROOMS_PREFIX) {
        let room = rest.strip_prefix('/')?.strip_suffix("/Temperature")?;
        return (!room.is_empty() && !room.contains('/')).then_some(RoomTopic::Temperature(room));
    }

    let rest = topic.strip_prefix(TOPIC_AGENT_PREFIX)?;
    let room = rest.strip_prefix('/')?.strip_suffix("/config")?;
    (!room.is_empty() && !room.contains('/')).then_some(RoomTopic::Config(room))
}
