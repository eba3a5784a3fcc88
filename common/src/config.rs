use serde::{Deserialize, Serialize};

use crate::types::RelayFormat;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub hysteresis_band: f32,
    pub min_valid_temp: f32,
    pub max_valid_temp: f32,
    pub heartbeat_interval_ms: u64,
    #[serde(default)]
    pub relay_format: RelayFormat,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            hysteresis_band: 0.5,
            min_valid_temp: -40.0,
            max_valid_temp: 100.0,
            heartbeat_interval_ms: 10_000,
            relay_format: RelayFormat::OnOff,
        }
    }
}

impl ControllerConfig {
    pub fn sanitize(&mut self) {
        self.hysteresis_band = if self.hysteresis_band.is_finite() {
            self.hysteresis_band.clamp(0.1, 5.0)
        } else {
            0.5
        };

        if self.min_valid_temp > self.max_valid_temp {
            std::mem::swap(&mut self.min_valid_temp, &mut self.max_valid_temp);
        }

        self.heartbeat_interval_ms = self.heartbeat_interval_ms.max(1_000);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
    pub client_id: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mqtt_host: "koserver.iot".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
            client_id: "HeatingControl".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub controller: ControllerConfig,
    pub rooms: Vec<String>,
    pub timezone: String,
    pub network: NetworkConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            controller: ControllerConfig::default(),
            rooms: [
                "KonniZimmer",
                "Bad",
                "SamiZimmer",
                "SebiZimmer",
                "SilviaZimmer",
                "Wohnzimmer",
                "WcOben",
                "WcUnten",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
            timezone: "Europe/Berlin".to_string(),
            network: NetworkConfig::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.controller.sanitize();

        // Room names become topic levels and file names.
        self.rooms.retain(|room| {
            !room.is_empty() && !room.contains(['/', '+', '#', '\\']) && room != "." && room != ".."
        });
        let mut seen = std::collections::HashSet::new();
        self.rooms.retain(|room| seen.insert(room.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_clamps_band_and_range() {
        let mut config = ControllerConfig {
            hysteresis_band: 12.0,
            min_valid_temp: 60.0,
            max_valid_temp: -10.0,
            heartbeat_interval_ms: 10,
            relay_format: RelayFormat::OnOff,
        };
        config.sanitize();

        assert_eq!(config.hysteresis_band, 5.0);
        assert_eq!(config.min_valid_temp, -10.0);
        assert_eq!(config.max_valid_temp, 60.0);
        assert_eq!(config.heartbeat_interval_ms, 1_000);
    }

    #[test]
    fn sanitize_drops_unusable_room_names() {
        let mut runtime = RuntimeConfig {
            rooms: ["Bad", "", "a/b", "Bad", "..", "Wohnzimmer", "x#"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            ..RuntimeConfig::default()
        };
        runtime.sanitize();

        assert_eq!(runtime.rooms, vec!["Bad", "Wohnzimmer"]);
    }

    #[test]
    fn relay_format_defaults_when_absent() {
        let raw = r#"{
            "hysteresis_band": 0.5,
            "min_valid_temp": -40.0,
            "max_valid_temp": 100.0,
            "heartbeat_interval_ms": 10000
        }"#;
        let config: ControllerConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.relay_format, RelayFormat::OnOff);
    }
}
