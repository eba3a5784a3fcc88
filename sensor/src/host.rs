use std::{io::ErrorKind, path::PathBuf, time::Duration};

use anyhow::Context;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use tracing::{info, warn};

use heating_common::{room_temperature, NetworkConfig, RuntimeConfig};

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut runtime = load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config: {err:#}");
        RuntimeConfig::default()
    });
    runtime.sanitize();

    let broker = BrokerSettings::resolve(&runtime.network, |key| std::env::var(key).ok());
    let mut mqtt_options = MqttOptions::new(broker.client_id, broker.host, broker.port);
    if let Some((user, pass)) = broker.credentials {
        mqtt_options.set_credentials(user, pass);
    }

    let (mqtt, mut eventloop) = AsyncClient::new(mqtt_options, 32);

    tokio::spawn(async move {
        loop {
            if let Err(err) = eventloop.poll().await {
                warn!("sensor mqtt poll error: {err}");
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    });

    info!(rooms = runtime.rooms.len(), "simulated room sensors started");

    let mut tick: u64 = 0;
    let mut interval = tokio::time::interval(Duration::from_secs(30));

    loop {
        interval.tick().await;
        tick = tick.saturating_add(1);

        for (index, room) in runtime.rooms.iter().enumerate() {
            let temperature = simulated_temperature(index, tick);
            mqtt.publish(
                room_temperature(room),
                QoS::AtLeastOnce,
                true,
                format!("{temperature:.1}"),
            )
            .await
            .with_context(|| format!("failed to publish temperature for {room}"))?;
        }
    }
}

#[derive(Debug, PartialEq)]
struct BrokerSettings {
    host: String,
    port: u16,
    client_id: String,
    credentials: Option<(String, String)>,
}

impl BrokerSettings {
    // Environment first, then runtime.json, the same order the controller uses.
    fn resolve(network: &NetworkConfig, env: impl Fn(&str) -> Option<String>) -> Self {
        let host = env("MQTT_HOST").unwrap_or_else(|| network.mqtt_host.clone());
        let port = env("MQTT_PORT")
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(network.mqtt_port);
        let user = env("MQTT_USER").unwrap_or_else(|| network.mqtt_user.clone());
        let pass = env("MQTT_PASS").unwrap_or_else(|| network.mqtt_pass.clone());

        Self {
            host,
            port,
            client_id: format!("{}-sensor", network.client_id),
            credentials: (!user.is_empty()).then_some((user, pass)),
        }
    }
}

/// Slow sawtooth between 18.0 and 22.4, offset per room so rooms cross
/// their band edges at different times.
fn simulated_temperature(room_index: usize, tick: u64) -> f32 {
    let step = (tick + room_index as u64 * 3) % 12;
    18.0 + step as f32 * 0.4
}

async fn load_runtime_config() -> anyhow::Result<RuntimeConfig> {
    let data_dir = std::env::var("HEATING_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./.heating"));

    match tokio::fs::read(data_dir.join("runtime.json")).await {
        Ok(raw) => Ok(serde_json::from_slice::<RuntimeConfig>(&raw)?),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
        Err(err) => Err(err.into()),
    }
}
