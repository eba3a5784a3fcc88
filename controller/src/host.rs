use std::{
    collections::HashMap,
    io::ErrorKind,
    net::SocketAddr,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde::Serialize;
use tokio::{
    net::TcpListener,
    sync::{
        mpsc::{self, error::TrySendError},
        Mutex,
    },
};
use tracing::{debug, info, warn};

use heating_common::{
    parse_room_topic, room_config, room_heartbeat, room_subscriptions, room_temperature,
    room_value, AnyActive, ControllerStatus, RelayFormat, RoomController, RoomTopic,
    RoomUpdate, RuntimeConfig, WeeklySchedule, TOPIC_ANY_HEATING, TOPIC_RELAY,
};

#[derive(Clone)]
struct AppState {
    rooms: Arc<HashMap<String, Mutex<RoomController>>>,
    aggregate: Arc<Mutex<AnyActive>>,
    timezone: Tz,
    relay_format: RelayFormat,
    mqtt: AsyncClient,
    updates: mpsc::Sender<(String, RoomUpdate)>,
    store: AppStore,
}

#[derive(Clone)]
struct AppStore {
    data_dir: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Clone, PartialEq)]
struct OutgoingMessage {
    topic: String,
    retain: bool,
    payload: String,
}

const MAX_MQTT_PAYLOAD_BYTES: usize = 4096;
const UPDATE_QUEUE_CAPACITY: usize = 256;

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = AppStore::new();
    let mut runtime = store.load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config from store: {err:#}");
        RuntimeConfig::default()
    });
    runtime.sanitize();

    let timezone: Tz = runtime.timezone.parse().unwrap_or_else(|err| {
        warn!("invalid timezone {:?} ({err}), falling back to UTC", runtime.timezone);
        Tz::UTC
    });

    let mut rooms = HashMap::new();
    for room in &runtime.rooms {
        let schedule = store.load_schedule(room).await.unwrap_or_else(|err| {
            warn!("failed to load schedule for {room}: {err:#}");
            WeeklySchedule::placeholder()
        });
        if !schedule.is_complete() {
            warn!("schedule for {room} is incomplete; measurements will be dropped until it is updated");
        }
        rooms.insert(
            room.clone(),
            Mutex::new(RoomController::new(room.clone(), &runtime.controller, schedule)),
        );
    }

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or(runtime.network.mqtt_host.clone());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(runtime.network.mqtt_port);

    let mut mqtt_options =
        MqttOptions::new(runtime.network.client_id.clone(), mqtt_host, mqtt_port);
    let mqtt_user = std::env::var("MQTT_USER").unwrap_or(runtime.network.mqtt_user.clone());
    let mqtt_pass = std::env::var("MQTT_PASS").unwrap_or(runtime.network.mqtt_pass.clone());
    if !mqtt_user.is_empty() {
        mqtt_options.set_credentials(mqtt_user, mqtt_pass);
    }

    let (mqtt, eventloop) = AsyncClient::new(mqtt_options, 64);
    let (updates, updates_rx) = mpsc::channel(UPDATE_QUEUE_CAPACITY);

    let app_state = AppState {
        rooms: Arc::new(rooms),
        aggregate: Arc::new(Mutex::new(AnyActive::new())),
        timezone,
        relay_format: runtime.controller.relay_format,
        mqtt,
        updates,
        store,
    };

    subscribe_topics(&app_state.mqtt, &runtime.rooms).await?;
    spawn_mqtt_loop(app_state.clone(), eventloop);
    spawn_update_publish_loop(
        app_state.mqtt.clone(),
        runtime.controller.relay_format,
        updates_rx,
    );
    spawn_heartbeat_loop(
        app_state.clone(),
        runtime.rooms.clone(),
        Duration::from_millis(runtime.controller.heartbeat_interval_ms),
    );

    let app = Router::new()
        .route("/api/status", get(handle_get_status))
        .route(
            "/api/rooms/{room}/schedule",
            get(handle_get_schedule).put(handle_put_schedule),
        )
        .with_state(app_state);

    let port = std::env::var("HEATING_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;

    info!(
        rooms = runtime.rooms.len(),
        timezone = %timezone,
        "heating controller listening on http://{addr}"
    );
    axum::serve(listener, app).await?;
    Ok(())
}

fn subscribed_topics(room: &str) -> [String; 2] {
    [room_temperature(room), room_config(room)]
}

async fn subscribe_topics(mqtt: &AsyncClient, rooms: &[String]) -> anyhow::Result<()> {
    for room in rooms {
        for topic in subscribed_topics(room) {
            mqtt.subscribe(topic, QoS::AtMostOnce).await?;
        }
    }
    Ok(())
}

fn spawn_mqtt_loop(app_state: AppState, mut eventloop: rumqttc::EventLoop) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    if let Err(err) =
                        handle_mqtt_message(&app_state, &message.topic, message.payload.to_vec())
                            .await
                    {
                        warn!("mqtt message handling error on {}: {err:#}", message.topic);
                    }
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

// The MQTT event loop task must never await a publish: the request queue it
// would wait on is only drained by that same task.
fn spawn_update_publish_loop(
    mqtt: AsyncClient,
    relay_format: RelayFormat,
    mut updates: mpsc::Receiver<(String, RoomUpdate)>,
) {
    tokio::spawn(async move {
        while let Some((room, update)) = updates.recv().await {
            for message in update_messages(&room, update, relay_format) {
                if let Err(err) = mqtt
                    .publish(
                        message.topic.as_str(),
                        QoS::AtLeastOnce,
                        message.retain,
                        message.payload,
                    )
                    .await
                {
                    warn!("publish to {} failed: {err}", message.topic);
                }
            }
        }
    });
}

fn update_messages(room: &str, update: RoomUpdate, relay_format: RelayFormat) -> Vec<OutgoingMessage> {
    let message = |topic: String, retain: bool, payload: String| OutgoingMessage {
        topic,
        retain,
        payload,
    };

    vec![
        message(
            room_value(room, "CurrentTemperature"),
            false,
            update.current.to_string(),
        ),
        message(
            room_value(room, "TargetTemperature"),
            false,
            update.target.to_string(),
        ),
        message(room_value(room, "doHeating"), false, update.heating.to_string()),
        message(
            TOPIC_ANY_HEATING.to_string(),
            true,
            update.any_heating.to_string(),
        ),
        message(
            TOPIC_RELAY.to_string(),
            true,
            relay_format.payload(update.any_heating).to_string(),
        ),
    ]
}

fn spawn_heartbeat_loop(app_state: AppState, rooms: Vec<String>, period: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;

            let stamp = now_local(&app_state.timezone)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string();

            for room in &rooms {
                if let Err(err) = publish_heartbeat(&app_state.mqtt, room, &stamp).await {
                    warn!("heartbeat publish failed for {room}: {err:#}");
                }
            }
        }
    });
}

async fn publish_heartbeat(mqtt: &AsyncClient, room: &str, stamp: &str) -> anyhow::Result<()> {
    mqtt.publish(room_heartbeat(room), QoS::AtMostOnce, false, stamp.to_string())
        .await?;

    let catalog = serde_json::to_vec(&subscribed_topics(room))?;
    mqtt.publish(room_subscriptions(room), QoS::AtMostOnce, false, catalog)
        .await?;
    Ok(())
}

async fn handle_mqtt_message(
    app_state: &AppState,
    topic: &str,
    payload: Vec<u8>,
) -> anyhow::Result<()> {
    if payload.len() > MAX_MQTT_PAYLOAD_BYTES {
        warn!(
            "dropping oversized MQTT payload on topic {} ({} bytes)",
            topic,
            payload.len()
        );
        return Ok(());
    }

    let message = String::from_utf8(payload).context("non utf8 mqtt payload")?;

    match parse_room_topic(topic) {
        Some(RoomTopic::Temperature(room)) => handle_measurement(app_state, room, &message).await,
        Some(RoomTopic::Config(room)) => {
            let schedule = match WeeklySchedule::from_json(&message) {
                Ok(schedule) => schedule,
                Err(err) => {
                    warn!("ignoring schedule update for {room}: {err}");
                    return Ok(());
                }
            };
            apply_schedule(app_state, room, schedule).await
        }
        None => {
            debug!("ignoring message on unrelated topic {topic}");
            Ok(())
        }
    }
}

async fn handle_measurement(app_state: &AppState, room: &str, message: &str) -> anyhow::Result<()> {
    let Some(controller) = app_state.rooms.get(room) else {
        debug!("measurement for unknown room {room}");
        return Ok(());
    };

    let now = now_local(&app_state.timezone);
    let result = {
        let mut controller = controller.lock().await;
        let mut aggregate = app_state.aggregate.lock().await;
        controller.handle_measurement(message, &now, &mut aggregate)
    };

    match result {
        Ok(update) => {
            debug!(
                room,
                current = update.current,
                target = update.target,
                heating = update.heating,
                "measurement evaluated"
            );
            match app_state.updates.try_send((room.to_string(), update)) {
                Ok(()) => Ok(()),
                Err(TrySendError::Full(_)) => {
                    warn!("publish queue full, dropping update for {room}");
                    Ok(())
                }
                Err(TrySendError::Closed(_)) => Err(anyhow::anyhow!("update publisher stopped")),
            }
        }
        Err(err) => {
            warn!("dropping measurement for {room}: {err}");
            Ok(())
        }
    }
}

async fn apply_schedule(
    app_state: &AppState,
    room: &str,
    schedule: WeeklySchedule,
) -> anyhow::Result<()> {
    let Some(controller) = app_state.rooms.get(room) else {
        debug!("schedule for unknown room {room}");
        return Ok(());
    };

    if !schedule.is_complete() {
        warn!("schedule for {room} does not cover every day; lookups may fail");
    }

    app_state.store.save_schedule(room, &schedule).await?;
    controller.lock().await.replace_schedule(schedule);
    info!("schedule updated for {room}");
    Ok(())
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    let mut rooms = Vec::with_capacity(state.rooms.len());
    for controller in state.rooms.values() {
        rooms.push(controller.lock().await.status());
    }
    rooms.sort_by(|a, b| a.room.cmp(&b.room));

    let any_heating = state.aggregate.lock().await.value();

    Json(ControllerStatus {
        any_heating,
        relay: state.relay_format.payload(any_heating),
        timezone: state.timezone.name().to_string(),
        rooms,
    })
}

async fn handle_get_schedule(
    State(state): State<AppState>,
    Path(room): Path<String>,
) -> impl IntoResponse {
    let Some(controller) = state.rooms.get(&room) else {
        return error_response(StatusCode::NOT_FOUND, "Unknown room");
    };

    let snapshot = controller.lock().await.resolver().snapshot();
    Json(snapshot.as_ref().clone()).into_response()
}

async fn handle_put_schedule(
    State(state): State<AppState>,
    Path(room): Path<String>,
    body: String,
) -> impl IntoResponse {
    if !state.rooms.contains_key(&room) {
        return error_response(StatusCode::NOT_FOUND, "Unknown room");
    }

    let schedule = match WeeklySchedule::from_json(&body) {
        Ok(schedule) => schedule,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    };

    if let Err(err) = apply_schedule(&state, &room, schedule).await {
        warn!("failed to persist schedule update: {err:#}");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to persist schedule",
        );
    }

    handle_get_schedule(State(state), Path(room))
        .await
        .into_response()
}

impl AppStore {
    fn new() -> Self {
        let data_dir = std::env::var("HEATING_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.heating"));

        Self {
            data_dir: Arc::new(data_dir),
            lock: Arc::new(Mutex::new(())),
        }
    }

    fn schedule_path(&self, room: &str) -> PathBuf {
        self.data_dir.join(format!("{room}.json"))
    }

    async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.data_dir.join("runtime.json")).await {
            Ok(raw) => Ok(serde_json::from_slice::<RuntimeConfig>(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }

    async fn load_schedule(&self, room: &str) -> anyhow::Result<WeeklySchedule> {
        let _guard = self.lock.lock().await;
        let path = self.schedule_path(room);
        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => WeeklySchedule::from_json(&raw)
                .with_context(|| format!("invalid schedule in {}", path.display())),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(WeeklySchedule::placeholder()),
            Err(err) => Err(err.into()),
        }
    }

    async fn save_schedule(&self, room: &str, schedule: &WeeklySchedule) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        tokio::fs::create_dir_all(self.data_dir.as_ref()).await?;
        let payload = serde_json::to_vec_pretty(schedule)?;
        tokio::fs::write(self.schedule_path(room), payload).await?;
        Ok(())
    }
}

fn now_local(timezone: &Tz) -> DateTime<Tz> {
    Utc::now().with_timezone(timezone)
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}
