//! The web/API daemon entrypoint (`spec.md` §4.3 notification fan-out,
//! §4.5 analytics/cache, §6 HTTP/JSON + SSE surface).
//!
//! This is the one process in the topology that owns a live `EventBus`
//! *instance* with subscribers attached: the capture/analysis/update
//! daemons each run as separate OS processes per `spec.md` §2, but the
//! in-process `broadcast` channel `EventBus` wraps has no cross-process
//! equivalent in this codebase, so cache invalidation (§8 scenario E5)
//! and notification fan-out are wired here as a background task that
//! subscribes to this daemon's own bus. See `DESIGN.md` for the full
//! writeup of that simplification.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use corvid_sentinel::api::{self, AppState};
use corvid_sentinel::cache::{namespace, QueryCache};
use corvid_sentinel::config::{self, CorvidConfig};
use corvid_sentinel::eventbus::EventBus;
use corvid_sentinel::notify::adapters::apprise::AppriseAdapter;
use corvid_sentinel::notify::adapters::mqtt::MqttAdapter;
use corvid_sentinel::notify::adapters::webhook::WebhookAdapter;
use corvid_sentinel::notify::{NotificationRouter, RuleEngine};
use corvid_sentinel::store::{self, DetectionStore, ReferenceStore, WeatherStore};
use corvid_sentinel::update::UpdateChannel;
use corvid_sentinel::weather::{truncate_to_hour, WeatherClient};

#[derive(Parser, Debug)]
#[command(name = "corvid-web")]
#[command(about = "Serves the detection/analytics HTTP API and owns notification fan-out")]
struct CliArgs {
    /// Path to config.yaml; falls back to $CORVID_CONFIG, then ./config.yaml.
    #[arg(long, env = "CORVID_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the SQLite database and the update channel.
    #[arg(long, env = "CORVID_DATA_DIR", default_value = "/var/lib/corvid-sentinel")]
    data_dir: PathBuf,

    /// Path to the read-only IOC reference database.
    #[arg(long, env = "CORVID_REFERENCE_DB")]
    reference_db: Option<PathBuf>,

    /// Address the HTTP server binds to.
    #[arg(long, env = "CORVID_WEB_BIND", default_value = "0.0.0.0:8080")]
    bind: String,
}

const ADAPTER_TIMEOUT: Duration = Duration::from_secs(10);
const WEATHER_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);
const WEATHER_SWEEP_BATCH: u32 = 50;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    corvid_sentinel::telemetry::init("corvid-web");

    let args = CliArgs::parse();
    let loaded = CorvidConfig::load(args.config.as_deref())?;
    config::init(loaded);
    let cfg = config::get();

    let db_path = args.data_dir.join("corvid.db");
    let pool = store::open_pool(&db_path).await?;
    let reference_db_path = args.reference_db.unwrap_or_else(|| args.data_dir.join("reference.db"));

    let event_bus = EventBus::new(256);
    let state = AppState {
        db: pool.clone(),
        reference_db_path: reference_db_path.clone(),
        cache: QueryCache::new(),
        event_bus: event_bus.clone(),
        language: cfg.location.language.clone(),
    };

    let update_channel = Arc::new(UpdateChannel::new(&args.data_dir));
    let app = api::create_app(state.clone(), update_channel, args.data_dir.clone());

    let router = build_notification_router(cfg);
    tokio::spawn(fan_out_task(state.clone(), router));
    tokio::spawn(weather_sweep_task(pool.clone(), cfg.location.latitude, cfg.location.longitude));

    let listener = tokio::net::TcpListener::bind(&args.bind).await?;
    tracing::info!(addr = %args.bind, "corvid-web listening");
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_notification_router(cfg: &CorvidConfig) -> NotificationRouter {
    let webhook = WebhookAdapter::new(cfg.notifications.webhook_targets.clone(), ADAPTER_TIMEOUT);
    let apprise = AppriseAdapter::new(
        cfg.notifications.apprise_api_base.clone(),
        cfg.notifications.apprise_targets.clone(),
        ADAPTER_TIMEOUT,
    );

    let mqtt = if cfg.mqtt.enable_mqtt {
        Some(MqttAdapter::connect(
            &cfg.mqtt.mqtt_client_id,
            &cfg.mqtt.mqtt_broker_host,
            cfg.mqtt.mqtt_broker_port,
            cfg.mqtt.mqtt_username.as_deref(),
            cfg.mqtt.mqtt_password.as_deref(),
            &cfg.mqtt.mqtt_topic_prefix,
        ))
    } else {
        None
    };

    NotificationRouter {
        engine: RuleEngine::new(),
        webhook,
        apprise,
        mqtt,
    }
}

/// Subscribes to the in-process bus and, for each published detection,
/// invalidates the cache namespaces the spec ties to an insert and runs
/// it through the notification rule engine.
async fn fan_out_task(state: AppState, mut router: NotificationRouter) {
    let mut subscription = state.event_bus.subscribe();
    let reference_store = ReferenceStore::new(&state.db, &state.reference_db_path);
    let detection_store = DetectionStore::new(&state.db);

    while let Some(detection) = subscription.recv().await {
        for ns in namespace::ON_INSERT {
            state.cache.invalidate_namespace(*ns);
        }

        let taxonomy = match reference_store.lookup(&detection.scientific_name, &state.language).await {
            Ok(Some((species_reference, _display_name))) => Some(species_reference),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, species = %detection.scientific_name, "taxonomy lookup failed for notification");
                None
            }
        };

        let cfg = config::get();
        router
            .handle_detection(&cfg.notifications, &detection, taxonomy.as_ref(), &detection_store)
            .await;
    }
}

/// Periodically attaches hourly weather observations to detections that
/// don't have one yet (`spec.md` §3). Detections missing a weather
/// attachment are swept oldest-first, a bounded batch per tick so a slow
/// or rate-limited upstream API can't build an unbounded backlog of
/// concurrent requests.
async fn weather_sweep_task(pool: sqlx::SqlitePool, default_lat: f64, default_lon: f64) {
    let detections = DetectionStore::new(&pool);
    let weather_store = WeatherStore::new(&pool);
    let client = WeatherClient::new(ADAPTER_TIMEOUT);

    loop {
        match detections.missing_weather(WEATHER_SWEEP_BATCH).await {
            Ok(pending) => {
                for detection in pending {
                    let latitude = detection.latitude.unwrap_or(default_lat);
                    let longitude = detection.longitude.unwrap_or(default_lon);
                    let hour = truncate_to_hour(detection.timestamp);

                    let weather = match weather_store.get(hour, latitude, longitude).await {
                        Ok(Some(w)) => Some(w),
                        Ok(None) => match client.fetch_hour(latitude, longitude, hour).await {
                            Ok(w) => {
                                if let Err(e) = weather_store.upsert(&w).await {
                                    tracing::warn!(error = %e, "failed to persist fetched weather observation");
                                }
                                Some(w)
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "weather fetch failed, will retry next sweep");
                                None
                            }
                        },
                        Err(e) => {
                            tracing::warn!(error = %e, "weather lookup failed, will retry next sweep");
                            None
                        }
                    };

                    if weather.is_some() {
                        if let Err(e) = detections.attach_weather(detection.id, hour, latitude, longitude).await {
                            tracing::warn!(error = %e, detection_id = %detection.id, "failed to attach weather to detection");
                        }
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to list detections missing weather"),
        }

        tokio::time::sleep(WEATHER_SWEEP_INTERVAL).await;
    }
}
