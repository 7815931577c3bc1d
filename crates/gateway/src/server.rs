use std::{net::SocketAddr, sync::Arc, time::Duration};

use {
    axum::{
        Json, Router,
        extract::{ConnectInfo, DefaultBodyLimit, State, WebSocketUpgrade},
        response::{Html, IntoResponse},
        routing::{get, post},
    },
    tokio::sync::mpsc,
    tower_http::{
        cors::{Any, CorsLayer},
        limit::RequestBodyLimitLayer,
        trace::TraceLayer,
    },
    tracing::{info, warn},
    walink_auto_reply::{InboundReactor, RuleTable, default_rules},
    walink_config::WalinkConfig,
    walink_media::{MediaResolver, ReqwestFetcher},
    walink_protocol::{MAX_PAYLOAD_BYTES, PROTOCOL_VERSION, TICK_INTERVAL_MS},
    walink_whatsapp::{
        ChatSession, DispatchPolicy, FileSessionStore, OutboundDispatcher, SessionEventHandler,
        SessionOptions, SessionStore, SidecarProcessConfig, SidecarSupervisor, Transport,
        WhatsAppSession, connect_with_retry, find_sidecar_dir, start_sidecar,
    },
};

use crate::{
    broadcast::broadcast_tick,
    relay::EventRelay,
    send_routes,
    state::{GatewayOptions, GatewayState},
    ws::handle_connection,
};

const INDEX_HTML: &str = include_str!("../assets/index.html");
const TIMER_HTML: &str = include_str!("../assets/timer.html");

/// Slack on top of the media limit for multipart framing and text fields.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Build the gateway router (shared by production startup and tests).
pub fn build_gateway_app(state: Arc<GatewayState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let body_limit = state.options.max_upload_bytes + MULTIPART_OVERHEAD;

    Router::new()
        .route("/", get(index_handler))
        .route("/timer", get(timer_handler))
        .route("/health", get(health_handler))
        .route("/ws", get(ws_upgrade_handler))
        .route("/send-Message", post(send_routes::send_message))
        .route(
            "/send-browse",
            post(send_routes::send_browse).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/send-url", post(send_routes::send_url))
        .route("/send-files", post(send_routes::send_files))
        .route("/delete", post(send_routes::delete_session))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Wire the session, sidecar, dispatcher and observers from `config`, then
/// serve until ctrl-c or SIGTERM.
pub async fn start_gateway(config: WalinkConfig, bind: &str, port: u16) -> anyhow::Result<()> {
    let store: Arc<dyn SessionStore> =
        Arc::new(FileSessionStore::new(&config.whatsapp.session_file));

    // Sidecar process, unless it is run by hand.
    let sidecar_cfg = &config.whatsapp.sidecar;
    let launch = if sidecar_cfg.auto_start {
        Some(SidecarProcessConfig {
            sidecar_dir: find_sidecar_dir(sidecar_cfg.dir.as_deref())?,
            port: sidecar_cfg.port,
            data_dir: None,
        })
    } else {
        info!(
            port = sidecar_cfg.port,
            "sidecar auto_start disabled, expecting a running sidecar"
        );
        None
    };
    let process = match &launch {
        Some(launch) => Some(start_sidecar(launch.clone()).await?),
        None => None,
    };

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let transport = Arc::new(
        connect_with_retry(sidecar_cfg.port, events_tx, sidecar_cfg.connect_retries).await?,
    );

    let send_timeout = match config.whatsapp.send_timeout_secs {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };
    let session = WhatsAppSession::new(
        Arc::clone(&transport) as Arc<dyn Transport>,
        events_rx,
        Arc::clone(&store),
        SessionOptions {
            restart_on_auth_fail: config.whatsapp.restart_on_auth_fail,
            send_timeout,
        },
    );
    let chat: Arc<dyn ChatSession> = session.clone();

    let fetcher = ReqwestFetcher::new(
        Duration::from_secs(config.media.fetch_timeout_secs),
        config.media.max_media_bytes,
    )?;
    let resolver = Arc::new(
        MediaResolver::new(&config.media.files_dir, Arc::new(fetcher))
            .with_max_bytes(config.media.max_media_bytes),
    );
    let dispatcher = Arc::new(OutboundDispatcher::new(
        Arc::clone(&chat),
        Arc::clone(&resolver),
        DispatchPolicy {
            country_code: config.whatsapp.country_code.clone(),
            check_registration_for_media: config.whatsapp.check_registration_for_media,
        },
    ));

    let state = GatewayState::new(Arc::clone(&chat), dispatcher, store, GatewayOptions {
        default_file: config.media.default_file.clone(),
        max_upload_bytes: config.media.max_media_bytes,
    });

    // The relay goes first: credentials must be saved before anything else
    // reacts to the session.
    session.add_handler(Arc::new(EventRelay::new(Arc::clone(&state))));
    let reply_rules = if config.auto_reply.enabled {
        let rules = match &config.auto_reply.rules {
            Some(rules) => RuleTable::from_config(rules)?,
            None => RuleTable::new(default_rules())?,
        };
        let count = rules.len();
        session.add_handler(Arc::new(InboundReactor::new(
            Arc::clone(&chat),
            resolver,
            rules,
        )));
        Some(count)
    } else {
        None
    };
    let supervisor = Arc::new(SidecarSupervisor::new(
        transport,
        &session,
        launch,
        process,
        sidecar_cfg.connect_retries,
    ));
    session.add_handler(Arc::clone(&supervisor) as Arc<dyn SessionEventHandler>);

    let app = build_gateway_app(Arc::clone(&state));
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let mut lines = vec![
        format!("walink gateway v{}", state.version),
        format!("listening: http://{addr}"),
        format!("session file: {}", config.whatsapp.session_file.display()),
        format!("media dir: {}", config.media.files_dir.display()),
    ];
    match reply_rules {
        Some(count) => lines.push(format!("auto-reply: {count} rules")),
        None => lines.push("auto-reply: disabled".into()),
    }
    let width = lines.iter().map(|l| l.len()).max().unwrap_or(0) + 4;
    info!("┌{}┐", "─".repeat(width));
    for line in &lines {
        info!("│  {:<w$}│", line, w = width - 2);
    }
    info!("└{}┘", "─".repeat(width));

    session.initialize().await?;

    // Spawn tick timer.
    let tick_state = Arc::clone(&state);
    let tick_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(TICK_INTERVAL_MS));
        loop {
            interval.tick().await;
            broadcast_tick(&tick_state).await;
        }
    });

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tick_task.abort();
    supervisor.stop().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            },
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn timer_handler() -> Html<&'static str> {
    Html(TIMER_HTML)
}

async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    let count = state.client_count().await;
    Json(serde_json::json!({
        "status": "ok",
        "version": state.version,
        "protocol": PROTOCOL_VERSION,
        "session": state.session.state().as_str(),
        "connections": count,
    }))
}

async fn ws_upgrade_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<GatewayState>>,
) -> impl IntoResponse {
    ws.max_message_size(MAX_PAYLOAD_BYTES)
        .on_upgrade(move |socket| handle_connection(socket, state, addr))
}
