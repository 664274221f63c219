//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling. Each request body is
//! collected up to `max_body_bytes`, then handed to the route dispatcher
//! under the configured request timeout.

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::auth::JwtValidator;
use crate::checklist::ChecklistWorkflow;
use crate::config::{Args, MaintenancePolicy};
use crate::db::{AssetLocks, MemoryStore, Store};
use crate::ledger::ShotLedger;
use crate::notify::NotificationEngine;
use crate::registry::AssetRegistry;
use crate::repair::RepairLog;
use crate::routes;
use crate::schedule::InspectionScheduler;
use crate::session::SessionAuthority;
use crate::types::{KeeperError, Result};

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub policy: MaintenancePolicy,
    pub store: Arc<dyn Store>,
    /// Per-asset write serialization shared by ledger, checklists and registry
    pub locks: Arc<AssetLocks>,
    pub registry: AssetRegistry,
    pub ledger: ShotLedger,
    pub scheduler: Arc<InspectionScheduler>,
    pub notifications: NotificationEngine,
    pub checklists: ChecklistWorkflow,
    pub repairs: RepairLog,
    /// Asset-scoped write tokens
    pub sessions: SessionAuthority,
    /// Staff credentials
    pub admin_jwt: JwtValidator,
    pub started_at: Instant,
}

impl AppState {
    /// State over the in-memory store (dev mode, tests)
    pub fn new(args: Args) -> Result<Self> {
        Self::with_store(args, Arc::new(MemoryStore::new()))
    }

    /// State over an explicit store backend
    pub fn with_store(args: Args, store: Arc<dyn Store>) -> Result<Self> {
        let policy = args.maintenance_policy()?;
        let locks = Arc::new(AssetLocks::new());
        let scheduler = Arc::new(InspectionScheduler::new(&policy));

        let sessions = SessionAuthority::new(
            args.session_secret()?,
            Duration::from_secs(args.session_ttl_seconds),
        )?;
        let admin_jwt = JwtValidator::new(args.jwt_secret()?, args.jwt_expiry_seconds)?;

        Ok(Self {
            registry: AssetRegistry::new(Arc::clone(&store), Arc::clone(&locks)),
            ledger: ShotLedger::new(Arc::clone(&store), Arc::clone(&locks), args.history_max_limit),
            notifications: NotificationEngine::new(Arc::clone(&store), Arc::clone(&scheduler), &policy),
            checklists: ChecklistWorkflow::new(
                Arc::clone(&store),
                Arc::clone(&locks),
                policy.require_complete_checklist,
            ),
            repairs: RepairLog::new(Arc::clone(&store), Arc::clone(&locks)),
            scheduler,
            sessions,
            admin_jwt,
            locks,
            store,
            policy,
            args,
            started_at: Instant::now(),
        })
    }
}

/// Accept connections until ctrl-c
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Moldkeeper listening on {} (storage: {})",
        state.args.listen,
        state.store.backend()
    );

    if state.args.dev_mode {
        warn!("Development mode enabled - default secrets in use");
    }

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    let state = Arc::clone(&state);
                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);

                        let service = service_fn(move |req| {
                            let state = Arc::clone(&state);
                            async move { handle_request(state, addr, req).await }
                        });

                        if let Err(err) = http1::Builder::new()
                            .serve_connection(io, service)
                            .await
                        {
                            error!("Error serving connection from {}: {:?}", addr, err);
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {:?}", e);
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                return Ok(());
            }
        }
    }
}

async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, hyper::Error> {
    let started = Instant::now();
    let (parts, body) = req.into_parts();
    let path = parts.uri.path().to_string();
    let query = parts.uri.query().map(str::to_string);

    debug!("[{}] {} {}", addr, parts.method, path);

    let body = match collect_body(body, state.args.max_body_bytes).await {
        Ok(body) => body,
        Err(err) => {
            warn!(path = %path, error = %err, "Request body rejected");
            return Ok(routes::error_response(&err));
        }
    };

    let timeout = Duration::from_millis(state.args.request_timeout_ms);
    let response = match tokio::time::timeout(
        timeout,
        routes::route(
            Arc::clone(&state),
            &parts.method,
            &path,
            query.as_deref(),
            &parts.headers,
            body,
        ),
    )
    .await
    {
        Ok(response) => response,
        Err(_) => {
            warn!(path = %path, timeout_ms = state.args.request_timeout_ms, "Request timed out");
            routes::timeout_response()
        }
    };

    info!(
        method = %parts.method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Request handled"
    );
    Ok(response)
}

/// Read a whole body, refusing anything over `limit` bytes
async fn collect_body<B>(body: B, limit: usize) -> Result<Bytes>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => Err(KeeperError::BadRequest(
            format!("Request body exceeds {} bytes", limit),
        )),
        Err(e) => Err(KeeperError::BadRequest(format!(
            "Failed to read request body: {}",
            e
        ))),
    }
}
