use std::{
    net::Ipv4Addr,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use log::{info, warn};
use serde::Serialize;
use tokio::net::TcpListener;

use crate::{datapath::Datapath, error::Error, session::Session};

pub type SessionHandle<D> = Arc<Mutex<Session<D>>>;

/// Applications toggle `/ip` to trust the peers they want to hear from before talking to them
///
/// Admins check `/whitelist` to see every trusted peer, learned or added, and delete it to start
/// over
pub fn router<D: Datapath + 'static>(session: SessionHandle<D>) -> Router {
    Router::new()
        .route("/ip/:ip", put(trust_ip::<D>))
        .route("/whitelist", get(list::<D>).delete(clear::<D>))
        .with_state(session)
}

pub async fn serve<D: Datapath + 'static>(
    listener: TcpListener,
    session: SessionHandle<D>,
) -> anyhow::Result<()> {
    info!("Admin API listening on {}", listener.local_addr()?);
    axum::serve(listener, router(session)).await?;
    Ok(())
}

fn lock<D: Datapath>(session: &SessionHandle<D>) -> MutexGuard<'_, Session<D>> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Let this IP pass ingress before any traffic was sent to it
async fn trust_ip<D: Datapath>(
    State(session): State<SessionHandle<D>>,
    Path(ip): Path<String>,
) -> Result<Json<Ipv4Addr>, ApiError> {
    let addr = lock(&session).add(&ip)?;
    info!("Trust {addr}");
    Ok(Json(addr))
}

/// List all the whitelisted IPs
async fn list<D: Datapath>(
    State(session): State<SessionHandle<D>>,
) -> Result<Json<Vec<Ipv4Addr>>, ApiError> {
    Ok(Json(lock(&session).list()?))
}

#[derive(Debug, Serialize)]
struct Cleared {
    removed: usize,
}

/// Forget every whitelisted IP
async fn clear<D: Datapath>(
    State(session): State<SessionHandle<D>>,
) -> Result<Json<Cleared>, ApiError> {
    let removed = lock(&session).clear()?;
    info!("Cleared {removed} whitelist entries");
    Ok(Json(Cleared { removed }))
}

#[derive(Debug)]
struct ApiError(Error);
impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::Validation { .. } => StatusCode::BAD_REQUEST,
            Error::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            e => {
                warn!("Admin request failed: {e}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, self.0.to_string()).into_response()
    }
}
