use actix_web::http::header;
use actix_web::{web, HttpResponse, Responder};
use log::{info, warn};
use serde::Serialize;

use crate::api::sse;
use crate::api::AppState;
use crate::capture::session::{CaptureSession, SessionHandle};
use crate::models::filter::{FilterParams, FilterSpec};
use crate::models::interface::InterfaceInfo;
use crate::models::stats::SessionInfo;
use crate::utils::error::AppResult;

/// Response for listing interfaces
#[derive(Serialize)]
struct InterfacesResponse {
    data: Vec<InterfaceInfo>,
}

/// Response for capture status
#[derive(Serialize)]
struct CaptureStatusResponse {
    running: bool,
    session: Option<SessionInfo>,
}

/// List capture-capable network interfaces
pub async fn list_interfaces(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let source = state.source.clone();
    let interfaces = web::block(move || source.list_devices()).await??;
    info!("Listing {} interfaces", interfaces.len());

    Ok(HttpResponse::Ok().json(InterfacesResponse { data: interfaces }))
}

/// Start a capture and stream matching records back as server-sent events
pub async fn start_capture(
    state: web::Data<AppState>,
    query: web::Query<FilterParams>,
) -> AppResult<HttpResponse> {
    let params = query.into_inner();
    let interface = params.interface.clone().unwrap_or_default();

    // a new request displaces the running capture even if it turns out invalid
    let admission = state
        .sessions
        .admit(SessionHandle::new(interface.trim()))
        .await;

    let spec = match FilterSpec::from_params(params) {
        Ok(spec) => spec,
        Err(e) => {
            warn!("Rejected capture request: {}", e);
            return Err(e);
        }
    };

    let (sink, stream) = sse::channel(
        admission.session().clone(),
        state.config.channel_capacity,
        state.config.heartbeat(),
    );
    CaptureSession::new(admission, spec, state.source.clone(), sink).spawn();

    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .insert_header(("X-Accel-Buffering", "no"))
        .streaming(stream))
}

/// Get capture status
pub async fn get_capture_status(state: web::Data<AppState>) -> impl Responder {
    let session = state.sessions.current();

    HttpResponse::Ok().json(CaptureStatusResponse {
        running: session.is_some(),
        session,
    })
}
