//! API Routes

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        DefaultBodyLimit, Multipart, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;

use crate::access_engine::{DecisionOutcome, DenyReason, ReaderMode};
use crate::error::{Error, Result};
use crate::models::ApiResponse;
use crate::plate_capture::CaptureChannel;
use crate::state::AppState;

/// Largest accepted camera frame
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(super::health_check))
        // Reader mode
        .route("/api/set-rfid-mode", post(set_rfid_mode))
        // Camera uploads
        .route(
            "/api/upload",
            post(upload_image).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        // RFID reader
        .route("/api/rfid-request", get(rfid_request))
        // Sensor unit
        .route("/updateSlots", get(update_slots))
        // Dashboard
        .route("/api/manual-open-gate", post(manual_open_gate))
        .route("/api/parking-data", get(parking_data))
        .route("/api/parking-clear", delete(parking_clear))
        // WebSocket
        .route("/api/ws", get(websocket_handler))
        .with_state(state)
}

// ========================================
// Reader mode
// ========================================

#[derive(Debug, Deserialize)]
struct SetModeRequest {
    mode: String,
}

async fn set_rfid_mode(
    State(state): State<AppState>,
    Json(req): Json<SetModeRequest>,
) -> Result<impl IntoResponse> {
    let mode = ReaderMode::parse(&req.mode)?;
    state.service.set_mode(mode).await;

    Ok(Json(ApiResponse::success(json!({
        "mode": mode,
        "message": format!("RFID reader mode set to {}", mode),
    }))))
}

// ========================================
// Camera uploads
// ========================================

async fn upload_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse> {
    let mut image: Option<(Vec<u8>, String)> = None;
    let mut channel: Option<CaptureChannel> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::Validation(format!("Malformed upload: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let file_name = field.file_name().unwrap_or("capture.jpg").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| Error::Validation(format!("Unreadable image: {}", e)))?;
                image = Some((data.to_vec(), file_name));
            }
            "type" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| Error::Validation(format!("Unreadable type: {}", e)))?;
                channel = Some(CaptureChannel::parse(&text)?);
            }
            _ => {}
        }
    }

    let Some((data, file_name)) = image.filter(|(data, _)| !data.is_empty()) else {
        return Err(Error::Validation("No image file uploaded".to_string()));
    };
    let channel =
        channel.ok_or_else(|| Error::Validation("Missing capture type (entry/exit)".to_string()))?;

    let image_ref = state.images.save(&data, &file_name).await?;
    tracing::debug!(channel = %channel, image = %image_ref, bytes = data.len(), "Frame uploaded");

    let result = state
        .service
        .submit_captured_image(channel, image_ref)
        .await?;

    Ok(Json(ApiResponse::success(result)))
}

// ========================================
// RFID reader
// ========================================

#[derive(Debug, Deserialize)]
struct RfidQuery {
    uid: Option<String>,
}

async fn rfid_request(
    State(state): State<AppState>,
    Query(query): Query<RfidQuery>,
) -> impl IntoResponse {
    let uid = query.uid.unwrap_or_default();
    let decision = state.service.handle_rfid_scan(&uid).await;

    let status = match decision.outcome {
        DecisionOutcome::Error => StatusCode::INTERNAL_SERVER_ERROR,
        _ if decision.is_denied_for(DenyReason::MissingUid) => StatusCode::BAD_REQUEST,
        _ => StatusCode::OK,
    };

    (status, Json(decision))
}

// ========================================
// Sensor unit
// ========================================

#[derive(Debug, Deserialize)]
struct UpdateSlotsQuery {
    states: Option<String>,
    total: Option<String>,
    ip: Option<String>,
}

async fn update_slots(
    State(state): State<AppState>,
    Query(query): Query<UpdateSlotsQuery>,
) -> Result<impl IntoResponse> {
    let states = query
        .states
        .ok_or_else(|| Error::Validation("Missing states parameter".to_string()))?;
    let total: usize = query
        .total
        .as_deref()
        .and_then(|t| t.trim().parse().ok())
        .ok_or_else(|| Error::Validation("Missing or invalid total parameter".to_string()))?;

    let snapshot = state
        .service
        .report_sensor_slots(&states, total, query.ip)
        .await?;

    Ok(Json(ApiResponse::success(snapshot)))
}

// ========================================
// Dashboard
// ========================================

async fn manual_open_gate(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let ack = state.service.manual_open_gate().await?;
    Ok(Json(ApiResponse::success(ack)))
}

async fn parking_data(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let snapshot = state.service.status_snapshot().await?;
    Ok(Json(ApiResponse::success(snapshot)))
}

async fn parking_clear(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let summary = state.service.clear_all().await?;
    Ok(Json(ApiResponse::success(summary)))
}

// ========================================
// WebSocket Handler
// ========================================

/// WebSocket upgrade handler
async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle WebSocket connection
async fn handle_websocket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let (conn_id, mut rx) = state.realtime.register().await;

    tracing::info!(connection_id = %conn_id, "WebSocket client connected");

    // Forward hub messages to the socket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    // Clients only listen; watch for close
    let recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Close(_)) => {
                    tracing::info!(connection_id = %conn_id, "WebSocket client disconnected");
                    break;
                }
                Err(e) => {
                    tracing::warn!(connection_id = %conn_id, error = %e, "WebSocket error");
                    break;
                }
                _ => {}
            }
        }
        conn_id
    });

    let conn_id = tokio::select! {
        _ = send_task => conn_id,
        result = recv_task => result.unwrap_or(conn_id),
    };

    state.realtime.unregister(&conn_id).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate_relay::{GateController, GateFailure};
    use crate::image_store::{ImageRef, ImageStore};
    use crate::parking_ledger::InMemoryRecordStore;
    use crate::plate_recognizer::{PlateReading, PlateRecognizer, RecognitionFailure};
    use crate::state::{AppConfig, Collaborators};
    use crate::vehicle_directory::InMemoryVehicleDirectory;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::sync::Arc;
    use tower::ServiceExt;

    struct PlateOnEveryFrame;

    #[async_trait]
    impl PlateRecognizer for PlateOnEveryFrame {
        async fn recognize(
            &self,
            _image_ref: &ImageRef,
        ) -> std::result::Result<PlateReading, RecognitionFailure> {
            Ok(PlateReading::Plate("51F-123.45".to_string()))
        }
    }

    struct UnreachableGate;

    #[async_trait]
    impl GateController for UnreachableGate {
        async fn open(&self, address: &str) -> std::result::Result<String, GateFailure> {
            Err(GateFailure::Unreachable {
                address: address.to_string(),
                detail: "connection refused".to_string(),
            })
        }
    }

    async fn app() -> Router {
        let config = AppConfig::from_lookup(|_| None);
        let dir = std::env::temp_dir().join(format!("parkgate-api-{}", uuid::Uuid::new_v4()));
        let images = Arc::new(ImageStore::new(dir).await.unwrap());
        let state = AppState::assemble(
            config,
            None,
            images,
            Collaborators {
                records: Arc::new(InMemoryRecordStore::new()),
                directory: Arc::new(InMemoryVehicleDirectory::with_entries([(
                    "A1B2C3D4",
                    "51F12345",
                )])),
                recognizer: Arc::new(PlateOnEveryFrame),
                gate: Arc::new(UnreachableGate),
            },
        );
        create_router(state)
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_healthz() {
        let resp = app().await.oneshot(get_req("/healthz")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["status"], "ok");
        assert!(body["db_connected"].is_null());
    }

    #[tokio::test]
    async fn test_set_mode_validates() {
        let app = app().await;
        let bad = Request::builder()
            .method("POST")
            .uri("/api/set-rfid-mode")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"mode":"sideways"}"#))
            .unwrap();
        let resp = app.clone().oneshot(bad).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error_code"], "VALIDATION_ERROR");

        let good = Request::builder()
            .method("POST")
            .uri("/api/set-rfid-mode")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"mode":"exit"}"#))
            .unwrap();
        let resp = app.oneshot(good).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["data"]["mode"], "exit");
    }

    #[tokio::test]
    async fn test_update_slots() {
        let app = app().await;

        let resp = app
            .clone()
            .oneshot(get_req("/updateSlots?states=101&total=5&ip=10.0.0.7"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = app
            .clone()
            .oneshot(get_req("/updateSlots?states=10100&total=5&ip=10.0.0.7"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["data"]["occupied"], 2);
        assert_eq!(body["data"]["available"], 3);

        // learned address, but the controller is down
        let open = Request::builder()
            .method("POST")
            .uri("/api/manual-open-gate")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(open).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(body_json(resp).await["error_code"], "UPSTREAM_UNAVAILABLE");
    }

    #[tokio::test]
    async fn test_manual_open_without_sensor_report() {
        let open = Request::builder()
            .method("POST")
            .uri("/api/manual-open-gate")
            .body(Body::empty())
            .unwrap();
        let resp = app().await.oneshot(open).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_rfid_request_without_uid() {
        let resp = app()
            .await
            .oneshot(get_req("/api/rfid-request"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = body_json(resp).await;
        assert_eq!(body["open_gate"], false);
        assert_eq!(body["reason"], "missing_uid");
        assert_eq!(body["slots"], 5);
    }

    #[tokio::test]
    async fn test_upload_records_plate() {
        let boundary = "parkgate-boundary";
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"type\"\r\n\r\nentry\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"car 1.jpg\"\r\n\
             Content-Type: image/jpeg\r\n\r\nJPEGDATA\r\n--{b}--\r\n",
            b = boundary
        );
        let req = Request::builder()
            .method("POST")
            .uri("/api/upload")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .unwrap();

        let resp = app().await.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["data"]["plate"], "51F12345");
        assert_eq!(body["data"]["channel"], "entry");
        assert!(body["data"]["image_path"]
            .as_str()
            .unwrap()
            .ends_with("car_1.jpg"));
    }

    #[tokio::test]
    async fn test_parking_data_and_clear() {
        let app = app().await;

        let resp = app
            .clone()
            .oneshot(get_req("/api/parking-data"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["data"]["ledger"]["available"], 5);
        assert_eq!(body["data"]["sensor"]["total"], 5);
        assert_eq!(body["data"]["mode"], "entry");

        let clear = Request::builder()
            .method("DELETE")
            .uri("/api/parking-clear")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(clear).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["data"]["deleted_count"], 0);
    }
}
