use actix_web::{middleware::Logger, web, App, HttpResponse, HttpServer, Result as ActixResult};
use chrono::{DateTime, Local, NaiveDate, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::diagnostics::{check_permissions, test_file_write};
use super::live_buffer::SharedBuffer;
use crate::analysis::{detect_anomalies, summarize, AnomalyMethod, Metric};
use crate::config::Settings;
use crate::devices::reading::{parse_date, Reading, DATE_FORMAT, TIMESTAMP_FORMAT};
use crate::storage::History;
use crate::utils::error::CondensateError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorResponse {
    fn new(code: &str, error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            code: code.to_string(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReadingsResponse {
    pub success: bool,
    pub date: Option<String>,
    pub count: usize,
    pub readings: Vec<Reading>,
}

#[derive(Debug, Deserialize)]
pub struct DateQuery {
    pub date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub date: Option<String>,
    pub metric: Option<String>,
    pub anomaly_method: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TestWriteQuery {
    pub dir: Option<PathBuf>,
}

#[derive(Clone)]
pub struct ApiServiceState {
    pub settings: Arc<RwLock<Settings>>,
    pub settings_path: PathBuf,
    pub buffer: SharedBuffer,
}

impl ApiServiceState {
    pub fn new(settings: Arc<RwLock<Settings>>, settings_path: PathBuf, buffer: SharedBuffer) -> Self {
        Self {
            settings,
            settings_path,
            buffer,
        }
    }

    async fn history(&self) -> Result<History, CondensateError> {
        let settings = self.settings.read().await;
        History::from_settings(&settings.logging, settings.device.mock_data)
    }
}

pub struct ApiService {
    state: ApiServiceState,
    server_handle: Option<actix_web::dev::ServerHandle>,
}

impl ApiService {
    pub fn new(state: ApiServiceState) -> Self {
        Self {
            state,
            server_handle: None,
        }
    }

    pub async fn start(&mut self, port: u16) -> Result<(), CondensateError> {
        info!("🌐 Starting HTTP API server on port {}", port);

        let state_data = web::Data::new(self.state.clone());
        let server = HttpServer::new(move || {
            App::new()
                .app_data(state_data.clone())
                .wrap(Logger::default())
                .configure(configure_routes)
        })
        .bind(format!("0.0.0.0:{}", port))?
        .run();

        self.server_handle = Some(server.handle());
        tokio::spawn(async move {
            if let Err(e) = server.await {
                error!("❌ HTTP API server error: {}", e);
            }
        });

        info!("✅ HTTP API server started on port {}", port);
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<(), CondensateError> {
        info!("🛑 Stopping HTTP API server...");
        if let Some(handle) = self.server_handle.take() {
            tokio::select! {
                _ = handle.stop(true) => {
                    info!("✅ HTTP API server stopped gracefully");
                }
                _ = tokio::time::sleep(tokio::time::Duration::from_secs(10)) => {
                    warn!("⚠️  HTTP API server shutdown timeout, forcing stop");
                    handle.stop(false).await;
                }
            }
        }
        Ok(())
    }
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(health_check))
            .route("/readings/latest", web::get().to(latest_reading))
            .route("/readings", web::get().to(list_readings))
            .route("/dates", web::get().to(list_dates))
            .route("/stats", web::get().to(day_statistics))
            .route("/settings", web::get().to(get_settings))
            .route("/settings", web::put().to(update_settings))
            .route("/diagnostics/permissions", web::get().to(permissions))
            .route("/diagnostics/test-write", web::post().to(test_write)),
    );
}

// GET /api/health
async fn health_check(state: web::Data<ApiServiceState>) -> ActixResult<HttpResponse> {
    let mock = state.settings.read().await.device.mock_data;
    let buffered = state.buffer.lock().map(|b| b.len()).unwrap_or(0);
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "condensate",
        "version": crate::VERSION,
        "mock": mock,
        "buffered_readings": buffered,
        "timestamp": Utc::now(),
    })))
}

// GET /api/readings/latest
async fn latest_reading(state: web::Data<ApiServiceState>) -> ActixResult<HttpResponse> {
    let latest = state.buffer.lock().ok().and_then(|b| b.latest().cloned());
    match latest {
        Some(reading) => Ok(HttpResponse::Ok().json(reading)),
        None => Ok(HttpResponse::NotFound().json(ErrorResponse::new("NO_DATA", "No readings received yet"))),
    }
}

// GET /api/readings?date=YYYY-MM-DD
async fn list_readings(state: web::Data<ApiServiceState>, query: web::Query<DateQuery>) -> ActixResult<HttpResponse> {
    let Some(raw_date) = &query.date else {
        let readings = state.buffer.lock().map(|b| b.snapshot()).unwrap_or_default();
        return Ok(HttpResponse::Ok().json(ReadingsResponse {
            success: true,
            date: None,
            count: readings.len(),
            readings,
        }));
    };

    let date = match parse_date(raw_date) {
        Ok(date) => date,
        Err(e) => return Ok(bad_request(e)),
    };
    match load_day(&state, date).await {
        Ok(readings) => Ok(HttpResponse::Ok().json(ReadingsResponse {
            success: true,
            date: Some(date.format(DATE_FORMAT).to_string()),
            count: readings.len(),
            readings,
        })),
        Err(e) => Ok(internal_error("HISTORY_ERROR", e)),
    }
}

// GET /api/dates
async fn list_dates(state: web::Data<ApiServiceState>) -> ActixResult<HttpResponse> {
    let dates = match state.history().await.and_then(|h| h.available_dates()) {
        Ok(dates) => dates,
        Err(e) => return Ok(internal_error("HISTORY_ERROR", e)),
    };
    let dates: Vec<String> = dates.iter().map(|d| d.format(DATE_FORMAT).to_string()).collect();
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "dates": dates })))
}

// GET /api/stats?date=&metric=&anomaly_method=
async fn day_statistics(state: web::Data<ApiServiceState>, query: web::Query<StatsQuery>) -> ActixResult<HttpResponse> {
    let date = match query.date.as_deref().map(parse_date).transpose() {
        Ok(date) => date.unwrap_or_else(|| Local::now().date_naive()),
        Err(e) => return Ok(bad_request(e)),
    };
    let metric = match query.metric.as_deref().unwrap_or("conductivity").parse::<Metric>() {
        Ok(metric) => metric,
        Err(e) => return Ok(bad_request(e)),
    };
    let method = match query.anomaly_method.as_deref().unwrap_or("zscore").parse::<AnomalyMethod>() {
        Ok(method) => method,
        Err(e) => return Ok(bad_request(e)),
    };

    let readings = match load_day(&state, date).await {
        Ok(readings) => readings,
        Err(e) => return Ok(internal_error("HISTORY_ERROR", e)),
    };
    let Some(summary) = summarize(date, &readings, metric) else {
        return Ok(HttpResponse::NotFound().json(ErrorResponse::new(
            "NO_DATA",
            format!("No {:?} data for {}", metric, date),
        )));
    };

    let threshold = state.settings.read().await.display.threshold;
    let (timestamps, values) = metric.series(&readings);
    let anomalies: Vec<String> = detect_anomalies(&values, method)
        .into_iter()
        .filter_map(|i| timestamps.get(i).map(|t| t.format(TIMESTAMP_FORMAT).to_string()))
        .collect();
    let exceedances = readings.iter().filter(|r| r.micro_siemens() > threshold).count();

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "metric": metric,
        "unit": metric.unit_label(),
        "summary": summary,
        "anomalies": anomalies,
        "threshold": threshold,
        "threshold_exceedances": exceedances,
    })))
}

// GET /api/settings
async fn get_settings(state: web::Data<ApiServiceState>) -> ActixResult<HttpResponse> {
    let settings = state.settings.read().await.clone();
    Ok(HttpResponse::Ok().json(settings))
}

// PUT /api/settings
async fn update_settings(
    state: web::Data<ApiServiceState>,
    body: web::Json<serde_json::Value>,
) -> ActixResult<HttpResponse> {
    let mut settings = state.settings.write().await;
    let mut updated = settings.clone();

    if let Err(e) = updated.apply_json(&body) {
        warn!("❌ Settings update rejected: {}", e);
        return Ok(bad_request(e));
    }
    if let Err(e) = updated.save(&state.settings_path) {
        return Ok(internal_error("SETTINGS_WRITE_FAILED", e));
    }

    *settings = updated.clone();
    info!("⚙️  Settings updated through API");
    Ok(HttpResponse::Ok().json(updated))
}

// GET /api/diagnostics/permissions
async fn permissions(state: web::Data<ApiServiceState>) -> ActixResult<HttpResponse> {
    let settings = state.settings.read().await.clone();
    match check_permissions(&settings) {
        Ok(report) => Ok(HttpResponse::Ok().json(report)),
        Err(e) => Ok(internal_error("DIAGNOSTICS_FAILED", e)),
    }
}

// POST /api/diagnostics/test-write?dir=
async fn test_write(state: web::Data<ApiServiceState>, query: web::Query<TestWriteQuery>) -> ActixResult<HttpResponse> {
    let dir = match &query.dir {
        Some(dir) => dir.clone(),
        None => state.settings.read().await.logging.log_dir.clone(),
    };
    match test_file_write(&dir) {
        Ok(path) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "directory": dir,
            "probe_file": path,
        }))),
        Err(e) => Ok(internal_error("WRITE_TEST_FAILED", e)),
    }
}

async fn load_day(state: &ApiServiceState, date: NaiveDate) -> Result<Vec<Reading>, CondensateError> {
    state.history().await?.for_date(date)
}

fn bad_request(e: CondensateError) -> HttpResponse {
    HttpResponse::BadRequest().json(ErrorResponse::new("VALIDATION_ERROR", e.to_string()))
}

fn internal_error(code: &str, e: CondensateError) -> HttpResponse {
    error!("❌ {}: {}", code, e);
    HttpResponse::InternalServerError().json(ErrorResponse::new(code, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::mock::MockMeter;
    use crate::devices::reading::parse_timestamp;
    use crate::services::live_buffer::LiveBuffer;
    use crate::storage::CsvLogger;
    use actix_web::{http::StatusCode, test};
    use tempfile::tempdir;

    fn state_in(dir: &std::path::Path) -> ApiServiceState {
        let mut settings = Settings::defaults_in(dir);
        settings.logging.backup_enabled = false;
        settings.device.mock_data = true;
        ApiServiceState::new(
            Arc::new(RwLock::new(settings)),
            dir.join("settings.ini"),
            LiveBuffer::shared(10),
        )
    }

    #[actix_web::test]
    async fn latest_is_404_until_a_reading_arrives() {
        let dir = tempdir().unwrap();
        let state = state_in(dir.path());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/readings/latest").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        let reading = MockMeter::with_seed(1)
            .sample_at(parse_timestamp("2024-06-01 08:00:00").unwrap())
            .unwrap();
        state.buffer.lock().unwrap().push(reading.clone());

        let req = test::TestRequest::get().uri("/api/readings/latest").to_request();
        let body: Reading = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, reading);
    }

    #[actix_web::test]
    async fn readings_by_date_come_from_the_log() {
        let dir = tempdir().unwrap();
        let state = state_in(dir.path());
        let logging = state.settings.read().await.logging.clone();
        let mock = MockMeter::with_seed(5);
        let end = parse_timestamp("2024-06-03 00:00:00").unwrap();
        CsvLogger::from_settings(&logging)
            .write_all(&mock.generate_history_until(end, 2).unwrap())
            .unwrap();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/readings?date=2024-06-02").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["date"], "2024-06-02");
        let readings = body["readings"].as_array().unwrap();
        assert!(!readings.is_empty());
        assert!(readings
            .iter()
            .all(|r| r["timestamp"].as_str().unwrap().starts_with("2024-06-02")));

        let req = test::TestRequest::get().uri("/api/readings?date=June").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::get().uri("/api/stats?date=2024-06-02").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["unit"], "uS/cm");
        assert!(body["summary"]["statistics"]["count"].as_u64().unwrap() > 0);
    }

    #[actix_web::test]
    async fn settings_update_is_validated_and_persisted() {
        let dir = tempdir().unwrap();
        let state = state_in(dir.path());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::put()
            .uri("/api/settings")
            .set_json(serde_json::json!({ "display": { "threshold": "oops" } }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.settings.read().await.display.threshold, 500.0);

        let req = test::TestRequest::put()
            .uri("/api/settings")
            .set_json(serde_json::json!({ "display": { "threshold": 750.0 } }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
        assert_eq!(state.settings.read().await.display.threshold, 750.0);

        let saved = Settings::load(dir.path().join("settings.ini")).unwrap();
        assert_eq!(saved.display.threshold, 750.0);
    }
}
