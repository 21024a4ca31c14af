//! credit_he_server: the Request Handler (C7) — a stateless HTTP façade over
//! the Inference Engine.
//!
//! Endpoints:
//! - GET  /health  -> `{"status":"healthy","timestamp":<unix>}`
//! - POST /infer    InferenceRequest -> InferenceResponse (see crate root docs)
//!
//! Nothing here is cached across requests except the immutable
//! `ParameterProfile` and the fixed model: the per-request evaluator is built
//! fresh from the request's own relinearization key every time, because a
//! cached evaluator binds to one key and would leak or misapply state across
//! unrelated applicants.

use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use axum::{
    extract::State,
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use base64::Engine as _;
use credit_he::codec::{relin_key_from_bytes, EncodedCiphertext};
use credit_he::errors::InferenceError;
use credit_he::inference::{self, RequestStage};
use credit_he::model::FEATURE_COUNT;
use credit_he::params::ParameterProfile;
use serde::{Deserialize, Serialize};
use tower_governor::{governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, info_span, warn, Instrument};

const B64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

/// Server configuration, read once at startup from environment variables,
/// each with a documented default.
struct Config {
    bind_addr: SocketAddr,
    tls_cert: Option<String>,
    tls_key: Option<String>,
    max_ciphertext_bytes: usize,
    request_timeout: Duration,
}

impl Config {
    fn from_env() -> Self {
        let bind_addr = std::env::var("CREDIT_HE_BIND_ADDR")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 8080)));
        let tls_cert = std::env::var("CREDIT_HE_TLS_CERT").ok();
        let tls_key = std::env::var("CREDIT_HE_TLS_KEY").ok();
        let max_ciphertext_bytes = std::env::var("CREDIT_HE_MAX_CIPHERTEXT_BYTES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10 * 1024 * 1024);
        let request_timeout_ms: u64 = std::env::var("CREDIT_HE_REQUEST_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10_000);
        Self {
            bind_addr,
            tls_cert,
            tls_key,
            max_ciphertext_bytes,
            request_timeout: Duration::from_millis(request_timeout_ms),
        }
    }
}

#[derive(Clone)]
struct AppState {
    profile: &'static ParameterProfile,
    max_ciphertext_bytes: usize,
    request_timeout: Duration,
}

static PROFILE: OnceLock<ParameterProfile> = OnceLock::new();

fn profile() -> &'static ParameterProfile {
    PROFILE.get_or_init(|| {
        ParameterProfile::canonical().expect("canonical ParameterProfile must construct")
    })
}

// ---------------------------- Wire types -----------------------------------

#[derive(Deserialize)]
struct InferenceRequestBody {
    #[serde(rename = "encryptedFeatures")]
    encrypted_features: Vec<String>,
    #[serde(rename = "relinearizationKey")]
    relinearization_key: Option<String>,
}

#[derive(Serialize)]
struct InferenceResponseBody {
    #[serde(rename = "encryptedScore")]
    encrypted_score: String,
    timestamp: u64,
    #[serde(rename = "serverInferenceTime")]
    server_inference_time: f64,
}

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    timestamp: u64,
}

/// Thin axum-facing wrapper: maps each `InferenceError` kind to an HTTP
/// status code and never includes ciphertext bytes, plaintext values, or key
/// material in the response body — only the error's own `Display`, which by
/// construction carries none of that.
struct ApiError(InferenceError);

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self.0 {
            InferenceError::BadRequest(_)
            | InferenceError::BadSize { .. }
            | InferenceError::BadEncoding(_)
            | InferenceError::BadCiphertext(_)
            | InferenceError::BadKey(_) => StatusCode::BAD_REQUEST,
            InferenceError::NoiseBudgetExhausted(_)
            | InferenceError::ComputeFailure(_)
            | InferenceError::InternalSerialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.0.kind(), "message": self.0.to_string() })))
            .into_response()
    }
}

impl From<InferenceError> for ApiError {
    fn from(e: InferenceError) -> Self {
        ApiError(e)
    }
}

fn now_unix() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

// ---------------------------- Handlers --------------------------------------

async fn health() -> impl IntoResponse {
    Json(HealthBody { status: "healthy", timestamp: now_unix() })
}

async fn infer(
    State(st): State<AppState>,
    Json(req): Json<InferenceRequestBody>,
) -> Result<impl IntoResponse, ApiError> {
    let request_id = uuid::Uuid::new_v4();
    let span = info_span!("inference", request_id = %request_id);

    async move {
        let start = Instant::now();
        tracing::trace!(stage = ?RequestStage::Received);

        // --- Received / validated -----------------------------------------
        if req.encrypted_features.len() != FEATURE_COUNT {
            return Err(ApiError(InferenceError::BadRequest(format!(
                "expected {FEATURE_COUNT} encryptedFeatures, got {}",
                req.encrypted_features.len()
            ))));
        }
        let Some(relin_b64) = req.relinearization_key.as_deref() else {
            return Err(ApiError(InferenceError::BadRequest(
                "missing relinearizationKey".to_string(),
            )));
        };

        // Size cap applies pre- and post-decode; check the base64 length
        // first so a deliberately oversized buffer never reaches the decoder.
        // Base64 inflates by 4/3, so the pre-decode check must gate against
        // the inflated bound — gating the encoded string against the raw
        // byte cap would reject valid ciphertexts decoding to between
        // ~3/4 of the cap and the cap itself.
        let encoded_cap = max_encoded_len(st.max_ciphertext_bytes);
        for (i, feature_b64) in req.encrypted_features.iter().enumerate() {
            check_size_cap(feature_b64.len(), encoded_cap, &format!("feature[{i}] (encoded)"))?;
        }
        check_size_cap(relin_b64.len(), encoded_cap, "relinearizationKey (encoded)")?;

        // --- SizeValidated -> base64 decode --------------------------------
        let mut feature_bytes = Vec::with_capacity(FEATURE_COUNT);
        for (i, feature_b64) in req.encrypted_features.iter().enumerate() {
            let bytes = B64
                .decode(feature_b64)
                .map_err(|e| InferenceError::BadEncoding(format!("feature[{i}]: {e}")))?;
            check_size_cap(bytes.len(), st.max_ciphertext_bytes, &format!("feature[{i}]"))?;
            feature_bytes.push(bytes);
        }
        let relin_bytes = B64
            .decode(relin_b64)
            .map_err(|e| InferenceError::BadEncoding(format!("relinearizationKey: {e}")))?;
        check_size_cap(relin_bytes.len(), st.max_ciphertext_bytes, "relinearizationKey")?;
        tracing::trace!(stage = ?RequestStage::SizeValidated);

        // --- KeyMaterialized ------------------------------------------------
        let rlk = relin_key_from_bytes(st.profile, &relin_bytes)?;
        tracing::trace!(stage = ?RequestStage::KeyMaterialized);

        // --- InputsMaterialized ----------------------------------------------
        let mut features: Vec<EncodedCiphertext> = Vec::with_capacity(FEATURE_COUNT);
        for bytes in &feature_bytes {
            features.push(EncodedCiphertext::from_bytes(st.profile, bytes)?);
        }
        let features: [EncodedCiphertext; FEATURE_COUNT] = features
            .try_into()
            .map_err(|_| InferenceError::BadRequest("feature count changed during decode".to_string()))?;
        tracing::trace!(stage = ?RequestStage::InputsMaterialized);

        // A per-request evaluator/encoder, bound to this request's key and
        // never retained past this handler — see the module doc.
        let evaluator = sealy::CKKSEvaluator::new(st.profile.context())
            .map_err(|e| InferenceError::ComputeFailure(format!("evaluator: {e}")))?;
        let encoder = sealy::CKKSEncoder::new(st.profile.context(), st.profile.default_scale())
            .map_err(|e| InferenceError::ComputeFailure(format!("encoder: {e}")))?;

        // The cryptographic work itself is synchronous CPU-bound computation
        // that never yields, so it runs on a blocking-pool thread: that is
        // what lets the timeout below actually preempt the request instead
        // of merely measuring it, and keeps the compute off the async
        // worker threads serving every other connection.
        let profile = st.profile;
        let join = tokio::task::spawn_blocking(move || {
            inference::run(profile, &evaluator, &encoder, &rlk, &features)
        });
        let (result_ct, level_after, scale_after) = tokio::time::timeout(st.request_timeout, join)
            .await
            .map_err(|_| InferenceError::ComputeFailure("request exceeded soft timeout".to_string()))?
            .map_err(|e| InferenceError::ComputeFailure(format!("inference task panicked: {e}")))??;

        // --- Serialized / Sent ------------------------------------------------
        let wrapped = EncodedCiphertext::new(result_ct, level_after, scale_after);
        let out_bytes = wrapped.to_bytes()?;
        let encrypted_score = B64.encode(out_bytes);
        tracing::trace!(stage = ?RequestStage::Serialized);

        let server_inference_time = start.elapsed().as_secs_f64() * 1000.0;
        info!(elapsed_ms = server_inference_time, level_after, "inference request completed");
        tracing::trace!(stage = ?RequestStage::Sent);

        Ok(Json(InferenceResponseBody {
            encrypted_score,
            timestamp: now_unix(),
            server_inference_time,
        }))
    }
    .instrument(span)
    .await
}

fn check_size_cap(len: usize, limit: usize, what: &str) -> Result<(), InferenceError> {
    if len > limit {
        warn!(what, len, limit, "buffer exceeded size cap");
        return Err(InferenceError::BadSize { got: len, limit });
    }
    Ok(())
}

/// The longest base64 (standard, padded) string that decodes to at most
/// `byte_cap` raw bytes, i.e. the inflated bound a pre-decode length check
/// must gate against instead of `byte_cap` itself.
fn max_encoded_len(byte_cap: usize) -> usize {
    byte_cap.div_ceil(3) * 4
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "credit_he_server=info,tower_http=info".into()),
        )
        .with_target(false)
        .compact()
        .init();

    let config = Config::from_env();
    let profile = profile();
    info!(
        ring_degree = profile.ring_degree(),
        max_level = profile.max_level(),
        max_slots = profile.max_slots(),
        "parameter profile constructed"
    );

    let state = AppState {
        profile,
        max_ciphertext_bytes: config.max_ciphertext_bytes,
        request_timeout: config.request_timeout,
    };

    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any);

    let governor_conf = Box::leak(Box::new(
        GovernorConfigBuilder::default()
            .per_second(5)
            .burst_size(15)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .expect("static governor config is well-formed"),
    ));

    let app = Router::new()
        .route("/health", get(health))
        .route("/infer", post(infer))
        .layer(GovernorLayer { config: governor_conf })
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    match (config.tls_cert, config.tls_key) {
        (Some(cert), Some(key)) => {
            info!(addr = %config.bind_addr, "listening (https)");
            let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(&cert, &key)
                .await
                .map_err(|e| anyhow::anyhow!("loading TLS cert/key: {e}"))?;
            axum_server::bind_rustls(config.bind_addr, tls_config)
                .serve(app.into_make_service())
                .await?;
        }
        _ => {
            info!(addr = %config.bind_addr, "listening (http)");
            let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_match_spec_literals() {
        std::env::remove_var("CREDIT_HE_MAX_CIPHERTEXT_BYTES");
        std::env::remove_var("CREDIT_HE_REQUEST_TIMEOUT_MS");
        let cfg = Config::from_env();
        assert_eq!(cfg.max_ciphertext_bytes, 10 * 1024 * 1024);
        assert_eq!(cfg.request_timeout, Duration::from_millis(10_000));
    }

    #[test]
    fn size_cap_rejects_buffers_over_the_limit() {
        let err = check_size_cap(11 * 1024 * 1024, 10 * 1024 * 1024, "feature[0]").unwrap_err();
        assert!(matches!(err, InferenceError::BadSize { got, limit } if got == 11 * 1024 * 1024 && limit == 10 * 1024 * 1024));
    }

    #[test]
    fn size_cap_allows_buffers_at_or_under_the_limit() {
        assert!(check_size_cap(10 * 1024 * 1024, 10 * 1024 * 1024, "feature[0]").is_ok());
    }

    #[test]
    fn encoded_cap_admits_a_base64_string_for_a_byte_cap_sized_buffer() {
        let byte_cap = 10 * 1024 * 1024;
        let encoded_len = (byte_cap + 2) / 3 * 4;
        assert_eq!(max_encoded_len(byte_cap), encoded_len);
        assert!(check_size_cap(encoded_len, max_encoded_len(byte_cap), "feature[0] (encoded)").is_ok());
    }

    #[test]
    fn missing_relinearization_key_is_bad_request() {
        let body: InferenceRequestBody = serde_json::from_value(serde_json::json!({
            "encryptedFeatures": ["", "", "", "", ""],
        }))
        .unwrap();
        assert!(body.relinearization_key.is_none());
    }

    #[test]
    fn wrong_feature_count_fails_count_check() {
        let body: InferenceRequestBody = serde_json::from_value(serde_json::json!({
            "encryptedFeatures": ["", "", "", ""],
            "relinearizationKey": "",
        }))
        .unwrap();
        assert_ne!(body.encrypted_features.len(), credit_he::model::FEATURE_COUNT);
    }
}
