//! credit_he_client: a reference implementation of the client cryptographic
//! surface — key generation, feature encryption, request assembly, and
//! result decryption — driven against a running `credit_he_server`.
//!
//! This binary stands in for a browser-hosted client UI: it demonstrates
//! the wire contract and the key-hygiene rules without any HTML/WASM
//! wrapper around them.

use std::time::Duration;

use base64::Engine as _;
use credit_he::codec::{relin_key_to_bytes, EncodedCiphertext};
use credit_he::crypto::CryptoSession;
use credit_he::keys::KeyMaterial;
use credit_he::model::FEATURE_COUNT;
use credit_he::params::ParameterProfile;
use serde::{Deserialize, Serialize};

/// Client-enforced timeout on the inference round trip, independent of the
/// server's own soft compute timeout.
const WORKER_RPC_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct InferenceRequestBody {
    #[serde(rename = "encryptedFeatures")]
    encrypted_features: Vec<String>,
    #[serde(rename = "relinearizationKey")]
    relinearization_key: String,
}

#[derive(Deserialize)]
struct InferenceResponseBody {
    #[serde(rename = "encryptedScore")]
    encrypted_score: String,
    #[allow(dead_code)]
    timestamp: u64,
    #[serde(rename = "serverInferenceTime")]
    server_inference_time: f64,
}

/// The post-preprocessing feature vector this demo submits, matching the
/// "low-risk" applicant scenario: `[age/10, loan_to_income,
/// debt_to_income, credit_amount/1e5, income/1e5]`.
const DEMO_FEATURES: [f64; FEATURE_COUNT] = [4.0, 0.2, 20.0, 1.0, 5.0];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "credit_he_client=info".into()))
        .with_target(false)
        .compact()
        .init();

    let server_url =
        std::env::var("CREDIT_HE_SERVER_URL").unwrap_or_else(|_| "http://127.0.0.1:8080".to_string());

    // Construct the profile once for the process lifetime — constructing it
    // per call is a documented performance trap.
    let profile = ParameterProfile::canonical()?;
    let session = CryptoSession::new(&profile)?;

    tracing::info!("generating key material (this is CPU-bound; tens of milliseconds natively)");
    let mut keys = KeyMaterial::generate(&profile)?;

    let encrypted_features: Vec<String> = DEMO_FEATURES
        .iter()
        .map(|x| -> anyhow::Result<String> {
            let ct = session.encrypt(&profile, keys.public_key(), *x)?;
            Ok(base64::engine::general_purpose::STANDARD.encode(ct.to_bytes()?))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let relinearization_key =
        base64::engine::general_purpose::STANDARD.encode(relin_key_to_bytes(keys.relinearization_key())?);

    let body = InferenceRequestBody { encrypted_features, relinearization_key };

    let http = reqwest::Client::builder().timeout(WORKER_RPC_TIMEOUT).build()?;
    tracing::info!(url = %server_url, "submitting inference request");
    let response = http
        .post(format!("{server_url}/infer"))
        .json(&body)
        .send()
        .await?
        .error_for_status()?
        .json::<InferenceResponseBody>()
        .await?;

    tracing::info!(server_inference_time_ms = response.server_inference_time, "received response");

    let result_bytes = base64::engine::general_purpose::STANDARD.decode(response.encrypted_score)?;
    let result_ct = EncodedCiphertext::from_bytes(&profile, &result_bytes)?;

    // Reconstruct the secret key for this one decryption; the session wipes
    // its buffer immediately afterward.
    let secret_key = keys
        .secret_key_for_decrypt(&profile)?
        .ok_or_else(|| anyhow::anyhow!("secret key unavailable — regenerate keys and retry"))?;
    let probability = session.decrypt_and_clamp(&profile, &secret_key, &result_ct)?;
    keys.wipe_secret();

    println!("default probability estimate: {probability:.4}");
    Ok(())
}
