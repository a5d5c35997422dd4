// Local stand-in for the KMS, STS and ECS metadata endpoints

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::sync::{Arc, Mutex};

use aliyunkms::env::{self, MapEnv};
use aliyunkms::rpc::signature::sign;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::json;
use tempfile::NamedTempFile;

pub const ARN: &str = "acs:kms:cn-hangzhou:1192853035118460:key/key-hzz64a3dbd1prbfsnnvpe";
pub const ACCESS_KEY_ID: &str = "test-id";
pub const ACCESS_KEY_SECRET: &str = "test-secret";
pub const ASSUMED_KEY_ID: &str = "STS.assumed";
pub const ASSUMED_KEY_SECRET: &str = "assumed-secret";
pub const ASSUMED_TOKEN: &str = "assumed-token";
pub const OIDC_TOKEN: &str = "oidc-token";
pub const ECS_ROLE: &str = "sops-role";

/// KeyId that makes the mock answer 403 without an error document
pub const DENIED_KEY: &str = "acs:kms:cn-hangzhou:1192853035118460:key/denied";

/// KeyId that makes the mock answer with an error document
pub const MISSING_KEY: &str = "acs:kms:cn-hangzhou:1192853035118460:key/missing";

type Requests = Arc<Mutex<Vec<HashMap<String, String>>>>;
type Reply = (StatusCode, String);

pub struct MockAliyun {
    pub endpoint: String,
    requests: Requests,
}

impl MockAliyun {
    pub async fn start() -> Self {
        let requests = Requests::default();
        let app = Router::new()
            .route("/", post(rpc))
            .route("/latest/meta-data/ram/security-credentials/", get(ecs_role))
            .route(
                "/latest/meta-data/ram/security-credentials/:role",
                get(ecs_credentials),
            )
            .with_state(requests.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind mock server");
        let addr = listener.local_addr().expect("mock server has no address");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock server failed");
        });

        Self {
            endpoint: format!("http://{}", addr),
            requests,
        }
    }

    /// Every RPC request received so far, with decoded query parameters
    pub fn requests(&self) -> Vec<HashMap<String, String>> {
        self.requests.lock().expect("requests lock poisoned").clone()
    }

    pub fn actions(&self) -> Vec<String> {
        self.requests()
            .iter()
            .filter_map(|r| r.get("Action").cloned())
            .collect()
    }

    pub fn last(&self, action: &str) -> HashMap<String, String> {
        self.requests()
            .into_iter()
            .rev()
            .find(|r| r.get("Action").map(String::as_str) == Some(action))
            .unwrap_or_else(|| panic!("no {} request received", action))
    }

    /// Environment pointing the KMS endpoint at this server
    pub fn env(&self) -> MapEnv {
        MapEnv::new().with(env::KMS_SOPS_ENDPOINT, self.endpoint.clone())
    }
}

/// Writes `content` to a temp file removed when the handle drops
pub fn temp_file(prefix: &str, content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .prefix(prefix)
        .tempfile()
        .expect("failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("failed to write temp file");
    file
}

fn reply(status: StatusCode, body: serde_json::Value) -> Reply {
    (status, body.to_string())
}

fn error_doc(status: StatusCode, code: &str, message: &str) -> Reply {
    reply(
        status,
        json!({"Code": code, "Message": message, "RequestId": "mock-request"}),
    )
}

fn verify_signature(params: &HashMap<String, String>) -> Result<(), Reply> {
    let Some(signature) = params.get("Signature") else {
        return Err(error_doc(StatusCode::BAD_REQUEST, "MissingSignature", "no signature"));
    };

    let secret = match params.get("AccessKeyId").map(String::as_str) {
        Some(ACCESS_KEY_ID) => ACCESS_KEY_SECRET,
        Some(ASSUMED_KEY_ID) => ASSUMED_KEY_SECRET,
        _ => {
            return Err(error_doc(
                StatusCode::NOT_FOUND,
                "InvalidAccessKeyId.NotFound",
                "unknown access key",
            ))
        }
    };

    let unsigned: BTreeMap<String, String> = params
        .iter()
        .filter(|(k, _)| k.as_str() != "Signature")
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    if &sign("POST", &unsigned, secret) != signature {
        return Err(error_doc(
            StatusCode::BAD_REQUEST,
            "SignatureDoesNotMatch",
            "signature mismatch",
        ));
    }
    Ok(())
}

fn credentials_body() -> serde_json::Value {
    json!({
        "RequestId": "mock-request",
        "Credentials": {
            "AccessKeyId": ASSUMED_KEY_ID,
            "AccessKeySecret": ASSUMED_KEY_SECRET,
            "SecurityToken": ASSUMED_TOKEN,
            "Expiration": "2099-01-01T00:00:00Z"
        }
    })
}

fn param<'a>(params: &'a HashMap<String, String>, name: &str) -> &'a str {
    params.get(name).map(String::as_str).unwrap_or_default()
}

async fn rpc(
    State(requests): State<Requests>,
    Query(params): Query<HashMap<String, String>>,
) -> Reply {
    requests
        .lock()
        .expect("requests lock poisoned")
        .push(params.clone());

    match param(&params, "Action") {
        "AssumeRoleWithOIDC" => {
            if params.contains_key("Signature") || param(&params, "OIDCToken") != OIDC_TOKEN {
                return error_doc(StatusCode::BAD_REQUEST, "InvalidParameter.OIDCToken", "bad token");
            }
            reply(StatusCode::OK, credentials_body())
        }
        "AssumeRole" => {
            if let Err(rejected) = verify_signature(&params) {
                return rejected;
            }
            reply(StatusCode::OK, credentials_body())
        }
        "Encrypt" => {
            if let Err(rejected) = verify_signature(&params) {
                return rejected;
            }
            match param(&params, "KeyId") {
                DENIED_KEY => (StatusCode::FORBIDDEN, "denied".to_string()),
                MISSING_KEY => error_doc(
                    StatusCode::NOT_FOUND,
                    "Forbidden.KeyNotFound",
                    "The specified Key is not found.",
                ),
                key_id => {
                    let blob = format!(
                        "{}|{}|{}",
                        key_id,
                        param(&params, "Plaintext"),
                        param(&params, "EncryptionContext")
                    );
                    reply(
                        StatusCode::OK,
                        json!({
                            "CiphertextBlob": STANDARD.encode(blob),
                            "KeyId": key_id,
                            "KeyVersionId": "v1",
                            "RequestId": "mock-request"
                        }),
                    )
                }
            }
        }
        "Decrypt" => {
            if let Err(rejected) = verify_signature(&params) {
                return rejected;
            }
            let decoded = STANDARD
                .decode(param(&params, "CiphertextBlob"))
                .ok()
                .and_then(|b| String::from_utf8(b).ok())
                .unwrap_or_default();
            let mut parts = decoded.splitn(3, '|');
            let (Some(key_id), Some(plaintext), Some(context)) =
                (parts.next(), parts.next(), parts.next())
            else {
                return error_doc(StatusCode::BAD_REQUEST, "Rejected.ValidationFailed", "bad blob");
            };
            if context != param(&params, "EncryptionContext") {
                return error_doc(
                    StatusCode::BAD_REQUEST,
                    "InvalidCiphertext",
                    "context mismatch",
                );
            }
            reply(
                StatusCode::OK,
                json!({"Plaintext": plaintext, "KeyId": key_id, "RequestId": "mock-request"}),
            )
        }
        other => error_doc(
            StatusCode::BAD_REQUEST,
            "InvalidAction.NotFound",
            &format!("unknown action {}", other),
        ),
    }
}

async fn ecs_role() -> String {
    ECS_ROLE.to_string()
}

async fn ecs_credentials(Path(role): Path<String>) -> Reply {
    if role != ECS_ROLE {
        return (StatusCode::NOT_FOUND, "not found".to_string());
    }
    reply(
        StatusCode::OK,
        json!({
            "Code": "Success",
            "AccessKeyId": ASSUMED_KEY_ID,
            "AccessKeySecret": ASSUMED_KEY_SECRET,
            "SecurityToken": ASSUMED_TOKEN,
            "Expiration": "2099-01-01T00:00:00Z",
            "LastUpdated": "2024-01-01T00:00:00Z"
        }),
    )
}
