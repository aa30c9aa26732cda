//! The concrete cluster API client.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context;
use common::api::{ActionRequest, ActionResult, ActionType, ResultStatus};
use reqwest::{Method, header};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::error::PveError;
use crate::request::{self, RequestSpec};

/// Per-request timeout for cluster API calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
/// Attempt budget for GET calls (first attempt included).
pub const DEFAULT_READ_RETRIES: u32 = 3;

/// Connection parameters for one configured cluster environment.
///
/// The token secret itself never appears in configuration; it is read once at
/// construction from the process environment variable named by
/// `token_secret_env`.
#[derive(Debug, Clone, Deserialize)]
pub struct EnvironmentConfig {
    /// Environment name used in requests.
    pub name: String,
    /// Cluster API base URL.
    pub base_url: String,
    /// API token identifier, e.g. `root@pam!agent`.
    pub token_id: String,
    /// Name of the environment variable holding the token secret.
    pub token_secret_env: String,
}

#[derive(Debug, Clone)]
struct ClusterEnv {
    base_url: String,
    token_id: String,
    token_secret: String,
}

/// Client for one or more Proxmox VE clusters.
///
/// Connection parameters and the underlying HTTP client are read-only after
/// construction; the TLS configuration is fixed and cannot be downgraded at
/// runtime.
#[derive(Debug)]
pub struct PveClient {
    envs: HashMap<String, ClusterEnv>,
    http: reqwest::Client,
    read_retries: u32,
}

impl PveClient {
    /// Builds a client for the given environments, resolving every token
    /// secret up front. Fails fast when a named env var is absent or empty.
    pub fn new(environments: &[EnvironmentConfig]) -> anyhow::Result<Self> {
        let mut envs = HashMap::with_capacity(environments.len());
        for env in environments {
            let secret = std::env::var(&env.token_secret_env).unwrap_or_default();
            let secret = secret.trim();
            if secret.is_empty() {
                anyhow::bail!(
                    "missing token secret env var {:?} for environment {:?}",
                    env.token_secret_env,
                    env.name
                );
            }
            envs.insert(
                env.name.clone(),
                ClusterEnv {
                    base_url: env.base_url.trim_end_matches('/').to_string(),
                    token_id: env.token_id.clone(),
                    token_secret: secret.to_string(),
                },
            );
        }

        Ok(Self {
            envs,
            http: build_http_client(DEFAULT_TIMEOUT)?,
            read_retries: DEFAULT_READ_RETRIES,
        })
    }

    /// Executes a canonical request against its environment's cluster API.
    ///
    /// Dry-run requests return `planned` without any network traffic.
    pub async fn execute(&self, req: &ActionRequest) -> Result<ActionResult, PveError> {
        if req.dry_run {
            return Ok(ActionResult {
                status: ResultStatus::Planned,
                message: "dry-run only; no cluster API call made".to_string(),
                data: None,
            });
        }

        let env = self
            .envs
            .get(&req.environment)
            .ok_or_else(|| PveError::UnknownEnvironment(req.environment.clone()))?;

        let spec = request::request_spec(req)?;
        let body = self.perform(env, &spec).await?;

        let envelope: Envelope = if body.is_empty() {
            Envelope::default()
        } else {
            serde_json::from_slice(&body).map_err(|err| PveError::Decode(err.to_string()))?
        };

        Ok(map_result(req, envelope.data))
    }

    async fn perform(&self, env: &ClusterEnv, spec: &RequestSpec) -> Result<Vec<u8>, PveError> {
        let attempts = if spec.method == Method::GET {
            self.read_retries.max(1)
        } else {
            1
        };
        let url = format!("{}{}", env.base_url, spec.endpoint);
        let pairs = request::encode_pairs(&spec.params);

        for attempt in 1..=attempts {
            let mut call = self
                .http
                .request(spec.method.clone(), &url)
                .header(
                    header::AUTHORIZATION,
                    token_auth_header(&env.token_id, &env.token_secret),
                )
                .header(header::ACCEPT, "application/json");
            if !pairs.is_empty() {
                call = if spec.method == Method::GET {
                    call.query(&pairs)
                } else {
                    call.form(&pairs)
                };
            }

            let response = match call.send().await {
                Ok(response) => response,
                Err(err) => {
                    if attempt < attempts {
                        warn!(endpoint = %spec.endpoint, attempt, ?err, "cluster call failed, retrying");
                        continue;
                    }
                    return Err(transport_error(spec, err.to_string()));
                }
            };

            let status = response.status();
            let body = match response.bytes().await {
                Ok(body) => body,
                Err(err) => {
                    if attempt < attempts {
                        continue;
                    }
                    return Err(transport_error(spec, err.to_string()));
                }
            };

            if status.is_success() {
                return Ok(body.to_vec());
            }
            if spec.method == Method::GET
                && attempt < attempts
                && matches!(status.as_u16(), 502 | 503 | 504)
            {
                warn!(
                    endpoint = %spec.endpoint,
                    status = status.as_u16(),
                    attempt,
                    "transient upstream status, retrying"
                );
                continue;
            }

            return Err(PveError::Http {
                status: status.as_u16(),
                method: spec.method.to_string(),
                endpoint: spec.endpoint.clone(),
                message: extract_error_message(&body),
            });
        }

        Err(transport_error(spec, "request failed after retries".to_string()))
    }
}

/// `Authorization` header value for PVE API token authentication.
pub fn token_auth_header(token_id: &str, token_secret: &str) -> String {
    format!("PVEAPIToken={token_id}={token_secret}")
}

/// Builds the shared HTTP client. Certificate verification is always on and
/// the TLS floor is 1.2; there is no insecure-skip knob.
fn build_http_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .min_tls_version(reqwest::tls::Version::TLS_1_2)
        .build()
        .context("build cluster HTTP client")
}

fn transport_error(spec: &RequestSpec, message: String) -> PveError {
    PveError::Transport {
        method: spec.method.to_string(),
        endpoint: spec.endpoint.clone(),
        message,
    }
}

#[derive(Debug, Default, Deserialize)]
struct Envelope {
    #[serde(default)]
    data: Value,
}

fn map_result(req: &ActionRequest, data: Value) -> ActionResult {
    match req.action {
        ActionType::ReadVm => ActionResult {
            status: ResultStatus::Ok,
            message: "vm state retrieved".to_string(),
            data: non_null(data),
        },
        ActionType::ReadInventory => {
            let running_only = req.target.trim() == "inventory/running";
            ActionResult {
                status: ResultStatus::Ok,
                message: "inventory retrieved".to_string(),
                data: Some(Value::Array(filter_inventory(&data, running_only))),
            }
        }
        ActionType::ReadTasks => ActionResult {
            status: ResultStatus::Ok,
            message: "task list retrieved".to_string(),
            data: non_null(data),
        },
        ActionType::ReadTaskStatus => ActionResult {
            status: ResultStatus::Ok,
            message: "task status retrieved".to_string(),
            data: non_null(data),
        },
        ActionType::StartVm
        | ActionType::StopVm
        | ActionType::SnapshotVm
        | ActionType::CloneVm
        | ActionType::MigrateVm
        | ActionType::DeleteVm
        | ActionType::StorageEdit
        | ActionType::FirewallEdit => {
            let message = match &data {
                Value::String(upid) if !upid.is_empty() => upid.clone(),
                _ => "request accepted by Proxmox API".to_string(),
            };
            ActionResult {
                status: ResultStatus::Accepted,
                message,
                data: None,
            }
        }
    }
}

fn non_null(data: Value) -> Option<Value> {
    match data {
        Value::Null => None,
        other => Some(other),
    }
}

/// Keeps only `qemu`/`lxc` resources, and only running ones when requested.
fn filter_inventory(data: &Value, running_only: bool) -> Vec<Value> {
    let Some(items) = data.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .filter(|item| {
            let kind = item.get("type").and_then(Value::as_str).unwrap_or_default();
            if kind != "qemu" && kind != "lxc" {
                return false;
            }
            if running_only {
                item.get("status").and_then(Value::as_str) == Some("running")
            } else {
                true
            }
        })
        .cloned()
        .collect()
}

/// Extracts a terse failure message from the cluster's error envelope,
/// preferring `error`, then `errors`, then `data`, then the raw body.
fn extract_error_message(body: &[u8]) -> String {
    if body.is_empty() {
        return "empty error response".to_string();
    }

    #[derive(Default, Deserialize)]
    struct ErrorEnvelope {
        #[serde(default)]
        error: String,
        #[serde(default)]
        errors: Value,
        #[serde(default)]
        data: Value,
    }

    let raw = || String::from_utf8_lossy(body).trim().to_string();
    let Ok(envelope) = serde_json::from_slice::<ErrorEnvelope>(body) else {
        return raw();
    };

    if !envelope.error.is_empty() {
        return envelope.error;
    }
    if !envelope.errors.is_null() {
        return compact(&envelope.errors);
    }
    if !envelope.data.is_null() {
        return compact(&envelope.data);
    }
    raw()
}

fn compact(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
