use axum::{extract::State, response::Json};
use dbridge_core::{ConnectRequest, ConversionPolicy, EntityDescriptor};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use crate::bootstrap::{ConfigResolver, CredentialResolver};
use crate::config::Config;
use crate::error::{BridgeError, BridgeResult};
use crate::native::DriverSet;
use crate::permissions::{RuleValidator, SqlValidator};
use crate::registry::{Registry, SessionInfo};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub drivers: DriverSet,
    pub bootstrap: Arc<dyn CredentialResolver>,
    pub validator: Arc<dyn SqlValidator>,
    pub config: Arc<Config>,
    pub startup_time: Instant,
}

impl AppState {
    pub fn from_config(config: Config) -> BridgeResult<Self> {
        let validator = RuleValidator::new(&config.permissions)
            .map_err(|e| BridgeError::Internal(format!("invalid permission rule: {}", e)))?;
        Ok(Self {
            registry: Arc::new(Registry::new()),
            drivers: DriverSet::with_defaults(),
            bootstrap: Arc::new(ConfigResolver::new(config.bootstrap.clone())),
            validator: Arc::new(validator),
            config: Arc::new(config),
            startup_time: Instant::now(),
        })
    }

    pub fn with_drivers(mut self, drivers: DriverSet) -> Self {
        self.drivers = drivers;
        self
    }

    pub fn with_validator(mut self, validator: Arc<dyn SqlValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Configured policy for a backend with connection property overrides.
    pub fn policy_for(
        &self,
        backend: &str,
        properties: &BTreeMap<String, String>,
    ) -> BridgeResult<ConversionPolicy> {
        Ok(self.config.policy_for(backend).with_overrides(properties)?)
    }
}

// ==================== Health Check Handler ====================

pub async fn health_check_handler() -> Json<Value> {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Live sessions and entities, so leaked handles can be spotted.
pub async fn status_handler(State(state): State<AppState>) -> Json<Value> {
    Json(serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.startup_time.elapsed().as_secs(),
        "registry": state.registry.stats(),
    }))
}

pub async fn accepts_url_handler(
    State(state): State<AppState>,
    Json(url): Json<String>,
) -> Json<bool> {
    Json(state.drivers.accepts(&url))
}

// ==================== Session Bootstrap ====================

pub async fn connect_handler(
    State(state): State<AppState>,
    Json(request): Json<ConnectRequest>,
) -> Result<Json<EntityDescriptor>, BridgeError> {
    let target = state.bootstrap.resolve(&request)?;
    let driver = state.drivers.find(&target.url).ok_or_else(|| {
        BridgeError::Connectivity(format!("no driver accepts '{}'", target.url))
    })?;

    let policy = state.policy_for(driver.name(), &target.properties)?;
    let connection = driver.connect(&target.url, &target.properties)?;

    let info = SessionInfo {
        subject: target.subject,
        backend: driver.name().to_string(),
        url: target.url,
        policy: Arc::new(policy),
    };
    Ok(Json(state.registry.open_session(info, connection)?))
}
