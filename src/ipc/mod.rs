//! Local status API for the running dev services.

use anyhow::Result;
use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::LaunchMode;
use crate::devservice::{DevServiceDescriptor, DevServiceManager, LifecyclePhase};
use crate::devui::{card_page, DevUiCard};

#[derive(Debug, Clone, Serialize)]
pub struct DevServicesResponse {
    pub phase: LifecyclePhase,
    pub services: Vec<DevServiceDescriptor>,
}

#[derive(Clone)]
pub struct StatusServer {
    pub manager: Arc<DevServiceManager>,
    pub mode: LaunchMode,
    pub listen_addr: String,
}

impl StatusServer {
    pub fn new(manager: Arc<DevServiceManager>, mode: LaunchMode, listen_addr: &str) -> Self {
        Self {
            manager,
            mode,
            listen_addr: listen_addr.to_string(),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/devservices", get(list_devservices))
            .route("/api/devui", get(get_devui_card))
            .layer(TraceLayer::new_for_http())
            .with_state(self.clone())
    }

    pub async fn start(self) -> Result<()> {
        let router = self.router();
        let listener = tokio::net::TcpListener::bind(&self.listen_addr).await?;
        tracing::info!("Status API listening on http://{}", self.listen_addr);

        axum::serve(listener, router).await?;
        Ok(())
    }
}

/// GET /api/devservices - running services and lifecycle phase
async fn list_devservices(State(state): State<StatusServer>) -> impl IntoResponse {
    let services = state.manager.running_services().await;
    Json(DevServicesResponse {
        phase: state.manager.phase().await,
        services: services.iter().map(|s| s.descriptor()).collect(),
    })
}

/// GET /api/devui - Dev UI card
async fn get_devui_card(State(state): State<StatusServer>) -> Json<DevUiCard> {
    let services = state.manager.running_services().await;
    Json(card_page(&services, state.mode))
}
