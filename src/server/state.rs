use std::sync::Arc;

use crate::service::ForgehandService;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ForgehandService>,
}

impl AppState {
    pub fn new(service: Arc<ForgehandService>) -> Self {
        Self { service }
    }
}
