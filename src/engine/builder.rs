use super::{CameraEngine, PermissionCheck};
use crate::config::{CameraBackend, EngineConfig};
use crate::controller::{Camera2Controller, CameraController, LegacyController};
use crate::device::CameraDriver;
use crate::error::{EngineError, Result};
use crate::events::EventBus;
use crate::frame::FrameProcessors;
use std::sync::Arc;
use tracing::info;

/// Builder for [`CameraEngine`]
pub struct CameraEngineBuilder {
    config: Option<EngineConfig>,
    driver: Option<Arc<dyn CameraDriver>>,
    permissions: Option<Arc<dyn PermissionCheck>>,
    events: Option<EventBus>,
}

impl CameraEngineBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            driver: None,
            permissions: None,
            events: None,
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn driver<D: CameraDriver + 'static>(mut self, driver: D) -> Self {
        self.driver = Some(Arc::new(driver));
        self
    }

    pub fn shared_driver(mut self, driver: Arc<dyn CameraDriver>) -> Self {
        self.driver = Some(driver);
        self
    }

    pub fn permissions<P: PermissionCheck + 'static>(mut self, permissions: P) -> Self {
        self.permissions = Some(Arc::new(permissions));
        self
    }

    /// Publish on an existing bus instead of a new one
    pub fn event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Build the engine; the legacy backend needs a driver and a tokio runtime
    pub fn build(self) -> Result<CameraEngine> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let events = self
            .events
            .unwrap_or_else(|| EventBus::new(config.events.bus_capacity));
        let processors = FrameProcessors::new();

        let controller: Box<dyn CameraController> = match config.camera.backend {
            CameraBackend::Legacy => {
                let driver = self
                    .driver
                    .ok_or_else(|| EngineError::system("A camera driver must be specified"))?;
                Box::new(LegacyController::new(
                    driver,
                    &config,
                    events.clone(),
                    processors.clone(),
                )?)
            }
            CameraBackend::Camera2 => Box::new(Camera2Controller::new(
                config.initial_settings(),
                events.clone(),
            )),
        };
        info!("Camera engine built with {:?} backend", config.camera.backend);

        Ok(CameraEngine::new(
            controller,
            events,
            processors,
            self.permissions,
            config,
        ))
    }
}

impl Default for CameraEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
