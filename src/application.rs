//! Top-level daemon object wiring configuration into the coordinator.

use crate::{config::ConfigManager, coordinator::SystemCoordinator};
use anyhow::Result;

/// The skydimod daemon.
///
/// Owns the [`SystemCoordinator`] and drives the full lifecycle: state
/// initialization, detection/device-list/config-watcher/D-Bus service
/// startup, and the main event loop until shutdown.
///
/// # Example
///
/// ```no_run
/// use skydimod::application::Application;
/// use skydimod::config;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config_manager = config::ConfigManager::load(None).await?;
/// let mut app = Application::builder()
///     .with_config_manager(config_manager)
///     .build()
///     .await?;
///
/// app.run().await?;
/// # Ok(())
/// # }
/// ```
pub struct Application {
    pub coordinator: SystemCoordinator,
    config_manager: ConfigManager,
}

impl Application {
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    /// Runs the daemon: initialize state, start services, serve events
    /// until ctrl-c or a `Stop` call over D-Bus.
    pub async fn run(&mut self) -> Result<()> {
        self.coordinator
            .initialize(self.config_manager.clone())
            .await?;

        self.coordinator.start_all_services().await?;

        self.coordinator.run_main_loop().await?;

        Ok(())
    }
}

/// Builder collecting the daemon's inputs before startup.
///
/// A loaded [`ConfigManager`] is the only required input; everything else
/// (registry, detector, services) is constructed during initialization.
pub struct ApplicationBuilder {
    config_manager: Option<ConfigManager>,
}

impl ApplicationBuilder {
    fn new() -> Self {
        Self {
            config_manager: None,
        }
    }

    /// Sets the configuration manager for the daemon.
    pub fn with_config_manager(mut self, config_manager: ConfigManager) -> Self {
        self.config_manager = Some(config_manager);
        self
    }

    /// Builds the [`Application`].
    pub async fn build(self) -> Result<Application> {
        let config_manager = self
            .config_manager
            .ok_or_else(|| anyhow::anyhow!("Configuration manager is required"))?;
        let coordinator = SystemCoordinator::new();

        Ok(Application {
            coordinator,
            config_manager,
        })
    }
}
