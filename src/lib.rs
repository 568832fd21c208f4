//! # skydimod
//!
//! A Linux daemon for driving Skydimo LED strips and SMBus-attached RGB
//! hardware.
//!
//! ## Features
//!
//! - **Async Architecture**: Built on Tokio for high performance
//! - **Event-Driven**: Modular services communicate via EventBus
//! - **Skydimo Drivers**: HID and Adalight-style serial transports
//! - **SMBus Access**: i801/piix4 controllers through a kernel helper
//! - **Super-IO Access**: LPC config register reads and writes
//! - **D-Bus Interface**: Device list, LED control, and rescans
//! - **Hot Reload**: Configuration changes without restart
//!
//! ## Architecture
//!
//! The daemon uses a provider-based dependency injection system with:
//! - [`SystemCoordinator`](coordinator::SystemCoordinator) - Main lifecycle manager
//! - [`EventBus`](event::EventBus) - Inter-service communication
//! - [`AppState`](app_context::AppState) - Shared application state
//! - [`DeviceRegistry`](registry::DeviceRegistry) - Detected controllers and buses
//! - Service providers for modular functionality
//!
//! ## Example
//!
//! ```no_run
//! use skydimod::{application::Application, config::ConfigManager};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config_manager = ConfigManager::load(None).await?;
//!     Application::builder()
//!         .with_config_manager(config_manager)
//!         .build()
//!         .await?
//!         .run()
//!         .await
//! }
//! ```

pub mod app_context;
pub mod application;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod detector;
pub mod device_list;
pub mod drivers;
pub mod event;
pub mod i2c_smbus;
pub mod interface;
pub mod providers;
pub mod registry;
pub mod rgb_controller;
pub mod super_io;
pub mod task_manager;
