//! Backends that own the event loop.

pub mod headless;

pub use headless::HeadlessConfig;

/// Run the driver with the headless backend.
pub fn run(
    driver: crate::config::DriverConfig,
    config: HeadlessConfig,
) -> anyhow::Result<()> {
    headless::run(driver, config)
}
