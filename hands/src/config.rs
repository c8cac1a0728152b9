//! Driver configuration.

use crate::cursor::Hand;

/// Default hand driver host.
pub const DEFAULT_HOST: &str = "localhost";

/// Default hand driver TCP port.
pub const DEFAULT_PORT: u16 = 1988;

/// Size of the reference table the hands move over, in scene units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TableDimensions {
    /// Left-right extent.
    pub width: f64,
    /// Up-down extent.
    pub height: f64,
    /// In-out extent.
    pub depth: f64,
}

impl Default for TableDimensions {
    fn default() -> Self {
        Self {
            width: 900.0,
            height: 30.0,
            depth: 600.0,
        }
    }
}

impl TableDimensions {
    /// Parse a "WxHxD" string.  All three must be positive.
    pub fn parse(s: &str) -> Option<Self> {
        let parts: Vec<&str> = s.split('x').collect();
        if parts.len() != 3 {
            return None;
        }
        let width = parts[0].trim().parse::<f64>().ok()?;
        let height = parts[1].trim().parse::<f64>().ok()?;
        let depth = parts[2].trim().parse::<f64>().ok()?;
        if width > 0.0 && height > 0.0 && depth > 0.0 {
            Some(Self {
                width,
                height,
                depth,
            })
        } else {
            None
        }
    }
}

/// Settings for one navigation session.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Hand driver host.
    pub host: String,
    /// Hand driver port.
    pub port: u16,
    /// Hand whose pinch drives slice navigation.
    pub jump_hand: Hand,
    /// Reference table size.
    pub table: TableDimensions,
    /// Log every protocol line.
    pub trace_protocol: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            jump_hand: Hand::Right,
            table: TableDimensions::default(),
            trace_protocol: false,
        }
    }
}

impl DriverConfig {
    /// `host:port` for log and status messages.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
