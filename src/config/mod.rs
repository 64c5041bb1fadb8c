// src/config/mod.rs
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_WIDTH: u32 = 256;
pub const DEFAULT_HEIGHT: u32 = 256;
pub const CLIENT_QUEUE_SIZE: usize = 256;
pub const BROADCAST_CHANNEL_SIZE: usize = 1024;
pub const CANVAS_CHANNEL_SIZE: usize = 1024;
pub const BROADCAST_SUBMIT_TIMEOUT: Duration = Duration::from_secs(2);
pub const CANVAS_SUBMIT_TIMEOUT: Duration = Duration::from_secs(2);
pub const READ_IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(10);
pub const PING_INTERVAL: Duration = Duration::from_secs(30);
pub const SNAPSHOT_SAVE_INTERVAL: u64 = 60;
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

#[derive(Parser, Debug, Clone)]
#[command(name = "shared-canvas-server", about = "Collaborative pixel canvas over WebSocket")]
pub struct Settings {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Canvas width in pixels
    #[arg(long, env = "CANVAS_WIDTH", default_value_t = DEFAULT_WIDTH)]
    pub width: u32,

    /// Canvas height in pixels
    #[arg(long, env = "CANVAS_HEIGHT", default_value_t = DEFAULT_HEIGHT)]
    pub height: u32,

    /// File the canvas is loaded from at startup and saved to on shutdown
    #[arg(long, env = "CANVAS_SNAPSHOT")]
    pub snapshot: Option<PathBuf>,

    /// Directory with the web client, served at `/`
    #[arg(long, env = "STATIC_DIR")]
    pub static_dir: Option<PathBuf>,

    /// Outbound messages buffered per client before it is evicted
    #[arg(long, default_value_t = CLIENT_QUEUE_SIZE)]
    pub client_queue: usize,

    /// Broadcasts buffered by the hub before submitters start waiting
    #[arg(long, default_value_t = BROADCAST_CHANNEL_SIZE)]
    pub broadcast_queue: usize,

    /// Seconds between periodic snapshot saves, 0 disables them
    #[arg(long, default_value_t = SNAPSHOT_SAVE_INTERVAL)]
    pub save_interval: u64,
}

impl Settings {
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            queue_size: self.broadcast_queue.max(1),
            submit_timeout: BROADCAST_SUBMIT_TIMEOUT,
        }
    }

    pub fn connection_limits(&self) -> ConnectionLimits {
        ConnectionLimits {
            client_queue: self.client_queue.max(1),
            ..ConnectionLimits::default()
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HubConfig {
    pub queue_size: usize,
    pub submit_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        HubConfig {
            queue_size: BROADCAST_CHANNEL_SIZE,
            submit_timeout: BROADCAST_SUBMIT_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConnectionLimits {
    pub client_queue: usize,
    pub read_idle_timeout: Duration,
    pub write_timeout: Duration,
    pub ping_interval: Duration,
}

impl Default for ConnectionLimits {
    fn default() -> Self {
        ConnectionLimits {
            client_queue: CLIENT_QUEUE_SIZE,
            read_idle_timeout: READ_IDLE_TIMEOUT,
            write_timeout: WRITE_TIMEOUT,
            ping_interval: PING_INTERVAL,
        }
    }
}
