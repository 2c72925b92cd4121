//! Synthetic position traffic over TCP.
//!
//! Each configured generator replays a GPX waypoint sequence forever,
//! rendering one templated message per waypoint and sending it over a fresh
//! TCP connection, then sleeping for its configured frequency. Generators run
//! as independent tasks; a broken template stops only its own generator and
//! an unreachable destination stops none.
//!
//! ```rust,no_run
//! use gpxtx::{Engine, EngineConfig, GenConfig};
//! use std::time::Duration;
//!
//! # async fn demo() -> Result<(), gpxtx::GpxtxError> {
//! let gen_config = GenConfig::from_file("cfg/example.yml")?;
//! let config = EngineConfig::new("127.0.0.1:30000", Duration::from_secs(10))
//!     .with_start_offset(gen_config.start_offset());
//! let engine = Engine::new(&gen_config, config)?;
//! let (trigger, shutdown) = gpxtx::shutdown::channel();
//! tokio::spawn(async move {
//!     let _ = tokio::signal::ctrl_c().await;
//!     trigger.trigger();
//! });
//! engine.run(shutdown).await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
mod funcs;
pub mod generator;
pub mod gpx_types;
pub mod parser;
pub mod shutdown;
pub mod template;
pub mod transport;

pub use config::{EngineConfig, GenConfig, GeneratorSpec};
pub use engine::Engine;
pub use error::{GpxtxError, ParseError, SendError, TemplateError};
pub use generator::{CompiledGenerator, Cursor, LoopExit, run_generator};
pub use gpx_types::{Waypoint, WaypointFileType, WaypointSet};
pub use parser::{load_waypoints, parse_waypoints};
pub use shutdown::Shutdown;
pub use template::{Params, Template, Value};
pub use transport::{TcpSender, Transport};
