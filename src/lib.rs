//! Client for the COES grid-operator portal
//!
//! Discovers daily operation program and reprogram files by walking the
//! portal's file browser, and fetches generation meter readings and
//! executed demand as timestamped numeric tables.
//!
//! ```ignore
//! let config = PortalConfig::from_env();
//! let session = get_session(&config)?;
//! let portal = Portal::new(&session, &config)?;
//! let files = list_daily_program_files(&portal, threshold).await?;
//! ```

pub mod config;
pub mod logging;
pub mod portal;
pub mod table;

pub use config::PortalConfig;
pub use portal::crawler::{list_daily_program_files, list_daily_reprogram_files, DownloadEntry};
pub use portal::demand::{fetch_executed_demand, normalize_executed_demand, RawResponse};
pub use portal::errors::{raise_for_status, HttpError};
pub use portal::meters::fetch_generation_meters;
pub use portal::session::{get_session, Session};
pub use portal::Portal;
pub use table::TimeSeriesTable;
