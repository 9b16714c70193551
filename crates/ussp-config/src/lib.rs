// Copyright (C) 2026  winnyboy5
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.
//! Configuration management for the USSP storage server
//!
//! Loads a [`Config`] from TOML, YAML or JSON, applies `USSP_*` environment
//! overrides and validates the result.
//!
//! ```no_run
//! # async fn example() -> ussp_config::ConfigResult<()> {
//! use ussp_config::ConfigLoader;
//!
//! let config = ConfigLoader::new()
//!     .load_server_config(Some(std::path::Path::new("ussp.toml")))
//!     .await?;
//! println!("listening on {}", config.bind_address());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{apply_overrides, ConfigFormat, ConfigLoader};
pub use schema::*;
pub use validation::{Validator, KNOWN_ADAPTER_KINDS};
