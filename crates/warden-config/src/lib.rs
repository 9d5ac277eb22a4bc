// Copyright (c) 2026 Warden Contributors
//
// SPDX-License-Identifier: Apache-2.0
mod env;
mod loader;
mod schema;

pub use env::{substitute_env_vars, EnvSubstitutionError};
pub use loader::{config_search_paths, load};
pub use schema::*;
