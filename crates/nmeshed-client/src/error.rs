// Copyright (C) 2026 The Nmeshed Authors
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! The facade's top-level error, wrapping every lower-level error enum the
//! way the teacher's higher-level crates wrap lower-level ones rather than
//! re-deriving variants of their own.

use nmeshed_codec::{DecodingError, EncodingError};
use nmeshed_engine::EngineError;
use nmeshed_transport::ConnectionError;

use crate::config::ConfigurationError;

#[derive(Debug, thiserror::Error)]
pub enum NmeshedError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    #[error(transparent)]
    Decoding(#[from] DecodingError),
}
