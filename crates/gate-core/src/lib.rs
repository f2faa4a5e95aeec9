// SPDX-License-Identifier: Apache-2.0

//! Core vocabulary shared by the classifier, the safety layer and the
//! execution engine.

pub mod error;
pub mod types;

pub use error::{EngineError, EngineResult};
pub use types::*;
