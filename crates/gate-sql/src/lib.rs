// SPDX-License-Identifier: Apache-2.0

//! Statement splitting and risk classification.
//!
//! Raw SQL text goes in, a [`StatementBatch`] comes out: one entry per
//! statement with its grammar command, category, risk tier and target object.
//! The grammar itself sits behind [`StatementParser`].

pub mod classify;
pub mod command;
pub mod objects;
pub mod parser;

pub use classify::{category_for, classify, tier_for, ClassifiedStatement, StatementBatch};
pub use command::SqlCommand;
pub use objects::ObjectRef;
pub use parser::{ParsedStatement, PostgresParser, StatementParser};
