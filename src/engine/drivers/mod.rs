// SPDX-License-Identifier: Apache-2.0

// Database backends

pub mod postgres;
pub mod postgres_utils;

pub use postgres::PostgresBackend;
