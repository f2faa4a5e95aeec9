// SPDX-License-Identifier: Apache-2.0

//! Migration history: naming, versioning and the recorder.

pub mod naming;
pub mod recorder;

pub use naming::{compare_versions, migration_name, sanitize_name, VersionClock};
pub use recorder::{MigrationQuery, MigrationRecord, MigrationRecorder};
