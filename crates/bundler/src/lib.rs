// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The offline sandbox bundler (C4): builds a single self-contained code
//! artifact from a workflows directory, an activity-module → function-name
//! map, and an interceptor module roster (spec §4.4).

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod artifact;
mod bundler;
mod entrypoint;
mod error;
mod roster;
mod stub;
mod virtual_fs;

pub use artifact::BundleArtifact;
pub use bundler::{Bundler, BundlerConfig, ENTRYPOINT_MODULE_NAME};
pub use entrypoint::BUNDLE_ROSTER_SECTION;
pub use error::BundleError;
pub use roster::discover_roster;
pub use stub::{synth_activity_stub_module, ActivityStubSpec};
pub use virtual_fs::VirtualFs;
