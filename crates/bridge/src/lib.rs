// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The external Bridge and DataConverter collaborator contracts (spec §6,
//! §1's "deliberately out of scope" list): the wire transport to the
//! orchestration service and payload (de)serialization. Both are traits so
//! `worker-pipeline` stays generic over them.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod bridge;
mod converter;
mod error;
mod framed;

pub use bridge::Bridge;
#[cfg(any(test, feature = "test-support"))]
pub use bridge::{fake::RecordedCall, FakeBridge};
pub use converter::{DataConverter, JsonDataConverter};
pub use error::{BridgeError, ConverterError};
pub use framed::FramedBridge;
