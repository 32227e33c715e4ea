// This file is part of mediasort.
// Copyright (c) 2026 The mediasort Authors; see AUTHORS and LICENSE.
// SPDX-License-Identifier: MIT

//! Ambient building blocks shared by the ingestion core and the binary: error
//! taxonomy, a mockable clock, a cooperative shutdown signal, and tracing setup.

pub mod clock;
mod error;
pub mod shutdown;
pub mod tracing_setup;

pub use crate::error::{prettify_failure, Error, ErrorKind, ResultExt};

/// A `HashMap` using a faster, non-DoS-resistant hasher. This tool only ever
/// hashes its own data (never attacker-controlled keys across a trust
/// boundary), so the usual `SipHash` protection isn't worth the speed cost.
pub type FastHashMap<K, V> = std::collections::HashMap<K, V, ahash::RandomState>;
pub type FastHashSet<K> = std::collections::HashSet<K, ahash::RandomState>;
