// This file is part of mediasort.
// Copyright (c) 2026 The mediasort Authors; see AUTHORS and LICENSE.
// SPDX-License-Identifier: MIT

//! `mediasort init`: creates and locks a fresh data directory, eagerly
//! opening the store so schema creation (and any legacy migration) happens
//! at a moment an operator is watching rather than silently on first `run`.

use base::Error;
use bpaf::Bpaf;
use std::path::PathBuf;
use tracing::info;

/// Create a fresh mediasort data directory.
#[derive(Bpaf, Debug)]
#[bpaf(command("init"))]
pub struct Args {
    /// Directory to create; holds the SQLite store, audit log and topic
    /// provisioning cache.
    #[bpaf(long, argument("PATH"))]
    pub data_dir: PathBuf,
}

pub fn run(args: Args) -> Result<i32, Error> {
    let _lock = super::open_dir(&args.data_dir, super::OpenMode::Create)?;
    let db_path = args.data_dir.join("processed-messages.db");
    engine::store::Store::open(&db_path)?;
    info!(data_dir = %args.data_dir.display(), "initialized data directory");
    Ok(0)
}
