// SPDX-FileCopyrightText: 2024 griff
//
// SPDX-License-Identifier: EUPL-1.2 or MIT

//! Fetch a single file out of a NAR stored in a Nix binary cache.
//!
//! The NAR is decompressed and decoded on the fly. Only the bytes of the
//! requested file are written anywhere; everything before it is skipped and
//! nothing after it is ever read.

extern crate self as nixrs_fetch;

pub mod archive;
pub mod binary_cache;
pub mod client;
pub mod compression;
pub mod error;
pub mod extract;
pub mod hydra;
pub mod io;
pub mod settings;
pub mod store_path;
pub mod wire;

pub use client::{FetchClient, HttpFetchClient};
pub use error::Error;
pub use extract::{Extracted, NarPath, Target, extract, extract_target};
pub use settings::Settings;

pub type ByteString = bytes::Bytes;
