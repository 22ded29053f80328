// lib.rs      gifstream crate.
//
// Copyright (c) 2025  Douglas Lau
//
//! # gifstream
//!
//! A streaming library for encoding and decoding GIF images and
//! animations, one logical block at a time.
//!
//! The [Encoder] interleaves extension and image blocks; the [Decoder]
//! reads a tagged [Block] stream, pairing each graphic control extension
//! with the frame or plain text block it annotates.  The [Optimizer]
//! rewrites animation frames so unchanged pixels become transparent and
//! crops them to the changed region, which can shrink animations
//! dramatically before encoding.
//!
//! [Block]: block/enum.Block.html
//! [Decoder]: struct.Decoder.html
//! [Encoder]: struct.Encoder.html
//! [Optimizer]: struct.Optimizer.html
#![forbid(unsafe_code)]

#[macro_use]
extern crate log;

pub mod block;
mod decode;
mod encode;
mod error;
mod image;
mod optimize;

pub use crate::decode::{Blocks, Decoder};
pub use crate::encode::Encoder;
pub use crate::error::{Error, Result};
pub use crate::image::{Palette, Paletted, Rect};
pub use crate::optimize::{optimize_all, Optimizer};
