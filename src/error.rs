// error.rs
//
// Copyright (c) 2025  Douglas Lau
//
use std::fmt;
use std::io;

/// Errors encountered while decoding or encoding
#[derive(Debug)]
pub enum Error {
    /// A wrapped I/O error, tagged with the operation that failed.
    Io(&'static str, io::Error),
    /// Header block malformed or missing.
    MalformedHeader,
    /// GIF version not supported (87a or 89a only).
    UnsupportedVersion([u8; 3]),
    /// Unknown top-level block introducer.
    UnknownBlockType(u8),
    /// Extension has an invalid fixed block size field.
    InvalidBlockSize(&'static str, u8),
    /// Graphic control extension not terminated by a zero byte.
    MalformedGraphicControlExtension,
    /// LZW minimum code size out of range (2 to 8).
    InvalidCodeSize(u8),
    /// Compressed LZW data invalid or corrupt.
    InvalidLzwData,
    /// Image data ended before all pixels were decoded.
    NotEnoughImageData,
    /// Image data continued after all pixels were decoded.
    TooMuchImageData,
    /// No color table for a frame (local or global).
    MissingColorTable,
    /// Palette has more than 256 entries.
    TooManyColors,
    /// A string list was empty.
    EmptyStringList(&'static str),
    /// A string was longer than 255 bytes.
    StringTooLong(&'static str),
    /// A string contained a byte outside the ASCII range.
    NonAsciiString(&'static str),
    /// A sub-block was longer than 255 bytes.
    SubBlockTooLong(&'static str),
    /// Image dimensions do not fit in the 16-bit descriptor fields.
    TooLargeImage,
    /// Frame and delay lists have different lengths.
    MismatchedDelayLengths,
    /// Frame and disposal lists have different lengths.
    MismatchedDisposalLengths,
    /// An animation must contain at least one frame.
    NoFrames,
    /// Optimized frame not contained in the bounds of the first frame.
    ImageOutsideBounds,
}

/// Crate result type
pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        use self::Error::*;
        match self {
            Io(what, err) => write!(fmt, "gif: {what}: {err}"),
            MalformedHeader => write!(fmt, "gif: malformed header"),
            UnsupportedVersion(v) => {
                write!(fmt, "gif: unsupported version: {}", v.escape_ascii())
            }
            UnknownBlockType(b) => {
                write!(fmt, "gif: unknown block type: 0x{b:02X}")
            }
            InvalidBlockSize(what, sz) => {
                write!(fmt, "gif: invalid {what} block size: {sz}")
            }
            MalformedGraphicControlExtension => {
                write!(fmt, "gif: malformed graphic control extension")
            }
            InvalidCodeSize(sz) => {
                write!(fmt, "gif: pixel code size out of range: {sz}")
            }
            InvalidLzwData => write!(fmt, "gif: invalid LZW image data"),
            NotEnoughImageData => write!(fmt, "gif: not enough image data"),
            TooMuchImageData => write!(fmt, "gif: too much image data"),
            MissingColorTable => write!(fmt, "gif: no color table"),
            TooManyColors => write!(fmt, "gif: too many colors in palette"),
            EmptyStringList(what) => {
                write!(fmt, "gif: {what}: must provide at least one string")
            }
            StringTooLong(what) => write!(fmt, "gif: {what}: string too long"),
            NonAsciiString(what) => write!(
                fmt,
                "gif: {what}: string must only contain ASCII characters"
            ),
            SubBlockTooLong(what) => {
                write!(fmt, "gif: {what}: sub-block too long")
            }
            TooLargeImage => write!(fmt, "gif: image is too large to encode"),
            MismatchedDelayLengths => {
                write!(fmt, "gif: mismatched frame and delay lengths")
            }
            MismatchedDisposalLengths => {
                write!(fmt, "gif: mismatched frame and disposal lengths")
            }
            NoFrames => write!(fmt, "gif: must provide at least one frame"),
            ImageOutsideBounds => write!(fmt, "gif: image outside bounds"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(_, err) => Some(err),
            _ => None,
        }
    }
}
