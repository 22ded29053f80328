// encode.rs
//
// Copyright (c) 2025  Douglas Lau
//
//! GIF block encoding
use crate::block::*;
use crate::error::{Error, Result};
use crate::image::Paletted;
use pix::el::Pixel;
use pix::rgb::{Rgb, SRgba8};
use std::io::{self, BufWriter, Write};
use weezl::{encode::Encoder as LzwEncoder, BitOrder};

/// GIF stream encoder.
///
/// Writes the header once, then any number of frames and extensions, then
/// the trailer.  The signature bytes are held back until the first block
/// after [write_header], so the advertised version is `87a` unless an 89a
/// feature (any extension; frame delay, disposal or transparency) has been
/// used by then.
///
/// The first write failure is latched: later operations return the latched
/// error without emitting any more bytes.
///
/// ## Example
/// ```
/// use gifstream::block::{Frame, Screen};
/// use gifstream::{Encoder, Paletted, Rect};
/// use pix::rgb::SRgba8;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let palette =
///     vec![SRgba8::new(0, 0, 0, 255), SRgba8::new(255, 255, 255, 255)];
/// let mut data = vec![];
/// let mut enc = Encoder::new_unbuffered(&mut data);
/// enc.write_header(
///     Screen {
///         width: 1,
///         height: 1,
///         palette: Some(palette.clone()),
///     },
///     0,
/// )?;
/// enc.write_frame(&Frame::new(Paletted::new(
///     Rect::new(0, 0, 1, 1),
///     palette,
/// )))?;
/// enc.write_trailer()?;
/// enc.flush()?;
/// # Ok(())
/// # }
/// ```
///
/// [write_header]: struct.Encoder.html#method.write_header
pub struct Encoder<W: Write> {
    /// Writer for output data
    writer: W,
    /// Latched error from a failed write
    err: Option<io::Error>,
    /// Logical screen recorded by `write_header`
    screen: Screen,
    /// Background color index recorded by `write_header`
    background_index: u8,
    /// Is the header waiting to be emitted?
    header_pending: bool,
    /// Encoded global color table, padded to a power of two
    global_table: Vec<u8>,
}

impl<W: Write> Encoder<BufWriter<W>> {
    /// Create a new buffered GIF encoder
    pub fn new(writer: W) -> Self {
        Self::new_unbuffered(BufWriter::new(writer))
    }
}

impl<W: Write> Encoder<W> {
    /// Create a new unbuffered GIF encoder
    pub fn new_unbuffered(writer: W) -> Self {
        Encoder {
            writer,
            err: None,
            screen: Screen::default(),
            background_index: 0,
            header_pending: false,
            global_table: vec![],
        }
    }

    /// Record the logical screen configuration.
    ///
    /// Must be called once, before any frame or extension.
    pub fn write_header(
        &mut self,
        screen: Screen,
        background_index: u8,
    ) -> Result<()> {
        if let Some(palette) = &screen.palette {
            if palette.len() > 256 {
                return Err(Error::TooManyColors);
            }
        }
        self.check()?;
        self.global_table = match &screen.palette {
            Some(palette) if !palette.is_empty() => color_table(palette),
            _ => vec![],
        };
        self.screen = screen;
        self.background_index = background_index;
        self.header_pending = true;
        Ok(())
    }

    /// Write one frame: an optional graphic control extension, the image
    /// descriptor, an optional local color table and the compressed pixels
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let rect = frame.image.rect();
        if rect.max_x > 0xFFFF || rect.max_y > 0xFFFF {
            return Err(Error::TooLargeImage);
        }
        if frame.image.palette().is_empty() {
            return Err(Error::MissingColorTable);
        }
        if frame.image.palette().len() > 256 {
            return Err(Error::TooManyColors);
        }
        self.check()?;
        let res = self.emit_frame(frame);
        self.latch(res)
    }

    /// Write a plain text extension
    pub fn write_plain_text(&mut self, pt: &PlainText) -> Result<()> {
        validate_strings("plain text", &pt.strings)?;
        self.check()?;
        let res = self.emit_plain_text(pt);
        self.latch(res)
    }

    /// Write a comment extension
    pub fn write_comment(&mut self, comment: &Comment) -> Result<()> {
        validate_strings("comment", &comment.strings)?;
        self.check()?;
        let res = self.emit_comment(comment);
        self.latch(res)
    }

    /// Write a NETSCAPE2.0 looping application extension
    pub fn write_application_netscape(
        &mut self,
        an: &ApplicationNetscape,
    ) -> Result<()> {
        validate_sub_blocks("application", &an.sub_blocks)?;
        self.check()?;
        let res = self.emit_application_netscape(an);
        self.latch(res)
    }

    /// Write an application extension with an arbitrary identifier
    pub fn write_unknown_application(
        &mut self,
        ua: &UnknownApplication,
    ) -> Result<()> {
        validate_string("application identifier", ua.identifier.as_bytes())?;
        validate_sub_blocks("application", &ua.sub_blocks)?;
        self.check()?;
        let res = self.emit_unknown_application(ua);
        self.latch(res)
    }

    /// Write an extension with an arbitrary label
    pub fn write_unknown_extension(
        &mut self,
        ue: &UnknownExtension,
    ) -> Result<()> {
        validate_sub_blocks("extension", &ue.sub_blocks)?;
        self.check()?;
        let res = self.emit_unknown_extension(ue);
        self.latch(res)
    }

    /// Write the stream trailer
    pub fn write_trailer(&mut self) -> Result<()> {
        self.check()?;
        let res = self.emit_trailer();
        self.latch(res)
    }

    /// Flush buffered data to the underlying writer
    pub fn flush(&mut self) -> Result<()> {
        self.check()?;
        let res = self.emit_header(false).and_then(|()| self.writer.flush());
        self.latch(res)
    }

    /// Encode a complete animation: header, loop extension when needed,
    /// every frame, then the trailer
    pub fn encode(&mut self, animation: &Animation) -> Result<()> {
        if animation.images.is_empty() {
            return Err(Error::NoFrames);
        }
        if animation.images.len() != animation.delays_cs.len() {
            return Err(Error::MismatchedDelayLengths);
        }
        if let Some(disposals) = &animation.disposals {
            if animation.images.len() != disposals.len() {
                return Err(Error::MismatchedDisposalLengths);
            }
        }
        let screen = match &animation.screen {
            Some(screen) => screen.clone(),
            None => {
                let rect = animation.images[0].rect();
                Screen {
                    width: rect.max_x.min(0xFFFF) as u16,
                    height: rect.max_y.min(0xFFFF) as u16,
                    palette: None,
                }
            }
        };
        self.write_header(screen, animation.background_index)?;
        if animation.images.len() > 1 && animation.loop_count >= 0 {
            self.write_application_netscape(&ApplicationNetscape {
                loop_count: animation.loop_count,
                sub_blocks: vec![],
            })?;
        }
        for (i, image) in animation.images.iter().enumerate() {
            let disposal_method = match &animation.disposals {
                Some(disposals) => disposals[i],
                None => DisposalMethod::NoAction,
            };
            let frame = Frame {
                image: image.clone(),
                delay_time_cs: animation.delays_cs[i],
                disposal_method,
            };
            self.write_frame(&frame)?;
        }
        self.write_trailer()?;
        self.flush()
    }

    /// Encode a single paletted image as a complete stream
    pub fn encode_image(&mut self, image: &Paletted) -> Result<()> {
        let rect = image.rect();
        if rect.width() > 0xFFFF || rect.height() > 0xFFFF {
            return Err(Error::TooLargeImage);
        }
        let image = if rect.min_x != 0 || rect.min_y != 0 {
            image.clone().with_origin(0, 0)
        } else {
            image.clone()
        };
        let screen = Screen {
            width: rect.width() as u16,
            height: rect.height() as u16,
            palette: Some(image.palette().to_vec()),
        };
        self.encode(&Animation {
            images: vec![image],
            delays_cs: vec![0],
            screen: Some(screen),
            ..Animation::default()
        })
    }

    /// Emit the pending header, choosing the advertised version
    fn emit_header(&mut self, uses_89a: bool) -> io::Result<()> {
        if !self.header_pending {
            return Ok(());
        }
        self.header_pending = false;
        self.writer.write_all(b"GIF")?;
        self.writer
            .write_all(if uses_89a { b"89a" } else { b"87a" })?;
        let width = self.screen.width;
        let height = self.screen.height;
        let mut buf = [
            width as u8,
            (width >> 8) as u8,
            height as u8,
            (height >> 8) as u8,
            0, // flags
            self.background_index,
            0, // pixel aspect ratio
        ];
        if !self.global_table.is_empty() {
            // color table present, color resolution 7
            buf[4] = 0xF0 | table_len_bits(self.global_table.len() / 3);
        }
        self.writer.write_all(&buf)?;
        self.writer.write_all(&self.global_table)
    }

    /// Emit a graphic control extension
    fn emit_graphic_control(
        &mut self,
        delay_cs: u16,
        disposal: DisposalMethod,
        transparent: Option<u8>,
    ) -> io::Result<()> {
        let mut flags = u8::from(disposal) << 2;
        let mut idx = 0;
        if let Some(transparent) = transparent {
            flags |= 0x01;
            idx = transparent;
        }
        self.writer.write_all(&[
            EXTENSION,
            EXT_GRAPHIC_CONTROL,
            4, // block size
            flags,
            delay_cs as u8,
            (delay_cs >> 8) as u8,
            idx,
            0, // block terminator
        ])
    }

    /// Emit a frame
    fn emit_frame(&mut self, frame: &Frame) -> io::Result<()> {
        let image = &frame.image;
        // a fully transparent palette entry marks the transparent index
        let transparent = image
            .palette()
            .iter()
            .position(|clr| u8::from(clr.alpha()) == 0)
            .map(|i| i as u8);
        let uses_89a = frame.delay_time_cs > 0
            || frame.disposal_method != DisposalMethod::NoAction
            || transparent.is_some();
        self.emit_header(uses_89a)?;
        if uses_89a {
            self.emit_graphic_control(
                frame.delay_time_cs,
                frame.disposal_method,
                transparent,
            )?;
        }
        let rect = image.rect();
        let left = rect.min_x as u16;
        let top = rect.min_y as u16;
        let width = rect.width() as u16;
        let height = rect.height() as u16;
        let table = color_table(image.palette());
        let local = table != self.global_table;
        let mut flags = 0;
        if local {
            flags = 0x80 | table_len_bits(table.len() / 3);
        }
        self.writer.write_all(&[
            IMAGE_DESCRIPTOR,
            left as u8,
            (left >> 8) as u8,
            top as u8,
            (top >> 8) as u8,
            width as u8,
            (width >> 8) as u8,
            height as u8,
            (height >> 8) as u8,
            flags,
        ])?;
        if local {
            self.writer.write_all(&table)?;
        }
        let min_code_size = table_len_bits(table.len() / 3).max(1) + 1;
        self.writer.write_all(&[min_code_size])?;
        let rows = image.pix_rows();
        let mut compressed = Vec::with_capacity(rows.len() / 4 + 4);
        let mut lzw = LzwEncoder::new(BitOrder::Lsb, min_code_size);
        let res = lzw.into_vec(&mut compressed).encode_all(&rows);
        if res.status.is_err() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "invalid color index in image data",
            ));
        }
        compressed.truncate(res.consumed_out);
        // split compressed data into sub-blocks
        for chunk in compressed.chunks(255) {
            self.writer.write_all(&[chunk.len() as u8])?;
            self.writer.write_all(chunk)?;
        }
        self.writer.write_all(&[0]) // final sub-block size
    }

    /// Emit a plain text extension
    fn emit_plain_text(&mut self, pt: &PlainText) -> io::Result<()> {
        self.emit_header(true)?;
        if pt.delay_time_cs > 0
            || pt.disposal_method != DisposalMethod::NoAction
        {
            self.emit_graphic_control(
                pt.delay_time_cs,
                pt.disposal_method,
                None,
            )?;
        }
        self.writer.write_all(&[
            EXTENSION,
            EXT_PLAIN_TEXT,
            0x0C, // block size
            pt.grid_left as u8,
            (pt.grid_left >> 8) as u8,
            pt.grid_top as u8,
            (pt.grid_top >> 8) as u8,
            pt.grid_width as u8,
            (pt.grid_width >> 8) as u8,
            pt.grid_height as u8,
            (pt.grid_height >> 8) as u8,
            pt.cell_width,
            pt.cell_height,
            pt.foreground_index,
            pt.background_index,
        ])?;
        write_sub_blocks(&mut self.writer, &pt.strings)
    }

    /// Emit a comment extension
    fn emit_comment(&mut self, comment: &Comment) -> io::Result<()> {
        self.emit_header(true)?;
        self.writer.write_all(&[EXTENSION, EXT_COMMENT])?;
        write_sub_blocks(&mut self.writer, &comment.strings)
    }

    /// Emit a NETSCAPE2.0 application extension
    fn emit_application_netscape(
        &mut self,
        an: &ApplicationNetscape,
    ) -> io::Result<()> {
        self.emit_header(true)?;
        self.writer.write_all(&[EXTENSION, EXT_APPLICATION, 11])?;
        self.writer.write_all(b"NETSCAPE2.0")?;
        let count = an.loop_count as u16;
        self.writer
            .write_all(&[3, 1, count as u8, (count >> 8) as u8])?;
        write_sub_blocks(&mut self.writer, &an.sub_blocks)
    }

    /// Emit an application extension with a literal identifier
    fn emit_unknown_application(
        &mut self,
        ua: &UnknownApplication,
    ) -> io::Result<()> {
        self.emit_header(true)?;
        self.writer.write_all(&[
            EXTENSION,
            EXT_APPLICATION,
            ua.identifier.len() as u8,
        ])?;
        self.writer.write_all(ua.identifier.as_bytes())?;
        write_sub_blocks(&mut self.writer, &ua.sub_blocks)
    }

    /// Emit an extension with an arbitrary label
    fn emit_unknown_extension(
        &mut self,
        ue: &UnknownExtension,
    ) -> io::Result<()> {
        self.emit_header(true)?;
        self.writer.write_all(&[EXTENSION, ue.label])?;
        write_sub_blocks(&mut self.writer, &ue.sub_blocks)
    }

    /// Emit the stream trailer
    fn emit_trailer(&mut self) -> io::Result<()> {
        self.emit_header(false)?;
        self.writer.write_all(&[TRAILER])
    }

    /// Check the latched error before attempting an operation
    fn check(&self) -> Result<()> {
        match &self.err {
            Some(e) => {
                Err(Error::Io("writing", io::Error::new(e.kind(), e.to_string())))
            }
            None => Ok(()),
        }
    }

    /// Latch the first write failure
    fn latch(&mut self, res: io::Result<()>) -> Result<()> {
        match res {
            Ok(()) => Ok(()),
            Err(e) => {
                let out = io::Error::new(e.kind(), e.to_string());
                self.err = Some(e);
                Err(Error::Io("writing", out))
            }
        }
    }
}

/// Encode a palette as RGB triplets, zero-padded to a power of two
fn color_table(palette: &[SRgba8]) -> Vec<u8> {
    let len = palette.len().max(2).next_power_of_two().min(256);
    let mut table = Vec::with_capacity(len * 3);
    for clr in palette {
        table.push(u8::from(Rgb::red(*clr)));
        table.push(u8::from(Rgb::green(*clr)));
        table.push(u8::from(Rgb::blue(*clr)));
    }
    table.resize(len * 3, 0);
    table
}

/// Get the descriptor size field for a padded color table length
fn table_len_bits(len: usize) -> u8 {
    (len.max(2).next_power_of_two().trailing_zeros() - 1) as u8
}

/// Write sub-blocks with length prefixes and the zero terminator
fn write_sub_blocks<W: Write>(
    writer: &mut W,
    sub_blocks: &[Vec<u8>],
) -> io::Result<()> {
    for sb in sub_blocks {
        debug_assert!(sb.len() <= 255);
        writer.write_all(&[sb.len() as u8])?;
        writer.write_all(sb)?;
    }
    writer.write_all(&[0]) // final sub-block size
}

/// Check a list of strings before any bytes are written
fn validate_strings(what: &'static str, strings: &[Vec<u8>]) -> Result<()> {
    if strings.is_empty() {
        return Err(Error::EmptyStringList(what));
    }
    for s in strings {
        validate_string(what, s)?;
    }
    Ok(())
}

/// Check one ASCII string
fn validate_string(what: &'static str, s: &[u8]) -> Result<()> {
    if s.len() > 255 {
        return Err(Error::StringTooLong(what));
    }
    if s.iter().any(|b| *b > 0x7F) {
        return Err(Error::NonAsciiString(what));
    }
    Ok(())
}

/// Check a list of sub-blocks before any bytes are written
fn validate_sub_blocks(
    what: &'static str,
    sub_blocks: &[Vec<u8>],
) -> Result<()> {
    for sb in sub_blocks {
        if sb.len() > 255 {
            return Err(Error::SubBlockTooLong(what));
        }
    }
    Ok(())
}
