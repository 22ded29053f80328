// decode.rs
//
// Copyright (c) 2025  Douglas Lau
//
//! GIF block decoding
use crate::block::*;
use crate::error::{Error, Result};
use crate::image::{Palette, Paletted, Rect};
use pix::rgb::SRgba8;
use std::io::{BufReader, Read};
use weezl::{decode::Decoder as LzwDecoder, BitOrder, LzwStatus};

/// Interlace passes as (skip, start) row pairs
const INTERLACE_PASSES: [(usize, usize); 4] = [(8, 0), (8, 4), (4, 2), (2, 1)];

/// GIF stream decoder.
///
/// Reads the [Header] once, then one logical [Block] at a time, pairing
/// each graphic control extension with the following frame or plain text
/// block.
///
/// ## Example
/// ```
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// # let gif = &[
/// #   0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x02, 0x00,
/// #   0x02, 0x00, 0x80, 0x01, 0x00, 0x00, 0x00, 0x00,
/// #   0xff, 0xff, 0xff, 0x2c, 0x00, 0x00, 0x00, 0x00,
/// #   0x02, 0x00, 0x02, 0x00, 0x00, 0x02, 0x03, 0x0c,
/// #   0x10, 0x05, 0x00, 0x3b,
/// # ][..];
/// use gifstream::block::Block;
///
/// // ... open a `File` as "gif"
/// let mut decoder = gifstream::Decoder::new(gif);
/// let header = decoder.read_header()?;
/// println!("screen: {}x{}", header.screen.width, header.screen.height);
/// for block in decoder.into_blocks() {
///     if let Block::Frame(frame) = block? {
///         println!("frame: {:?}", frame.image.rect());
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct Decoder<R: Read> {
    /// Reader for input data
    reader: R,
    /// Screen width from the header
    width: u16,
    /// Screen height from the header
    height: u16,
    /// Background color index from the header
    background_index: u8,
    /// Global color palette, if any
    global_palette: Option<Palette>,
    /// Pending delay time from a graphic control extension
    delay_time_cs: u16,
    /// Pending disposal method from a graphic control extension
    disposal_method: DisposalMethod,
    /// Pending transparent color index
    transparent_index: u8,
    /// Is a transparent index pending?
    has_transparent_index: bool,
    /// Loop count from a NETSCAPE2.0 extension (-1 until seen)
    loop_count: i32,
    /// Has the trailer been read?
    done: bool,
    /// Scratch buffer for one sub-block
    tmp: [u8; 255],
}

impl<R: Read> Decoder<BufReader<R>> {
    /// Create a new buffered GIF decoder
    pub fn new(reader: R) -> Self {
        Self::new_unbuffered(BufReader::new(reader))
    }
}

impl<R: Read> Decoder<R> {
    /// Create a new unbuffered GIF decoder
    pub fn new_unbuffered(reader: R) -> Self {
        Decoder {
            reader,
            width: 0,
            height: 0,
            background_index: 0,
            global_palette: None,
            delay_time_cs: 0,
            disposal_method: DisposalMethod::NoAction,
            transparent_index: 0,
            has_transparent_index: false,
            loop_count: -1,
            done: false,
            tmp: [0; 255],
        }
    }

    /// Read the stream header.
    ///
    /// Must be called once, before [read_block].
    ///
    /// [read_block]: struct.Decoder.html#method.read_block
    pub fn read_header(&mut self) -> Result<Header> {
        let what = "reading header";
        let mut buf = [0; 13];
        self.reader
            .read_exact(&mut buf)
            .map_err(|e| Error::Io(what, e))?;
        if &buf[..3] != b"GIF" {
            return Err(Error::MalformedHeader);
        }
        let version = [buf[3], buf[4], buf[5]];
        match &version {
            b"87a" | b"89a" => (),
            _ => return Err(Error::UnsupportedVersion(version)),
        }
        self.width = u16::from_le_bytes([buf[6], buf[7]]);
        self.height = u16::from_le_bytes([buf[8], buf[9]]);
        let flags = buf[10];
        self.background_index = buf[11];
        // buf[12] is the pixel aspect ratio, which nothing uses
        if flags & 0x80 != 0 {
            let entries = 2 << (flags & 0x07) as usize;
            self.global_palette = Some(self.read_color_table(entries, what)?);
        }
        Ok(Header {
            version,
            screen: Screen {
                width: self.width,
                height: self.height,
                palette: self.global_palette.clone(),
            },
            background_index: self.background_index,
        })
    }

    /// Read the next logical block.
    ///
    /// Returns `Ok(None)` at the stream trailer; after that, every call
    /// returns `Ok(None)` without reading further.
    pub fn read_block(&mut self) -> Result<Option<Block>> {
        if self.done {
            return Ok(None);
        }
        loop {
            let introducer = self.read_byte("reading block")?;
            debug!("block: 0x{introducer:02X}");
            match introducer {
                EXTENSION => {
                    if let Some(block) = self.read_extension()? {
                        return Ok(Some(block));
                    }
                }
                IMAGE_DESCRIPTOR => {
                    return Ok(Some(Block::Frame(self.read_frame()?)));
                }
                TRAILER => {
                    self.done = true;
                    return Ok(None);
                }
                introducer => {
                    return Err(Error::UnknownBlockType(introducer));
                }
            }
        }
    }

    /// Convert into a block `Iterator`
    pub fn into_blocks(self) -> Blocks<R> {
        Blocks { decoder: self }
    }

    /// Read one extension block.
    ///
    /// Graphic control extensions are absorbed into pending state and
    /// return `None`.
    fn read_extension(&mut self) -> Result<Option<Block>> {
        let label = self.read_byte("reading extension")?;
        debug!("extension: 0x{label:02X}");
        match label {
            EXT_PLAIN_TEXT => {
                Ok(Some(Block::PlainText(self.read_plain_text()?)))
            }
            EXT_GRAPHIC_CONTROL => {
                self.read_graphic_control()?;
                Ok(None)
            }
            EXT_COMMENT => Ok(Some(Block::Comment(self.read_comment()?))),
            EXT_APPLICATION => Ok(Some(self.read_application()?)),
            label => {
                let what = "reading unknown extension";
                Ok(Some(Block::UnknownExtension(UnknownExtension {
                    label,
                    sub_blocks: self.read_sub_blocks(what)?,
                })))
            }
        }
    }

    /// Read a graphic control extension into pending state
    fn read_graphic_control(&mut self) -> Result<()> {
        let mut buf = [0; 6];
        self.reader
            .read_exact(&mut buf)
            .map_err(|e| Error::Io("reading graphic control", e))?;
        if buf[0] != 4 {
            return Err(Error::InvalidBlockSize(
                "graphic control extension",
                buf[0],
            ));
        }
        let flags = buf[1];
        self.disposal_method = ((flags >> 2) & 0x07).into();
        self.delay_time_cs = u16::from_le_bytes([buf[2], buf[3]]);
        if flags & 0x01 != 0 {
            self.transparent_index = buf[4];
            self.has_transparent_index = true;
        }
        if buf[5] != 0 {
            return Err(Error::MalformedGraphicControlExtension);
        }
        Ok(())
    }

    /// Read a plain text extension, merging pending graphic control state
    fn read_plain_text(&mut self) -> Result<PlainText> {
        let what = "reading plain text extension";
        let mut buf = [0; 13];
        self.reader
            .read_exact(&mut buf)
            .map_err(|e| Error::Io(what, e))?;
        if buf[0] != 0x0C {
            return Err(Error::InvalidBlockSize("plain text extension", buf[0]));
        }
        let pt = PlainText {
            grid_left: u16::from_le_bytes([buf[1], buf[2]]),
            grid_top: u16::from_le_bytes([buf[3], buf[4]]),
            grid_width: u16::from_le_bytes([buf[5], buf[6]]),
            grid_height: u16::from_le_bytes([buf[7], buf[8]]),
            cell_width: buf[9],
            cell_height: buf[10],
            foreground_index: buf[11],
            background_index: buf[12],
            strings: self.read_sub_blocks(what)?,
            delay_time_cs: self.delay_time_cs,
            disposal_method: self.disposal_method,
        };
        self.clear_graphic_control();
        Ok(pt)
    }

    /// Read a comment extension
    fn read_comment(&mut self) -> Result<Comment> {
        Ok(Comment {
            strings: self.read_sub_blocks("reading comment extension")?,
        })
    }

    /// Read an application extension.
    ///
    /// A `NETSCAPE2.0` identifier makes the first sub-block eligible as a
    /// loop count; it is consumed either way.
    fn read_application(&mut self) -> Result<Block> {
        let what = "reading application extension";
        let len = self.read_byte(what)? as usize;
        self.reader
            .read_exact(&mut self.tmp[..len])
            .map_err(|e| Error::Io(what, e))?;
        if &self.tmp[..len] == b"NETSCAPE2.0" {
            let n = self.read_sub_block(what)?;
            if n == 3 && self.tmp[0] == 1 {
                self.loop_count =
                    i32::from(u16::from_le_bytes([self.tmp[1], self.tmp[2]]));
            } else if n > 0 {
                warn!("unrecognized looping sub-block: {n} bytes");
            }
            let sub_blocks = if n > 0 {
                self.read_sub_blocks(what)?
            } else {
                vec![]
            };
            Ok(Block::ApplicationNetscape(ApplicationNetscape {
                loop_count: self.loop_count,
                sub_blocks,
            }))
        } else {
            let identifier =
                String::from_utf8_lossy(&self.tmp[..len]).into_owned();
            Ok(Block::UnknownApplication(UnknownApplication {
                identifier,
                sub_blocks: self.read_sub_blocks(what)?,
            }))
        }
    }

    /// Read an image block, merging pending graphic control state
    fn read_frame(&mut self) -> Result<Frame> {
        let what = "reading image descriptor";
        let mut buf = [0; 9];
        self.reader
            .read_exact(&mut buf)
            .map_err(|e| Error::Io(what, e))?;
        let left = u32::from(u16::from_le_bytes([buf[0], buf[1]]));
        let top = u32::from(u16::from_le_bytes([buf[2], buf[3]]));
        let width = u32::from(u16::from_le_bytes([buf[4], buf[5]]));
        let height = u32::from(u16::from_le_bytes([buf[6], buf[7]]));
        let flags = buf[8];
        let rect = Rect::new(left, top, left + width, top + height);
        let local_palette = if flags & 0x80 != 0 {
            let entries = 2 << (flags & 0x07) as usize;
            Some(self.read_color_table(entries, what)?)
        } else {
            None
        };
        let mut palette = match (local_palette, &self.global_palette) {
            (Some(palette), _) => palette,
            (None, Some(palette)) => palette.clone(),
            (None, None) => return Err(Error::MissingColorTable),
        };
        let min_code_size = self.read_byte("reading image data")?;
        if !(2..=8).contains(&min_code_size) {
            return Err(Error::InvalidCodeSize(min_code_size));
        }
        let mut pix = vec![0; width as usize * height as usize];
        self.read_image_data(&mut pix, min_code_size)?;
        if flags & 0x40 != 0 {
            deinterlace(&mut pix, width as usize, height as usize);
        }
        if self.has_transparent_index {
            let idx = usize::from(self.transparent_index);
            if idx < palette.len() {
                palette[idx] = SRgba8::new(0, 0, 0, 0);
            }
        }
        let frame = Frame {
            image: Paletted::with_pixels(rect, palette, pix),
            delay_time_cs: self.delay_time_cs,
            disposal_method: self.disposal_method,
        };
        self.clear_graphic_control();
        Ok(frame)
    }

    /// Decompress the sub-block framed LZW payload into `pix`
    fn read_image_data(&mut self, pix: &mut [u8], min_code_size: u8) -> Result<()> {
        let what = "reading image data";
        let mut decoder = LzwDecoder::new(BitOrder::Lsb, min_code_size);
        let mut filled = 0;
        let mut ended = false;
        loop {
            let n = self.read_sub_block(what)?;
            if n == 0 {
                break;
            }
            let mut pos = 0;
            while pos < n && !ended {
                if filled < pix.len() {
                    let res = decoder
                        .decode_bytes(&self.tmp[pos..n], &mut pix[filled..]);
                    pos += res.consumed_in;
                    filled += res.consumed_out;
                    match res.status {
                        Ok(LzwStatus::Ok) => (),
                        Ok(LzwStatus::Done) => ended = true,
                        Ok(LzwStatus::NoProgress) => break,
                        Err(_) => return Err(Error::InvalidLzwData),
                    }
                } else {
                    // all pixels present; any further output is an error
                    let mut scratch = [0; 1];
                    let res = decoder
                        .decode_bytes(&self.tmp[pos..n], &mut scratch);
                    pos += res.consumed_in;
                    if res.consumed_out > 0 {
                        return Err(Error::TooMuchImageData);
                    }
                    match res.status {
                        Ok(LzwStatus::Ok) => (),
                        Ok(LzwStatus::Done) => ended = true,
                        Ok(LzwStatus::NoProgress) => break,
                        Err(_) => return Err(Error::InvalidLzwData),
                    }
                }
            }
        }
        if filled < pix.len() {
            return Err(Error::NotEnoughImageData);
        }
        Ok(())
    }

    /// Clear pending graphic control state after a consuming block
    fn clear_graphic_control(&mut self) {
        self.delay_time_cs = 0;
        self.disposal_method = DisposalMethod::NoAction;
        self.has_transparent_index = false;
    }

    /// Read a color table with the given number of entries
    fn read_color_table(
        &mut self,
        entries: usize,
        what: &'static str,
    ) -> Result<Palette> {
        let mut buf = [0; 768];
        let buf = &mut buf[..entries * 3];
        self.reader
            .read_exact(buf)
            .map_err(|e| Error::Io(what, e))?;
        Ok(buf
            .chunks_exact(3)
            .map(|c| SRgba8::new(c[0], c[1], c[2], 0xFF))
            .collect())
    }

    /// Read one length-prefixed sub-block into the scratch buffer.
    ///
    /// Returns the length; zero is the sequence terminator.
    fn read_sub_block(&mut self, what: &'static str) -> Result<usize> {
        let n = usize::from(self.read_byte(what)?);
        if n > 0 {
            self.reader
                .read_exact(&mut self.tmp[..n])
                .map_err(|e| Error::Io(what, e))?;
        }
        Ok(n)
    }

    /// Read sub-blocks until the zero terminator
    fn read_sub_blocks(&mut self, what: &'static str) -> Result<Vec<Vec<u8>>> {
        let mut sub_blocks = vec![];
        loop {
            let n = self.read_sub_block(what)?;
            if n == 0 {
                return Ok(sub_blocks);
            }
            sub_blocks.push(self.tmp[..n].to_vec());
        }
    }

    /// Read a single byte
    fn read_byte(&mut self, what: &'static str) -> Result<u8> {
        let mut buf = [0; 1];
        self.reader
            .read_exact(&mut buf)
            .map_err(|e| Error::Io(what, e))?;
        Ok(buf[0])
    }
}

/// Reorder interlaced rows into sequential order
fn deinterlace(pix: &mut [u8], width: usize, height: usize) {
    let mut rows = vec![0; pix.len()];
    let mut off = 0;
    for (skip, start) in INTERLACE_PASSES {
        let mut y = start;
        while y < height {
            let i = y * width;
            rows[i..i + width].copy_from_slice(&pix[off..off + width]);
            off += width;
            y += skip;
        }
    }
    pix.copy_from_slice(&rows);
}

/// Block `Iterator` for a GIF stream.
///
/// Build with Decoder.[into_blocks].
///
/// [into_blocks]: struct.Decoder.html#method.into_blocks
pub struct Blocks<R: Read> {
    /// Block decoder
    decoder: Decoder<R>,
}

impl<R: Read> Iterator for Blocks<R> {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        self.decoder.read_block().transpose()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::encode::Encoder;

    fn black() -> SRgba8 {
        SRgba8::new(0, 0, 0, 0xFF)
    }

    fn white() -> SRgba8 {
        SRgba8::new(0xFF, 0xFF, 0xFF, 0xFF)
    }

    fn clear() -> SRgba8 {
        SRgba8::new(0, 0, 0, 0)
    }

    fn test_frame() -> Frame {
        Frame::new(Paletted::new(
            Rect::new(0, 0, 1, 1),
            vec![black(), white()],
        ))
    }

    /// Encode header, one caller block, a bare frame and the trailer
    fn do_encode(block: &Block) -> Vec<u8> {
        let mut data = vec![];
        let mut enc = Encoder::new_unbuffered(&mut data);
        enc.write_header(
            Screen {
                width: 1,
                height: 1,
                palette: None,
            },
            0,
        )
        .unwrap();
        match block {
            Block::Frame(b) => enc.write_frame(b),
            Block::PlainText(b) => enc.write_plain_text(b),
            Block::Comment(b) => enc.write_comment(b),
            Block::ApplicationNetscape(b) => {
                enc.write_application_netscape(b)
            }
            Block::UnknownApplication(b) => enc.write_unknown_application(b),
            Block::UnknownExtension(b) => enc.write_unknown_extension(b),
        }
        .unwrap();
        enc.write_frame(&test_frame()).unwrap();
        enc.write_trailer().unwrap();
        enc.flush().unwrap();
        drop(enc);
        data
    }

    /// Decode header, one block, the terminator frame and the trailer,
    /// returning the block
    fn do_decode(data: &[u8]) -> Block {
        let mut dec = Decoder::new_unbuffered(data);
        dec.read_header().unwrap();
        let block = dec.read_block().unwrap().unwrap();
        match dec.read_block().unwrap() {
            Some(Block::Frame(f)) => {
                // pending graphic control must not leak into this frame
                assert_eq!(f.delay_time_cs, 0);
                assert_eq!(f.disposal_method, DisposalMethod::NoAction);
            }
            b => panic!("expected terminator frame, got {b:?}"),
        }
        assert!(dec.read_block().unwrap().is_none());
        // terminal state is latched
        assert!(dec.read_block().unwrap().is_none());
        block
    }

    fn round_trip(block: Block) {
        let data = do_encode(&block);
        assert_eq!(do_decode(&data), block);
    }

    #[test]
    fn frame_round_trip() {
        round_trip(Block::Frame(Frame {
            image: Paletted::new(Rect::new(0, 0, 1, 1), vec![black(), white()]),
            delay_time_cs: 9,
            disposal_method: DisposalMethod::Background,
        }));
    }

    #[test]
    fn transparent_frame_round_trip() {
        let palette = vec![black(), white(), clear(), black()];
        let mut image = Paletted::new(Rect::new(0, 0, 2, 1), palette);
        image.set_color_index(0, 0, 2);
        image.set_color_index(1, 0, 1);
        round_trip(Block::Frame(Frame::new(image)));
    }

    #[test]
    fn offset_frame_round_trip() {
        let mut image = Paletted::new(
            Rect::new(0, 0, 2, 2),
            vec![black(), white()],
        );
        image.set_color_index(1, 1, 1);
        let image = image.sub_image(Rect::new(1, 1, 2, 2));
        round_trip(Block::Frame(Frame::new(image)));
    }

    #[test]
    fn plain_text_round_trip() {
        round_trip(Block::PlainText(PlainText {
            grid_left: 1,
            grid_top: 2,
            grid_width: 3,
            grid_height: 4,
            cell_width: 5,
            cell_height: 6,
            foreground_index: 7,
            background_index: 8,
            strings: vec![b"hello".to_vec()],
            delay_time_cs: 9,
            disposal_method: DisposalMethod::Background,
        }));
    }

    #[test]
    fn comment_round_trip() {
        round_trip(Block::Comment(Comment {
            strings: vec![b"hello".to_vec(), b"world".to_vec()],
        }));
    }

    #[test]
    fn application_netscape_round_trip() {
        round_trip(Block::ApplicationNetscape(ApplicationNetscape {
            loop_count: 13,
            sub_blocks: vec![b"hello".to_vec()],
        }));
    }

    #[test]
    fn unknown_application_round_trip() {
        round_trip(Block::UnknownApplication(UnknownApplication {
            identifier: "foo".to_string(),
            sub_blocks: vec![b"hello".to_vec()],
        }));
    }

    #[test]
    fn unknown_extension_round_trip() {
        // two chunks check that the framer preserves the partition
        round_trip(Block::UnknownExtension(UnknownExtension {
            label: 42,
            sub_blocks: vec![b"hello".to_vec(), b"x".to_vec()],
        }));
    }

    #[test]
    fn framer_partition() {
        round_trip(Block::UnknownExtension(UnknownExtension {
            label: 0xAB,
            sub_blocks: vec![
                vec![0; 255],
                vec![1],
                vec![2; 100],
                vec![3; 255],
            ],
        }));
    }

    #[test]
    fn decode_simple() {
        let gif = [
            0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x02, 0x00, 0x02, 0x00, 0x80,
            0x01, 0x00, 0x00, 0x00, 0x00, 0xFF, 0xFF, 0xFF, 0x2C, 0x00, 0x00,
            0x00, 0x00, 0x02, 0x00, 0x02, 0x00, 0x00, 0x02, 0x03, 0x0C, 0x10,
            0x05, 0x00, 0x3B,
        ];
        let mut dec = Decoder::new_unbuffered(&gif[..]);
        let header = dec.read_header().unwrap();
        assert_eq!(header.version, *b"89a");
        assert_eq!(header.screen.width, 2);
        assert_eq!(header.screen.height, 2);
        assert_eq!(header.background_index, 1);
        assert_eq!(
            header.screen.palette,
            Some(vec![black(), white()])
        );
        match dec.read_block().unwrap() {
            Some(Block::Frame(frame)) => {
                assert_eq!(frame.image.rect(), Rect::new(0, 0, 2, 2));
                assert_eq!(frame.image.pix(), &[1, 0, 0, 1]);
            }
            b => panic!("expected frame, got {b:?}"),
        }
        assert!(dec.read_block().unwrap().is_none());
    }

    #[test]
    fn unknown_block() {
        let gif = [
            0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x00,
            0x00, 0x00, 0x42,
        ];
        let mut dec = Decoder::new_unbuffered(&gif[..]);
        dec.read_header().unwrap();
        match dec.read_block() {
            Err(Error::UnknownBlockType(0x42)) => (),
            r => panic!("expected unknown block type, got {r:?}"),
        }
    }

    #[test]
    fn truncated_stream() {
        let gif = [
            0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x00,
            0x00, 0x00, 0x21, 0xFE, 0x05, b'h', b'i',
        ];
        let mut dec = Decoder::new_unbuffered(&gif[..]);
        dec.read_header().unwrap();
        match dec.read_block() {
            Err(Error::Io("reading comment extension", _)) => (),
            r => panic!("expected read error, got {r:?}"),
        }
    }

    #[test]
    fn bad_signature() {
        let mut dec =
            Decoder::new_unbuffered(&b"JIF89a\x01\x00\x01\x00\x00\x00\x00"[..]);
        match dec.read_header() {
            Err(Error::MalformedHeader) => (),
            r => panic!("expected malformed header, got {r:?}"),
        }
        let mut dec = Decoder::new_unbuffered(&b"GIF88a\x01\x00\x01\x00\x00\x00\x00"[..]);
        match dec.read_header() {
            Err(Error::UnsupportedVersion(v)) => assert_eq!(v, *b"88a"),
            r => panic!("expected unsupported version, got {r:?}"),
        }
    }
}
