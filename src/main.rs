// main.rs      gifstream command
//
// Copyright (c) 2025  Douglas Lau
//
#![forbid(unsafe_code)]

use gifstream::block::{Block, DisposalMethod, Frame};
use gifstream::Decoder;
use pix::el::Pixel;
use std::env;
use std::error::Error;
use std::fs::File;
use std::io::Write;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

fn main() -> Result<(), Box<dyn Error>> {
    let mut out = StandardStream::stdout(ColorChoice::Always);
    let mut red = ColorSpec::new();
    red.set_fg(Some(Color::Red)).set_intense(true);
    if let Some(path) = env::args().nth(1) {
        show(&mut out, &path)?;
    } else {
        let cmd = env::args().next().unwrap_or_default();
        out.set_color(&red)?;
        writeln!(out, "usage: {cmd} [filename]")?;
    }
    out.reset()?;
    Ok(())
}

fn show(out: &mut StandardStream, path: &str) -> Result<(), Box<dyn Error>> {
    let mut magenta = ColorSpec::new();
    magenta.set_fg(Some(Color::Magenta));
    let mut yellow = ColorSpec::new();
    yellow.set_fg(Some(Color::Yellow)).set_intense(true);
    let mut cyan = ColorSpec::new();
    cyan.set_fg(Some(Color::Cyan)).set_intense(true);
    let mut bold = ColorSpec::new();
    bold.set_fg(Some(Color::White))
        .set_intense(true)
        .set_bold(true);
    let mut decoder = Decoder::new(File::open(path)?);
    let header = decoder.read_header()?;
    let mut frames = vec![];
    let mut comments = vec![];
    let mut loop_count = None;
    for block in decoder.into_blocks() {
        match block? {
            Block::Frame(frame) => frames.push(frame),
            Block::Comment(comment) => {
                for c in &comment.strings {
                    for line in String::from_utf8_lossy(c).split('\n') {
                        let line = line.trim();
                        if !line.is_empty() {
                            comments.push(line.to_string());
                        }
                    }
                }
            }
            Block::ApplicationNetscape(an) => {
                loop_count = Some(an.loop_count);
            }
            _ => (),
        }
    }
    out.set_color(&magenta)?;
    writeln!(out, "{path}")?;
    out.set_color(&bold)?;
    let version = String::from_utf8_lossy(&header.version).to_string();
    write!(
        out,
        "GIF{version}, {}x{}, frames: {}",
        header.screen.width,
        header.screen.height,
        frames.len()
    )?;
    match loop_count {
        Some(0) => write!(out, ", repeat: \u{221E}")?,
        Some(c) if c > 0 => write!(out, ", repeat: {c}")?,
        _ => (),
    }
    writeln!(out)?;
    out.set_color(&cyan)?;
    for c in comments {
        writeln!(out, "  # {c}")?;
    }
    out.set_color(&yellow)?;
    writeln!(out, " Fr#  Delay Disp    Size     X,Y Clrs Trn")?;
    for (n, frame) in frames.iter().enumerate() {
        write_frame(out, frame, n)?;
    }
    Ok(())
}

fn write_frame(
    out: &mut StandardStream,
    frame: &Frame,
    number: usize,
) -> Result<(), Box<dyn Error>> {
    let mut dflt = ColorSpec::new();
    dflt.set_fg(Some(Color::White));
    let mut bold = ColorSpec::new();
    bold.set_fg(Some(Color::White))
        .set_intense(true)
        .set_bold(true);
    out.set_color(&bold)?;
    write!(out, "{number:>4}")?;
    let delay = frame.delay_time_cs;
    if delay == 0 {
        out.set_color(&dflt)?;
    }
    write!(out, " {:6.2}", f32::from(delay) / 100.0)?;
    let disp = match frame.disposal_method {
        DisposalMethod::NoAction => "none",
        DisposalMethod::Keep => "keep",
        DisposalMethod::Background => "bg",
        DisposalMethod::Previous => "prev",
        DisposalMethod::Reserved(_) => "res",
    };
    out.set_color(match frame.disposal_method {
        DisposalMethod::NoAction => &dflt,
        _ => &bold,
    })?;
    write!(out, " {disp:>4}")?;
    let rect = frame.image.rect();
    out.set_color(&dflt)?;
    write!(
        out,
        " {:>7}",
        format!("{}x{}", rect.width(), rect.height())
    )?;
    write!(out, " {:>7}", format!("{},{}", rect.min_x, rect.min_y))?;
    write!(out, " {:>4}", frame.image.palette().len())?;
    let transparent = frame
        .image
        .palette()
        .iter()
        .position(|clr| u8::from(clr.alpha()) == 0);
    match transparent {
        Some(idx) => {
            out.set_color(&bold)?;
            writeln!(out, " {idx:>3}")?;
        }
        None => writeln!(out, "   -")?,
    }
    Ok(())
}
