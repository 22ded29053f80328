use criterion::{black_box, criterion_group, criterion_main, Criterion};
use gifstream::block::{Block, DisposalMethod, Frame, Screen};
use gifstream::{Decoder, Encoder, Palette, Paletted, Rect};
use pix::rgb::SRgba8;

fn make_palette() -> Palette {
    (0..=255u8).map(|i| SRgba8::new(i, i, i, 255)).collect()
}

fn make_frames(palette: &Palette) -> Vec<Frame> {
    let mut frames = vec![];
    for n in 0..10u32 {
        let mut image = Paletted::new(Rect::new(0, 0, 64, 64), palette.clone());
        for y in 0..64 {
            for x in 0..64 {
                image.set_color_index(x, y, ((x + y * 3 + n * 7) % 256) as u8);
            }
        }
        frames.push(Frame {
            image,
            delay_time_cs: 4,
            disposal_method: DisposalMethod::Keep,
        });
    }
    frames
}

fn encode_gif(palette: &Palette, frames: &[Frame]) -> Vec<u8> {
    let mut data = Vec::with_capacity(32768);
    let mut enc = Encoder::new_unbuffered(&mut data);
    enc.write_header(
        Screen {
            width: 64,
            height: 64,
            palette: Some(palette.clone()),
        },
        0,
    )
    .unwrap();
    for frame in frames {
        enc.write_frame(black_box(frame)).unwrap();
    }
    enc.write_trailer().unwrap();
    enc.flush().unwrap();
    drop(enc);
    data
}

fn encode_frames(crit: &mut Criterion) {
    let palette = make_palette();
    let frames = make_frames(&palette);
    crit.bench_function("encode_frames", |b| {
        b.iter(|| black_box(encode_gif(&palette, &frames)))
    });
}

fn decode_blocks(crit: &mut Criterion) {
    let palette = make_palette();
    let frames = make_frames(&palette);
    let data = encode_gif(&palette, &frames);
    crit.bench_function("decode_blocks", |b| {
        b.iter(|| {
            let mut decoder = Decoder::new_unbuffered(black_box(&data[..]));
            decoder.read_header().unwrap();
            let mut frames = 0;
            for block in decoder.into_blocks() {
                if let Block::Frame(_) = block.unwrap() {
                    frames += 1;
                }
            }
            black_box(frames)
        })
    });
}

criterion_group!(benches, encode_frames, decode_blocks);
criterion_main!(benches);
