// optimize.rs
//
// Copyright (c) 2025  Douglas Lau
//
//! Inter-frame optimization for animations
use crate::error::{Error, Result};
use crate::image::{Paletted, Rect};

/// Inter-frame optimizer.
///
/// Compares each frame with the previous one and replaces identical pixels
/// with the transparent palette index, then crops to the smallest rectangle
/// containing the changed pixels.  Composited over the previous frame with
/// the `Keep` disposal method, the optimized frame renders identically.
pub struct Optimizer {
    /// Mirror of the animation so far
    mirror: Option<Paletted>,
    /// Transparent palette index
    transparent_index: u8,
}

/// Optimize a slice of animation frames in order.
///
/// Slices with fewer than two frames are left unchanged.
pub fn optimize_all(
    images: &mut [Paletted],
    transparent_index: u8,
) -> Result<()> {
    if images.len() < 2 {
        return Ok(());
    }
    let mut optimizer = Optimizer::new(transparent_index);
    for image in images.iter_mut() {
        *image = optimizer.optimize(std::mem::take(image))?;
    }
    Ok(())
}

impl Optimizer {
    /// Create a new optimizer with the given transparent palette index
    pub fn new(transparent_index: u8) -> Self {
        Optimizer {
            mirror: None,
            transparent_index,
        }
    }

    /// Optimize one frame.
    ///
    /// The first frame initializes the mirror and is returned unchanged.
    /// Later frames must be contained in the mirror bounds; unchanged
    /// pixels are replaced with the transparent index and the returned
    /// image is cropped to the changed region.  When nothing changed, a
    /// 1x1 sub-image at the frame origin is returned.
    pub fn optimize(&mut self, mut pm: Paletted) -> Result<Paletted> {
        if self.mirror.is_none() {
            self.mirror = Some(mirror_of(&pm));
            return Ok(pm);
        }
        let mirror = self.mirror.as_mut().unwrap();
        if !mirror.rect().contains(pm.rect()) {
            return Err(Error::ImageOutsideBounds);
        }
        let crop = if pm.rect() == mirror.rect()
            && pm.pix().len() == mirror.pix().len()
        {
            // fast path that directly optimizes the raw pixels
            optimize_by_pix(mirror, &mut pm, self.transparent_index)
        } else {
            optimize_by_line(mirror, &mut pm, self.transparent_index)
        };
        let crop = if crop.is_empty() {
            let rect = pm.rect();
            Rect::new(rect.min_x, rect.min_y, rect.min_x + 1, rect.min_y + 1)
        } else {
            // a run ending at the buffer end unions one row too many
            crop.intersect(pm.rect())
        };
        if crop != pm.rect() {
            pm = pm.sub_image(crop);
        }
        Ok(pm)
    }
}

/// Clone a frame into a tightly-strided mirror
fn mirror_of(pm: &Paletted) -> Paletted {
    let mut mirror = Paletted::new(pm.rect(), pm.palette().to_vec());
    let width = pm.width() as usize;
    for y in 0..pm.height() as usize {
        let i = y * width;
        let j = y * pm.stride();
        mirror.pix_mut()[i..i + width]
            .copy_from_slice(&pm.pix()[j..j + width]);
    }
    mirror
}

/// Optimize a frame sharing rectangle and stride with the mirror.
///
/// Walks the linear pixel buffers, tracking runs of pixels which are the
/// same as the mirror (or already transparent).  Same runs are overwritten
/// with the transparent index; changed runs are copied into the mirror and
/// their rectangle unioned into the crop.
fn optimize_by_pix(
    mirror: &mut Paletted,
    pm: &mut Paletted,
    transparent: u8,
) -> Rect {
    let stride = pm.stride();
    let min_x = pm.rect().min_x;
    let min_y = pm.rect().min_y;
    let len = pm.pix().len();
    let mut crop = Rect::default();
    if len == 0 {
        return crop;
    }
    let mut same =
        pm.pix()[0] == mirror.pix()[0] || pm.pix()[0] == transparent;
    let (mut i0, mut x0, mut y0) = (0, 0, 0);
    for i in 1..=len {
        if i < len
            && (pm.pix()[i] == mirror.pix()[i] || pm.pix()[i] == transparent)
                == same
        {
            continue;
        }
        let x = i % stride;
        let y = i / stride;
        if same {
            pm.pix_mut()[i0..i].fill(transparent);
        } else {
            mirror.pix_mut()[i0..i].copy_from_slice(&pm.pix()[i0..i]);
            let r = if y > y0 {
                // the run spans a line break; union full lines
                Rect::new(
                    min_x,
                    min_y + y0 as u32,
                    min_x + stride as u32,
                    min_y + y as u32 + 1,
                )
            } else {
                Rect::new(
                    min_x + x0 as u32,
                    min_y + y0 as u32,
                    min_x + x as u32,
                    min_y + y as u32 + 1,
                )
            };
            crop = crop.union(r);
        }
        same = !same;
        (i0, x0, y0) = (i, x, y);
    }
    crop
}

/// Optimize a sub-image frame line by line.
///
/// The same run logic as the fast path, restarted on every line, with
/// separate mirror and frame buffer offsets.
fn optimize_by_line(
    mirror: &mut Paletted,
    pm: &mut Paletted,
    transparent: u8,
) -> Rect {
    let mut crop = Rect::default();
    let rect = pm.rect();
    for y in rect.min_y..rect.max_y {
        let mut i = mirror.pix_offset(rect.min_x, y);
        let mut j = pm.pix_offset(rect.min_x, y);
        let mut same = false;
        let (mut i0, mut j0, mut x0) = (i, j, rect.min_x);
        for x in rect.min_x..=rect.max_x {
            if x == rect.min_x {
                same = pm.pix()[j] == mirror.pix()[i]
                    || pm.pix()[j] == transparent;
                (i0, j0) = (i, j);
            } else if x == rect.max_x
                || (pm.pix()[j] == mirror.pix()[i]
                    || pm.pix()[j] == transparent)
                    != same
            {
                if same {
                    pm.pix_mut()[j0..j].fill(transparent);
                } else {
                    mirror.pix_mut()[i0..i]
                        .copy_from_slice(&pm.pix()[j0..j]);
                    crop = crop.union(Rect::new(x0, y, x, y + 1));
                }
                same = !same;
                (i0, j0, x0) = (i, j, x);
            }
            i += 1;
            j += 1;
        }
    }
    crop
}
