/*
 *  vframebuf.rs
 *
 *  SpotiScreen - now playing, on the desk
 *  (c) 2020-26 Stuart Hunter
 *
 *  Runtime sized framebuffer with change tracking
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use core::convert::Infallible;
use embedded_graphics::geometry::{OriginDimensions, Size};
use embedded_graphics::pixelcolor::PixelColor;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;

/// A runtime-sized framebuffer for embedded-graphics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarFrameBuf<C: PixelColor> {
    buf: Vec<C>,
    w: usize,
    h: usize,
}

impl<C: PixelColor> VarFrameBuf<C> {
    pub fn new(width: u32, height: u32, fill: C) -> Self {
        let (w, h) = (width as usize, height as usize);
        Self { buf: vec![fill; w * h], w, h }
    }

    pub fn width(&self) -> usize { self.w }
    pub fn height(&self) -> usize { self.h }

    pub fn as_slice(&self) -> &[C] { &self.buf }

    pub fn clear_color(&mut self, color: C) {
        self.buf.fill(color);
    }

    pub fn bounds(&self) -> Rectangle {
        Rectangle::new(Point::zero(), self.size())
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<C> {
        self.idx(Point::new(x as i32, y as i32)).map(|i| self.buf[i])
    }

    /// Map (x,y) to linear index; returns None if out of bounds
    #[inline]
    fn idx(&self, p: Point) -> Option<usize> {
        if p.x >= 0 && p.y >= 0 {
            let (x, y) = (p.x as usize, p.y as usize);
            if x < self.w && y < self.h {
                return Some(y * self.w + x);
            }
        }
        None
    }

    /// Smallest rectangle covering every pixel that differs from `other`.
    ///
    /// `None` when both buffers are identical; the full bounds when the
    /// sizes don't match.
    pub fn changed_bounds(&self, other: &VarFrameBuf<C>) -> Option<Rectangle> {
        if self.w != other.w || self.h != other.h {
            return Some(self.bounds());
        }
        let (mut x0, mut y0, mut x1, mut y1) = (usize::MAX, usize::MAX, 0usize, 0usize);
        for (y, (row, prev)) in self.buf.chunks(self.w.max(1)).zip(other.buf.chunks(self.w.max(1))).enumerate() {
            let Some(first) = row.iter().zip(prev).position(|(a, b)| a != b) else { continue };
            // a differing pixel exists, so rposition finds one too
            let last = row.iter().zip(prev).rposition(|(a, b)| a != b).unwrap_or(first);
            x0 = x0.min(first);
            x1 = x1.max(last);
            y0 = y0.min(y);
            y1 = y;
        }
        if x0 == usize::MAX {
            return None;
        }
        Some(Rectangle::new(
            Point::new(x0 as i32, y0 as i32),
            Size::new((x1 - x0 + 1) as u32, (y1 - y0 + 1) as u32),
        ))
    }

    /// Pixels of `area` row by row, clipped to the buffer.
    pub fn region(&self, area: &Rectangle) -> impl Iterator<Item = C> + '_ {
        let area = area.intersection(&self.bounds());
        let (x0, y0) = (area.top_left.x as usize, area.top_left.y as usize);
        let (w, h) = (area.size.width as usize, area.size.height as usize);
        (y0..y0 + h).flat_map(move |y| self.buf[y * self.w + x0..y * self.w + x0 + w].iter().copied())
    }
}

impl<C: PixelColor> OriginDimensions for VarFrameBuf<C> {
    fn size(&self) -> Size {
        Size::new(self.w as u32, self.h as u32)
    }
}

impl<C: PixelColor> DrawTarget for VarFrameBuf<C> {
    type Color = C;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(p, c) in pixels {
            if let Some(i) = self.idx(p) {
                self.buf[i] = c;
            }
        }
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        self.clear_color(color);
        Ok(())
    }

    fn fill_contiguous<I>(&mut self, area: &Rectangle, colors: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Self::Color>,
    {
        // colors arrive for the whole area, drop the ones that fall outside
        let mut it = colors.into_iter();
        for p in area.points() {
            let Some(c) = it.next() else { return Ok(()) };
            if let Some(i) = self.idx(p) {
                self.buf[i] = c;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_graphics::pixelcolor::Rgb565;
    use embedded_graphics::primitives::PrimitiveStyle;

    #[test]
    fn test_identical_buffers_have_no_changes() {
        let a = VarFrameBuf::new(16, 8, Rgb565::BLACK);
        assert_eq!(a.changed_bounds(&a.clone()), None);
    }

    #[test]
    fn test_changed_bounds_covers_all_changes() {
        let a = VarFrameBuf::new(16, 8, Rgb565::BLACK);
        let mut b = a.clone();
        b.draw_iter([Pixel(Point::new(3, 2), Rgb565::RED), Pixel(Point::new(9, 5), Rgb565::RED)]).unwrap();
        let r = b.changed_bounds(&a).unwrap();
        assert_eq!(r, Rectangle::new(Point::new(3, 2), Size::new(7, 4)));
    }

    #[test]
    fn test_size_mismatch_is_full_change() {
        let a = VarFrameBuf::new(16, 8, Rgb565::BLACK);
        let b = VarFrameBuf::new(8, 8, Rgb565::BLACK);
        assert_eq!(a.changed_bounds(&b), Some(a.bounds()));
    }

    #[test]
    fn test_fill_clips_to_buffer() {
        let mut fb = VarFrameBuf::new(4, 4, Rgb565::BLACK);
        Rectangle::new(Point::new(-2, 2), Size::new(4, 4))
            .into_styled(PrimitiveStyle::with_fill(Rgb565::WHITE))
            .draw(&mut fb)
            .unwrap();
        assert_eq!(fb.pixel(0, 2), Some(Rgb565::WHITE));
        assert_eq!(fb.pixel(1, 3), Some(Rgb565::WHITE));
        assert_eq!(fb.pixel(2, 2), Some(Rgb565::BLACK));
        assert_eq!(fb.pixel(0, 1), Some(Rgb565::BLACK));
    }

    #[test]
    fn test_region_reads_rows() {
        let mut fb = VarFrameBuf::new(4, 4, Rgb565::BLACK);
        fb.draw_iter([Pixel(Point::new(1, 1), Rgb565::RED), Pixel(Point::new(2, 2), Rgb565::BLUE)]).unwrap();
        let px: Vec<_> = fb.region(&Rectangle::new(Point::new(1, 1), Size::new(2, 2))).collect();
        assert_eq!(px, vec![Rgb565::RED, Rgb565::BLACK, Rgb565::BLACK, Rgb565::BLUE]);
        // partly outside
        assert_eq!(fb.region(&Rectangle::new(Point::new(3, 3), Size::new(5, 5))).count(), 1);
    }
}
