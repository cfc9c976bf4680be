/*
 *  display/render.rs
 *
 *  SpotiScreen - now playing, on the desk
 *  (c) 2020-26 Stuart Hunter
 *
 *  Now playing scene, laid out for the 480x320 landscape panel
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
use embedded_graphics::mono_font::iso_8859_1::{FONT_10X20, FONT_8X13, FONT_9X15, FONT_9X15_BOLD};
use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::pixelcolor::{Rgb565, Rgb888};
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{PrimitiveStyle, PrimitiveStyleBuilder, Rectangle};
use embedded_graphics::text::{Alignment, Baseline, Text, TextStyleBuilder};
use embedded_text::alignment::{HorizontalAlignment, VerticalAlignment};
use embedded_text::style::{HeightMode, TextBoxStyleBuilder, VerticalOverdraw};
use embedded_text::TextBox;

use crate::constants::*;
use crate::display::frame::DisplayFrame;
use crate::nowplaying::PlaybackState;

fn rgb(r: u8, g: u8, b: u8) -> Rgb565 {
    Rgb565::from(Rgb888::new(r, g, b))
}

// at most this many rows per text block
const ALBUM_ROWS: u32 = 3;
const TITLE_ROWS: u32 = 3;
const BADGE_SIZE: Size = Size::new(96, 30);

/// Turns a playback state into a frame. Holds no state of its own, so the
/// same input always yields the same pixels.
#[derive(Debug, Clone)]
pub struct Renderer {
    width: u32,
    height: u32,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(DISPLAY_WIDTH, DISPLAY_HEIGHT)
    }
}

impl Renderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn render(&self, state: &PlaybackState) -> DisplayFrame {
        let mut frame = DisplayFrame::new(self.width, self.height);
        if let Err(e) = self.draw_now_playing(&mut frame, state) {
            match e {}
        }
        frame
    }

    /// Shown when the account has nothing loaded and the panel stays on.
    pub fn render_idle(&self) -> DisplayFrame {
        let mut frame = DisplayFrame::new(self.width, self.height);
        let style = MonoTextStyle::new(&FONT_10X20, rgb(200, 200, 200));
        let centered = TextStyleBuilder::new()
            .alignment(Alignment::Center)
            .baseline(Baseline::Middle)
            .build();
        let at = Point::new(self.width as i32 / 2, self.height as i32 / 2);
        if let Err(e) = Text::with_text_style(IDLE_LABEL, at, style, centered).draw(&mut frame) {
            match e {}
        }
        frame.add_label(IDLE_LABEL);
        frame
    }

    fn draw_now_playing(&self, frame: &mut DisplayFrame, state: &PlaybackState) -> Result<(), Infallible> {
        let art_box = Rectangle::new(Point::zero(), Size::new(ART_SIZE, ART_SIZE));
        match &state.artwork {
            Some(art) => art.draw(frame, art_box.top_left)?,
            None => art_box
                .into_styled(PrimitiveStyle::with_fill(rgb(32, 32, 32)))
                .draw(frame)?,
        }

        let album_bottom = self.draw_album(frame, &state.album)?;
        let title_top = self.draw_title(frame, &state.title)?;
        self.draw_artist(frame, &state.artist, album_bottom + ALBUM_ARTIST_GAP, title_top)?;

        self.draw_progress(frame, state.progress_percent())?;
        self.draw_track_info(frame, state)?;

        if !state.is_playing {
            self.draw_paused_badge(frame, &art_box)?;
        }
        Ok(())
    }

    /// Album name in the top of the text column, returns its bottom edge.
    fn draw_album(&self, frame: &mut DisplayFrame, album: &str) -> Result<i32, Infallible> {
        let style = MonoTextStyle::new(&FONT_8X13, rgb(200, 200, 200));
        let bounds = Rectangle::new(
            Point::new(TEXT_COLUMN_X, ALBUM_Y),
            Size::new(TEXT_COLUMN_WIDTH, FONT_8X13.character_size.height * ALBUM_ROWS),
        );
        let tb_style = TextBoxStyleBuilder::new()
            .alignment(HorizontalAlignment::Left)
            .vertical_alignment(VerticalAlignment::Top)
            .height_mode(HeightMode::ShrinkToText(VerticalOverdraw::FullRowsOnly))
            .build();
        let text_box = TextBox::with_textbox_style(album, bounds, style, tb_style);
        let bottom = text_box.bounds.top_left.y + text_box.bounds.size.height as i32;
        text_box.draw(frame)?;
        frame.add_label(album);
        Ok(bottom)
    }

    /// Artist between the album and the title, clipped to whole rows.
    fn draw_artist(&self, frame: &mut DisplayFrame, artist: &str, top: i32, bottom: i32) -> Result<(), Infallible> {
        let rows = FONT_10X20.character_size.height as i32;
        if bottom - top < rows {
            return Ok(());
        }
        let style = MonoTextStyle::new(&FONT_10X20, Rgb565::WHITE);
        let bounds = Rectangle::new(
            Point::new(TEXT_COLUMN_X, top),
            Size::new(TEXT_COLUMN_WIDTH, (bottom - top) as u32),
        );
        let tb_style = TextBoxStyleBuilder::new()
            .alignment(HorizontalAlignment::Left)
            .vertical_alignment(VerticalAlignment::Top)
            .height_mode(HeightMode::Exact(VerticalOverdraw::FullRowsOnly))
            .build();
        TextBox::with_textbox_style(artist, bounds, style, tb_style).draw(frame)?;
        frame.add_label(artist);
        Ok(())
    }

    /// Title sitting on the art's bottom edge, returns its top edge.
    fn draw_title(&self, frame: &mut DisplayFrame, title: &str) -> Result<i32, Infallible> {
        let style = MonoTextStyle::new(&FONT_9X15_BOLD, Rgb565::WHITE);
        let max_height = FONT_9X15_BOLD.character_size.height * TITLE_ROWS;
        let measure = TextBoxStyleBuilder::new()
            .height_mode(HeightMode::FitToText)
            .build();
        let fitted = TextBox::with_textbox_style(
            title,
            Rectangle::new(Point::zero(), Size::new(TEXT_COLUMN_WIDTH, 0)),
            style,
            measure,
        );
        let height = fitted.bounds.size.height.min(max_height);

        let top = TITLE_BOTTOM_Y - height as i32;
        let bounds = Rectangle::new(Point::new(TEXT_COLUMN_X, top), Size::new(TEXT_COLUMN_WIDTH, height));
        let tb_style = TextBoxStyleBuilder::new()
            .alignment(HorizontalAlignment::Left)
            .vertical_alignment(VerticalAlignment::Bottom)
            .height_mode(HeightMode::Exact(VerticalOverdraw::FullRowsOnly))
            .build();
        TextBox::with_textbox_style(title, bounds, style, tb_style).draw(frame)?;
        frame.add_label(title);
        Ok(top)
    }

    fn draw_progress(&self, frame: &mut DisplayFrame, percent: f32) -> Result<(), Infallible> {
        let bar = Rectangle::new(Point::new(0, PROGRESS_BAR_Y), Size::new(self.width, PROGRESS_BAR_HEIGHT));
        bar.into_styled(PrimitiveStyle::with_fill(rgb(64, 64, 64))).draw(frame)?;
        let done = (self.width as f32 * percent / 100.0).round() as u32;
        if done > 0 {
            Rectangle::new(bar.top_left, Size::new(done.min(self.width), PROGRESS_BAR_HEIGHT))
                .into_styled(PrimitiveStyle::with_fill(Rgb565::WHITE))
                .draw(frame)?;
        }
        Ok(())
    }

    /// elapsed | n / total | duration
    fn draw_track_info(&self, frame: &mut DisplayFrame, state: &PlaybackState) -> Result<(), Infallible> {
        let style = MonoTextStyle::new(&FONT_9X15, rgb(200, 200, 200));
        let row = |alignment| TextStyleBuilder::new().alignment(alignment).baseline(Baseline::Top).build();

        let elapsed = state.elapsed();
        let duration = state.duration();
        let position = state.track_position();

        Text::with_text_style(&elapsed, Point::new(TRACK_INFO_MARGIN, TRACK_INFO_Y), style, row(Alignment::Left))
            .draw(frame)?;
        Text::with_text_style(
            &duration,
            Point::new(self.width as i32 - TRACK_INFO_MARGIN, TRACK_INFO_Y),
            style,
            row(Alignment::Right),
        )
        .draw(frame)?;
        Text::with_text_style(&position, Point::new(self.width as i32 / 2, TRACK_INFO_Y), style, row(Alignment::Center))
            .draw(frame)?;

        frame.add_label(&elapsed);
        frame.add_label(&position);
        frame.add_label(&duration);
        Ok(())
    }

    fn draw_paused_badge(&self, frame: &mut DisplayFrame, over: &Rectangle) -> Result<(), Infallible> {
        let badge = Rectangle::with_center(over.center(), BADGE_SIZE);
        badge
            .into_styled(
                PrimitiveStyleBuilder::new()
                    .fill_color(Rgb565::BLACK)
                    .stroke_color(Rgb565::WHITE)
                    .stroke_width(2)
                    .build(),
            )
            .draw(frame)?;
        let style = MonoTextStyle::new(&FONT_10X20, Rgb565::WHITE);
        let centered = TextStyleBuilder::new()
            .alignment(Alignment::Center)
            .baseline(Baseline::Middle)
            .build();
        Text::with_text_style(PAUSED_LABEL, badge.center(), style, centered).draw(frame)?;
        frame.add_label(PAUSED_LABEL);
        Ok(())
    }
}
