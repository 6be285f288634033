//! Clock face effects as a fixed pipeline of independent stages.
//!
//! Every frame passes through layout, then per-character recoloring, then
//! per-character motion. An effect is just a choice of stage for each slot.

use serde::{Deserialize, Serialize};

/// Number of selectable effects.
pub const EFFECT_COUNT: u8 = 4;

/// Width of the LED matrix in pixels.
pub const DISPLAY_WIDTH: i32 = 53;
/// Height of the LED matrix in pixels.
pub const DISPLAY_HEIGHT: i32 = 11;
/// Width of one glyph cell of the clock font.
pub const GLYPH_WIDTH: i32 = 5;

/// 24-bit colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const GREY: Rgb = Rgb::new(100, 100, 100);
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);
    pub const RED: Rgb = Rgb::new(255, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Fully saturated colour for a hue in [0, 1).
    pub fn from_hue(hue: f64) -> Self {
        let h = hue.rem_euclid(1.0) * 6.0;
        let sector = h.floor() as u8;
        let f = h - h.floor();
        let rise = (f * 255.0).round() as u8;
        let fall = 255 - rise;

        match sector {
            0 => Rgb::new(255, rise, 0),
            1 => Rgb::new(fall, 255, 0),
            2 => Rgb::new(0, 255, rise),
            3 => Rgb::new(0, fall, 255),
            4 => Rgb::new(rise, 0, 255),
            _ => Rgb::new(255, 0, fall),
        }
    }
}

/// One positioned character of the clock face.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Glyph {
    pub ch: char,
    pub x: i32,
    pub y: i32,
    pub color: Rgb,
}

/// A fully composed frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    pub glyphs: Vec<Glyph>,
}

impl Frame {
    /// Characters of the frame in order.
    pub fn text(&self) -> String {
        self.glyphs.iter().map(|g| g.ch).collect()
    }
}

/// Per-character recoloring stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recolor {
    /// Fixed grey/white digits with red separators
    Palette,
    /// One hue per character, drifting each frame
    RainbowChar,
    /// Hue follows the horizontal pixel position, drifting each frame
    RainbowPixel,
}

/// Per-character motion stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Motion {
    None,
    /// Changed characters drop in from above
    SlideDown,
    /// The whole face sways left and right
    Move,
}

/// Frames a changed character takes to slide into place.
const SLIDE_FRAMES: u32 = DISPLAY_HEIGHT as u32;
/// Horizontal amplitude of the sway motion.
const MOVE_AMPLITUDE: i32 = 2;

/// Ordered stage selection for one effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectPipeline {
    pub recolor: Recolor,
    pub motion: Motion,
}

impl EffectPipeline {
    /// Preset for an effect index, wrapped into range.
    pub fn for_index(index: u8) -> Self {
        match index % EFFECT_COUNT {
            0 => Self {
                recolor: Recolor::Palette,
                motion: Motion::None,
            },
            1 => Self {
                recolor: Recolor::RainbowChar,
                motion: Motion::SlideDown,
            },
            2 => Self {
                recolor: Recolor::RainbowPixel,
                motion: Motion::SlideDown,
            },
            _ => Self {
                recolor: Recolor::RainbowChar,
                motion: Motion::Move,
            },
        }
    }

    /// Compose one frame of `text`.
    ///
    /// `origin_x` is where the first glyph starts, `spacing` yields the extra
    /// gap after each glyph index, and `changed_at` tells the motion stage
    /// how many frames ago each character last changed.
    pub fn compose(
        &self,
        text: &str,
        origin_x: i32,
        spacing: impl Fn(usize, char) -> i32,
        frame_index: u32,
        changed_at: &[u32],
    ) -> Frame {
        let mut glyphs = layout(text, origin_x, spacing);

        for (index, glyph) in glyphs.iter_mut().enumerate() {
            glyph.color = self.recolor_glyph(index, glyph, frame_index);
        }

        for (index, glyph) in glyphs.iter_mut().enumerate() {
            let age = changed_at
                .get(index)
                .map(|changed| frame_index.saturating_sub(*changed))
                .unwrap_or(u32::MAX);
            self.move_glyph(glyph, age, frame_index);
        }

        Frame { glyphs }
    }

    fn recolor_glyph(&self, index: usize, glyph: &Glyph, frame_index: u32) -> Rgb {
        let drift = f64::from(frame_index % 360) / 360.0;
        match self.recolor {
            Recolor::Palette => {
                if glyph.ch == ':' {
                    Rgb::RED
                } else if index % 3 == 0 {
                    Rgb::GREY
                } else {
                    Rgb::WHITE
                }
            }
            Recolor::RainbowChar => Rgb::from_hue(index as f64 / 8.0 + drift),
            Recolor::RainbowPixel => {
                Rgb::from_hue(f64::from(glyph.x) / f64::from(DISPLAY_WIDTH) + drift)
            }
        }
    }

    fn move_glyph(&self, glyph: &mut Glyph, age: u32, frame_index: u32) {
        match self.motion {
            Motion::None => {}
            Motion::SlideDown => {
                if age < SLIDE_FRAMES {
                    glyph.y -= (SLIDE_FRAMES - age) as i32;
                }
            }
            Motion::Move => {
                let phase = (frame_index / 4) % 4;
                glyph.x += match phase {
                    0 => 0,
                    1 => MOVE_AMPLITUDE,
                    2 => 0,
                    _ => -MOVE_AMPLITUDE,
                };
            }
        }
    }
}

/// Layout stage: place glyphs left to right starting at `origin_x`.
pub fn layout(text: &str, origin_x: i32, spacing: impl Fn(usize, char) -> i32) -> Vec<Glyph> {
    let mut x = origin_x;
    text.chars()
        .enumerate()
        .map(|(index, ch)| {
            let glyph = Glyph {
                ch,
                x,
                y: 0,
                color: Rgb::WHITE,
            };
            x += glyph_width(ch) + spacing(index, ch);
            glyph
        })
        .collect()
}

/// Pixel width of a character in the clock font.
pub fn glyph_width(ch: char) -> i32 {
    if ch == ':' {
        1
    } else {
        GLYPH_WIDTH
    }
}

/// Total pixel width of `text` with the given spacing.
pub fn text_width(text: &str, spacing: impl Fn(usize, char) -> i32) -> i32 {
    text.chars()
        .enumerate()
        .map(|(index, ch)| glyph_width(ch) + spacing(index, ch))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_spacing(_: usize, _: char) -> i32 {
        0
    }

    #[test]
    fn test_presets_cover_effect_count() {
        assert_eq!(EffectPipeline::for_index(0).recolor, Recolor::Palette);
        assert_eq!(EffectPipeline::for_index(1).motion, Motion::SlideDown);
        assert_eq!(EffectPipeline::for_index(2).recolor, Recolor::RainbowPixel);
        assert_eq!(EffectPipeline::for_index(3).motion, Motion::Move);
        assert_eq!(EffectPipeline::for_index(EFFECT_COUNT), EffectPipeline::for_index(0));
    }

    #[test]
    fn test_layout_advances_by_width_and_spacing() {
        let glyphs = layout("12:3", 10, |_, _| 1);
        let xs: Vec<i32> = glyphs.iter().map(|g| g.x).collect();
        assert_eq!(xs, vec![10, 16, 22, 24]);
        assert_eq!(text_width("12:3", |_, _| 1), 20);
    }

    #[test]
    fn test_palette_colors_separators_red() {
        let frame = EffectPipeline::for_index(0).compose("12:34", 0, no_spacing, 0, &[]);
        assert_eq!(frame.text(), "12:34");
        assert_eq!(frame.glyphs[2].color, Rgb::RED);
        assert_eq!(frame.glyphs[0].color, Rgb::GREY);
        assert_eq!(frame.glyphs[1].color, Rgb::WHITE);
    }

    #[test]
    fn test_slide_down_only_moves_recent_changes() {
        let pipeline = EffectPipeline::for_index(1);
        let frame = pipeline.compose("12", 0, no_spacing, 20, &[0, 18]);
        assert_eq!(frame.glyphs[0].y, 0);
        assert!(frame.glyphs[1].y < 0);
    }

    #[test]
    fn test_hue_wheel_primaries() {
        assert_eq!(Rgb::from_hue(0.0), Rgb::new(255, 0, 0));
        assert_eq!(Rgb::from_hue(1.0 / 3.0), Rgb::new(0, 255, 0));
        assert_eq!(Rgb::from_hue(2.0 / 3.0), Rgb::new(0, 0, 255));
    }
}
