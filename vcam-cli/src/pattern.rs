//! Moving test patterns

use clap::ValueEnum;
use vcam_core::FrameBuffer;

/// SMPTE-like bar colours, BGR
const BARS: [[u8; 3]; 8] = [
    [255, 255, 255],
    [0, 255, 255],
    [255, 255, 0],
    [0, 255, 0],
    [255, 0, 255],
    [0, 0, 255],
    [255, 0, 0],
    [0, 0, 0],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Pattern {
    /// Vertical colour bars scrolling sideways
    Bars,
    /// Two-axis gradient with a pulsing red channel
    Gradient,
    /// Whole frame cycling through the bar colours
    Solid,
}

impl Pattern {
    /// Draw frame number `n` into `image`
    pub fn render(&self, image: &mut FrameBuffer, n: u64) {
        let (width, height) = (image.width() as u64, image.height() as u64);
        match self {
            Self::Bars => {
                let offset = n * 4;
                for y in 0..height {
                    for x in 0..width {
                        let bar = ((x + offset) % width) * 8 / width;
                        image.set_pixel(x as u32, y as u32, BARS[bar as usize]);
                    }
                }
            }
            Self::Gradient => {
                let red = ((n * 4) % 256) as u8;
                for y in 0..height {
                    let green = (y * 255 / height.max(1)) as u8;
                    for x in 0..width {
                        let blue = (x * 255 / width.max(1)) as u8;
                        image.set_pixel(x as u32, y as u32, [blue, green, red]);
                    }
                }
            }
            Self::Solid => image.fill(BARS[((n / 30) % 8) as usize]),
        }
    }
}

impl std::fmt::Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Bars => "bars",
            Self::Gradient => "gradient",
            Self::Solid => "solid",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bars_scroll() {
        let mut a = FrameBuffer::new(16, 2).unwrap();
        let mut b = FrameBuffer::new(16, 2).unwrap();
        Pattern::Bars.render(&mut a, 0);
        Pattern::Bars.render(&mut b, 1);
        assert_eq!(a.pixel(0, 0), Some(BARS[0]));
        assert_ne!(a, b);
    }

    #[test]
    fn test_solid_fills_frame() {
        let mut image = FrameBuffer::new(4, 4).unwrap();
        Pattern::Solid.render(&mut image, 30);
        assert_eq!(image.pixel(3, 3), Some(BARS[1]));
    }
}
