use image::RgbImage;

/// Placement of the informational overlay on the output frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OverlayRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Draws a fixed informational overlay onto the composited frame.
///
/// The pipeline invokes this once per produced frame, after the blend. It
/// does not inspect or validate what gets drawn; content (profile text,
/// branding) is the host's business and must be handed to the implementation
/// up front rather than looked up from ambient state.
pub trait OverlayRenderer {
    fn draw(&self, canvas: &mut RgbImage, region: OverlayRegion);
}

/// Overlay that draws nothing.
pub struct NoOverlay;

impl OverlayRenderer for NoOverlay {
    fn draw(&self, _canvas: &mut RgbImage, _region: OverlayRegion) {}
}

/// Translucent card backing for a name/title overlay, with an accent bar on
/// the left edge. Glyph rasterization is left to hosts that carry a font
/// stack; this renders the card itself.
pub struct InfoCard {
    accent: [u8; 3],
}

impl InfoCard {
    pub fn new(accent: [u8; 3]) -> Self {
        Self { accent }
    }
}

const CARD_DIM_NUM: u16 = 88;
const ACCENT_BAR_WIDTH: u32 = 6;

impl OverlayRenderer for InfoCard {
    fn draw(&self, canvas: &mut RgbImage, region: OverlayRegion) {
        let (cw, ch) = canvas.dimensions();
        let x1 = region.x.min(cw);
        let y1 = region.y.min(ch);
        let x2 = (region.x + region.width).min(cw);
        let y2 = (region.y + region.height).min(ch);

        for y in y1..y2 {
            for x in x1..x2 {
                let px = canvas.get_pixel_mut(x, y);
                if x < x1 + ACCENT_BAR_WIDTH {
                    px.0 = self.accent;
                } else {
                    for c in px.0.iter_mut() {
                        *c = (u16::from(*c) * CARD_DIM_NUM / 255) as u8;
                    }
                }
            }
        }
    }
}
