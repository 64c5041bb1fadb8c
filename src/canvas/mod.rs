// src/canvas/mod.rs
use bitvec::prelude::*;
use thiserror::Error;

mod actor;
#[cfg(test)]
mod tests;

pub use actor::{CanvasActor, CanvasHandle};

const SNAPSHOT_MAGIC: &[u8; 4] = b"CNV1";
const SNAPSHOT_HEADER_LEN: usize = 12;
const BITS_PER_CELL: usize = 2;

/// The fixed drawing palette. Extending it means adding a variant here and
/// a symbol in [`Color::symbol`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Color {
    #[default]
    Transparent,
    Black,
    White,
}

impl Color {
    pub const PALETTE: [Color; 3] = [Color::Transparent, Color::Black, Color::White];

    pub fn symbol(self) -> char {
        match self {
            Color::Transparent => '_',
            Color::Black => '0',
            Color::White => '1',
        }
    }

    pub fn from_symbol(c: char) -> Option<Color> {
        Color::PALETTE.into_iter().find(|color| color.symbol() == c)
    }

    pub fn rgba(self) -> [u8; 4] {
        match self {
            Color::Transparent => [0x00, 0x00, 0x00, 0x00],
            Color::Black => [0x00, 0x00, 0x00, 0xff],
            Color::White => [0xff, 0xff, 0xff, 0xff],
        }
    }

    fn code(self) -> u8 {
        match self {
            Color::Transparent => 0,
            Color::Black => 1,
            Color::White => 2,
        }
    }

    fn from_code(code: u8) -> Option<Color> {
        Color::PALETTE.into_iter().find(|color| color.code() == code)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CanvasError {
    #[error("patch {x},{y} {w}x{h} does not fit a {canvas_w}x{canvas_h} canvas")]
    OutOfBounds {
        x: u32,
        y: u32,
        w: u32,
        h: u32,
        canvas_w: u32,
        canvas_h: u32,
    },
    #[error("patch carries {actual} pixels, expected {expected}")]
    PixelCount { expected: usize, actual: usize },
    #[error("canvas actor is no longer running")]
    ActorGone,
    #[error("canvas actor queue is full")]
    Busy,
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot does not start with the expected header")]
    BadHeader,
    #[error("snapshot is {found_w}x{found_h}, canvas is configured as {expected_w}x{expected_h}")]
    DimensionMismatch {
        expected_w: u32,
        expected_h: u32,
        found_w: u32,
        found_h: u32,
    },
    #[error("snapshot holds {actual} bytes of pixel data, expected {expected}")]
    Length { expected: usize, actual: usize },
    #[error("snapshot cell {0} is not a palette color")]
    InvalidCell(usize),
    #[error("snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Canvas(#[from] CanvasError),
    #[error("PNG encoding failed: {0}")]
    Png(#[from] png::EncodingError),
}

/// A rectangular pixel update. Cells are row-major within the rectangle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Patch {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<Color>,
}

impl Patch {
    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Checks the patch against a canvas of the given size before it is applied.
    pub fn validate(&self, canvas_w: u32, canvas_h: u32) -> Result<(), CanvasError> {
        let fits_x = u64::from(self.x) + u64::from(self.width) <= u64::from(canvas_w);
        let fits_y = u64::from(self.y) + u64::from(self.height) <= u64::from(canvas_h);
        if !fits_x || !fits_y {
            return Err(CanvasError::OutOfBounds {
                x: self.x,
                y: self.y,
                w: self.width,
                h: self.height,
                canvas_w,
                canvas_h,
            });
        }

        if self.pixels.len() != self.area() {
            return Err(CanvasError::PixelCount {
                expected: self.area(),
                actual: self.pixels.len(),
            });
        }

        Ok(())
    }
}

/// The canonical pixel grid. Only the canvas actor holds the live instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Canvas {
    width: u32,
    height: u32,
    cells: Vec<Color>,
}

impl Canvas {
    /// A blank canvas is all white.
    pub fn new(width: u32, height: u32) -> Self {
        Canvas::filled(width, height, Color::White)
    }

    pub fn filled(width: u32, height: u32, color: Color) -> Self {
        Canvas {
            width,
            height,
            cells: vec![color; width as usize * height as usize],
        }
    }

    pub fn from_pixels(width: u32, height: u32, cells: Vec<Color>) -> Result<Self, CanvasError> {
        let expected = width as usize * height as usize;
        if cells.len() != expected {
            return Err(CanvasError::PixelCount {
                expected,
                actual: cells.len(),
            });
        }
        Ok(Canvas { width, height, cells })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[Color] {
        &self.cells
    }

    #[cfg(test)]
    pub fn get(&self, x: u32, y: u32) -> Option<Color> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.cells.get(self.index(x, y)).copied()
    }

    /// Draws the patch over the grid. Transparent cells leave the grid untouched,
    /// every other cell replaces what is underneath.
    pub fn apply(&mut self, patch: &Patch) -> Result<(), CanvasError> {
        patch.validate(self.width, self.height)?;

        if patch.width == 0 {
            return Ok(());
        }

        for (row, line) in patch.pixels.chunks_exact(patch.width as usize).enumerate() {
            let start = self.index(patch.x, patch.y + row as u32);
            let dest = &mut self.cells[start..start + line.len()];
            for (cell, &color) in dest.iter_mut().zip(line) {
                if color != Color::Transparent {
                    *cell = color;
                }
            }
        }

        Ok(())
    }

    /// Packs the grid for persistence: header, then two bits per cell.
    pub fn export(&self) -> Vec<u8> {
        let mut bits: BitVec<u8, Msb0> = BitVec::with_capacity(self.cells.len() * BITS_PER_CELL);
        for color in &self.cells {
            let code = color.code();
            bits.push(code & 0b10 != 0);
            bits.push(code & 0b01 != 0);
        }

        bits.set_uninitialized(false);

        let mut bytes = Vec::with_capacity(SNAPSHOT_HEADER_LEN + bits.len() / 8 + 1);
        bytes.extend_from_slice(SNAPSHOT_MAGIC);
        bytes.extend_from_slice(&self.width.to_be_bytes());
        bytes.extend_from_slice(&self.height.to_be_bytes());
        bytes.extend(bits.into_vec());
        bytes
    }

    /// Renders the grid as an 8-bit RGBA PNG.
    pub fn to_png(&self) -> Result<Vec<u8>, SnapshotError> {
        let rgba: Vec<u8> = self.cells.iter().flat_map(|color| color.rgba()).collect();

        let mut result = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut result, self.width, self.height);
            encoder.set_color(png::ColorType::Rgba);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder.write_header()?;
            writer.write_image_data(&rgba)?;
            writer.finish()?;
        }
        Ok(result)
    }

    /// Restores a grid written by [`Canvas::export`]. The persisted size must
    /// match the configured one.
    pub fn load(bytes: &[u8], width: u32, height: u32) -> Result<Self, SnapshotError> {
        if bytes.len() < SNAPSHOT_HEADER_LEN || &bytes[..4] != SNAPSHOT_MAGIC {
            return Err(SnapshotError::BadHeader);
        }

        let found_w = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let found_h = u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        if found_w != width || found_h != height {
            return Err(SnapshotError::DimensionMismatch {
                expected_w: width,
                expected_h: height,
                found_w,
                found_h,
            });
        }

        let cell_count = width as usize * height as usize;
        let expected = (cell_count * BITS_PER_CELL).div_ceil(8);
        let body = &bytes[SNAPSHOT_HEADER_LEN..];
        if body.len() != expected {
            return Err(SnapshotError::Length {
                expected,
                actual: body.len(),
            });
        }

        let bits = body.view_bits::<Msb0>();
        let cells = bits
            .chunks_exact(BITS_PER_CELL)
            .take(cell_count)
            .enumerate()
            .map(|(index, pair)| {
                let code = (u8::from(pair[0]) << 1) | u8::from(pair[1]);
                Color::from_code(code).ok_or(SnapshotError::InvalidCell(index))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Canvas { width, height, cells })
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }
}
