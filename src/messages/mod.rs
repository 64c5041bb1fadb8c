// src/messages/mod.rs
//
// Wire format of the draw protocol. Every frame is a JSON text message:
//
//   {"method":"init","params":{"w":W,"h":H,"p":"<W*H symbols>"}}
//   {"method":"draw","params":{"x":X,"y":Y,"w":W,"h":H,"p":"<W*H symbols>"}}
//
// Pixels are one symbol per cell, row-major, using `Color::symbol`.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::canvas::{Canvas, CanvasError, Color, Patch};


#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown method {0:?}")]
    UnknownMethod(String),
    #[error("method {0:?} is not accepted from clients")]
    UnexpectedMethod(&'static str),
}

/// A full-canvas encoding, sent as the params of an `init` message.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    pub w: u32,
    pub h: u32,
    pub p: String,
}

impl Snapshot {
    pub fn of(canvas: &Canvas) -> Self {
        Snapshot {
            w: canvas.width(),
            h: canvas.height(),
            p: encode_pixels(canvas.pixels()),
        }
    }

    pub fn to_canvas(&self) -> Result<Canvas, CanvasError> {
        Canvas::from_pixels(self.w, self.h, decode_pixels(&self.p))
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DrawParams {
    #[serde(default)]
    pub x: u32,
    #[serde(default)]
    pub y: u32,
    pub w: u32,
    pub h: u32,
    pub p: String,
}

impl DrawParams {
    pub fn to_patch(&self) -> Patch {
        Patch {
            x: self.x,
            y: self.y,
            width: self.w,
            height: self.h,
            pixels: decode_pixels(&self.p),
        }
    }
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "method", content = "params", rename_all = "lowercase")]
pub enum WireMessage {
    Init(Snapshot),
    Draw(DrawParams),
}

#[derive(Deserialize)]
struct RawMessage {
    method: String,
    #[serde(default)]
    params: Value,
}

impl WireMessage {
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let raw: RawMessage = serde_json::from_str(text)?;
        match raw.method.as_str() {
            "init" => Ok(WireMessage::Init(serde_json::from_value(raw.params)?)),
            "draw" => Ok(WireMessage::Draw(serde_json::from_value(raw.params)?)),
            _ => Err(ProtocolError::UnknownMethod(raw.method)),
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            WireMessage::Init(_) => "init",
            WireMessage::Draw(_) => "draw",
        }
    }
}

pub fn encode_pixels(pixels: &[Color]) -> String {
    pixels.iter().map(|color| color.symbol()).collect()
}

/// Symbols outside the palette decode as transparent, so they leave the
/// destination cell as it was.
pub fn decode_pixels(symbols: &str) -> Vec<Color> {
    symbols
        .chars()
        .map(|c| Color::from_symbol(c).unwrap_or(Color::Transparent))
        .collect()
}
