//! Frame source: one JSON object per line, produced by an external hand
//! landmark detector.
//!
//! ```text
//! {"width":640,"height":480,"hands":[{"landmarks":[[0.5,0.4],...],"handedness":"Right"}]}
//! ```

use log::{debug, warn};
use serde::Deserialize;
use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::Path,
};
use thiserror::Error;

use crate::landmarks::{self, Handedness};
use crate::session::Frame;

#[derive(Debug, Error)]
pub enum SourceError {
    /// The line could not be decoded; callers treat it as a frame with no hands.
    #[error("malformed frame on line {line}: {reason}")]
    Malformed { line: u64, reason: String },
    #[error("frame source closed")]
    Closed,
    #[error("frame source read failed: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    width: u32,
    height: u32,
    #[serde(default)]
    hands: Vec<RawHand>,
}

#[derive(Debug, Deserialize)]
struct RawHand {
    #[serde(default)]
    landmarks: Vec<Vec<f32>>,
    handedness: Option<String>,
}

/// Decode one line into a normalized [`Frame`]. Hands that fail
/// normalization are dropped here, the frame itself survives.
pub fn parse_frame(line: &str) -> Result<Frame, String> {
    let raw: RawFrame = serde_json::from_str(line).map_err(|e| e.to_string())?;
    if raw.width == 0 || raw.height == 0 {
        return Err(format!("zero frame size {}x{}", raw.width, raw.height));
    }

    let mut hands = Vec::with_capacity(raw.hands.len());
    for (i, h) in raw.hands.iter().enumerate() {
        // [x, y] or [x, y, z]; depth is ignored
        let pts: Option<Vec<(f32, f32)>> = h
            .landmarks
            .iter()
            .map(|p| match p.as_slice() {
                [x, y, ..] => Some((*x, *y)),
                _ => None,
            })
            .collect();
        let Some(pts) = pts else {
            debug!("hand {i}: landmark with fewer than two coordinates, dropped");
            continue;
        };
        let handedness = Handedness::from_label(h.handedness.as_deref());
        if let Some(obs) = landmarks::normalize(&pts, handedness, raw.width, raw.height) {
            hands.push(obs);
        }
    }

    Ok(Frame {
        width: raw.width,
        height: raw.height,
        hands,
    })
}

pub struct FrameSource<R> {
    reader: R,
    line: String,
    lineno: u64,
}

impl<R: BufRead> FrameSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
            lineno: 0,
        }
    }

    /// Block until the next frame. Blank lines are skipped.
    pub fn next_frame(&mut self) -> Result<Frame, SourceError> {
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                return Err(SourceError::Closed);
            }
            self.lineno += 1;
            let txt = self.line.trim();
            if txt.is_empty() {
                continue;
            }
            return parse_frame(txt).map_err(|reason| SourceError::Malformed {
                line: self.lineno,
                reason,
            });
        }
    }
}

/// Open `path`, or stdin when none (or `-`) is given.
pub fn open(path: Option<&Path>) -> io::Result<FrameSource<Box<dyn BufRead + Send>>> {
    let reader: Box<dyn BufRead + Send> = match path {
        Some(p) if p != Path::new("-") => {
            debug!("reading frames from {}", p.display());
            Box::new(BufReader::new(File::open(p)?))
        }
        _ => {
            warn!("reading frames from stdin");
            Box::new(BufReader::new(io::stdin()))
        }
    };
    Ok(FrameSource::new(reader))
}
