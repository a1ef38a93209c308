//! # EXIF Orientation
//!
//! Reads the EXIF orientation tag of a source image and applies the matching
//! pixel transform so the re-encoded output is visually upright. The encoded
//! output never carries the tag again, so the transform is applied exactly
//! once.

use image::DynamicImage;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::debug;

/// The eight EXIF orientations (tag 0x0112)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    #[default]
    Normal,
    FlipHorizontal,
    Rotate180,
    FlipVertical,
    Transpose,
    Rotate90,
    Transverse,
    Rotate270,
}

impl Orientation {
    /// Map a raw EXIF value, unknown values are treated as upright
    pub fn from_exif(value: u32) -> Self {
        match value {
            2 => Orientation::FlipHorizontal,
            3 => Orientation::Rotate180,
            4 => Orientation::FlipVertical,
            5 => Orientation::Transpose,
            6 => Orientation::Rotate90,
            7 => Orientation::Transverse,
            8 => Orientation::Rotate270,
            _ => Orientation::Normal,
        }
    }

    /// Whether the transform swaps width and height
    pub fn swaps_dimensions(self) -> bool {
        matches!(
            self,
            Orientation::Transpose
                | Orientation::Rotate90
                | Orientation::Transverse
                | Orientation::Rotate270
        )
    }

    /// Dimensions as displayed once the transform is applied
    pub fn display_dimensions(self, width: u32, height: u32) -> (u32, u32) {
        if self.swaps_dimensions() {
            (height, width)
        } else {
            (width, height)
        }
    }

    /// Apply the transform, returning the upright image
    pub fn apply(self, img: &DynamicImage) -> Option<DynamicImage> {
        let transformed = match self {
            Orientation::Normal => return None,
            Orientation::FlipHorizontal => img.fliph(),
            Orientation::Rotate180 => img.rotate180(),
            Orientation::FlipVertical => img.flipv(),
            Orientation::Transpose => img.rotate90().fliph(),
            Orientation::Rotate90 => img.rotate90(),
            Orientation::Transverse => img.rotate270().fliph(),
            Orientation::Rotate270 => img.rotate270(),
        };
        Some(transformed)
    }
}

/// Read the orientation tag, falling back to `Normal` when the file has no
/// readable EXIF block
pub fn read_orientation(path: &Path) -> Orientation {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(_) => return Orientation::Normal,
    };
    let mut reader = BufReader::new(file);

    let exif = match exif::Reader::new().read_from_container(&mut reader) {
        Ok(exif) => exif,
        Err(e) => {
            debug!("No EXIF data in {}: {}", path.display(), e);
            return Orientation::Normal;
        }
    };

    exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|field| field.value.get_uint(0))
        .map(Orientation::from_exif)
        .unwrap_or_default()
}

#[cfg(test)]
pub(crate) mod test_support {
    /// Insert a minimal big-endian EXIF APP1 segment carrying `orientation`
    /// right after the SOI marker of a JPEG stream
    pub fn with_exif_orientation(jpeg: &[u8], orientation: u16) -> Vec<u8> {
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let mut segment = vec![0xFF, 0xE1, 0x00, 34];
        segment.extend_from_slice(b"Exif\0\0");
        segment.extend_from_slice(b"MM\0\x2A");
        segment.extend_from_slice(&[0, 0, 0, 8]);
        segment.extend_from_slice(&[0, 1]);
        segment.extend_from_slice(&[0x01, 0x12, 0x00, 0x03, 0, 0, 0, 1]);
        segment.extend_from_slice(&orientation.to_be_bytes());
        segment.extend_from_slice(&[0, 0]);
        segment.extend_from_slice(&[0, 0, 0, 0]);

        let mut out = Vec::with_capacity(jpeg.len() + segment.len());
        out.extend_from_slice(&jpeg[..2]);
        out.extend_from_slice(&segment);
        out.extend_from_slice(&jpeg[2..]);
        out
    }
}
