//! Cache keys.

use std::fmt;

use crate::crs::CrsId;
use crate::layer::LayerId;
use crate::source::FetchRequest;

/// Identifies one fetch of one layer.
///
/// The layer's source revision is part of the key: rebinding a layer to a
/// different adapter never serves the old adapter's payloads.
///
/// Extents are compared bit-for-bit: two requests share an entry only when
/// they ask for exactly the same area at the same output size.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchKey {
    pub layer: LayerId,
    pub source_revision: u64,
    pub crs: CrsId,
    extent_bits: [u64; 4],
    pub width: u32,
    pub height: u32,
}

impl FetchKey {
    pub fn new(layer: LayerId, source_revision: u64, request: &FetchRequest) -> Self {
        let e = &request.extent;
        Self {
            layer,
            source_revision,
            crs: request.crs.clone(),
            extent_bits: [
                e.min_x.to_bits(),
                e.min_y.to_bits(),
                e.max_x.to_bits(),
                e.max_y.to_bits(),
            ],
            width: request.width,
            height: request.height,
        }
    }
}

impl fmt::Display for FetchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.extent_bits.map(f64::from_bits);
        write!(
            f,
            "{}#{}@{}[{:.3},{:.3},{:.3},{:.3}]{}x{}",
            self.layer, self.source_revision, self.crs, a, b, c, d, self.width, self.height
        )
    }
}
