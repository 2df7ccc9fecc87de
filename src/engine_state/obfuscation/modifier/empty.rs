//! The modifier for worlds that hide nothing.

use cgmath::Point3;

use super::ChunkModifier;
use crate::engine_state::obfuscation::{
    signature::{Signature, SignatureBuilder},
    view::ChunkView,
};

const VERSION: u32 = 1;

/// Leaves the network grid equal to the true grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EmptyModifier;

impl ChunkModifier for EmptyModifier {
    fn name(&self) -> &str {
        "empty"
    }

    fn modify(&self, _view: &mut ChunkView<'_>, _min: Point3<i32>, _max: Point3<i32>, _rng: &mut fastrand::Rng) {}

    fn is_ready(&self, _view: &ChunkView<'_>) -> bool {
        true
    }

    fn require_cache(&self) -> bool {
        false
    }

    fn signature(&self) -> Signature {
        SignatureBuilder::new()
            .append_str(self.name())
            .append_u32(VERSION)
            .build()
    }
}
