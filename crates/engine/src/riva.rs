use crate::error::EngineError;

/// `riva` is named in `EngineKind` for forward compatibility (spec §6) but
/// is not a feature this repository commits to building. Constructing one
/// always fails; there is no `todo!()` left in the call path.
pub fn unsupported() -> EngineError {
    EngineError::Unsupported("riva")
}
