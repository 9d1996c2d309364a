mod anchor;
mod observation;

pub use anchor::{resolve_anchor_name, AnchorInfo, AnchorRegistry, Position};
pub use observation::Observation;
