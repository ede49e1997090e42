// Audio module - click synthesis, device output and offline rendering

pub mod click;
pub mod output;
pub mod render;

pub use click::{ClickAccent, ClickVoicing, ToneRequest};
pub use output::CpalClock;
pub use render::{render_click_track, write_wav, RenderedTrack};
