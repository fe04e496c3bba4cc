//! Parallel frame rendering.

mod font;
mod pool;
mod rasterizer;
mod scheduler;

pub use font::{load_font, FontCache, FontFace, FONT_PATH_ENV};
pub use pool::{render_frames, RenderHandle, RenderPool, RenderTask, RenderedFrame};
pub use rasterizer::{CaptionRasterizer, FrameRasterizer};
pub use scheduler::{Scheduler, WorkerId};
