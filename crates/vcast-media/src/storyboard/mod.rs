//! Storyboard: manifest + style + duration into timed frame descriptors.

mod builder;
mod frame;

pub use builder::{build_slides, build_storyboard, Storyboard, StoryboardOptions};
pub use frame::{FrameDescriptor, FrameKind, FrameScene, SceneWord, WordState};
