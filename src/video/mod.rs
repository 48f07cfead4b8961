pub mod handle;
pub mod pool;

pub use handle::{
    HandleFactory, PlaybackHandle, PlaybackState, Region, SeekDirection, VideoHandle,
    VideoHandleFactory,
};
pub use pool::ResourcePool;
