pub mod media_item;
pub mod settings_store;
pub mod tags;

pub use media_item::*;
pub use settings_store::*;
pub use tags::*;
