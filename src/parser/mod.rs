pub mod attributes;
pub mod builder;
pub mod classify;
pub mod context;
pub mod decoder;
pub mod discovery;
pub mod model;
pub mod session;

pub use classify::ModuleCategory;
pub use context::{ContextTracker, Emitted};
pub use decoder::{EventStream, SaxEvent};
pub use discovery::{find_savegame_files, most_recent_savegame};
pub use model::*;
pub use session::SavegameParser;
