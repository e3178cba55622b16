// Framelapse: preload a time series of raster frames, keep only the ones
// that exist, and play them back in a loop.
//
//   frames   - addressing, range parsing, the availability probe, the catalog
//   playback - tick scheduling over a catalog
//   session  - the controller task tying both together
//   check    - the per-frame existence check (HTTP in production)
//   render   - raster layer descriptors handed to the rendering surface

#[macro_use]
pub mod logging;

pub mod check;
pub mod frames;
pub mod playback;
pub mod render;
pub mod session;
pub mod settings;

pub use check::{CheckError, ExistenceCheck, HttpExistenceCheck};
pub use frames::{FrameAddress, FrameCatalog, PreloadStatus, TimeRange};
pub use playback::{PlaybackPhase, PlaybackState};
pub use render::{LayerStyle, RasterLayer};
pub use session::{spawn_session, EngineEvent, EventSink, SessionCondition, SessionHandle};
pub use settings::EngineSettings;
