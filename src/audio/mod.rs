// Audio module - Clock, click hand-off and the CPAL output stream

pub mod click;
pub mod clock;
pub mod emitter;
pub mod engine;
pub mod status;
