pub mod backend;
pub mod config;
pub mod extract;
pub mod gdrive;
pub mod model;
pub mod naming;
pub mod period;
pub mod pipeline;
pub mod promote;
pub mod prompts;
pub mod reconcile;
pub mod sync;
