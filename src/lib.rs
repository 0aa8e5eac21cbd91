pub mod errors;
pub mod config;
pub mod io;
pub mod gap;
pub mod evidence;
pub mod breakpoint;
pub mod quality;
pub mod search;
pub mod output;
pub mod tools;
pub mod pipeline;
pub mod dispatch;
